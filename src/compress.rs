//! Compression framing for the data section of a stream.
//!
//! Framing is self-delimiting: each block is `len:u32_be` followed by
//! `len` bytes of (possibly compressed) payload, so a reader can walk
//! blocks without the file header present.

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::Serialize;
use std::fmt;
use std::io::{self, Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CompressionMethod {
    None = 0,
    Deflate = 1,
    Lz4 = 2,
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Deflate),
            2 => Ok(Self::Lz4),
            _ => Err(Error::CompressInvalid(value)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// Method id is recognized but the library backing it isn't available at build time.
    CompressUnavailable(CompressionMethod),
    /// Method id isn't recognized at all.
    CompressInvalid(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::CompressUnavailable(m) => write!(f, "compression method {m:?} unavailable"),
            Self::CompressInvalid(id) => write!(f, "unknown compression method id {id}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

const MIN_BLOCK_LEN: usize = 4096;

/// Wraps a byte sink, transparently compressing fixed-size blocks as they fill.
pub struct CompressedWriter<W: Write> {
    inner: W,
    method: CompressionMethod,
    block_len: usize,
    buf: Vec<u8>,
}

impl<W: Write> CompressedWriter<W> {
    pub fn new(inner: W, method: CompressionMethod) -> Self {
        Self::with_block_len(inner, method, MIN_BLOCK_LEN)
    }

    pub fn with_block_len(inner: W, method: CompressionMethod, block_len: usize) -> Self {
        CompressedWriter {
            inner,
            method,
            block_len: block_len.max(MIN_BLOCK_LEN),
            buf: Vec::with_capacity(block_len),
        }
    }

    fn flush_block(&mut self) -> Result<(), Error> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let compressed = match self.method {
            CompressionMethod::None => std::mem::take(&mut self.buf),
            CompressionMethod::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&self.buf)?;
                self.buf.clear();
                encoder.finish()?
            }
            CompressionMethod::Lz4 => {
                let compressed = lz4_flex::compress_prepend_size(&self.buf);
                self.buf.clear();
                compressed
            }
        };
        self.inner
            .write_all(&(compressed.len() as u32).to_be_bytes())?;
        self.inner.write_all(&compressed)?;
        Ok(())
    }

    /// Flush any buffered data and consume self, returning the inner writer.
    pub fn finish(mut self) -> Result<W, Error> {
        self.flush_block()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        while self.buf.len() >= self.block_len {
            self.flush_block()
                .map_err(|e| io::Error::other(e.to_string()))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()
            .map_err(|e| io::Error::other(e.to_string()))?;
        self.inner.flush()
    }
}

/// Reads framed, possibly-compressed blocks and exposes them as a flat byte stream.
pub struct CompressedReader<R: Read> {
    inner: R,
    method: CompressionMethod,
    pending: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> CompressedReader<R> {
    pub fn new(inner: R, method: CompressionMethod) -> Self {
        CompressedReader {
            inner,
            method,
            pending: vec![],
            pos: 0,
            eof: false,
        }
    }

    fn fill_block(&mut self) -> io::Result<()> {
        let mut len_bytes = [0u8; 4];
        match self.inner.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.eof = true;
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        let len = u32::from_be_bytes(len_bytes) as usize;
        let mut raw = vec![0u8; len];
        self.inner.read_exact(&mut raw)?;

        self.pending = match self.method {
            CompressionMethod::None => raw,
            CompressionMethod::Deflate => {
                let mut decoder = DeflateDecoder::new(&raw[..]);
                let mut out = vec![];
                decoder.read_to_end(&mut out)?;
                out
            }
            CompressionMethod::Lz4 => lz4_flex::decompress_size_prepended(&raw)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?,
        };
        self.pos = 0;
        Ok(())
    }
}

impl<R: Read> Read for CompressedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.pending.len() && !self.eof {
            self.fill_block()?;
        }
        if self.pos >= self.pending.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(method: CompressionMethod) {
        let mut writer = CompressedWriter::with_block_len(Vec::new(), method, MIN_BLOCK_LEN);
        writer.write_all(b"hello flow record world").unwrap();
        writer.write_all(&vec![7u8; 10_000]).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = CompressedReader::new(&bytes[..], method);
        let mut out = vec![];
        reader.read_to_end(&mut out).unwrap();

        let mut expected = b"hello flow record world".to_vec();
        expected.extend(vec![7u8; 10_000]);
        assert_eq!(out, expected);
    }

    #[test]
    fn round_trips_none() {
        round_trip(CompressionMethod::None);
    }

    #[test]
    fn round_trips_deflate() {
        round_trip(CompressionMethod::Deflate);
    }

    #[test]
    fn round_trips_lz4() {
        round_trip(CompressionMethod::Lz4);
    }

    #[test]
    fn block_is_self_delimiting_across_boundaries() {
        let mut writer =
            CompressedWriter::with_block_len(Vec::new(), CompressionMethod::None, MIN_BLOCK_LEN);
        for _ in 0..3 {
            writer.write_all(&vec![1u8; MIN_BLOCK_LEN / 2]).unwrap();
        }
        let bytes = writer.finish().unwrap();
        let mut reader = CompressedReader::new(&bytes[..], CompressionMethod::None);
        let mut out = vec![];
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 3 * (MIN_BLOCK_LEN / 2));
    }

    #[test]
    fn invalid_method_id_rejected() {
        assert!(matches!(
            CompressionMethod::from_u8(99),
            Err(Error::CompressInvalid(99))
        ));
    }
}
