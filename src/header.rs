//! Typed, length-prefixed header entries appended to a file header.
//!
//! Wire shape: `type_id:u32_be + length:u32_be + payload[length-8]`,
//! terminated by an entry of type 0. Unknown type ids round-trip verbatim
//! via [`HeaderEntryValue::Unrecognized`].

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

const TYPE_PACKED_FILE_INFO: u32 = 1;
const TYPE_PROBE_NAME: u32 = 2;
const TYPE_PREFIX_MAP: u32 = 3;
const TYPE_IPSET: u32 = 4;
const TYPE_BAG: u32 = 5;
const TYPE_AGGBAG: u32 = 6;
const TYPE_INVOCATION: u32 = 7;
const TYPE_ANNOTATION: u32 = 8;
pub const TYPE_TERMINATOR: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HeaderEntryValue {
    PackedFileInfo {
        record_count: u64,
        file_flags: u32,
    },
    ProbeName(String),
    PrefixMap {
        map_name: String,
    },
    IPset {
        raw: Vec<u8>,
    },
    Bag {
        raw: Vec<u8>,
    },
    AggBag {
        raw: Vec<u8>,
    },
    Invocation {
        timestamp_ms: u64,
        argv: Vec<String>,
    },
    Annotation(String),
    Unrecognized(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderEntry {
    pub type_id: u32,
    pub payload: HeaderEntryValue,
}

impl HeaderEntry {
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = match &self.payload {
            HeaderEntryValue::PackedFileInfo {
                record_count,
                file_flags,
            } => {
                let mut b = record_count.to_be_bytes().to_vec();
                b.extend_from_slice(&file_flags.to_be_bytes());
                b
            }
            HeaderEntryValue::ProbeName(name) => encode_string(name),
            HeaderEntryValue::PrefixMap { map_name } => encode_string(map_name),
            HeaderEntryValue::IPset { raw } => raw.clone(),
            HeaderEntryValue::Bag { raw } => raw.clone(),
            HeaderEntryValue::AggBag { raw } => raw.clone(),
            HeaderEntryValue::Invocation { timestamp_ms, argv } => {
                let mut b = timestamp_ms.to_be_bytes().to_vec();
                b.extend_from_slice(&(argv.len() as u32).to_be_bytes());
                for arg in argv {
                    b.extend_from_slice(&encode_string(arg));
                }
                b
            }
            HeaderEntryValue::Annotation(text) => encode_string(text),
            HeaderEntryValue::Unrecognized(raw) => raw.clone(),
        };

        let mut out = self.type_id.to_be_bytes().to_vec();
        out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Parse one entry starting at the front of `data`, returning the entry
    /// and the remaining bytes.
    pub fn parse(data: &[u8]) -> Option<(HeaderEntry, &[u8])> {
        if data.len() < 8 {
            return None;
        }
        let type_id = u32::from_be_bytes(data[0..4].try_into().ok()?);
        let length = u32::from_be_bytes(data[4..8].try_into().ok()?) as usize;
        if length < 8 || data.len() < length {
            return None;
        }
        let body = &data[8..length];
        let rest = &data[length..];

        let payload = match type_id {
            TYPE_PACKED_FILE_INFO if body.len() >= 12 => HeaderEntryValue::PackedFileInfo {
                record_count: u64::from_be_bytes(body[0..8].try_into().ok()?),
                file_flags: u32::from_be_bytes(body[8..12].try_into().ok()?),
            },
            TYPE_PROBE_NAME => HeaderEntryValue::ProbeName(decode_string(body)?),
            TYPE_PREFIX_MAP => HeaderEntryValue::PrefixMap {
                map_name: decode_string(body)?,
            },
            TYPE_IPSET => HeaderEntryValue::IPset { raw: body.to_vec() },
            TYPE_BAG => HeaderEntryValue::Bag { raw: body.to_vec() },
            TYPE_AGGBAG => HeaderEntryValue::AggBag { raw: body.to_vec() },
            TYPE_INVOCATION if body.len() >= 12 => {
                let timestamp_ms = u64::from_be_bytes(body[0..8].try_into().ok()?);
                let argc = u32::from_be_bytes(body[8..12].try_into().ok()?) as usize;
                let mut rest = &body[12..];
                let mut argv = Vec::with_capacity(argc);
                for _ in 0..argc {
                    let (arg, r) = decode_string_prefix(rest)?;
                    argv.push(arg);
                    rest = r;
                }
                HeaderEntryValue::Invocation { timestamp_ms, argv }
            }
            TYPE_ANNOTATION => HeaderEntryValue::Annotation(decode_string(body)?),
            _ => HeaderEntryValue::Unrecognized(body.to_vec()),
        };

        Some((HeaderEntry { type_id, payload }, rest))
    }
}

fn encode_string(s: &str) -> Vec<u8> {
    let mut out = (s.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(s.as_bytes());
    out
}

fn decode_string(body: &[u8]) -> Option<String> {
    decode_string_prefix(body).map(|(s, _)| s)
}

fn decode_string_prefix(body: &[u8]) -> Option<(String, &[u8])> {
    if body.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes(body[0..4].try_into().ok()?) as usize;
    if body.len() < 4 + len {
        return None;
    }
    let s = String::from_utf8_lossy(&body[4..4 + len]).into_owned();
    Some((s, &body[4 + len..]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPolicy {
    All,
    NotInvocations,
}

/// Copy entries from `src` into `dst` per `policy`. Unknown entry types are
/// always preserved regardless of policy.
pub fn copy(src: &[HeaderEntry], dst: &mut Vec<HeaderEntry>, policy: CopyPolicy) {
    for entry in src {
        let skip = policy == CopyPolicy::NotInvocations && entry.type_id == TYPE_INVOCATION;
        if !skip {
            dst.push(entry.clone());
        }
    }
}

/// Append an invocation entry recording the current UTC time and argv.
pub fn add_invocation(entries: &mut Vec<HeaderEntry>, argv: &[String]) {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    entries.push(HeaderEntry {
        type_id: TYPE_INVOCATION,
        payload: HeaderEntryValue::Invocation {
            timestamp_ms,
            argv: argv.to_vec(),
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_probe_name() {
        let entry = HeaderEntry {
            type_id: TYPE_PROBE_NAME,
            payload: HeaderEntryValue::ProbeName("eth0-mirror".into()),
        };
        let bytes = entry.to_bytes();
        let (parsed, rest) = HeaderEntry::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, entry);
    }

    #[test]
    fn unrecognized_type_round_trips_verbatim() {
        let entry = HeaderEntry {
            type_id: 999,
            payload: HeaderEntryValue::Unrecognized(vec![1, 2, 3, 4]),
        };
        let bytes = entry.to_bytes();
        let (parsed, _) = HeaderEntry::parse(&bytes).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn copy_not_invocations_drops_invocation_entries() {
        let mut entries = vec![];
        add_invocation(&mut entries, &["rwflowpack".to_string()]);
        entries.push(HeaderEntry {
            type_id: TYPE_ANNOTATION,
            payload: HeaderEntryValue::Annotation("site note".into()),
        });

        let mut dst = vec![];
        copy(&entries, &mut dst, CopyPolicy::NotInvocations);
        assert_eq!(dst.len(), 1);
        assert!(matches!(dst[0].payload, HeaderEntryValue::Annotation(_)));
    }

    #[test]
    fn copy_all_preserves_every_entry() {
        let mut entries = vec![];
        add_invocation(&mut entries, &["rwflowpack".to_string()]);
        let mut dst = vec![];
        copy(&entries, &mut dst, CopyPolicy::All);
        assert_eq!(dst, entries);
    }
}
