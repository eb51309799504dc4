//! # sFlow v5
//!
//! Scoped to what the flow record conversion needs: the datagram header, flow
//! samples (format 0,1 and 0,3), and the sampled raw packet header (format
//! 0,1) far enough to recover a five-tuple. Counter samples and the other
//! ~60 extended flow_data formats defined by sFlow are preserved as opaque
//! bytes rather than modeled.
//!
//! Reference: <https://sflow.org/sflow_version_5.txt>

use crate::protocol::ProtocolTypes;

use nom::IResult;
use nom::bytes::complete::take;
use nom::multi::count;
use nom::number::complete::be_u32;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const FLOW_SAMPLE: u32 = 1;
const FLOW_SAMPLE_EXPANDED: u32 = 3;
const SAMPLED_HEADER: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SflowDatagram {
    pub version: u32,
    pub agent_address: IpAddr,
    pub sub_agent_id: u32,
    pub sequence_number: u32,
    pub uptime: u32,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub sample_type: u32,
    pub sequence_number: u32,
    pub source_id: u32,
    pub sampling_rate: u32,
    pub sample_pool: u32,
    pub drops: u32,
    pub input_if: u32,
    pub output_if: u32,
    pub records: Vec<FlowRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowRecord {
    pub format: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<SampledHeader>,
}

/// The raw packet header captured by a `sampled_header` flow_data record (format 0,1),
/// decoded far enough to expose a five-tuple for IPv4/IPv6 + TCP/UDP/ICMP payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampledHeader {
    pub header_protocol: u32,
    pub frame_length: u32,
    pub stripped: u32,
    pub src_addr: Option<IpAddr>,
    pub dst_addr: Option<IpAddr>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub protocol: Option<ProtocolTypes>,
}

pub fn parse_datagram(i: &[u8]) -> IResult<&[u8], SflowDatagram> {
    let (i, version) = be_u32(i)?;
    let (i, address_type) = be_u32(i)?;
    let (i, agent_address) = match address_type {
        2 => {
            let (i, bytes) = take(16usize)(i)?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            (i, IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => {
            let (i, addr) = be_u32(i)?;
            (i, IpAddr::V4(Ipv4Addr::from(addr)))
        }
    };
    let (i, sub_agent_id) = be_u32(i)?;
    let (i, sequence_number) = be_u32(i)?;
    let (i, uptime) = be_u32(i)?;
    let (i, num_samples) = be_u32(i)?;
    let (i, samples) = count(parse_sample, num_samples as usize)(i)?;

    Ok((
        i,
        SflowDatagram {
            version,
            agent_address,
            sub_agent_id,
            sequence_number,
            uptime,
            samples,
        },
    ))
}

fn parse_sample(i: &[u8]) -> IResult<&[u8], Sample> {
    let (i, sample_type) = be_u32(i)?;
    let (i, sample_length) = be_u32(i)?;
    let (rest, body) = take(sample_length)(i)?;

    let format = sample_type & 0xFFF;
    let (_, sample) = match format {
        FLOW_SAMPLE => parse_flow_sample(body, false)?,
        FLOW_SAMPLE_EXPANDED => parse_flow_sample(body, true)?,
        _ => (
            body,
            Sample {
                sample_type,
                sequence_number: 0,
                source_id: 0,
                sampling_rate: 0,
                sample_pool: 0,
                drops: 0,
                input_if: 0,
                output_if: 0,
                records: vec![],
            },
        ),
    };

    Ok((
        rest,
        Sample {
            sample_type,
            ..sample
        },
    ))
}

fn parse_flow_sample(i: &[u8], expanded: bool) -> IResult<&[u8], Sample> {
    let (i, sequence_number) = be_u32(i)?;
    let (i, source_id) = if expanded {
        let (i, source_type) = be_u32(i)?;
        let (i, index) = be_u32(i)?;
        (i, (source_type << 24) | (index & 0x00FF_FFFF))
    } else {
        be_u32(i)?
    };
    let (i, sampling_rate) = be_u32(i)?;
    let (i, sample_pool) = be_u32(i)?;
    let (i, drops) = be_u32(i)?;
    let (i, input_if) = if expanded {
        let (i, _format) = be_u32(i)?;
        be_u32(i)?
    } else {
        be_u32(i)?
    };
    let (i, output_if) = if expanded {
        let (i, _format) = be_u32(i)?;
        be_u32(i)?
    } else {
        be_u32(i)?
    };
    let (i, num_records) = be_u32(i)?;
    let (i, records) = count(parse_flow_record, num_records as usize)(i)?;

    Ok((
        i,
        Sample {
            sample_type: 0,
            sequence_number,
            source_id,
            sampling_rate,
            sample_pool,
            drops,
            input_if,
            output_if,
            records,
        },
    ))
}

fn parse_flow_record(i: &[u8]) -> IResult<&[u8], FlowRecord> {
    let (i, data_format) = be_u32(i)?;
    let (i, length) = be_u32(i)?;
    let (rest, body) = take(length)(i)?;

    let format = data_format & 0xFFF;
    let header = if format == SAMPLED_HEADER {
        parse_sampled_header(body).ok().map(|(_, h)| h)
    } else {
        None
    };

    Ok((rest, FlowRecord { format, header }))
}

fn parse_sampled_header(i: &[u8]) -> IResult<&[u8], SampledHeader> {
    let (i, header_protocol) = be_u32(i)?;
    let (i, frame_length) = be_u32(i)?;
    let (i, stripped) = be_u32(i)?;
    let (i, header_length) = be_u32(i)?;
    let (i, header_bytes) = take(header_length)(i)?;

    // header_protocol 1 == Ethernet; everything else is left undecoded.
    let (src_addr, dst_addr, src_port, dst_port, protocol) = if header_protocol == 1 {
        decode_ethernet_five_tuple(header_bytes)
    } else {
        (None, None, None, None, None)
    };

    Ok((
        i,
        SampledHeader {
            header_protocol,
            frame_length,
            stripped,
            src_addr,
            dst_addr,
            src_port,
            dst_port,
            protocol,
        },
    ))
}

type FiveTuple = (
    Option<IpAddr>,
    Option<IpAddr>,
    Option<u16>,
    Option<u16>,
    Option<ProtocolTypes>,
);

/// Best-effort decode of an Ethernet II frame down to its IPv4/IPv6 + TCP/UDP five-tuple.
/// Returns all-`None` for anything that is truncated, tagged, or not IP.
fn decode_ethernet_five_tuple(frame: &[u8]) -> FiveTuple {
    const NONE: FiveTuple = (None, None, None, None, None);
    if frame.len() < 14 {
        return NONE;
    }
    let mut ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    let mut offset = 14;
    if ethertype == 0x8100 {
        if frame.len() < offset + 4 {
            return NONE;
        }
        ethertype = u16::from_be_bytes([frame[offset + 2], frame[offset + 3]]);
        offset += 4;
    }

    match ethertype {
        0x0800 => decode_ipv4(&frame[offset..]),
        0x86DD => decode_ipv6(&frame[offset..]),
        _ => NONE,
    }
}

fn decode_ipv4(data: &[u8]) -> FiveTuple {
    const NONE: FiveTuple = (None, None, None, None, None);
    if data.len() < 20 {
        return NONE;
    }
    let ihl = (data[0] & 0x0F) as usize * 4;
    if data.len() < ihl {
        return NONE;
    }
    let protocol_number = data[9];
    let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    let (src_port, dst_port) = decode_ports(protocol_number, &data[ihl.min(data.len())..]);

    (
        Some(IpAddr::V4(src)),
        Some(IpAddr::V4(dst)),
        src_port,
        dst_port,
        Some(ProtocolTypes::from(protocol_number)),
    )
}

fn decode_ipv6(data: &[u8]) -> FiveTuple {
    const NONE: FiveTuple = (None, None, None, None, None);
    if data.len() < 40 {
        return NONE;
    }
    let protocol_number = data[6];
    let mut src_octets = [0u8; 16];
    src_octets.copy_from_slice(&data[8..24]);
    let mut dst_octets = [0u8; 16];
    dst_octets.copy_from_slice(&data[24..40]);
    let (src_port, dst_port) = decode_ports(protocol_number, &data[40..]);

    (
        Some(IpAddr::V6(Ipv6Addr::from(src_octets))),
        Some(IpAddr::V6(Ipv6Addr::from(dst_octets))),
        src_port,
        dst_port,
        Some(ProtocolTypes::from(protocol_number)),
    )
}

fn decode_ports(protocol_number: u8, transport: &[u8]) -> (Option<u16>, Option<u16>) {
    if transport.len() < 4 {
        return (None, None);
    }
    match ProtocolTypes::from(protocol_number) {
        ProtocolTypes::TCP | ProtocolTypes::UDP => {
            let src = u16::from_be_bytes([transport[0], transport[1]]);
            let dst = u16::from_be_bytes([transport[2], transport[3]]);
            (Some(src), Some(dst))
        }
        _ => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ipv4_tcp_five_tuple() {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x00;
        let mut ip = vec![0x45, 0, 0, 40, 0, 0, 0, 0, 64, 6, 0, 0];
        ip.extend_from_slice(&[10, 0, 0, 1]);
        ip.extend_from_slice(&[10, 0, 0, 2]);
        ip.extend_from_slice(&[0x1F, 0x90, 0x00, 0x50]);
        frame.extend_from_slice(&ip);

        let (src, dst, sport, dport, proto) = decode_ethernet_five_tuple(&frame);
        assert_eq!(src, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert_eq!(dst, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))));
        assert_eq!(sport, Some(8080));
        assert_eq!(dport, Some(80));
        assert_eq!(proto, Some(ProtocolTypes::TCP));
    }

    #[test]
    fn truncated_frame_yields_no_tuple() {
        let frame = vec![0u8; 10];
        assert_eq!(
            decode_ethernet_five_tuple(&frame),
            (None, None, None, None, None)
        );
    }
}
