//! The generic layouts: full field set (split TCP flags, `tcp_state`,
//! `application`, `memo`), selected for every probe type other than
//! single-sensor NetFlow v5 (§4.F.3).

use super::RecordCodec;
use crate::record::{FlowAddr, FlowRecord, TcpState};
use crate::stream::{ByteOrder, Error};
use std::net::{Ipv4Addr, Ipv6Addr};

const V4_RECORD_LEN: usize = 55;
const V6_RECORD_LEN: usize = 92;

fn encode_common(rec: &FlowRecord, order: ByteOrder, out: &mut Vec<u8>, with_packets: bool) {
    super::put_u16(out, order, rec.src_port);
    super::put_u16(out, order, rec.dst_port);
    out.push(rec.protocol);
    out.push(rec.init_flags);
    out.push(rec.rest_flags);
    out.push(rec.tcp_state.bits());
    if with_packets {
        super::put_u32(out, order, rec.packets);
    }
    super::put_u32(out, order, rec.bytes);
    super::put_u64(out, order, rec.stime_ms);
    super::put_u32(out, order, rec.duration_ms);
    super::put_u16(out, order, rec.sensor_id);
    out.push(rec.flowtype_id);
    super::put_u32(out, order, rec.input_snmp);
    super::put_u32(out, order, rec.output_snmp);
    super::put_u16(out, order, rec.application);
    super::put_u16(out, order, rec.memo);
}

struct CommonFields {
    src_port: u16,
    dst_port: u16,
    protocol: u8,
    init_flags: u8,
    rest_flags: u8,
    tcp_state: u8,
    packets: u32,
    bytes: u32,
    stime_ms: u64,
    duration_ms: u32,
    sensor_id: u16,
    flowtype_id: u8,
    input_snmp: u32,
    output_snmp: u32,
    application: u16,
    memo: u16,
}

fn decode_common(bytes: &[u8], order: ByteOrder, with_packets: bool) -> (CommonFields, usize) {
    let mut pos = 0;
    let src_port = super::get_u16(&bytes[pos..pos + 2], order);
    pos += 2;
    let dst_port = super::get_u16(&bytes[pos..pos + 2], order);
    pos += 2;
    let protocol = bytes[pos];
    pos += 1;
    let init_flags = bytes[pos];
    pos += 1;
    let rest_flags = bytes[pos];
    pos += 1;
    let tcp_state = bytes[pos];
    pos += 1;
    let packets = if with_packets {
        let v = super::get_u32(&bytes[pos..pos + 4], order);
        pos += 4;
        v
    } else {
        0
    };
    let bytes_count = super::get_u32(&bytes[pos..pos + 4], order);
    pos += 4;
    let stime_ms = super::get_u64(&bytes[pos..pos + 8], order);
    pos += 8;
    let duration_ms = super::get_u32(&bytes[pos..pos + 4], order);
    pos += 4;
    let sensor_id = super::get_u16(&bytes[pos..pos + 2], order);
    pos += 2;
    let flowtype_id = bytes[pos];
    pos += 1;
    let input_snmp = super::get_u32(&bytes[pos..pos + 4], order);
    pos += 4;
    let output_snmp = super::get_u32(&bytes[pos..pos + 4], order);
    pos += 4;
    let application = super::get_u16(&bytes[pos..pos + 2], order);
    pos += 2;
    let memo = super::get_u16(&bytes[pos..pos + 2], order);
    pos += 2;

    (
        CommonFields {
            src_port,
            dst_port,
            protocol,
            init_flags,
            rest_flags,
            tcp_state,
            packets,
            bytes: bytes_count,
            stime_ms,
            duration_ms,
            sensor_id,
            flowtype_id,
            input_snmp,
            output_snmp,
            application,
            memo,
        },
        pos,
    )
}

fn v4_of(addr: FlowAddr) -> Ipv4Addr {
    match addr {
        FlowAddr::V4(a) => a,
        FlowAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    }
}

pub struct GenericCodec;

impl RecordCodec for GenericCodec {
    fn encode(&self, rec: &FlowRecord, order: ByteOrder, out: &mut Vec<u8>) -> Result<(), Error> {
        out.extend_from_slice(&v4_of(rec.src_addr).octets());
        out.extend_from_slice(&v4_of(rec.dst_addr).octets());
        out.extend_from_slice(&v4_of(rec.next_hop).octets());
        encode_common(rec, order, out, true);
        Ok(())
    }

    fn decode(&self, bytes: &[u8], order: ByteOrder) -> Result<FlowRecord, Error> {
        if bytes.len() < V4_RECORD_LEN {
            return Err(Error::MalformedRecord("short generic record".into()));
        }
        let src = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let dst = Ipv4Addr::new(bytes[4], bytes[5], bytes[6], bytes[7]);
        let next_hop = Ipv4Addr::new(bytes[8], bytes[9], bytes[10], bytes[11]);
        let (f, _) = decode_common(&bytes[12..], order, true);
        if f.bytes < f.packets {
            return Err(Error::MalformedRecord("bytes < packets".into()));
        }
        Ok(FlowRecord {
            src_addr: FlowAddr::V4(src),
            dst_addr: FlowAddr::V4(dst),
            src_port: f.src_port,
            dst_port: f.dst_port,
            protocol: f.protocol,
            packets: f.packets,
            bytes: f.bytes,
            init_flags: f.init_flags,
            rest_flags: f.rest_flags,
            tcp_state: TcpState::from_bits_truncate(f.tcp_state),
            application: f.application,
            sensor_id: f.sensor_id,
            flowtype_id: f.flowtype_id,
            input_snmp: f.input_snmp,
            output_snmp: f.output_snmp,
            next_hop: FlowAddr::V4(next_hop),
            stime_ms: f.stime_ms,
            duration_ms: f.duration_ms,
            memo: f.memo,
        })
    }

    fn record_length(&self) -> usize {
        V4_RECORD_LEN
    }
}

pub struct GenericWebCodec;

impl RecordCodec for GenericWebCodec {
    fn encode(&self, rec: &FlowRecord, order: ByteOrder, out: &mut Vec<u8>) -> Result<(), Error> {
        GenericCodec.encode(rec, order, out)
    }
    fn decode(&self, bytes: &[u8], order: ByteOrder) -> Result<FlowRecord, Error> {
        GenericCodec.decode(bytes, order)
    }
    fn record_length(&self) -> usize {
        GenericCodec.record_length()
    }
}

pub struct GenericZeroPacketsCodec;

impl RecordCodec for GenericZeroPacketsCodec {
    fn encode(&self, rec: &FlowRecord, order: ByteOrder, out: &mut Vec<u8>) -> Result<(), Error> {
        out.extend_from_slice(&v4_of(rec.src_addr).octets());
        out.extend_from_slice(&v4_of(rec.dst_addr).octets());
        out.extend_from_slice(&v4_of(rec.next_hop).octets());
        encode_common(rec, order, out, false);
        Ok(())
    }

    fn decode(&self, bytes: &[u8], order: ByteOrder) -> Result<FlowRecord, Error> {
        if bytes.len() < V4_RECORD_LEN - 4 {
            return Err(Error::MalformedRecord("short zero-packets record".into()));
        }
        let src = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let dst = Ipv4Addr::new(bytes[4], bytes[5], bytes[6], bytes[7]);
        let next_hop = Ipv4Addr::new(bytes[8], bytes[9], bytes[10], bytes[11]);
        let (f, _) = decode_common(&bytes[12..], order, false);
        Ok(FlowRecord {
            src_addr: FlowAddr::V4(src),
            dst_addr: FlowAddr::V4(dst),
            src_port: f.src_port,
            dst_port: f.dst_port,
            protocol: f.protocol,
            packets: 0,
            bytes: f.bytes,
            init_flags: f.init_flags,
            rest_flags: f.rest_flags,
            tcp_state: TcpState::from_bits_truncate(f.tcp_state),
            application: f.application,
            sensor_id: f.sensor_id,
            flowtype_id: f.flowtype_id,
            input_snmp: f.input_snmp,
            output_snmp: f.output_snmp,
            next_hop: FlowAddr::V4(next_hop),
            stime_ms: f.stime_ms,
            duration_ms: f.duration_ms,
            memo: f.memo,
        })
    }

    fn record_length(&self) -> usize {
        V4_RECORD_LEN - 4
    }
}

/// Per-address family flag bits within the leading flag byte.
const FLAG_SRC_V6: u8 = 0b001;
const FLAG_DST_V6: u8 = 0b010;
const FLAG_NEXT_HOP_V6: u8 = 0b100;

fn put_addr(out: &mut Vec<u8>, addr: FlowAddr) {
    match addr {
        FlowAddr::V4(a) => {
            out.extend_from_slice(&[0u8; 12]);
            out.extend_from_slice(&a.octets());
        }
        FlowAddr::V6(a) => out.extend_from_slice(&a.octets()),
    }
}

fn get_addr(bytes: &[u8], is_v6: bool) -> FlowAddr {
    if is_v6 {
        let octets: [u8; 16] = bytes.try_into().unwrap();
        FlowAddr::V6(Ipv6Addr::from(octets))
    } else {
        FlowAddr::V4(Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]))
    }
}

pub struct GenericV6Codec;

impl RecordCodec for GenericV6Codec {
    fn encode(&self, rec: &FlowRecord, order: ByteOrder, out: &mut Vec<u8>) -> Result<(), Error> {
        let mut flag = 0u8;
        if rec.src_addr.is_v6() {
            flag |= FLAG_SRC_V6;
        }
        if rec.dst_addr.is_v6() {
            flag |= FLAG_DST_V6;
        }
        if rec.next_hop.is_v6() {
            flag |= FLAG_NEXT_HOP_V6;
        }
        out.push(flag);
        put_addr(out, rec.src_addr);
        put_addr(out, rec.dst_addr);
        put_addr(out, rec.next_hop);
        encode_common(rec, order, out, true);
        Ok(())
    }

    fn decode(&self, bytes: &[u8], order: ByteOrder) -> Result<FlowRecord, Error> {
        if bytes.len() < V6_RECORD_LEN {
            return Err(Error::MalformedRecord("short generic-v6 record".into()));
        }
        let flag = bytes[0];
        let src = get_addr(&bytes[1..17], flag & FLAG_SRC_V6 != 0);
        let dst = get_addr(&bytes[17..33], flag & FLAG_DST_V6 != 0);
        let next_hop = get_addr(&bytes[33..49], flag & FLAG_NEXT_HOP_V6 != 0);
        let (f, _) = decode_common(&bytes[49..], order, true);
        if f.bytes < f.packets {
            return Err(Error::MalformedRecord("bytes < packets".into()));
        }
        Ok(FlowRecord {
            src_addr: src,
            dst_addr: dst,
            src_port: f.src_port,
            dst_port: f.dst_port,
            protocol: f.protocol,
            packets: f.packets,
            bytes: f.bytes,
            init_flags: f.init_flags,
            rest_flags: f.rest_flags,
            tcp_state: TcpState::from_bits_truncate(f.tcp_state),
            application: f.application,
            sensor_id: f.sensor_id,
            flowtype_id: f.flowtype_id,
            input_snmp: f.input_snmp,
            output_snmp: f.output_snmp,
            next_hop,
            stime_ms: f.stime_ms,
            duration_ms: f.duration_ms,
            memo: f.memo,
        })
    }

    fn record_length(&self) -> usize {
        V6_RECORD_LEN
    }
}
