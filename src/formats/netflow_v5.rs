//! The NetFlow-v5-optimized layout: v4 addresses only, combined TCP flags,
//! no `tcp_state`/`application`/memo — selected only for single-sensor,
//! non-`ZERO_PACKETS` NetFlow v5 probes (§4.F.3).

use super::RecordCodec;
use crate::record::{FlowAddr, FlowRecord, TcpState};
use crate::stream::{ByteOrder, Error};
use std::net::Ipv4Addr;

const RECORD_LEN: usize = 46;

fn v4_of(addr: FlowAddr) -> Ipv4Addr {
    match addr {
        FlowAddr::V4(a) => a,
        FlowAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    }
}

pub struct NetflowV5Codec;

impl RecordCodec for NetflowV5Codec {
    fn encode(&self, rec: &FlowRecord, order: ByteOrder, out: &mut Vec<u8>) -> Result<(), Error> {
        out.extend_from_slice(&v4_of(rec.src_addr).octets());
        out.extend_from_slice(&v4_of(rec.dst_addr).octets());
        out.extend_from_slice(&v4_of(rec.next_hop).octets());
        super::put_u16(out, order, rec.src_port);
        super::put_u16(out, order, rec.dst_port);
        out.push(rec.protocol);
        out.push(rec.combined_flags());
        super::put_u16(out, order, rec.input_snmp as u16);
        super::put_u16(out, order, rec.output_snmp as u16);
        super::put_u32(out, order, rec.packets);
        super::put_u32(out, order, rec.bytes);
        super::put_u64(out, order, rec.stime_ms);
        super::put_u32(out, order, rec.duration_ms);
        super::put_u16(out, order, rec.sensor_id);
        out.push(rec.flowtype_id);
        out.push(0);
        Ok(())
    }

    fn decode(&self, bytes: &[u8], order: ByteOrder) -> Result<FlowRecord, Error> {
        if bytes.len() < RECORD_LEN {
            return Err(Error::MalformedRecord("short netflow-v5 record".into()));
        }
        let src = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let dst = Ipv4Addr::new(bytes[4], bytes[5], bytes[6], bytes[7]);
        let next_hop = Ipv4Addr::new(bytes[8], bytes[9], bytes[10], bytes[11]);
        let src_port = super::get_u16(&bytes[12..14], order);
        let dst_port = super::get_u16(&bytes[14..16], order);
        let protocol = bytes[16];
        let flags = bytes[17];
        let input_snmp = super::get_u16(&bytes[18..20], order) as u32;
        let output_snmp = super::get_u16(&bytes[20..22], order) as u32;
        let packets = super::get_u32(&bytes[22..26], order);
        let bytes_count = super::get_u32(&bytes[26..30], order);
        let stime_ms = super::get_u64(&bytes[30..38], order);
        let duration_ms = super::get_u32(&bytes[38..42], order);
        let sensor_id = super::get_u16(&bytes[42..44], order);
        let flowtype_id = bytes[44];

        if bytes_count < packets {
            return Err(Error::MalformedRecord("bytes < packets".into()));
        }

        Ok(FlowRecord {
            src_addr: FlowAddr::V4(src),
            dst_addr: FlowAddr::V4(dst),
            src_port,
            dst_port,
            protocol,
            packets,
            bytes: bytes_count,
            init_flags: flags,
            rest_flags: flags,
            tcp_state: TcpState::empty(),
            application: 0,
            sensor_id,
            flowtype_id,
            input_snmp,
            output_snmp,
            next_hop: FlowAddr::V4(next_hop),
            stime_ms,
            duration_ms,
            memo: 0,
        })
    }

    fn record_length(&self) -> usize {
        RECORD_LEN
    }
}

pub struct NetflowV5WebCodec;

impl RecordCodec for NetflowV5WebCodec {
    fn encode(&self, rec: &FlowRecord, order: ByteOrder, out: &mut Vec<u8>) -> Result<(), Error> {
        NetflowV5Codec.encode(rec, order, out)
    }

    fn decode(&self, bytes: &[u8], order: ByteOrder) -> Result<FlowRecord, Error> {
        NetflowV5Codec.decode(bytes, order)
    }

    fn record_length(&self) -> usize {
        NetflowV5Codec.record_length()
    }
}
