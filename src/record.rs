//! The canonical flow record and the conversions that build one from each
//! wire protocol the crate ingests.

use crate::netflow::ipfix::{self, IPFix};
use crate::netflow::sflow;
use crate::netflow::v5::V5;
use crate::netflow::v9::{self, V9};
use crate::protocol::ProtocolTypes;

use bitflags::bitflags;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

bitflags! {
    /// Session-level attributes the packer records alongside the flag union.
    ///
    /// `UNIFORM_FIELDS` from the legacy bitset is intentionally not stored:
    /// it described a packing-time optimization, not a session attribute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TcpState: u8 {
        const TIMEOUT_KILLED       = 0b0000_0001;
        const TIMEOUT_STARTED      = 0b0000_0010;
        const CONTINUATION         = 0b0000_0100;
        const UNIFLOW              = 0b0000_1000;
        const FIN_FOLLOWED_NOT_SYN = 0b0001_0000;
    }
}

/// An address carrying its own family, so a record never needs a side-channel
/// discriminator to know whether `octets()` or the 128-bit form applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowAddr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl FlowAddr {
    pub fn is_v6(&self) -> bool {
        matches!(self, Self::V6(_))
    }

    /// Widen a v4 address to its IPv4-mapped v6 form (`::ffff:a.b.c.d`).
    pub fn to_mapped_v6(&self) -> Ipv6Addr {
        match self {
            Self::V4(addr) => addr.to_ipv6_mapped(),
            Self::V6(addr) => *addr,
        }
    }
}

impl From<IpAddr> for FlowAddr {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => Self::V4(v4),
            IpAddr::V6(v6) => Self::V6(v6),
        }
    }
}

impl From<FlowAddr> for IpAddr {
    fn from(addr: FlowAddr) -> Self {
        match addr {
            FlowAddr::V4(v4) => IpAddr::V4(v4),
            FlowAddr::V6(v6) => IpAddr::V6(v6),
        }
    }
}

/// The common flow record produced by every ingest protocol and consumed by
/// the classifier, the stream layer, and rwmatch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowRecord {
    pub src_addr: FlowAddr,
    pub dst_addr: FlowAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub packets: u32,
    pub bytes: u32,
    pub init_flags: u8,
    pub rest_flags: u8,
    #[serde(with = "bitflags::serde")]
    pub tcp_state: TcpState,
    pub application: u16,
    pub sensor_id: u16,
    pub flowtype_id: u8,
    pub input_snmp: u32,
    pub output_snmp: u32,
    pub next_hop: FlowAddr,
    pub stime_ms: u64,
    pub duration_ms: u32,
    pub memo: u16,
}

impl FlowRecord {
    pub fn protocol_type(&self) -> ProtocolTypes {
        ProtocolTypes::from(self.protocol)
    }

    pub fn is_icmp(&self) -> bool {
        self.protocol == 1
    }

    pub fn is_web(&self) -> bool {
        self.protocol == 6 && matches!(self.dst_port, 80 | 8080 | 443)
    }

    /// Valid only when `is_icmp()`.
    pub fn icmp_type(&self) -> u8 {
        (self.dst_port >> 8) as u8
    }

    /// Valid only when `is_icmp()`.
    pub fn icmp_code(&self) -> u8 {
        (self.dst_port & 0xFF) as u8
    }

    pub fn combined_flags(&self) -> u8 {
        self.init_flags | self.rest_flags
    }

    pub fn etime_ms(&self) -> u64 {
        self.stime_ms + self.duration_ms as u64
    }

    pub fn is_malformed(&self) -> bool {
        self.bytes < self.packets
    }
}

/// Reconstruct the wall-clock millisecond timestamp of a sysUptime-relative
/// event (NetFlow v5/v9 `first`/`last`), given the export packet's own wall
/// clock and sysUptime.
fn wall_ms(export_unix_ms: u64, sys_up_time_ms: u64, event_ms: u64) -> u64 {
    export_unix_ms.saturating_sub(sys_up_time_ms.saturating_sub(event_ms))
}

/// Decode every flow set in a V5 packet into its own record.
pub fn records_from_v5(v5: &V5) -> Vec<FlowRecord> {
    let export_unix_ms =
        v5.header.unix_secs as u64 * 1000 + v5.header.unix_nsecs as u64 / 1_000_000;
    let sys_up_ms = v5.header.sys_up_time.as_millis() as u64;

    v5.sets
        .iter()
        .map(|set| {
            let start_ms = wall_ms(export_unix_ms, sys_up_ms, set.first.as_millis() as u64);
            let end_ms = wall_ms(export_unix_ms, sys_up_ms, set.last.as_millis() as u64);
            FlowRecord {
                src_addr: FlowAddr::V4(set.src_addr),
                dst_addr: FlowAddr::V4(set.dst_addr),
                src_port: set.src_port,
                dst_port: set.dst_port,
                protocol: set.protocol_number,
                packets: set.d_pkts,
                bytes: set.d_octets,
                init_flags: set.tcp_flags,
                rest_flags: set.tcp_flags,
                tcp_state: TcpState::empty(),
                application: 0,
                sensor_id: 0,
                flowtype_id: 0,
                input_snmp: set.input as u32,
                output_snmp: set.output as u32,
                next_hop: FlowAddr::V4(set.next_hop),
                stime_ms: start_ms,
                duration_ms: end_ms.saturating_sub(start_ms) as u32,
                memo: 0,
            }
        })
        .collect()
}

/// Decode every V9 data record into a `FlowRecord`, using the export packet's
/// own wall clock/sysUptime pair to correct the sysUptime-relative timestamps.
pub fn records_from_v9(packet: &V9) -> Vec<FlowRecord> {
    let export_unix_ms = packet.header.unix_secs as u64 * 1000;
    let sys_up_ms = packet.header.sys_up_time as u64;

    let mut records = vec![];
    for flowset in &packet.flowsets {
        let Some(data) = &flowset.data else { continue };
        for field in &data.data_fields {
            records.push(record_from_v9_field(field, export_unix_ms, sys_up_ms));
        }
    }
    records
}

fn record_from_v9_field(field: &v9::DataField, export_unix_ms: u64, sys_up_ms: u64) -> FlowRecord {
    let src_addr = field
        .ipv4_src_addr
        .map(FlowAddr::V4)
        .or(field.ipv6_src_addr.map(FlowAddr::V6))
        .unwrap_or(FlowAddr::V4(Ipv4Addr::UNSPECIFIED));
    let dst_addr = field
        .ipv4_dst_addr
        .map(FlowAddr::V4)
        .or(field.ipv6_dst_addr.map(FlowAddr::V6))
        .unwrap_or(FlowAddr::V4(Ipv4Addr::UNSPECIFIED));
    let next_hop = field
        .ipv4_next_hop
        .map(FlowAddr::V4)
        .or(field.ipv6_next_hop.map(FlowAddr::V6))
        .unwrap_or(FlowAddr::V4(Ipv4Addr::UNSPECIFIED));

    let start_ms = field
        .first_switched
        .map(|t| wall_ms(export_unix_ms, sys_up_ms, t as u64))
        .unwrap_or(export_unix_ms);
    let end_ms = field
        .last_switched
        .map(|t| wall_ms(export_unix_ms, sys_up_ms, t as u64))
        .unwrap_or(start_ms);

    FlowRecord {
        src_addr,
        dst_addr,
        src_port: field.l4_src_port.unwrap_or(0),
        dst_port: field.l4_dst_port.unwrap_or(0),
        protocol: field.protocol.map(|p| p as u8).unwrap_or(0),
        packets: field.in_pkts.as_ref().map(bytes_to_u32).unwrap_or(0),
        bytes: field.in_bytes.as_ref().map(bytes_to_u32).unwrap_or(0),
        init_flags: field.tcp_flags.unwrap_or(0),
        rest_flags: field.tcp_flags.unwrap_or(0),
        tcp_state: TcpState::empty(),
        application: 0,
        sensor_id: 0,
        flowtype_id: 0,
        input_snmp: field.input_snmp.as_ref().map(bytes_to_u32).unwrap_or(0),
        output_snmp: field.output_snmp.as_ref().map(bytes_to_u32).unwrap_or(0),
        next_hop,
        stime_ms: start_ms,
        duration_ms: end_ms.saturating_sub(start_ms) as u32,
        memo: 0,
    }
}

fn bytes_to_u32(bytes: &Vec<u8>) -> u32 {
    let mut value: u32 = 0;
    for b in bytes.iter().rev().take(4).rev() {
        value = (value << 8) | *b as u32;
    }
    value
}

/// Decode every IPFIX data record into a `FlowRecord`.
pub fn records_from_ipfix(packet: &IPFix) -> Vec<FlowRecord> {
    let export_unix_ms = packet.header.export_time.as_secs() * 1000;

    let mut records = vec![];
    for flowset in &packet.flowsets {
        let Some(data) = &flowset.data else { continue };
        records.push(record_from_ipfix_data(data, export_unix_ms));
    }
    records
}

fn record_from_ipfix_data(data: &ipfix::Data, export_unix_ms: u64) -> FlowRecord {
    use crate::netflow::ipfix_lookup::{IANAIPFixField, IPFixField};

    let mut rec = FlowRecord {
        src_addr: FlowAddr::V4(Ipv4Addr::UNSPECIFIED),
        dst_addr: FlowAddr::V4(Ipv4Addr::UNSPECIFIED),
        src_port: 0,
        dst_port: 0,
        protocol: 0,
        packets: 0,
        bytes: 0,
        init_flags: 0,
        rest_flags: 0,
        tcp_state: TcpState::empty(),
        application: 0,
        sensor_id: 0,
        flowtype_id: 0,
        input_snmp: 0,
        output_snmp: 0,
        next_hop: FlowAddr::V4(Ipv4Addr::UNSPECIFIED),
        stime_ms: export_unix_ms,
        duration_ms: 0,
        memo: 0,
    };

    for field in &data.data_fields {
        match field.field_type {
            IPFixField::Iana(IANAIPFixField::SourceIpv4address) => {
                if let Some(addr) = field.ipv4_addr {
                    rec.src_addr = FlowAddr::V4(addr);
                }
            }
            IPFixField::Iana(IANAIPFixField::DestinationIpv4address) => {
                if let Some(addr) = field.ipv4_addr {
                    rec.dst_addr = FlowAddr::V4(addr);
                }
            }
            IPFixField::Iana(IANAIPFixField::IpNextHopIpv4address) => {
                if let Some(addr) = field.ipv4_addr {
                    rec.next_hop = FlowAddr::V4(addr);
                }
            }
            IPFixField::Iana(IANAIPFixField::SourceIpv6address) => {
                if let Some(addr) = field.ipv6_addr {
                    rec.src_addr = FlowAddr::V6(addr);
                }
            }
            IPFixField::Iana(IANAIPFixField::DestinationIpv6address) => {
                if let Some(addr) = field.ipv6_addr {
                    rec.dst_addr = FlowAddr::V6(addr);
                }
            }
            IPFixField::Iana(IANAIPFixField::SourceTransportPort) => {
                rec.src_port = field.port.unwrap_or(0);
            }
            IPFixField::Iana(IANAIPFixField::DestinationTransportPort) => {
                rec.dst_port = field.port.unwrap_or(0);
            }
            IPFixField::Iana(IANAIPFixField::ProtocolIdentifier) => {
                rec.protocol = field.protocol_identifier.unwrap_or(0);
            }
            IPFixField::Iana(IANAIPFixField::TcpControlBits) => {
                let flags = field.tcp_control_bits.unwrap_or(0);
                rec.init_flags = flags;
                rec.rest_flags = flags;
            }
            IPFixField::Iana(IANAIPFixField::OctetDeltaCount) => {
                rec.bytes = field.counter.as_ref().map(bytes_to_u32).unwrap_or(0);
            }
            IPFixField::Iana(IANAIPFixField::PacketDeltaCount) => {
                rec.packets = field.counter.as_ref().map(bytes_to_u32).unwrap_or(0);
            }
            IPFixField::Iana(IANAIPFixField::IngressInterface) => {
                rec.input_snmp = field.interface.as_ref().map(bytes_to_u32).unwrap_or(0);
            }
            IPFixField::Iana(IANAIPFixField::EgressInterface) => {
                rec.output_snmp = field.interface.as_ref().map(bytes_to_u32).unwrap_or(0);
            }
            _ => {}
        }
    }

    rec
}

/// Decode every sampled-header flow record in an sFlow datagram into a
/// `FlowRecord`. Records whose header couldn't be decoded (truncated, not
/// IP, VLAN-tagged beyond one tag) are skipped.
pub fn records_from_sflow(datagram: &sflow::SflowDatagram) -> Vec<FlowRecord> {
    let stime_ms = datagram.uptime as u64;
    let mut records = vec![];

    for sample in &datagram.samples {
        for record in &sample.records {
            let Some(header) = &record.header else {
                continue;
            };
            let (Some(src_addr), Some(dst_addr)) = (header.src_addr, header.dst_addr) else {
                continue;
            };
            records.push(FlowRecord {
                src_addr: src_addr.into(),
                dst_addr: dst_addr.into(),
                src_port: header.src_port.unwrap_or(0),
                dst_port: header.dst_port.unwrap_or(0),
                protocol: header.protocol.map(|p| p as u8).unwrap_or(0),
                packets: (sample.sampling_rate.max(1)),
                bytes: header.frame_length,
                init_flags: 0,
                rest_flags: 0,
                tcp_state: TcpState::empty(),
                application: 0,
                sensor_id: 0,
                flowtype_id: 0,
                input_snmp: sample.input_if,
                output_snmp: sample.output_if,
                next_hop: FlowAddr::V4(Ipv4Addr::UNSPECIFIED),
                stime_ms,
                duration_ms: 0,
                memo: 0,
            });
        }
    }
    records
}
