//! IPFIX Information Element lookups.
//!
//! References:
//! - <https://www.iana.org/assignments/ipfix/ipfix.xhtml>

use serde::Serialize;

/// IANA-assigned IPFIX Information Element identifiers.
///
/// Only the identifiers actually consumed by the flow record conversion are
/// named; everything else decodes to `Unknown`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Hash)]
pub enum IANAIPFixField {
    OctetDeltaCount,
    PacketDeltaCount,
    ProtocolIdentifier,
    SourceTransportPort,
    SourceIpv4address,
    IngressInterface,
    DestinationTransportPort,
    DestinationIpv4address,
    EgressInterface,
    IpNextHopIpv4address,
    TcpControlBits,
    FlowStartSysUpTime,
    FlowEndSysUpTime,
    SourceMacaddress,
    DestinationMacaddress,
    SourceIpv6address,
    DestinationIpv6address,
    IpNextHopIpv6address,
    Unknown,
}

impl From<u16> for IANAIPFixField {
    fn from(value: u16) -> Self {
        match value {
            1 => Self::OctetDeltaCount,
            2 => Self::PacketDeltaCount,
            4 => Self::ProtocolIdentifier,
            7 => Self::SourceTransportPort,
            8 => Self::SourceIpv4address,
            10 => Self::IngressInterface,
            11 => Self::DestinationTransportPort,
            12 => Self::DestinationIpv4address,
            14 => Self::EgressInterface,
            15 => Self::IpNextHopIpv4address,
            6 => Self::TcpControlBits,
            22 => Self::FlowStartSysUpTime,
            21 => Self::FlowEndSysUpTime,
            56 => Self::SourceMacaddress,
            80 => Self::DestinationMacaddress,
            27 => Self::SourceIpv6address,
            28 => Self::DestinationIpv6address,
            62 => Self::IpNextHopIpv6address,
            _ => Self::Unknown,
        }
    }
}

/// A field type, either a well-known IANA element or a vendor enterprise element.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Hash)]
pub enum IPFixField {
    Iana(IANAIPFixField),
    Enterprise(u32, u16),
}

impl IPFixField {
    pub fn from_type_number(field_type_number: u16, enterprise_number: Option<u32>) -> Self {
        match enterprise_number {
            Some(number) => Self::Enterprise(number, field_type_number),
            None => Self::Iana(IANAIPFixField::from(field_type_number)),
        }
    }
}
