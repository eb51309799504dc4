//! Wire-format decoders for the flow export protocols `rwflowpack` accepts as input:
//! NetFlow v5, NetFlow v9, IPFIX, and sFlow v5.
//!
//! These modules own nothing about SiLK's record model or classification; they turn bytes
//! off the wire into protocol-shaped structs. [`crate::record`] converts those structs into
//! [`crate::record::FlowRecord`]s.

pub mod ipfix;
pub mod ipfix_lookup;
pub mod sflow;
pub mod v5;
pub mod v9;
pub mod v9_lookup;

use serde::Serialize;

/// A single decoded packet, tagged by which protocol produced it.
#[derive(Debug, Clone, Serialize)]
pub enum NetflowPacket {
    V5(v5::V5),
    V9(v9::V9),
    IPFix(ipfix::IPFix),
    Sflow(sflow::SflowDatagram),
}

/// Result of decoding one packet off a variable-length-record protocol (V9, IPFIX).
///
/// `remaining` holds any bytes left in the input buffer after the packet, which callers
/// feed back in for the next iteration when a UDP datagram carries more than one message
/// (not standard, but cheap to tolerate).
#[derive(Debug, Clone)]
pub struct ParsedNetflow {
    pub remaining: Vec<u8>,
    pub packet: NetflowPacket,
}

/// Parser for a protocol whose record layout depends on previously-learned templates.
pub trait NetflowByteParserVariable {
    fn parse_bytes<'a>(
        &'a mut self,
        packet: &'a [u8],
    ) -> Result<ParsedNetflow, Box<dyn std::error::Error>>;
}
