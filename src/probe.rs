//! Probe model: the ingest endpoint a sensor's deciders are evaluated against.

use bitflags::bitflags;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeType {
    NetflowV5,
    NetflowV9,
    IPFix,
    Sflow,
    Silk,
}

bitflags! {
    /// Per-probe bitset altering decode/classify behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProbeQuirks: u8 {
        /// Packet count may be zero; forces a format that doesn't store bytes-per-packet ratios.
        const ZERO_PACKETS = 0b01;
        /// `memo` carries a firewall-event code that may coerce the flowtype to a null direction.
        const FW_EVENT      = 0b10;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub id: u32,
    pub name: String,
    pub kind: ProbeType,
    #[serde(with = "bitflags::serde")]
    pub quirks: ProbeQuirks,
    pub sensor_ids: Vec<u16>,
}

impl Probe {
    pub fn sensor_count(&self) -> usize {
        self.sensor_ids.len()
    }
}
