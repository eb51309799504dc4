//! Sensor model: per-network deciders that map a record's src/dst side to a
//! [`NetworkId`], plus the probe/sensor registry the classifier resolves
//! ids through.
//!
//! IPset/Bag/prefix-map are shared services specified only at interface
//! level (§2.H of the packing-logic spec); [`IpBlockSet`] and [`IpSet`] here
//! are minimal, functionally-complete stand-ins for deciders to consult, not
//! a reimplementation of those data structures.

use crate::flowtype::NetworkId;
use crate::probe::Probe;
use crate::record::FlowRecord;

use serde::Serialize;
use std::collections::HashSet;
use std::net::IpAddr;

pub const NUM_NETWORKS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Src,
    Dst,
}

/// A CIDR set: a decider family backed by prefix matching.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct IpBlockSet(pub Vec<(IpAddr, u8)>);

impl IpBlockSet {
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.0
            .iter()
            .any(|(net, len)| prefix_matches(*net, *len, addr))
    }
}

fn prefix_matches(net: IpAddr, len: u8, addr: IpAddr) -> bool {
    match (net, addr) {
        (IpAddr::V4(net), IpAddr::V4(addr)) => {
            let mask = if len == 0 {
                0
            } else {
                u32::MAX << (32 - len.min(32))
            };
            (u32::from(net) & mask) == (u32::from(addr) & mask)
        }
        (IpAddr::V6(net), IpAddr::V6(addr)) => {
            let mask = if len == 0 {
                0
            } else {
                u128::MAX << (128 - len.min(128))
            };
            (u128::from(net) & mask) == (u128::from(addr) & mask)
        }
        _ => false,
    }
}

/// An arbitrary address set, the decider family backed by a materialized IPset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct IpSet(pub HashSet<IpAddr>);

impl IpSet {
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.0.contains(&addr)
    }
}

/// A bitmap of SNMP interface indices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct InterfaceSet(pub HashSet<u32>);

impl InterfaceSet {
    pub fn contains(&self, iface: u32) -> bool {
        self.0.contains(&iface)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeciderFamily {
    Interface,
    IpBlock,
    IpSet,
}

/// Per-network membership rule. `Remain*` variants carry no payload; they
/// mean "complement of the other networks' deciders of the same family",
/// resolved at match time rather than at verification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Decider {
    Unset,
    Interface(InterfaceSet),
    RemainInterface,
    IpBlock(IpBlockSet),
    RemainIpBlock,
    IpSet(IpSet),
    RemainIpSet,
    NegIpBlock(IpBlockSet),
    NegIpSet(IpSet),
}

impl Decider {
    pub fn family(&self) -> Option<DeciderFamily> {
        match self {
            Self::Unset => None,
            Self::Interface(_) | Self::RemainInterface => Some(DeciderFamily::Interface),
            Self::IpBlock(_) | Self::RemainIpBlock | Self::NegIpBlock(_) => {
                Some(DeciderFamily::IpBlock)
            }
            Self::IpSet(_) | Self::RemainIpSet | Self::NegIpSet(_) => Some(DeciderFamily::IpSet),
        }
    }

    pub fn is_remainder(&self) -> bool {
        matches!(
            self,
            Self::RemainInterface | Self::RemainIpBlock | Self::RemainIpSet
        )
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, Self::NegIpBlock(_) | Self::NegIpSet(_))
    }

    /// Non-remainder membership test. Remainder and unset deciders never
    /// match directly; callers resolve remainder by complementing the union
    /// of sibling deciders of the same family.
    fn matches_direct(&self, addr: IpAddr, iface: u32) -> bool {
        match self {
            Self::Interface(set) => set.contains(iface),
            Self::IpBlock(set) => set.contains(addr),
            Self::IpSet(set) => set.contains(addr),
            Self::NegIpBlock(set) => !set.contains(addr),
            Self::NegIpSet(set) => !set.contains(addr),
            Self::Unset | Self::RemainInterface | Self::RemainIpBlock | Self::RemainIpSet => false,
        }
    }
}

/// A filter predicate; any match on a sensor's filter list discards the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Filter {
    Protocol(u8),
    SourcePort(u16),
    DestPort(u16),
}

impl Filter {
    fn matches(&self, rec: &FlowRecord) -> bool {
        match self {
            Self::Protocol(p) => rec.protocol == *p,
            Self::SourcePort(p) => rec.src_port == *p,
            Self::DestPort(p) => rec.dst_port == *p,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Sensor {
    pub id: u16,
    pub name: String,
    pub class: String,
    /// Pinned network for `[SRC, DST]`, bypassing deciders entirely when set.
    pub fixed_network: [Option<NetworkId>; 2],
    /// Indexed by `NetworkId as usize` (Null, External, Internal).
    pub decider: [Decider; NUM_NETWORKS],
    pub filters: Vec<Filter>,
    pub probe_ids: Vec<u32>,
}

impl Sensor {
    pub fn check_filters(&self, rec: &FlowRecord) -> bool {
        self.filters.iter().any(|f| f.matches(rec))
    }

    /// True iff the record's chosen side matches this sensor's decider for
    /// `network`, resolving "remainder" by complementing the union of the
    /// other networks' same-family deciders.
    pub fn test_flow_interfaces(
        &self,
        rec: &FlowRecord,
        network: NetworkId,
        direction: Direction,
    ) -> bool {
        if let Some(fixed) = self.fixed_network[direction as usize] {
            return fixed == network;
        }

        let (addr, iface): (IpAddr, u32) = match direction {
            Direction::Src => (rec.src_addr.into(), rec.input_snmp),
            Direction::Dst => (rec.dst_addr.into(), rec.output_snmp),
        };

        let decider = &self.decider[network as usize];
        if decider.is_remainder() {
            let family = decider.family();
            !self
                .decider
                .iter()
                .enumerate()
                .filter(|(n, d)| *n != network as usize && d.family() == family)
                .any(|(_, d)| d.matches_direct(addr, iface))
        } else {
            decider.matches_direct(addr, iface)
        }
    }
}

/// Immutable arena of probes and sensors; resolution is by id lookup, never
/// by cyclic reference.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registry {
    pub sensors: Vec<Sensor>,
    pub probes: Vec<Probe>,
}

impl Registry {
    pub fn sensor(&self, id: u16) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.id == id)
    }

    pub fn probe(&self, id: u32) -> Option<&Probe> {
        self.probes.iter().find(|p| p.id == id)
    }

    pub fn sensors_for_probe<'a>(&'a self, probe: &'a Probe) -> impl Iterator<Item = &'a Sensor> {
        probe
            .sensor_ids
            .iter()
            .filter_map(move |id| self.sensor(*id))
    }
}
