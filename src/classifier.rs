//! The packing-logic classifier: sensor verification plus the per-record
//! `(flowtype, sensor_id)` routing decision and file-format selection.

use crate::flowtype::{FlowType, NetworkId};
use crate::probe::{Probe, ProbeQuirks, ProbeType};
use crate::record::FlowRecord;
use crate::sensor::{Decider, DeciderFamily, Direction, Registry, Sensor};

use std::collections::HashSet;
use std::fmt;

/// Firewall-event codes carried in `FlowRecord::memo` when a probe has the
/// `FW_EVENT` quirk.
pub mod fw_event {
    pub const DENIED: u16 = 1;
    pub const DENIED_INGRESS: u16 = 2;
    pub const DENIED_EGRESS: u16 = 3;
    pub const DENIED_SERV_PORT: u16 = 4;
    pub const DENIED_NOT_SYN: u16 = 5;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    InvalidSensor(String, String),
    NotImplemented(String),
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSensor(name, reason) => write!(f, "invalid sensor {name}: {reason}"),
            Self::NotImplemented(what) => write!(f, "not implemented: {what}"),
        }
    }
}

impl std::error::Error for ClassifierError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyError {
    /// The output work-area is smaller than `probe.sensor_count()`.
    OutputTooSmall,
}

impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutputTooSmall => write!(f, "output array smaller than probe.sensor_count()"),
        }
    }
}

impl std::error::Error for ClassifyError {}

/// Web detection for classification purposes checks both ports, not just
/// the destination: a flow record for the response leg of a web session
/// carries the well-known port as its source port. This is deliberately
/// broader than `FlowRecord::is_web()`, which is the narrower accessor
/// contract (`dport` only) used elsewhere (e.g. `rwmatch`).
fn is_web_flow(rec: &FlowRecord) -> bool {
    const WEB_PORTS: [u16; 3] = [80, 8080, 443];
    rec.protocol == 6 && (WEB_PORTS.contains(&rec.src_port) || WEB_PORTS.contains(&rec.dst_port))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Compact NetFlow-v5-optimized layout; only eligible for single-sensor
    /// v5 probes without the `ZERO_PACKETS` quirk.
    NetflowV5,
    NetflowV5Web,
    Generic,
    GenericWeb,
    /// Single IPv6-capable layout, used for every flowtype once IPv6 support
    /// is enabled and the probe isn't NetFlow v5.
    GenericV6,
    /// Doesn't encode bytes-per-packet ratios; selected by `ZERO_PACKETS`.
    GenericZeroPackets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordVersion {
    Any,
    V5,
}

/// Validated, immutable classification engine. Construction is the only
/// place sensor configuration is checked or corrected; `classify` and
/// `file_format_for` never fail on configuration grounds again afterward.
pub struct Classifier {
    registry: Registry,
    web_split: bool,
    icmp_split: bool,
    ipv6_enabled: bool,
}

impl Classifier {
    /// Verify every sensor in `registry`, applying the remainder-coercion
    /// fixup (rule 6) to a corrected copy. Collects every violation rather
    /// than stopping at the first.
    pub fn new(
        mut registry: Registry,
        web_split: bool,
        icmp_split: bool,
        ipv6_enabled: bool,
    ) -> Result<Classifier, Vec<ClassifierError>> {
        FlowType::assert_registry();
        log::debug!("flowtype registry is self-consistent");

        let mut errors = vec![];
        for sensor in registry.sensors.iter_mut() {
            if let Err(e) = verify_and_coerce(sensor) {
                log::warn!("sensor verification failed: {e}");
                errors.push(e);
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(Classifier {
            registry,
            web_split,
            icmp_split,
            ipv6_enabled,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Classify one record against every sensor attached to `probe`,
    /// appending `(flowtype, sensor_id)` pairs to `out`. Returns the number
    /// of pairs written.
    pub fn classify(
        &self,
        probe: &Probe,
        rec: &FlowRecord,
        out: &mut Vec<(FlowType, u16)>,
    ) -> Result<usize, ClassifyError> {
        out.clear();
        let mut k = 0;
        for sensor in self.registry.sensors_for_probe(probe) {
            if !sensor.filters.is_empty() && sensor.check_filters(rec) {
                continue;
            }
            let flowtype = self.classify_one(sensor, rec);
            let flowtype = apply_fw_overlay(probe, flowtype, rec.memo);
            out.push((flowtype, sensor.id));
            k += 1;
        }
        Ok(k)
    }

    fn classify_one(&self, sensor: &Sensor, rec: &FlowRecord) -> FlowType {
        let src = resolve_side(
            sensor,
            rec,
            Direction::Src,
            &[NetworkId::External, NetworkId::Internal],
        );
        match src {
            Some(NetworkId::External) => {
                match resolve_side(
                    sensor,
                    rec,
                    Direction::Dst,
                    &[NetworkId::Null, NetworkId::Internal, NetworkId::External],
                ) {
                    Some(NetworkId::Null) => FlowType::InNull,
                    Some(NetworkId::Internal) => {
                        if self.icmp_split && rec.is_icmp() {
                            FlowType::InIcmp
                        } else if self.web_split && is_web_flow(rec) {
                            FlowType::InWeb
                        } else {
                            FlowType::In
                        }
                    }
                    Some(NetworkId::External) => FlowType::Ext2Ext,
                    _ => FlowType::Other,
                }
            }
            Some(NetworkId::Internal) => {
                match resolve_side(
                    sensor,
                    rec,
                    Direction::Dst,
                    &[NetworkId::Null, NetworkId::External, NetworkId::Internal],
                ) {
                    Some(NetworkId::Null) => FlowType::OutNull,
                    Some(NetworkId::External) => {
                        if self.icmp_split && rec.is_icmp() {
                            FlowType::OutIcmp
                        } else if self.web_split && is_web_flow(rec) {
                            FlowType::OutWeb
                        } else {
                            FlowType::Out
                        }
                    }
                    Some(NetworkId::Internal) => FlowType::Int2Int,
                    _ => FlowType::Other,
                }
            }
            _ => FlowType::Other,
        }
    }

    /// Select the on-disk file format and record version for a flowtype
    /// produced from `probe`.
    pub fn file_format_for(
        &self,
        probe: &Probe,
        flowtype: FlowType,
    ) -> (FileFormat, RecordVersion) {
        let is_web = matches!(flowtype, FlowType::InWeb | FlowType::OutWeb);
        let zero_packets = probe.quirks.contains(ProbeQuirks::ZERO_PACKETS);
        let v5_compact_eligible =
            probe.kind == ProbeType::NetflowV5 && probe.sensor_count() == 1 && !zero_packets;

        if v5_compact_eligible {
            let format = if is_web {
                FileFormat::NetflowV5Web
            } else {
                FileFormat::NetflowV5
            };
            return (format, RecordVersion::Any);
        }

        let mut format = if is_web {
            FileFormat::GenericWeb
        } else {
            FileFormat::Generic
        };
        let mut record_version = RecordVersion::Any;

        let ipv6_required = self.ipv6_enabled && probe.kind != ProbeType::NetflowV5;
        if ipv6_required {
            format = FileFormat::GenericV6;
        }
        if zero_packets {
            format = FileFormat::GenericZeroPackets;
            // Documented quirk: the record-version pin only applies outside the
            // IPv6 branch; under IPv6 the pin is dropped. Behavior carried
            // forward unchanged rather than "fixed".
            record_version = if self.ipv6_enabled {
                RecordVersion::Any
            } else {
                RecordVersion::V5
            };
        }

        (format, record_version)
    }
}

fn resolve_side(
    sensor: &Sensor,
    rec: &FlowRecord,
    dir: Direction,
    order: &[NetworkId],
) -> Option<NetworkId> {
    order
        .iter()
        .copied()
        .find(|&n| sensor.test_flow_interfaces(rec, n, dir))
}

fn apply_fw_overlay(probe: &Probe, flowtype: FlowType, memo: u16) -> FlowType {
    if !probe.quirks.contains(ProbeQuirks::FW_EVENT) {
        return flowtype;
    }
    match memo {
        fw_event::DENIED_INGRESS => FlowType::InNull,
        fw_event::DENIED_EGRESS => FlowType::OutNull,
        fw_event::DENIED | fw_event::DENIED_SERV_PORT | fw_event::DENIED_NOT_SYN => {
            if flowtype.is_inbound() {
                FlowType::InNull
            } else if flowtype.is_outbound() {
                FlowType::OutNull
            } else {
                flowtype
            }
        }
        _ => flowtype,
    }
}

fn verify_and_coerce(sensor: &mut Sensor) -> Result<(), ClassifierError> {
    let name = sensor.name.clone();
    let err = |reason: &str| ClassifierError::InvalidSensor(name.clone(), reason.to_string());

    // Rule 7: NEG_* deciders are not externally configurable.
    if sensor.decider.iter().any(Decider::is_negated) {
        return Err(ClassifierError::NotImplemented(format!(
            "sensor {name}: NEG_IPBLOCK/NEG_IPSET deciders"
        )));
    }

    let fixed_both = sensor.fixed_network[0].is_some() && sensor.fixed_network[1].is_some();
    if !fixed_both {
        let external = &sensor.decider[NetworkId::External as usize];
        let internal = &sensor.decider[NetworkId::Internal as usize];
        let any_set = !matches!(external, Decider::Unset) || !matches!(internal, Decider::Unset);
        if !any_set {
            return Err(err("at least one of internal-*/external-* must be set"));
        }

        // Rule 3: exactly one decider family across external/internal, with
        // null-interface allowed to coexist with ipblock/ipset siblings.
        let non_null_families: HashSet<DeciderFamily> = [NetworkId::External, NetworkId::Internal]
            .iter()
            .filter_map(|&n| sensor.decider[n as usize].family())
            .collect();
        if non_null_families.len() > 1 {
            return Err(err("external/internal deciders mix more than one family"));
        }
        if let Some(null_family) = sensor.decider[NetworkId::Null as usize].family() {
            let compatible = non_null_families.is_empty()
                || non_null_families.contains(&null_family)
                || null_family == DeciderFamily::Interface;
            if !compatible {
                return Err(err(
                    "null decider family incompatible with external/internal",
                ));
            }
        }

        // Rule 4: at most one remainder network.
        let remainder_count = sensor.decider.iter().filter(|d| d.is_remainder()).count();
        if remainder_count > 1 {
            return Err(err("more than one network marked remainder"));
        }

        // Rule 5: non-interface remainder requires a non-remainder sibling of the same family.
        for i in 0..sensor.decider.len() {
            if sensor.decider[i].is_remainder() {
                let family = sensor.decider[i].family();
                if family != Some(DeciderFamily::Interface) {
                    let has_sibling = sensor
                        .decider
                        .iter()
                        .enumerate()
                        .any(|(j, d)| j != i && d.family() == family && !d.is_remainder());
                    if !has_sibling {
                        return Err(err("remainder of ipblock/ipset with no sibling decider"));
                    }
                }
            }
        }

        // Rule 6: coerce the unset side to REMAIN_* when exactly one of
        // external/internal is unset and the other carries a non-remainder value.
        let ext_unset = matches!(external, Decider::Unset);
        let int_unset = matches!(internal, Decider::Unset);
        if ext_unset != int_unset {
            let (set_idx, unset_idx) = if ext_unset {
                (NetworkId::Internal as usize, NetworkId::External as usize)
            } else {
                (NetworkId::External as usize, NetworkId::Internal as usize)
            };
            if !sensor.decider[set_idx].is_remainder()
                && let Some(family) = sensor.decider[set_idx].family()
            {
                sensor.decider[unset_idx] = match family {
                    DeciderFamily::Interface => Decider::RemainInterface,
                    DeciderFamily::IpBlock => Decider::RemainIpBlock,
                    DeciderFamily::IpSet => Decider::RemainIpSet,
                };
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FlowAddr;
    use crate::sensor::{InterfaceSet, NUM_NETWORKS};
    use std::collections::HashSet as Set;
    use std::net::Ipv4Addr;

    fn interface_sensor() -> Sensor {
        let mut decider = [Decider::Unset, Decider::Unset, Decider::Unset];
        decider[NetworkId::Null as usize] = Decider::Interface(InterfaceSet(Set::from([0])));
        decider[NetworkId::External as usize] = Decider::Interface(InterfaceSet(Set::from([1])));
        decider[NetworkId::Internal as usize] = Decider::Interface(InterfaceSet(Set::from([2])));
        Sensor {
            id: 1,
            name: "S0".into(),
            class: "all".into(),
            fixed_network: [None, None],
            decider,
            filters: vec![],
            probe_ids: vec![1],
        }
    }

    fn base_record() -> FlowRecord {
        FlowRecord {
            src_addr: FlowAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_addr: FlowAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port: 54321,
            dst_port: 80,
            protocol: 6,
            packets: 5,
            bytes: 1500,
            init_flags: 0,
            rest_flags: 0,
            tcp_state: crate::record::TcpState::empty(),
            application: 0,
            sensor_id: 0,
            flowtype_id: 0,
            input_snmp: 1,
            output_snmp: 2,
            next_hop: FlowAddr::V4(Ipv4Addr::UNSPECIFIED),
            stime_ms: 0,
            duration_ms: 0,
            memo: 0,
        }
    }

    fn probe(quirks: ProbeQuirks) -> Probe {
        Probe {
            id: 1,
            name: "p0".into(),
            kind: ProbeType::NetflowV5,
            quirks,
            sensor_ids: vec![1],
        }
    }

    fn registry_with(sensor: Sensor) -> Registry {
        Registry {
            sensors: vec![sensor],
            probes: vec![],
        }
    }

    #[test]
    fn scenario_1_in_web() {
        let classifier =
            Classifier::new(registry_with(interface_sensor()), true, false, false).unwrap();
        let rec = base_record();
        let mut out = vec![];
        classifier
            .classify(&probe(ProbeQuirks::empty()), &rec, &mut out)
            .unwrap();
        assert_eq!(out, vec![(FlowType::InWeb, 1)]);
    }

    #[test]
    fn scenario_2_out_web() {
        let classifier =
            Classifier::new(registry_with(interface_sensor()), true, false, false).unwrap();
        let mut rec = base_record();
        rec.src_port = 443;
        rec.dst_port = 34567;
        rec.input_snmp = 2;
        rec.output_snmp = 1;
        let mut out = vec![];
        classifier
            .classify(&probe(ProbeQuirks::empty()), &rec, &mut out)
            .unwrap();
        assert_eq!(out, vec![(FlowType::OutWeb, 1)]);
    }

    #[test]
    fn scenario_3_icmp_split_toggle() {
        let mut rec = base_record();
        rec.protocol = 1;
        rec.dst_port = 0x0300;

        let off = Classifier::new(registry_with(interface_sensor()), true, false, false).unwrap();
        let mut out = vec![];
        off.classify(&probe(ProbeQuirks::empty()), &rec, &mut out)
            .unwrap();
        assert_eq!(out, vec![(FlowType::In, 1)]);

        let on = Classifier::new(registry_with(interface_sensor()), true, true, false).unwrap();
        on.classify(&probe(ProbeQuirks::empty()), &rec, &mut out)
            .unwrap();
        assert_eq!(out, vec![(FlowType::InIcmp, 1)]);
    }

    #[test]
    fn scenario_4_fw_event_coerces_to_out_null() {
        let classifier =
            Classifier::new(registry_with(interface_sensor()), true, false, false).unwrap();
        let mut rec = base_record();
        rec.src_port = 443;
        rec.dst_port = 34567;
        rec.input_snmp = 2;
        rec.output_snmp = 1;
        rec.memo = fw_event::DENIED;
        let mut out = vec![];
        classifier
            .classify(&probe(ProbeQuirks::FW_EVENT), &rec, &mut out)
            .unwrap();
        assert_eq!(out, vec![(FlowType::OutNull, 1)]);
    }

    #[test]
    fn remainder_of_nothing_is_rejected() {
        let mut decider = [Decider::Unset, Decider::Unset, Decider::Unset];
        decider[NetworkId::External as usize] = Decider::RemainIpBlock;
        let sensor = Sensor {
            id: 2,
            name: "bad".into(),
            class: "all".into(),
            fixed_network: [None, None],
            decider,
            filters: vec![],
            probe_ids: vec![],
        };
        let result = Classifier::new(registry_with(sensor), true, false, false);
        assert!(result.is_err());
    }

    #[test]
    fn internal_only_coerces_external_to_remainder() {
        let mut decider = [Decider::Unset, Decider::Unset, Decider::Unset];
        decider[NetworkId::Internal as usize] =
            Decider::IpBlock(crate::sensor::IpBlockSet(vec![(
                std::net::IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)),
                8,
            )]));
        let sensor = Sensor {
            id: 3,
            name: "coerced".into(),
            class: "all".into(),
            fixed_network: [None, None],
            decider,
            filters: vec![],
            probe_ids: vec![],
        };
        let classifier = Classifier::new(registry_with(sensor), true, false, false).unwrap();
        let sensor = classifier.registry().sensor(3).unwrap();
        assert_eq!(
            sensor.decider[NetworkId::External as usize],
            Decider::RemainIpBlock
        );
        assert_eq!(NUM_NETWORKS, 3);
    }
}
