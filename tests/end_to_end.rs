//! End-to-end scenarios, against the public API only, using the literal
//! values given for each case.

use silk_flowpack::classifier::fw_event;
use silk_flowpack::rwmatch::{DeltaPolicy, MatchConfig, RelateField, RelatePair};
use silk_flowpack::sensor::InterfaceSet;
use silk_flowpack::{
    Classifier, Decider, FlowAddr, FlowRecord, FlowType, NetworkId, Probe, ProbeQuirks, ProbeType,
    Registry, Sensor, TcpState,
};

use std::collections::HashSet;
use std::net::Ipv4Addr;

fn web_sensor() -> Sensor {
    let mut decider = [Decider::Unset, Decider::Unset, Decider::Unset];
    decider[NetworkId::Null as usize] = Decider::Interface(InterfaceSet(HashSet::from([0])));
    decider[NetworkId::External as usize] = Decider::Interface(InterfaceSet(HashSet::from([1])));
    decider[NetworkId::Internal as usize] = Decider::Interface(InterfaceSet(HashSet::from([2])));
    Sensor {
        id: 7,
        name: "S7".into(),
        class: "all".into(),
        fixed_network: [None, None],
        decider,
        filters: vec![],
        probe_ids: vec![1],
    }
}

fn v5_probe(quirks: ProbeQuirks) -> Probe {
    Probe {
        id: 1,
        name: "p0".into(),
        kind: ProbeType::NetflowV5,
        quirks,
        sensor_ids: vec![7],
    }
}

fn registry() -> Registry {
    Registry {
        sensors: vec![web_sensor()],
        probes: vec![],
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
        tcp_state: TcpState::empty(),
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

#[test]
fn scenario_1_netflow_v5_in_web() {
    let classifier = Classifier::new(registry(), true, false, false).unwrap();
    let rec = base_record();

    let mut out = vec![];
    classifier
        .classify(&v5_probe(ProbeQuirks::empty()), &rec, &mut out)
        .unwrap();

    assert_eq!(out, vec![(FlowType::InWeb, 7)]);
    let (format, _) = classifier.file_format_for(&v5_probe(ProbeQuirks::empty()), FlowType::InWeb);
    assert_eq!(format, silk_flowpack::classifier::FileFormat::NetflowV5Web);
}

#[test]
fn scenario_2_out_web() {
    let classifier = Classifier::new(registry(), true, false, false).unwrap();
    let mut rec = base_record();
    rec.src_port = 443;
    rec.dst_port = 34567;
    rec.input_snmp = 2;
    rec.output_snmp = 1;

    let mut out = vec![];
    classifier
        .classify(&v5_probe(ProbeQuirks::empty()), &rec, &mut out)
        .unwrap();

    assert_eq!(out, vec![(FlowType::OutWeb, 7)]);
}

#[test]
fn scenario_3_icmp_split_toggle() {
    let mut rec = base_record();
    rec.protocol = 1;
    rec.dst_port = 0x0300;

    let split_off = Classifier::new(registry(), true, false, false).unwrap();
    let mut out = vec![];
    split_off
        .classify(&v5_probe(ProbeQuirks::empty()), &rec, &mut out)
        .unwrap();
    assert_eq!(out, vec![(FlowType::In, 7)]);

    let split_on = Classifier::new(registry(), true, true, false).unwrap();
    out.clear();
    split_on
        .classify(&v5_probe(ProbeQuirks::empty()), &rec, &mut out)
        .unwrap();
    assert_eq!(out, vec![(FlowType::InIcmp, 7)]);
}

#[test]
fn scenario_4_firewall_event_coerces_to_out_null() {
    let classifier = Classifier::new(registry(), true, false, false).unwrap();
    let mut rec = base_record();
    rec.src_port = 443;
    rec.dst_port = 34567;
    rec.input_snmp = 2;
    rec.output_snmp = 1;
    rec.memo = fw_event::DENIED;

    let mut out = vec![];
    classifier
        .classify(&v5_probe(ProbeQuirks::FW_EVENT), &rec, &mut out)
        .unwrap();

    assert_eq!(out, vec![(FlowType::OutNull, 7)]);
}

fn tcp_record(
    sip: u8,
    dip: u8,
    sport: u16,
    dport: u16,
    stime_ms: u64,
    duration_ms: u32,
) -> FlowRecord {
    FlowRecord {
        src_addr: FlowAddr::V4(Ipv4Addr::new(10, 0, 0, sip)),
        dst_addr: FlowAddr::V4(Ipv4Addr::new(10, 0, 0, dip)),
        src_port: sport,
        dst_port: dport,
        protocol: 6,
        packets: 1,
        bytes: 100,
        init_flags: 0,
        rest_flags: 0,
        tcp_state: TcpState::empty(),
        application: 0,
        sensor_id: 0,
        flowtype_id: 0,
        input_snmp: 0,
        output_snmp: 0,
        next_hop: FlowAddr::V4(Ipv4Addr::UNSPECIFIED),
        stime_ms,
        duration_ms,
        memo: 0,
    }
}

fn standard_relate() -> Vec<RelatePair> {
    vec![
        RelatePair(RelateField::SrcAddr, RelateField::DstAddr),
        RelatePair(RelateField::DstAddr, RelateField::SrcAddr),
        RelatePair(RelateField::SrcPort, RelateField::DstPort),
        RelatePair(RelateField::DstPort, RelateField::SrcPort),
        RelatePair(RelateField::Protocol, RelateField::Protocol),
    ]
}

#[test]
fn scenario_5_rwmatch_establishes_match_one() {
    // Q1(sip=10.1, dip=10.2, sport=33000, dport=80, stime=1000, etime=1500)
    let q1 = tcp_record(1, 2, 33000, 80, 1000, 500);
    // R1(sip=10.2, dip=10.1, sport=80, dport=33000, stime=1200, etime=1600)
    let r1 = tcp_record(2, 1, 80, 33000, 1200, 400);
    let cfg = MatchConfig::new(
        standard_relate(),
        0,
        DeltaPolicy::Absolute,
        false,
        false,
        false,
    )
    .unwrap();

    let mut out_q = vec![];
    let mut out_r = vec![];
    silk_flowpack::rwmatch::run(
        vec![q1].into_iter(),
        vec![r1].into_iter(),
        &cfg,
        &mut |r| out_q.push(r),
        &mut |r| out_r.push(r),
    );

    assert_eq!(out_q[0].next_hop, FlowAddr::V4(Ipv4Addr::from(0x0000_0001)));
    assert_eq!(out_r[0].next_hop, FlowAddr::V4(Ipv4Addr::from(0xFF00_0001)));
}

#[test]
fn scenario_6_rwmatch_tied_stime_picks_query_as_base() {
    // Q1.dport=80 (< 1024, client), R1.sport=80, R1.dport=40000 (>= 1024):
    // R1 is the server-side leg, so the query record becomes the base.
    let q1 = tcp_record(1, 2, 40000, 80, 1000, 500);
    let r1 = tcp_record(2, 1, 80, 40000, 1000, 500);
    let cfg = MatchConfig::new(
        standard_relate(),
        0,
        DeltaPolicy::Absolute,
        false,
        false,
        false,
    )
    .unwrap();

    let mut out_q = vec![];
    let mut out_r = vec![];
    silk_flowpack::rwmatch::run(
        vec![q1].into_iter(),
        vec![r1].into_iter(),
        &cfg,
        &mut |r| out_q.push(r),
        &mut |r| out_r.push(r),
    );

    assert_eq!(out_q[0].next_hop, FlowAddr::V4(Ipv4Addr::from(0x0000_0001)));
}
