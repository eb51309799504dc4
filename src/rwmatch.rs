//! The `rwmatch` temporal join: pair records from two sorted streams on a
//! relate-field equality plus a time-window policy, and stamp the matched
//! pair's `next_hop` with a monotonically increasing match id.
//!
//! The legacy join is a hand-rolled `for(;;)` with several `break`s; this is
//! re-architected as a named, table-driven state machine (§4.G, §9).

use crate::record::FlowRecord;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelateField {
    SrcAddr,
    DstAddr,
    SrcPort,
    DstPort,
    Protocol,
    Packets,
    Bytes,
    InitFlags,
    RestFlags,
    TcpState,
    SensorId,
    InputSnmp,
    OutputSnmp,
    FlowtypeId,
    Application,
    IcmpType,
    IcmpCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelatePair(pub RelateField, pub RelateField);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaPolicy {
    Absolute,
    Relative,
    Infinite,
}

#[derive(Debug)]
pub enum Error {
    InvalidRelate(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRelate(reason) => write!(f, "invalid relate configuration: {reason}"),
        }
    }
}

impl std::error::Error for Error {}

pub struct MatchConfig {
    relate: Vec<RelatePair>,
    time_delta_ms: u32,
    delta: DeltaPolicy,
    symmetric: bool,
    unmatched_query: bool,
    unmatched_response: bool,
}

impl MatchConfig {
    pub fn new(
        relate: Vec<RelatePair>,
        time_delta_ms: u32,
        delta: DeltaPolicy,
        symmetric: bool,
        unmatched_query: bool,
        unmatched_response: bool,
    ) -> Result<Self, Error> {
        if relate.is_empty() {
            return Err(Error::InvalidRelate("relate list must be non-empty".into()));
        }
        Ok(MatchConfig {
            relate,
            time_delta_ms,
            delta,
            symmetric,
            unmatched_query,
            unmatched_response,
        })
    }
}

fn field_value(rec: &FlowRecord, field: RelateField) -> u128 {
    match field {
        RelateField::SrcAddr => addr_key(rec.src_addr),
        RelateField::DstAddr => addr_key(rec.dst_addr),
        RelateField::SrcPort => rec.src_port as u128,
        RelateField::DstPort => rec.dst_port as u128,
        RelateField::Protocol => rec.protocol as u128,
        RelateField::Packets => rec.packets as u128,
        RelateField::Bytes => rec.bytes as u128,
        RelateField::InitFlags => rec.init_flags as u128,
        RelateField::RestFlags => rec.rest_flags as u128,
        RelateField::TcpState => rec.tcp_state.bits() as u128,
        RelateField::SensorId => rec.sensor_id as u128,
        RelateField::InputSnmp => rec.input_snmp as u128,
        RelateField::OutputSnmp => rec.output_snmp as u128,
        RelateField::FlowtypeId => rec.flowtype_id as u128,
        RelateField::Application => rec.application as u128,
        RelateField::IcmpType => rec.icmp_type() as u128,
        RelateField::IcmpCode => rec.icmp_code() as u128,
    }
}

fn addr_key(addr: crate::record::FlowAddr) -> u128 {
    use crate::record::FlowAddr;
    match addr {
        FlowAddr::V4(a) => u32::from(a) as u128,
        FlowAddr::V6(a) => u128::from(a),
    }
}

fn relate_matches(cfg: &MatchConfig, q: &FlowRecord, r: &FlowRecord) -> bool {
    cfg.relate
        .iter()
        .all(|pair| field_value(q, pair.0) == field_value(r, pair.1))
}

/// True iff `rec` looks like the client side of a TCP/UDP conversation
/// (dport<1024, sport>=1024), used to break a stime tie when picking the
/// match's base (§4.G).
fn looks_like_base(rec: &FlowRecord) -> bool {
    matches!(rec.protocol, 6 | 17) && rec.dst_port < 1024 && rec.src_port >= 1024
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Query,
    Response,
}

struct Cursor<I: Iterator<Item = FlowRecord>> {
    iter: I,
    head: Option<FlowRecord>,
}

impl<I: Iterator<Item = FlowRecord>> Cursor<I> {
    fn new(mut iter: I) -> Self {
        let head = iter.next();
        Cursor { iter, head }
    }

    fn advance(&mut self) -> Option<FlowRecord> {
        let taken = self.head.take();
        self.head = self.iter.next();
        taken
    }
}

/// Named states from §4.G's diagram: `ReadBoth` looks for a fresh candidate
/// pair, `Establish` fixes the base record once fields/time criteria agree,
/// `Extend` keeps pulling records that match the base within the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadBoth,
    Establish,
    Extend,
}

/// Drives `query`/`response` (each already sorted by `stime`) to completion,
/// calling `out_query`/`out_response` once per consumed record with
/// `next_hop` overwritten to carry the packed match id (top octet `0x00` for
/// query-sourced records, `0xFF` for response-sourced).
pub fn run(
    query: impl Iterator<Item = FlowRecord>,
    response: impl Iterator<Item = FlowRecord>,
    cfg: &MatchConfig,
    out_query: &mut impl FnMut(FlowRecord),
    out_response: &mut impl FnMut(FlowRecord),
) {
    let mut q = Cursor::new(query);
    let mut r = Cursor::new(response);
    let mut next_match_id: u32 = 1;
    let mut state = State::ReadBoth;

    // Active match bookkeeping, valid only while state != ReadBoth.
    let mut base_side = Side::Query;
    let mut base: Option<FlowRecord> = None;
    let mut match_id: u32 = 0;
    let mut max_etime_ms: u64 = 0;

    loop {
        match state {
            State::ReadBoth => {
                let (Some(qh), Some(rh)) = (q.head, r.head) else {
                    break;
                };
                if relate_matches(cfg, &qh, &rh) && window_ok(cfg, &qh, &rh) {
                    state = State::Establish;
                } else if qh.stime_ms <= rh.stime_ms {
                    emit_unmatched(cfg, Side::Query, q.advance(), out_query, out_response);
                } else {
                    emit_unmatched(cfg, Side::Response, r.advance(), out_query, out_response);
                }
            }
            State::Establish => {
                let qh = q.head.unwrap();
                let rh = r.head.unwrap();
                base_side = if qh.stime_ms == rh.stime_ms {
                    if looks_like_base(&qh) {
                        Side::Query
                    } else if looks_like_base(&rh) {
                        Side::Response
                    } else {
                        Side::Query
                    }
                } else if qh.stime_ms < rh.stime_ms {
                    Side::Query
                } else {
                    Side::Response
                };
                match_id = next_match_id;
                next_match_id += 1;
                log::debug!("establishing match {match_id} with base side {base_side:?}");

                let qrec = q.advance().unwrap();
                let rrec = r.advance().unwrap();
                max_etime_ms = qrec.etime_ms().max(rrec.etime_ms());
                base = Some(if base_side == Side::Query { qrec } else { rrec });
                stamp_and_emit(Side::Query, qrec, match_id, out_query);
                stamp_and_emit(Side::Response, rrec, match_id, out_response);
                state = State::Extend;
            }
            State::Extend => {
                let base_rec = base.expect("Extend requires an established base");
                let q_ok = q.head.is_some_and(|h| {
                    relate_matches_base(cfg, base_side, &base_rec, Side::Query, &h)
                        && within_window(cfg, &base_rec, &h, max_etime_ms)
                });
                let r_ok = r.head.is_some_and(|h| {
                    relate_matches_base(cfg, base_side, &base_rec, Side::Response, &h)
                        && within_window(cfg, &base_rec, &h, max_etime_ms)
                });

                if !q_ok && !r_ok {
                    base = None;
                    state = State::ReadBoth;
                    continue;
                }

                let take_query = match (q_ok, r_ok) {
                    (true, false) => true,
                    (false, true) => false,
                    (true, true) => {
                        let qt = q.head.unwrap().stime_ms;
                        let rt = r.head.unwrap().stime_ms;
                        if qt == rt {
                            base_side == Side::Query
                        } else {
                            qt < rt
                        }
                    }
                    (false, false) => unreachable!(),
                };

                if take_query {
                    let rec = q.advance().unwrap();
                    max_etime_ms = max_etime_ms.max(rec.etime_ms());
                    stamp_and_emit(Side::Query, rec, match_id, out_query);
                } else {
                    let rec = r.advance().unwrap();
                    max_etime_ms = max_etime_ms.max(rec.etime_ms());
                    stamp_and_emit(Side::Response, rec, match_id, out_response);
                }
            }
        }
    }

    // Drain whichever stream still has records, honoring the unmatched flags.
    while let Some(rec) = q.advance() {
        emit_unmatched(cfg, Side::Query, Some(rec), out_query, out_response);
    }
    while let Some(rec) = r.advance() {
        emit_unmatched(cfg, Side::Response, Some(rec), out_query, out_response);
    }
}

fn window_ok(cfg: &MatchConfig, q: &FlowRecord, r: &FlowRecord) -> bool {
    let forward = r.stime_ms >= q.stime_ms && r.stime_ms <= q.etime_ms() + cfg.time_delta_ms as u64;
    if !cfg.symmetric {
        return forward;
    }
    let backward =
        q.stime_ms >= r.stime_ms && q.stime_ms <= r.etime_ms() + cfg.time_delta_ms as u64;
    forward && backward
}

fn relate_matches_base(
    cfg: &MatchConfig,
    base_side: Side,
    base: &FlowRecord,
    candidate_side: Side,
    candidate: &FlowRecord,
) -> bool {
    cfg.relate.iter().all(|pair| {
        let base_field = if base_side == Side::Query {
            pair.0
        } else {
            pair.1
        };
        let cand_field = if candidate_side == Side::Query {
            pair.0
        } else {
            pair.1
        };
        field_value(base, base_field) == field_value(candidate, cand_field)
    })
}

fn within_window(
    cfg: &MatchConfig,
    base: &FlowRecord,
    candidate: &FlowRecord,
    max_etime_ms: u64,
) -> bool {
    match cfg.delta {
        DeltaPolicy::Absolute => candidate.stime_ms <= base.etime_ms() + cfg.time_delta_ms as u64,
        DeltaPolicy::Relative => candidate.stime_ms <= max_etime_ms + cfg.time_delta_ms as u64,
        DeltaPolicy::Infinite => true,
    }
}

fn stamp_and_emit(
    side: Side,
    mut rec: FlowRecord,
    match_id: u32,
    out: &mut impl FnMut(FlowRecord),
) {
    let top_octet: u32 = match side {
        Side::Query => 0x00,
        Side::Response => 0xFF,
    };
    let packed = (top_octet << 24) | (match_id & 0x00FF_FFFF);
    rec.next_hop = crate::record::FlowAddr::V4(std::net::Ipv4Addr::from(packed));
    out(rec);
}

fn emit_unmatched(
    cfg: &MatchConfig,
    side: Side,
    rec: Option<FlowRecord>,
    out_query: &mut impl FnMut(FlowRecord),
    out_response: &mut impl FnMut(FlowRecord),
) {
    let Some(mut rec) = rec else { return };
    let wanted = match side {
        Side::Query => cfg.unmatched_query,
        Side::Response => cfg.unmatched_response,
    };
    if !wanted {
        return;
    }
    rec.next_hop = crate::record::FlowAddr::V4(std::net::Ipv4Addr::UNSPECIFIED);
    match side {
        Side::Query => out_query(rec),
        Side::Response => out_response(rec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FlowAddr, TcpState};
    use std::net::Ipv4Addr;

    fn rec(
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
    fn scenario_5_establishes_match_one() {
        let q1 = rec(1, 2, 33000, 80, 1000, 500);
        let r1 = rec(2, 1, 80, 33000, 1200, 400);
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
        run(
            vec![q1].into_iter(),
            vec![r1].into_iter(),
            &cfg,
            &mut |r| out_q.push(r),
            &mut |r| out_r.push(r),
        );

        assert_eq!(out_q.len(), 1);
        assert_eq!(out_r.len(), 1);
        assert_eq!(out_q[0].next_hop, FlowAddr::V4(Ipv4Addr::from(0x0000_0001)));
        assert_eq!(out_r[0].next_hop, FlowAddr::V4(Ipv4Addr::from(0xFF00_0001)));
    }

    #[test]
    fn scenario_6_tied_stime_picks_query_as_base() {
        let q1 = rec(1, 2, 40000, 80, 1000, 500);
        let r1 = rec(2, 1, 80, 40000, 1000, 500);
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
        run(
            vec![q1].into_iter(),
            vec![r1].into_iter(),
            &cfg,
            &mut |r| out_q.push(r),
            &mut |r| out_r.push(r),
        );

        assert_eq!(out_q[0].next_hop, FlowAddr::V4(Ipv4Addr::from(0x0000_0001)));
    }

    /// When the base is the response side, an exact stime tie during
    /// `Extend` must take the next record from the response stream, not
    /// unconditionally from the query stream (§4.G: "from the base's
    /// stream").
    #[test]
    fn extend_tie_break_follows_base_side() {
        // R1 looks like the client leg (dport<1024, sport>=1024), Q1 doesn't,
        // so the tie at establish time picks the response as base.
        let q1 = rec(1, 2, 80, 40000, 1000, 500);
        let r1 = rec(2, 1, 40000, 80, 1000, 500);
        // Continuation records on each stream, tied on stime, both within
        // the established match's window.
        let q2 = rec(1, 2, 80, 40000, 1400, 50);
        let r2 = rec(2, 1, 40000, 80, 1400, 50);
        let cfg = MatchConfig::new(
            standard_relate(),
            0,
            DeltaPolicy::Absolute,
            false,
            false,
            false,
        )
        .unwrap();

        let order = std::cell::RefCell::new(vec![]);
        run(
            vec![q1, q2].into_iter(),
            vec![r1, r2].into_iter(),
            &cfg,
            &mut |r| order.borrow_mut().push(('Q', r.src_port)),
            &mut |r| order.borrow_mut().push(('R', r.src_port)),
        );

        // The base side (response) must be drained before the query's tied
        // continuation record.
        let order = order.into_inner();
        let r_positions: Vec<_> = order
            .iter()
            .enumerate()
            .filter(|&(_, (s, _))| s == &'R')
            .map(|(i, _)| i)
            .collect();
        let q_positions: Vec<_> = order
            .iter()
            .enumerate()
            .filter(|&(_, (s, _))| s == &'Q')
            .map(|(i, _)| i)
            .collect();
        assert_eq!(r_positions.len(), 2);
        assert_eq!(q_positions.len(), 2);
        // Second R record (the tied continuation) is emitted before the
        // second Q record (also tied) since the base side is Response.
        assert!(r_positions[1] < q_positions[1]);
    }

    #[test]
    fn match_ids_increase_monotonically() {
        let q = vec![rec(1, 2, 1000, 80, 0, 10), rec(3, 4, 1000, 80, 100, 10)];
        let r = vec![rec(2, 1, 80, 1000, 0, 10), rec(4, 3, 80, 1000, 100, 10)];
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
        run(
            q.into_iter(),
            r.into_iter(),
            &cfg,
            &mut |rec| out_q.push(rec),
            &mut |rec| out_r.push(rec),
        );

        let ids: Vec<u32> = out_q
            .iter()
            .map(|r| match r.next_hop {
                FlowAddr::V4(a) => u32::from(a) & 0x00FF_FFFF,
                _ => 0,
            })
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn unmatched_query_written_with_zero_match_id_only_when_opted_in() {
        let q1 = rec(9, 9, 1, 2, 0, 10);
        let cfg = MatchConfig::new(
            standard_relate(),
            0,
            DeltaPolicy::Absolute,
            false,
            true,
            false,
        )
        .unwrap();

        let mut out_q = vec![];
        let mut out_r = vec![];
        run(
            vec![q1].into_iter(),
            std::iter::empty(),
            &cfg,
            &mut |r| out_q.push(r),
            &mut |r| out_r.push(r),
        );

        assert_eq!(out_q.len(), 1);
        assert_eq!(out_q[0].next_hop, FlowAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn empty_relate_list_is_rejected() {
        let result = MatchConfig::new(vec![], 0, DeltaPolicy::Absolute, false, false, false);
        assert!(result.is_err());
    }
}
