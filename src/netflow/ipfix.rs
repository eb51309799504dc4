//! # IPFIX (IP Flow Information Export)
//!
//! References:
//! - <https://www.ietf.org/rfc/rfc7011.txt>

use crate::netflow::ipfix_lookup::*;
use crate::netflow::{NetflowByteParserVariable, NetflowPacket, ParsedNetflow};

use Nom;
use nom::Err as NomErr;
use nom::IResult;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::{be_u8, be_u32, be_u128};
use nom_derive::*;
use serde::Serialize;

use log::error;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

const TEMPLATE_ID: u16 = 2;
const OPTIONS_TEMPLATE_ID: u16 = 3;
const SET_MIN_RANGE: u16 = 255;
const ENTERPRISE_BIT: u16 = 0x8000;

type TemplateId = u16;

#[derive(Default, Debug)]
pub struct IPFixParser {
    pub templates: HashMap<TemplateId, Template>,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Nom)]
#[nom(ExtraArgs(parser: &mut IPFixParser))]
pub struct IPFix {
    /// IPFIX Header
    pub header: Header,
    /// Sets, parsed until the header-declared length is exhausted.
    #[nom(Parse = "{ |i| parse_sets(i, &header, parser) }")]
    pub flowsets: Vec<FlowSet>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Nom)]
pub struct Header {
    /// Version of IPFIX exported in this message; always 10
    pub version: u16,
    /// Total length of the IPFIX message, including this header, in bytes
    pub length: u16,
    /// Seconds since 0000 UTC 1970 at which the message was exported
    #[nom(Map = "|i| Duration::from_secs(i.into())", Parse = "be_u32")]
    pub export_time: Duration,
    /// Incremental sequence counter of all IPFIX records sent by this exporter
    pub sequence_number: u32,
    /// A 32-bit id identifying the Observation Domain
    pub observation_domain_id: u32,
}

fn parse_sets<'a>(
    mut i: &'a [u8],
    header: &Header,
    parser: &mut IPFixParser,
) -> IResult<&'a [u8], Vec<FlowSet>> {
    let mut total_left = header.length.saturating_sub(16) as usize;
    let mut sets = vec![];
    while total_left > 0 && !i.is_empty() {
        let before = i.len();
        let (remaining, set) = FlowSet::parse(i, parser)?;
        let consumed = before.saturating_sub(remaining.len());
        total_left = total_left.saturating_sub(consumed);
        i = remaining;
        sets.push(set);
        if consumed == 0 {
            break;
        }
    }
    Ok((i, sets))
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Nom)]
#[nom(ExtraArgs(parser: &mut IPFixParser))]
pub struct FlowSet {
    /// The Set ID, either a reserved template/options-template id or a data set's template id
    pub set_id: u16,
    /// Total length of this set, in bytes, including the set header
    pub length: u16,
    /// Template records
    #[nom(
        Cond = "set_id == TEMPLATE_ID",
        Parse = "{ |i| parse_templates(i, length) }",
        PostExec = "for t in template.iter().flatten() { parser.templates.insert(t.template_id, t.clone()); }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<Vec<Template>>,
    /// Options template records; recorded for round-trip purposes but not consumed by flow records
    #[nom(
        Cond = "set_id == OPTIONS_TEMPLATE_ID",
        Parse = "{ |i| { let take = (length as usize).saturating_sub(4); let (i, v): (_, &[u8]) = nom::bytes::complete::take(take)(i)?; Ok((i, v.to_vec())) } }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options_template_raw: Option<Vec<u8>>,
    /// Data records, present once the referenced template has been learned
    #[nom(
        Cond = "set_id > SET_MIN_RANGE && parser.templates.get(&set_id).is_some()",
        Parse = "{ |i| Data::parse(i, length, parser.templates.clone(), set_id) }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Data>,
}

fn parse_templates(i: &[u8], set_length: u16) -> IResult<&[u8], Vec<Template>> {
    let mut remaining = i;
    let mut left = (set_length as usize).saturating_sub(4);
    let mut templates = vec![];
    while left >= 4 {
        let before = remaining.len();
        let (rest, template) = Template::parse(remaining)?;
        let consumed = before.saturating_sub(rest.len());
        left = left.saturating_sub(consumed);
        remaining = rest;
        templates.push(template);
    }
    Ok((remaining, templates))
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Nom)]
pub struct Template {
    /// Template ID, locally unique to the exporter, >= 256
    pub template_id: u16,
    /// Number of fields in this template
    pub field_count: u16,
    /// Field specifiers
    #[nom(Count = "field_count", Parse = "TemplateField::parse")]
    pub fields: Vec<TemplateField>,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Nom)]
pub struct TemplateField {
    pub field_type_number: u16,
    pub field_length: u16,
    #[nom(Cond = "field_type_number & ENTERPRISE_BIT != 0", Parse = "be_u32")]
    pub enterprise_number: Option<u32>,
    #[nom(Value(IPFixField::from_type_number(
        field_type_number & !ENTERPRISE_BIT,
        enterprise_number
    )))]
    pub field_type: IPFixField,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct Data {
    pub data_fields: Vec<DataField>,
}

impl Data {
    fn parse(
        i: &[u8],
        set_length: u16,
        templates: HashMap<TemplateId, Template>,
        set_id: u16,
    ) -> IResult<&[u8], Data> {
        let template = templates.get(&set_id).ok_or_else(|| {
            error!("Could not fetch any ipfix templates!");
            NomErr::Error(NomError::new(i, ErrorKind::Fail))
        })?;

        let record_len: usize = template
            .fields
            .iter()
            .map(|f| f.field_length as usize)
            .sum();
        let mut left = (set_length as usize).saturating_sub(4);
        let mut remaining = i;
        let mut data_fields = vec![];
        while record_len > 0 && left >= record_len {
            for field in template.fields.iter() {
                let (rest, data_field) = DataField::parse(remaining, field.clone())?;
                remaining = rest;
                data_fields.push(data_field);
            }
            left = left.saturating_sub(record_len);
        }
        Ok((remaining, Data { data_fields }))
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Nom)]
#[nom(ExtraArgs(field: TemplateField))]
pub struct DataField {
    #[nom(Value(field.field_type))]
    pub field_type: IPFixField,

    #[nom(
        Cond = "field.field_type == IPFixField::Iana(IANAIPFixField::SourceIpv4address)
            || field.field_type == IPFixField::Iana(IANAIPFixField::DestinationIpv4address)
            || field.field_type == IPFixField::Iana(IANAIPFixField::IpNextHopIpv4address)",
        Map = "Ipv4Addr::from",
        Parse = "be_u32"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_addr: Option<Ipv4Addr>,

    #[nom(
        Cond = "field.field_type == IPFixField::Iana(IANAIPFixField::SourceIpv6address)
            || field.field_type == IPFixField::Iana(IANAIPFixField::DestinationIpv6address)
            || field.field_type == IPFixField::Iana(IANAIPFixField::IpNextHopIpv6address)",
        Map = "Ipv6Addr::from",
        Parse = "be_u128"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_addr: Option<Ipv6Addr>,

    #[nom(
        Cond = "field.field_type == IPFixField::Iana(IANAIPFixField::SourceMacaddress)
            || field.field_type == IPFixField::Iana(IANAIPFixField::DestinationMacaddress)",
        Map = "|i: &[u8]| i.to_vec()",
        Take = "6"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_addr: Option<Vec<u8>>,

    #[nom(
        Cond = "field.field_type == IPFixField::Iana(IANAIPFixField::SourceTransportPort)
            || field.field_type == IPFixField::Iana(IANAIPFixField::DestinationTransportPort)"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[nom(Cond = "field.field_type == IPFixField::Iana(IANAIPFixField::ProtocolIdentifier)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_identifier: Option<u8>,

    #[nom(
        Cond = "field.field_type == IPFixField::Iana(IANAIPFixField::TcpControlBits)",
        Parse = "be_u8"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_control_bits: Option<u8>,

    #[nom(
        Cond = "field.field_type == IPFixField::Iana(IANAIPFixField::OctetDeltaCount)
            || field.field_type == IPFixField::Iana(IANAIPFixField::PacketDeltaCount)
            || field.field_type == IPFixField::Iana(IANAIPFixField::FlowStartSysUpTime)
            || field.field_type == IPFixField::Iana(IANAIPFixField::FlowEndSysUpTime)",
        Map = "|i: &[u8]| i.to_vec()",
        Take = "field.field_length"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter: Option<Vec<u8>>,

    #[nom(
        Cond = "field.field_type == IPFixField::Iana(IANAIPFixField::IngressInterface)
            || field.field_type == IPFixField::Iana(IANAIPFixField::EgressInterface)",
        Map = "|i: &[u8]| i.to_vec()",
        Take = "field.field_length"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<Vec<u8>>,

    #[nom(
        Cond = "matches!(field.field_type, IPFixField::Enterprise(..))
            || field.field_type == IPFixField::Iana(IANAIPFixField::Unknown)",
        Map = "|i: &[u8]| i.to_vec()",
        Take = "field.field_length"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<u8>>,
}

impl NetflowByteParserVariable for IPFixParser {
    /// Main IPFIX parse function.
    fn parse_bytes<'a>(
        &'a mut self,
        packet: &'a [u8],
    ) -> Result<ParsedNetflow, Box<dyn std::error::Error>> {
        let (remaining, ipfix_parsed) =
            IPFix::parse(packet, self).map_err(|_| "Could not parse ipfix packet".to_string())?;

        Ok(ParsedNetflow {
            remaining: remaining.to_vec(),
            packet: NetflowPacket::IPFix(ipfix_parsed),
        })
    }
}
