//! `SiteConfig`: a hand-rolled parser for the `sensor.conf`-equivalent
//! `key = value` / block-structured text format that builds a
//! [`crate::sensor::Registry`].
//!
//! Structured parsing is the teacher's norm (`nom`/`nom_derive`), but a
//! line-oriented config grammar with nested blocks isn't expressible as a
//! derive, so it's written by hand with the same typed-error, no-panics
//! contract as everything else.

use crate::flowtype::NetworkId;
use crate::probe::{Probe, ProbeQuirks, ProbeType};
use crate::sensor::{Decider, InterfaceSet, Registry, Sensor};

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Syntax { line: usize, reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Syntax { line, reason } => write!(f, "line {line}: {reason}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// A config block: `probe <name> { key = value ... }` or
/// `sensor <name> { key = value ... }`.
struct Block {
    kind: String,
    name: String,
    fields: Vec<(String, String)>,
}

fn parse_blocks(text: &str) -> Result<Vec<Block>, Error> {
    let mut blocks = vec![];
    let mut current: Option<Block> = None;

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_suffix('{') {
            let mut parts = rest.split_whitespace();
            let kind = parts.next().ok_or_else(|| Error::Syntax {
                line: lineno + 1,
                reason: "expected block kind before '{'".into(),
            })?;
            let name = parts.next().unwrap_or("").to_string();
            current = Some(Block {
                kind: kind.to_string(),
                name,
                fields: vec![],
            });
            continue;
        }

        if line == "}" {
            let block = current.take().ok_or_else(|| Error::Syntax {
                line: lineno + 1,
                reason: "unmatched '}'".into(),
            })?;
            blocks.push(block);
            continue;
        }

        let Some(block) = current.as_mut() else {
            return Err(Error::Syntax {
                line: lineno + 1,
                reason: "key = value outside any block".into(),
            });
        };
        let (key, value) = line.split_once('=').ok_or_else(|| Error::Syntax {
            line: lineno + 1,
            reason: "expected 'key = value'".into(),
        })?;
        block
            .fields
            .push((key.trim().to_string(), value.trim().to_string()));
    }

    if current.is_some() {
        return Err(Error::Syntax {
            line: text.lines().count(),
            reason: "unclosed block".into(),
        });
    }

    Ok(blocks)
}

fn field<'a>(block: &'a Block, key: &str) -> Option<&'a str> {
    block
        .fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn parse_probe_type(s: &str) -> Option<ProbeType> {
    match s {
        "netflow-v5" => Some(ProbeType::NetflowV5),
        "netflow-v9" => Some(ProbeType::NetflowV9),
        "ipfix" => Some(ProbeType::IPFix),
        "sflow" => Some(ProbeType::Sflow),
        "silk" => Some(ProbeType::Silk),
        _ => None,
    }
}

fn parse_interface_set(value: &str) -> InterfaceSet {
    InterfaceSet(
        value
            .split(',')
            .filter_map(|s| s.trim().parse::<u32>().ok())
            .collect::<HashSet<_>>(),
    )
}

fn parse_decider(block: &Block, prefix: &str) -> Decider {
    match field(block, &format!("{prefix}-interface")) {
        Some("remainder") => return Decider::RemainInterface,
        Some(v) => return Decider::Interface(parse_interface_set(v)),
        None => {}
    }
    Decider::Unset
}

#[derive(Default)]
pub struct SiteConfig {
    pub registry: Registry,
}

impl SiteConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_str(&fs::read_to_string(path)?)
    }

    pub fn from_str(text: &str) -> Result<Self, Error> {
        let blocks = parse_blocks(text)?;
        let mut registry = Registry::default();

        for (idx, block) in blocks.iter().enumerate() {
            match block.kind.as_str() {
                "probe" => {
                    let kind =
                        field(block, "type")
                            .and_then(parse_probe_type)
                            .ok_or_else(|| Error::Syntax {
                                line: 0,
                                reason: format!("probe {} missing or unknown type", block.name),
                            })?;
                    let mut quirks = ProbeQuirks::empty();
                    if field(block, "zero-packets") == Some("yes") {
                        quirks |= ProbeQuirks::ZERO_PACKETS;
                    }
                    if field(block, "fw-event") == Some("yes") {
                        quirks |= ProbeQuirks::FW_EVENT;
                    }
                    registry.probes.push(Probe {
                        id: idx as u32,
                        name: block.name.clone(),
                        kind,
                        quirks,
                        sensor_ids: vec![],
                    });
                }
                "sensor" => {
                    let mut decider = [Decider::Unset, Decider::Unset, Decider::Unset];
                    decider[NetworkId::Null as usize] = parse_decider(block, "null");
                    decider[NetworkId::External as usize] = parse_decider(block, "external");
                    decider[NetworkId::Internal as usize] = parse_decider(block, "internal");

                    let probe_ids: Vec<u32> = field(block, "probes")
                        .unwrap_or("")
                        .split(',')
                        .filter_map(|name| {
                            let name = name.trim();
                            registry
                                .probes
                                .iter()
                                .find(|p| p.name == name)
                                .map(|p| p.id)
                        })
                        .collect();

                    let sensor_id = registry.sensors.len() as u16;
                    for &pid in &probe_ids {
                        if let Some(probe) = registry.probes.iter_mut().find(|p| p.id == pid) {
                            probe.sensor_ids.push(sensor_id);
                        }
                    }

                    registry.sensors.push(Sensor {
                        id: sensor_id,
                        name: block.name.clone(),
                        class: field(block, "class").unwrap_or("all").to_string(),
                        fixed_network: [None, None],
                        decider,
                        filters: vec![],
                        probe_ids,
                    });
                }
                other => {
                    return Err(Error::Syntax {
                        line: 0,
                        reason: format!("unknown block kind '{other}'"),
                    });
                }
            }
        }

        Ok(SiteConfig { registry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_probe_and_sensor_blocks() {
        let text = r#"
            # a probe collecting from the border router
            probe border {
                type = netflow-v5
            }

            sensor S0 {
                class = all
                probes = border
                external-interface = 1
                internal-interface = 2
                null-interface = 0
            }
        "#;

        let cfg = SiteConfig::from_str(text).unwrap();
        assert_eq!(cfg.registry.probes.len(), 1);
        assert_eq!(cfg.registry.sensors.len(), 1);
        assert_eq!(cfg.registry.probes[0].sensor_ids, vec![0]);
        assert_eq!(cfg.registry.sensors[0].class, "all");
    }

    #[test]
    fn unmatched_brace_is_a_syntax_error() {
        let text = "probe p {\n type = netflow-v5\n";
        assert!(matches!(
            SiteConfig::from_str(text),
            Err(Error::Syntax { .. })
        ));
    }

    #[test]
    fn unknown_probe_type_is_rejected() {
        let text = "probe p {\n type = not-a-real-protocol\n}\n";
        assert!(SiteConfig::from_str(text).is_err());
    }
}
