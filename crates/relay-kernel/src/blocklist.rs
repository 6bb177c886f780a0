//! Network-level blocklist records.

use serde::{Deserialize, Serialize};

/// What a blocklist entry matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Client IP address.
    Ip,
    /// Host header domain.
    Domain,
}

impl BlockKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" => Some(BlockKind::Ip),
            "domain" => Some(BlockKind::Domain),
            _ => None,
        }
    }
}

/// One persisted blocklist row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlocklistEntry {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub value: String,
}

impl BlocklistEntry {
    pub fn ip(value: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Ip,
            value: value.into(),
        }
    }

    pub fn domain(value: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Domain,
            value: value.into(),
        }
    }
}
