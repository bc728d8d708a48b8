use serde::{Deserialize, Serialize};
use std::fmt;

/// Bib stored for a finish whose runner is not yet known
pub const UNASSIGNED_BIB: u32 = 0;

/// Which input produced a finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishSource {
    Manual,
    Rfid,
}

impl fmt::Display for FinishSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishSource::Manual => f.write_str("manual"),
            FinishSource::Rfid => f.write_str("rfid"),
        }
    }
}

/// One crossing of the finish line.
///
/// Only `bib` ever changes after creation, and only through a correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishRecord {
    pub sequence: u64,
    pub bib: u32,
    pub elapsed_ms: u64,
    pub heat: u32,
    pub source: FinishSource,
}

impl FinishRecord {
    pub fn is_unassigned(&self) -> bool {
        self.bib == UNASSIGNED_BIB
    }
}
