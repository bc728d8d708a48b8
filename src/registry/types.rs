use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    pub bib: u32,
    pub name: String,
    pub team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfid: Option<String>,
}

/// Raw import row, already mapped onto canonical fields but not yet validated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerRow {
    pub line: usize,
    pub bib: String,
    pub name: String,
    pub team: String,
    pub rfid: Option<String>,
}
