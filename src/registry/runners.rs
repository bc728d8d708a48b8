use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::types::{Runner, RunnerRow};
use crate::error::RaceError;
use crate::results::UNASSIGNED_BIB;

/// Outcome of loading a batch of rows
#[derive(Debug, Default)]
pub struct ImportReport {
    pub loaded: usize,
    /// Rows that were skipped, with the reason; the rest of the import still applies
    pub warnings: Vec<RaceError>,
}

/// Runners of one heat, keyed by bib with a secondary RFID tag index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Runner>", into = "Vec<Runner>")]
pub struct RunnerRegistry {
    by_bib: BTreeMap<u32, Runner>,
    by_tag: HashMap<String, u32>,
}

impl From<Vec<Runner>> for RunnerRegistry {
    fn from(runners: Vec<Runner>) -> Self {
        let mut registry = RunnerRegistry::new();
        for runner in runners {
            // Snapshots were written from a consistent registry; first wins on any clash.
            let _ = registry.insert(runner);
        }
        registry
    }
}

impl From<RunnerRegistry> for Vec<Runner> {
    fn from(registry: RunnerRegistry) -> Self {
        registry.by_bib.into_values().collect()
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_ascii_uppercase()
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_bib.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_bib.is_empty()
    }

    pub fn get(&self, bib: u32) -> Option<&Runner> {
        self.by_bib.get(&bib)
    }

    /// Resolve a scanned RFID tag to its bib. Tags compare case-insensitively.
    pub fn resolve_tag(&self, tag: &str) -> Option<u32> {
        self.by_tag.get(&normalize_tag(tag)).copied()
    }

    /// Runners ordered by bib
    pub fn runners(&self) -> impl Iterator<Item = &Runner> {
        self.by_bib.values()
    }

    /// Runners ordered by team, then bib
    pub fn runners_by_team(&self) -> Vec<&Runner> {
        let mut runners: Vec<&Runner> = self.by_bib.values().collect();
        runners.sort_by(|a, b| a.team.cmp(&b.team).then(a.bib.cmp(&b.bib)));
        runners
    }

    /// Validate one import row into a runner
    pub fn validate_row(row: &RunnerRow) -> Result<Runner, RaceError> {
        let bib_str = row.bib.trim();
        let bib: u32 = bib_str.parse().map_err(|_| {
            RaceError::validation(format!("row {}: bib '{}' is not a number", row.line, bib_str))
        })?;
        if bib == UNASSIGNED_BIB {
            return Err(RaceError::validation(format!(
                "row {}: bib 0 is reserved for unassigned finishes",
                row.line
            )));
        }
        let name = row.name.trim();
        if name.is_empty() {
            return Err(RaceError::validation(format!("row {}: name is empty", row.line)));
        }
        let team = row.team.trim();
        if team.is_empty() {
            return Err(RaceError::validation(format!("row {}: team is empty", row.line)));
        }
        let rfid = row
            .rfid
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(Runner {
            bib,
            name: name.to_string(),
            team: team.to_string(),
            rfid,
        })
    }

    /// Add a runner unless its bib or tag is already taken
    pub fn insert(&mut self, runner: Runner) -> Result<(), RaceError> {
        if self.by_bib.contains_key(&runner.bib) {
            return Err(RaceError::validation(format!(
                "duplicate bib {} ({})",
                runner.bib, runner.name
            )));
        }
        if let Some(ref tag) = runner.rfid {
            let tag = normalize_tag(tag);
            if let Some(owner) = self.by_tag.get(&tag) {
                return Err(RaceError::validation(format!(
                    "RFID tag {} of bib {} already belongs to bib {}",
                    tag, runner.bib, owner
                )));
            }
            self.by_tag.insert(tag, runner.bib);
        }
        self.by_bib.insert(runner.bib, runner);
        Ok(())
    }

    /// Load rows; malformed or duplicate rows are skipped and reported, first occurrence wins.
    pub fn load<I>(&mut self, rows: I) -> ImportReport
    where
        I: IntoIterator<Item = RunnerRow>,
    {
        let mut report = ImportReport::default();
        for row in rows {
            match Self::validate_row(&row).and_then(|runner| self.insert(runner)) {
                Ok(()) => report.loaded += 1,
                Err(err) => report.warnings.push(err),
            }
        }
        report
    }
}
