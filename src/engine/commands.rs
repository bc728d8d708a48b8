use serde::Serialize;
use std::path::PathBuf;

use crate::registry::Runner;
use crate::results::FinishRecord;
use crate::rfid::WatcherStats;
use crate::scoring::{IndividualStanding, TeamStanding};

/// Everything a front-end can ask of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartRace,
    /// A keyed manual token: a bib, an empty string for a missed runner, or the stop token
    Record(String),
    Stop,
    IndividualStandings,
    TeamStandings,
    /// Switch to heat `n` of today, or the next free heat when `None`
    ChangeHeat(Option<u32>),
    Correct { sequence: u64, bib: u32 },
    ImportRunners(PathBuf),
    ListRunners,
}

/// Structured result of a command; rendering is left to the front-end
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutput {
    Started {
        heat: String,
        rfid: bool,
    },
    Recorded {
        record: FinishRecord,
    },
    Stopped {
        heat: String,
        finishes: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        rfid: Option<RfidSummary>,
    },
    Individual {
        standings: Vec<IndividualStanding>,
    },
    Teams {
        standings: Vec<TeamStanding>,
    },
    HeatChanged {
        heat: String,
        runners: usize,
        finishes: usize,
    },
    Corrected {
        sequence: u64,
        previous_bib: u32,
        bib: u32,
    },
    Imported {
        loaded: usize,
        skipped: Vec<String>,
    },
    Runners {
        runners: Vec<Runner>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RfidSummary {
    pub recorded: u64,
    pub repeats: u64,
    pub unknown: u64,
    pub rejected: u64,
}

impl From<WatcherStats> for RfidSummary {
    fn from(stats: WatcherStats) -> Self {
        Self {
            recorded: stats.recorded,
            repeats: stats.repeats,
            unknown: stats.unknown,
            rejected: stats.rejected,
        }
    }
}
