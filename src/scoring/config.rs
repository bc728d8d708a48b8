use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SCORERS: usize = 5;
pub const DEFAULT_DISPLACERS: usize = 2;

/// How teams with equal scores are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Better-placed first displacer wins; a team without one loses the tie.
    /// Teams still level after that share the place.
    #[default]
    SixthRunner,
    /// Equal scores share the place, the next place is skipped
    Shared,
    /// Alphabetical by team name, places stay distinct
    TeamName,
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreak::SixthRunner => f.write_str("sixth_runner"),
            TieBreak::Shared => f.write_str("shared"),
            TieBreak::TeamName => f.write_str("team_name"),
        }
    }
}

/// Team scoring configuration.
///
/// Example YAML:
/// ```yaml
/// scoring:
///   scorers: 5
///   displacers: 2
///   tie_break: sixth_runner
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Finishers whose ranks are summed into the team score (default: 5)
    #[serde(default)]
    pub scorers: Option<usize>,

    /// Finishers after the scorers shown as displacers (default: 2)
    #[serde(default)]
    pub displacers: Option<usize>,

    #[serde(default)]
    pub tie_break: Option<TieBreak>,
}

impl ScoringConfig {
    pub fn scorers(&self) -> usize {
        self.scorers.unwrap_or(DEFAULT_SCORERS)
    }

    pub fn displacers(&self) -> usize {
        self.displacers.unwrap_or(DEFAULT_DISPLACERS)
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break.unwrap_or_default()
    }
}
