//! Individual and team standings.
//!
//! Everything here is a pure function of a results snapshot and the runner
//! registry: nothing is cached or written back, so standings can be
//! recomputed at any time (after a correction, for a reprint) and always
//! come out the same for the same inputs.

pub mod config;
pub mod individual;
pub mod team;

pub use config::{ScoringConfig, TieBreak, DEFAULT_DISPLACERS, DEFAULT_SCORERS};
pub use individual::{individual_standings, IndividualStanding};
pub use team::{team_standings, TeamScore, TeamStanding};
