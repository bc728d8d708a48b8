pub mod commands;
pub mod race_engine;

pub use commands::{Command, CommandOutput, RfidSummary};
pub use race_engine::RaceEngine;
