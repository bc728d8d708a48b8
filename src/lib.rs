pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod output;
pub mod race;
pub mod registry;
pub mod results;
pub mod rfid;
pub mod scoring;
