use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::scoring::ScoringConfig;

/// Poll interval used when `rfid.poll_interval` is absent
pub const DEFAULT_POLL_INTERVAL: &str = "250ms";
/// Reserved manual token that ends the race
pub const DEFAULT_STOP_TOKEN: &str = "exit";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding one sub-directory per heat (default: platform data dir)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub manual: ManualConfig,

    #[serde(default)]
    pub rfid: RfidConfig,

    #[serde(default)]
    pub scoring: Option<ScoringConfig>,

    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ManualConfig {
    /// Token that stops the race instead of recording a finish
    #[serde(default)]
    pub stop_token: Option<String>,
}

impl ManualConfig {
    pub fn stop_token(&self) -> &str {
        self.stop_token.as_deref().unwrap_or(DEFAULT_STOP_TOKEN)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RfidConfig {
    /// Append-only scan log written by the reader software; no watcher when unset
    #[serde(default)]
    pub scan_log: Option<PathBuf>,

    /// humantime duration, e.g. "250ms" or "1s"
    #[serde(default)]
    pub poll_interval: Option<String>,
}

impl RfidConfig {
    /// Parsed poll interval. Falls back to the default when the value does not parse;
    /// `validate_config` reports the bad value at startup.
    pub fn poll_interval(&self) -> Duration {
        let raw = self.poll_interval.as_deref().unwrap_or(DEFAULT_POLL_INTERVAL);
        humantime::parse_duration(raw).unwrap_or(Duration::from_millis(250))
    }
}

/// CSV import options.
///
/// Example YAML:
/// ```yaml
/// import:
///   aliases:
///     bib: ["Bib #", "number"]
///     rfid: ["chip"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    /// Extra header spellings per canonical field (bib, name, team, rfid)
    #[serde(default)]
    pub aliases: Option<HashMap<String, Vec<String>>>,
}
