use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::clock::RaceStatus;

/// Identifies one timed race: calendar day plus heat number, shown as `YYYYMMDD-NN`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HeatId {
    pub date: NaiveDate,
    pub number: u32,
}

impl HeatId {
    pub fn new(date: NaiveDate, number: u32) -> Self {
        Self { date, number }
    }

    pub fn today(number: u32) -> Self {
        Self::new(Local::now().date_naive(), number)
    }
}

impl fmt::Display for HeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.date.format("%Y%m%d"), self.number)
    }
}

impl FromStr for HeatId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (date, number) = s
            .trim()
            .split_once('-')
            .with_context(|| format!("Invalid heat id '{}': expected YYYYMMDD-NN", s))?;
        let date = NaiveDate::parse_from_str(date, "%Y%m%d")
            .with_context(|| format!("Invalid heat date in '{}'", s))?;
        let number: u32 = number
            .parse()
            .with_context(|| format!("Invalid heat number in '{}'", s))?;
        if number == 0 {
            bail!("Heat numbers start at 1: '{}'", s);
        }
        Ok(Self { date, number })
    }
}

/// Persisted lifecycle of one heat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSession {
    pub version: u32,
    pub heat: HeatId,
    pub status: RaceStatus,
    /// Wall-clock start, for display and crash recovery only; timing uses the monotonic clock
    #[serde(default)]
    pub started_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Local>>,
}

impl RaceSession {
    pub fn new(heat: HeatId) -> Self {
        Self {
            version: 1,
            heat,
            status: RaceStatus::NotStarted,
            started_at: None,
            stopped_at: None,
        }
    }

    pub fn mark_started(&mut self) {
        self.status = RaceStatus::Running;
        self.started_at = Some(Local::now());
        self.stopped_at = None;
    }

    pub fn mark_stopped(&mut self) {
        self.status = RaceStatus::Stopped;
        self.stopped_at = Some(Local::now());
    }

    /// Wall-clock time since the recorded start, used to resume an interrupted heat
    pub fn wall_elapsed(&self) -> Option<std::time::Duration> {
        let started = self.started_at?;
        (Local::now() - started).to_std().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heat_id_display_and_parse() {
        let heat = HeatId::new(NaiveDate::from_ymd_opt(2025, 10, 4).unwrap(), 3);
        assert_eq!(heat.to_string(), "20251004-03");
        assert_eq!("20251004-03".parse::<HeatId>().unwrap(), heat);
    }

    #[test]
    fn test_heat_id_parse_errors() {
        assert!("20251004".parse::<HeatId>().is_err());
        assert!("2025-10-04".parse::<HeatId>().is_err());
        assert!("20251004-00".parse::<HeatId>().is_err());
        assert!("20251004-xx".parse::<HeatId>().is_err());
    }

    #[test]
    fn test_session_transitions() {
        let mut session = RaceSession::new(HeatId::today(1));
        assert_eq!(session.status, RaceStatus::NotStarted);
        assert!(session.wall_elapsed().is_none());

        session.mark_started();
        assert_eq!(session.status, RaceStatus::Running);
        assert!(session.wall_elapsed().is_some());

        session.mark_stopped();
        assert_eq!(session.status, RaceStatus::Stopped);
        assert!(session.stopped_at.is_some());
    }
}
