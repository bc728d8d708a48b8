use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{RaceError, RaceResult};

/// Lifecycle of a heat's clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatus {
    NotStarted,
    Running,
    Stopped,
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RaceStatus::NotStarted => "not started",
            RaceStatus::Running => "running",
            RaceStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Race clock backed by the monotonic `Instant` source, so wall-clock
/// adjustments during a race never skew elapsed times.
#[derive(Debug, Clone)]
pub struct RaceClock {
    started_at: Option<Instant>,
    status: RaceStatus,
}

impl Default for RaceClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RaceClock {
    pub fn new() -> Self {
        Self {
            started_at: None,
            status: RaceStatus::NotStarted,
        }
    }

    pub fn status(&self) -> RaceStatus {
        self.status
    }

    pub fn start(&mut self) -> RaceResult<()> {
        if self.status == RaceStatus::Running {
            return Err(RaceError::invalid_state("race is already running"));
        }
        self.started_at = Some(Instant::now());
        self.status = RaceStatus::Running;
        Ok(())
    }

    /// Put a clock back into the running state as if it had been started
    /// `already_elapsed` ago. Used when reopening an interrupted heat.
    pub fn resume(&mut self, already_elapsed: Duration) -> RaceResult<()> {
        if self.status == RaceStatus::Running {
            return Err(RaceError::invalid_state("race is already running"));
        }
        let now = Instant::now();
        self.started_at = Some(now.checked_sub(already_elapsed).unwrap_or(now));
        self.status = RaceStatus::Running;
        Ok(())
    }

    pub fn stop(&mut self) -> RaceResult<()> {
        if self.status != RaceStatus::Running {
            return Err(RaceError::invalid_state(format!(
                "cannot stop: race is {}",
                self.status
            )));
        }
        self.status = RaceStatus::Stopped;
        Ok(())
    }

    /// Milliseconds since start
    pub fn elapsed(&self) -> RaceResult<u64> {
        match (self.status, self.started_at) {
            (RaceStatus::Running, Some(start)) => Ok(start.elapsed().as_millis() as u64),
            _ => Err(RaceError::invalid_state(format!(
                "no elapsed time: race is {}",
                self.status
            ))),
        }
    }
}
