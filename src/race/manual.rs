use tracing::warn;

use super::recorder::FinishRecorder;
use crate::error::{RaceError, RaceResult};
use crate::results::{FinishRecord, FinishSource};

/// One interactive submission, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualToken {
    /// Empty token means a missed runner (bib 0)
    Finish(Option<u32>),
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManualOutcome {
    Recorded(FinishRecord),
    StopRequested,
}

/// Foreground path from keyed tokens to the recorder
#[derive(Debug, Clone)]
pub struct ManualInput {
    stop_token: String,
}

impl ManualInput {
    pub fn new(stop_token: impl Into<String>) -> Self {
        Self {
            stop_token: stop_token.into().trim().to_string(),
        }
    }

    pub fn stop_token(&self) -> &str {
        &self.stop_token
    }

    pub fn parse(&self, token: &str) -> RaceResult<ManualToken> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(ManualToken::Finish(None));
        }
        if token.eq_ignore_ascii_case(&self.stop_token) {
            return Ok(ManualToken::Stop);
        }
        if !token.chars().all(|c| c.is_ascii_digit()) {
            return Err(RaceError::validation(format!(
                "'{}' is not a bib number (type '{}' to stop)",
                token, self.stop_token
            )));
        }
        token
            .parse::<u32>()
            .map(|bib| ManualToken::Finish(Some(bib)))
            .map_err(|_| RaceError::validation(format!("bib '{}' is out of range", token)))
    }

    /// Parse and, for a finish, record it. A stop is only reported back;
    /// the owner of the session performs the transition.
    pub fn submit(&self, token: &str, recorder: &FinishRecorder) -> RaceResult<ManualOutcome> {
        match self.parse(token)? {
            ManualToken::Stop => Ok(ManualOutcome::StopRequested),
            ManualToken::Finish(bib) => {
                let record = recorder.record(bib, FinishSource::Manual)?;
                if record.is_unassigned() {
                    warn!(sequence = record.sequence, "unassigned finish recorded, correct it later");
                }
                Ok(ManualOutcome::Recorded(record))
            }
        }
    }
}
