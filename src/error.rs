use thiserror::Error;

/// Result type for race engine operations
pub type RaceResult<T> = Result<T, RaceError>;

/// Errors produced by the timing and scoring engine.
///
/// None of these are process-fatal: a rejected action leaves the session,
/// the sequence counter and the results store exactly as they were.
#[derive(Error, Debug)]
pub enum RaceError {
    /// Operation invoked in the wrong session status
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed manual token or import row
    #[error("validation error: {0}")]
    Validation(String),

    /// RFID tag with no matching runner
    #[error("unknown RFID tag '{0}'")]
    UnknownTag(String),

    /// Reassigning a bib that already has a separate finish in the heat
    #[error("bib {bib} already finished as sequence {existing}")]
    CorrectionConflict { bib: u32, existing: u64 },

    /// Referenced finish record does not exist
    #[error("no finish record with sequence {0}")]
    NotFound(u64),

    /// Durable storage failed; standings and acknowledgements cannot be trusted
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<std::io::Error> for RaceError {
    fn from(err: std::io::Error) -> Self {
        RaceError::Storage(err.into())
    }
}

impl From<serde_json::Error> for RaceError {
    fn from(err: serde_json::Error) -> Self {
        RaceError::Storage(err.into())
    }
}

impl RaceError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        RaceError::InvalidState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        RaceError::Validation(msg.into())
    }
}
