// Split Ledger - Error taxonomy
// Every failure the core can report, with a stable kind code for boundary layers

use thiserror::Error;

/// Errors raised by the split calculator, the store and the balance aggregator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplitError {
    #[error("Invalid split method: \"{0}\"")]
    InvalidMethod(String),

    #[error("Exact amounts do not add up to total ({specified} != {total})")]
    AmountMismatch { specified: f64, total: f64 },

    #[error("Percentages do not add up to 100% (got {total})")]
    PercentageMismatch { total: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Participant \"{0}\" not found")]
    ParticipantNotFound(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Balance sheet generation failed: {0}")]
    Aggregation(String),
}

impl SplitError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            SplitError::InvalidMethod(_) => "invalid_method",
            SplitError::AmountMismatch { .. } => "amount_mismatch",
            SplitError::PercentageMismatch { .. } => "percentage_mismatch",
            SplitError::InvalidInput(_) => "invalid_input",
            SplitError::ParticipantNotFound(_) => "participant_not_found",
            SplitError::Persistence(_) => "persistence",
            SplitError::Aggregation(_) => "aggregation",
        }
    }

    /// True for errors caused by the caller's input (never by storage)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SplitError::InvalidMethod(_)
                | SplitError::AmountMismatch { .. }
                | SplitError::PercentageMismatch { .. }
                | SplitError::InvalidInput(_)
        )
    }
}

impl From<rusqlite::Error> for SplitError {
    fn from(err: rusqlite::Error) -> Self {
        SplitError::Persistence(err.to_string())
    }
}

impl From<csv::Error> for SplitError {
    fn from(err: csv::Error) -> Self {
        SplitError::Aggregation(err.to_string())
    }
}

pub type SplitResult<T> = std::result::Result<T, SplitError>;
