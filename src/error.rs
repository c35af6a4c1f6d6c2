// Error taxonomy for board operations

use thiserror::Error;

/// Result type for board operations
pub type Result<T> = std::result::Result<T, BoardError>;

/// Errors surfaced by the board core
///
/// `NotFound`, `Malformed` and `Validation` are shown to the user as short
/// messages. `StoreUnavailable` means a durable collaborator failed; the
/// action can be retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// Unknown or expired exchange code, or a missing task. The two code
    /// cases are deliberately indistinguishable.
    #[error("not found")]
    NotFound,

    /// A snapshot document failed to decode
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    /// The record store or exchange store failed to read or write
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Bad user input
    #[error("{0}")]
    Validation(String),
}

impl BoardError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable(err.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Short text suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            BoardError::NotFound => "Invalid or expired code.".to_string(),
            BoardError::Malformed(_) => "Shared data is malformed.".to_string(),
            BoardError::StoreUnavailable(_) => "Something went wrong. Please try again.".to_string(),
            BoardError::Validation(message) => message.clone(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, BoardError::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for BoardError {
    fn from(err: rusqlite::Error) -> Self {
        Self::unavailable(err)
    }
}

impl From<eyre::Report> for BoardError {
    fn from(err: eyre::Report) -> Self {
        Self::StoreUnavailable(format!("{:#}", err))
    }
}
