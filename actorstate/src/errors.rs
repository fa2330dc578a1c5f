use std::fmt::{self, Display};

use thiserror::Error;

use crate::session::{ConcurrencyConflict, SessionError};

/// Setup-time failure: an option could not be resolved or validated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConfigError {
    pub message: String,
}

/// Optimistic-concurrency violation on write.
///
/// With token checking enabled, `stored_token` holds the canonical form of the
/// token found in the store (if the row still exists) and `current_token` the
/// token the writer expected. Without it, only the raw conflict is carried.
#[derive(Debug, Error)]
pub struct InconsistentState {
    pub message: String,
    pub stored_token: Option<String>,
    pub current_token: Option<String>,
    #[source]
    pub conflict: ConcurrencyConflict,
}

/// Failure of a read, write or clear.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Inconsistent(#[from] InconsistentState),
    #[error("session failure: {0}")]
    Session(#[from] SessionError),
}

// Implementations

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl InconsistentState {
    pub fn raw(conflict: ConcurrencyConflict) -> Self {
        Self {
            message: conflict.message.clone(),
            stored_token: None,
            current_token: None,
            conflict,
        }
    }

    pub fn with_tokens(
        conflict: ConcurrencyConflict,
        stored_token: Option<String>,
        current_token: Option<String>,
    ) -> Self {
        Self {
            message: conflict.message.clone(),
            stored_token,
            current_token,
            conflict,
        }
    }
}

impl Display for InconsistentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.stored_token, &self.current_token) {
            (None, None) => write!(f, "inconsistent state: {}", self.message),
            (stored, current) => write!(
                f,
                "inconsistent state: {} (stored token {}, expected {})",
                self.message,
                stored.as_deref().unwrap_or("<none>"),
                current.as_deref().unwrap_or("<none>"),
            ),
        }
    }
}

impl StorageError {
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            StorageError::Configuration(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_inconsistent(&self) -> Option<&InconsistentState> {
        match self {
            StorageError::Inconsistent(e) => Some(e),
            _ => None,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
