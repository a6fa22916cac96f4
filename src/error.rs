use std::fmt;

use serde::Serialize;

use crate::engine::phase::Phase;

/// App-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes as `{ error, kind }` so the transport layer can map the stable
/// kind tag to a protocol status without inspecting the message.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Action '{action}' is not allowed in phase {current}; requires {required}")]
    PhaseViolation {
        action: String,
        current: Phase,
        required: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("Rate limited after {attempts} attempts: {last_error}")]
    RateLimited { attempts: u32, last_error: String },

    #[error("{}", describe_batch_failure(.succeeded, .failures))]
    PartialBatchFailure {
        succeeded: usize,
        failures: Vec<ItemFailure>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

/// Stable error classification handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    PhaseViolation,
    Validation,
    GenerationFailure,
    RateLimited,
    PartialBatchFailure,
    Cancelled,
    Config,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::PhaseViolation => "phase_violation",
            ErrorKind::Validation => "validation",
            ErrorKind::GenerationFailure => "generation_failure",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::PartialBatchFailure => "partial_batch_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed item inside a multi-item generation batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    /// Identifier of the failed item (mutation id, mutation type, style…).
    pub item: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ItemFailure {
    pub fn from_error(item: impl Into<String>, err: &AppError) -> Self {
        Self {
            item: item.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

fn describe_batch_failure(succeeded: &usize, failures: &[ItemFailure]) -> String {
    let succeeded = *succeeded;
    let details: Vec<String> = failures
        .iter()
        .map(|f| format!("{}: {}", f.item, f.message))
        .collect();
    if succeeded == 0 {
        format!(
            "All {} batch items failed: {}",
            failures.len(),
            details.join("; ")
        )
    } else {
        format!(
            "{} of {} batch items failed: {}",
            failures.len(),
            failures.len() + succeeded,
            details.join("; ")
        )
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Database(_) | AppError::Pool(_) | AppError::Io(_) => ErrorKind::Storage,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::PhaseViolation { .. } => ErrorKind::PhaseViolation,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::GenerationFailure(_) => ErrorKind::GenerationFailure,
            AppError::RateLimited { .. } => ErrorKind::RateLimited,
            AppError::PartialBatchFailure { .. } => ErrorKind::PartialBatchFailure,
            AppError::Cancelled => ErrorKind::Cancelled,
            AppError::Config(_) => ErrorKind::Config,
            AppError::Serde(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a failed generation of this kind should be parked for replay
    /// instead of surfaced.
    pub fn is_deferrable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimited | ErrorKind::GenerationFailure
        )
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field("kind", self.kind().as_str())?;
        s.end()
    }
}
