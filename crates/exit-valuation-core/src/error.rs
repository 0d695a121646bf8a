use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Invalid anti-dilution method '{method}' (expected none, full_ratchet or weighted_average)")]
    InvalidMethod { method: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invariant violation: {check} expected {expected}, got {actual} ({context})")]
    InvariantViolation {
        check: String,
        expected: Decimal,
        actual: Decimal,
        context: String,
    },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse classification used by the API layer to pick a response class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Malformed or out-of-range input, including unparseable payloads.
    Validation,
    /// Required data missing (empty cap table, no scenarios).
    InsufficientData,
    /// Internal allocation defect. Never a legitimate result.
    Invariant,
    /// Arithmetic failures that input validation should have prevented.
    Internal,
}

impl ValuationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ValuationError::InvalidInput { .. }
            | ValuationError::InvalidMethod { .. }
            | ValuationError::DateError(_)
            | ValuationError::SerializationError(_) => ErrorCategory::Validation,
            ValuationError::InsufficientData(_) => ErrorCategory::InsufficientData,
            ValuationError::InvariantViolation { .. } => ErrorCategory::Invariant,
            ValuationError::DivisionByZero { .. } => ErrorCategory::Internal,
        }
    }

    /// True when the caller supplied bad input (a 4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Validation | ErrorCategory::InsufficientData
        )
    }

    /// Message safe to show to an external caller. Invariant and internal
    /// failures are reduced to an opaque string; the detail goes to the log.
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "Internal valuation error".to_string()
        }
    }
}

impl From<serde_json::Error> for ValuationError {
    fn from(e: serde_json::Error) -> Self {
        ValuationError::SerializationError(e.to_string())
    }
}
