use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing configuration: {0}")]
    MissingConfiguration(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Reject NaN/infinite values before they reach any arithmetic.
pub(crate) fn ensure_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!("{name} must be a finite number, got {value}")))
    }
}

pub(crate) fn ensure_positive(name: &str, value: f64) -> Result<()> {
    ensure_finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!("{name} must be positive, got {value}")))
    }
}

pub(crate) fn ensure_non_negative(name: &str, value: f64) -> Result<()> {
    ensure_finite(name, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!("{name} must not be negative, got {value}")))
    }
}
