//! Error family for the kernel.
//!
//! Every public operation that can fail returns [`Result`]. None of these
//! errors is fatal: callers decide whether to skip a bar, wait for more data,
//! or surface the problem.

use thiserror::Error;

/// Errors raised by kernels, the pivot/divergence stages and the strategy engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaError {
    /// Malformed input: NaN price, broken OHLC envelope, non-monotonic time,
    /// zero period, or an out-of-range strategy parameter.
    #[error("invalid input: {field}{}", fmt_index(.index))]
    InvalidInput { field: String, index: Option<usize> },

    /// Not enough bars to produce a value yet (warm-up).
    #[error("insufficient data: need {required} bars, have {available}")]
    InsufficientData { required: usize, available: usize },

    /// Operation not allowed in the current position state.
    #[error("state violation: {reason}")]
    StateViolation { reason: String },

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}

fn fmt_index(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" at index {i}"),
        None => String::new(),
    }
}

impl TaError {
    pub fn invalid(field: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            index: None,
        }
    }

    pub fn invalid_at(field: impl Into<String>, index: usize) -> Self {
        Self::InvalidInput {
            field: field.into(),
            index: Some(index),
        }
    }

    pub fn state(reason: impl Into<String>) -> Self {
        Self::StateViolation {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaError>;

/// Largest period or pivot window any stage accepts. Windows are buffered,
/// so the bound also caps per-stage memory.
pub const MAX_WINDOW: usize = 100_000;

/// Reject a zero or oversized period for the named field.
pub(crate) fn check_period(field: &str, period: usize) -> Result<()> {
    if period == 0 {
        return Err(TaError::invalid(field));
    }
    check_window(field, period)
}

/// Reject a window size above [`MAX_WINDOW`]. Zero is allowed.
pub(crate) fn check_window(field: &str, size: usize) -> Result<()> {
    if size > MAX_WINDOW {
        return Err(TaError::invalid(field));
    }
    Ok(())
}
