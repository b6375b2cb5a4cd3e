//! Error types for risk engine

use thiserror::Error;

/// Risk engine error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Arithmetic overflow in a checked operation
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Division by zero
    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    /// Oracle reported a zero price
    #[error("Oracle price is zero")]
    ZeroPrice,

    /// Threshold outside its admissible range
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    /// Liquidation request did not name exactly one side
    #[error("Ambiguous liquidation request: {0}")]
    AmbiguousRequest(String),

    /// Amount that would move nothing
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
