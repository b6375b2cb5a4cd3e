//! Error types for the market ledger

use crate::external::{CustodyError, OracleError, RateModelError};
use crate::types::MarketId;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every error aborts the whole operation that raised it; no ledger state is
/// changed.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller lacks the required role or authorization
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Threshold outside its admissible range
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    /// Rate model not enabled in the registry
    #[error("Rate model not enabled: {0}")]
    UnknownRateModel(String),

    /// Base threshold not enabled in the registry
    #[error("Threshold not enabled: {0}")]
    UnknownThreshold(String),

    /// A market with the same parameters exists
    #[error("Market already exists: {0}")]
    MarketAlreadyExists(MarketId),

    /// No market with this id
    #[error("Market not found: {0}")]
    MarketNotFound(MarketId),

    /// Pool would owe more than it holds
    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    /// Position would be insolvent
    #[error("Insufficient collateral: {0}")]
    InsufficientCollateral(String),

    /// Position holds less than requested
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Repayment exceeds outstanding debt
    #[error("Repayment exceeds debt: {0}")]
    ExceedsDebt(String),

    /// Liquidation request named neither or both sides
    #[error("Ambiguous request: {0}")]
    AmbiguousRequest(String),

    /// Liquidation of a solvent position
    #[error("Position is healthy: {0}")]
    PositionHealthy(String),

    /// Zero or otherwise unusable amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Fee above the maximum
    #[error("Invalid fee: {0}")]
    InvalidFee(String),

    /// Oracle unavailable, stale or zero
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Rate model failure
    #[error("Rate model error: {0}")]
    RateModel(#[from] RateModelError),

    /// Token transfer failed
    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),

    /// Checked arithmetic failed
    #[error("Math error: {0}")]
    Math(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable identifier for UI messages and metric labels
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthorized(_) => "unauthorized",
            Error::InvalidThreshold(_) => "invalid_threshold",
            Error::UnknownRateModel(_) => "unknown_rate_model",
            Error::UnknownThreshold(_) => "unknown_threshold",
            Error::MarketAlreadyExists(_) => "market_already_exists",
            Error::MarketNotFound(_) => "market_not_found",
            Error::InsufficientLiquidity(_) => "insufficient_liquidity",
            Error::InsufficientCollateral(_) => "insufficient_collateral",
            Error::InsufficientBalance(_) => "insufficient_balance",
            Error::ExceedsDebt(_) => "exceeds_debt",
            Error::AmbiguousRequest(_) => "ambiguous_request",
            Error::PositionHealthy(_) => "position_healthy",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::InvalidFee(_) => "invalid_fee",
            Error::Oracle(_) => "oracle_error",
            Error::RateModel(_) => "rate_model_error",
            Error::Custody(_) => "custody_error",
            Error::Math(_) => "math_error",
            Error::Concurrency(_) => "concurrency_error",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
        }
    }
}

impl From<risk_engine::Error> for Error {
    fn from(err: risk_engine::Error) -> Self {
        use risk_engine::Error as Risk;

        match err {
            Risk::ZeroPrice => Error::Oracle(OracleError::ZeroPrice),
            Risk::AmbiguousRequest(msg) => Error::AmbiguousRequest(msg),
            Risk::InvalidThreshold(msg) => Error::InvalidThreshold(msg),
            Risk::InvalidAmount(msg) => Error::InvalidAmount(msg),
            Risk::InvalidConfig(msg) => Error::Config(msg),
            Risk::Overflow(msg) | Risk::DivisionByZero(msg) => Error::Math(msg),
        }
    }
}
