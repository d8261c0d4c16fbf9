use alloy::primitives::U256;
use thiserror::Error;

/// Main error type for the correction engine
#[derive(Error, Debug)]
pub enum RecoupError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Address parsing error: {0}")]
    AddressParsing(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Authorization errors
    #[error("Unauthorized caller {caller}: {role} role required")]
    UnauthorizedCaller { caller: String, role: String },

    // Oracle / reference data errors
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    // Opportunity lifecycle errors
    #[error("No pending opportunity for pair {pair}")]
    NoOpportunity { pair: String },

    #[error("Opportunity for pair {pair} expired: age {age_secs}s > max {max_age_secs}s")]
    ExpiredOpportunity {
        pair: String,
        age_secs: i64,
        max_age_secs: i64,
    },

    // Round-trip execution errors
    #[error("Insufficient profit: recovered {recovered}, required {required}")]
    InsufficientProfit { recovered: U256, required: U256 },

    #[error("Settlement failure: {0}")]
    SettlementFailure(String),

    // Distribution errors
    #[error("Donation not ready: {0}")]
    DonationNotReady(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for RecoupError
pub type Result<T> = std::result::Result<T, RecoupError>;

/// Specific error types for profit-split validation
#[derive(Error, Debug, Clone)]
pub enum SplitError {
    #[error("Share sum exceeds 10000 bps: treasury {treasury_bps} + lp {lp_share_bps}")]
    BadShareSum { treasury_bps: u32, lp_share_bps: u32 },

    #[error("Treasury share {treasury_bps} bps routed to the zero address")]
    MissingTreasury { treasury_bps: u32 },

    #[error("Share arithmetic overflow on amount {amount}")]
    ShareOverflow { amount: U256 },
}

/// Specific error types for the gated donation release
#[derive(Error, Debug, Clone)]
pub enum DonateError {
    #[error("Nothing accumulated for pair {pair}")]
    NothingAccumulated { pair: String },

    #[error("Accumulated {accumulated} below release threshold {required}")]
    BelowThreshold { accumulated: U256, required: U256 },

    #[error("Release interval not elapsed: {elapsed_secs}s < {required_secs}s")]
    IntervalNotElapsed {
        elapsed_secs: i64,
        required_secs: i64,
    },
}

impl From<SplitError> for RecoupError {
    fn from(err: SplitError) -> Self {
        RecoupError::Validation(err.to_string())
    }
}

impl From<DonateError> for RecoupError {
    fn from(err: DonateError) -> Self {
        RecoupError::DonationNotReady(err.to_string())
    }
}
