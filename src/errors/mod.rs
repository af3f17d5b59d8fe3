/// Structured error handling for the swap pipeline
///
/// Every component boundary has its own error enum. All of them classify into a
/// flat [`ErrorKind`] so callers branch on kind instead of matching strings, and
/// all of them render a human message through `Display`.
use crate::decision::TradeAction;
use crate::tracker::TradeStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// ERROR KIND - flat classification shared by every component
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MalformedResponse,
    Validation,
    RiskRejection,
    MarketDataUnavailable,
    InsufficientLiquidity,
    QuoteExpired,
    NetworkHealth,
    Submission,
    ConfirmationTimeout,
    InvalidTransition,
    DuplicateRequest,
    Journal,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::RiskRejection => "RISK_REJECTION",
            ErrorKind::MarketDataUnavailable => "MARKET_DATA_UNAVAILABLE",
            ErrorKind::InsufficientLiquidity => "INSUFFICIENT_LIQUIDITY",
            ErrorKind::QuoteExpired => "QUOTE_EXPIRED",
            ErrorKind::NetworkHealth => "NETWORK_HEALTH",
            ErrorKind::Submission => "SUBMISSION",
            ErrorKind::ConfirmationTimeout => "CONFIRMATION_TIMEOUT",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::DuplicateRequest => "DUPLICATE_REQUEST",
            ErrorKind::Journal => "JOURNAL",
            ErrorKind::Configuration => "CONFIGURATION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "MALFORMED_RESPONSE" => ErrorKind::MalformedResponse,
            "VALIDATION" => ErrorKind::Validation,
            "RISK_REJECTION" => ErrorKind::RiskRejection,
            "MARKET_DATA_UNAVAILABLE" => ErrorKind::MarketDataUnavailable,
            "INSUFFICIENT_LIQUIDITY" => ErrorKind::InsufficientLiquidity,
            "QUOTE_EXPIRED" => ErrorKind::QuoteExpired,
            "NETWORK_HEALTH" => ErrorKind::NetworkHealth,
            "SUBMISSION" => ErrorKind::Submission,
            "CONFIRMATION_TIMEOUT" => ErrorKind::ConfirmationTimeout,
            "INVALID_TRANSITION" => ErrorKind::InvalidTransition,
            "DUPLICATE_REQUEST" => ErrorKind::DuplicateRequest,
            "JOURNAL" => ErrorKind::Journal,
            "CONFIGURATION" => ErrorKind::Configuration,
            _ => return None,
        };
        Some(kind)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every component error
pub trait Classify: std::fmt::Display {
    fn kind(&self) -> ErrorKind;
}

/// Serializable kind + message pair stored on trade records and outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_error<E: Classify + ?Sized>(err: &E) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

// =============================================================================
// DECISION VALIDATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("malformed recommendation: {reason}")]
    MalformedResponse { reason: String },

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("{decision} decision requires amount_usd")]
    MissingAmount { decision: TradeAction },
}

impl Classify for ValidationError {
    fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            _ => ErrorKind::Validation,
        }
    }
}

// =============================================================================
// RISK GATE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskRejection {
    #[error("HOLD decisions are never authorized for execution")]
    HoldDecision,

    #[error("trade decision carries no amount")]
    MissingAmount,

    #[error("confidence {confidence:.2} below minimum {min_confidence:.2}")]
    LowConfidence { confidence: f64, min_confidence: f64 },

    #[error("trade size ${amount_usd:.2} exceeds max ${max_trade_size_usd:.2}")]
    TradeTooLarge {
        amount_usd: f64,
        max_trade_size_usd: f64,
    },

    #[error("daily exposure would reach ${projected_usd:.2}, limit ${max_daily_loss_usd:.2}")]
    DailyLossLimit {
        projected_usd: f64,
        max_daily_loss_usd: f64,
    },

    #[error("{open_positions} open positions, max {max_open_positions}")]
    TooManyPositions {
        open_positions: usize,
        max_open_positions: usize,
    },

    #[error("buy of ${amount_usd:.2} exceeds available capital ${available_usd:.2}")]
    InsufficientCapital { amount_usd: f64, available_usd: f64 },
}

impl Classify for RiskRejection {
    fn kind(&self) -> ErrorKind {
        ErrorKind::RiskRejection
    }
}

// =============================================================================
// MARKET DATA
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketDataError {
    #[error("{resource}: transport error: {reason}")]
    Transport { resource: String, reason: String },

    #[error("{resource}: timed out after {timeout_ms}ms")]
    Timeout { resource: String, timeout_ms: u64 },

    #[error("{resource}: HTTP {status}")]
    HttpStatus { resource: String, status: u16 },

    #[error("{resource}: unparsable response: {reason}")]
    Parse { resource: String, reason: String },

    #[error("{resource}: no data available ({reason})")]
    Unavailable { resource: String, reason: String },

    #[error("unknown trading pair {symbol}")]
    UnknownPair { symbol: String },
}

impl MarketDataError {
    /// Transport failures, timeouts, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            MarketDataError::Transport { .. } | MarketDataError::Timeout { .. } => true,
            MarketDataError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl Classify for MarketDataError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::MarketDataUnavailable
    }
}

// =============================================================================
// QUOTE RESOLUTION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuoteError {
    #[error("liquidity for {token} is ${liquidity_usd:.0}, below floor ${min_liquidity_usd:.0}")]
    InsufficientLiquidity {
        token: String,
        liquidity_usd: f64,
        min_liquidity_usd: f64,
    },

    #[error("liquidity for {token} could not be confirmed: {reason}")]
    LiquidityUnverified { token: String, reason: String },

    #[error("quote rejected: {reason}")]
    InvalidQuote { reason: String },

    #[error("quote is {age_ms}ms old, freshness window is {max_age_ms}ms")]
    Expired { age_ms: i64, max_age_ms: i64 },

    #[error(transparent)]
    MarketData(#[from] MarketDataError),
}

impl Classify for QuoteError {
    fn kind(&self) -> ErrorKind {
        match self {
            QuoteError::InsufficientLiquidity { .. } | QuoteError::LiquidityUnverified { .. } => {
                ErrorKind::InsufficientLiquidity
            }
            QuoteError::Expired { .. } => ErrorKind::QuoteExpired,
            QuoteError::InvalidQuote { .. } | QuoteError::MarketData(_) => {
                ErrorKind::MarketDataUnavailable
            }
        }
    }
}

// =============================================================================
// NETWORK HEALTH
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkHealthError {
    #[error("network fee {lamports_per_signature} lamports/signature exceeds ceiling {ceiling}")]
    FeeCeilingExceeded {
        lamports_per_signature: u64,
        ceiling: u64,
    },

    #[error("transaction fee {fee_lamports} lamports exceeds max {max_fee_lamports}")]
    TransactionFeeTooHigh {
        fee_lamports: u64,
        max_fee_lamports: u64,
    },

    #[error("network fee unavailable: {reason}")]
    FeeUnavailable { reason: String },

    #[error("transaction fee estimation failed: {reason}")]
    EstimationFailed { reason: String },
}

impl Classify for NetworkHealthError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NetworkHealth
    }
}

// =============================================================================
// SWAP VENUE (aggregator + ledger calls)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VenueError {
    #[error("{operation}: transport error: {reason}")]
    Transport { operation: &'static str, reason: String },

    #[error("{operation}: timed out after {timeout_ms}ms")]
    Timeout { operation: &'static str, timeout_ms: u64 },

    #[error("{operation}: rejected: {reason}")]
    Rejected { operation: &'static str, reason: String },

    #[error("{operation}: invalid response: {reason}")]
    InvalidResponse { operation: &'static str, reason: String },

    #[error("signing failed: {reason}")]
    Signing { reason: String },
}

impl Classify for VenueError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Submission
    }
}

// =============================================================================
// TRADE LIFECYCLE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    #[error("trade record {id} not found")]
    NotFound { id: String },

    #[error("trade {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: TradeStatus,
        to: TradeStatus,
    },

    #[error("request {request_id} already has a {status} trade")]
    DuplicateRequest {
        request_id: String,
        status: TradeStatus,
    },

    #[error("trade {id} already broadcast as {transaction_id}; reconcile instead")]
    AlreadyBroadcast { id: String, transaction_id: String },

    #[error("journal error: {0}")]
    Journal(String),
}

impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        TrackerError::Journal(err.to_string())
    }
}

impl Classify for TrackerError {
    fn kind(&self) -> ErrorKind {
        match self {
            TrackerError::NotFound { .. }
            | TrackerError::InvalidTransition { .. }
            | TrackerError::AlreadyBroadcast { .. } => ErrorKind::InvalidTransition,
            TrackerError::DuplicateRequest { .. } => ErrorKind::DuplicateRequest,
            TrackerError::Journal(_) => ErrorKind::Journal,
        }
    }
}

// =============================================================================
// EXECUTION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("authorization does not match decision: {reason}")]
    AuthorizationMismatch { reason: String },

    #[error(transparent)]
    NetworkHealth(#[from] NetworkHealthError),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error("swap build failed: {0}")]
    Build(VenueError),

    #[error("signing failed: {reason}")]
    Signing { reason: String },

    #[error("submission failed: {0}")]
    Submit(VenueError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl Classify for ExecutionError {
    fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::AuthorizationMismatch { .. } => ErrorKind::RiskRejection,
            ExecutionError::NetworkHealth(e) => e.kind(),
            ExecutionError::Quote(e) => e.kind(),
            ExecutionError::Tracker(e) => e.kind(),
            ExecutionError::Build(_)
            | ExecutionError::Signing { .. }
            | ExecutionError::Submit(_) => ErrorKind::Submission,
        }
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid config field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl Classify for ConfigError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_text() {
        for kind in [
            ErrorKind::MalformedResponse,
            ErrorKind::InsufficientLiquidity,
            ErrorKind::ConfirmationTimeout,
            ErrorKind::DuplicateRequest,
        ] {
            assert_eq!(ErrorKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ErrorKind::parse("SOMETHING_ELSE"), None);
    }

    #[test]
    fn test_unverified_liquidity_fails_closed_as_insufficient() {
        let err = QuoteError::LiquidityUnverified {
            token: "So11111111111111111111111111111111111111112".to_string(),
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::InsufficientLiquidity);
    }

    #[test]
    fn test_execution_error_keeps_inner_kind() {
        let err = ExecutionError::from(NetworkHealthError::FeeCeilingExceeded {
            lamports_per_signature: 50_000,
            ceiling: 10_000,
        });
        assert_eq!(err.kind(), ErrorKind::NetworkHealth);

        let info = ErrorInfo::from_error(&err);
        assert_eq!(info.kind, ErrorKind::NetworkHealth);
        assert!(info.message.contains("50000"));
    }

    #[test]
    fn test_retryable_market_errors() {
        let busy = MarketDataError::HttpStatus {
            resource: "quote".to_string(),
            status: 429,
        };
        let missing = MarketDataError::HttpStatus {
            resource: "quote".to_string(),
            status: 404,
        };
        assert!(busy.is_retryable());
        assert!(!missing.is_retryable());
    }
}
