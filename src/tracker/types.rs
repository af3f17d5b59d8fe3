use crate::decision::TradeDecision;
use crate::errors::ErrorInfo;
use crate::quotes::Quote;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Pending,
    Executed,
    Failed,
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "PENDING",
            TradeStatus::Executed => "EXECUTED",
            TradeStatus::Failed => "FAILED",
            TradeStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TradeStatus::Pending),
            "EXECUTED" => Some(TradeStatus::Executed),
            "FAILED" => Some(TradeStatus::Failed),
            "CANCELLED" => Some(TradeStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Pending)
    }

    /// PENDING may move anywhere (PENDING -> PENDING records an annotation);
    /// terminal states never move
    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        matches!(self, TradeStatus::Pending)
            && matches!(
                next,
                TradeStatus::Pending
                    | TradeStatus::Executed
                    | TradeStatus::Failed
                    | TradeStatus::Cancelled
            )
    }

    /// Blocks another execution for the same request id
    pub fn blocks_retry(&self) -> bool {
        matches!(self, TradeStatus::Pending | TradeStatus::Executed)
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional data attached to a transition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionExtra {
    pub transaction_id: Option<String>,
    pub last_valid_block_height: Option<u64>,
    pub fee_lamports: Option<u64>,
    pub error: Option<ErrorInfo>,
    pub confirmation_timeout: bool,
    pub manual_review: bool,
    pub note: Option<String>,
}

impl TransitionExtra {
    pub fn error(error: ErrorInfo) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn note(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::default()
        }
    }
}

/// One journaled state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub record_id: String,
    pub request_id: String,
    pub seq: u32,
    /// `None` for the creating transition
    pub from: Option<TradeStatus>,
    pub to: TradeStatus,
    pub extra: TransitionExtra,
    pub at: DateTime<Utc>,
}

/// Trade lifecycle record owned by the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decision: TradeDecision,
    pub quote: Option<Quote>,
    pub status: TradeStatus,
    pub transaction_id: Option<String>,
    pub last_valid_block_height: Option<u64>,
    pub fee_lamports: Option<u64>,
    pub error: Option<ErrorInfo>,
    pub confirmation_timeout: bool,
    pub manual_review: bool,
    /// Number of transitions applied, including creation
    pub transitions: u32,
}

impl TradeRecord {
    pub(crate) fn new(
        id: String,
        decision: TradeDecision,
        quote: Option<Quote>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            request_id: decision.request_id.clone(),
            created_at,
            updated_at: created_at,
            decision,
            quote,
            status: TradeStatus::Pending,
            transaction_id: None,
            last_valid_block_height: None,
            fee_lamports: None,
            error: None,
            confirmation_timeout: false,
            manual_review: false,
            transitions: 1,
        }
    }

    /// Apply a transition already checked against the state machine
    ///
    /// Flags and identifiers are sticky: a later transition without them keeps
    /// the earlier values.
    pub(crate) fn apply(&mut self, to: TradeStatus, extra: &TransitionExtra, at: DateTime<Utc>) {
        self.status = to;
        self.updated_at = at;
        self.transitions += 1;
        if let Some(id) = &extra.transaction_id {
            self.transaction_id = Some(id.clone());
        }
        if let Some(height) = extra.last_valid_block_height {
            self.last_valid_block_height = Some(height);
        }
        if let Some(fee) = extra.fee_lamports {
            self.fee_lamports = Some(fee);
        }
        if let Some(error) = &extra.error {
            self.error = Some(error.clone());
        }
        self.confirmation_timeout |= extra.confirmation_timeout;
        self.manual_review |= extra.manual_review;
    }

    pub fn amount_usd(&self) -> f64 {
        self.decision.amount_usd.unwrap_or(0.0)
    }
}
