//! Pre-execution policy checks

use crate::config::RiskConfig;
use crate::decision::{TradeAction, TradeDecision};
use crate::errors::RiskRejection;
use serde::{Deserialize, Serialize};

/// Limits the gate enforces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_trade_size_usd: f64,
    pub max_daily_loss_usd: f64,
    pub max_open_positions: usize,
    pub min_confidence: f64,
}

impl From<&RiskConfig> for RiskLimits {
    fn from(cfg: &RiskConfig) -> Self {
        Self {
            max_trade_size_usd: cfg.max_trade_size_usd,
            max_daily_loss_usd: cfg.max_daily_loss_usd,
            max_open_positions: cfg.max_open_positions,
            min_confidence: cfg.min_confidence,
        }
    }
}

/// Caller-supplied snapshot of the portfolio at decision time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub available_capital_usd: f64,
    pub open_positions: usize,
    /// USD committed by today's (UTC) buys that executed or may have executed
    pub daily_exposure_usd: f64,
}

/// Proof that a decision passed the gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    pub request_id: String,
    pub action: TradeAction,
    pub token_pair: String,
    pub amount_usd: f64,
}

/// Authorize a decision against the limits and a portfolio snapshot
///
/// Pure: identical inputs always give the identical outcome.
pub fn authorize(
    decision: &TradeDecision,
    portfolio: &PortfolioState,
    limits: &RiskLimits,
) -> Result<Authorization, RiskRejection> {
    if decision.decision == TradeAction::Hold {
        return Err(RiskRejection::HoldDecision);
    }

    let amount_usd = match decision.amount_usd {
        Some(amount) if amount > 0.0 && amount.is_finite() => amount,
        _ => return Err(RiskRejection::MissingAmount),
    };

    if decision.confidence < limits.min_confidence {
        return Err(RiskRejection::LowConfidence {
            confidence: decision.confidence,
            min_confidence: limits.min_confidence,
        });
    }

    if amount_usd > limits.max_trade_size_usd {
        return Err(RiskRejection::TradeTooLarge {
            amount_usd,
            max_trade_size_usd: limits.max_trade_size_usd,
        });
    }

    if decision.decision == TradeAction::Buy {
        let projected_usd = portfolio.daily_exposure_usd + amount_usd;
        if projected_usd > limits.max_daily_loss_usd {
            return Err(RiskRejection::DailyLossLimit {
                projected_usd,
                max_daily_loss_usd: limits.max_daily_loss_usd,
            });
        }

        if portfolio.open_positions >= limits.max_open_positions {
            return Err(RiskRejection::TooManyPositions {
                open_positions: portfolio.open_positions,
                max_open_positions: limits.max_open_positions,
            });
        }

        if amount_usd > portfolio.available_capital_usd {
            return Err(RiskRejection::InsufficientCapital {
                amount_usd,
                available_usd: portfolio.available_capital_usd,
            });
        }
    }

    Ok(Authorization {
        request_id: decision.request_id.clone(),
        action: decision.decision,
        token_pair: decision.token_pair.clone(),
        amount_usd,
    })
}
