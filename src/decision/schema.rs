use serde::{Deserialize, Serialize};

/// Action requested by a trading recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
            TradeAction::Hold => "HOLD",
        }
    }

    /// Case-insensitive parse
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Some(TradeAction::Buy),
            "SELL" => Some(TradeAction::Sell),
            "HOLD" => Some(TradeAction::Hold),
            _ => None,
        }
    }

    pub fn is_trade(&self) -> bool {
        !matches!(self, TradeAction::Hold)
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated trading decision
///
/// Only produced by [`validate`](super::validate) or
/// [`hold_on_failure`](super::hold_on_failure), so every instance satisfies
/// the schema: BUY/SELL always carry a positive `amount_usd`, confidence is
/// within [0, 1] and reasoning is 5-500 characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    /// Idempotency key; supplied by the producer or derived from the payload
    pub request_id: String,
    pub decision: TradeAction,
    /// Normalized `BASE/QUOTE` symbol
    pub token_pair: String,
    pub amount_usd: Option<f64>,
    pub confidence: f64,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub reasoning: String,
}

impl TradeDecision {
    /// Base and quote symbols of the pair
    pub fn pair_parts(&self) -> Option<(&str, &str)> {
        self.token_pair.split_once('/')
    }
}
