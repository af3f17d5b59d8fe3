//! Advisory parameter suggestions
//!
//! The external tuner publishes a suggestion once per cycle. It is an immutable
//! value; applying it can only make the gate stricter.

use super::gate::RiskLimits;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSuggestion {
    pub min_confidence: Option<f64>,
    /// Scales max trade size; clamped to (0, 1]
    pub size_multiplier: Option<f64>,
    pub slippage_bps: Option<u16>,
    pub issued_at: DateTime<Utc>,
}

impl RiskLimits {
    /// Limits tightened by an advisory suggestion
    pub fn with_advice(&self, advice: &ParameterSuggestion) -> RiskLimits {
        let mut limits = self.clone();

        if let Some(floor) = advice.min_confidence.filter(|c| c.is_finite()) {
            limits.min_confidence = limits.min_confidence.max(floor.clamp(0.0, 1.0));
        }

        if let Some(multiplier) = advice.size_multiplier.filter(|m| m.is_finite() && *m > 0.0) {
            limits.max_trade_size_usd *= multiplier.min(1.0);
        }

        limits
    }
}

impl ParameterSuggestion {
    /// Slippage to request: the tighter of configured and suggested
    pub fn effective_slippage_bps(&self, configured: u16) -> u16 {
        match self.slippage_bps {
            Some(suggested) if suggested > 0 => configured.min(suggested),
            _ => configured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RiskLimits {
        RiskLimits {
            max_trade_size_usd: 1_000.0,
            max_daily_loss_usd: 2_000.0,
            max_open_positions: 3,
            min_confidence: 0.6,
        }
    }

    fn advice(min_confidence: Option<f64>, size_multiplier: Option<f64>, slippage_bps: Option<u16>) -> ParameterSuggestion {
        ParameterSuggestion {
            min_confidence,
            size_multiplier,
            slippage_bps,
            issued_at: Utc::now(),
        }
    }

    #[test]
    fn test_advice_only_tightens() {
        let tightened = base().with_advice(&advice(Some(0.8), Some(0.5), None));
        assert_eq!(tightened.min_confidence, 0.8);
        assert_eq!(tightened.max_trade_size_usd, 500.0);

        let loosened = base().with_advice(&advice(Some(0.2), Some(3.0), None));
        assert_eq!(loosened, base());
    }

    #[test]
    fn test_slippage_suggestion() {
        assert_eq!(advice(None, None, Some(30)).effective_slippage_bps(50), 30);
        assert_eq!(advice(None, None, Some(300)).effective_slippage_bps(50), 50);
        assert_eq!(advice(None, None, None).effective_slippage_bps(50), 50);
    }
}
