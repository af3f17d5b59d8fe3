use crate::errors::QuoteError;
use crate::marketdata::{RawQuote, RouteHop};
use crate::utils::from_base_units;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Normalized, immutable swap quote
///
/// Amounts are raw base units. `unit_price` is output per input in UI units and
/// `fee` is denominated in the output token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub input_amount: u64,
    pub output_amount: u64,
    pub input_decimals: u8,
    pub output_decimals: u8,
    pub unit_price: f64,
    pub fee: u64,
    pub slippage_bps: u16,
    /// `slippage_bps` as a fraction (50 bps = 0.005)
    pub slippage: f64,
    pub min_output_amount: u64,
    pub price_impact_pct: f64,
    pub route_plan: Vec<RouteHop>,
    pub liquidity_usd: f64,
    pub fetched_at: DateTime<Utc>,
    /// Provider payload handed back to the swap builder
    pub payload: serde_json::Value,
}

pub fn bps_to_fraction(bps: u16) -> f64 {
    bps as f64 / 10_000.0
}

impl Quote {
    /// Normalize a provider quote
    pub fn from_raw(
        raw: &RawQuote,
        input_decimals: u8,
        output_decimals: u8,
        liquidity_usd: f64,
        fetched_at: DateTime<Utc>,
    ) -> Result<Quote, QuoteError> {
        if raw.in_amount == 0 || raw.out_amount == 0 {
            return Err(QuoteError::InvalidQuote {
                reason: format!("zero amount (in {}, out {})", raw.in_amount, raw.out_amount),
            });
        }

        let input_ui = from_base_units(raw.in_amount, input_decimals);
        let output_ui = from_base_units(raw.out_amount, output_decimals);

        let hop_fees: u64 = raw
            .route_plan
            .iter()
            .filter(|hop| hop.fee_mint == raw.output_mint)
            .map(|hop| hop.fee_amount)
            .sum();

        Ok(Quote {
            input_mint: raw.input_mint.clone(),
            output_mint: raw.output_mint.clone(),
            input_amount: raw.in_amount,
            output_amount: raw.out_amount,
            input_decimals,
            output_decimals,
            unit_price: output_ui / input_ui,
            fee: hop_fees.saturating_add(raw.platform_fee_amount),
            slippage_bps: raw.slippage_bps,
            slippage: bps_to_fraction(raw.slippage_bps),
            min_output_amount: raw.other_amount_threshold,
            price_impact_pct: raw.price_impact_pct,
            route_plan: raw.route_plan.clone(),
            liquidity_usd,
            fetched_at,
            payload: raw.payload.clone(),
        })
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.fetched_at
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.ensure_fresh_at(now, window).is_ok()
    }

    /// Fail with `Expired` once the quote is older than `window`
    pub fn ensure_fresh(&self, window: Duration) -> Result<(), QuoteError> {
        self.ensure_fresh_at(Utc::now(), window)
    }

    pub fn ensure_fresh_at(&self, now: DateTime<Utc>, window: Duration) -> Result<(), QuoteError> {
        let age_ms = self.age(now).num_milliseconds();
        let max_age_ms = window.as_millis() as i64;
        if age_ms > max_age_ms {
            Err(QuoteError::Expired { age_ms, max_age_ms })
        } else {
            Ok(())
        }
    }

    /// Route summary for logs, e.g. `Whirlpool -> Raydium`
    pub fn route_summary(&self) -> String {
        if self.route_plan.is_empty() {
            return "Direct".to_string();
        }
        self.route_plan
            .iter()
            .map(|hop| hop.label.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
