/// Market data shapes shared by sources, the cache and the quote resolver
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tradable token from the aggregator's listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenListing {
    pub mint: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Base/quote tokens behind a `BASE/QUOTE` symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPair {
    pub symbol: String,
    pub base: TokenListing,
    pub quote: TokenListing,
}

impl TradingPair {
    /// Find both sides of `symbol` in the listing (symbols compared case-insensitively)
    ///
    /// When several listings share a symbol the first one wins; the aggregator's
    /// verified list orders by relevance.
    pub fn resolve(symbol: &str, listings: &[TokenListing]) -> Option<TradingPair> {
        let (base_symbol, quote_symbol) = symbol.split_once('/')?;
        let find = |wanted: &str| {
            listings
                .iter()
                .find(|t| t.symbol.eq_ignore_ascii_case(wanted.trim()))
                .cloned()
        };
        Some(TradingPair {
            symbol: symbol.to_uppercase(),
            base: find(base_symbol)?,
            quote: find(quote_symbol)?,
        })
    }
}

/// Pooled liquidity for one token, used only as an execution gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquiditySnapshot {
    pub token: String,
    pub total_liquidity_usd: f64,
    pub pool_count: usize,
    /// Price reported by the most liquid pool, when available
    pub price_usd: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

/// Quote request parameters; also the quote cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteParams {
    pub input_mint: String,
    pub output_mint: String,
    /// Raw input amount in the input token's base units
    pub amount: u64,
    pub slippage_bps: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteHop {
    pub label: String,
    pub amm_key: String,
    pub percent: u8,
    pub fee_amount: u64,
    pub fee_mint: String,
}

/// Provider quote, decoded but not yet normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQuote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Minimum output after slippage
    pub other_amount_threshold: u64,
    pub slippage_bps: u16,
    pub price_impact_pct: f64,
    pub route_plan: Vec<RouteHop>,
    /// Platform fee taken from the output, raw units
    pub platform_fee_amount: u64,
    /// Untouched provider payload; the swap builder needs every field
    pub payload: serde_json::Value,
}

/// Conditional request validators remembered from the last response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Outcome of a conditional fetch
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    /// Upstream answered 304; the cached value is still current
    NotModified,
    Fresh { value: T, validators: Validators },
}

/// Value returned by the cache
#[derive(Debug, Clone)]
pub struct MarketData<T> {
    pub value: Arc<T>,
    pub fetched_at: DateTime<Utc>,
    /// True when the refresh failed and this is the last known value
    pub degraded: bool,
}

impl<T> MarketData<T> {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.fetched_at
    }
}
