/// Market data cache
///
/// Shared read-through cache in front of a [`MarketDataSource`]. Each resource
/// (pair listings, token metadata, quotes, liquidity) has its own TTL; refreshes
/// are conditional and a failed refresh falls back to the last known value.
pub mod cache;
pub mod http;
pub mod source;
pub mod types;

pub use cache::{CacheStats, FetchPolicy, Refresh, TtlCache};
pub use http::HttpMarketSource;
pub use source::MarketDataSource;
pub use types::{
    Fetched, LiquiditySnapshot, MarketData, QuoteParams, RawQuote, RouteHop, TokenListing,
    TradingPair, Validators,
};

use crate::config::MarketDataConfig;
use crate::errors::MarketDataError;
use crate::logger::{self, LogTag};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const LISTINGS_KEY: &str = "verified";
const TOKEN_CAPACITY: usize = 2_048;
const QUOTE_CAPACITY: usize = 256;
const LIQUIDITY_CAPACITY: usize = 1_024;

/// Per-resource cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketDataStats {
    pub pairs: CacheStats,
    pub tokens: CacheStats,
    pub quotes: CacheStats,
    pub liquidity: CacheStats,
}

impl MarketDataStats {
    pub fn total(&self) -> CacheStats {
        self.pairs
            .merge(&self.tokens)
            .merge(&self.quotes)
            .merge(&self.liquidity)
    }
}

pub struct MarketDataCache {
    source: Arc<dyn MarketDataSource>,
    policy: FetchPolicy,
    listings: TtlCache<String, Vec<TokenListing>>,
    tokens: TtlCache<String, TokenListing>,
    quotes: TtlCache<QuoteParams, RawQuote>,
    liquidity: TtlCache<String, LiquiditySnapshot>,
}

fn refresh_mode(force_refresh: bool) -> Refresh {
    if force_refresh {
        Refresh::Always
    } else {
        Refresh::IfExpired
    }
}

impl MarketDataCache {
    pub fn new(source: Arc<dyn MarketDataSource>, config: &MarketDataConfig) -> Self {
        logger::debug(
            LogTag::MarketData,
            &format!(
                "Market data cache over {} (pairs {}s, quotes {}s, tokens {}s, liquidity {}s)",
                source.name(),
                config.pairs_ttl_secs,
                config.quote_ttl_secs,
                config.token_ttl_secs,
                config.liquidity_ttl_secs
            ),
        );

        Self {
            source,
            policy: FetchPolicy {
                timeout: Duration::from_millis(config.request_timeout_ms),
                attempts: config.retry_attempts,
                initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
            },
            listings: TtlCache::new("pairs", Duration::from_secs(config.pairs_ttl_secs), 1),
            tokens: TtlCache::new(
                "token",
                Duration::from_secs(config.token_ttl_secs),
                TOKEN_CAPACITY,
            ),
            quotes: TtlCache::new(
                "quote",
                Duration::from_secs(config.quote_ttl_secs),
                QUOTE_CAPACITY,
            ),
            liquidity: TtlCache::new(
                "liquidity",
                Duration::from_secs(config.liquidity_ttl_secs),
                LIQUIDITY_CAPACITY,
            ),
        }
    }

    /// Tradable token listing; `force_refresh` bypasses the TTL
    pub async fn get_pairs(
        &self,
        force_refresh: bool,
    ) -> Result<MarketData<Vec<TokenListing>>, MarketDataError> {
        let source = &self.source;
        self.listings
            .get_or_refresh(
                &LISTINGS_KEY.to_string(),
                refresh_mode(force_refresh),
                self.policy,
                |validators| async move { source.fetch_listings(&validators).await },
            )
            .await
    }

    /// Resolve a `BASE/QUOTE` symbol to token listings
    ///
    /// A symbol missing from a cached listing triggers one forced refresh
    /// before giving up with `UnknownPair`.
    pub async fn resolve_pair(&self, symbol: &str) -> Result<TradingPair, MarketDataError> {
        let listings = self.get_pairs(false).await?;
        if let Some(pair) = TradingPair::resolve(symbol, &listings.value) {
            return Ok(pair);
        }

        logger::debug(
            LogTag::MarketData,
            &format!("Pair {} not in cached listing, refreshing", symbol),
        );
        let listings = self.get_pairs(true).await?;
        TradingPair::resolve(symbol, &listings.value).ok_or_else(|| MarketDataError::UnknownPair {
            symbol: symbol.to_string(),
        })
    }

    pub async fn get_token(
        &self,
        mint: &str,
    ) -> Result<MarketData<TokenListing>, MarketDataError> {
        let source = &self.source;
        self.tokens
            .get_or_refresh(&mint.to_string(), Refresh::IfExpired, self.policy, |validators| {
                async move { source.fetch_token(mint, &validators).await }
            })
            .await
    }

    pub async fn get_quote(
        &self,
        params: &QuoteParams,
        force_refresh: bool,
    ) -> Result<MarketData<RawQuote>, MarketDataError> {
        self.quote_with(params, refresh_mode(force_refresh)).await
    }

    /// Quote no older than `max_age`, refreshing when the cached one is older
    pub async fn get_quote_with_max_age(
        &self,
        params: &QuoteParams,
        max_age: Duration,
    ) -> Result<MarketData<RawQuote>, MarketDataError> {
        self.quote_with(params, Refresh::OlderThan(max_age)).await
    }

    async fn quote_with(
        &self,
        params: &QuoteParams,
        refresh: Refresh,
    ) -> Result<MarketData<RawQuote>, MarketDataError> {
        let source = &self.source;
        self.quotes
            .get_or_refresh(params, refresh, self.policy, |validators| async move {
                source.fetch_quote(params, &validators).await
            })
            .await
    }

    pub async fn get_liquidity(
        &self,
        mint: &str,
        force_refresh: bool,
    ) -> Result<MarketData<LiquiditySnapshot>, MarketDataError> {
        let source = &self.source;
        self.liquidity
            .get_or_refresh(
                &mint.to_string(),
                refresh_mode(force_refresh),
                self.policy,
                |validators| async move { source.fetch_liquidity(mint, &validators).await },
            )
            .await
    }

    pub fn stats(&self) -> MarketDataStats {
        MarketDataStats {
            pairs: self.listings.stats(),
            tokens: self.tokens.stats(),
            quotes: self.quotes.stats(),
            liquidity: self.liquidity.stats(),
        }
    }
}
