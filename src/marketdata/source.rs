use super::types::{Fetched, LiquiditySnapshot, QuoteParams, RawQuote, TokenListing, Validators};
use crate::errors::MarketDataError;
use async_trait::async_trait;

/// Upstream market data provider
///
/// Every fetch is conditional: `validators` carries the ETag/Last-Modified of
/// the cached copy and the source answers `Fetched::NotModified` when upstream
/// confirms it is unchanged. Sources that cannot do conditional requests
/// simply always return `Fetched::Fresh`.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Tradable token listing used to resolve `BASE/QUOTE` symbols
    async fn fetch_listings(
        &self,
        validators: &Validators,
    ) -> Result<Fetched<Vec<TokenListing>>, MarketDataError>;

    async fn fetch_token(
        &self,
        mint: &str,
        validators: &Validators,
    ) -> Result<Fetched<TokenListing>, MarketDataError>;

    async fn fetch_quote(
        &self,
        params: &QuoteParams,
        validators: &Validators,
    ) -> Result<Fetched<RawQuote>, MarketDataError>;

    async fn fetch_liquidity(
        &self,
        mint: &str,
        validators: &Validators,
    ) -> Result<Fetched<LiquiditySnapshot>, MarketDataError>;
}
