use super::types::Quote;
use crate::errors::QuoteError;
use crate::logger::{self, LogTag};
use crate::marketdata::{LiquiditySnapshot, MarketDataCache, QuoteParams};
use std::sync::Arc;
use std::time::Duration;

/// Produces fresh, normalized quotes behind a liquidity floor
pub struct QuoteResolver {
    cache: Arc<MarketDataCache>,
    freshness: Duration,
}

impl QuoteResolver {
    pub fn new(cache: Arc<MarketDataCache>, freshness: Duration) -> Self {
        Self { cache, freshness }
    }

    pub fn freshness_window(&self) -> Duration {
        self.freshness
    }

    /// Confirm pooled liquidity for `mint` is at least `min_liquidity_usd`
    ///
    /// A snapshot served from a failed refresh does not count as confirmation.
    pub async fn check_liquidity(
        &self,
        mint: &str,
        min_liquidity_usd: f64,
    ) -> Result<Arc<LiquiditySnapshot>, QuoteError> {
        let snapshot = self
            .cache
            .get_liquidity(mint, false)
            .await
            .map_err(|e| QuoteError::LiquidityUnverified {
                token: mint.to_string(),
                reason: e.to_string(),
            })?;

        if snapshot.degraded {
            return Err(QuoteError::LiquidityUnverified {
                token: mint.to_string(),
                reason: format!("only a stale snapshot from {} is available", snapshot.fetched_at),
            });
        }

        let liquidity_usd = snapshot.value.total_liquidity_usd;
        if !(liquidity_usd >= min_liquidity_usd) {
            return Err(QuoteError::InsufficientLiquidity {
                token: mint.to_string(),
                liquidity_usd,
                min_liquidity_usd,
            });
        }

        Ok(snapshot.value)
    }

    /// Resolve an executable quote for swapping `amount` raw units of `input_mint`
    pub async fn resolve(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
        min_liquidity_usd: f64,
    ) -> Result<Quote, QuoteError> {
        if input_mint == output_mint {
            return Err(QuoteError::InvalidQuote {
                reason: "input and output mints are identical".to_string(),
            });
        }
        if amount == 0 {
            return Err(QuoteError::InvalidQuote {
                reason: "amount must be positive".to_string(),
            });
        }

        let (input_liquidity, output_liquidity) = tokio::try_join!(
            self.check_liquidity(input_mint, min_liquidity_usd),
            self.check_liquidity(output_mint, min_liquidity_usd)
        )?;

        let (input_token, output_token) = tokio::try_join!(
            self.cache.get_token(input_mint),
            self.cache.get_token(output_mint)
        )?;

        let params = QuoteParams {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            amount,
            slippage_bps,
        };
        let raw = self
            .cache
            .get_quote_with_max_age(&params, self.freshness)
            .await?;

        if raw.degraded {
            return Err(QuoteError::Expired {
                age_ms: raw.age(chrono::Utc::now()).num_milliseconds(),
                max_age_ms: self.freshness.as_millis() as i64,
            });
        }
        if raw.value.input_mint != input_mint || raw.value.output_mint != output_mint {
            return Err(QuoteError::InvalidQuote {
                reason: format!(
                    "quote is for {} -> {}, requested {} -> {}",
                    raw.value.input_mint, raw.value.output_mint, input_mint, output_mint
                ),
            });
        }
        if raw.value.in_amount != amount {
            return Err(QuoteError::InvalidQuote {
                reason: format!("quote input {} differs from requested {}", raw.value.in_amount, amount),
            });
        }

        let quote = Quote::from_raw(
            &raw.value,
            input_token.value.decimals,
            output_token.value.decimals,
            input_liquidity
                .total_liquidity_usd
                .min(output_liquidity.total_liquidity_usd),
            raw.fetched_at,
        )?;
        quote.ensure_fresh(self.freshness)?;

        logger::info(
            LogTag::Quote,
            &format!(
                "Quote {} {} -> {} {} @ {:.8} (fee {}, slippage {}bps, route {})",
                quote.input_amount,
                input_token.value.symbol,
                quote.output_amount,
                output_token.value.symbol,
                quote.unit_price,
                quote.fee,
                quote.slippage_bps,
                quote.route_summary()
            ),
        );

        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketDataConfig;
    use crate::marketdata::MarketDataCache;
    use crate::testing::{sample_raw_quote, FakeMarketSource, SOL_MINT, USDC_MINT};

    fn resolver(source: Arc<FakeMarketSource>) -> QuoteResolver {
        let config = MarketDataConfig {
            retry_attempts: 1,
            retry_initial_delay_ms: 1,
            request_timeout_ms: 200,
            ..MarketDataConfig::default()
        };
        let cache = Arc::new(MarketDataCache::new(source, &config));
        QuoteResolver::new(cache, Duration::from_secs(10))
    }

    fn liquid_source() -> Arc<FakeMarketSource> {
        let source = Arc::new(FakeMarketSource::new());
        source.set_liquidity(SOL_MINT, 10_000_000.0, Some(150.0));
        source.set_liquidity(USDC_MINT, 50_000_000.0, Some(1.0));
        source.set_quote(sample_raw_quote(100_000_000, 650_000_000));
        source
    }

    #[tokio::test]
    async fn test_thin_liquidity_rejected() {
        let source = liquid_source();
        source.set_liquidity(SOL_MINT, 10_000.0, Some(150.0));
        let resolver = resolver(source.clone());

        let err = resolver
            .resolve(USDC_MINT, SOL_MINT, 100_000_000, 50, 25_000.0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QuoteError::InsufficientLiquidity { liquidity_usd, min_liquidity_usd, .. }
                if liquidity_usd == 10_000.0 && min_liquidity_usd == 25_000.0
        ));
        assert_eq!(source.quote_calls(), 0);
    }

    #[tokio::test]
    async fn test_unconfirmed_liquidity_fails_closed() {
        let source = liquid_source();
        source.fail_liquidity(true);
        let resolver = resolver(source);

        let err = resolver
            .resolve(USDC_MINT, SOL_MINT, 100_000_000, 50, 25_000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::LiquidityUnverified { .. }));
        assert_eq!(
            crate::errors::Classify::kind(&err),
            crate::errors::ErrorKind::InsufficientLiquidity
        );
    }

    #[tokio::test]
    async fn test_resolves_normalized_quote() {
        let resolver = resolver(liquid_source());

        let quote = resolver
            .resolve(USDC_MINT, SOL_MINT, 100_000_000, 50, 25_000.0)
            .await
            .unwrap();
        assert_eq!(quote.input_amount, 100_000_000);
        assert_eq!(quote.output_amount, 650_000_000);
        assert_eq!(quote.input_decimals, 6);
        assert_eq!(quote.output_decimals, 9);
        assert!((quote.unit_price - 0.0065).abs() < 1e-12);
        assert_eq!(quote.liquidity_usd, 10_000_000.0);
        assert!(quote.is_fresh(chrono::Utc::now(), Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_mismatched_amount_rejected() {
        let resolver = resolver(liquid_source());

        let err = resolver
            .resolve(USDC_MINT, SOL_MINT, 5_000, 50, 25_000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::InvalidQuote { .. }));
    }
}
