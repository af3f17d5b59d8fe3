/// Jupiter + DexScreener market data source
///
/// Listings and token metadata come from the Jupiter token API, quotes from
/// Jupiter's swap quote endpoint and pooled liquidity from DexScreener.
use super::source::MarketDataSource;
use super::types::{
    Fetched, LiquiditySnapshot, QuoteParams, RawQuote, RouteHop, TokenListing, Validators,
};
use crate::config::MarketDataConfig;
use crate::errors::{ConfigError, MarketDataError};
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderName, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// API TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct JupiterTokenInfo {
    id: String,
    symbol: String,
    decimals: u8,
}

impl From<JupiterTokenInfo> for TokenListing {
    fn from(token: JupiterTokenInfo) -> Self {
        TokenListing {
            mint: token.id,
            symbol: token.symbol,
            decimals: token.decimals,
        }
    }
}

#[derive(Debug, Serialize)]
struct JupiterQuoteRequest<'a> {
    #[serde(rename = "inputMint")]
    input_mint: &'a str,
    #[serde(rename = "outputMint")]
    output_mint: &'a str,
    amount: String,
    #[serde(rename = "slippageBps")]
    slippage_bps: u16,
}

#[derive(Debug, Deserialize)]
struct JupiterQuoteResponse {
    #[serde(rename = "inputMint")]
    input_mint: String,
    #[serde(rename = "inAmount")]
    in_amount: String,
    #[serde(rename = "outputMint")]
    output_mint: String,
    #[serde(rename = "outAmount")]
    out_amount: String,
    #[serde(rename = "otherAmountThreshold")]
    other_amount_threshold: String,
    #[serde(rename = "slippageBps")]
    slippage_bps: u16,
    #[serde(rename = "priceImpactPct", default)]
    price_impact_pct: Option<String>,
    #[serde(rename = "routePlan", default)]
    route_plan: Vec<RoutePlanStep>,
    #[serde(rename = "platformFee", default)]
    platform_fee: Option<PlatformFee>,
}

#[derive(Debug, Deserialize)]
struct RoutePlanStep {
    #[serde(rename = "swapInfo")]
    swap_info: SwapInfo,
    percent: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct SwapInfo {
    #[serde(rename = "ammKey")]
    amm_key: String,
    label: Option<String>,
    #[serde(rename = "feeAmount", default)]
    fee_amount: Option<String>,
    #[serde(rename = "feeMint", default)]
    fee_mint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlatformFee {
    amount: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DexTokenPairsResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    base_token: Option<DexToken>,
    price_usd: Option<String>,
    liquidity: Option<DexLiquidity>,
}

#[derive(Debug, Deserialize)]
struct DexToken {
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DexLiquidity {
    usd: Option<f64>,
}

// ============================================================================
// DECODING
// ============================================================================

fn parse_amount(resource: &str, field: &str, value: &str) -> Result<u64, MarketDataError> {
    value.parse::<u64>().map_err(|e| MarketDataError::Parse {
        resource: resource.to_string(),
        reason: format!("invalid {} '{}': {}", field, value, e),
    })
}

fn decode_json<T: DeserializeOwned>(resource: &str, body: &str) -> Result<T, MarketDataError> {
    serde_json::from_str(body).map_err(|e| MarketDataError::Parse {
        resource: resource.to_string(),
        reason: e.to_string(),
    })
}

/// Decode a Jupiter quote body, keeping the full payload for the swap builder
pub(crate) fn decode_quote(body: &str) -> Result<RawQuote, MarketDataError> {
    const RESOURCE: &str = "quote";
    let payload: serde_json::Value = decode_json(RESOURCE, body)?;
    let response: JupiterQuoteResponse =
        serde_json::from_value(payload.clone()).map_err(|e| MarketDataError::Parse {
            resource: RESOURCE.to_string(),
            reason: e.to_string(),
        })?;

    let mut route_plan = Vec::with_capacity(response.route_plan.len());
    for step in response.route_plan {
        let fee_amount = match step.swap_info.fee_amount.as_deref() {
            Some(raw) => parse_amount(RESOURCE, "feeAmount", raw)?,
            None => 0,
        };
        route_plan.push(RouteHop {
            label: step.swap_info.label.unwrap_or_else(|| "Unknown".to_string()),
            amm_key: step.swap_info.amm_key,
            percent: step.percent.unwrap_or(100),
            fee_amount,
            fee_mint: step.swap_info.fee_mint.unwrap_or_default(),
        });
    }

    let platform_fee_amount = match response.platform_fee.and_then(|f| f.amount) {
        Some(raw) => parse_amount(RESOURCE, "platformFee.amount", &raw)?,
        None => 0,
    };

    let price_impact_pct = response
        .price_impact_pct
        .as_deref()
        .and_then(|raw| raw.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(RawQuote {
        in_amount: parse_amount(RESOURCE, "inAmount", &response.in_amount)?,
        out_amount: parse_amount(RESOURCE, "outAmount", &response.out_amount)?,
        other_amount_threshold: parse_amount(
            RESOURCE,
            "otherAmountThreshold",
            &response.other_amount_threshold,
        )?,
        input_mint: response.input_mint,
        output_mint: response.output_mint,
        slippage_bps: response.slippage_bps,
        price_impact_pct,
        route_plan,
        platform_fee_amount,
        payload,
    })
}

/// Sum pooled USD liquidity across every pair that lists `mint`
pub(crate) fn decode_liquidity(mint: &str, body: &str) -> Result<LiquiditySnapshot, MarketDataError> {
    let response: DexTokenPairsResponse = decode_json("liquidity", body)?;
    let pairs = response.pairs.unwrap_or_default();

    let mut total_liquidity_usd = 0.0;
    let mut best: Option<(f64, Option<f64>)> = None;
    for pair in &pairs {
        let liquidity = pair.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
        total_liquidity_usd += liquidity;

        let is_base = pair
            .base_token
            .as_ref()
            .and_then(|t| t.address.as_deref())
            .map_or(false, |address| address == mint);
        if !is_base {
            continue;
        }
        let price = pair
            .price_usd
            .as_deref()
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p > 0.0);
        if best.map_or(true, |(top, _)| liquidity > top) {
            best = Some((liquidity, price));
        }
    }

    Ok(LiquiditySnapshot {
        token: mint.to_string(),
        total_liquidity_usd,
        pool_count: pairs.len(),
        price_usd: best.and_then(|(_, price)| price),
        fetched_at: Utc::now(),
    })
}

// ============================================================================
// SOURCE
// ============================================================================

pub struct HttpMarketSource {
    client: Client,
    jupiter_api_base: String,
    jupiter_api_key: String,
    dexscreener_api_base: String,
    timeout_ms: u64,
}

impl HttpMarketSource {
    pub fn new(config: &MarketDataConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "marketdata",
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            jupiter_api_base: config.jupiter_api_base.trim_end_matches('/').to_string(),
            jupiter_api_key: config.jupiter_api_key.clone(),
            dexscreener_api_base: config.dexscreener_api_base.trim_end_matches('/').to_string(),
            timeout_ms: config.request_timeout_ms,
        })
    }

    fn jupiter(&self, request: RequestBuilder) -> RequestBuilder {
        if self.jupiter_api_key.is_empty() {
            request
        } else {
            request.header("x-api-key", &self.jupiter_api_key)
        }
    }

    /// Send a conditional GET; `None` means upstream answered 304
    async fn send_conditional(
        &self,
        resource: &str,
        request: RequestBuilder,
        validators: &Validators,
    ) -> Result<Option<(String, Validators)>, MarketDataError> {
        let mut request = request.header("Accept", "application/json");
        if let Some(etag) = &validators.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &validators.last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                MarketDataError::Timeout {
                    resource: resource.to_string(),
                    timeout_ms: self.timeout_ms,
                }
            } else {
                MarketDataError::Transport {
                    resource: resource.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            logger::verbose(LogTag::MarketData, &format!("{}: 304 not modified", resource));
            return Ok(None);
        }
        if !status.is_success() {
            return Err(MarketDataError::HttpStatus {
                resource: resource.to_string(),
                status: status.as_u16(),
            });
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        let fresh_validators = Validators {
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
        };

        let body = response.text().await.map_err(|e| MarketDataError::Transport {
            resource: resource.to_string(),
            reason: format!("failed to read body: {}", e),
        })?;

        Ok(Some((body, fresh_validators)))
    }
}

#[async_trait]
impl MarketDataSource for HttpMarketSource {
    fn name(&self) -> &'static str {
        "jupiter+dexscreener"
    }

    async fn fetch_listings(
        &self,
        validators: &Validators,
    ) -> Result<Fetched<Vec<TokenListing>>, MarketDataError> {
        let url = format!("{}/tokens/v2/tag", self.jupiter_api_base);
        let request = self.jupiter(self.client.get(&url).query(&[("query", "verified")]));

        let Some((body, validators)) = self.send_conditional("pairs", request, validators).await?
        else {
            return Ok(Fetched::NotModified);
        };
        let tokens: Vec<JupiterTokenInfo> = decode_json("pairs", &body)?;
        logger::debug(
            LogTag::MarketData,
            &format!("Fetched {} verified token listings", tokens.len()),
        );

        Ok(Fetched::Fresh {
            value: tokens.into_iter().map(TokenListing::from).collect(),
            validators,
        })
    }

    async fn fetch_token(
        &self,
        mint: &str,
        validators: &Validators,
    ) -> Result<Fetched<TokenListing>, MarketDataError> {
        let url = format!("{}/tokens/v2/search", self.jupiter_api_base);
        let request = self.jupiter(self.client.get(&url).query(&[("query", mint)]));

        let Some((body, validators)) = self.send_conditional("token", request, validators).await?
        else {
            return Ok(Fetched::NotModified);
        };
        let tokens: Vec<JupiterTokenInfo> = decode_json("token", &body)?;
        let token = tokens
            .into_iter()
            .find(|t| t.id == mint)
            .ok_or_else(|| MarketDataError::Unavailable {
                resource: "token".to_string(),
                reason: format!("mint {} not listed", mint),
            })?;

        Ok(Fetched::Fresh {
            value: token.into(),
            validators,
        })
    }

    async fn fetch_quote(
        &self,
        params: &QuoteParams,
        validators: &Validators,
    ) -> Result<Fetched<RawQuote>, MarketDataError> {
        let url = format!("{}/swap/v1/quote", self.jupiter_api_base);
        let query = JupiterQuoteRequest {
            input_mint: &params.input_mint,
            output_mint: &params.output_mint,
            amount: params.amount.to_string(),
            slippage_bps: params.slippage_bps,
        };
        let request = self.jupiter(self.client.get(&url).query(&query));

        logger::debug(
            LogTag::Quote,
            &format!(
                "Jupiter quote request: {} {} -> {} ({}bps)",
                params.amount, params.input_mint, params.output_mint, params.slippage_bps
            ),
        );

        let Some((body, validators)) = self.send_conditional("quote", request, validators).await?
        else {
            return Ok(Fetched::NotModified);
        };

        Ok(Fetched::Fresh {
            value: decode_quote(&body)?,
            validators,
        })
    }

    async fn fetch_liquidity(
        &self,
        mint: &str,
        validators: &Validators,
    ) -> Result<Fetched<LiquiditySnapshot>, MarketDataError> {
        let url = format!("{}/latest/dex/tokens/{}", self.dexscreener_api_base, mint);
        let request = self.client.get(&url);

        let Some((body, validators)) = self
            .send_conditional("liquidity", request, validators)
            .await?
        else {
            return Ok(Fetched::NotModified);
        };

        Ok(Fetched::Fresh {
            value: decode_liquidity(mint, &body)?,
            validators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOL: &str = "So11111111111111111111111111111111111111112";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    #[test]
    fn test_decode_quote_collects_fees() {
        let body = format!(
            r#"{{
                "inputMint": "{usdc}",
                "inAmount": "100000000",
                "outputMint": "{sol}",
                "outAmount": "650000000",
                "otherAmountThreshold": "646750000",
                "swapMode": "ExactIn",
                "slippageBps": 50,
                "platformFee": {{ "amount": "1000", "feeBps": 10 }},
                "priceImpactPct": "0.0012",
                "routePlan": [
                    {{
                        "swapInfo": {{
                            "ammKey": "amm1",
                            "label": "Whirlpool",
                            "inputMint": "{usdc}",
                            "outputMint": "{sol}",
                            "feeAmount": "2500",
                            "feeMint": "{sol}"
                        }},
                        "percent": 100
                    }}
                ]
            }}"#,
            usdc = USDC,
            sol = SOL
        );

        let quote = decode_quote(&body).unwrap();
        assert_eq!(quote.in_amount, 100_000_000);
        assert_eq!(quote.out_amount, 650_000_000);
        assert_eq!(quote.other_amount_threshold, 646_750_000);
        assert_eq!(quote.platform_fee_amount, 1000);
        assert_eq!(quote.route_plan.len(), 1);
        assert_eq!(quote.route_plan[0].label, "Whirlpool");
        assert_eq!(quote.route_plan[0].fee_amount, 2500);
        assert!((quote.price_impact_pct - 0.0012).abs() < 1e-12);
        assert_eq!(quote.payload["swapMode"], "ExactIn");
    }

    #[test]
    fn test_decode_quote_rejects_bad_amount() {
        let body = r#"{"inputMint":"a","inAmount":"x","outputMint":"b","outAmount":"1",
            "otherAmountThreshold":"1","slippageBps":50,"routePlan":[]}"#;
        assert!(matches!(
            decode_quote(body),
            Err(MarketDataError::Parse { .. })
        ));
    }

    #[test]
    fn test_decode_liquidity_sums_pools() {
        let body = format!(
            r#"{{
                "pairs": [
                    {{ "baseToken": {{ "address": "{sol}" }}, "priceUsd": "150.5", "liquidity": {{ "usd": 40000.0 }} }},
                    {{ "baseToken": {{ "address": "{sol}" }}, "priceUsd": "149.0", "liquidity": {{ "usd": 10000.0 }} }},
                    {{ "baseToken": {{ "address": "{usdc}" }}, "priceUsd": "1.0", "liquidity": {{ "usd": 5000.0 }} }}
                ]
            }}"#,
            sol = SOL,
            usdc = USDC
        );

        let snapshot = decode_liquidity(SOL, &body).unwrap();
        assert_eq!(snapshot.pool_count, 3);
        assert!((snapshot.total_liquidity_usd - 55_000.0).abs() < 1e-9);
        assert_eq!(snapshot.price_usd, Some(150.5));
    }

    #[test]
    fn test_decode_liquidity_without_pairs() {
        let snapshot = decode_liquidity(SOL, r#"{"schemaVersion":"1.0.0","pairs":null}"#).unwrap();
        assert_eq!(snapshot.pool_count, 0);
        assert_eq!(snapshot.total_liquidity_usd, 0.0);
        assert_eq!(snapshot.price_usd, None);
    }
}
