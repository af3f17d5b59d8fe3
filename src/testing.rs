//! In-process fakes for the market data source and the swap venue
//!
//! Public (but hidden from docs) so integration tests under `tests/` drive the
//! pipeline through the same fakes as the unit tests.

use crate::decision::{TradeAction, TradeDecision};
use crate::errors::{MarketDataError, VenueError};
use crate::marketdata::{
    Fetched, LiquiditySnapshot, MarketDataSource, QuoteParams, RawQuote, TokenListing, Validators,
};
use crate::quotes::Quote;
use crate::venue::paper::placeholder_transaction;
use crate::venue::{SignatureStatus, SignedSwap, SwapTransaction, SwapVenue};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// Raw SOL lamports per raw USDC unit (100 USDC -> 0.65 SOL)
const SOL_PER_USDC_RAW: f64 = 6.5;

pub fn sample_decision(request_id: &str, action: TradeAction, amount_usd: f64) -> TradeDecision {
    TradeDecision {
        request_id: request_id.to_string(),
        decision: action,
        token_pair: "SOL/USDC".to_string(),
        amount_usd: if action.is_trade() { Some(amount_usd) } else { None },
        confidence: 0.9,
        stop_loss_price: None,
        take_profit_price: None,
        reasoning: "test recommendation".to_string(),
    }
}

fn raw_quote_for(params: &QuoteParams, out_amount: u64) -> RawQuote {
    let threshold = out_amount - out_amount * params.slippage_bps as u64 / 10_000;
    RawQuote {
        input_mint: params.input_mint.clone(),
        output_mint: params.output_mint.clone(),
        in_amount: params.amount,
        out_amount,
        other_amount_threshold: threshold,
        slippage_bps: params.slippage_bps,
        price_impact_pct: 0.0,
        route_plan: Vec::new(),
        platform_fee_amount: 0,
        payload: serde_json::json!({
            "inputMint": params.input_mint,
            "inAmount": params.amount.to_string(),
            "outputMint": params.output_mint,
            "outAmount": out_amount.to_string(),
            "otherAmountThreshold": threshold.to_string(),
            "slippageBps": params.slippage_bps,
            "routePlan": [],
        }),
    }
}

/// USDC -> SOL quote for `in_amount` raw USDC
pub fn sample_raw_quote(in_amount: u64, out_amount: u64) -> RawQuote {
    raw_quote_for(
        &QuoteParams {
            input_mint: USDC_MINT.to_string(),
            output_mint: SOL_MINT.to_string(),
            amount: in_amount,
            slippage_bps: 50,
        },
        out_amount,
    )
}

/// Fresh normalized 100 USDC -> 0.65 SOL quote
pub fn sample_quote() -> Quote {
    let raw = sample_raw_quote(100_000_000, 650_000_000);
    Quote {
        input_mint: raw.input_mint.clone(),
        output_mint: raw.output_mint.clone(),
        input_amount: raw.in_amount,
        output_amount: raw.out_amount,
        input_decimals: 6,
        output_decimals: 9,
        unit_price: 0.0065,
        fee: 0,
        slippage_bps: raw.slippage_bps,
        slippage: 0.005,
        min_output_amount: raw.other_amount_threshold,
        price_impact_pct: 0.0,
        route_plan: Vec::new(),
        liquidity_usd: 10_000_000.0,
        fetched_at: Utc::now(),
        payload: raw.payload,
    }
}

// =============================================================================
// MARKET DATA SOURCE
// =============================================================================

pub struct FakeMarketSource {
    listings: Mutex<Vec<TokenListing>>,
    liquidity: Mutex<HashMap<String, (f64, Option<f64>)>>,
    fixed_quote: Mutex<Option<RawQuote>>,
    fail_liquidity: Mutex<bool>,
    fail_quotes: Mutex<bool>,
    latency: Mutex<Duration>,
    listing_calls: AtomicUsize,
    quote_calls: AtomicUsize,
    liquidity_calls: AtomicUsize,
}

impl FakeMarketSource {
    /// SOL and USDC listed; no liquidity until set
    pub fn new() -> Self {
        Self {
            listings: Mutex::new(vec![
                TokenListing {
                    mint: SOL_MINT.to_string(),
                    symbol: "SOL".to_string(),
                    decimals: 9,
                },
                TokenListing {
                    mint: USDC_MINT.to_string(),
                    symbol: "USDC".to_string(),
                    decimals: 6,
                },
            ]),
            liquidity: Mutex::new(HashMap::new()),
            fixed_quote: Mutex::new(None),
            fail_liquidity: Mutex::new(false),
            fail_quotes: Mutex::new(false),
            latency: Mutex::new(Duration::ZERO),
            listing_calls: AtomicUsize::new(0),
            quote_calls: AtomicUsize::new(0),
            liquidity_calls: AtomicUsize::new(0),
        }
    }

    /// Deep SOL/USDC market at ~$153.85 per SOL
    pub fn liquid() -> Self {
        let source = Self::new();
        source.set_liquidity(SOL_MINT, 10_000_000.0, Some(1.0 / 0.0065));
        source.set_liquidity(USDC_MINT, 50_000_000.0, Some(1.0));
        source
    }

    pub fn add_listing(&self, listing: TokenListing) {
        self.listings.lock().push(listing);
    }

    pub fn set_liquidity(&self, mint: &str, liquidity_usd: f64, price_usd: Option<f64>) {
        self.liquidity
            .lock()
            .insert(mint.to_string(), (liquidity_usd, price_usd));
    }

    /// Always answer quotes with this one, whatever the parameters
    pub fn set_quote(&self, quote: RawQuote) {
        *self.fixed_quote.lock() = Some(quote);
    }

    pub fn fail_liquidity(&self, fail: bool) {
        *self.fail_liquidity.lock() = fail;
    }

    pub fn fail_quotes(&self, fail: bool) {
        *self.fail_quotes.lock() = fail;
    }

    /// Every fetch sleeps this long before answering
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    async fn respond_later(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn liquidity_calls(&self) -> usize {
        self.liquidity_calls.load(Ordering::SeqCst)
    }

    fn unavailable(resource: &str) -> MarketDataError {
        MarketDataError::HttpStatus {
            resource: resource.to_string(),
            status: 503,
        }
    }
}

impl Default for FakeMarketSource {
    fn default() -> Self {
        Self::new()
    }
}

fn fresh<T>(value: T) -> Fetched<T> {
    Fetched::Fresh {
        value,
        validators: Validators {
            etag: Some("\"v1\"".to_string()),
            last_modified: None,
        },
    }
}

#[async_trait]
impl MarketDataSource for FakeMarketSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_listings(
        &self,
        _validators: &Validators,
    ) -> Result<Fetched<Vec<TokenListing>>, MarketDataError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        self.respond_later().await;
        Ok(fresh(self.listings.lock().clone()))
    }

    async fn fetch_token(
        &self,
        mint: &str,
        _validators: &Validators,
    ) -> Result<Fetched<TokenListing>, MarketDataError> {
        self.listings
            .lock()
            .iter()
            .find(|t| t.mint == mint)
            .cloned()
            .map(fresh)
            .ok_or_else(|| MarketDataError::Unavailable {
                resource: "token".to_string(),
                reason: format!("mint {} not listed", mint),
            })
    }

    async fn fetch_quote(
        &self,
        params: &QuoteParams,
        _validators: &Validators,
    ) -> Result<Fetched<RawQuote>, MarketDataError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.respond_later().await;
        if *self.fail_quotes.lock() {
            return Err(Self::unavailable("quote"));
        }
        if let Some(quote) = self.fixed_quote.lock().clone() {
            return Ok(fresh(quote));
        }

        let rate = if params.input_mint == USDC_MINT {
            SOL_PER_USDC_RAW
        } else {
            1.0 / SOL_PER_USDC_RAW
        };
        let out_amount = (params.amount as f64 * rate).floor() as u64;
        Ok(fresh(raw_quote_for(params, out_amount)))
    }

    async fn fetch_liquidity(
        &self,
        mint: &str,
        _validators: &Validators,
    ) -> Result<Fetched<LiquiditySnapshot>, MarketDataError> {
        self.liquidity_calls.fetch_add(1, Ordering::SeqCst);
        self.respond_later().await;
        if *self.fail_liquidity.lock() {
            return Err(Self::unavailable("liquidity"));
        }
        let (total_liquidity_usd, price_usd) =
            self.liquidity.lock().get(mint).copied().unwrap_or((0.0, None));
        Ok(fresh(LiquiditySnapshot {
            token: mint.to_string(),
            total_liquidity_usd,
            pool_count: if total_liquidity_usd > 0.0 { 1 } else { 0 },
            price_usd,
            fetched_at: Utc::now(),
        }))
    }
}

// =============================================================================
// SWAP VENUE
// =============================================================================

/// Scriptable venue; by default every submitted signature confirms at once
pub struct FakeVenue {
    fee_per_signature: AtomicU64,
    fail_fee_lookup: Mutex<bool>,
    transaction_fee: Mutex<Result<u64, String>>,
    submit_error: Mutex<Option<VenueError>>,
    statuses: Mutex<VecDeque<SignatureStatus>>,
    status_delay: Mutex<Duration>,
    block_height: AtomicU64,
    submitted: Mutex<HashSet<String>>,
    fee_calls: AtomicUsize,
    build_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl FakeVenue {
    pub fn new() -> Self {
        Self {
            fee_per_signature: AtomicU64::new(5_000),
            fail_fee_lookup: Mutex::new(false),
            transaction_fee: Mutex::new(Ok(5_000)),
            submit_error: Mutex::new(None),
            statuses: Mutex::new(VecDeque::new()),
            status_delay: Mutex::new(Duration::ZERO),
            block_height: AtomicU64::new(1_000),
            submitted: Mutex::new(HashSet::new()),
            fee_calls: AtomicUsize::new(0),
            build_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fee_per_signature(&self, lamports: u64) {
        self.fee_per_signature.store(lamports, Ordering::SeqCst);
    }

    pub fn fail_fee_lookup(&self, fail: bool) {
        *self.fail_fee_lookup.lock() = fail;
    }

    pub fn set_transaction_fee(&self, fee: Result<u64, String>) {
        *self.transaction_fee.lock() = fee;
    }

    /// Every submission fails with `err`
    pub fn fail_submit(&self, err: VenueError) {
        *self.submit_error.lock() = Some(err);
    }

    /// Statuses returned in order; the last one repeats
    pub fn script_statuses(&self, statuses: Vec<SignatureStatus>) {
        *self.statuses.lock() = statuses.into();
    }

    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock() = delay;
    }

    pub fn set_block_height(&self, height: u64) {
        self.block_height.store(height, Ordering::SeqCst);
    }

    pub fn fee_calls(&self) -> usize {
        self.fee_calls.load(Ordering::SeqCst)
    }

    pub fn build_calls(&self) -> usize {
        self.build_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Placeholder transaction paid by a random key
    pub fn sample_transaction(&self) -> SwapTransaction {
        let payer = Pubkey::new_unique();
        match placeholder_transaction(&payer, 1, 1) {
            Ok(tx) => tx,
            Err(e) => panic!("placeholder transaction: {}", e),
        }
    }

    fn next_status(&self, signature: &str) -> SignatureStatus {
        let mut statuses = self.statuses.lock();
        if statuses.len() > 1 {
            if let Some(status) = statuses.pop_front() {
                return status;
            }
        }
        if let Some(status) = statuses.front() {
            return status.clone();
        }
        if self.submitted.lock().contains(signature) {
            SignatureStatus::Confirmed
        } else {
            SignatureStatus::NotFound
        }
    }
}

impl Default for FakeVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwapVenue for FakeVenue {
    fn id(&self) -> &'static str {
        "fake"
    }

    async fn build_swap(&self, quote: &Quote, payer: &str) -> Result<SwapTransaction, VenueError> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        let payer = Pubkey::from_str(payer).map_err(|e| VenueError::Rejected {
            operation: "build_swap",
            reason: e.to_string(),
        })?;
        let mut tx = placeholder_transaction(&payer, quote.output_amount, quote.min_output_amount)?;
        tx.venue = "fake".to_string();
        tx.last_valid_block_height = Some(self.block_height.load(Ordering::SeqCst) + 150);
        Ok(tx)
    }

    async fn fee_per_signature(&self) -> Result<u64, VenueError> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_fee_lookup.lock() {
            return Err(VenueError::Transport {
                operation: "get_fee_for_message",
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.fee_per_signature.load(Ordering::SeqCst))
    }

    async fn estimate_fee(&self, _transaction: &SwapTransaction) -> Result<u64, VenueError> {
        self.transaction_fee
            .lock()
            .clone()
            .map_err(|reason| VenueError::InvalidResponse {
                operation: "get_fee_for_message",
                reason,
            })
    }

    async fn submit(&self, signed: &SignedSwap) -> Result<String, VenueError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.submit_error.lock().clone() {
            return Err(err);
        }
        self.submitted.lock().insert(signed.signature.clone());
        Ok(signed.signature.clone())
    }

    async fn signature_status(&self, signature: &str) -> Result<SignatureStatus, VenueError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.next_status(signature))
    }

    async fn block_height(&self) -> Result<u64, VenueError> {
        Ok(self.block_height.load(Ordering::SeqCst))
    }
}
