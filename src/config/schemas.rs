/// Configuration schemas - every section defined once with its defaults
use crate::config_struct;

// ============================================================================
// RISK LIMITS
// ============================================================================

config_struct! {
    /// Position-size, confidence and daily-loss limits
    pub struct RiskConfig {
        max_trade_size_usd: f64 = 100.0,
        max_daily_loss_usd: f64 = 500.0,
        max_open_positions: usize = 5,
        min_confidence: f64 = 0.6,
        /// Capital the bot may deploy; today's open exposure is subtracted from it
        available_capital_usd: f64 = 1_000.0,
    }
}

// ============================================================================
// QUOTES
// ============================================================================

config_struct! {
    /// Quote resolution and liquidity policy
    pub struct QuotesConfig {
        min_liquidity_usd: f64 = 25_000.0,
        slippage_bps: u16 = 50,
        /// Quotes older than this are never executed
        freshness_secs: u64 = 10,
    }
}

// ============================================================================
// MARKET DATA
// ============================================================================

config_struct! {
    /// Upstream endpoints, cache TTLs and fetch policy
    pub struct MarketDataConfig {
        jupiter_api_base: String = "https://lite-api.jup.ag".to_string(),
        /// Optional key for higher rate limits (portal.jup.ag)
        jupiter_api_key: String = String::new(),
        dexscreener_api_base: String = "https://api.dexscreener.com".to_string(),

        pairs_ttl_secs: u64 = 300,
        quote_ttl_secs: u64 = 15,
        token_ttl_secs: u64 = 3_600,
        liquidity_ttl_secs: u64 = 60,

        request_timeout_ms: u64 = 4_000,
        retry_attempts: usize = 3,
        retry_initial_delay_ms: u64 = 200,
    }
}

// ============================================================================
// NETWORK HEALTH
// ============================================================================

config_struct! {
    /// Ledger endpoint and fee safety brakes
    pub struct NetworkConfig {
        rpc_url: String = "https://api.mainnet-beta.solana.com".to_string(),
        /// Reject execution above this fee per signature
        fee_ceiling_lamports: u64 = 10_000,
        /// Reject a built transaction whose exact fee exceeds this
        max_transaction_fee_lamports: u64 = 5_000_000,
        request_timeout_ms: u64 = 5_000,
    }
}

// ============================================================================
// EXECUTION
// ============================================================================

config_struct! {
    /// Swap venue selection, signing and confirmation
    pub struct ExecutionConfig {
        /// "jupiter" (live) or "paper" (simulated, no broadcast)
        venue: String = "paper".to_string(),
        /// Solana CLI style JSON array keypair file
        keypair_path: String = "data/keypair.json".to_string(),
        priority_fee_lamports: u64 = 10_000,
        submit_timeout_ms: u64 = 10_000,
        confirmation_timeout_secs: u64 = 60,
        confirmation_poll_ms: u64 = 500,
        /// PENDING records older than this are flagged for manual review
        manual_review_after_secs: u64 = 3_600,
    }
}

// ============================================================================
// JOURNAL
// ============================================================================

config_struct! {
    /// Trade journal persistence
    pub struct JournalConfig {
        path: String = "data/trades.db".to_string(),
    }
}

// ============================================================================
// LOGGING
// ============================================================================

config_struct! {
    pub struct LoggingConfig {
        /// Empty disables the file sink
        file_path: String = "data/logs/swapguard.log".to_string(),
        debug_tags: Vec<String> = Vec::new(),
        verbose: bool = false,
    }
}

// ============================================================================
// ROOT
// ============================================================================

config_struct! {
    /// Root configuration
    pub struct Config {
        risk: RiskConfig = RiskConfig::default(),
        quotes: QuotesConfig = QuotesConfig::default(),
        marketdata: MarketDataConfig = MarketDataConfig::default(),
        network: NetworkConfig = NetworkConfig::default(),
        execution: ExecutionConfig = ExecutionConfig::default(),
        journal: JournalConfig = JournalConfig::default(),
        logging: LoggingConfig = LoggingConfig::default(),
    }
}
