/// Decision-to-execution pipeline
///
/// The context object owning every component. Construct it once with
/// [`Pipeline::from_config`], feed it recommendation text with
/// [`Pipeline::process`] (concurrently through an `Arc` if needed) and call
/// [`Pipeline::shutdown`] on the way out.
use crate::config::Config;
use crate::decision::{self, TradeAction, TradeDecision};
use crate::errors::{
    Classify, ConfigError, ErrorInfo, ExecutionError, MarketDataError, QuoteError,
};
use crate::executor::{ExecutionSettings, TradeExecutor, TradeResult};
use crate::logger::{self, LogTag};
use crate::marketdata::{HttpMarketSource, MarketDataCache, MarketDataSource, TradingPair};
use crate::network::FeeHealthChecker;
use crate::quotes::{Quote, QuoteResolver};
use crate::reconcile::Reconciler;
use crate::risk::{self, Authorization, ParameterSuggestion, RiskLimits};
use crate::tracker::{DecisionLogEntry, Journal, TradeStatus, TradeTracker};
use crate::utils::{short_id, to_base_units};
use crate::venue::{self, SwapVenue, TradeSigner};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Quote tokens treated as worth exactly one USD
const USD_STABLECOINS: [&str; 2] = ["USDC", "USDT"];

/// What happened to one recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// HOLD decision, or the default HOLD substituted for invalid text
    Hold {
        decision: TradeDecision,
        error: Option<ErrorInfo>,
    },
    /// Stopped before a trade record existed (risk, market data, liquidity, duplicate)
    NotAttempted {
        decision: TradeDecision,
        error: ErrorInfo,
    },
    Executed {
        decision: TradeDecision,
        result: TradeResult,
    },
    Failed {
        decision: TradeDecision,
        result: TradeResult,
    },
    /// Submitted but unconfirmed; settled later by reconciliation
    Pending {
        decision: TradeDecision,
        result: TradeResult,
    },
}

impl Outcome {
    fn from_result(decision: TradeDecision, result: TradeResult) -> Self {
        match result.status {
            TradeStatus::Executed => Outcome::Executed { decision, result },
            TradeStatus::Pending => Outcome::Pending { decision, result },
            TradeStatus::Failed | TradeStatus::Cancelled => Outcome::Failed { decision, result },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Hold { .. } => "HOLD",
            Outcome::NotAttempted { .. } => "NOT_ATTEMPTED",
            Outcome::Executed { .. } => "EXECUTED",
            Outcome::Failed { .. } => "FAILED",
            Outcome::Pending { .. } => "PENDING",
        }
    }

    pub fn decision(&self) -> &TradeDecision {
        match self {
            Outcome::Hold { decision, .. }
            | Outcome::NotAttempted { decision, .. }
            | Outcome::Executed { decision, .. }
            | Outcome::Failed { decision, .. }
            | Outcome::Pending { decision, .. } => decision,
        }
    }

    pub fn result(&self) -> Option<&TradeResult> {
        match self {
            Outcome::Executed { result, .. }
            | Outcome::Failed { result, .. }
            | Outcome::Pending { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Outcome::Hold { error, .. } => error.as_ref(),
            Outcome::NotAttempted { error, .. } => Some(error),
            Outcome::Executed { result, .. }
            | Outcome::Failed { result, .. }
            | Outcome::Pending { result, .. } => result.error.as_ref(),
        }
    }
}

/// Swap leg derived from a decision: raw `amount` of `input_mint` into `output_mint`
#[derive(Debug, Clone, PartialEq)]
struct SwapLeg {
    input_mint: String,
    output_mint: String,
    amount: u64,
}

pub struct Pipeline {
    config: Config,
    limits: RiskLimits,
    marketdata: Arc<MarketDataCache>,
    resolver: QuoteResolver,
    tracker: Arc<TradeTracker>,
    venue: Arc<dyn SwapVenue>,
    executor: TradeExecutor,
}

impl Pipeline {
    /// Build every component from configuration
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let source: Arc<dyn MarketDataSource> = Arc::new(HttpMarketSource::new(&config.marketdata)?);
        let venue = venue::build_venue(&config.execution, &config.network, &config.marketdata)?;
        let signer = load_signer(&config)?;

        let journal = Journal::open(&config.journal.path).map_err(|e| ConfigError::Io {
            path: config.journal.path.clone(),
            reason: e.to_string(),
        })?;
        let tracker = TradeTracker::open(journal).map_err(|e| ConfigError::Io {
            path: config.journal.path.clone(),
            reason: e.to_string(),
        })?;

        logger::info(
            LogTag::System,
            &format!(
                "Pipeline ready: venue {}, signer {}, journal {}",
                venue.id(),
                signer.pubkey(),
                config.journal.path
            ),
        );

        Ok(Self::with_components(config, source, venue, signer, Arc::new(tracker)))
    }

    /// Assemble a pipeline around explicit collaborators
    pub fn with_components(
        config: Config,
        source: Arc<dyn MarketDataSource>,
        venue: Arc<dyn SwapVenue>,
        signer: TradeSigner,
        tracker: Arc<TradeTracker>,
    ) -> Self {
        let marketdata = Arc::new(MarketDataCache::new(source, &config.marketdata));
        let resolver = QuoteResolver::new(
            marketdata.clone(),
            Duration::from_secs(config.quotes.freshness_secs),
        );
        let health = Arc::new(FeeHealthChecker::new(venue.clone(), &config.network));
        let executor = TradeExecutor::new(
            venue.clone(),
            health,
            tracker.clone(),
            Arc::new(signer),
            ExecutionSettings::from_config(&config.execution, &config.quotes),
        );

        Self {
            limits: RiskLimits::from(&config.risk),
            config,
            marketdata,
            resolver,
            tracker,
            venue,
            executor,
        }
    }

    pub fn tracker(&self) -> &Arc<TradeTracker> {
        &self.tracker
    }

    pub fn marketdata(&self) -> &Arc<MarketDataCache> {
        &self.marketdata
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.tracker.clone(),
            self.venue.clone(),
            Duration::from_secs(self.config.execution.manual_review_after_secs),
        )
    }

    /// Run one recommendation through the whole pipeline; never fails
    pub async fn process(&self, raw_text: &str, advice: Option<&ParameterSuggestion>) -> Outcome {
        let outcome = self.run(raw_text, advice).await;
        self.log_decision(&outcome);
        outcome
    }

    async fn run(&self, raw_text: &str, advice: Option<&ParameterSuggestion>) -> Outcome {
        let (decision, validation_error) = decision::validate_or_hold(raw_text);
        if let Some(err) = validation_error {
            logger::warning(
                LogTag::Decision,
                &format!(
                    "Invalid recommendation ({}), holding: {}",
                    err.kind(),
                    err
                ),
            );
            return Outcome::Hold {
                decision,
                error: Some(ErrorInfo::from_error(&err)),
            };
        }

        logger::info(
            LogTag::Decision,
            &format!(
                "Decision {} {} {} (confidence {:.2}, request {})",
                decision.decision,
                decision.token_pair,
                decision
                    .amount_usd
                    .map(|a| format!("${:.2}", a))
                    .unwrap_or_else(|| "-".to_string()),
                decision.confidence,
                short_id(&decision.request_id)
            ),
        );

        if decision.decision == TradeAction::Hold {
            return Outcome::Hold {
                decision,
                error: None,
            };
        }

        let limits = match advice {
            Some(advice) => self.limits.with_advice(advice),
            None => self.limits.clone(),
        };
        // Held until execution returns so concurrent decisions see this exposure
        let reserved = self.tracker.reserve(
            &decision,
            self.config.risk.available_capital_usd,
            Utc::now(),
            |portfolio| risk::authorize(&decision, portfolio, &limits),
        );
        let (authorization, _reservation) = match reserved {
            Ok(reserved) => reserved,
            Err(rejection) => {
                logger::warning(
                    LogTag::Risk,
                    &format!(
                        "Request {} rejected: {}",
                        short_id(&decision.request_id),
                        rejection
                    ),
                );
                return Outcome::NotAttempted {
                    error: ErrorInfo::from_error(&rejection),
                    decision,
                };
            }
        };

        let slippage_bps = advice
            .map(|a| a.effective_slippage_bps(self.config.quotes.slippage_bps))
            .unwrap_or(self.config.quotes.slippage_bps);

        let quote = match self.quote_for(&authorization, slippage_bps).await {
            Ok(quote) => quote,
            Err(err) => {
                logger::warning(
                    LogTag::Quote,
                    &format!(
                        "No executable quote for {} {}: {} ({})",
                        authorization.action,
                        authorization.token_pair,
                        err,
                        err.kind()
                    ),
                );
                return Outcome::NotAttempted {
                    error: ErrorInfo::from_error(&err),
                    decision,
                };
            }
        };

        match self.executor.execute(&decision, &authorization, &quote).await {
            Ok(result) => Outcome::from_result(decision, result),
            Err(err) => {
                if !matches!(err, ExecutionError::Tracker(_)) {
                    logger::error(LogTag::Executor, &format!("Execution not attempted: {}", err));
                } else {
                    logger::warning(LogTag::Executor, &format!("Execution not attempted: {}", err));
                }
                Outcome::NotAttempted {
                    error: ErrorInfo::from_error(&err),
                    decision,
                }
            }
        }
    }

    async fn quote_for(
        &self,
        authorization: &Authorization,
        slippage_bps: u16,
    ) -> Result<Quote, QuoteError> {
        let pair = self.marketdata.resolve_pair(&authorization.token_pair).await?;
        let leg = self.swap_leg(authorization, &pair).await?;
        self.resolver
            .resolve(
                &leg.input_mint,
                &leg.output_mint,
                leg.amount,
                slippage_bps,
                self.config.quotes.min_liquidity_usd,
            )
            .await
    }

    /// BUY spends the quote token, SELL spends the base token
    async fn swap_leg(
        &self,
        authorization: &Authorization,
        pair: &TradingPair,
    ) -> Result<SwapLeg, QuoteError> {
        let (input, output) = match authorization.action {
            TradeAction::Buy => (&pair.quote, &pair.base),
            TradeAction::Sell => (&pair.base, &pair.quote),
            TradeAction::Hold => {
                return Err(QuoteError::InvalidQuote {
                    reason: "HOLD has no swap leg".to_string(),
                })
            }
        };

        let ui_amount = if is_usd_stablecoin(&input.symbol) {
            authorization.amount_usd
        } else {
            authorization.amount_usd / self.price_usd(&input.mint, &input.symbol).await?
        };

        let amount = to_base_units(ui_amount, input.decimals);
        if amount == 0 {
            return Err(QuoteError::InvalidQuote {
                reason: format!(
                    "${:.2} is less than one base unit of {}",
                    authorization.amount_usd, input.symbol
                ),
            });
        }

        Ok(SwapLeg {
            input_mint: input.mint.clone(),
            output_mint: output.mint.clone(),
            amount,
        })
    }

    async fn price_usd(&self, mint: &str, symbol: &str) -> Result<f64, MarketDataError> {
        let snapshot = self.marketdata.get_liquidity(mint, false).await?;
        if snapshot.degraded {
            return Err(MarketDataError::Unavailable {
                resource: "price".to_string(),
                reason: format!("{} price only available from a stale snapshot", symbol),
            });
        }
        snapshot
            .value
            .price_usd
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| MarketDataError::Unavailable {
                resource: "price".to_string(),
                reason: format!("no USD price for {}", symbol),
            })
    }

    fn log_decision(&self, outcome: &Outcome) {
        let decision = outcome.decision();
        let entry = DecisionLogEntry {
            request_id: decision.request_id.clone(),
            token_pair: decision.token_pair.clone(),
            action: decision.decision,
            confidence: decision.confidence,
            outcome: outcome.label().to_string(),
            record_id: outcome.result().map(|r| r.record_id.clone()),
            error: outcome.error().cloned(),
            at: Utc::now(),
        };
        if let Err(e) = self.tracker.record_decision(&entry) {
            logger::error(
                LogTag::Tracker,
                &format!("Failed to journal decision {}: {}", short_id(&entry.request_id), e),
            );
        }
    }

    /// Log final statistics and flush the log file
    pub fn shutdown(self) {
        let stats = self.marketdata.stats().total();
        let counts = self.tracker.status_counts();
        logger::info(
            LogTag::System,
            &format!(
                "Shutting down: {} executed, {} pending, {} failed; cache {} hits / {} misses / {} stale",
                counts.get(&TradeStatus::Executed).copied().unwrap_or(0),
                counts.get(&TradeStatus::Pending).copied().unwrap_or(0),
                counts.get(&TradeStatus::Failed).copied().unwrap_or(0),
                stats.hits,
                stats.misses,
                stats.stale_serves
            ),
        );
        drop(self);
        logger::flush();
    }
}

fn is_usd_stablecoin(symbol: &str) -> bool {
    USD_STABLECOINS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(symbol))
}

/// Live venues need the configured key; the paper venue falls back to a throwaway one
fn load_signer(config: &Config) -> Result<TradeSigner, ConfigError> {
    let path = &config.execution.keypair_path;
    if config.execution.venue == "paper" && !Path::new(path).exists() {
        logger::info(
            LogTag::Config,
            &format!("No keypair at '{}', paper trading with an ephemeral key", path),
        );
        return Ok(TradeSigner::ephemeral());
    }
    TradeSigner::load(path)
}
