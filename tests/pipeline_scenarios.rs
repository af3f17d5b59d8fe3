//! End-to-end scenarios through the public pipeline API, against in-process fakes

use std::sync::Arc;
use swapguard::config::{Config, ExecutionConfig, MarketDataConfig, RiskConfig};
use swapguard::errors::ErrorKind;
use swapguard::pipeline::{Outcome, Pipeline};
use swapguard::testing::{FakeMarketSource, FakeVenue, SOL_MINT};
use swapguard::tracker::{Journal, TradeStatus, TradeTracker};
use swapguard::venue::{SignatureStatus, TradeSigner};

const BUY_500: &str = r#"Momentum looks strong. Recommendation:
{"request_id": "req-buy-500", "decision": "BUY", "token_pair": "SOL/USDC",
 "amount_usd": 500, "confidence": 0.9, "reasoning": "Breakout above resistance with volume"}"#;

fn config() -> Config {
    Config {
        risk: RiskConfig {
            max_trade_size_usd: 1_000.0,
            max_daily_loss_usd: 2_000.0,
            max_open_positions: 5,
            min_confidence: 0.6,
            available_capital_usd: 10_000.0,
        },
        marketdata: MarketDataConfig {
            retry_attempts: 1,
            retry_initial_delay_ms: 1,
            request_timeout_ms: 500,
            ..MarketDataConfig::default()
        },
        execution: ExecutionConfig {
            confirmation_timeout_secs: 1,
            confirmation_poll_ms: 50,
            ..ExecutionConfig::default()
        },
        ..Config::default()
    }
}

struct Scenario {
    source: Arc<FakeMarketSource>,
    venue: Arc<FakeVenue>,
    pipeline: Arc<Pipeline>,
}

fn scenario_with_tracker(tracker: Arc<TradeTracker>) -> Scenario {
    scenario_with(config(), tracker)
}

fn scenario_with(config: Config, tracker: Arc<TradeTracker>) -> Scenario {
    let source = Arc::new(FakeMarketSource::liquid());
    let venue = Arc::new(FakeVenue::new());
    let pipeline = Pipeline::with_components(
        config,
        source.clone(),
        venue.clone(),
        TradeSigner::ephemeral(),
        tracker,
    );
    Scenario {
        source,
        venue,
        pipeline: Arc::new(pipeline),
    }
}

fn scenario() -> Scenario {
    scenario_with_tracker(Arc::new(TradeTracker::in_memory().unwrap()))
}

#[tokio::test]
async fn buy_with_deep_liquidity_executes() {
    let s = scenario();

    let outcome = s.pipeline.process(BUY_500, None).await;
    let Outcome::Executed { decision, result } = outcome else {
        panic!("expected EXECUTED, got {:?}", outcome);
    };
    assert_eq!(decision.request_id, "req-buy-500");
    assert_eq!(result.status, TradeStatus::Executed);
    assert!(result.transaction_id.is_some());
    assert_eq!(result.fee_lamports, Some(5_000));
    assert!(!result.confirmation_timeout);

    let record = s.pipeline.tracker().get(&result.record_id).unwrap();
    assert_eq!(record.transaction_id, result.transaction_id);
    let quote = record.quote.unwrap();
    assert_eq!(quote.input_amount, 500_000_000);
    assert_eq!(quote.output_mint, SOL_MINT);
    assert_eq!(s.venue.submit_calls(), 1);
}

#[tokio::test]
async fn fee_ceiling_breach_fails_without_building() {
    let s = scenario();
    s.venue.set_fee_per_signature(50_000);

    let outcome = s.pipeline.process(BUY_500, None).await;
    let Outcome::Failed { result, .. } = outcome else {
        panic!("expected FAILED, got {:?}", outcome);
    };
    assert_eq!(result.error.unwrap().kind, ErrorKind::NetworkHealth);
    assert!(result.transaction_id.is_none());
    assert_eq!(s.venue.build_calls(), 0);
    assert_eq!(s.venue.submit_calls(), 0);
}

#[tokio::test]
async fn confirmation_timeout_leaves_trade_pending() {
    let s = scenario();
    s.venue.script_statuses(vec![SignatureStatus::Processed]);

    let outcome = s.pipeline.process(BUY_500, None).await;
    let Outcome::Pending { result, .. } = outcome else {
        panic!("expected PENDING, got {:?}", outcome);
    };
    assert!(result.confirmation_timeout);
    assert!(result.transaction_id.is_some());
    assert_eq!(result.error.unwrap().kind, ErrorKind::ConfirmationTimeout);

    let pending = s.pipeline.tracker().load_pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, result.record_id);
}

#[tokio::test]
async fn pending_trade_settles_on_reconciliation() {
    let s = scenario();
    s.venue.script_statuses(vec![SignatureStatus::Processed]);
    let outcome = s.pipeline.process(BUY_500, None).await;
    let record_id = outcome.result().unwrap().record_id.clone();

    s.venue.script_statuses(vec![SignatureStatus::Finalized]);
    let report = s.pipeline.reconciler().run_once().await;
    assert_eq!(report.executed, 1);

    let record = s.pipeline.tracker().get(&record_id).unwrap();
    assert_eq!(record.status, TradeStatus::Executed);
    assert!(record.confirmation_timeout);
    assert_eq!(s.venue.submit_calls(), 1);
}

#[tokio::test]
async fn same_request_twice_executes_once() {
    let s = scenario();
    s.venue
        .set_status_delay(std::time::Duration::from_millis(100));

    let (first, second) = tokio::join!(
        s.pipeline.process(BUY_500, None),
        s.pipeline.process(BUY_500, None)
    );

    let labels = [first.label(), second.label()];
    assert!(labels.contains(&"EXECUTED"), "{:?}", labels);
    assert!(labels.contains(&"NOT_ATTEMPTED"), "{:?}", labels);

    let rejected = if first.label() == "NOT_ATTEMPTED" { &first } else { &second };
    assert_eq!(rejected.error().unwrap().kind, ErrorKind::DuplicateRequest);
    assert_eq!(s.venue.submit_calls(), 1);

    let third = s.pipeline.process(BUY_500, None).await;
    assert_eq!(third.label(), "NOT_ATTEMPTED");
    assert_eq!(s.venue.submit_calls(), 1);
}

fn buy_600(request_id: &str) -> String {
    format!(
        r#"{{"request_id": "{}", "decision": "BUY", "token_pair": "SOL/USDC",
        "amount_usd": 600, "confidence": 0.9, "reasoning": "Breakout confirmed on volume"}}"#,
        request_id
    )
}

#[tokio::test]
async fn concurrent_buys_cannot_share_daily_limit() {
    let mut config = config();
    config.risk.max_daily_loss_usd = 1_000.0;
    let s = scenario_with(config, Arc::new(TradeTracker::in_memory().unwrap()));
    s.source.set_latency(std::time::Duration::from_millis(20));

    let req_a = buy_600("req-a");
    let req_b = buy_600("req-b");
    let (first, second) = tokio::join!(
        s.pipeline.process(&req_a, None),
        s.pipeline.process(&req_b, None)
    );

    let labels = [first.label(), second.label()];
    assert!(labels.contains(&"EXECUTED"), "{:?}", labels);
    assert!(labels.contains(&"NOT_ATTEMPTED"), "{:?}", labels);
    let rejected = if first.label() == "NOT_ATTEMPTED" { &first } else { &second };
    assert_eq!(rejected.error().unwrap().kind, ErrorKind::RiskRejection);
    assert_eq!(s.venue.submit_calls(), 1);

    let portfolio = s
        .pipeline
        .tracker()
        .portfolio_snapshot(10_000.0, chrono::Utc::now());
    assert_eq!(portfolio.daily_exposure_usd, 600.0);
}

#[tokio::test]
async fn rejected_buy_releases_its_reservation() {
    let mut config = config();
    config.risk.max_daily_loss_usd = 1_000.0;
    let s = scenario_with(config, Arc::new(TradeTracker::in_memory().unwrap()));
    s.source.fail_quotes(true);

    let unquoted = s.pipeline.process(&buy_600("req-a"), None).await;
    assert_eq!(unquoted.label(), "NOT_ATTEMPTED");
    assert_eq!(
        unquoted.error().unwrap().kind,
        ErrorKind::MarketDataUnavailable
    );

    s.source.fail_quotes(false);
    let retried = s.pipeline.process(&buy_600("req-b"), None).await;
    assert_eq!(retried.label(), "EXECUTED");
}

#[tokio::test]
async fn malformed_text_holds() {
    let s = scenario();

    let outcome = s
        .pipeline
        .process("I think you should buy some SOL, maybe $500?", None)
        .await;
    let Outcome::Hold { decision, error } = outcome else {
        panic!("expected HOLD, got {:?}", outcome);
    };
    assert_eq!(decision.confidence, 0.1);
    assert_eq!(error.unwrap().kind, ErrorKind::MalformedResponse);
    assert!(decision.reasoning.starts_with("MALFORMED_RESPONSE"));

    assert_eq!(s.source.quote_calls(), 0);
    assert!(s.pipeline.tracker().status_counts().is_empty());
    let logged = s.pipeline.tracker().recent_decisions(5).unwrap();
    assert_eq!(logged[0].outcome, "HOLD");
}

#[tokio::test]
async fn buy_without_amount_holds() {
    let s = scenario();
    let text = r#"{"decision": "BUY", "token_pair": "SOL/USDC", "amount_usd": null,
        "confidence": 0.9, "reasoning": "Strong setup"}"#;

    let outcome = s.pipeline.process(text, None).await;
    assert_eq!(outcome.label(), "HOLD");
    assert_eq!(outcome.error().unwrap().kind, ErrorKind::Validation);
}

#[tokio::test]
async fn thin_liquidity_is_not_attempted() {
    let s = scenario();
    s.source.set_liquidity(SOL_MINT, 10_000.0, Some(150.0));

    let outcome = s.pipeline.process(BUY_500, None).await;
    assert_eq!(outcome.label(), "NOT_ATTEMPTED");
    assert_eq!(
        outcome.error().unwrap().kind,
        ErrorKind::InsufficientLiquidity
    );
    assert_eq!(s.source.quote_calls(), 0);
    assert_eq!(s.venue.build_calls(), 0);
}

#[tokio::test]
async fn journal_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trades.db");
    let path = path.to_str().unwrap();

    let record_id = {
        let tracker = Arc::new(TradeTracker::open(Journal::open(path).unwrap()).unwrap());
        let s = scenario_with_tracker(tracker);
        let outcome = s.pipeline.process(BUY_500, None).await;
        assert_eq!(outcome.label(), "EXECUTED");
        outcome.result().unwrap().record_id.clone()
    };

    let reopened = TradeTracker::open(Journal::open(path).unwrap()).unwrap();
    let record = reopened.get(&record_id).unwrap();
    assert_eq!(record.status, TradeStatus::Executed);
    assert!(record.transaction_id.is_some());
    assert_eq!(reopened.history(&record_id).unwrap().len(), 3);

    let portfolio = reopened.portfolio_snapshot(10_000.0, chrono::Utc::now());
    assert_eq!(portfolio.open_positions, 1);
    assert_eq!(portfolio.available_capital_usd, 9_500.0);
}
