/// Trade executor
///
/// Turns an authorized decision and a fresh quote into an on-chain swap. The
/// trade record is created PENDING before anything touches the network and the
/// signature is journaled before submission, so every crash point leaves an
/// auditable record. Submission is never retried here.
use crate::config::{ExecutionConfig, QuotesConfig};
use crate::decision::TradeDecision;
use crate::errors::{Classify, ErrorInfo, ExecutionError, TrackerError, VenueError};
use crate::logger::{self, LogTag};
use crate::network::{FeeHealthChecker, NetworkFeeEstimate};
use crate::quotes::Quote;
use crate::risk::Authorization;
use crate::tracker::{
    confirmation_timeout_info, TradeRecord, TradeStatus, TradeTracker, TransitionExtra,
};
use crate::utils::short_id;
use crate::venue::{self, Confirmation, SwapVenue, TradeSigner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub record_id: String,
    pub request_id: String,
    pub status: TradeStatus,
    pub transaction_id: Option<String>,
    pub fee_lamports: Option<u64>,
    /// Confirmation budget ran out; the trade awaits reconciliation
    pub confirmation_timeout: bool,
    pub error: Option<ErrorInfo>,
    pub network_fee: Option<NetworkFeeEstimate>,
}

impl TradeResult {
    fn from_record(record: &TradeRecord, network_fee: Option<NetworkFeeEstimate>) -> Self {
        Self {
            record_id: record.id.clone(),
            request_id: record.request_id.clone(),
            status: record.status,
            transaction_id: record.transaction_id.clone(),
            fee_lamports: record.fee_lamports,
            confirmation_timeout: record.confirmation_timeout,
            error: record.error.clone(),
            network_fee,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionSettings {
    pub quote_freshness: Duration,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

impl ExecutionSettings {
    pub fn from_config(execution: &ExecutionConfig, quotes: &QuotesConfig) -> Self {
        Self {
            quote_freshness: Duration::from_secs(quotes.freshness_secs),
            confirmation_timeout: Duration::from_secs(execution.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(execution.confirmation_poll_ms),
        }
    }
}

/// Submission errors that leave the broadcast outcome unknown
fn submission_outcome_unknown(err: &VenueError) -> bool {
    matches!(err, VenueError::Timeout { .. } | VenueError::Transport { .. })
}

pub struct TradeExecutor {
    venue: Arc<dyn SwapVenue>,
    health: Arc<FeeHealthChecker>,
    tracker: Arc<TradeTracker>,
    signer: Arc<TradeSigner>,
    settings: ExecutionSettings,
}

impl TradeExecutor {
    pub fn new(
        venue: Arc<dyn SwapVenue>,
        health: Arc<FeeHealthChecker>,
        tracker: Arc<TradeTracker>,
        signer: Arc<TradeSigner>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            venue,
            health,
            tracker,
            signer,
            settings,
        }
    }

    /// Execute an authorized decision against a resolved quote
    ///
    /// `Err` means no attempt was made (duplicate request id, mismatched
    /// authorization, journal unavailable). Once a record exists the outcome,
    /// including failures, is reported through the returned [`TradeResult`].
    pub async fn execute(
        &self,
        decision: &TradeDecision,
        authorization: &Authorization,
        quote: &Quote,
    ) -> Result<TradeResult, ExecutionError> {
        if authorization.request_id != decision.request_id
            || authorization.action != decision.decision
        {
            return Err(ExecutionError::AuthorizationMismatch {
                reason: format!(
                    "authorization {} {} for decision {} {}",
                    authorization.action,
                    authorization.request_id,
                    decision.decision,
                    decision.request_id
                ),
            });
        }

        let _guard = self.tracker.lock_request(&decision.request_id).await;
        let record = self.tracker.create(decision, Some(quote))?;

        logger::info(
            LogTag::Executor,
            &format!(
                "Executing {} {} ${:.2} via {} (trade {})",
                decision.decision,
                decision.token_pair,
                authorization.amount_usd,
                self.venue.id(),
                short_id(&record.id)
            ),
        );

        self.run(&record, quote).await
    }

    async fn run(&self, record: &TradeRecord, quote: &Quote) -> Result<TradeResult, ExecutionError> {
        if let Err(e) = quote.ensure_fresh(self.settings.quote_freshness) {
            return self.fail(record, &ExecutionError::Quote(e), None);
        }

        let network_fee = match self.health.check().await {
            Ok(estimate) => estimate,
            Err(e) => return self.fail(record, &ExecutionError::NetworkHealth(e), None),
        };
        let network_fee = Some(network_fee);

        let payer = self.signer.pubkey().to_string();
        let transaction = match self.venue.build_swap(quote, &payer).await {
            Ok(tx) => tx,
            Err(e) => return self.fail(record, &ExecutionError::Build(e), network_fee),
        };

        let fee_lamports = match self.health.estimate_transaction_fee(&transaction).await {
            Ok(fee) => fee,
            Err(e) => return self.fail(record, &ExecutionError::NetworkHealth(e), network_fee),
        };

        let signed = match self.signer.sign(&transaction) {
            Ok(signed) => signed,
            Err(e) => {
                let err = ExecutionError::Signing {
                    reason: e.to_string(),
                };
                return self.fail(record, &err, network_fee);
            }
        };

        // Journal the signature before broadcasting so a crash mid-submit is reconcilable
        self.tracker.transition(
            &record.id,
            TradeStatus::Pending,
            TransitionExtra {
                transaction_id: Some(signed.signature.clone()),
                last_valid_block_height: signed.last_valid_block_height,
                fee_lamports: Some(fee_lamports),
                note: Some("signed".to_string()),
                ..TransitionExtra::default()
            },
        )?;

        let signature = match self.venue.submit(&signed).await {
            Ok(id) => {
                logger::info(
                    LogTag::Executor,
                    &format!("Submitted trade {}: {}", short_id(&record.id), id),
                );
                id
            }
            Err(e) if submission_outcome_unknown(&e) => {
                logger::warning(
                    LogTag::Executor,
                    &format!(
                        "Submission of {} ambiguous ({}), checking the ledger",
                        short_id(&signed.signature),
                        e
                    ),
                );
                signed.signature.clone()
            }
            Err(e) => return self.fail(record, &ExecutionError::Submit(e), network_fee),
        };

        let confirmation = venue::confirm(
            self.venue.as_ref(),
            &signature,
            self.settings.confirmation_timeout,
            self.settings.poll_interval,
        )
        .await;

        let written = match confirmation {
            Confirmation::Confirmed => self.tracker.transition(
                &record.id,
                TradeStatus::Executed,
                TransitionExtra {
                    transaction_id: Some(signature.clone()),
                    note: Some("confirmed".to_string()),
                    ..TransitionExtra::default()
                },
            ),
            Confirmation::Failed { reason } => {
                let err = ExecutionError::Submit(VenueError::Rejected {
                    operation: "confirm_transaction",
                    reason,
                });
                logger::error(
                    LogTag::Executor,
                    &format!("Trade {} failed on-ledger: {}", short_id(&record.id), err),
                );
                self.tracker.fail(&record.id, ErrorInfo::from_error(&err))
            }
            Confirmation::TimedOut { last_status } => {
                logger::warning(
                    LogTag::Executor,
                    &format!(
                        "Trade {} unconfirmed after {}s (last status {:?}); left PENDING",
                        short_id(&record.id),
                        self.settings.confirmation_timeout.as_secs(),
                        last_status
                    ),
                );
                self.tracker.transition(
                    &record.id,
                    TradeStatus::Pending,
                    TransitionExtra {
                        confirmation_timeout: true,
                        error: Some(confirmation_timeout_info(
                            &signature,
                            self.settings.confirmation_timeout.as_secs(),
                        )),
                        ..TransitionExtra::default()
                    },
                )
            }
        };

        Ok(self.after_broadcast(record, &signature, written, network_fee))
    }

    /// Once broadcast, a record that cannot be updated stays PENDING for reconciliation
    fn after_broadcast(
        &self,
        record: &TradeRecord,
        signature: &str,
        written: Result<TradeRecord, TrackerError>,
        network_fee: Option<NetworkFeeEstimate>,
    ) -> TradeResult {
        match written {
            Ok(updated) => TradeResult::from_record(&updated, network_fee),
            Err(e) => {
                logger::error(
                    LogTag::Executor,
                    &format!(
                        "Trade {} broadcast as {} but its outcome was not recorded: {}",
                        short_id(&record.id),
                        signature,
                        e
                    ),
                );
                let mut result = TradeResult::from_record(record, network_fee);
                result.status = TradeStatus::Pending;
                result.transaction_id = Some(signature.to_string());
                result.error = Some(ErrorInfo::from_error(&e));
                result
            }
        }
    }

    fn fail(
        &self,
        record: &TradeRecord,
        err: &ExecutionError,
        network_fee: Option<NetworkFeeEstimate>,
    ) -> Result<TradeResult, ExecutionError> {
        logger::error(
            LogTag::Executor,
            &format!("Trade {} failed: {} ({})", short_id(&record.id), err, err.kind()),
        );
        let failed = self.tracker.fail(&record.id, ErrorInfo::from_error(err))?;
        Ok(TradeResult::from_record(&failed, network_fee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::decision::TradeAction;
    use crate::errors::{ErrorKind, TrackerError};
    use crate::testing::{sample_decision, sample_quote, FakeVenue};
    use crate::venue::SignatureStatus;

    struct Harness {
        venue: Arc<FakeVenue>,
        tracker: Arc<TradeTracker>,
        executor: TradeExecutor,
    }

    fn harness() -> Harness {
        let venue = Arc::new(FakeVenue::new());
        let tracker = Arc::new(TradeTracker::in_memory().unwrap());
        let health = Arc::new(FeeHealthChecker::new(
            venue.clone(),
            &NetworkConfig {
                fee_ceiling_lamports: 10_000,
                request_timeout_ms: 200,
                ..NetworkConfig::default()
            },
        ));
        let executor = TradeExecutor::new(
            venue.clone(),
            health,
            tracker.clone(),
            Arc::new(TradeSigner::ephemeral()),
            ExecutionSettings {
                quote_freshness: Duration::from_secs(10),
                confirmation_timeout: Duration::from_millis(100),
                poll_interval: Duration::from_millis(5),
            },
        );
        Harness {
            venue,
            tracker,
            executor,
        }
    }

    fn authorization(decision: &TradeDecision) -> Authorization {
        Authorization {
            request_id: decision.request_id.clone(),
            action: decision.decision,
            token_pair: decision.token_pair.clone(),
            amount_usd: decision.amount_usd.unwrap_or(0.0),
        }
    }

    #[tokio::test]
    async fn test_confirmed_trade_is_executed() {
        let h = harness();
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);

        let result = h
            .executor
            .execute(&decision, &authorization(&decision), &sample_quote())
            .await
            .unwrap();

        assert_eq!(result.status, TradeStatus::Executed);
        assert!(result.transaction_id.is_some());
        assert_eq!(result.fee_lamports, Some(5_000));
        assert_eq!(h.venue.submit_calls(), 1);

        let history = h.tracker.history(&result.record_id).unwrap();
        let statuses: Vec<_> = history.iter().map(|t| t.to).collect();
        assert_eq!(
            statuses,
            vec![TradeStatus::Pending, TradeStatus::Pending, TradeStatus::Executed]
        );
        // signature journaled before submission
        assert_eq!(history[1].extra.transaction_id, result.transaction_id);
    }

    #[tokio::test]
    async fn test_fee_ceiling_fails_before_build() {
        let h = harness();
        h.venue.set_fee_per_signature(50_000);
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);

        let result = h
            .executor
            .execute(&decision, &authorization(&decision), &sample_quote())
            .await
            .unwrap();

        assert_eq!(result.status, TradeStatus::Failed);
        assert_eq!(result.error.unwrap().kind, ErrorKind::NetworkHealth);
        assert_eq!(h.venue.build_calls(), 0);
        assert_eq!(h.venue.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_fee_estimation_error_blocks_submission() {
        let h = harness();
        h.venue.set_transaction_fee(Err("blockhash expired".to_string()));
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);

        let result = h
            .executor
            .execute(&decision, &authorization(&decision), &sample_quote())
            .await
            .unwrap();

        assert_eq!(result.status, TradeStatus::Failed);
        assert_eq!(h.venue.build_calls(), 1);
        assert_eq!(h.venue.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_quote_never_submitted() {
        let h = harness();
        let mut quote = sample_quote();
        quote.fetched_at = chrono::Utc::now() - chrono::Duration::seconds(30);
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);

        let result = h
            .executor
            .execute(&decision, &authorization(&decision), &quote)
            .await
            .unwrap();

        assert_eq!(result.status, TradeStatus::Failed);
        assert_eq!(result.error.unwrap().kind, ErrorKind::QuoteExpired);
        assert_eq!(h.venue.fee_calls(), 0);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_leaves_pending() {
        let h = harness();
        h.venue.script_statuses(vec![SignatureStatus::NotFound]);
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);

        let result = h
            .executor
            .execute(&decision, &authorization(&decision), &sample_quote())
            .await
            .unwrap();

        assert_eq!(result.status, TradeStatus::Pending);
        assert!(result.confirmation_timeout);
        assert_eq!(result.error.unwrap().kind, ErrorKind::ConfirmationTimeout);
        assert_eq!(h.venue.submit_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_submission_fails() {
        let h = harness();
        h.venue.fail_submit(VenueError::Rejected {
            operation: "send_transaction",
            reason: "preflight failed".to_string(),
        });
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);

        let result = h
            .executor
            .execute(&decision, &authorization(&decision), &sample_quote())
            .await
            .unwrap();

        assert_eq!(result.status, TradeStatus::Failed);
        assert_eq!(result.error.unwrap().kind, ErrorKind::Submission);
        assert_eq!(h.venue.submit_calls(), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_submission_checks_ledger() {
        let h = harness();
        h.venue.fail_submit(VenueError::Timeout {
            operation: "send_transaction",
            timeout_ms: 10,
        });
        h.venue.script_statuses(vec![SignatureStatus::Confirmed]);
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);

        let result = h
            .executor
            .execute(&decision, &authorization(&decision), &sample_quote())
            .await
            .unwrap();

        assert_eq!(result.status, TradeStatus::Executed);
        assert_eq!(h.venue.submit_calls(), 1);
    }

    #[tokio::test]
    async fn test_second_execute_rejected_while_first_pending() {
        let h = Arc::new(harness());
        h.venue.set_status_delay(Duration::from_millis(30));
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);
        let auth = authorization(&decision);

        let (q1, q2) = (sample_quote(), sample_quote());

        let (first, second) = tokio::join!(
            h.executor.execute(&decision, &auth, &q1),
            h.executor.execute(&decision, &auth, &q2)
        );

        let outcomes = [first, second];
        let done = outcomes.iter().filter(|r| r.is_ok()).count();
        let rejected = outcomes
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(ExecutionError::Tracker(TrackerError::DuplicateRequest { .. }))
                )
            })
            .count();
        assert_eq!(done, 1);
        assert_eq!(rejected, 1);
        assert_eq!(h.venue.submit_calls(), 1);
    }

    async fn wait_for_submit(venue: &FakeVenue) {
        while venue.submit_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_cancel_during_confirmation_wait_cannot_undo_swap() {
        let h = Arc::new(harness());
        h.venue.set_status_delay(Duration::from_millis(40));
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);

        let running = {
            let h = Arc::clone(&h);
            let decision = decision.clone();
            tokio::spawn(async move {
                let auth = authorization(&decision);
                h.executor.execute(&decision, &auth, &sample_quote()).await
            })
        };
        wait_for_submit(&h.venue).await;

        let record = h.tracker.find_by_request("req-1").unwrap();
        let cancelled = h.tracker.cancel(&record.id).await;
        assert!(matches!(
            cancelled,
            Err(TrackerError::InvalidTransition {
                from: TradeStatus::Executed,
                ..
            })
        ));

        let result = running.await.unwrap().unwrap();
        assert_eq!(result.status, TradeStatus::Executed);
        assert_eq!(h.tracker.get(&record.id).unwrap().status, TradeStatus::Executed);
        assert_eq!(h.venue.submit_calls(), 1);
    }

    #[tokio::test]
    async fn test_unrecordable_outcome_after_broadcast_stays_pending() {
        let h = Arc::new(harness());
        h.venue.set_status_delay(Duration::from_millis(40));
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);

        let running = {
            let h = Arc::clone(&h);
            let decision = decision.clone();
            tokio::spawn(async move {
                let auth = authorization(&decision);
                h.executor.execute(&decision, &auth, &sample_quote()).await
            })
        };
        wait_for_submit(&h.venue).await;

        // a writer outside the request lock settles the record first
        let record = h.tracker.find_by_request("req-1").unwrap();
        h.tracker
            .fail(&record.id, ErrorInfo::new(ErrorKind::Submission, "operator"))
            .unwrap();

        let result = running.await.unwrap().unwrap();
        assert_eq!(result.status, TradeStatus::Pending);
        assert_eq!(result.transaction_id, record.transaction_id);
        assert!(result.transaction_id.is_some());
        assert_eq!(result.error.unwrap().kind, ErrorKind::InvalidTransition);
    }

    #[tokio::test]
    async fn test_mismatched_authorization_rejected() {
        let h = harness();
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);
        let other = sample_decision("req-2", TradeAction::Buy, 50.0);

        let err = h
            .executor
            .execute(&decision, &authorization(&other), &sample_quote())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::AuthorizationMismatch { .. }));
        assert!(h.tracker.find_by_request("req-1").is_none());
    }
}
