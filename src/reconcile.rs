/// Out-of-band reconciliation of PENDING trades
///
/// A trade stays PENDING when its confirmation wait ran out or the process died
/// mid-execution. One pass asks the ledger about each recorded signature and
/// settles what it can. Nothing is ever resubmitted.
use crate::errors::{ErrorInfo, ErrorKind};
use crate::logger::{self, LogTag};
use crate::tracker::{TradeRecord, TradeStatus, TradeTracker, TransitionExtra};
use crate::utils::short_id;
use crate::venue::{SignatureStatus, SwapVenue};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub executed: usize,
    pub failed: usize,
    pub still_pending: usize,
    /// Newly flagged for manual review in this pass
    pub flagged: usize,
    /// Status lookups that errored; retried next pass
    pub lookup_errors: usize,
    /// Skipped because an execution still holds the request
    pub in_flight: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Verdict {
    Executed(String),
    Failed(ErrorInfo),
    Pending,
}

pub struct Reconciler {
    tracker: Arc<TradeTracker>,
    venue: Arc<dyn SwapVenue>,
    manual_review_after: Duration,
}

impl Reconciler {
    pub fn new(
        tracker: Arc<TradeTracker>,
        venue: Arc<dyn SwapVenue>,
        manual_review_after: Duration,
    ) -> Self {
        Self {
            tracker,
            venue,
            manual_review_after,
        }
    }

    /// Settle every PENDING record the ledger has an answer for
    pub async fn run_once(&self) -> ReconcileReport {
        let pending = self.tracker.load_pending();
        let mut report = ReconcileReport {
            checked: pending.len(),
            ..ReconcileReport::default()
        };
        if pending.is_empty() {
            logger::debug(LogTag::Reconcile, "No PENDING trades to reconcile");
            return report;
        }

        logger::info(
            LogTag::Reconcile,
            &format!("Reconciling {} PENDING trades", pending.len()),
        );

        // Fetched lazily, once per pass
        let mut block_height: Option<u64> = None;

        for candidate in pending {
            let Some(_guard) = self.tracker.try_lock_request(&candidate.request_id) else {
                report.in_flight += 1;
                logger::debug(
                    LogTag::Reconcile,
                    &format!("Trade {} still executing; skipped", short_id(&candidate.id)),
                );
                continue;
            };
            // Re-read under the lock; the executor may have settled it meanwhile
            let Some(record) = self
                .tracker
                .get(&candidate.id)
                .filter(|r| r.status == TradeStatus::Pending)
            else {
                continue;
            };

            let verdict = match self.verdict(&record, &mut block_height).await {
                Ok(verdict) => verdict,
                Err(reason) => {
                    report.lookup_errors += 1;
                    logger::warning(
                        LogTag::Reconcile,
                        &format!("Trade {}: {}", short_id(&record.id), reason),
                    );
                    Verdict::Pending
                }
            };

            let applied = match verdict {
                Verdict::Executed(signature) => self
                    .tracker
                    .transition(
                        &record.id,
                        TradeStatus::Executed,
                        TransitionExtra {
                            transaction_id: Some(signature),
                            note: Some("confirmed during reconciliation".to_string()),
                            ..TransitionExtra::default()
                        },
                    )
                    .map(|_| report.executed += 1),
                Verdict::Failed(info) => self
                    .tracker
                    .fail(&record.id, info)
                    .map(|_| report.failed += 1),
                Verdict::Pending => {
                    report.still_pending += 1;
                    self.flag_if_stale(&record).map(|flagged| {
                        if flagged {
                            report.flagged += 1;
                        }
                    })
                }
            };

            if let Err(e) = applied {
                logger::error(
                    LogTag::Reconcile,
                    &format!("Trade {}: could not record outcome: {}", short_id(&record.id), e),
                );
            }
        }

        logger::info(
            LogTag::Reconcile,
            &format!(
                "Reconciled: {} executed, {} failed, {} still pending ({} flagged, {} in flight)",
                report.executed, report.failed, report.still_pending, report.flagged, report.in_flight
            ),
        );
        report
    }

    async fn verdict(
        &self,
        record: &TradeRecord,
        block_height: &mut Option<u64>,
    ) -> Result<Verdict, String> {
        let Some(signature) = record.transaction_id.clone() else {
            return Ok(Verdict::Failed(ErrorInfo::new(
                ErrorKind::Submission,
                "never broadcast: no signature recorded",
            )));
        };

        let status = self
            .venue
            .signature_status(&signature)
            .await
            .map_err(|e| format!("status lookup failed: {}", e))?;

        match status {
            s if s.is_confirmed() => Ok(Verdict::Executed(signature)),
            SignatureStatus::Failed { reason } => Ok(Verdict::Failed(ErrorInfo::new(
                ErrorKind::Submission,
                format!("{} failed on-ledger: {}", signature, reason),
            ))),
            SignatureStatus::NotFound => {
                let Some(last_valid) = record.last_valid_block_height else {
                    return Ok(Verdict::Pending);
                };
                let current = match *block_height {
                    Some(height) => height,
                    None => {
                        let height = self
                            .venue
                            .block_height()
                            .await
                            .map_err(|e| format!("block height lookup failed: {}", e))?;
                        *block_height = Some(height);
                        height
                    }
                };
                if current > last_valid {
                    Ok(Verdict::Failed(ErrorInfo::new(
                        ErrorKind::Submission,
                        format!(
                            "{} expired: block height {} past last valid {}",
                            signature, current, last_valid
                        ),
                    )))
                } else {
                    Ok(Verdict::Pending)
                }
            }
            _ => Ok(Verdict::Pending),
        }
    }

    fn flag_if_stale(&self, record: &TradeRecord) -> Result<bool, crate::errors::TrackerError> {
        if record.manual_review {
            return Ok(false);
        }
        let age = (Utc::now() - record.created_at).to_std().unwrap_or_default();
        if age < self.manual_review_after {
            return Ok(false);
        }

        self.tracker.transition(
            &record.id,
            TradeStatus::Pending,
            TransitionExtra {
                manual_review: true,
                note: Some(format!("unresolved after {}s", age.as_secs())),
                ..TransitionExtra::default()
            },
        )?;
        logger::warning(
            LogTag::Reconcile,
            &format!(
                "Trade {} unresolved after {}s; flagged for manual review",
                short_id(&record.id),
                age.as_secs()
            ),
        );
        Ok(true)
    }
}
