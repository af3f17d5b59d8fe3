/// Trade lifecycle tracker
///
/// Sole owner of trade records. Records live in memory for fast lookups and
/// every transition is written to the journal before it is applied, so the
/// in-memory view can always be rebuilt by replaying the journal.
pub mod journal;
pub mod types;

pub use journal::{DecisionLogEntry, Journal, StoredTransition};
pub use types::{TradeRecord, TradeStatus, Transition, TransitionExtra};

use crate::decision::{TradeAction, TradeDecision};
use crate::errors::{ErrorInfo, ErrorKind, TrackerError};
use crate::logger::{self, LogTag};
use crate::quotes::Quote;
use crate::risk::PortfolioState;
use crate::utils::short_id;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Exposure held for an authorized decision whose record does not exist yet
#[derive(Debug, Clone)]
struct ExposureClaim {
    request_id: String,
    action: TradeAction,
    token_pair: String,
    amount_usd: f64,
    reserved_at: DateTime<Utc>,
}

/// Keeps an authorized decision's exposure in every portfolio snapshot until
/// dropped. Once the trade record exists the record counts instead.
#[must_use = "the exposure is released when the reservation is dropped"]
pub struct Reservation {
    tracker: Arc<TradeTracker>,
    id: u64,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.tracker.claims.lock().remove(&self.id);
    }
}

pub struct TradeTracker {
    journal: Journal,
    records: DashMap<String, TradeRecord>,
    /// request id -> most recent record id
    by_request: DashMap<String, String>,
    request_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    /// Also serializes snapshot + authorization in `reserve`
    claims: Mutex<HashMap<u64, ExposureClaim>>,
    next_claim: AtomicU64,
}

impl TradeTracker {
    /// Open the tracker over a journal, replaying its transitions
    pub fn open(journal: Journal) -> Result<Self, TrackerError> {
        let tracker = Self {
            journal,
            records: DashMap::new(),
            by_request: DashMap::new(),
            request_locks: DashMap::new(),
            claims: Mutex::new(HashMap::new()),
            next_claim: AtomicU64::new(1),
        };
        tracker.replay()?;
        Ok(tracker)
    }

    pub fn in_memory() -> Result<Self, TrackerError> {
        Self::open(Journal::in_memory()?)
    }

    fn replay(&self) -> Result<(), TrackerError> {
        let rows = self.journal.load_all()?;
        let count = rows.len();
        for stored in rows {
            let t = stored.transition;
            match t.from {
                None => {
                    let decision = stored.decision.ok_or_else(|| {
                        TrackerError::Journal(format!("record {} has no decision snapshot", t.record_id))
                    })?;
                    let mut record = TradeRecord::new(t.record_id.clone(), decision, stored.quote, t.at);
                    record.status = t.to;
                    self.by_request.insert(t.request_id.clone(), t.record_id.clone());
                    self.records.insert(t.record_id, record);
                }
                Some(_) => {
                    let mut record = self.records.get_mut(&t.record_id).ok_or_else(|| {
                        TrackerError::Journal(format!("transition for unknown record {}", t.record_id))
                    })?;
                    record.apply(t.to, &t.extra, t.at);
                }
            }
        }
        if count > 0 {
            logger::info(
                LogTag::Tracker,
                &format!(
                    "Replayed {} transitions into {} trade records",
                    count,
                    self.records.len()
                ),
            );
        }
        Ok(())
    }

    fn request_lock(&self, request_id: &str) -> Arc<AsyncMutex<()>> {
        self.request_locks
            .entry(request_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Serialize work on one request id; hold the guard for the whole execution
    pub async fn lock_request(&self, request_id: &str) -> OwnedMutexGuard<()> {
        self.request_lock(request_id).lock_owned().await
    }

    /// `None` while another task holds the request (an execution in flight)
    pub fn try_lock_request(&self, request_id: &str) -> Option<OwnedMutexGuard<()>> {
        self.request_lock(request_id).try_lock_owned().ok()
    }

    /// Authorize against a snapshot and reserve the decision's exposure in one step
    ///
    /// Concurrent callers see each other's reservations, so two decisions
    /// cannot both pass a limit that only one of them fits under. `check` runs
    /// with the claim table locked and must not block.
    pub fn reserve<T, E>(
        self: &Arc<Self>,
        decision: &TradeDecision,
        capital_usd: f64,
        now: DateTime<Utc>,
        check: impl FnOnce(&PortfolioState) -> Result<T, E>,
    ) -> Result<(T, Reservation), E> {
        let mut claims = self.claims.lock();
        let snapshot = self.snapshot_with(&claims, capital_usd, now);
        let authorized = check(&snapshot)?;

        let id = self.next_claim.fetch_add(1, Ordering::Relaxed);
        claims.insert(
            id,
            ExposureClaim {
                request_id: decision.request_id.clone(),
                action: decision.decision,
                token_pair: decision.token_pair.clone(),
                amount_usd: decision.amount_usd.unwrap_or(0.0),
                reserved_at: now,
            },
        );
        Ok((
            authorized,
            Reservation {
                tracker: Arc::clone(self),
                id,
            },
        ))
    }

    /// Create a PENDING record for `decision`
    ///
    /// Rejected with `DuplicateRequest` while an earlier record for the same
    /// request id is PENDING or EXECUTED. A FAILED or CANCELLED one may be retried.
    pub fn create(
        &self,
        decision: &TradeDecision,
        quote: Option<&Quote>,
    ) -> Result<TradeRecord, TrackerError> {
        match self.by_request.entry(decision.request_id.clone()) {
            Entry::Occupied(mut existing) => {
                if let Some(previous) = self.records.get(existing.get()) {
                    if previous.status.blocks_retry() {
                        return Err(TrackerError::DuplicateRequest {
                            request_id: decision.request_id.clone(),
                            status: previous.status,
                        });
                    }
                }
                let record = self.insert_new(decision, quote)?;
                existing.insert(record.id.clone());
                Ok(record)
            }
            Entry::Vacant(slot) => {
                let record = self.insert_new(decision, quote)?;
                slot.insert(record.id.clone());
                Ok(record)
            }
        }
    }

    fn insert_new(
        &self,
        decision: &TradeDecision,
        quote: Option<&Quote>,
    ) -> Result<TradeRecord, TrackerError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let transition = Transition {
            record_id: id.clone(),
            request_id: decision.request_id.clone(),
            seq: 1,
            from: None,
            to: TradeStatus::Pending,
            extra: TransitionExtra::default(),
            at: now,
        };
        self.journal.append(&transition, Some(decision), quote)?;

        let record = TradeRecord::new(id.clone(), decision.clone(), quote.cloned(), now);
        self.records.insert(id, record.clone());

        logger::info(
            LogTag::Tracker,
            &format!(
                "Trade {} created for request {} ({} {})",
                short_id(&record.id),
                short_id(&record.request_id),
                record.decision.decision,
                record.decision.token_pair
            ),
        );
        Ok(record)
    }

    /// Move a record to `to`, journaling the change first
    pub fn transition(
        &self,
        id: &str,
        to: TradeStatus,
        extra: TransitionExtra,
    ) -> Result<TradeRecord, TrackerError> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| TrackerError::NotFound { id: id.to_string() })?;

        if !record.status.can_transition_to(to) {
            return Err(TrackerError::InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to,
            });
        }

        let now = Utc::now();
        let transition = Transition {
            record_id: id.to_string(),
            request_id: record.request_id.clone(),
            seq: record.transitions + 1,
            from: Some(record.status),
            to,
            extra,
            at: now,
        };
        self.journal.append(&transition, None, None)?;
        record.apply(to, &transition.extra, now);

        let message = format!(
            "Trade {}: {} -> {}{}",
            short_id(id),
            transition.from.map(|s| s.as_str()).unwrap_or("-"),
            to,
            transition
                .extra
                .error
                .as_ref()
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );
        if to == TradeStatus::Pending {
            logger::debug(LogTag::Tracker, &message);
        } else {
            logger::info(LogTag::Tracker, &message);
        }

        Ok(record.clone())
    }

    /// Cancel a PENDING trade that was never signed
    ///
    /// Waits for any execution on the same request to finish first. Once a
    /// signature is journaled the swap may be on-ledger and only
    /// reconciliation may settle it.
    pub async fn cancel(&self, id: &str) -> Result<TradeRecord, TrackerError> {
        let request_id = self
            .get(id)
            .ok_or_else(|| TrackerError::NotFound { id: id.to_string() })?
            .request_id;
        let _guard = self.lock_request(&request_id).await;

        let record = self
            .get(id)
            .ok_or_else(|| TrackerError::NotFound { id: id.to_string() })?;
        if record.status == TradeStatus::Pending {
            if let Some(transaction_id) = record.transaction_id {
                return Err(TrackerError::AlreadyBroadcast {
                    id: id.to_string(),
                    transaction_id,
                });
            }
        }
        self.transition(id, TradeStatus::Cancelled, TransitionExtra::note("cancelled"))
    }

    pub fn fail(&self, id: &str, error: ErrorInfo) -> Result<TradeRecord, TrackerError> {
        self.transition(id, TradeStatus::Failed, TransitionExtra::error(error))
    }

    pub fn get(&self, id: &str) -> Option<TradeRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    pub fn find_by_request(&self, request_id: &str) -> Option<TradeRecord> {
        let id = self.by_request.get(request_id)?.clone();
        self.get(&id)
    }

    pub fn history(&self, id: &str) -> Result<Vec<Transition>, TrackerError> {
        self.journal.history(id)
    }

    /// PENDING records, oldest first
    pub fn load_pending(&self) -> Vec<TradeRecord> {
        let mut pending: Vec<TradeRecord> = self
            .records
            .iter()
            .filter(|r| r.status == TradeStatus::Pending)
            .map(|r| r.clone())
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    pub fn record_decision(&self, entry: &DecisionLogEntry) -> Result<(), TrackerError> {
        self.journal.record_decision(entry)
    }

    pub fn recent_decisions(&self, limit: usize) -> Result<Vec<DecisionLogEntry>, TrackerError> {
        self.journal.recent_decisions(limit)
    }

    /// Portfolio snapshot for the risk gate
    ///
    /// Only EXECUTED and PENDING trades count (a PENDING trade may have landed),
    /// plus reservations whose trade record does not exist yet. Open exposure
    /// per pair is buys minus sells in USD, floored at zero.
    pub fn portfolio_snapshot(&self, capital_usd: f64, now: DateTime<Utc>) -> PortfolioState {
        let claims = self.claims.lock();
        self.snapshot_with(&claims, capital_usd, now)
    }

    fn snapshot_with(
        &self,
        claims: &HashMap<u64, ExposureClaim>,
        capital_usd: f64,
        now: DateTime<Utc>,
    ) -> PortfolioState {
        let today = now.date_naive();
        let mut net_by_pair: HashMap<String, f64> = HashMap::new();
        let mut daily_exposure_usd = 0.0;
        let mut add = |pair: &str, action: TradeAction, amount: f64, at: DateTime<Utc>| {
            let net = net_by_pair.entry(pair.to_string()).or_insert(0.0);
            match action {
                TradeAction::Buy => {
                    *net += amount;
                    if at.date_naive() == today {
                        daily_exposure_usd += amount;
                    }
                }
                TradeAction::Sell => *net -= amount,
                TradeAction::Hold => {}
            }
        };

        for record in self.records.iter() {
            if matches!(record.status, TradeStatus::Executed | TradeStatus::Pending) {
                add(
                    &record.decision.token_pair,
                    record.decision.decision,
                    record.amount_usd(),
                    record.created_at,
                );
            }
        }
        for claim in claims.values() {
            let settled = self
                .find_by_request(&claim.request_id)
                .is_some_and(|r| r.created_at >= claim.reserved_at);
            if !settled {
                add(&claim.token_pair, claim.action, claim.amount_usd, claim.reserved_at);
            }
        }

        let open: Vec<f64> = net_by_pair.values().copied().filter(|v| *v > 0.0).collect();
        let open_exposure: f64 = open.iter().sum();

        PortfolioState {
            available_capital_usd: (capital_usd - open_exposure).max(0.0),
            open_positions: open.len(),
            daily_exposure_usd,
        }
    }

    /// Counts by status, for summaries
    pub fn status_counts(&self) -> HashMap<TradeStatus, usize> {
        let mut counts = HashMap::new();
        for record in self.records.iter() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        counts
    }
}

/// Error info recorded when a confirmation wait runs out
pub fn confirmation_timeout_info(signature: &str, waited_secs: u64) -> ErrorInfo {
    ErrorInfo::new(
        ErrorKind::ConfirmationTimeout,
        format!("{} unconfirmed after {}s", signature, waited_secs),
    )
}
