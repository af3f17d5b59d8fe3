/// SQLite trade journal
///
/// `trade_transitions` is append-only: every state change is a new row and a
/// record is rebuilt by replaying its rows in `seq` order. `decisions` keeps one
/// row per processed decision, including the ones that never became trades.
use super::types::{TradeStatus, Transition, TransitionExtra};
use crate::decision::{TradeAction, TradeDecision};
use crate::errors::{ErrorInfo, ErrorKind, TrackerError};
use crate::logger::{self, LogTag};
use crate::quotes::Quote;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Journal row for one processed decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub request_id: String,
    pub token_pair: String,
    pub action: TradeAction,
    pub confidence: f64,
    /// Pipeline outcome label (HOLD, NOT_ATTEMPTED, EXECUTED, ...)
    pub outcome: String,
    pub record_id: Option<String>,
    pub error: Option<ErrorInfo>,
    pub at: DateTime<Utc>,
}

/// Transition row plus the snapshots stored with the creating row
#[derive(Debug, Clone)]
pub struct StoredTransition {
    pub transition: Transition,
    pub decision: Option<TradeDecision>,
    pub quote: Option<Quote>,
}

pub struct Journal {
    conn: Mutex<Connection>,
    location: String,
}

fn journal_err(context: &str, err: impl std::fmt::Display) -> TrackerError {
    TrackerError::Journal(format!("{}: {}", context, err))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, TrackerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| journal_err("invalid timestamp", e))
}

impl Journal {
    pub fn open(path: &str) -> Result<Self, TrackerError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| journal_err("failed to create journal directory", e))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(5_000))?;
        Self::with_connection(conn, path.to_string())
    }

    pub fn in_memory() -> Result<Self, TrackerError> {
        Self::with_connection(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn with_connection(conn: Connection, location: String) -> Result<Self, TrackerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS trade_transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_id TEXT NOT NULL,
                request_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                from_status TEXT,
                to_status TEXT NOT NULL,
                transaction_id TEXT,
                last_valid_block_height INTEGER,
                fee_lamports INTEGER,
                error_kind TEXT,
                error_message TEXT,
                confirmation_timeout INTEGER NOT NULL DEFAULT 0,
                manual_review INTEGER NOT NULL DEFAULT 0,
                note TEXT,
                decision_json TEXT,
                quote_json TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(record_id, seq)
            );
            CREATE INDEX IF NOT EXISTS idx_transitions_request ON trade_transitions(request_id);

            CREATE TABLE IF NOT EXISTS decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id TEXT NOT NULL,
                token_pair TEXT NOT NULL,
                action TEXT NOT NULL,
                confidence REAL NOT NULL,
                outcome TEXT NOT NULL,
                record_id TEXT,
                error_kind TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_decisions_request ON decisions(request_id);
            "#,
        )?;

        logger::debug(LogTag::Tracker, &format!("Trade journal ready at {}", location));
        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Append one transition; snapshots are only stored on the creating row
    pub fn append(
        &self,
        transition: &Transition,
        decision: Option<&TradeDecision>,
        quote: Option<&Quote>,
    ) -> Result<(), TrackerError> {
        let decision_json = decision
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| journal_err("failed to encode decision", e))?;
        let quote_json = quote
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| journal_err("failed to encode quote", e))?;
        let extra = &transition.extra;

        self.conn.lock().execute(
            r#"
            INSERT INTO trade_transitions (
                record_id, request_id, seq, from_status, to_status, transaction_id,
                last_valid_block_height, fee_lamports, error_kind, error_message,
                confirmation_timeout, manual_review, note, decision_json, quote_json, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                transition.record_id,
                transition.request_id,
                transition.seq,
                transition.from.map(|s| s.as_str()),
                transition.to.as_str(),
                extra.transaction_id,
                extra.last_valid_block_height.map(|h| h as i64),
                extra.fee_lamports.map(|f| f as i64),
                extra.error.as_ref().map(|e| e.kind.as_str()),
                extra.error.as_ref().map(|e| e.message.clone()),
                extra.confirmation_timeout,
                extra.manual_review,
                extra.note,
                decision_json,
                quote_json,
                transition.at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            record_id: row.get(0)?,
            request_id: row.get(1)?,
            seq: row.get(2)?,
            from_status: row.get(3)?,
            to_status: row.get(4)?,
            transaction_id: row.get(5)?,
            last_valid_block_height: row.get(6)?,
            fee_lamports: row.get(7)?,
            error_kind: row.get(8)?,
            error_message: row.get(9)?,
            confirmation_timeout: row.get(10)?,
            manual_review: row.get(11)?,
            note: row.get(12)?,
            decision_json: row.get(13)?,
            quote_json: row.get(14)?,
            created_at: row.get(15)?,
        })
    }

    fn query(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<StoredTransition>, TrackerError> {
        let sql = format!(
            "SELECT record_id, request_id, seq, from_status, to_status, transaction_id,
                    last_valid_block_height, fee_lamports, error_kind, error_message,
                    confirmation_timeout, manual_review, note, decision_json, quote_json, created_at
             FROM trade_transitions {} ORDER BY id ASC",
            filter
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, Self::read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RawRow::into_stored).collect()
    }

    /// Every transition in append order
    pub fn load_all(&self) -> Result<Vec<StoredTransition>, TrackerError> {
        self.query("", &[])
    }

    pub fn history(&self, record_id: &str) -> Result<Vec<Transition>, TrackerError> {
        Ok(self
            .query("WHERE record_id = ?1", &[&record_id])?
            .into_iter()
            .map(|stored| stored.transition)
            .collect())
    }

    pub fn record_decision(&self, entry: &DecisionLogEntry) -> Result<(), TrackerError> {
        self.conn.lock().execute(
            r#"
            INSERT INTO decisions (
                request_id, token_pair, action, confidence, outcome, record_id,
                error_kind, error_message, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                entry.request_id,
                entry.token_pair,
                entry.action.as_str(),
                entry.confidence,
                entry.outcome,
                entry.record_id,
                entry.error.as_ref().map(|e| e.kind.as_str()),
                entry.error.as_ref().map(|e| e.message.clone()),
                entry.at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent decisions first
    pub fn recent_decisions(&self, limit: usize) -> Result<Vec<DecisionLogEntry>, TrackerError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT request_id, token_pair, action, confidence, outcome, record_id,
                    error_kind, error_message, created_at
             FROM decisions ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(request_id, token_pair, action, confidence, outcome, record_id, kind, message, at)| {
                    Ok(DecisionLogEntry {
                        request_id,
                        token_pair,
                        action: TradeAction::parse(&action)
                            .ok_or_else(|| journal_err("invalid action", &action))?,
                        confidence,
                        outcome,
                        record_id,
                        error: decode_error(kind, message)?,
                        at: parse_time(&at)?,
                    })
                },
            )
            .collect()
    }
}

fn decode_error(
    kind: Option<String>,
    message: Option<String>,
) -> Result<Option<ErrorInfo>, TrackerError> {
    match kind {
        None => Ok(None),
        Some(kind) => {
            let parsed =
                ErrorKind::parse(&kind).ok_or_else(|| journal_err("invalid error kind", &kind))?;
            Ok(Some(ErrorInfo::new(parsed, message.unwrap_or_default())))
        }
    }
}

struct RawRow {
    record_id: String,
    request_id: String,
    seq: u32,
    from_status: Option<String>,
    to_status: String,
    transaction_id: Option<String>,
    last_valid_block_height: Option<i64>,
    fee_lamports: Option<i64>,
    error_kind: Option<String>,
    error_message: Option<String>,
    confirmation_timeout: bool,
    manual_review: bool,
    note: Option<String>,
    decision_json: Option<String>,
    quote_json: Option<String>,
    created_at: String,
}

impl RawRow {
    fn into_stored(self) -> Result<StoredTransition, TrackerError> {
        let status = |raw: &str| {
            TradeStatus::parse(raw).ok_or_else(|| journal_err("invalid status", raw))
        };
        let from = self.from_status.as_deref().map(status).transpose()?;
        let to = status(&self.to_status)?;

        let decision = self
            .decision_json
            .as_deref()
            .map(serde_json::from_str::<TradeDecision>)
            .transpose()
            .map_err(|e| journal_err("invalid decision snapshot", e))?;
        let quote = self
            .quote_json
            .as_deref()
            .map(serde_json::from_str::<Quote>)
            .transpose()
            .map_err(|e| journal_err("invalid quote snapshot", e))?;

        Ok(StoredTransition {
            transition: Transition {
                record_id: self.record_id,
                request_id: self.request_id,
                seq: self.seq,
                from,
                to,
                extra: TransitionExtra {
                    transaction_id: self.transaction_id,
                    last_valid_block_height: self.last_valid_block_height.map(|h| h as u64),
                    fee_lamports: self.fee_lamports.map(|f| f as u64),
                    error: decode_error(self.error_kind, self.error_message)?,
                    confirmation_timeout: self.confirmation_timeout,
                    manual_review: self.manual_review,
                    note: self.note,
                },
                at: parse_time(&self.created_at)?,
            },
            decision,
            quote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_decision;

    fn transition(seq: u32, from: Option<TradeStatus>, to: TradeStatus) -> Transition {
        Transition {
            record_id: "rec-1".to_string(),
            request_id: "req-1".to_string(),
            seq,
            from,
            to,
            extra: TransitionExtra::default(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_append_and_replay_order() {
        let journal = Journal::in_memory().unwrap();
        let decision = sample_decision("req-1", TradeAction::Buy, 50.0);

        journal
            .append(&transition(1, None, TradeStatus::Pending), Some(&decision), None)
            .unwrap();
        let mut signed = transition(2, Some(TradeStatus::Pending), TradeStatus::Pending);
        signed.extra.transaction_id = Some("sig".to_string());
        signed.extra.last_valid_block_height = Some(123);
        journal.append(&signed, None, None).unwrap();
        let mut failed = transition(3, Some(TradeStatus::Pending), TradeStatus::Failed);
        failed.extra.error = Some(ErrorInfo::new(ErrorKind::Submission, "rejected"));
        journal.append(&failed, None, None).unwrap();

        let rows = journal.load_all().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].decision.as_ref(), Some(&decision));
        assert!(rows[1].decision.is_none());
        assert_eq!(rows[1].transition.extra.last_valid_block_height, Some(123));
        assert_eq!(
            rows[2].transition.extra.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::Submission)
        );

        let history = journal.history("rec-1").unwrap();
        let statuses: Vec<_> = history.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            statuses,
            vec![
                (None, TradeStatus::Pending),
                (Some(TradeStatus::Pending), TradeStatus::Pending),
                (Some(TradeStatus::Pending), TradeStatus::Failed),
            ]
        );
    }

    #[test]
    fn test_duplicate_seq_rejected() {
        let journal = Journal::in_memory().unwrap();
        let first = transition(1, None, TradeStatus::Pending);
        journal.append(&first, None, None).unwrap();
        assert!(matches!(
            journal.append(&first, None, None),
            Err(TrackerError::Journal(_))
        ));
    }

    #[test]
    fn test_decision_log() {
        let journal = Journal::in_memory().unwrap();
        journal
            .record_decision(&DecisionLogEntry {
                request_id: "req-9".to_string(),
                token_pair: "SOL/USDC".to_string(),
                action: TradeAction::Buy,
                confidence: 0.4,
                outcome: "NOT_ATTEMPTED".to_string(),
                record_id: None,
                error: Some(ErrorInfo::new(ErrorKind::RiskRejection, "confidence too low")),
                at: Utc::now(),
            })
            .unwrap();

        let entries = journal.recent_decisions(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, "NOT_ATTEMPTED");
        assert_eq!(entries[0].error.as_ref().map(|e| e.kind), Some(ErrorKind::RiskRejection));
    }

    #[test]
    fn test_file_journal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("trades.db");
        let path = path.to_str().unwrap();

        {
            let journal = Journal::open(path).unwrap();
            journal
                .append(&transition(1, None, TradeStatus::Pending), None, None)
                .unwrap();
        }

        let reopened = Journal::open(path).unwrap();
        assert_eq!(reopened.load_all().unwrap().len(), 1);
    }
}
