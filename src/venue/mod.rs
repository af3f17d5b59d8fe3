/// Swap venue capability
///
/// A venue turns a resolved quote into a transaction and talks to the ledger
/// about it. `jupiter` is the live venue, `paper` a simulated one for dry runs.
pub mod jupiter;
pub mod paper;
pub mod rpc;
pub mod signer;
pub mod types;

pub use jupiter::JupiterVenue;
pub use paper::PaperVenue;
pub use signer::TradeSigner;
pub use types::{Confirmation, SignatureStatus, SignedSwap, SwapTransaction};

use crate::config::{ExecutionConfig, MarketDataConfig, NetworkConfig};
use crate::errors::{ConfigError, VenueError};
use crate::logger::{self, LogTag};
use crate::quotes::Quote;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait SwapVenue: Send + Sync {
    fn id(&self) -> &'static str;

    /// Build an unsigned transaction for `quote` paid by `payer` (base58)
    async fn build_swap(&self, quote: &Quote, payer: &str) -> Result<SwapTransaction, VenueError>;

    /// Current network fee per signature, lamports
    async fn fee_per_signature(&self) -> Result<u64, VenueError>;

    /// Exact fee for this transaction's message, lamports
    async fn estimate_fee(&self, transaction: &SwapTransaction) -> Result<u64, VenueError>;

    /// Broadcast once; returns the transaction id
    async fn submit(&self, signed: &SignedSwap) -> Result<String, VenueError>;

    async fn signature_status(&self, signature: &str) -> Result<SignatureStatus, VenueError>;

    async fn block_height(&self) -> Result<u64, VenueError>;
}

/// Poll `signature` until it confirms, fails, or `budget` runs out
///
/// Status lookups that error are treated as "no news" and polling continues.
pub async fn confirm(
    venue: &dyn SwapVenue,
    signature: &str,
    budget: Duration,
    poll_interval: Duration,
) -> Confirmation {
    let start = Instant::now();
    let mut last_status = SignatureStatus::NotFound;

    loop {
        let remaining = budget.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Confirmation::TimedOut { last_status };
        }

        match tokio::time::timeout(remaining, venue.signature_status(signature)).await {
            Ok(Ok(status)) if status.is_confirmed() => return Confirmation::Confirmed,
            Ok(Ok(SignatureStatus::Failed { reason })) => return Confirmation::Failed { reason },
            Ok(Ok(status)) => last_status = status,
            Ok(Err(e)) => {
                logger::debug(
                    LogTag::Executor,
                    &format!("Status lookup for {} failed: {}", signature, e),
                );
            }
            Err(_) => return Confirmation::TimedOut { last_status },
        }

        let remaining = budget.saturating_sub(start.elapsed());
        tokio::time::sleep(poll_interval.min(remaining)).await;
    }
}

/// Construct the venue named by `execution.venue`
pub fn build_venue(
    execution: &ExecutionConfig,
    network: &NetworkConfig,
    marketdata: &MarketDataConfig,
) -> Result<Arc<dyn SwapVenue>, ConfigError> {
    match execution.venue.as_str() {
        "jupiter" => Ok(Arc::new(JupiterVenue::new(execution, network, marketdata)?)),
        "paper" => Ok(Arc::new(PaperVenue::new())),
        other => Err(ConfigError::Invalid {
            field: "execution.venue",
            reason: format!("unknown venue '{}' (expected jupiter or paper)", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVenue;

    #[tokio::test]
    async fn test_confirm_waits_for_confirmation() {
        let venue = FakeVenue::new();
        venue.script_statuses(vec![
            SignatureStatus::NotFound,
            SignatureStatus::Processed,
            SignatureStatus::Confirmed,
        ]);

        let outcome = confirm(&venue, "sig", Duration::from_secs(2), Duration::from_millis(1)).await;
        assert_eq!(outcome, Confirmation::Confirmed);
        assert_eq!(venue.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_confirm_reports_landed_failure() {
        let venue = FakeVenue::new();
        venue.script_statuses(vec![SignatureStatus::Failed {
            reason: "slippage".to_string(),
        }]);

        let outcome = confirm(&venue, "sig", Duration::from_secs(2), Duration::from_millis(1)).await;
        assert!(matches!(outcome, Confirmation::Failed { .. }));
    }

    #[tokio::test]
    async fn test_confirm_times_out_within_budget() {
        let venue = FakeVenue::new();
        venue.script_statuses(vec![SignatureStatus::Processed]);

        let started = Instant::now();
        let outcome = confirm(&venue, "sig", Duration::from_millis(50), Duration::from_millis(5)).await;
        assert_eq!(
            outcome,
            Confirmation::TimedOut {
                last_status: SignatureStatus::Processed
            }
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_unknown_venue_rejected() {
        let execution = ExecutionConfig {
            venue: "raydium".to_string(),
            ..ExecutionConfig::default()
        };
        let result = build_venue(
            &execution,
            &NetworkConfig::default(),
            &MarketDataConfig::default(),
        );
        assert!(matches!(result, Err(ConfigError::Invalid { field: "execution.venue", .. })));
    }
}
