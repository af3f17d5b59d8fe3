/// Fee & network health checks
///
/// A breached ceiling is a safety brake: it is reported, never retried.
use crate::config::NetworkConfig;
use crate::errors::NetworkHealthError;
use crate::logger::{self, LogTag};
use crate::utils::lamports_to_sol;
use crate::venue::{SwapTransaction, SwapVenue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Fee snapshot valid only for the request that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFeeEstimate {
    pub lamports_per_signature: u64,
    /// Estimate for a single-signature transaction until the real one is built
    pub estimated_tx_fee: u64,
    pub checked_at: DateTime<Utc>,
}

pub struct FeeHealthChecker {
    venue: Arc<dyn SwapVenue>,
    fee_ceiling_lamports: u64,
    max_transaction_fee_lamports: u64,
    timeout: Duration,
}

impl FeeHealthChecker {
    pub fn new(venue: Arc<dyn SwapVenue>, config: &NetworkConfig) -> Self {
        Self {
            venue,
            fee_ceiling_lamports: config.fee_ceiling_lamports,
            max_transaction_fee_lamports: config.max_transaction_fee_lamports,
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Query the current fee per signature and compare it to the ceiling
    pub async fn check(&self) -> Result<NetworkFeeEstimate, NetworkHealthError> {
        let lamports_per_signature =
            match tokio::time::timeout(self.timeout, self.venue.fee_per_signature()).await {
                Ok(Ok(fee)) => fee,
                Ok(Err(e)) => {
                    return Err(NetworkHealthError::FeeUnavailable {
                        reason: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(NetworkHealthError::FeeUnavailable {
                        reason: format!("timed out after {}ms", self.timeout.as_millis()),
                    })
                }
            };

        if lamports_per_signature > self.fee_ceiling_lamports {
            logger::warning(
                LogTag::Network,
                &format!(
                    "Network fee {} lamports/signature above ceiling {}",
                    lamports_per_signature, self.fee_ceiling_lamports
                ),
            );
            return Err(NetworkHealthError::FeeCeilingExceeded {
                lamports_per_signature,
                ceiling: self.fee_ceiling_lamports,
            });
        }

        logger::debug(
            LogTag::Network,
            &format!("Network fee ok: {} lamports/signature", lamports_per_signature),
        );

        Ok(NetworkFeeEstimate {
            lamports_per_signature,
            estimated_tx_fee: lamports_per_signature,
            checked_at: Utc::now(),
        })
    }

    /// Exact fee for a built transaction, queried fresh on every call
    pub async fn estimate_transaction_fee(
        &self,
        transaction: &SwapTransaction,
    ) -> Result<u64, NetworkHealthError> {
        let fee_lamports =
            match tokio::time::timeout(self.timeout, self.venue.estimate_fee(transaction)).await {
                Ok(Ok(fee)) => fee,
                Ok(Err(e)) => {
                    return Err(NetworkHealthError::EstimationFailed {
                        reason: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(NetworkHealthError::EstimationFailed {
                        reason: format!("timed out after {}ms", self.timeout.as_millis()),
                    })
                }
            };

        if fee_lamports > self.max_transaction_fee_lamports {
            return Err(NetworkHealthError::TransactionFeeTooHigh {
                fee_lamports,
                max_fee_lamports: self.max_transaction_fee_lamports,
            });
        }

        logger::debug(
            LogTag::Network,
            &format!(
                "Transaction fee estimate: {} lamports ({:.6} SOL)",
                fee_lamports,
                lamports_to_sol(fee_lamports)
            ),
        );
        Ok(fee_lamports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVenue;

    fn checker(venue: Arc<FakeVenue>) -> FeeHealthChecker {
        FeeHealthChecker::new(
            venue,
            &NetworkConfig {
                fee_ceiling_lamports: 10_000,
                max_transaction_fee_lamports: 100_000,
                request_timeout_ms: 100,
                ..NetworkConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_fee_within_ceiling() {
        let venue = Arc::new(FakeVenue::new());
        venue.set_fee_per_signature(5_000);

        let estimate = checker(venue).check().await.unwrap();
        assert_eq!(estimate.lamports_per_signature, 5_000);
        assert_eq!(estimate.estimated_tx_fee, 5_000);
    }

    #[tokio::test]
    async fn test_ceiling_breach_is_not_retried() {
        let venue = Arc::new(FakeVenue::new());
        venue.set_fee_per_signature(50_000);

        let err = checker(venue.clone()).check().await.unwrap_err();
        assert_eq!(
            err,
            NetworkHealthError::FeeCeilingExceeded {
                lamports_per_signature: 50_000,
                ceiling: 10_000
            }
        );
        assert_eq!(venue.fee_calls(), 1);
    }

    #[tokio::test]
    async fn test_unfetchable_fee_rejected() {
        let venue = Arc::new(FakeVenue::new());
        venue.fail_fee_lookup(true);

        let err = checker(venue).check().await.unwrap_err();
        assert!(matches!(err, NetworkHealthError::FeeUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_transaction_fee_limits() {
        let venue = Arc::new(FakeVenue::new());
        let checker = checker(venue.clone());
        let tx = venue.sample_transaction();

        venue.set_transaction_fee(Ok(12_000));
        assert_eq!(checker.estimate_transaction_fee(&tx).await.unwrap(), 12_000);

        venue.set_transaction_fee(Ok(250_000));
        assert!(matches!(
            checker.estimate_transaction_fee(&tx).await,
            Err(NetworkHealthError::TransactionFeeTooHigh { .. })
        ));

        venue.set_transaction_fee(Err("blockhash expired".to_string()));
        assert!(matches!(
            checker.estimate_transaction_fee(&tx).await,
            Err(NetworkHealthError::EstimationFailed { .. })
        ));
    }
}
