use crate::errors::VenueError;
use base64::Engine;
use serde::{Deserialize, Serialize};
use solana_sdk::transaction::VersionedTransaction;

/// Unsigned swap transaction returned by a venue's builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapTransaction {
    pub venue: String,
    pub payer: String,
    /// bincode-serialized `VersionedTransaction`, base64
    pub transaction_base64: String,
    pub expected_output: u64,
    pub min_output: u64,
    /// Block height after which the transaction can no longer land
    pub last_valid_block_height: Option<u64>,
}

impl SwapTransaction {
    pub fn decode(&self) -> Result<VersionedTransaction, VenueError> {
        decode_transaction(&self.transaction_base64)
    }

    /// Serialized message, base64; the form `getFeeForMessage` expects
    pub fn message_base64(&self) -> Result<String, VenueError> {
        let transaction = self.decode()?;
        Ok(base64::engine::general_purpose::STANDARD.encode(transaction.message.serialize()))
    }
}

pub(crate) fn decode_transaction(encoded: &str) -> Result<VersionedTransaction, VenueError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| VenueError::InvalidResponse {
            operation: "decode_transaction",
            reason: format!("invalid base64: {}", e),
        })?;
    bincode::deserialize(&bytes).map_err(|e| VenueError::InvalidResponse {
        operation: "decode_transaction",
        reason: format!("invalid transaction: {}", e),
    })
}

pub(crate) fn encode_transaction(transaction: &VersionedTransaction) -> Result<String, VenueError> {
    let bytes = bincode::serialize(transaction).map_err(|e| VenueError::Signing {
        reason: format!("failed to serialize transaction: {}", e),
    })?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Signed transaction ready for submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedSwap {
    pub signature: String,
    pub transaction_base64: String,
    pub last_valid_block_height: Option<u64>,
}

/// Ledger view of a submitted signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignatureStatus {
    /// Ledger has no record (not landed yet, or dropped)
    NotFound,
    Processed,
    Confirmed,
    Finalized,
    /// Landed but the transaction errored
    Failed { reason: String },
}

impl SignatureStatus {
    /// Counts as confirmation evidence
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SignatureStatus::Confirmed | SignatureStatus::Finalized)
    }
}

/// Result of waiting for confirmation within a budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Failed { reason: String },
    TimedOut { last_status: SignatureStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmed_statuses() {
        assert!(SignatureStatus::Confirmed.is_confirmed());
        assert!(SignatureStatus::Finalized.is_confirmed());
        assert!(!SignatureStatus::Processed.is_confirmed());
        assert!(!SignatureStatus::NotFound.is_confirmed());
        assert!(!SignatureStatus::Failed {
            reason: "InstructionError".to_string()
        }
        .is_confirmed());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let tx = SwapTransaction {
            venue: "paper".to_string(),
            payer: "payer".to_string(),
            transaction_base64: "not base64!".to_string(),
            expected_output: 1,
            min_output: 1,
            last_valid_block_height: None,
        };
        assert!(matches!(
            tx.decode(),
            Err(VenueError::InvalidResponse { .. })
        ));
    }
}
