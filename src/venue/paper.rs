/// Simulated venue for dry runs
///
/// Builds real (empty) transactions so signing behaves exactly as live, but
/// nothing leaves the process and every accepted submission confirms at once.
use super::types::{decode_transaction, encode_transaction, SignatureStatus, SignedSwap, SwapTransaction};
use super::SwapVenue;
use crate::errors::VenueError;
use crate::logger::{self, LogTag};
use crate::quotes::Quote;
use crate::utils::short_id;
use async_trait::async_trait;
use dashmap::DashSet;
use solana_sdk::hash::Hash;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

const PAPER_LAMPORTS_PER_SIGNATURE: u64 = 5_000;
const PAPER_START_BLOCK_HEIGHT: u64 = 1_000;
/// Blocks a built transaction stays valid for
const BLOCKHASH_VALIDITY: u64 = 150;

/// Unsigned fee-payer-only transaction standing in for a real swap
pub(crate) fn placeholder_transaction(
    payer: &Pubkey,
    expected_output: u64,
    min_output: u64,
) -> Result<SwapTransaction, VenueError> {
    let message = Message::new_with_blockhash(&[], Some(payer), &Hash::default());
    let transaction = VersionedTransaction {
        signatures: vec![Signature::default()],
        message: VersionedMessage::Legacy(message),
    };
    Ok(SwapTransaction {
        venue: "paper".to_string(),
        payer: payer.to_string(),
        transaction_base64: encode_transaction(&transaction)?,
        expected_output,
        min_output,
        last_valid_block_height: None,
    })
}

pub struct PaperVenue {
    block_height: AtomicU64,
    submitted: DashSet<String>,
}

impl PaperVenue {
    pub fn new() -> Self {
        Self {
            block_height: AtomicU64::new(PAPER_START_BLOCK_HEIGHT),
            submitted: DashSet::new(),
        }
    }
}

impl Default for PaperVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwapVenue for PaperVenue {
    fn id(&self) -> &'static str {
        "paper"
    }

    async fn build_swap(&self, quote: &Quote, payer: &str) -> Result<SwapTransaction, VenueError> {
        let payer = Pubkey::from_str(payer).map_err(|e| VenueError::Rejected {
            operation: "build_swap",
            reason: format!("invalid payer {}: {}", payer, e),
        })?;
        let mut transaction =
            placeholder_transaction(&payer, quote.output_amount, quote.min_output_amount)?;
        transaction.last_valid_block_height =
            Some(self.block_height.load(Ordering::Relaxed) + BLOCKHASH_VALIDITY);
        Ok(transaction)
    }

    async fn fee_per_signature(&self) -> Result<u64, VenueError> {
        Ok(PAPER_LAMPORTS_PER_SIGNATURE)
    }

    async fn estimate_fee(&self, transaction: &SwapTransaction) -> Result<u64, VenueError> {
        let decoded = transaction.decode()?;
        let signatures = decoded.message.header().num_required_signatures as u64;
        Ok(PAPER_LAMPORTS_PER_SIGNATURE * signatures.max(1))
    }

    async fn submit(&self, signed: &SignedSwap) -> Result<String, VenueError> {
        let transaction = decode_transaction(&signed.transaction_base64)?;
        if !transaction.verify_with_results().iter().all(|ok| *ok) {
            return Err(VenueError::Rejected {
                operation: "send_transaction",
                reason: "signature verification failed".to_string(),
            });
        }

        self.submitted.insert(signed.signature.clone());
        logger::info(
            LogTag::Executor,
            &format!("Paper venue accepted {}", short_id(&signed.signature)),
        );
        Ok(signed.signature.clone())
    }

    async fn signature_status(&self, signature: &str) -> Result<SignatureStatus, VenueError> {
        if self.submitted.contains(signature) {
            Ok(SignatureStatus::Finalized)
        } else {
            Ok(SignatureStatus::NotFound)
        }
    }

    async fn block_height(&self) -> Result<u64, VenueError> {
        Ok(self.block_height.fetch_add(1, Ordering::Relaxed))
    }
}
