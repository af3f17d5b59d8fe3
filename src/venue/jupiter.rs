/// Live venue: Jupiter swap builder + Solana JSON-RPC
use super::rpc::SolanaRpc;
use super::types::{SignatureStatus, SignedSwap, SwapTransaction};
use super::SwapVenue;
use crate::config::{ExecutionConfig, MarketDataConfig, NetworkConfig};
use crate::errors::{ConfigError, VenueError};
use crate::logger::{self, LogTag};
use crate::quotes::Quote;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct JupiterSwapRequest<'a> {
    #[serde(rename = "userPublicKey")]
    user_public_key: &'a str,
    #[serde(rename = "quoteResponse")]
    quote_response: &'a serde_json::Value,
    #[serde(rename = "dynamicComputeUnitLimit")]
    dynamic_compute_unit_limit: bool,
    #[serde(rename = "prioritizationFeeLamports")]
    prioritization_fee_lamports: u64,
}

#[derive(Debug, Deserialize)]
struct JupiterSwapResponse {
    #[serde(rename = "swapTransaction")]
    swap_transaction: String,
    #[serde(rename = "lastValidBlockHeight", default)]
    last_valid_block_height: Option<u64>,
}

pub struct JupiterVenue {
    client: Client,
    api_base: String,
    api_key: String,
    priority_fee_lamports: u64,
    submit_timeout: Duration,
    rpc: SolanaRpc,
}

impl JupiterVenue {
    pub fn new(
        execution: &ExecutionConfig,
        network: &NetworkConfig,
        marketdata: &MarketDataConfig,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(marketdata.request_timeout_ms))
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "marketdata",
                reason: format!("failed to create HTTP client: {}", e),
            })?;
        let rpc = SolanaRpc::new(
            &network.rpc_url,
            Duration::from_millis(network.request_timeout_ms),
        )
        .map_err(|e| ConfigError::Invalid {
            field: "network.rpc_url",
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            api_base: marketdata.jupiter_api_base.trim_end_matches('/').to_string(),
            api_key: marketdata.jupiter_api_key.clone(),
            priority_fee_lamports: execution.priority_fee_lamports,
            submit_timeout: Duration::from_millis(execution.submit_timeout_ms),
            rpc,
        })
    }

    async fn request_swap(&self, quote: &Quote, payer: &str) -> Result<JupiterSwapResponse, VenueError> {
        const OP: &str = "build_swap";
        let request = JupiterSwapRequest {
            user_public_key: payer,
            quote_response: &quote.payload,
            dynamic_compute_unit_limit: true,
            prioritization_fee_lamports: self.priority_fee_lamports,
        };

        let url = format!("{}/swap/v1/swap", self.api_base);
        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request);
        if !self.api_key.is_empty() {
            builder = builder.header("x-api-key", &self.api_key);
        }

        let response = builder.send().await.map_err(|e| VenueError::Transport {
            operation: OP,
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(VenueError::Rejected {
                operation: OP,
                reason: format!("Jupiter swap failed ({}): {}", status, error_text),
            });
        }

        response.json().await.map_err(|e| VenueError::InvalidResponse {
            operation: OP,
            reason: e.to_string(),
        })
    }
}

/// The expiry height is only trusted from Jupiter itself; a height from our own
/// getLatestBlockhash would belong to a different blockhash
fn swap_transaction(response: JupiterSwapResponse, quote: &Quote, payer: &str) -> SwapTransaction {
    SwapTransaction {
        venue: "jupiter".to_string(),
        payer: payer.to_string(),
        transaction_base64: response.swap_transaction,
        expected_output: quote.output_amount,
        min_output: quote.min_output_amount,
        last_valid_block_height: response.last_valid_block_height,
    }
}

#[async_trait]
impl SwapVenue for JupiterVenue {
    fn id(&self) -> &'static str {
        "jupiter"
    }

    async fn build_swap(&self, quote: &Quote, payer: &str) -> Result<SwapTransaction, VenueError> {
        let response = self.request_swap(quote, payer).await?;
        let transaction = swap_transaction(response, quote, payer);

        logger::debug(
            LogTag::Executor,
            &format!(
                "Jupiter swap built for {} (valid until block {:?})",
                payer, transaction.last_valid_block_height
            ),
        );
        Ok(transaction)
    }

    async fn fee_per_signature(&self) -> Result<u64, VenueError> {
        let (blockhash, _) = self.rpc.latest_blockhash().await?;
        let empty = Message::new_with_blockhash(&[], Some(&Pubkey::default()), &blockhash);
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(VersionedMessage::Legacy(empty).serialize());

        self.rpc
            .fee_for_message(&encoded)
            .await?
            .ok_or_else(|| VenueError::InvalidResponse {
                operation: "get_fee_for_message",
                reason: "blockhash not found".to_string(),
            })
    }

    async fn estimate_fee(&self, transaction: &SwapTransaction) -> Result<u64, VenueError> {
        let message = transaction.message_base64()?;
        self.rpc
            .fee_for_message(&message)
            .await?
            .ok_or_else(|| VenueError::InvalidResponse {
                operation: "get_fee_for_message",
                reason: "transaction blockhash expired".to_string(),
            })
    }

    async fn submit(&self, signed: &SignedSwap) -> Result<String, VenueError> {
        match tokio::time::timeout(
            self.submit_timeout,
            self.rpc.send_transaction(&signed.transaction_base64),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(VenueError::Timeout {
                operation: "send_transaction",
                timeout_ms: self.submit_timeout.as_millis() as u64,
            }),
        }
    }

    async fn signature_status(&self, signature: &str) -> Result<SignatureStatus, VenueError> {
        self.rpc.signature_status(signature).await
    }

    async fn block_height(&self) -> Result<u64, VenueError> {
        self.rpc.block_height().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_quote;

    fn response(json: &str) -> JupiterSwapResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_expiry_height_taken_from_jupiter() {
        let quote = sample_quote();
        let tx = swap_transaction(
            response(r#"{"swapTransaction":"AQ==","lastValidBlockHeight":279000123}"#),
            &quote,
            "payer",
        );
        assert_eq!(tx.last_valid_block_height, Some(279_000_123));
        assert_eq!(tx.venue, "jupiter");
        assert_eq!(tx.min_output, quote.min_output_amount);
    }

    #[test]
    fn test_missing_expiry_height_stays_unknown() {
        let tx = swap_transaction(
            response(r#"{"swapTransaction":"AQ=="}"#),
            &sample_quote(),
            "payer",
        );
        assert_eq!(tx.last_valid_block_height, None);
        assert_eq!(tx.transaction_base64, "AQ==");
    }
}
