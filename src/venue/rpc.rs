/// Minimal Solana JSON-RPC client for the calls the executor needs
use super::types::SignatureStatus;
use crate::errors::VenueError;
use crate::logger::{self, LogTag};
use reqwest::Client;
use serde_json::Value;
use solana_sdk::hash::Hash;
use std::str::FromStr;
use std::time::Duration;

pub struct SolanaRpc {
    client: Client,
    url: String,
    timeout: Duration,
}

impl SolanaRpc {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, VenueError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VenueError::Transport {
                operation: "rpc_client",
                reason: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }

    /// POST one JSON-RPC request and return its `result`
    pub async fn execute_raw(
        &self,
        operation: &'static str,
        method: &str,
        params: Value,
    ) -> Result<Value, VenueError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VenueError::Timeout {
                        operation,
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    VenueError::Transport {
                        operation,
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VenueError::Transport {
                operation,
                reason: format!("HTTP {}", status),
            });
        }

        let body: Value = response.json().await.map_err(|e| VenueError::InvalidResponse {
            operation,
            reason: e.to_string(),
        })?;

        if let Some(err) = body.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
                .unwrap_or_else(|| err.to_string());
            logger::debug(LogTag::Executor, &format!("RPC {} error: {}", method, message));
            return Err(VenueError::Rejected {
                operation,
                reason: message,
            });
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| VenueError::InvalidResponse {
                operation,
                reason: "missing result".to_string(),
            })
    }

    pub async fn latest_blockhash(&self) -> Result<(Hash, u64), VenueError> {
        const OP: &str = "get_latest_blockhash";
        let result = self
            .execute_raw(OP, "getLatestBlockhash", serde_json::json!([{ "commitment": "confirmed" }]))
            .await?;

        let value = result.get("value").ok_or_else(|| invalid(OP, "missing value"))?;
        let blockhash = value
            .get("blockhash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid(OP, "missing blockhash"))?;
        let last_valid_block_height = value
            .get("lastValidBlockHeight")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| invalid(OP, "missing lastValidBlockHeight"))?;

        let hash = Hash::from_str(blockhash)
            .map_err(|e| invalid(OP, &format!("invalid blockhash: {}", e)))?;
        Ok((hash, last_valid_block_height))
    }

    /// Fee in lamports for a base64 message; `None` when the blockhash expired
    pub async fn fee_for_message(&self, message_base64: &str) -> Result<Option<u64>, VenueError> {
        let result = self
            .execute_raw(
                "get_fee_for_message",
                "getFeeForMessage",
                serde_json::json!([message_base64, { "commitment": "confirmed" }]),
            )
            .await?;
        Ok(result.get("value").and_then(|v| v.as_u64()))
    }

    pub async fn send_transaction(&self, transaction_base64: &str) -> Result<String, VenueError> {
        const OP: &str = "send_transaction";
        let result = self
            .execute_raw(
                OP,
                "sendTransaction",
                serde_json::json!([
                    transaction_base64,
                    {
                        "encoding": "base64",
                        "skipPreflight": false,
                        "preflightCommitment": "confirmed",
                        "maxRetries": 3
                    }
                ]),
            )
            .await?;

        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| invalid(OP, "invalid signature response"))
    }

    pub async fn signature_status(&self, signature: &str) -> Result<SignatureStatus, VenueError> {
        const OP: &str = "get_signature_statuses";
        let result = self
            .execute_raw(
                OP,
                "getSignatureStatuses",
                serde_json::json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;

        let status = result
            .get("value")
            .and_then(|v| v.as_array())
            .and_then(|values| values.first())
            .ok_or_else(|| invalid(OP, "missing value"))?;
        Ok(parse_signature_status(status))
    }

    pub async fn block_height(&self) -> Result<u64, VenueError> {
        const OP: &str = "get_block_height";
        self.execute_raw(OP, "getBlockHeight", serde_json::json!([]))
            .await?
            .as_u64()
            .ok_or_else(|| invalid(OP, "invalid block height response"))
    }
}

fn invalid(operation: &'static str, reason: &str) -> VenueError {
    VenueError::InvalidResponse {
        operation,
        reason: reason.to_string(),
    }
}

pub(crate) fn parse_signature_status(status: &Value) -> SignatureStatus {
    if status.is_null() {
        return SignatureStatus::NotFound;
    }
    if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
        return SignatureStatus::Failed {
            reason: err.to_string(),
        };
    }
    match status.get("confirmationStatus").and_then(|v| v.as_str()) {
        Some("finalized") => SignatureStatus::Finalized,
        Some("confirmed") => SignatureStatus::Confirmed,
        _ => SignatureStatus::Processed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signature_status() {
        assert_eq!(parse_signature_status(&Value::Null), SignatureStatus::NotFound);
        assert_eq!(
            parse_signature_status(&serde_json::json!({
                "slot": 1, "confirmations": null, "err": null, "confirmationStatus": "finalized"
            })),
            SignatureStatus::Finalized
        );
        assert_eq!(
            parse_signature_status(&serde_json::json!({
                "slot": 1, "confirmations": 3, "err": null, "confirmationStatus": "processed"
            })),
            SignatureStatus::Processed
        );
        assert!(matches!(
            parse_signature_status(&serde_json::json!({
                "slot": 1, "err": { "InstructionError": [2, { "Custom": 6001 }] },
                "confirmationStatus": "confirmed"
            })),
            SignatureStatus::Failed { .. }
        ));
    }
}
