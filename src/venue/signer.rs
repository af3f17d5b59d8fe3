/// Trade signing key
use super::types::{encode_transaction, SignedSwap, SwapTransaction};
use crate::errors::{ConfigError, VenueError};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::path::Path;

pub struct TradeSigner {
    keypair: Keypair,
}

impl TradeSigner {
    /// Load a keypair file: a JSON byte array (Solana CLI format) or a base58 string
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(Path::new(path)).map_err(|e| ConfigError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_str_contents(path, contents.trim())
    }

    fn from_str_contents(path: &str, contents: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Parse {
            path: path.to_string(),
            reason,
        };

        let bytes: Vec<u8> = if contents.starts_with('[') {
            serde_json::from_str(contents).map_err(|e| invalid(format!("invalid key array: {}", e)))?
        } else {
            bs58::decode(contents)
                .into_vec()
                .map_err(|e| invalid(format!("invalid base58 key: {}", e)))?
        };

        let keypair = Keypair::try_from(bytes.as_slice())
            .map_err(|e| invalid(format!("invalid keypair: {}", e)))?;
        Ok(Self { keypair })
    }

    /// Throwaway key for simulated venues
    pub fn ephemeral() -> Self {
        Self {
            keypair: Keypair::new(),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Sign as fee payer; the transaction must name this key as its first account
    pub fn sign(&self, swap: &SwapTransaction) -> Result<SignedSwap, VenueError> {
        let mut transaction = swap.decode()?;

        let payer = transaction
            .message
            .static_account_keys()
            .first()
            .copied()
            .ok_or_else(|| VenueError::Signing {
                reason: "transaction has no accounts".to_string(),
            })?;
        if payer != self.keypair.pubkey() {
            return Err(VenueError::Signing {
                reason: format!("fee payer {} is not the trading key {}", payer, self.keypair.pubkey()),
            });
        }

        let signature = self.keypair.sign_message(&transaction.message.serialize());
        if transaction.signatures.is_empty() {
            transaction.signatures.push(signature);
        } else {
            transaction.signatures[0] = signature;
        }

        Ok(SignedSwap {
            signature: signature.to_string(),
            transaction_base64: encode_transaction(&transaction)?,
            last_valid_block_height: swap.last_valid_block_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::paper::placeholder_transaction;

    #[test]
    fn test_signs_as_fee_payer() {
        let signer = TradeSigner::ephemeral();
        let swap = placeholder_transaction(&signer.pubkey(), 100, 99).unwrap();

        let signed = signer.sign(&swap).unwrap();
        let decoded = crate::venue::types::decode_transaction(&signed.transaction_base64).unwrap();
        assert_eq!(decoded.signatures[0].to_string(), signed.signature);
        assert!(decoded.verify_with_results().iter().all(|ok| *ok));
    }

    #[test]
    fn test_refuses_foreign_payer() {
        let signer = TradeSigner::ephemeral();
        let other = TradeSigner::ephemeral();
        let swap = placeholder_transaction(&other.pubkey(), 100, 99).unwrap();

        assert!(matches!(signer.sign(&swap), Err(VenueError::Signing { .. })));
    }

    #[test]
    fn test_loads_cli_keypair_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        let keypair = Keypair::new();
        std::fs::write(&path, serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap()).unwrap();

        let signer = TradeSigner::load(path.to_str().unwrap()).unwrap();
        assert_eq!(signer.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_rejects_bad_key_material() {
        assert!(matches!(
            TradeSigner::from_str_contents("inline", "[1,2,3]"),
            Err(ConfigError::Parse { .. })
        ));
    }
}
