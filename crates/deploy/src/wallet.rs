//! Wallet capability used by the wallet-signed strategy.
//!
//! The wallet is an explicitly constructed object with an `init`/`dispose`
//! lifecycle, injected into the orchestrator.

use async_trait::async_trait;
use derive_more::{Display, From};
use serde_json::Value;
use thiserror::Error;

/// Hash used when a wallet reports success without a recognisable transaction id.
pub const PENDING_TX_HASH: &str = "pending";

/// Failure reported by a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// The user rejected or cancelled the request.
    #[error("{0}")]
    Rejected(String),
    /// The wallet announced it is navigating away to finish signing.
    #[error("{0}")]
    Redirecting(String),
    #[error("{0}")]
    Other(String),
}

impl WalletError {
    /// Classify a raw wallet error message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("User rejected") || message.contains("cancelled") {
            WalletError::Rejected(message)
        } else if message.contains("redirect") {
            WalletError::Redirecting(message)
        } else {
            WalletError::Other(message)
        }
    }
}

/// Result of a signed-and-sent transaction.
#[derive(Debug, Clone, PartialEq, Eq, Display, From)]
#[display("{transaction_hash}")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
}

impl TransactionReceipt {
    pub fn new(transaction_hash: impl Into<String>) -> Self {
        Self {
            transaction_hash: transaction_hash.into(),
        }
    }

    /// Extract the transaction hash from a wallet's raw outcome.
    ///
    /// Wallets disagree on where the hash lives, so the known locations are
    /// tried in order before falling back to [`PENDING_TX_HASH`].
    pub fn from_value(value: &Value) -> Self {
        let hash = value
            .pointer("/transaction/hash")
            .or_else(|| value.get("transactionHash"))
            .or_else(|| value.pointer("/receipts_outcome/0/id"))
            .and_then(Value::as_str)
            .unwrap_or(PENDING_TX_HASH);
        Self::new(hash)
    }
}

/// External wallet application.
#[async_trait]
pub trait WalletClient: Send + Sync {
    /// Prepare the wallet for use.
    async fn init(&self) -> Result<(), WalletError>;

    /// Release wallet resources.
    async fn dispose(&self);

    /// Ask the user to connect an account.
    async fn connect(&self) -> Result<(), WalletError>;

    /// The connected account, if any.
    async fn active_account(&self) -> Option<String>;

    /// Sign and send a transaction with a single `DeployContract` action.
    ///
    /// Wallets that redirect may never resolve this future.
    async fn sign_and_send_deploy(
        &self,
        signer_id: &str,
        receiver_id: &str,
        wasm: &[u8],
    ) -> Result<TransactionReceipt, WalletError>;

    /// Disconnect the active account.
    async fn sign_out(&self) -> Result<(), WalletError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_wallet_messages() {
        assert!(matches!(
            WalletError::from_message("User rejected the request"),
            WalletError::Rejected(_)
        ));
        assert!(matches!(
            WalletError::from_message("Transaction cancelled"),
            WalletError::Rejected(_)
        ));
        assert!(matches!(
            WalletError::from_message("Wallet will redirect"),
            WalletError::Redirecting(_)
        ));
        assert!(matches!(
            WalletError::from_message("Insufficient balance"),
            WalletError::Other(_)
        ));
    }

    #[test]
    fn test_receipt_hash_locations() {
        let nested = serde_json::json!({"transaction": {"hash": "abc123"}});
        assert_eq!(TransactionReceipt::from_value(&nested).transaction_hash, "abc123");

        let flat = serde_json::json!({"transactionHash": "def456"});
        assert_eq!(TransactionReceipt::from_value(&flat).transaction_hash, "def456");

        let receipts = serde_json::json!({"receipts_outcome": [{"id": "r1"}, {"id": "r2"}]});
        assert_eq!(TransactionReceipt::from_value(&receipts).transaction_hash, "r1");

        assert_eq!(TransactionReceipt::from("h".to_string()).to_string(), "h");

        let empty = serde_json::json!({});
        assert_eq!(
            TransactionReceipt::from_value(&empty).transaction_hash,
            PENDING_TX_HASH
        );
    }
}
