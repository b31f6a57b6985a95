//! Read-only queries against a NEAR RPC node.
//!
//! Every query here is advisory: failures are logged and collapsed into
//! "unknown" answers so they can never block a deployment or the success view.

use async_trait::async_trait;
use serde_json::Value;

use crate::rpc;

/// yoctoNEAR per NEAR.
const YOCTO_PER_NEAR: f64 = 1e24;

/// What the success view needs to know about a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSummary {
    pub signer_id: Option<String>,
    pub receiver_id: Option<String>,
    /// Whether the transaction carries a `DeployContract` action.
    pub has_deploy_action: bool,
}

impl TransactionSummary {
    /// The receiver, if this transaction deployed contract code.
    pub fn deployed_contract(&self) -> Option<&str> {
        if self.has_deploy_action {
            self.receiver_id.as_deref()
        } else {
            None
        }
    }

    /// Build a summary from the `result` of a `tx` RPC call.
    pub fn from_rpc_result(result: &Value) -> Option<Self> {
        let transaction = result.get("transaction")?;
        let actions = transaction
            .get("actions")
            .and_then(|a| a.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();

        Some(Self {
            signer_id: transaction
                .get("signer_id")
                .and_then(|v| v.as_str())
                .map(String::from),
            receiver_id: transaction
                .get("receiver_id")
                .and_then(|v| v.as_str())
                .map(String::from),
            has_deploy_action: actions.iter().any(is_deploy_action),
        })
    }
}

/// Recognise the shapes a deploy action takes across RPC and wallet encodings.
fn is_deploy_action(action: &Value) -> bool {
    action.get("DeployContract").is_some()
        || action.as_str() == Some("DeployContract")
        || action.get("enum").and_then(|v| v.as_str()) == Some("deployContract")
        || action.get("type").and_then(|v| v.as_str()) == Some("DeployContract")
}

/// Read-only chain queries used by the wallet strategy and the success view.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Whether `account_id` exists on chain. Errors count as "does not exist".
    async fn account_exists(&self, account_id: &str) -> bool;

    /// Look up a transaction by hash. Errors count as "not found".
    async fn transaction(&self, hash: &str, sender_id: &str) -> Option<TransactionSummary>;

    /// Account balance in NEAR, formatted with three decimals.
    async fn account_balance(&self, account_id: &str) -> Option<String>;
}

/// [`ChainClient`] backed by a NEAR JSON-RPC node.
#[derive(Debug, Clone)]
pub struct NearRpcClient {
    client: reqwest::Client,
    node_url: String,
}

impl NearRpcClient {
    pub fn new(node_url: impl Into<String>) -> Result<Self, anyhow::Error> {
        Ok(Self {
            client: rpc::create_client()?,
            node_url: node_url.into(),
        })
    }

    async fn view_account(&self, account_id: &str) -> Result<Value, anyhow::Error> {
        rpc::json_rpc_call(
            &self.client,
            &self.node_url,
            "query",
            serde_json::json!({
                "request_type": "view_account",
                "finality": "final",
                "account_id": account_id,
            }),
        )
        .await
    }
}

#[async_trait]
impl ChainClient for NearRpcClient {
    async fn account_exists(&self, account_id: &str) -> bool {
        match self.view_account(account_id).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(account_id = %account_id, error = %e, "Account lookup failed");
                false
            }
        }
    }

    async fn transaction(&self, hash: &str, sender_id: &str) -> Option<TransactionSummary> {
        let result: Value = rpc::json_rpc_call(
            &self.client,
            &self.node_url,
            "tx",
            serde_json::json!([hash, sender_id]),
        )
        .await
        .inspect_err(|e| tracing::warn!(hash = %hash, error = %e, "Transaction lookup failed"))
        .ok()?;

        TransactionSummary::from_rpc_result(&result)
    }

    async fn account_balance(&self, account_id: &str) -> Option<String> {
        let account = self
            .view_account(account_id)
            .await
            .inspect_err(|e| {
                tracing::warn!(account_id = %account_id, error = %e, "Balance lookup failed")
            })
            .ok()?;

        let amount = account.get("amount")?.as_str()?;
        format_near_balance(amount)
    }
}

/// Convert a yoctoNEAR amount string to NEAR with three decimals.
fn format_near_balance(yocto: &str) -> Option<String> {
    let amount: f64 = yocto.parse().ok()?;
    Some(format!("{:.3}", amount / YOCTO_PER_NEAR))
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn test_format_near_balance() {
        assert_eq!(
            format_near_balance("1500000000000000000000000").as_deref(),
            Some("1.500")
        );
        assert_eq!(format_near_balance("0").as_deref(), Some("0.000"));
        assert_eq!(format_near_balance("not-a-number"), None);
    }

    #[test]
    fn test_summary_detects_deploy_action() {
        let result = serde_json::json!({
            "transaction": {
                "signer_id": "alice.testnet",
                "receiver_id": "hello-1.alice.testnet",
                "actions": ["CreateAccount", {"DeployContract": {"code": "AGFzbQ=="}}]
            }
        });
        let summary = TransactionSummary::from_rpc_result(&result).unwrap();
        assert!(summary.has_deploy_action);
        assert_eq!(summary.deployed_contract(), Some("hello-1.alice.testnet"));
    }

    #[test]
    fn test_summary_without_deploy_action() {
        let result = serde_json::json!({
            "transaction": {
                "receiver_id": "bob.testnet",
                "actions": [{"Transfer": {"deposit": "1"}}]
            }
        });
        let summary = TransactionSummary::from_rpc_result(&result).unwrap();
        assert_eq!(summary.deployed_contract(), None);
        assert!(TransactionSummary::from_rpc_result(&serde_json::json!({})).is_none());
    }

    #[tokio::test]
    async fn test_account_exists_false_on_rpc_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"method": "query"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "error": {"cause": {"name": "UNKNOWN_ACCOUNT"}}
            })))
            .mount(&server)
            .await;

        let chain = NearRpcClient::new(server.uri()).unwrap();
        assert!(!chain.account_exists("missing.testnet").await);
    }

    #[tokio::test]
    async fn test_account_balance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "result": {"amount": "2250000000000000000000000"}
            })))
            .mount(&server)
            .await;

        let chain = NearRpcClient::new(server.uri()).unwrap();
        assert!(chain.account_exists("alice.testnet").await);
        assert_eq!(
            chain.account_balance("alice.testnet").await.as_deref(),
            Some("2.250")
        );
    }

    #[tokio::test]
    async fn test_transaction_lookup_unreachable_node() {
        let chain = NearRpcClient::new("http://127.0.0.1:9").unwrap();
        assert!(chain.transaction("abc", "alice.testnet").await.is_none());
    }
}
