//! Runtime configuration for the deployment subsystem.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The default backend (build + custodial deploy service).
pub const DEFAULT_BACKEND_URL: &str = "https://near-by-example-backend.fly.dev/api";
/// The default network.
pub const DEFAULT_NETWORK: &str = "testnet";
/// The default chain RPC node.
pub const DEFAULT_NODE_URL: &str = "https://rpc.testnet.near.org";
/// The default block explorer.
pub const DEFAULT_EXPLORER_URL: &str = "https://testnet.nearblocks.io";

/// How the wallet strategy picks the account it deploys into.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TargetPolicy {
    /// Deploy into the derived subaccount only when it already exists,
    /// otherwise into the connected account itself.
    #[default]
    FallbackToSigner,
    /// Always address the derived subaccount.
    Subaccount,
}

/// Configuration shared by the clients, strategies and the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Base URL of the backend API (compile, deploy, status).
    pub backend_url: String,
    /// Network name, used to qualify derived account ids.
    pub network: String,
    /// JSON-RPC endpoint of a chain node.
    pub node_url: String,
    /// Block explorer base URL.
    pub explorer_url: String,
    /// Upper bound on how long the wallet step may keep the deploy busy.
    pub deploy_timeout_secs: u64,
    /// Polling interval of the redirect reconciler, in milliseconds.
    pub poll_interval_ms: u64,
    /// Pause before moving to the success view after a backend deployment.
    pub success_redirect_delay_ms: u64,
    /// Initialization method sent along with backend deployments.
    pub init_method: String,
    /// Read-only method called once after a backend deployment.
    pub verify_method: String,
    pub target_policy: TargetPolicy,
    /// Path of the success view.
    pub success_path: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            node_url: DEFAULT_NODE_URL.to_string(),
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
            deploy_timeout_secs: 30,
            poll_interval_ms: 500,
            success_redirect_delay_ms: 1500,
            init_method: "new".to_string(),
            verify_method: "hello_world".to_string(),
            target_policy: TargetPolicy::default(),
            success_path: "/success".to_string(),
        }
    }
}

impl DeployConfig {
    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn success_redirect_delay(&self) -> Duration {
        Duration::from_millis(self.success_redirect_delay_ms)
    }

    /// Explorer page of a transaction.
    pub fn explorer_tx_url(&self, hash: &str) -> String {
        format!("{}/txns/{}", self.explorer_url.trim_end_matches('/'), hash)
    }

    /// Explorer page of an account.
    pub fn explorer_account_url(&self, account_id: &str) -> String {
        format!("{}/address/{}", self.explorer_url.trim_end_matches('/'), account_id)
    }
}
