//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use nbx_deploy::{
    Capabilities, ChainClient, DeployConfig, DeploymentOrchestrator, MemoryHistory,
    MemoryPendingStore, TransactionReceipt, TransactionSummary, WalletClient, WalletError,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SIGNER: &str = "alice.testnet";

/// How the mock wallet answers a signing request.
#[derive(Debug, Clone)]
pub enum WalletBehavior {
    Resolve(&'static str),
    Reject,
    Fail(&'static str),
    Redirect,
    Hang,
    /// Answer with a receipt after the delay.
    Late(Duration, &'static str),
}

/// A signing request seen by the mock wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub signer_id: String,
    pub receiver_id: String,
    pub wasm_len: usize,
}

pub struct MockWallet {
    account: Option<String>,
    behavior: WalletBehavior,
    pub requests: Mutex<Vec<SignRequest>>,
}

impl MockWallet {
    pub fn new(account: Option<&str>, behavior: WalletBehavior) -> Self {
        Self {
            account: account.map(String::from),
            behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SignRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletClient for MockWallet {
    async fn init(&self) -> Result<(), WalletError> {
        Ok(())
    }

    async fn dispose(&self) {}

    async fn connect(&self) -> Result<(), WalletError> {
        Ok(())
    }

    async fn active_account(&self) -> Option<String> {
        self.account.clone()
    }

    async fn sign_and_send_deploy(
        &self,
        signer_id: &str,
        receiver_id: &str,
        wasm: &[u8],
    ) -> Result<TransactionReceipt, WalletError> {
        self.requests.lock().unwrap().push(SignRequest {
            signer_id: signer_id.to_string(),
            receiver_id: receiver_id.to_string(),
            wasm_len: wasm.len(),
        });

        match &self.behavior {
            WalletBehavior::Resolve(hash) => Ok(TransactionReceipt::new(*hash)),
            WalletBehavior::Reject => Err(WalletError::from_message("User rejected the request")),
            WalletBehavior::Fail(message) => Err(WalletError::from_message(*message)),
            WalletBehavior::Redirect => Err(WalletError::from_message("Wallet will redirect")),
            WalletBehavior::Hang => std::future::pending().await,
            WalletBehavior::Late(delay, hash) => {
                tokio::time::sleep(*delay).await;
                Ok(TransactionReceipt::new(*hash))
            }
        }
    }

    async fn sign_out(&self) -> Result<(), WalletError> {
        Ok(())
    }
}

/// Chain where only the listed accounts exist.
#[derive(Default)]
pub struct MockChain {
    pub accounts: HashSet<String>,
    pub transaction: Option<TransactionSummary>,
}

#[async_trait]
impl ChainClient for MockChain {
    async fn account_exists(&self, account_id: &str) -> bool {
        self.accounts.contains(account_id)
    }

    async fn transaction(&self, _hash: &str, _sender_id: &str) -> Option<TransactionSummary> {
        self.transaction.clone()
    }

    async fn account_balance(&self, _account_id: &str) -> Option<String> {
        None
    }
}

/// Route library logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// Configuration pointing at `server`, with short waits.
pub fn test_config(server: &MockServer) -> DeployConfig {
    DeployConfig {
        backend_url: server.uri(),
        deploy_timeout_secs: 1,
        poll_interval_ms: 10,
        success_redirect_delay_ms: 0,
        ..Default::default()
    }
}

/// A successful compile answer for `wasm`.
pub fn compile_ok(wasm: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "success": true,
        "wasm": STANDARD.encode(wasm),
        "size": wasm.len(),
        "compilation_time": 1.5,
    }))
}

pub async fn mount_compile(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/compile"))
        .respond_with(response)
        .mount(server)
        .await;
}

pub struct Harness {
    pub server: MockServer,
    pub orchestrator: Arc<DeploymentOrchestrator>,
    pub wallet: Arc<MockWallet>,
    pub store: Arc<MemoryPendingStore>,
    pub history: Arc<MemoryHistory>,
}

impl Harness {
    pub async fn new(wallet: MockWallet) -> Self {
        Self::with(wallet, MockChain::default(), |_| {}).await
    }

    pub async fn with(
        wallet: MockWallet,
        chain: MockChain,
        configure: impl FnOnce(&mut DeployConfig),
    ) -> Self {
        init_tracing();
        let server = MockServer::start().await;
        let mut config = test_config(&server);
        configure(&mut config);

        let wallet = Arc::new(wallet);
        let store = Arc::new(MemoryPendingStore::new());
        let history = Arc::new(MemoryHistory::new(url("https://app.test/examples/hello-world")));

        let orchestrator = DeploymentOrchestrator::new(
            config,
            Capabilities {
                wallet: wallet.clone(),
                chain: Arc::new(chain),
                store: store.clone(),
                history: history.clone(),
            },
        )
        .expect("orchestrator should build");

        Self {
            server,
            orchestrator: Arc::new(orchestrator),
            wallet,
            store,
            history,
        }
    }
}
