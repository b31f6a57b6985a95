//! The deployment orchestrator.
//!
//! Owns one compile/deploy cycle at a time: it clears the transcript, compiles,
//! hands the artifact to the strategy picked by the source language, and turns
//! every failure into transcript lines plus a terminal outcome.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::BackendClient;
use crate::busy::{BusyFlag, BusyGuard};
use crate::chain::ChainClient;
use crate::history::{BrowserHistory, is_success_view};
use crate::store::PendingDeploymentStore;
use crate::strategies::{BackendCliDeploy, WalletSignedDeploy};
use crate::success::{SuccessSummary, SuccessView};
use crate::wallet::WalletClient;
use crate::{
    CompileClient, CompiledArtifact, DeployConfig, DeployError, DeploymentOutcome,
    DeploymentStrategy, ErrorKind, SharedOutcome, SourceLanguage, Transcript,
};

/// What the orchestrator is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum OrchestratorState {
    Idle,
    Compiling,
    Deploying,
}

/// Capabilities the orchestrator is wired with.
pub struct Capabilities {
    pub wallet: Arc<dyn WalletClient>,
    pub chain: Arc<dyn ChainClient>,
    pub store: Arc<dyn PendingDeploymentStore>,
    pub history: Arc<dyn BrowserHistory>,
}

/// Drives compile-only runs and full deployments.
///
/// `run` and `deploy` are mutually exclusive: while one is in flight, a new
/// request is refused with [`DeployError::Busy`].
pub struct DeploymentOrchestrator {
    config: DeployConfig,
    compiler: CompileClient,
    backend: BackendClient,
    cli: BackendCliDeploy,
    wallet: WalletSignedDeploy,
    success: SuccessView,
    history: Arc<dyn BrowserHistory>,
    transcript: Arc<Transcript>,
    running: BusyFlag,
    deploying: BusyFlag,
    state: Mutex<OrchestratorState>,
    backend_configured: Mutex<Option<bool>>,
    artifact: Mutex<Option<CompiledArtifact>>,
    outcome: SharedOutcome,
}

impl DeploymentOrchestrator {
    pub fn new(config: DeployConfig, capabilities: Capabilities) -> Result<Self, DeployError> {
        let compiler = CompileClient::new(&config.backend_url)?;
        let backend = BackendClient::new(&config.backend_url)?;
        let cli = BackendCliDeploy::new(
            backend.clone(),
            Arc::clone(&capabilities.store),
            Arc::clone(&capabilities.history),
            &config,
        );
        let success = SuccessView::new(
            Arc::clone(&capabilities.store),
            Arc::clone(&capabilities.chain),
            &config,
        );
        let wallet = WalletSignedDeploy::new(
            capabilities.wallet,
            capabilities.chain,
            capabilities.store,
            &config,
        );

        Ok(Self {
            config,
            compiler,
            backend,
            cli,
            wallet,
            success,
            history: capabilities.history,
            transcript: Arc::new(Transcript::new()),
            running: BusyFlag::new(),
            deploying: BusyFlag::new(),
            state: Mutex::new(OrchestratorState::Idle),
            backend_configured: Mutex::new(None),
            artifact: Mutex::new(None),
            outcome: SharedOutcome::new(),
        })
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn transcript(&self) -> &Transcript {
        self.transcript.as_ref()
    }

    pub fn state(&self) -> OrchestratorState {
        *lock(&self.state)
    }

    /// The compile-only flag.
    pub fn running(&self) -> &BusyFlag {
        &self.running
    }

    /// The deployment flag.
    pub fn deploying(&self) -> &BusyFlag {
        &self.deploying
    }

    pub fn is_busy(&self) -> bool {
        self.running.is_busy() || self.deploying.is_busy()
    }

    /// Outcome of the latest deployment attempt, if any.
    ///
    /// A pending outcome may still turn terminal when a wallet answers after
    /// the deploy timeout.
    pub fn outcome(&self) -> Option<DeploymentOutcome> {
        self.outcome.get()
    }

    /// Artifact of the latest successful compile in the current cycle.
    pub fn artifact(&self) -> Option<CompiledArtifact> {
        lock(&self.artifact).clone()
    }

    /// Cached answer of the backend status check, if it has run.
    pub fn backend_configured(&self) -> Option<bool> {
        *lock(&self.backend_configured)
    }

    /// Ask the backend whether it can deploy. Runs once per session.
    ///
    /// A failed check counts as "not configured"; it only disables the
    /// backend strategy.
    pub async fn refresh_backend_status(&self) -> bool {
        if let Some(configured) = self.backend_configured() {
            return configured;
        }

        let configured = match self.backend.status().await {
            Ok(status) => status.configured,
            Err(e) => {
                tracing::warn!(
                    backend = %self.backend.base_url(),
                    error = %e,
                    "Backend status check failed"
                );
                false
            }
        };
        tracing::debug!(configured, "Backend status");

        *lock(&self.backend_configured) = Some(configured);
        configured
    }

    /// Whether a deploy for `language` may be started now.
    pub fn can_deploy(&self, language: SourceLanguage) -> bool {
        if self.is_busy() {
            return false;
        }
        match language.strategy() {
            DeploymentStrategy::BackendCli => self.backend_configured() != Some(false),
            DeploymentStrategy::WalletSigned => true,
        }
    }

    /// Compile `code` without deploying it.
    ///
    /// Failures are written to the transcript and also returned.
    ///
    /// # Errors
    /// - [`DeployError::Busy`] when a run or deployment is in flight; nothing is touched
    /// - any compile error
    pub async fn run(
        &self,
        code: &str,
        language: SourceLanguage,
    ) -> Result<CompiledArtifact, DeployError> {
        let _guard = self.acquire(&self.running, &self.deploying)?;
        self.begin_cycle();

        if code.trim().is_empty() {
            self.transcript.push("❌ Error: No code to run");
            return Err(DeployError::EmptySource);
        }

        let result = self.compile(code, language).await;
        self.set_state(OrchestratorState::Idle);

        match result {
            Ok(artifact) => {
                self.transcript.push("\n💡 Note: Full execution requires deployment.");
                self.transcript
                    .push("   Click \"Deploy\" to deploy and test your contract on TestNet.");
                Ok(artifact)
            }
            Err(e) => {
                self.report_error(&e);
                Err(e)
            }
        }
    }

    /// Compile `code` and deploy it with the strategy for `language`.
    ///
    /// Every failure ends up in the transcript and in the returned outcome.
    /// A pending outcome means completion arrives through a wallet redirect.
    ///
    /// # Errors
    /// Returns [`DeployError::Busy`] when a run or deployment is in flight.
    pub async fn deploy(
        &self,
        code: &str,
        language: SourceLanguage,
        example_id: &str,
    ) -> Result<DeploymentOutcome, DeployError> {
        let guard = self.acquire(&self.deploying, &self.running)?;
        self.begin_cycle();
        let attempt = self.outcome.begin();

        let strategy = language.strategy();
        tracing::info!(
            language = %language,
            strategy = %strategy,
            example = %example_id,
            "Starting deployment"
        );

        let outcome = match self.deploy_inner(code, language, example_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report_error(&e);
                let mut outcome = DeploymentOutcome::pending();
                if e.kind() == ErrorKind::UserCancelled {
                    outcome.mark_cancelled();
                } else {
                    outcome.mark_failed(e.to_string());
                }
                outcome
            }
        };

        self.set_state(OrchestratorState::Idle);
        drop(guard);

        // A wallet answering right after its timeout may already have settled this attempt.
        let outcome = if self.outcome.settle(attempt, outcome.clone()) {
            outcome
        } else {
            self.outcome.get().unwrap_or(outcome)
        };
        tracing::info!(
            status = %outcome.status,
            contract = ?outcome.contract_id,
            "Deployment finished"
        );

        Ok(outcome)
    }

    /// Load the success view when the last deployment moved onto it.
    ///
    /// This consumes the pending marker. Returns `None` when the location is
    /// not the success view.
    ///
    /// # Errors
    /// Returns [`DeployError::MissingReference`] when the success view carries no reference.
    pub async fn load_success(
        &self,
        signer_id: Option<&str>,
    ) -> Result<Option<SuccessSummary>, DeployError> {
        let location = self.history.location();
        if !is_success_view(&location, &self.config.success_path) {
            return Ok(None);
        }
        self.success.load(&location, signer_id).await.map(Some)
    }

    async fn deploy_inner(
        &self,
        code: &str,
        language: SourceLanguage,
        example_id: &str,
    ) -> Result<DeploymentOutcome, DeployError> {
        match language.strategy() {
            DeploymentStrategy::BackendCli => {
                if code.trim().is_empty() {
                    return Err(DeployError::EmptySource);
                }
                if self.backend_configured() == Some(false) {
                    return Err(DeployError::BackendNotConfigured);
                }

                self.transcript
                    .push(format!("▶ Starting CLI deployment ({} contract)...", language));
                self.transcript.push("📋 Deployment Method: NEAR CLI (Backend)");
                self.transcript.push("   No wallet connection required\n");

                let artifact = self.compile(code, language).await?;
                self.set_state(OrchestratorState::Deploying);
                self.cli.deploy(&artifact, &self.transcript).await
            }
            DeploymentStrategy::WalletSigned => {
                if code.trim().is_empty() {
                    return Err(DeployError::EmptySource);
                }
                let signer_id = self.wallet.require_account().await?;

                self.transcript
                    .push(format!("▶ Starting wallet deployment ({} contract)...", language));
                self.transcript.push("📋 Deployment Method: Wallet");
                self.transcript.push("   Deploying to your connected account\n");

                let artifact = self.compile(code, language).await?;
                self.set_state(OrchestratorState::Deploying);

                let receiver_id = self
                    .wallet
                    .resolve_target(example_id, &signer_id, &self.transcript)
                    .await;
                self.wallet
                    .deploy(
                        &artifact,
                        &signer_id,
                        &receiver_id,
                        &self.transcript,
                        &self.deploying,
                        &self.outcome,
                    )
                    .await
            }
        }
    }

    async fn compile(
        &self,
        code: &str,
        language: SourceLanguage,
    ) -> Result<CompiledArtifact, DeployError> {
        self.set_state(OrchestratorState::Compiling);
        self.transcript.push("▶ Compiling contract...");

        let artifact = self.compiler.compile(code, language).await?;

        self.transcript.push("✓ Contract compiled successfully");
        self.transcript.push(format!("✓ WASM size: {} KB", artifact.size_kb()));
        if let Some(secs) = artifact.compile_duration_secs {
            self.transcript.push(format!("✓ Compilation time: {}s", secs));
        }

        *lock(&self.artifact) = Some(artifact.clone());
        Ok(artifact)
    }

    /// Set `flag` unless either flag is already set.
    fn acquire(&self, flag: &BusyFlag, other: &BusyFlag) -> Result<BusyGuard, DeployError> {
        let guard = flag.try_acquire().ok_or(DeployError::Busy)?;
        if other.is_busy() {
            return Err(DeployError::Busy);
        }
        Ok(guard)
    }

    fn begin_cycle(&self) {
        self.transcript.clear();
        *lock(&self.artifact) = None;
    }

    fn set_state(&self, state: OrchestratorState) {
        tracing::trace!(state = %state, "Orchestrator state");
        *lock(&self.state) = state;
    }

    /// Render `error` into the transcript.
    fn report_error(&self, error: &DeployError) {
        match error {
            DeployError::EmptySource => {
                self.transcript.push("❌ Error: No code to deploy");
            }
            DeployError::UserCancelled => {
                self.transcript.push("ℹ️  Deployment cancelled by user");
            }
            DeployError::BackendNotConfigured => {
                self.transcript.push("❌ Backend NEAR CLI not configured");
                self.transcript.push("   The backend needs NEAR_ACCOUNT_ID and NEAR_PRIVATE_KEY");
                self.transcript.push("   Contact the administrator to enable CLI deployments");
            }
            DeployError::Unreachable { endpoint, source } => {
                self.transcript.push("❌ Error: Failed to connect to backend");
                self.transcript.push(format!("   Backend URL: {}", endpoint));
                self.transcript.push("   Please check if the backend is running and accessible.");
                self.transcript.push(format!("   Error details: {}", source));
            }
            other => {
                self.transcript.push(format!("❌ Error: {}", other));
            }
        }

        match error.kind() {
            ErrorKind::UserCancelled => tracing::info!("Deployment cancelled by user"),
            kind => tracing::error!(kind = %kind, error = %error, "Run failed"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
