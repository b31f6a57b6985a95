//! Wallet-signed deployment.
//!
//! The user's wallet signs a single `DeployContract` transaction. Wallets may
//! finish in a separate page and come back through a redirect, so before the
//! handoff a marker naming the target account is persisted for the success
//! view to pick up.

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};

use crate::busy::BusyFlag;
use crate::chain::ChainClient;
use crate::config::TargetPolicy;
use crate::store::{PendingDeploymentStore, PendingRedirectMarker};
use crate::wallet::{PENDING_TX_HASH, TransactionReceipt, WalletClient, WalletError};
use crate::{
    CompiledArtifact, DeployConfig, DeployError, DeploymentOutcome, SharedOutcome, Transcript,
};

/// Derive a fresh subaccount id for an example deployment.
///
/// The result is `<example>-<millis>.<signer>`, unique per deploy attempt.
pub fn derive_target_account(example_id: &str, signer_id: &str, unix_millis: i64) -> String {
    format!("{}-{}.{}", example_id, unix_millis, signer_id)
}

/// Deploys by asking the connected wallet to sign.
#[derive(Clone)]
pub struct WalletSignedDeploy {
    wallet: Arc<dyn WalletClient>,
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn PendingDeploymentStore>,
    config: DeployConfig,
}

impl WalletSignedDeploy {
    pub fn new(
        wallet: Arc<dyn WalletClient>,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn PendingDeploymentStore>,
        config: &DeployConfig,
    ) -> Self {
        Self {
            wallet,
            chain,
            store,
            config: config.clone(),
        }
    }

    /// The connected account.
    ///
    /// # Errors
    /// Returns [`DeployError::WalletNotConnected`] when no account is connected.
    pub async fn require_account(&self) -> Result<String, DeployError> {
        self.wallet
            .active_account()
            .await
            .ok_or(DeployError::WalletNotConnected)
    }

    /// Resolve the account to deploy into, according to the target policy.
    ///
    /// The existence probe is advisory: a failed probe counts as "absent".
    pub async fn resolve_target(
        &self,
        example_id: &str,
        signer_id: &str,
        transcript: &Transcript,
    ) -> String {
        let derived = derive_target_account(
            example_id,
            signer_id,
            chrono::Utc::now().timestamp_millis(),
        );
        transcript.push(format!("▶ Deploying to: {}", derived));
        transcript.push("▶ Preparing deployment transaction...");

        let exists = self.chain.account_exists(&derived).await;
        tracing::debug!(
            account = %derived,
            exists,
            policy = %self.config.target_policy,
            "Probed derived account"
        );

        if exists {
            return derived;
        }

        match self.config.target_policy {
            TargetPolicy::FallbackToSigner => {
                transcript.push(format!("ℹ️  Deploying to your account: {}", signer_id));
                transcript.push("   (To deploy to subaccount, create it first)");
                signer_id.to_string()
            }
            TargetPolicy::Subaccount => {
                transcript.push(format!(
                    "ℹ️  Account {} will be created during deployment",
                    derived
                ));
                transcript.push("   (Subaccount creation requires parent account balance)");
                derived
            }
        }
    }

    /// Hand `artifact` to the wallet for signing.
    ///
    /// The wallet gets `deploy_timeout` to answer. When it does not, `busy` is
    /// released and a pending outcome is returned, but the wallet call keeps
    /// running: a late answer is settled into `outcome` and written to the
    /// transcript if its cycle is still current. The marker stays until a
    /// terminal answer arrives, or until the redirect consumes it.
    ///
    /// # Errors
    /// - [`DeployError::UserCancelled`] when the user rejects the request
    /// - [`DeployError::DeploymentRejected`] on any other wallet failure
    /// - [`DeployError::Storage`] when the marker cannot be written; nothing is signed
    pub async fn deploy(
        &self,
        artifact: &CompiledArtifact,
        signer_id: &str,
        receiver_id: &str,
        transcript: &Arc<Transcript>,
        busy: &BusyFlag,
        outcome: &SharedOutcome,
    ) -> Result<DeploymentOutcome, DeployError> {
        transcript.push("▶ Uploading WASM contract...");
        transcript.push("▶ Waiting for wallet approval...");

        self.store.put(&PendingRedirectMarker::new(receiver_id))?;

        let cycle = transcript.cycle();
        let mut signing = self.spawn_signing(signer_id, receiver_id, &artifact.wasm);

        match tokio::time::timeout(self.config.deploy_timeout(), &mut signing).await {
            Ok(joined) => {
                let settled = self.settle(joined_result(joined), receiver_id, transcript, cycle);
                if is_final(&settled) {
                    self.clear_marker();
                }
                settled
            }
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.config.deploy_timeout(),
                    receiver = %receiver_id,
                    "Deploy timeout: wallet may have redirected"
                );
                busy.release();
                self.finish_late(signing, receiver_id, Arc::clone(transcript), outcome.clone());
                Ok(DeploymentOutcome::pending())
            }
        }
    }

    fn spawn_signing(&self, signer_id: &str, receiver_id: &str, wasm: &[u8]) -> SigningTask {
        let wallet = Arc::clone(&self.wallet);
        let signer_id = signer_id.to_string();
        let receiver_id = receiver_id.to_string();
        let wasm = wasm.to_vec();

        tokio::spawn(async move {
            wallet
                .sign_and_send_deploy(&signer_id, &receiver_id, &wasm)
                .await
        })
    }

    /// Wait for a wallet call that outlived the timeout and settle its answer.
    fn finish_late(
        &self,
        signing: SigningTask,
        receiver_id: &str,
        transcript: Arc<Transcript>,
        outcome: SharedOutcome,
    ) {
        let this = self.clone();
        let receiver_id = receiver_id.to_string();
        let attempt = outcome.attempt();
        let cycle = transcript.cycle();

        tokio::spawn(async move {
            let result = joined_result(signing.await);
            let late = match this.settle(result, &receiver_id, &transcript, cycle) {
                Ok(late) if !late.is_terminal() => return,
                Ok(late) => late,
                Err(DeployError::UserCancelled) => {
                    transcript.push_in(cycle, "ℹ️  Deployment cancelled by user");
                    let mut cancelled = DeploymentOutcome::pending();
                    cancelled.mark_cancelled();
                    cancelled
                }
                Err(e) => {
                    transcript.push_in(cycle, format!("❌ Error: {}", e));
                    let mut failed = DeploymentOutcome::pending();
                    failed.mark_failed(e.to_string());
                    failed
                }
            };

            // A newer attempt owns the marker by now.
            if outcome.attempt() == attempt {
                this.clear_marker();
            }
            let status = late.status;
            if outcome.settle(attempt, late) {
                tracing::info!(
                    receiver = %receiver_id,
                    status = %status,
                    "Wallet answered after the timeout"
                );
            }
        });
    }

    /// Map a wallet answer to an outcome, writing the transcript lines for it.
    ///
    /// The marker is left to the caller.
    fn settle(
        &self,
        result: Result<TransactionReceipt, WalletError>,
        receiver_id: &str,
        transcript: &Transcript,
        cycle: u64,
    ) -> Result<DeploymentOutcome, DeployError> {
        let mut outcome = DeploymentOutcome::pending();

        match result {
            Ok(receipt) => {
                let hash = receipt.transaction_hash;
                tracing::info!(receiver = %receiver_id, tx = %hash, "Contract deployed by wallet");
                transcript.push_in(cycle, "✓ Contract deployed successfully!");
                transcript.push_in(cycle, format!("✓ Transaction hash: {}", hash));
                transcript.push_in(cycle, format!("✓ Contract available at: {}", receiver_id));

                let links = if hash == PENDING_TX_HASH {
                    Vec::new()
                } else {
                    vec![self.config.explorer_tx_url(&hash)]
                };
                outcome.mark_deployed(receiver_id, hash, links);
                Ok(outcome)
            }
            Err(WalletError::Redirecting(message)) => {
                tracing::debug!(message = %message, "Wallet is redirecting");
                transcript.push_in(cycle, "ℹ️  Redirecting to wallet...");
                Ok(outcome)
            }
            Err(WalletError::Rejected(message)) => {
                tracing::info!(message = %message, "Wallet request rejected");
                Err(DeployError::UserCancelled)
            }
            Err(WalletError::Other(message)) => {
                tracing::error!(message = %message, "Wallet failed to deploy");
                Err(DeployError::DeploymentRejected(message))
            }
        }
    }

    fn clear_marker(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear pending deployment marker");
        }
    }
}

/// Whether a settled answer ends the deployment, as opposed to a redirect.
fn is_final(settled: &Result<DeploymentOutcome, DeployError>) -> bool {
    !matches!(settled, Ok(outcome) if !outcome.is_terminal())
}

type SigningTask = JoinHandle<Result<TransactionReceipt, WalletError>>;

fn joined_result(
    joined: Result<Result<TransactionReceipt, WalletError>, JoinError>,
) -> Result<TransactionReceipt, WalletError> {
    joined.unwrap_or_else(|e| Err(WalletError::Other(format!("Wallet task failed: {}", e))))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::DeploymentStatus;
    use crate::chain::TransactionSummary;
    use crate::store::MemoryPendingStore;

    /// Answers `late123` after `delay`, or never when there is no delay.
    struct SlowWallet {
        delay: Option<Duration>,
    }

    impl SlowWallet {
        fn silent() -> Self {
            Self { delay: None }
        }
    }

    #[async_trait]
    impl WalletClient for SlowWallet {
        async fn init(&self) -> Result<(), WalletError> {
            Ok(())
        }

        async fn dispose(&self) {}

        async fn connect(&self) -> Result<(), WalletError> {
            Ok(())
        }

        async fn active_account(&self) -> Option<String> {
            Some("alice.testnet".to_string())
        }

        async fn sign_and_send_deploy(
            &self,
            _signer_id: &str,
            _receiver_id: &str,
            _wasm: &[u8],
        ) -> Result<TransactionReceipt, WalletError> {
            match self.delay {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(TransactionReceipt::new("late123"))
                }
                None => std::future::pending().await,
            }
        }

        async fn sign_out(&self) -> Result<(), WalletError> {
            Ok(())
        }
    }

    struct EmptyChain;

    #[async_trait]
    impl ChainClient for EmptyChain {
        async fn account_exists(&self, _account_id: &str) -> bool {
            false
        }

        async fn transaction(&self, _hash: &str, _sender_id: &str) -> Option<TransactionSummary> {
            None
        }

        async fn account_balance(&self, _account_id: &str) -> Option<String> {
            None
        }
    }

    fn artifact() -> CompiledArtifact {
        CompiledArtifact {
            success: true,
            wasm: b"\0asm".to_vec(),
            size_bytes: 4,
            diagnostics: None,
            compile_duration_secs: None,
        }
    }

    #[test]
    fn test_derive_target_account() {
        assert_eq!(
            derive_target_account("hello-world", "alice.testnet", 1700000000000),
            "hello-world-1700000000000.alice.testnet"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_busy_flag_once() {
        let store = Arc::new(MemoryPendingStore::new());
        let strategy = WalletSignedDeploy::new(
            Arc::new(SlowWallet::silent()),
            Arc::new(EmptyChain),
            store.clone(),
            &DeployConfig::default(),
        );
        let busy = BusyFlag::new();
        let guard = busy.try_acquire().unwrap();
        let transcript = Arc::new(Transcript::new());
        let shared = SharedOutcome::new();
        shared.begin();

        let started = tokio::time::Instant::now();
        let outcome = strategy
            .deploy(&artifact(), "alice.testnet", "alice.testnet", &transcript, &busy, &shared)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(outcome.status, DeploymentStatus::Pending);
        assert!(!busy.is_busy());
        assert_eq!(busy.release_count(), 1);
        assert!(store.get().unwrap().is_some());

        drop(guard);
        assert_eq!(busy.release_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wallet_answer_after_timeout_is_settled() {
        let store = Arc::new(MemoryPendingStore::new());
        let strategy = WalletSignedDeploy::new(
            Arc::new(SlowWallet {
                delay: Some(Duration::from_secs(45)),
            }),
            Arc::new(EmptyChain),
            store.clone(),
            &DeployConfig::default(),
        );
        let busy = BusyFlag::new();
        let guard = busy.try_acquire().unwrap();
        let transcript = Arc::new(Transcript::new());
        let shared = SharedOutcome::new();
        let attempt = shared.begin();

        let outcome = strategy
            .deploy(&artifact(), "alice.testnet", "alice.testnet", &transcript, &busy, &shared)
            .await
            .unwrap();
        assert_eq!(outcome.status, DeploymentStatus::Pending);
        assert!(!busy.is_busy());
        drop(guard);

        // The caller records the pending outcome; the late receipt must still win.
        shared.settle(attempt, outcome);
        tokio::time::sleep(Duration::from_secs(20)).await;

        let settled = shared.get().unwrap();
        assert_eq!(settled.status, DeploymentStatus::Deployed);
        assert_eq!(settled.transaction_id.as_deref(), Some("late123"));
        assert_eq!(settled.contract_id.as_deref(), Some("alice.testnet"));
        assert!(transcript.contains("✓ Transaction hash: late123"));
        assert!(store.get().unwrap().is_none());
        assert_eq!(busy.release_count(), 1);
    }

    #[tokio::test]
    async fn test_subaccount_policy_targets_derived_account() {
        let strategy = WalletSignedDeploy::new(
            Arc::new(SlowWallet::silent()),
            Arc::new(EmptyChain),
            Arc::new(MemoryPendingStore::new()),
            &DeployConfig {
                target_policy: TargetPolicy::Subaccount,
                ..Default::default()
            },
        );
        let transcript = Transcript::new();

        let target = strategy
            .resolve_target("counter", "alice.testnet", &transcript)
            .await;
        assert!(target.starts_with("counter-"));
        assert!(target.ends_with(".alice.testnet"));
        assert!(transcript.contains("will be created during deployment"));
    }
}
