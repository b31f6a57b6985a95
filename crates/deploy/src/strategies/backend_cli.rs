//! Backend-signed deployment.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::{BackendClient, BackendDeployment};
use crate::history::{BrowserHistory, canonical_success_url};
use crate::store::{PendingDeploymentStore, PendingRedirectMarker};
use crate::{CompiledArtifact, DeployConfig, DeployError, DeploymentOutcome, Transcript};

/// Deploys through the backend, which holds its own signing credentials.
///
/// No wallet is involved. On success the contract is probed once with a
/// read-only call, then the location moves to the success view.
pub struct BackendCliDeploy {
    backend: BackendClient,
    store: Arc<dyn PendingDeploymentStore>,
    history: Arc<dyn BrowserHistory>,
    config: DeployConfig,
}

impl BackendCliDeploy {
    pub fn new(
        backend: BackendClient,
        store: Arc<dyn PendingDeploymentStore>,
        history: Arc<dyn BrowserHistory>,
        config: &DeployConfig,
    ) -> Self {
        Self {
            backend,
            store,
            history,
            config: config.clone(),
        }
    }

    /// Deploy `artifact` and move to the success view.
    ///
    /// # Errors
    /// Backend errors are returned unchanged; the caller renders them.
    pub async fn deploy(
        &self,
        artifact: &CompiledArtifact,
        transcript: &Transcript,
    ) -> Result<DeploymentOutcome, DeployError> {
        transcript.push("\n▶ Deploying via NEAR CLI...");
        transcript.push("   (Using backend deployment account)");

        let deployment = self
            .backend
            .deploy(
                &artifact.wasm_base64(),
                &self.config.init_method,
                &Value::Object(Default::default()),
            )
            .await?;

        tracing::info!(
            contract = %deployment.contract_id,
            tx = %deployment.transaction_hash,
            network = %deployment.network,
            "Contract deployed by backend"
        );
        report_deployment(&deployment, transcript);

        let mut outcome = DeploymentOutcome::pending();
        outcome.mark_deployed(
            &deployment.contract_id,
            &deployment.transaction_hash,
            self.explorer_links(&deployment),
        );

        self.verify(&deployment.contract_id, transcript).await;
        self.move_to_success(&deployment, transcript).await;

        Ok(outcome)
    }

    /// Backend links, or links built from the configured explorer when it sent none.
    fn explorer_links(&self, deployment: &BackendDeployment) -> Vec<String> {
        let links = deployment.explorer_links();
        if !links.is_empty() {
            return links;
        }
        vec![
            self.config.explorer_tx_url(&deployment.transaction_hash),
            self.config.explorer_account_url(&deployment.contract_id),
        ]
    }

    /// One read-only call against the new contract. Never affects the outcome.
    async fn verify(&self, contract_id: &str, transcript: &Transcript) {
        transcript.push("\n▶ Testing deployed contract...");

        match self
            .backend
            .view(
                contract_id,
                &self.config.verify_method,
                &Value::Object(Default::default()),
            )
            .await
        {
            Ok(result) => transcript.push(format!("✓ Test call successful: {}", result)),
            Err(e) => {
                tracing::warn!(
                    contract = %contract_id,
                    method = %self.config.verify_method,
                    error = %e,
                    "Verification call failed"
                );
            }
        }
    }

    async fn move_to_success(&self, deployment: &BackendDeployment, transcript: &Transcript) {
        if deployment.transaction_hash.is_empty() {
            return;
        }

        if let Err(e) = self
            .store
            .put(&PendingRedirectMarker::new(&deployment.contract_id))
        {
            tracing::warn!(error = %e, "Failed to save pending deployment marker");
        }

        transcript.push("\n▶ Redirecting to success page...");
        tokio::time::sleep(self.config.success_redirect_delay()).await;

        let url = canonical_success_url(
            &self.history.location(),
            &self.config.success_path,
            &deployment.transaction_hash,
        );
        tracing::debug!(url = %url, "Moving to success view");
        self.history.replace_state(url);
    }
}

fn report_deployment(deployment: &BackendDeployment, transcript: &Transcript) {
    transcript.push("✓ Contract deployed successfully!");
    transcript.push(format!("✓ Contract ID: {}", deployment.contract_id));
    transcript.push(format!("✓ Transaction hash: {}", deployment.transaction_hash));
    transcript.push(format!("✓ Network: {}", deployment.network));
    if let Some(time) = deployment.deployment_time {
        transcript.push(format!("✓ Deployment time: {}s", time));
    }
    if let Some(url) = &deployment.explorer_url {
        transcript.push("\n🔗 View in Explorer:");
        transcript.push(format!("   {}", url));
    }
    if let Some(url) = &deployment.account_url {
        transcript.push("\n🔗 View Account:");
        transcript.push(format!("   {}", url));
    }
}
