//! The success view: what gets shown once a deployment has landed.

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::chain::ChainClient;
use crate::history::success_reference;
use crate::store::PendingDeploymentStore;
use crate::{DeployConfig, DeployError};

/// Everything the success view renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuccessSummary {
    /// Transaction reference taken from the URL.
    pub reference: String,
    /// The account the contract was deployed to, when known.
    pub contract_id: Option<String>,
    pub explorer_tx_url: String,
    pub explorer_account_url: Option<String>,
}

/// Resolves a success URL into a [`SuccessSummary`].
pub struct SuccessView {
    store: Arc<dyn PendingDeploymentStore>,
    chain: Arc<dyn ChainClient>,
    config: DeployConfig,
}

impl SuccessView {
    pub fn new(
        store: Arc<dyn PendingDeploymentStore>,
        chain: Arc<dyn ChainClient>,
        config: &DeployConfig,
    ) -> Self {
        Self {
            store,
            chain,
            config: config.clone(),
        }
    }

    /// Build the summary for `url`.
    ///
    /// Consumes the pending-deployment marker, so a second load of the same
    /// view no longer sees it. When the chain reports that the transaction
    /// deployed code, its receiver wins over the marker.
    ///
    /// # Arguments
    /// * `url` - The success-view URL, carrying `ref` or `transactionHashes`
    /// * `signer_id` - The connected account, used to route the transaction lookup
    ///
    /// # Errors
    /// Returns [`DeployError::MissingReference`] when the URL has no reference.
    pub async fn load(
        &self,
        url: &Url,
        signer_id: Option<&str>,
    ) -> Result<SuccessSummary, DeployError> {
        let reference = success_reference(url).ok_or(DeployError::MissingReference)?;

        let marker = match self.store.take() {
            Ok(marker) => marker,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read pending deployment marker");
                None
            }
        };
        let mut contract_id = marker.map(|m| m.target_account_id);

        let sender = signer_id.map(String::from).or_else(|| contract_id.clone());
        if let Some(sender) = sender
            && let Some(summary) = self.chain.transaction(&reference, &sender).await
            && let Some(deployed) = summary.deployed_contract()
        {
            if contract_id.as_deref() != Some(deployed) {
                tracing::debug!(
                    marker = ?contract_id,
                    chain = %deployed,
                    "Chain receiver overrides pending deployment marker"
                );
            }
            contract_id = Some(deployed.to_string());
        }

        tracing::info!(reference = %reference, contract = ?contract_id, "Deployment confirmed");

        Ok(SuccessSummary {
            explorer_tx_url: self.config.explorer_tx_url(&reference),
            explorer_account_url: contract_id
                .as_deref()
                .map(|id| self.config.explorer_account_url(id)),
            reference,
            contract_id,
        })
    }
}
