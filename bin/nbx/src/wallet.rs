//! Wallet capability for terminal sessions.

use async_trait::async_trait;
use nbx_deploy::{TransactionReceipt, WalletClient, WalletError};

/// Why a terminal cannot sign wallet deployments.
pub const BROWSER_WALLET_REQUIRED: &str =
    "Wallet deployments need a browser wallet; open the example in the playground to deploy it";

/// Wallet for terminal sessions.
///
/// A terminal has no wallet to sign with, so no account is ever connected and
/// every signing request is refused. Backend deployments and compile runs do
/// not touch it.
#[derive(Debug, Default)]
pub struct TerminalWallet;

#[async_trait]
impl WalletClient for TerminalWallet {
    async fn init(&self) -> Result<(), WalletError> {
        tracing::trace!("Terminal wallet initialized");
        Ok(())
    }

    async fn dispose(&self) {
        tracing::trace!("Terminal wallet disposed");
    }

    async fn connect(&self) -> Result<(), WalletError> {
        Err(WalletError::Other(BROWSER_WALLET_REQUIRED.to_string()))
    }

    async fn active_account(&self) -> Option<String> {
        None
    }

    async fn sign_and_send_deploy(
        &self,
        signer_id: &str,
        receiver_id: &str,
        _wasm: &[u8],
    ) -> Result<TransactionReceipt, WalletError> {
        tracing::warn!(
            signer = %signer_id,
            receiver = %receiver_id,
            "Refusing to sign in a terminal"
        );
        Err(WalletError::Other(BROWSER_WALLET_REQUIRED.to_string()))
    }

    async fn sign_out(&self) -> Result<(), WalletError> {
        Ok(())
    }
}
