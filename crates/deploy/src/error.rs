//! Error taxonomy for the compile/deploy pipeline.

use thiserror::Error;

/// Coarse classification of a [`DeployError`].
///
/// The kind decides how a failure is presented: network-class errors get the
/// backend endpoint appended, cancellations are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    EmptySource,
    Unreachable,
    CompileRejected,
    WalletNotConnected,
    UserCancelled,
    BackendNotConfigured,
    DeploymentRejected,
    MissingReference,
    InvalidResponse,
    Storage,
    Busy,
}

/// Errors surfaced by the deployment subsystem.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The source buffer was empty; rejected before any request is made.
    #[error("No code to compile")]
    EmptySource,

    /// The remote service could not be reached.
    #[error("Failed to connect to {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The build service refused the source, carrying its diagnostics.
    #[error("{0}")]
    CompileRejected(String),

    /// A wallet-signed deployment was requested without a connected account.
    #[error("Please connect your wallet first")]
    WalletNotConnected,

    /// The user rejected the transaction in the wallet.
    #[error("Deployment cancelled by user")]
    UserCancelled,

    /// The backend answered 503: no deployment credentials are configured.
    #[error("Backend NEAR CLI not configured")]
    BackendNotConfigured,

    /// The backend or the chain refused the deployment.
    #[error("{0}")]
    DeploymentRejected(String),

    /// The success view was opened without a transaction reference.
    #[error("No transaction hash found in URL")]
    MissingReference,

    /// A response could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The pending-deployment marker store failed.
    #[error("Marker storage error: {0}")]
    Storage(String),

    /// A run or deployment is already in flight.
    #[error("A run or deployment is already in progress")]
    Busy,
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::EmptySource => ErrorKind::EmptySource,
            DeployError::Unreachable { .. } => ErrorKind::Unreachable,
            DeployError::CompileRejected(_) => ErrorKind::CompileRejected,
            DeployError::WalletNotConnected => ErrorKind::WalletNotConnected,
            DeployError::UserCancelled => ErrorKind::UserCancelled,
            DeployError::BackendNotConfigured => ErrorKind::BackendNotConfigured,
            DeployError::DeploymentRejected(_) => ErrorKind::DeploymentRejected,
            DeployError::MissingReference => ErrorKind::MissingReference,
            DeployError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            DeployError::Storage(_) => ErrorKind::Storage,
            DeployError::Busy => ErrorKind::Busy,
        }
    }

    /// Whether this is a transport-level failure.
    pub fn is_network(&self) -> bool {
        self.kind() == ErrorKind::Unreachable
    }

    pub(crate) fn unreachable(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        DeployError::Unreachable {
            endpoint: endpoint.into(),
            source,
        }
    }
}

pub type Result<T, E = DeployError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(DeployError::EmptySource.kind(), ErrorKind::EmptySource);
        assert_eq!(
            DeployError::BackendNotConfigured.kind(),
            ErrorKind::BackendNotConfigured
        );
        assert_eq!(
            DeployError::DeploymentRejected("boom".into()).kind(),
            ErrorKind::DeploymentRejected
        );
        assert!(!DeployError::UserCancelled.is_network());
    }

    #[test]
    fn test_not_configured_and_rejected_read_differently() {
        let not_configured = DeployError::BackendNotConfigured.to_string();
        let rejected = DeployError::DeploymentRejected("Deployment failed".into()).to_string();
        assert_ne!(not_configured, rejected);
        assert!(not_configured.contains("not configured"));
    }

    #[test]
    fn test_kind_display_is_kebab_case() {
        assert_eq!(ErrorKind::WalletNotConnected.to_string(), "wallet-not-connected");
        assert_eq!(ErrorKind::Unreachable.to_string(), "unreachable");
    }
}
