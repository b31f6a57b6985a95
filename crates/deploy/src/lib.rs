//! nbx-deploy - Compile and deploy orchestration for NEAR example contracts.
//!
//! This crate takes a contract snippet from source to a deployed account on a
//! NEAR network. Rust contracts are deployed by the backend with its own key;
//! JavaScript and TypeScript contracts are signed by the user's wallet, which
//! may finish through a browser redirect that the [`RedirectReconciler`]
//! picks up.

mod artifact;
mod busy;
mod compile;
mod config;
mod error;
mod language;
mod orchestrator;
mod outcome;
mod transcript;

pub mod backend;
pub mod chain;
pub mod history;
pub mod reconciler;
pub mod rpc;
pub mod store;
pub mod strategies;
pub mod success;
pub mod wallet;

pub use artifact::CompiledArtifact;
pub use backend::{BackendClient, BackendDeployment, BackendStatus};
pub use busy::{BusyFlag, BusyGuard};
pub use chain::{ChainClient, NearRpcClient, TransactionSummary};
pub use compile::CompileClient;
pub use config::{
    DEFAULT_BACKEND_URL, DEFAULT_EXPLORER_URL, DEFAULT_NETWORK, DEFAULT_NODE_URL, DeployConfig,
    TargetPolicy,
};
pub use error::{DeployError, ErrorKind, Result};
pub use history::{BrowserHistory, MemoryHistory};
pub use language::{DeploymentStrategy, SourceLanguage, select_strategy};
pub use orchestrator::{Capabilities, DeploymentOrchestrator, OrchestratorState};
pub use outcome::{DeploymentOutcome, DeploymentStatus, SharedOutcome};
pub use reconciler::{ReconcilerHandle, ReconcilerState, RedirectReconciler, UrlObserver};
pub use store::{
    FilePendingStore, MemoryPendingStore, PendingDeploymentStore, PendingRedirectMarker,
};
pub use strategies::{BackendCliDeploy, WalletSignedDeploy};
pub use success::{SuccessSummary, SuccessView};
pub use transcript::Transcript;
pub use wallet::{TransactionReceipt, WalletClient, WalletError};
