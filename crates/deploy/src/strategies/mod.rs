//! Deployment strategies.
//!
//! Each strategy takes a compiled artifact to a [`crate::DeploymentOutcome`]:
//! - `backend_cli` - the backend signs with its own key
//! - `wallet_signed` - the user's wallet signs a `DeployContract` transaction

pub mod backend_cli;
pub mod wallet_signed;

pub use backend_cli::BackendCliDeploy;
pub use wallet_signed::{WalletSignedDeploy, derive_target_account};
