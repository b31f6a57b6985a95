//! Source languages and the deployment strategy each one requires.

use serde::{Deserialize, Serialize};

/// Language of a contract snippet, as understood by the build service.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum SourceLanguage {
    Rust,
    JavaScript,
    TypeScript,
}

/// The two deployment protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum DeploymentStrategy {
    /// Custodial deployment through the backend's signing key.
    #[strum(serialize = "CLI")]
    BackendCli,
    /// Deployment signed by the user's wallet, possibly across a redirect.
    #[strum(serialize = "Wallet")]
    WalletSigned,
}

/// Map a source language to the protocol used to deploy it.
///
/// Rust contracts can only be deployed by the backend; everything else goes
/// through the connected wallet.
pub const fn select_strategy(language: SourceLanguage) -> DeploymentStrategy {
    match language {
        SourceLanguage::Rust => DeploymentStrategy::BackendCli,
        SourceLanguage::JavaScript | SourceLanguage::TypeScript => DeploymentStrategy::WalletSigned,
    }
}

impl SourceLanguage {
    pub const fn strategy(self) -> DeploymentStrategy {
        select_strategy(self)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_every_language_maps_to_one_strategy() {
        for language in SourceLanguage::iter() {
            let first = select_strategy(language);
            let second = select_strategy(language);
            assert_eq!(first, second, "mapping for {language} must be stable");
        }
    }

    #[test]
    fn test_rust_uses_backend() {
        assert_eq!(select_strategy(SourceLanguage::Rust), DeploymentStrategy::BackendCli);
        assert_eq!(
            select_strategy(SourceLanguage::JavaScript),
            DeploymentStrategy::WalletSigned
        );
        assert_eq!(
            select_strategy(SourceLanguage::TypeScript),
            DeploymentStrategy::WalletSigned
        );
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!(SourceLanguage::from_str("rust").unwrap(), SourceLanguage::Rust);
        assert_eq!(
            SourceLanguage::from_str("JavaScript").unwrap(),
            SourceLanguage::JavaScript
        );
        assert!(SourceLanguage::from_str("python").is_err());
        assert_eq!(SourceLanguage::TypeScript.to_string(), "TypeScript");
    }

    #[test]
    fn test_strategy_labels() {
        assert_eq!(DeploymentStrategy::BackendCli.to_string(), "CLI");
        assert_eq!(DeploymentStrategy::WalletSigned.to_string(), "Wallet");
    }
}
