use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use nbx_deploy::{DeployConfig, DeploymentStrategy, SourceLanguage};
use tracing::level_filters::LevelFilter;
use url::Url;

/// Configuration file read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "nbx.toml";

/// Prefix of environment variables overriding configuration keys.
const ENV_PREFIX: &str = "NBX_";

#[derive(Parser)]
#[command(name = "nbx")]
#[command(
    author,
    version,
    about = "Compile and deploy NEAR example contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "NBX_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a configuration file.
    ///
    /// Defaults to ./nbx.toml when present. Keys can also be set with NBX_<KEY>
    /// environment variables, e.g. NBX_BACKEND_URL.
    #[arg(long, alias = "conf", env = "NBX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the backend API. Overrides the configuration file.
    #[arg(long, env = "NBX_BACKEND_URL")]
    pub backend_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile a contract without deploying it.
    Run {
        /// Contract source file.
        file: PathBuf,

        /// Source language. Inferred from the file extension when omitted.
        #[arg(short, long)]
        language: Option<SourceLanguage>,
    },

    /// Compile and deploy a contract through the backend.
    ///
    /// Only Rust contracts can be deployed from a terminal. JavaScript and
    /// TypeScript contracts are signed by a browser wallet.
    Deploy {
        /// Contract source file.
        file: PathBuf,

        /// Source language. Inferred from the file extension when omitted.
        #[arg(short, long)]
        language: Option<SourceLanguage>,

        /// Example id of the page the deployment starts from.
        #[arg(short, long, default_value = "hello-world")]
        example: String,
    },

    /// Show backend, account and pending deployment status.
    Status {
        /// Account whose balance to show.
        #[arg(short, long, env = "NBX_ACCOUNT_ID")]
        account: Option<String>,
    },

    /// Resolve a wallet return URL into the success view.
    Reconcile {
        /// The URL the wallet redirected to.
        url: Url,

        /// The connected wallet account.
        #[arg(short, long, env = "NBX_ACCOUNT_ID")]
        account: Option<String>,
    },

    /// Print the effective configuration as TOML.
    Config,
}

impl Cli {
    /// Merge defaults, the configuration file, environment and flags.
    pub fn load_config(&self) -> anyhow::Result<DeployConfig> {
        let mut figment = Figment::from(Serialized::defaults(DeployConfig::default()));

        match &self.config {
            Some(path) => {
                anyhow::ensure!(
                    path.exists(),
                    "Configuration file not found: {}",
                    path.display()
                );
                figment = figment.merge(Toml::file(path));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
            }
            None => {}
        }

        let mut config: DeployConfig = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .context("Failed to load configuration")?;

        if let Some(backend_url) = &self.backend_url {
            config.backend_url = backend_url.clone();
        }

        Ok(config)
    }
}

/// Pick the language from `explicit`, or from the extension of `file`.
pub fn resolve_language(
    file: &Path,
    explicit: Option<SourceLanguage>,
) -> anyhow::Result<SourceLanguage> {
    if let Some(language) = explicit {
        return Ok(language);
    }

    match file.extension().and_then(|ext| ext.to_str()) {
        Some("rs") => Ok(SourceLanguage::Rust),
        Some("js") | Some("mjs") => Ok(SourceLanguage::JavaScript),
        Some("ts") => Ok(SourceLanguage::TypeScript),
        _ => anyhow::bail!(
            "Cannot infer the language of {}; pass --language",
            file.display()
        ),
    }
}

/// Refuse languages whose deployments need a wallet to sign.
///
/// Checked before anything is compiled or persisted.
pub fn ensure_terminal_deployable(language: SourceLanguage) -> anyhow::Result<()> {
    match language.strategy() {
        DeploymentStrategy::BackendCli => Ok(()),
        DeploymentStrategy::WalletSigned => anyhow::bail!(
            "{} contracts are deployed with a browser wallet; `nbx deploy` only handles Rust",
            language
        ),
    }
}
