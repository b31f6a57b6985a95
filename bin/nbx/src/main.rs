//! nbx compiles NEAR example contracts and deploys them to testnet.

mod cli;
mod wallet;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;
use strum::IntoEnumIterator;
use url::Url;

use cli::{Cli, Command, ensure_terminal_deployable, resolve_language};
use nbx_deploy::{
    BackendClient, BrowserHistory, Capabilities, ChainClient, DeployConfig, DeploymentOrchestrator,
    DeploymentOutcome, DeploymentStatus, DeploymentStrategy, FilePendingStore, MemoryHistory,
    NearRpcClient, PendingDeploymentStore, RedirectReconciler, SourceLanguage, SuccessSummary,
    SuccessView, WalletClient,
};
use wallet::TerminalWallet;

/// Origin the in-process history starts from.
const APP_URL: &str = "http://localhost:5173/examples/";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = cli.load_config()?;
    tracing::debug!(
        backend = %config.backend_url,
        network = %config.network,
        "Configuration loaded"
    );

    match cli.command {
        Command::Run { file, language } => run(config, &file, language).await,
        Command::Deploy {
            file,
            language,
            example,
        } => deploy(config, &file, language, &example).await,
        Command::Status { account } => status(&config, account.as_deref()).await,
        Command::Reconcile { url, account } => reconcile(&config, url, account.as_deref()).await,
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn read_source(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn orchestrator(
    config: DeployConfig,
    wallet: Arc<TerminalWallet>,
    example_id: &str,
) -> Result<DeploymentOrchestrator> {
    let start = Url::parse(APP_URL)?.join(example_id)?;
    let capabilities = Capabilities {
        wallet,
        chain: Arc::new(NearRpcClient::new(config.node_url.clone())?),
        store: Arc::new(FilePendingStore::in_data_dir()?),
        history: Arc::new(MemoryHistory::new(start)),
    };

    Ok(DeploymentOrchestrator::new(config, capabilities)?)
}

async fn run(config: DeployConfig, file: &Path, language: Option<SourceLanguage>) -> Result<()> {
    let language = resolve_language(file, language)?;
    let code = read_source(file)?;

    let orchestrator = orchestrator(config, Arc::new(TerminalWallet), "run")?;

    let result = orchestrator.run(&code, language).await;
    print!("{}", orchestrator.transcript());

    let artifact = result?;
    tracing::debug!(size_bytes = artifact.size_bytes, "Run finished");
    Ok(())
}

async fn deploy(
    config: DeployConfig,
    file: &Path,
    language: Option<SourceLanguage>,
    example_id: &str,
) -> Result<()> {
    let language = resolve_language(file, language)?;
    ensure_terminal_deployable(language)?;
    let code = read_source(file)?;

    let wallet = Arc::new(TerminalWallet);
    wallet.init().await?;

    let orchestrator = orchestrator(config, Arc::clone(&wallet), example_id)?;
    if !orchestrator.refresh_backend_status().await {
        tracing::warn!(
            backend = %orchestrator.config().backend_url,
            "Backend deployments are disabled"
        );
    }

    let outcome = orchestrator.deploy(&code, language, example_id).await?;
    wallet.dispose().await;

    print!("{}", orchestrator.transcript());
    println!("{}", outcome_table(&outcome));

    // Backend deployments end on the success view; showing it consumes the marker.
    if let Some(summary) = orchestrator.load_success(None).await? {
        println!("{}", success_table(&summary));
    }

    if outcome.status == DeploymentStatus::Failed {
        anyhow::bail!(
            "Deployment failed: {}",
            outcome.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn status(config: &DeployConfig, account: Option<&str>) -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Item", "Value"]);

    let backend = BackendClient::new(&config.backend_url)?;
    let (configured, backend_status) = match backend.status().await {
        Ok(status) if status.configured => (true, "configured".to_string()),
        Ok(_) => (false, "not configured".to_string()),
        Err(e) => (false, format!("unreachable ({})", e)),
    };
    table.add_row(vec!["Backend".to_string(), config.backend_url.clone()]);
    table.add_row(vec!["Backend deployments".to_string(), backend_status]);
    table.add_row(vec!["Network".to_string(), config.network.clone()]);

    for language in SourceLanguage::iter() {
        let strategy = language.strategy();
        let method = match strategy {
            DeploymentStrategy::BackendCli if !configured => format!("{} (disabled)", strategy),
            DeploymentStrategy::BackendCli => strategy.to_string(),
            DeploymentStrategy::WalletSigned => format!("{} (browser only)", strategy),
        };
        table.add_row(vec![format!("{} deploys", language), method]);
    }

    if let Some(account) = account {
        let chain = NearRpcClient::new(config.node_url.clone())?;
        let balance = chain
            .account_balance(account)
            .await
            .map(|b| format!("{} NEAR", b))
            .unwrap_or_else(|| "unavailable".to_string());
        table.add_row(vec!["Account".to_string(), account.to_string()]);
        table.add_row(vec!["Balance".to_string(), balance]);
    }

    let store = FilePendingStore::in_data_dir()?;
    let pending = store
        .get()?
        .map(|marker| marker.target_account_id)
        .unwrap_or_else(|| "none".to_string());
    table.add_row(vec!["Pending deployment".to_string(), pending]);

    println!("{table}");
    Ok(())
}

async fn reconcile(config: &DeployConfig, url: Url, account: Option<&str>) -> Result<()> {
    let history = Arc::new(MemoryHistory::new(url));
    let reconciler = RedirectReconciler::new(history.clone(), config);

    if let Some(rewritten) = reconciler.reconcile_current() {
        tracing::info!(url = %rewritten, "Moved to success view");
    }

    let store: Arc<dyn PendingDeploymentStore> = Arc::new(FilePendingStore::in_data_dir()?);
    let chain: Arc<dyn ChainClient> = Arc::new(NearRpcClient::new(config.node_url.clone())?);
    let summary = SuccessView::new(store, chain, config)
        .load(&history.location(), account)
        .await?;

    println!("{}", success_table(&summary));
    Ok(())
}

fn outcome_table(outcome: &DeploymentOutcome) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Status".to_string(), outcome.status.to_string()]);

    if let Some(contract) = &outcome.contract_id {
        table.add_row(vec!["Contract".to_string(), contract.clone()]);
    }
    if let Some(tx) = &outcome.transaction_id {
        table.add_row(vec!["Transaction".to_string(), tx.clone()]);
    }
    for link in &outcome.explorer_links {
        table.add_row(vec!["Explorer".to_string(), link.clone()]);
    }
    if let Some(error) = &outcome.error_message {
        table.add_row(vec!["Error".to_string(), error.clone()]);
    }
    table
}

fn success_table(summary: &SuccessSummary) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Transaction".to_string(), summary.reference.clone()]);
    table.add_row(vec![
        "Contract".to_string(),
        summary
            .contract_id
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
    ]);
    table.add_row(vec!["Explorer".to_string(), summary.explorer_tx_url.clone()]);
    if let Some(account_url) = &summary.explorer_account_url {
        table.add_row(vec!["Account".to_string(), account_url.clone()]);
    }
    table
}
