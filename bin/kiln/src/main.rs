//! kiln deploys compiled smart contracts to EVM networks.

mod cli;

use std::{path::Path, pin::pin, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;
use futures::{Stream, StreamExt, future::join_all, stream};

use cli::{Cli, Command, DeployArgs};
use kiln_deploy::{
    ArtifactProvider, CancellationToken, ContractArtifact, DeployError, DeploymentReceipt,
    DeploymentRecord, DeploymentStore, ErrorKind, HardhatArtifacts, JsonRpcClient, KilnConfig,
    Orchestrator,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize the logger. Stdout only carries receipts.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => ExitCode::from(report(&err)),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = KilnConfig::resolve_path(Path::new(&cli.config));

    match cli.command {
        Command::Init { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "{} already exists, pass --force to overwrite it",
                    config_path.display()
                );
            }
            KilnConfig::default().save_to_file(&config_path)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Networks => {
            let config = KilnConfig::load(&config_path)?;
            println!("{}", networks_table(&config));
            Ok(ExitCode::SUCCESS)
        }
        Command::Deploy(args) => {
            let config = KilnConfig::load(&config_path)?;
            deploy(&config, &args).await
        }
    }
}

/// Deploy one contract to every requested network concurrently.
///
/// Receipts go to stdout as they are collected; each failure is reported on stderr.
/// The exit code is the one of the first failed network.
async fn deploy(config: &KilnConfig, args: &DeployArgs) -> Result<ExitCode> {
    let artifact = HardhatArtifacts::new(&config.paths.artifacts).get_artifact(&args.contract)?;

    if let Some(version) = &artifact.compiler_version
        && version.split('+').next() != Some(config.solidity.version.as_str())
    {
        tracing::warn!(
            contract = %artifact.name,
            artifact_version = %version,
            configured_version = %config.solidity.version,
            "Artifact was compiled with a different solidity version"
        );
    }

    let cancel = CancellationToken::new();
    let ctrl_c = stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
    });
    tokio::spawn(watch_interrupts(ctrl_c, cancel.clone(), || {
        std::process::exit(ErrorKind::Cancelled.exit_code().into());
    }));

    let results = join_all(unique_networks(&args.networks).into_iter().map(|network| {
        let cancel = cancel.clone();
        let artifact = artifact.clone();
        async move {
            deploy_to(config, args, artifact, network, cancel)
                .await
                .with_context(|| format!("Deployment to {} failed", network))
        }
    }))
    .await;

    let mut exit_code = None;
    for result in results {
        match result {
            Ok(receipt) => println!("{}", receipt),
            Err(err) => {
                let code = report(&err);
                exit_code.get_or_insert(code);
            }
        }
    }

    Ok(exit_code.map_or(ExitCode::SUCCESS, ExitCode::from))
}

async fn deploy_to(
    config: &KilnConfig,
    args: &DeployArgs,
    artifact: ContractArtifact,
    network: &str,
    cancel: CancellationToken,
) -> Result<DeploymentReceipt> {
    let descriptor = config.network(network)?;
    let store = DeploymentStore::new(&config.paths.deployments);

    if !args.redeploy
        && let Some(record) = store.load(network, &artifact.name)?
    {
        tracing::info!(
            contract = %record.contract,
            network = %record.network,
            address = %record.address,
            "Contract already deployed, skipping. Pass --redeploy to deploy it again."
        );
        return Ok(record.receipt());
    }

    let values = artifact.parse_args(&args.args)?;

    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.deploy.confirmation_timeout());

    let client = JsonRpcClient::new(descriptor.clone())
        .context("Failed to create HTTP client")?
        .with_poll_interval(config.deploy.poll_interval());

    let orchestrator = Orchestrator::new(client)
        .with_timeout(timeout)
        .with_cancellation(cancel);

    let receipt = orchestrator
        .deploy(artifact.clone(), &descriptor, &values)
        .await?;

    if descriptor.save_deployments {
        let record = DeploymentRecord::new(
            &receipt,
            &artifact,
            &args.args,
            &config.solidity,
            descriptor.chain_id,
        );
        // The contract is on chain either way: keep the receipt.
        if let Err(err) = store.save(&record) {
            tracing::error!(
                contract = %receipt.contract,
                network = %receipt.network,
                error = %format!("{:#}", err),
                "Failed to save deployment record"
            );
        }
    }

    Ok(receipt)
}

/// Requested networks without repeats, in the order first given.
///
/// Two attempts on one network would sign with the same account and nonce.
fn unique_networks(networks: &[String]) -> Vec<&str> {
    let mut unique: Vec<&str> = Vec::with_capacity(networks.len());
    for network in networks {
        if unique.contains(&network.as_str()) {
            tracing::warn!(network = %network, "Network given more than once, deploying once");
        } else {
            unique.push(network);
        }
    }
    unique
}

/// The first interrupt cancels in-flight deployments, the second calls `force_exit`.
async fn watch_interrupts<S, F>(interrupts: S, cancel: CancellationToken, force_exit: F)
where
    S: Stream<Item = ()>,
    F: FnOnce(),
{
    let mut interrupts = pin!(interrupts);

    if interrupts.next().await.is_none() {
        return;
    }
    tracing::warn!(
        "Interrupted, cancelling deployments. Waiting for in-flight transactions, \
         press Ctrl-C again to exit immediately."
    );
    cancel.cancel();

    if interrupts.next().await.is_some() {
        tracing::warn!("Interrupted again, exiting without waiting for confirmations");
        force_exit();
    }
}

fn networks_table(config: &KilnConfig) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Network",
        "URL",
        "Chain ID",
        "Accounts",
        "Gas price",
        "Save deployments",
    ]);

    for (name, network) in &config.networks {
        table.add_row(vec![
            name.clone(),
            network.url.clone().unwrap_or_else(|| "-".to_string()),
            network
                .chain_id
                .map_or_else(|| "-".to_string(), |id| id.to_string()),
            network.accounts.len().to_string(),
            network
                .gas_price
                .map_or_else(|| "auto".to_string(), |price| format!("{} wei", price)),
            network.save_deployments.to_string(),
        ]);
    }

    table
}

/// Print `err` to stderr and return the matching exit code.
fn report(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<DeployError>() {
        Some(deploy_err) => {
            eprintln!("error[{}]: {:#}", deploy_err.kind(), err);
            if let Some(tx_hash) = deploy_err.tx_hash() {
                eprintln!("  transaction: {}", tx_hash);
            }
            deploy_err.kind().exit_code()
        }
        None => {
            eprintln!("error: {:#}", err);
            1
        }
    }
}
