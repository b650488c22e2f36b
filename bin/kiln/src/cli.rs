use clap::{Parser, Subcommand};
use kiln_deploy::{KILNCONF_FILENAME, config::DEFAULT_NETWORK};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "Deploy compiled smart contracts to EVM networks")]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "KILN_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the Kiln.toml configuration file, or to the directory holding it.
    #[arg(long, alias = "conf", global = true, env = "KILN_CONFIG", default_value = KILNCONF_FILENAME)]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy a contract to one or more networks.
    Deploy(DeployArgs),

    /// List the configured networks.
    Networks,

    /// Write a default configuration file.
    Init {
        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct DeployArgs {
    /// Contract name, or fully qualified `path/to/Source.sol:Name`.
    pub contract: String,

    /// Target network. Repeat to deploy to several networks concurrently.
    #[arg(short, long = "network", default_values_t = [DEFAULT_NETWORK.to_string()])]
    pub networks: Vec<String>,

    /// Constructor argument, in declaration order.
    #[arg(short, long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Redeploy even if a deployment record already exists.
    /// If not provided and a record exists, the recorded deployment is reported instead.
    #[arg(long, env = "KILN_REDEPLOY", default_value_t = false)]
    pub redeploy: bool,

    /// Bound on submission plus confirmation, in seconds.
    ///
    /// Overrides `deploy.confirmation_timeout_secs` from the configuration.
    #[arg(long, env = "KILN_TIMEOUT")]
    pub timeout: Option<u64>,
}
