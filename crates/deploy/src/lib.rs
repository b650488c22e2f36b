//! kiln-deploy - Contract deployment library for EVM networks.
//!
//! This crate drives a single contract deployment from a compiled artifact to a
//! confirmed on-chain address: local validation, one signed creation transaction,
//! and a bounded, cancellable wait for confirmation.

mod artifact;
pub use artifact::{ArtifactProvider, ContractArtifact, HardhatArtifacts};

pub mod client;
pub use client::JsonRpcClient;

pub mod config;
pub use config::{KILNCONF_FILENAME, KilnConfig, NetworkConfig};

mod error;
pub use error::{DeployError, ErrorKind};

mod fs;

pub mod network;
pub use network::{
    Confirmation, CreationRequest, Credential, Credentials, NetworkClient, NetworkDescriptor,
    NetworkError, PendingHandle,
};

mod orchestrator;
pub use orchestrator::{DEFAULT_DEPLOY_TIMEOUT, DeploymentState, Orchestrator};

mod receipt;
pub use receipt::DeploymentReceipt;

pub mod rpc;

pub mod store;
pub use store::{DeploymentRecord, DeploymentStore};

pub use tokio_util::sync::CancellationToken;
