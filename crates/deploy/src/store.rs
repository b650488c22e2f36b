//! On-disk deployment records, one JSON file per contract and network.
//!
//! Layout: `<root>/<network>/<Contract>.json`.

use std::path::{Path, PathBuf};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes},
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ContractArtifact, DeploymentReceipt,
    config::{OptimizerConfig, SolidityConfig},
    fs::FsHandler,
};

/// Name of the per-network lock file.
const LOCK_FILENAME: &str = ".lock";

/// Compiler settings a deployment was made with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerInfo {
    /// Version reported by the artifact, else the configured one.
    pub version: String,
    pub optimizer: OptimizerConfig,
}

/// Everything needed to interact with, or verify, a deployed contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract: String,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    pub address: Address,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub args: Vec<String>,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
    pub compiler: CompilerInfo,
    pub deployed_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn new(
        receipt: &DeploymentReceipt,
        artifact: &ContractArtifact,
        args: &[String],
        solidity: &SolidityConfig,
        chain_id: Option<u64>,
    ) -> Self {
        Self {
            contract: receipt.contract.clone(),
            network: receipt.network.clone(),
            chain_id,
            address: receipt.address,
            transaction_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            args: args.to_vec(),
            abi: artifact.abi.clone(),
            bytecode: artifact.bytecode.clone(),
            compiler: CompilerInfo {
                version: artifact
                    .compiler_version
                    .clone()
                    .unwrap_or_else(|| solidity.version.clone()),
                optimizer: solidity.optimizer.clone(),
            },
            deployed_at: Utc::now(),
        }
    }

    /// The receipt this record was made from.
    pub fn receipt(&self) -> DeploymentReceipt {
        DeploymentReceipt {
            contract: self.contract.clone(),
            network: self.network.clone(),
            address: self.address,
            tx_hash: self.transaction_hash,
            block_number: self.block_number,
            gas_used: self.gas_used,
        }
    }
}

/// Reads and writes [`DeploymentRecord`]s under a root directory.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    root: PathBuf,
}

impl DeploymentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, network: &str, contract: &str) -> PathBuf {
        self.root.join(network).join(format!("{}.json", contract))
    }

    /// Write a record, replacing any previous one for the same contract and network.
    pub fn save(&self, record: &DeploymentRecord) -> Result<PathBuf> {
        let network_dir = self.root.join(&record.network);
        FsHandler::create_directory(&network_dir)?;

        let _lock = FsHandler::lock_exclusive(&network_dir.join(LOCK_FILENAME))?;

        let path = self.record_path(&record.network, &record.contract);
        let content = serde_json::to_vec_pretty(record)
            .context("Failed to serialize deployment record")?;
        FsHandler::write_atomic(&path, &content)?;

        tracing::info!(
            path = %path.display(),
            contract = %record.contract,
            network = %record.network,
            "Deployment record saved"
        );
        Ok(path)
    }

    /// Load the record for `contract` on `network`, if one exists.
    pub fn load(&self, network: &str, contract: &str) -> Result<Option<DeploymentRecord>> {
        let path = self.record_path(network, contract);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployment record {}", path.display()))?;
        Ok(Some(record))
    }
}
