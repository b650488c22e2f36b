//! Target network descriptors and the client seam used to reach them.

use std::{fmt, future::Future, str::FromStr};

use alloy_core::primitives::{Address, B256, Bytes};
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use derive_more::Deref;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

use crate::{DeployError, config::NetworkConfig};

/// A signing credential: a hex private key or a BIP-39 mnemonic phrase.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Build the signer for this credential. Mnemonics use account index 0.
    pub fn signer(&self) -> Result<PrivateKeySigner, String> {
        let secret = self.0.trim();
        if secret.is_empty() {
            return Err("credential is empty".to_string());
        }

        if secret.contains(char::is_whitespace) {
            return MnemonicBuilder::<English>::default()
                .phrase(secret)
                .index(0u32)
                .and_then(|builder| builder.build())
                .map_err(|e| format!("invalid mnemonic: {}", e));
        }

        PrivateKeySigner::from_str(secret).map_err(|e| format!("invalid private key: {}", e))
    }
}

// Never print secrets.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Ordered signing credentials. The first one signs deployments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct Credentials(Vec<Credential>);

impl Credentials {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self(credentials)
    }

    /// The deploying signer; fails when no usable credential is configured.
    pub fn deployer(&self) -> Result<PrivateKeySigner, String> {
        self.first()
            .ok_or_else(|| "no signing credential configured".to_string())?
            .signer()
    }
}

/// Everything needed to reach and transact on one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    /// The network name from the configuration.
    pub name: String,
    /// JSON-RPC endpoint.
    pub endpoint: Url,
    /// Fixed gas price in wei. Queried from the node when absent.
    pub gas_price: Option<u128>,
    /// Fixed gas limit. Estimated when absent.
    pub gas_limit: Option<u64>,
    /// Expected chain id. Checked against the node when present.
    pub chain_id: Option<u64>,
    /// Number of blocks (including the inclusion block) to wait for.
    pub confirmations: u64,
    /// Signing credentials.
    pub credentials: Credentials,
    /// Whether successful deployments are recorded on disk.
    pub save_deployments: bool,
}

impl NetworkDescriptor {
    /// Minimal descriptor for `endpoint`, without credentials.
    pub fn new(name: impl Into<String>, endpoint: Url) -> Self {
        Self {
            name: name.into(),
            endpoint,
            gas_price: None,
            gas_limit: None,
            chain_id: None,
            confirmations: 1,
            credentials: Credentials::default(),
            save_deployments: false,
        }
    }

    /// Resolve a configuration entry. Fails on a malformed endpoint.
    pub fn from_config(name: &str, config: &NetworkConfig) -> Result<Self, DeployError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| DeployError::invalid_network(name, "no endpoint url configured"))?;

        let endpoint = Url::parse(url).map_err(|e| {
            DeployError::invalid_network(name, format!("malformed endpoint url `{}`: {}", url, e))
        })?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(DeployError::invalid_network(
                name,
                format!("unsupported endpoint scheme `{}`", endpoint.scheme()),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            endpoint,
            gas_price: config.gas_price.map(u128::from),
            gas_limit: config.gas_limit,
            chain_id: config.chain_id,
            confirmations: config.confirmations.max(1),
            credentials: Credentials::new(config.accounts.iter().map(Credential::new).collect()),
            save_deployments: config.save_deployments,
        })
    }

    /// Check that the descriptor can sign. Every configured credential must be usable.
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.credentials.is_empty() {
            return Err(DeployError::invalid_network(
                &self.name,
                "no signing credential configured",
            ));
        }

        for (index, credential) in self.credentials.iter().enumerate() {
            credential.signer().map_err(|reason| {
                DeployError::invalid_network(
                    &self.name,
                    format!("credential #{}: {}", index, reason),
                )
            })?;
        }

        Ok(())
    }
}

/// A creation transaction as requested by the orchestrator. Signing is the client's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationRequest {
    /// Bytecode followed by encoded constructor arguments.
    pub init_code: Bytes,
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
}

/// Handle to a transaction the network has acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHandle {
    pub tx_hash: B256,
    /// Address the contract will live at, when the client can derive it.
    pub predicted_address: Option<Address>,
}

impl PendingHandle {
    pub fn new(tx_hash: B256) -> Self {
        Self {
            tx_hash,
            predicted_address: None,
        }
    }
}

/// The network's view of a mined creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub contract_address: Address,
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    /// `false` when the transaction was included but reverted.
    pub success: bool,
}

/// Failures reported by a [`NetworkClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The endpoint could not be reached.
    #[error("{0}")]
    Unavailable(String),
    /// The node answered and refused the request.
    #[error("{0}")]
    Rejected(String),
    /// The deadline elapsed before the awaited event happened.
    #[error("deadline elapsed")]
    Timeout,
}

/// Submits creation transactions and waits for them to be mined.
///
/// Implementations own signing, nonce management and gas estimation.
pub trait NetworkClient: Send + Sync {
    /// Sign and send a creation transaction. Must send at most once.
    fn submit(
        &self,
        request: CreationRequest,
    ) -> impl Future<Output = Result<PendingHandle, NetworkError>> + Send;

    /// Wait until the transaction behind `handle` is confirmed or `deadline` passes.
    fn await_confirmation(
        &self,
        handle: &PendingHandle,
        deadline: Instant,
    ) -> impl Future<Output = Result<Confirmation, NetworkError>> + Send;
}
