//! [`NetworkClient`] over plain Ethereum JSON-RPC with local signing.

use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U64, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::{
    NetworkDescriptor,
    network::{Confirmation, CreationRequest, NetworkClient, NetworkError, PendingHandle},
    rpc::{self, RpcError},
};

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Transaction receipt fields needed to confirm a deployment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_number: Option<U64>,
    contract_address: Option<Address>,
    gas_used: U64,
    status: Option<U64>,
}

/// A fully built and signed creation transaction.
#[derive(Debug, Clone)]
pub struct SignedCreation {
    pub raw: Bytes,
    pub tx_hash: B256,
    pub sender: Address,
    pub nonce: u64,
}

impl SignedCreation {
    pub fn predicted_address(&self) -> Address {
        self.sender.create(self.nonce)
    }
}

/// Network client that talks JSON-RPC over HTTP and signs with the descriptor's first credential.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    network: NetworkDescriptor,
    http: reqwest::Client,
    poll_interval: Duration,
}

impl JsonRpcClient {
    pub fn new(network: NetworkDescriptor) -> Result<Self, reqwest::Error> {
        Ok(Self {
            network,
            http: rpc::create_client(rpc::DEFAULT_TIMEOUT)?,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn network(&self) -> &NetworkDescriptor {
        &self.network
    }

    /// Idempotent read; retried with backoff on transport failures.
    async fn read<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let http = &self.http;
        let url = self.network.endpoint.as_str();

        (move || rpc::json_rpc_call::<T>(http, url, method, params.clone()))
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(250))
                    .with_max_times(3),
            )
            .when(RpcError::is_transport)
            .notify(|e, after| {
                tracing::debug!(error = %e, method, retry_in = ?after, "RPC read failed, retrying");
            })
            .await
    }

    async fn read_quantity(&self, method: &str, params: Vec<Value>) -> Result<u64, RpcError> {
        let value: String = self.read(method, params).await?;
        rpc::parse_quantity(method, &value)
    }

    async fn chain_id(&self) -> Result<u64, NetworkError> {
        let remote = self
            .read_quantity("eth_chainId", vec![])
            .await
            .map_err(into_network_error)?;

        if let Some(expected) = self.network.chain_id
            && expected != remote
        {
            return Err(NetworkError::Rejected(format!(
                "endpoint reports chain id {} but network `{}` expects {}",
                remote, self.network.name, expected
            )));
        }

        Ok(remote)
    }

    /// Build and sign the creation transaction. Performs read calls only.
    pub async fn prepare(
        &self,
        signer: &PrivateKeySigner,
        request: &CreationRequest,
    ) -> Result<SignedCreation, NetworkError> {
        let sender = signer.address();
        let chain_id = self.chain_id().await?;

        let nonce = self
            .read_quantity(
                "eth_getTransactionCount",
                vec![json!(sender), json!("pending")],
            )
            .await
            .map_err(into_network_error)?;

        let gas_price = match request.gas_price {
            Some(price) => price,
            None => u128::from(
                self.read_quantity("eth_gasPrice", vec![])
                    .await
                    .map_err(into_network_error)?,
            ),
        };

        let gas_limit = match request.gas_limit {
            Some(limit) => limit,
            None => self
                .read_quantity(
                    "eth_estimateGas",
                    vec![json!({
                        "from": sender,
                        "data": request.init_code,
                        "gasPrice": format!("0x{:x}", gas_price),
                    })],
                )
                .await
                .map_err(into_network_error)?,
        };

        tracing::debug!(
            network = %self.network.name,
            %sender,
            chain_id,
            nonce,
            gas_price,
            gas_limit,
            "Prepared creation transaction"
        );

        sign_creation(signer, chain_id, nonce, gas_price, gas_limit, request.init_code.clone())
    }
}

/// Sign a legacy (EIP-155) contract creation transaction.
pub fn sign_creation(
    signer: &PrivateKeySigner,
    chain_id: u64,
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    init_code: Bytes,
) -> Result<SignedCreation, NetworkError> {
    let tx = TxLegacy {
        chain_id: Some(chain_id),
        nonce,
        gas_price,
        gas_limit,
        to: TxKind::Create,
        value: U256::ZERO,
        input: init_code,
    };

    let signature = signer
        .sign_hash_sync(&tx.signature_hash())
        .map_err(|e| NetworkError::Rejected(format!("failed to sign transaction: {}", e)))?;
    let signed_tx = tx.into_signed(signature);
    let raw: Bytes = signed_tx.encoded_2718().into();

    Ok(SignedCreation {
        raw,
        tx_hash: *signed_tx.hash(),
        sender: signer.address(),
        nonce,
    })
}

fn into_network_error(err: RpcError) -> NetworkError {
    match err {
        RpcError::Transport { .. } => NetworkError::Unavailable(err.to_string()),
        RpcError::Response { .. } | RpcError::Decode { .. } => {
            NetworkError::Rejected(err.to_string())
        }
    }
}

impl NetworkClient for JsonRpcClient {
    async fn submit(&self, request: CreationRequest) -> Result<PendingHandle, NetworkError> {
        let signer = self
            .network
            .credentials
            .deployer()
            .map_err(NetworkError::Rejected)?;

        let signed = self.prepare(&signer, &request).await?;

        // Never retried.
        let sent: Result<B256, RpcError> = rpc::json_rpc_call(
            &self.http,
            self.network.endpoint.as_str(),
            "eth_sendRawTransaction",
            vec![json!(signed.raw)],
        )
        .await;

        match sent {
            Ok(returned) if returned != signed.tx_hash => {
                tracing::warn!(
                    local = %signed.tx_hash,
                    remote = %returned,
                    "Node returned a different transaction hash than the one signed"
                );
            }
            Ok(_) => {}
            Err(e @ RpcError::Response { .. }) => return Err(into_network_error(e)),
            // Nothing reached the node.
            Err(e) if e.is_connect() => return Err(into_network_error(e)),
            // The node may hold the transaction; let confirmation polling decide.
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    tx_hash = %signed.tx_hash,
                    "No usable answer to eth_sendRawTransaction, treating as pending"
                );
            }
        }

        Ok(PendingHandle {
            tx_hash: signed.tx_hash,
            predicted_address: Some(signed.predicted_address()),
        })
    }

    async fn await_confirmation(
        &self,
        handle: &PendingHandle,
        deadline: Instant,
    ) -> Result<Confirmation, NetworkError> {
        let http = &self.http;
        let url = self.network.endpoint.as_str();
        let confirmations = self.network.confirmations.max(1);

        let check = move || async move {
            let receipt: Option<RpcReceipt> = rpc::json_rpc_call(
                http,
                url,
                "eth_getTransactionReceipt",
                vec![json!(handle.tx_hash)],
            )
            .await?;

            let Some(receipt) = receipt else {
                return Ok(None);
            };
            // Pending receipts (some nodes) carry no block number yet.
            let Some(block_number) = receipt.block_number.map(|n| n.to::<u64>()) else {
                return Ok(None);
            };

            if confirmations > 1 {
                let head: String =
                    rpc::json_rpc_call(http, url, "eth_blockNumber", vec![]).await?;
                let head = rpc::parse_quantity("eth_blockNumber", &head)?;
                if head.saturating_sub(block_number) + 1 < confirmations {
                    return Ok(None);
                }
            }

            let success = receipt.status.is_none_or(|status| status.to::<u64>() == 1);
            let contract_address = match (receipt.contract_address, handle.predicted_address) {
                (Some(address), _) => address,
                (None, Some(predicted)) if !success => predicted,
                _ => {
                    return Err(RpcError::Decode {
                        method: "eth_getTransactionReceipt".to_string(),
                        reason: "receipt has no contract address".to_string(),
                    });
                }
            };

            Ok(Some(Confirmation {
                contract_address,
                tx_hash: receipt.transaction_hash,
                block_number,
                gas_used: receipt.gas_used.to::<u64>(),
                success,
            }))
        };

        rpc::poll_until("transaction receipt", deadline, self.poll_interval, check)
            .await
            .ok_or(NetworkError::Timeout)
    }
}
