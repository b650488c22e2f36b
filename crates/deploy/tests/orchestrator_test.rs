//! Orchestrator tests against an in-memory network client.
//!
//! The mock counts calls so tests can assert how many creation transactions
//! an attempt would have sent.
//! Run with: cargo test --test orchestrator_test

use std::{
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, U256},
};
use kiln_deploy::{
    CancellationToken, Confirmation, ContractArtifact, CreationRequest, Credential, Credentials,
    DeployError, DeploymentReceipt, ErrorKind, NetworkClient, NetworkDescriptor, NetworkError,
    Orchestrator, PendingHandle,
};
use tokio::time::Instant;

/// First well-known development account.
const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// How the mock answers `submit`.
#[derive(Clone)]
enum Submit {
    Accept(PendingHandle),
    Reject(String),
    Unavailable(String),
    Hang,
}

/// How the mock answers `await_confirmation`.
#[derive(Clone)]
enum Confirm {
    Mined(Confirmation),
    Never,
}

struct MockClient {
    submit: Submit,
    confirm: Confirm,
    submit_calls: AtomicUsize,
    confirm_calls: AtomicUsize,
    requests: Mutex<Vec<CreationRequest>>,
}

impl MockClient {
    fn new(submit: Submit, confirm: Confirm) -> Self {
        Self {
            submit,
            confirm,
            submit_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn accepting(handle: PendingHandle, confirmation: Confirmation) -> Self {
        Self::new(Submit::Accept(handle), Confirm::Mined(confirmation))
    }

    fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }
}

impl NetworkClient for MockClient {
    async fn submit(&self, request: CreationRequest) -> Result<PendingHandle, NetworkError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        match &self.submit {
            Submit::Accept(handle) => Ok(handle.clone()),
            Submit::Reject(message) => Err(NetworkError::Rejected(message.clone())),
            Submit::Unavailable(message) => Err(NetworkError::Unavailable(message.clone())),
            Submit::Hang => std::future::pending().await,
        }
    }

    async fn await_confirmation(
        &self,
        _handle: &PendingHandle,
        _deadline: Instant,
    ) -> Result<Confirmation, NetworkError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);

        match &self.confirm {
            Confirm::Mined(confirmation) => Ok(confirmation.clone()),
            Confirm::Never => std::future::pending().await,
        }
    }
}

fn handle(byte: u8) -> PendingHandle {
    PendingHandle::new(B256::repeat_byte(byte))
}

fn confirmation(address: Address, tx_hash: B256) -> Confirmation {
    Confirmation {
        contract_address: address,
        tx_hash,
        block_number: 12,
        gas_used: 150_000,
        success: true,
    }
}

fn network(name: &str) -> NetworkDescriptor {
    let mut network = NetworkDescriptor::new(name, "https://example".parse().unwrap());
    network.gas_price = Some(1_000_000_000);
    network.credentials = Credentials::new(vec![Credential::new(DEV_KEY)]);
    network
}

fn artifact(bytecode: &[u8]) -> ContractArtifact {
    ContractArtifact {
        name: "FactoryMulisigWallet".to_string(),
        bytecode: Bytes::copy_from_slice(bytecode),
        abi: Default::default(),
        compiler_version: None,
    }
}

/// Artifact whose constructor takes `(address owner)`.
fn owned_artifact() -> ContractArtifact {
    let json = r#"{
        "contractName": "Owned",
        "abi": [{
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [{ "name": "owner", "type": "address", "internalType": "address" }]
        }],
        "bytecode": "0x6001"
    }"#;
    ContractArtifact::from_json("Owned", json).unwrap()
}

const SCENARIO_BYTECODE: [u8; 6] = [0x60, 0x01, 0x60, 0x02, 0x01, 0x55];

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

#[tokio::test]
async fn test_empty_bytecode_makes_no_network_call() {
    let orchestrator = Orchestrator::new(MockClient::accepting(
        handle(1),
        confirmation(Address::repeat_byte(1), B256::repeat_byte(1)),
    ));

    let err = orchestrator
        .deploy(artifact(&[]), &network("base_goerli"), &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArtifact);
    assert_eq!(orchestrator.client().submit_calls(), 0);
    assert_eq!(orchestrator.client().confirm_calls(), 0);
}

#[tokio::test]
async fn test_constructor_arity_mismatch() {
    let orchestrator = Orchestrator::new(MockClient::accepting(
        handle(1),
        confirmation(Address::repeat_byte(1), B256::repeat_byte(1)),
    ));
    let network = network("base_goerli");

    let owner = DynSolValue::Address(Address::repeat_byte(0x11));
    for args in [vec![], vec![owner.clone(), owner.clone()]] {
        let err = orchestrator
            .deploy(owned_artifact(), &network, &args)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArtifact);
    }

    // Right arity but wrong type.
    let err = orchestrator
        .deploy(owned_artifact(), &network, &[DynSolValue::Bool(true)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArtifact);

    assert_eq!(orchestrator.client().submit_calls(), 0);

    // And the happy path goes through.
    orchestrator
        .deploy(owned_artifact(), &network, &[owner])
        .await
        .unwrap();
    let requests = orchestrator.client().requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].init_code.len(), 2 + 32);
}

#[tokio::test]
async fn test_receipt_matches_confirmation_exactly() {
    let address: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap();
    let tx_hash = B256::repeat_byte(0x42);
    let orchestrator =
        Orchestrator::new(MockClient::accepting(handle(0x42), confirmation(address, tx_hash)));

    let receipt = orchestrator
        .deploy(artifact(&SCENARIO_BYTECODE), &network("base_goerli"), &[])
        .await
        .unwrap();

    assert_eq!(receipt.address, address);
    assert_eq!(receipt.tx_hash, tx_hash);
    assert_eq!(receipt.block_number, 12);
    assert_eq!(receipt.gas_used, 150_000);
    assert_eq!(orchestrator.client().submit_calls(), 1);
    assert_eq!(orchestrator.client().confirm_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_never_confirmed_times_out_after_one_submission() {
    init_tracing();

    let orchestrator = Orchestrator::new(MockClient::new(Submit::Accept(handle(0x77)), Confirm::Never))
        .with_timeout(Duration::from_secs(30));

    let err = orchestrator
        .deploy(artifact(&SCENARIO_BYTECODE), &network("base_goerli"), &[])
        .await
        .unwrap_err();

    match &err {
        DeployError::ConfirmationTimeout { tx_hash, .. } => {
            assert_eq!(*tx_hash, Some(B256::repeat_byte(0x77)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_retryable());
    assert_eq!(orchestrator.client().submit_calls(), 1);
    assert_eq!(orchestrator.client().confirm_calls(), 1);
}

#[tokio::test]
async fn test_rejected_submission_never_awaits_confirmation() {
    let orchestrator = Orchestrator::new(MockClient::new(
        Submit::Reject("insufficient funds for gas * price + value".to_string()),
        Confirm::Never,
    ));

    let err = orchestrator
        .deploy(artifact(&SCENARIO_BYTECODE), &network("base_goerli"), &[])
        .await
        .unwrap_err();

    assert!(matches!(&err, DeployError::SubmissionRejected(msg) if msg.contains("insufficient funds")));
    assert_eq!(orchestrator.client().submit_calls(), 1);
    assert_eq!(orchestrator.client().confirm_calls(), 0);
}

#[tokio::test]
async fn test_unavailable_endpoint() {
    let orchestrator = Orchestrator::new(MockClient::new(
        Submit::Unavailable("connection refused".to_string()),
        Confirm::Never,
    ));

    let err = orchestrator
        .deploy(artifact(&SCENARIO_BYTECODE), &network("base_goerli"), &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkUnavailable);
    assert!(err.is_retryable());
    assert_eq!(orchestrator.client().confirm_calls(), 0);
}

#[tokio::test]
async fn test_base_goerli_scenario() {
    init_tracing();

    let address: Address = "0xABC0000000000000000000000000000000000ABC".parse().unwrap();
    let tx_hash: B256 = "0xDEAD00000000000000000000000000000000000000000000000000000000DEAD"
        .parse()
        .unwrap();

    let orchestrator =
        Orchestrator::new(MockClient::accepting(handle(0x01), confirmation(address, tx_hash)));

    let receipt = orchestrator
        .deploy(artifact(&SCENARIO_BYTECODE), &network("base_goerli"), &[])
        .await
        .unwrap();

    assert_eq!(
        receipt,
        DeploymentReceipt {
            contract: "FactoryMulisigWallet".to_string(),
            network: "base_goerli".to_string(),
            address,
            tx_hash,
            block_number: 12,
            gas_used: 150_000,
        }
    );

    let requests = orchestrator.client().requests.lock().unwrap();
    assert_eq!(requests[0].init_code.as_ref(), &SCENARIO_BYTECODE);
    assert_eq!(requests[0].gas_price, Some(1_000_000_000));
}

#[tokio::test]
async fn test_empty_credential_is_rejected_before_submission() {
    let orchestrator = Orchestrator::new(MockClient::accepting(
        handle(1),
        confirmation(Address::repeat_byte(1), B256::repeat_byte(1)),
    ));

    // Mirrors `accounts: [""]`.
    let mut placeholder = network("base_goerli");
    placeholder.credentials = Credentials::new(vec![Credential::new("")]);

    let err = orchestrator
        .deploy(artifact(&SCENARIO_BYTECODE), &placeholder, &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidNetwork);
    assert_eq!(orchestrator.client().submit_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_submission_reports_unknown_outcome() {
    init_tracing();

    let cancel = CancellationToken::new();
    let orchestrator = Orchestrator::new(MockClient::new(Submit::Accept(handle(0x55)), Confirm::Never))
        .with_cancellation(cancel.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    let err = orchestrator
        .deploy(artifact(&SCENARIO_BYTECODE), &network("base_goerli"), &[])
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert_eq!(err.kind(), ErrorKind::ConfirmationTimeout);
    assert_eq!(err.tx_hash(), Some(B256::repeat_byte(0x55)));
    assert_eq!(orchestrator.client().submit_calls(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_sends_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let orchestrator = Orchestrator::new(MockClient::accepting(
        handle(1),
        confirmation(Address::repeat_byte(1), B256::repeat_byte(1)),
    ))
    .with_cancellation(cancel);

    let err = orchestrator
        .deploy(artifact(&SCENARIO_BYTECODE), &network("base_goerli"), &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(orchestrator.client().submit_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_submission_hits_deadline() {
    init_tracing();

    let orchestrator = Orchestrator::new(MockClient::new(Submit::Hang, Confirm::Never))
        .with_timeout(Duration::from_secs(10));

    let err = orchestrator
        .deploy(artifact(&SCENARIO_BYTECODE), &network("base_goerli"), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::ConfirmationTimeout { tx_hash: None, .. }));
    assert_eq!(orchestrator.client().submit_calls(), 1);
    assert_eq!(orchestrator.client().confirm_calls(), 0);
}

#[tokio::test]
async fn test_reverted_creation() {
    let mut reverted = confirmation(Address::repeat_byte(9), B256::repeat_byte(9));
    reverted.success = false;

    let orchestrator = Orchestrator::new(MockClient::accepting(handle(9), reverted));

    let err = orchestrator
        .deploy(artifact(&SCENARIO_BYTECODE), &network("base_goerli"), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Reverted { block_number: 12, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_concurrent_deployments_are_independent() {
    let first = Orchestrator::new(MockClient::accepting(
        handle(0xa1),
        confirmation(Address::repeat_byte(0xa1), B256::repeat_byte(0xa1)),
    ));
    let second = Orchestrator::new(MockClient::new(
        Submit::Reject("nonce too low".to_string()),
        Confirm::Never,
    ));

    let network_a = network("base_goerli");
    let network_b = network("sepolia");

    let (ok, failed) = tokio::join!(
        first.deploy(artifact(&SCENARIO_BYTECODE), &network_a, &[]),
        second.deploy(artifact(&SCENARIO_BYTECODE), &network_b, &[]),
    );

    let receipt = ok.unwrap();
    assert_eq!(receipt.network, "base_goerli");
    assert_eq!(receipt.address, Address::repeat_byte(0xa1));
    assert_eq!(failed.unwrap_err().kind(), ErrorKind::SubmissionRejected);

    assert_eq!(first.client().submit_calls(), 1);
    assert_eq!(second.client().submit_calls(), 1);
    assert_eq!(second.client().confirm_calls(), 0);
}

#[tokio::test]
async fn test_constructor_args_are_appended() {
    let orchestrator = Orchestrator::new(MockClient::accepting(
        handle(1),
        confirmation(Address::repeat_byte(1), B256::repeat_byte(1)),
    ));

    let artifact = owned_artifact();
    let args = artifact
        .parse_args(&["0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string()])
        .unwrap();
    orchestrator
        .deploy(artifact, &network("base_goerli"), &args)
        .await
        .unwrap();

    let requests = orchestrator.client().requests.lock().unwrap();
    let init_code = &requests[0].init_code;
    assert_eq!(&init_code[..2], &[0x60, 0x01]);
    let owner = U256::from_be_slice(&init_code[2..]);
    assert_eq!(
        owner,
        U256::from_be_slice(
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
                .parse::<Address>()
                .unwrap()
                .as_slice()
        )
    );
}
