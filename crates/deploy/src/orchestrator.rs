//! Single-shot contract deployment: validate, submit once, await confirmation.

use std::time::Duration;

use alloy_core::dyn_abi::DynSolValue;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    ContractArtifact, DeployError, DeploymentReceipt, NetworkDescriptor,
    network::{CreationRequest, NetworkClient, NetworkError},
};

/// Default bound on submission plus confirmation.
pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(300);

/// Progress of one deployment attempt.
///
/// `Idle -> Validating -> Submitted -> Confirmed`, or `Validating -> Rejected`,
/// or `Submitted -> TimedOut`. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DeploymentState {
    Idle,
    Validating,
    Submitted,
    Confirmed,
    Rejected,
    TimedOut,
}

impl DeploymentState {
    pub fn can_transition_to(self, next: DeploymentState) -> bool {
        use DeploymentState::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Submitted)
                | (Validating, Rejected)
                | (Submitted, Confirmed)
                | (Submitted, TimedOut)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentState::Confirmed | DeploymentState::Rejected | DeploymentState::TimedOut
        )
    }
}

/// Tracks and logs the state of one attempt.
struct Attempt<'a> {
    contract: &'a str,
    network: &'a str,
    state: DeploymentState,
}

impl<'a> Attempt<'a> {
    fn new(contract: &'a str, network: &'a str) -> Self {
        Self {
            contract,
            network,
            state: DeploymentState::Idle,
        }
    }

    fn advance(&mut self, next: DeploymentState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid deployment transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(
            contract = %self.contract,
            network = %self.network,
            from = %self.state,
            to = %next,
            "Deployment state changed"
        );
        self.state = next;
    }
}

/// Drives deployments through a [`NetworkClient`].
///
/// Invocations share nothing mutable, so one orchestrator may serve many concurrent
/// deployments as long as each targets its own network.
#[derive(Debug, Clone)]
pub struct Orchestrator<C> {
    client: C,
    timeout: Duration,
    cancel: CancellationToken,
}

impl<C: NetworkClient> Orchestrator<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            timeout: DEFAULT_DEPLOY_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    /// Bound on the time spent waiting for submission and confirmation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Token that interrupts both suspension points.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Deploy `artifact` on `network` with the given constructor arguments.
    ///
    /// Submits at most one creation transaction. Once submitted, any interruption is
    /// reported as [`DeployError::ConfirmationTimeout`] since the contract may still land.
    pub async fn deploy(
        &self,
        artifact: ContractArtifact,
        network: &NetworkDescriptor,
        args: &[DynSolValue],
    ) -> Result<DeploymentReceipt, DeployError> {
        let mut attempt = Attempt::new(&artifact.name, &network.name);

        attempt.advance(DeploymentState::Validating);
        let request = match creation_request(&artifact, network, args) {
            Ok(request) => request,
            Err(e) => {
                attempt.advance(DeploymentState::Rejected);
                return Err(e);
            }
        };

        if self.cancel.is_cancelled() {
            attempt.advance(DeploymentState::Rejected);
            return Err(DeployError::Cancelled);
        }

        tracing::info!(
            contract = %artifact.name,
            network = %network.name,
            endpoint = %network.endpoint,
            init_code_len = request.init_code.len(),
            "Submitting creation transaction..."
        );

        let deadline = Instant::now() + self.timeout;

        let submitted = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err("cancelled while submitting"),
            res = tokio::time::timeout_at(deadline, self.client.submit(request)) => {
                res.map_err(|_| "deadline elapsed while submitting")
            }
        };

        let handle = match submitted {
            Ok(Ok(handle)) => handle,
            Ok(Err(NetworkError::Rejected(message))) => {
                attempt.advance(DeploymentState::Rejected);
                return Err(DeployError::SubmissionRejected(message));
            }
            Ok(Err(NetworkError::Unavailable(message))) => {
                attempt.advance(DeploymentState::Rejected);
                return Err(DeployError::NetworkUnavailable(message));
            }
            Ok(Err(NetworkError::Timeout)) => {
                return Err(unknown_submission(&mut attempt, "submission timed out"));
            }
            Err(reason) => return Err(unknown_submission(&mut attempt, reason)),
        };

        attempt.advance(DeploymentState::Submitted);
        tracing::info!(
            contract = %artifact.name,
            network = %network.name,
            tx_hash = %handle.tx_hash,
            predicted_address = ?handle.predicted_address,
            "Creation transaction submitted, waiting for confirmation..."
        );

        let confirmed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err("cancelled while awaiting confirmation".to_string()),
            res = tokio::time::timeout_at(deadline, self.client.await_confirmation(&handle, deadline)) => {
                match res {
                    Ok(Ok(confirmation)) => Ok(confirmation),
                    Ok(Err(e)) => Err(format!("confirmation failed: {}", e)),
                    Err(_) => Err("deadline elapsed".to_string()),
                }
            }
        };

        let confirmation = match confirmed {
            Ok(confirmation) => confirmation,
            Err(reason) => {
                attempt.advance(DeploymentState::TimedOut);
                tracing::warn!(
                    contract = %artifact.name,
                    network = %network.name,
                    tx_hash = %handle.tx_hash,
                    reason = %reason,
                    "Deployment not confirmed, the transaction may still be mined"
                );
                return Err(DeployError::ConfirmationTimeout {
                    tx_hash: Some(handle.tx_hash),
                    reason,
                });
            }
        };

        attempt.advance(DeploymentState::Confirmed);

        if confirmation.tx_hash != handle.tx_hash {
            tracing::debug!(
                submitted = %handle.tx_hash,
                confirmed = %confirmation.tx_hash,
                "Confirmation refers to a different transaction hash"
            );
        }

        if !confirmation.success {
            return Err(DeployError::Reverted {
                tx_hash: confirmation.tx_hash,
                block_number: confirmation.block_number,
            });
        }

        let receipt = DeploymentReceipt {
            contract: artifact.name.clone(),
            network: network.name.clone(),
            address: confirmation.contract_address,
            tx_hash: confirmation.tx_hash,
            block_number: confirmation.block_number,
            gas_used: confirmation.gas_used,
        };

        tracing::info!(
            contract = %receipt.contract,
            network = %receipt.network,
            address = %receipt.address,
            tx_hash = %receipt.tx_hash,
            block_number = receipt.block_number,
            "Deployment confirmed"
        );

        Ok(receipt)
    }
}

/// The submission was interrupted: the request may have reached the node.
fn unknown_submission(attempt: &mut Attempt<'_>, reason: &str) -> DeployError {
    attempt.advance(DeploymentState::Submitted);
    attempt.advance(DeploymentState::TimedOut);
    tracing::warn!(
        contract = %attempt.contract,
        network = %attempt.network,
        reason,
        "Submission outcome unknown, check the sender's pending transactions before retrying"
    );
    DeployError::ConfirmationTimeout {
        tx_hash: None,
        reason: reason.to_string(),
    }
}

/// Local preconditions. Performs no IO.
fn creation_request(
    artifact: &ContractArtifact,
    network: &NetworkDescriptor,
    args: &[DynSolValue],
) -> Result<CreationRequest, DeployError> {
    if artifact.bytecode.is_empty() {
        return Err(DeployError::InvalidArtifact(format!(
            "{} has empty bytecode (abstract contract or interface?)",
            artifact.name
        )));
    }

    let init_code = artifact.deploy_code(args)?;
    network.validate()?;

    Ok(CreationRequest {
        init_code,
        gas_price: network.gas_price,
        gas_limit: network.gas_limit,
    })
}
