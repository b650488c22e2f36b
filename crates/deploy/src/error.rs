//! Error taxonomy for a single deployment attempt.

use alloy_core::primitives::B256;
use thiserror::Error;

/// Errors returned by [`crate::Orchestrator::deploy`].
///
/// Every variant reaches the caller. Only the variants for which
/// [`DeployError::is_retryable`] returns `true` are safe to retry with a fresh
/// invocation; the others may leave a contract on chain.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The artifact or the constructor arguments are unusable. Nothing was sent.
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    /// The network descriptor cannot be used to sign or reach the network. Nothing was sent.
    #[error("invalid network `{network}`: {reason}")]
    InvalidNetwork { network: String, reason: String },

    /// The network refused the creation transaction.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// The transaction may have been accepted but no confirmation was observed.
    ///
    /// The outcome is unknown: the contract may still appear on chain.
    #[error("confirmation not observed: {reason}")]
    ConfirmationTimeout {
        tx_hash: Option<B256>,
        reason: String,
    },

    /// The endpoint could not be reached while submitting.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The creation transaction was included but its execution failed.
    #[error("transaction {tx_hash} reverted in block {block_number}")]
    Reverted { tx_hash: B256, block_number: u64 },

    /// The attempt was cancelled before anything was sent.
    #[error("deployment cancelled before submission")]
    Cancelled,
}

/// Discriminant of a [`DeployError`], used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum ErrorKind {
    InvalidArtifact,
    InvalidNetwork,
    SubmissionRejected,
    ConfirmationTimeout,
    NetworkUnavailable,
    Reverted,
    Cancelled,
}

impl ErrorKind {
    /// Process exit code for this kind. Never zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::InvalidArtifact => 2,
            ErrorKind::InvalidNetwork => 3,
            ErrorKind::SubmissionRejected => 4,
            ErrorKind::ConfirmationTimeout => 5,
            ErrorKind::NetworkUnavailable => 6,
            ErrorKind::Reverted => 7,
            ErrorKind::Cancelled => 130,
        }
    }
}

impl DeployError {
    pub fn invalid_network(network: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNetwork {
            network: network.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::InvalidArtifact(_) => ErrorKind::InvalidArtifact,
            DeployError::InvalidNetwork { .. } => ErrorKind::InvalidNetwork,
            DeployError::SubmissionRejected(_) => ErrorKind::SubmissionRejected,
            DeployError::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            DeployError::NetworkUnavailable(_) => ErrorKind::NetworkUnavailable,
            DeployError::Reverted { .. } => ErrorKind::Reverted,
            DeployError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the caller may start a fresh attempt without risking a duplicate contract.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeployError::InvalidArtifact(_)
                | DeployError::InvalidNetwork { .. }
                | DeployError::NetworkUnavailable(_)
                | DeployError::Cancelled
        )
    }

    /// Hash of the transaction this error refers to, if one was signed.
    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            DeployError::ConfirmationTimeout { tx_hash, .. } => *tx_hash,
            DeployError::Reverted { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}
