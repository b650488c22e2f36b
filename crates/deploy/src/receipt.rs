//! The terminal artifact of a successful deployment.

use std::fmt;

use alloy_core::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Record of a confirmed deployment. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReceipt {
    /// The deployed contract name.
    pub contract: String,
    /// The network it was deployed to.
    pub network: String,
    /// The deployed contract address.
    pub address: Address,
    /// The creation transaction hash.
    pub tx_hash: B256,
    /// Block the creation transaction was included in.
    pub block_number: u64,
    /// Gas used by the creation transaction.
    pub gas_used: u64,
}

/// Two lines: the address, then the transaction hash.
impl fmt::Display for DeploymentReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} deployed to: {}", self.contract, self.address)?;
        write!(f, "{} deployment transaction: {}", self.contract, self.tx_hash)
    }
}
