use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{Address, DatasetId, DatasetInfo, TxHash};

pub mod memory;
pub mod ops;

use ops::RegistryCall;

/// Read-only queries against the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadQuery {
    GetDatasetInfo(DatasetId),
    GetContributorReputation(Address),
}

impl ReadQuery {
    pub fn op_name(&self) -> &'static str {
        match self {
            ReadQuery::GetDatasetInfo(_) => "getDatasetInfo",
            ReadQuery::GetContributorReputation(_) => "getContributorReputation",
        }
    }

    /// Cache key component derived from the arguments.
    pub fn args_key(&self) -> String {
        match self {
            ReadQuery::GetDatasetInfo(id) => id.0.to_string(),
            ReadQuery::GetContributorReputation(addr) => addr.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReadValue {
    Dataset(DatasetInfo),
    Reputation(u64),
}

/// Transport seam to the contract-backed registry. Implementations own
/// signing and sequencing; callers own retry policy.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Submit a write and wait for acknowledgement. Success returns the
    /// transaction handle; rejection surfaces as `Transport`.
    async fn submit(&self, call: RegistryCall) -> Result<TxHash, PipelineError>;

    /// Side-effect-free read. Unknown identifiers are `NotFound`, never a
    /// zero-valued record.
    async fn read(&self, query: ReadQuery) -> Result<ReadValue, PipelineError>;
}
