use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tracing::debug;

use crate::error::PipelineError;
use crate::registry::{ReadQuery, ReadValue, RegistryTransport};
use crate::types::{Address, DatasetId, DatasetInfo};

type CacheKey = (&'static str, String);

/// Registry Read Layer: cached, key-addressed, side-effect-free queries.
///
/// Entries are keyed by `(operationName, argumentsKey)` and returned until
/// explicitly invalidated or refreshed. `NotFound` is cached like a value so
/// callers can distinguish "no such dataset" from "zero reputation" without
/// re-hitting the transport. The cache is best-effort, not authoritative.
pub struct DatasetReader {
    transport: Arc<dyn RegistryTransport>,
    cache: DashMap<CacheKey, Result<ReadValue, PipelineError>>,
    loading: DashSet<CacheKey>,
}

impl DatasetReader {
    pub fn new(transport: Arc<dyn RegistryTransport>) -> Self {
        Self {
            transport,
            cache: DashMap::new(),
            loading: DashSet::new(),
        }
    }

    fn key(query: &ReadQuery) -> CacheKey {
        (query.op_name(), query.args_key())
    }

    pub fn is_loading(&self, query: &ReadQuery) -> bool {
        self.loading.contains(&Self::key(query))
    }

    pub fn invalidate(&self, query: &ReadQuery) {
        self.cache.remove(&Self::key(query));
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// Cached read; only misses touch the transport.
    pub async fn query(&self, query: ReadQuery) -> Result<ReadValue, PipelineError> {
        let key = Self::key(&query);
        if let Some(entry) = self.cache.get(&key) {
            debug!(op = key.0, args = %key.1, "read served from cache");
            return entry.clone();
        }

        self.loading.insert(key.clone());
        let result = self.transport.read(query).await;
        self.loading.remove(&key);

        self.cache.insert(key, result.clone());
        result
    }

    /// Drop any cached entry and re-query the transport.
    pub async fn refresh(&self, query: ReadQuery) -> Result<ReadValue, PipelineError> {
        self.invalidate(&query);
        self.query(query).await
    }

    pub async fn get_dataset_info(&self, id: DatasetId) -> Result<DatasetInfo, PipelineError> {
        match self.query(ReadQuery::GetDatasetInfo(id)).await? {
            ReadValue::Dataset(info) => Ok(info),
            other => Err(PipelineError::Transport(format!(
                "unexpected read value for getDatasetInfo: {other:?}"
            ))),
        }
    }

    pub async fn get_contributor_reputation(&self, addr: Address) -> Result<u64, PipelineError> {
        match self.query(ReadQuery::GetContributorReputation(addr)).await? {
            ReadValue::Reputation(points) => Ok(points),
            other => Err(PipelineError::Transport(format!(
                "unexpected read value for getContributorReputation: {other:?}"
            ))),
        }
    }
}
