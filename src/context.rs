use std::sync::Arc;

use crate::engine::mock::MockFheEngine;
use crate::engine::EncryptionEngine;
use crate::registry::memory::InMemoryRegistry;
use crate::registry::RegistryTransport;
use crate::types::Address;

/// Explicit per-session wiring: caller identity plus the two collaborator
/// seams. Created at session start, passed into the workflow controller,
/// torn down with it. Nothing here is ambient or process-global.
#[derive(Clone)]
pub struct SessionContext {
    pub address: Address,
    pub engine: Arc<dyn EncryptionEngine>,
    pub transport: Arc<dyn RegistryTransport>,
}

impl SessionContext {
    pub fn new(
        address: Address,
        engine: Arc<dyn EncryptionEngine>,
        transport: Arc<dyn RegistryTransport>,
    ) -> Self {
        Self {
            address,
            engine,
            transport,
        }
    }

    /// Self-contained session over the mock engine and in-memory registry.
    pub fn in_memory(address: Address) -> Self {
        Self::new(
            address,
            Arc::new(MockFheEngine::new()),
            Arc::new(InMemoryRegistry::new(address)),
        )
    }
}
