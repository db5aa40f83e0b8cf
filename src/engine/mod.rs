use async_trait::async_trait;

use crate::types::{Ciphertext, Proof};

pub mod mock;

/// Pluggable encryption backend. The stage controller owns sequencing and
/// progress accounting; the engine owns the cryptography.
#[async_trait]
pub trait EncryptionEngine: Send + Sync {
    /// Encrypt one numeric field into an opaque ciphertext handle.
    async fn encrypt(&self, value: u64) -> Result<Ciphertext, EngineError>;

    /// Produce a proof binding the given ciphertexts to a correct
    /// computation claim. Proofs are single-use by construction.
    async fn prove_correctness(&self, ciphertexts: &[Ciphertext]) -> Result<Proof, EngineError>;
}

/// Engine-side failure, converted by the stage controller into
/// `PipelineError::Encryption` with the failing stage attached.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(pub String);
