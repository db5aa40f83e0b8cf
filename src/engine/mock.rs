use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;

use crate::engine::{EncryptionEngine, EngineError};
use crate::types::{Ciphertext, Proof};

const NONCE_LEN: usize = 16;

/// Stand-in for a real FHE backend.
///
/// Ciphertexts are keyed blake3 digests over a fresh nonce and the plaintext,
/// so the same value never encrypts to the same bytes twice. Proofs are a
/// nonce plus an unkeyed digest over the nonce and the ciphertexts, which
/// lets the registry check that a proof actually binds the ciphertexts it
/// was handed (see `InMemoryRegistry::verify_proof`) without holding the
/// session key.
pub struct MockFheEngine {
    session_key: [u8; 32],
    /// Optional per-call latency, for demos that want visible progress.
    pub latency: Duration,
    fail_encrypt: AtomicBool,
    fail_prove: AtomicBool,
}

impl MockFheEngine {
    pub fn new() -> Self {
        let mut session_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut session_key);
        Self {
            session_key,
            latency: Duration::ZERO,
            fail_encrypt: AtomicBool::new(false),
            fail_prove: AtomicBool::new(false),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next `encrypt` call fail once.
    pub fn fail_next_encrypt(&self) {
        self.fail_encrypt.store(true, Ordering::SeqCst);
    }

    /// Make the next `prove_correctness` call fail once.
    pub fn fail_next_prove(&self) {
        self.fail_prove.store(true, Ordering::SeqCst);
    }

    /// Recompute the digest a well-formed proof must carry for `ciphertexts`.
    pub fn proof_digest(nonce: &[u8], ciphertexts: &[Ciphertext]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(nonce);
        for ct in ciphertexts {
            hasher.update(&ct.0);
        }
        *hasher.finalize().as_bytes()
    }
}

impl Default for MockFheEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EncryptionEngine for MockFheEngine {
    async fn encrypt(&self, value: u64) -> Result<Ciphertext, EngineError> {
        if self.latency > Duration::ZERO {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail_encrypt.swap(false, Ordering::SeqCst) {
            return Err(EngineError("injected encrypt failure".into()));
        }

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut hasher = blake3::Hasher::new_keyed(&self.session_key);
        hasher.update(&nonce);
        hasher.update(&value.to_le_bytes());

        let mut bytes = nonce.to_vec();
        bytes.extend_from_slice(hasher.finalize().as_bytes());
        Ok(Ciphertext(bytes))
    }

    async fn prove_correctness(&self, ciphertexts: &[Ciphertext]) -> Result<Proof, EngineError> {
        if self.latency > Duration::ZERO {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail_prove.swap(false, Ordering::SeqCst) {
            return Err(EngineError("injected prove failure".into()));
        }
        if ciphertexts.is_empty() {
            return Err(EngineError("nothing to prove".into()));
        }

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut bytes = nonce.to_vec();
        bytes.extend_from_slice(&Self::proof_digest(&nonce, ciphertexts));
        Ok(Proof(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_value_encrypts_differently() {
        let engine = MockFheEngine::new();
        let a = engine.encrypt(42).await.unwrap();
        let b = engine.encrypt(42).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn proof_binds_ciphertexts() {
        let engine = MockFheEngine::new();
        let a = engine.encrypt(1).await.unwrap();
        let b = engine.encrypt(2).await.unwrap();
        let proof = engine.prove_correctness(&[a.clone(), b.clone()]).await.unwrap();

        let (nonce, digest) = proof.0.split_at(NONCE_LEN);
        assert_eq!(digest, MockFheEngine::proof_digest(nonce, &[a.clone(), b]));
        // Different ciphertext set must not verify under the same proof.
        assert_ne!(digest, MockFheEngine::proof_digest(nonce, &[a]));
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let engine = MockFheEngine::new();
        engine.fail_next_encrypt();
        assert!(engine.encrypt(7).await.is_err());
        assert!(engine.encrypt(7).await.is_ok());
    }
}
