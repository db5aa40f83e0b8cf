use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;

use crate::engine::mock::MockFheEngine;
use crate::error::PipelineError;
use crate::registry::ops::{ArgValue, OpName, RegistryCall};
use crate::registry::{ReadQuery, ReadValue, RegistryTransport};
use crate::types::{Address, Category, Ciphertext, DatasetId, DatasetInfo, TxHash};

const PROOF_NONCE_LEN: usize = 16;

#[derive(Clone, Debug)]
struct DatasetRecord {
    name: String,
    description: String,
    category: Category,
    owner: Address,
    contribution_count: u64,
}

#[derive(Clone, Debug)]
struct SessionRecord {
    dataset_id: DatasetId,
    completed: bool,
}

#[derive(Default)]
struct Store {
    datasets: HashMap<u64, DatasetRecord>,
    sessions: HashMap<u64, SessionRecord>,
    reputations: HashMap<Address, u64>,
    spent_proofs: HashSet<[u8; 32]>,
    next_dataset_id: u64,
    next_session_id: u64,
}

/// Deterministic registry standing in for the on-chain contract.
///
/// It enforces the parts of the contract the pipeline relies on: proofs must
/// actually bind the submitted ciphertexts, a spent proof is rejected on
/// replay, and reads on unknown identifiers are `NotFound`.
pub struct InMemoryRegistry {
    signer: Address,
    store: Mutex<Store>,
    fail_next: AtomicBool,
}

impl InMemoryRegistry {
    pub fn new(signer: Address) -> Self {
        Self {
            signer,
            store: Mutex::new(Store::default()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Make the next `submit` fail with a transport error (test hook).
    pub fn fail_next_submit(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn verify_proof(proof: &[u8], ciphertexts: &[Ciphertext]) -> Result<(), PipelineError> {
        if proof.len() != PROOF_NONCE_LEN + 32 {
            return Err(PipelineError::Transport("malformed proof".into()));
        }
        let (nonce, digest) = proof.split_at(PROOF_NONCE_LEN);
        if digest != MockFheEngine::proof_digest(nonce, ciphertexts) {
            return Err(PipelineError::Transport(
                "proof does not bind the submitted ciphertexts".into(),
            ));
        }
        Ok(())
    }

    fn fresh_tx() -> TxHash {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        TxHash(format!("0x{}", hex::encode(bytes)))
    }
}

#[async_trait]
impl RegistryTransport for InMemoryRegistry {
    async fn submit(&self, call: RegistryCall) -> Result<TxHash, PipelineError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PipelineError::Transport("injected transport failure".into()));
        }

        let ciphers: Vec<Ciphertext> = call
            .args()
            .iter()
            .filter_map(|a| match a {
                ArgValue::Cipher(c) => Some(c.clone()),
                _ => None,
            })
            .collect();
        let proof = call.args().iter().find_map(|a| match a {
            ArgValue::ProofValue(p) => Some(p.0.clone()),
            _ => None,
        });

        let mut store = self.store.lock();

        // Verify and replay-check up front; the proof is only marked spent
        // once the whole operation is accepted.
        let proof_fp = match &proof {
            Some(proof) => {
                Self::verify_proof(proof, &ciphers)?;
                let fp = *blake3::hash(proof).as_bytes();
                if store.spent_proofs.contains(&fp) {
                    return Err(PipelineError::Transport("proof already spent".into()));
                }
                Some(fp)
            }
            None => None,
        };

        match (call.op(), call.args()) {
            (OpName::CreateDataset, [ArgValue::Str(name), ArgValue::Str(description), ArgValue::Str(category), _, _, _]) => {
                let category = Category::parse(category).ok_or_else(|| {
                    PipelineError::Transport(format!("unknown category '{category}'"))
                })?;
                let id = store.next_dataset_id;
                store.next_dataset_id += 1;
                store.datasets.insert(
                    id,
                    DatasetRecord {
                        name: name.clone(),
                        description: description.clone(),
                        category,
                        owner: self.signer,
                        contribution_count: 0,
                    },
                );
                tracing::info!(dataset_id = id, "dataset created");
            }
            (OpName::ContributeToDataset, [ArgValue::Uint(dataset_id), ..]) => {
                let record = store
                    .datasets
                    .get_mut(dataset_id)
                    .ok_or_else(|| PipelineError::Transport(format!("unknown dataset {dataset_id}")))?;
                record.contribution_count += 1;
                *store.reputations.entry(self.signer).or_insert(0) += 1;
            }
            (OpName::StartTrainingSession, [ArgValue::Uint(dataset_id), ArgValue::Str(_config)]) => {
                if !store.datasets.contains_key(dataset_id) {
                    return Err(PipelineError::Transport(format!("unknown dataset {dataset_id}")));
                }
                let id = store.next_session_id;
                store.next_session_id += 1;
                store.sessions.insert(
                    id,
                    SessionRecord {
                        dataset_id: DatasetId(*dataset_id),
                        completed: false,
                    },
                );
            }
            (OpName::CompleteTrainingSession, [ArgValue::Uint(session_id), ..]) => {
                let session = store
                    .sessions
                    .get_mut(session_id)
                    .ok_or_else(|| PipelineError::Transport(format!("unknown session {session_id}")))?;
                if session.completed {
                    return Err(PipelineError::Transport(format!(
                        "session {session_id} already completed"
                    )));
                }
                session.completed = true;
                tracing::info!(
                    session_id = *session_id,
                    dataset_id = session.dataset_id.0,
                    "training session completed"
                );
            }
            _ => {
                return Err(PipelineError::Transport(format!(
                    "malformed call for {}",
                    call.op()
                )))
            }
        }

        if let Some(fp) = proof_fp {
            store.spent_proofs.insert(fp);
        }
        Ok(Self::fresh_tx())
    }

    async fn read(&self, query: ReadQuery) -> Result<ReadValue, PipelineError> {
        let store = self.store.lock();
        match query {
            ReadQuery::GetDatasetInfo(id) => {
                let record = store
                    .datasets
                    .get(&id.0)
                    .ok_or_else(|| PipelineError::NotFound(format!("dataset {}", id.0)))?;
                Ok(ReadValue::Dataset(DatasetInfo {
                    id,
                    name: record.name.clone(),
                    description: record.description.clone(),
                    category: record.category,
                    owner: record.owner,
                    contribution_count: record.contribution_count,
                }))
            }
            ReadQuery::GetContributorReputation(addr) => store
                .reputations
                .get(&addr)
                .copied()
                .map(ReadValue::Reputation)
                .ok_or_else(|| PipelineError::NotFound(format!("contributor {addr}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EncryptionEngine;
    use crate::types::SessionId;

    async fn encrypted_payload(engine: &MockFheEngine) -> crate::types::EncryptedPayload {
        let a = engine.encrypt(10).await.unwrap();
        let b = engine.encrypt(90).await.unwrap();
        let proof = engine.prove_correctness(&[a.clone(), b.clone()]).await.unwrap();
        crate::types::EncryptedPayload {
            encrypted_size: a,
            encrypted_quality: b,
            proof,
        }
    }

    #[tokio::test]
    async fn create_then_read_back() {
        let registry = InMemoryRegistry::new(Address([1; 20]));
        let engine = MockFheEngine::new();
        let payload = encrypted_payload(&engine).await;

        registry
            .submit(RegistryCall::create_dataset("genomes", "desc", "medical", &payload))
            .await
            .unwrap();

        let value = registry.read(ReadQuery::GetDatasetInfo(DatasetId(0))).await.unwrap();
        match value {
            ReadValue::Dataset(info) => {
                assert_eq!(info.name, "genomes");
                assert_eq!(info.category, Category::Medical);
                assert_eq!(info.owner, Address([1; 20]));
            }
            other => panic!("unexpected read value: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_dataset_is_not_found() {
        let registry = InMemoryRegistry::new(Address([1; 20]));
        let err = registry
            .read(ReadQuery::GetDatasetInfo(DatasetId(999)))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn tampered_proof_is_rejected() {
        let registry = InMemoryRegistry::new(Address([1; 20]));
        let engine = MockFheEngine::new();
        let mut payload = encrypted_payload(&engine).await;
        // Swap the ciphertexts so the proof no longer binds them in order.
        std::mem::swap(&mut payload.encrypted_size, &mut payload.encrypted_quality);

        let err = registry
            .submit(RegistryCall::create_dataset("x", "y", "other", &payload))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }

    #[tokio::test]
    async fn spent_proof_is_rejected_on_replay() {
        let registry = InMemoryRegistry::new(Address([1; 20]));
        let engine = MockFheEngine::new();
        let payload = encrypted_payload(&engine).await;

        registry
            .submit(RegistryCall::create_dataset("x", "y", "other", &payload))
            .await
            .unwrap();
        let err = registry
            .submit(RegistryCall::create_dataset("x2", "y2", "other", &payload))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }

    #[tokio::test]
    async fn contribution_accrues_reputation() {
        let signer = Address([7; 20]);
        let registry = InMemoryRegistry::new(signer);
        let engine = MockFheEngine::new();

        let payload = encrypted_payload(&engine).await;
        registry
            .submit(RegistryCall::create_dataset("x", "y", "research", &payload))
            .await
            .unwrap();

        assert!(matches!(
            registry.read(ReadQuery::GetContributorReputation(signer)).await,
            Err(PipelineError::NotFound(_))
        ));

        let payload = encrypted_payload(&engine).await;
        registry
            .submit(RegistryCall::contribute_to_dataset(DatasetId(0), &payload, "more rows"))
            .await
            .unwrap();

        let value = registry
            .read(ReadQuery::GetContributorReputation(signer))
            .await
            .unwrap();
        assert_eq!(value, ReadValue::Reputation(1));
    }

    #[tokio::test]
    async fn training_session_lifecycle() {
        let registry = InMemoryRegistry::new(Address([1; 20]));
        let engine = MockFheEngine::new();

        let payload = encrypted_payload(&engine).await;
        registry
            .submit(RegistryCall::create_dataset("x", "y", "financial", &payload))
            .await
            .unwrap();
        registry
            .submit(RegistryCall::start_training_session(DatasetId(0), "{\"epochs\":3}"))
            .await
            .unwrap();

        let payload = encrypted_payload(&engine).await;
        registry
            .submit(RegistryCall::complete_training_session(SessionId(0), &payload))
            .await
            .unwrap();

        // Completing twice is a contract-side rejection.
        let payload = encrypted_payload(&engine).await;
        let err = registry
            .submit(RegistryCall::complete_training_session(SessionId(0), &payload))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }
}
