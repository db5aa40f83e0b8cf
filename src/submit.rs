use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::registry::ops::{OpName, RegistryCall};
use crate::registry::RegistryTransport;
use crate::types::{PayloadId, SubmissionOutcome, TxHash};

/// Transaction Submission Layer: one generic invoker for every named write
/// operation, with per-operation pending/error isolation.
///
/// Invariants:
/// - at most one `Pending` invocation per operation name;
/// - `Idle -> Pending -> Success | Failed`, never `Idle -> Success`;
/// - a payload whose submission reached `Success` is consumed and is never
///   accepted again.
pub struct Submitter {
    transport: Arc<dyn RegistryTransport>,
    outcomes: DashMap<OpName, SubmissionOutcome>,
    consumed: DashSet<PayloadId>,
}

impl Submitter {
    pub fn new(transport: Arc<dyn RegistryTransport>) -> Self {
        Self {
            transport,
            outcomes: DashMap::new(),
            consumed: DashSet::new(),
        }
    }

    /// Latest outcome for the operation, `None` while still `Idle`.
    pub fn outcome(&self, op: OpName) -> Option<SubmissionOutcome> {
        self.outcomes.get(&op).map(|v| v.clone())
    }

    pub fn is_consumed(&self, id: PayloadId) -> bool {
        self.consumed.contains(&id)
    }

    /// Invoke with unbounded transport latency.
    pub async fn invoke(&self, call: RegistryCall) -> Result<TxHash, PipelineError> {
        self.invoke_with_timeout(call, None).await
    }

    /// Invoke with a caller-imposed deadline. Expiry surfaces as a
    /// `Transport` failure; the underlying transport's eventual answer for
    /// that attempt is discarded.
    pub async fn invoke_with_timeout(
        &self,
        call: RegistryCall,
        timeout: Option<Duration>,
    ) -> Result<TxHash, PipelineError> {
        let op = call.op();
        let payload_id = call.payload_id();

        if let Some(id) = payload_id {
            if self.consumed.contains(&id) {
                return Err(PipelineError::PayloadConsumed);
            }
        }

        // Claim the per-operation slot, superseding any terminal outcome.
        match self.outcomes.entry(op) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_pending() {
                    return Err(PipelineError::AlreadyPending { op });
                }
                entry.insert(SubmissionOutcome::Pending);
            }
            Entry::Vacant(entry) => {
                entry.insert(SubmissionOutcome::Pending);
            }
        }

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.transport.submit(call)).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::Transport(format!(
                    "no acknowledgement within {limit:?}"
                ))),
            },
            None => self.transport.submit(call).await,
        };

        match result {
            Ok(tx) => {
                info!(op = %op, tx = %tx.0, "submission acknowledged");
                self.outcomes.insert(op, SubmissionOutcome::Success { tx: tx.clone() });
                if let Some(id) = payload_id {
                    self.consumed.insert(id);
                }
                Ok(tx)
            }
            Err(e) => {
                warn!(op = %op, error = %e, "submission failed");
                self.outcomes.insert(
                    op,
                    SubmissionOutcome::Failed {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ReadQuery, ReadValue};
    use crate::types::{Ciphertext, DatasetId, EncryptedPayload, Proof};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Transport that holds every submit until released, so tests can
    /// observe the Pending window.
    struct GatedTransport {
        release: Notify,
    }

    impl GatedTransport {
        fn new() -> Self {
            Self {
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl RegistryTransport for GatedTransport {
        async fn submit(&self, _call: RegistryCall) -> Result<TxHash, PipelineError> {
            self.release.notified().await;
            Ok(TxHash("0xgated".into()))
        }

        async fn read(&self, _query: ReadQuery) -> Result<ReadValue, PipelineError> {
            Err(PipelineError::NotFound("gated".into()))
        }
    }

    fn payload(tag: u8) -> EncryptedPayload {
        EncryptedPayload {
            encrypted_size: Ciphertext(vec![tag, 1]),
            encrypted_quality: Ciphertext(vec![tag, 2]),
            proof: Proof(vec![tag, 3]),
        }
    }

    #[tokio::test]
    async fn second_invoke_while_pending_is_rejected() {
        let transport = Arc::new(GatedTransport::new());
        let submitter = Arc::new(Submitter::new(transport.clone()));

        let call = RegistryCall::create_dataset("a", "b", "medical", &payload(1));
        let first = {
            let submitter = Arc::clone(&submitter);
            let call = call.clone();
            tokio::spawn(async move { submitter.invoke(call).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(
            submitter.outcome(OpName::CreateDataset),
            Some(SubmissionOutcome::Pending)
        );

        let second = RegistryCall::create_dataset("c", "d", "medical", &payload(2));
        let err = submitter.invoke(second).await.unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyPending { op: OpName::CreateDataset }));

        // The first invocation's outcome is unaffected by the rejection.
        transport.release.notify_one();
        let tx = first.await.unwrap().unwrap();
        assert_eq!(
            submitter.outcome(OpName::CreateDataset),
            Some(SubmissionOutcome::Success { tx })
        );
    }

    #[tokio::test]
    async fn pending_ops_are_isolated_per_name() {
        let transport = Arc::new(GatedTransport::new());
        let submitter = Arc::new(Submitter::new(transport.clone()));

        let create = RegistryCall::create_dataset("a", "b", "other", &payload(1));
        let handle = {
            let submitter = Arc::clone(&submitter);
            tokio::spawn(async move { submitter.invoke(create).await })
        };
        tokio::task::yield_now().await;

        // A different operation is not blocked by CreateDataset's Pending.
        let start = RegistryCall::start_training_session(DatasetId(0), "{}");
        let second = {
            let submitter = Arc::clone(&submitter);
            tokio::spawn(async move { submitter.invoke(start).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(
            submitter.outcome(OpName::StartTrainingSession),
            Some(SubmissionOutcome::Pending)
        );

        transport.release.notify_one();
        transport.release.notify_one();
        handle.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn consumed_payload_is_never_accepted_again() {
        let transport = Arc::new(GatedTransport::new());
        let submitter = Submitter::new(transport.clone());

        let p = payload(9);
        let call = RegistryCall::create_dataset("a", "b", "research", &p);
        transport.release.notify_one();
        submitter.invoke(call).await.unwrap();
        assert!(submitter.is_consumed(p.payload_id()));

        // Same payload, same op.
        let err = submitter
            .invoke(RegistryCall::create_dataset("a", "b", "research", &p))
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::PayloadConsumed);

        // Same payload smuggled through a different op.
        let err = submitter
            .invoke(RegistryCall::contribute_to_dataset(DatasetId(0), &p, "x"))
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::PayloadConsumed);
    }

    #[tokio::test]
    async fn failed_attempt_leaves_payload_unconsumed() {
        struct RejectingTransport;

        #[async_trait]
        impl RegistryTransport for RejectingTransport {
            async fn submit(&self, _call: RegistryCall) -> Result<TxHash, PipelineError> {
                Err(PipelineError::Transport("rejected".into()))
            }
            async fn read(&self, _query: ReadQuery) -> Result<ReadValue, PipelineError> {
                Err(PipelineError::NotFound("n/a".into()))
            }
        }

        let submitter = Submitter::new(Arc::new(RejectingTransport));
        let p = payload(4);
        let err = submitter
            .invoke(RegistryCall::create_dataset("a", "b", "other", &p))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
        assert!(!submitter.is_consumed(p.payload_id()));
        assert!(matches!(
            submitter.outcome(OpName::CreateDataset),
            Some(SubmissionOutcome::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn timeout_maps_to_transport_failure() {
        // The gate is never released, so the deadline always wins.
        let transport = Arc::new(GatedTransport::new());
        let submitter = Submitter::new(transport);

        let call = RegistryCall::start_training_session(DatasetId(0), "{}");
        let err = submitter
            .invoke_with_timeout(call, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
        assert!(matches!(
            submitter.outcome(OpName::StartTrainingSession),
            Some(SubmissionOutcome::Failed { .. })
        ));
    }
}
