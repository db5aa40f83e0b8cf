use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::context::SessionContext;
use crate::error::PipelineError;
use crate::reads::DatasetReader;
use crate::registry::ops::{OpName, RegistryCall};
use crate::stages::StageController;
use crate::submit::Submitter;
use crate::types::{
    Category, DatasetForm, DatasetId, DatasetSubmission, EncryptedPayload, StageProgress,
    SubmissionOutcome, TxHash,
};

#[derive(Clone, Debug, PartialEq)]
pub enum WorkflowState {
    Idle,
    CollectingInput,
    Encrypting,
    EncryptedReady,
    Submitting,
    Completed { tx: TxHash },
    /// Terminal until `reset`; carries the originating error.
    Error { error: PipelineError },
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "Idle",
            WorkflowState::CollectingInput => "CollectingInput",
            WorkflowState::Encrypting => "Encrypting",
            WorkflowState::EncryptedReady => "EncryptedReady",
            WorkflowState::Submitting => "Submitting",
            WorkflowState::Completed { .. } => "Completed",
            WorkflowState::Error { .. } => "Error",
        }
    }
}

/// What the current payload will be submitted as.
#[derive(Clone, Debug, PartialEq)]
enum SubmissionTarget {
    NewDataset,
    Contribution { dataset_id: DatasetId, note: String },
}

struct Inner {
    state: WorkflowState,
    submission: Option<DatasetSubmission>,
    target: SubmissionTarget,
    payload: Option<EncryptedPayload>,
    last_progress: Option<StageProgress>,
    /// Bumped on every reset; async results tagged with an older generation
    /// are discarded instead of being applied to a newer attempt.
    generation: u64,
}

impl Inner {
    fn fresh() -> Self {
        Self {
            state: WorkflowState::Idle,
            submission: None,
            target: SubmissionTarget::NewDataset,
            payload: None,
            last_progress: None,
            generation: 0,
        }
    }
}

/// Top-level state machine a caller drives:
/// `Idle -> CollectingInput -> Encrypting -> EncryptedReady -> Submitting ->
/// Completed`, with `Error` reachable from `Encrypting`/`Submitting` and
/// `reset` from anywhere. Out-of-order triggers are refused with
/// `InvalidState`. This is the single place collaborator failures become
/// `Error` state.
#[derive(Clone)]
pub struct WorkflowController {
    ctx: SessionContext,
    stages: Arc<StageController>,
    submitter: Arc<Submitter>,
    reader: Arc<DatasetReader>,
    inner: Arc<Mutex<Inner>>,
}

impl WorkflowController {
    pub fn new(ctx: SessionContext) -> Self {
        let stages = Arc::new(StageController::new(Arc::clone(&ctx.engine)));
        let submitter = Arc::new(Submitter::new(Arc::clone(&ctx.transport)));
        let reader = Arc::new(DatasetReader::new(Arc::clone(&ctx.transport)));
        Self {
            ctx,
            stages,
            submitter,
            reader,
            inner: Arc::new(Mutex::new(Inner::fresh())),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.inner.lock().state.clone()
    }

    pub fn last_progress(&self) -> Option<StageProgress> {
        self.inner.lock().last_progress.clone()
    }

    pub fn reader(&self) -> &DatasetReader {
        &self.reader
    }

    /// Latest submission-layer outcome for the operation this workflow
    /// drives, `None` while untouched.
    pub fn submission_outcome(&self) -> Option<SubmissionOutcome> {
        let op = match &self.inner.lock().target {
            SubmissionTarget::NewDataset => OpName::CreateDataset,
            SubmissionTarget::Contribution { .. } => OpName::ContributeToDataset,
        };
        self.submitter.outcome(op)
    }

    /// `Idle -> CollectingInput`.
    pub fn begin(&self) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock();
        if inner.state != WorkflowState::Idle {
            return Err(invalid_state("Idle", &inner.state));
        }
        inner.state = WorkflowState::CollectingInput;
        Ok(())
    }

    /// Validate and store the form for a new dataset. Invalid input never
    /// advances the machine; the error names every failing field.
    pub fn set_input(&self, form: &DatasetForm) -> Result<(), PipelineError> {
        self.store_input(form, SubmissionTarget::NewDataset)
    }

    /// Validate and store the form for a contribution to an existing
    /// dataset. Same encrypt-then-submit path, fresh payload required.
    pub fn set_contribution_input(
        &self,
        form: &DatasetForm,
        dataset_id: DatasetId,
        note: &str,
    ) -> Result<(), PipelineError> {
        self.store_input(
            form,
            SubmissionTarget::Contribution {
                dataset_id,
                note: note.to_string(),
            },
        )
    }

    fn store_input(&self, form: &DatasetForm, target: SubmissionTarget) -> Result<(), PipelineError> {
        let submission = validate(form)?;
        let mut inner = self.inner.lock();
        if inner.state != WorkflowState::CollectingInput {
            return Err(invalid_state("CollectingInput", &inner.state));
        }
        inner.submission = Some(submission);
        inner.target = target;
        Ok(())
    }

    /// `CollectingInput -> Encrypting -> EncryptedReady | Error`.
    #[instrument(skip(self), fields(session = %self.ctx.address))]
    pub async fn encrypt(&self) -> Result<(), PipelineError> {
        let (plaintext, generation) = {
            let mut inner = self.inner.lock();
            if inner.state != WorkflowState::CollectingInput {
                return Err(invalid_state("CollectingInput", &inner.state));
            }
            let submission = inner.submission.as_ref().ok_or_else(|| {
                PipelineError::Validation {
                    fields: vec![
                        "name".into(),
                        "description".into(),
                        "category".into(),
                        "qualityScore".into(),
                        "file".into(),
                    ],
                }
            })?;
            let plaintext = submission.plaintext();
            inner.state = WorkflowState::Encrypting;
            inner.last_progress = None;
            (plaintext, inner.generation)
        };

        // Forward stage progress into the shared snapshot while the run is
        // in flight, dropping events from superseded attempts.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let forward_inner = Arc::clone(&self.inner);
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let mut inner = forward_inner.lock();
                if inner.generation == generation {
                    inner.last_progress = Some(event);
                }
            }
        });

        let result = self.stages.run(plaintext, &tx).await;
        drop(tx);
        let _ = forwarder.await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            info!("discarding encryption result for a reset attempt");
            return Ok(());
        }
        match result {
            Ok(payload) => {
                inner.payload = Some(payload);
                inner.state = WorkflowState::EncryptedReady;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "encryption run failed");
                inner.state = WorkflowState::Error { error: e.clone() };
                Err(e)
            }
        }
    }

    /// `EncryptedReady -> Submitting -> Completed | Error`. On success the
    /// payload is consumed; submitting again needs a fresh encryption run.
    pub async fn submit(&self) -> Result<TxHash, PipelineError> {
        self.submit_with_timeout(None).await
    }

    #[instrument(skip(self, timeout), fields(session = %self.ctx.address))]
    pub async fn submit_with_timeout(
        &self,
        timeout: Option<Duration>,
    ) -> Result<TxHash, PipelineError> {
        let (call, generation) = {
            let mut inner = self.inner.lock();
            if inner.state != WorkflowState::EncryptedReady {
                return Err(invalid_state("EncryptedReady", &inner.state));
            }
            let (submission, payload) = match (&inner.submission, &inner.payload) {
                (Some(s), Some(p)) => (s, p),
                _ => return Err(invalid_state("EncryptedReady", &inner.state)),
            };
            let call = match &inner.target {
                SubmissionTarget::NewDataset => RegistryCall::create_dataset(
                    &submission.name,
                    &submission.description,
                    submission.category.as_str(),
                    payload,
                ),
                SubmissionTarget::Contribution { dataset_id, note } => {
                    RegistryCall::contribute_to_dataset(*dataset_id, payload, note)
                }
            };
            inner.state = WorkflowState::Submitting;
            (call, inner.generation)
        };

        let result = self.submitter.invoke_with_timeout(call, timeout).await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            info!("discarding submission result for a reset attempt");
            return result;
        }
        match result {
            Ok(tx) => {
                info!(tx = %tx.0, "submission completed");
                inner.state = WorkflowState::Completed { tx: tx.clone() };
                // Consumed by the submission layer; never resubmittable.
                inner.payload = None;
                Ok(tx)
            }
            Err(e) => {
                warn!(error = %e, "submission failed");
                inner.state = WorkflowState::Error { error: e.clone() };
                Err(e)
            }
        }
    }

    /// Retry path after a transport failure: the unconsumed payload is kept,
    /// so move back to `EncryptedReady` without re-encrypting.
    pub fn retry_submission(&self) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock();
        if matches!(inner.state, WorkflowState::Error { .. }) && inner.payload.is_some() {
            inner.state = WorkflowState::EncryptedReady;
            Ok(())
        } else {
            Err(invalid_state("Error", &inner.state))
        }
    }

    /// Back to `Idle` from anywhere. Discards the submission, the payload,
    /// any progress, and any carried error; in-flight results of the old
    /// attempt will be ignored when they land.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let generation = inner.generation + 1;
        *inner = Inner::fresh();
        inner.generation = generation;
    }
}

fn invalid_state(expected: &str, actual: &WorkflowState) -> PipelineError {
    PipelineError::InvalidState {
        expected: expected.to_string(),
        actual: actual.name().to_string(),
    }
}

/// Check every required field and report all failures at once, in form
/// order: name, description, category, qualityScore, file.
pub fn validate(form: &DatasetForm) -> Result<DatasetSubmission, PipelineError> {
    let mut fields = Vec::new();
    if form.name.trim().is_empty() {
        fields.push("name".to_string());
    }
    if form.description.trim().is_empty() {
        fields.push("description".to_string());
    }
    if form.category.is_none() {
        fields.push("category".to_string());
    }
    if form.quality_score < 1 || form.quality_score > 100 {
        fields.push("qualityScore".to_string());
    }
    if form.file.is_empty() {
        fields.push("file".to_string());
    }
    if !fields.is_empty() {
        return Err(PipelineError::Validation { fields });
    }

    Ok(DatasetSubmission {
        name: form.name.clone(),
        description: form.description.clone(),
        category: form.category.unwrap_or(Category::Other),
        raw_data_size: form.file.len() as u64,
        raw_quality_score: form.quality_score,
    })
}
