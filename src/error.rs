use thiserror::Error;

use crate::registry::ops::OpName;

/// Every failure the pipeline can surface. All variants are explicit
/// `Result` values; nothing is thrown past the workflow controller.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Bad user input; `fields` names every failing form field.
    #[error("validation failed for fields: {}", .fields.join(", "))]
    Validation { fields: Vec<String> },

    /// Engine failure mid-stage. The whole stage sequence must be re-run;
    /// runs are never resumable mid-sequence.
    #[error("encryption failed at stage '{stage}': {message}")]
    Encryption { stage: String, message: String },

    /// A stage run is already active for this submission.
    #[error("an encryption run is already active")]
    AlreadyRunning,

    /// The named operation already has an in-flight invocation.
    #[error("operation {op} already has a pending invocation")]
    AlreadyPending { op: OpName },

    /// Programmer error in operation wiring (arity or argument kind
    /// mismatch). Not user-recoverable.
    #[error("invalid arguments for {op}: {reason}")]
    InvalidArguments { op: OpName, reason: String },

    /// The payload was already accepted by the registry; a fresh
    /// encryption run is required to produce a new proof.
    #[error("payload already consumed; re-run encryption for a new proof")]
    PayloadConsumed,

    /// Workflow trigger arrived out of order.
    #[error("invalid workflow state: expected {expected}, was {actual}")]
    InvalidState { expected: String, actual: String },

    /// Network or signing rejection, including caller-imposed timeouts.
    #[error("transport error: {0}")]
    Transport(String),

    /// Read-only absence signal, not a fault.
    #[error("not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    /// Stable short name for logs and `SubmissionOutcome::Failed.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation { .. } => "validation",
            PipelineError::Encryption { .. } => "encryption",
            PipelineError::AlreadyRunning => "already_running",
            PipelineError::AlreadyPending { .. } => "already_pending",
            PipelineError::InvalidArguments { .. } => "invalid_arguments",
            PipelineError::PayloadConsumed => "payload_consumed",
            PipelineError::InvalidState { .. } => "invalid_state",
            PipelineError::Transport(_) => "transport",
            PipelineError::NotFound(_) => "not_found",
        }
    }
}
