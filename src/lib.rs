//! Confidential dataset submission pipeline.
//!
//! Orchestration layer between a UI, a pluggable encryption engine, and a
//! contract-backed registry: it encrypts sensitive dataset fields
//! client-side behind a staged progress sequence, submits the encrypted
//! payload plus correctness proof through a transactional layer with
//! per-operation pending/error tracking, and serves cached read queries
//! against the same registry. Presentation and wallet plumbing live
//! elsewhere; they only drive this crate and render its state.

pub mod context;
pub mod engine;
pub mod error;
pub mod reads;
pub mod registry;
pub mod stages;
pub mod submit;
pub mod types;
pub mod workflow;

pub use crate::context::SessionContext;
pub use crate::error::PipelineError;
pub use crate::workflow::{WorkflowController, WorkflowState};
