use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::engine::EncryptionEngine;
use crate::error::PipelineError;
use crate::types::{Ciphertext, EncryptedPayload, Plaintext, StageProgress};

/// Fixed stage sequence. Stages never reorder or skip; the engine is only
/// consulted at the encryption and proof stages.
pub const STAGE_LABELS: [&str; 6] = [
    "Initializing encryption parameters",
    "Preparing key material",
    "Encrypting data size",
    "Encrypting quality score",
    "Generating correctness proof",
    "Finalizing payload",
];

/// Drives one encryption run: emits one `StageProgress` per completed stage
/// with strictly increasing fractions ending at exactly 1.0, then yields the
/// payload. A failed run emits nothing further and exposes no partial
/// payload.
pub struct StageController {
    engine: Arc<dyn EncryptionEngine>,
    busy: AtomicBool,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl StageController {
    pub fn new(engine: Arc<dyn EncryptionEngine>) -> Self {
        Self {
            engine,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Run the full stage sequence for one submission. Progress events are
    /// pushed to `progress`; a closed receiver is tolerated. At most one run
    /// is active at a time.
    pub async fn run(
        &self,
        plaintext: Plaintext,
        progress: &UnboundedSender<StageProgress>,
    ) -> Result<EncryptedPayload, PipelineError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::AlreadyRunning);
        }
        let _guard = BusyGuard(&self.busy);

        let total = STAGE_LABELS.len() as u32;
        let mut encrypted_size: Option<Ciphertext> = None;
        let mut encrypted_quality: Option<Ciphertext> = None;
        let mut proof = None;

        for (index, label) in STAGE_LABELS.iter().enumerate() {
            let result = match index {
                2 => self
                    .engine
                    .encrypt(plaintext.size)
                    .await
                    .map(|ct| encrypted_size = Some(ct)),
                3 => self
                    .engine
                    .encrypt(plaintext.quality_score as u64)
                    .await
                    .map(|ct| encrypted_quality = Some(ct)),
                4 => match (&encrypted_size, &encrypted_quality) {
                    (Some(size), Some(quality)) => {
                        let ciphers = [size.clone(), quality.clone()];
                        self.engine
                            .prove_correctness(&ciphers)
                            .await
                            .map(|p| proof = Some(p))
                    }
                    // Unreachable by stage order; surface as an engine fault
                    // rather than panic.
                    _ => Err(crate::engine::EngineError(
                        "ciphertexts missing before proof stage".into(),
                    )),
                },
                _ => Ok(()),
            };

            if let Err(e) = result {
                warn!(stage = label, error = %e, "encryption stage failed");
                return Err(PipelineError::Encryption {
                    stage: (*label).to_string(),
                    message: e.0,
                });
            }

            let event = StageProgress {
                completed_stages: index as u32 + 1,
                total_stages: total,
                current_stage: (*label).to_string(),
            };
            debug!(stage = label, fraction = event.fraction_complete(), "stage complete");
            let _ = progress.send(event);
        }

        // All six stages completed; the options are necessarily filled.
        match (encrypted_size, encrypted_quality, proof) {
            (Some(encrypted_size), Some(encrypted_quality), Some(proof)) => Ok(EncryptedPayload {
                encrypted_size,
                encrypted_quality,
                proof,
            }),
            _ => Err(PipelineError::Encryption {
                stage: STAGE_LABELS[5].to_string(),
                message: "incomplete artifacts after final stage".into(),
            }),
        }
    }
}
