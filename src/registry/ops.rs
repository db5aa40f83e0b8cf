use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{Address, Ciphertext, DatasetId, EncryptedPayload, PayloadId, Proof, SessionId};

/// Named write operations exposed by the registry contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpName {
    CreateDataset,
    ContributeToDataset,
    StartTrainingSession,
    CompleteTrainingSession,
}

impl OpName {
    pub fn as_str(self) -> &'static str {
        match self {
            OpName::CreateDataset => "createDataset",
            OpName::ContributeToDataset => "contributeToDataset",
            OpName::StartTrainingSession => "startTrainingSession",
            OpName::CompleteTrainingSession => "completeTrainingSession",
        }
    }

    /// Fixed, ordered argument signature for each operation.
    pub fn signature(self) -> &'static [ArgKind] {
        use ArgKind::*;
        match self {
            OpName::CreateDataset => &[Str, Str, Str, Cipher, Cipher, ProofArg],
            OpName::ContributeToDataset => &[Uint, Cipher, Cipher, Str, ProofArg],
            OpName::StartTrainingSession => &[Uint, Str],
            OpName::CompleteTrainingSession => &[Uint, Cipher, Cipher, ProofArg],
        }
    }
}

impl std::fmt::Display for OpName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgKind {
    Str,
    Uint,
    Addr,
    Cipher,
    ProofArg,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    Str(String),
    Uint(u64),
    Addr(Address),
    Cipher(Ciphertext),
    ProofValue(Proof),
}

impl ArgValue {
    pub fn kind(&self) -> ArgKind {
        match self {
            ArgValue::Str(_) => ArgKind::Str,
            ArgValue::Uint(_) => ArgKind::Uint,
            ArgValue::Addr(_) => ArgKind::Addr,
            ArgValue::Cipher(_) => ArgKind::Cipher,
            ArgValue::ProofValue(_) => ArgKind::ProofArg,
        }
    }
}

/// One fully-wired contract call: operation name plus its ordered,
/// kind-checked argument list. The single generic invoker replaces one
/// hand-written wrapper per operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryCall {
    op: OpName,
    args: Vec<ArgValue>,
}

impl RegistryCall {
    /// Check `args` against the operation's fixed signature. Mismatched
    /// arity or kinds is a caller error, not a transport error.
    pub fn new(op: OpName, args: Vec<ArgValue>) -> Result<Self, PipelineError> {
        let sig = op.signature();
        if args.len() != sig.len() {
            return Err(PipelineError::InvalidArguments {
                op,
                reason: format!("expected {} arguments, got {}", sig.len(), args.len()),
            });
        }
        for (i, (arg, want)) in args.iter().zip(sig).enumerate() {
            if arg.kind() != *want {
                return Err(PipelineError::InvalidArguments {
                    op,
                    reason: format!("argument {i}: expected {want:?}, got {:?}", arg.kind()),
                });
            }
        }
        Ok(Self { op, args })
    }

    pub fn create_dataset(
        name: &str,
        description: &str,
        category: &str,
        payload: &EncryptedPayload,
    ) -> Self {
        Self {
            op: OpName::CreateDataset,
            args: vec![
                ArgValue::Str(name.to_string()),
                ArgValue::Str(description.to_string()),
                ArgValue::Str(category.to_string()),
                ArgValue::Cipher(payload.encrypted_size.clone()),
                ArgValue::Cipher(payload.encrypted_quality.clone()),
                ArgValue::ProofValue(payload.proof.clone()),
            ],
        }
    }

    pub fn contribute_to_dataset(
        dataset_id: DatasetId,
        payload: &EncryptedPayload,
        note: &str,
    ) -> Self {
        Self {
            op: OpName::ContributeToDataset,
            args: vec![
                ArgValue::Uint(dataset_id.0),
                ArgValue::Cipher(payload.encrypted_size.clone()),
                ArgValue::Cipher(payload.encrypted_quality.clone()),
                ArgValue::Str(note.to_string()),
                ArgValue::ProofValue(payload.proof.clone()),
            ],
        }
    }

    pub fn start_training_session(dataset_id: DatasetId, config: &str) -> Self {
        Self {
            op: OpName::StartTrainingSession,
            args: vec![ArgValue::Uint(dataset_id.0), ArgValue::Str(config.to_string())],
        }
    }

    pub fn complete_training_session(session_id: SessionId, payload: &EncryptedPayload) -> Self {
        Self {
            op: OpName::CompleteTrainingSession,
            args: vec![
                ArgValue::Uint(session_id.0),
                ArgValue::Cipher(payload.encrypted_size.clone()),
                ArgValue::Cipher(payload.encrypted_quality.clone()),
                ArgValue::ProofValue(payload.proof.clone()),
            ],
        }
    }

    pub fn op(&self) -> OpName {
        self.op
    }

    pub fn args(&self) -> &[ArgValue] {
        &self.args
    }

    /// Fingerprint of the proof argument, if this call carries one. Used by
    /// the submission layer for single-use enforcement.
    pub fn payload_id(&self) -> Option<PayloadId> {
        self.args.iter().find_map(|a| match a {
            ArgValue::ProofValue(p) => Some(PayloadId(*blake3::hash(&p.0).as_bytes())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn payload() -> EncryptedPayload {
        EncryptedPayload {
            encrypted_size: Ciphertext(vec![1, 2]),
            encrypted_quality: Ciphertext(vec![3, 4]),
            proof: Proof(vec![5, 6]),
        }
    }

    #[test]
    fn typed_constructors_match_signatures() {
        let p = payload();
        for call in [
            RegistryCall::create_dataset("n", "d", "medical", &p),
            RegistryCall::contribute_to_dataset(DatasetId(1), &p, "note"),
            RegistryCall::start_training_session(DatasetId(1), "{}"),
            RegistryCall::complete_training_session(SessionId(2), &p),
        ] {
            RegistryCall::new(call.op(), call.args().to_vec()).unwrap();
        }
    }

    #[test]
    fn arity_mismatch_is_invalid_arguments() {
        let err = RegistryCall::new(
            OpName::StartTrainingSession,
            vec![ArgValue::Uint(1)],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArguments { op: OpName::StartTrainingSession, .. }));
    }

    #[test]
    fn kind_mismatch_is_invalid_arguments() {
        let err = RegistryCall::new(
            OpName::StartTrainingSession,
            vec![ArgValue::Str("1".into()), ArgValue::Str("{}".into())],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArguments { .. }));
    }

    #[test]
    fn payload_id_tracks_the_proof_argument() {
        let p = payload();
        let call = RegistryCall::create_dataset("n", "d", "other", &p);
        assert_eq!(call.payload_id(), Some(p.payload_id()));
        assert_eq!(
            RegistryCall::start_training_session(DatasetId(0), "{}").payload_id(),
            None
        );
    }
}
