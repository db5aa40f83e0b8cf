use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

/// Transaction handle returned by the registry on a successful write.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub String);

/// 20-byte account identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 20] = bytes.try_into().ok()?;
        Some(Address(arr))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Medical,
    Financial,
    Research,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Medical => "medical",
            Category::Financial => "financial",
            Category::Research => "research",
            Category::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "medical" => Some(Category::Medical),
            "financial" => Some(Category::Financial),
            "research" => Some(Category::Research),
            "other" => Some(Category::Other),
            _ => None,
        }
    }
}

/// Opaque handle to an encrypted value, usable by the registry without decryption.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ciphertext(pub Vec<u8>);

/// Opaque artifact binding a set of ciphertexts to a claim of correct computation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proof(pub Vec<u8>);

/// Fingerprint of a payload's proof bytes; the unit of single-use tracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadId(pub [u8; 32]);

/// Raw caller input, not yet validated.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatasetForm {
    pub name: String,
    pub description: String,
    pub category: Option<Category>,
    pub quality_score: u32,
    pub file: Vec<u8>,
}

/// Validated submission, immutable once handed to the stage controller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetSubmission {
    pub name: String,
    pub description: String,
    pub category: Category,
    /// Derived from the selected file, in bytes.
    pub raw_data_size: u64,
    /// 1..=100 inclusive.
    pub raw_quality_score: u32,
}

/// Plaintext fields the engine actually sees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plaintext {
    pub size: u64,
    pub quality_score: u32,
}

impl DatasetSubmission {
    pub fn plaintext(&self) -> Plaintext {
        Plaintext {
            size: self.raw_data_size,
            quality_score: self.raw_quality_score,
        }
    }
}

/// Product of a completed stage run. Single-use: each payload may be
/// submitted at most once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub encrypted_size: Ciphertext,
    pub encrypted_quality: Ciphertext,
    pub proof: Proof,
}

impl EncryptedPayload {
    pub fn payload_id(&self) -> PayloadId {
        PayloadId(*blake3::hash(&self.proof.0).as_bytes())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageProgress {
    pub completed_stages: u32,
    pub total_stages: u32,
    pub current_stage: String,
}

impl StageProgress {
    pub fn fraction_complete(&self) -> f64 {
        self.completed_stages as f64 / self.total_stages as f64
    }
}

/// Outcome of one submission attempt. Superseded on retry, never mutated
/// in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SubmissionOutcome {
    Pending,
    Success { tx: TxHash },
    Failed { kind: String, message: String },
}

impl SubmissionOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, SubmissionOutcome::Pending)
    }
}

/// Read-side dataset record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: DatasetId,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub owner: Address,
    pub contribution_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_hex_round_trip() {
        let addr = Address([0xab; 20]);
        let parsed = Address::from_hex(&addr.to_string()).unwrap();
        assert_eq!(addr, parsed);
        assert!(Address::from_hex("0x1234").is_none());
    }

    #[test]
    fn distinct_proofs_give_distinct_payload_ids() {
        let a = EncryptedPayload {
            encrypted_size: Ciphertext(vec![1]),
            encrypted_quality: Ciphertext(vec![2]),
            proof: Proof(vec![3, 4]),
        };
        let mut b = a.clone();
        b.proof = Proof(vec![5, 6]);
        assert_ne!(a.payload_id(), b.payload_id());
    }
}
