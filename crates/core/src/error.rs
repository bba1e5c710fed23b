#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Presented master key did not validate. Deliberately uniform: the
    /// caller learns nothing about wrong-format vs wrong-value vs
    /// missing-record.
    #[error("invalid master key")]
    InvalidCredential,
    #[error("master key material is not valid base64 key bytes")]
    InvalidKeyMaterial,
    #[error("ciphertext could not be decrypted with the supplied key")]
    DecryptionFailure,
    #[error("failed to encrypt field value")]
    EncryptionFailure,
    #[error("test with test_id {0} already exists for this patient")]
    DuplicateTestId(String),
    #[error("patient has no incomplete tests; upload their lab order form first")]
    NoIncompleteTests,
    #[error("result could not be matched to any incomplete test by collection time")]
    NoTemporalMatch,
    #[error("patient not found")]
    PatientNotFound,
    #[error("test with test_id {0} not found for this patient")]
    TestNotFound(String),
    #[error("unknown fishery: {0}")]
    UnknownFishery(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("store operation failed: {0}")]
    Store(#[from] creel_store::StoreError),
    #[error("failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
