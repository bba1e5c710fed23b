//! Outbound response envelopes.
//!
//! Every handler answers HTTP 200 with either a success envelope
//! `{data, code, message}` or an error envelope `{error, code, message}`;
//! the application code travels inside the envelope, which is the contract
//! the existing frontends expect.

use creel_core::CoreError;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct SuccessEnvelope {
    pub data: Vec<Value>,
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ApiEnvelope {
    Success(SuccessEnvelope),
    Error(ErrorEnvelope),
}

impl ApiEnvelope {
    pub fn ok(data: Value, message: impl Into<String>) -> Self {
        ApiEnvelope::Success(SuccessEnvelope {
            data: vec![data],
            code: 200,
            message: message.into(),
        })
    }
}

/// Map a core failure onto the error envelope.
///
/// Credential failures are deliberately uniform: wrong format, wrong value
/// and missing record all produce the same message.
pub fn envelope_for_error(err: &CoreError) -> ErrorEnvelope {
    let (error, code, message) = match err {
        CoreError::InvalidCredential | CoreError::InvalidKeyMaterial => (
            "Invalid Master Key",
            400,
            "Your key was invalid.".to_string(),
        ),
        CoreError::DecryptionFailure => (
            "Decryption Failure",
            400,
            "Stored record could not be decrypted with the supplied key.".to_string(),
        ),
        CoreError::EncryptionFailure => (
            "Encryption Failure",
            500,
            "Record could not be encrypted.".to_string(),
        ),
        CoreError::DuplicateTestId(_) => {
            ("Test Already Uploaded", 400, err.to_string())
        }
        CoreError::NoIncompleteTests => {
            ("No Corresponding Lab Slip", 400, err.to_string())
        }
        CoreError::NoTemporalMatch => ("Unmatched Result", 400, err.to_string()),
        CoreError::PatientNotFound => ("Patient Not Found", 404, err.to_string()),
        CoreError::TestNotFound(_) => ("Test Not Found", 404, err.to_string()),
        CoreError::UnknownFishery(_) | CoreError::InvalidInput(_) => {
            ("Invalid Input", 400, err.to_string())
        }
        CoreError::Serialization(_) => ("Malformed Record", 400, err.to_string()),
        CoreError::Store(_) => (
            "Store Failure",
            500,
            "The operation could not be completed.".to_string(),
        ),
    };
    ErrorEnvelope {
        error: error.to_string(),
        code,
        message,
    }
}
