//! Domain data model for the creel patient-record system.
//!
//! These are the plaintext shapes: what a patient record looks like before
//! field encryption and after decryption. The encrypted envelope is a
//! `serde_json::Value` and never appears here.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a completed SARS-CoV-2 test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestResult {
    #[serde(rename = "POSITIVE")]
    Positive,
    #[serde(rename = "NEGATIVE")]
    Negative,
    #[serde(rename = "INVALID")]
    Invalid,
    #[serde(rename = "CANCELED")]
    Canceled,
    #[serde(rename = "NOT_TESTED")]
    NotTested,
}

impl TestResult {
    /// Wire-format string, as it appears in stored documents and exports.
    pub fn as_wire(self) -> &'static str {
        match self {
            TestResult::Positive => "POSITIVE",
            TestResult::Negative => "NEGATIVE",
            TestResult::Invalid => "INVALID",
            TestResult::Canceled => "CANCELED",
            TestResult::NotTested => "NOT_TESTED",
        }
    }

    /// Parse a wire string, tolerating case and surrounding whitespace.
    ///
    /// Result uploads arrive from OCR and CSV pipelines that are sloppy
    /// about casing, so `"positive"` and `"Positive "` both parse.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" => Some(TestResult::Positive),
            "NEGATIVE" => Some(TestResult::Negative),
            "INVALID" => Some(TestResult::Invalid),
            "CANCELED" => Some(TestResult::Canceled),
            "NOT_TESTED" | "NOT TESTED" => Some(TestResult::NotTested),
            _ => None,
        }
    }
}

fn default_specimen_type() -> String {
    "NP-Nasopharyngeal swab".to_string()
}

/// A single test for one patient.
///
/// A test is created *incomplete* at lab-slip intake, when only the
/// collection timestamp is known. It is completed in place when a result
/// upload is reconciled against it, which fills in `test_id`, the
/// performed/reported timestamps and the result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    #[serde(default = "default_specimen_type")]
    pub specimen_type: String,
    /// Collection time as listed on the lab slip.
    #[serde(default)]
    pub lab_slip_collection_datetime: Option<DateTime<Utc>>,
    /// External lab/device identifier. Absent until a result arrives.
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub test_performed_datetime: Option<DateTime<Utc>>,
    /// When the result reached this system (CSV, OCR or API upload).
    #[serde(default)]
    pub test_reported_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<TestResult>,
}

impl TestRecord {
    /// A test is incomplete iff no result has been reconciled onto it yet.
    pub fn is_incomplete(&self) -> bool {
        self.test_id.is_none()
    }

    /// Fresh lab-slip placeholder: collection time only.
    pub fn from_lab_slip(collected_at: DateTime<Utc>) -> Self {
        TestRecord {
            specimen_type: default_specimen_type(),
            lab_slip_collection_datetime: Some(collected_at),
            test_id: None,
            test_performed_datetime: None,
            test_reported_datetime: None,
            result: None,
        }
    }
}

/// Physical address sub-object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
}

/// One patient with their full test history.
///
/// `patient_id` and `pid_hash` are derived server-side; callers may submit
/// them but the service overwrites both during creation. `pid_hash` is the
/// store's only lookup key and must always equal the SHA3-512 hex digest of
/// the current `patient_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    // Identifying info
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub ssn: Option<String>,
    pub dob: NaiveDate,

    // Demographics
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub race_ethnicity: Option<String>,
    pub hispanic: String,

    // Contact info
    #[serde(default)]
    pub home_phone: Option<String>,
    #[serde(default)]
    pub cell_phone: Option<String>,
    #[serde(default)]
    pub local_phone: Option<String>,
    #[serde(default)]
    pub physical_address: Option<Address>,
    #[serde(default)]
    pub email_address: Option<String>,
    /// SHA3-512 of the normalised email; plaintext in storage for search.
    #[serde(default)]
    pub base_email_hash: Option<String>,

    // Intake questions
    pub insurance: String,
    pub been_here_before: String,

    // Site
    pub fishery_name: String,
    /// Two-digit site code, derived from `fishery_name`.
    #[serde(default)]
    pub fishery_id: Option<String>,

    #[serde(default)]
    pub test_results: Vec<TestRecord>,

    // Derived identity
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub pid_hash: Option<String>,
}

impl PatientRecord {
    /// Indices and copies of the tests still waiting for a result.
    pub fn incomplete_tests(&self) -> Vec<(usize, TestRecord)> {
        self.test_results
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_incomplete())
            .map(|(i, t)| (i, t.clone()))
            .collect()
    }

    /// Whether any test already carries the given external `test_id`.
    pub fn has_test_id(&self, test_id: &str) -> bool {
        self.test_results
            .iter()
            .any(|t| t.test_id.as_deref() == Some(test_id))
    }
}

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace.
    #[error("text cannot be empty")]
    Empty,
}

/// A string that is guaranteed non-empty after trimming.
///
/// Used for inputs where an empty value is always a caller mistake, such as
/// presented master-key strings and path-supplied patient ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}
