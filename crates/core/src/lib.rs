//! # Creel Core
//!
//! Core business logic for the creel patient-record system:
//! - Recursive field encryption of patient documents with plaintext
//!   search keys
//! - Deterministic patient-id derivation and store-backed uniqueness
//! - Reconciliation of asynchronous lab results against lab-slip tests
//! - Credential gating of every decrypting/mutating operation
//!
//! **No API concerns**: HTTP routing, envelopes and transport live in
//! `api-rest`; persistence backends live in `creel-store`.

pub mod alert;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod identity;
pub mod patient;
pub mod reconcile;
pub mod sites;

pub use alert::{Alerter, LogAlerter, NullAlerter};
pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use gate::CredentialGate;
pub use patient::{AddOutcome, PatientService};
