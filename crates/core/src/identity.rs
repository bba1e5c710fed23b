//! Patient identifier derivation and uniqueness resolution.
//!
//! A patient id is a deterministic function of demographics: two-digit
//! site code, surname initial, given-name initial, then the birth date as
//! zero-padded `MMDDYY`. Site 33, "Anderson", "Briana", born 1990-01-01
//! derives `33AB010190`.
//!
//! Because the derivation is intentionally lossy, two different physical
//! patients can derive the same id. `ensure_pid_unique` resolves that by
//! probing the store and suffixing `_1`, `_2`, … until the hash is unused.
//! The store is the single source of truth; there is no in-memory counter.
//!
//! Known limitation: if two uploads race for the *same* physical patient,
//! this scheme cannot tell "same patient re-submitted" from "different
//! patient, same derived id" and will allocate a suffix. That ambiguity is
//! accepted rather than silently resolved.

use chrono::{Datelike, NaiveDate};
use creel_store::DocumentStore;

use crate::crypto::hash_string;
use crate::error::{CoreError, CoreResult};

fn initial_of(name: &str, which: &str) -> CoreResult<char> {
    name.trim()
        .chars()
        .next()
        .and_then(|c| c.to_uppercase().next())
        .ok_or_else(|| CoreError::InvalidInput(format!("{which} name cannot be empty")))
}

/// Derive the base patient id. Pure and deterministic: identical inputs
/// always produce an identical id, before disambiguation.
pub fn derive_patient_id(
    site_code: &str,
    last_name: &str,
    first_name: &str,
    dob: NaiveDate,
) -> CoreResult<String> {
    let site = site_code.trim();
    if site.is_empty() || site.len() > 2 || !site.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::InvalidInput(format!(
            "site code must be one or two digits, got {site:?}"
        )));
    }

    let surname = initial_of(last_name, "last")?;
    let given = initial_of(first_name, "first")?;

    Ok(format!(
        "{site:0>2}{surname}{given}{:02}{:02}{:02}",
        dob.month(),
        dob.day(),
        dob.year() % 100
    ))
}

/// Hash a patient id for indexed lookup.
///
/// Ids are uppercased before hashing at every lookup site, so a
/// case-mangled id presented by a caller still finds the record.
pub fn pid_hash_for(patient_id: &str) -> String {
    hash_string(&patient_id.trim().to_uppercase())
}

/// Normalise an email for the searchable `base_email_hash`: lowercase,
/// trimmed, with any `+tag` stripped from the local part.
pub fn normalize_email(email: &str) -> String {
    let lower = email.trim().to_lowercase();
    match lower.split_once('@') {
        Some((local, domain)) => {
            let base_local = local.split('+').next().unwrap_or(local);
            format!("{base_local}@{domain}")
        }
        None => lower,
    }
}

/// Searchable hash of the normalised email address.
pub fn base_email_hash(email: &str) -> String {
    hash_string(&normalize_email(email))
}

/// Resolve a derived id to one whose hash is unused in the store.
///
/// Returns `(final_id, final_hash, was_altered)`. Safe under concurrent
/// calls for *different* physical patients as long as each insert lands
/// before the next probe; see the module docs for the accepted race.
pub async fn ensure_pid_unique(
    store: &dyn DocumentStore,
    base_pid: &str,
) -> CoreResult<(String, String, bool)> {
    let base = base_pid.trim().to_uppercase();
    if base.is_empty() {
        return Err(CoreError::InvalidInput("patient id cannot be empty".into()));
    }

    let mut pid = base.clone();
    let mut pid_hash = pid_hash_for(&pid);
    let mut increment = 0u32;

    while store.find_by_hash(&pid_hash).await?.is_some() {
        increment += 1;
        pid = format!("{base}_{increment}");
        pid_hash = pid_hash_for(&pid);
    }

    Ok((pid, pid_hash, increment > 0))
}
