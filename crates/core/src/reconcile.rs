//! Reconciliation of incoming results against incomplete tests.
//!
//! A lab-slip upload creates a test with only a collection time; the
//! matching result arrives later and has to be attached to the right
//! placeholder. The heuristic: for each incomplete test with a known
//! collection time, take the signed delta in seconds between the result's
//! performed time and the slip's collection time. A candidate is eligible
//! when the result occurs at or after collection, or precedes it by less
//! than three days (clock skew and hand-written timestamps happen). The
//! eligible candidate with the smallest delta wins; on an exact tie the
//! lowest original index wins.
//!
//! This is a greedy nearest-match for the common case of one result per
//! call, not a global assignment across several simultaneous results.

use chrono::{DateTime, Utc};
use creel_types::TestRecord;

/// How far a result's performed time may precede the slip's collection
/// time and still be considered the same test.
const FUTURE_TOLERANCE_SECS: i64 = 60 * 60 * 24 * 3;

/// Pick the incomplete test an incoming result belongs to.
///
/// `candidates` carries each test's original index in the patient's list;
/// the returned index is that original position. Candidates without a
/// collection time are skipped. Returns `None` when nothing is eligible.
pub fn match_incomplete_test(
    candidates: &[(usize, TestRecord)],
    performed_at: DateTime<Utc>,
) -> Option<usize> {
    let mut best_idx: Option<usize> = None;
    let mut best_delta = i64::MAX;

    for (idx, test) in candidates {
        let Some(collected_at) = test.lab_slip_collection_datetime else {
            continue;
        };
        let delta = (performed_at - collected_at).num_seconds();
        let eligible = delta >= 0 || delta.abs() < FUTURE_TOLERANCE_SECS;
        // Strict `<` keeps the first-seen candidate on a tie, which is the
        // lowest original index.
        if eligible && delta < best_delta {
            best_idx = Some(*idx);
            best_delta = delta;
        }
    }

    best_idx
}
