//! Clock-skew discipline.
//!
//! Two comparison regimes coexist in chain verification. Instants embedded
//! in the chain (an `expires` against its parent's, a proof `created`
//! against its parent's) are compared exactly: both values were fixed when
//! the chain was signed, so no clock is involved. A live clock compared
//! against an embedded instant goes through [`compare_time`], which folds
//! the configured skew tolerance into the comparison. Mixing the two up is
//! a latent bug; keep embedded-vs-embedded on plain `Ord`.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

/// Compare two instants under a skew tolerance.
///
/// Returns the ordering of `t1` against `t2`, except that any difference
/// within `max_clock_skew` seconds collapses to [`Ordering::Equal`].
#[must_use]
pub fn compare_time(t1: DateTime<Utc>, t2: DateTime<Utc>, max_clock_skew: u64) -> Ordering {
    compare_millis(
        t1.timestamp_millis(),
        t2.timestamp_millis(),
        max_clock_skew,
    )
}

/// Millisecond-valued form of [`compare_time`], also used for comparing
/// durations (TTL bounds) under the same tolerance.
#[must_use]
pub fn compare_millis(t1: i64, t2: i64, max_clock_skew: u64) -> Ordering {
    let skew = i64::try_from(max_clock_skew)
        .unwrap_or(i64::MAX / 1000)
        .saturating_mul(1000);
    let delta = t1.saturating_sub(t2);
    if delta.abs() <= skew {
        Ordering::Equal
    } else if delta < 0 {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}
