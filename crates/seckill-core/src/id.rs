//! # Order Id Layout
//!
//! Globally unique, time-ordered 64-bit ids.
//!
//! ```text
//! ┌───┬────────────────────────────────┬────────────────────────────────┐
//! │ 0 │  seconds since 2022-01-01 UTC  │  per-tag, per-day sequence     │
//! │1b │            31 bits             │            32 bits             │
//! └───┴────────────────────────────────┴────────────────────────────────┘
//! ```
//!
//! The sequence comes from a counter in the shared key-value store keyed by
//! `icr:<tag>:<yyyy:MM:dd>`, incremented server side, so callers in different
//! processes never see the same low bits within one day. 31 bits of seconds
//! cover roughly 68 years from the epoch.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};

/// Epoch of the timestamp part: 2022-01-01T00:00:00Z.
pub const BEGIN_TIMESTAMP: i64 = 1_640_995_200;

/// Number of low bits holding the sequence.
pub const COUNT_BITS: u32 = 32;

const MAX_SEQUENCE: i64 = (1 << COUNT_BITS) - 1;

/// Builds an order id from the generation instant and the counter value.
pub fn compose(at: DateTime<Utc>, sequence: i64) -> CoreResult<i64> {
    let seconds = at.timestamp() - BEGIN_TIMESTAMP;
    if seconds < 0 {
        return Err(CoreError::ClockBeforeEpoch(at.timestamp()));
    }
    if !(0..=MAX_SEQUENCE).contains(&sequence) {
        return Err(CoreError::SequenceExhausted(sequence));
    }
    Ok((seconds << COUNT_BITS) | sequence)
}

/// Splits an id back into (seconds since epoch, sequence).
pub fn decompose(id: i64) -> (i64, i64) {
    (id >> COUNT_BITS, id & MAX_SEQUENCE)
}

/// Key of the daily counter for `tag`.
pub fn counter_key(tag: &str, at: DateTime<Utc>) -> String {
    format!("icr:{}:{}", tag, at.format("%Y:%m:%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_compose_round_trips_parts() {
        let at = Utc.with_ymd_and_hms(2026, 10, 15, 8, 30, 0).unwrap();
        let id = compose(at, 42).unwrap();

        let (seconds, seq) = decompose(id);
        assert_eq!(seconds, at.timestamp() - BEGIN_TIMESTAMP);
        assert_eq!(seq, 42);
        assert!(id > 0);
    }

    #[test]
    fn test_later_second_sorts_after_any_sequence() {
        let at = Utc.with_ymd_and_hms(2026, 10, 15, 8, 30, 0).unwrap();
        let later = at + chrono::Duration::seconds(1);

        let high_seq = compose(at, MAX_SEQUENCE).unwrap();
        let low_seq = compose(later, 1).unwrap();
        assert!(low_seq > high_seq);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let before = Utc.with_ymd_and_hms(2021, 12, 31, 23, 59, 59).unwrap();
        assert!(matches!(
            compose(before, 1),
            Err(CoreError::ClockBeforeEpoch(_))
        ));

        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            compose(at, MAX_SEQUENCE + 1),
            Err(CoreError::SequenceExhausted(MAX_SEQUENCE + 1))
        );
    }

    #[test]
    fn test_counter_key_is_per_day() {
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 23, 0, 0).unwrap();
        assert_eq!(counter_key("order", at), "icr:order:2026:03:07");
    }
}
