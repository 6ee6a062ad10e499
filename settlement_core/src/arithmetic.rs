//! Arithmetic primitives shared by the curves, the ledger and the scheduler.
//!
//! Timestamps are epoch milliseconds (`u64`). Resource amounts are `f64`
//! and are never rounded here except where a function says so.

use crate::MAX_LEVEL;

/// Milliseconds per second.
pub const MS_PER_SEC: u64 = 1_000;

/// Convert a duration in seconds to whole milliseconds, rounding to nearest.
/// Negative or non-finite inputs collapse to zero.
pub fn secs_to_ms(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * MS_PER_SEC as f64).round() as u64
}

/// Absolute end time of a job started at `now` lasting `duration_ms`.
/// Saturates instead of wrapping.
pub fn end_at(now: u64, duration_ms: u64) -> u64 {
    now.saturating_add(duration_ms)
}

/// Milliseconds left until `end_at`, zero once it has passed.
pub fn remaining_ms(end_at: u64, now: u64) -> u64 {
    end_at.saturating_sub(now)
}

/// Clamp an untrusted level into `1..=MAX_LEVEL`.
pub fn clamp_level(level: i64) -> u8 {
    level.clamp(1, MAX_LEVEL as i64) as u8
}

/// True when `fraction` is a finite number in `0.0..=1.0`.
pub fn is_unit_fraction(fraction: f64) -> bool {
    fraction.is_finite() && (0.0..=1.0).contains(&fraction)
}

/// True when `fraction` is a finite number strictly between 0 and 1.
pub fn is_open_unit_fraction(fraction: f64) -> bool {
    fraction.is_finite() && fraction > 0.0 && fraction < 1.0
}

/// Validate that an id matches `[a-zA-Z0-9_-]+`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_to_ms() {
        assert_eq!(secs_to_ms(1.5), 1_500);
        assert_eq!(secs_to_ms(0.0004), 0);
        assert_eq!(secs_to_ms(-3.0), 0);
        assert_eq!(secs_to_ms(f64::NAN), 0);
    }

    #[test]
    fn test_end_at_saturates() {
        assert_eq!(end_at(10, 5), 15);
        assert_eq!(end_at(u64::MAX - 1, 5), u64::MAX);
    }

    #[test]
    fn test_remaining_ms() {
        assert_eq!(remaining_ms(1_000, 400), 600);
        assert_eq!(remaining_ms(1_000, 1_000), 0);
        assert_eq!(remaining_ms(1_000, 5_000), 0);
    }

    #[test]
    fn test_clamp_level() {
        assert_eq!(clamp_level(0), 1);
        assert_eq!(clamp_level(7), 7);
        assert_eq!(clamp_level(99), MAX_LEVEL);
    }

    #[test]
    fn test_fractions() {
        assert!(is_unit_fraction(0.0));
        assert!(is_unit_fraction(1.0));
        assert!(!is_unit_fraction(1.01));
        assert!(!is_open_unit_fraction(0.0));
        assert!(!is_open_unit_fraction(1.0));
        assert!(is_open_unit_fraction(0.25));
        assert!(!is_open_unit_fraction(f64::INFINITY));
    }

    #[test]
    fn test_is_valid_id() {
        assert!(is_valid_id("plot_a"));
        assert!(is_valid_id("A-B_c-3"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("plot with spaces"));
    }
}
