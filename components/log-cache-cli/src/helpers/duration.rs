//! Compact duration rendering shared by the timer renderer and the meta table.
//!
//! Produces the familiar `1s`, `1m30s`, `2h0m0.5s`, `1.5ms` forms.

use std::fmt::Write;
use std::time::Duration;

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Render a signed nanosecond span.
pub fn format_nanos(nanos: i64) -> String {
    let magnitude = nanos.unsigned_abs();

    let body = if magnitude == 0 {
        return "0s".to_string();
    } else if magnitude < NANOS_PER_MICRO {
        format!("{magnitude}ns")
    } else if magnitude < NANOS_PER_MILLI {
        format!("{}µs", with_fraction(magnitude, NANOS_PER_MICRO))
    } else if magnitude < NANOS_PER_SEC {
        format!("{}ms", with_fraction(magnitude, NANOS_PER_MILLI))
    } else {
        let secs = magnitude / NANOS_PER_SEC;
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = (secs % 60) * NANOS_PER_SEC + magnitude % NANOS_PER_SEC;

        let mut out = String::new();
        if hours > 0 {
            let _ = write!(out, "{hours}h");
        }
        if hours > 0 || minutes > 0 {
            let _ = write!(out, "{minutes}m");
        }
        let _ = write!(out, "{}s", with_fraction(seconds, NANOS_PER_SEC));
        out
    };

    if nanos < 0 { format!("-{body}") } else { body }
}

/// Render an unsigned [`Duration`].
pub fn format_duration(duration: Duration) -> String {
    format_nanos(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
}

/// `value / unit` with the remainder as a trailing-zero-trimmed decimal fraction.
fn with_fraction(value: u64, unit: u64) -> String {
    let whole = value / unit;
    let rem = value % unit;
    if rem == 0 {
        return whole.to_string();
    }

    let width = unit.ilog10() as usize;
    let fraction = format!("{rem:0width$}");
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_seconds() {
        assert_eq!(format_nanos(1_000_000_000), "1s");
        assert_eq!(format_nanos(59 * 1_000_000_000), "59s");
    }

    #[test]
    fn zero_is_zero_seconds() {
        assert_eq!(format_nanos(0), "0s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn minutes_and_hours() {
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(705)), "11m45s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(
            format_duration(Duration::from_secs(7200) + Duration::from_millis(500)),
            "2h0m0.5s"
        );
    }

    #[test]
    fn sub_second_units() {
        assert_eq!(format_nanos(999), "999ns");
        assert_eq!(format_nanos(1_000), "1µs");
        assert_eq!(format_nanos(1_500_000), "1.5ms");
        assert_eq!(format_nanos(250_000_000), "250ms");
        assert_eq!(format_nanos(1_500_000_000), "1.5s");
    }

    #[test]
    fn negative_spans_keep_sign() {
        assert_eq!(format_nanos(-1_000_000_000), "-1s");
        assert_eq!(format_nanos(-1_500), "-1.5µs");
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        assert!(format_nanos(i64::MIN).starts_with('-'));
        assert!(format_nanos(i64::MAX).ends_with('s'));
    }
}
