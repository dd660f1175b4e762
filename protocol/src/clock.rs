//! Trusted time source.
//!
//! Every time-gated rule (interest accrual, due dates, grace periods,
//! liquidation deadlines, request expiry) is evaluated against a [`Clock`]
//! at call time. There are no timers: the ledger never wakes itself up.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::config::SECONDS_PER_DAY;

/// Monotonic source of UNIX timestamps in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock time via `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// A clock that only moves when told to. Used by tests and the scenario
/// runner to step through loan lifecycles in simulated days.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Move forward by `secs`. Negative values are ignored; time never
    /// runs backwards.
    pub fn advance_secs(&self, secs: i64) {
        if secs > 0 {
            self.now.fetch_add(secs, Ordering::SeqCst);
        }
    }

    pub fn advance_days(&self, days: i64) {
        self.advance_secs(days.saturating_mul(SECONDS_PER_DAY));
    }

    /// Jump to `ts` if it is later than the current reading.
    pub fn set(&self, ts: i64) {
        self.now.fetch_max(ts, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Whole days elapsed between two timestamps. Negative spans count as zero.
pub fn days_between(start: i64, end: i64) -> u64 {
    if end <= start {
        return 0;
    }
    ((end - start) / SECONDS_PER_DAY) as u64
}

/// RFC 3339 rendering for log lines. Out-of-range values fall back to the
/// raw number.
pub fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance_days(2);
        assert_eq!(clock.now(), 1_000 + 2 * SECONDS_PER_DAY);
    }

    #[test]
    fn manual_clock_never_goes_back() {
        let clock = ManualClock::new(5_000);
        clock.advance_secs(-100);
        clock.set(10);
        assert_eq!(clock.now(), 5_000);
        clock.set(6_000);
        assert_eq!(clock.now(), 6_000);
    }

    #[test]
    fn days_between_truncates() {
        assert_eq!(days_between(0, SECONDS_PER_DAY - 1), 0);
        assert_eq!(days_between(0, SECONDS_PER_DAY), 1);
        assert_eq!(days_between(0, 30 * SECONDS_PER_DAY + 5), 30);
        assert_eq!(days_between(100, 50), 0);
    }

    #[test]
    fn system_clock_is_after_2024() {
        assert!(SystemClock.now() > 1_704_067_200);
    }

    #[test]
    fn timestamps_render_as_rfc3339() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
    }
}
