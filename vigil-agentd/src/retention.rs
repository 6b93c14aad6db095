//! Retention estimation for one storage tier.
//!
//! The disk-bound estimate is a linear extrapolation from the observed
//! fill rate: if X seconds of data consumed Y% of capacity, 100% holds
//! X * 100/Y seconds. The administrator's configured retention cap, when
//! set, bounds that estimate from above - whichever constraint binds
//! first determines actual retention.

use crate::storage::StorageTierStats;

/// Seconds -> "2 days, 3 hours, 1 minute". Zero-valued units are
/// skipped; an input of 0 yields the empty string and callers own the
/// "no duration" display.
pub fn humanize_seconds(total: u64) -> String {
    let days = total / 86_400;
    let mut rem = total % 86_400;
    let hours = rem / 3_600;
    rem %= 3_600;
    let minutes = rem / 60;
    let seconds = rem % 60;

    let mut parts = Vec::with_capacity(4);
    for (value, unit) in [
        (days, "day"),
        (hours, "hour"),
        (minutes, "minute"),
        (seconds, "second"),
    ] {
        if value > 0 {
            let plural = if value == 1 { "" } else { "s" };
            parts.push(format!("{value} {unit}{plural}"));
        }
    }
    parts.join(", ")
}

/// What the estimator could derive for one tier. `None` means the
/// quantity is undefined for this tier and must stay out of the report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetentionEstimate {
    pub used_percent: f64,
    pub retention_so_far: Option<i64>,
    pub space_bound: Option<i64>,
    pub requested: Option<i64>,
    pub expected: Option<i64>,
}

pub fn estimate(stats: &StorageTierStats, now_unix: i64) -> RetentionEstimate {
    let used = stats.disk_used_bytes;
    let max = stats.disk_max_bytes;
    let used_percent = if used > 0 && max > 0 {
        used as f64 * 100.0 / max as f64
    } else {
        0.0
    };

    if stats.first_sample_unix == 0 {
        // No data yet: percentage only, no retention figures at all.
        return RetentionEstimate { used_percent, ..Default::default() };
    }

    let so_far = now_unix - stats.first_sample_unix;
    let mut space_bound = None;
    let mut requested = None;
    let mut expected = None;

    if used > 0 || max > 0 {
        requested = (stats.max_retention_seconds > 0).then_some(stats.max_retention_seconds);
        if used_percent > 0.0 {
            let space = (so_far as f64 * 100.0 / used_percent) as i64;
            space_bound = Some(space);
            expected = Some(match requested {
                Some(cap) => space.min(cap),
                None => space,
            });
        } else {
            // Fill-rate extrapolation is undefined at 0% used; the
            // configured cap is then the only known ceiling.
            expected = requested;
        }
    }

    RetentionEstimate {
        used_percent,
        retention_so_far: Some(so_far),
        space_bound,
        requested,
        expected,
    }
}
