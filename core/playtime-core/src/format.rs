//! Human-readable durations.
//!
//! Both formats truncate to whole seconds and drop leading zero units.

const SECOND_MS: u64 = 1_000;
const MINUTE_SECS: u64 = 60;
const HOUR_SECS: u64 = 60 * MINUTE_SECS;
const DAY_SECS: u64 = 24 * HOUR_SECS;

struct Parts {
    days: u64,
    hours: u64,
    minutes: u64,
    seconds: u64,
}

fn split(duration_ms: u64) -> Parts {
    let total = duration_ms / SECOND_MS;
    Parts {
        days: total / DAY_SECS,
        hours: total % DAY_SECS / HOUR_SECS,
        minutes: total % HOUR_SECS / MINUTE_SECS,
        seconds: total % MINUTE_SECS,
    }
}

/// Text for the live display, e.g. `2h 5m 9s`.
pub fn display_text(duration_ms: u64) -> String {
    let p = split(duration_ms);
    if p.days > 0 {
        format!("{}d {}h {}m", p.days, p.hours, p.minutes)
    } else if p.hours > 0 {
        format!("{}h {}m {}s", p.hours, p.minutes, p.seconds)
    } else if p.minutes > 0 {
        format!("{}m {}s", p.minutes, p.seconds)
    } else {
        format!("{}s", p.seconds)
    }
}

/// Coarser text for reports, e.g. `2h 5m`.
pub fn summary_text(duration_ms: u64) -> String {
    let p = split(duration_ms);
    if p.days > 0 {
        format!("{}d {}h {}m", p.days, p.hours, p.minutes)
    } else if p.hours > 0 {
        format!("{}h {}m", p.hours, p.minutes)
    } else if p.minutes > 0 {
        format!("{}m {}s", p.minutes, p.seconds)
    } else {
        format!("{}s", p.seconds)
    }
}
