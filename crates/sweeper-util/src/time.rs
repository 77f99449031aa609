//! Time utilities for sweeper
//!
//! All persisted timestamps are whole epoch seconds. Wall-clock access goes
//! through [`now`] so the date-sensitive policy rules can be exercised.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `SWEEPER_MOCK_TIME` environment variable overrides
//! the system time for every time-sensitive decision (end-of-term detection,
//! account ages, log maintenance).
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-04-30 18:00:00`)

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "SWEEPER_MOCK_TIME";

/// Seconds since the Unix epoch
pub type EpochSeconds = i64;

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
pub const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let raw = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            let parsed = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .and_then(|naive| Local.from_local_datetime(&naive).single());
            match parsed {
                Some(mock_dt) => {
                    let offset = mock_dt.signed_duration_since(Local::now());
                    tracing::info!(
                        mock_time = %raw,
                        offset_secs = offset.num_seconds(),
                        "Mock time enabled"
                    );
                    Some(offset)
                }
                None => {
                    tracing::warn!(
                        mock_time = %raw,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time, using system time"
                    );
                    None
                }
            }
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Current local time, respecting mock time in debug builds.
pub fn now() -> DateTime<Local> {
    let real_now = Local::now();
    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Current time as epoch seconds.
pub fn now_epoch() -> EpochSeconds {
    now().timestamp()
}

/// Convert whole days to seconds.
pub fn days(n: i64) -> i64 {
    n * SECONDS_PER_DAY
}

/// Convert whole weeks to seconds.
pub fn weeks(n: i64) -> i64 {
    n * SECONDS_PER_WEEK
}

/// Timestamp prefix used by audit log lines.
pub fn format_log_timestamp(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Compact stamp used in rotated backup file names.
pub fn format_backup_stamp(dt: &DateTime<Local>) -> String {
    dt.format("%Y%m%d%H%M%S").to_string()
}

/// Human-readable age, e.g. `3d 4h`.
pub fn format_age(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let d = seconds / SECONDS_PER_DAY;
    let h = (seconds % SECONDS_PER_DAY) / 3600;
    if d > 0 {
        format!("{}d {}h", d, h)
    } else {
        format!("{}h {}m", h, (seconds % 3600) / 60)
    }
}
