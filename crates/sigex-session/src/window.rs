//! Session window definitions and clock math.
//!
//! All time arithmetic happens in the configured fixed reference offset,
//! never in the host's local zone. The predicates here are pure functions
//! of an instant, so the monitor's behavior is fully testable with fixed
//! timestamps.

use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};

/// A named trading session interval in the reference timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    /// Window name, matched against signal session tags.
    pub name: String,
    /// Session start, reference-timezone time of day.
    pub start: NaiveTime,
    /// Session end, reference-timezone time of day.
    pub end: NaiveTime,
    /// Cancellation grace period after the end, in seconds.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u32,
}

/// Session monitoring configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Fixed reference offset from UTC, in minutes. Negative is west.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    /// Monitor tick interval in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Configured session windows.
    #[serde(default = "default_windows")]
    pub windows: Vec<SessionWindow>,
}

fn default_utc_offset_minutes() -> i32 {
    -300
}

fn default_grace_secs() -> u32 {
    300
}

fn default_tick_interval_ms() -> u64 {
    30_000
}

fn default_windows() -> Vec<SessionWindow> {
    [
        ("morning", (3, 0), (4, 0)),
        ("midday", (10, 0), (11, 0)),
        ("afternoon", (14, 0), (15, 0)),
    ]
    .into_iter()
    .filter_map(|(name, (sh, sm), (eh, em))| {
        Some(SessionWindow {
            name: name.to_string(),
            start: NaiveTime::from_hms_opt(sh, sm, 0)?,
            end: NaiveTime::from_hms_opt(eh, em, 0)?,
            grace_secs: default_grace_secs(),
        })
    })
    .collect()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
            tick_interval_ms: default_tick_interval_ms(),
            windows: default_windows(),
        }
    }
}

/// One specific occurrence of a window: its name plus the reference-zone
/// date it closed on. Keys the fired marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OccurrenceKey {
    pub window: String,
    pub date: NaiveDate,
}

impl SessionConfig {
    /// The configured reference offset. Falls back to UTC when the
    /// configured minutes are out of range.
    #[must_use]
    pub fn reference_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// If `now` falls inside a window's cancellation zone
    /// `[end, end + grace)`, returns the occurrence key for that zone.
    ///
    /// Compared as instants, not times of day: a zone whose grace period
    /// runs past midnight still matches after the rollover, keyed by the
    /// date the window ended on.
    #[must_use]
    pub fn cancel_zone_at(&self, window: &SessionWindow, now: DateTime<Utc>) -> Option<OccurrenceKey> {
        let local = now.with_timezone(&self.reference_offset());
        let now_naive = local.naive_local();
        let grace = Duration::seconds(i64::from(window.grace_secs));

        // The occurrence ending today, or yesterday's if its grace period
        // spills past midnight.
        for days_back in 0..=1 {
            let Some(date) = local.date_naive().checked_sub_days(Days::new(days_back)) else {
                continue;
            };
            let end = date.and_time(window.end);
            if now_naive >= end && now_naive < end + grace {
                return Some(OccurrenceKey {
                    window: window.name.clone(),
                    date,
                });
            }
        }
        None
    }

    /// True if `now` is inside the window `[start, end)` in the
    /// reference timezone.
    #[must_use]
    pub fn in_window_at(&self, window: &SessionWindow, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.reference_offset());
        let t = local.time();
        window.start <= t && t < window.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> SessionConfig {
        SessionConfig::default()
    }

    fn morning(config: &SessionConfig) -> SessionWindow {
        config.windows[0].clone()
    }

    #[test]
    fn test_default_windows() {
        let cfg = config();
        assert_eq!(cfg.windows.len(), 3);
        assert_eq!(cfg.windows[0].name, "morning");
        assert_eq!(cfg.utc_offset_minutes, -300);
        assert_eq!(cfg.windows[0].grace_secs, 300);
    }

    #[test]
    fn test_in_window_reference_zone() {
        // Morning session runs 03:00-04:00 at UTC-5, i.e. 08:00-09:00 UTC.
        let cfg = config();
        let window = morning(&cfg);

        let inside = Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap();
        assert!(cfg.in_window_at(&window, inside));

        let before = Utc.with_ymd_and_hms(2024, 3, 15, 7, 59, 59).unwrap();
        assert!(!cfg.in_window_at(&window, before));

        let after = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        assert!(!cfg.in_window_at(&window, after));
    }

    #[test]
    fn test_cancel_zone_bounds() {
        // Window end 04:00 local = 09:00 UTC; grace 300s.
        let cfg = config();
        let window = morning(&cfg);

        let at_end = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        assert!(cfg.cancel_zone_at(&window, at_end).is_some());

        let mid_grace = Utc.with_ymd_and_hms(2024, 3, 15, 9, 2, 30).unwrap();
        let key = cfg.cancel_zone_at(&window, mid_grace).unwrap();
        assert_eq!(key.window, "morning");
        assert_eq!(key.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());

        let past_grace = Utc.with_ymd_and_hms(2024, 3, 15, 9, 5, 0).unwrap();
        assert!(cfg.cancel_zone_at(&window, past_grace).is_none());

        let before_end = Utc.with_ymd_and_hms(2024, 3, 15, 8, 59, 59).unwrap();
        assert!(cfg.cancel_zone_at(&window, before_end).is_none());
    }

    #[test]
    fn test_occurrence_key_distinct_per_day() {
        let cfg = config();
        let window = morning(&cfg);
        let day1 = Utc.with_ymd_and_hms(2024, 3, 15, 9, 1, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2024, 3, 16, 9, 1, 0).unwrap();
        assert_ne!(
            cfg.cancel_zone_at(&window, day1),
            cfg.cancel_zone_at(&window, day2)
        );
    }

    #[test]
    fn test_cancel_zone_spans_midnight() {
        // Window ends 23:58 local with a 300 s grace: the zone runs to
        // 00:03 the next local day and must key on the end date.
        let cfg = SessionConfig {
            windows: vec![SessionWindow {
                name: "close".to_string(),
                start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(23, 58, 0).unwrap(),
                grace_secs: 300,
            }],
            ..SessionConfig::default()
        };
        let window = cfg.windows[0].clone();

        // 23:59 local on the 15th (UTC-5 = 04:59 UTC on the 16th).
        let before_midnight = Utc.with_ymd_and_hms(2024, 3, 16, 4, 59, 0).unwrap();
        let key = cfg.cancel_zone_at(&window, before_midnight).unwrap();
        assert_eq!(key.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());

        // 00:01 local on the 16th: still the same occurrence.
        let after_midnight = Utc.with_ymd_and_hms(2024, 3, 16, 5, 1, 0).unwrap();
        assert_eq!(
            cfg.cancel_zone_at(&window, after_midnight),
            Some(key)
        );

        // 00:04 local: past the grace period.
        let past = Utc.with_ymd_and_hms(2024, 3, 16, 5, 4, 0).unwrap();
        assert_eq!(cfg.cancel_zone_at(&window, past), None);
    }

    #[test]
    fn test_reference_zone_ignores_utc_date_shift() {
        // 23:30 local at UTC-5 is 04:30 UTC next day; the occurrence date
        // must follow the reference zone, not UTC.
        let cfg = SessionConfig {
            windows: vec![SessionWindow {
                name: "late".to_string(),
                start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(23, 30, 0).unwrap(),
                grace_secs: 300,
            }],
            ..SessionConfig::default()
        };
        let window = cfg.windows[0].clone();
        let now = Utc.with_ymd_and_hms(2024, 3, 16, 4, 31, 0).unwrap();
        let key = cfg.cancel_zone_at(&window, now).unwrap();
        assert_eq!(key.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }
}
