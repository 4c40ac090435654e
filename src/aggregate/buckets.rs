// * Time Buckets & Counter Keys
// * Derives day/hour/minute labels and the six keys every increment fans out to

use chrono::{Local, NaiveDateTime, TimeZone, Timelike};
use std::sync::RwLock;

use crate::config::TimeBasis;
use crate::ingest::PageType;

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bucket granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Hour,
    Minute,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Day, Granularity::Hour, Granularity::Minute];

    pub fn label(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Hour => "hour",
            Granularity::Minute => "min",
        }
    }

    /// Unix-seconds label of the bucket containing `at`
    ///
    /// The truncated wall-clock reading is rendered as if it were UTC, so
    /// buckets line up with local days and hours.
    pub fn bucket(&self, at: NaiveDateTime) -> i64 {
        let date = at.date();
        let truncated = match self {
            Granularity::Day => date.and_hms_opt(0, 0, 0),
            Granularity::Hour => date.and_hms_opt(at.hour(), 0, 0),
            Granularity::Minute => date.and_hms_opt(at.hour(), at.minute(), 0),
        };
        truncated.unwrap_or(at).and_utc().timestamp()
    }
}

/// Picks the instant an increment is attributed to
pub fn resolve_instant(basis: TimeBasis, event_time: &str, clock: &dyn Clock) -> NaiveDateTime {
    match basis {
        TimeBasis::Aggregation => clock.now(),
        TimeBasis::Event => parse_event_time(event_time).unwrap_or_else(|| clock.now()),
    }
}

// * Beacon `time` is unix seconds, read in local wall-clock time
fn parse_event_time(raw: &str) -> Option<NaiveDateTime> {
    let secs = raw.trim().parse::<i64>().ok()?;
    Local
        .timestamp_opt(secs, 0)
        .single()
        .map(|t| t.naive_local())
}

/// Key of the day-scoped visitor set
pub fn visitor_set_key(prefix: &str, at: NaiveDateTime) -> String {
    format!("{}{}", prefix, Granularity::Day.bucket(at))
}

/// The six counter keys for one increment: global then type-scoped, day to minute
pub fn counter_keys(kind: &str, page_type: PageType, at: NaiveDateTime) -> Vec<String> {
    let tag = page_type.tag();
    let global = Granularity::ALL
        .iter()
        .map(|g| format!("{}_{}_{}", kind, g.label(), g.bucket(at)));
    let scoped = Granularity::ALL
        .iter()
        .map(|g| format!("{}_{}_{}_{}", kind, tag, g.label(), g.bucket(at)));
    global.chain(scoped).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_bucket_labels() {
        let t = at("2024-01-15 10:42:31");
        assert_eq!(Granularity::Day.bucket(t), 1_705_276_800);
        assert_eq!(Granularity::Hour.bucket(t), 1_705_312_800);
        assert_eq!(Granularity::Minute.bucket(t), 1_705_315_320);
    }

    #[test]
    fn test_counter_keys_cover_all_dimensions() {
        let keys = counter_keys("pv", PageType::Detail, at("2024-01-15 10:42:31"));
        assert_eq!(
            keys,
            vec![
                "pv_day_1705276800",
                "pv_hour_1705312800",
                "pv_min_1705315320",
                "pv_detail_day_1705276800",
                "pv_detail_hour_1705312800",
                "pv_detail_min_1705315320",
            ]
        );
    }

    #[test]
    fn test_unclassified_keys_use_home_tag() {
        let keys = counter_keys("uv", PageType::Unclassified, at("2024-01-15 00:00:00"));
        assert_eq!(keys.len(), 6);
        assert_eq!(keys[3], "uv_home_day_1705276800");
    }

    #[test]
    fn test_visitor_set_key() {
        assert_eq!(
            visitor_set_key("uv_hpll_", at("2024-01-15 23:59:59")),
            "uv_hpll_1705276800"
        );
    }

    #[test]
    fn test_aggregation_basis_ignores_event_time() {
        let clock = ManualClock::new(at("2024-01-15 10:00:00"));
        let instant = resolve_instant(TimeBasis::Aggregation, "0", &clock);
        assert_eq!(instant, at("2024-01-15 10:00:00"));
    }

    #[test]
    fn test_event_basis_falls_back_to_clock() {
        let clock = ManualClock::new(at("2024-01-15 10:00:00"));
        assert_eq!(
            resolve_instant(TimeBasis::Event, "not-a-number", &clock),
            at("2024-01-15 10:00:00")
        );

        let expected = Local.timestamp_opt(1_600_000_000, 0).unwrap().naive_local();
        assert_eq!(resolve_instant(TimeBasis::Event, "1600000000", &clock), expected);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(at("2024-01-15 00:00:00"));
        clock.advance(chrono::Duration::days(1));
        assert_eq!(clock.now(), at("2024-01-16 00:00:00"));
    }
}
