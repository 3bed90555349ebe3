//! Leaderboard periods and ordering.
//!
//! A gym ranking orders members by the points they earned from check-ins
//! at that gym inside the ranking window, highest first. Ties fall back to
//! the user id so the order is stable across stores.

use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{AsRefStr, Display, EnumString};

use super::RankingEntry;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RankingPeriod {
    #[default]
    Monthly,
    Quarterly,
    Seasonal,
    Annual,
}

impl RankingPeriod {
    pub fn months(&self) -> u32 {
        match self {
            RankingPeriod::Monthly => 1,
            RankingPeriod::Quarterly => 3,
            RankingPeriod::Seasonal => 6,
            RankingPeriod::Annual => 12,
        }
    }

    /// Start of the trailing window ending at `now`
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_months(Months::new(self.months()))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Midnight UTC of the most recent `week_start` day (today included)
pub fn week_start(now: DateTime<Utc>, week_start: Weekday) -> DateTime<Utc> {
    let today = now.date_naive();
    let offset = (today.weekday().num_days_from_monday() + 7
        - week_start.num_days_from_monday())
        % 7;
    let start = today - Duration::days(i64::from(offset));
    Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN))
}

/// Midnight UTC of the first day of the current month
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let first = today.with_day(1).unwrap_or(today);
    Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN))
}

/// Orders per-user totals into a leaderboard of at most `limit` entries
pub fn rank_entries(totals: HashMap<String, i64>, limit: usize) -> Vec<RankingEntry> {
    let mut entries: Vec<RankingEntry> = totals
        .into_iter()
        .map(|(user_id, points)| RankingEntry { user_id, points })
        .collect();

    entries.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.user_id.cmp(&b.user_id)));
    entries.truncate(limit);
    entries
}

/// 1-based position of `user_id`, if ranked
pub fn position_of(entries: &[RankingEntry], user_id: &str) -> Option<usize> {
    entries
        .iter()
        .position(|entry| entry.user_id == user_id)
        .map(|index| index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[rstest]
    #[case(at(2025, 3, 12, 18), Weekday::Sun, at(2025, 3, 9, 0))] // Wednesday
    #[case(at(2025, 3, 9, 7), Weekday::Sun, at(2025, 3, 9, 0))] // Sunday itself
    #[case(at(2025, 3, 12, 18), Weekday::Mon, at(2025, 3, 10, 0))]
    #[case(at(2025, 3, 2, 10), Weekday::Mon, at(2025, 2, 24, 0))] // crosses month
    fn test_week_start(
        #[case] now: DateTime<Utc>,
        #[case] first_day: Weekday,
        #[case] expected: DateTime<Utc>,
    ) {
        assert_eq!(week_start(now, first_day), expected);
    }

    #[test]
    fn test_month_start() {
        assert_eq!(month_start(at(2025, 3, 12, 18)), at(2025, 3, 1, 0));
        assert_eq!(month_start(at(2025, 3, 1, 0)), at(2025, 3, 1, 0));
    }

    #[test]
    fn test_period_windows() {
        let now = at(2025, 5, 31, 12);
        assert_eq!(RankingPeriod::Monthly.since(now), at(2025, 4, 30, 12));
        assert_eq!(RankingPeriod::Quarterly.since(now), at(2025, 2, 28, 12));
        assert_eq!(RankingPeriod::Annual.since(now), at(2024, 5, 31, 12));
        assert_eq!(RankingPeriod::from_str("seasonal").unwrap(), RankingPeriod::Seasonal);
    }

    #[test]
    fn test_rank_entries_orders_and_truncates() {
        let totals = HashMap::from([
            ("carol".to_string(), 300),
            ("alice".to_string(), 500),
            ("bob".to_string(), 300),
            ("dave".to_string(), 10),
        ]);

        let entries = rank_entries(totals, 3);
        let ids: Vec<&str> = entries.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob", "carol"]);

        assert_eq!(position_of(&entries, "alice"), Some(1));
        assert_eq!(position_of(&entries, "carol"), Some(3));
        assert_eq!(position_of(&entries, "dave"), None);
    }
}
