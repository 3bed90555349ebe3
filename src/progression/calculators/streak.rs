use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakUpdate {
    pub new_streak: i64,
    pub new_longest: i64,
}

/// Consecutive-day streak rules.
///
/// The day difference counts whole 24h periods elapsed since the previous
/// check-in. One period extends the streak, more than one restarts it, and
/// a repeat check-in inside the same period leaves it untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreakTracker;

impl StreakTracker {
    pub fn new() -> Self {
        Self
    }

    pub fn next_streak(
        &self,
        previous_check_in_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        current_streak: i64,
        longest_streak: i64,
    ) -> StreakUpdate {
        let new_streak = match previous_check_in_at {
            None => 1,
            Some(previous) => match Self::whole_days_between(previous, now) {
                0 => current_streak,
                1 => current_streak + 1,
                _ => 1,
            },
        };

        StreakUpdate {
            new_streak,
            new_longest: longest_streak.max(new_streak),
        }
    }

    /// Previous check-ins stamped in the future count as the same day
    fn whole_days_between(previous: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        (now - previous).num_days().max(0)
    }
}
