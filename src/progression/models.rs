use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, Display, EnumString};

use super::ProgressionError;

/// Versioned progression aggregate for one user
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: String,
    pub gym_id: Option<String>, // Home gym, drives the rank_1 badge
    pub points: i64,
    pub xp: i64,
    pub level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub total_workouts: i64,
    pub last_check_in_at: Option<DateTime<Utc>>,
    pub version: i64, // Bumped by every successful save
}

impl UserProgress {
    /// Fresh progress for a user who never checked in
    pub fn new(user_id: impl Into<String>, gym_id: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            gym_id,
            points: 0,
            xp: 0,
            level: 1,
            current_streak: 0,
            longest_streak: 0,
            total_workouts: 0,
            last_check_in_at: None,
            version: 0,
        }
    }

    /// Checks the aggregate invariants against the given level threshold
    pub fn validate(&self, xp_per_level: i64) -> Result<(), ProgressionError> {
        let counters = [
            ("points", self.points),
            ("xp", self.xp),
            ("current_streak", self.current_streak),
            ("longest_streak", self.longest_streak),
            ("total_workouts", self.total_workouts),
        ];
        if let Some((field, value)) = counters.iter().find(|(_, value)| *value < 0) {
            return Err(ProgressionError::Validation(format!(
                "{} must not be negative, got {}",
                field, value
            )));
        }

        if self.longest_streak < self.current_streak {
            return Err(ProgressionError::Validation(format!(
                "longest_streak {} is below current_streak {}",
                self.longest_streak, self.current_streak
            )));
        }

        let expected_level = self.xp / xp_per_level.max(1) + 1;
        if self.level != expected_level {
            return Err(ProgressionError::Validation(format!(
                "level {} does not match xp {} (expected {})",
                self.level, self.xp, expected_level
            )));
        }

        Ok(())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckInType {
    #[default]
    Regular,
    Morning,
    Night,
}

/// A check-in not yet persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCheckIn {
    pub user_id: String,
    pub gym_id: String,
    pub check_in_type: CheckInType,
    pub points_earned: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Immutable record of a recorded check-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInEvent {
    pub id: String,
    pub user_id: String,
    pub gym_id: String,
    pub check_in_type: CheckInType,
    pub points_earned: i64,
    pub occurred_at: DateTime<Utc>,
}

impl CheckInEvent {
    pub fn from_new(id: String, new: NewCheckIn) -> Self {
        Self {
            id,
            user_id: new.user_id,
            gym_id: new.gym_id,
            check_in_type: new.check_in_type,
            points_earned: new.points_earned,
            occurred_at: new.occurred_at,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChallengeType {
    /// Check-ins since the start of the current week
    Frequency,
    /// Check-ins since the first day of the current month
    Monthly,
    /// Current streak value
    Streak,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChallengeStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub name: String,
    pub challenge_type: ChallengeType,
    pub goal_value: i64,
    pub reward_points: i64,
    pub status: ChallengeStatus,
}

impl Challenge {
    pub fn is_active(&self) -> bool {
        self.status == ChallengeStatus::Active
    }

    pub fn validate(&self) -> Result<(), ProgressionError> {
        if self.goal_value <= 0 {
            return Err(ProgressionError::Validation(format!(
                "challenge {} has non-positive goal_value {}",
                self.id, self.goal_value
            )));
        }
        if self.reward_points < 0 {
            return Err(ProgressionError::Validation(format!(
                "challenge {} has negative reward_points {}",
                self.id, self.reward_points
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserChallengeProgress {
    pub user_id: String,
    pub challenge_id: String,
    pub progress: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>, // Set once, at the first completion
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BadgeRequirement {
    FirstWorkout,
    Streak,
    TotalWorkouts,
    MorningWorkouts,
    NightWorkouts,
    #[serde(rename = "rank_1")]
    #[strum(to_string = "rank_1")]
    Rank1,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub requirement: BadgeRequirement,
    pub requirement_value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserBadgeUnlock {
    pub user_id: String,
    pub badge_id: String,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Gym {
    pub id: String,
    pub name: String,
    pub members_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub name: String,
    pub points_required: i64,
    pub stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RankingEntry {
    pub user_id: String,
    pub points: i64,
}

/// One point of the points-evolution chart
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PointsSample {
    pub occurred_at: DateTime<Utc>,
    pub points_earned: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base: i64,
    pub streak_bonus: i64,
    pub level_bonus: i64,
    pub total: i64,
}

/// A single challenge or badge that could not be evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item_id: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: ProgressionError,
}

fn serialize_error<S: serde::Serializer>(
    error: &ProgressionError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

impl ItemFailure {
    pub fn new(item_id: impl Into<String>, error: ProgressionError) -> Self {
        Self {
            item_id: item_id.into(),
            error,
        }
    }
}
