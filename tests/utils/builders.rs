#![allow(dead_code)] // Test utilities may not all be used in every test

use chrono::{DateTime, Duration, Utc};

use gymrank::progression::{
    Badge, BadgeRequirement, Challenge, ChallengeStatus, ChallengeType, CheckInEvent, CheckInType,
    UserProgress,
};

// ============================================================================
// Model Builders
// ============================================================================

pub struct ProgressBuilder {
    progress: UserProgress,
}

impl ProgressBuilder {
    pub fn new(user_id: &str) -> Self {
        Self {
            progress: UserProgress::new(user_id, Some("gym-1".to_string())),
        }
    }

    pub fn without_gym(mut self) -> Self {
        self.progress.gym_id = None;
        self
    }

    /// Sets points and xp together and keeps the level consistent
    pub fn with_xp(mut self, xp: i64) -> Self {
        self.progress.xp = xp;
        self.progress.points = xp;
        self.progress.level = xp / 3000 + 1;
        self
    }

    pub fn with_streak(mut self, current: i64) -> Self {
        self.progress.current_streak = current;
        self.progress.longest_streak = self.progress.longest_streak.max(current);
        self
    }

    pub fn with_workouts(mut self, total: i64) -> Self {
        self.progress.total_workouts = total;
        self
    }

    pub fn last_checked_in(mut self, at: DateTime<Utc>) -> Self {
        self.progress.last_check_in_at = Some(at);
        self
    }

    pub fn build(self) -> UserProgress {
        self.progress
    }
}

pub fn challenge(id: &str, challenge_type: ChallengeType, goal: i64, reward: i64) -> Challenge {
    Challenge {
        id: id.to_string(),
        name: format!("Challenge {}", id),
        challenge_type,
        goal_value: goal,
        reward_points: reward,
        status: ChallengeStatus::Active,
    }
}

pub fn badge(id: &str, requirement: BadgeRequirement, value: i64) -> Badge {
    Badge {
        id: id.to_string(),
        name: format!("Badge {}", id),
        requirement,
        requirement_value: value,
    }
}

/// A historical check-in `days_ago` days before `now`
pub fn check_in_at(
    user_id: &str,
    gym_id: &str,
    points: i64,
    now: DateTime<Utc>,
    days_ago: i64,
) -> CheckInEvent {
    CheckInEvent {
        id: format!("{}-{}-{}", user_id, gym_id, days_ago),
        user_id: user_id.to_string(),
        gym_id: gym_id.to_string(),
        check_in_type: CheckInType::Regular,
        points_earned: points,
        occurred_at: now - Duration::days(days_ago),
    }
}
