use serde::{Deserialize, Serialize};

/// Facts about a user's progression that already happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressionEvent {
    CheckInRecorded {
        user_id: String,
        check_in_id: String,
        points_earned: i64,
    },

    /// The user crossed one or more level thresholds
    LeveledUp {
        user_id: String,
        previous_level: i64,
        level: i64,
    },

    ChallengeCompleted {
        user_id: String,
        challenge_id: String,
        reward_points: i64,
    },

    BadgeUnlocked { user_id: String, badge_id: String },
}

impl ProgressionEvent {
    pub fn user_id(&self) -> &str {
        match self {
            ProgressionEvent::CheckInRecorded { user_id, .. } => user_id,
            ProgressionEvent::LeveledUp { user_id, .. } => user_id,
            ProgressionEvent::ChallengeCompleted { user_id, .. } => user_id,
            ProgressionEvent::BadgeUnlocked { user_id, .. } => user_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ProgressionEvent::CheckInRecorded { .. } => "check_in_recorded",
            ProgressionEvent::LeveledUp { .. } => "leveled_up",
            ProgressionEvent::ChallengeCompleted { .. } => "challenge_completed",
            ProgressionEvent::BadgeUnlocked { .. } => "badge_unlocked",
        }
    }
}
