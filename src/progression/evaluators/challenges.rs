use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::progression::calculators::LevelCalculator;

use super::super::{
    Challenge, ChallengeType, ItemFailure, MeasurementKind, Measurements, UserChallengeProgress,
    UserProgress,
};

/// One-time reward earned by completing a challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeAward {
    pub challenge_id: String,
    pub reward_points: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChallengeEvaluation {
    /// Records that changed and must be upserted
    pub updates: Vec<UserChallengeProgress>,
    pub awards: Vec<ChallengeAward>,
    pub failures: Vec<ItemFailure>,
}

impl ChallengeEvaluation {
    pub fn total_reward(&self) -> i64 {
        self.awards.iter().map(|award| award.reward_points).sum()
    }
}

/// Recomputes challenge progress after a check-in.
///
/// A challenge completes the first time its measurement reaches the goal.
/// That first observation is the only one that earns the reward; records
/// already completed stay completed and keep their original timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChallengeEvaluator;

impl ChallengeEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn measurement_for(challenge_type: ChallengeType) -> MeasurementKind {
        match challenge_type {
            ChallengeType::Frequency => MeasurementKind::WeeklyCheckIns,
            ChallengeType::Monthly => MeasurementKind::MonthlyCheckIns,
            ChallengeType::Streak => MeasurementKind::CurrentStreak,
        }
    }

    pub fn evaluate(
        &self,
        user_id: &str,
        challenges: &[Challenge],
        prior_progress: &[UserChallengeProgress],
        measurements: &Measurements,
        now: DateTime<Utc>,
    ) -> ChallengeEvaluation {
        let prior: HashMap<&str, &UserChallengeProgress> = prior_progress
            .iter()
            .filter(|record| record.user_id == user_id)
            .map(|record| (record.challenge_id.as_str(), record))
            .collect();

        let mut evaluation = ChallengeEvaluation::default();

        for challenge in challenges.iter().filter(|c| c.is_active()) {
            if let Err(err) = challenge.validate() {
                evaluation
                    .failures
                    .push(ItemFailure::new(&challenge.id, err));
                continue;
            }

            let progress = match measurements.get(Self::measurement_for(challenge.challenge_type)) {
                Ok(value) => value.max(0),
                Err(err) => {
                    evaluation
                        .failures
                        .push(ItemFailure::new(&challenge.id, err));
                    continue;
                }
            };

            let previous = prior.get(challenge.id.as_str()).copied();
            let (completed, completed_at) = match previous {
                Some(record) if record.completed => (true, record.completed_at),
                _ if progress >= challenge.goal_value => {
                    debug!(
                        user_id,
                        challenge_id = %challenge.id,
                        progress,
                        goal = challenge.goal_value,
                        "Challenge completed"
                    );
                    evaluation.awards.push(ChallengeAward {
                        challenge_id: challenge.id.clone(),
                        reward_points: challenge.reward_points,
                    });
                    (true, Some(now))
                }
                _ => (false, None),
            };

            let record = UserChallengeProgress {
                user_id: user_id.to_string(),
                challenge_id: challenge.id.clone(),
                progress,
                completed,
                completed_at,
            };

            if previous != Some(&record) {
                evaluation.updates.push(record);
            }
        }

        evaluation
    }

    /// Adds the rewards to both points and xp, keeping the level in sync
    pub fn apply_awards(
        user: &UserProgress,
        awards: &[ChallengeAward],
        levels: &LevelCalculator,
    ) -> UserProgress {
        let reward: i64 = awards.iter().map(|award| award.reward_points).sum();
        let mut updated = user.clone();
        updated.points += reward;
        updated.xp += reward;
        updated.level = levels.level_for(updated.xp);
        updated
    }
}
