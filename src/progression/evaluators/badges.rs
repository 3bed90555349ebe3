use std::collections::HashSet;

use super::super::{
    Badge, BadgeRequirement, ItemFailure, MeasurementKind, Measurements, ProgressionError,
    UserProgress,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BadgeEvaluation {
    /// Badge ids unlocked by this pass, in definition order
    pub unlocked: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

/// Scans badge definitions for newly satisfied requirements
#[derive(Debug, Clone, Copy, Default)]
pub struct BadgeEvaluator;

impl BadgeEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        user: &UserProgress,
        badges: &[Badge],
        already_unlocked: &HashSet<String>,
        measurements: &Measurements,
    ) -> BadgeEvaluation {
        let mut evaluation = BadgeEvaluation::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for badge in badges {
            if already_unlocked.contains(&badge.id) || !seen.insert(badge.id.as_str()) {
                continue;
            }

            match Self::is_satisfied(badge, user, measurements) {
                Ok(true) => evaluation.unlocked.push(badge.id.clone()),
                Ok(false) => {}
                Err(err) => evaluation.failures.push(ItemFailure::new(&badge.id, err)),
            }
        }

        evaluation
    }

    fn is_satisfied(
        badge: &Badge,
        user: &UserProgress,
        measurements: &Measurements,
    ) -> Result<bool, ProgressionError> {
        if badge.requirement_value < 0 {
            return Err(ProgressionError::Validation(format!(
                "badge {} has negative requirement_value {}",
                badge.id, badge.requirement_value
            )));
        }

        let required = badge.requirement_value;
        let satisfied = match badge.requirement {
            BadgeRequirement::FirstWorkout => user.total_workouts >= 1,
            BadgeRequirement::Streak => user.current_streak >= required,
            BadgeRequirement::TotalWorkouts => user.total_workouts >= required,
            BadgeRequirement::MorningWorkouts => {
                measurements.get(MeasurementKind::MorningCheckIns)? >= required
            }
            BadgeRequirement::NightWorkouts => {
                measurements.get(MeasurementKind::NightCheckIns)? >= required
            }
            BadgeRequirement::Rank1 => measurements.get(MeasurementKind::MonthlyGymRank)? == 1,
        };

        Ok(satisfied)
    }
}
