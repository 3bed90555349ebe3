use std::sync::Arc;

use super::super::{ScoreBreakdown, ScoreComponent, ScoreRule, ScoringContext, UserProgress};
use super::{BasePointsRule, LevelBonusRule, StreakBonusRule};
use crate::shared::EngineConfig;

/// Computes the points earned by one check-in.
///
/// Rules run in priority order against the snapshot taken *before* the
/// check-in is applied. Each rule feeds exactly one breakdown component and
/// the total is always the sum of the components.
pub struct CheckInScorer {
    config: EngineConfig,
    rules: Vec<Arc<dyn ScoreRule>>,
}

impl CheckInScorer {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_rules(
            config,
            vec![
                Arc::new(BasePointsRule::new()),
                Arc::new(StreakBonusRule::new()),
                Arc::new(LevelBonusRule::new()),
            ],
        )
    }

    pub fn with_rules(config: EngineConfig, mut rules: Vec<Arc<dyn ScoreRule>>) -> Self {
        rules.sort_by_key(|rule| rule.priority());
        Self { config, rules }
    }

    pub fn score(&self, user: &UserProgress) -> ScoreBreakdown {
        let mut breakdown = ScoreBreakdown::default();

        for rule in &self.rules {
            let points = {
                let context = ScoringContext::new(&self.config, &breakdown);
                rule.calculate(user, &context)
            };

            match rule.component() {
                ScoreComponent::Base => breakdown.base += points,
                ScoreComponent::StreakBonus => breakdown.streak_bonus += points,
                ScoreComponent::LevelBonus => breakdown.level_bonus += points,
            }
        }

        breakdown.total = breakdown.base + breakdown.streak_bonus + breakdown.level_bonus;
        breakdown
    }
}
