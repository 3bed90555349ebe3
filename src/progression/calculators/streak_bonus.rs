use super::super::{ScoreComponent, ScoreRule, ScoringContext, UserProgress};

/// Rewards the streak as it stood before the check-in
pub struct StreakBonusRule;

impl Default for StreakBonusRule {
    fn default() -> Self {
        Self::new()
    }
}

impl StreakBonusRule {
    pub fn new() -> Self {
        Self
    }
}

impl ScoreRule for StreakBonusRule {
    fn component(&self) -> ScoreComponent {
        ScoreComponent::StreakBonus
    }

    fn calculate(&self, user: &UserProgress, context: &ScoringContext) -> i64 {
        user.current_streak.max(0) * context.config.streak_multiplier
    }

    fn priority(&self) -> u32 {
        crate::progression::rule_priority::BONUS
    }
}
