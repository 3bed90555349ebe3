use super::super::{ScoreComponent, ScoreRule, ScoringContext, UserProgress};

pub struct LevelBonusRule;

impl Default for LevelBonusRule {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelBonusRule {
    pub fn new() -> Self {
        Self
    }
}

impl ScoreRule for LevelBonusRule {
    fn component(&self) -> ScoreComponent {
        ScoreComponent::LevelBonus
    }

    fn calculate(&self, user: &UserProgress, context: &ScoringContext) -> i64 {
        user.level.max(1) * context.config.level_multiplier
    }

    fn priority(&self) -> u32 {
        crate::progression::rule_priority::BONUS
    }
}
