use super::super::{ScoreComponent, ScoreRule, ScoringContext, UserProgress};

/// Fixed points awarded for every check-in
pub struct BasePointsRule;

impl Default for BasePointsRule {
    fn default() -> Self {
        Self::new()
    }
}

impl BasePointsRule {
    pub fn new() -> Self {
        Self
    }
}

impl ScoreRule for BasePointsRule {
    fn component(&self) -> ScoreComponent {
        ScoreComponent::Base
    }

    fn calculate(&self, _user: &UserProgress, context: &ScoringContext) -> i64 {
        context.config.base_points
    }

    fn priority(&self) -> u32 {
        crate::progression::rule_priority::BASE
    }
}
