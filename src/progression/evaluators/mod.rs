pub mod badges;
pub mod challenges;

pub use badges::{BadgeEvaluation, BadgeEvaluator};
pub use challenges::{ChallengeAward, ChallengeEvaluation, ChallengeEvaluator};
