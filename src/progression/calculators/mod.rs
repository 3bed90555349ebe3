pub mod base_points;
pub mod level;
pub mod level_bonus;
pub mod scorer;
pub mod streak;
pub mod streak_bonus;

pub use base_points::BasePointsRule;
pub use level::LevelCalculator;
pub use level_bonus::LevelBonusRule;
pub use scorer::CheckInScorer;
pub use streak::{StreakTracker, StreakUpdate};
pub use streak_bonus::StreakBonusRule;
