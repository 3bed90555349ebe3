/// Derives levels from cumulative experience.
/// Level thresholds sit at every multiple of `xp_per_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelCalculator {
    xp_per_level: i64,
}

impl Default for LevelCalculator {
    fn default() -> Self {
        Self::new(3000)
    }
}

impl LevelCalculator {
    pub fn new(xp_per_level: i64) -> Self {
        Self {
            xp_per_level: xp_per_level.max(1),
        }
    }

    pub fn xp_per_level(&self) -> i64 {
        self.xp_per_level
    }

    pub fn level_for(&self, xp: i64) -> i64 {
        xp.max(0) / self.xp_per_level + 1
    }

    /// Total XP (from zero) at which `level` ends
    pub fn xp_for_next_level(&self, level: i64) -> i64 {
        level.max(1) * self.xp_per_level
    }

    /// XP earned inside the current level and the span of that level
    pub fn progress_in_level(&self, xp: i64) -> (i64, i64) {
        (xp.max(0) % self.xp_per_level, self.xp_per_level)
    }
}
