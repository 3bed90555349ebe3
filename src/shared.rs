use backon::ExponentialBuilder;
use chrono::Weekday;
use std::time::Duration;
use tracing::warn;

/// Tunables for scoring, levels and the check-in pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Points for a regular check-in before bonuses
    pub base_points: i64,
    /// Bonus points per day of the current streak
    pub streak_multiplier: i64,
    /// Bonus points per level
    pub level_multiplier: i64,
    /// XP span of one level
    pub xp_per_level: i64,
    /// First day of the week for frequency challenges
    pub week_start: Weekday,
    /// How often a write is recomputed after an optimistic lock failure,
    /// on top of the first attempt
    pub max_conflict_retries: u32,
    /// Total attempts for store reads that fail transiently
    pub retry_attempts: u32,
    /// First backoff delay, doubled on every further retry
    pub retry_base_delay: Duration,
    /// Leaderboard size
    pub ranking_limit: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_points: 150,
            streak_multiplier: 5,
            level_multiplier: 2,
            xp_per_level: 3000,
            week_start: Weekday::Sun,
            max_conflict_retries: 3,
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(50),
            ranking_limit: 50,
        }
    }
}

impl EngineConfig {
    /// Builds the config from `GYMRANK_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            base_points: env_or("GYMRANK_BASE_POINTS", defaults.base_points),
            streak_multiplier: env_or("GYMRANK_STREAK_MULTIPLIER", defaults.streak_multiplier),
            level_multiplier: env_or("GYMRANK_LEVEL_MULTIPLIER", defaults.level_multiplier),
            xp_per_level: env_or("GYMRANK_XP_PER_LEVEL", defaults.xp_per_level).max(1),
            week_start: env_or("GYMRANK_WEEK_START", defaults.week_start),
            max_conflict_retries: env_or(
                "GYMRANK_MAX_CONFLICT_RETRIES",
                defaults.max_conflict_retries,
            ),
            retry_attempts: env_or("GYMRANK_RETRY_ATTEMPTS", defaults.retry_attempts).max(1),
            retry_base_delay: Duration::from_millis(env_or(
                "GYMRANK_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )),
            ranking_limit: env_or("GYMRANK_RANKING_LIMIT", defaults.ranking_limit),
        }
    }
}

impl EngineConfig {
    /// Backoff for store reads that fail transiently
    pub fn read_backoff(&self) -> ExponentialBuilder {
        self.backoff(self.retry_attempts.saturating_sub(1))
    }

    /// Backoff between recomputations after a version conflict
    pub fn conflict_backoff(&self) -> ExponentialBuilder {
        self.backoff(self.max_conflict_retries)
    }

    fn backoff(&self, retries: u32) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.retry_base_delay)
            .with_max_delay(self.retry_base_delay * 32)
            .with_max_times(retries as usize)
            .with_jitter()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "Ignoring unparsable config value");
                default
            }
        },
        Err(_) => default,
    }
}
