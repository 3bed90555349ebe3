use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::super::{
    MeasurementCollector, MeasurementKind, ProgressionError, RecordStore, UserProgress,
};

/// Reads the streak straight from the (already updated) progress snapshot
pub struct CurrentStreakCollector;

impl Default for CurrentStreakCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrentStreakCollector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MeasurementCollector for CurrentStreakCollector {
    fn kind(&self) -> MeasurementKind {
        MeasurementKind::CurrentStreak
    }

    async fn collect(
        &self,
        _store: &dyn RecordStore,
        user: &UserProgress,
        _now: DateTime<Utc>,
    ) -> Result<i64, ProgressionError> {
        Ok(user.current_streak)
    }
}
