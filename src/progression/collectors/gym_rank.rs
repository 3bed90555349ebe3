use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::progression::ranking::position_of;

use super::super::{
    MeasurementCollector, MeasurementKind, ProgressionError, RecordStore, UserProgress,
};

/// Position of the user in the monthly ranking of their home gym.
/// Users without a home gym, or outside the leaderboard, measure as 0.
pub struct MonthlyGymRankCollector {
    limit: i64,
}

impl MonthlyGymRankCollector {
    pub fn new(limit: i64) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl MeasurementCollector for MonthlyGymRankCollector {
    fn kind(&self) -> MeasurementKind {
        MeasurementKind::MonthlyGymRank
    }

    async fn collect(
        &self,
        store: &dyn RecordStore,
        user: &UserProgress,
        now: DateTime<Utc>,
    ) -> Result<i64, ProgressionError> {
        let Some(gym_id) = user.gym_id.as_deref() else {
            return Ok(0);
        };

        let ranking = store.get_monthly_ranking(gym_id, now, self.limit).await?;
        Ok(position_of(&ranking, &user.user_id).unwrap_or(0) as i64)
    }
}
