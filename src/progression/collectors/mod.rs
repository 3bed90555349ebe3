pub mod check_in_counts;
pub mod gym_rank;
pub mod streak;

pub use check_in_counts::{CheckInTypeCollector, PeriodCheckInsCollector};
pub use gym_rank::MonthlyGymRankCollector;
pub use streak::CurrentStreakCollector;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

use super::{MeasurementCollector, Measurements, RecordStore, UserProgress};

/// Runs every collector concurrently. A failing collector only leaves its
/// own measurement marked as failed.
pub async fn collect_all(
    collectors: &[Arc<dyn MeasurementCollector>],
    store: &dyn RecordStore,
    user: &UserProgress,
    now: DateTime<Utc>,
) -> Measurements {
    let results = join_all(collectors.iter().map(|collector| async move {
        (collector.kind(), collector.collect(store, user, now).await)
    }))
    .await;

    let mut measurements = Measurements::new();
    for (kind, result) in results {
        if let Err(err) = &result {
            warn!(
                user_id = %user.user_id,
                measurement = %kind,
                error = %err,
                "Measurement collection failed"
            );
        }
        measurements.record(kind, result);
    }
    measurements
}
