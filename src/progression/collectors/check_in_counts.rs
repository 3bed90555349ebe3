use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};

use crate::progression::ranking::{month_start, week_start};

use super::super::{
    CheckInType, MeasurementCollector, MeasurementKind, ProgressionError, RecordStore,
    UserProgress,
};

/// Counts a user's check-ins since the start of the current week or month
pub struct PeriodCheckInsCollector {
    kind: MeasurementKind,
    week_start: Weekday,
}

impl PeriodCheckInsCollector {
    pub fn weekly(week_start: Weekday) -> Self {
        Self {
            kind: MeasurementKind::WeeklyCheckIns,
            week_start,
        }
    }

    pub fn monthly() -> Self {
        Self {
            kind: MeasurementKind::MonthlyCheckIns,
            week_start: Weekday::Sun,
        }
    }

    fn period_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.kind {
            MeasurementKind::WeeklyCheckIns => week_start(now, self.week_start),
            _ => month_start(now),
        }
    }
}

#[async_trait]
impl MeasurementCollector for PeriodCheckInsCollector {
    fn kind(&self) -> MeasurementKind {
        self.kind
    }

    async fn collect(
        &self,
        store: &dyn RecordStore,
        user: &UserProgress,
        now: DateTime<Utc>,
    ) -> Result<i64, ProgressionError> {
        let since = self.period_start(now);
        Ok(store
            .count_check_ins(&user.user_id, None, Some(since))
            .await?)
    }
}

/// Counts every check-in of one type the user ever made
pub struct CheckInTypeCollector {
    kind: MeasurementKind,
    check_in_type: CheckInType,
}

impl CheckInTypeCollector {
    pub fn morning() -> Self {
        Self {
            kind: MeasurementKind::MorningCheckIns,
            check_in_type: CheckInType::Morning,
        }
    }

    pub fn night() -> Self {
        Self {
            kind: MeasurementKind::NightCheckIns,
            check_in_type: CheckInType::Night,
        }
    }
}

#[async_trait]
impl MeasurementCollector for CheckInTypeCollector {
    fn kind(&self) -> MeasurementKind {
        self.kind
    }

    async fn collect(
        &self,
        store: &dyn RecordStore,
        user: &UserProgress,
        _now: DateTime<Utc>,
    ) -> Result<i64, ProgressionError> {
        Ok(store
            .count_check_ins(&user.user_id, Some(self.check_in_type), None)
            .await?)
    }
}
