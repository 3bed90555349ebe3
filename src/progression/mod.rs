pub mod calculators;
pub mod collectors;
pub mod evaluators;
pub mod postgres;
pub mod ranking;
pub mod service;

mod errors;
pub mod models;
pub mod repository;

pub use errors::{ProgressionError, StoreError};
pub use models::*;
pub use postgres::PostgresRecordStore;
pub use repository::{InMemoryRecordStore, RecordStore};
pub use service::{CheckInOutcome, CheckInRequest, CheckInService};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use strum_macros::{AsRefStr, Display};

use crate::shared::EngineConfig;

/// Priority constants for score rules.
/// Lower values run first; later rules can read the components
/// filled in by earlier ones through the scoring context.
pub mod rule_priority {
    /// Fixed points for showing up
    pub const BASE: u32 = 100;
    /// Bonuses derived from the pre-check-in snapshot
    pub const BONUS: u32 = 200;
}

/// Which part of the breakdown a rule contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreComponent {
    Base,
    StreakBonus,
    LevelBonus,
}

pub trait ScoreRule: Send + Sync {
    fn component(&self) -> ScoreComponent;

    fn calculate(&self, user: &UserProgress, context: &ScoringContext) -> i64;

    fn priority(&self) -> u32;
}

pub struct ScoringContext<'a> {
    pub config: &'a EngineConfig,
    pub breakdown: &'a ScoreBreakdown,
}

impl<'a> ScoringContext<'a> {
    pub fn new(config: &'a EngineConfig, breakdown: &'a ScoreBreakdown) -> Self {
        Self { config, breakdown }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum MeasurementKind {
    WeeklyCheckIns,
    MonthlyCheckIns,
    CurrentStreak,
    MorningCheckIns,
    NightCheckIns,
    /// 1-based position in the monthly ranking of the user's gym, 0 when unranked
    MonthlyGymRank,
}

/// Measurements gathered from the record store for one evaluation pass.
/// A kind that failed to collect keeps its error so that only the
/// challenges or badges depending on it are affected.
#[derive(Debug, Clone, Default)]
pub struct Measurements {
    values: HashMap<MeasurementKind, Result<i64, ProgressionError>>,
}

impl Measurements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: MeasurementKind, value: i64) -> Self {
        self.record(kind, Ok(value));
        self
    }

    pub fn record(&mut self, kind: MeasurementKind, result: Result<i64, ProgressionError>) {
        self.values.insert(kind, result);
    }

    pub fn get(&self, kind: MeasurementKind) -> Result<i64, ProgressionError> {
        match self.values.get(&kind) {
            Some(result) => result.clone(),
            None => Err(ProgressionError::Evaluation(format!(
                "measurement {} was not collected",
                kind
            ))),
        }
    }
}

#[async_trait]
pub trait MeasurementCollector: Send + Sync {
    fn kind(&self) -> MeasurementKind;

    async fn collect(
        &self,
        store: &dyn RecordStore,
        user: &UserProgress,
        now: DateTime<Utc>,
    ) -> Result<i64, ProgressionError>;
}
