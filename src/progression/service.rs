use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::event::{EventBus, ProgressionEvent};
use crate::shared::EngineConfig;

use super::{
    calculators::{CheckInScorer, LevelCalculator, StreakTracker, StreakUpdate},
    collectors::{
        collect_all, CheckInTypeCollector, CurrentStreakCollector, MonthlyGymRankCollector,
        PeriodCheckInsCollector,
    },
    evaluators::{BadgeEvaluator, ChallengeAward, ChallengeEvaluator},
    ranking::RankingPeriod,
    CheckInEvent, CheckInType, ItemFailure, MeasurementCollector, NewCheckIn, PointsSample,
    ProgressionError, RankingEntry, RecordStore, Reward, ScoreBreakdown, StoreError,
    UserBadgeUnlock, UserChallengeProgress, UserProgress,
};

const DEFAULT_RECENT_CHECK_INS: i64 = 10;
const DEFAULT_EVOLUTION_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub user_id: String,
    pub gym_id: String,
    #[serde(default)]
    pub check_in_type: CheckInType,
    /// Defaults to the time the request is processed
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl CheckInRequest {
    pub fn new(user_id: impl Into<String>, gym_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            gym_id: gym_id.into(),
            check_in_type: CheckInType::Regular,
            occurred_at: None,
        }
    }

    pub fn with_type(mut self, check_in_type: CheckInType) -> Self {
        self.check_in_type = check_in_type;
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    fn validate(&self) -> Result<(), ProgressionError> {
        if self.user_id.trim().is_empty() {
            return Err(ProgressionError::Validation("user_id is empty".into()));
        }
        if self.gym_id.trim().is_empty() {
            return Err(ProgressionError::Validation("gym_id is empty".into()));
        }
        Ok(())
    }
}

/// Everything a check-in changed, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckInOutcome {
    pub check_in: CheckInEvent,
    pub breakdown: ScoreBreakdown,
    /// Progress after the check-in and any challenge rewards
    pub progress: UserProgress,
    pub new_level: i64,
    pub new_streak: i64,
    pub leveled_up: bool,
    pub completed_challenges: Vec<ChallengeAward>,
    pub unlocked_badges: Vec<String>,
    /// Challenges and badges that could not be evaluated or written
    pub failures: Vec<ItemFailure>,
}

/// The progress write of a check-in that already landed in the store
struct RecordedProgress {
    previous: UserProgress,
    saved: UserProgress,
    breakdown: ScoreBreakdown,
    streak: StreakUpdate,
}

pub struct CheckInService {
    store: Arc<dyn RecordStore>,
    config: EngineConfig,
    scorer: CheckInScorer,
    streaks: StreakTracker,
    levels: LevelCalculator,
    challenges: ChallengeEvaluator,
    badges: BadgeEvaluator,
    challenge_collectors: Vec<Arc<dyn MeasurementCollector>>,
    badge_collectors: Vec<Arc<dyn MeasurementCollector>>,
    event_bus: Option<EventBus>,
    user_mutexes: Arc<RwLock<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl CheckInService {
    pub fn builder(store: Arc<dyn RecordStore>) -> CheckInServiceBuilder {
        CheckInServiceBuilder::new(store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Records one check-in and everything that follows from it.
    ///
    /// The progress write is a compare-and-swap on `version`; on conflict the
    /// whole computation is redone from a fresh read. If storing the check-in
    /// itself fails, the progress write is undone. Challenge and badge
    /// failures never fail the check-in, they are returned in `failures`.
    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, gym_id = %request.gym_id)
    )]
    pub async fn check_in(
        &self,
        request: CheckInRequest,
    ) -> Result<CheckInOutcome, ProgressionError> {
        request.validate()?;
        let now = request.occurred_at.unwrap_or_else(Utc::now);

        let user_lock = self.user_lock(&request.user_id).await;
        let result = {
            let _guard = user_lock.lock().await;
            self.process_check_in(&request, now).await
        };
        self.release_user_lock(&request.user_id, user_lock).await;

        result
    }

    async fn process_check_in(
        &self,
        request: &CheckInRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckInOutcome, ProgressionError> {
        let recorded = self.record_progress(request, now).await?;

        let new_check_in = NewCheckIn {
            user_id: request.user_id.clone(),
            gym_id: request.gym_id.clone(),
            check_in_type: request.check_in_type,
            points_earned: recorded.breakdown.total,
            occurred_at: now,
        };
        let check_in = match self.store.insert_check_in(new_check_in).await {
            Ok(check_in) => check_in,
            Err(err) => {
                error!(error = %err, "Storing check-in failed, restoring previous progress");
                self.restore_progress(&recorded).await;
                return Err(err.into());
            }
        };

        let mut failures = Vec::new();

        let (progress, completed_challenges) = self
            .evaluate_challenges(recorded.saved.clone(), now, &mut failures)
            .await;
        let unlocked_badges = self.evaluate_badges(&progress, now, &mut failures).await;

        let previous_level = recorded.previous.level;
        let outcome = CheckInOutcome {
            check_in,
            breakdown: recorded.breakdown,
            new_level: progress.level,
            new_streak: recorded.streak.new_streak,
            leveled_up: progress.level > previous_level,
            progress,
            completed_challenges,
            unlocked_badges,
            failures,
        };

        info!(
            points_earned = outcome.breakdown.total,
            streak = outcome.new_streak,
            level = outcome.new_level,
            challenges = outcome.completed_challenges.len(),
            badges = outcome.unlocked_badges.len(),
            failures = outcome.failures.len(),
            "Check-in processed"
        );

        self.publish(&outcome, previous_level).await;
        Ok(outcome)
    }

    pub async fn progress(&self, user_id: &str) -> Result<UserProgress, ProgressionError> {
        self.read_with_retry("get_user_progress", || self.store.get_user_progress(user_id))
            .await
    }

    /// Most recent check-ins first, `limit` defaults to 10
    pub async fn recent_check_ins(
        &self,
        user_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<CheckInEvent>, ProgressionError> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_CHECK_INS).max(0);
        self.read_with_retry("list_check_ins", || {
            self.store.list_check_ins(user_id, None, Some(limit))
        })
        .await
    }

    /// Points earned per check-in over the last `days` days, oldest first
    pub async fn points_evolution(
        &self,
        user_id: &str,
        days: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PointsSample>, ProgressionError> {
        let days = days.unwrap_or(DEFAULT_EVOLUTION_DAYS).max(0);
        let since = now - chrono::Duration::days(days);

        let check_ins = self
            .read_with_retry("list_check_ins", || {
                self.store.list_check_ins(user_id, Some(since), None)
            })
            .await?;

        Ok(check_ins
            .into_iter()
            .rev()
            .map(|check_in| PointsSample {
                occurred_at: check_in.occurred_at,
                points_earned: check_in.points_earned,
            })
            .collect())
    }

    pub async fn ranking(
        &self,
        gym_id: &str,
        period: RankingPeriod,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankingEntry>, ProgressionError> {
        let since = period.since(now);
        self.read_with_retry("get_ranking", || {
            self.store
                .get_ranking(gym_id, since, self.config.ranking_limit)
        })
        .await
    }

    pub async fn user_challenges(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserChallengeProgress>, ProgressionError> {
        self.read_with_retry("get_user_challenge_progress", || {
            self.store.get_user_challenge_progress(user_id)
        })
        .await
    }

    /// Unlocked badges, most recent first
    pub async fn user_badges(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserBadgeUnlock>, ProgressionError> {
        self.read_with_retry("get_user_badge_unlocks", || {
            self.store.get_user_badge_unlocks(user_id)
        })
        .await
    }

    /// Reward catalog, cheapest first
    pub async fn rewards(&self) -> Result<Vec<Reward>, ProgressionError> {
        let mut rewards = self
            .read_with_retry("list_rewards", || self.store.list_rewards())
            .await?;
        rewards.sort_by_key(|reward| reward.points_required);
        Ok(rewards)
    }

    /// Rewards the user can afford that are still in stock
    pub async fn redeemable_rewards(&self, user_id: &str) -> Result<Vec<Reward>, ProgressionError> {
        let progress = self.progress(user_id).await?;
        Ok(self
            .rewards()
            .await?
            .into_iter()
            .filter(|reward| reward.stock > 0 && progress.points >= reward.points_required)
            .collect())
    }

    /// Inserts the gyms whose name is not registered yet, returning how many were added
    #[instrument(skip(self, names))]
    pub async fn ensure_initial_gyms(&self, names: &[&str]) -> Result<usize, ProgressionError> {
        let existing: HashSet<String> = self
            .read_with_retry("list_gyms", || self.store.list_gyms())
            .await?
            .into_iter()
            .map(|gym| gym.name)
            .collect();

        let mut added = 0;
        let mut seen = HashSet::new();
        for name in names {
            if existing.contains(*name) || !seen.insert(*name) {
                continue;
            }

            match self.store.insert_gym(name).await {
                Ok(gym) => {
                    debug!(gym_id = %gym.id, name = %gym.name, "Gym registered");
                    added += 1;
                }
                // Registered concurrently by someone else
                Err(StoreError::Duplicate(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        if added > 0 {
            info!(added, "Initial gyms registered");
        }
        Ok(added)
    }

    /// Scores the check-in and saves the new progress, recomputing on version conflicts
    async fn record_progress(
        &self,
        request: &CheckInRequest,
        now: DateTime<Utc>,
    ) -> Result<RecordedProgress, ProgressionError> {
        let attempts = self.config.max_conflict_retries + 1;

        (|| self.try_record_progress(request, now))
            .retry(self.config.conflict_backoff())
            .when(|err| matches!(err, ProgressionError::ConcurrencyConflict(_)))
            .notify(|err: &ProgressionError, delay: Duration| {
                warn!(
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Progress changed underneath check-in, recomputing"
                )
            })
            .await
            .map_err(|err| match err {
                ProgressionError::ConcurrencyConflict(reason) => {
                    ProgressionError::CheckInFailed { attempts, reason }
                }
                other => other,
            })
    }

    async fn try_record_progress(
        &self,
        request: &CheckInRequest,
        now: DateTime<Utc>,
    ) -> Result<RecordedProgress, ProgressionError> {
        let previous = self.progress(&request.user_id).await?;
        let last_check_in = self
            .read_with_retry("get_last_check_in", || {
                self.store.get_last_check_in(&request.user_id)
            })
            .await?;
        let previous_check_in_at = last_check_in
            .map(|check_in| check_in.occurred_at)
            .or(previous.last_check_in_at);

        let breakdown = self.scorer.score(&previous);
        let streak = self.streaks.next_streak(
            previous_check_in_at,
            now,
            previous.current_streak,
            previous.longest_streak,
        );

        let mut updated = previous.clone();
        updated.points += breakdown.total;
        updated.xp += breakdown.total;
        updated.level = self.levels.level_for(updated.xp);
        updated.current_streak = streak.new_streak;
        updated.longest_streak = streak.new_longest;
        updated.total_workouts += 1;
        updated.last_check_in_at = Some(now);
        updated.validate(self.levels.xp_per_level())?;

        let saved = self
            .store
            .save_user_progress(&updated, previous.version)
            .await?;
        debug!(version = saved.version, "Progress saved");

        Ok(RecordedProgress {
            previous,
            saved,
            breakdown,
            streak,
        })
    }

    /// Puts the pre-check-in counters back after the check-in could not be stored
    async fn restore_progress(&self, recorded: &RecordedProgress) {
        match self
            .store
            .save_user_progress(&recorded.previous, recorded.saved.version)
            .await
        {
            Ok(restored) => debug!(version = restored.version, "Previous progress restored"),
            Err(err) => error!(
                error = %err,
                user_id = %recorded.previous.user_id,
                "Could not restore progress after failed check-in"
            ),
        }
    }

    async fn evaluate_challenges(
        &self,
        progress: UserProgress,
        now: DateTime<Utc>,
        failures: &mut Vec<ItemFailure>,
    ) -> (UserProgress, Vec<ChallengeAward>) {
        let user_id = progress.user_id.clone();

        let definitions = self
            .read_with_retry("list_active_challenges", || {
                self.store.list_active_challenges()
            })
            .await;
        let prior = self
            .read_with_retry("get_user_challenge_progress", || {
                self.store.get_user_challenge_progress(&user_id)
            })
            .await;

        let (definitions, prior) = match (definitions, prior) {
            (Ok(definitions), Ok(prior)) => (definitions, prior),
            (Err(err), _) | (_, Err(err)) => {
                warn!(error = %err, "Skipping challenge evaluation");
                failures.push(ItemFailure::new("challenges", err));
                return (progress, Vec::new());
            }
        };

        let measurements =
            collect_all(&self.challenge_collectors, self.store.as_ref(), &progress, now).await;
        let evaluation = self
            .challenges
            .evaluate(&user_id, &definitions, &prior, &measurements, now);
        failures.extend(evaluation.failures);

        let mut written = HashSet::new();
        for record in &evaluation.updates {
            match self.store.upsert_user_challenge_progress(record).await {
                Ok(()) => {
                    written.insert(record.challenge_id.clone());
                }
                Err(err) => {
                    warn!(
                        challenge_id = %record.challenge_id,
                        error = %err,
                        "Challenge progress write failed"
                    );
                    failures.push(ItemFailure::new(&record.challenge_id, err.into()));
                }
            }
        }

        // A reward is only paid for a completion that is actually on record
        let awards: Vec<ChallengeAward> = evaluation
            .awards
            .into_iter()
            .filter(|award| written.contains(&award.challenge_id))
            .collect();
        if awards.is_empty() {
            return (progress, awards);
        }

        match self.apply_awards(&user_id, &awards).await {
            Ok(rewarded) => (rewarded, awards),
            Err(err) => {
                error!(error = %err, "Challenge rewards could not be credited");
                self.reopen_completions(&evaluation.updates, &awards).await;
                failures.extend(
                    awards
                        .iter()
                        .map(|award| ItemFailure::new(&award.challenge_id, err.clone())),
                );
                (progress, Vec::new())
            }
        }
    }

    /// Writes unpaid completions back as incomplete so the next check-in
    /// observes the transition again and pays the reward then
    async fn reopen_completions(
        &self,
        updates: &[UserChallengeProgress],
        awards: &[ChallengeAward],
    ) {
        for award in awards {
            let Some(record) = updates
                .iter()
                .find(|record| record.challenge_id == award.challenge_id)
            else {
                continue;
            };

            let reopened = UserChallengeProgress {
                completed: false,
                completed_at: None,
                ..record.clone()
            };
            if let Err(err) = self.store.upsert_user_challenge_progress(&reopened).await {
                error!(
                    challenge_id = %award.challenge_id,
                    error = %err,
                    "Could not reopen challenge after failed reward"
                );
            }
        }
    }

    /// Credits the rewards on top of the latest stored progress
    async fn apply_awards(
        &self,
        user_id: &str,
        awards: &[ChallengeAward],
    ) -> Result<UserProgress, ProgressionError> {
        (|| async move {
            let current = self.progress(user_id).await?;
            let rewarded = ChallengeEvaluator::apply_awards(&current, awards, &self.levels);
            let saved = self
                .store
                .save_user_progress(&rewarded, current.version)
                .await?;
            Ok::<UserProgress, ProgressionError>(saved)
        })
        .retry(self.config.conflict_backoff())
        .when(|err| matches!(err, ProgressionError::ConcurrencyConflict(_)))
        .notify(|err: &ProgressionError, delay: Duration| {
            warn!(
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Progress changed before rewards, re-reading"
            )
        })
        .await
    }

    async fn evaluate_badges(
        &self,
        progress: &UserProgress,
        now: DateTime<Utc>,
        failures: &mut Vec<ItemFailure>,
    ) -> Vec<String> {
        let definitions = self
            .read_with_retry("list_badges", || self.store.list_badges())
            .await;
        let unlocks = self
            .read_with_retry("get_user_badge_unlocks", || {
                self.store.get_user_badge_unlocks(&progress.user_id)
            })
            .await;

        let (definitions, already_unlocked) = match (definitions, unlocks) {
            (Ok(definitions), Ok(unlocks)) => (
                definitions,
                unlocks
                    .into_iter()
                    .map(|unlock| unlock.badge_id)
                    .collect::<HashSet<_>>(),
            ),
            (Err(err), _) | (_, Err(err)) => {
                warn!(error = %err, "Skipping badge evaluation");
                failures.push(ItemFailure::new("badges", err));
                return Vec::new();
            }
        };

        let measurements =
            collect_all(&self.badge_collectors, self.store.as_ref(), progress, now).await;
        let evaluation =
            self.badges
                .evaluate(progress, &definitions, &already_unlocked, &measurements);
        failures.extend(evaluation.failures);

        let mut unlocked = Vec::new();
        for badge_id in evaluation.unlocked {
            match self
                .store
                .insert_user_badge_unlock(&progress.user_id, &badge_id, now)
                .await
            {
                Ok(true) => unlocked.push(badge_id),
                Ok(false) => debug!(badge_id = %badge_id, "Badge already unlocked"),
                Err(err) => {
                    warn!(badge_id = %badge_id, error = %err, "Badge unlock write failed");
                    failures.push(ItemFailure::new(&badge_id, err.into()));
                }
            }
        }
        unlocked
    }

    async fn publish(&self, outcome: &CheckInOutcome, previous_level: i64) {
        let Some(bus) = &self.event_bus else {
            return;
        };
        let user_id = &outcome.check_in.user_id;

        bus.emit(ProgressionEvent::CheckInRecorded {
            user_id: user_id.clone(),
            check_in_id: outcome.check_in.id.clone(),
            points_earned: outcome.check_in.points_earned,
        })
        .await;

        if outcome.leveled_up {
            bus.emit(ProgressionEvent::LeveledUp {
                user_id: user_id.clone(),
                previous_level,
                level: outcome.new_level,
            })
            .await;
        }

        for award in &outcome.completed_challenges {
            bus.emit(ProgressionEvent::ChallengeCompleted {
                user_id: user_id.clone(),
                challenge_id: award.challenge_id.clone(),
                reward_points: award.reward_points,
            })
            .await;
        }

        for badge_id in &outcome.unlocked_badges {
            bus.emit(ProgressionEvent::BadgeUnlocked {
                user_id: user_id.clone(),
                badge_id: badge_id.clone(),
            })
            .await;
        }
    }

    /// Retries a store read that fails transiently, with exponential backoff and jitter
    async fn read_with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        read: F,
    ) -> Result<T, ProgressionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        read.retry(self.config.read_backoff())
            .when(|err| matches!(err, StoreError::Transient(_)))
            .notify(|err: &StoreError, delay: Duration| {
                warn!(
                    operation,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient store error, retrying"
                )
            })
            .await
            .map_err(ProgressionError::from)
    }

    async fn user_lock(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        {
            let guard = self.user_mutexes.read().await;
            if let Some(lock) = guard.get(user_id) {
                return lock.clone();
            }
        }

        let mut guard = self.user_mutexes.write().await;
        guard
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drops the user's lock entry unless another check-in is holding or awaiting it
    async fn release_user_lock(&self, user_id: &str, lock: Arc<AsyncMutex<()>>) {
        let mut guard = self.user_mutexes.write().await;
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            guard.remove(user_id);
        }
    }
}

/// Assembles a CheckInService.
///
/// The default collectors are built from the final config, so `with_config`
/// may come in any order. A custom collector for a kind that already has a
/// default one takes precedence.
pub struct CheckInServiceBuilder {
    store: Arc<dyn RecordStore>,
    config: EngineConfig,
    event_bus: Option<EventBus>,
    challenge_collectors: Vec<Arc<dyn MeasurementCollector>>,
    badge_collectors: Vec<Arc<dyn MeasurementCollector>>,
}

impl CheckInServiceBuilder {
    fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            event_bus: None,
            challenge_collectors: Vec::new(),
            badge_collectors: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_challenge_collector(mut self, collector: Arc<dyn MeasurementCollector>) -> Self {
        self.challenge_collectors.push(collector);
        self
    }

    pub fn with_badge_collector(mut self, collector: Arc<dyn MeasurementCollector>) -> Self {
        self.badge_collectors.push(collector);
        self
    }

    pub fn build(self) -> CheckInService {
        let config = self.config;

        let mut challenge_collectors: Vec<Arc<dyn MeasurementCollector>> = vec![
            Arc::new(PeriodCheckInsCollector::weekly(config.week_start)),
            Arc::new(PeriodCheckInsCollector::monthly()),
            Arc::new(CurrentStreakCollector::new()),
        ];
        challenge_collectors.extend(self.challenge_collectors);

        let mut badge_collectors: Vec<Arc<dyn MeasurementCollector>> = vec![
            Arc::new(CheckInTypeCollector::morning()),
            Arc::new(CheckInTypeCollector::night()),
            Arc::new(MonthlyGymRankCollector::new(config.ranking_limit)),
        ];
        badge_collectors.extend(self.badge_collectors);

        CheckInService {
            store: self.store,
            scorer: CheckInScorer::new(config.clone()),
            streaks: StreakTracker::new(),
            levels: LevelCalculator::new(config.xp_per_level),
            challenges: ChallengeEvaluator::new(),
            badges: BadgeEvaluator::new(),
            challenge_collectors,
            badge_collectors,
            event_bus: self.event_bus,
            user_mutexes: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::{
        Badge, BadgeRequirement, Challenge, ChallengeStatus, ChallengeType, InMemoryRecordStore,
    };
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 12, 18, 0, 0).unwrap()
    }

    fn service(store: Arc<InMemoryRecordStore>) -> CheckInService {
        CheckInService::builder(store).build()
    }

    #[tokio::test]
    async fn first_check_in_scores_base_points() {
        let store = Arc::new(
            InMemoryRecordStore::new().with_user(UserProgress::new("alice", Some("gym-1".into()))),
        );
        let service = service(store.clone());

        let outcome = service
            .check_in(CheckInRequest::new("alice", "gym-1").at(now()))
            .await
            .unwrap();

        // level 1, streak 0: 150 + 0 + 2
        assert_eq!(outcome.breakdown.total, 152);
        assert_eq!(outcome.new_streak, 1);
        assert_eq!(outcome.progress.points, 152);
        assert_eq!(outcome.progress.total_workouts, 1);
        assert_eq!(outcome.progress.version, 1);
        assert!(!outcome.leveled_up);
        assert_eq!(store.check_in_count().await, 1);
    }

    #[tokio::test]
    async fn streak_and_level_bonus_feed_the_score() {
        let mut alice = UserProgress::new("alice", Some("gym-1".into()));
        alice.xp = 2999;
        alice.points = 2999;
        alice.level = 1;
        alice.current_streak = 3;
        alice.longest_streak = 3;
        alice.total_workouts = 3;
        alice.last_check_in_at = Some(now() - chrono::Duration::hours(30));

        let store = Arc::new(InMemoryRecordStore::new().with_user(alice));
        let outcome = service(store)
            .check_in(CheckInRequest::new("alice", "gym-1").at(now()))
            .await
            .unwrap();

        assert_eq!(outcome.breakdown.total, 150 + 15 + 2);
        assert_eq!(outcome.new_streak, 4);
        assert_eq!(outcome.progress.xp, 2999 + 167);
        assert_eq!(outcome.new_level, 2);
        assert!(outcome.leveled_up);
    }

    #[tokio::test]
    async fn challenge_reward_is_credited_once() {
        let store = Arc::new(
            InMemoryRecordStore::new()
                .with_user(UserProgress::new("alice", Some("gym-1".into())))
                .with_challenge(Challenge {
                    id: "first-visit".into(),
                    name: "First visit".into(),
                    challenge_type: ChallengeType::Monthly,
                    goal_value: 1,
                    reward_points: 1000,
                    status: ChallengeStatus::Active,
                }),
        );
        let service = service(store);

        let first = service
            .check_in(CheckInRequest::new("alice", "gym-1").at(now()))
            .await
            .unwrap();
        assert_eq!(first.completed_challenges.len(), 1);
        assert_eq!(first.progress.points, 152 + 1000);

        let second = service
            .check_in(CheckInRequest::new("alice", "gym-1").at(now() + chrono::Duration::hours(1)))
            .await
            .unwrap();
        assert!(second.completed_challenges.is_empty());
        assert_eq!(second.progress.points, first.progress.points + second.breakdown.total);
    }

    #[tokio::test]
    async fn first_workout_badge_unlocks_once() {
        let store = Arc::new(
            InMemoryRecordStore::new()
                .with_user(UserProgress::new("alice", Some("gym-1".into())))
                .with_badge(Badge {
                    id: "first".into(),
                    name: "First workout".into(),
                    requirement: BadgeRequirement::FirstWorkout,
                    requirement_value: 1,
                }),
        );
        let service = service(store);

        let first = service
            .check_in(CheckInRequest::new("alice", "gym-1").at(now()))
            .await
            .unwrap();
        assert_eq!(first.unlocked_badges, vec!["first".to_string()]);

        let second = service
            .check_in(CheckInRequest::new("alice", "gym-1").at(now()))
            .await
            .unwrap();
        assert!(second.unlocked_badges.is_empty());
        assert_eq!(service.user_badges("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_blank_identifiers() {
        let service = service(Arc::new(InMemoryRecordStore::new()));

        let result = service.check_in(CheckInRequest::new(" ", "gym-1")).await;
        assert!(matches!(result, Err(ProgressionError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let service = service(Arc::new(InMemoryRecordStore::new()));

        let result = service.check_in(CheckInRequest::new("ghost", "gym-1")).await;
        assert!(matches!(result, Err(ProgressionError::NotFound(_))));
    }

    #[tokio::test]
    async fn emits_events_for_subscribers() {
        let store = Arc::new(
            InMemoryRecordStore::new().with_user(UserProgress::new("alice", Some("gym-1".into()))),
        );
        let bus = EventBus::new(16);
        let mut events = bus.subscribe("alice").await;
        let service = CheckInService::builder(store).with_event_bus(bus).build();

        service
            .check_in(CheckInRequest::new("alice", "gym-1").at(now()))
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.event_type(), "check_in_recorded");
    }

    #[tokio::test]
    async fn redeemable_rewards_respect_points_and_stock() {
        let mut alice = UserProgress::new("alice", None);
        alice.points = 500;
        let reward = |id: &str, cost: i64, stock: i64| Reward {
            id: id.into(),
            name: id.into(),
            points_required: cost,
            stock,
        };
        let store = Arc::new(
            InMemoryRecordStore::new()
                .with_user(alice)
                .with_reward(reward("shirt", 1000, 5))
                .with_reward(reward("bottle", 300, 2))
                .with_reward(reward("towel", 200, 0)),
        );
        let service = service(store);

        let all = service.rewards().await.unwrap();
        let costs: Vec<i64> = all.iter().map(|r| r.points_required).collect();
        assert_eq!(costs, vec![200, 300, 1000]);

        let redeemable = service.redeemable_rewards("alice").await.unwrap();
        assert_eq!(redeemable.len(), 1);
        assert_eq!(redeemable[0].id, "bottle");
    }

    #[tokio::test]
    async fn ensure_initial_gyms_only_adds_missing() {
        let service = service(Arc::new(InMemoryRecordStore::new()));

        let added = service
            .ensure_initial_gyms(&["Downtown", "Riverside", "Downtown"])
            .await
            .unwrap();
        assert_eq!(added, 2);

        let added = service
            .ensure_initial_gyms(&["Downtown", "Uptown"])
            .await
            .unwrap();
        assert_eq!(added, 1);
    }

    #[tokio::test]
    async fn user_locks_are_released_after_check_in() {
        let store = Arc::new(
            InMemoryRecordStore::new()
                .with_user(UserProgress::new("alice", Some("gym-1".into())))
                .with_user(UserProgress::new("bob", Some("gym-1".into()))),
        );
        let service = service(store);

        for user_id in ["alice", "bob", "alice"] {
            service
                .check_in(CheckInRequest::new(user_id, "gym-1").at(now()))
                .await
                .unwrap();
        }
        // Failed check-ins release their lock too
        let _ = service.check_in(CheckInRequest::new("ghost", "gym-1")).await;

        assert!(service.user_mutexes.read().await.is_empty());
    }

    #[tokio::test]
    async fn waiting_check_in_keeps_the_lock_entry() {
        let service = service(Arc::new(InMemoryRecordStore::new()));

        let held = service.user_lock("alice").await;
        let waiting = service.user_lock("alice").await;
        service.release_user_lock("alice", held).await;
        assert_eq!(service.user_mutexes.read().await.len(), 1);

        service.release_user_lock("alice", waiting).await;
        assert!(service.user_mutexes.read().await.is_empty());
    }
}
