use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    ranking::{self, RankingPeriod},
    Badge, Challenge, CheckInEvent, CheckInType, Gym, NewCheckIn, RankingEntry, Reward,
    StoreError, UserBadgeUnlock, UserChallengeProgress, UserProgress,
};

/// Data access used by the progression engine.
///
/// Every method may fail with a transient error the caller retries with
/// backoff. `save_user_progress` is a compare-and-swap on `version`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_user_progress(&self, user_id: &str) -> Result<UserProgress, StoreError>;

    /// Persists `progress` if the stored version still equals `expected_version`,
    /// returning the saved copy with its bumped version
    async fn save_user_progress(
        &self,
        progress: &UserProgress,
        expected_version: i64,
    ) -> Result<UserProgress, StoreError>;

    async fn insert_check_in(&self, check_in: NewCheckIn) -> Result<CheckInEvent, StoreError>;
    async fn get_last_check_in(&self, user_id: &str) -> Result<Option<CheckInEvent>, StoreError>;

    /// Check-ins of a user, most recent first
    async fn list_check_ins(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<CheckInEvent>, StoreError>;

    async fn count_check_ins(
        &self,
        user_id: &str,
        check_in_type: Option<CheckInType>,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, StoreError>;

    async fn list_active_challenges(&self) -> Result<Vec<Challenge>, StoreError>;
    async fn get_user_challenge_progress(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserChallengeProgress>, StoreError>;
    async fn upsert_user_challenge_progress(
        &self,
        progress: &UserChallengeProgress,
    ) -> Result<(), StoreError>;

    /// Badge definitions ordered by requirement value
    async fn list_badges(&self) -> Result<Vec<Badge>, StoreError>;
    /// Unlocks of a user, most recent first
    async fn get_user_badge_unlocks(&self, user_id: &str)
        -> Result<Vec<UserBadgeUnlock>, StoreError>;
    /// Returns false when the pair was already unlocked
    async fn insert_user_badge_unlock(
        &self,
        user_id: &str,
        badge_id: &str,
        unlocked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn get_ranking(
        &self,
        gym_id: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RankingEntry>, StoreError>;

    async fn get_monthly_ranking(
        &self,
        gym_id: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RankingEntry>, StoreError> {
        self.get_ranking(gym_id, RankingPeriod::Monthly.since(now), limit)
            .await
    }

    /// Rewards ordered by cost
    async fn list_rewards(&self) -> Result<Vec<Reward>, StoreError>;
    async fn list_gyms(&self) -> Result<Vec<Gym>, StoreError>;
    async fn insert_gym(&self, name: &str) -> Result<Gym, StoreError>;
}

#[derive(Debug, Default)]
struct StoreState {
    users: HashMap<String, UserProgress>,
    check_ins: Vec<CheckInEvent>,
    challenges: Vec<Challenge>,
    challenge_progress: HashMap<(String, String), UserChallengeProgress>,
    badges: Vec<Badge>,
    badge_unlocks: Vec<UserBadgeUnlock>,
    rewards: Vec<Reward>,
    gyms: Vec<Gym>,
}

/// In-memory implementation of RecordStore for development and testing
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<StoreState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, progress: UserProgress) -> Self {
        self.state
            .get_mut()
            .users
            .insert(progress.user_id.clone(), progress);
        self
    }

    pub fn with_challenge(mut self, challenge: Challenge) -> Self {
        self.state.get_mut().challenges.push(challenge);
        self
    }

    pub fn with_badge(mut self, badge: Badge) -> Self {
        self.state.get_mut().badges.push(badge);
        self
    }

    pub fn with_reward(mut self, reward: Reward) -> Self {
        self.state.get_mut().rewards.push(reward);
        self
    }

    /// Seeds a historical check-in without touching user progress
    pub fn with_check_in(mut self, check_in: CheckInEvent) -> Self {
        self.state.get_mut().check_ins.push(check_in);
        self
    }

    pub async fn insert_user(&self, progress: UserProgress) {
        let mut state = self.state.write().await;
        state.users.insert(progress.user_id.clone(), progress);
    }

    pub async fn check_in_count(&self) -> usize {
        self.state.read().await.check_ins.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    #[instrument(skip(self))]
    async fn get_user_progress(&self, user_id: &str) -> Result<UserProgress, StoreError> {
        let state = self.state.read().await;
        state
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
    }

    #[instrument(skip(self, progress), fields(user_id = %progress.user_id))]
    async fn save_user_progress(
        &self,
        progress: &UserProgress,
        expected_version: i64,
    ) -> Result<UserProgress, StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .users
            .get_mut(&progress.user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", progress.user_id)))?;

        if stored.version != expected_version {
            warn!(
                expected = expected_version,
                actual = stored.version,
                "Rejecting stale progress write"
            );
            return Err(StoreError::Conflict {
                expected: expected_version,
                actual: stored.version,
            });
        }

        let mut saved = progress.clone();
        saved.version = expected_version + 1;
        *stored = saved.clone();

        debug!(version = saved.version, "Progress saved in memory");
        Ok(saved)
    }

    #[instrument(skip(self, check_in), fields(user_id = %check_in.user_id))]
    async fn insert_check_in(&self, check_in: NewCheckIn) -> Result<CheckInEvent, StoreError> {
        let event = CheckInEvent::from_new(Uuid::new_v4().to_string(), check_in);
        let mut state = self.state.write().await;
        state.check_ins.push(event.clone());

        debug!(check_in_id = %event.id, "Check-in stored in memory");
        Ok(event)
    }

    async fn get_last_check_in(&self, user_id: &str) -> Result<Option<CheckInEvent>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .check_ins
            .iter()
            .filter(|c| c.user_id == user_id)
            .max_by_key(|c| c.occurred_at)
            .cloned())
    }

    async fn list_check_ins(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<CheckInEvent>, StoreError> {
        let state = self.state.read().await;
        let mut check_ins: Vec<CheckInEvent> = state
            .check_ins
            .iter()
            .filter(|c| c.user_id == user_id)
            .filter(|c| since.map_or(true, |since| c.occurred_at >= since))
            .cloned()
            .collect();

        check_ins.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        if let Some(limit) = limit {
            check_ins.truncate(limit.max(0) as usize);
        }
        Ok(check_ins)
    }

    async fn count_check_ins(
        &self,
        user_id: &str,
        check_in_type: Option<CheckInType>,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, StoreError> {
        let state = self.state.read().await;
        let count = state
            .check_ins
            .iter()
            .filter(|c| c.user_id == user_id)
            .filter(|c| check_in_type.map_or(true, |t| c.check_in_type == t))
            .filter(|c| since.map_or(true, |since| c.occurred_at >= since))
            .count();
        Ok(count as i64)
    }

    async fn list_active_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .challenges
            .iter()
            .filter(|c| c.is_active())
            .cloned()
            .collect())
    }

    async fn get_user_challenge_progress(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserChallengeProgress>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<UserChallengeProgress> = state
            .challenge_progress
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.challenge_id.cmp(&b.challenge_id));
        Ok(records)
    }

    #[instrument(
        skip(self, progress),
        fields(user_id = %progress.user_id, challenge_id = %progress.challenge_id)
    )]
    async fn upsert_user_challenge_progress(
        &self,
        progress: &UserChallengeProgress,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.challenge_progress.insert(
            (progress.user_id.clone(), progress.challenge_id.clone()),
            progress.clone(),
        );
        debug!(
            progress = progress.progress,
            completed = progress.completed,
            "Challenge progress upserted in memory"
        );
        Ok(())
    }

    async fn list_badges(&self) -> Result<Vec<Badge>, StoreError> {
        let state = self.state.read().await;
        let mut badges = state.badges.clone();
        badges.sort_by_key(|b| b.requirement_value);
        Ok(badges)
    }

    async fn get_user_badge_unlocks(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserBadgeUnlock>, StoreError> {
        let state = self.state.read().await;
        let mut unlocks: Vec<UserBadgeUnlock> = state
            .badge_unlocks
            .iter()
            .filter(|u| u.user_id == user_id)
            .cloned()
            .collect();
        unlocks.sort_by(|a, b| b.unlocked_at.cmp(&a.unlocked_at));
        Ok(unlocks)
    }

    #[instrument(skip(self))]
    async fn insert_user_badge_unlock(
        &self,
        user_id: &str,
        badge_id: &str,
        unlocked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let exists = state
            .badge_unlocks
            .iter()
            .any(|u| u.user_id == user_id && u.badge_id == badge_id);

        if exists {
            debug!("Badge already unlocked, ignoring insert");
            return Ok(false);
        }

        state.badge_unlocks.push(UserBadgeUnlock {
            user_id: user_id.to_string(),
            badge_id: badge_id.to_string(),
            unlocked_at,
        });
        Ok(true)
    }

    async fn get_ranking(
        &self,
        gym_id: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RankingEntry>, StoreError> {
        let state = self.state.read().await;
        let mut totals: HashMap<String, i64> = HashMap::new();
        for check_in in state
            .check_ins
            .iter()
            .filter(|c| c.gym_id == gym_id && c.occurred_at >= since)
        {
            *totals.entry(check_in.user_id.clone()).or_default() += check_in.points_earned;
        }
        Ok(ranking::rank_entries(totals, limit.max(0) as usize))
    }

    async fn list_rewards(&self) -> Result<Vec<Reward>, StoreError> {
        let state = self.state.read().await;
        let mut rewards = state.rewards.clone();
        rewards.sort_by_key(|r| r.points_required);
        Ok(rewards)
    }

    async fn list_gyms(&self) -> Result<Vec<Gym>, StoreError> {
        let state = self.state.read().await;
        let mut gyms = state.gyms.clone();
        gyms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(gyms)
    }

    #[instrument(skip(self))]
    async fn insert_gym(&self, name: &str) -> Result<Gym, StoreError> {
        let mut state = self.state.write().await;
        if state.gyms.iter().any(|g| g.name == name) {
            return Err(StoreError::Duplicate(format!("gym {}", name)));
        }

        let gym = Gym {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            members_count: 0,
        };
        state.gyms.push(gym.clone());
        Ok(gym)
    }
}
