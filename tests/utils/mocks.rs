#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use gymrank::{
    progression::{
        Badge, Challenge, CheckInEvent, CheckInType, Gym, NewCheckIn, RankingEntry, Reward,
        UserBadgeUnlock, UserChallengeProgress, UserProgress,
    },
    InMemoryRecordStore, RecordStore, StoreError,
};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Wraps the in-memory store and injects failures on demand
pub struct FaultyRecordStore {
    pub inner: Arc<InMemoryRecordStore>,
    transient_progress_reads: AtomicU32,
    conflicting_saves: AtomicU32,
    save_faults: Mutex<HashMap<u32, StoreError>>,
    fail_check_in_insert: AtomicBool,
    fail_counts: AtomicBool,
    failing_badge_unlocks: Mutex<HashSet<String>>,
    failing_challenge_writes: Mutex<HashSet<String>>,
    pub progress_reads: AtomicU32,
    pub save_attempts: AtomicU32,
}

impl FaultyRecordStore {
    pub fn new(inner: InMemoryRecordStore) -> Self {
        Self {
            inner: Arc::new(inner),
            transient_progress_reads: AtomicU32::new(0),
            conflicting_saves: AtomicU32::new(0),
            save_faults: Mutex::new(HashMap::new()),
            fail_check_in_insert: AtomicBool::new(false),
            fail_counts: AtomicBool::new(false),
            failing_badge_unlocks: Mutex::new(HashSet::new()),
            failing_challenge_writes: Mutex::new(HashSet::new()),
            progress_reads: AtomicU32::new(0),
            save_attempts: AtomicU32::new(0),
        }
    }

    /// The next `times` progress reads fail transiently
    pub fn failing_progress_reads(self, times: u32) -> Self {
        self.transient_progress_reads.store(times, Ordering::SeqCst);
        self
    }

    /// The next `times` progress saves lose the version race
    pub fn conflicting_saves(self, times: u32) -> Self {
        self.conflicting_saves.store(times, Ordering::SeqCst);
        self
    }

    /// The `number`-th progress save (1-based, counting every attempt) fails with `error`
    pub fn failing_save(self, number: u32, error: StoreError) -> Self {
        self.save_faults.lock().unwrap().insert(number, error);
        self
    }

    pub fn failing_check_in_insert(self) -> Self {
        self.fail_check_in_insert.store(true, Ordering::SeqCst);
        self
    }

    /// Every check-in count query fails
    pub fn failing_counts(self) -> Self {
        self.fail_counts.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_badge_unlock(self, badge_id: &str) -> Self {
        self.failing_badge_unlocks
            .lock()
            .unwrap()
            .insert(badge_id.to_string());
        self
    }

    pub fn failing_challenge_write(self, challenge_id: &str) -> Self {
        self.failing_challenge_writes
            .lock()
            .unwrap()
            .insert(challenge_id.to_string());
        self
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RecordStore for FaultyRecordStore {
    async fn get_user_progress(&self, user_id: &str) -> Result<UserProgress, StoreError> {
        self.progress_reads.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.transient_progress_reads) {
            return Err(StoreError::Transient("connection reset".into()));
        }
        self.inner.get_user_progress(user_id).await
    }

    async fn save_user_progress(
        &self,
        progress: &UserProgress,
        expected_version: i64,
    ) -> Result<UserProgress, StoreError> {
        let attempt = self.save_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let fault = self.save_faults.lock().unwrap().remove(&attempt);
        if let Some(error) = fault {
            return Err(error);
        }
        if Self::take(&self.conflicting_saves) {
            return Err(StoreError::Conflict {
                expected: expected_version,
                actual: expected_version + 1,
            });
        }
        self.inner.save_user_progress(progress, expected_version).await
    }

    async fn insert_check_in(&self, check_in: NewCheckIn) -> Result<CheckInEvent, StoreError> {
        if self.fail_check_in_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Transient("check_ins table unavailable".into()));
        }
        self.inner.insert_check_in(check_in).await
    }

    async fn get_last_check_in(&self, user_id: &str) -> Result<Option<CheckInEvent>, StoreError> {
        self.inner.get_last_check_in(user_id).await
    }

    async fn list_check_ins(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<CheckInEvent>, StoreError> {
        self.inner.list_check_ins(user_id, since, limit).await
    }

    async fn count_check_ins(
        &self,
        user_id: &str,
        check_in_type: Option<CheckInType>,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, StoreError> {
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(StoreError::Transient("count timed out".into()));
        }
        self.inner
            .count_check_ins(user_id, check_in_type, since)
            .await
    }

    async fn list_active_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        self.inner.list_active_challenges().await
    }

    async fn get_user_challenge_progress(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserChallengeProgress>, StoreError> {
        self.inner.get_user_challenge_progress(user_id).await
    }

    async fn upsert_user_challenge_progress(
        &self,
        progress: &UserChallengeProgress,
    ) -> Result<(), StoreError> {
        if self
            .failing_challenge_writes
            .lock()
            .unwrap()
            .contains(&progress.challenge_id)
        {
            return Err(StoreError::Transient("write timed out".into()));
        }
        self.inner.upsert_user_challenge_progress(progress).await
    }

    async fn list_badges(&self) -> Result<Vec<Badge>, StoreError> {
        self.inner.list_badges().await
    }

    async fn get_user_badge_unlocks(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserBadgeUnlock>, StoreError> {
        self.inner.get_user_badge_unlocks(user_id).await
    }

    async fn insert_user_badge_unlock(
        &self,
        user_id: &str,
        badge_id: &str,
        unlocked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if self.failing_badge_unlocks.lock().unwrap().contains(badge_id) {
            return Err(StoreError::Transient("write timed out".into()));
        }
        self.inner
            .insert_user_badge_unlock(user_id, badge_id, unlocked_at)
            .await
    }

    async fn get_ranking(
        &self,
        gym_id: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RankingEntry>, StoreError> {
        self.inner.get_ranking(gym_id, since, limit).await
    }

    async fn list_rewards(&self) -> Result<Vec<Reward>, StoreError> {
        self.inner.list_rewards().await
    }

    async fn list_gyms(&self) -> Result<Vec<Gym>, StoreError> {
        self.inner.list_gyms().await
    }

    async fn insert_gym(&self, name: &str) -> Result<Gym, StoreError> {
        self.inner.insert_gym(name).await
    }
}
