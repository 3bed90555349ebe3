use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::str::FromStr;
use tracing::{debug, instrument, warn};

use super::{
    Badge, Challenge, CheckInEvent, CheckInType, Gym, NewCheckIn, RankingEntry, RecordStore,
    Reward, StoreError, UserBadgeUnlock, UserChallengeProgress, UserProgress,
};

const USER_COLUMNS: &str = "id AS user_id, gym_id, points, xp, level, current_streak, \
     longest_streak, total_workouts, last_check_in_at, version";

const CHECK_IN_COLUMNS: &str =
    "id::text AS id, user_id, gym_id, check_in_type, points_earned, timestamp AS occurred_at";

/// PostgreSQL implementation of the record store
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_column<T: FromStr>(row: &PgRow, column: &str) -> Result<T, StoreError> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| StoreError::InvalidData(format!("{} has unknown value {}", column, raw)))
}

fn check_in_from_row(row: &PgRow) -> Result<CheckInEvent, StoreError> {
    Ok(CheckInEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        gym_id: row.try_get("gym_id")?,
        check_in_type: parse_column(row, "check_in_type")?,
        points_earned: row.try_get("points_earned")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self))]
    async fn get_user_progress(&self, user_id: &str) -> Result<UserProgress, StoreError> {
        debug!("Fetching user progress from database");

        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserProgress>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to fetch user progress");
                StoreError::from(e)
            })?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
    }

    #[instrument(skip(self, progress), fields(user_id = %progress.user_id))]
    async fn save_user_progress(
        &self,
        progress: &UserProgress,
        expected_version: i64,
    ) -> Result<UserProgress, StoreError> {
        debug!(expected_version, "Saving user progress with version check");

        let result = sqlx::query(
            "UPDATE users SET points = $3, xp = $4, level = $5, current_streak = $6, \
             longest_streak = $7, total_workouts = $8, last_check_in_at = $9, \
             version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2",
        )
        .bind(&progress.user_id)
        .bind(expected_version)
        .bind(progress.points)
        .bind(progress.xp)
        .bind(progress.level)
        .bind(progress.current_streak)
        .bind(progress.longest_streak)
        .bind(progress.total_workouts)
        .bind(progress.last_check_in_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to save user progress");
            StoreError::from(e)
        })?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM users WHERE id = $1")
                .bind(&progress.user_id)
                .fetch_optional(&self.pool)
                .await?;

            return Err(match actual {
                Some(actual) => {
                    warn!(expected_version, actual, "Stale progress write rejected");
                    StoreError::Conflict {
                        expected: expected_version,
                        actual,
                    }
                }
                None => StoreError::NotFound(format!("user {}", progress.user_id)),
            });
        }

        let mut saved = progress.clone();
        saved.version = expected_version + 1;
        Ok(saved)
    }

    #[instrument(skip(self, check_in), fields(user_id = %check_in.user_id))]
    async fn insert_check_in(&self, check_in: NewCheckIn) -> Result<CheckInEvent, StoreError> {
        let query = format!(
            "INSERT INTO check_ins (user_id, gym_id, check_in_type, points_earned, timestamp) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            CHECK_IN_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(&check_in.user_id)
            .bind(&check_in.gym_id)
            .bind(check_in.check_in_type.as_ref())
            .bind(check_in.points_earned)
            .bind(check_in.occurred_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to insert check-in");
                StoreError::from(e)
            })?;

        let event = check_in_from_row(&row)?;
        debug!(check_in_id = %event.id, "Check-in stored in database");
        Ok(event)
    }

    #[instrument(skip(self))]
    async fn get_last_check_in(&self, user_id: &str) -> Result<Option<CheckInEvent>, StoreError> {
        let query = format!(
            "SELECT {} FROM check_ins WHERE user_id = $1 ORDER BY timestamp DESC LIMIT 1",
            CHECK_IN_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(check_in_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_check_ins(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<CheckInEvent>, StoreError> {
        let query = format!(
            "SELECT {} FROM check_ins WHERE user_id = $1 \
             AND ($2::timestamptz IS NULL OR timestamp >= $2) \
             ORDER BY timestamp DESC LIMIT $3",
            CHECK_IN_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(check_in_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn count_check_ins(
        &self,
        user_id: &str,
        check_in_type: Option<CheckInType>,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM check_ins WHERE user_id = $1 \
             AND ($2::text IS NULL OR check_in_type = $2) \
             AND ($3::timestamptz IS NULL OR timestamp >= $3)",
        )
        .bind(user_id)
        .bind(check_in_type.map(|t| t.to_string()))
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to count check-ins");
            StoreError::from(e)
        })?;

        Ok(count)
    }

    #[instrument(skip(self))]
    async fn list_active_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        let rows = sqlx::query(
            "SELECT id::text AS id, name, type, goal_value, reward_points, status \
             FROM challenges WHERE status = 'active' ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Challenge, StoreError> {
                Ok(Challenge {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    challenge_type: parse_column(row, "type")?,
                    goal_value: row.try_get("goal_value")?,
                    reward_points: row.try_get("reward_points")?,
                    status: parse_column(row, "status")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_user_challenge_progress(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserChallengeProgress>, StoreError> {
        let records = sqlx::query_as::<_, UserChallengeProgress>(
            "SELECT user_id, challenge_id::text AS challenge_id, progress, completed, completed_at \
             FROM user_challenges WHERE user_id = $1 ORDER BY challenge_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

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
        // The evaluator carries completed_at forward; a completion is only
        // written back as incomplete when its reward could not be credited
        sqlx::query(
            "INSERT INTO user_challenges \
             (user_id, challenge_id, progress, completed, completed_at) \
             VALUES ($1, $2::uuid, $3, $4, $5) \
             ON CONFLICT (user_id, challenge_id) DO UPDATE SET \
             progress = EXCLUDED.progress, \
             completed = EXCLUDED.completed, \
             completed_at = EXCLUDED.completed_at",
        )
        .bind(&progress.user_id)
        .bind(&progress.challenge_id)
        .bind(progress.progress)
        .bind(progress.completed)
        .bind(progress.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to upsert challenge progress");
            StoreError::from(e)
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_badges(&self) -> Result<Vec<Badge>, StoreError> {
        let rows = sqlx::query(
            "SELECT id::text AS id, name, requirement_type, requirement_value \
             FROM badges ORDER BY requirement_value",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Badge, StoreError> {
                Ok(Badge {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    requirement: parse_column(row, "requirement_type")?,
                    requirement_value: row.try_get("requirement_value")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_user_badge_unlocks(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserBadgeUnlock>, StoreError> {
        let unlocks = sqlx::query_as::<_, UserBadgeUnlock>(
            "SELECT user_id, badge_id::text AS badge_id, unlocked_at FROM user_badges \
             WHERE user_id = $1 ORDER BY unlocked_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(unlocks)
    }

    #[instrument(skip(self))]
    async fn insert_user_badge_unlock(
        &self,
        user_id: &str,
        badge_id: &str,
        unlocked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO user_badges (user_id, badge_id, unlocked_at) VALUES ($1, $2::uuid, $3) \
             ON CONFLICT (user_id, badge_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(badge_id)
        .bind(unlocked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to insert badge unlock");
            StoreError::from(e)
        })?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!("Badge already unlocked in database");
        }
        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn get_ranking(
        &self,
        gym_id: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RankingEntry>, StoreError> {
        let entries = sqlx::query_as::<_, RankingEntry>(
            "SELECT user_id, SUM(points_earned)::bigint AS points FROM check_ins \
             WHERE gym_id = $1 AND timestamp >= $2 \
             GROUP BY user_id ORDER BY points DESC, user_id ASC LIMIT $3",
        )
        .bind(gym_id)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn list_rewards(&self) -> Result<Vec<Reward>, StoreError> {
        let rewards = sqlx::query_as::<_, Reward>(
            "SELECT id::text AS id, name, points_required, stock FROM rewards \
             ORDER BY points_required",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rewards)
    }

    #[instrument(skip(self))]
    async fn list_gyms(&self) -> Result<Vec<Gym>, StoreError> {
        let gyms = sqlx::query_as::<_, Gym>(
            "SELECT id::text AS id, name, members_count FROM gyms ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(gyms)
    }

    #[instrument(skip(self))]
    async fn insert_gym(&self, name: &str) -> Result<Gym, StoreError> {
        let gym = sqlx::query_as::<_, Gym>(
            "INSERT INTO gyms (name, members_count) VALUES ($1, 0) \
             RETURNING id::text AS id, name, members_count",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, gym = name, "Failed to insert gym");
            StoreError::from(e)
        })?;

        Ok(gym)
    }
}
