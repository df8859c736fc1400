/// Booker to scheduler roster
///
/// A booker opts into a publicly searchable scheduler by its phone number
/// (the scheduler code) and may only reserve appointments with schedulers
/// present in its roster.
use crate::{
    db::models::{BookerProfile, SchedulerProfile},
    error::{AppError, AppResult},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

/// Add-scheduler request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddSchedulerRequest {
    #[validate(length(min = 1, max = 100))]
    pub scheduler_code: String,
}

/// Whether `scheduler_id` is in the roster of `booker_id`
pub async fn contains(
    db: &SqlitePool,
    booker_id: i64,
    scheduler_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM roster WHERE booker_id = ?1 AND scheduler_id = ?2)",
    )
    .bind(booker_id)
    .bind(scheduler_id)
    .fetch_one(db)
    .await
}

/// Roster manager
pub struct RosterManager {
    db: SqlitePool,
}

impl RosterManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Resolve a publicly searchable scheduler by code and add it to the roster
    ///
    /// Adding a scheduler that is already present is a no-op.
    pub async fn add_to_roster(
        &self,
        booker_id: i64,
        scheduler_code: &str,
    ) -> AppResult<SchedulerProfile> {
        let scheduler = sqlx::query_as::<_, SchedulerProfile>(
            "SELECT id, owner_id, name, family, phone, bio, is_public_search
             FROM scheduler_profile
             WHERE phone = ?1 AND is_public_search = 1",
        )
        .bind(scheduler_code)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::SchedulerNotFound)?;

        let result =
            sqlx::query("INSERT OR IGNORE INTO roster (booker_id, scheduler_id) VALUES (?1, ?2)")
                .bind(booker_id)
                .bind(scheduler.id)
                .execute(&self.db)
                .await?;

        if result.rows_affected() > 0 {
            tracing::info!(booker_id, scheduler_id = scheduler.id, "scheduler added to roster");
        } else {
            tracing::debug!(booker_id, scheduler_id = scheduler.id, "scheduler already in roster");
        }

        Ok(scheduler)
    }

    /// Schedulers the booker has added
    pub async fn list_roster(&self, booker_id: i64) -> AppResult<Vec<SchedulerProfile>> {
        let schedulers = sqlx::query_as::<_, SchedulerProfile>(
            "SELECT s.id, s.owner_id, s.name, s.family, s.phone, s.bio, s.is_public_search
             FROM roster r
             JOIN scheduler_profile s ON s.id = r.scheduler_id
             WHERE r.booker_id = ?1",
        )
        .bind(booker_id)
        .fetch_all(&self.db)
        .await?;

        Ok(schedulers)
    }

    /// Bookers whose roster contains the scheduler
    pub async fn bookers_for_scheduler(&self, scheduler_id: i64) -> AppResult<Vec<BookerProfile>> {
        let bookers = sqlx::query_as::<_, BookerProfile>(
            "SELECT b.id, b.owner_id, b.name, b.family, b.phone
             FROM roster r
             JOIN booker_profile b ON b.id = r.booker_id
             WHERE r.scheduler_id = ?1
             ORDER BY b.id",
        )
        .bind(scheduler_id)
        .fetch_all(&self.db)
        .await?;

        Ok(bookers)
    }
}
