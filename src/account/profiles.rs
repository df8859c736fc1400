/// Scheduler and booker profile storage
use crate::{
    account::validate_phone,
    db::models::{BookerProfile, Role, SchedulerProfile},
    error::{AppError, AppResult},
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use validator::Validate;

const SCHEDULER_COLUMNS: &str = "id, owner_id, name, family, phone, bio, is_public_search";
const BOOKER_COLUMNS: &str = "id, owner_id, name, family, phone";

/// Partial update of a scheduler profile
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SchedulerPatch {
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub family: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub is_public_search: Option<bool>,
}

/// Partial update of a booker profile
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct BookerPatch {
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub family: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
}

/// Scheduler profile with its role tag and owning username
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SchedulerDetail {
    pub id: i64,
    pub role: Option<Role>,
    pub username: Option<String>,
    pub name: String,
    pub family: String,
    pub phone: String,
    pub bio: String,
    pub is_public_search: bool,
}

/// Booker profile with its role tag and owning username
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BookerDetail {
    pub id: i64,
    pub role: Option<Role>,
    pub username: Option<String>,
    pub name: String,
    pub family: String,
    pub phone: String,
}

/// Profile manager
pub struct ProfileManager {
    db: SqlitePool,
}

impl ProfileManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn scheduler(&self, id: i64) -> AppResult<SchedulerProfile> {
        sqlx::query_as::<_, SchedulerProfile>(&format!(
            "SELECT {SCHEDULER_COLUMNS} FROM scheduler_profile WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Scheduler not found".to_string()))
    }

    pub async fn booker(&self, id: i64) -> AppResult<BookerProfile> {
        sqlx::query_as::<_, BookerProfile>(&format!(
            "SELECT {BOOKER_COLUMNS} FROM booker_profile WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booker not found".to_string()))
    }

    /// Scheduler profile owned by a role profile
    pub async fn scheduler_for_owner(&self, role_profile_id: i64) -> AppResult<SchedulerProfile> {
        sqlx::query_as::<_, SchedulerProfile>(&format!(
            "SELECT {SCHEDULER_COLUMNS} FROM scheduler_profile WHERE owner_id = ?1"
        ))
        .bind(role_profile_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Scheduler profile not found".to_string()))
    }

    /// Booker profile owned by a role profile
    pub async fn booker_for_owner(&self, role_profile_id: i64) -> AppResult<BookerProfile> {
        sqlx::query_as::<_, BookerProfile>(&format!(
            "SELECT {BOOKER_COLUMNS} FROM booker_profile WHERE owner_id = ?1"
        ))
        .bind(role_profile_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booker profile not found".to_string()))
    }

    pub async fn list_schedulers(&self) -> AppResult<Vec<SchedulerProfile>> {
        let rows = sqlx::query_as::<_, SchedulerProfile>(&format!(
            "SELECT {SCHEDULER_COLUMNS} FROM scheduler_profile ORDER BY id"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn list_bookers(&self) -> AppResult<Vec<BookerProfile>> {
        let rows = sqlx::query_as::<_, BookerProfile>(&format!(
            "SELECT {BOOKER_COLUMNS} FROM booker_profile ORDER BY id"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn scheduler_detail(&self, id: i64) -> AppResult<SchedulerDetail> {
        sqlx::query_as::<_, SchedulerDetail>(
            "SELECT s.id, rp.role, a.username, s.name, s.family, s.phone, s.bio, s.is_public_search
             FROM scheduler_profile s
             LEFT JOIN role_profile rp ON rp.id = s.owner_id
             LEFT JOIN account a ON a.id = rp.account_id
             WHERE s.id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Scheduler not found".to_string()))
    }

    pub async fn booker_detail(&self, id: i64) -> AppResult<BookerDetail> {
        sqlx::query_as::<_, BookerDetail>(
            "SELECT b.id, rp.role, a.username, b.name, b.family, b.phone
             FROM booker_profile b
             LEFT JOIN role_profile rp ON rp.id = b.owner_id
             LEFT JOIN account a ON a.id = rp.account_id
             WHERE b.id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booker not found".to_string()))
    }

    pub async fn update_scheduler(&self, id: i64, patch: SchedulerPatch) -> AppResult<SchedulerProfile> {
        patch.validate()?;
        let mut profile = self.scheduler(id).await?;

        if let Some(name) = patch.name {
            profile.name = name;
        }
        if let Some(family) = patch.family {
            profile.family = family;
        }
        if let Some(phone) = patch.phone {
            profile.phone = phone;
        }
        if let Some(bio) = patch.bio {
            profile.bio = bio;
        }
        if let Some(public) = patch.is_public_search {
            profile.is_public_search = public;
        }

        sqlx::query(
            "UPDATE scheduler_profile
             SET name = ?1, family = ?2, phone = ?3, bio = ?4, is_public_search = ?5
             WHERE id = ?6",
        )
        .bind(&profile.name)
        .bind(&profile.family)
        .bind(&profile.phone)
        .bind(&profile.bio)
        .bind(profile.is_public_search)
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(phone_taken)?;

        tracing::debug!(scheduler_id = id, "scheduler profile updated");
        Ok(profile)
    }

    pub async fn update_booker(&self, id: i64, patch: BookerPatch) -> AppResult<BookerProfile> {
        patch.validate()?;
        let mut profile = self.booker(id).await?;

        if let Some(name) = patch.name {
            profile.name = name;
        }
        if let Some(family) = patch.family {
            profile.family = family;
        }
        if let Some(phone) = patch.phone {
            profile.phone = phone;
        }

        sqlx::query("UPDATE booker_profile SET name = ?1, family = ?2, phone = ?3 WHERE id = ?4")
            .bind(&profile.name)
            .bind(&profile.family)
            .bind(&profile.phone)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(phone_taken)?;

        tracing::debug!(booker_id = id, "booker profile updated");
        Ok(profile)
    }

    /// Delete a scheduler profile with its appointments and roster entries
    pub async fn delete_scheduler(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM scheduler_profile WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Scheduler not found".to_string()));
        }
        tracing::info!(scheduler_id = id, "scheduler profile deleted");
        Ok(())
    }

    /// Delete a booker profile with its appointments and roster entries
    pub async fn delete_booker(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM booker_profile WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Booker not found".to_string()));
        }
        tracing::info!(booker_id = id, "booker profile deleted");
        Ok(())
    }
}

fn phone_taken(e: sqlx::Error) -> AppError {
    let err = AppError::Database(e);
    if err.is_unique_violation() {
        AppError::field_error("phone", "This phone number is already registered.")
    } else {
        err
    }
}
