/// One-time code engine
///
/// Issues short-lived numeric codes for a phone number and resolves a
/// verified (phone, code) pair to the role profile registered under that
/// phone. Codes are never invalidated when a newer one is issued; lookups
/// simply take the most recently created match. Expiry is computed from
/// `created_at` and the configured lifetime.

mod delivery;

pub use delivery::{CodeDelivery, LogDelivery, OtpPurpose};

use crate::{
    account,
    clock::Clock,
    config::OtpConfig,
    db::models::{OneTimeCode, RoleProfile},
    error::{AppError, AppResult},
    metrics,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Smallest and largest codes; every code is exactly six digits
pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

/// Generate a six-digit numeric code
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX).to_string()
}

/// One-time code manager
pub struct OtpManager {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
    config: OtpConfig,
    delivery: Arc<dyn CodeDelivery>,
}

impl OtpManager {
    pub fn new(
        db: SqlitePool,
        clock: Arc<dyn Clock>,
        config: OtpConfig,
        delivery: Arc<dyn CodeDelivery>,
    ) -> Self {
        Self {
            db,
            clock,
            config,
            delivery,
        }
    }

    /// Create and deliver a fresh code for `phone`
    pub async fn issue(&self, phone: &str, purpose: OtpPurpose) -> AppResult<OneTimeCode> {
        let mut conn = self.db.acquire().await?;
        self.issue_in(&mut conn, phone, purpose).await
    }

    /// Issue on a caller-owned connection, typically an open transaction
    ///
    /// The code row is written before delivery, so a delivery failure leaves
    /// the caller's transaction to roll it back.
    pub async fn issue_in(
        &self,
        conn: &mut SqliteConnection,
        phone: &str,
        purpose: OtpPurpose,
    ) -> AppResult<OneTimeCode> {
        let code = generate_code();
        let now = self.clock.now();

        let result = sqlx::query(
            "INSERT INTO one_time_code (phone, code, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(phone)
        .bind(&code)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        self.delivery.deliver(phone, &code, purpose).await?;

        metrics::OTP_ISSUED_TOTAL
            .with_label_values(&[purpose.as_str()])
            .inc();

        Ok(OneTimeCode {
            id: result.last_insert_rowid(),
            phone: phone.to_string(),
            code,
            created_at: now,
            consumed_at: None,
        })
    }

    /// Verify a (phone, code) pair and resolve the caller's role profile
    pub async fn verify(&self, phone: &str, code: &str) -> AppResult<RoleProfile> {
        let outcome = self.verify_inner(phone, code).await;

        let label = match &outcome {
            Ok(_) => "success",
            Err(AppError::OtpNotFound) => "not_found",
            Err(AppError::OtpExpired) => "expired",
            Err(AppError::NotFound(_)) => "orphaned",
            Err(_) => "error",
        };
        metrics::OTP_VERIFICATIONS_TOTAL
            .with_label_values(&[label])
            .inc();

        outcome
    }

    async fn verify_inner(&self, phone: &str, code: &str) -> AppResult<RoleProfile> {
        let otp = self
            .latest_match(phone, code)
            .await?
            .ok_or(AppError::OtpNotFound)?;

        if self.is_expired(otp.created_at) {
            tracing::debug!(phone, otp_id = otp.id, "one-time code expired");
            return Err(AppError::OtpExpired);
        }

        let role = account::role_profile_for_phone(&self.db, phone)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found for this phone".to_string()))?;

        if self.config.single_use {
            sqlx::query("UPDATE one_time_code SET consumed_at = ?1 WHERE id = ?2")
                .bind(self.clock.now())
                .bind(otp.id)
                .execute(&self.db)
                .await?;
        }

        Ok(role)
    }

    /// Most recently created code matching (phone, code) exactly
    async fn latest_match(&self, phone: &str, code: &str) -> AppResult<Option<OneTimeCode>> {
        let sql = if self.config.single_use {
            "SELECT id, phone, code, created_at, consumed_at FROM one_time_code
             WHERE phone = ?1 AND code = ?2 AND consumed_at IS NULL
             ORDER BY created_at DESC, id DESC LIMIT 1"
        } else {
            "SELECT id, phone, code, created_at, consumed_at FROM one_time_code
             WHERE phone = ?1 AND code = ?2
             ORDER BY created_at DESC, id DESC LIMIT 1"
        };

        let otp = sqlx::query_as::<_, OneTimeCode>(sql)
            .bind(phone)
            .bind(code)
            .fetch_optional(&self.db)
            .await?;

        Ok(otp)
    }

    /// A code expires once its age exceeds the configured lifetime
    pub fn is_expired(&self, created_at: DateTime<Utc>) -> bool {
        self.clock.now() > created_at + Duration::seconds(self.config.ttl)
    }

    /// Delete codes older than the retention window
    pub async fn cleanup_expired(&self) -> AppResult<u64> {
        let cutoff = self.clock.now() - Duration::seconds(self.config.retention.max(self.config.ttl));

        let result = sqlx::query("DELETE FROM one_time_code WHERE created_at < ?1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
