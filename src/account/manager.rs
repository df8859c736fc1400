/// Account manager implementation using runtime queries
use crate::{
    account::{is_valid_phone, Claims, TokenPair, TokenType, ValidatedSession},
    auth::verify_jwt_token,
    clock::Clock,
    config::ServerConfig,
    db::models::{Account, BookerProfile, Role, RoleProfile, SchedulerProfile},
    error::{AppError, AppResult},
    otp::{OtpManager, OtpPurpose},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use uuid::Uuid;

const PHONE_TAKEN: &str = "This phone number is already registered.";
const INVALID_REFRESH: &str = "Invalid or expired refresh token.";

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    clock: Arc<dyn Clock>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>, clock: Arc<dyn Clock>) -> Self {
        Self { db, config, clock }
    }

    /// Register a booker: account, role profile and booker profile in one step
    pub async fn register_booker(
        &self,
        phone: &str,
        name: &str,
        family: &str,
    ) -> AppResult<BookerProfile> {
        self.create_booker(phone, name, family, None).await
    }

    /// Register a booker and deliver its first code; nothing is kept if delivery fails
    pub async fn register_booker_with_code(
        &self,
        phone: &str,
        name: &str,
        family: &str,
        otp: &OtpManager,
    ) -> AppResult<BookerProfile> {
        self.create_booker(phone, name, family, Some(otp)).await
    }

    async fn create_booker(
        &self,
        phone: &str,
        name: &str,
        family: &str,
        otp: Option<&OtpManager>,
    ) -> AppResult<BookerProfile> {
        self.check_phone_available(phone).await?;

        let mut tx = self.db.begin().await?;
        let role_id = self.create_identity(&mut tx, phone, Role::Booker).await?;

        let id = sqlx::query(
            "INSERT INTO booker_profile (owner_id, name, family, phone) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(role_id)
        .bind(name)
        .bind(family)
        .bind(phone)
        .execute(&mut *tx)
        .await
        .map_err(phone_conflict)?
        .last_insert_rowid();

        if let Some(otp) = otp {
            otp.issue_in(&mut tx, phone, OtpPurpose::Registration).await?;
        }
        tx.commit().await?;

        tracing::info!(phone, booker_id = id, "registered booker");

        Ok(BookerProfile {
            id,
            owner_id: Some(role_id),
            name: name.to_string(),
            family: family.to_string(),
            phone: phone.to_string(),
        })
    }

    /// Register a scheduler: account, role profile and scheduler profile in one step
    pub async fn register_scheduler(
        &self,
        phone: &str,
        name: &str,
        family: &str,
        bio: &str,
    ) -> AppResult<SchedulerProfile> {
        self.create_scheduler(phone, name, family, bio, None).await
    }

    /// Register a scheduler and deliver its first code; nothing is kept if delivery fails
    pub async fn register_scheduler_with_code(
        &self,
        phone: &str,
        name: &str,
        family: &str,
        bio: &str,
        otp: &OtpManager,
    ) -> AppResult<SchedulerProfile> {
        self.create_scheduler(phone, name, family, bio, Some(otp)).await
    }

    async fn create_scheduler(
        &self,
        phone: &str,
        name: &str,
        family: &str,
        bio: &str,
        otp: Option<&OtpManager>,
    ) -> AppResult<SchedulerProfile> {
        self.check_phone_available(phone).await?;

        let mut tx = self.db.begin().await?;
        let role_id = self.create_identity(&mut tx, phone, Role::Scheduler).await?;

        let id = sqlx::query(
            "INSERT INTO scheduler_profile (owner_id, name, family, phone, bio, is_public_search)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
        )
        .bind(role_id)
        .bind(name)
        .bind(family)
        .bind(phone)
        .bind(bio)
        .execute(&mut *tx)
        .await
        .map_err(phone_conflict)?
        .last_insert_rowid();

        if let Some(otp) = otp {
            otp.issue_in(&mut tx, phone, OtpPurpose::Registration).await?;
        }
        tx.commit().await?;

        tracing::info!(phone, scheduler_id = id, "registered scheduler");

        Ok(SchedulerProfile {
            id,
            owner_id: Some(role_id),
            name: name.to_string(),
            family: family.to_string(),
            phone: phone.to_string(),
            bio: bio.to_string(),
            is_public_search: true,
        })
    }

    async fn check_phone_available(&self, phone: &str) -> AppResult<()> {
        if !is_valid_phone(phone) {
            return Err(AppError::field_error(
                "phone",
                "Phone number must be exactly 11 digits.",
            ));
        }

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM account WHERE username = ?1)
                 OR EXISTS(SELECT 1 FROM booker_profile WHERE phone = ?1)
                 OR EXISTS(SELECT 1 FROM scheduler_profile WHERE phone = ?1)",
        )
        .bind(phone)
        .fetch_one(&self.db)
        .await?;

        if taken {
            return Err(AppError::field_error("phone", PHONE_TAKEN));
        }
        Ok(())
    }

    /// Insert the account and its role binding, returning the role profile id
    async fn create_identity(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        phone: &str,
        role: Role,
    ) -> AppResult<i64> {
        let account_id = sqlx::query(
            "INSERT INTO account (username, is_admin, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(phone)
        .bind(self.config.is_admin_phone(phone))
        .bind(self.clock.now())
        .execute(&mut **tx)
        .await
        .map_err(phone_conflict)?
        .last_insert_rowid();

        let role_id = sqlx::query("INSERT INTO role_profile (account_id, role) VALUES (?1, ?2)")
            .bind(account_id)
            .bind(role)
            .execute(&mut **tx)
            .await?
            .last_insert_rowid();

        Ok(role_id)
    }

    /// Get account by id
    pub async fn get_account(&self, account_id: i64) -> AppResult<Account> {
        sqlx::query_as::<_, Account>(
            "SELECT id, username, is_admin, created_at FROM account WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    /// Role binding of an account, if it has one
    pub async fn role_profile_for_account(&self, account_id: i64) -> AppResult<Option<RoleProfile>> {
        let role = sqlx::query_as::<_, RoleProfile>(
            "SELECT id, account_id, role FROM role_profile WHERE account_id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(role)
    }

    /// Delete an account; its role profile goes with it, profiles keep a null owner
    pub async fn delete_account(&self, account_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM account WHERE id = ?1")
            .bind(account_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }
        Ok(())
    }

    /// Whether the account acts as an administrator
    pub fn is_admin(&self, account: &Account) -> bool {
        account.is_admin || self.config.is_admin_phone(&account.username)
    }

    /// Issue a fresh access/refresh pair for an account
    pub async fn create_session(&self, account_id: i64) -> AppResult<TokenPair> {
        let access = self.generate_token(account_id, TokenType::Access)?;
        let refresh = self.generate_token(account_id, TokenType::Refresh)?;

        tracing::debug!(account_id, "issued session tokens");

        Ok(TokenPair { access, refresh })
    }

    /// Validate access token and return session info
    pub async fn validate_access_token(&self, token: &str) -> AppResult<ValidatedSession> {
        let claims = self.decode(token, TokenType::Access)?;
        let account_id = subject(&claims)?;

        let account = self
            .get_account(account_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => {
                    AppError::Authentication("Account no longer exists".to_string())
                }
                other => other,
            })?;
        let role = self.role_profile_for_account(account_id).await?;

        Ok(ValidatedSession {
            account_id,
            is_admin: self.is_admin(&account),
            username: account.username,
            role,
        })
    }

    /// Rotate a refresh token: the presented token is revoked and a new pair issued
    pub async fn refresh_session(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = self.decode(refresh_token, TokenType::Refresh)?;
        let account_id = subject(&claims)?;

        if self.is_revoked(&claims.jti).await? {
            return Err(AppError::Authentication(
                "Refresh token has been revoked".to_string(),
            ));
        }

        self.get_account(account_id).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::Authentication("Account no longer exists".to_string()),
            other => other,
        })?;

        self.revoke(&claims, account_id).await.map_err(|e| {
            if e.is_unique_violation() {
                AppError::Authentication("Refresh token has been revoked".to_string())
            } else {
                e
            }
        })?;

        self.create_session(account_id).await
    }

    /// Logout: revoke a refresh token owned by `account_id`
    pub async fn revoke_refresh_token(&self, account_id: i64, refresh_token: &str) -> AppResult<()> {
        let claims = self
            .decode(refresh_token, TokenType::Refresh)
            .map_err(|_| AppError::Validation(INVALID_REFRESH.to_string()))?;

        if subject(&claims)? != account_id {
            return Err(AppError::Validation(INVALID_REFRESH.to_string()));
        }

        self.revoke(&claims, account_id).await.map_err(|e| {
            if e.is_unique_violation() {
                AppError::Validation(INVALID_REFRESH.to_string())
            } else {
                e
            }
        })?;

        tracing::info!(account_id, "refresh token revoked");
        Ok(())
    }

    /// Remove revocation records whose tokens have expired anyway
    pub async fn cleanup_revoked_tokens(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM revoked_token WHERE expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(deleted, "cleaned up revoked tokens");
        } else {
            tracing::debug!("revoked token cleanup: nothing to remove");
        }

        Ok(deleted)
    }

    async fn is_revoked(&self, jti: &str) -> AppResult<bool> {
        let revoked: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM revoked_token WHERE jti = ?1)")
                .bind(jti)
                .fetch_one(&self.db)
                .await?;
        Ok(revoked)
    }

    async fn revoke(&self, claims: &Claims, account_id: i64) -> AppResult<()> {
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.config.authentication.refresh_token_ttl));

        sqlx::query(
            "INSERT INTO revoked_token (jti, account_id, revoked_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&claims.jti)
        .bind(account_id)
        .bind(Utc::now())
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Generate a signed JWT of the given kind
    fn generate_token(&self, account_id: i64, typ: TokenType) -> AppResult<String> {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let ttl = match typ {
            TokenType::Access => self.config.authentication.access_token_ttl,
            TokenType::Refresh => self.config.authentication.refresh_token_ttl,
        };

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: account_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            typ,
            iat: now,
            exp: now + ttl,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Jwt(format!("Failed to generate token: {}", e)))
    }

    fn decode(&self, token: &str, expected: TokenType) -> AppResult<Claims> {
        let claims = verify_jwt_token(token, &self.config.authentication.jwt_secret)?;
        if claims.typ != expected {
            return Err(AppError::Authentication("Wrong token type".to_string()));
        }
        Ok(claims)
    }
}

fn subject(claims: &Claims) -> AppResult<i64> {
    claims
        .sub
        .parse()
        .map_err(|_| AppError::Authentication("Invalid token subject".to_string()))
}

fn phone_conflict(e: sqlx::Error) -> AppError {
    let err = AppError::Database(e);
    if err.is_unique_violation() {
        AppError::field_error("phone", PHONE_TAKEN)
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::SystemClock, db};

    async fn create_test_manager() -> AccountManager {
        let pool = db::create_memory_pool().await.unwrap();
        let mut config = ServerConfig::for_tests();
        config.authentication.admin_phones = vec!["09000000000".to_string()];
        AccountManager::new(pool, Arc::new(config), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_register_booker_creates_identity() {
        let manager = create_test_manager().await;

        let booker = manager
            .register_booker("09123456789", "John", "Doe")
            .await
            .unwrap();
        assert_eq!(booker.phone, "09123456789");

        let role = crate::account::role_profile_for_phone(&manager.db, "09123456789")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(role.role, Role::Booker);
        assert_eq!(Some(role.id), booker.owner_id);

        let account = manager.get_account(role.account_id).await.unwrap();
        assert_eq!(account.username, "09123456789");
        assert!(!manager.is_admin(&account));
    }

    #[tokio::test]
    async fn test_duplicate_phone_rejected_across_roles() {
        let manager = create_test_manager().await;
        manager
            .register_booker("09123456789", "John", "Doe")
            .await
            .unwrap();

        let err = manager
            .register_scheduler("09123456789", "Alice", "Smith", "")
            .await
            .unwrap_err();
        match err {
            AppError::InvalidFields(fields) => {
                assert_eq!(fields["phone"], vec![PHONE_TAKEN.to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_phone_rejected() {
        let manager = create_test_manager().await;
        let result = manager.register_booker("12345", "John", "Doe").await;
        assert!(matches!(result, Err(AppError::InvalidFields(_))));
    }

    #[tokio::test]
    async fn test_configured_admin_phone() {
        let manager = create_test_manager().await;
        let scheduler = manager
            .register_scheduler("09000000000", "Root", "Admin", "")
            .await
            .unwrap();
        let role = manager
            .role_profile_for_account(1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Some(role.id), scheduler.owner_id);

        let account = manager.get_account(role.account_id).await.unwrap();
        assert!(account.is_admin);
    }

    #[tokio::test]
    async fn test_session_roundtrip_and_rotation() {
        let manager = create_test_manager().await;
        manager
            .register_booker("09123456789", "John", "Doe")
            .await
            .unwrap();

        let pair = manager.create_session(1).await.unwrap();
        let session = manager.validate_access_token(&pair.access).await.unwrap();
        assert_eq!(session.account_id, 1);
        assert_eq!(session.role_tag(), Some(Role::Booker));

        // Refresh tokens are not access tokens
        assert!(manager.validate_access_token(&pair.refresh).await.is_err());

        let rotated = manager.refresh_session(&pair.refresh).await.unwrap();
        assert_ne!(rotated.refresh, pair.refresh);

        let replay = manager.refresh_session(&pair.refresh).await;
        assert!(matches!(replay, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_logout_rules() {
        let manager = create_test_manager().await;
        manager
            .register_booker("09123456789", "John", "Doe")
            .await
            .unwrap();
        manager
            .register_booker("09123456780", "Jane", "Doe")
            .await
            .unwrap();

        let pair = manager.create_session(1).await.unwrap();

        // Another account's token
        let err = manager.revoke_refresh_token(2, &pair.refresh).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Garbage
        let err = manager.revoke_refresh_token(1, "not-a-token").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        manager.revoke_refresh_token(1, &pair.refresh).await.unwrap();

        // Already revoked
        let err = manager.revoke_refresh_token(1, &pair.refresh).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = manager.refresh_session(&pair.refresh).await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_profile_survives_account_deletion() {
        let manager = create_test_manager().await;
        manager
            .register_booker("09123456789", "John", "Doe")
            .await
            .unwrap();

        manager.delete_account(1).await.unwrap();

        let owner: Option<i64> =
            sqlx::query_scalar("SELECT owner_id FROM booker_profile WHERE phone = ?1")
                .bind("09123456789")
                .fetch_one(&manager.db)
                .await
                .unwrap();
        assert_eq!(owner, None);
        assert!(manager.role_profile_for_account(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_revoked_tokens_keeps_live_entries() {
        let manager = create_test_manager().await;
        manager
            .register_booker("09123456789", "John", "Doe")
            .await
            .unwrap();

        let pair = manager.create_session(1).await.unwrap();
        manager.revoke_refresh_token(1, &pair.refresh).await.unwrap();

        assert_eq!(manager.cleanup_revoked_tokens().await.unwrap(), 0);
    }

    struct UnreachableDelivery;

    #[async_trait::async_trait]
    impl crate::otp::CodeDelivery for UnreachableDelivery {
        async fn deliver(&self, _phone: &str, _code: &str, _purpose: OtpPurpose) -> AppResult<()> {
            Err(AppError::Internal("sms gateway unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_registration_rolls_back_when_code_delivery_fails() {
        let manager = create_test_manager().await;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let failing = OtpManager::new(
            manager.db.clone(),
            clock.clone(),
            crate::config::OtpConfig::default(),
            Arc::new(UnreachableDelivery),
        );

        let err = manager
            .register_scheduler_with_code("09123456789", "John", "Doe", "", &failing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(crate::account::role_profile_for_phone(&manager.db, "09123456789")
            .await
            .unwrap()
            .is_none());

        let codes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM one_time_code")
            .fetch_one(&manager.db)
            .await
            .unwrap();
        assert_eq!(codes, 0);

        // Retrying with a working channel succeeds for the same phone
        let working = OtpManager::new(
            manager.db.clone(),
            clock,
            crate::config::OtpConfig::default(),
            Arc::new(crate::otp::LogDelivery),
        );
        let booker = manager
            .register_booker_with_code("09123456789", "John", "Doe", &working)
            .await
            .unwrap();
        assert_eq!(booker.phone, "09123456789");
    }
}
