/// Application context and dependency injection
use crate::{
    account::{AccountManager, ProfileManager},
    clock::{Clock, SystemClock},
    config::ServerConfig,
    db,
    error::{AppError, AppResult},
    otp::{CodeDelivery, LogDelivery, OtpManager},
    rate_limit::RateLimiter,
    roster::RosterManager,
    scheduling::AppointmentManager,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub clock: Arc<dyn Clock>,
    pub account_manager: Arc<AccountManager>,
    pub profile_manager: Arc<ProfileManager>,
    pub otp_manager: Arc<OtpManager>,
    pub roster_manager: Arc<RosterManager>,
    pub appointment_manager: Arc<AppointmentManager>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;

        // Run migrations
        db::run_migrations(&db).await?;

        // Test connection
        db::test_connection(&db).await?;

        Ok(Self::with_pool(
            config,
            db,
            Arc::new(SystemClock),
            Arc::new(LogDelivery),
        ))
    }

    /// Assemble the context over an existing, migrated pool
    pub fn with_pool(
        config: ServerConfig,
        db: SqlitePool,
        clock: Arc<dyn Clock>,
        delivery: Arc<dyn CodeDelivery>,
    ) -> Self {
        let config = Arc::new(config);

        let account_manager = Arc::new(AccountManager::new(
            db.clone(),
            config.clone(),
            clock.clone(),
        ));
        let profile_manager = Arc::new(ProfileManager::new(db.clone()));
        let otp_manager = Arc::new(OtpManager::new(
            db.clone(),
            clock.clone(),
            config.otp.clone(),
            delivery,
        ));
        let roster_manager = Arc::new(RosterManager::new(db.clone()));
        let appointment_manager = Arc::new(AppointmentManager::new(db.clone(), clock.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            config,
            db,
            clock,
            account_manager,
            profile_manager,
            otp_manager,
            roster_manager,
            appointment_manager,
            rate_limiter,
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> AppResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
