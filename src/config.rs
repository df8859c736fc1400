/// Configuration management for the appointment service
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub otp: OtpConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub access_token_ttl: i64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl: i64,
    /// Phone numbers whose accounts act as administrators (comma-separated)
    pub admin_phones: Vec<String>,
}

/// One-time code configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    /// Code lifetime in seconds
    pub ttl: i64,
    /// Reject a code once it has been verified
    pub single_use: bool,
    /// How long codes are kept before the cleanup job purges them
    pub retention: i64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
    /// Per-account reservations per minute
    pub reserve_per_minute: u32,
    /// Per-account appointment creations per minute (scheduler and admin)
    pub create_per_minute: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl: 180,
            single_use: false,
            retention: 86400,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authenticated_rps: 100,
            unauthenticated_rps: 10,
            burst_size: 50,
            reserve_per_minute: 10,
            create_per_minute: 60,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("APPOINT_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("APPOINT_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;

        let data_directory: PathBuf = env::var("APPOINT_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("APPOINT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("appoint.sqlite"));

        let jwt_secret = env::var("APPOINT_JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT secret required".to_string()))?;

        let admin_phones = env::var("APPOINT_ADMIN_PHONES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let otp_defaults = OtpConfig::default();
        let rate_defaults = RateLimitConfig::default();

        let log_level = env::var("APPOINT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig { hostname, port },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig {
                jwt_secret,
                access_token_ttl: env_or("APPOINT_ACCESS_TOKEN_TTL", 300),
                refresh_token_ttl: env_or("APPOINT_REFRESH_TOKEN_TTL", 86400),
                admin_phones,
            },
            otp: OtpConfig {
                ttl: env_or("APPOINT_OTP_TTL", otp_defaults.ttl),
                single_use: env_or("APPOINT_OTP_SINGLE_USE", otp_defaults.single_use),
                retention: env_or("APPOINT_OTP_RETENTION", otp_defaults.retention),
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("APPOINT_RATE_LIMITS_ENABLED", rate_defaults.enabled),
                authenticated_rps: env_or(
                    "APPOINT_RATE_LIMIT_AUTHENTICATED_RPS",
                    rate_defaults.authenticated_rps,
                ),
                unauthenticated_rps: env_or(
                    "APPOINT_RATE_LIMIT_UNAUTHENTICATED_RPS",
                    rate_defaults.unauthenticated_rps,
                ),
                burst_size: env_or("APPOINT_RATE_LIMIT_BURST", rate_defaults.burst_size),
                reserve_per_minute: env_or(
                    "APPOINT_RATE_LIMIT_RESERVE_PER_MINUTE",
                    rate_defaults.reserve_per_minute,
                ),
                create_per_minute: env_or(
                    "APPOINT_RATE_LIMIT_CREATE_PER_MINUTE",
                    rate_defaults.create_per_minute,
                ),
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.otp.ttl <= 0 {
            return Err(AppError::Validation("OTP lifetime must be positive".to_string()));
        }

        Ok(())
    }

    /// Configuration for tests: in-memory database and a fixed secret
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8000,
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from(":memory:"),
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only".to_string(),
                access_token_ttl: 300,
                refresh_token_ttl: 86400,
                admin_phones: vec![],
            },
            otp: OtpConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Whether the given phone/username is a configured administrator
    pub fn is_admin_phone(&self, phone: &str) -> bool {
        self.authentication.admin_phones.iter().any(|p| p == phone)
    }
}
