/// Account management system
///
/// Handles phone-based registration, role binding, role profiles and
/// JWT sessions.

mod manager;
mod profiles;

pub use manager::AccountManager;
pub use profiles::{BookerPatch, ProfileManager, SchedulerDetail, BookerDetail, SchedulerPatch};

use crate::db::models::{Role, RoleProfile};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::borrow::Cow;
use validator::{Validate, ValidationError};

/// Phone numbers are exactly eleven ASCII digits
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 11 && phone.bytes().all(|b| b.is_ascii_digit())
}

/// validator hook for phone fields
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if is_valid_phone(phone) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some(Cow::from("Phone number must be exactly 11 digits."));
        Err(err)
    }
}

/// Resolve the role profile reachable from `phone` through either profile kind
pub async fn role_profile_for_phone(
    db: &SqlitePool,
    phone: &str,
) -> Result<Option<RoleProfile>, sqlx::Error> {
    sqlx::query_as::<_, RoleProfile>(
        "SELECT rp.id, rp.account_id, rp.role
         FROM role_profile rp
         LEFT JOIN booker_profile b ON b.owner_id = rp.id
         LEFT JOIN scheduler_profile s ON s.owner_id = rp.id
         WHERE b.phone = ?1 OR s.phone = ?1
         ORDER BY rp.id
         LIMIT 1",
    )
    .bind(phone)
    .fetch_optional(db)
    .await
}

/// Role selection request
#[derive(Debug, Clone, Deserialize)]
pub struct RoleSelectionRequest {
    pub role: String,
}

/// Booker registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterBookerRequest {
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub family: String,
}

/// Scheduler registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterSchedulerRequest {
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub family: String,
    pub bio: String,
}

/// Login request (an OTP is sent to the phone)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
}

/// OTP verification request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(length(min = 1, max = 11))]
    pub phone: String,
    #[validate(length(min = 1, max = 6))]
    pub code: String,
}

/// Logout / refresh request carrying a refresh token
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh: Option<String>,
}

/// Access and refresh token pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Token kind stored in the `typ` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub typ: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// Validated session from bearer token
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub account_id: i64,
    pub username: String,
    pub is_admin: bool,
    pub role: Option<RoleProfile>,
}

impl ValidatedSession {
    pub fn role_tag(&self) -> Option<Role> {
        self.role.as_ref().map(|r| r.role)
    }
}
