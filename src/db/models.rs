/// Database models
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role tag carried by a role profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Booker,
    Scheduler,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Booker => "booker",
            Role::Scheduler => "scheduler",
        }
    }
}

/// Authenticatable identity; username is the phone used at registration
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Binds one account to exactly one role
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RoleProfile {
    pub id: i64,
    pub account_id: i64,
    pub role: Role,
}

/// Service provider profile
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SchedulerProfile {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub name: String,
    pub family: String,
    pub phone: String,
    pub bio: String,
    pub is_public_search: bool,
}

/// Client profile
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BookerProfile {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub name: String,
    pub family: String,
    pub phone: String,
}

/// A booked (scheduler, date, time) slot
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub scheduler_id: i64,
    pub booker_id: Option<i64>,
    pub booker_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One-time code issued to a phone
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub id: i64,
    pub phone: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}
