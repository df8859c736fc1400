/// API routes and handlers
pub mod account;
pub mod admin;
pub mod booker;
pub mod middleware;
pub mod scheduler;

use crate::{
    context::AppContext,
    db::models::{BookerProfile, SchedulerProfile},
};
use axum::Router;
use serde::Serialize;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(account::routes())
        .merge(admin::routes())
        .merge(scheduler::routes())
        .merge(booker::routes())
}

/// Contact card used by every profile listing
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub id: i64,
    pub name: String,
    pub family: String,
    pub phone: String,
}

impl From<SchedulerProfile> for ProfileSummary {
    fn from(p: SchedulerProfile) -> Self {
        Self {
            id: p.id,
            name: p.name,
            family: p.family,
            phone: p.phone,
        }
    }
}

impl From<BookerProfile> for ProfileSummary {
    fn from(p: BookerProfile) -> Self {
        Self {
            id: p.id,
            name: p.name,
            family: p.family,
            phone: p.phone,
        }
    }
}

pub(crate) fn summaries<T: Into<ProfileSummary>>(profiles: Vec<T>) -> Vec<ProfileSummary> {
    profiles.into_iter().map(Into::into).collect()
}
