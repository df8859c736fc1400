/// Appoint - appointment booking backend
///
/// Bookers reserve slots with schedulers, schedulers manage their own
/// calendars, and administrators oversee every profile and appointment.
pub mod account;
pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod otp;
pub mod pagination;
pub mod rate_limit;
pub mod roster;
pub mod scheduling;
pub mod server;

pub use context::AppContext;
pub use error::{AppError, AppResult};
