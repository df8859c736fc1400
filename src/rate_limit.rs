/// Rate Limiting System
///
/// Global direct limiters for authenticated and anonymous traffic, plus keyed
/// per-account limiters for the booking scopes.
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{AppError, AppResult},
    metrics,
};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    DefaultKeyedRateLimiter, NotUntil, Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

/// Throttled operation scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleScope {
    /// Booker self-reservation
    ReserveAppointment,
    /// Scheduler and admin appointment creation
    AppointmentCreate,
}

impl ThrottleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleScope::ReserveAppointment => "reserve-appointment",
            ThrottleScope::AppointmentCreate => "appointment-create",
        }
    }
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated_rps: u32,
    authenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    unauthenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    reserve: Arc<DefaultKeyedRateLimiter<i64>>,
    create: Arc<DefaultKeyedRateLimiter<i64>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let auth_quota = Quota::per_second(non_zero(config.authenticated_rps))
            .allow_burst(non_zero(config.burst_size));

        let unauth_quota = Quota::per_second(non_zero(config.unauthenticated_rps))
            .allow_burst(non_zero(config.burst_size / 5));

        Self {
            enabled: config.enabled,
            authenticated_rps: config.authenticated_rps,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
            reserve: Arc::new(GovernorLimiter::keyed(Quota::per_minute(non_zero(
                config.reserve_per_minute,
            )))),
            create: Arc::new(GovernorLimiter::keyed(Quota::per_minute(non_zero(
                config.create_per_minute,
            )))),
        }
    }

    /// Check rate limit for authenticated user
    pub fn check_authenticated(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.authenticated
            .check()
            .map_err(|e| exceeded("authenticated", &e))
    }

    /// Check rate limit for unauthenticated user
    pub fn check_unauthenticated(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.unauthenticated
            .check()
            .map_err(|e| exceeded("unauthenticated", &e))
    }

    /// Check a per-account scope quota
    pub fn check_scope(&self, scope: ThrottleScope, account_id: i64) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let limiter = match scope {
            ThrottleScope::ReserveAppointment => &self.reserve,
            ThrottleScope::AppointmentCreate => &self.create,
        };
        limiter.check_key(&account_id).map_err(|e| {
            tracing::warn!(account_id, scope = scope.as_str(), "scope rate limit exceeded");
            exceeded(scope.as_str(), &e)
        })
    }

    /// Forget per-account state that has fully replenished; returns the accounts still tracked
    pub fn retain_recent(&self) -> usize {
        for limiter in [&self.reserve, &self.create] {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
        self.reserve.len() + self.create.len()
    }
}

fn exceeded(scope: &str, not_until: &NotUntil<<DefaultClock as Clock>::Instant>) -> AppError {
    metrics::record_rate_limited(scope);
    let wait = not_until.wait_time_from(DefaultClock::default().now());
    AppError::RateLimitExceeded {
        retry_after: wait.max(Duration::from_secs(1)),
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let has_auth_header = request.headers().get("authorization").is_some();

    if has_auth_header {
        ctx.rate_limiter.check_authenticated()?;
    } else {
        ctx.rate_limiter.check_unauthenticated()?;
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "X-RateLimit-Limit",
        HeaderValue::from(ctx.rate_limiter.authenticated_rps),
    );

    Ok(response)
}
