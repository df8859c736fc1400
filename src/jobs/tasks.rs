/// Background task implementations
use crate::{context::AppContext, db, error::AppResult};

/// Delete one-time codes past their retention window
pub async fn cleanup_expired_codes(ctx: &AppContext) -> AppResult<u64> {
    ctx.otp_manager.cleanup_expired().await
}

/// Delete revocation entries whose tokens can no longer validate
pub async fn cleanup_revoked_tokens(ctx: &AppContext) -> AppResult<u64> {
    ctx.account_manager.cleanup_revoked_tokens().await
}

/// Drop idle per-account rate limiter entries
pub async fn prune_rate_limiters(ctx: &AppContext) -> AppResult<usize> {
    Ok(ctx.rate_limiter.retain_recent())
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> AppResult<()> {
    db::test_connection(&ctx.db).await
}
