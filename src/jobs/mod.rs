/// Background maintenance jobs
use crate::{context::AppContext, error::AppResult, metrics};
use std::{future::Future, sync::Arc, time::Instant};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::otp_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::revoked_token_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::rate_limiter_prune_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Purge stale one-time codes (runs every 15 minutes)
    async fn otp_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(900));

        loop {
            interval.tick().await;

            match timed("otp_cleanup", tasks::cleanup_expired_codes(&scheduler.context)).await {
                Ok(count) if count > 0 => info!("Purged {} expired one-time codes", count),
                Ok(_) => {}
                Err(e) => error!("Failed to purge one-time codes: {}", e),
            }
        }
    }

    /// Drop revocation records for tokens that have expired anyway (runs every hour)
    async fn revoked_token_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            info!("Running revoked token cleanup");

            match timed(
                "revoked_token_cleanup",
                tasks::cleanup_revoked_tokens(&scheduler.context),
            )
            .await
            {
                Ok(count) => info!("Revoked token cleanup removed {} records", count),
                Err(e) => error!("Failed to cleanup revoked tokens: {}", e),
            }
        }
    }

    /// Forget per-account throttle state that has replenished (runs every 10 minutes)
    async fn rate_limiter_prune_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(600));

        loop {
            interval.tick().await;

            match timed(
                "rate_limiter_prune",
                tasks::prune_rate_limiters(&scheduler.context),
            )
            .await
            {
                Ok(tracked) => debug!("Rate limiters still tracking {} accounts", tracked),
                Err(e) => error!("Failed to prune rate limiters: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = timed("health_check", tasks::health_check(&scheduler.context)).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}

/// Run one job iteration and record its outcome
async fn timed<T, F>(job: &str, task: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    let start = Instant::now();
    let result = task.await;
    let status = if result.is_ok() { "success" } else { "failure" };
    metrics::record_background_job(job, status, start.elapsed().as_secs_f64());
    result
}
