//! Rate limiting middleware
//!
//! Limits how many updates a single user gets processed per minute. Updates
//! over the limit stop in the rate limit group and never reach the bot's
//! handlers.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

use crate::ext::handlers::TypeHandler;
use crate::ext::{Job, JobOptions, JobQueue};
use crate::types::Update;
use crate::utils::errors::{CastpodError, Result};

/// Handler group of the rate limiter
pub const RATE_LIMIT_GROUP: i32 = -1;

/// Name of the repeating job that forgets idle users
pub const CLEANUP_JOB_NAME: &str = "rate-limit-cleanup";
const CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

pub struct RateLimitMiddleware {
    limiter: DefaultKeyedRateLimiter<i64>,
    exempt_ids: Vec<i64>,
}

impl std::fmt::Debug for RateLimitMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitMiddleware")
            .field("exempt_ids", &self.exempt_ids)
            .finish()
    }
}

impl RateLimitMiddleware {
    /// Create a limiter allowing `per_minute` updates per user
    pub fn new(per_minute: u32, exempt_ids: Vec<i64>) -> Result<Self> {
        let per_minute = NonZeroU32::new(per_minute).ok_or_else(|| {
            CastpodError::Config("Rate limit must be greater than 0".to_string())
        })?;
        Ok(Self {
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
            exempt_ids,
        })
    }

    /// Check if the user may send another update
    pub fn check_rate_limit(&self, user_id: i64) -> Result<()> {
        if self.exempt_ids.contains(&user_id) {
            debug!(user_id = user_id, "User exempt from rate limiting");
            return Ok(());
        }

        match self.limiter.check_key(&user_id) {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(user_id = user_id, "Rate limit exceeded");
                Err(CastpodError::RateLimitExceeded)
            }
        }
    }

    /// Drops the state of users that are back under their limit
    pub fn cleanup(&self) {
        self.limiter.retain_recent();
        debug!(tracked = self.limiter.len(), "Rate limiter cleaned up");
    }

    /// Number of users the limiter keeps state for
    pub fn tracked_users(&self) -> usize {
        self.limiter.len()
    }

    /// Runs [`cleanup`](Self::cleanup) periodically on `job_queue`
    pub fn schedule_cleanup(self: &Arc<Self>, job_queue: &JobQueue) -> Result<Job> {
        let middleware = Arc::clone(self);
        job_queue.run_repeating(
            move |_ctx| {
                let middleware = Arc::clone(&middleware);
                async move {
                    middleware.cleanup();
                    Ok(())
                }
            },
            CLEANUP_INTERVAL,
            None,
            JobOptions::named(CLEANUP_JOB_NAME),
        )
    }

    /// Handler for [`RATE_LIMIT_GROUP`]. Updates without a user pass.
    pub fn handler(self: Arc<Self>) -> TypeHandler {
        TypeHandler::new(
            |update: &Update| update.effective_user().is_some(),
            move |update: Arc<Update>, _ctx| {
                let middleware = Arc::clone(&self);
                async move {
                    let Some(user) = update.effective_user() else {
                        return Ok(());
                    };
                    match middleware.check_rate_limit(user.id) {
                        Ok(()) => Ok(()),
                        Err(_) => Err(CastpodError::HandlerStop),
                    }
                }
            },
        )
        .block(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_limit_per_user() {
        let middleware = RateLimitMiddleware::new(2, vec![]).unwrap();
        assert!(middleware.check_rate_limit(1).is_ok());
        assert!(middleware.check_rate_limit(1).is_ok());
        assert_matches!(
            middleware.check_rate_limit(1),
            Err(CastpodError::RateLimitExceeded)
        );
        assert!(middleware.check_rate_limit(2).is_ok());
    }

    #[test]
    fn test_exempt_users() {
        let middleware = RateLimitMiddleware::new(1, vec![7]).unwrap();
        for _ in 0..5 {
            assert!(middleware.check_rate_limit(7).is_ok());
        }
    }

    #[test]
    fn test_cleanup_keeps_limited_users() {
        let middleware = RateLimitMiddleware::new(1, vec![]).unwrap();
        assert!(middleware.check_rate_limit(1).is_ok());
        assert_eq!(middleware.tracked_users(), 1);

        middleware.cleanup();
        assert_matches!(
            middleware.check_rate_limit(1),
            Err(CastpodError::RateLimitExceeded)
        );
    }

    #[tokio::test]
    async fn test_cleanup_is_scheduled() {
        let middleware = Arc::new(RateLimitMiddleware::new(5, vec![]).unwrap());
        let queue = JobQueue::new();
        let job = middleware.schedule_cleanup(&queue).unwrap();

        assert_eq!(job.interval(), Some(CLEANUP_INTERVAL));
        assert_eq!(queue.get_jobs_by_name(CLEANUP_JOB_NAME), vec![job]);
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(RateLimitMiddleware::new(0, vec![]).is_err());
    }
}
