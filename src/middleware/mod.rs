//! Middleware module
//!
//! Middleware runs as handlers in negative groups, before the bot's own
//! handlers in group 0.

pub mod logging;
pub mod rate_limit;

pub use logging::{update_logging_handler, LOGGING_GROUP};
pub use rate_limit::{RateLimitMiddleware, CLEANUP_JOB_NAME, RATE_LIMIT_GROUP};
