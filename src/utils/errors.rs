//! Error handling for Castpod
//!
//! This module defines the Bot API error taxonomy returned by the transport
//! and the application-level error type used throughout the crate.

use thiserror::Error;

/// Errors reported by the Telegram Bot API or by the transport talking to it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelegramError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Group migrated to supergroup. New chat id: {new_chat_id}")]
    ChatMigrated { new_chat_id: i64 },

    #[error("Flood control exceeded. Retry in {retry_after} seconds")]
    RetryAfter { retry_after: u64 },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timed out: {0}")]
    TimedOut(String),

    #[error("{0}")]
    Generic(String),
}

impl TelegramError {
    /// Whether repeating the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TelegramError::NetworkError(_)
                | TelegramError::TimedOut(_)
                | TelegramError::RetryAfter { .. }
        )
    }
}

/// Main error type for Castpod
#[derive(Error, Debug)]
pub enum CastpodError {
    #[error("Telegram API error: {0}")]
    Telegram(#[from] TelegramError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Returned by a handler or an error handler to stop processing of the
    /// remaining handler groups (or error handlers) for the current update.
    #[error("Handler processing stopped")]
    HandlerStop,
}

/// Result type alias for Castpod operations
pub type Result<T> = std::result::Result<T, CastpodError>;

/// Result type alias for raw Bot API calls
pub type TelegramResult<T> = std::result::Result<T, TelegramError>;

impl CastpodError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            CastpodError::Telegram(e) => e.is_transient(),
            CastpodError::Database(_) => false,
            CastpodError::Migration(_) => false,
            CastpodError::Redis(_) => true,
            CastpodError::Config(_) => false,
            CastpodError::ConfigLoad(_) => false,
            CastpodError::Serialization(_) => false,
            CastpodError::Io(_) => true,
            CastpodError::UrlParse(_) => false,
            CastpodError::InvalidState(_) => false,
            CastpodError::InvalidInput(_) => false,
            CastpodError::Handler(_) => true,
            CastpodError::RateLimitExceeded => true,
            CastpodError::HandlerStop => true,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CastpodError::Database(_) => ErrorSeverity::Critical,
            CastpodError::Migration(_) => ErrorSeverity::Critical,
            CastpodError::Config(_) => ErrorSeverity::Critical,
            CastpodError::ConfigLoad(_) => ErrorSeverity::Critical,
            CastpodError::Telegram(TelegramError::InvalidToken(_)) => ErrorSeverity::Critical,
            CastpodError::Telegram(TelegramError::RetryAfter { .. }) => ErrorSeverity::Warning,
            CastpodError::RateLimitExceeded => ErrorSeverity::Warning,
            CastpodError::InvalidInput(_) => ErrorSeverity::Info,
            CastpodError::HandlerStop => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(TelegramError::NetworkError("reset".into()).is_transient());
        assert!(TelegramError::RetryAfter { retry_after: 3 }.is_transient());
        assert!(!TelegramError::BadRequest("chat not found".into()).is_transient());
    }

    #[test]
    fn test_severity() {
        let err = CastpodError::from(TelegramError::InvalidToken("Unauthorized".into()));
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(!err.is_recoverable());
        assert_eq!(CastpodError::HandlerStop.severity(), ErrorSeverity::Info);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }

    #[test]
    fn test_error_messages() {
        let err = TelegramError::ChatMigrated { new_chat_id: -100123 };
        assert_eq!(err.to_string(), "Group migrated to supergroup. New chat id: -100123");
        let err = TelegramError::RetryAfter { retry_after: 12 };
        assert_eq!(err.to_string(), "Flood control exceeded. Retry in 12 seconds");
    }
}
