//! Castpod
//!
//! A Telegram Bot API client with an update dispatch layer, and a podcast
//! subscription bot built on top of it. The library part covers typed Bot
//! API objects, the HTTP transport, the [`Bot`] facade and the [`ext`]
//! module with the [`Application`], handlers, job queue, updater and
//! persistence backends.

pub mod bot;
pub mod config;
pub mod ext;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod request;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use bot::{Bot, Defaults};
pub use config::Settings;
pub use ext::{Application, ApplicationBuilder, CallbackContext};
pub use utils::errors::{CastpodError, Result, TelegramError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
