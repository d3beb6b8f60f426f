//! Utility modules
//!
//! Error types, logging setup and small helpers shared by the library and
//! the bot.

pub mod errors;
pub mod helpers;
pub mod logging;

pub use errors::{CastpodError, Result, TelegramError, TelegramResult};
