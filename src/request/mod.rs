//! Transport layer for the Bot API
//!
//! This module handles the HTTP round trips to the Bot API, mapping
//! failed responses to the [`TelegramError`](crate::utils::errors::TelegramError)
//! taxonomy and building JSON or multipart payloads.

pub mod base;
pub mod http;
pub mod request_data;

pub use base::{BaseRequest, HttpMethod, RequestTimeouts};
pub use http::HttpRequest;
pub use request_data::{InputFile, RequestData};
