//! Transport abstraction
//!
//! A transport performs one HTTP round trip. Turning the raw response into a
//! `result` value or a [`TelegramError`] is shared by every implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, error};

use super::request_data::RequestData;
use crate::utils::errors::{TelegramError, TelegramResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Time limits for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            read: Duration::from_secs(5),
            write: Duration::from_secs(5),
        }
    }
}

impl RequestTimeouts {
    /// Overall limit for one round trip
    pub fn total(&self) -> Duration {
        self.connect + self.read + self.write
    }

    /// Same limits with a longer read window, e.g. for long polling
    pub fn with_extra_read(mut self, extra: Duration) -> Self {
        self.read += extra;
        self
    }
}

/// A transport able to talk to the Bot API
#[async_trait]
pub trait BaseRequest: Send + Sync + std::fmt::Debug {
    async fn initialize(&self) -> TelegramResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> TelegramResult<()> {
        Ok(())
    }

    /// Performs the round trip and returns the status code and raw body
    async fn do_request(
        &self,
        method: HttpMethod,
        url: &str,
        data: Option<&RequestData>,
        timeouts: Option<RequestTimeouts>,
    ) -> TelegramResult<(u16, Bytes)>;

    /// Calls a Bot API method and returns its `result`
    async fn post(
        &self,
        url: &str,
        data: &RequestData,
        timeouts: Option<RequestTimeouts>,
    ) -> TelegramResult<Value> {
        let (status, body) = self
            .do_request(HttpMethod::Post, url, Some(data), timeouts)
            .await?;
        let payload = check_status(status, body)?;
        let mut decoded = parse_json_payload(&payload)?;
        Ok(decoded
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Downloads raw content, e.g. a file from the file endpoint
    async fn retrieve(&self, url: &str, timeouts: Option<RequestTimeouts>) -> TelegramResult<Bytes> {
        let (status, body) = self
            .do_request(HttpMethod::Get, url, None, timeouts)
            .await?;
        check_status(status, body)
    }
}

/// Decodes a response body as JSON, replacing invalid UTF-8
pub fn parse_json_payload(payload: &[u8]) -> TelegramResult<Value> {
    let text = String::from_utf8_lossy(payload);
    serde_json::from_str(&text).map_err(|e| {
        error!(error = %e, body = %text, "Can not load invalid JSON data");
        TelegramError::Generic("Invalid server response".to_string())
    })
}

/// Passes 2xx bodies through and maps anything else to an error
pub fn check_status(status: u16, payload: Bytes) -> TelegramResult<Bytes> {
    if (200..300).contains(&status) {
        return Ok(payload);
    }
    Err(error_from_response(status, &payload))
}

fn error_from_response(status: u16, payload: &[u8]) -> TelegramError {
    let response = match parse_json_payload(payload) {
        Ok(response) => response,
        Err(e) => return e,
    };

    let description = response
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    let mut message = description
        .clone()
        .unwrap_or_else(|| "Unknown HTTPError".to_string());

    if let Some(parameters) = response.get("parameters").filter(|p| !p.is_null()) {
        if let Some(new_chat_id) = parameters.get("migrate_to_chat_id").and_then(Value::as_i64) {
            return TelegramError::ChatMigrated { new_chat_id };
        }
        if let Some(retry_after) = parameters.get("retry_after").and_then(Value::as_u64) {
            return TelegramError::RetryAfter { retry_after };
        }
        message = format!(
            "{}\nThe server response contained unknown parameters: {}",
            message, parameters
        );
    }

    debug!(status = status, message = %message, "Bot API returned an error");

    match status {
        403 => TelegramError::Forbidden(message),
        401 | 404 => TelegramError::InvalidToken(message),
        400 => TelegramError::BadRequest(message),
        409 => TelegramError::Conflict(message),
        502 => TelegramError::NetworkError(description.unwrap_or_else(|| "Bad Gateway".to_string())),
        _ => TelegramError::NetworkError(format!("{} ({})", message, status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn error_for(status: u16, body: Value) -> TelegramError {
        check_status(status, Bytes::from(body.to_string())).unwrap_err()
    }

    #[test]
    fn test_status_mapping() {
        let body = json!({"ok": false, "description": "nope"});
        assert_matches!(error_for(400, body.clone()), TelegramError::BadRequest(m) if m == "nope");
        assert_matches!(error_for(401, body.clone()), TelegramError::InvalidToken(_));
        assert_matches!(error_for(404, body.clone()), TelegramError::InvalidToken(_));
        assert_matches!(error_for(403, body.clone()), TelegramError::Forbidden(_));
        assert_matches!(error_for(409, body.clone()), TelegramError::Conflict(_));
        assert_matches!(error_for(500, body), TelegramError::NetworkError(m) if m == "nope (500)");
    }

    #[test]
    fn test_bad_gateway_without_description() {
        assert_matches!(
            error_for(502, json!({"ok": false})),
            TelegramError::NetworkError(m) if m == "Bad Gateway"
        );
    }

    #[test]
    fn test_parameters_take_precedence() {
        let migrated = error_for(
            400,
            json!({"ok": false, "description": "migrated", "parameters": {"migrate_to_chat_id": -100123}}),
        );
        assert_eq!(migrated, TelegramError::ChatMigrated { new_chat_id: -100123 });

        let flood = error_for(
            429,
            json!({"ok": false, "description": "Too Many Requests", "parameters": {"retry_after": 7}}),
        );
        assert_eq!(flood, TelegramError::RetryAfter { retry_after: 7 });
    }

    #[test]
    fn test_invalid_json_is_generic() {
        let err = check_status(500, Bytes::from_static(b"<html>oops</html>")).unwrap_err();
        assert_eq!(err, TelegramError::Generic("Invalid server response".into()));
        assert!(parse_json_payload(b"not json").is_err());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let payload = b"{\"ok\":true,\"result\":\"caf\xff\"}";
        let value = parse_json_payload(payload).unwrap();
        assert_eq!(value["result"], json!("caf\u{FFFD}"));
    }

    #[test]
    fn test_timeouts() {
        let timeouts = RequestTimeouts::default().with_extra_read(Duration::from_secs(30));
        assert_eq!(timeouts.read, Duration::from_secs(35));
        assert_eq!(timeouts.total(), Duration::from_secs(45));
    }
}
