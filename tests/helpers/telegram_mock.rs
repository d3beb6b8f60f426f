//! Mock Telegram API server for testing
//!
//! Wraps a wiremock server answering Bot API methods under
//! `/bot<TOKEN>/<method>`.

use std::time::Duration;

use castpod::ext::ApplicationBuilder;
use castpod::Bot;
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const TOKEN: &str = "12345:test_token";
pub const BOT_ID: i64 = 12345;
pub const BOT_USERNAME: &str = "castpod_test_bot";

/// Mock Telegram API server for testing
pub struct TelegramMockServer {
    pub server: MockServer,
}

impl TelegramMockServer {
    /// Create a new mock Telegram API server
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Bot API base URL, the token is appended by the bot
    pub fn base_url(&self) -> String {
        format!("{}/bot", self.server.uri())
    }

    pub fn method_path(api_method: &str) -> String {
        format!("/bot{}/{}", TOKEN, api_method)
    }

    pub fn bot(&self) -> Bot {
        Bot::builder(TOKEN)
            .base_url(self.base_url())
            .build()
            .expect("Failed to build bot")
    }

    /// Application builder talking to this server
    pub fn app_builder(&self) -> ApplicationBuilder {
        ApplicationBuilder::new()
            .token(TOKEN)
            .base_url(self.base_url())
            .updater(false)
    }

    /// Answer `api_method` with `result`
    pub async fn mock_result(&self, api_method: &str, result: Value) {
        Mock::given(method("POST"))
            .and(path(Self::method_path(api_method)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": result})))
            .mount(&self.server)
            .await;
    }

    /// Answer `api_method` with `result` at most `times` times
    pub async fn mock_result_times(&self, api_method: &str, result: Value, times: u64) {
        Mock::given(method("POST"))
            .and(path(Self::method_path(api_method)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": result})))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Answer `api_method` with an error response
    pub async fn mock_error(&self, api_method: &str, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(Self::method_path(api_method)))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_delayed(&self, api_method: &str, result: Value, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(Self::method_path(api_method)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true, "result": result}))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Setup mock for getMe endpoint
    pub async fn mock_get_me(&self) {
        self.mock_result(
            "getMe",
            json!({
                "id": BOT_ID,
                "is_bot": true,
                "first_name": "Castpod",
                "username": BOT_USERNAME
            }),
        )
        .await;
    }

    /// Setup mock for sendMessage endpoint
    pub async fn mock_send_message(&self) {
        self.mock_result("sendMessage", sent_message(42, "ok")).await;
    }

    /// JSON bodies of all requests made to `api_method`
    pub async fn requests_to(&self, api_method: &str) -> Vec<Value> {
        let wanted = Self::method_path(api_method);
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == wanted)
            .map(|request| serde_json::from_slice(&request.body).unwrap_or(Value::Null))
            .collect()
    }

    /// Texts of all sent messages
    pub async fn sent_texts(&self) -> Vec<String> {
        self.requests_to("sendMessage")
            .await
            .into_iter()
            .filter_map(|body| body["text"].as_str().map(str::to_string))
            .collect()
    }
}

/// A message as returned by sendMessage
pub fn sent_message(chat_id: i64, text: &str) -> Value {
    json!({
        "message_id": 100,
        "from": {"id": BOT_ID, "is_bot": true, "first_name": "Castpod", "username": BOT_USERNAME},
        "chat": {"id": chat_id, "type": "private", "first_name": "Ada"},
        "date": 1690000000,
        "text": text
    })
}
