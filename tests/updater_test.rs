//! Updater tests against a mocked Bot API

mod helpers;

use std::time::Duration;

use assert_matches::assert_matches;
use castpod::ext::{AppState, PollingConfig, QueueItem, Updater, WebhookConfig};
use castpod::{CastpodError, TelegramError};
use helpers::*;
use serde_json::json;
use tokio::sync::mpsc;

async fn next_update_id(rx: &mut mpsc::UnboundedReceiver<QueueItem>) -> i64 {
    let item = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("No update queued in time")
        .expect("Update queue closed");
    match item {
        QueueItem::Update(update) => update.update_id,
        QueueItem::Stop => panic!("Unexpected stop item"),
    }
}

fn update_json(update_id: i64, text: &str) -> serde_json::Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": 1690000000,
            "chat": {"id": CHAT_ID, "type": "private"},
            "text": text
        }
    })
}

#[tokio::test]
async fn test_polling_advances_offset() {
    let mock = TelegramMockServer::new().await;
    mock.mock_result("deleteWebhook", json!(true)).await;
    mock.mock_result_times(
        "getUpdates",
        json!([update_json(1, "first"), update_json(2, "second")]),
        1,
    )
    .await;
    mock.mock_result("getUpdates", json!([])).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let updater = Updater::new(mock.bot(), tx);
    updater
        .start_polling(PollingConfig {
            poll_interval: Duration::from_millis(20),
            ..PollingConfig::default()
        })
        .await
        .unwrap();
    assert!(updater.is_running());

    assert_eq!(next_update_id(&mut rx).await, 1);
    assert_eq!(next_update_id(&mut rx).await, 2);

    // wait for at least one poll after the first batch
    tokio::time::sleep(Duration::from_millis(100)).await;
    updater.stop().await.unwrap();
    assert!(!updater.is_running());

    let polls = mock.requests_to("getUpdates").await;
    assert!(polls.len() >= 2);
    assert!(polls.iter().skip(1).all(|body| body["offset"] == json!(3)));
    assert_eq!(mock.requests_to("deleteWebhook").await.len(), 1);
}

#[tokio::test]
async fn test_updater_cannot_start_twice() {
    let mock = TelegramMockServer::new().await;
    mock.mock_result("deleteWebhook", json!(true)).await;
    mock.mock_result("getUpdates", json!([])).await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let updater = Updater::new(mock.bot(), tx);
    let config = PollingConfig {
        poll_interval: Duration::from_millis(20),
        ..PollingConfig::default()
    };
    updater.start_polling(config.clone()).await.unwrap();
    assert_matches!(
        updater.start_polling(config).await,
        Err(CastpodError::InvalidState(_))
    );
    updater.stop().await.unwrap();
    assert_matches!(updater.stop().await, Err(CastpodError::InvalidState(_)));
}

#[tokio::test]
async fn test_polling_fails_when_webhook_cannot_be_removed() {
    let mock = TelegramMockServer::new().await;
    mock.mock_error(
        "deleteWebhook",
        401,
        json!({"ok": false, "error_code": 401, "description": "Unauthorized"}),
    )
    .await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let updater = Updater::new(mock.bot(), tx);
    assert!(updater.start_polling(PollingConfig::default()).await.is_err());
    assert!(!updater.is_running());
}

fn unauthorized() -> serde_json::Value {
    json!({"ok": false, "error_code": 401, "description": "Unauthorized"})
}

#[tokio::test]
async fn test_invalid_token_ends_polling_after_confirming_offset() {
    let mock = TelegramMockServer::new().await;
    mock.mock_result("deleteWebhook", json!(true)).await;
    mock.mock_result_times(
        "getUpdates",
        json!([update_json(1, "first"), update_json(2, "second")]),
        1,
    )
    .await;
    mock.mock_error("getUpdates", 401, unauthorized()).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let updater = Updater::new(mock.bot(), tx);
    updater.start_polling(PollingConfig::default()).await.unwrap();

    assert_eq!(next_update_id(&mut rx).await, 1);
    assert_eq!(next_update_id(&mut rx).await, 2);
    tokio::time::timeout(Duration::from_secs(5), updater.fetching_ended())
        .await
        .expect("Polling did not end");

    assert!(!updater.is_running());
    assert_matches!(
        updater.take_failure(),
        Some(CastpodError::Telegram(TelegramError::InvalidToken(_)))
    );
    let polls = mock.requests_to("getUpdates").await;
    let confirm = polls.last().expect("No getUpdates calls");
    assert_eq!(confirm["offset"], json!(3));
    assert_eq!(confirm["limit"], json!(1));

    updater.stop().await.unwrap();
}

#[tokio::test]
async fn test_run_polling_returns_when_token_is_rejected() {
    let mock = TelegramMockServer::new().await;
    mock.mock_get_me().await;
    mock.mock_result("deleteWebhook", json!(true)).await;
    mock.mock_error("getUpdates", 401, unauthorized()).await;
    let app = mock.app_builder().updater(true).build().unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        app.run_polling_until(PollingConfig::default(), std::future::pending::<()>()),
    )
    .await
    .expect("run_polling_until kept waiting for a stop signal");

    assert_matches!(
        result,
        Err(CastpodError::Telegram(TelegramError::InvalidToken(_)))
    );
    assert_eq!(app.state(), AppState::Shutdown);
    assert!(!app.updater().unwrap().is_running());
}

#[tokio::test]
async fn test_webhook_accepts_only_valid_updates() {
    let mock = TelegramMockServer::new().await;
    mock.mock_result("setWebhook", json!(true)).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let updater = Updater::new(mock.bot(), tx);
    updater
        .start_webhook(WebhookConfig {
            listen: "127.0.0.1".to_string(),
            port: 0,
            url_path: "webhook".to_string(),
            secret_token: Some("s3cret".to_string()),
            ..WebhookConfig::default()
        })
        .await
        .unwrap();
    let address = updater.webhook_address().expect("Webhook not bound");
    let url = format!("http://{}/webhook", address);
    let client = reqwest::Client::new();

    let response = client
        .post(&url)
        .header("X-Telegram-Bot-Api-Secret-Token", "wrong")
        .json(&update_json(1, "hi"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .post(&url)
        .header("X-Telegram-Bot-Api-Secret-Token", "s3cret")
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = client
        .post(&url)
        .header("X-Telegram-Bot-Api-Secret-Token", "s3cret")
        .json(&update_json(7, "hi"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(next_update_id(&mut rx).await, 7);

    let registered = mock.requests_to("setWebhook").await;
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0]["secret_token"], json!("s3cret"));
    assert_eq!(
        registered[0]["url"],
        json!(format!("http://127.0.0.1:{}/webhook", address.port()))
    );

    updater.stop().await.unwrap();
    assert!(updater.webhook_address().is_none());
}
