//! Castpod handlers driven through a full application

mod helpers;

use std::sync::Arc;

use assert_matches::assert_matches;
use castpod::config::CastpodConfig;
use castpod::ext::{Application, CallbackContext, TypeHandler};
use castpod::handlers::{self, errors::ERROR_MESSAGE};
use castpod::middleware::CLEANUP_JOB_NAME;
use castpod::models::SubscriptionList;
use castpod::types::Update;
use castpod::CastpodError;
use helpers::*;
use serde_json::json;

const FEED: &str = "https://feeds.example.com/a.xml";

async fn castpod_app(mock: &TelegramMockServer, config: &CastpodConfig) -> Arc<Application> {
    mock.mock_send_message().await;
    let app = mock
        .app_builder()
        .arbitrary_callback_data(None)
        .build()
        .unwrap();
    handlers::register(&app, config).unwrap();
    app
}

async fn subscriptions_of(app: &Application, user_id: i64) -> SubscriptionList {
    SubscriptionList::load(&*app.user_data(user_id).lock().await).unwrap()
}

#[tokio::test]
async fn test_register_needs_arbitrary_callback_data() {
    let mock = TelegramMockServer::new().await;
    let app = mock.app_builder().build().unwrap();
    assert_matches!(
        handlers::register(&app, &CastpodConfig::default()),
        Err(CastpodError::Config(_))
    );
}

#[tokio::test]
async fn test_register_schedules_rate_limit_cleanup() {
    let mock = TelegramMockServer::new().await;
    let app = castpod_app(&mock, &CastpodConfig::default()).await;

    let job_queue = app.job_queue().expect("No job queue");
    assert_eq!(job_queue.get_jobs_by_name(CLEANUP_JOB_NAME).len(), 1);
}

#[tokio::test]
async fn test_start_greets_new_user() {
    let mock = TelegramMockServer::new().await;
    let app = castpod_app(&mock, &CastpodConfig::default()).await;

    app.process_update(Arc::new(message(1, "/start"))).await;

    let texts = mock.sent_texts().await;
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("你好，Ada！"));
}

#[tokio::test]
async fn test_subscribe_list_and_unsubscribe() {
    let mock = TelegramMockServer::new().await;
    mock.mock_result("answerCallbackQuery", json!(true)).await;
    mock.mock_result("editMessageText", sent_message(CHAT_ID, "你已退订全部播客。"))
        .await;
    let app = castpod_app(&mock, &CastpodConfig::default()).await;

    app.process_update(Arc::new(message(1, &format!("/subscribe {}", FEED))))
        .await;
    assert!(subscriptions_of(&app, USER_ID).await.contains(FEED));

    app.process_update(Arc::new(message(2, "/subscriptions"))).await;
    let bodies = mock.requests_to("sendMessage").await;
    assert_eq!(bodies[0]["text"], json!(format!("已订阅 {}", FEED)));
    assert_eq!(bodies[1]["text"], json!("你订阅了 1 个播客，点击按钮退订："));
    let token = bodies[1]["reply_markup"]["inline_keyboard"][0][0]["callback_data"]
        .as_str()
        .expect("No unsubscribe button")
        .to_string();

    // incoming updates get their payloads back before dispatch
    let mut pressed = callback_update(
        3,
        USER_ID,
        &token,
        Some(sent_message(CHAT_ID, "你订阅了 1 个播客，点击按钮退订：")),
    );
    app.bot().insert_callback_data(&mut pressed);
    app.process_update(Arc::new(pressed)).await;

    assert!(subscriptions_of(&app, USER_ID).await.is_empty());
    let answers = mock.requests_to("answerCallbackQuery").await;
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0]["text"], json!("已退订"));
    let edits = mock.requests_to("editMessageText").await;
    assert_eq!(edits[0]["text"], json!("你已退订全部播客。"));
    assert_eq!(edits[0]["chat_id"], json!(CHAT_ID));
    assert!(app.bot().callback_data_cache().unwrap().is_empty());
}

#[tokio::test]
async fn test_subscribe_reply_is_sent_as_html() {
    let mock = TelegramMockServer::new().await;
    let app = castpod_app(&mock, &CastpodConfig::default()).await;

    let feed = "https://feeds.example.com/rss?show=1&format=mp3";
    app.process_update(Arc::new(message(1, &format!("/subscribe {}", feed))))
        .await;

    let body = &mock.requests_to("sendMessage").await[0];
    assert_eq!(body["parse_mode"], json!("HTML"));
    assert_eq!(
        body["text"],
        json!("已订阅 https://feeds.example.com/rss?show=1&amp;format=mp3")
    );
    assert!(subscriptions_of(&app, USER_ID).await.contains(feed));
}

#[tokio::test]
async fn test_expired_button_gets_alert() {
    let mock = TelegramMockServer::new().await;
    mock.mock_result("answerCallbackQuery", json!(true)).await;
    let app = castpod_app(&mock, &CastpodConfig::default()).await;

    let stale = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
    let mut pressed = callback_update(1, USER_ID, stale, None);
    app.bot().insert_callback_data(&mut pressed);
    app.process_update(Arc::new(pressed)).await;

    let answers = mock.requests_to("answerCallbackQuery").await;
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0]["show_alert"], json!(true));
}

#[tokio::test]
async fn test_subscribe_asks_for_url_until_valid() {
    let mock = TelegramMockServer::new().await;
    let app = castpod_app(&mock, &CastpodConfig::default()).await;

    app.process_update(Arc::new(message(1, "/subscribe"))).await;
    app.process_update(Arc::new(message(2, "not a url"))).await;
    app.process_update(Arc::new(message(3, FEED))).await;
    // the conversation is over, plain text is ignored again
    app.process_update(Arc::new(message(4, "https://feeds.example.com/b.xml")))
        .await;

    assert_eq!(
        mock.sent_texts().await,
        vec![
            "请发送播客的 RSS 地址，或发送 /cancel 取消。".to_string(),
            "这不是有效的 RSS 地址，请重新发送。".to_string(),
            format!("已订阅 {}", FEED),
        ]
    );
    assert_eq!(subscriptions_of(&app, USER_ID).await.len(), 1);
}

#[tokio::test]
async fn test_subscription_limit() {
    let mock = TelegramMockServer::new().await;
    let config = CastpodConfig {
        max_subscriptions: 1,
        ..CastpodConfig::default()
    };
    let app = castpod_app(&mock, &config).await;

    app.process_update(Arc::new(message(1, &format!("/subscribe {}", FEED))))
        .await;
    app.process_update(Arc::new(message(2, "/subscribe https://feeds.example.com/b.xml")))
        .await;

    let texts = mock.sent_texts().await;
    assert_eq!(texts[1], "最多只能订阅 1 个播客，请先退订一些。");
    assert_eq!(subscriptions_of(&app, USER_ID).await.len(), 1);
}

#[tokio::test]
async fn test_rate_limit_drops_excess_updates() {
    let mock = TelegramMockServer::new().await;
    let config = CastpodConfig {
        rate_limit_per_minute: 2,
        ..CastpodConfig::default()
    };
    let app = castpod_app(&mock, &config).await;

    for update_id in 1..=3 {
        app.process_update(Arc::new(message(update_id, "/help"))).await;
    }
    assert_eq!(mock.requests_to("sendMessage").await.len(), 2);
}

#[tokio::test]
async fn test_errors_are_reported() {
    let mock = TelegramMockServer::new().await;
    let config = CastpodConfig {
        developer_chat_id: Some(999),
        ..CastpodConfig::default()
    };
    let app = castpod_app(&mock, &config).await;
    app.add_handler(
        TypeHandler::any(|_update: Arc<Update>, _ctx: CallbackContext| async {
            Err(CastpodError::Handler("feed fetch failed".to_string()))
        }),
        1,
    );

    app.process_update(Arc::new(message(1, "hello"))).await;

    let bodies = mock.requests_to("sendMessage").await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["chat_id"], json!(CHAT_ID));
    assert_eq!(bodies[0]["text"], json!(ERROR_MESSAGE));
    assert_eq!(bodies[1]["chat_id"], json!(999));
    assert_eq!(bodies[1]["parse_mode"], json!("HTML"));
    assert!(bodies[1]["text"]
        .as_str()
        .unwrap()
        .contains("Handler error: feed fetch failed"));
}
