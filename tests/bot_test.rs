//! Bot API calls against a mocked server: defaults, callback data and
//! error mapping

mod helpers;

use assert_matches::assert_matches;
use castpod::bot::MessageOptions;
use castpod::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use castpod::{Bot, Defaults, TelegramError};
use helpers::*;
use serde_json::json;

fn bot_with_defaults(mock: &TelegramMockServer, defaults: Defaults) -> Bot {
    Bot::builder(TOKEN)
        .base_url(mock.base_url())
        .defaults(defaults)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_defaults_fill_unset_options() {
    let mock = TelegramMockServer::new().await;
    mock.mock_send_message().await;
    let defaults = Defaults {
        disable_notification: Some(true),
        ..Defaults::default().with_parse_mode(ParseMode::Html)
    };
    let bot = bot_with_defaults(&mock, defaults);

    bot.send_message(CHAT_ID, "<b>hi</b>", MessageOptions::new())
        .await
        .unwrap();
    bot.send_message(
        CHAT_ID,
        "*hi*",
        MessageOptions::new().parse_mode(ParseMode::MarkdownV2),
    )
    .await
    .unwrap();

    let bodies = mock.requests_to("sendMessage").await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["chat_id"], json!(CHAT_ID));
    assert_eq!(bodies[0]["parse_mode"], json!("HTML"));
    assert_eq!(bodies[0]["disable_notification"], json!(true));
    assert_eq!(bodies[1]["parse_mode"], json!("MarkdownV2"));
}

#[tokio::test]
async fn test_unset_options_are_not_sent() {
    let mock = TelegramMockServer::new().await;
    mock.mock_send_message().await;

    mock.bot()
        .send_message(CHAT_ID, "plain", MessageOptions::new())
        .await
        .unwrap();

    let body = &mock.requests_to("sendMessage").await[0];
    assert_eq!(body["text"], json!("plain"));
    assert!(body.get("parse_mode").is_none());
    assert!(body.get("reply_markup").is_none());
}

#[tokio::test]
async fn test_arbitrary_callback_data_round_trip() {
    let mock = TelegramMockServer::new().await;
    mock.mock_send_message().await;
    let app = mock
        .app_builder()
        .arbitrary_callback_data(Some(16))
        .build()
        .unwrap();

    let payload = json!({"action": "unsubscribe", "feed_url": "https://feeds.example.com/a.xml"});
    let markup = InlineKeyboardMarkup::from_column(vec![InlineKeyboardButton::callback(
        "退订",
        payload.clone(),
    )]);
    app.bot()
        .send_message(CHAT_ID, "订阅", MessageOptions::with_markup(markup))
        .await
        .unwrap();

    let body = &mock.requests_to("sendMessage").await[0];
    let token = body["reply_markup"]["inline_keyboard"][0][0]["callback_data"]
        .as_str()
        .expect("callback data was not replaced by a token")
        .to_string();
    assert!(token.len() <= 64);
    assert_eq!(app.bot().callback_data_cache().unwrap().len(), 1);

    let mut update = callback_update(1, USER_ID, &token, None);
    app.bot().insert_callback_data(&mut update);
    let data = update.callback_query.unwrap().data.unwrap();
    assert_eq!(data.as_arbitrary(), Some(&payload));
}

#[tokio::test]
async fn test_unknown_token_is_invalid() {
    let mock = TelegramMockServer::new().await;
    let app = mock
        .app_builder()
        .arbitrary_callback_data(None)
        .build()
        .unwrap();

    let stale = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
    let mut update = callback_update(1, USER_ID, stale, None);
    app.bot().insert_callback_data(&mut update);
    assert!(update.callback_query.unwrap().data.unwrap().is_invalid());

    // plain strings are left alone
    let mut update = callback_update(2, USER_ID, "noop", None);
    app.bot().insert_callback_data(&mut update);
    assert_eq!(
        update.callback_query.unwrap().data.unwrap().as_text(),
        Some("noop")
    );
}

#[tokio::test]
async fn test_arbitrary_data_without_cache_is_rejected() {
    let mock = TelegramMockServer::new().await;
    let markup = InlineKeyboardMarkup::from_column(vec![InlineKeyboardButton::callback(
        "x",
        json!({"a": 1}),
    )]);

    let result = mock
        .bot()
        .send_message(CHAT_ID, "x", MessageOptions::with_markup(markup))
        .await;
    assert_matches!(result, Err(TelegramError::BadRequest(_)));
    assert!(mock.requests_to("sendMessage").await.is_empty());
}

#[tokio::test]
async fn test_error_responses_are_mapped() {
    let mock = TelegramMockServer::new().await;
    mock.mock_error(
        "sendMessage",
        400,
        json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: group chat was upgraded to a supergroup chat",
            "parameters": {"migrate_to_chat_id": -1001234}
        }),
    )
    .await;
    mock.mock_error(
        "getMe",
        401,
        json!({"ok": false, "error_code": 401, "description": "Unauthorized"}),
    )
    .await;
    mock.mock_error(
        "getUpdates",
        429,
        json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 5",
            "parameters": {"retry_after": 5}
        }),
    )
    .await;

    let bot = mock.bot();
    assert_matches!(
        bot.send_message(CHAT_ID, "hi", MessageOptions::new()).await,
        Err(TelegramError::ChatMigrated { new_chat_id: -1001234 })
    );
    assert_matches!(bot.initialize().await, Err(TelegramError::InvalidToken(_)));
    assert_matches!(
        bot.get_updates(None, None, Some(0), None).await,
        Err(TelegramError::RetryAfter { retry_after: 5 })
    );
}

#[tokio::test]
async fn test_initialize_fetches_bot_user() {
    let mock = TelegramMockServer::new().await;
    mock.mock_get_me().await;

    let bot = mock.bot();
    assert!(!bot.is_initialized());
    bot.initialize().await.unwrap();
    bot.initialize().await.unwrap();

    assert!(bot.is_initialized());
    assert_eq!(bot.username().as_deref(), Some(BOT_USERNAME));
    assert_eq!(mock.requests_to("getMe").await.len(), 1);
}
