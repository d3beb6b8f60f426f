//! Update builders for tests

use castpod::types::Update;
use serde_json::{json, Value};

pub const USER_ID: i64 = 7;
pub const CHAT_ID: i64 = 42;

fn user(user_id: i64) -> Value {
    json!({"id": user_id, "is_bot": false, "first_name": "Ada", "language_code": "zh-hans"})
}

/// Text message from `user_id` in a private chat `chat_id`
pub fn text_update(update_id: i64, chat_id: i64, user_id: i64, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id + 100,
            "date": 1690000000,
            "chat": {"id": chat_id, "type": "private", "first_name": "Ada"},
            "from": user(user_id),
            "text": text
        }
    }))
    .expect("Invalid test update")
}

/// Text message from the default user in the default chat
pub fn message(update_id: i64, text: &str) -> Update {
    text_update(update_id, CHAT_ID, USER_ID, text)
}

/// Callback query carrying the raw `data` string
pub fn callback_update(update_id: i64, user_id: i64, data: &str, message: Option<Value>) -> Update {
    let mut query = json!({
        "id": format!("query-{}", update_id),
        "from": user(user_id),
        "chat_instance": "instance",
        "data": data
    });
    if let Some(message) = message {
        query["message"] = message;
    }
    serde_json::from_value(json!({
        "update_id": update_id,
        "callback_query": query
    }))
    .expect("Invalid test update")
}
