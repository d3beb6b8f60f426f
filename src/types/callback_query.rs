use serde::{Deserialize, Serialize};

use super::keyboard::CallbackPayload;
use super::message::Message;
use super::user::User;
use super::{identity_eq, telegram_object, Extra};

/// An incoming press of an inline keyboard button
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Box<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_message_id: Option<String>,
    pub chat_instance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CallbackPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_short_name: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

telegram_object!(CallbackQuery);
identity_eq!(CallbackQuery => |q| q.id.clone());

impl CallbackQuery {
    pub fn new(id: impl Into<String>, from: User, chat_instance: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from,
            message: None,
            inline_message_id: None,
            chat_instance: chat_instance.into(),
            data: None,
            game_short_name: None,
            extra: Extra::new(),
        }
    }

    /// Raw string payload, if the button carried plain text
    pub fn data_text(&self) -> Option<&str> {
        self.data.as_ref().and_then(CallbackPayload::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TelegramObject;
    use serde_json::json;

    #[test]
    fn test_decode_with_message() {
        let query = CallbackQuery::de_json(json!({
            "id": "4382",
            "from": {"id": 9, "is_bot": false, "first_name": "Ada"},
            "chat_instance": "ci",
            "data": "page:2",
            "message": {"message_id": 3, "date": 1690000000, "chat": {"id": 9, "type": "private"}}
        }))
        .unwrap();
        assert_eq!(query.data_text(), Some("page:2"));
        assert_eq!(query.message.as_ref().map(|m| m.message_id), Some(3));
    }
}
