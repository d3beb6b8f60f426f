//! Typed Bot API objects
//!
//! Every record mirrors a JSON object of the Telegram Bot API. Unknown fields
//! are kept in a flattened `extra` map so that newer API versions survive a
//! decode/encode round trip. Unix timestamps are exposed as `DateTime<Utc>`.

pub mod callback_query;
pub mod chat;
pub mod chat_member;
pub mod inline;
pub mod keyboard;
pub mod media;
pub mod menu_button;
pub mod message;
pub mod misc;
pub mod payments;
pub mod update;
pub mod user;

pub use callback_query::CallbackQuery;
pub use chat::{Chat, ChatPermissions};
pub use chat_member::{
    ChatMember, ChatMemberAdministrator, ChatMemberBanned, ChatMemberLeft, ChatMemberMember,
    ChatMemberOwner, ChatMemberRestricted, ChatMemberUnknown,
};
pub use inline::{
    ChosenInlineResult, InlineQuery, InlineQueryResult, InlineQueryResultArticle,
    InlineQueryResultAudio, InputTextMessageContent,
};
pub use keyboard::{
    CallbackPayload, ForceReply, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton,
    ReplyKeyboardMarkup, ReplyKeyboardRemove, ReplyMarkup,
};
pub use media::{
    Animation, Audio, Contact, Dice, Document, Game, Location, PhotoSize, Poll, PollAnswer,
    PollOption, Sticker, Venue, Video, VideoNote, Voice,
};
pub use menu_button::{MenuButton, WebAppInfo};
pub use message::{Attachment, Message, MessageEntity, ParsedCommand};
pub use misc::{
    BotCommand, BotCommandScope, ChatAction, ChatId, ChatInviteLink, ChatJoinRequest,
    ChatMemberUpdated, File, MessageId, ParseMode, ResponseParameters, WebhookInfo,
};
pub use payments::{
    Invoice, LabeledPrice, OrderInfo, PreCheckoutQuery, ShippingAddress, ShippingOption,
    ShippingQuery, SuccessfulPayment,
};
pub use update::Update;
pub use user::User;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::utils::errors::{TelegramError, TelegramResult};

/// Bucket for fields this crate does not model explicitly
pub type Extra = Map<String, Value>;

/// Common conversions shared by all Bot API records
pub trait TelegramObject: Serialize + DeserializeOwned + Sized {
    /// Builds the record from a decoded JSON payload
    fn de_json(value: Value) -> TelegramResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            TelegramError::Generic(format!(
                "Failed to decode {}: {}",
                std::any::type_name::<Self>(),
                e
            ))
        })
    }

    /// Builds a list of records from a JSON array
    fn de_list(value: Value) -> TelegramResult<Vec<Self>> {
        match value {
            Value::Array(items) => items.into_iter().map(Self::de_json).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(TelegramError::Generic(format!(
                "Expected a JSON array, got {}",
                other
            ))),
        }
    }

    /// Converts the record back into its JSON representation
    fn to_dict(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Serializes the record into a JSON string
    fn to_json(&self) -> String {
        self.to_dict().to_string()
    }
}

/// Implements [`TelegramObject`] for a list of records
macro_rules! telegram_object {
    ($($ty:ty),+ $(,)?) => {
        $(impl $crate::types::TelegramObject for $ty {})+
    };
}

/// Implements equality over the identity attributes of a record
macro_rules! identity_eq {
    ($ty:ty => |$this:ident| $key:expr) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                let key = |$this: &$ty| $key;
                key(self) == key(other)
            }
        }
        impl Eq for $ty {}
    };
}

pub(crate) use identity_eq;
pub(crate) use telegram_object;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_de_list() {
        let users = User::de_list(json!([
            {"id": 1, "is_bot": false, "first_name": "A"},
            {"id": 2, "is_bot": true, "first_name": "B"}
        ]))
        .unwrap();
        assert_eq!(users.len(), 2);
        assert!(users[1].is_bot);
        assert!(User::de_list(Value::Null).unwrap().is_empty());
        assert!(User::de_list(json!({"id": 1})).is_err());
    }

    #[test]
    fn test_de_json_error_names_type() {
        let err = User::de_json(json!({"first_name": "no id"})).unwrap_err();
        assert!(err.to_string().contains("User"));
    }
}
