//! Inline and reply keyboards

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::menu_button::WebAppInfo;
use super::{telegram_object, Extra};

/// Data attached to an inline button and echoed back in a callback query
///
/// The Bot API only transports strings of up to 64 bytes. `Arbitrary`
/// payloads are swapped for short tokens by the callback-data cache before
/// they leave the process, and swapped back when the query arrives.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackPayload {
    Text(String),
    Arbitrary(Value),
    /// A token that could not be resolved, e.g. because the cache evicted it
    Invalid(String),
}

impl CallbackPayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CallbackPayload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_arbitrary(&self) -> Option<&Value> {
        match self {
            CallbackPayload::Arbitrary(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, CallbackPayload::Invalid(_))
    }
}

impl From<&str> for CallbackPayload {
    fn from(text: &str) -> Self {
        CallbackPayload::Text(text.to_string())
    }
}

impl From<String> for CallbackPayload {
    fn from(text: String) -> Self {
        CallbackPayload::Text(text)
    }
}

impl From<Value> for CallbackPayload {
    fn from(value: Value) -> Self {
        CallbackPayload::Arbitrary(value)
    }
}

impl Serialize for CallbackPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CallbackPayload::Text(text) | CallbackPayload::Invalid(text) => {
                serializer.serialize_str(text)
            }
            CallbackPayload::Arbitrary(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CallbackPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => CallbackPayload::Text(text),
            other => CallbackPayload::Arbitrary(other),
        })
    }
}

/// One button of an inline keyboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<CallbackPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_app: Option<WebAppInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_inline_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_inline_query_current_chat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl InlineKeyboardButton {
    fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            callback_data: None,
            web_app: None,
            switch_inline_query: None,
            switch_inline_query_current_chat: None,
            pay: None,
            extra: Extra::new(),
        }
    }

    pub fn callback(text: impl Into<String>, data: impl Into<CallbackPayload>) -> Self {
        Self {
            callback_data: Some(data.into()),
            ..Self::bare(text)
        }
    }

    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::bare(text)
        }
    }

    pub fn switch_inline_query(text: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            switch_inline_query: Some(query.into()),
            ..Self::bare(text)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    pub fn new(rows: Vec<Vec<InlineKeyboardButton>>) -> Self {
        Self {
            inline_keyboard: rows,
        }
    }

    /// One button per row
    pub fn from_column(buttons: Vec<InlineKeyboardButton>) -> Self {
        Self::new(buttons.into_iter().map(|b| vec![b]).collect())
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineKeyboardButton> {
        self.inline_keyboard.iter().flatten()
    }

    pub fn buttons_mut(&mut self) -> impl Iterator<Item = &mut InlineKeyboardButton> {
        self.inline_keyboard.iter_mut().flatten()
    }

    /// Whether any button carries a payload that cannot be sent as-is
    pub fn has_arbitrary_data(&self) -> bool {
        self.buttons()
            .any(|b| matches!(b.callback_data, Some(CallbackPayload::Arbitrary(_))))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyboardButton {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_contact: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_location: Option<bool>,
}

impl KeyboardButton {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            request_contact: None,
            request_location: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyKeyboardMarkup {
    pub keyboard: Vec<Vec<KeyboardButton>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize_keyboard: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_time_keyboard: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_field_placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selective: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyKeyboardRemove {
    pub remove_keyboard: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selective: Option<bool>,
}

impl Default for ReplyKeyboardRemove {
    fn default() -> Self {
        Self {
            remove_keyboard: true,
            selective: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceReply {
    pub force_reply: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_field_placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selective: Option<bool>,
}

/// Any markup accepted by the `reply_markup` parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReplyMarkup {
    InlineKeyboard(InlineKeyboardMarkup),
    ReplyKeyboard(ReplyKeyboardMarkup),
    Remove(ReplyKeyboardRemove),
    ForceReply(ForceReply),
}

impl From<InlineKeyboardMarkup> for ReplyMarkup {
    fn from(markup: InlineKeyboardMarkup) -> Self {
        ReplyMarkup::InlineKeyboard(markup)
    }
}

impl From<ReplyKeyboardMarkup> for ReplyMarkup {
    fn from(markup: ReplyKeyboardMarkup) -> Self {
        ReplyMarkup::ReplyKeyboard(markup)
    }
}

impl From<ReplyKeyboardRemove> for ReplyMarkup {
    fn from(markup: ReplyKeyboardRemove) -> Self {
        ReplyMarkup::Remove(markup)
    }
}

impl From<ForceReply> for ReplyMarkup {
    fn from(markup: ForceReply) -> Self {
        ReplyMarkup::ForceReply(markup)
    }
}

telegram_object!(InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, ReplyKeyboardMarkup);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TelegramObject;
    use serde_json::json;

    #[test]
    fn test_callback_payload_wire_format() {
        let markup = InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::callback("Play", "play:1"),
            InlineKeyboardButton::url("Site", "https://castpod.app"),
        ]]);
        assert_eq!(
            markup.to_dict(),
            json!({"inline_keyboard": [[
                {"text": "Play", "callback_data": "play:1"},
                {"text": "Site", "url": "https://castpod.app"}
            ]]})
        );
        assert!(!markup.has_arbitrary_data());
    }

    #[test]
    fn test_arbitrary_payload_detection() {
        let markup = InlineKeyboardMarkup::from_column(vec![InlineKeyboardButton::callback(
            "Unsubscribe",
            json!({"action": "unsubscribe", "feed": "https://example.com/rss"}),
        )]);
        assert!(markup.has_arbitrary_data());
    }

    #[test]
    fn test_reply_markup_is_untagged() {
        let markup: ReplyMarkup = ReplyKeyboardRemove::default().into();
        assert_eq!(serde_json::to_value(markup).unwrap(), json!({"remove_keyboard": true}));
    }
}
