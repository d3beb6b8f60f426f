//! Optional parameters shared by groups of Bot API methods

use crate::request::{InputFile, RequestData};
use crate::types::{ChatId, MessageEntity, ParseMode, ReplyMarkup};
use crate::utils::errors::TelegramResult;

use super::defaults::Defaults;

/// Options common to every method that sends a message
#[derive(Debug, Clone, Default)]
pub struct MessageOptions {
    pub parse_mode: Option<ParseMode>,
    pub entities: Option<Vec<MessageEntity>>,
    pub disable_web_page_preview: Option<bool>,
    pub disable_notification: Option<bool>,
    pub protect_content: Option<bool>,
    pub message_thread_id: Option<i64>,
    pub reply_to_message_id: Option<i64>,
    pub allow_sending_without_reply: Option<bool>,
    pub reply_markup: Option<ReplyMarkup>,
}

impl MessageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_markup(markup: impl Into<ReplyMarkup>) -> Self {
        Self {
            reply_markup: Some(markup.into()),
            ..Self::default()
        }
    }

    pub fn parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = Some(parse_mode);
        self
    }

    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_to_message_id = Some(message_id);
        self
    }

    pub fn silent(mut self) -> Self {
        self.disable_notification = Some(true);
        self
    }

    /// Fills every unset option from `defaults`
    pub fn apply_defaults(&mut self, defaults: Option<&Defaults>) {
        let Some(defaults) = defaults else {
            return;
        };
        // explicit entities replace any parse mode
        if self.entities.is_none() {
            self.parse_mode = self.parse_mode.or(defaults.parse_mode);
        }
        self.disable_web_page_preview = self
            .disable_web_page_preview
            .or(defaults.disable_web_page_preview);
        self.disable_notification = self.disable_notification.or(defaults.disable_notification);
        self.protect_content = self.protect_content.or(defaults.protect_content);
        self.allow_sending_without_reply = self
            .allow_sending_without_reply
            .or(defaults.allow_sending_without_reply);
    }

    /// Writes the options, `entities_key` being `entities` or `caption_entities`
    pub(crate) fn write(
        &self,
        data: &mut RequestData,
        entities_key: &str,
        with_preview: bool,
    ) -> TelegramResult<()> {
        data.insert("parse_mode", self.parse_mode)?;
        data.insert(entities_key, &self.entities)?;
        if with_preview {
            data.insert("disable_web_page_preview", self.disable_web_page_preview)?;
        }
        data.insert("disable_notification", self.disable_notification)?;
        data.insert("protect_content", self.protect_content)?;
        data.insert("message_thread_id", self.message_thread_id)?;
        data.insert("reply_to_message_id", self.reply_to_message_id)?;
        data.insert("allow_sending_without_reply", self.allow_sending_without_reply)?;
        data.insert("reply_markup", &self.reply_markup)?;
        Ok(())
    }
}

/// Extra fields of media uploads. Unused fields are ignored per method.
#[derive(Debug, Clone, Default)]
pub struct MediaOptions {
    pub caption: Option<String>,
    pub duration: Option<i64>,
    pub performer: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<InputFile>,
    pub has_spoiler: Option<bool>,
    pub message: MessageOptions,
}

impl MediaOptions {
    pub fn with_caption(caption: impl Into<String>) -> Self {
        Self {
            caption: Some(caption.into()),
            ..Self::default()
        }
    }
}

/// Identifies an editable message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageTarget {
    Chat { chat_id: ChatId, message_id: i64 },
    /// A message sent via the bot in inline mode
    Inline(String),
}

impl MessageTarget {
    pub fn chat(chat_id: impl Into<ChatId>, message_id: i64) -> Self {
        MessageTarget::Chat {
            chat_id: chat_id.into(),
            message_id,
        }
    }

    pub(crate) fn write(&self, data: &mut RequestData) -> TelegramResult<()> {
        match self {
            MessageTarget::Chat {
                chat_id,
                message_id,
            } => {
                data.insert("chat_id", chat_id)?;
                data.insert("message_id", message_id)?;
            }
            MessageTarget::Inline(id) => {
                data.insert("inline_message_id", id)?;
            }
        }
        Ok(())
    }
}

/// Parameters of `setWebhook`
#[derive(Debug, Clone, Default)]
pub struct WebhookParams {
    pub url: String,
    pub certificate: Option<InputFile>,
    pub ip_address: Option<String>,
    pub max_connections: Option<i64>,
    pub allowed_updates: Option<Vec<String>>,
    pub drop_pending_updates: Option<bool>,
    pub secret_token: Option<String>,
}

impl WebhookParams {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InlineKeyboardButton, InlineKeyboardMarkup};
    use serde_json::json;

    #[test]
    fn test_defaults_fill_only_unset_options() {
        let defaults = Defaults {
            parse_mode: Some(ParseMode::Html),
            disable_notification: Some(true),
            protect_content: Some(true),
            ..Defaults::default()
        };
        let mut options = MessageOptions::new().parse_mode(ParseMode::MarkdownV2);
        options.protect_content = Some(false);
        options.apply_defaults(Some(&defaults));

        assert_eq!(options.parse_mode, Some(ParseMode::MarkdownV2));
        assert_eq!(options.disable_notification, Some(true));
        assert_eq!(options.protect_content, Some(false));
        assert_eq!(options.allow_sending_without_reply, None);
    }

    #[test]
    fn test_entities_suppress_default_parse_mode() {
        let defaults = Defaults::default().with_parse_mode(ParseMode::Html);
        let mut options = MessageOptions {
            entities: Some(vec![MessageEntity::new("bold", 0, 4)]),
            ..MessageOptions::default()
        };
        options.apply_defaults(Some(&defaults));
        assert_eq!(options.parse_mode, None);
    }

    #[test]
    fn test_write_skips_unset_fields() {
        let markup = InlineKeyboardMarkup::from_column(vec![InlineKeyboardButton::callback("A", "a")]);
        let options = MessageOptions::with_markup(markup).reply_to(7);
        let mut data = RequestData::new();
        options.write(&mut data, "entities", true).unwrap();
        assert_eq!(
            data.json_payload(),
            json!({
                "reply_to_message_id": 7,
                "reply_markup": {"inline_keyboard": [[{"text": "A", "callback_data": "a"}]]}
            })
        );
    }

    #[test]
    fn test_inline_target() {
        let mut data = RequestData::new();
        MessageTarget::Inline("abc".into()).write(&mut data).unwrap();
        assert_eq!(data.json_payload(), json!({"inline_message_id": "abc"}));
    }
}
