//! Sending, editing and deleting messages

use crate::request::{InputFile, RequestData};
use crate::types::{ChatAction, ChatId, InlineKeyboardMarkup, Message, MessageId};
use crate::utils::errors::TelegramResult;

use super::params::{MediaOptions, MessageOptions, MessageTarget};
use super::Bot;

impl Bot {
    pub async fn send_message(
        &self,
        chat_id: impl Into<ChatId>,
        text: impl Into<String>,
        options: MessageOptions,
    ) -> TelegramResult<Message> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("text", text.into())?;
        self.write_message_options(&mut data, options, "entities", true)?;
        self.call_message("sendMessage", &data).await
    }

    pub async fn forward_message(
        &self,
        chat_id: impl Into<ChatId>,
        from_chat_id: impl Into<ChatId>,
        message_id: i64,
        disable_notification: Option<bool>,
    ) -> TelegramResult<Message> {
        let defaults = self.defaults();
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("from_chat_id", from_chat_id.into())?;
        data.insert("message_id", message_id)?;
        data.insert(
            "disable_notification",
            disable_notification.or(defaults.and_then(|d| d.disable_notification)),
        )?;
        data.insert("protect_content", defaults.and_then(|d| d.protect_content))?;
        self.call_message("forwardMessage", &data).await
    }

    /// Copies a message without a link to the original
    pub async fn copy_message(
        &self,
        chat_id: impl Into<ChatId>,
        from_chat_id: impl Into<ChatId>,
        message_id: i64,
        caption: Option<String>,
        options: MessageOptions,
    ) -> TelegramResult<MessageId> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("from_chat_id", from_chat_id.into())?;
        data.insert("message_id", message_id)?;
        data.insert("caption", caption)?;
        self.write_message_options(&mut data, options, "caption_entities", false)?;
        self.call("copyMessage", &data).await
    }

    fn media_request(
        &self,
        chat_id: ChatId,
        field: &str,
        media: InputFile,
        options: &mut MediaOptions,
    ) -> TelegramResult<RequestData> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id)?;
        data.insert_file(field, media);
        data.insert("caption", options.caption.take())?;
        if let Some(thumbnail) = options.thumbnail.take() {
            data.insert_file("thumbnail", thumbnail);
        }
        Ok(data)
    }

    pub async fn send_photo(
        &self,
        chat_id: impl Into<ChatId>,
        photo: InputFile,
        mut options: MediaOptions,
    ) -> TelegramResult<Message> {
        let mut data = self.media_request(chat_id.into(), "photo", photo, &mut options)?;
        data.insert("has_spoiler", options.has_spoiler)?;
        self.write_message_options(&mut data, options.message, "caption_entities", false)?;
        self.call_message("sendPhoto", &data).await
    }

    /// Sends an audio file, e.g. a podcast episode
    pub async fn send_audio(
        &self,
        chat_id: impl Into<ChatId>,
        audio: InputFile,
        mut options: MediaOptions,
    ) -> TelegramResult<Message> {
        let mut data = self.media_request(chat_id.into(), "audio", audio, &mut options)?;
        data.insert("duration", options.duration)?;
        data.insert("performer", options.performer.take())?;
        data.insert("title", options.title.take())?;
        self.write_message_options(&mut data, options.message, "caption_entities", false)?;
        self.call_message("sendAudio", &data).await
    }

    pub async fn send_document(
        &self,
        chat_id: impl Into<ChatId>,
        document: InputFile,
        mut options: MediaOptions,
    ) -> TelegramResult<Message> {
        let mut data = self.media_request(chat_id.into(), "document", document, &mut options)?;
        self.write_message_options(&mut data, options.message, "caption_entities", false)?;
        self.call_message("sendDocument", &data).await
    }

    pub async fn send_voice(
        &self,
        chat_id: impl Into<ChatId>,
        voice: InputFile,
        mut options: MediaOptions,
    ) -> TelegramResult<Message> {
        let mut data = self.media_request(chat_id.into(), "voice", voice, &mut options)?;
        data.insert("duration", options.duration)?;
        self.write_message_options(&mut data, options.message, "caption_entities", false)?;
        self.call_message("sendVoice", &data).await
    }

    pub async fn send_location(
        &self,
        chat_id: impl Into<ChatId>,
        latitude: f64,
        longitude: f64,
        options: MessageOptions,
    ) -> TelegramResult<Message> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("latitude", latitude)?;
        data.insert("longitude", longitude)?;
        let mut options = options;
        options.apply_defaults(self.defaults());
        // location messages take neither parse mode nor entities
        options.parse_mode = None;
        options.entities = None;
        options.reply_markup = self.prepare_markup(options.reply_markup.take())?;
        options.write(&mut data, "entities", false)?;
        self.call_message("sendLocation", &data).await
    }

    pub async fn send_chat_action(
        &self,
        chat_id: impl Into<ChatId>,
        action: ChatAction,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("action", action)?;
        self.call("sendChatAction", &data).await
    }

    /// Edits a text message. `None` for inline messages.
    pub async fn edit_message_text(
        &self,
        target: MessageTarget,
        text: impl Into<String>,
        options: MessageOptions,
    ) -> TelegramResult<Option<Message>> {
        let mut data = RequestData::new();
        target.write(&mut data)?;
        data.insert("text", text.into())?;
        let mut options = options;
        options.apply_defaults(self.defaults());
        data.insert("parse_mode", options.parse_mode)?;
        data.insert("entities", &options.entities)?;
        data.insert("disable_web_page_preview", options.disable_web_page_preview)?;
        if let Some(markup) = self.prepare_markup(options.reply_markup.take())? {
            data.insert("reply_markup", markup)?;
        }
        self.call_edit("editMessageText", &data).await
    }

    pub async fn edit_message_reply_markup(
        &self,
        target: MessageTarget,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> TelegramResult<Option<Message>> {
        let mut data = RequestData::new();
        target.write(&mut data)?;
        if let Some(markup) = reply_markup {
            data.insert("reply_markup", self.prepare_inline_markup(&markup)?)?;
        }
        self.call_edit("editMessageReplyMarkup", &data).await
    }

    pub async fn delete_message(
        &self,
        chat_id: impl Into<ChatId>,
        message_id: i64,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("message_id", message_id)?;
        self.call("deleteMessage", &data).await
    }
}
