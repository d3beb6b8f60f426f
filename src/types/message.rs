//! Messages and message entities

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::chat::Chat;
use super::keyboard::InlineKeyboardMarkup;
use super::media::{
    Animation, Audio, Contact, Dice, Document, Game, Location, PhotoSize, Poll, Sticker, Venue,
    Video, VideoNote, Voice,
};
use super::payments::{Invoice, SuccessfulPayment};
use super::user::User;
use super::{telegram_object, Extra};

/// A special entity in a text, e.g. a hashtag, URL or bot command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    /// Offset in UTF-16 code units
    pub offset: i64,
    /// Length in UTF-16 code units
    pub length: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl MessageEntity {
    pub fn new(kind: impl Into<String>, offset: i64, length: i64) -> Self {
        Self {
            kind: kind.into(),
            offset,
            length,
            url: None,
            user: None,
            language: None,
            extra: Extra::new(),
        }
    }

    /// Extracts the entity's text from the message text it belongs to
    pub fn extract<'a>(&self, text: &'a str) -> Option<&'a str> {
        let start = utf16_to_byte_index(text, self.offset as usize)?;
        let end = utf16_to_byte_index(text, (self.offset + self.length) as usize)?;
        text.get(start..end)
    }
}

fn utf16_to_byte_index(text: &str, utf16_index: usize) -> Option<usize> {
    let mut units = 0;
    for (byte_index, ch) in text.char_indices() {
        if units == utf16_index {
            return Some(byte_index);
        }
        units += ch.len_utf16();
        if units > utf16_index {
            return None;
        }
    }
    (units == utf16_index).then_some(text.len())
}

/// Candidate attachment fields, in the order they are probed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Animation,
    Audio,
    Contact,
    Dice,
    Document,
    Game,
    Invoice,
    Location,
    PassportData,
    Photo,
    Poll,
    Sticker,
    SuccessfulPayment,
    Venue,
    Video,
    VideoNote,
    Voice,
}

const ATTACHMENT_ORDER: [AttachmentKind; 17] = [
    AttachmentKind::Animation,
    AttachmentKind::Audio,
    AttachmentKind::Contact,
    AttachmentKind::Dice,
    AttachmentKind::Document,
    AttachmentKind::Game,
    AttachmentKind::Invoice,
    AttachmentKind::Location,
    AttachmentKind::PassportData,
    AttachmentKind::Photo,
    AttachmentKind::Poll,
    AttachmentKind::Sticker,
    AttachmentKind::SuccessfulPayment,
    AttachmentKind::Venue,
    AttachmentKind::Video,
    AttachmentKind::VideoNote,
    AttachmentKind::Voice,
];

/// The single piece of content a message carries besides text
#[derive(Debug, Clone, Copy)]
pub enum Attachment<'a> {
    Animation(&'a Animation),
    Audio(&'a Audio),
    Contact(&'a Contact),
    Dice(&'a Dice),
    Document(&'a Document),
    Game(&'a Game),
    Invoice(&'a Invoice),
    Location(&'a Location),
    PassportData(&'a Value),
    Photo(&'a [PhotoSize]),
    Poll(&'a Poll),
    Sticker(&'a Sticker),
    SuccessfulPayment(&'a SuccessfulPayment),
    Venue(&'a Venue),
    Video(&'a Video),
    VideoNote(&'a VideoNote),
    Voice(&'a Voice),
}

/// A `/command@bot arg1 arg2` at the start of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub name: &'a str,
    pub bot_username: Option<&'a str>,
    pub args: Vec<&'a str>,
}

/// A Telegram message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_chat: Option<Chat>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_from: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_from_chat: Option<Chat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_from_message_id: Option<i64>,
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub forward_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_topic_message: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_automatic_forward: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message: Option<Box<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_bot: Option<User>,
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub edit_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_protected_content: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<MessageEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_entities: Option<Vec<MessageEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<Animation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<Audio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker: Option<Sticker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<Video>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_note: Option<VideoNote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<Voice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice: Option<Dice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<Game>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<Poll>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<Venue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_chat_members: Option<Vec<User>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_chat_member: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_chat_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_chat_photo: Option<Vec<PhotoSize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_chat_photo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_chat_created: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supergroup_chat_created: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_chat_created: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrate_to_chat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrate_from_chat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_message: Option<Box<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<Invoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_payment: Option<SuccessfulPayment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
    #[serde(flatten)]
    pub extra: Extra,
    #[serde(skip)]
    attachment_kind: OnceLock<Option<AttachmentKind>>,
}

telegram_object!(Message, MessageEntity);

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.message_id == other.message_id && self.chat.id == other.chat.id
    }
}

impl Eq for Message {}

impl Message {
    /// Creates a text message with only the required fields set
    pub fn new(message_id: i64, date: DateTime<Utc>, chat: Chat) -> Self {
        Self {
            message_id,
            message_thread_id: None,
            from: None,
            sender_chat: None,
            date,
            chat,
            forward_from: None,
            forward_from_chat: None,
            forward_from_message_id: None,
            forward_date: None,
            is_topic_message: None,
            is_automatic_forward: None,
            reply_to_message: None,
            via_bot: None,
            edit_date: None,
            has_protected_content: None,
            media_group_id: None,
            author_signature: None,
            text: None,
            entities: None,
            caption: None,
            caption_entities: None,
            animation: None,
            audio: None,
            document: None,
            photo: None,
            sticker: None,
            video: None,
            video_note: None,
            voice: None,
            contact: None,
            dice: None,
            game: None,
            poll: None,
            venue: None,
            location: None,
            new_chat_members: None,
            left_chat_member: None,
            new_chat_title: None,
            new_chat_photo: None,
            delete_chat_photo: None,
            group_chat_created: None,
            supergroup_chat_created: None,
            channel_chat_created: None,
            migrate_to_chat_id: None,
            migrate_from_chat_id: None,
            pinned_message: None,
            invoice: None,
            successful_payment: None,
            passport_data: None,
            connected_website: None,
            reply_markup: None,
            extra: Extra::new(),
            attachment_kind: OnceLock::new(),
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat.id
    }

    /// Text of a text message, caption of a media message
    pub fn text_or_caption(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// The attachment of this message, resolved once and cached
    pub fn effective_attachment(&self) -> Option<Attachment<'_>> {
        let kind = *self.attachment_kind.get_or_init(|| {
            ATTACHMENT_ORDER
                .iter()
                .copied()
                .find(|kind| self.attachment_of(*kind).is_some())
        });
        kind.and_then(|kind| self.attachment_of(kind))
    }

    fn attachment_of(&self, kind: AttachmentKind) -> Option<Attachment<'_>> {
        match kind {
            AttachmentKind::Animation => self.animation.as_ref().map(Attachment::Animation),
            AttachmentKind::Audio => self.audio.as_ref().map(Attachment::Audio),
            AttachmentKind::Contact => self.contact.as_ref().map(Attachment::Contact),
            AttachmentKind::Dice => self.dice.as_ref().map(Attachment::Dice),
            AttachmentKind::Document => self.document.as_ref().map(Attachment::Document),
            AttachmentKind::Game => self.game.as_ref().map(Attachment::Game),
            AttachmentKind::Invoice => self.invoice.as_ref().map(Attachment::Invoice),
            AttachmentKind::Location => self.location.as_ref().map(Attachment::Location),
            AttachmentKind::PassportData => {
                self.passport_data.as_ref().map(Attachment::PassportData)
            }
            AttachmentKind::Photo => self
                .photo
                .as_deref()
                .filter(|sizes| !sizes.is_empty())
                .map(Attachment::Photo),
            AttachmentKind::Poll => self.poll.as_ref().map(Attachment::Poll),
            AttachmentKind::Sticker => self.sticker.as_ref().map(Attachment::Sticker),
            AttachmentKind::SuccessfulPayment => self
                .successful_payment
                .as_ref()
                .map(Attachment::SuccessfulPayment),
            AttachmentKind::Venue => self.venue.as_ref().map(Attachment::Venue),
            AttachmentKind::Video => self.video.as_ref().map(Attachment::Video),
            AttachmentKind::VideoNote => self.video_note.as_ref().map(Attachment::VideoNote),
            AttachmentKind::Voice => self.voice.as_ref().map(Attachment::Voice),
        }
    }

    /// Parses a leading `/command[@bot] args...` out of the text
    pub fn parse_command(&self) -> Option<ParsedCommand<'_>> {
        let text = self.text.as_deref()?;
        let mut words = text.split_whitespace();
        let first = words.next()?;
        if !text.starts_with('/') || first.len() < 2 {
            return None;
        }
        let (name, bot_username) = match first[1..].split_once('@') {
            Some((name, bot)) => (name, Some(bot)),
            None => (&first[1..], None),
        };
        if name.is_empty() {
            return None;
        }
        Some(ParsedCommand {
            name,
            bot_username,
            args: words.collect(),
        })
    }

    /// Public link to this message for supergroups and channels
    pub fn link(&self) -> Option<String> {
        if self.chat.kind != super::chat::SUPERGROUP && !self.chat.is_channel() {
            return None;
        }
        let target = match &self.chat.username {
            Some(username) => username.clone(),
            None => format!("c/{}", self.chat.id.to_string().trim_start_matches("-100")),
        };
        Some(format!("https://t.me/{}/{}", target, self.message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TelegramObject;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn base(extra: Value) -> Value {
        let mut payload = json!({
            "message_id": 5,
            "date": 1690000000,
            "chat": {"id": 42, "type": "private"}
        });
        if let (Some(map), Value::Object(extra)) = (payload.as_object_mut(), extra) {
            map.extend(extra);
        }
        payload
    }

    #[test]
    fn test_round_trip_text_message() {
        let payload = base(json!({
            "from": {"id": 42, "is_bot": false, "first_name": "Ada"},
            "text": "/start",
            "entities": [{"type": "bot_command", "offset": 0, "length": 6}]
        }));
        let message = Message::de_json(payload.clone()).unwrap();
        assert_eq!(message.text.as_deref(), Some("/start"));
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.date.timestamp(), 1690000000);
        assert_eq!(message.to_dict(), payload);
    }

    #[test]
    fn test_effective_attachment_follows_fixed_order() {
        let payload = base(json!({
            "venue": {
                "location": {"longitude": 121.47, "latitude": 31.23},
                "title": "Studio", "address": "Road 1"
            },
            "location": {"longitude": 121.47, "latitude": 31.23}
        }));
        let message = Message::de_json(payload).unwrap();
        assert_matches!(message.effective_attachment(), Some(Attachment::Location(_)));
        // cached result is stable
        assert_matches!(message.effective_attachment(), Some(Attachment::Location(_)));
    }

    #[test]
    fn test_effective_attachment_ignores_empty_photo() {
        let message = Message::de_json(base(json!({"photo": [], "text": "hi"}))).unwrap();
        assert!(message.effective_attachment().is_none());

        let message = Message::de_json(base(json!({
            "audio": {"file_id": "f", "file_unique_id": "u", "duration": 60}
        })))
        .unwrap();
        assert_matches!(message.effective_attachment(), Some(Attachment::Audio(a)) if a.duration == 60);
    }

    #[test]
    fn test_parse_command() {
        let mut message = Message::de_json(base(json!({"text": "/subscribe@castpod_bot https://x.io/rss now"}))).unwrap();
        let command = message.parse_command().unwrap();
        assert_eq!(command.name, "subscribe");
        assert_eq!(command.bot_username, Some("castpod_bot"));
        assert_eq!(command.args, vec!["https://x.io/rss", "now"]);

        message.text = Some("hello /start".into());
        assert!(message.parse_command().is_none());
        message.text = Some("/".into());
        assert!(message.parse_command().is_none());
    }

    #[test]
    fn test_entity_extract_counts_utf16_units() {
        let text = "🎧 #podcast";
        let entity = MessageEntity::new("hashtag", 3, 8);
        assert_eq!(entity.extract(text), Some("#podcast"));
    }

    #[test]
    fn test_identity_and_link() {
        let a = Message::de_json(base(json!({"text": "a"}))).unwrap();
        let b = Message::de_json(base(json!({"text": "b"}))).unwrap();
        assert_eq!(a, b);
        assert!(a.link().is_none());

        let mut chat = Chat::new(-1001234, "supergroup");
        chat.username = Some("castpod".into());
        let message = Message::new(9, Utc::now(), chat);
        assert_eq!(message.link().as_deref(), Some("https://t.me/castpod/9"));
    }
}
