//! Inline mode queries and results

use serde::{Deserialize, Serialize};

use super::keyboard::InlineKeyboardMarkup;
use super::media::Location;
use super::misc::ParseMode;
use super::user::User;
use super::{identity_eq, telegram_object, Extra};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    pub from: User,
    pub query: String,
    pub offset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChosenInlineResult {
    pub result_id: String,
    pub from: User,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_message_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

identity_eq!(InlineQuery => |q| q.id.clone());
identity_eq!(ChosenInlineResult => |r| r.result_id.clone());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputTextMessageContent {
    pub message_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_web_page_preview: Option<bool>,
}

impl InputTextMessageContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            message_text: text.into(),
            parse_mode: None,
            disable_web_page_preview: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineQueryResultArticle {
    pub id: String,
    pub title: String,
    pub input_message_content: InputTextMessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// An episode offered as an audio result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineQueryResultAudio {
    pub id: String,
    pub audio_url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

/// A result of an inline query, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InlineQueryResult {
    Article(InlineQueryResultArticle),
    Audio(InlineQueryResultAudio),
}

impl InlineQueryResult {
    pub fn article(
        id: impl Into<String>,
        title: impl Into<String>,
        content: InputTextMessageContent,
    ) -> Self {
        InlineQueryResult::Article(InlineQueryResultArticle {
            id: id.into(),
            title: title.into(),
            input_message_content: content,
            reply_markup: None,
            url: None,
            description: None,
            thumbnail_url: None,
        })
    }

    pub fn id(&self) -> &str {
        match self {
            InlineQueryResult::Article(result) => &result.id,
            InlineQueryResult::Audio(result) => &result.id,
        }
    }

    pub(crate) fn reply_markup_mut(&mut self) -> Option<&mut InlineKeyboardMarkup> {
        match self {
            InlineQueryResult::Article(result) => result.reply_markup.as_mut(),
            InlineQueryResult::Audio(result) => result.reply_markup.as_mut(),
        }
    }
}

telegram_object!(
    InlineQuery,
    ChosenInlineResult,
    InputTextMessageContent,
    InlineQueryResult,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TelegramObject;
    use serde_json::json;

    #[test]
    fn test_result_is_tagged_by_type() {
        let result = InlineQueryResult::article("1", "Episode 1", InputTextMessageContent::new("Listen"));
        assert_eq!(
            result.to_dict(),
            json!({
                "type": "article",
                "id": "1",
                "title": "Episode 1",
                "input_message_content": {"message_text": "Listen"}
            })
        );
        assert_eq!(result.id(), "1");
    }

    #[test]
    fn test_inline_query_identity() {
        let payload = json!({
            "id": "q1", "from": {"id": 1, "is_bot": false, "first_name": "A"},
            "query": "rust", "offset": ""
        });
        let a = InlineQuery::de_json(payload.clone()).unwrap();
        let mut b = InlineQuery::de_json(payload).unwrap();
        b.query = "go".into();
        assert_eq!(a, b);
    }
}
