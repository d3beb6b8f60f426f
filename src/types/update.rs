use serde::{Deserialize, Serialize};

use super::callback_query::CallbackQuery;
use super::chat::Chat;
use super::inline::{ChosenInlineResult, InlineQuery};
use super::media::{Poll, PollAnswer};
use super::message::Message;
use super::misc::{ChatJoinRequest, ChatMemberUpdated};
use super::payments::{PreCheckoutQuery, ShippingQuery};
use super::user::User;
use super::{identity_eq, telegram_object, Extra};

/// An incoming update. At most one of the optional fields is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_post: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_channel_post: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_query: Option<InlineQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_inline_result: Option<ChosenInlineResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_query: Option<ShippingQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_checkout_query: Option<PreCheckoutQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<Poll>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_answer: Option<PollAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_chat_member: Option<ChatMemberUpdated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_member: Option<ChatMemberUpdated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_join_request: Option<ChatJoinRequest>,
    #[serde(flatten)]
    pub extra: Extra,
}

telegram_object!(Update);
identity_eq!(Update => |u| u.update_id);

impl Update {
    /// Every update type, as accepted by `allowed_updates`
    pub const ALL_TYPES: [&'static str; 14] = [
        "message",
        "edited_message",
        "channel_post",
        "edited_channel_post",
        "inline_query",
        "chosen_inline_result",
        "callback_query",
        "shipping_query",
        "pre_checkout_query",
        "poll",
        "poll_answer",
        "my_chat_member",
        "chat_member",
        "chat_join_request",
    ];

    /// An update with no payload, mostly useful in tests
    pub fn new(update_id: i64) -> Self {
        Self {
            update_id,
            message: None,
            edited_message: None,
            channel_post: None,
            edited_channel_post: None,
            inline_query: None,
            chosen_inline_result: None,
            callback_query: None,
            shipping_query: None,
            pre_checkout_query: None,
            poll: None,
            poll_answer: None,
            my_chat_member: None,
            chat_member: None,
            chat_join_request: None,
            extra: Extra::new(),
        }
    }

    pub fn with_message(update_id: i64, message: Message) -> Self {
        Self {
            message: Some(message),
            ..Self::new(update_id)
        }
    }

    /// The user that sent the update, whatever its type
    pub fn effective_user(&self) -> Option<&User> {
        if let Some(message) = self.message.as_ref().or(self.edited_message.as_ref()) {
            return message.from.as_ref();
        }
        if let Some(query) = &self.inline_query {
            return Some(&query.from);
        }
        if let Some(result) = &self.chosen_inline_result {
            return Some(&result.from);
        }
        if let Some(query) = &self.callback_query {
            return Some(&query.from);
        }
        if let Some(query) = &self.shipping_query {
            return Some(&query.from);
        }
        if let Some(query) = &self.pre_checkout_query {
            return Some(&query.from);
        }
        if let Some(answer) = &self.poll_answer {
            return answer.user.as_ref();
        }
        if let Some(member) = self.my_chat_member.as_ref().or(self.chat_member.as_ref()) {
            return Some(&member.from);
        }
        self.chat_join_request.as_ref().map(|request| &request.from)
    }

    /// The chat the update belongs to, if any
    pub fn effective_chat(&self) -> Option<&Chat> {
        if let Some(message) = self.effective_message() {
            return Some(&message.chat);
        }
        if let Some(member) = self.my_chat_member.as_ref().or(self.chat_member.as_ref()) {
            return Some(&member.chat);
        }
        self.chat_join_request.as_ref().map(|request| &request.chat)
    }

    /// The message carried by the update, including a callback query's message
    pub fn effective_message(&self) -> Option<&Message> {
        self.message
            .as_ref()
            .or(self.edited_message.as_ref())
            .or(self.channel_post.as_ref())
            .or(self.edited_channel_post.as_ref())
            .or_else(|| {
                self.callback_query
                    .as_ref()
                    .and_then(|query| query.message.as_deref())
            })
    }
}
