//! Chats and chat permissions

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::{identity_eq, telegram_object, Extra};

pub const PRIVATE: &str = "private";
pub const GROUP: &str = "group";
pub const SUPERGROUP: &str = "supergroup";
pub const CHANNEL: &str = "channel";

/// A private chat, group, supergroup or channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_forum: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_message: Option<Box<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<ChatPermissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slow_mode_delay: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_chat_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

telegram_object!(Chat);
identity_eq!(Chat => |c| c.id);

impl Chat {
    /// Creates a chat with only the required fields set
    pub fn new(id: i64, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            title: None,
            username: None,
            first_name: None,
            last_name: None,
            is_forum: None,
            bio: None,
            description: None,
            invite_link: None,
            pinned_message: None,
            permissions: None,
            slow_mode_delay: None,
            linked_chat_id: None,
            extra: Extra::new(),
        }
    }

    pub fn is_private(&self) -> bool {
        self.kind == PRIVATE
    }

    /// Groups and supergroups
    pub fn is_group(&self) -> bool {
        self.kind == GROUP || self.kind == SUPERGROUP
    }

    pub fn is_channel(&self) -> bool {
        self.kind == CHANNEL
    }

    /// Title for groups and channels, full name for private chats
    pub fn effective_name(&self) -> Option<String> {
        if let Some(title) = &self.title {
            return Some(title.clone());
        }
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.clone()),
            _ => None,
        }
    }
}

/// Actions a non-administrator user is allowed to take in a chat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatPermissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_audios: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_documents: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_photos: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_videos: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_voice_notes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_polls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_other_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_add_web_page_previews: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_change_info: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_invite_users: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_pin_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_manage_topics: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

telegram_object!(ChatPermissions);

impl ChatPermissions {
    /// Permissions with every flag set to `value`
    pub fn uniform(value: bool) -> Self {
        Self {
            can_send_messages: Some(value),
            can_send_audios: Some(value),
            can_send_documents: Some(value),
            can_send_photos: Some(value),
            can_send_videos: Some(value),
            can_send_voice_notes: Some(value),
            can_send_polls: Some(value),
            can_send_other_messages: Some(value),
            can_add_web_page_previews: Some(value),
            can_change_info: Some(value),
            can_invite_users: Some(value),
            can_pin_messages: Some(value),
            can_manage_topics: Some(value),
            extra: Extra::new(),
        }
    }
}
