//! Chat members, discriminated by their `status`

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::user::User;
use super::{telegram_object, Extra};

pub const OWNER: &str = "creator";
pub const ADMINISTRATOR: &str = "administrator";
pub const MEMBER: &str = "member";
pub const RESTRICTED: &str = "restricted";
pub const LEFT: &str = "left";
pub const BANNED: &str = "kicked";

/// Information about one member of a chat
///
/// The Bot API tags each variant with a `status` string. A status this crate
/// does not know is decoded into [`ChatMember::Unknown`] instead of failing.
#[derive(Debug, Clone)]
pub enum ChatMember {
    Owner(ChatMemberOwner),
    Administrator(ChatMemberAdministrator),
    Member(ChatMemberMember),
    Restricted(ChatMemberRestricted),
    Left(ChatMemberLeft),
    Banned(ChatMemberBanned),
    Unknown(ChatMemberUnknown),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMemberOwner {
    pub user: User,
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_title: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMemberAdministrator {
    pub user: User,
    pub can_be_edited: bool,
    pub is_anonymous: bool,
    pub can_manage_chat: bool,
    pub can_delete_messages: bool,
    pub can_manage_video_chats: bool,
    pub can_restrict_members: bool,
    pub can_promote_members: bool,
    pub can_change_info: bool,
    pub can_invite_users: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_post_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_edit_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_pin_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_manage_topics: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_title: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMemberMember {
    pub user: User,
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub until_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMemberRestricted {
    pub user: User,
    pub is_member: bool,
    pub can_send_messages: bool,
    pub can_send_audios: bool,
    pub can_send_documents: bool,
    pub can_send_photos: bool,
    pub can_send_videos: bool,
    pub can_send_video_notes: bool,
    pub can_send_voice_notes: bool,
    pub can_send_polls: bool,
    pub can_send_other_messages: bool,
    pub can_add_web_page_previews: bool,
    pub can_change_info: bool,
    pub can_invite_users: bool,
    pub can_pin_messages: bool,
    pub can_manage_topics: bool,
    /// Zero (the Unix epoch) means the restriction never expires
    #[serde(with = "chrono::serde::ts_seconds")]
    pub until_date: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMemberLeft {
    pub user: User,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMemberBanned {
    pub user: User,
    /// Zero (the Unix epoch) means the user is banned forever
    #[serde(with = "chrono::serde::ts_seconds")]
    pub until_date: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Base record for a status the crate does not model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMemberUnknown {
    #[serde(skip)]
    pub status: String,
    pub user: User,
    #[serde(flatten)]
    pub extra: Extra,
}

telegram_object!(ChatMember);

impl ChatMember {
    /// The `status` discriminator of this member
    pub fn status(&self) -> &str {
        match self {
            ChatMember::Owner(_) => OWNER,
            ChatMember::Administrator(_) => ADMINISTRATOR,
            ChatMember::Member(_) => MEMBER,
            ChatMember::Restricted(_) => RESTRICTED,
            ChatMember::Left(_) => LEFT,
            ChatMember::Banned(_) => BANNED,
            ChatMember::Unknown(m) => &m.status,
        }
    }

    pub fn user(&self) -> &User {
        match self {
            ChatMember::Owner(m) => &m.user,
            ChatMember::Administrator(m) => &m.user,
            ChatMember::Member(m) => &m.user,
            ChatMember::Restricted(m) => &m.user,
            ChatMember::Left(m) => &m.user,
            ChatMember::Banned(m) => &m.user,
            ChatMember::Unknown(m) => &m.user,
        }
    }

    /// Owners and administrators
    pub fn is_privileged(&self) -> bool {
        matches!(self, ChatMember::Owner(_) | ChatMember::Administrator(_))
    }

    /// Whether the user currently belongs to the chat
    pub fn is_present(&self) -> bool {
        match self {
            ChatMember::Owner(_) | ChatMember::Administrator(_) | ChatMember::Member(_) => true,
            ChatMember::Restricted(m) => m.is_member,
            ChatMember::Left(_) | ChatMember::Banned(_) | ChatMember::Unknown(_) => false,
        }
    }
}

impl PartialEq for ChatMember {
    fn eq(&self, other: &Self) -> bool {
        self.user().id == other.user().id && self.status() == other.status()
    }
}

impl Eq for ChatMember {}

impl Serialize for ChatMember {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = match self {
            ChatMember::Owner(m) => serde_json::to_value(m),
            ChatMember::Administrator(m) => serde_json::to_value(m),
            ChatMember::Member(m) => serde_json::to_value(m),
            ChatMember::Restricted(m) => serde_json::to_value(m),
            ChatMember::Left(m) => serde_json::to_value(m),
            ChatMember::Banned(m) => serde_json::to_value(m),
            ChatMember::Unknown(m) => serde_json::to_value(m),
        }
        .map_err(S::Error::custom)?;

        let mut map = match value {
            Value::Object(map) => map,
            _ => return Err(S::Error::custom("chat member did not serialize to an object")),
        };
        map.insert("status".to_string(), Value::String(self.status().to_string()));
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChatMember {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = Map::<String, Value>::deserialize(deserializer)?;
        let status = match map.remove("status") {
            Some(Value::String(status)) => status,
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "chat member status must be a string, got {}",
                    other
                )))
            }
            None => return Err(D::Error::missing_field("status")),
        };
        let value = Value::Object(map);

        let member = match status.as_str() {
            OWNER => ChatMember::Owner(serde_json::from_value(value).map_err(D::Error::custom)?),
            ADMINISTRATOR => {
                ChatMember::Administrator(serde_json::from_value(value).map_err(D::Error::custom)?)
            }
            MEMBER => ChatMember::Member(serde_json::from_value(value).map_err(D::Error::custom)?),
            RESTRICTED => {
                ChatMember::Restricted(serde_json::from_value(value).map_err(D::Error::custom)?)
            }
            LEFT => ChatMember::Left(serde_json::from_value(value).map_err(D::Error::custom)?),
            BANNED => ChatMember::Banned(serde_json::from_value(value).map_err(D::Error::custom)?),
            _ => {
                let mut unknown: ChatMemberUnknown =
                    serde_json::from_value(value).map_err(D::Error::custom)?;
                unknown.status = status;
                ChatMember::Unknown(unknown)
            }
        };
        Ok(member)
    }
}
