//! Telegram users and bots

use serde::{Deserialize, Serialize};

use super::{identity_eq, telegram_object, Extra};

/// A Telegram user or bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_premium: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_to_attachment_menu: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_join_groups: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_read_all_group_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_inline_queries: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

telegram_object!(User);
identity_eq!(User => |u| u.id);

impl User {
    /// Creates a user with only the required fields set
    pub fn new(id: i64, first_name: impl Into<String>, is_bot: bool) -> Self {
        Self {
            id,
            is_bot,
            first_name: first_name.into(),
            last_name: None,
            username: None,
            language_code: None,
            is_premium: None,
            added_to_attachment_menu: None,
            can_join_groups: None,
            can_read_all_group_messages: None,
            supports_inline_queries: None,
            extra: Extra::new(),
        }
    }

    /// First name followed by the last name, if any
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    /// `@username` when available, the full name otherwise
    pub fn name(&self) -> String {
        match &self.username {
            Some(username) => format!("@{}", username),
            None => self.full_name(),
        }
    }

    /// `https://t.me/<username>` link for users with a public username
    pub fn link(&self) -> Option<String> {
        self.username
            .as_ref()
            .map(|username| format!("https://t.me/{}", username))
    }

    /// HTML inline mention of the user
    pub fn mention_html(&self, name: Option<&str>) -> String {
        let name = name.map(str::to_string).unwrap_or_else(|| self.full_name());
        format!(
            "<a href=\"tg://user?id={}\">{}</a>",
            self.id,
            crate::utils::helpers::escape_html(&name)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TelegramObject;
    use serde_json::json;

    #[test]
    fn test_round_trip_keeps_unknown_fields() {
        let payload = json!({
            "id": 7,
            "is_bot": false,
            "first_name": "Ada",
            "last_name": "Lovelace",
            "username": "ada",
            "has_main_web_app": true
        });
        let user = User::de_json(payload.clone()).unwrap();
        assert_eq!(user.extra.get("has_main_web_app"), Some(&json!(true)));
        assert_eq!(user.to_dict(), payload);
    }

    #[test]
    fn test_names() {
        let mut user = User::new(1, "Ada", false);
        assert_eq!(user.name(), "Ada");
        user.last_name = Some("Lovelace".into());
        assert_eq!(user.full_name(), "Ada Lovelace");
        user.username = Some("ada".into());
        assert_eq!(user.name(), "@ada");
        assert_eq!(user.link().as_deref(), Some("https://t.me/ada"));
        assert_eq!(
            user.mention_html(Some("<Ada>")),
            "<a href=\"tg://user?id=1\">&lt;Ada&gt;</a>"
        );
    }

    #[test]
    fn test_identity_equality() {
        let a = User::new(1, "Ada", false);
        let mut b = User::new(1, "Someone else", false);
        b.username = Some("other".into());
        assert_eq!(a, b);
        assert_ne!(a, User::new(2, "Ada", false));
    }
}
