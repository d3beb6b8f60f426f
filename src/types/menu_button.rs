//! Bot menu buttons, discriminated by their `type`

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::{telegram_object, Extra};

/// A Web App launched from a button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAppInfo {
    pub url: String,
}

/// The bot's menu button in a private chat
#[derive(Debug, Clone, PartialEq)]
pub enum MenuButton {
    /// Opens the bot's list of commands
    Commands { extra: Extra },
    /// Launches a Web App
    WebApp {
        text: String,
        web_app: WebAppInfo,
        extra: Extra,
    },
    /// No specific value was set
    Default { extra: Extra },
    /// A `type` this crate does not model
    Unknown { kind: String, extra: Extra },
}

telegram_object!(MenuButton);

impl MenuButton {
    pub fn commands() -> Self {
        MenuButton::Commands { extra: Extra::new() }
    }

    pub fn web_app(text: impl Into<String>, url: impl Into<String>) -> Self {
        MenuButton::WebApp {
            text: text.into(),
            web_app: WebAppInfo { url: url.into() },
            extra: Extra::new(),
        }
    }

    pub fn default_button() -> Self {
        MenuButton::Default { extra: Extra::new() }
    }

    /// The `type` discriminator of this button
    pub fn kind(&self) -> &str {
        match self {
            MenuButton::Commands { .. } => "commands",
            MenuButton::WebApp { .. } => "web_app",
            MenuButton::Default { .. } => "default",
            MenuButton::Unknown { kind, .. } => kind,
        }
    }

    fn extra(&self) -> &Extra {
        match self {
            MenuButton::Commands { extra }
            | MenuButton::WebApp { extra, .. }
            | MenuButton::Default { extra }
            | MenuButton::Unknown { extra, .. } => extra,
        }
    }
}

impl Serialize for MenuButton {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.kind())?;
        if let MenuButton::WebApp { text, web_app, .. } = self {
            map.serialize_entry("text", text)?;
            map.serialize_entry("web_app", web_app)?;
        }
        for (key, value) in self.extra() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MenuButton {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = Map::<String, Value>::deserialize(deserializer)?;
        let kind = match map.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(D::Error::missing_field("type")),
        };

        let button = match kind.as_str() {
            "commands" => MenuButton::Commands { extra: map },
            "default" => MenuButton::Default { extra: map },
            "web_app" => {
                let text = match map.remove("text") {
                    Some(Value::String(text)) => text,
                    _ => return Err(D::Error::missing_field("text")),
                };
                let web_app = map
                    .remove("web_app")
                    .ok_or_else(|| D::Error::missing_field("web_app"))
                    .and_then(|v| serde_json::from_value(v).map_err(D::Error::custom))?;
                MenuButton::WebApp {
                    text,
                    web_app,
                    extra: map,
                }
            }
            _ => MenuButton::Unknown { kind, extra: map },
        };
        Ok(button)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TelegramObject;
    use serde_json::json;

    #[test]
    fn test_variants_round_trip() {
        for payload in [
            json!({"type": "commands"}),
            json!({"type": "default"}),
            json!({"type": "web_app", "text": "Open", "web_app": {"url": "https://castpod.app"}}),
        ] {
            let button = MenuButton::de_json(payload.clone()).unwrap();
            assert_eq!(button.to_dict(), payload);
        }
    }

    #[test]
    fn test_unknown_type_is_kept() {
        let payload = json!({"type": "mini_app", "text": "Go"});
        let button = MenuButton::de_json(payload.clone()).unwrap();
        assert_eq!(button.kind(), "mini_app");
        assert!(matches!(button, MenuButton::Unknown { .. }));
        assert_eq!(button.to_dict(), payload);
    }

    #[test]
    fn test_web_app_requires_text() {
        assert!(MenuButton::de_json(json!({"type": "web_app"})).is_err());
        assert_eq!(MenuButton::web_app("Open", "https://x").kind(), "web_app");
    }
}
