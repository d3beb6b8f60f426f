//! Application settings
//!
//! Settings are read from an optional `config.toml` and from environment
//! variables prefixed with `CASTPOD`, nested keys separated by `__`
//! (e.g. `CASTPOD__BOT__TOKEN`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ext::{PollingConfig, WebhookConfig};
use crate::utils::errors::Result;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub bot: BotConfig,
    pub application: ApplicationConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
    pub castpod: CastpodConfig,
}

/// Telegram bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BotConfig {
    pub token: String,
    pub base_url: Option<String>,
    /// Default parse mode of outgoing messages (`HTML`, `MarkdownV2`, ...)
    pub parse_mode: Option<String>,
    /// Offset of naive datetimes in hours
    pub tz_offset_hours: i32,
    pub arbitrary_callback_data: bool,
    pub callback_data_maxsize: u64,
    /// Runs a webhook instead of long polling when set
    pub webhook: Option<WebhookSettings>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            base_url: None,
            parse_mode: Some("HTML".to_string()),
            tz_offset_hours: 0,
            arbitrary_callback_data: true,
            callback_data_maxsize: 1024,
            webhook: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub listen: String,
    pub port: u16,
    pub url_path: String,
    pub url: Option<String>,
    pub secret_token: Option<String>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub max_connections: i64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0".to_string(),
            port: 8443,
            url_path: "webhook".to_string(),
            url: None,
            secret_token: None,
            cert: None,
            key: None,
            max_connections: 40,
        }
    }
}

/// Update processing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub concurrent_updates: usize,
    pub poll_interval_ms: u64,
    pub poll_timeout_seconds: u64,
    pub drop_pending_updates: bool,
    pub allowed_updates: Option<Vec<String>>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            concurrent_updates: 1,
            poll_interval_ms: 0,
            poll_timeout_seconds: 10,
            drop_pending_updates: false,
            allowed_updates: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    None,
    #[default]
    Memory,
    Redis,
    Postgres,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackend,
    pub store_bot_data: bool,
    pub store_chat_data: bool,
    pub store_user_data: bool,
    pub store_callback_data: bool,
    pub update_interval_seconds: u64,
    /// JSON file of the memory backend
    pub file_path: Option<PathBuf>,
    pub redis_url: String,
    pub redis_prefix: String,
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::Memory,
            store_bot_data: true,
            store_chat_data: true,
            store_user_data: true,
            store_callback_data: true,
            update_interval_seconds: 60,
            file_path: None,
            redis_url: "redis://localhost:6379".to_string(),
            redis_prefix: "castpod:".to_string(),
            database_url: "postgresql://localhost/castpod".to_string(),
            max_connections: 5,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory of the daily rolling log file, stdout only when unset
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "castpod.log".to_string(),
            json: false,
        }
    }
}

/// Settings of the podcast bot itself
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CastpodConfig {
    /// Chat receiving error reports
    pub developer_chat_id: Option<i64>,
    /// Updates a single user may send per minute
    pub rate_limit_per_minute: u32,
    pub max_subscriptions: usize,
}

impl Default for CastpodConfig {
    fn default() -> Self {
        Self {
            developer_chat_id: None,
            rate_limit_per_minute: 30,
            max_subscriptions: 50,
        }
    }
}

impl Settings {
    /// Load settings from the configuration file and environment variables
    pub fn new() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("CASTPOD")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("application.allowed_updates")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        super::validation::validate_settings(self)
    }

    pub fn polling_config(&self) -> PollingConfig {
        PollingConfig {
            poll_interval: Duration::from_millis(self.application.poll_interval_ms),
            timeout: self.application.poll_timeout_seconds,
            drop_pending_updates: self.application.drop_pending_updates,
            allowed_updates: self.application.allowed_updates.clone(),
            ..PollingConfig::default()
        }
    }

    /// Webhook settings, `None` for long polling
    pub fn webhook_config(&self) -> Option<WebhookConfig> {
        let webhook = self.bot.webhook.as_ref()?;
        Some(WebhookConfig {
            listen: webhook.listen.clone(),
            port: webhook.port,
            url_path: webhook.url_path.clone(),
            webhook_url: webhook.url.clone(),
            cert: webhook.cert.clone(),
            key: webhook.key.clone(),
            secret_token: webhook.secret_token.clone(),
            drop_pending_updates: self.application.drop_pending_updates,
            allowed_updates: self.application.allowed_updates.clone(),
            max_connections: webhook.max_connections,
            ip_address: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("CASTPOD__BOT__TOKEN", "123:abc");
        std::env::set_var("CASTPOD__PERSISTENCE__BACKEND", "redis");
        std::env::set_var("CASTPOD__CASTPOD__DEVELOPER_CHAT_ID", "-100");
        let settings = Settings::new().unwrap();
        std::env::remove_var("CASTPOD__BOT__TOKEN");
        std::env::remove_var("CASTPOD__PERSISTENCE__BACKEND");
        std::env::remove_var("CASTPOD__CASTPOD__DEVELOPER_CHAT_ID");

        assert_eq!(settings.bot.token, "123:abc");
        assert_eq!(settings.persistence.backend, PersistenceBackend::Redis);
        assert_eq!(settings.castpod.developer_chat_id, Some(-100));
        assert!(settings.webhook_config().is_none());
    }

    #[test]
    fn test_webhook_config() {
        let mut settings = Settings::default();
        settings.bot.webhook = Some(WebhookSettings {
            url: Some("https://castpod.example/hook".to_string()),
            ..WebhookSettings::default()
        });
        let config = settings.webhook_config().unwrap();
        assert_eq!(config.port, 8443);
        assert_eq!(config.webhook_url.as_deref(), Some("https://castpod.example/hook"));
    }
}
