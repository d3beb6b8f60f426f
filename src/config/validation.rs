//! Configuration validation
//!
//! Checks settings that deserialize fine but can not work at runtime.

use super::settings::{
    ApplicationConfig, BotConfig, LoggingConfig, PersistenceBackend, PersistenceConfig,
};
use super::Settings;
use crate::types::ParseMode;
use crate::utils::errors::{CastpodError, Result};

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_bot_config(&settings.bot)?;
    validate_application_config(&settings.application)?;
    validate_persistence_config(&settings.persistence)?;
    validate_logging_config(&settings.logging)?;

    if settings.castpod.rate_limit_per_minute == 0 {
        return Err(CastpodError::Config(
            "Rate limit must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_bot_config(config: &BotConfig) -> Result<()> {
    if config.token.is_empty() {
        return Err(CastpodError::Config("Bot token is required".to_string()));
    }

    if !config.token.contains(':') {
        return Err(CastpodError::Config(
            "Bot token must look like <id>:<secret>".to_string(),
        ));
    }

    if let Some(parse_mode) = &config.parse_mode {
        parse_mode.parse::<ParseMode>().map_err(|_| {
            CastpodError::Config(format!("Invalid parse mode: {}", parse_mode))
        })?;
    }

    if !(-12..=14).contains(&config.tz_offset_hours) {
        return Err(CastpodError::Config(format!(
            "Invalid timezone offset: {}",
            config.tz_offset_hours
        )));
    }

    if config.arbitrary_callback_data && config.callback_data_maxsize == 0 {
        return Err(CastpodError::Config(
            "Callback data cache size must be greater than 0".to_string(),
        ));
    }

    if let Some(webhook) = &config.webhook {
        if webhook.cert.is_some() != webhook.key.is_some() {
            return Err(CastpodError::Config(
                "Webhook cert and key must be set together".to_string(),
            ));
        }
        if !(1..=100).contains(&webhook.max_connections) {
            return Err(CastpodError::Config(
                "Webhook max connections must be between 1 and 100".to_string(),
            ));
        }
        if let Some(secret) = &webhook.secret_token {
            let valid = (1..=256).contains(&secret.len())
                && secret
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(CastpodError::Config(
                    "Webhook secret token must be 1-256 characters of A-Z, a-z, 0-9, _ and -"
                        .to_string(),
                ));
            }
        }
        if let Some(url) = &webhook.url {
            url::Url::parse(url)?;
        }
    }

    Ok(())
}

fn validate_application_config(config: &ApplicationConfig) -> Result<()> {
    if config.concurrent_updates == 0 {
        return Err(CastpodError::Config(
            "Concurrent updates must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_persistence_config(config: &PersistenceConfig) -> Result<()> {
    if config.update_interval_seconds == 0 {
        return Err(CastpodError::Config(
            "Persistence update interval must be greater than 0".to_string(),
        ));
    }

    match config.backend {
        PersistenceBackend::Redis if config.redis_url.is_empty() => Err(CastpodError::Config(
            "Redis URL is required".to_string(),
        )),
        PersistenceBackend::Postgres if config.database_url.is_empty() => Err(
            CastpodError::Config("Database URL is required".to_string()),
        ),
        PersistenceBackend::Postgres if config.max_connections == 0 => Err(CastpodError::Config(
            "Max connections must be greater than 0".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_logging_config(config: &LoggingConfig) -> Result<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(CastpodError::Config(format!(
            "Invalid log level: {}. Valid levels: {:?}",
            config.level, valid_levels
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookSettings;
    use assert_matches::assert_matches;

    fn valid() -> Settings {
        let mut settings = Settings::default();
        settings.bot.token = "123:abc".to_string();
        settings
    }

    #[test]
    fn test_valid_settings() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_token() {
        let mut settings = valid();
        settings.bot.token.clear();
        assert_matches!(settings.validate(), Err(CastpodError::Config(_)));
    }

    #[test]
    fn test_webhook_cert_without_key() {
        let mut settings = valid();
        settings.bot.webhook = Some(WebhookSettings {
            cert: Some("cert.pem".into()),
            ..WebhookSettings::default()
        });
        assert_matches!(settings.validate(), Err(CastpodError::Config(_)));
    }

    #[test]
    fn test_unknown_parse_mode() {
        let mut settings = valid();
        settings.bot.parse_mode = Some("BBCode".to_string());
        assert_matches!(settings.validate(), Err(CastpodError::Config(_)));
    }
}
