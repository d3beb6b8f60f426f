//! Persistence backends
//!
//! The [`Application`](super::Application) keeps chat, user and bot data in
//! memory and periodically writes what changed to a [`BasePersistence`]. On
//! startup the same backend restores that data, the callback data cache and
//! the states of persistent conversations.

pub mod memory;
pub mod postgres;
pub mod redis;

pub use self::memory::InMemoryPersistence;
pub use self::postgres::PostgresPersistence;
pub use self::redis::RedisPersistence;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{PersistenceBackend, PersistenceConfig};
use crate::ext::callback_data_cache::CallbackDataSnapshot;
use crate::ext::handlers::ConversationKey;
use crate::ext::DataMap;
use crate::utils::errors::Result;

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Which kinds of data a backend stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceInput {
    pub bot_data: bool,
    pub chat_data: bool,
    pub user_data: bool,
    pub callback_data: bool,
}

impl Default for PersistenceInput {
    fn default() -> Self {
        Self {
            bot_data: true,
            chat_data: true,
            user_data: true,
            callback_data: true,
        }
    }
}

#[async_trait]
pub trait BasePersistence: Send + Sync {
    fn store_data(&self) -> PersistenceInput {
        PersistenceInput::default()
    }

    /// Time between two flushes of the application
    fn update_interval(&self) -> Duration {
        DEFAULT_UPDATE_INTERVAL
    }

    async fn get_user_data(&self) -> Result<HashMap<i64, DataMap>>;

    async fn get_chat_data(&self) -> Result<HashMap<i64, DataMap>>;

    async fn get_bot_data(&self) -> Result<DataMap>;

    async fn get_callback_data(&self) -> Result<Option<CallbackDataSnapshot>>;

    async fn get_conversations(&self, name: &str) -> Result<HashMap<ConversationKey, i64>>;

    async fn update_user_data(&self, user_id: i64, data: &DataMap) -> Result<()>;

    async fn update_chat_data(&self, chat_id: i64, data: &DataMap) -> Result<()>;

    async fn update_bot_data(&self, data: &DataMap) -> Result<()>;

    async fn update_callback_data(&self, data: &CallbackDataSnapshot) -> Result<()>;

    /// `None` removes the conversation
    async fn update_conversation(
        &self,
        name: &str,
        key: &ConversationKey,
        new_state: Option<i64>,
    ) -> Result<()>;

    async fn drop_user_data(&self, user_id: i64) -> Result<()>;

    async fn drop_chat_data(&self, chat_id: i64) -> Result<()>;

    /// Called before a handler runs for `user_id`, to pull in outside changes
    async fn refresh_user_data(&self, _user_id: i64, _user_data: &mut DataMap) -> Result<()> {
        Ok(())
    }

    async fn refresh_chat_data(&self, _chat_id: i64, _chat_data: &mut DataMap) -> Result<()> {
        Ok(())
    }

    async fn refresh_bot_data(&self, _bot_data: &mut DataMap) -> Result<()> {
        Ok(())
    }

    /// Called once on application shutdown
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds the backend selected in the configuration
pub async fn from_config(config: &PersistenceConfig) -> Result<Option<Arc<dyn BasePersistence>>> {
    let store_data = PersistenceInput {
        bot_data: config.store_bot_data,
        chat_data: config.store_chat_data,
        user_data: config.store_user_data,
        callback_data: config.store_callback_data,
    };
    let interval = Duration::from_secs(config.update_interval_seconds);

    let persistence: Arc<dyn BasePersistence> = match config.backend {
        PersistenceBackend::None => return Ok(None),
        PersistenceBackend::Memory => {
            let memory = match &config.file_path {
                Some(path) => InMemoryPersistence::with_file(path).await?,
                None => InMemoryPersistence::new(),
            };
            Arc::new(
                memory
                    .with_store_data(store_data)
                    .with_update_interval(interval),
            )
        }
        PersistenceBackend::Redis => Arc::new(
            RedisPersistence::connect(&config.redis_url, &config.redis_prefix)
                .await?
                .with_store_data(store_data)
                .with_update_interval(interval),
        ),
        PersistenceBackend::Postgres => Arc::new(
            PostgresPersistence::connect(&config.database_url, config.max_connections)
                .await?
                .with_store_data(store_data)
                .with_update_interval(interval),
        ),
    };
    info!(backend = ?config.backend, "Persistence initialized");
    Ok(Some(persistence))
}
