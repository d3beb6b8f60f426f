//! PostgreSQL persistence backend
//!
//! Everything goes into the single `castpod_persistence` table created by
//! the bundled migrations, one row per `(kind, key)` with a JSONB document.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::ext::callback_data_cache::CallbackDataSnapshot;
use crate::ext::handlers::ConversationKey;
use crate::ext::DataMap;
use crate::utils::errors::{CastpodError, Result};

use super::{BasePersistence, PersistenceInput, DEFAULT_UPDATE_INTERVAL};

const USER_DATA: &str = "user_data";
const CHAT_DATA: &str = "chat_data";
const BOT_DATA: &str = "bot_data";
const CALLBACK_DATA: &str = "callback_data";

fn conversation_kind(name: &str) -> String {
    format!("conversation:{}", name)
}

#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
    store_data: PersistenceInput,
    update_interval: Duration,
}

impl PostgresPersistence {
    /// Connects and runs the migrations
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await?;

        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations completed successfully");

        Ok(Self::with_pool(pool))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self {
            pool,
            store_data: PersistenceInput::default(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    pub fn with_store_data(mut self, store_data: PersistenceInput) -> Self {
        self.store_data = store_data;
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    async fn rows(&self, kind: &str) -> Result<Vec<(String, Value)>> {
        let rows = sqlx::query_as::<_, (String, Value)>(
            "SELECT key, data FROM castpod_persistence WHERE kind = $1",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;
        debug!(kind = kind, rows = rows.len(), "Loaded persistence rows");
        Ok(rows)
    }

    async fn row(&self, kind: &str) -> Result<Option<Value>> {
        let row = sqlx::query_as::<_, (Value,)>(
            "SELECT data FROM castpod_persistence WHERE kind = $1 AND key = ''",
        )
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(data,)| data))
    }

    async fn upsert(&self, kind: &str, key: &str, data: Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO castpod_persistence (kind, key, data, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, key) DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(kind)
        .bind(key)
        .bind(data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, kind: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM castpod_persistence WHERE kind = $1 AND key = $2")
            .bind(kind)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn data_by_id(&self, kind: &str) -> Result<HashMap<i64, DataMap>> {
        let mut data = HashMap::new();
        for (key, value) in self.rows(kind).await? {
            let id: i64 = key.parse().map_err(|_| {
                CastpodError::InvalidInput(format!("Invalid id {} for {}", key, kind))
            })?;
            data.insert(id, serde_json::from_value(value)?);
        }
        Ok(data)
    }
}

#[async_trait]
impl BasePersistence for PostgresPersistence {
    fn store_data(&self) -> PersistenceInput {
        self.store_data
    }

    fn update_interval(&self) -> Duration {
        self.update_interval
    }

    async fn get_user_data(&self) -> Result<HashMap<i64, DataMap>> {
        self.data_by_id(USER_DATA).await
    }

    async fn get_chat_data(&self) -> Result<HashMap<i64, DataMap>> {
        self.data_by_id(CHAT_DATA).await
    }

    async fn get_bot_data(&self) -> Result<DataMap> {
        match self.row(BOT_DATA).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(DataMap::new()),
        }
    }

    async fn get_callback_data(&self) -> Result<Option<CallbackDataSnapshot>> {
        match self.row(CALLBACK_DATA).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn get_conversations(&self, name: &str) -> Result<HashMap<ConversationKey, i64>> {
        let mut states = HashMap::new();
        for (key, value) in self.rows(&conversation_kind(name)).await? {
            let state = value.as_i64().ok_or_else(|| {
                CastpodError::InvalidInput(format!("Invalid state {} of conversation {}", value, name))
            })?;
            states.insert(ConversationKey::from_storage_key(&key)?, state);
        }
        Ok(states)
    }

    async fn update_user_data(&self, user_id: i64, data: &DataMap) -> Result<()> {
        self.upsert(USER_DATA, &user_id.to_string(), Value::Object(data.clone()))
            .await
    }

    async fn update_chat_data(&self, chat_id: i64, data: &DataMap) -> Result<()> {
        self.upsert(CHAT_DATA, &chat_id.to_string(), Value::Object(data.clone()))
            .await
    }

    async fn update_bot_data(&self, data: &DataMap) -> Result<()> {
        self.upsert(BOT_DATA, "", Value::Object(data.clone())).await
    }

    async fn update_callback_data(&self, data: &CallbackDataSnapshot) -> Result<()> {
        self.upsert(CALLBACK_DATA, "", serde_json::to_value(data)?).await
    }

    async fn update_conversation(
        &self,
        name: &str,
        key: &ConversationKey,
        new_state: Option<i64>,
    ) -> Result<()> {
        let kind = conversation_kind(name);
        match new_state {
            Some(state) => self.upsert(&kind, &key.to_storage_key(), Value::from(state)).await,
            None => self.delete(&kind, &key.to_storage_key()).await,
        }
    }

    async fn drop_user_data(&self, user_id: i64) -> Result<()> {
        self.delete(USER_DATA, &user_id.to_string()).await
    }

    async fn drop_chat_data(&self, chat_id: i64) -> Result<()> {
        self.delete(CHAT_DATA, &chat_id.to_string()).await
    }

    async fn flush(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
