//! Redis persistence backend
//!
//! Chat and user data live in one hash each (`<prefix>chat_data`,
//! `<prefix>user_data`) with the id as field and the JSON document as value.
//! Bot data and callback data are plain JSON strings, conversation states a
//! hash per conversation name (`<prefix>conversations:<name>`).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::ext::callback_data_cache::CallbackDataSnapshot;
use crate::ext::handlers::ConversationKey;
use crate::ext::DataMap;
use crate::utils::errors::{CastpodError, Result};

use super::{BasePersistence, PersistenceInput, DEFAULT_UPDATE_INTERVAL};

#[derive(Clone)]
pub struct RedisPersistence {
    connection: ConnectionManager,
    prefix: String,
    store_data: PersistenceInput,
    update_interval: Duration,
}

impl std::fmt::Debug for RedisPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPersistence")
            .field("prefix", &self.prefix)
            .field("store_data", &self.store_data)
            .finish()
    }
}

impl RedisPersistence {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self> {
        let client = Client::open(url).map_err(CastpodError::Redis)?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(CastpodError::Redis)?;
        info!(prefix = %prefix, "Connected to Redis persistence");
        Ok(Self {
            connection,
            prefix: prefix.to_string(),
            store_data: PersistenceInput::default(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
        })
    }

    pub fn with_store_data(mut self, store_data: PersistenceInput) -> Self {
        self.store_data = store_data;
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn conversations_key(&self, name: &str) -> String {
        format!("{}conversations:{}", self.prefix, name)
    }

    async fn load_hash(&self, name: &str) -> Result<HashMap<i64, DataMap>> {
        let key = self.key(name);
        let mut conn = self.connection.clone();
        let raw: HashMap<String, String> = conn.hgetall(&key).await?;
        let data = parse_hash(&key, raw)?;
        debug!(key = %key, entries = data.len(), "Loaded hash from Redis");
        Ok(data)
    }

    async fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(self.key(name)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store_field(&self, name: &str, id: i64, data: &DataMap) -> Result<()> {
        let mut conn = self.connection.clone();
        let value = serde_json::to_string(data)?;
        let _: () = conn.hset(self.key(name), id, value).await?;
        Ok(())
    }

    async fn delete_field(&self, name: &str, id: i64) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.hdel(self.key(name), id).await?;
        Ok(())
    }

    async fn store_json(&self, name: &str, value: String) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.set(self.key(name), value).await?;
        Ok(())
    }
}

/// Decodes a hash of `id -> JSON document`
fn parse_hash(key: &str, raw: HashMap<String, String>) -> Result<HashMap<i64, DataMap>> {
    let mut data = HashMap::with_capacity(raw.len());
    for (id, value) in raw {
        let id: i64 = id
            .parse()
            .map_err(|_| CastpodError::InvalidInput(format!("Invalid id {} in {}", id, key)))?;
        data.insert(id, serde_json::from_str(&value)?);
    }
    Ok(data)
}

#[async_trait]
impl BasePersistence for RedisPersistence {
    fn store_data(&self) -> PersistenceInput {
        self.store_data
    }

    fn update_interval(&self) -> Duration {
        self.update_interval
    }

    async fn get_user_data(&self) -> Result<HashMap<i64, DataMap>> {
        self.load_hash("user_data").await
    }

    async fn get_chat_data(&self) -> Result<HashMap<i64, DataMap>> {
        self.load_hash("chat_data").await
    }

    async fn get_bot_data(&self) -> Result<DataMap> {
        Ok(self.load_json("bot_data").await?.unwrap_or_default())
    }

    async fn get_callback_data(&self) -> Result<Option<CallbackDataSnapshot>> {
        self.load_json("callback_data").await
    }

    async fn get_conversations(&self, name: &str) -> Result<HashMap<ConversationKey, i64>> {
        let mut conn = self.connection.clone();
        let raw: HashMap<String, i64> = conn.hgetall(self.conversations_key(name)).await?;
        raw.into_iter()
            .map(|(key, state)| Ok((ConversationKey::from_storage_key(&key)?, state)))
            .collect()
    }

    async fn update_user_data(&self, user_id: i64, data: &DataMap) -> Result<()> {
        self.store_field("user_data", user_id, data).await
    }

    async fn update_chat_data(&self, chat_id: i64, data: &DataMap) -> Result<()> {
        self.store_field("chat_data", chat_id, data).await
    }

    async fn update_bot_data(&self, data: &DataMap) -> Result<()> {
        self.store_json("bot_data", serde_json::to_string(data)?).await
    }

    async fn update_callback_data(&self, data: &CallbackDataSnapshot) -> Result<()> {
        self.store_json("callback_data", serde_json::to_string(data)?).await
    }

    async fn update_conversation(
        &self,
        name: &str,
        key: &ConversationKey,
        new_state: Option<i64>,
    ) -> Result<()> {
        let mut conn = self.connection.clone();
        let hash = self.conversations_key(name);
        match new_state {
            Some(state) => {
                let _: () = conn.hset(hash, key.to_storage_key(), state).await?;
            }
            None => {
                let _: () = conn.hdel(hash, key.to_storage_key()).await?;
            }
        }
        Ok(())
    }

    async fn drop_user_data(&self, user_id: i64) -> Result<()> {
        self.delete_field("user_data", user_id).await
    }

    async fn drop_chat_data(&self, chat_id: i64) -> Result<()> {
        self.delete_field("chat_data", chat_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_hash() {
        let raw = HashMap::from([
            ("42".to_string(), r#"{"lang":"zh"}"#.to_string()),
            ("-1001".to_string(), "{}".to_string()),
        ]);
        let data = parse_hash("castpod:chat_data", raw).unwrap();
        assert_eq!(data[&42].get("lang"), Some(&serde_json::json!("zh")));
        assert!(data[&-1001].is_empty());
    }

    #[test]
    fn test_parse_hash_rejects_bad_entries() {
        let raw = HashMap::from([("abc".to_string(), "{}".to_string())]);
        assert_matches!(
            parse_hash("castpod:user_data", raw),
            Err(CastpodError::InvalidInput(_))
        );
        let raw = HashMap::from([("7".to_string(), "not json".to_string())]);
        assert_matches!(
            parse_hash("castpod:user_data", raw),
            Err(CastpodError::Serialization(_))
        );
    }
}
