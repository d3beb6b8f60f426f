//! In-memory persistence with JSON snapshots
//!
//! Keeps everything in process memory. The whole store can be exported to
//! and seeded from a JSON document, and optionally mirrored to a file on
//! every flush so a restarted process picks up where it left off.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::ext::callback_data_cache::CallbackDataSnapshot;
use crate::ext::handlers::ConversationKey;
use crate::ext::DataMap;
use crate::utils::errors::{CastpodError, Result};

use super::{BasePersistence, PersistenceInput, DEFAULT_UPDATE_INTERVAL};

#[derive(Debug, Default)]
struct Store {
    user_data: HashMap<i64, DataMap>,
    chat_data: HashMap<i64, DataMap>,
    bot_data: DataMap,
    callback_data: Option<CallbackDataSnapshot>,
    conversations: HashMap<String, HashMap<ConversationKey, i64>>,
}

/// JSON layout of a snapshot. Ids and conversation keys become strings.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    user_data: HashMap<String, DataMap>,
    #[serde(default)]
    chat_data: HashMap<String, DataMap>,
    #[serde(default)]
    bot_data: DataMap,
    #[serde(default)]
    callback_data: Option<CallbackDataSnapshot>,
    #[serde(default)]
    conversations: HashMap<String, HashMap<String, i64>>,
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|e| CastpodError::InvalidInput(format!("Invalid id {} in snapshot: {}", raw, e)))
}

fn ids_from_snapshot(data: HashMap<String, DataMap>) -> Result<HashMap<i64, DataMap>> {
    data.into_iter()
        .map(|(id, value)| Ok((parse_id(&id)?, value)))
        .collect()
}

fn ids_to_snapshot(data: &HashMap<i64, DataMap>) -> HashMap<String, DataMap> {
    data.iter().map(|(id, value)| (id.to_string(), value.clone())).collect()
}

impl Store {
    fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let mut conversations = HashMap::new();
        for (name, states) in snapshot.conversations {
            let states = states
                .into_iter()
                .map(|(key, state)| Ok((ConversationKey::from_storage_key(&key)?, state)))
                .collect::<Result<HashMap<_, _>>>()?;
            conversations.insert(name, states);
        }
        Ok(Self {
            user_data: ids_from_snapshot(snapshot.user_data)?,
            chat_data: ids_from_snapshot(snapshot.chat_data)?,
            bot_data: snapshot.bot_data,
            callback_data: snapshot.callback_data,
            conversations,
        })
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            user_data: ids_to_snapshot(&self.user_data),
            chat_data: ids_to_snapshot(&self.chat_data),
            bot_data: self.bot_data.clone(),
            callback_data: self.callback_data.clone(),
            conversations: self
                .conversations
                .iter()
                .map(|(name, states)| {
                    let states = states
                        .iter()
                        .map(|(key, state)| (key.to_storage_key(), *state))
                        .collect();
                    (name.clone(), states)
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct InMemoryPersistence {
    store: RwLock<Store>,
    file: Option<PathBuf>,
    store_data: PersistenceInput,
    update_interval: Duration,
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store::default()),
            file: None,
            store_data: PersistenceInput::default(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    /// Seeds the store from a JSON snapshot as produced by [`Self::to_json`]
    pub fn from_json(value: Value) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_value(value)?;
        Ok(Self {
            store: RwLock::new(Store::from_snapshot(snapshot)?),
            ..Self::new()
        })
    }

    /// Loads `path` if it exists and writes the store back to it on flush
    pub async fn with_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut persistence = match tokio::fs::read(&path).await {
            Ok(raw) => Self::from_json(serde_json::from_slice(&raw)?)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "Using persistence file");
        persistence.file = Some(path);
        Ok(persistence)
    }

    pub fn with_store_data(mut self, store_data: PersistenceInput) -> Self {
        self.store_data = store_data;
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub async fn to_json(&self) -> Result<Value> {
        let store = self.store.read().await;
        Ok(serde_json::to_value(store.to_snapshot())?)
    }

    pub async fn chat_data(&self) -> HashMap<i64, DataMap> {
        self.store.read().await.chat_data.clone()
    }

    pub async fn user_data(&self) -> HashMap<i64, DataMap> {
        self.store.read().await.user_data.clone()
    }
}

#[async_trait]
impl BasePersistence for InMemoryPersistence {
    fn store_data(&self) -> PersistenceInput {
        self.store_data
    }

    fn update_interval(&self) -> Duration {
        self.update_interval
    }

    async fn get_user_data(&self) -> Result<HashMap<i64, DataMap>> {
        Ok(self.store.read().await.user_data.clone())
    }

    async fn get_chat_data(&self) -> Result<HashMap<i64, DataMap>> {
        Ok(self.store.read().await.chat_data.clone())
    }

    async fn get_bot_data(&self) -> Result<DataMap> {
        Ok(self.store.read().await.bot_data.clone())
    }

    async fn get_callback_data(&self) -> Result<Option<CallbackDataSnapshot>> {
        Ok(self.store.read().await.callback_data.clone())
    }

    async fn get_conversations(&self, name: &str) -> Result<HashMap<ConversationKey, i64>> {
        let store = self.store.read().await;
        Ok(store.conversations.get(name).cloned().unwrap_or_default())
    }

    async fn update_user_data(&self, user_id: i64, data: &DataMap) -> Result<()> {
        self.store.write().await.user_data.insert(user_id, data.clone());
        Ok(())
    }

    async fn update_chat_data(&self, chat_id: i64, data: &DataMap) -> Result<()> {
        self.store.write().await.chat_data.insert(chat_id, data.clone());
        Ok(())
    }

    async fn update_bot_data(&self, data: &DataMap) -> Result<()> {
        self.store.write().await.bot_data = data.clone();
        Ok(())
    }

    async fn update_callback_data(&self, data: &CallbackDataSnapshot) -> Result<()> {
        self.store.write().await.callback_data = Some(data.clone());
        Ok(())
    }

    async fn update_conversation(
        &self,
        name: &str,
        key: &ConversationKey,
        new_state: Option<i64>,
    ) -> Result<()> {
        let mut store = self.store.write().await;
        let states = store.conversations.entry(name.to_string()).or_default();
        match new_state {
            Some(state) => {
                states.insert(key.clone(), state);
            }
            None => {
                states.remove(key);
            }
        }
        Ok(())
    }

    async fn drop_user_data(&self, user_id: i64) -> Result<()> {
        self.store.write().await.user_data.remove(&user_id);
        Ok(())
    }

    async fn drop_chat_data(&self, chat_id: i64) -> Result<()> {
        self.store.write().await.chat_data.remove(&chat_id);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let raw = serde_json::to_vec_pretty(&self.to_json().await?)?;
        tokio::fs::write(path, raw).await?;
        debug!(path = %path.display(), "Persistence file written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> DataMap {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_seed_from_json() {
        let persistence = InMemoryPersistence::from_json(json!({
            "chat_data": {"42": {"feeds": ["https://a.b/rss"]}},
            "conversations": {"subscribe": {"42,7": 1}}
        }))
        .unwrap();

        let chats = persistence.get_chat_data().await.unwrap();
        assert_eq!(chats[&42], data(json!({"feeds": ["https://a.b/rss"]})));
        let states = persistence.get_conversations("subscribe").await.unwrap();
        assert_eq!(states[&ConversationKey(vec![42, 7])], 1);
        assert!(persistence.get_conversations("other").await.unwrap().is_empty());
        assert!(persistence.get_callback_data().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_ids_rejected() {
        assert!(InMemoryPersistence::from_json(json!({"user_data": {"abc": {}}})).is_err());
    }

    #[tokio::test]
    async fn test_conversation_end_removes_state() {
        let persistence = InMemoryPersistence::new();
        let key = ConversationKey(vec![1]);
        tokio_test::assert_ok!(persistence.update_conversation("c", &key, Some(2)).await);
        tokio_test::assert_ok!(persistence.update_conversation("c", &key, None).await);
        assert!(persistence.get_conversations("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("castpod.json");

        let persistence = InMemoryPersistence::with_file(&path).await.unwrap();
        persistence.update_user_data(7, &data(json!({"lang": "zh"}))).await.unwrap();
        persistence.flush().await.unwrap();

        let restored = InMemoryPersistence::with_file(&path).await.unwrap();
        assert_eq!(restored.user_data().await[&7], data(json!({"lang": "zh"})));
    }
}
