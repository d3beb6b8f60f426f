//! Cache for arbitrary callback data
//!
//! Inline buttons can only carry up to 64 bytes of callback data. Buttons
//! built with [`CallbackPayload::Arbitrary`] are rewritten to carry a token
//! made of a keyboard id and a button id; the original payload stays in a
//! bounded LRU cache and is put back in place when the callback query comes in.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::types::{CallbackPayload, CallbackQuery, InlineKeyboardMarkup, Message, Update};
use crate::utils::errors::{CastpodError, Result};

pub const DEFAULT_MAXSIZE: u64 = 1024;

const ID_LEN: usize = 32;

/// Payloads of one keyboard, keyed by button id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyboardData {
    pub keyboard_uuid: String,
    /// Unix timestamp of the last access
    pub access_time: f64,
    pub button_data: HashMap<String, Value>,
}

impl KeyboardData {
    fn new(keyboard_uuid: String) -> Self {
        Self {
            keyboard_uuid,
            access_time: now_ts(),
            button_data: HashMap::new(),
        }
    }

    fn touch(&mut self) {
        self.access_time = now_ts();
    }
}

fn now_ts() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Serializable state of the cache, as handed to persistence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackDataSnapshot {
    pub keyboards: Vec<KeyboardData>,
    pub callback_queries: HashMap<String, String>,
}

pub struct CallbackDataCache {
    maxsize: u64,
    keyboard_data: Cache<String, KeyboardData>,
    callback_queries: Cache<String, String>,
}

impl std::fmt::Debug for CallbackDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackDataCache")
            .field("maxsize", &self.maxsize)
            .field("keyboards", &self.keyboard_data.entry_count())
            .finish()
    }
}

fn lru_cache<V: Clone + Send + Sync + 'static>(capacity: u64) -> Cache<String, V> {
    Cache::builder()
        .max_capacity(capacity)
        .eviction_policy(EvictionPolicy::lru())
        .build()
}

impl CallbackDataCache {
    pub fn new(maxsize: u64) -> Self {
        Self {
            maxsize,
            keyboard_data: lru_cache(maxsize),
            callback_queries: lru_cache(maxsize),
        }
    }

    /// Restores a cache from a persisted snapshot
    pub fn with_snapshot(maxsize: u64, snapshot: CallbackDataSnapshot) -> Self {
        let cache = Self::new(maxsize);
        cache.load_persistence_data(snapshot);
        cache
    }

    pub fn maxsize(&self) -> u64 {
        self.maxsize
    }

    /// Number of cached keyboards
    pub fn len(&self) -> u64 {
        self.keyboard_data.run_pending_tasks();
        self.keyboard_data.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces arbitrary payloads of `markup` with tokens and stores them
    pub fn process_keyboard(&self, markup: &InlineKeyboardMarkup) -> InlineKeyboardMarkup {
        if !markup.has_arbitrary_data() {
            return markup.clone();
        }

        let keyboard_uuid = Uuid::new_v4().simple().to_string();
        let mut keyboard = KeyboardData::new(keyboard_uuid.clone());
        let mut processed = markup.clone();

        for button in processed.buttons_mut() {
            let value = match &button.callback_data {
                Some(CallbackPayload::Arbitrary(value)) => value.clone(),
                _ => continue,
            };
            let button_uuid = Uuid::new_v4().simple().to_string();
            button.callback_data = Some(CallbackPayload::Text(format!(
                "{}{}",
                keyboard_uuid, button_uuid
            )));
            keyboard.button_data.insert(button_uuid, value);
        }

        debug!(keyboard = %keyboard_uuid, buttons = keyboard.button_data.len(), "Caching keyboard callback data");
        self.keyboard_data.insert(keyboard_uuid, keyboard);
        processed
    }

    fn split_token(token: &str) -> Option<(&str, &str)> {
        if token.len() != 2 * ID_LEN || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(token.split_at(ID_LEN))
    }

    /// Looks a token up. `None` if the text is not a token at all.
    fn resolve(&self, token: &str, touch: bool) -> Option<(String, CallbackPayload)> {
        let (keyboard_uuid, button_uuid) = Self::split_token(token)?;
        let resolved = self.keyboard_data.get(keyboard_uuid).and_then(|mut keyboard| {
            let value = keyboard.button_data.get(button_uuid).cloned()?;
            if touch {
                keyboard.touch();
                self.keyboard_data
                    .insert(keyboard_uuid.to_string(), keyboard);
            }
            Some(CallbackPayload::Arbitrary(value))
        });
        Some((
            keyboard_uuid.to_string(),
            resolved.unwrap_or_else(|| CallbackPayload::Invalid(token.to_string())),
        ))
    }

    /// Puts original payloads back into the buttons of a message
    pub fn process_message(&self, message: &mut Message) {
        if let Some(markup) = &mut message.reply_markup {
            for button in markup.buttons_mut() {
                let token = match &button.callback_data {
                    Some(CallbackPayload::Text(token)) => token.clone(),
                    _ => continue,
                };
                if let Some((_, payload)) = self.resolve(&token, false) {
                    button.callback_data = Some(payload);
                }
            }
        }
        if let Some(reply) = &mut message.reply_to_message {
            self.process_message(reply);
        }
        if let Some(pinned) = &mut message.pinned_message {
            self.process_message(pinned);
        }
    }

    /// Resolves the payload of an incoming callback query
    pub fn process_callback_query(&self, query: &mut CallbackQuery) {
        if let Some(CallbackPayload::Text(token)) = &query.data {
            let token = token.clone();
            if let Some((keyboard_uuid, payload)) = self.resolve(&token, true) {
                if !payload.is_invalid() {
                    self.callback_queries.insert(query.id.clone(), keyboard_uuid);
                }
                query.data = Some(payload);
            }
        }
        if let Some(message) = &mut query.message {
            self.process_message(message);
        }
    }

    /// Resolves every callback payload an incoming update carries
    pub fn insert_callback_data(&self, update: &mut Update) {
        if let Some(query) = &mut update.callback_query {
            self.process_callback_query(query);
        }
        for message in [
            &mut update.message,
            &mut update.edited_message,
            &mut update.channel_post,
            &mut update.edited_channel_post,
        ]
        .into_iter()
        .flatten()
        {
            self.process_message(message);
        }
    }

    /// Drops the keyboard a callback query belongs to
    pub fn drop_data(&self, query: &CallbackQuery) -> Result<()> {
        let keyboard_uuid = self.callback_queries.remove(&query.id).ok_or_else(|| {
            CastpodError::InvalidInput(format!("CallbackQuery {} was not found", query.id))
        })?;
        self.keyboard_data.invalidate(&keyboard_uuid);
        Ok(())
    }

    /// Drops keyboards last accessed before `time_cutoff`, or all of them
    pub fn clear_callback_data(&self, time_cutoff: Option<DateTime<Utc>>) {
        match time_cutoff {
            None => self.keyboard_data.invalidate_all(),
            Some(cutoff) => {
                let cutoff = cutoff.timestamp_millis() as f64 / 1000.0;
                let stale: Vec<String> = self
                    .keyboard_data
                    .iter()
                    .filter(|(_, keyboard)| keyboard.access_time < cutoff)
                    .map(|(key, _)| key.as_ref().clone())
                    .collect();
                for key in stale {
                    self.keyboard_data.invalidate(&key);
                }
            }
        }
        self.keyboard_data.run_pending_tasks();
    }

    pub fn clear_callback_queries(&self) {
        self.callback_queries.invalidate_all();
        self.callback_queries.run_pending_tasks();
    }

    pub fn persistence_data(&self) -> CallbackDataSnapshot {
        self.keyboard_data.run_pending_tasks();
        let mut keyboards: Vec<KeyboardData> =
            self.keyboard_data.iter().map(|(_, keyboard)| keyboard).collect();
        keyboards.sort_by(|a, b| a.access_time.total_cmp(&b.access_time));
        CallbackDataSnapshot {
            keyboards,
            callback_queries: self
                .callback_queries
                .iter()
                .map(|(id, keyboard)| (id.as_ref().clone(), keyboard))
                .collect(),
        }
    }

    pub fn load_persistence_data(&self, snapshot: CallbackDataSnapshot) {
        // oldest first so recency order survives a restart
        let mut keyboards = snapshot.keyboards;
        keyboards.sort_by(|a, b| a.access_time.total_cmp(&b.access_time));
        for keyboard in keyboards {
            self.keyboard_data
                .insert(keyboard.keyboard_uuid.clone(), keyboard);
        }
        for (query_id, keyboard_uuid) in snapshot.callback_queries {
            self.callback_queries.insert(query_id, keyboard_uuid);
        }
        self.keyboard_data.run_pending_tasks();
    }

    /// Access time of a cached keyboard, mostly for diagnostics
    pub fn access_time(&self, keyboard_uuid: &str) -> Option<DateTime<Utc>> {
        self.keyboard_data.get(keyboard_uuid).and_then(|keyboard| {
            Utc.timestamp_millis_opt((keyboard.access_time * 1000.0) as i64)
                .single()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InlineKeyboardButton, User};
    use serde_json::json;

    fn markup(payload: Value) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::callback("Unsubscribe", payload),
            InlineKeyboardButton::callback("Plain", "page:2"),
        ]])
    }

    fn token_of(markup: &InlineKeyboardMarkup) -> String {
        markup.inline_keyboard[0][0]
            .callback_data
            .as_ref()
            .and_then(CallbackPayload::as_text)
            .unwrap()
            .to_string()
    }

    fn query_with(data: &str) -> CallbackQuery {
        let mut query = CallbackQuery::new("q1", User::new(1, "Ada", false), "ci");
        query.data = Some(CallbackPayload::Text(data.to_string()));
        query
    }

    #[test]
    fn test_token_round_trip() {
        let cache = CallbackDataCache::new(DEFAULT_MAXSIZE);
        let payload = json!({"action": "unsubscribe", "feed": "https://example.com/rss"});
        let processed = cache.process_keyboard(&markup(payload.clone()));

        let token = token_of(&processed);
        assert_eq!(token.len(), 64);
        assert_eq!(
            processed.inline_keyboard[0][1].callback_data,
            Some(CallbackPayload::Text("page:2".into()))
        );

        let mut query = query_with(&token);
        cache.process_callback_query(&mut query);
        assert_eq!(query.data, Some(CallbackPayload::Arbitrary(payload)));
    }

    #[test]
    fn test_unknown_token_is_invalid() {
        let cache = CallbackDataCache::new(DEFAULT_MAXSIZE);
        let token = "a".repeat(64);
        let mut query = query_with(&token);
        cache.process_callback_query(&mut query);
        assert_eq!(query.data, Some(CallbackPayload::Invalid(token)));

        let mut plain = query_with("page:2");
        cache.process_callback_query(&mut plain);
        assert_eq!(plain.data, Some(CallbackPayload::Text("page:2".into())));
    }

    #[test]
    fn test_drop_data_after_query() {
        let cache = CallbackDataCache::new(DEFAULT_MAXSIZE);
        let processed = cache.process_keyboard(&markup(json!(1)));
        let mut query = query_with(&token_of(&processed));
        cache.process_callback_query(&mut query);

        assert!(cache.drop_data(&query).is_ok());
        assert!(cache.is_empty());
        assert!(cache.drop_data(&query).is_err());
    }

    #[test]
    fn test_answered_queries_survive_a_snapshot() {
        let cache = CallbackDataCache::new(DEFAULT_MAXSIZE);
        let processed = cache.process_keyboard(&markup(json!(1)));
        let mut query = query_with(&token_of(&processed));
        cache.process_callback_query(&mut query);

        let snapshot = cache.persistence_data();
        assert_eq!(snapshot.callback_queries.len(), 1);
        assert_eq!(
            snapshot.callback_queries.get("q1"),
            Some(&snapshot.keyboards[0].keyboard_uuid)
        );

        let restored = CallbackDataCache::with_snapshot(DEFAULT_MAXSIZE, snapshot);
        assert!(restored.drop_data(&query).is_ok());
        assert!(restored.is_empty());
    }

    #[test]
    fn test_size_is_bounded() {
        let cache = CallbackDataCache::new(4);
        for i in 0..20 {
            cache.process_keyboard(&markup(json!(i)));
        }
        assert!(cache.len() <= 4);
    }

    #[test]
    fn test_snapshot_restores_tokens() {
        let cache = CallbackDataCache::new(DEFAULT_MAXSIZE);
        let processed = cache.process_keyboard(&markup(json!({"n": 1})));
        let snapshot = cache.persistence_data();
        assert_eq!(snapshot.keyboards.len(), 1);

        let restored = CallbackDataCache::with_snapshot(DEFAULT_MAXSIZE, snapshot);
        let mut query = query_with(&token_of(&processed));
        restored.process_callback_query(&mut query);
        assert_eq!(query.data, Some(CallbackPayload::Arbitrary(json!({"n": 1}))));
    }

    #[test]
    fn test_clear_with_cutoff() {
        let cache = CallbackDataCache::new(DEFAULT_MAXSIZE);
        cache.process_keyboard(&markup(json!(1)));
        cache.clear_callback_data(Some(Utc::now() - chrono::Duration::hours(1)));
        assert_eq!(cache.len(), 1);
        cache.clear_callback_data(Some(Utc::now() + chrono::Duration::seconds(1)));
        assert!(cache.is_empty());
    }
}
