//! Multi-step conversations
//!
//! A [`ConversationHandler`] keeps one state per conversation key (chat id,
//! user id or both). Entry points start a conversation, the handlers of the
//! current state continue it and fallbacks catch everything else. Callbacks
//! move the conversation with [`CallbackContext::set_next_state`] or end it
//! with [`CallbackContext::end_conversation`]; leaving the state unset keeps
//! the current one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bot::Bot;
use crate::ext::context::CallbackContext;
use crate::types::Update;
use crate::utils::errors::{CastpodError, Result};

use super::{Handler, MatchData};

/// State that ends a conversation
pub const END: i64 = -1;

/// Identifies one conversation, e.g. `[chat_id, user_id]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey(pub Vec<i64>);

impl ConversationKey {
    /// Comma separated form used as a storage key
    pub fn to_storage_key(&self) -> String {
        self.0
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn from_storage_key(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Ok(ConversationKey(Vec::new()));
        }
        raw.split(',')
            .map(|part| {
                part.trim().parse::<i64>().map_err(|e| {
                    CastpodError::InvalidInput(format!("Invalid conversation key {}: {}", raw, e))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(ConversationKey)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.to_storage_key())
    }
}

/// Current state per conversation key
pub type ConversationStore = Arc<Mutex<HashMap<ConversationKey, i64>>>;

/// The handler picked inside a conversation
#[derive(Clone)]
pub struct ConversationMatch {
    pub(crate) key: ConversationKey,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) inner: MatchData,
}

impl fmt::Debug for ConversationMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationMatch")
            .field("key", &self.key)
            .field("handler", &self.handler.name())
            .field("inner", &self.inner)
            .finish()
    }
}

pub struct ConversationHandler {
    entry_points: Vec<Arc<dyn Handler>>,
    states: HashMap<i64, Vec<Arc<dyn Handler>>>,
    fallbacks: Vec<Arc<dyn Handler>>,
    allow_reentry: bool,
    per_chat: bool,
    per_user: bool,
    name: Option<String>,
    persistent: bool,
    block: Option<bool>,
    conversations: ConversationStore,
}

impl ConversationHandler {
    /// Conversation keyed by chat and user
    pub fn new(entry_points: Vec<Arc<dyn Handler>>) -> Self {
        Self {
            entry_points,
            states: HashMap::new(),
            fallbacks: Vec::new(),
            allow_reentry: false,
            per_chat: true,
            per_user: true,
            name: None,
            persistent: false,
            block: None,
            conversations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn state(mut self, state: i64, handlers: Vec<Arc<dyn Handler>>) -> Self {
        self.states.insert(state, handlers);
        self
    }

    pub fn fallbacks(mut self, fallbacks: Vec<Arc<dyn Handler>>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Let entry points restart a running conversation
    pub fn allow_reentry(mut self, allow: bool) -> Self {
        self.allow_reentry = allow;
        self
    }

    pub fn keyed_by(mut self, per_chat: bool, per_user: bool) -> Result<Self> {
        if !per_chat && !per_user {
            return Err(CastpodError::InvalidInput(
                "A conversation must be keyed by chat, user or both".to_string(),
            ));
        }
        self.per_chat = per_chat;
        self.per_user = per_user;
        Ok(self)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Store states in the application's persistence under `name`
    pub fn persistent(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.persistent = true;
        self
    }

    pub fn block(mut self, block: bool) -> Self {
        self.block = Some(block);
        self
    }

    pub fn conversation_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn key_for(&self, update: &Update) -> Option<ConversationKey> {
        let mut key = Vec::with_capacity(2);
        if self.per_chat {
            key.push(update.effective_chat()?.id);
        }
        if self.per_user {
            key.push(update.effective_user()?.id);
        }
        Some(ConversationKey(key))
    }

    pub fn state_of(&self, key: &ConversationKey) -> Option<i64> {
        self.conversations
            .lock()
            .ok()
            .and_then(|conversations| conversations.get(key).copied())
    }

    fn first_match(
        handlers: &[Arc<dyn Handler>],
        update: &Update,
        bot: &Bot,
    ) -> Option<(Arc<dyn Handler>, MatchData)> {
        handlers.iter().find_map(|handler| {
            handler
                .check_update(update, bot)
                .map(|matched| (Arc::clone(handler), matched))
        })
    }

    fn update_state(&self, key: &ConversationKey, new_state: Option<i64>, ctx: &CallbackContext) {
        let Some(new_state) = new_state else {
            return;
        };
        let stored = if new_state == END {
            if let Ok(mut conversations) = self.conversations.lock() {
                conversations.remove(key);
            }
            None
        } else {
            if !self.states.contains_key(&new_state) {
                warn!(
                    conversation = ?self.name,
                    state = new_state,
                    "New state has no handlers, the conversation can only be left through fallbacks"
                );
            }
            if let Ok(mut conversations) = self.conversations.lock() {
                conversations.insert(key.clone(), new_state);
            }
            Some(new_state)
        };
        debug!(conversation = ?self.name, key = %key, state = ?stored, "Conversation state changed");

        if self.persistent {
            if let Some(name) = &self.name {
                ctx.application()
                    .mark_conversation_for_update_persistence(name, key.clone(), stored);
            }
        }
    }
}

#[async_trait]
impl Handler for ConversationHandler {
    fn check_update(&self, update: &Update, bot: &Bot) -> Option<MatchData> {
        if update.channel_post.is_some() || update.edited_channel_post.is_some() {
            return None;
        }
        let key = self.key_for(update)?;
        let state = self.state_of(&key);
        debug!(conversation = ?self.name, key = %key, state = ?state, "Selecting conversation");

        let mut found = None;
        if state.is_none() || self.allow_reentry {
            found = Self::first_match(&self.entry_points, update, bot);
            if found.is_none() && state.is_none() {
                return None;
            }
        }
        if found.is_none() {
            let handlers = state
                .and_then(|s| self.states.get(&s))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            found = Self::first_match(handlers, update, bot)
                .or_else(|| Self::first_match(&self.fallbacks, update, bot));
        }

        found.map(|(handler, inner)| {
            MatchData::Conversation(Box::new(ConversationMatch {
                key,
                handler,
                inner,
            }))
        })
    }

    async fn handle_update(
        &self,
        update: Arc<Update>,
        matched: MatchData,
        ctx: CallbackContext,
    ) -> Result<()> {
        let MatchData::Conversation(conversation) = matched else {
            return Err(CastpodError::Handler(
                "ConversationHandler called without a conversation match".to_string(),
            ));
        };
        let ConversationMatch {
            key,
            handler,
            inner,
        } = *conversation;

        let result = handler
            .handle_update(update, inner.clone(), ctx.clone().with_match(&inner))
            .await;
        match result {
            // a stop still applies the requested state
            Ok(()) | Err(CastpodError::HandlerStop) => {
                self.update_state(&key, ctx.take_next_state(), &ctx);
                result
            }
            Err(e) => Err(e),
        }
    }

    fn block(&self) -> Option<bool> {
        self.block
    }

    fn name(&self) -> &'static str {
        "ConversationHandler"
    }

    fn persistent_conversation(&self) -> Option<(String, ConversationStore)> {
        match (&self.name, self.persistent) {
            (Some(name), true) => Some((name.clone(), Arc::clone(&self.conversations))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::filters;
    use crate::ext::handlers::{CommandHandler, MessageHandler};
    use crate::types::{Chat, Message, User};
    use chrono::Utc;

    async fn noop(_: Arc<Update>, _: CallbackContext) -> Result<()> {
        Ok(())
    }

    fn update(text: &str) -> Update {
        let mut message = Message::new(1, Utc::now(), Chat::new(42, "private"));
        message.from = Some(User::new(7, "Ann", false));
        message.text = Some(text.to_string());
        Update::with_message(1, message)
    }

    fn conversation() -> ConversationHandler {
        let start: Arc<dyn Handler> = Arc::new(CommandHandler::new("subscribe", noop).unwrap());
        let url: Arc<dyn Handler> =
            Arc::new(MessageHandler::new(filters::text() & !filters::command(), noop));
        let cancel: Arc<dyn Handler> = Arc::new(CommandHandler::new("cancel", noop).unwrap());
        ConversationHandler::new(vec![start])
            .state(1, vec![url])
            .fallbacks(vec![cancel])
    }

    fn picked(matched: Option<MatchData>) -> Option<&'static str> {
        match matched? {
            MatchData::Conversation(m) => Some(m.handler.name()),
            _ => None,
        }
    }

    #[test]
    fn test_storage_key() {
        let key = ConversationKey(vec![-100, 7]);
        assert_eq!(key.to_storage_key(), "-100,7");
        assert_eq!(ConversationKey::from_storage_key("-100,7").unwrap(), key);
        assert!(ConversationKey::from_storage_key("a,b").is_err());
    }

    #[test]
    fn test_selection_follows_state() {
        let bot = Bot::new("123:abc").unwrap();
        let handler = conversation();

        assert_eq!(picked(handler.check_update(&update("/subscribe"), &bot)), Some("CommandHandler"));
        assert!(handler.check_update(&update("https://a.b/rss"), &bot).is_none());
        assert!(handler.check_update(&update("/cancel"), &bot).is_none());

        let key = handler.key_for(&update("x")).unwrap();
        assert_eq!(key, ConversationKey(vec![42, 7]));
        handler.conversations.lock().unwrap().insert(key, 1);

        assert_eq!(picked(handler.check_update(&update("https://a.b/rss"), &bot)), Some("MessageHandler"));
        assert_eq!(picked(handler.check_update(&update("/cancel"), &bot)), Some("CommandHandler"));
        // no reentry while the conversation runs
        assert!(handler.check_update(&update("/subscribe"), &bot).is_none());
    }

    #[test]
    fn test_keyed_by_validation() {
        assert!(matches!(
            conversation().keyed_by(false, false),
            Err(CastpodError::InvalidInput(_))
        ));
        let per_chat = conversation().keyed_by(true, false).unwrap();
        assert_eq!(per_chat.key_for(&update("x")), Some(ConversationKey(vec![42])));
    }
}
