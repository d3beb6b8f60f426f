//! Bot API facade
//!
//! [`Bot`] exposes one async method per supported Bot API endpoint. Each
//! method fills unset options from the configured [`Defaults`], converts
//! datetimes to Unix timestamps, builds a JSON or multipart request and
//! decodes the `result` into the declared return type.

pub mod chats;
pub mod defaults;
pub mod messages;
pub mod params;
pub mod updates;

pub use defaults::{Defaults, TimeInput};
pub use params::{MediaOptions, MessageOptions, MessageTarget, WebhookParams};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::FixedOffset;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::ext::callback_data_cache::CallbackDataCache;
use crate::request::{BaseRequest, HttpRequest, RequestData, RequestTimeouts};
use crate::types::{InlineKeyboardMarkup, Message, ReplyMarkup, Update, User};
use crate::utils::errors::{TelegramError, TelegramResult};

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org/bot";
pub const DEFAULT_BASE_FILE_URL: &str = "https://api.telegram.org/file/bot";

struct BotInner {
    token: String,
    base_url: String,
    base_file_url: String,
    request: Arc<dyn BaseRequest>,
    defaults: Option<Defaults>,
    callback_data_cache: Option<Arc<CallbackDataCache>>,
    me: RwLock<Option<User>>,
    initialized: AtomicBool,
}

/// Handle to the Bot API. Cheap to clone.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("username", &self.username())
            .field("arbitrary_callback_data", &self.inner.callback_data_cache.is_some())
            .finish()
    }
}

/// Builder for [`Bot`]
pub struct BotBuilder {
    token: String,
    base_url: String,
    base_file_url: String,
    request: Option<Arc<dyn BaseRequest>>,
    timeouts: RequestTimeouts,
    defaults: Option<Defaults>,
}

impl BotBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_file_url(mut self, base_file_url: impl Into<String>) -> Self {
        self.base_file_url = base_file_url.into();
        self
    }

    /// Use a custom transport instead of the default [`HttpRequest`]
    pub fn request(mut self, request: Arc<dyn BaseRequest>) -> Self {
        self.request = Some(request);
        self
    }

    pub fn timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn build(self) -> TelegramResult<Bot> {
        if self.token.trim().is_empty() {
            return Err(TelegramError::InvalidToken(
                "You must pass the token you received from https://t.me/Botfather!".to_string(),
            ));
        }
        let request: Arc<dyn BaseRequest> = match self.request {
            Some(request) => request,
            None => Arc::new(HttpRequest::new(self.timeouts)?),
        };

        Ok(Bot {
            inner: Arc::new(BotInner {
                base_url: format!("{}{}", self.base_url, self.token),
                base_file_url: format!("{}{}", self.base_file_url, self.token),
                token: self.token,
                request,
                defaults: self.defaults,
                callback_data_cache: None,
                me: RwLock::new(None),
                initialized: AtomicBool::new(false),
            }),
        })
    }
}

impl Bot {
    /// Bot with the default transport and no defaults
    pub fn new(token: impl Into<String>) -> TelegramResult<Self> {
        Self::builder(token).build()
    }

    pub fn builder(token: impl Into<String>) -> BotBuilder {
        BotBuilder {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            base_file_url: DEFAULT_BASE_FILE_URL.to_string(),
            request: None,
            timeouts: RequestTimeouts::default(),
            defaults: None,
        }
    }

    /// Same bot, with outgoing keyboards and incoming updates going through `cache`
    pub(crate) fn with_callback_data_cache(&self, cache: Arc<CallbackDataCache>) -> Self {
        let me = self.inner.me.read().ok().and_then(|me| me.clone());
        Bot {
            inner: Arc::new(BotInner {
                token: self.inner.token.clone(),
                base_url: self.inner.base_url.clone(),
                base_file_url: self.inner.base_file_url.clone(),
                request: Arc::clone(&self.inner.request),
                defaults: self.inner.defaults.clone(),
                callback_data_cache: Some(cache),
                me: RwLock::new(me),
                initialized: AtomicBool::new(self.inner.initialized.load(Ordering::SeqCst)),
            }),
        }
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn base_file_url(&self) -> &str {
        &self.inner.base_file_url
    }

    pub fn defaults(&self) -> Option<&Defaults> {
        self.inner.defaults.as_ref()
    }

    /// Offset used for naive datetimes
    pub fn tz(&self) -> FixedOffset {
        self.inner
            .defaults
            .as_ref()
            .map(|d| d.tz)
            .unwrap_or_else(|| Defaults::default().tz)
    }

    pub fn callback_data_cache(&self) -> Option<&Arc<CallbackDataCache>> {
        self.inner.callback_data_cache.as_ref()
    }

    /// The bot's own user, known after [`Bot::initialize`]
    pub fn bot_user(&self) -> Option<User> {
        self.inner.me.read().ok().and_then(|me| me.clone())
    }

    pub fn username(&self) -> Option<String> {
        self.bot_user().and_then(|me| me.username)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Initializes the transport and caches the bot user. Idempotent.
    pub async fn initialize(&self) -> TelegramResult<()> {
        if self.is_initialized() {
            debug!("Bot already initialized");
            return Ok(());
        }
        self.inner.request.initialize().await?;
        let me = self.get_me().await?;
        info!(bot_id = me.id, username = ?me.username, "Bot initialized");
        self.inner.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn shutdown(&self) -> TelegramResult<()> {
        if !self.is_initialized() {
            debug!("Bot not initialized, nothing to shut down");
            return Ok(());
        }
        self.inner.request.shutdown().await?;
        self.inner.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn set_me(&self, me: User) {
        if let Ok(mut slot) = self.inner.me.write() {
            *slot = Some(me);
        }
    }

    /// Calls `method` and returns the raw `result`
    pub async fn raw_request(
        &self,
        method: &str,
        data: &RequestData,
        timeouts: Option<RequestTimeouts>,
    ) -> TelegramResult<Value> {
        let url = format!("{}/{}", self.inner.base_url, method);
        debug!(method = method, multipart = data.is_multipart(), "Calling Bot API method");
        let result = self.inner.request.post(&url, data, timeouts).await;
        if let Err(e) = &result {
            debug!(method = method, error = %e, "Bot API call failed");
        }
        result
    }

    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        data: &RequestData,
    ) -> TelegramResult<T> {
        self.call_with_timeouts(method, data, None).await
    }

    pub(crate) async fn call_with_timeouts<T: DeserializeOwned>(
        &self,
        method: &str,
        data: &RequestData,
        timeouts: Option<RequestTimeouts>,
    ) -> TelegramResult<T> {
        let result = self.raw_request(method, data, timeouts).await?;
        serde_json::from_value(result).map_err(|e| {
            TelegramError::Generic(format!("Failed to decode result of {}: {}", method, e))
        })
    }

    /// Calls a method returning a message and resolves its callback data
    pub(crate) async fn call_message(
        &self,
        method: &str,
        data: &RequestData,
    ) -> TelegramResult<Message> {
        let mut message: Message = self.call(method, data).await?;
        if let Some(cache) = self.callback_data_cache() {
            cache.process_message(&mut message);
        }
        Ok(message)
    }

    /// Edit methods return `true` instead of a message for inline messages
    pub(crate) async fn call_edit(
        &self,
        method: &str,
        data: &RequestData,
    ) -> TelegramResult<Option<Message>> {
        match self.raw_request(method, data, None).await? {
            Value::Bool(_) => Ok(None),
            value => {
                let mut message: Message = serde_json::from_value(value).map_err(|e| {
                    TelegramError::Generic(format!("Failed to decode result of {}: {}", method, e))
                })?;
                if let Some(cache) = self.callback_data_cache() {
                    cache.process_message(&mut message);
                }
                Ok(Some(message))
            }
        }
    }

    /// Swaps arbitrary callback payloads for cache tokens
    pub(crate) fn prepare_inline_markup(
        &self,
        markup: &InlineKeyboardMarkup,
    ) -> TelegramResult<InlineKeyboardMarkup> {
        if !markup.has_arbitrary_data() {
            return Ok(markup.clone());
        }
        match self.callback_data_cache() {
            Some(cache) => Ok(cache.process_keyboard(markup)),
            None => Err(TelegramError::BadRequest(
                "Arbitrary callback data requires arbitrary_callback_data to be enabled"
                    .to_string(),
            )),
        }
    }

    pub(crate) fn prepare_markup(
        &self,
        markup: Option<ReplyMarkup>,
    ) -> TelegramResult<Option<ReplyMarkup>> {
        match markup {
            Some(ReplyMarkup::InlineKeyboard(inline)) => Ok(Some(ReplyMarkup::InlineKeyboard(
                self.prepare_inline_markup(&inline)?,
            ))),
            other => Ok(other),
        }
    }

    /// Applies defaults, swaps callback data and writes the options
    pub(crate) fn write_message_options(
        &self,
        data: &mut RequestData,
        mut options: MessageOptions,
        entities_key: &str,
        with_preview: bool,
    ) -> TelegramResult<()> {
        options.apply_defaults(self.defaults());
        options.reply_markup = self.prepare_markup(options.reply_markup.take())?;
        options.write(data, entities_key, with_preview)
    }

    /// Resolves callback data of an incoming update, if the cache is enabled
    pub fn insert_callback_data(&self, update: &mut Update) {
        if let Some(cache) = self.callback_data_cache() {
            cache.insert_callback_data(update);
        }
    }

    pub(crate) fn timestamp(&self, time: TimeInput) -> i64 {
        time.to_timestamp(self.tz())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InlineKeyboardButton;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_empty_token_is_rejected() {
        assert_matches!(Bot::new("  "), Err(TelegramError::InvalidToken(_)));
    }

    #[test]
    fn test_urls_include_token() {
        let bot = Bot::builder("123:abc")
            .base_url("http://localhost:8081/bot")
            .build()
            .unwrap();
        assert_eq!(bot.base_url(), "http://localhost:8081/bot123:abc");
        assert_eq!(bot.base_file_url(), "https://api.telegram.org/file/bot123:abc");
        assert!(!format!("{:?}", bot).contains("abc"));
    }

    #[test]
    fn test_arbitrary_data_needs_cache() {
        let bot = Bot::new("123:abc").unwrap();
        let markup = InlineKeyboardMarkup::from_column(vec![InlineKeyboardButton::callback(
            "x",
            json!({"a": 1}),
        )]);
        assert!(bot.prepare_inline_markup(&markup).is_err());

        let ext = bot.with_callback_data_cache(Arc::new(CallbackDataCache::new(8)));
        let processed = ext.prepare_inline_markup(&markup).unwrap();
        assert!(!processed.has_arbitrary_data());
    }
}
