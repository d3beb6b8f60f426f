//! Update dispatch layer
//!
//! This module contains the [`Application`] that drains the update queue and
//! routes every update through groups of [`handlers`], together with the
//! pieces it coordinates: the [`Updater`] fetching updates, the
//! [`JobQueue`] running scheduled callbacks and the [`persistence`] backends
//! that keep chat, user and bot data across restarts.

pub mod application;
pub mod builder;
pub mod callback_data_cache;
pub mod context;
pub mod ext_bot;
pub mod filters;
pub mod handlers;
pub mod job_queue;
pub mod persistence;
pub mod updater;

pub use application::{AppState, Application, QueueItem};
pub use builder::ApplicationBuilder;
pub use callback_data_cache::{CallbackDataCache, CallbackDataSnapshot, KeyboardData};
pub use context::CallbackContext;
pub use ext_bot::ExtBot;
pub use filters::Filter;
pub use handlers::{
    CallbackQueryHandler, CommandHandler, ConversationHandler, ConversationKey, Handler,
    InlineQueryHandler, MatchData, MessageHandler, TypeHandler, END,
};
pub use job_queue::{Job, JobOptions, JobQueue};
pub use persistence::{BasePersistence, InMemoryPersistence, PersistenceInput};
pub use updater::{PollingConfig, Updater, WebhookConfig};

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use serde_json::{Map, Value};

use crate::types::Update;
use crate::utils::errors::Result;

/// Free-form data stored per chat, per user and for the bot
pub type DataMap = Map<String, Value>;

/// Shared, individually locked data map
pub type SharedData = Arc<tokio::sync::Mutex<DataMap>>;

pub type CallbackFuture = BoxFuture<'static, Result<()>>;

/// Callback run by a handler for a matching update
pub type HandlerCallback = Arc<dyn Fn(Arc<Update>, CallbackContext) -> CallbackFuture + Send + Sync>;

/// Callback run for an error. The update is `None` for job errors.
pub type ErrorCallback =
    Arc<dyn Fn(Option<Arc<Update>>, CallbackContext) -> CallbackFuture + Send + Sync>;

pub type JobCallback = Arc<dyn Fn(CallbackContext) -> CallbackFuture + Send + Sync>;

pub(crate) fn handler_callback<F, Fut>(callback: F) -> HandlerCallback
where
    F: Fn(Arc<Update>, CallbackContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |update, ctx| Box::pin(callback(update, ctx)))
}

pub(crate) fn error_callback<F, Fut>(callback: F) -> ErrorCallback
where
    F: Fn(Option<Arc<Update>>, CallbackContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |update, ctx| Box::pin(callback(update, ctx)))
}

pub(crate) fn job_callback<F, Fut>(callback: F) -> JobCallback
where
    F: Fn(CallbackContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(callback(ctx)))
}
