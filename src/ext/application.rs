//! The update dispatch loop
//!
//! An [`Application`] drains the update queue and routes each update through
//! its handler groups in ascending order. Per group the first handler whose
//! `check_update` matches runs. Blocking handlers are awaited before the next
//! group is looked at, non-blocking ones run as tracked background tasks.
//! Errors go to the registered error handlers; [`CastpodError::HandlerStop`]
//! ends processing of the current update.
//!
//! With a persistence backend the application restores chat, user and bot
//! data on [`Application::initialize`] and periodically writes the entries
//! that changed since the last flush.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::bot::Bot;
use crate::types::{Message, Update};
use crate::utils::errors::{CastpodError, Result};

use super::context::CallbackContext;
use super::ext_bot::ExtBot;
use super::handlers::{ConversationKey, ConversationStore, Handler};
use super::job_queue::{Job, JobQueue};
use super::persistence::BasePersistence;
use super::updater::{PollingConfig, Updater, WebhookConfig};
use super::{error_callback, CallbackFuture, DataMap, ErrorCallback, SharedData};

/// Item of the update queue
#[derive(Debug)]
pub enum QueueItem {
    Update(Arc<Update>),
    /// Ends the drain loop once everything queued before it is processed
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
    Shutdown,
}

/// Hook run at a lifecycle step of `run_polling`/`run_webhook`
pub type LifecycleHook = Arc<dyn Fn(Arc<Application>) -> CallbackFuture + Send + Sync>;

/// Ids and conversation states changed since the last flush
#[derive(Debug, Default)]
struct PendingWrites {
    chat_updates: HashSet<i64>,
    chat_deletes: HashSet<i64>,
    user_updates: HashSet<i64>,
    user_deletes: HashSet<i64>,
    conversations: HashMap<String, HashMap<ConversationKey, Option<i64>>>,
}

pub(crate) struct Hooks {
    pub(crate) post_init: Option<LifecycleHook>,
    pub(crate) post_stop: Option<LifecycleHook>,
    pub(crate) post_shutdown: Option<LifecycleHook>,
}

pub struct Application {
    bot: ExtBot,
    update_queue: UnboundedSender<QueueItem>,
    update_receiver: tokio::sync::Mutex<Option<UnboundedReceiver<QueueItem>>>,
    updater: Option<Arc<Updater>>,
    job_queue: Option<Arc<JobQueue>>,
    persistence: Option<Arc<dyn BasePersistence>>,
    handlers: RwLock<BTreeMap<i32, Vec<Arc<dyn Handler>>>>,
    error_handlers: RwLock<Vec<(ErrorCallback, bool)>>,
    chat_data: Mutex<HashMap<i64, SharedData>>,
    user_data: Mutex<HashMap<i64, SharedData>>,
    bot_data: SharedData,
    pending: Mutex<PendingWrites>,
    state: Mutex<AppState>,
    concurrent_updates: usize,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    drain_task: tokio::sync::Mutex<Option<JoinHandle<UnboundedReceiver<QueueItem>>>>,
    flush_task: tokio::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    hooks: Hooks,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("bot", &self.bot)
            .field("state", &self.state())
            .field("concurrent_updates", &self.concurrent_updates)
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Awaits a handler future, turning a panic into [`CastpodError::Handler`]
pub(crate) async fn catch_panic<F>(future: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(CastpodError::Handler(format!(
            "handler panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

impl Application {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        bot: ExtBot,
        update_queue: UnboundedSender<QueueItem>,
        update_receiver: UnboundedReceiver<QueueItem>,
        updater: Option<Arc<Updater>>,
        job_queue: Option<Arc<JobQueue>>,
        persistence: Option<Arc<dyn BasePersistence>>,
        concurrent_updates: usize,
        hooks: Hooks,
    ) -> Self {
        let concurrent_updates = concurrent_updates.max(1);
        Self {
            bot,
            update_queue,
            update_receiver: tokio::sync::Mutex::new(Some(update_receiver)),
            updater,
            job_queue,
            persistence,
            handlers: RwLock::new(BTreeMap::new()),
            error_handlers: RwLock::new(Vec::new()),
            chat_data: Mutex::new(HashMap::new()),
            user_data: Mutex::new(HashMap::new()),
            bot_data: SharedData::default(),
            pending: Mutex::new(PendingWrites::default()),
            state: Mutex::new(AppState::Uninitialized),
            concurrent_updates,
            semaphore: Arc::new(Semaphore::new(concurrent_updates)),
            tracker: TaskTracker::new(),
            drain_task: tokio::sync::Mutex::new(None),
            flush_task: tokio::sync::Mutex::new(None),
            hooks,
        }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    pub fn ext_bot(&self) -> &ExtBot {
        &self.bot
    }

    pub fn updater(&self) -> Option<&Arc<Updater>> {
        self.updater.as_ref()
    }

    pub fn job_queue(&self) -> Option<&Arc<JobQueue>> {
        self.job_queue.as_ref()
    }

    pub fn persistence(&self) -> Option<&Arc<dyn BasePersistence>> {
        self.persistence.as_ref()
    }

    pub fn concurrent_updates(&self) -> usize {
        self.concurrent_updates
    }

    pub fn state(&self) -> AppState {
        *lock(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == AppState::Running
    }

    /// Sender side of the update queue
    pub fn update_queue(&self) -> UnboundedSender<QueueItem> {
        self.update_queue.clone()
    }

    /// Puts an update on the queue, e.g. one received by a custom webhook
    pub fn enqueue(&self, update: Update) -> Result<()> {
        self.update_queue
            .send(QueueItem::Update(Arc::new(update)))
            .map_err(|_| CastpodError::InvalidState("The update queue is closed".to_string()))
    }

    fn default_block(&self) -> bool {
        self.bot.defaults().map_or(true, |defaults| defaults.block)
    }

    // handlers

    /// Registers `handler` in `group`. Lower groups are tried first.
    pub fn add_handler(&self, handler: impl Handler + 'static, group: i32) -> Arc<dyn Handler> {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        self.add_shared_handler(Arc::clone(&handler), group);
        handler
    }

    pub fn add_shared_handler(&self, handler: Arc<dyn Handler>, group: i32) {
        if self.state() != AppState::Uninitialized && handler.persistent_conversation().is_some() {
            warn!("Persistent conversations added after initialize start without stored states");
        }
        debug!(handler = handler.name(), group = group, "Adding handler");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(group)
            .or_default()
            .push(handler);
    }

    pub fn add_handlers(&self, handlers: Vec<Arc<dyn Handler>>, group: i32) {
        for handler in handlers {
            self.add_shared_handler(handler, group);
        }
    }

    /// Removes `handler` from `group`, dropping the group once empty
    pub fn remove_handler(&self, handler: &Arc<dyn Handler>, group: i32) -> bool {
        let mut groups = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(handlers) = groups.get_mut(&group) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|other| !Arc::ptr_eq(other, handler));
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            groups.remove(&group);
        }
        removed
    }

    pub fn handler_groups(&self) -> Vec<i32> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Registers an error callback. Blocking callbacks run in order and may
    /// return [`CastpodError::HandlerStop`] to skip the remaining ones.
    pub fn add_error_handler<F, Fut>(&self, callback: F, block: bool)
    where
        F: Fn(Option<Arc<Update>>, CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.error_handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((error_callback(callback), block));
    }

    // data

    pub fn bot_data(&self) -> SharedData {
        Arc::clone(&self.bot_data)
    }

    /// Data of `chat_id`, created empty on first access
    pub fn chat_data(&self, chat_id: i64) -> SharedData {
        Arc::clone(lock(&self.chat_data).entry(chat_id).or_default())
    }

    pub fn user_data(&self, user_id: i64) -> SharedData {
        Arc::clone(lock(&self.user_data).entry(user_id).or_default())
    }

    pub fn chat_ids(&self) -> Vec<i64> {
        lock(&self.chat_data).keys().copied().collect()
    }

    pub fn user_ids(&self) -> Vec<i64> {
        lock(&self.user_data).keys().copied().collect()
    }

    /// Marks entries to be written on the next flush
    pub fn mark_data_for_update_persistence(
        &self,
        chat_ids: impl IntoIterator<Item = i64>,
        user_ids: impl IntoIterator<Item = i64>,
    ) {
        let mut pending = lock(&self.pending);
        pending.chat_updates.extend(chat_ids);
        pending.user_updates.extend(user_ids);
    }

    fn mark_update_for_persistence(&self, update: &Update) {
        self.mark_data_for_update_persistence(
            update.effective_chat().map(|chat| chat.id),
            update.effective_user().map(|user| user.id),
        );
    }

    pub(crate) fn mark_conversation_for_update_persistence(
        &self,
        name: &str,
        key: ConversationKey,
        state: Option<i64>,
    ) {
        lock(&self.pending)
            .conversations
            .entry(name.to_string())
            .or_default()
            .insert(key, state);
    }

    /// Forgets the data of `chat_id`, also in persistence on the next flush
    pub fn drop_chat_data(&self, chat_id: i64) {
        lock(&self.chat_data).remove(&chat_id);
        lock(&self.pending).chat_deletes.insert(chat_id);
    }

    pub fn drop_user_data(&self, user_id: i64) {
        lock(&self.user_data).remove(&user_id);
        lock(&self.pending).user_deletes.insert(user_id);
    }

    /// Moves chat data after a group was upgraded to a supergroup
    pub fn migrate_chat_data(&self, old_chat_id: i64, new_chat_id: i64) {
        let data = lock(&self.chat_data).remove(&old_chat_id);
        if let Some(data) = data {
            lock(&self.chat_data).insert(new_chat_id, data);
        }
        let mut pending = lock(&self.pending);
        pending.chat_deletes.insert(old_chat_id);
        pending.chat_deletes.remove(&new_chat_id);
        pending.chat_updates.insert(new_chat_id);
        debug!(old_chat_id, new_chat_id, "Migrated chat data");
    }

    /// Same as [`Self::migrate_chat_data`] with the ids of a migration
    /// service message
    pub fn migrate_chat_data_from_message(&self, message: &Message) -> Result<()> {
        match (message.migrate_from_chat_id, message.migrate_to_chat_id) {
            (Some(old), None) => self.migrate_chat_data(old, message.chat.id),
            (None, Some(new)) => self.migrate_chat_data(message.chat.id, new),
            _ => {
                return Err(CastpodError::InvalidInput(
                    "Message is not a chat migration message".to_string(),
                ))
            }
        }
        Ok(())
    }

    // lifecycle

    /// Initializes the bot and restores persisted data. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        if matches!(
            self.state(),
            AppState::Initialized | AppState::Running | AppState::Stopped
        ) {
            debug!("This Application is already initialized");
            return Ok(());
        }
        self.bot.initialize().await?;
        if let Some(persistence) = &self.persistence {
            self.restore_persistence(persistence.as_ref()).await?;
        }
        *lock(&self.state) = AppState::Initialized;
        info!("Application initialized");
        Ok(())
    }

    async fn restore_persistence(&self, persistence: &dyn BasePersistence) -> Result<()> {
        let store = persistence.store_data();
        if store.user_data {
            let restored = persistence.get_user_data().await?;
            debug!(users = restored.len(), "Restored user data");
            let mut user_data = lock(&self.user_data);
            for (id, data) in restored {
                user_data.insert(id, SharedData::new(tokio::sync::Mutex::new(data)));
            }
        }
        if store.chat_data {
            let restored = persistence.get_chat_data().await?;
            debug!(chats = restored.len(), "Restored chat data");
            let mut chat_data = lock(&self.chat_data);
            for (id, data) in restored {
                chat_data.insert(id, SharedData::new(tokio::sync::Mutex::new(data)));
            }
        }
        if store.bot_data {
            *self.bot_data.lock().await = persistence.get_bot_data().await?;
        }
        if store.callback_data {
            if let (Some(cache), Some(snapshot)) = (
                self.bot.callback_data_cache(),
                persistence.get_callback_data().await?,
            ) {
                cache.load_persistence_data(snapshot);
            }
        }
        for (name, conversations) in self.persistent_conversations() {
            let states = persistence.get_conversations(&name).await?;
            debug!(conversation = %name, count = states.len(), "Restored conversations");
            lock(&conversations).extend(states);
        }
        Ok(())
    }

    fn persistent_conversations(&self) -> Vec<(String, ConversationStore)> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flatten()
            .filter_map(|handler| handler.persistent_conversation())
            .collect()
    }

    /// Starts draining the update queue, the flush loop and the job queue
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        match self.state() {
            AppState::Running => {
                return Err(CastpodError::InvalidState(
                    "This Application is already running!".to_string(),
                ))
            }
            AppState::Uninitialized | AppState::Shutdown => {
                return Err(CastpodError::InvalidState(
                    "This Application was not initialized via `Application::initialize`!"
                        .to_string(),
                ))
            }
            AppState::Initialized | AppState::Stopped => {}
        }
        let receiver = self.update_receiver.lock().await.take().ok_or_else(|| {
            CastpodError::InvalidState("The update queue is already being drained".to_string())
        })?;
        *lock(&self.state) = AppState::Running;

        if let Some(persistence) = &self.persistence {
            let cancel = CancellationToken::new();
            let task = tokio::spawn(Arc::clone(self).flush_loop(
                cancel.clone(),
                persistence.update_interval(),
            ));
            *self.flush_task.lock().await = Some((cancel, task));
        }
        if let Some(job_queue) = &self.job_queue {
            job_queue.start();
        }
        let drain = tokio::spawn(Arc::clone(self).drain_queue(receiver));
        *self.drain_task.lock().await = Some(drain);
        info!("Application started");
        Ok(())
    }

    /// Processes what is queued, then stops the loops, waits for background
    /// handlers and flushes persistence one last time
    pub async fn stop(self: &Arc<Self>) -> Result<()> {
        if !self.is_running() {
            return Err(CastpodError::InvalidState(
                "This Application is not running!".to_string(),
            ));
        }
        info!("Application is stopping. This might take a moment.");
        if self.update_queue.send(QueueItem::Stop).is_err() {
            warn!("Update queue closed before stop");
        }
        if let Some(drain) = self.drain_task.lock().await.take() {
            match drain.await {
                Ok(receiver) => *self.update_receiver.lock().await = Some(receiver),
                Err(e) => error!(error = %e, "Update queue drain task failed"),
            }
        }
        if let Some(job_queue) = &self.job_queue {
            job_queue.stop().await;
        }
        self.join_pending_tasks().await;
        if let Some((cancel, task)) = self.flush_task.lock().await.take() {
            cancel.cancel();
            if let Err(e) = task.await {
                error!(error = %e, "Persistence flush task failed");
            }
        }
        self.update_persistence().await;
        *lock(&self.state) = AppState::Stopped;
        info!("Application stopped");
        Ok(())
    }

    /// Shuts the bot, updater and persistence down
    pub async fn shutdown(&self) -> Result<()> {
        match self.state() {
            AppState::Running => {
                return Err(CastpodError::InvalidState(
                    "This Application is still running!".to_string(),
                ))
            }
            AppState::Uninitialized | AppState::Shutdown => {
                debug!("This Application is not initialized, nothing to shut down");
                return Ok(());
            }
            AppState::Initialized | AppState::Stopped => {}
        }
        self.bot.shutdown().await?;
        if let Some(updater) = &self.updater {
            updater.shutdown().await?;
        }
        if let Some(persistence) = &self.persistence {
            persistence.flush().await?;
        }
        *lock(&self.state) = AppState::Shutdown;
        info!("Application shut down");
        Ok(())
    }

    /// Waits for background handler tasks spawned so far
    pub async fn join_pending_tasks(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    async fn drain_queue(
        self: Arc<Self>,
        mut receiver: UnboundedReceiver<QueueItem>,
    ) -> UnboundedReceiver<QueueItem> {
        debug!("Update queue drain started");
        while let Some(item) = receiver.recv().await {
            let update = match item {
                QueueItem::Update(update) => update,
                QueueItem::Stop => break,
            };
            debug!(update_id = update.update_id, "Processing update");
            if self.concurrent_updates > 1 {
                let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                    break;
                };
                let app = Arc::clone(&self);
                self.tracker.spawn(async move {
                    app.process_update_guarded(update).await;
                    drop(permit);
                });
            } else {
                self.process_update_guarded(update).await;
            }
        }
        debug!("Update queue drain stopped");
        receiver
    }

    async fn flush_loop(self: Arc<Self>, cancel: CancellationToken, interval: Duration) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => self.update_persistence().await,
            }
        }
    }

    // dispatch

    /// A panic in a filter must not take the drain loop down with it
    async fn process_update_guarded(self: &Arc<Self>, update: Arc<Update>) {
        let update_id = update.update_id;
        if let Err(payload) = AssertUnwindSafe(self.process_update(update))
            .catch_unwind()
            .await
        {
            error!(
                update_id = update_id,
                panic = %panic_message(payload.as_ref()),
                "Update processing panicked"
            );
        }
    }

    /// Runs the handlers of every group for `update`
    pub async fn process_update(self: &Arc<Self>, update: Arc<Update>) {
        let groups: Vec<(i32, Vec<Arc<dyn Handler>>)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(group, handlers)| (*group, handlers.clone()))
            .collect();

        let mut handled = false;
        'groups: for (group, handlers) in groups {
            let Some((handler, matched)) = handlers.iter().find_map(|handler| {
                handler
                    .check_update(&update, self.bot())
                    .map(|matched| (Arc::clone(handler), matched))
            }) else {
                continue;
            };

            if !handled {
                handled = true;
                if let Err(e) = self.refresh_data(&update).await {
                    if self.process_error(Some(Arc::clone(&update)), e, None).await {
                        break 'groups;
                    }
                }
            }

            let ctx = CallbackContext::from_update(self, Some(&update));
            let block = handler.block().unwrap_or_else(|| self.default_block());
            debug!(update_id = update.update_id, group = group, handler = handler.name(), block = block, "Running handler");

            if block {
                match catch_panic(handler.handle_update(Arc::clone(&update), matched, ctx)).await {
                    Ok(()) => {}
                    Err(CastpodError::HandlerStop) => {
                        debug!(update_id = update.update_id, "Stopping further handlers");
                        break 'groups;
                    }
                    Err(e) => {
                        if self.process_error(Some(Arc::clone(&update)), e, None).await {
                            break 'groups;
                        }
                    }
                }
            } else {
                let app = Arc::clone(self);
                let update = Arc::clone(&update);
                self.tracker.spawn(async move {
                    match catch_panic(handler.handle_update(Arc::clone(&update), matched, ctx)).await {
                        Ok(()) => {}
                        Err(CastpodError::HandlerStop) => {
                            warn!("HandlerStop is not supported with handlers running non-blocking");
                        }
                        Err(e) => {
                            app.process_error(Some(Arc::clone(&update)), e, None).await;
                        }
                    }
                    app.mark_update_for_persistence(&update);
                });
            }
        }

        if handled {
            self.mark_update_for_persistence(&update);
        }
    }

    async fn refresh_data(&self, update: &Update) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let store = persistence.store_data();
        if store.bot_data {
            persistence
                .refresh_bot_data(&mut *self.bot_data.lock().await)
                .await?;
        }
        if store.chat_data {
            if let Some(chat) = update.effective_chat() {
                let data = self.chat_data(chat.id);
                persistence
                    .refresh_chat_data(chat.id, &mut *data.lock().await)
                    .await?;
            }
        }
        if store.user_data {
            if let Some(user) = update.effective_user() {
                let data = self.user_data(user.id);
                persistence
                    .refresh_user_data(user.id, &mut *data.lock().await)
                    .await?;
            }
        }
        Ok(())
    }

    /// Runs the error handlers. `true` if one of them asked to stop.
    pub async fn process_error(
        self: &Arc<Self>,
        update: Option<Arc<Update>>,
        error: CastpodError,
        job: Option<Job>,
    ) -> bool {
        let error_handlers = self
            .error_handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if error_handlers.is_empty() {
            error!(
                error = %error,
                update_id = ?update.as_ref().map(|u| u.update_id),
                job = ?job.as_ref().map(|j| j.name().to_string()),
                "No error handlers are registered, logging exception"
            );
            return false;
        }

        let error = Arc::new(error);
        for (callback, block) in error_handlers {
            let ctx = CallbackContext::from_error(self, update.as_deref(), Arc::clone(&error), job.clone());
            let future = callback(update.clone(), ctx);
            if block {
                match catch_panic(future).await {
                    Ok(()) => {}
                    Err(CastpodError::HandlerStop) => return true,
                    Err(e) => {
                        error!(error = %e, original = %error, "An error handler failed");
                    }
                }
            } else {
                self.tracker.spawn(async move {
                    match catch_panic(future).await {
                        Ok(()) => {}
                        Err(CastpodError::HandlerStop) => {
                            warn!("HandlerStop is not supported with error handlers running non-blocking");
                        }
                        Err(e) => error!(error = %e, "A non-blocking error handler failed"),
                    }
                });
            }
        }
        false
    }

    // persistence

    /// Writes everything changed since the last call to the persistence
    pub async fn update_persistence(self: &Arc<Self>) {
        let Some(persistence) = self.persistence.clone() else {
            return;
        };
        let pending = std::mem::take(&mut *lock(&self.pending));
        let store = persistence.store_data();
        let mut errors = Vec::new();

        if store.callback_data {
            if let Some(cache) = self.bot.callback_data_cache() {
                if let Err(e) = persistence.update_callback_data(&cache.persistence_data()).await {
                    errors.push(e);
                }
            }
        }
        if store.bot_data {
            let data = self.bot_data.lock().await.clone();
            if let Err(e) = persistence.update_bot_data(&data).await {
                errors.push(e);
            }
        }
        if store.chat_data {
            for chat_id in &pending.chat_deletes {
                if let Err(e) = persistence.drop_chat_data(*chat_id).await {
                    errors.push(e);
                }
            }
            for chat_id in pending.chat_updates.difference(&pending.chat_deletes) {
                let data = self.copy_of(&self.chat_data(*chat_id)).await;
                if let Err(e) = persistence.update_chat_data(*chat_id, &data).await {
                    errors.push(e);
                }
            }
        }
        if store.user_data {
            for user_id in &pending.user_deletes {
                if let Err(e) = persistence.drop_user_data(*user_id).await {
                    errors.push(e);
                }
            }
            for user_id in pending.user_updates.difference(&pending.user_deletes) {
                let data = self.copy_of(&self.user_data(*user_id)).await;
                if let Err(e) = persistence.update_user_data(*user_id, &data).await {
                    errors.push(e);
                }
            }
        }
        for (name, states) in &pending.conversations {
            for (key, state) in states {
                if let Err(e) = persistence.update_conversation(name, key, *state).await {
                    errors.push(e);
                }
            }
        }

        debug!(
            chats = pending.chat_updates.len(),
            users = pending.user_updates.len(),
            errors = errors.len(),
            "Persistence updated"
        );
        for e in errors {
            self.process_error(None, e, None).await;
        }
    }

    async fn copy_of(&self, data: &SharedData) -> DataMap {
        data.lock().await.clone()
    }

    // run helpers

    /// Initializes, polls until Ctrl+C, then stops and shuts down
    pub async fn run_polling(self: &Arc<Self>, config: PollingConfig) -> Result<()> {
        self.run_polling_until(config, shutdown_signal()).await
    }

    pub async fn run_polling_until(
        self: &Arc<Self>,
        config: PollingConfig,
        stop_signal: impl Future<Output = ()>,
    ) -> Result<()> {
        let updater = self.require_updater()?;
        self.run(&updater, updater.start_polling(config), stop_signal)
            .await
    }

    /// Initializes, serves the webhook until Ctrl+C, then stops and shuts down
    pub async fn run_webhook(self: &Arc<Self>, config: WebhookConfig) -> Result<()> {
        self.run_webhook_until(config, shutdown_signal()).await
    }

    pub async fn run_webhook_until(
        self: &Arc<Self>,
        config: WebhookConfig,
        stop_signal: impl Future<Output = ()>,
    ) -> Result<()> {
        let updater = self.require_updater()?;
        self.run(&updater, updater.start_webhook(config), stop_signal)
            .await
    }

    fn require_updater(&self) -> Result<Arc<Updater>> {
        self.updater.clone().ok_or_else(|| {
            CastpodError::InvalidState("This Application has no Updater".to_string())
        })
    }

    async fn run(
        self: &Arc<Self>,
        updater: &Updater,
        start_updater: impl Future<Output = Result<()>>,
        stop_signal: impl Future<Output = ()>,
    ) -> Result<()> {
        let outcome = async {
            self.initialize().await?;
            if let Some(hook) = &self.hooks.post_init {
                hook(Arc::clone(self)).await?;
            }
            start_updater.await?;
            self.start().await?;
            info!("Application is running, waiting for the stop signal");
            tokio::select! {
                _ = stop_signal => Ok::<(), CastpodError>(()),
                _ = updater.fetching_ended() => {
                    let failure = updater.take_failure().unwrap_or_else(|| {
                        CastpodError::InvalidState("The Updater stopped fetching updates".to_string())
                    });
                    error!(error = %failure, "Updater stopped on its own, shutting down");
                    Err(failure)
                }
            }
        }
        .await;

        let cleanup = self.stop_and_shutdown(updater).await;
        outcome.and(cleanup)
    }

    async fn stop_and_shutdown(self: &Arc<Self>, updater: &Updater) -> Result<()> {
        // an updater that ended on its own is not running but still needs stopping
        match updater.stop().await {
            Ok(()) | Err(CastpodError::InvalidState(_)) => {}
            Err(e) => return Err(e),
        }
        if self.is_running() {
            self.stop().await?;
            if let Some(hook) = &self.hooks.post_stop {
                hook(Arc::clone(self)).await?;
            }
        }
        self.shutdown().await?;
        if let Some(hook) = &self.hooks.post_shutdown {
            hook(Arc::clone(self)).await?;
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
    }
    info!("Received stop signal");
}
