//! Builder for [`Application`]

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::bot::{Bot, Defaults};
use crate::request::{BaseRequest, RequestTimeouts};
use crate::utils::errors::{CastpodError, Result};

use super::application::{Application, Hooks, LifecycleHook};
use super::callback_data_cache::DEFAULT_MAXSIZE;
use super::ext_bot::ExtBot;
use super::job_queue::JobQueue;
use super::persistence::BasePersistence;
use super::updater::Updater;

/// Collects the parts of an [`Application`].
///
/// Either a token or a ready [`Bot`] is required. The job queue and the
/// updater are created unless switched off.
pub struct ApplicationBuilder {
    token: Option<String>,
    bot: Option<Bot>,
    base_url: Option<String>,
    request: Option<Arc<dyn BaseRequest>>,
    timeouts: Option<RequestTimeouts>,
    defaults: Option<Defaults>,
    arbitrary_callback_data: Option<u64>,
    persistence: Option<Arc<dyn BasePersistence>>,
    concurrent_updates: usize,
    job_queue: bool,
    updater: bool,
    post_init: Option<LifecycleHook>,
    post_stop: Option<LifecycleHook>,
    post_shutdown: Option<LifecycleHook>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn hook<F, Fut>(hook: F) -> LifecycleHook
where
    F: Fn(Arc<Application>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |app| Box::pin(hook(app)))
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            token: None,
            bot: None,
            base_url: None,
            request: None,
            timeouts: None,
            defaults: None,
            arbitrary_callback_data: None,
            persistence: None,
            concurrent_updates: 1,
            job_queue: true,
            updater: true,
            post_init: None,
            post_stop: None,
            post_shutdown: None,
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Uses an existing bot. Excludes `token`, `base_url`, `request`,
    /// `timeouts` and `defaults`.
    pub fn bot(mut self, bot: Bot) -> Self {
        self.bot = Some(bot);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn request(mut self, request: Arc<dyn BaseRequest>) -> Self {
        self.request = Some(request);
        self
    }

    pub fn timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Enables arbitrary callback data, keeping `maxsize` keyboards
    /// (`None` for the default size)
    pub fn arbitrary_callback_data(mut self, maxsize: Option<u64>) -> Self {
        self.arbitrary_callback_data = Some(maxsize.unwrap_or(DEFAULT_MAXSIZE));
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn BasePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Number of updates processed at the same time, 1 for strictly in order
    pub fn concurrent_updates(mut self, concurrent_updates: usize) -> Self {
        self.concurrent_updates = concurrent_updates;
        self
    }

    pub fn job_queue(mut self, enabled: bool) -> Self {
        self.job_queue = enabled;
        self
    }

    pub fn updater(mut self, enabled: bool) -> Self {
        self.updater = enabled;
        self
    }

    /// Runs after `initialize` in `run_polling`/`run_webhook`
    pub fn post_init<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Application>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.post_init = Some(hook(callback));
        self
    }

    pub fn post_stop<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Application>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.post_stop = Some(hook(callback));
        self
    }

    pub fn post_shutdown<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Application>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.post_shutdown = Some(hook(callback));
        self
    }

    fn build_bot(&mut self) -> Result<Bot> {
        if let Some(bot) = self.bot.take() {
            if self.token.is_some()
                || self.base_url.is_some()
                || self.request.is_some()
                || self.timeouts.is_some()
                || self.defaults.is_some()
            {
                return Err(CastpodError::InvalidInput(
                    "Bot settings can not be combined with an existing bot".to_string(),
                ));
            }
            return Ok(bot);
        }
        let token = self.token.take().ok_or_else(|| {
            CastpodError::InvalidInput("A token or a bot is required".to_string())
        })?;
        let mut builder = Bot::builder(token);
        if let Some(base_url) = self.base_url.take() {
            builder = builder.base_url(base_url);
        }
        if let Some(request) = self.request.take() {
            builder = builder.request(request);
        }
        if let Some(timeouts) = self.timeouts.take() {
            builder = builder.timeouts(timeouts);
        }
        if let Some(defaults) = self.defaults.take() {
            builder = builder.defaults(defaults);
        }
        Ok(builder.build()?)
    }

    pub fn build(mut self) -> Result<Arc<Application>> {
        let bot = self.build_bot()?;
        let bot = match self.arbitrary_callback_data {
            Some(maxsize) => ExtBot::with_arbitrary_callback_data(bot, maxsize),
            None => ExtBot::new(bot),
        };

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let updater = self
            .updater
            .then(|| Arc::new(Updater::new(bot.bot().clone(), update_tx.clone())));
        let job_queue = self.job_queue.then(|| Arc::new(JobQueue::new()));

        debug!(
            concurrent_updates = self.concurrent_updates,
            job_queue = self.job_queue,
            updater = self.updater,
            persistence = self.persistence.is_some(),
            "Building application"
        );
        let application = Arc::new(Application::new(
            bot,
            update_tx,
            update_rx,
            updater,
            job_queue.clone(),
            self.persistence,
            self.concurrent_updates,
            Hooks {
                post_init: self.post_init,
                post_stop: self.post_stop,
                post_shutdown: self.post_shutdown,
            },
        ));
        if let Some(job_queue) = job_queue {
            job_queue.set_application(Arc::downgrade(&application));
        }
        Ok(application)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_token_or_bot_required() {
        assert_matches!(
            ApplicationBuilder::new().build(),
            Err(CastpodError::InvalidInput(_))
        );
    }

    #[test]
    fn test_bot_excludes_token() {
        let bot = Bot::new("123:abc").unwrap();
        assert_matches!(
            ApplicationBuilder::new().bot(bot).token("456:def").build(),
            Err(CastpodError::InvalidInput(_))
        );
    }

    #[test]
    fn test_defaults() {
        let app = ApplicationBuilder::new().token("123:abc").build().unwrap();
        assert!(app.job_queue().is_some());
        assert!(app.updater().is_some());
        assert!(app.persistence().is_none());
        assert_eq!(app.concurrent_updates(), 1);
        assert!(!app.ext_bot().arbitrary_callback_data());
    }

    #[test]
    fn test_optional_parts() {
        let app = ApplicationBuilder::new()
            .token("123:abc")
            .job_queue(false)
            .updater(false)
            .arbitrary_callback_data(Some(8))
            .concurrent_updates(4)
            .build()
            .unwrap();
        assert!(app.job_queue().is_none());
        assert!(app.updater().is_none());
        assert_eq!(app.concurrent_updates(), 4);
        assert_eq!(
            app.bot().callback_data_cache().map(|cache| cache.maxsize()),
            Some(8)
        );
    }
}
