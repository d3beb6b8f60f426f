//! Fetching updates
//!
//! The [`Updater`] feeds the application's update queue either by long
//! polling `getUpdates` or by serving a webhook endpoint with axum.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use rand::Rng;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bot::{Bot, WebhookParams};
use crate::request::InputFile;
use crate::types::Update;
use crate::utils::errors::{CastpodError, Result, TelegramError};

use super::application::QueueItem;

pub const SECRET_TOKEN_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Settings of [`Updater::start_polling`]
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Pause between two `getUpdates` calls
    pub poll_interval: Duration,
    /// Long polling timeout in seconds
    pub timeout: u64,
    pub drop_pending_updates: bool,
    pub allowed_updates: Option<Vec<String>>,
    /// First delay after a network error, doubled up to `max_backoff`
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            timeout: 10,
            drop_pending_updates: false,
            allowed_updates: None,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Settings of [`Updater::start_webhook`]
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub listen: String,
    pub port: u16,
    pub url_path: String,
    /// Public URL registered with Telegram. Derived from listen, port and
    /// path when unset.
    pub webhook_url: Option<String>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub secret_token: Option<String>,
    pub drop_pending_updates: bool,
    pub allowed_updates: Option<Vec<String>>,
    pub max_connections: i64,
    pub ip_address: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1".to_string(),
            port: 80,
            url_path: String::new(),
            webhook_url: None,
            cert: None,
            key: None,
            secret_token: None,
            drop_pending_updates: false,
            allowed_updates: None,
            max_connections: 40,
            ip_address: None,
        }
    }
}

impl WebhookConfig {
    fn path(&self) -> String {
        format!("/{}", self.url_path.trim_start_matches('/'))
    }

    fn public_url(&self, port: u16) -> String {
        match &self.webhook_url {
            Some(url) => url.clone(),
            None => {
                let scheme = if self.cert.is_some() { "https" } else { "http" };
                format!("{}://{}:{}{}", scheme, self.listen, port, self.path())
            }
        }
    }
}

/// Capped exponential backoff with jitter
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }

    fn next_delay(&mut self) -> Duration {
        let base = self.current.min(self.max);
        self.current = (self.current * 2).min(self.max);
        let jitter_ms = (base.as_millis() / 4) as u64;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        base + Duration::from_millis(jitter)
    }
}

#[derive(Clone)]
struct WebhookState {
    bot: Bot,
    update_queue: UnboundedSender<QueueItem>,
    secret_token: Option<String>,
}

async fn handle_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(secret) = &state.secret_token {
        let given = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if given != Some(secret.as_str()) {
            debug!("Request did not include the secret token");
            return StatusCode::FORBIDDEN;
        }
    }
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if !is_json {
        return StatusCode::FORBIDDEN;
    }

    let mut update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "Cannot parse webhook body as update");
            return StatusCode::BAD_REQUEST;
        }
    };
    state.bot.insert_callback_data(&mut update);
    debug!(update_id = update.update_id, "Received webhook update");
    match state.update_queue.send(QueueItem::Update(update.into())) {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn webhook_router(path: &str, state: WebhookState) -> Router {
    Router::new()
        .route(path, post(handle_webhook))
        .with_state(state)
}

type FailureSlot = Arc<Mutex<Option<CastpodError>>>;

fn record_failure(slot: &FailureSlot, failure: CastpodError) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(failure);
}

/// Pulls updates from Telegram into the update queue
pub struct Updater {
    bot: Bot,
    update_queue: UnboundedSender<QueueItem>,
    stop: Mutex<Option<CancellationToken>>,
    /// Cancelled once the polling or webhook task ended
    finished: Mutex<CancellationToken>,
    failure: FailureSlot,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    server: Mutex<Option<Handle>>,
    webhook_address: Mutex<Option<SocketAddr>>,
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("running", &self.is_running())
            .finish()
    }
}

impl Updater {
    pub fn new(bot: Bot, update_queue: UnboundedSender<QueueItem>) -> Self {
        Self {
            bot,
            update_queue,
            stop: Mutex::new(None),
            finished: Mutex::new(CancellationToken::new()),
            failure: Arc::new(Mutex::new(None)),
            task: tokio::sync::Mutex::new(None),
            server: Mutex::new(None),
            webhook_address: Mutex::new(None),
        }
    }

    /// Whether updates are being fetched. False once fetching ended on its
    /// own, even before [`stop`](Self::stop) is called.
    pub fn is_running(&self) -> bool {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
            && !self.finished_token().is_cancelled()
    }

    fn finished_token(&self) -> CancellationToken {
        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolves once the polling or webhook task has ended
    pub async fn fetching_ended(&self) {
        self.finished_token().cancelled().await
    }

    /// The error that ended fetching, if any
    pub fn take_failure(&self) -> Option<CastpodError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Address the webhook server is bound to
    pub fn webhook_address(&self) -> Option<SocketAddr> {
        *self
            .webhook_address
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the stop token and the token to cancel when fetching ends
    fn claim(&self) -> Result<(CancellationToken, CancellationToken)> {
        let mut stop = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
        if stop.is_some() {
            return Err(CastpodError::InvalidState(
                "This Updater is already running!".to_string(),
            ));
        }
        let token = CancellationToken::new();
        *stop = Some(token.clone());
        let finished = CancellationToken::new();
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner) = finished.clone();
        self.take_failure();
        Ok((token, finished))
    }

    fn release(&self) {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Removes any webhook and starts fetching updates with `getUpdates`
    pub async fn start_polling(&self, config: PollingConfig) -> Result<()> {
        let (cancel, finished) = self.claim()?;
        if let Err(e) = self
            .bot
            .delete_webhook(Some(config.drop_pending_updates))
            .await
        {
            self.release();
            return Err(e.into());
        }

        let poller = Poller {
            bot: self.bot.clone(),
            update_queue: self.update_queue.clone(),
            cancel,
            finished,
            failure: Arc::clone(&self.failure),
            config,
        };
        *self.task.lock().await = Some(tokio::spawn(poller.run()));
        info!("Updater started polling");
        Ok(())
    }

    /// Starts the webhook server and registers it with Telegram
    pub async fn start_webhook(&self, config: WebhookConfig) -> Result<()> {
        let (cancel, finished) = self.claim()?;
        match self.serve_webhook(&config, cancel, finished).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    async fn serve_webhook(
        &self,
        config: &WebhookConfig,
        cancel: CancellationToken,
        finished: CancellationToken,
    ) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", config.listen, config.port)
            .parse()
            .map_err(|e| CastpodError::Config(format!("Invalid webhook address: {}", e)))?;
        let state = WebhookState {
            bot: self.bot.clone(),
            update_queue: self.update_queue.clone(),
            secret_token: config.secret_token.clone(),
        };
        let app = webhook_router(&config.path(), state).into_make_service();
        let handle = Handle::new();

        let mut server = match (&config.cert, &config.key) {
            (Some(cert), Some(key)) => {
                let tls = RustlsConfig::from_pem_file(cert, key).await?;
                let server = axum_server::bind_rustls(addr, tls).handle(handle.clone());
                tokio::spawn(async move { server.serve(app).await })
            }
            _ => {
                let server = axum_server::bind(addr).handle(handle.clone());
                tokio::spawn(async move { server.serve(app).await })
            }
        };
        let Some(bound) = handle.listening().await else {
            return match server.await {
                Ok(Err(e)) => Err(e.into()),
                _ => Err(CastpodError::InvalidState(
                    "Webhook server failed to start".to_string(),
                )),
            };
        };
        *self
            .webhook_address
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(bound);
        *self.server.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
        info!(address = %bound, path = %config.path(), "Webhook server listening");

        let mut params = WebhookParams::new(config.public_url(bound.port()));
        // self-signed certificates have to be uploaded
        params.certificate = config.cert.clone().map(InputFile::Path);
        params.ip_address = config.ip_address.clone();
        params.max_connections = Some(config.max_connections);
        params.allowed_updates = config.allowed_updates.clone();
        params.drop_pending_updates = Some(config.drop_pending_updates);
        params.secret_token = config.secret_token.clone();
        if let Err(e) = self.bot.set_webhook(params).await {
            handle.shutdown();
            return Err(e.into());
        }

        let failure = Arc::clone(&self.failure);
        *self.task.lock().await = Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    handle.graceful_shutdown(Some(Duration::from_secs(5)));
                    match server.await {
                        Ok(Err(e)) => error!(error = %e, "Webhook server failed"),
                        Err(e) => error!(error = %e, "Webhook server task panicked"),
                        Ok(Ok(())) => debug!("Webhook server shut down"),
                    }
                }
                result = &mut server => {
                    let failure_reason = match result {
                        Ok(Err(e)) => CastpodError::from(e),
                        Err(e) => CastpodError::InvalidState(format!("Webhook server task panicked: {}", e)),
                        Ok(Ok(())) => CastpodError::InvalidState("Webhook server exited".to_string()),
                    };
                    error!(error = %failure_reason, "Webhook server ended unexpectedly");
                    record_failure(&failure, failure_reason);
                }
            }
            finished.cancel();
        }));
        Ok(())
    }

    /// Stops polling or the webhook server
    pub async fn stop(&self) -> Result<()> {
        let token = self
            .stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| CastpodError::InvalidState("This Updater is not running!".to_string()))?;
        info!("Stopping Updater");
        token.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Updater task panicked");
            }
        }
        self.server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.webhook_address
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        info!("Updater stopped");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        if self.is_running() {
            return Err(CastpodError::InvalidState(
                "This Updater is still running!".to_string(),
            ));
        }
        debug!("Updater shut down");
        Ok(())
    }
}

struct Poller {
    bot: Bot,
    update_queue: UnboundedSender<QueueItem>,
    cancel: CancellationToken,
    finished: CancellationToken,
    failure: FailureSlot,
    config: PollingConfig,
}

impl Poller {
    async fn run(self) {
        let mut offset: Option<i64> = None;
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);

        'poll: loop {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.bot.get_updates(
                    offset,
                    None,
                    Some(self.config.timeout),
                    self.config.allowed_updates.clone(),
                ) => result,
            };

            let delay = match result {
                Ok(updates) => {
                    backoff.reset();
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        if self.update_queue.send(QueueItem::Update(update.into())).is_err() {
                            warn!("Update queue closed, stopping polling");
                            break 'poll;
                        }
                    }
                    self.config.poll_interval
                }
                Err(TelegramError::RetryAfter { retry_after }) => {
                    warn!(retry_after = retry_after, "Flood control while polling");
                    Duration::from_secs(retry_after)
                }
                Err(e @ TelegramError::InvalidToken(_)) => {
                    error!(error = %e, "Invalid token, stopping polling");
                    record_failure(&self.failure, e.into());
                    break;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    if e.is_transient() {
                        warn!(error = %e, ?delay, "Network error while polling");
                    } else {
                        error!(error = %e, ?delay, "Error while polling");
                    }
                    delay
                }
            };

            if !delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        // confirm the last batch so it is not fetched again on restart
        if let Some(offset) = offset {
            if let Err(e) = self.bot.get_updates(Some(offset), Some(1), Some(0), None).await {
                debug!(error = %e, "Could not confirm the last update offset");
            }
        }
        self.finished.cancel();
        debug!("Polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(400));
        let delays: Vec<Duration> = (0..5).map(|_| backoff.next_delay()).collect();
        assert!(delays[0] >= Duration::from_millis(100) && delays[0] <= Duration::from_millis(125));
        assert!(delays[1] >= Duration::from_millis(200));
        assert!(delays[4] <= Duration::from_millis(500));
        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_millis(125));
    }

    #[test]
    fn test_public_url() {
        let config = WebhookConfig {
            listen: "0.0.0.0".into(),
            url_path: "hook".into(),
            ..WebhookConfig::default()
        };
        assert_eq!(config.path(), "/hook");
        assert_eq!(config.public_url(8443), "http://0.0.0.0:8443/hook");
        let config = WebhookConfig {
            webhook_url: Some("https://castpod.example/hook".into()),
            ..config
        };
        assert_eq!(config.public_url(8443), "https://castpod.example/hook");
    }
}
