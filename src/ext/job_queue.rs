//! Scheduled callbacks
//!
//! Every job runs on its own tokio task. Tasks wait until the queue is
//! started, run their callback at the scheduled times and exit when the job
//! is removed or the queue stops. Errors of job callbacks go through the
//! application's error handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::utils::errors::{CastpodError, Result};

use super::application::{catch_panic, Application};
use super::context::CallbackContext;
use super::{job_callback, JobCallback};

/// Optional attributes of a new job
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub name: Option<String>,
    pub data: Option<Value>,
    pub chat_id: Option<i64>,
    pub user_id: Option<i64>,
}

impl JobOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn for_chat(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

struct JobInner {
    id: Uuid,
    name: String,
    callback: JobCallback,
    data: Option<Value>,
    chat_id: Option<i64>,
    user_id: Option<i64>,
    interval: Option<Duration>,
    enabled: AtomicBool,
    removed: CancellationToken,
    next_t: Mutex<Option<DateTime<Utc>>>,
}

/// Handle to a scheduled callback. Cheap to clone.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.inner.name)
            .field("interval", &self.inner.interval)
            .field("removed", &self.removed())
            .finish()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Job {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn data(&self) -> Option<&Value> {
        self.inner.data.as_ref()
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.inner.chat_id
    }

    pub fn user_id(&self) -> Option<i64> {
        self.inner.user_id
    }

    pub fn interval(&self) -> Option<Duration> {
        self.inner.interval
    }

    /// Next scheduled run, `None` once the job is done
    pub fn next_t(&self) -> Option<DateTime<Utc>> {
        *self
            .inner
            .next_t
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_next_t(&self, next_t: Option<DateTime<Utc>>) {
        *self
            .inner
            .next_t
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = next_t;
    }

    pub fn enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Disabled jobs keep their schedule but skip their runs
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Removes the job before its next run
    pub fn schedule_removal(&self) {
        self.inner.removed.cancel();
    }

    pub fn removed(&self) -> bool {
        self.inner.removed.is_cancelled()
    }
}

pub struct JobQueue {
    application: OnceLock<Weak<Application>>,
    jobs: Mutex<Vec<Job>>,
    running: watch::Sender<bool>,
    shutdown: Mutex<CancellationToken>,
    tracker: TaskTracker,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("jobs", &self.jobs().len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        let (running, _) = watch::channel(false);
        Self {
            application: OnceLock::new(),
            jobs: Mutex::new(Vec::new()),
            running,
            shutdown: Mutex::new(CancellationToken::new()),
            tracker: TaskTracker::new(),
        }
    }

    pub(crate) fn set_application(&self, application: Weak<Application>) {
        if self.application.set(application).is_err() {
            warn!("JobQueue is already bound to an application");
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Runs `callback` once after `delay`
    pub fn run_once<F, Fut>(&self, callback: F, delay: Duration, options: JobOptions) -> Job
    where
        F: Fn(CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.schedule(job_callback(callback), delay, None, options)
    }

    /// Runs `callback` every `interval`, the first time after `first` (or
    /// after one interval)
    pub fn run_repeating<F, Fut>(
        &self,
        callback: F,
        interval: Duration,
        first: Option<Duration>,
        options: JobOptions,
    ) -> Result<Job>
    where
        F: Fn(CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(CastpodError::InvalidInput(
                "The interval of a repeating job must be positive".to_string(),
            ));
        }
        Ok(self.schedule(
            job_callback(callback),
            first.unwrap_or(interval),
            Some(interval),
            options,
        ))
    }

    /// Jobs that are scheduled and not removed
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|job| !job.removed())
            .cloned()
            .collect()
    }

    pub fn get_jobs_by_name(&self, name: &str) -> Vec<Job> {
        self.jobs()
            .into_iter()
            .filter(|job| job.name() == name)
            .collect()
    }

    /// Lets job tasks fire
    pub fn start(&self) {
        if self.is_running() {
            debug!("JobQueue already running");
            return;
        }
        self.running.send_replace(true);
        info!(jobs = self.jobs().len(), "JobQueue started");
    }

    /// Cancels all job tasks and waits for running callbacks to finish
    pub async fn stop(&self) {
        if !self.is_running() {
            return;
        }
        self.running.send_replace(false);
        let token = {
            let mut shutdown = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *shutdown, CancellationToken::new())
        };
        token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("JobQueue stopped");
    }

    fn schedule(
        &self,
        callback: JobCallback,
        delay: Duration,
        interval: Option<Duration>,
        options: JobOptions,
    ) -> Job {
        let id = Uuid::new_v4();
        let job = Job {
            inner: Arc::new(JobInner {
                id,
                name: options.name.unwrap_or_else(|| format!("job-{}", id.simple())),
                callback,
                data: options.data,
                chat_id: options.chat_id,
                user_id: options.user_id,
                interval,
                enabled: AtomicBool::new(true),
                removed: CancellationToken::new(),
                next_t: Mutex::new(None),
            }),
        };
        job.set_next_t(chrono::Duration::from_std(delay).ok().map(|d| Utc::now() + d));
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job.clone());

        let shutdown = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let running = self.running.subscribe();
        let application = self.application.get().cloned();
        let task_job = job.clone();
        self.tracker.spawn(async move {
            run_job(task_job, delay, running, shutdown, application).await;
        });
        debug!(job = %job.name(), ?delay, ?interval, "Job scheduled");
        job
    }

    fn forget(&self, job: &Job) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|other| other != job);
    }
}

async fn run_job(
    job: Job,
    delay: Duration,
    mut running: watch::Receiver<bool>,
    shutdown: CancellationToken,
    application: Option<Weak<Application>>,
) {
    let mut due = Instant::now() + delay;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = job.inner.removed.cancelled() => break,
            _ = tokio::time::sleep_until(due) => {}
        }
        // jobs only fire while the queue runs
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = job.inner.removed.cancelled() => break,
            ready = running.wait_for(|running| *running) => {
                if ready.is_err() {
                    break;
                }
            }
        }

        let Some(app) = application.as_ref().and_then(Weak::upgrade) else {
            warn!(job = %job.name(), "Application is gone, dropping job");
            break;
        };
        if job.enabled() {
            let ctx = CallbackContext::from_job(&app, job.clone());
            debug!(job = %job.name(), "Running job");
            if let Err(e) = catch_panic((job.inner.callback)(ctx)).await {
                app.process_error(None, e, Some(job.clone())).await;
            }
            app.mark_data_for_update_persistence(job.chat_id(), job.user_id());
        }

        match job.inner.interval {
            Some(interval) => {
                due += interval;
                job.set_next_t(chrono::Duration::from_std(interval).ok().map(|d| Utc::now() + d));
            }
            None => break,
        }
    }
    job.set_next_t(None);
    if let Some(queue) = application
        .as_ref()
        .and_then(Weak::upgrade)
        .and_then(|app| app.job_queue().cloned())
    {
        queue.forget(&job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_: CallbackContext) -> Result<()> {
        Ok(())
    }

    #[tokio::test]
    async fn test_jobs_by_name_and_removal() {
        let queue = JobQueue::new();
        let job = queue.run_once(noop, Duration::from_secs(60), JobOptions::named("refresh"));
        queue
            .run_repeating(noop, Duration::from_secs(60), None, JobOptions::named("other"))
            .unwrap();

        assert_eq!(queue.get_jobs_by_name("refresh"), vec![job.clone()]);
        assert_eq!(queue.jobs().len(), 2);
        assert!(job.next_t().is_some());

        job.schedule_removal();
        assert!(job.removed());
        assert!(queue.get_jobs_by_name("refresh").is_empty());
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let queue = JobQueue::new();
        assert!(queue
            .run_repeating(noop, Duration::ZERO, None, JobOptions::default())
            .is_err());
    }

    #[tokio::test]
    async fn test_stop_clears_jobs() {
        let queue = JobQueue::new();
        queue.start();
        queue.run_once(noop, Duration::from_secs(60), JobOptions::default());
        queue.stop().await;
        assert!(queue.jobs().is_empty());
        assert!(!queue.is_running());
    }
}
