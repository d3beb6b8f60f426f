//! Context handed to handler, error and job callbacks

use std::sync::{Arc, Mutex};

use crate::bot::Bot;
use crate::types::{CallbackQuery, Update};
use crate::utils::errors::{CastpodError, Result};

use super::application::Application;
use super::handlers::{MatchData, END};
use super::job_queue::{Job, JobQueue};
use super::SharedData;

/// Everything a callback needs besides the update itself
#[derive(Clone)]
pub struct CallbackContext {
    application: Arc<Application>,
    chat_id: Option<i64>,
    user_id: Option<i64>,
    chat_data: Option<SharedData>,
    user_data: Option<SharedData>,
    /// Whitespace separated arguments of a command
    pub args: Vec<String>,
    /// Capture groups of a regex pattern, group 0 being the whole match
    pub matches: Vec<Option<String>>,
    /// Set for error callbacks
    pub error: Option<Arc<CastpodError>>,
    /// Set for job callbacks
    pub job: Option<Job>,
    next_state: Arc<Mutex<Option<i64>>>,
}

impl std::fmt::Debug for CallbackContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackContext")
            .field("chat_id", &self.chat_id)
            .field("user_id", &self.user_id)
            .field("args", &self.args)
            .field("error", &self.error)
            .finish()
    }
}

impl CallbackContext {
    fn with_ids(application: &Arc<Application>, chat_id: Option<i64>, user_id: Option<i64>) -> Self {
        Self {
            application: Arc::clone(application),
            chat_id,
            user_id,
            chat_data: chat_id.map(|id| application.chat_data(id)),
            user_data: user_id.map(|id| application.user_data(id)),
            args: Vec::new(),
            matches: Vec::new(),
            error: None,
            job: None,
            next_state: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn from_update(application: &Arc<Application>, update: Option<&Update>) -> Self {
        let chat_id = update.and_then(|u| u.effective_chat()).map(|chat| chat.id);
        let user_id = update.and_then(|u| u.effective_user()).map(|user| user.id);
        Self::with_ids(application, chat_id, user_id)
    }

    pub(crate) fn from_error(
        application: &Arc<Application>,
        update: Option<&Update>,
        error: Arc<CastpodError>,
        job: Option<Job>,
    ) -> Self {
        let mut ctx = match &job {
            Some(job) if update.is_none() => Self::with_ids(application, job.chat_id(), job.user_id()),
            _ => Self::from_update(application, update),
        };
        ctx.error = Some(error);
        ctx.job = job;
        ctx
    }

    pub(crate) fn from_job(application: &Arc<Application>, job: Job) -> Self {
        let mut ctx = Self::with_ids(application, job.chat_id(), job.user_id());
        ctx.job = Some(job);
        ctx
    }

    /// Copies the result of a handler's `check_update` into the context
    pub(crate) fn with_match(mut self, matched: &MatchData) -> Self {
        match matched {
            MatchData::Command { args } => self.args = args.clone(),
            MatchData::Pattern { groups } => self.matches = groups.clone(),
            MatchData::Matched | MatchData::Conversation(_) => {}
        }
        self
    }

    pub fn application(&self) -> &Arc<Application> {
        &self.application
    }

    pub fn bot(&self) -> &Bot {
        self.application.bot()
    }

    pub fn job_queue(&self) -> Option<&Arc<JobQueue>> {
        self.application.job_queue()
    }

    pub fn bot_data(&self) -> SharedData {
        self.application.bot_data()
    }

    /// Data of the effective chat, `None` for updates without a chat
    pub fn chat_data(&self) -> Option<SharedData> {
        self.chat_data.clone()
    }

    /// Data of the effective user, `None` for updates without a user
    pub fn user_data(&self) -> Option<SharedData> {
        self.user_data.clone()
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.chat_id
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    /// Capture group `index` of the matched pattern
    pub fn match_group(&self, index: usize) -> Option<&str> {
        self.matches.get(index).and_then(|group| group.as_deref())
    }

    /// Moves the surrounding conversation to `state`
    pub fn set_next_state(&self, state: i64) {
        if let Ok(mut slot) = self.next_state.lock() {
            *slot = Some(state);
        }
    }

    pub fn end_conversation(&self) {
        self.set_next_state(END);
    }

    pub(crate) fn take_next_state(&self) -> Option<i64> {
        self.next_state.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Forgets the cached payloads of the keyboard `query` belongs to
    pub fn drop_callback_data(&self, query: &CallbackQuery) -> Result<()> {
        match self.bot().callback_data_cache() {
            Some(cache) => cache.drop_data(query),
            None => Err(CastpodError::InvalidState(
                "arbitrary_callback_data is not enabled".to_string(),
            )),
        }
    }
}
