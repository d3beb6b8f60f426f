use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::bot::Bot;
use crate::ext::context::CallbackContext;
use crate::ext::{handler_callback, HandlerCallback};
use crate::types::{CallbackPayload, Update};
use crate::utils::errors::{CastpodError, Result};

use super::{Handler, MatchData};

enum Pattern {
    Any,
    Regex(Regex),
    Predicate(Arc<dyn Fn(&CallbackPayload) -> bool + Send + Sync>),
}

/// Handles callback queries, optionally only those whose data matches a
/// pattern
pub struct CallbackQueryHandler {
    pattern: Pattern,
    callback: HandlerCallback,
    block: Option<bool>,
}

impl CallbackQueryHandler {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(Arc<Update>, CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            pattern: Pattern::Any,
            callback: handler_callback(callback),
            block: None,
        }
    }

    /// Only string data matching `pattern` from the start. Capture groups
    /// end up in `CallbackContext::matches`.
    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(&format!("^(?:{})", pattern))
            .map_err(|e| CastpodError::InvalidInput(format!("Invalid pattern {}: {}", pattern, e)))?;
        self.pattern = Pattern::Regex(re);
        Ok(self)
    }

    /// Only payloads accepted by `predicate`, useful for arbitrary data
    pub fn predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&CallbackPayload) -> bool + Send + Sync + 'static,
    {
        self.pattern = Pattern::Predicate(Arc::new(predicate));
        self
    }

    pub fn block(mut self, block: bool) -> Self {
        self.block = Some(block);
        self
    }
}

#[async_trait]
impl Handler for CallbackQueryHandler {
    fn check_update(&self, update: &Update, _bot: &Bot) -> Option<MatchData> {
        let query = update.callback_query.as_ref()?;
        match &self.pattern {
            Pattern::Any => Some(MatchData::Matched),
            Pattern::Regex(re) => {
                let text = query.data.as_ref()?.as_text()?;
                re.captures(text).map(|caps| MatchData::from_captures(&caps))
            }
            Pattern::Predicate(predicate) => {
                let data = query.data.as_ref()?;
                predicate(data).then_some(MatchData::Matched)
            }
        }
    }

    async fn handle_update(
        &self,
        update: Arc<Update>,
        matched: MatchData,
        ctx: CallbackContext,
    ) -> Result<()> {
        (self.callback)(update, ctx.with_match(&matched)).await
    }

    fn block(&self) -> Option<bool> {
        self.block
    }

    fn name(&self) -> &'static str {
        "CallbackQueryHandler"
    }
}
