use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::bot::Bot;
use crate::ext::context::CallbackContext;
use crate::ext::{handler_callback, HandlerCallback};
use crate::types::Update;
use crate::utils::errors::{CastpodError, Result};

use super::{Handler, MatchData};

/// Handles inline queries, optionally filtered by a pattern on the query
/// text and by the type of the originating chat
pub struct InlineQueryHandler {
    pattern: Option<Regex>,
    chat_types: Option<Vec<String>>,
    callback: HandlerCallback,
    block: Option<bool>,
}

impl InlineQueryHandler {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(Arc<Update>, CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            pattern: None,
            chat_types: None,
            callback: handler_callback(callback),
            block: None,
        }
    }

    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| CastpodError::InvalidInput(format!("Invalid pattern {}: {}", pattern, e)))?;
        self.pattern = Some(re);
        Ok(self)
    }

    pub fn chat_types(mut self, chat_types: &[&str]) -> Self {
        self.chat_types = Some(chat_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn block(mut self, block: bool) -> Self {
        self.block = Some(block);
        self
    }
}

#[async_trait]
impl Handler for InlineQueryHandler {
    fn check_update(&self, update: &Update, _bot: &Bot) -> Option<MatchData> {
        let query = update.inline_query.as_ref()?;
        if let Some(chat_types) = &self.chat_types {
            let chat_type = query.chat_type.as_ref()?;
            if !chat_types.contains(chat_type) {
                return None;
            }
        }
        match &self.pattern {
            None => Some(MatchData::Matched),
            Some(re) => re
                .captures(&query.query)
                .map(|caps| MatchData::from_captures(&caps)),
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
        "InlineQueryHandler"
    }
}
