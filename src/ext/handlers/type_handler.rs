use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bot::Bot;
use crate::ext::context::CallbackContext;
use crate::ext::{handler_callback, HandlerCallback};
use crate::types::Update;
use crate::utils::errors::Result;

use super::{Handler, MatchData};

type UpdatePredicate = Arc<dyn Fn(&Update) -> bool + Send + Sync>;

/// Handles every update accepted by a predicate
pub struct TypeHandler {
    predicate: UpdatePredicate,
    callback: HandlerCallback,
    block: Option<bool>,
}

impl TypeHandler {
    pub fn new<P, F, Fut>(predicate: P, callback: F) -> Self
    where
        P: Fn(&Update) -> bool + Send + Sync + 'static,
        F: Fn(Arc<Update>, CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            callback: handler_callback(callback),
            block: None,
        }
    }

    /// Handles all updates
    pub fn any<F, Fut>(callback: F) -> Self
    where
        F: Fn(Arc<Update>, CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(|_| true, callback)
    }

    pub fn block(mut self, block: bool) -> Self {
        self.block = Some(block);
        self
    }
}

#[async_trait]
impl Handler for TypeHandler {
    fn check_update(&self, update: &Update, _bot: &Bot) -> Option<MatchData> {
        (self.predicate)(update).then_some(MatchData::Matched)
    }

    async fn handle_update(
        &self,
        update: Arc<Update>,
        _matched: MatchData,
        ctx: CallbackContext,
    ) -> Result<()> {
        (self.callback)(update, ctx).await
    }

    fn block(&self) -> Option<bool> {
        self.block
    }

    fn name(&self) -> &'static str {
        "TypeHandler"
    }
}
