use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bot::Bot;
use crate::ext::context::CallbackContext;
use crate::ext::filters::Filter;
use crate::ext::{handler_callback, HandlerCallback};
use crate::types::Update;
use crate::utils::errors::Result;

use super::{any_message, Handler, MatchData};

/// Handles new and edited messages and channel posts accepted by a filter
pub struct MessageHandler {
    filter: Filter,
    callback: HandlerCallback,
    block: Option<bool>,
}

impl MessageHandler {
    pub fn new<F, Fut>(filter: Filter, callback: F) -> Self
    where
        F: Fn(Arc<Update>, CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            filter,
            callback: handler_callback(callback),
            block: None,
        }
    }

    pub fn block(mut self, block: bool) -> Self {
        self.block = Some(block);
        self
    }
}

#[async_trait]
impl Handler for MessageHandler {
    fn check_update(&self, update: &Update, _bot: &Bot) -> Option<MatchData> {
        let message = any_message(update)?;
        self.filter.check(message).then_some(MatchData::Matched)
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
        "MessageHandler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::filters;
    use crate::types::{CallbackQuery, Chat, Message, User};
    use chrono::Utc;

    async fn noop(_: Arc<Update>, _: CallbackContext) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_channel_posts_and_callback_messages() {
        let bot = Bot::new("123:abc").unwrap();
        let handler = MessageHandler::new(filters::all(), noop);

        let mut update = Update::new(1);
        update.channel_post = Some(Message::new(1, Utc::now(), Chat::new(-100, "channel")));
        assert!(handler.check_update(&update, &bot).is_some());

        let mut query = CallbackQuery::new("q", User::new(1, "Ann", false), "ci");
        query.message = Some(Box::new(Message::new(1, Utc::now(), Chat::new(1, "private"))));
        let mut update = Update::new(2);
        update.callback_query = Some(query);
        assert!(handler.check_update(&update, &bot).is_none());
    }
}
