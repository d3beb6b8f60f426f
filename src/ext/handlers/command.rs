//! `/command` handler

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::bot::Bot;
use crate::ext::context::CallbackContext;
use crate::ext::filters::Filter;
use crate::ext::{handler_callback, HandlerCallback};
use crate::types::Update;
use crate::utils::errors::{CastpodError, Result};

use super::{Handler, MatchData};

/// Handles messages starting with one of its commands. `/cmd@name` only
/// matches when `name` is this bot's username.
pub struct CommandHandler {
    commands: Vec<String>,
    callback: HandlerCallback,
    filter: Option<Filter>,
    block: Option<bool>,
}

impl CommandHandler {
    /// Commands are matched case-insensitively and must be 1-32 characters
    /// of `a-z`, digits and `_`
    pub fn new<F, Fut>(command: &str, callback: F) -> Result<Self>
    where
        F: Fn(Arc<Update>, CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::with_commands(&[command], callback)
    }

    pub fn with_commands<F, Fut>(commands: &[&str], callback: F) -> Result<Self>
    where
        F: Fn(Arc<Update>, CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let valid = Regex::new(r"^[\da-z_]{1,32}$")
            .map_err(|e| CastpodError::InvalidInput(e.to_string()))?;
        let commands: Vec<String> = commands.iter().map(|c| c.to_lowercase()).collect();
        if let Some(invalid) = commands.iter().find(|c| !valid.is_match(c)) {
            return Err(CastpodError::InvalidInput(format!(
                "Command `{}` is not a valid bot command",
                invalid
            )));
        }
        Ok(Self {
            commands,
            callback: handler_callback(callback),
            filter: None,
            block: None,
        })
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn block(mut self, block: bool) -> Self {
        self.block = Some(block);
        self
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}

#[async_trait]
impl Handler for CommandHandler {
    fn check_update(&self, update: &Update, bot: &Bot) -> Option<MatchData> {
        let message = update.message.as_ref().or(update.edited_message.as_ref())?;
        let command = message.parse_command()?;
        if !self.commands.iter().any(|c| c.eq_ignore_ascii_case(command.name)) {
            return None;
        }
        if let Some(target) = command.bot_username {
            let ours = bot.username()?;
            if !target.eq_ignore_ascii_case(&ours) {
                return None;
            }
        }
        if let Some(filter) = &self.filter {
            if !filter.check(message) {
                return None;
            }
        }
        Some(MatchData::Command {
            args: command.args.iter().map(|arg| arg.to_string()).collect(),
        })
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
        "CommandHandler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::filters;
    use crate::types::{Chat, Message, User};
    use assert_matches::assert_matches;
    use chrono::Utc;

    async fn noop(_: Arc<Update>, _: CallbackContext) -> Result<()> {
        Ok(())
    }

    fn update(text: &str) -> Update {
        let mut message = Message::new(5, Utc::now(), Chat::new(42, "private"));
        message.text = Some(text.to_string());
        Update::with_message(1, message)
    }

    fn bot() -> Bot {
        let bot = Bot::new("123:abc").unwrap();
        let mut me = User::new(123, "Castpod", true);
        me.username = Some("CastpodBot".to_string());
        bot.set_me(me);
        bot
    }

    #[test]
    fn test_invalid_command_rejected() {
        assert!(CommandHandler::new("sub scribe", noop).is_err());
        assert!(CommandHandler::new("", noop).is_err());
        assert!(CommandHandler::new("Start", noop).is_ok());
    }

    #[test]
    fn test_matches_command_and_args() {
        let handler = CommandHandler::new("subscribe", noop).unwrap();
        let matched = handler.check_update(&update("/subscribe https://a.b/feed  x"), &bot());
        assert_matches!(matched, Some(MatchData::Command { args }) if args == vec!["https://a.b/feed", "x"]);
        assert!(handler.check_update(&update("/start"), &bot()).is_none());
        assert!(handler.check_update(&update("subscribe"), &bot()).is_none());
    }

    #[test]
    fn test_bot_username_suffix() {
        let handler = CommandHandler::new("start", noop).unwrap();
        assert!(handler.check_update(&update("/start@castpodbot"), &bot()).is_some());
        assert!(handler.check_update(&update("/start@OtherBot"), &bot()).is_none());
    }

    #[test]
    fn test_filter_applies() {
        let handler = CommandHandler::new("start", noop)
            .unwrap()
            .filter(filters::group());
        assert!(handler.check_update(&update("/start"), &bot()).is_none());
    }
}
