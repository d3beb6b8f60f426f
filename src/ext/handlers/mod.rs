//! Update handlers
//!
//! A handler decides whether it is interested in an update
//! ([`Handler::check_update`]) and, if the application picks it, runs its
//! callback ([`Handler::handle_update`]). Handlers are registered in numbered
//! groups; per group at most one handler runs for an update.

pub mod callback_query;
pub mod command;
pub mod conversation;
pub mod inline_query;
pub mod message;
pub mod type_handler;

pub use callback_query::CallbackQueryHandler;
pub use command::CommandHandler;
pub use conversation::{ConversationHandler, ConversationKey, ConversationStore, END};
pub use inline_query::InlineQueryHandler;
pub use message::MessageHandler;
pub use type_handler::TypeHandler;

use std::sync::Arc;

use async_trait::async_trait;
use regex::Captures;

use crate::bot::Bot;
use crate::types::{Message, Update};
use crate::utils::errors::Result;

use super::context::CallbackContext;

/// What a handler extracted from an update while checking it
#[derive(Debug, Clone)]
pub enum MatchData {
    Matched,
    Command { args: Vec<String> },
    Pattern { groups: Vec<Option<String>> },
    Conversation(Box<conversation::ConversationMatch>),
}

impl MatchData {
    pub(crate) fn from_captures(captures: &Captures<'_>) -> Self {
        MatchData::Pattern {
            groups: captures
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    /// `Some` if this handler wants to handle `update`
    fn check_update(&self, update: &Update, bot: &Bot) -> Option<MatchData>;

    async fn handle_update(
        &self,
        update: Arc<Update>,
        matched: MatchData,
        ctx: CallbackContext,
    ) -> Result<()>;

    /// Whether the application awaits this handler. `None` follows
    /// `Defaults::block`.
    fn block(&self) -> Option<bool> {
        None
    }

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Name and state store of a persistent conversation
    fn persistent_conversation(&self) -> Option<(String, ConversationStore)> {
        None
    }
}

/// New or edited message of any chat type
pub(crate) fn any_message(update: &Update) -> Option<&Message> {
    update
        .message
        .as_ref()
        .or(update.edited_message.as_ref())
        .or(update.channel_post.as_ref())
        .or(update.edited_channel_post.as_ref())
}
