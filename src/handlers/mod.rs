//! Bot handlers module
//!
//! This module contains the handlers of the podcast bot organized by type:
//! - Command handlers for bot commands
//! - Callback handlers for inline keyboard interactions
//! - The error handler answering users and reporting to the developer chat

pub mod callbacks;
pub mod commands;
pub mod errors;

use std::sync::Arc;

use tracing::{info, warn};

use crate::bot::MessageOptions;
use crate::config::CastpodConfig;
use crate::ext::{Application, CallbackContext, CommandHandler};
use crate::middleware::{update_logging_handler, RateLimitMiddleware, LOGGING_GROUP, RATE_LIMIT_GROUP};
use crate::types::{BotCommand, Message, Update};
use crate::utils::errors::{CastpodError, Result};

/// Commands shown in the Telegram command menu
pub fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "开始使用"),
        BotCommand::new("help", "查看帮助"),
        BotCommand::new("subscribe", "订阅播客"),
        BotCommand::new("subscriptions", "管理订阅"),
        BotCommand::new("about", "关于 Castpod"),
    ]
}

/// Registers middleware, commands, callbacks and the error handler
pub fn register(app: &Application, config: &CastpodConfig) -> Result<()> {
    if !app.ext_bot().arbitrary_callback_data() {
        return Err(CastpodError::Config(
            "The Castpod handlers need arbitrary callback data".to_string(),
        ));
    }

    let exempt = config.developer_chat_id.into_iter().collect();
    let limiter = Arc::new(RateLimitMiddleware::new(config.rate_limit_per_minute, exempt)?);
    app.add_handler(update_logging_handler(), LOGGING_GROUP);
    match app.job_queue() {
        Some(job_queue) => {
            limiter.schedule_cleanup(job_queue)?;
        }
        None => warn!("No job queue, the rate limiter never forgets idle users"),
    }
    app.add_handler(limiter.handler(), RATE_LIMIT_GROUP);

    app.add_handler(CommandHandler::new("start", commands::start::handle_start)?, 0);
    app.add_handler(CommandHandler::new("help", commands::help::handle_help)?, 0);
    app.add_handler(CommandHandler::new("about", commands::help::handle_about)?, 0);
    app.add_handler(commands::subscribe::conversation(config.max_subscriptions)?, 0);
    app.add_handler(
        CommandHandler::new("subscriptions", commands::subscriptions::handle_subscriptions)?,
        0,
    );
    app.add_handler(callbacks::unsubscribe::handler(), 0);

    let developer_chat_id = config.developer_chat_id;
    app.add_error_handler(
        move |update, ctx| errors::handle_error(update, ctx, developer_chat_id),
        true,
    );

    info!(
        rate_limit_per_minute = config.rate_limit_per_minute,
        developer_chat = developer_chat_id.is_some(),
        "Castpod handlers registered"
    );
    Ok(())
}

/// Publishes the command menu, run as `post_init` hook
pub async fn post_init(app: Arc<Application>) -> Result<()> {
    app.bot().set_my_commands(bot_commands(), None, None).await?;
    info!(username = ?app.bot().username(), "Bot commands published");
    Ok(())
}

/// Sends `text` to the chat the update came from
pub(crate) async fn reply(update: &Update, ctx: &CallbackContext, text: impl Into<String>) -> Result<Message> {
    reply_with(update, ctx, text, MessageOptions::new()).await
}

pub(crate) async fn reply_with(
    update: &Update,
    ctx: &CallbackContext,
    text: impl Into<String>,
    options: MessageOptions,
) -> Result<Message> {
    let chat_id = update
        .effective_chat()
        .map(|chat| chat.id)
        .ok_or_else(|| CastpodError::InvalidInput("Update has no chat".to_string()))?;
    Ok(ctx.bot().send_message(chat_id, text, options).await?)
}
