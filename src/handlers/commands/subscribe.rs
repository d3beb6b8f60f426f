//! Subscribe conversation
//!
//! `/subscribe <url>` subscribes right away. A bare `/subscribe` asks for
//! the URL and waits for the next text message, `/cancel` leaves.

use std::sync::Arc;

use tracing::debug;

use crate::bot::MessageOptions;
use crate::ext::filters;
use crate::ext::{CallbackContext, CommandHandler, ConversationHandler, MessageHandler};
use crate::models::SubscriptionList;
use crate::types::{ParseMode, Update};
use crate::utils::errors::{CastpodError, Result};
use crate::utils::helpers::{escape_html, parse_feed_url};
use crate::utils::logging::{log_command, log_subscription_change};

use super::super::{reply, reply_with};

pub const WAITING_FOR_URL: i64 = 0;

/// Name under which conversation states are persisted
pub const CONVERSATION_NAME: &str = "subscribe";

pub fn conversation(max_subscriptions: usize) -> Result<ConversationHandler> {
    let entry = CommandHandler::new("subscribe", move |update, ctx| {
        handle_subscribe(update, ctx, max_subscriptions)
    })?;
    let receive_url = MessageHandler::new(filters::text() & !filters::command(), move |update, ctx| {
        handle_url(update, ctx, max_subscriptions)
    });
    let cancel = CommandHandler::new("cancel", handle_cancel)?;

    Ok(ConversationHandler::new(vec![Arc::new(entry)])
        .state(WAITING_FOR_URL, vec![Arc::new(receive_url)])
        .fallbacks(vec![Arc::new(cancel)])
        .allow_reentry(true)
        .persistent(CONVERSATION_NAME))
}

async fn handle_subscribe(update: Arc<Update>, ctx: CallbackContext, max: usize) -> Result<()> {
    log_command(ctx.user_id(), ctx.chat_id(), "subscribe");

    match ctx.args.first() {
        Some(url) => {
            subscribe(&update, &ctx, url, max).await?;
            ctx.end_conversation();
        }
        None => {
            reply(&update, &ctx, "请发送播客的 RSS 地址，或发送 /cancel 取消。").await?;
            ctx.set_next_state(WAITING_FOR_URL);
        }
    }
    Ok(())
}

async fn handle_url(update: Arc<Update>, ctx: CallbackContext, max: usize) -> Result<()> {
    let text = update
        .effective_message()
        .and_then(|message| message.text.clone())
        .unwrap_or_default();
    if subscribe(&update, &ctx, &text, max).await? {
        ctx.end_conversation();
    }
    Ok(())
}

async fn handle_cancel(update: Arc<Update>, ctx: CallbackContext) -> Result<()> {
    debug!(user_id = ?ctx.user_id(), "Subscription cancelled");
    reply(&update, &ctx, "已取消。").await?;
    ctx.end_conversation();
    Ok(())
}

/// Adds the feed to the user's subscriptions. `false` if the URL was
/// rejected and the user should try again.
async fn subscribe(update: &Update, ctx: &CallbackContext, raw_url: &str, max: usize) -> Result<bool> {
    let url = match parse_feed_url(raw_url) {
        Ok(url) => url,
        Err(_) => {
            reply(update, ctx, "这不是有效的 RSS 地址，请重新发送。").await?;
            return Ok(false);
        }
    };
    let user_data = ctx
        .user_data()
        .ok_or_else(|| CastpodError::InvalidInput("Subscriptions need a user".to_string()))?;

    let outcome = {
        let mut data = user_data.lock().await;
        let mut list = SubscriptionList::load(&data)?;
        let outcome = list.subscribe(url.as_str(), max);
        if let Ok(true) = outcome {
            list.store(&mut data)?;
        }
        outcome
    };

    let text = match outcome {
        Ok(true) => {
            if let Some(user_id) = ctx.user_id() {
                log_subscription_change(user_id, url.as_str(), true);
            }
            format!("已订阅 {}", escape_html(url.as_str()))
        }
        Ok(false) => format!("你已经订阅过 {}", escape_html(url.as_str())),
        Err(CastpodError::InvalidInput(_)) => {
            format!("最多只能订阅 {} 个播客，请先退订一些。", max)
        }
        Err(e) => return Err(e),
    };
    // the feed url is escaped, so this has to be sent as HTML
    reply_with(update, ctx, text, MessageOptions::new().parse_mode(ParseMode::Html)).await?;
    Ok(true)
}
