//! Unsubscribe button presses

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bot::{MessageOptions, MessageTarget};
use crate::ext::{CallbackContext, CallbackQueryHandler};
use crate::handlers::commands::subscriptions::subscriptions_keyboard;
use crate::models::subscription::parse_unsubscribe_payload;
use crate::models::SubscriptionList;
use crate::types::{CallbackPayload, Update};
use crate::utils::errors::{CastpodError, Result};
use crate::utils::helpers::escape_html;
use crate::utils::logging::log_subscription_change;

/// Matches unsubscribe payloads and buttons whose payload expired
pub fn handler() -> CallbackQueryHandler {
    CallbackQueryHandler::new(handle_unsubscribe).predicate(|payload| match payload {
        CallbackPayload::Arbitrary(value) => parse_unsubscribe_payload(value).is_some(),
        CallbackPayload::Invalid(_) => true,
        CallbackPayload::Text(_) => false,
    })
}

pub async fn handle_unsubscribe(update: Arc<Update>, ctx: CallbackContext) -> Result<()> {
    let query = update
        .callback_query
        .as_ref()
        .ok_or_else(|| CastpodError::InvalidInput("No callback query in update".to_string()))?;

    let feed_url = match query.data.as_ref() {
        Some(CallbackPayload::Arbitrary(value)) => parse_unsubscribe_payload(value).map(str::to_string),
        _ => None,
    };
    let Some(feed_url) = feed_url else {
        warn!(user_id = query.from.id, "Unsubscribe button expired");
        ctx.bot()
            .answer_callback_query(&query.id, Some("按钮已过期，请重新发送 /subscriptions。"), Some(true), None, None)
            .await?;
        return Ok(());
    };

    let user_data = ctx
        .user_data()
        .ok_or_else(|| CastpodError::InvalidInput("Unsubscribe needs a user".to_string()))?;
    let (removed, list) = {
        let mut data = user_data.lock().await;
        let mut list = SubscriptionList::load(&data)?;
        let removed = list.unsubscribe(&feed_url);
        if removed {
            list.store(&mut data)?;
        }
        (removed, list)
    };
    debug!(user_id = query.from.id, feed_url = %feed_url, removed, "Unsubscribe pressed");
    if removed {
        log_subscription_change(query.from.id, &feed_url, false);
    }

    // the old keyboard is replaced, its payloads are no longer needed
    ctx.drop_callback_data(query)?;
    ctx.bot()
        .answer_callback_query(&query.id, Some("已退订"), None, None, None)
        .await?;

    if let Some(message) = &query.message {
        let target = MessageTarget::chat(message.chat.id, message.message_id);
        if list.is_empty() {
            ctx.bot()
                .edit_message_text(target, "你已退订全部播客。", MessageOptions::new())
                .await?;
        } else {
            let text = format!(
                "已退订 {}\n你还订阅了 {} 个播客：",
                escape_html(&feed_url),
                list.len()
            );
            ctx.bot()
                .edit_message_text(
                    target,
                    text,
                    MessageOptions::with_markup(subscriptions_keyboard(&list)),
                )
                .await?;
        }
    }
    Ok(())
}
