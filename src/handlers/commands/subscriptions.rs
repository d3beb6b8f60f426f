//! Subscription list with unsubscribe buttons

use std::sync::Arc;

use crate::bot::MessageOptions;
use crate::ext::CallbackContext;
use crate::models::subscription::unsubscribe_payload;
use crate::models::SubscriptionList;
use crate::types::{InlineKeyboardButton, InlineKeyboardMarkup, Update};
use crate::utils::errors::Result;
use crate::utils::helpers::truncate_text;
use crate::utils::logging::log_command;

use super::super::{reply, reply_with};

/// Keyboard with one unsubscribe button per feed. The buttons carry the
/// feed URL as arbitrary callback data.
pub fn subscriptions_keyboard(list: &SubscriptionList) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::from_column(
        list.iter()
            .map(|subscription| {
                InlineKeyboardButton::callback(
                    format!("退订 {}", truncate_text(&subscription.feed_url, 48)),
                    unsubscribe_payload(&subscription.feed_url),
                )
            })
            .collect(),
    )
}

/// Handle /subscriptions command
pub async fn handle_subscriptions(update: Arc<Update>, ctx: CallbackContext) -> Result<()> {
    log_command(ctx.user_id(), ctx.chat_id(), "subscriptions");

    let list = match ctx.user_data() {
        Some(data) => SubscriptionList::load(&*data.lock().await)?,
        None => SubscriptionList::default(),
    };
    if list.is_empty() {
        reply(&update, &ctx, "你还没有订阅任何播客，发送 /subscribe 开始订阅。").await?;
        return Ok(());
    }

    let text = format!("你订阅了 {} 个播客，点击按钮退订：", list.len());
    reply_with(
        &update,
        &ctx,
        text,
        MessageOptions::with_markup(subscriptions_keyboard(&list)),
    )
    .await?;
    Ok(())
}
