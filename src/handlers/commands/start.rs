//! Start command handler

use std::sync::Arc;

use tracing::debug;

use crate::ext::CallbackContext;
use crate::models::SubscriptionList;
use crate::types::Update;
use crate::utils::errors::Result;
use crate::utils::helpers::escape_html;
use crate::utils::logging::log_command;

use super::super::reply;

/// Handle /start command, greeting new and returning users
pub async fn handle_start(update: Arc<Update>, ctx: CallbackContext) -> Result<()> {
    log_command(ctx.user_id(), ctx.chat_id(), "start");

    let name = update
        .effective_user()
        .map(|user| escape_html(&user.first_name))
        .unwrap_or_else(|| "朋友".to_string());

    let subscriptions = match ctx.user_data() {
        Some(data) => SubscriptionList::load(&*data.lock().await)?.len(),
        None => 0,
    };
    debug!(user_id = ?ctx.user_id(), subscriptions, "Processing /start command");

    let text = if subscriptions == 0 {
        format!(
            "你好，{}！\n\nCastpod 帮你追踪喜欢的播客。发送 /subscribe 加上 RSS 地址即可订阅，/help 查看全部命令。",
            name
        )
    } else {
        format!(
            "欢迎回来，{}！你目前订阅了 {} 个播客，发送 /subscriptions 管理订阅。",
            name, subscriptions
        )
    };
    reply(&update, &ctx, text).await?;
    Ok(())
}
