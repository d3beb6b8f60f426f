//! Error handler of the bot
//!
//! Tells the affected chat that something went wrong and sends the details
//! to the developer chat, if one is configured.

use std::sync::Arc;

use tracing::error;

use crate::bot::MessageOptions;
use crate::ext::CallbackContext;
use crate::types::{ParseMode, Update};
use crate::utils::errors::Result;
use crate::utils::helpers::{escape_html, truncate_text};

/// Message shown to users when a handler failed
pub const ERROR_MESSAGE: &str = "出错了，请稍后再试。";

const MAX_REPORT_LENGTH: usize = 3500;

pub async fn handle_error(
    update: Option<Arc<Update>>,
    ctx: CallbackContext,
    developer_chat_id: Option<i64>,
) -> Result<()> {
    let description = ctx
        .error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    let severity = ctx.error.as_ref().map(|e| e.severity());
    let recoverable = ctx.error.as_ref().is_some_and(|e| e.is_recoverable());
    error!(
        error = %description,
        severity = ?severity,
        recoverable,
        update_id = ?update.as_ref().map(|u| u.update_id),
        job = ?ctx.job.as_ref().map(|job| job.name().to_string()),
        "Handler failed"
    );

    let chat_id = update
        .as_ref()
        .and_then(|u| u.effective_chat())
        .map(|chat| chat.id);
    if let Some(chat_id) = chat_id {
        if Some(chat_id) != developer_chat_id {
            ctx.bot()
                .send_message(chat_id, ERROR_MESSAGE, MessageOptions::new())
                .await?;
        }
    }

    if let Some(developer_chat_id) = developer_chat_id {
        let update_json = match &update {
            Some(update) => serde_json::to_string_pretty(update.as_ref())?,
            None => "null".to_string(),
        };
        let report = format!(
            "<b>Castpod error</b>\n<pre>{}</pre>\n<b>update</b>\n<pre>{}</pre>",
            escape_html(&description),
            escape_html(&truncate_text(&update_json, MAX_REPORT_LENGTH)),
        );
        ctx.bot()
            .send_message(
                developer_chat_id,
                report,
                MessageOptions::new().parse_mode(ParseMode::Html),
            )
            .await?;
    }
    Ok(())
}
