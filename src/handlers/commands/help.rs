//! Help and about commands

use std::sync::Arc;

use crate::ext::CallbackContext;
use crate::types::Update;
use crate::utils::errors::Result;
use crate::utils::logging::log_command;

use super::super::{bot_commands, reply};

/// Handle /help command
pub async fn handle_help(update: Arc<Update>, ctx: CallbackContext) -> Result<()> {
    log_command(ctx.user_id(), ctx.chat_id(), "help");

    let mut text = String::from("可用命令：\n");
    for command in bot_commands() {
        text.push_str(&format!("/{} - {}\n", command.command, command.description));
    }
    text.push_str("\n订阅时可以直接发送 /subscribe <RSS 地址>，也可以先发送 /subscribe 再发地址。");
    reply(&update, &ctx, text).await?;
    Ok(())
}

pub async fn handle_about(update: Arc<Update>, ctx: CallbackContext) -> Result<()> {
    log_command(ctx.user_id(), ctx.chat_id(), "about");

    let text = format!(
        "{} v{}\n一个简单的播客订阅机器人。",
        crate::NAME,
        crate::VERSION
    );
    reply(&update, &ctx, text).await?;
    Ok(())
}
