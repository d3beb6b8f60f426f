//! Logging middleware
//!
//! Logs every incoming update before any other handler sees it.

use std::sync::Arc;

use tracing::{debug, info};

use crate::ext::handlers::TypeHandler;
use crate::types::Update;
use crate::utils::errors::CastpodError;

/// Handler group of the update logger
pub const LOGGING_GROUP: i32 = -2;

/// Log incoming update
pub fn log_update(update: &Update) {
    let user_id = update.effective_user().map(|user| user.id);
    let chat_id = update.effective_chat().map(|chat| chat.id);

    if let Some(message) = &update.message {
        info!(
            update_id = update.update_id,
            user_id = user_id,
            chat_id = chat_id,
            text = message.text.as_deref().unwrap_or(""),
            "Message received"
        );
    } else if let Some(query) = &update.callback_query {
        info!(
            update_id = update.update_id,
            user_id = query.from.id,
            arbitrary = query.data.as_ref().map_or(false, |d| d.as_arbitrary().is_some()),
            "Callback query received"
        );
    } else {
        debug!(update_id = update.update_id, user_id = user_id, chat_id = chat_id, "Other update received");
    }
}

pub fn update_logging_handler() -> TypeHandler {
    TypeHandler::any(|update: Arc<Update>, _ctx| async move {
        log_update(&update);
        Ok::<(), CastpodError>(())
    })
    .block(true)
}
