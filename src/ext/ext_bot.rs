//! [`Bot`] with optional arbitrary callback data

use std::ops::Deref;
use std::sync::Arc;

use super::callback_data_cache::CallbackDataCache;
use crate::bot::Bot;

/// Bot used by the [`Application`](super::Application).
///
/// With arbitrary callback data enabled, inline keyboards sent through this
/// bot may carry any JSON value as callback data and incoming updates get
/// those values back in place of the tokens Telegram saw.
#[derive(Debug, Clone)]
pub struct ExtBot {
    bot: Bot,
}

impl ExtBot {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Enables arbitrary callback data, keeping at most `maxsize` keyboards
    pub fn with_arbitrary_callback_data(bot: Bot, maxsize: u64) -> Self {
        let cache = Arc::new(CallbackDataCache::new(maxsize));
        Self {
            bot: bot.with_callback_data_cache(cache),
        }
    }

    pub fn arbitrary_callback_data(&self) -> bool {
        self.bot.callback_data_cache().is_some()
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

impl Deref for ExtBot {
    type Target = Bot;

    fn deref(&self) -> &Bot {
        &self.bot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Update, User};
    use serde_json::json;

    #[test]
    fn test_incoming_query_gets_payload_back() {
        let bot = ExtBot::with_arbitrary_callback_data(Bot::new("123:abc").unwrap(), 16);
        assert!(bot.arbitrary_callback_data());
        let markup = InlineKeyboardMarkup::from_column(vec![InlineKeyboardButton::callback(
            "Unsubscribe",
            json!({"feed": "https://a.b/rss"}),
        )]);
        let sent = bot.prepare_inline_markup(&markup).unwrap();
        let token = sent.buttons().next().unwrap().callback_data.clone().unwrap();

        let mut query = CallbackQuery::new("q", User::new(1, "Ann", false), "ci");
        query.data = Some(token);
        let mut update = Update::new(1);
        update.callback_query = Some(query);
        bot.insert_callback_data(&mut update);

        let data = update.callback_query.unwrap().data.unwrap();
        assert_eq!(data.as_arbitrary(), Some(&json!({"feed": "https://a.b/rss"})));
    }

    #[test]
    fn test_plain_bot_has_no_cache() {
        let bot = ExtBot::new(Bot::new("123:abc").unwrap());
        assert!(!bot.arbitrary_callback_data());
    }
}
