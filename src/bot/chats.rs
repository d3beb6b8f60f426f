//! Chat management, bot commands and menu buttons

use crate::request::RequestData;
use crate::types::{BotCommand, BotCommandScope, Chat, ChatId, ChatMember, ChatPermissions, MenuButton};
use crate::utils::errors::TelegramResult;

use super::defaults::TimeInput;
use super::Bot;

impl Bot {
    pub async fn get_chat(&self, chat_id: impl Into<ChatId>) -> TelegramResult<Chat> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        self.call("getChat", &data).await
    }

    pub async fn get_chat_member(
        &self,
        chat_id: impl Into<ChatId>,
        user_id: i64,
    ) -> TelegramResult<ChatMember> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("user_id", user_id)?;
        self.call("getChatMember", &data).await
    }

    pub async fn get_chat_administrators(
        &self,
        chat_id: impl Into<ChatId>,
    ) -> TelegramResult<Vec<ChatMember>> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        self.call("getChatAdministrators", &data).await
    }

    pub async fn get_chat_member_count(&self, chat_id: impl Into<ChatId>) -> TelegramResult<i64> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        self.call("getChatMemberCount", &data).await
    }

    /// Bans a user. `until_date` naive values are read in the configured offset.
    pub async fn ban_chat_member(
        &self,
        chat_id: impl Into<ChatId>,
        user_id: i64,
        until_date: Option<TimeInput>,
        revoke_messages: Option<bool>,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("user_id", user_id)?;
        data.insert("until_date", until_date.map(|t| self.timestamp(t)))?;
        data.insert("revoke_messages", revoke_messages)?;
        self.call("banChatMember", &data).await
    }

    pub async fn unban_chat_member(
        &self,
        chat_id: impl Into<ChatId>,
        user_id: i64,
        only_if_banned: Option<bool>,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("user_id", user_id)?;
        data.insert("only_if_banned", only_if_banned)?;
        self.call("unbanChatMember", &data).await
    }

    pub async fn restrict_chat_member(
        &self,
        chat_id: impl Into<ChatId>,
        user_id: i64,
        permissions: ChatPermissions,
        until_date: Option<TimeInput>,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("user_id", user_id)?;
        data.insert("permissions", permissions)?;
        data.insert("until_date", until_date.map(|t| self.timestamp(t)))?;
        self.call("restrictChatMember", &data).await
    }

    pub async fn leave_chat(&self, chat_id: impl Into<ChatId>) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        self.call("leaveChat", &data).await
    }

    pub async fn pin_chat_message(
        &self,
        chat_id: impl Into<ChatId>,
        message_id: i64,
        disable_notification: Option<bool>,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("message_id", message_id)?;
        data.insert(
            "disable_notification",
            disable_notification.or(self.defaults().and_then(|d| d.disable_notification)),
        )?;
        self.call("pinChatMessage", &data).await
    }

    /// Unpins `message_id`, or the most recent pinned message
    pub async fn unpin_chat_message(
        &self,
        chat_id: impl Into<ChatId>,
        message_id: Option<i64>,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id.into())?;
        data.insert("message_id", message_id)?;
        self.call("unpinChatMessage", &data).await
    }

    pub async fn set_my_commands(
        &self,
        commands: Vec<BotCommand>,
        scope: Option<BotCommandScope>,
        language_code: Option<String>,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("commands", commands)?;
        data.insert("scope", scope)?;
        data.insert("language_code", language_code)?;
        self.call("setMyCommands", &data).await
    }

    pub async fn get_my_commands(
        &self,
        scope: Option<BotCommandScope>,
        language_code: Option<String>,
    ) -> TelegramResult<Vec<BotCommand>> {
        let mut data = RequestData::new();
        data.insert("scope", scope)?;
        data.insert("language_code", language_code)?;
        self.call("getMyCommands", &data).await
    }

    pub async fn delete_my_commands(
        &self,
        scope: Option<BotCommandScope>,
        language_code: Option<String>,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("scope", scope)?;
        data.insert("language_code", language_code)?;
        self.call("deleteMyCommands", &data).await
    }

    /// Sets the menu button of a private chat, or the default one
    pub async fn set_chat_menu_button(
        &self,
        chat_id: Option<i64>,
        menu_button: Option<MenuButton>,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id)?;
        data.insert("menu_button", menu_button)?;
        self.call("setChatMenuButton", &data).await
    }

    pub async fn get_chat_menu_button(&self, chat_id: Option<i64>) -> TelegramResult<MenuButton> {
        let mut data = RequestData::new();
        data.insert("chat_id", chat_id)?;
        self.call("getChatMenuButton", &data).await
    }
}
