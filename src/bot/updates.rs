//! Bot identity, update retrieval, webhooks, query answers and files

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::request::{RequestData, RequestTimeouts};
use crate::types::{
    File, InlineQueryResult, ShippingOption, Update, User, WebhookInfo,
};
use crate::utils::errors::{TelegramError, TelegramResult};

use super::params::WebhookParams;
use super::Bot;

impl Bot {
    /// Calls `getMe` and caches the result
    pub async fn get_me(&self) -> TelegramResult<User> {
        let me: User = self.call("getMe", &RequestData::new()).await?;
        self.set_me(me.clone());
        Ok(me)
    }

    pub async fn log_out(&self) -> TelegramResult<bool> {
        self.call("logOut", &RequestData::new()).await
    }

    pub async fn close(&self) -> TelegramResult<bool> {
        self.call("close", &RequestData::new()).await
    }

    /// Long-polls for updates. The read timeout is extended by `timeout`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        limit: Option<i64>,
        timeout: Option<u64>,
        allowed_updates: Option<Vec<String>>,
    ) -> TelegramResult<Vec<Update>> {
        let mut data = RequestData::new();
        data.insert("offset", offset)?;
        data.insert("limit", limit)?;
        data.insert("timeout", timeout)?;
        data.insert("allowed_updates", allowed_updates)?;

        let timeouts = RequestTimeouts::default()
            .with_extra_read(Duration::from_secs(timeout.unwrap_or(0)));
        let mut updates: Vec<Update> = self
            .call_with_timeouts("getUpdates", &data, Some(timeouts))
            .await?;

        if !updates.is_empty() {
            debug!(count = updates.len(), "Getting updates");
        }
        for update in &mut updates {
            self.insert_callback_data(update);
        }
        Ok(updates)
    }

    pub async fn set_webhook(&self, params: WebhookParams) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("url", params.url)?;
        if let Some(certificate) = params.certificate {
            data.insert_file("certificate", certificate);
        }
        data.insert("ip_address", params.ip_address)?;
        data.insert("max_connections", params.max_connections)?;
        data.insert("allowed_updates", params.allowed_updates)?;
        data.insert("drop_pending_updates", params.drop_pending_updates)?;
        data.insert("secret_token", params.secret_token)?;
        self.call("setWebhook", &data).await
    }

    pub async fn delete_webhook(&self, drop_pending_updates: Option<bool>) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("drop_pending_updates", drop_pending_updates)?;
        self.call("deleteWebhook", &data).await
    }

    pub async fn get_webhook_info(&self) -> TelegramResult<WebhookInfo> {
        self.call("getWebhookInfo", &RequestData::new()).await
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: Option<bool>,
        url: Option<&str>,
        cache_time: Option<i64>,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("callback_query_id", callback_query_id)?;
        data.insert("text", text)?;
        data.insert("show_alert", show_alert)?;
        data.insert("url", url)?;
        data.insert("cache_time", cache_time)?;
        self.call("answerCallbackQuery", &data).await
    }

    /// Answers an inline query. Text contents pick up the default parse mode.
    pub async fn answer_inline_query(
        &self,
        inline_query_id: &str,
        results: Vec<InlineQueryResult>,
        cache_time: Option<i64>,
        is_personal: Option<bool>,
        next_offset: Option<String>,
    ) -> TelegramResult<bool> {
        let default_parse_mode = self.defaults().and_then(|d| d.parse_mode);
        let mut prepared = Vec::with_capacity(results.len());
        for mut result in results {
            if let Some(markup) = result.reply_markup_mut() {
                *markup = self.prepare_inline_markup(markup)?;
            }
            match &mut result {
                InlineQueryResult::Article(article) => {
                    let content = &mut article.input_message_content;
                    content.parse_mode = content.parse_mode.or(default_parse_mode);
                }
                InlineQueryResult::Audio(audio) => {
                    if audio.caption.is_some() {
                        audio.parse_mode = audio.parse_mode.or(default_parse_mode);
                    }
                }
            }
            prepared.push(result);
        }

        let mut data = RequestData::new();
        data.insert("inline_query_id", inline_query_id)?;
        data.insert("results", prepared)?;
        data.insert("cache_time", cache_time)?;
        data.insert("is_personal", is_personal)?;
        data.insert("next_offset", next_offset)?;
        self.call("answerInlineQuery", &data).await
    }

    pub async fn answer_shipping_query(
        &self,
        shipping_query_id: &str,
        ok: bool,
        shipping_options: Option<Vec<ShippingOption>>,
        error_message: Option<&str>,
    ) -> TelegramResult<bool> {
        if ok && shipping_options.is_none() {
            return Err(TelegramError::BadRequest(
                "shipping_options are required when ok is true".to_string(),
            ));
        }
        if !ok && error_message.is_none() {
            return Err(TelegramError::BadRequest(
                "error_message is required when ok is false".to_string(),
            ));
        }
        let mut data = RequestData::new();
        data.insert("shipping_query_id", shipping_query_id)?;
        data.insert("ok", ok)?;
        data.insert("shipping_options", shipping_options)?;
        data.insert("error_message", error_message)?;
        self.call("answerShippingQuery", &data).await
    }

    pub async fn answer_pre_checkout_query(
        &self,
        pre_checkout_query_id: &str,
        ok: bool,
        error_message: Option<&str>,
    ) -> TelegramResult<bool> {
        let mut data = RequestData::new();
        data.insert("pre_checkout_query_id", pre_checkout_query_id)?;
        data.insert("ok", ok)?;
        data.insert("error_message", error_message)?;
        self.call("answerPreCheckoutQuery", &data).await
    }

    pub async fn get_file(&self, file_id: &str) -> TelegramResult<File> {
        let mut data = RequestData::new();
        data.insert("file_id", file_id)?;
        self.call("getFile", &data).await
    }

    /// Downloads the content of a file returned by [`Bot::get_file`]
    pub async fn download_file(&self, file: &File) -> TelegramResult<Bytes> {
        let file_path = file.file_path.as_deref().ok_or_else(|| {
            TelegramError::Generic(format!("File {} has no file_path", file.file_id))
        })?;
        // local Bot API servers hand out absolute paths
        if Path::new(file_path).is_absolute() {
            return tokio::fs::read(file_path)
                .await
                .map(Bytes::from)
                .map_err(|e| TelegramError::Generic(format!("Failed to read {}: {}", file_path, e)));
        }
        let url = format!("{}/{}", self.base_file_url(), file_path);
        debug!(file_id = %file.file_id, "Downloading file");
        self.inner.request.retrieve(&url, None).await
    }

    /// Downloads a file and writes it to `destination`
    pub async fn download_file_to(&self, file: &File, destination: &Path) -> TelegramResult<()> {
        let content = self.download_file(file).await?;
        tokio::fs::write(destination, &content).await.map_err(|e| {
            TelegramError::Generic(format!("Failed to write {}: {}", destination.display(), e))
        })
    }
}
