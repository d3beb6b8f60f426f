//! reqwest-backed transport

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use super::base::{BaseRequest, HttpMethod, RequestTimeouts};
use super::request_data::RequestData;
use crate::utils::errors::{TelegramError, TelegramResult};

/// HTTP transport with a pooled reqwest client
#[derive(Debug, Clone)]
pub struct HttpRequest {
    client: Client,
    timeouts: RequestTimeouts,
}

impl HttpRequest {
    /// Create a new transport with the given default time limits
    pub fn new(timeouts: RequestTimeouts) -> TelegramResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .user_agent(concat!("Castpod/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TelegramError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeouts })
    }

    /// Wrap an existing client, e.g. one configured with a proxy
    pub fn with_client(client: Client, timeouts: RequestTimeouts) -> Self {
        Self { client, timeouts }
    }

    pub fn timeouts(&self) -> RequestTimeouts {
        self.timeouts
    }
}

fn map_transport_error(e: reqwest::Error) -> TelegramError {
    if e.is_timeout() {
        TelegramError::TimedOut(e.to_string())
    } else {
        TelegramError::NetworkError(format!("reqwest error: {}", e))
    }
}

#[async_trait]
impl BaseRequest for HttpRequest {
    async fn do_request(
        &self,
        method: HttpMethod,
        url: &str,
        data: Option<&RequestData>,
        timeouts: Option<RequestTimeouts>,
    ) -> TelegramResult<(u16, Bytes)> {
        let timeout = timeouts.unwrap_or(self.timeouts).total();
        let builder = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        }
        .timeout(timeout);

        let builder = match data {
            Some(data) if data.is_multipart() => builder.multipart(data.to_multipart().await?),
            Some(data) => builder.json(&data.json_payload()),
            None => builder,
        };

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_transport_error)?;

        debug!(status = status, bytes = body.len(), "Bot API round trip finished");
        Ok((status, body))
    }
}
