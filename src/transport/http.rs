//! HTTP transport.
//!
//! Every `send` is one stateless `POST` exchange. A non-empty response body
//! is published on the receive channel; `204 No Content` (the answer to a
//! notification) publishes nothing. There is no persistent connection and no
//! server-initiated push.

use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;

use crate::{
    // ---
    EventChannel,
    HttpConfig,
    Message,
    Result,
    RpcError,
    Transport,
    TransportPtr,
};

pub struct HttpTransport {
    // ---
    client: reqwest::Client,
    url: String,
    messages: EventChannel<String>,
}

impl HttpTransport {
    // ---
    pub fn new(config: HttpConfig) -> Result<Self> {
        // ---
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| RpcError::Transport(format!("http client setup failed: {err}")))?;

        Ok(Self {
            client,
            url: config.url,
            messages: EventChannel::new(),
        })
    }

    pub fn create(config: HttpConfig) -> Result<TransportPtr> {
        Ok(Arc::new(Self::new(config)?))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    // ---
    async fn send(&self, message: &Message) -> Result<()> {
        // ---
        let body = message.encode()?;

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| RpcError::Transport(format!("POST {} failed: {err}", self.url)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| RpcError::Transport(format!("reading response body failed: {err}")))?;

        if text.trim().is_empty() {
            if status.is_success() {
                return Ok(());
            }
            return Err(RpcError::Transport(format!(
                "POST {} returned {status}",
                self.url
            )));
        }

        if !status.is_success() {
            crate::log_debug!("POST {} returned {status} with a body", self.url);
        }
        self.messages.publish(text);
        Ok(())
    }

    fn messages(&self) -> &EventChannel<String> {
        &self.messages
    }
}
