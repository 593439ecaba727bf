use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::UpstreamFailure;
use crate::models::{ChatRequest, ChatResponse};

#[cfg(test)]
use mockall::automock;

/// One OpenAI-compatible chat-completions call. No retries: a failure is final.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, UpstreamFailure>;
}

pub struct GroqTransport {
    client: Client,
    api_base: String,
    api_key: String,
}

impl GroqTransport {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamFailure> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl Transport for GroqTransport {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, UpstreamFailure> {
        tracing::debug!(model = %req.model, messages = req.messages.len(), "chat request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UpstreamFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<ChatResponse>().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamFailure::Timeout
            } else {
                UpstreamFailure::Malformed(format!("Failed to parse chat response: {e}"))
            }
        })
    }
}
