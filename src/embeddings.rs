use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::config::EmbeddingConfig;
use crate::error::UpstreamFailure;

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamFailure>;
}

/// Any OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(cfg: &EmbeddingConfig, timeout: Duration) -> Result<Self, UpstreamFailure> {
        let config = OpenAIConfig::new()
            .with_api_key(cfg.api_key.clone())
            .with_api_base(cfg.api_base.trim_end_matches('/').to_string());
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamFailure::Network(e.to_string()))?;
        // async-openai retries rate limits on its own; a zero budget turns that off
        let no_retry = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();
        let client = Client::with_config(config)
            .with_http_client(http)
            .with_backoff(no_retry);
        Ok(Self {
            client,
            model: cfg.model.clone(),
            dimensions: cfg.dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamFailure> {
        info!(model = %self.model, chars = text.len(), "Generating embedding");

        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(openai_failure)?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(openai_failure)?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamFailure::Malformed("No embeddings returned".to_string()))?
            .embedding;

        if self.dimensions != 0 && embedding.len() != self.dimensions {
            return Err(UpstreamFailure::Malformed(format!(
                "expected {} dimensions, got {}",
                self.dimensions,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}

fn openai_failure(e: OpenAIError) -> UpstreamFailure {
    match e {
        OpenAIError::Reqwest(e) if e.is_timeout() => UpstreamFailure::Timeout,
        OpenAIError::Reqwest(e) => UpstreamFailure::Network(e.to_string()),
        OpenAIError::ApiError(api) => UpstreamFailure::Api(api.message),
        OpenAIError::JSONDeserialize(e) => UpstreamFailure::Malformed(e.to_string()),
        other => UpstreamFailure::Api(other.to_string()),
    }
}
