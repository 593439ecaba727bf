use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::config::PineconeConfig;
use crate::error::UpstreamFailure;

#[cfg(test)]
use mockall::automock;

const API_VERSION: &str = "2024-07";

/// Payload stored alongside each poem vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoemMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<PoemMetadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoemVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: PoemMetadata,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [PoemVector],
    namespace: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbours in `namespace`; an unknown or empty namespace yields no matches.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, UpstreamFailure>;

    async fn upsert(&self, namespace: &str, vectors: &[PoemVector])
    -> Result<usize, UpstreamFailure>;
}

/// Pinecone serverless index, data-plane REST API.
#[derive(Clone)]
pub struct PineconeIndex {
    client: Client,
    host: String,
    api_key: String,
}

impl PineconeIndex {
    pub fn new(cfg: &PineconeConfig, timeout: Duration) -> Result<Self, UpstreamFailure> {
        let client = Client::builder().timeout(timeout).build()?;
        let host = cfg.index_host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        info!("Using Pinecone index at {}", host);
        Ok(Self {
            client,
            host,
            api_key: cfg.api_key.clone(),
        })
    }

    async fn post<B: Serialize + Sync, R: serde::de::DeserializeOwned + Send>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, UpstreamFailure> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
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

        response.json::<R>().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamFailure::Timeout
            } else {
                UpstreamFailure::Malformed(format!("Failed to parse Pinecone response: {e}"))
            }
        })
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, UpstreamFailure> {
        let request = QueryRequest {
            namespace,
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
        };
        let response: QueryResponse = self.post("/query", &request).await?;
        Ok(response.matches)
    }

    async fn upsert(
        &self,
        namespace: &str,
        vectors: &[PoemVector],
    ) -> Result<usize, UpstreamFailure> {
        let request = UpsertRequest { vectors, namespace };
        let response: UpsertResponse = self.post("/vectors/upsert", &request).await?;
        Ok(response.upserted_count)
    }
}
