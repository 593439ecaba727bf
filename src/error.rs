use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Vision,
    Retrieval,
    Architect,
    Generation,
    Synthesis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Vision => "vision",
            Stage::Retrieval => "retrieval",
            Stage::Architect => "architect",
            Stage::Generation => "generation",
            Stage::Synthesis => "synthesis",
        };
        f.write_str(s)
    }
}

/// What went wrong talking to a hosted service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamFailure {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("API error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for UpstreamFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamFailure::Timeout
        } else if e.is_decode() {
            UpstreamFailure::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            UpstreamFailure::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            UpstreamFailure::Network(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum PoeticError {
    #[error("{stage} stage failed upstream: {source}")]
    Upstream {
        stage: Stage,
        #[source]
        source: UpstreamFailure,
    },

    #[error("{stage} stage returned an empty result: {detail}")]
    EmptyResult { stage: Stage, detail: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PoeticError {
    pub fn upstream(stage: Stage, source: impl Into<UpstreamFailure>) -> Self {
        Self::Upstream {
            stage,
            source: source.into(),
        }
    }

    pub fn empty(stage: Stage, detail: impl Into<String>) -> Self {
        Self::EmptyResult {
            stage,
            detail: detail.into(),
        }
    }

    /// Stage that failed, if the error came from one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Upstream { stage, .. } | Self::EmptyResult { stage, .. } => Some(*stage),
            Self::InvalidInput(_) | Self::Config(_) => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Upstream {
                source: UpstreamFailure::Timeout,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, PoeticError>;
