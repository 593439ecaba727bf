use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{PoeticError, Result, Stage, UpstreamFailure};
use crate::models::{ChatMessage, ChatRequest, ContentPart, Image, ImageUrl, SceneDescription};
use crate::transport::Transport;

#[cfg(test)]
use mockall::automock;

const CAPTION_PROMPT: &str = "Describe this scene for a poet in 2-4 sentences. \
Name the concrete objects you can see, the light and colours, the season or time of day \
if it is apparent, and the overall mood. Do not speculate about anything outside the frame \
and do not write poetry yourself.";

#[cfg_attr(test, automock)]
#[async_trait]
pub trait VisionCaptioner: Send + Sync {
    async fn caption(&self, image: &Image) -> Result<SceneDescription>;
}

/// Llama 3.2 Vision served through Groq's chat endpoint.
pub struct GroqVision {
    tx: Arc<dyn Transport>,
    model: String,
}

impl GroqVision {
    pub fn new(tx: Arc<dyn Transport>, model: String) -> Self {
        Self { tx, model }
    }
}

#[async_trait]
impl VisionCaptioner for GroqVision {
    async fn caption(&self, image: &Image) -> Result<SceneDescription> {
        tracing::info!(
            model = %self.model,
            format = image.format().mime_type(),
            bytes = image.len(),
            "Captioning image"
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user_parts(vec![
                ContentPart::Text {
                    text: CAPTION_PROMPT.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.to_data_url(),
                    },
                },
            ])],
            temperature: 0.2,
            max_tokens: 300,
            response_format: None,
        };

        let response = self
            .tx
            .chat(&request)
            .await
            .map_err(|e| PoeticError::upstream(Stage::Vision, e))?;

        if response.choices.is_empty() {
            return Err(PoeticError::upstream(
                Stage::Vision,
                UpstreamFailure::Malformed("vision API returned no choices".to_string()),
            ));
        }

        match response.first_text().map(str::trim) {
            Some(text) if !text.is_empty() => {
                tracing::info!(chars = text.len(), "Vision analysis complete");
                Ok(SceneDescription::new(text))
            }
            _ => Err(PoeticError::empty(
                Stage::Vision,
                "vision model returned a blank description",
            )),
        }
    }
}
