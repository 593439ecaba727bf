use async_trait::async_trait;
use std::sync::Arc;

use crate::corpus::PoemTags;
use crate::error::UpstreamFailure;
use crate::models::{ChatMessage, ChatRequest};
use crate::persona::Persona;
use crate::transport::Transport;

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PoemTagger: Send + Sync {
    async fn tag(&self, poem: &str) -> Result<PoemTags, UpstreamFailure>;
}

/// JSON-mode metadata extraction over the chat transport.
pub struct GroqTagger {
    tx: Arc<dyn Transport>,
    model: String,
    persona: Persona,
}

impl GroqTagger {
    pub fn new(tx: Arc<dyn Transport>, model: String, persona: Persona) -> Self {
        Self { tx, model, persona }
    }

    fn request(&self, poem: &str) -> ChatRequest {
        let system = format!(
            "You are a literary scholar analyzing {}. Prioritize deep subtext, hidden metaphors, \
             and emotional arc in your analysis. Your final output MUST be a JSON object \
             conforming strictly to the schema.",
            self.persona.display_name()
        );

        let user = format!(
            r#"INSTRUCTIONS:
1. Analyze the poem deeply to understand its metaphors.
2. Extract dense data based on that understanding.

Return JSON ONLY with this schema:
{{
    "concrete_nouns": ["5-7 highly specific physical objects visible in the imagery"],
    "themes": ["4-6 complex abstract concepts"],
    "mood": ["3 nuanced emotional adjectives"],
    "analysis_summary": "A single sentence explaining the poem's deeper meaning."
}}

POEM:
{poem}"#
        );

        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: 0.1,
            max_tokens: 1024,
            response_format: Some(serde_json::json!({"type": "json_object"})),
        }
    }
}

#[async_trait]
impl PoemTagger for GroqTagger {
    async fn tag(&self, poem: &str) -> Result<PoemTags, UpstreamFailure> {
        let response = self.tx.chat(&self.request(poem)).await?;

        let json = response.first_text().ok_or_else(|| {
            UpstreamFailure::Malformed("chat API returned empty choices for tagging".to_string())
        })?;

        serde_json::from_str(json).map_err(|e| {
            UpstreamFailure::Malformed(format!("Failed to deserialize tag JSON: {e}. Raw: {json}"))
        })
    }
}
