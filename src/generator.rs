use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{GenerationConfig, TEMPERATURE_RANGE};
use crate::error::{PoeticError, Result, Stage, UpstreamFailure};
use crate::models::{CandidateSet, ChatMessage, ChatRequest, GeneratedPoem, SceneDescription};
use crate::persona::Persona;
use crate::transport::Transport;

#[cfg(test)]
use mockall::automock;

const REFERENCE_MARKER: &str = "--- Reference";

/// Per-request knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
}

impl GenerationOptions {
    pub fn new(temperature: f32) -> Result<Self> {
        if !temperature.is_finite() || !TEMPERATURE_RANGE.contains(&temperature) {
            return Err(PoeticError::InvalidInput(format!(
                "temperature {temperature} outside {}..={}",
                TEMPERATURE_RANGE.start(),
                TEMPERATURE_RANGE.end()
            )));
        }
        Ok(Self { temperature })
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { temperature: 0.5 }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PoemGenerator: Send + Sync {
    async fn generate(
        &self,
        scene: &SceneDescription,
        persona: Persona,
        candidates: &CandidateSet,
        options: GenerationOptions,
    ) -> Result<GeneratedPoem>;
}

pub struct PoemPrompt {
    pub system: String,
    pub user: String,
}

/// Persona rules go in the system message; scene and exemplars in the user message.
pub fn build_prompt(
    scene: &SceneDescription,
    persona: Persona,
    candidates: &CandidateSet,
) -> PoemPrompt {
    let system = format!(
        "{}\n\n\
         Your task: observe a scene (described to you) and write a NEW poem about it.\n\n\
         General Rules:\n\
         1. Use the style, meter, and vocabulary of the provided Reference Poems, if any.\n\
         2. Do NOT copy the references. Use them only as a \"style transfer\" source.\n\
         3. Do not mention the references, their titles, or any poet by name.\n\
         4. Do not output any intro text. Just the poem.",
        persona.style_instructions()
    );

    let references = if candidates.is_empty() {
        "(No reference poems are available. Rely on the style rules alone.)\n".to_string()
    } else {
        let mut text = String::new();
        for (i, poem) in candidates.iter().enumerate() {
            text.push_str(&format!(
                "\n{} {} ---\n{}\n",
                REFERENCE_MARKER,
                i + 1,
                poem.text.trim()
            ));
        }
        text
    };

    let user = format!(
        "SCENE OBSERVED:\n{}\n\nSTYLE REFERENCES:\n{}\nWrite the poem now:",
        scene.as_str(),
        references
    );

    PoemPrompt { system, user }
}

/// Strip wrapping the model sometimes adds around the poem.
pub fn sanitize_poem(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(fenced) = text.strip_prefix("```") {
        text = match fenced.split_once('\n') {
            Some((tag, rest)) if is_fence_tag(tag.trim()) => rest,
            _ => fenced,
        };
        text = text.trim_end().trim_end_matches('`');
    }

    let text = text.trim();
    let text = match text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(inner) if !inner.contains('"') => inner,
        _ => text,
    };

    text.lines()
        .filter(|line| !line.trim_start().starts_with(REFERENCE_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// Only these may sit on an opening fence line; anything else is poem text
fn is_fence_tag(tag: &str) -> bool {
    matches!(
        tag.to_ascii_lowercase().as_str(),
        "" | "text" | "txt" | "plaintext" | "plain" | "markdown" | "md" | "poem" | "verse"
    )
}

pub struct GroqPoet {
    tx: Arc<dyn Transport>,
    model: String,
    max_tokens: u32,
}

impl GroqPoet {
    pub fn new(tx: Arc<dyn Transport>, cfg: &GenerationConfig) -> Self {
        Self {
            tx,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
        }
    }
}

#[async_trait]
impl PoemGenerator for GroqPoet {
    async fn generate(
        &self,
        scene: &SceneDescription,
        persona: Persona,
        candidates: &CandidateSet,
        options: GenerationOptions,
    ) -> Result<GeneratedPoem> {
        tracing::info!(
            "Ghost writer initialized for {} with {} references",
            persona,
            candidates.len()
        );

        let prompt = build_prompt(scene, persona, candidates);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(prompt.system), ChatMessage::user(prompt.user)],
            temperature: options.temperature,
            max_tokens: self.max_tokens,
            response_format: None,
        };

        let response = self
            .tx
            .chat(&request)
            .await
            .map_err(|e| PoeticError::upstream(Stage::Generation, e))?;

        if response.choices.is_empty() {
            return Err(PoeticError::upstream(
                Stage::Generation,
                UpstreamFailure::Malformed("chat API returned empty choices".to_string()),
            ));
        }

        let text = sanitize_poem(response.first_text().unwrap_or_default());
        GeneratedPoem::new(text)
            .ok_or_else(|| PoeticError::empty(Stage::Generation, "model returned a blank poem"))
    }
}
