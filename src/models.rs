use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PoeticError, Result};

// ───────────────────────────────────────────────────────────────────────────────
// Request-scoped domain values
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Gif => "image/gif",
        }
    }

    /// Sniff the format from magic bytes.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else {
            None
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/webp" => Some(ImageFormat::Webp),
            "image/gif" => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "webp" => Some(ImageFormat::Webp),
            "gif" => Some(ImageFormat::Gif),
            _ => None,
        }
    }
}

/// An uploaded or captured photograph.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl Image {
    pub fn new(bytes: Vec<u8>, format: ImageFormat) -> Result<Self> {
        if bytes.is_empty() {
            return Err(PoeticError::InvalidInput("Image is empty".to_string()));
        }
        Ok(Self { bytes, format })
    }

    /// Build an image, trusting magic bytes over whatever the client declared.
    pub fn from_upload(bytes: Vec<u8>, declared_mime: Option<&str>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(PoeticError::InvalidInput("Image is empty".to_string()));
        }
        let format = ImageFormat::detect(&bytes)
            .or_else(|| declared_mime.and_then(ImageFormat::from_mime))
            .ok_or_else(|| {
                PoeticError::InvalidInput(
                    "Unsupported image format (expected jpeg, png, webp or gif)".to_string(),
                )
            })?;
        Ok(Self { bytes, format })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            BASE64.encode(&self.bytes)
        )
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneDescription(String);

impl SceneDescription {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference poem returned by the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPoem {
    pub id: String,
    pub text: String,
    pub title: Option<String>,
    pub source_poet: Option<String>,
    pub score: f32,
}

impl RetrievedPoem {
    /// Human-friendly title; stored titles look like "Poem poem_0042".
    pub fn display_title(&self, position: usize) -> String {
        let raw = match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => return format!("{}", position + 1),
        };
        let raw = if raw.to_lowercase().contains("poem poem") {
            raw.to_lowercase().replacen("poem poem", "poem", 1)
        } else {
            raw
        };
        title_case(&raw.replace('_', " "))
    }

    /// First `max_chars` characters of the text, with an ellipsis when cut.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let text = self.text.trim();
        if text.chars().count() <= max_chars {
            text.to_string()
        } else {
            let cut: String = text.chars().take(max_chars).collect();
            format!("{cut}...")
        }
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Reference poems chosen as few-shot style exemplars.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CandidateSet(Vec<RetrievedPoem>);

impl CandidateSet {
    pub fn new(poems: Vec<RetrievedPoem>) -> Self {
        Self(poems)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RetrievedPoem> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[RetrievedPoem] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<RetrievedPoem> {
        self.0
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a RetrievedPoem;
    type IntoIter = std::slice::Iter<'a, RetrievedPoem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GeneratedPoem(String);

impl GeneratedPoem {
    /// Accepts only non-blank text.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            None
        } else {
            Some(Self(text))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rendering for display: spaced hyphens become em-dashes.
    pub fn display_text(&self) -> String {
        self.0.replace("- ", "\u{2014} ")
    }
}

impl fmt::Display for GeneratedPoem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl AudioClip {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

// ───────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible chat wire types
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: AssistantMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Text of the first choice, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content: Some(text.into()),
                },
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_formats_from_magic_bytes() {
        assert_eq!(ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::detect(b"\x89PNG\r\n\x1a\n...."), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::detect(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::Webp));
        assert_eq!(ImageFormat::detect(b"hello"), None);
    }

    #[test]
    fn upload_falls_back_to_declared_mime() {
        let img = Image::from_upload(b"not magic".to_vec(), Some("image/png")).unwrap();
        assert_eq!(img.format(), ImageFormat::Png);
        assert!(Image::from_upload(b"not magic".to_vec(), None).is_err());
    }

    #[test]
    fn empty_image_is_invalid_input() {
        let err = Image::from_upload(Vec::new(), Some("image/jpeg")).unwrap_err();
        assert!(matches!(err, PoeticError::InvalidInput(_)));
        assert!(Image::new(Vec::new(), ImageFormat::Jpeg).is_err());
    }

    #[test]
    fn data_url_carries_mime_and_base64() {
        let img = Image::new(vec![0xFF, 0xD8, 0xFF], ImageFormat::Jpeg).unwrap();
        assert_eq!(img.to_data_url(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn display_title_cleans_stored_titles() {
        let mut poem = RetrievedPoem {
            id: "poem_0042".into(),
            text: "A Bird came down the Walk".into(),
            title: Some("Poem poem_0042".into()),
            source_poet: None,
            score: 0.5,
        };
        assert_eq!(poem.display_title(0), "Poem 0042");
        poem.title = None;
        assert_eq!(poem.display_title(2), "3");
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let poem = RetrievedPoem {
            id: "x".into(),
            text: "\u{2014}ab\u{2014}cd".into(),
            title: None,
            source_poet: None,
            score: 0.1,
        };
        assert_eq!(poem.excerpt(3), "\u{2014}ab...");
        assert_eq!(poem.excerpt(100), "\u{2014}ab\u{2014}cd");
    }

    #[test]
    fn generated_poem_rejects_blank_text() {
        assert!(GeneratedPoem::new("  \n\t ").is_none());
        let poem = GeneratedPoem::new("The Woods - were still").unwrap();
        assert_eq!(poem.display_text(), "The Woods \u{2014} were still");
    }

    #[test]
    fn chat_message_parts_serialize_openai_shape() {
        let msg = ChatMessage::user_parts(vec![
            ContentPart::Text { text: "Describe".into() },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: "data:image/png;base64,AA==".into() },
            },
        ]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/png;base64,AA==");
    }

    #[test]
    fn chat_response_tolerates_null_content() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.first_text(), None);
    }
}
