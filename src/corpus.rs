//! Offline preparation of the reference-poem corpus.
//!
//! Raw Project Gutenberg text is cleaned into individual poems, screened for
//! prose, tagged with imagery/theme/mood metadata, and finally turned into the
//! semantic strings that get embedded into the vector store.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const GUTENBERG_START: &str = "*** START OF THE PROJECT GUTENBERG EBOOK";
pub const GUTENBERG_END: &str = "*** END OF THE PROJECT GUTENBERG EBOOK";
pub const POEM_SEPARATOR: &str = "\n---POEM_SEPARATOR---\n";

const MIN_POEM_CHARS: usize = 30;
const MAX_HEADER_CHARS: usize = 20;

/// Split a Gutenberg volume into poems.
pub fn clean_gutenberg(raw: &str) -> Vec<String> {
    let content = match (raw.find(GUTENBERG_START), raw.find(GUTENBERG_END)) {
        (Some(start), Some(end)) if start < end => raw[start..end]
            .split_once('\n')
            .map(|(_, body)| body)
            .unwrap_or(""),
        _ => raw,
    };

    // Roman numerals and section titles sit alone on short uppercase lines
    let cleaned: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| line.is_empty() || !is_header_line(line))
        .collect();

    cleaned
        .join("\n")
        .split("\n\n\n")
        .map(str::trim)
        .filter(|chunk| chunk.chars().count() > MIN_POEM_CHARS)
        .map(str::to_string)
        .collect()
}

fn is_header_line(line: &str) -> bool {
    line.chars().count() < MAX_HEADER_CHARS
        && line.chars().any(char::is_alphabetic)
        && !line.chars().any(char::is_lowercase)
}

pub fn join_poems(poems: &[String]) -> String {
    poems.join(POEM_SEPARATOR)
}

pub fn split_poems(text: &str) -> Vec<String> {
    text.split(POEM_SEPARATOR).map(str::to_string).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Screening {
    Accept,
    Reject { avg_line_len: f32 },
}

/// Reject fragments and prose. `long_lines` relaxes the limit for free verse.
pub fn screen_poem(text: &str, long_lines: bool) -> Screening {
    let lines: Vec<&str> = text.split('\n').collect();
    let avg_line_len = if lines.is_empty() {
        0.0
    } else {
        lines.iter().map(|l| l.chars().count()).sum::<usize>() as f32 / lines.len() as f32
    };
    let max_len = if long_lines { 200.0 } else { 65.0 };

    if text.chars().count() < 10 || avg_line_len > max_len {
        Screening::Reject { avg_line_len }
    } else {
        Screening::Accept
    }
}

/// Dense metadata extracted for one poem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoemTags {
    #[serde(default)]
    pub concrete_nouns: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub mood: Vec<String>,
    #[serde(default)]
    pub analysis_summary: String,
}

/// Search-optimised sentence that mimics what a scene description reads like.
pub fn semantic_string(tags: &PoemTags) -> String {
    format!(
        "A {} poem about {}, featuring imagery of {}.",
        tags.mood.join(", "),
        tags.themes.join(", "),
        tags.concrete_nouns.join(", ")
    )
}

pub fn poem_id(index: usize) -> String {
    format!("poem_{index:04}")
}

/// One line of the tagged corpus file. Skipped poems keep their slot so ids stay aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PoemTags>,
}

impl CorpusEntry {
    pub fn skipped(index: usize) -> Self {
        Self {
            id: poem_id(index),
            status: Some("skipped".to_string()),
            text: None,
            metadata: None,
        }
    }

    pub fn tagged(index: usize, text: String, tags: PoemTags) -> Self {
        Self {
            id: poem_id(index),
            status: None,
            text: Some(text),
            metadata: Some(tags),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.status.as_deref() == Some("skipped")
    }

    /// Text and tags, when the entry is usable for loading.
    pub fn loadable(&self) -> Option<(&str, &PoemTags)> {
        if self.is_skipped() {
            return None;
        }
        match (self.text.as_deref(), self.metadata.as_ref()) {
            (Some(text), Some(tags)) if !text.trim().is_empty() => Some((text, tags)),
            _ => None,
        }
    }
}

/// Previously tagged entries. A missing or blank file means nothing was tagged yet;
/// an unreadable one is an error so progress is never silently overwritten.
pub fn load_entries(path: &Path) -> anyhow::Result<Vec<CorpusEntry>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    let contents = contents.trim();
    if contents.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(contents).with_context(|| {
        format!(
            "{} is not a valid corpus file; fix or remove it before resuming",
            path.display()
        )
    })
}

pub fn save_entries(path: &Path, entries: &[CorpusEntry]) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(path, json)
}
