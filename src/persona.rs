/// Poet personas, their vector-store namespaces, and style instructions
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PoeticError;

// ───────────────────────────────────────────────────────────────────────────────
// Persona
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Persona {
    #[default]
    Dickinson,
    Shelley,
    Whitman,
}

impl Persona {
    pub const ALL: [Persona; 3] = [Persona::Dickinson, Persona::Shelley, Persona::Whitman];

    pub fn display_name(&self) -> &'static str {
        match self {
            Persona::Dickinson => "Emily Dickinson",
            Persona::Shelley => "Percy Bysshe Shelley",
            Persona::Whitman => "Walt Whitman",
        }
    }

    /// Vector-store namespace holding this poet's reference poems.
    pub fn namespace(&self) -> &'static str {
        match self {
            Persona::Dickinson => "dickinson",
            Persona::Shelley => "shelley",
            Persona::Whitman => "whitman",
        }
    }

    /// Whitman's long lines need the relaxed prose screen during ingestion.
    pub fn long_lines(&self) -> bool {
        matches!(self, Persona::Whitman)
    }

    pub fn style_instructions(&self) -> &'static str {
        match self {
            Persona::Dickinson => {
                "You are the ghost of Emily Dickinson.\n\
                 Style: Compressed, enigmatic, and metaphysical.\n\
                 Rules:\n\
                 1. Use capitalizations for Emphasis (e.g., \"The Soul\").\n\
                 2. Use the Em-Dash (\u{2014}) frequently for pauses.\n\
                 3. Keep it short (4-10 lines).\n\
                 4. Focus on the soul, death, nature, and the self."
            }
            Persona::Shelley => {
                "You are the ghost of Percy Bysshe Shelley.\n\
                 Style: Romantic, revolutionary, and sublime.\n\
                 Rules:\n\
                 1. Use rich, flowery imagery and complex emotional landscapes.\n\
                 2. Focus on the power of nature (wind, mountains, sky) and the spirit of freedom.\n\
                 3. Do NOT use Dickinson's dashes. Use standard, elegant punctuation.\n\
                 4. Keep it short (4-8 lines)."
            }
            Persona::Whitman => {
                "You are the ghost of Walt Whitman.\n\
                 Style: Free verse, expansive, and democratic.\n\
                 Rules:\n\
                 1. Use long, sprawling lines.\n\
                 2. Use \"cataloging\" (listing things).\n\
                 3. Celebrate the self, the body, and the connection between all things.\n\
                 4. Tone: Robust, declarative, and optimistic."
            }
        }
    }

    /// Whether a source-poet tag from the vector store belongs to this persona.
    pub fn matches_source(&self, source: &str) -> bool {
        parse_loose(source) == Some(*self)
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Persona {
    type Err = PoeticError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_loose(s).ok_or_else(|| {
            let valid = Persona::ALL
                .iter()
                .map(|p| p.display_name())
                .collect::<Vec<_>>()
                .join(", ");
            PoeticError::InvalidInput(format!("Unknown poet '{s}'. Valid poets: {valid}"))
        })
    }
}

impl Serialize for Persona {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.display_name())
    }
}

impl<'de> Deserialize<'de> for Persona {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(de)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// Loose parsing helpers
fn parse_loose(input: &str) -> Option<Persona> {
    let n = normalize(input);
    if n.is_empty() {
        return None;
    }
    match n.as_str() {
        "emilydickinson" | "dickinson" | "emily" => return Some(Persona::Dickinson),
        "percybyssheshelley" | "percyshelley" | "shelley" | "percy" => {
            return Some(Persona::Shelley);
        }
        "waltwhitman" | "whitman" | "walt" | "walterwhitman" => return Some(Persona::Whitman),
        _ => {}
    }

    // Surname anywhere in the input, e.g. "E. Dickinson"
    Persona::ALL
        .into_iter()
        .find(|p| n.contains(p.namespace()))
}

fn normalize(s: &str) -> String {
    s.trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_display_names_and_namespaces() {
        for p in Persona::ALL {
            assert_eq!(p.display_name().parse::<Persona>().unwrap(), p);
            assert_eq!(p.namespace().parse::<Persona>().unwrap(), p);
        }
    }

    #[test]
    fn parses_loose_variants() {
        assert_eq!("  WALT whitman ".parse::<Persona>().unwrap(), Persona::Whitman);
        assert_eq!("P. B. Shelley".parse::<Persona>().unwrap(), Persona::Shelley);
        assert_eq!("emily-dickinson".parse::<Persona>().unwrap(), Persona::Dickinson);
    }

    #[test]
    fn rejects_unknown_poets() {
        let err = "Sylvia Plath".parse::<Persona>().unwrap_err();
        assert!(matches!(err, PoeticError::InvalidInput(_)));
        assert!("".parse::<Persona>().is_err());
    }

    #[test]
    fn default_is_dickinson() {
        assert_eq!(Persona::default(), Persona::Dickinson);
    }

    #[test]
    fn matches_source_tags() {
        assert!(Persona::Whitman.matches_source("whitman"));
        assert!(Persona::Whitman.matches_source("Walt Whitman"));
        assert!(!Persona::Whitman.matches_source("dickinson"));
    }

    #[test]
    fn serde_uses_display_name() {
        let json = serde_json::to_string(&Persona::Shelley).unwrap();
        assert_eq!(json, "\"Percy Bysshe Shelley\"");
        let back: Persona = serde_json::from_str("\"whitman\"").unwrap();
        assert_eq!(back, Persona::Whitman);
    }
}
