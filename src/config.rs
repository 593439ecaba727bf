use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the poetic camera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub groq: GroqConfig,
    pub embedding: EmbeddingConfig,
    pub pinecone: PineconeConfig,
    pub retrieval: RetrievalConfig,
    pub architect: ArchitectConfig,
    pub generation: GenerationConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    /// Applied to every outbound HTTP request.
    pub request_timeout_secs: u64,
    #[serde(default, skip_serializing)]
    pub bearer_token: Option<String>,
}

/// Groq hosts both the vision model and the poem model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroqConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    pub api_base: String,
    pub vision_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub dimensions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PineconeConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Data-plane host of the index, e.g. https://poems-abc123.svc.us-east-1.pinecone.io
    pub index_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectConfig {
    pub max_candidates: usize,
    /// Similarity score cutoff (0.0-1.0)
    pub min_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub voice: String,
    pub response_format: String,
}

impl SpeechConfig {
    pub fn mime_type(&self) -> &'static str {
        match self.response_format.as_str() {
            "opus" => "audio/ogg",
            "aac" => "audio/aac",
            "flac" => "audio/flac",
            "wav" => "audio/wav",
            "pcm" => "audio/L16",
            _ => "audio/mpeg",
        }
    }
}

/// Temperatures accepted for poem generation.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.1..=1.0;

impl Config {
    /// Load configuration from file with environment variable overrides
    /// ALWAYS returns a config - problems are logged, not fatal
    pub fn load() -> Self {
        let env_paths = [".env", "../.env"];

        let mut env_loaded = false;
        for path in &env_paths {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
                env_loaded = true;
                break;
            }
        }

        if !env_loaded {
            tracing::warn!("No .env file found - continuing with env vars only");
        }

        let config_path =
            env::var("POETIC_CONFIG_PATH").unwrap_or_else(|_| "poetic.yaml".to_string());

        let mut config = Self::from_file(Path::new(&config_path));
        config.apply_overrides(|key| env::var(key).ok());

        for problem in config.validate() {
            tracing::warn!("Config validation: {}", problem);
        }

        config
    }

    fn from_file(path: &Path) -> Self {
        if !path.exists() {
            tracing::warn!("Config file not found at {} - using defaults", path.display());
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to parse config file {}: {} - using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!(
                    "Failed to read config file {}: {} - using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Apply environment-style overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_key = lookup("OPENAI_API_KEY");

        // Server overrides
        if let Some(bind) = lookup("POETIC_HTTP_BIND") {
            self.server.bind = bind;
        }
        if let Some(secs) = lookup("POETIC_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.server.request_timeout_secs = secs;
        }
        if let Some(token) = lookup("POETIC_BEARER_TOKEN").filter(|t| !t.is_empty()) {
            self.server.bearer_token = Some(token);
        }

        // Groq overrides
        if let Some(api_key) = lookup("GROQ_API_KEY") {
            self.groq.api_key = api_key;
        }
        if let Some(base) = lookup("GROQ_API_BASE") {
            self.groq.api_base = base;
        }
        if let Some(model) = lookup("VISION_MODEL_ID") {
            self.groq.vision_model = model;
        }
        if let Some(model) = lookup("GENERATOR_MODEL_ID") {
            self.generation.model = model;
        }

        // Embedding overrides
        if let Some(api_key) = lookup("EMBEDDING_API_KEY").or_else(|| openai_key.clone()) {
            self.embedding.api_key = api_key;
        }
        if let Some(base) = lookup("EMBEDDING_API_BASE") {
            self.embedding.api_base = base;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL_ID") {
            self.embedding.model = model;
        }

        // Pinecone overrides
        if let Some(api_key) = lookup("PINECONE_API_KEY") {
            self.pinecone.api_key = api_key;
        }
        if let Some(host) = lookup("PINECONE_INDEX_HOST") {
            self.pinecone.index_host = host;
        }

        // Retrieval and architect overrides
        if let Some(top_k) = lookup("RETRIEVAL_TOP_K").and_then(|v| v.parse().ok()) {
            self.retrieval.top_k = top_k;
        }
        if let Some(max) = lookup("ARCHITECT_MAX_CANDIDATES").and_then(|v| v.parse().ok()) {
            self.architect.max_candidates = max;
        }
        if let Some(min) = lookup("ARCHITECT_MIN_SCORE").and_then(|v| v.parse().ok()) {
            self.architect.min_score = min;
        }

        // Speech overrides
        if let Some(api_key) = lookup("SPEECH_API_KEY").or(openai_key) {
            self.speech.api_key = api_key;
        }
        if let Some(base) = lookup("SPEECH_API_BASE") {
            self.speech.api_base = base;
        }
        if let Some(model) = lookup("SPEECH_MODEL_ID") {
            self.speech.model = model;
        }
        if let Some(voice) = lookup("SPEECH_VOICE") {
            self.speech.voice = voice;
        }
    }

    /// Every problem found; empty when the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (name, key) in [
            ("GROQ_API_KEY", &self.groq.api_key),
            ("EMBEDDING_API_KEY", &self.embedding.api_key),
            ("PINECONE_API_KEY", &self.pinecone.api_key),
            ("SPEECH_API_KEY", &self.speech.api_key),
        ] {
            if key.trim().is_empty() {
                problems.push(format!("{name} environment variable must be set"));
            }
        }
        if self.pinecone.index_host.trim().is_empty() {
            problems.push("PINECONE_INDEX_HOST environment variable must be set".to_string());
        }

        if self.retrieval.top_k == 0 {
            problems.push("retrieval.top_k cannot be 0".to_string());
        }
        if self.architect.max_candidates == 0 {
            problems.push("architect.max_candidates cannot be 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.architect.min_score) {
            problems.push("architect.min_score must be between 0.0 and 1.0".to_string());
        }
        if !TEMPERATURE_RANGE.contains(&self.generation.temperature) {
            problems.push("generation.temperature must be between 0.1 and 1.0".to_string());
        }
        if self.server.request_timeout_secs == 0 {
            problems.push("server.request_timeout_secs cannot be 0".to_string());
        }

        problems
    }

    /// Credentials problems only; these make the pipeline unusable.
    pub fn missing_credentials(&self) -> Vec<String> {
        self.validate()
            .into_iter()
            .filter(|p| p.contains("environment variable"))
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:8787".to_string(),
                request_timeout_secs: 60,
                bearer_token: None,
            },
            groq: GroqConfig {
                api_key: String::new(),
                api_base: "https://api.groq.com/openai/v1".to_string(),
                vision_model: "llama-3.2-11b-vision-preview".to_string(),
            },
            embedding: EmbeddingConfig {
                api_key: String::new(),
                api_base: "https://api.openai.com/v1".to_string(),
                model: "text-embedding-3-small".to_string(),
                dimensions: 1536,
            },
            pinecone: PineconeConfig {
                api_key: String::new(),
                index_host: String::new(),
            },
            retrieval: RetrievalConfig { top_k: 15 },
            architect: ArchitectConfig {
                max_candidates: 3,
                min_score: 0.30,
            },
            generation: GenerationConfig {
                model: "llama-3.3-70b-versatile".to_string(),
                temperature: 0.5,
                max_tokens: 300,
            },
            speech: SpeechConfig {
                api_key: String::new(),
                api_base: "https://api.openai.com/v1".to_string(),
                model: "tts-1".to_string(),
                voice: "fable".to_string(),
                response_format: "mp3".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_policy() {
        let cfg = Config::default();
        assert_eq!(cfg.retrieval.top_k, 15);
        assert_eq!(cfg.architect.max_candidates, 3);
        assert!((cfg.architect.min_score - 0.30).abs() < 1e-6);
        assert!((cfg.generation.temperature - 0.5).abs() < 1e-6);
        assert_eq!(cfg.generation.max_tokens, 300);
    }

    #[test]
    fn env_overrides_replace_models_and_keys() {
        let mut cfg = Config::default();
        cfg.apply_overrides(lookup_from(&[
            ("GROQ_API_KEY", "gsk_test"),
            ("VISION_MODEL_ID", "llama-vision-x"),
            ("GENERATOR_MODEL_ID", "llama-poet-y"),
            ("RETRIEVAL_TOP_K", "7"),
            ("ARCHITECT_MIN_SCORE", "0.5"),
            ("ARCHITECT_MAX_CANDIDATES", "not-a-number"),
        ]));
        assert_eq!(cfg.groq.api_key, "gsk_test");
        assert_eq!(cfg.groq.vision_model, "llama-vision-x");
        assert_eq!(cfg.generation.model, "llama-poet-y");
        assert_eq!(cfg.retrieval.top_k, 7);
        assert!((cfg.architect.min_score - 0.5).abs() < 1e-6);
        // Unparseable values leave the default in place
        assert_eq!(cfg.architect.max_candidates, 3);
    }

    #[test]
    fn openai_key_backs_embedding_and_speech() {
        let mut cfg = Config::default();
        cfg.apply_overrides(lookup_from(&[
            ("OPENAI_API_KEY", "sk-shared"),
            ("SPEECH_API_KEY", "sk-speech"),
        ]));
        assert_eq!(cfg.embedding.api_key, "sk-shared");
        assert_eq!(cfg.speech.api_key, "sk-speech");
    }

    #[test]
    fn validate_reports_missing_credentials() {
        let cfg = Config::default();
        let missing = cfg.missing_credentials();
        assert_eq!(missing.len(), 5);
        assert!(missing.iter().any(|p| p.contains("PINECONE_INDEX_HOST")));

        let mut cfg = Config::default();
        cfg.apply_overrides(lookup_from(&[
            ("GROQ_API_KEY", "a"),
            ("OPENAI_API_KEY", "b"),
            ("PINECONE_API_KEY", "c"),
            ("PINECONE_INDEX_HOST", "https://idx.example"),
        ]));
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_rejects_out_of_range_policy() {
        let mut cfg = Config::default();
        cfg.architect.min_score = 1.5;
        cfg.retrieval.top_k = 0;
        cfg.generation.temperature = 0.0;
        let problems = cfg.validate();
        assert!(problems.iter().any(|p| p.contains("min_score")));
        assert!(problems.iter().any(|p| p.contains("top_k")));
        assert!(problems.iter().any(|p| p.contains("temperature")));
    }

    #[test]
    fn validate_rejects_nan_cutoff_and_zero_timeout() {
        let mut cfg = Config::default();
        cfg.apply_overrides(lookup_from(&[
            ("ARCHITECT_MIN_SCORE", "NaN"),
            ("POETIC_REQUEST_TIMEOUT_SECS", "0"),
        ]));
        let problems = cfg.validate();
        assert!(problems.iter().any(|p| p.contains("min_score")));
        assert!(problems.iter().any(|p| p.contains("request_timeout_secs")));
    }

    #[test]
    fn yaml_file_without_secrets_parses() {
        let yaml = r#"
server: { bind: "0.0.0.0:9000", request_timeout_secs: 30 }
groq: { api_base: "https://api.groq.com/openai/v1", vision_model: "v" }
embedding: { api_base: "https://api.openai.com/v1", model: "m", dimensions: 768 }
pinecone: { index_host: "https://idx.example" }
retrieval: { top_k: 10 }
architect: { max_candidates: 2, min_score: 0.2 }
generation: { model: "g", temperature: 0.7, max_tokens: 200 }
speech: { api_base: "https://api.openai.com/v1", model: "tts-1", voice: "onyx", response_format: "mp3" }
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poetic.yaml");
        std::fs::write(&path, yaml).unwrap();
        let cfg = Config::from_file(&path);
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
        assert_eq!(cfg.embedding.dimensions, 768);
        assert_eq!(cfg.architect.max_candidates, 2);
        assert!(cfg.groq.api_key.is_empty());
        assert_eq!(cfg.speech.mime_type(), "audio/mpeg");
    }
}
