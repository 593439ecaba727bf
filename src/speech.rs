use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::time::Duration;

use crate::config::SpeechConfig;
use crate::error::{PoeticError, Result, Stage, UpstreamFailure};
use crate::models::{AudioClip, GeneratedPoem};

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AudioSynthesizer: Send + Sync {
    async fn synthesize(&self, poem: &GeneratedPoem) -> Result<AudioClip>;
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// OpenAI-compatible `/audio/speech`. Bytes are passed through untouched.
pub struct OpenAiSpeech {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    voice: String,
    response_format: String,
    fallback_mime: &'static str,
}

impl OpenAiSpeech {
    pub fn new(cfg: &SpeechConfig, timeout: Duration) -> std::result::Result<Self, UpstreamFailure> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/audio/speech", cfg.api_base.trim_end_matches('/')),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            voice: cfg.voice.clone(),
            response_format: cfg.response_format.clone(),
            fallback_mime: cfg.mime_type(),
        })
    }

    async fn request(&self, text: &str) -> std::result::Result<AudioClip, UpstreamFailure> {
        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: &self.response_format,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
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

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("audio/"))
            .map(str::to_string)
            .unwrap_or_else(|| self.fallback_mime.to_string());

        let bytes = response.bytes().await?;
        Ok(AudioClip {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }
}

#[async_trait]
impl AudioSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, poem: &GeneratedPoem) -> Result<AudioClip> {
        tracing::info!(voice = %self.voice, chars = poem.as_str().len(), "Synthesizing audio");

        let clip = self
            .request(poem.as_str())
            .await
            .map_err(|e| PoeticError::upstream(Stage::Synthesis, e))?;

        if clip.is_empty() {
            return Err(PoeticError::empty(
                Stage::Synthesis,
                "speech API returned no audio",
            ));
        }

        tracing::info!(bytes = clip.len(), mime = %clip.mime_type, "Audio ready");
        Ok(clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: String) -> SpeechConfig {
        SpeechConfig {
            api_key: "sk-speech".to_string(),
            api_base: base,
            model: "tts-1".to_string(),
            voice: "fable".to_string(),
            response_format: "mp3".to_string(),
        }
    }

    fn poem() -> GeneratedPoem {
        GeneratedPoem::new("I celebrate the pines").unwrap()
    }

    #[tokio::test]
    async fn passes_audio_bytes_through() {
        let server = MockServer::start().await;
        let audio = vec![0x49, 0x44, 0x33, 0x04, 0x00, 0xFF];
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(header("authorization", "Bearer sk-speech"))
            .and(body_partial_json(serde_json::json!({
                "model": "tts-1",
                "voice": "fable",
                "input": "I celebrate the pines"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(audio.clone()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let speech =
            OpenAiSpeech::new(&config(format!("{}/v1", server.uri())), Duration::from_secs(5))
                .unwrap();
        let clip = speech.synthesize(&poem()).await.unwrap();
        assert_eq!(clip.bytes, audio);
        assert_eq!(clip.mime_type, "audio/mpeg");
    }

    #[tokio::test]
    async fn missing_content_type_falls_back_to_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let speech = OpenAiSpeech::new(&config(server.uri()), Duration::from_secs(5)).unwrap();
        let clip = speech.synthesize(&poem()).await.unwrap();
        assert_eq!(clip.mime_type, "audio/mpeg");
    }

    #[tokio::test]
    async fn empty_body_is_an_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "audio/mpeg"))
            .mount(&server)
            .await;

        let speech = OpenAiSpeech::new(&config(server.uri()), Duration::from_secs(5)).unwrap();
        let err = speech.synthesize(&poem()).await.unwrap_err();
        assert!(matches!(err, PoeticError::EmptyResult { stage: Stage::Synthesis, .. }));
    }

    #[tokio::test]
    async fn auth_failure_is_a_synthesis_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let speech = OpenAiSpeech::new(&config(server.uri()), Duration::from_secs(5)).unwrap();
        let err = speech.synthesize(&poem()).await.unwrap_err();
        assert!(matches!(
            err,
            PoeticError::Upstream {
                stage: Stage::Synthesis,
                source: UpstreamFailure::Status { status: 401, .. }
            }
        ));
    }
}
