//! End-to-end runs of the pipeline with in-memory stand-ins for every hosted service.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use poetic_camera::config::GenerationConfig;
use poetic_camera::embeddings::Embedder;
use poetic_camera::generator::GroqPoet;
use poetic_camera::models::{ChatRequest, ChatResponse, MessageContent};
use poetic_camera::pinecone::{PoemMetadata, PoemVector, VectorIndex, VectorMatch};
use poetic_camera::retriever::VectorRetriever;
use poetic_camera::transport::Transport;
use poetic_camera::{
    AudioClip, AudioSynthesizer, CandidateArchitect, CompositionRequest, GeneratedPoem,
    GenerationOptions, Image, Persona, PoemPipeline, PoeticError, SceneDescription, Stage,
    UpstreamFailure, VisionCaptioner,
};

type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

struct FakeCamera {
    log: CallLog,
    scene: &'static str,
}

#[async_trait]
impl VisionCaptioner for FakeCamera {
    async fn caption(&self, _image: &Image) -> poetic_camera::Result<SceneDescription> {
        record(&self.log, "vision");
        Ok(SceneDescription::new(self.scene))
    }
}

struct FakeEmbedder {
    log: CallLog,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamFailure> {
        record(&self.log, format!("embed:{text}"));
        Ok(vec![0.25; 8])
    }
}

enum IndexBehaviour {
    Matches(Vec<VectorMatch>),
    TimeOut,
}

struct FakeIndex {
    log: CallLog,
    behaviour: IndexBehaviour,
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn query(
        &self,
        namespace: &str,
        _vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, UpstreamFailure> {
        record(&self.log, format!("query:{namespace}:{top_k}"));
        match &self.behaviour {
            IndexBehaviour::Matches(m) => Ok(m.clone()),
            IndexBehaviour::TimeOut => Err(UpstreamFailure::Timeout),
        }
    }

    async fn upsert(
        &self,
        _namespace: &str,
        vectors: &[PoemVector],
    ) -> Result<usize, UpstreamFailure> {
        Ok(vectors.len())
    }
}

/// Chat endpoint that answers with a canned poem and keeps the prompt it saw.
struct FakeChat {
    log: CallLog,
    reply: &'static str,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Transport for FakeChat {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, UpstreamFailure> {
        record(&self.log, "generate");
        let prompt = req
            .messages
            .iter()
            .filter_map(|m| match &m.content {
                MessageContent::Text(t) => Some(t.clone()),
                MessageContent::Parts(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);
        Ok(ChatResponse::from_text(self.reply))
    }
}

struct FakeVoice {
    log: CallLog,
}

#[async_trait]
impl AudioSynthesizer for FakeVoice {
    async fn synthesize(&self, poem: &GeneratedPoem) -> poetic_camera::Result<AudioClip> {
        record(&self.log, "speak");
        Ok(AudioClip {
            bytes: poem.as_str().as_bytes().to_vec(),
            mime_type: "audio/mpeg".to_string(),
        })
    }
}

fn nature_match(id: &str, score: f32, text: &str) -> VectorMatch {
    VectorMatch {
        id: id.to_string(),
        score,
        metadata: Some(PoemMetadata {
            text: Some(text.to_string()),
            title: Some(format!("Poem {id}")),
            semantic_string: None,
            author: Some("whitman".to_string()),
        }),
    }
}

fn jpeg() -> Image {
    Image::from_upload(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10], None).unwrap()
}

struct Harness {
    log: CallLog,
    chat: Arc<FakeChat>,
    pipeline: PoemPipeline,
}

fn harness(scene: &'static str, index: IndexBehaviour, reply: &'static str) -> Harness {
    let log: CallLog = Arc::default();
    let chat = Arc::new(FakeChat {
        log: log.clone(),
        reply,
        prompts: Mutex::new(Vec::new()),
    });
    let generation = GenerationConfig {
        model: "llama-3.3-70b-versatile".to_string(),
        temperature: 0.5,
        max_tokens: 300,
    };

    let pipeline = PoemPipeline::new(
        Arc::new(FakeCamera {
            log: log.clone(),
            scene,
        }),
        Arc::new(VectorRetriever::new(
            Arc::new(FakeEmbedder { log: log.clone() }),
            Arc::new(FakeIndex {
                log: log.clone(),
                behaviour: index,
            }),
        )),
        CandidateArchitect::default(),
        Arc::new(GroqPoet::new(chat.clone(), &generation)),
        Arc::new(FakeVoice { log: log.clone() }),
        15,
    );

    Harness {
        log,
        chat,
        pipeline,
    }
}

fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn forest_photo_in_whitmans_voice() {
    let h = harness(
        "A dense pine forest at dawn, mist between the trunks",
        IndexBehaviour::Matches(vec![
            nature_match("poem_0003", 0.81, "A child said What is the grass?"),
            nature_match("poem_0010", 0.77, "I believe a leaf of grass is no less"),
            nature_match("poem_0024", 0.64, "Give me the splendid silent sun"),
        ]),
        "```\n--- Reference 1 ---\nO pines at dawn, O breathing mist,\nI loafe among you\n```",
    );

    let composition = h
        .pipeline
        .compose(CompositionRequest {
            image: jpeg(),
            persona: Persona::Whitman,
            options: GenerationOptions::default(),
        })
        .await
        .unwrap();

    assert_eq!(
        calls(&h.log),
        vec![
            "vision".to_string(),
            "embed:A dense pine forest at dawn, mist between the trunks".to_string(),
            "query:whitman:15".to_string(),
            "generate".to_string(),
            "speak".to_string(),
        ]
    );

    let poem = composition.poem.as_str();
    assert_eq!(poem, "O pines at dawn, O breathing mist,\nI loafe among you");
    assert!(!poem.contains("Whitman"));
    assert!(!poem.contains("--- Reference"));
    assert!(!composition.audio.is_empty());

    assert_eq!(composition.candidates.len(), 3);
    let prompt = h.chat.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("A child said What is the grass?"));
    assert!(prompt.contains("Give me the splendid silent sun"));
}

#[tokio::test]
async fn empty_namespace_still_produces_a_poem() {
    let h = harness(
        "A lighthouse in a storm",
        IndexBehaviour::Matches(Vec::new()),
        "The Tower - keeps its Candle lit",
    );

    let composition = h
        .pipeline
        .compose(CompositionRequest {
            image: jpeg(),
            persona: Persona::Dickinson,
            options: GenerationOptions::new(0.7).unwrap(),
        })
        .await
        .unwrap();

    assert!(composition.candidates.is_empty());
    assert!(calls(&h.log).contains(&"generate".to_string()));
    let prompt = h.chat.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("No reference poems are available"));
    assert_eq!(
        composition.poem.display_text(),
        "The Tower \u{2014} keeps its Candle lit"
    );
}

#[tokio::test]
async fn vector_store_timeout_stops_before_generation() {
    let h = harness("A quiet harbour", IndexBehaviour::TimeOut, "unused");

    let err = h
        .pipeline
        .compose(CompositionRequest {
            image: jpeg(),
            persona: Persona::Shelley,
            options: GenerationOptions::default(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Retrieval));
    assert!(err.is_timeout());
    assert!(matches!(err, PoeticError::Upstream { .. }));

    let log = calls(&h.log);
    assert!(!log.contains(&"generate".to_string()));
    assert!(!log.contains(&"speak".to_string()));
    assert!(h.chat.prompts.lock().unwrap().is_empty());
}
