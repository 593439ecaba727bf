use serde::Serialize;
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::architect::CandidateArchitect;
use crate::config::Config;
use crate::embeddings::OpenAiEmbedder;
use crate::error::{PoeticError, Result, UpstreamFailure};
use crate::generator::{GenerationOptions, GroqPoet, PoemGenerator};
use crate::models::{AudioClip, CandidateSet, GeneratedPoem, Image, SceneDescription};
use crate::persona::Persona;
use crate::pinecone::PineconeIndex;
use crate::retriever::{PoemRetriever, VectorRetriever};
use crate::speech::{AudioSynthesizer, OpenAiSpeech};
use crate::transport::{GroqTransport, Transport};
use crate::vision::{GroqVision, VisionCaptioner};

#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub image: Image,
    pub persona: Persona,
    pub options: GenerationOptions,
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct Composition {
    pub request_id: Uuid,
    pub persona: Persona,
    pub scene: SceneDescription,
    pub candidates: CandidateSet,
    pub poem: GeneratedPoem,
    #[serde(skip)]
    pub audio: AudioClip,
}

pub struct PoemPipeline {
    captioner: Arc<dyn VisionCaptioner>,
    retriever: Arc<dyn PoemRetriever>,
    architect: CandidateArchitect,
    generator: Arc<dyn PoemGenerator>,
    synthesizer: Arc<dyn AudioSynthesizer>,
    top_k: usize,
}

impl PoemPipeline {
    pub fn new(
        captioner: Arc<dyn VisionCaptioner>,
        retriever: Arc<dyn PoemRetriever>,
        architect: CandidateArchitect,
        generator: Arc<dyn PoemGenerator>,
        synthesizer: Arc<dyn AudioSynthesizer>,
        top_k: usize,
    ) -> Self {
        Self {
            captioner,
            retriever,
            architect,
            generator,
            synthesizer,
            top_k,
        }
    }

    /// Wire the hosted-service adapters from configuration.
    /// Refuses any configuration `Config::validate` finds a problem with.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let problems = cfg.validate();
        if !problems.is_empty() {
            return Err(PoeticError::Config(problems.join("; ")));
        }

        let timeout = cfg.request_timeout();
        let http_err = |e: UpstreamFailure| PoeticError::Config(format!("Failed to build HTTP client: {e}"));

        let transport: Arc<dyn Transport> = Arc::new(
            GroqTransport::new(cfg.groq.api_base.clone(), cfg.groq.api_key.clone(), timeout)
                .map_err(http_err)?,
        );
        let captioner = Arc::new(GroqVision::new(
            Arc::clone(&transport),
            cfg.groq.vision_model.clone(),
        ));
        let generator = Arc::new(GroqPoet::new(Arc::clone(&transport), &cfg.generation));

        let embedder = Arc::new(OpenAiEmbedder::new(&cfg.embedding, timeout).map_err(http_err)?);
        let index = Arc::new(PineconeIndex::new(&cfg.pinecone, timeout).map_err(http_err)?);
        let retriever = Arc::new(VectorRetriever::new(embedder, index));

        let synthesizer = Arc::new(OpenAiSpeech::new(&cfg.speech, timeout).map_err(http_err)?);

        Ok(Self::new(
            captioner,
            retriever,
            CandidateArchitect::from_config(&cfg.architect),
            generator,
            synthesizer,
            cfg.retrieval.top_k,
        ))
    }

    /// Run every stage in order. The first failure ends the run.
    pub async fn compose(&self, request: CompositionRequest) -> Result<Composition> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "compose",
            %request_id,
            persona = request.persona.namespace()
        );
        self.run(request_id, request).instrument(span).await
    }

    async fn run(&self, request_id: Uuid, request: CompositionRequest) -> Result<Composition> {
        let CompositionRequest {
            image,
            persona,
            options,
        } = request;

        info!("[1/5] Vision analysis");
        let scene = self.captioner.caption(&image).await.inspect_err(log_abort)?;
        drop(image);

        info!("[2/5] Retrieving references");
        let retrieved = self
            .retriever
            .retrieve(&scene, persona, self.top_k)
            .await
            .inspect_err(log_abort)?;

        info!("[3/5] Selecting references");
        let candidates = self.architect.select(&retrieved, persona);
        if candidates.is_empty() {
            info!("No usable references; writing from the scene and persona alone");
        }

        info!("[4/5] Drafting poem");
        let poem = self
            .generator
            .generate(&scene, persona, &candidates, options)
            .await
            .inspect_err(log_abort)?;

        info!("[5/5] Synthesizing audio");
        let audio = self
            .synthesizer
            .synthesize(&poem)
            .await
            .inspect_err(log_abort)?;

        info!("Composition complete");
        Ok(Composition {
            request_id,
            persona,
            scene,
            candidates,
            poem,
            audio,
        })
    }
}

fn log_abort(e: &PoeticError) {
    warn!(stage = ?e.stage(), "Pipeline aborted: {}", e);
}
