pub mod architect;
pub mod config;
pub mod corpus;
pub mod display;
pub mod embeddings;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod models;
pub mod persona;
pub mod pinecone;
pub mod pipeline;
pub mod retriever;
pub mod server;
pub mod speech;
pub mod tagger;
pub mod transport;
pub mod vision;

pub use crate::architect::CandidateArchitect;
pub use crate::config::Config;
pub use crate::error::{PoeticError, Result, Stage, UpstreamFailure};
pub use crate::generator::{GenerationOptions, PoemGenerator};
pub use crate::models::{
    AudioClip, CandidateSet, GeneratedPoem, Image, ImageFormat, RetrievedPoem, SceneDescription,
};
pub use crate::persona::Persona;
pub use crate::pipeline::{Composition, CompositionRequest, PoemPipeline};
pub use crate::retriever::PoemRetriever;
pub use crate::speech::AudioSynthesizer;
pub use crate::vision::VisionCaptioner;
