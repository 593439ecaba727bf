use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::embeddings::Embedder;
use crate::error::{PoeticError, Result, Stage};
use crate::models::{RetrievedPoem, SceneDescription};
use crate::persona::Persona;
use crate::pinecone::{VectorIndex, VectorMatch};

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PoemRetriever: Send + Sync {
    /// Up to `top_k` reference poems for `persona`, highest score first.
    /// No matches is an empty list, not an error.
    async fn retrieve(
        &self,
        scene: &SceneDescription,
        persona: Persona,
        top_k: usize,
    ) -> Result<Vec<RetrievedPoem>>;
}

/// Embeds the scene remotely, then searches the persona's namespace.
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }
}

#[async_trait]
impl PoemRetriever for VectorRetriever {
    async fn retrieve(
        &self,
        scene: &SceneDescription,
        persona: Persona,
        top_k: usize,
    ) -> Result<Vec<RetrievedPoem>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self
            .embedder
            .embed(scene.as_str())
            .await
            .map_err(|e| PoeticError::upstream(Stage::Retrieval, e))?;

        info!(
            "Retrieving top {} candidates from namespace: {}",
            top_k,
            persona.namespace()
        );

        let matches = self
            .index
            .query(persona.namespace(), &embedding, top_k)
            .await
            .map_err(|e| PoeticError::upstream(Stage::Retrieval, e))?;

        let mut poems: Vec<RetrievedPoem> = matches.into_iter().filter_map(to_poem).collect();
        poems.sort_by(|a, b| b.score.total_cmp(&a.score));
        poems.truncate(top_k);

        if poems.is_empty() {
            warn!("No reference poems found in namespace {}", persona.namespace());
        } else {
            info!("Retrieved {} reference poems", poems.len());
        }

        Ok(poems)
    }
}

fn to_poem(m: VectorMatch) -> Option<RetrievedPoem> {
    let metadata = m.metadata.unwrap_or_default();
    let text = match metadata.text {
        Some(t) if !t.trim().is_empty() => t,
        _ => {
            warn!("Skipping match {} with no poem text", m.id);
            return None;
        }
    };
    Some(RetrievedPoem {
        id: m.id,
        text,
        title: metadata.title,
        source_poet: metadata.author,
        score: m.score,
    })
}
