//! Local selection of few-shot style exemplars.
//!
//! The architect never touches the network. Given the same retrieved poems and
//! persona it always returns the same candidate set, and it never fails.

use std::collections::HashSet;

use tracing::info;

use crate::config::ArchitectConfig;
use crate::models::{CandidateSet, RetrievedPoem};
use crate::persona::Persona;

#[derive(Debug, Clone)]
pub struct CandidateArchitect {
    max_candidates: usize,
    min_score: f32,
}

impl Default for CandidateArchitect {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            min_score: 0.30,
        }
    }
}

impl CandidateArchitect {
    pub fn new(max_candidates: usize, min_score: f32) -> Self {
        Self {
            max_candidates,
            min_score,
        }
    }

    pub fn from_config(cfg: &ArchitectConfig) -> Self {
        Self::new(cfg.max_candidates, cfg.min_score)
    }

    pub fn select(&self, retrieved: &[RetrievedPoem], persona: Persona) -> CandidateSet {
        let mut seen = HashSet::new();
        let mut pool: Vec<&RetrievedPoem> = retrieved
            .iter()
            .filter(|p| p.score.is_finite() && !p.text.trim().is_empty())
            .filter(|p| {
                p.source_poet
                    .as_deref()
                    .is_none_or(|source| persona.matches_source(source))
            })
            .filter(|p| seen.insert(fingerprint(&p.text)))
            .collect();

        // Stable: equal scores keep retrieval order
        pool.sort_by(|a, b| b.score.total_cmp(&a.score));

        let chosen: Vec<RetrievedPoem> = pool
            .into_iter()
            .take_while(|p| p.score >= self.min_score)
            .take(self.max_candidates)
            .cloned()
            .collect();

        info!(
            retrieved = retrieved.len(),
            selected = chosen.len(),
            persona = persona.namespace(),
            "Architect selected references"
        );

        CandidateSet::new(chosen)
    }
}

fn fingerprint(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
