//! Tagging and loading loops behind the `ingest_corpus` tool.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::corpus::{self, CorpusEntry, Screening};
use crate::embeddings::Embedder;
use crate::pinecone::{PoemMetadata, PoemVector, VectorIndex};
use crate::tagger::PoemTagger;

pub const UPSERT_BATCH_SIZE: usize = 50;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TagReport {
    pub resumed_from: usize,
    pub tagged: usize,
    pub skipped: usize,
    /// Set when tagging stopped early on a failure.
    pub stopped_at: Option<usize>,
}

/// Tag every poem not already present in `output`, saving after each one.
///
/// Entries line up with poem indices, so a rerun picks up where the last one
/// stopped. The first tagging failure ends the run.
pub async fn tag_poems(
    tagger: &dyn PoemTagger,
    poems: &[String],
    output: &Path,
    long_lines: bool,
    pause: Duration,
) -> Result<TagReport> {
    let mut entries = corpus::load_entries(output)?;
    let mut report = TagReport {
        resumed_from: entries.len(),
        ..TagReport::default()
    };
    info!("Resuming from index {}", report.resumed_from);

    for (i, raw) in poems.iter().enumerate().skip(entries.len()) {
        let poem = raw.trim();

        if let Screening::Reject { avg_line_len } = corpus::screen_poem(poem, long_lines) {
            info!("Skipping poem #{} ({:.1} chars/line)", i + 1, avg_line_len);
            entries.push(CorpusEntry::skipped(i));
            report.skipped += 1;
            save(output, &entries)?;
            continue;
        }

        info!("Tagging poem #{}", i + 1);
        match tagger.tag(poem).await {
            Ok(tags) => {
                entries.push(CorpusEntry::tagged(i, poem.to_string(), tags));
                report.tagged += 1;
                save(output, &entries)?;
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
            Err(e) => {
                warn!("Tagging poem #{} failed: {}. Saved progress and stopping", i + 1, e);
                report.stopped_at = Some(i);
                break;
            }
        }
    }

    Ok(report)
}

fn save(output: &Path, entries: &[CorpusEntry]) -> Result<()> {
    corpus::save_entries(output, entries)
        .with_context(|| format!("Failed to write {}", output.display()))
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub valid: usize,
    pub uploaded: usize,
    pub embed_failures: usize,
    pub upload_failures: usize,
}

/// Embed each tagged poem's semantic string and upsert it under `namespace`.
pub async fn load_corpus(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    entries: &[CorpusEntry],
    namespace: &str,
    pause: Duration,
) -> LoadReport {
    let valid: Vec<(&CorpusEntry, &str, _)> = entries
        .iter()
        .filter_map(|e| e.loadable().map(|(text, tags)| (e, text, tags)))
        .collect();

    let mut report = LoadReport {
        valid: valid.len(),
        ..LoadReport::default()
    };
    info!(
        "Loaded {} valid poems (out of {} total) for namespace '{}'",
        valid.len(),
        entries.len(),
        namespace
    );

    let mut batch = Vec::with_capacity(UPSERT_BATCH_SIZE);
    for (i, (entry, text, tags)) in valid.iter().enumerate() {
        let semantic = corpus::semantic_string(tags);
        let values = match embedder.embed(&semantic).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Embedding failed for {}: {}", entry.id, e);
                report.embed_failures += 1;
                continue;
            }
        };

        batch.push(PoemVector {
            id: entry.id.clone(),
            values,
            metadata: PoemMetadata {
                text: Some(text.to_string()),
                title: Some(format!("Poem {}", entry.id)),
                semantic_string: Some(semantic),
                author: Some(namespace.to_string()),
            },
        });

        if batch.len() >= UPSERT_BATCH_SIZE {
            flush(index, namespace, &mut batch, &mut report).await;
            info!("Uploaded through {}/{}", i + 1, valid.len());
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    if !batch.is_empty() {
        flush(index, namespace, &mut batch, &mut report).await;
    }

    report
}

async fn flush(
    index: &dyn VectorIndex,
    namespace: &str,
    batch: &mut Vec<PoemVector>,
    report: &mut LoadReport,
) {
    match index.upsert(namespace, batch).await {
        Ok(count) => report.uploaded += count,
        Err(e) => {
            warn!("Upsert of {} vectors failed: {}", batch.len(), e);
            report.upload_failures += batch.len();
        }
    }
    batch.clear();
}
