use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use poetic_camera::config::Config;
use poetic_camera::corpus;
use poetic_camera::embeddings::OpenAiEmbedder;
use poetic_camera::ingest::{self, UPSERT_BATCH_SIZE};
use poetic_camera::persona::Persona;
use poetic_camera::pinecone::PineconeIndex;
use poetic_camera::tagger::GroqTagger;
use poetic_camera::transport::{GroqTransport, Transport};

/// Build the reference-poem index: clean Gutenberg text, tag poems, load vectors.
#[derive(Parser, Debug)]
#[command(name = "ingest_corpus")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    step: Step,

    /// Pause between upstream calls, in milliseconds
    #[arg(long, default_value = "500", global = true)]
    pause_ms: u64,
}

#[derive(Subcommand, Debug)]
enum Step {
    /// Split a raw Project Gutenberg volume into separated poems
    Clean {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Extract imagery, themes and mood for each poem (resumable)
    Tag {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value = "Emily Dickinson")]
        poet: String,
        /// Allow long free-verse lines
        #[arg(long)]
        loose: bool,
    },
    /// Embed tagged poems and upsert them into a persona namespace
    Load {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        namespace: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poetic_camera=info,ingest_corpus=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let pause = Duration::from_millis(args.pause_ms);

    match args.step {
        Step::Clean { input, output } => {
            let raw = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let poems = corpus::clean_gutenberg(&raw);
            tokio::fs::write(&output, corpus::join_poems(&poems))
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            tracing::info!("Extracted {} poems into {}", poems.len(), output.display());
        }
        Step::Tag {
            input,
            output,
            poet,
            loose,
        } => {
            let persona: Persona = poet.parse()?;
            let config = Config::load();
            if config.groq.api_key.trim().is_empty() {
                bail!("GROQ_API_KEY environment variable must be set");
            }
            if config.server.request_timeout_secs == 0 {
                bail!("server.request_timeout_secs cannot be 0");
            }

            let text = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let poems = corpus::split_poems(&text);
            tracing::info!("Loaded {} poems from {}", poems.len(), input.display());

            let transport: Arc<dyn Transport> = Arc::new(GroqTransport::new(
                config.groq.api_base.clone(),
                config.groq.api_key.clone(),
                config.request_timeout(),
            )?);
            let tagger = GroqTagger::new(transport, config.generation.model.clone(), persona);

            let report = ingest::tag_poems(
                &tagger,
                &poems,
                &output,
                loose || persona.long_lines(),
                pause,
            )
            .await?;
            tracing::info!(
                resumed_from = report.resumed_from,
                tagged = report.tagged,
                skipped = report.skipped,
                "Tagging finished"
            );
            if let Some(index) = report.stopped_at {
                bail!("Tagging stopped at poem #{}; rerun to resume", index + 1);
            }
        }
        Step::Load { file, namespace } => {
            let config = Config::load();
            let mut missing: Vec<String> = config
                .missing_credentials()
                .into_iter()
                .filter(|p| !p.contains("GROQ") && !p.contains("SPEECH"))
                .collect();
            if config.server.request_timeout_secs == 0 {
                missing.push("server.request_timeout_secs cannot be 0".to_string());
            }
            if !missing.is_empty() {
                bail!(missing.join("; "));
            }

            let entries = corpus::load_entries(&file)?;
            if entries.is_empty() {
                bail!("No tagged poems found in {}", file.display());
            }

            let embedder = OpenAiEmbedder::new(&config.embedding, config.request_timeout())?;
            let index = PineconeIndex::new(&config.pinecone, config.request_timeout())?;

            tracing::info!(
                namespace = %namespace,
                batch_size = UPSERT_BATCH_SIZE,
                "Starting embedding and upload"
            );
            let report = ingest::load_corpus(&embedder, &index, &entries, &namespace, pause).await;
            tracing::info!(
                valid = report.valid,
                uploaded = report.uploaded,
                embed_failures = report.embed_failures,
                upload_failures = report.upload_failures,
                "Namespace '{}' is ready",
                namespace
            );
        }
    }

    Ok(())
}
