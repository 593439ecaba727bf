use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use poetic_camera::config::Config;
use poetic_camera::display::CompositionVisual;
use poetic_camera::generator::GenerationOptions;
use poetic_camera::models::{Image, ImageFormat};
use poetic_camera::persona::Persona;
use poetic_camera::pipeline::{CompositionRequest, PoemPipeline};
use poetic_camera::server::{self, AppState};

/// Turn a photograph into a poem in the voice of a classic poet, then read it aloud.
#[derive(Parser, Debug)]
#[command(name = "poetic-camera")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose one poem from an image file
    Compose {
        #[arg(short, long)]
        image: PathBuf,

        /// Poet persona, e.g. "Emily Dickinson" or "whitman"
        #[arg(short, long, default_value = "Emily Dickinson")]
        poet: String,

        #[arg(short, long)]
        temperature: Option<f32>,

        /// Where to write the narration; defaults to poem.<format>
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, env = "POETIC_HTTP_BIND")]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for the poem
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poetic_camera=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Command::Compose {
            image,
            poet,
            temperature,
            out,
        } => compose(&config, &image, &poet, temperature, out).await,
        Command::Serve { bind } => serve(&config, bind).await,
    }
}

async fn compose(
    config: &Config,
    image_path: &Path,
    poet: &str,
    temperature: Option<f32>,
    out: Option<PathBuf>,
) -> Result<()> {
    let persona: Persona = poet.parse()?;
    let options = GenerationOptions::new(temperature.unwrap_or(config.generation.temperature))?;

    let bytes = tokio::fs::read(image_path)
        .await
        .with_context(|| format!("Failed to read image {}", image_path.display()))?;
    let declared = image_path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ImageFormat::from_extension)
        .map(|f| f.mime_type());
    let image = Image::from_upload(bytes, declared)?;

    let pipeline = PoemPipeline::from_config(config)?;
    let composition = pipeline
        .compose(CompositionRequest {
            image,
            persona,
            options,
        })
        .await?;

    println!("{}", CompositionVisual::render(&composition));

    let out = out.unwrap_or_else(|| PathBuf::from(format!("poem.{}", config.speech.response_format)));
    tokio::fs::write(&out, &composition.audio.bytes)
        .await
        .with_context(|| format!("Failed to write audio to {}", out.display()))?;
    tracing::info!(path = %out.display(), bytes = composition.audio.len(), "Narration saved");
    Ok(())
}

async fn serve(config: &Config, bind: Option<String>) -> Result<()> {
    let bind: SocketAddr = bind
        .unwrap_or_else(|| config.server.bind.clone())
        .parse()
        .map_err(|e| anyhow!("Invalid bind address (expected host:port): {e}"))?;

    let pipeline = Arc::new(PoemPipeline::from_config(config)?);
    let state = AppState {
        pipeline,
        default_options: GenerationOptions::new(config.generation.temperature)?,
    };
    let bearer_token = config.server.bearer_token.clone();
    let auth = if bearer_token.is_some() { "bearer" } else { "none" };
    let router = server::router(state, bearer_token);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!(%bind, auth, "Starting HTTP server");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
