//! HTTP surface: one multipart upload in, poem and audio out.

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{PoeticError, Result, Stage};
use crate::generator::GenerationOptions;
use crate::models::Image;
use crate::persona::Persona;
use crate::pipeline::{Composition, CompositionRequest, PoemPipeline};

pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const EXCERPT_CHARS: usize = 350;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PoemPipeline>,
    pub default_options: GenerationOptions,
}

pub fn router(state: AppState, bearer_token: Option<String>) -> Router {
    let mut router = Router::new()
        .route("/personas", get(list_personas))
        .route("/compose", post(compose))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    if let Some(expected) = bearer_token {
        router = router.layer(middleware::from_fn_with_state(
            Arc::new(expected),
            require_bearer,
        ));
    }

    router.route("/health", get(|| async { "ok" }))
}

#[derive(Debug, Serialize)]
struct PersonaInfo {
    name: &'static str,
    namespace: &'static str,
}

async fn list_personas() -> Json<Vec<PersonaInfo>> {
    Json(
        Persona::ALL
            .iter()
            .map(|p| PersonaInfo {
                name: p.display_name(),
                namespace: p.namespace(),
            })
            .collect(),
    )
}

#[derive(Debug, Serialize)]
struct ReferenceView {
    title: String,
    poet: Option<String>,
    score: f32,
    excerpt: String,
}

#[derive(Debug, Serialize)]
struct AudioView {
    mime: String,
    base64: String,
}

#[derive(Debug, Serialize)]
struct ComposeResponse {
    request_id: Uuid,
    persona: Persona,
    scene: String,
    references: Vec<ReferenceView>,
    poem: String,
    audio: AudioView,
}

impl From<Composition> for ComposeResponse {
    fn from(c: Composition) -> Self {
        let references = c
            .candidates
            .iter()
            .enumerate()
            .map(|(i, p)| ReferenceView {
                title: p.display_title(i),
                poet: p.source_poet.clone(),
                score: p.score,
                excerpt: p.excerpt(EXCERPT_CHARS),
            })
            .collect();

        Self {
            request_id: c.request_id,
            persona: c.persona,
            scene: c.scene.as_str().to_string(),
            references,
            poem: c.poem.display_text(),
            audio: AudioView {
                base64: c.audio.to_base64(),
                mime: c.audio.mime_type,
            },
        }
    }
}

async fn compose(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ComposeResponse>> {
    let request = read_compose_form(multipart, state.default_options).await?;
    tracing::info!(
        persona = %request.persona,
        image_bytes = request.image.len(),
        "Compose request received"
    );
    let composition = state.pipeline.compose(request).await?;
    Ok(Json(composition.into()))
}

async fn read_compose_form(
    mut multipart: Multipart,
    defaults: GenerationOptions,
) -> Result<CompositionRequest> {
    let bad_form = |e: axum::extract::multipart::MultipartError| {
        PoeticError::InvalidInput(format!("Malformed multipart body: {e}"))
    };

    let mut image = None;
    let mut persona = Persona::default();
    let mut options = defaults;

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let declared = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_form)?;
                image = Some(Image::from_upload(bytes.to_vec(), declared.as_deref())?);
            }
            "poet" => {
                let value = field.text().await.map_err(bad_form)?;
                if !value.trim().is_empty() {
                    persona = value.parse()?;
                }
            }
            "temperature" => {
                let value = field.text().await.map_err(bad_form)?;
                let temperature: f32 = value.trim().parse().map_err(|_| {
                    PoeticError::InvalidInput(format!("temperature '{value}' is not a number"))
                })?;
                options = GenerationOptions::new(temperature)?;
            }
            _ => {}
        }
    }

    let image =
        image.ok_or_else(|| PoeticError::InvalidInput("Missing 'image' field".to_string()))?;
    Ok(CompositionRequest {
        image,
        persona,
        options,
    })
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    stage: Option<Stage>,
}

impl IntoResponse for PoeticError {
    fn into_response(self) -> Response {
        let status = match &self {
            PoeticError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PoeticError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            PoeticError::EmptyResult { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PoeticError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
            stage: self.stage(),
        };
        (status, Json(body)).into_response()
    }
}

async fn require_bearer(
    State(expected): State<Arc<String>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let headers: &HeaderMap = req.headers();
    let header_ok = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected.as_str());

    // Clients that cannot set headers may pass access_token or token
    let query_ok = Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .map(|Query(params)| {
            ["access_token", "token"]
                .iter()
                .any(|key| params.get(*key).is_some_and(|v| v == expected.as_str()))
        })
        .unwrap_or(false);

    if !(header_ok || query_ok) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    next.run(req).await
}
