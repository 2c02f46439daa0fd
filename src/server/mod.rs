//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service info and endpoint list |
//! | `GET`  | `/health` | Health check |
//! | `GET`  | `/status` | Provider and knowledge base status |
//! | `POST` | `/faq/answer` | Answer a customer question |
//! | `POST` | `/faq/entries` | Append an FAQ entry and rebuild the index |
//! | `GET`  | `/faq/stats` | Knowledge base statistics |
//! | `POST` | `/faq/reload` | Rebuild the index from disk |
//! | `POST` | `/call/summarize` | Summarise a call transcript |
//! | `GET`  | `/voice/voices` | Voices available to the account |
//! | `GET`  | `/voice/settings` | Configured voice settings |
//! | `POST` | `/voice/synthesize` | Text to speech |
//! | `POST` | `/voice/call-response` | FAQ answer spoken back |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream_error` (502), `internal` (500).
//!
//! `/faq/answer` itself never fails on provider errors: it answers with the
//! apology result, as library callers get.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

use crate::call::{CallAnalyzer, CallReport};
use crate::completion::create_completer;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::{KnowledgeError, ProviderError};
use crate::faq::{AnswerResult, FaqPipeline, Query};
use crate::knowledge::{FaqEntry, KnowledgeStore, StoreStats};
use crate::voice::{Voice, VoiceSettings, VoiceSynthesizer, AUDIO_CONTENT_TYPE};

const SERVICE_NAME: &str = "helpdesk-rag";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<FaqPipeline>,
    pub calls: Arc<CallAnalyzer>,
    pub voice: Arc<VoiceSynthesizer>,
}

impl AppState {
    /// Build providers from `config` and load the knowledge base.
    ///
    /// Missing completion or embedding keys are fatal. A knowledge base that
    /// fails to build is not: the service starts in degraded mode.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let completer = create_completer(&config.completion)?;
        let store = KnowledgeStore::open(&config.knowledge, embedder).await?;
        let voice = VoiceSynthesizer::from_env(&config.voice)?;

        Ok(Self {
            pipeline: Arc::new(FaqPipeline::new(
                Arc::new(store),
                completer.clone(),
                &config.faq,
            )),
            calls: Arc::new(CallAnalyzer::new(completer)),
            voice: Arc::new(voice),
        })
    }

    fn store(&self) -> &KnowledgeStore {
        self.pipeline.knowledge()
    }
}

/// Routes with CORS open to all origins.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/faq/answer", post(handle_answer))
        .route("/faq/entries", post(handle_add_entry))
        .route("/faq/stats", get(handle_stats))
        .route("/faq/reload", post(handle_reload))
        .route("/call/summarize", post(handle_summarize))
        .route("/voice/voices", get(handle_voices))
        .route("/voice/settings", get(handle_voice_settings))
        .route("/voice/synthesize", post(handle_synthesize))
        .route("/voice/call-response", post(handle_call_response))
        .layer(cors)
        .with_state(state)
}

/// Start the server on `[server].bind` and run until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let stats = state.store().stats();
    tracing::info!(
        "Knowledge base: {:?} ({} chunks)",
        stats.status,
        stats.documents
    );

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("Listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        if err.is_configuration() {
            return internal(err.to_string());
        }
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "upstream_error",
            message: err.to_string(),
        }
    }
}

impl From<KnowledgeError> for AppError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::Embedding(e) => e.into(),
            other => internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
}

// ============ GET / and /health ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({
        "message": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "service": ["/health", "/status"],
            "faq": ["/faq/answer", "/faq/entries", "/faq/stats", "/faq/reload"],
            "call": ["/call/summarize"],
            "voice": [
                "/voice/voices",
                "/voice/settings",
                "/voice/synthesize",
                "/voice/call-response"
            ]
        }
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct ProviderStatus<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct VoiceStatus<'a> {
    configured: bool,
    voice_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

#[derive(Serialize)]
struct Integrations<'a> {
    completion: ProviderStatus<'a>,
    embedding: ProviderStatus<'a>,
    knowledge_base: StoreStats,
    elevenlabs: VoiceStatus<'a>,
}

#[derive(Serialize)]
struct StatusResponse<'a> {
    status: &'static str,
    integrations: Integrations<'a>,
}

async fn handle_status(State(state): State<AppState>) -> Response {
    let store = state.store();
    Json(StatusResponse {
        status: "success",
        integrations: Integrations {
            completion: ProviderStatus {
                name: state.pipeline.completer().name(),
            },
            embedding: ProviderStatus {
                name: store.embedder().name(),
            },
            knowledge_base: store.stats(),
            elevenlabs: VoiceStatus {
                configured: state.voice.is_configured(),
                voice_id: state.voice.default_voice_id(),
                voice_settings: state.voice.settings(),
            },
        },
    })
    .into_response()
}

// ============ FAQ ============

async fn handle_answer(
    State(state): State<AppState>,
    payload: Result<Json<Query>, JsonRejection>,
) -> Result<Json<AnswerResult>, AppError> {
    let Json(query) = payload?;
    require("question", &query.question)?;

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("faq_answer", %request_id);
    let result = async {
        tracing::debug!(question = %query.question, "Answering question");
        state.pipeline.answer_question(&query).await
    }
    .instrument(span)
    .await;

    Ok(Json(result))
}

#[derive(Serialize)]
struct StatsEnvelope {
    status: &'static str,
    stats: StoreStats,
}

async fn handle_add_entry(
    State(state): State<AppState>,
    payload: Result<Json<FaqEntry>, JsonRejection>,
) -> Result<Json<StatsEnvelope>, AppError> {
    let Json(entry) = payload?;
    require("question", &entry.question)?;
    require("answer", &entry.answer)?;

    let stats = state.store().add_faq_entry(&entry).await?;
    Ok(Json(StatsEnvelope {
        status: "success",
        stats,
    }))
}

async fn handle_stats(State(state): State<AppState>) -> Json<StoreStats> {
    Json(state.store().stats())
}

async fn handle_reload(State(state): State<AppState>) -> Result<Json<StatsEnvelope>, AppError> {
    let stats = state.store().reload().await?;
    Ok(Json(StatsEnvelope {
        status: "success",
        stats,
    }))
}

// ============ Calls ============

#[derive(Deserialize)]
struct SummarizeRequest {
    transcription: String,
}

async fn handle_summarize(
    State(state): State<AppState>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Json<CallReport>, AppError> {
    let Json(request) = payload?;
    require("transcription", &request.transcription)?;

    Ok(Json(state.calls.summarize(&request.transcription).await))
}

// ============ Voice ============

#[derive(Serialize)]
struct VoicesResponse {
    voices: Vec<Voice>,
}

async fn handle_voices(State(state): State<AppState>) -> Result<Json<VoicesResponse>, AppError> {
    let voices = state.voice.list_voices().await?;
    Ok(Json(VoicesResponse { voices }))
}

#[derive(Serialize)]
struct VoiceSettingsResponse<'a> {
    voice_id: &'a str,
    model_id: &'a str,
    settings: &'a VoiceSettings,
}

async fn handle_voice_settings(State(state): State<AppState>) -> Response {
    Json(VoiceSettingsResponse {
        voice_id: state.voice.default_voice_id(),
        model_id: state.voice.model_id(),
        settings: state.voice.settings(),
    })
    .into_response()
}

#[derive(Deserialize)]
struct SynthesizeRequest {
    text: String,
    #[serde(default)]
    voice_id: Option<String>,
}

#[derive(Serialize)]
struct AudioResponse {
    voice_id: String,
    content_type: &'static str,
    audio_base64: String,
}

impl AudioResponse {
    fn new(voice_id: String, audio: &[u8]) -> Self {
        Self {
            voice_id,
            content_type: AUDIO_CONTENT_TYPE,
            audio_base64: base64::engine::general_purpose::STANDARD.encode(audio),
        }
    }
}

async fn handle_synthesize(
    State(state): State<AppState>,
    payload: Result<Json<SynthesizeRequest>, JsonRejection>,
) -> Result<Json<AudioResponse>, AppError> {
    let Json(request) = payload?;
    require("text", &request.text)?;

    let voice_id = request
        .voice_id
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| state.voice.default_voice_id().to_string());
    let audio = state.voice.synthesize(&request.text, Some(&voice_id)).await?;

    Ok(Json(AudioResponse::new(voice_id, &audio)))
}

#[derive(Deserialize)]
struct CallResponseRequest {
    transcription: String,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Serialize)]
struct CallResponseBody {
    transcription: String,
    answer: AnswerResult,
    #[serde(flatten)]
    audio: AudioResponse,
}

async fn handle_call_response(
    State(state): State<AppState>,
    payload: Result<Json<CallResponseRequest>, JsonRejection>,
) -> Result<Json<CallResponseBody>, AppError> {
    let Json(request) = payload?;
    require("transcription", &request.transcription)?;

    let query = Query {
        question: request.transcription.clone(),
        context: request.context,
    };
    let answer = state.pipeline.answer_question(&query).await;

    let voice_id = state.voice.default_voice_id().to_string();
    let audio = state.voice.synthesize(&answer.answer, None).await?;

    Ok(Json(CallResponseBody {
        transcription: request.transcription,
        answer,
        audio: AudioResponse::new(voice_id, &audio),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mapping() {
        let err: AppError = ProviderError::Status {
            provider: "openai",
            status: 429,
            body: "slow down".to_string(),
        }
        .into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.code, "upstream_error");

        let err: AppError = ProviderError::MissingApiKey("ELEVENLABS_API_KEY").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "internal");
    }

    #[test]
    fn test_knowledge_error_mapping() {
        let err: AppError = KnowledgeError::InvalidChunking("overlap".to_string()).into();
        assert_eq!(err.code, "internal");

        let err: AppError = KnowledgeError::Embedding(ProviderError::Empty { provider: "x" }).into();
        assert_eq!(err.code, "upstream_error");
    }

    #[test]
    fn test_require() {
        assert!(require("question", "  ").is_err());
        assert!(require("question", "hi").is_ok());
    }

    #[test]
    fn test_audio_response_encodes_base64() {
        let response = AudioResponse::new("v".to_string(), b"ID3");
        assert_eq!(response.audio_base64, "SUQz");
        assert_eq!(response.content_type, "audio/mpeg");
    }
}
