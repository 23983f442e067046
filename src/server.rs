use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::AppConfig,
    error::ServiceError,
    generation::{EmitCadence, GenerationSettings, StreamingGenerator},
    model::{ChatRequest, ModelHandle, Role, StreamEvent},
    store::{ConversationDetail, ConversationStore, ConversationSummary, TurnStore},
};

/// New conversations are titled with a prompt prefix this long.
const TITLE_MAX_CHARS: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<ConversationStore>,
    pub model: Option<ModelHandle>,
}

pub fn build_router(
    config: Arc<AppConfig>,
    store: Arc<ConversationStore>,
    model: Option<ModelHandle>,
) -> Router {
    let state = AppState {
        config,
        store,
        model,
    };

    Router::new()
        .route("/api/health", get(health))
        .route("/api/chat", post(chat))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.model.is_some(),
    })
}

/// Start a generation and stream its events back over SSE. The loop runs on
/// a blocking thread; a client disconnect drops the channel receiver but
/// does not cancel the loop.
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let prompt = validate_request(&request)?;
    let handle = state.model.clone().ok_or(ServiceError::ModelUnavailable)?;

    let mut conversation_id = request.conversation_id;
    if conversation_id <= 0 {
        conversation_id = state.store.create_conversation(&conversation_title(&prompt))?;
    }

    // Capture prior turns before persisting the new user turn so the prompt
    // enters the chat template exactly once.
    let history = state.store.history(conversation_id)?;
    state
        .store
        .save_message(conversation_id, Role::User, &prompt)?;

    let settings = GenerationSettings {
        max_new_tokens: request.max_new_tokens.unwrap_or(state.config.max_new_tokens),
        temperature: request.temperature.unwrap_or(state.config.temperature),
        enable_thinking: request.enable_thinking,
        cadence: EmitCadence::default(),
    };

    info!(
        conversation_id,
        enable_thinking = settings.enable_thinking,
        "starting chat stream"
    );

    let (tx, rx) = tokio::sync::mpsc::channel::<StreamEvent>(32);
    let store: Arc<dyn TurnStore> = state.store.clone();
    tokio::task::spawn_blocking(move || {
        let generator = StreamingGenerator::new(
            handle.model,
            handle.tokenizer,
            store,
            conversation_id,
            history,
            settings,
        );
        generator.run(&prompt, &mut |event| {
            // A send failure means the client went away; keep generating so
            // the turn still gets persisted.
            let _ = tx.blocking_send(event);
        });
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let name = event.event_name();
        let data = serde_json::to_string(&event).unwrap_or_else(|_| {
            r#"{"type":"error","message":"event serialization failed"}"#.to_string()
        });
        Ok::<_, Infallible>(Event::default().event(name).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversationSummary>>, ServiceError> {
    let conversations = state
        .store
        .list_conversations(state.config.conversation_list_limit)?;
    Ok(Json(conversations))
}

#[derive(Deserialize)]
struct CreateConversationRequest {
    title: Option<String>,
}

#[derive(Serialize)]
struct CreatedConversation {
    id: i64,
    title: String,
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(request): Json<CreateConversationRequest>,
) -> Result<Json<CreatedConversation>, ServiceError> {
    let title = request.title.unwrap_or_else(|| "New Conversation".to_string());
    let id = state.store.create_conversation(&title)?;
    Ok(Json(CreatedConversation { id, title }))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> Result<Json<ConversationDetail>, ServiceError> {
    let conversation = state
        .store
        .get_conversation(conversation_id)?
        .ok_or(ServiceError::NotFound("conversation"))?;
    Ok(Json(conversation))
}

#[derive(Serialize)]
struct DeletedResponse {
    success: bool,
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> Result<Json<DeletedResponse>, ServiceError> {
    if !state.store.delete_conversation(conversation_id)? {
        return Err(ServiceError::NotFound("conversation"));
    }
    Ok(Json(DeletedResponse { success: true }))
}

/// Check a chat request and return the trimmed prompt.
fn validate_request(request: &ChatRequest) -> Result<String, ServiceError> {
    let prompt = request.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(ServiceError::BadRequest("prompt is required".into()));
    }
    if !request.images.is_empty() {
        return Err(ServiceError::BadRequest(
            "image inputs are not supported".into(),
        ));
    }
    if request.max_new_tokens == Some(0) {
        return Err(ServiceError::BadRequest(
            "max_new_tokens must be at least 1".into(),
        ));
    }
    Ok(prompt)
}

fn conversation_title(prompt: &str) -> String {
    if prompt.chars().count() > TITLE_MAX_CHARS {
        let head: String = prompt.chars().take(TITLE_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        prompt.to_string()
    }
}
