//! Notepad Sync Server - note store with debounced persistence
//!
//! Serves a small ordered collection of text notes to a thin editor UI:
//! - In-memory note store as the single source of truth during a session
//! - Debounced autosave of the full state to a Sled embedded database
//! - Batched deletion reconciliation
//! - Axum HTTP API plus a WebSocket feed of the saving/saved indicator

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

mod config;
mod export;
mod notes;
mod storage;
mod sync;

use config::{ServerConfig, StorageBackend};
use export::{export_json, EXPORT_FILE_NAME};
use notes::{Note, NoteId, NotePatch};
use storage::{MemoryGateway, PersistenceGateway, SledGateway};
use sync::{SaveStatus, SessionView, SyncEngine};

// ============================================================================
// APPLICATION STATE
// ============================================================================

/// Shared application state
pub struct AppState {
    /// The note session
    engine: Arc<SyncEngine>,
    /// Server start time
    started_at: std::time::Instant,
}

impl AppState {
    pub fn new(engine: SyncEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            started_at: std::time::Instant::now(),
        }
    }
}

type ApiError = (StatusCode, String);

fn note_not_found(id: NoteId) -> ApiError {
    (StatusCode::NOT_FOUND, format!("Note not found: {}", id))
}

// ============================================================================
// API TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    note_count: usize,
    saving: bool,
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    title: String,
}

#[derive(Debug, Deserialize)]
struct RemoveRequest {
    ids: BTreeSet<NoteId>,
}

#[derive(Debug, Serialize)]
struct RemovedResponse {
    removed: Vec<NoteId>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StatusEvent<'a> {
    Status(&'a SaveStatus),
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        note_count: state.engine.note_count(),
        saving: state.engine.save_status().saving,
    })
}

/// Everything needed to render the session
async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.engine.view())
}

async fn get_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NoteId>,
) -> Result<Json<Note>, ApiError> {
    state.engine.note(id).map(Json).ok_or_else(|| note_not_found(id))
}

/// Create a new note and select it
async fn create_note(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let note = state.engine.create().ok_or_else(|| {
        (
            StatusCode::CONFLICT,
            "No note id left above the highest existing id".to_string(),
        )
    })?;
    info!("Created note {}", note.id);
    Ok((StatusCode::CREATED, Json(note)))
}

/// Patch title and/or content of a note
async fn update_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NoteId>,
    Json(patch): Json<NotePatch>,
) -> Result<Json<Note>, ApiError> {
    if patch.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Empty patch".to_string()));
    }
    state
        .engine
        .update(id, patch)
        .map(Json)
        .ok_or_else(|| note_not_found(id))
}

/// Live title edit while the rename control is focused
async fn rename_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NoteId>,
    Json(payload): Json<RenameRequest>,
) -> Result<Json<Note>, ApiError> {
    state
        .engine
        .rename(id, payload.title)
        .map(Json)
        .ok_or_else(|| note_not_found(id))
}

async fn begin_rename(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NoteId>,
) -> Result<Json<SessionView>, ApiError> {
    if !state.engine.begin_rename(id) {
        return Err(note_not_found(id));
    }
    Ok(Json(state.engine.view()))
}

/// Commit the in-place rename (blur or confirm key)
async fn end_rename(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    if let Some(id) = state.engine.end_rename() {
        debug!("Rename of note {} committed", id);
    }
    Json(state.engine.view())
}

async fn select_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NoteId>,
) -> Result<Json<SessionView>, ApiError> {
    if !state.engine.select(id) {
        return Err(note_not_found(id));
    }
    Ok(Json(state.engine.view()))
}

/// Queue a note for the next reconciliation pass
async fn mark_for_deletion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NoteId>,
) -> Result<Json<SessionView>, ApiError> {
    if !state.engine.mark_for_deletion(id) {
        return Err(note_not_found(id));
    }
    Ok(Json(state.engine.view()))
}

async fn reconcile_deletions(State(state): State<Arc<AppState>>) -> Json<RemovedResponse> {
    Json(RemovedResponse {
        removed: state.engine.reconcile_deletions(),
    })
}

async fn remove_notes(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RemoveRequest>,
) -> Json<RemovedResponse> {
    Json(RemovedResponse {
        removed: state.engine.remove(&payload.ids),
    })
}

/// Download the collection as a JSON document
async fn export_notes(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let body = export_json(&state.engine.snapshot()).map_err(|e| {
        error!("Failed to export notes: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
            ),
        ],
        body,
    ))
}

// ============================================================================
// WEBSOCKET HANDLER
// ============================================================================

/// WebSocket upgrade handler for the saving/saved indicator
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_status_socket(socket, state))
}

/// Push every change of the save status until the client goes away
async fn handle_status_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut status = state.engine.subscribe_status();

    debug!("Status subscriber connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let current = status.borrow_and_update().clone();
            if let Err(e) = send_status(&mut sender, &current).await {
                debug!("Status subscriber send failed: {}", e);
                break;
            }
            if status.changed().await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    debug!("Status subscriber disconnected");
}

/// Send a status event over WebSocket
async fn send_status(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    status: &SaveStatus,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let json = serde_json::to_string(&StatusEvent::Status(status))?;
    sender.send(Message::Text(json)).await?;
    Ok(())
}

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn build_router(state: Arc<AppState>) -> Router {
    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Note session
        .route(
            "/api/notes",
            get(get_session).post(create_note).delete(remove_notes),
        )
        .route("/api/notes/reconcile", post(reconcile_deletions))
        .route("/api/notes/:id", get(get_note).patch(update_note))
        .route("/api/notes/:id/title", put(rename_note))
        .route("/api/notes/:id/select", post(select_note))
        .route("/api/notes/:id/rename", post(begin_rename))
        .route("/api/notes/:id/delete", post(mark_for_deletion))
        .route("/api/rename", delete(end_rename))
        .route("/api/export", get(export_notes))
        // Save status feed
        .route("/ws", get(ws_handler))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notepad_sync=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env();

    // Initialize storage
    let gateway: Arc<dyn PersistenceGateway> = match &config.storage {
        StorageBackend::Sled(storage_config) => {
            info!("Initializing storage at: {}", storage_config.path);
            let store = SledGateway::open(storage_config.clone())
                .context("Failed to open storage")?;
            info!("Storage initialized successfully");
            Arc::new(store)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage, notes will not survive a restart");
            Arc::new(MemoryGateway::new())
        }
    };

    // Hydrate before accepting any request
    let engine = SyncEngine::load_on_start(gateway, config.sync.clone())
        .await
        .context("Failed to load stored notes")?;

    let state = Arc::new(AppState::new(engine));
    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("Notepad sync server v{} starting", env!("CARGO_PKG_VERSION"));
    info!("   Autosave debounce: {:?}", config.sync.debounce_interval);
    info!("   Listening on: http://{}", addr);
    info!("   Status feed: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.engine.shutdown().await;
    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_update_via_handlers() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
        let engine = SyncEngine::load_on_start(gateway, sync::SyncConfig::default())
            .await
            .unwrap();
        let state = Arc::new(AppState::new(engine));

        let _ = create_note(State(state.clone())).await;
        let updated = update_note(
            State(state.clone()),
            Path(1),
            Json(NotePatch::content("hello")),
        )
        .await
        .unwrap();
        assert_eq!(updated.0.content, "hello");

        let missing = update_note(State(state.clone()), Path(9), Json(NotePatch::title("x"))).await;
        assert_eq!(missing.unwrap_err().0, StatusCode::NOT_FOUND);

        let empty = update_note(State(state.clone()), Path(1), Json(NotePatch::default())).await;
        assert_eq!(empty.unwrap_err().0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mark_and_reconcile_via_handlers() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
        let engine = SyncEngine::load_on_start(gateway, sync::SyncConfig::default())
            .await
            .unwrap();
        let state = Arc::new(AppState::new(engine));
        for _ in 0..3 {
            let _ = create_note(State(state.clone())).await;
        }

        let view = mark_for_deletion(State(state.clone()), Path(2)).await.unwrap();
        assert_eq!(view.0.pending_deletion, vec![2]);

        let removed = reconcile_deletions(State(state.clone())).await;
        assert_eq!(removed.0.removed, vec![2]);

        let session = get_session(State(state.clone())).await;
        assert_eq!(
            session.0.notes.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(session.0.selected_id, Some(3));
    }

    #[tokio::test]
    async fn test_create_conflicts_when_ids_exhausted() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new().with_value(
            sync::STATE_KEY,
            format!(r#"{{"notes":[{{"id":{},"title":"last","content":""}}]}}"#, NoteId::MAX),
        ));
        let engine = SyncEngine::load_on_start(gateway, sync::SyncConfig::default())
            .await
            .unwrap();
        let state = Arc::new(AppState::new(engine));

        let rejected = create_note(State(state.clone())).await;
        assert_eq!(rejected.unwrap_err().0, StatusCode::CONFLICT);
        assert_eq!(state.engine.note_count(), 1);
    }

    #[test]
    fn test_status_event_shape() {
        let status = SaveStatus {
            saving: true,
            last_saved_at: None,
            failed_writes: 0,
        };
        let json = serde_json::to_value(StatusEvent::Status(&status)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "status",
                "saving": true,
                "lastSavedAt": null,
                "failedWrites": 0
            })
        );
    }
}
