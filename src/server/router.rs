use std::path::PathBuf;
use std::sync::Arc;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use crate::{
    BlobIngestor, Document, DocumentReader, DocumentWriter, Error, Result, SnapshotInfo, StoreInspector,
    StoreStatus, SyncStore, UploadRecord,
};
use crate::{DEFAULT_SAVE_LABEL, UNKNOWN_ACTOR};
use log::{error, info};

const DEFAULT_SAVE_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// HTTP front for a [`SyncStore`].
///
/// Routes:
/// - `GET  /api/status`
/// - `GET  /api/data`
/// - `POST /api/save[?label=]`
/// - `POST /api/upload?category=`
/// - `GET  /api/history`
/// - `GET  /files/<path>`: raw files under the storage root, no access control.
pub struct Router {
    store: Arc<dyn SyncStore>,
    files_root: PathBuf,
    port: u16,
    save_body_limit: usize,
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn SyncStore>,
    port: u16,
}

impl Router {
    pub fn new(store: Arc<dyn SyncStore>, files_root: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            store,
            files_root: files_root.into(),
            port,
            save_body_limit: DEFAULT_SAVE_BODY_LIMIT,
        }
    }

    pub fn with_save_body_limit(mut self, limit: usize) -> Self {
        self.save_body_limit = limit;
        self
    }

    pub fn build(&self) -> axum::Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let state = AppState {
            store: self.store.clone(),
            port: self.port,
        };

        axum::Router::new()
            .route("/api/status", get(status))
            .route("/api/data", get(load_data))
            .route(
                "/api/save",
                post(save_data).layer(DefaultBodyLimit::max(self.save_body_limit)),
            )
            .route("/api/upload", post(upload).layer(DefaultBodyLimit::disable()))
            .route("/api/history", get(history))
            .with_state(state)
            .nest_service("/files", ServeDir::new(&self.files_root))
            .layer(cors)
    }

    /// Binds `0.0.0.0:<port>` and serves until the task is dropped.
    pub async fn listen(&self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("DocVault listening on {}", listener.local_addr()?);
        axum::serve(listener, self.build())
            .await
            .map_err(|e| Error::Internal(format!("server error: {}", e)))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Busy => StatusCode::CONFLICT,
            Error::UploadRejected | Error::InvalidCategory(_) => StatusCode::BAD_REQUEST,
            Error::SnapshotNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
struct StatusBody {
    port: u16,
    #[serde(flatten)]
    status: StoreStatus,
    time: DateTime<Local>,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusBody>> {
    let status = state.store.status().await?;
    Ok(Json(StatusBody {
        port: state.port,
        status,
        time: Local::now(),
    }))
}

async fn load_data(State(state): State<AppState>) -> Result<Json<Document>> {
    Ok(Json(state.store.load().await?))
}

#[derive(Deserialize)]
struct SaveQuery {
    label: Option<String>,
}

async fn save_data(
    State(state): State<AppState>,
    Query(query): Query<SaveQuery>,
    Json(mut body): Json<Document>,
) -> Result<Json<serde_json::Value>> {
    let actor = body
        .as_object_mut()
        .and_then(|fields| fields.remove("currentUser"))
        .and_then(|user| user.get("name").and_then(|n| n.as_str()).map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_ACTOR.to_string());
    let label = query.label.unwrap_or_else(|| DEFAULT_SAVE_LABEL.to_string());

    let receipt = state.store.save(body, &label, &actor).await?;
    Ok(Json(json!({ "success": true, "time": receipt.time })))
}

#[derive(Deserialize)]
struct UploadQuery {
    category: Option<String>,
}

#[derive(Serialize)]
struct UploadBody {
    success: bool,
    record: UploadRecord,
}

async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadBody>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Internal(format!("failed to read multipart field: {}", e)))?
    {
        let original_name = match (field.file_name(), field.name()) {
            (Some(file_name), _) => file_name.to_string(),
            (None, Some("file")) => "file".to_string(),
            _ => continue,
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::Internal(format!("failed to read upload: {}", e)))?;

        let category = query.category.as_deref().unwrap_or_default();
        let record = state.store.ingest(bytes.to_vec(), &original_name, category).await?;
        return Ok(Json(UploadBody { success: true, record }));
    }
    Err(Error::UploadRejected)
}

async fn history(State(state): State<AppState>) -> Result<Json<Vec<SnapshotInfo>>> {
    Ok(Json(state.store.history().await?))
}
