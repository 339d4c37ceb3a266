//! HTTP surface: the JSON save API and the static client.

use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use neon_core::save::{is_valid_save_id, SaveStore, StoreError};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::{self, JoinError};
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{debug, error};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn SaveStore>,
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    id: String,
    data: Value,
}

#[derive(Debug, Error)]
enum ApiError {
    #[error("Save not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("Failed to access save store")]
    Store(#[from] StoreError),
    #[error("Save task failed")]
    Join(#[from] JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(err) => {
                error!(?err, "Save store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Join(err) => {
                error!(?err, "Save store task failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the application router.
///
/// When `static_dir` is given, unmatched paths are served from it and fall
/// back to its `index.html`.
pub fn router(store: Arc<dyn SaveStore>, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/api/save/:id", get(load_save))
        .route("/api/save", post(store_save))
        .with_state(AppState { store });

    let app = match static_dir {
        Some(dir) => {
            let index = dir.join("index.html");
            api.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)))
        }
        None => api,
    };
    app.layer(TraceLayer::new_for_http())
}

async fn load_save(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    // Nothing can be stored under an invalid id.
    if !is_valid_save_id(&id) {
        return Err(ApiError::NotFound);
    }
    let store = Arc::clone(&app.store);
    let record = task::spawn_blocking(move || store.get(&id))
        .await??
        .ok_or(ApiError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], record.data).into_response())
}

async fn store_save(
    State(app): State<AppState>,
    payload: Result<Json<SaveRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    if !is_valid_save_id(&request.id) {
        return Err(ApiError::BadRequest(format!("Invalid save id `{}`", request.id)));
    }
    if !request.data.is_object() {
        return Err(ApiError::BadRequest("Save data must be a JSON object".to_string()));
    }

    let data = serde_json::to_string(&request.data).map_err(StoreError::from)?;
    let store = Arc::clone(&app.store);
    let id = request.id;
    let record = task::spawn_blocking(move || store.put(&id, &data)).await??;
    debug!(save_id = %record.id, updated_at = %record.updated_at, "Save stored");
    Ok(Json(json!({ "success": true })))
}
