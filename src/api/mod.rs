//! HTTP read API.
//!
//! | Method/Path          | Success               | Failure         |
//! |----------------------|-----------------------|-----------------|
//! | `GET /messages/{id}` | 200, message          | 400, 404, 500   |
//! | `GET /messages`      | 200, array of messages| 404, 500        |
//! | `GET /health`        | 200, empty body       |                 |

mod error;

pub use error::{ApiError, ApiErrorBody};

use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::message::Message;
use crate::service::{QueryService, ServiceError};

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn QueryService>,
}

impl AppState {
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        Self { service }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/messages", get(get_all_messages))
        .route("/messages/{message_id}", get(get_message))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

const INVALID_ID: &str = "message id should be a number";

fn parse_message_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>().map_err(|_| ApiError::bad_request(INVALID_ID))
}

fn log_internal(err: &ServiceError) {
    if let ServiceError::Internal(message) = err {
        error!(error = %message, "Store failure while serving request");
    }
}

async fn get_message(
    State(state): State<AppState>,
    message_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Message>, ApiError> {
    // Segments that do not decode (e.g. invalid UTF-8) are not numbers either
    let Path(message_id) = message_id.map_err(|rejection| {
        debug!(error = %rejection, "Rejected message id segment");
        ApiError::bad_request(INVALID_ID)
    })?;
    let id = parse_message_id(&message_id)?;

    let message = state.service.get_message(id).await.map_err(|e| {
        log_internal(&e);
        ApiError::from(e)
    })?;

    Ok(Json(message))
}

async fn get_all_messages(State(state): State<AppState>) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.service.get_all_messages().await.map_err(|e| {
        log_internal(&e);
        ApiError::from(e)
    })?;

    Ok(Json(messages))
}
