//! HTTP API over the local library.
//!
//! Every `/api` response is a JSON object carrying `success`; failures add
//! an `error` message.

mod routes;

use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use maktaba_core::{Library, SyncError};
use serde::Serialize;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<Library>,
}

impl AppState {
    pub fn new(library: Library) -> Self {
        Self {
            library: Arc::new(library),
        }
    }
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/api/categories", get(routes::categories))
        .route("/api/authors", get(routes::authors))
        .route("/api/books", get(routes::books))
        .route("/api/books/{id}", get(routes::book))
        .route("/api/books/{id}/content", get(routes::book_content))
        .route("/api/search", get(routes::search))
        .route("/api/stats", get(routes::stats))
        .route("/api/sync/master", post(routes::sync_master))
        .route("/api/sync/book/{id}", post(routes::sync_book))
        .with_state(state)
}

/// Successful response: `success: true` plus the body's fields.
#[derive(Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

impl<T: Serialize> Success<T> {
    pub fn new(body: T) -> Json<Self> {
        Json(Self {
            success: true,
            body,
        })
    }
}

#[derive(Serialize)]
struct Failure {
    success: bool,
    error: String,
}

/// Handler error, rendered as a failure envelope.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Sync(SyncError),
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        ApiError::Sync(e)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Sync(e) => {
                tracing::error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (
            status,
            Json(Failure {
                success: false,
                error,
            }),
        )
            .into_response()
    }
}
