//! REST surface: `/v1` routers over customers, products, and enquiries.

pub mod customers;
pub mod enquiries;
pub mod products;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::error::{DatabaseError, Error, ValidationError};
use crate::ingest::EmailIngestor;
use crate::pipeline::{BatchProcessor, EnquiryAssembler};
use crate::store::Database;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub assembler: Arc<EnquiryAssembler>,
    pub batch: Arc<BatchProcessor>,
    /// Present only when an LLM backend is configured.
    pub ingestor: Option<Arc<EmailIngestor>>,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/v1/customers", customers::routes())
        .nest("/v1/products", products::routes())
        .nest("/v1/enquiries", enquiries::routes())
        .route("/v1/ingest", axum::routing::post(enquiries::ingest_email))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "healthy"}))
}

// ── Pagination ──────────────────────────────────────────────────────

/// `?page=&limit=` query parameters (1-based page).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub(crate) fn default_page() -> usize {
    1
}

pub(crate) fn default_limit() -> usize {
    10
}

impl PageQuery {
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.limit
    }
}

// ── Error mapping ───────────────────────────────────────────────────

/// Wrapper turning pipeline errors into `{code, message}` JSON responses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        Self(Error::Database(e))
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self(Error::Validation(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Duplicate { .. } => StatusCode::CONFLICT,
            Error::Database(DatabaseError::Constraint(_)) => StatusCode::BAD_REQUEST,
            Error::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Shorthand: a not-found error for an entity/id pair.
pub(crate) fn not_found(entity: &'static str, id: impl std::fmt::Display) -> ApiError {
    ApiError(Error::NotFound {
        entity,
        id: id.to_string(),
    })
}
