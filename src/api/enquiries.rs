//! Enquiry endpoints: portal creation, CRUD, bulk intake, parsing status.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ApiError, AppState, not_found};
use crate::error::{Error, ValidationError};
use crate::ingest::IncomingEmail;
use crate::model::{Customer, Enquiry, EnquiryPatch, EnquiryStatus, ParsingRecord};
use crate::pipeline::PortalSubmission;
use crate::pipeline::types::{BatchOutcome, InboundEmail};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_enquiries).post(create_enquiry))
        .route("/bulk", post(process_bulk))
        .route("/{id}", get(get_enquiry).patch(update_enquiry))
        .route("/{id}/status", get(get_parsing_status))
        .route("/{id}/dashboard", get(get_dashboard))
}

/// POST /v1/enquiries — the strict portal path.
async fn create_enquiry(
    State(state): State<AppState>,
    Json(submission): Json<PortalSubmission>,
) -> Result<(StatusCode, Json<Enquiry>), ApiError> {
    let enquiry = state.assembler.assemble_portal(&submission).await?;
    Ok((StatusCode::CREATED, Json(enquiry)))
}

#[derive(Debug, Deserialize)]
struct EnquiryListQuery {
    #[serde(default)]
    status: Option<String>,
    // serde(flatten) breaks numeric query params, so pagination is inlined.
    #[serde(default = "crate::api::default_page")]
    page: usize,
    #[serde(default = "crate::api::default_limit")]
    limit: usize,
}

/// GET /v1/enquiries?status=&page=&limit=
async fn list_enquiries(
    State(state): State<AppState>,
    Query(query): Query<EnquiryListQuery>,
) -> Result<Json<Vec<Enquiry>>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(s) => Some(EnquiryStatus::parse(s).ok_or(ValidationError::InvalidField {
            field: "status",
            value: s.to_string(),
        })?),
    };
    let offset = query.page.saturating_sub(1) * query.limit;
    let enquiries = state
        .db
        .list_enquiries(status, query.limit, offset)
        .await?;
    Ok(Json(enquiries))
}

/// GET /v1/enquiries/{id}
async fn get_enquiry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Enquiry>, ApiError> {
    state
        .db
        .get_enquiry(id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("enquiry", id))
}

/// PATCH /v1/enquiries/{id}
async fn update_enquiry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<EnquiryPatch>,
) -> Result<Json<Enquiry>, ApiError> {
    state
        .db
        .update_enquiry(id, &patch)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("enquiry", id))
}

// ── Bulk intake ─────────────────────────────────────────────────────

/// Bulk request: a list of attributed inbound emails.
#[derive(Debug, Deserialize)]
pub struct BulkEnquiryRequest {
    pub emails: Vec<InboundEmail>,
}

/// POST /v1/enquiries/bulk
///
/// 202: the batch was attempted in full; per-item verdicts are in the body.
async fn process_bulk(
    State(state): State<AppState>,
    Json(request): Json<BulkEnquiryRequest>,
) -> (StatusCode, Json<BatchOutcome>) {
    let outcome = state.batch.process(&request.emails).await;
    (StatusCode::ACCEPTED, Json(outcome))
}

// ── Parsing status & dashboard ──────────────────────────────────────

/// GET /v1/enquiries/{id}/status
async fn get_parsing_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParsingRecord>, ApiError> {
    state
        .db
        .get_parsing_record(id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("parsing status", id))
}

/// Enquiry plus its customer, for dashboard display.
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub enquiry: Enquiry,
    pub customer: Customer,
}

/// GET /v1/enquiries/{id}/dashboard
async fn get_dashboard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let enquiry = state
        .db
        .get_enquiry(id)
        .await?
        .ok_or_else(|| not_found("enquiry", id))?;
    let customer = state
        .db
        .get_customer(enquiry.customer_id)
        .await?
        .ok_or_else(|| not_found("customer", enquiry.customer_id))?;
    Ok(Json(DashboardResponse { enquiry, customer }))
}

// ── Raw email ingestion ─────────────────────────────────────────────

/// One raw email as delivered by the inbox trigger.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub email_content: String,
    pub sender: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

/// POST /v1/ingest
///
/// Runs the full extraction pipeline on one email. 503 when no LLM backend
/// is configured.
pub async fn ingest_email(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<(StatusCode, Json<Enquiry>), ApiError> {
    let Some(ingestor) = &state.ingestor else {
        return Err(ApiError::from(Error::Config(
            crate::error::ConfigError::MissingEnvVar("no LLM backend configured".to_string()),
        )));
    };

    let email = IncomingEmail {
        body: request.email_content,
        sender: request.sender,
        cc: request.cc,
        received_at: request.received_at.unwrap_or_else(Utc::now),
    };
    let enquiry = ingestor.ingest(&email).await?;
    Ok((StatusCode::CREATED, Json(enquiry)))
}
