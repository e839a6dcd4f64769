//! Product catalog endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ApiError, AppState, not_found};
use crate::error::ValidationError;
use crate::model::{ApprovalStatus, Flag, NewProduct, Product};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/validate", post(validate_products))
        .route("/{id}", get(get_product))
}

/// POST /v1/products
async fn create_product(
    State(state): State<AppState>,
    Json(product): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let created = state.db.insert_product(&product).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
struct ProductListQuery {
    #[serde(default)]
    approval_status: Option<String>,
    // serde(flatten) breaks numeric query params, so pagination is inlined.
    #[serde(default = "crate::api::default_page")]
    page: usize,
    #[serde(default = "crate::api::default_limit")]
    limit: usize,
}

/// GET /v1/products?approval_status=&page=&limit=
async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let approval = match query.approval_status.as_deref() {
        None => None,
        Some(s) => Some(ApprovalStatus::parse(s).ok_or(ValidationError::InvalidField {
            field: "approval_status",
            value: s.to_string(),
        })?),
    };
    let offset = query.page.saturating_sub(1) * query.limit;
    let products = state
        .db
        .list_products(approval, query.limit, offset)
        .await?;
    Ok(Json(products))
}

/// GET /v1/products/{id}
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, ApiError> {
    state
        .db
        .get_product(id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("product", id))
}

// ── Validation ──────────────────────────────────────────────────────

/// One line item to check against the catalog.
#[derive(Debug, Deserialize)]
pub struct ValidationRequest {
    #[serde(default)]
    pub enquiry_id: Option<Uuid>,
    #[serde(default)]
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub cas_number: Option<String>,
    #[serde(default)]
    pub cat_number: Option<String>,
}

/// Membership verdict for one line item.
#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub enquiry_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub flag: Flag,
    pub reason: &'static str,
}

/// POST /v1/products/validate
///
/// Checks each item against the catalog by product id, CAS number, or catalog
/// number. Purely a read — nothing is created.
async fn validate_products(
    State(state): State<AppState>,
    Json(request): Json<Vec<ValidationRequest>>,
) -> Result<Json<Vec<ValidationResponse>>, ApiError> {
    let mut results = Vec::with_capacity(request.len());
    for item in request {
        let mut matched = match item.product_id {
            Some(id) => state.db.get_product(id).await?.is_some(),
            None => false,
        };
        if !matched {
            matched = state
                .db
                .find_product_by_identifiers(
                    None,
                    item.cas_number.as_deref(),
                    item.cat_number.as_deref(),
                )
                .await?
                .is_some();
        }

        results.push(ValidationResponse {
            enquiry_id: item.enquiry_id,
            product_id: item.product_id,
            flag: if matched { Flag::Known } else { Flag::Unknown },
            reason: if matched {
                "Product found in catalog"
            } else {
                "Product not found"
            },
        });
    }
    Ok(Json(results))
}
