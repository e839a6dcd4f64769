//! Customer CRUD endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::{ApiError, AppState, PageQuery, not_found};
use crate::model::{Customer, CustomerPatch, NewCustomer};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_customers).post(create_customer))
        .route("/{id}", get(get_customer).patch(update_customer))
}

/// POST /v1/customers
async fn create_customer(
    State(state): State<AppState>,
    Json(customer): Json<NewCustomer>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    let created = state.db.insert_customer(&customer).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /v1/customers?page=&limit=
async fn list_customers(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Customer>>, ApiError> {
    let customers = state.db.list_customers(page.limit, page.offset()).await?;
    Ok(Json(customers))
}

/// GET /v1/customers/{id}
async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Customer>, ApiError> {
    state
        .db
        .get_customer(id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("customer", id))
}

/// PATCH /v1/customers/{id}
async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<CustomerPatch>,
) -> Result<Json<Customer>, ApiError> {
    state
        .db
        .update_customer(id, &patch)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("customer", id))
}
