use crate::handlers::common::{map_service_error, success_response};
use crate::{
    entities::CylinderCategory, errors::ApiError, services::catalog::UpsertProductInput, AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use std::sync::Arc;

/// Public catalog listing
pub fn products_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_products))
}

/// Admin catalog maintenance; mounted behind the admin token check
pub fn admin_products_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:category", put(upsert_product))
}

async fn list_products(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .list_products()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(products))
}

/// Set the unit price and stock flag for a category, creating the row if needed
async fn upsert_product(
    State(state): State<Arc<AppState>>,
    Path(category): Path<CylinderCategory>,
    Json(payload): Json<UpsertProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .upsert_product(category, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}
