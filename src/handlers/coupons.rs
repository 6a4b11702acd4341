use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::{
    entities::CylinderCategory,
    errors::ApiError,
    services::coupons::{CreateCouponInput, UpdateCouponInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Customer-facing coupon endpoints
pub fn coupons_routes() -> Router<Arc<AppState>> {
    Router::new().route("/validate", post(validate_coupon))
}

/// Admin coupon management; mounted behind the admin token check
pub fn admin_coupons_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_coupons).post(create_coupon))
        .route("/:code", put(update_coupon).delete(delete_coupon))
        .route("/:code/redemptions", get(coupon_redemptions))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    pub category: CylinderCategory,
    #[validate(range(min = 1, max = 999))]
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct ValidateCouponResponse {
    pub valid: bool,
    pub code: String,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Checks a coupon against the current price of `quantity` cylinders
/// without placing an order. Runs the same quote as order creation.
async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ValidateCouponRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let pricing = state
        .services
        .pricing
        .quote(payload.category, payload.quantity, Some(&payload.code))
        .await
        .map_err(|e| map_service_error(e.into()))?;

    // A blank code prices as "no coupon"; there is nothing to validate.
    let Some(code) = pricing.applied_coupon_code else {
        return Err(ApiError::ValidationError(
            "Validation failed: code must not be blank".to_string(),
        ));
    };

    Ok(success_response(ValidateCouponResponse {
        valid: true,
        code,
        subtotal: pricing.subtotal,
        discount: pricing.discount,
        total: pricing.total,
    }))
}

async fn list_coupons(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let coupons = state
        .services
        .coupons
        .list_coupons()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(coupons))
}

async fn create_coupon(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCouponInput>,
) -> Result<impl IntoResponse, ApiError> {
    let coupon = state
        .services
        .coupons
        .create_coupon(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(coupon))
}

async fn update_coupon(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(payload): Json<UpdateCouponInput>,
) -> Result<impl IntoResponse, ApiError> {
    let coupon = state
        .services
        .coupons
        .update_coupon(&code, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(coupon))
}

async fn delete_coupon(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .coupons
        .delete_coupon(&code)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

async fn coupon_redemptions(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .services
        .coupons
        .redemption_report(&code)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(report))
}
