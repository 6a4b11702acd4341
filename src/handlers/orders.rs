use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
};
use crate::{
    entities::{CylinderCategory, OrderModel, OrderStatus},
    errors::ApiError,
    services::{
        orders::CreateOrderInput,
        pricing::{CommitOutcome, PricingResult, RedemptionStatus},
    },
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{10,15}$").unwrap());

/// Customer-facing order endpoints
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_order))
        .route("/quote", post(quote_order))
        .route("/:id", get(get_order))
}

/// Admin order endpoints; mounted behind the admin token check
pub fn admin_orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id/status", patch(update_order_status))
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    pub category: CylinderCategory,
    #[validate(range(min = 1, max = 999))]
    pub quantity: i32,
    #[validate(length(max = 32))]
    pub coupon_code: Option<String>,
}

/// Any price fields a client sends are ignored by deserialization.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 2, max = 100))]
    pub customer_name: String,
    #[validate(regex = "PHONE_RE")]
    pub phone: String,
    #[validate(length(min = 5, max = 500))]
    pub address: String,
    pub category: CylinderCategory,
    #[validate(range(min = 1, max = 999))]
    pub quantity: i32,
    #[validate(length(max = 32))]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub category: CylinderCategory,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
}

impl QuoteResponse {
    fn new(category: CylinderCategory, quantity: i32, pricing: PricingResult) -> Self {
        Self {
            category,
            quantity,
            unit_price: pricing.unit_price,
            subtotal: pricing.subtotal,
            discount: pricing.discount,
            total: pricing.total,
            coupon_code: pricing.applied_coupon_code,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: Uuid,
    pub price_per_cylinder: Decimal,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total_price: Decimal,
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
    pub redemption: RedemptionStatus,
    pub created_at: DateTime<Utc>,
}

impl From<CommitOutcome> for OrderCreatedResponse {
    fn from(outcome: CommitOutcome) -> Self {
        let order = outcome.order;
        Self {
            order_id: order.id,
            price_per_cylinder: order.unit_price,
            subtotal: order.subtotal,
            discount: order.discount,
            total_price: order.total,
            coupon_code: order.coupon_code,
            status: order.status,
            redemption: outcome.redemption,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// Price an order without placing it
async fn quote_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let pricing = state
        .services
        .pricing
        .quote(payload.category, payload.quantity, payload.coupon_code.as_deref())
        .await
        .map_err(|e| map_service_error(e.into()))?;

    Ok(success_response(QuoteResponse::new(
        payload.category,
        payload.quantity,
        pricing,
    )))
}

/// Place an order
async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let input = CreateOrderInput {
        customer_name: payload.customer_name,
        phone: payload.phone,
        address: payload.address,
        category: payload.category,
        quantity: payload.quantity,
        coupon_code: payload.coupon_code,
    };

    let outcome = state
        .services
        .orders
        .create_order(input)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(OrderCreatedResponse::from(outcome)))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let list = state
        .services
        .orders
        .list_orders(query.status, query.page, query.per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::<OrderModel>::new(
        list.orders,
        list.page,
        list.per_page,
        list.total,
    )))
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .update_status(id, payload.status)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}
