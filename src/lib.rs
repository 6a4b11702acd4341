//! Gas Orders API Library
//!
//! Order-taking backend for cylinder-gas delivery: server-side pricing,
//! coupon evaluation and redemption recording, plus admin catalog, coupon
//! and order lifecycle management.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod services;
pub mod tracing;

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::middleware_helpers::{request_id_middleware, require_admin_token, AdminToken};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let services = handlers::AppServices::new(db.clone(), &config);
        Self {
            db,
            config,
            services,
        }
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Versioned API: public order/coupon/catalog routes plus the admin routes,
/// which all sit behind the bearer-token check.
pub fn api_v1_routes(admin_token: AdminToken) -> Router<Arc<AppState>> {
    let admin = Router::new()
        .nest("/products", handlers::products::admin_products_routes())
        .nest("/coupons", handlers::coupons::admin_coupons_routes())
        .nest("/orders", handlers::orders::admin_orders_routes())
        .route_layer(axum::middleware::from_fn_with_state(
            admin_token,
            require_admin_token,
        ));

    Router::new()
        .nest("/orders", handlers::orders::orders_routes())
        .nest("/coupons", handlers::coupons::coupons_routes())
        .nest("/products", handlers::products::products_routes())
        .nest("/admin", admin)
}

/// Full application router with health check, HTTP tracing and request ids.
pub fn app_router(state: Arc<AppState>) -> Router {
    let admin_token = AdminToken::new(state.config.admin_api_token.clone());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes(admin_token))
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match db::check_connection(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "up" })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": "down" })),
        ),
    }
}
