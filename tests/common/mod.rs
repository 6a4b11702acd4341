#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use chrono::NaiveDate;
use gas_orders_api::{
    config::{AppConfig, LedgerCommitMode},
    db,
    entities::{CouponApplicability, CouponModel, CylinderCategory, DiscountKind, ProductModel},
    handlers::AppServices,
    services::{catalog::UpsertProductInput, coupons::CreateCouponInput},
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "test-admin-token-0123456789abcdef";

/// Application state and router over a fresh on-disk SQLite database.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_commit_mode(mode: LedgerCommitMode) -> Self {
        Self::with_config(|cfg| cfg.ledger_commit_mode = mode).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("gas_orders_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 8;
        cfg.db_min_connections = 1;
        cfg.admin_api_token = Some(ADMIN_TOKEN.to_string());
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = Arc::new(AppState::new(Arc::new(pool), cfg));
        let router = gas_orders_api::app_router(state.clone());

        Self {
            router,
            state,
            _dir: dir,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn admin_request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(ADMIN_TOKEN)).await
    }

    pub async fn seed_product(
        &self,
        category: CylinderCategory,
        unit_price: Decimal,
        in_stock: bool,
    ) -> ProductModel {
        self.services()
            .catalog
            .upsert_product(
                category,
                UpsertProductInput {
                    unit_price,
                    in_stock,
                },
            )
            .await
            .expect("seed product for tests")
    }

    pub async fn seed_coupon(&self, fixture: CouponFixture) -> CouponModel {
        self.services()
            .coupons
            .create_coupon(CreateCouponInput {
                code: fixture.code.to_string(),
                discount_kind: fixture.kind,
                discount_value: fixture.value,
                applicable_category: Some(fixture.applicable),
                min_order_amount: fixture.min_order_amount,
                expires_on: fixture.expires_on,
                usage_limit: Some(fixture.usage_limit),
                is_active: Some(fixture.is_active),
            })
            .await
            .expect("seed coupon for tests")
    }
}

/// Coupon fixture; start from [`CouponFixture::percentage`] or [`CouponFixture::flat`].
#[derive(Clone, Debug)]
pub struct CouponFixture {
    pub code: &'static str,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub applicable: CouponApplicability,
    pub min_order_amount: Option<Decimal>,
    pub expires_on: Option<NaiveDate>,
    pub usage_limit: i32,
    pub is_active: bool,
}

impl CouponFixture {
    pub fn percentage(code: &'static str, value: Decimal) -> Self {
        Self::new(code, DiscountKind::Percentage, value)
    }

    pub fn flat(code: &'static str, value: Decimal) -> Self {
        Self::new(code, DiscountKind::Flat, value)
    }

    fn new(code: &'static str, kind: DiscountKind, value: Decimal) -> Self {
        Self {
            code,
            kind,
            value,
            applicable: CouponApplicability::Both,
            min_order_amount: None,
            expires_on: None,
            usage_limit: 100,
            is_active: true,
        }
    }

    pub fn applicable(mut self, applicable: CouponApplicability) -> Self {
        self.applicable = applicable;
        self
    }

    pub fn min_order(mut self, amount: Decimal) -> Self {
        self.min_order_amount = Some(amount);
        self
    }

    pub fn expires_on(mut self, date: NaiveDate) -> Self {
        self.expires_on = Some(date);
        self
    }

    pub fn usage_limit(mut self, limit: i32) -> Self {
        self.usage_limit = limit;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Reads a decimal that may have been serialized as a string or a number.
pub fn decimal_at(value: &Value, pointer: &str) -> Decimal {
    let field = value
        .pointer(pointer)
        .unwrap_or_else(|| panic!("missing {} in {}", pointer, value));
    match field {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("unexpected decimal representation {}", other),
    }
}
