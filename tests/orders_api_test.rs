mod common;

use axum::http::{Method, Request, StatusCode};
use common::{decimal_at, json_body, CouponFixture, TestApp, ADMIN_TOKEN};
use gas_orders_api::entities::CylinderCategory;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

fn order_payload(category: &str, quantity: i32, coupon: Option<&str>) -> Value {
    json!({
        "customer_name": "Sana Tariq",
        "phone": "03211234567",
        "address": "Flat 3, Askari 11, Lahore",
        "category": category,
        "quantity": quantity,
        "coupon_code": coupon,
    })
}

#[tokio::test]
async fn health_reports_database_up() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn create_order_returns_server_computed_prices() {
    let app = TestApp::new().await;
    app.seed_product(CylinderCategory::Commercial, dec!(3000), true).await;
    app.seed_coupon(CouponFixture::percentage("WELCOME10", dec!(10))).await;

    let mut payload = order_payload("Commercial", 3, Some("welcome10"));
    // Client-side prices are ignored.
    payload["total_price"] = json!(1);
    payload["price_per_cylinder"] = json!(1);

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), None)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(decimal_at(&body, "/data/price_per_cylinder"), dec!(3000));
    assert_eq!(decimal_at(&body, "/data/subtotal"), dec!(9000));
    assert_eq!(decimal_at(&body, "/data/discount"), dec!(900));
    assert_eq!(decimal_at(&body, "/data/total_price"), dec!(8100));
    assert_eq!(body["data"]["coupon_code"], "WELCOME10");
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["redemption"], "recorded");

    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();
    let fetched = app
        .request(Method::GET, &format!("/api/v1/orders/{}", order_id), None, None)
        .await;
    assert_eq!(fetched.status(), StatusCode::OK);
    let fetched = json_body(fetched).await;
    assert_eq!(decimal_at(&fetched, "/data/total"), dec!(8100));
}

#[tokio::test]
async fn quote_endpoint_prices_without_persisting() {
    let app = TestApp::new().await;
    app.seed_product(CylinderCategory::Domestic, dec!(2500), true).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/quote",
            Some(json!({ "category": "Domestic", "quantity": 2 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(decimal_at(&body, "/data/subtotal"), dec!(5000));
    assert_eq!(decimal_at(&body, "/data/total"), dec!(5000));
    assert!(body["data"]["coupon_code"].is_null());

    let listed = app
        .admin_request(Method::GET, "/api/v1/admin/orders", None)
        .await;
    let listed = json_body(listed).await;
    assert_eq!(listed["data"]["pagination"]["total"], 0);
}

#[tokio::test]
async fn invalid_order_fields_are_rejected() {
    let app = TestApp::new().await;
    app.seed_product(CylinderCategory::Domestic, dec!(2500), true).await;

    let mut bad_phone = order_payload("Domestic", 1, None);
    bad_phone["phone"] = json!("0300-123");
    let response = app
        .request(Method::POST, "/api/v1/orders", Some(bad_phone), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload("Domestic", 1000, None)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"], "Bad Request");
    assert!(body["message"].as_str().unwrap().contains("quantity"));
}

#[tokio::test]
async fn coupon_rejection_reports_reason_code() {
    let app = TestApp::new().await;
    app.seed_product(CylinderCategory::Domestic, dec!(1500), true).await;
    app.seed_coupon(CouponFixture::flat("BIGSPEND", dec!(300)).min_order(dec!(5000)))
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload("Domestic", 2, Some("BIGSPEND"))),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["details"], "below_minimum");
    assert_eq!(body["message"], "Minimum order amount of 5000 required");
}

#[tokio::test]
async fn out_of_stock_is_unprocessable() {
    let app = TestApp::new().await;
    app.seed_product(CylinderCategory::Commercial, dec!(3000), false).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload("Commercial", 1, None)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = json_body(response).await;
    assert_eq!(body["message"], "Product currently out of stock");
}

#[tokio::test]
async fn unconfigured_catalog_hides_internal_detail() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload("Domestic", 1, None)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = json_body(response).await;
    assert_eq!(body["message"], "Product catalog is not configured");
}

#[tokio::test]
async fn validate_coupon_endpoint() {
    let app = TestApp::new().await;
    app.seed_product(CylinderCategory::Domestic, dec!(2500), true).await;
    app.seed_coupon(CouponFixture::flat("FLAT500", dec!(500))).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "flat500", "category": "Domestic", "quantity": 2 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["valid"], true);
    assert_eq!(body["data"]["code"], "FLAT500");
    assert_eq!(decimal_at(&body, "/data/discount"), dec!(500));
    assert_eq!(decimal_at(&body, "/data/total"), dec!(4500));

    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "NOPE", "category": "Domestic", "quantity": 2 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["details"], "not_found");
    assert_eq!(body["message"], "Invalid coupon code");
}

#[tokio::test]
async fn validate_coupon_matches_quote() {
    let app = TestApp::new().await;
    app.seed_product(CylinderCategory::Commercial, dec!(3200), true).await;
    app.seed_coupon(CouponFixture::percentage("SAVE15", dec!(15))).await;

    let validated = json_body(
        app.request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "save15", "category": "Commercial", "quantity": 3 })),
            None,
        )
        .await,
    )
    .await;
    let quoted = json_body(
        app.request(
            Method::POST,
            "/api/v1/orders/quote",
            Some(json!({ "category": "Commercial", "quantity": 3, "coupon_code": "save15" })),
            None,
        )
        .await,
    )
    .await;

    assert_eq!(
        decimal_at(&validated, "/data/subtotal"),
        decimal_at(&quoted, "/data/subtotal")
    );
    assert_eq!(
        decimal_at(&validated, "/data/discount"),
        decimal_at(&quoted, "/data/discount")
    );
    assert_eq!(
        decimal_at(&validated, "/data/total"),
        decimal_at(&quoted, "/data/total")
    );
    assert_eq!(decimal_at(&validated, "/data/total"), dec!(8160));
}

#[tokio::test]
async fn validate_coupon_checks_stock_and_blank_codes() {
    let app = TestApp::new().await;
    app.seed_product(CylinderCategory::Domestic, dec!(2500), false).await;
    app.seed_coupon(CouponFixture::flat("FLAT500", dec!(500))).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "FLAT500", "category": "Domestic", "quantity": 1 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json_body(response).await["message"],
        "Product currently out of stock"
    );

    let restocked = app
        .admin_request(
            Method::PUT,
            "/api/v1/admin/products/Domestic",
            Some(json!({ "unit_price": "2500", "in_stock": true })),
        )
        .await;
    assert_eq!(restocked.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "   ", "category": "Domestic", "quantity": 1 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Bad Request");
}

#[tokio::test]
async fn order_listing_defaults_to_first_page() {
    let app = TestApp::new().await;

    let response = app
        .admin_request(Method::GET, "/api/v1/admin/orders", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["pagination"]["page"], 1);
    assert_eq!(body["data"]["pagination"]["per_page"], 20);
}

#[tokio::test]
async fn admin_routes_require_token() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/admin/coupons", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/v1/admin/coupons", None, Some("wrong-token"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/v1/admin/coupons", None, Some(ADMIN_TOKEN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_manages_catalog_and_coupons() {
    let app = TestApp::new().await;

    let response = app
        .admin_request(
            Method::PUT,
            "/api/v1/admin/products/Domestic",
            Some(json!({ "unit_price": "2500" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let products = json_body(
        app.request(Method::GET, "/api/v1/products", None, None)
            .await,
    )
    .await;
    assert_eq!(products["data"][0]["category"], "Domestic");
    assert_eq!(decimal_at(&products, "/data/0/unit_price"), dec!(2500));

    let response = app
        .admin_request(
            Method::POST,
            "/api/v1/admin/coupons",
            Some(json!({
                "code": "summer5",
                "discount_kind": "percentage",
                "discount_value": "5",
                "usage_limit": 3
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["data"]["code"], "SUMMER5");

    let duplicate = app
        .admin_request(
            Method::POST,
            "/api/v1/admin/coupons",
            Some(json!({
                "code": "SUMMER5",
                "discount_kind": "flat",
                "discount_value": "100"
            })),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let response = app
        .admin_request(
            Method::PUT,
            "/api/v1/admin/coupons/SUMMER5",
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = json_body(response).await;
    assert_eq!(updated["data"]["is_active"], false);

    let response = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "SUMMER5", "category": "Domestic", "quantity": 1 })),
            None,
        )
        .await;
    let body = json_body(response).await;
    assert_eq!(body["details"], "inactive");

    let response = app
        .admin_request(Method::DELETE, "/api/v1/admin/coupons/summer5", None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .admin_request(Method::DELETE, "/api/v1/admin/coupons/summer5", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn redemption_report_lists_ledger_rows() {
    let app = TestApp::new().await;
    app.seed_product(CylinderCategory::Domestic, dec!(2500), true).await;
    app.seed_coupon(CouponFixture::flat("ONEOFF", dec!(300))).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload("Domestic", 1, Some("ONEOFF"))),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order_id = json_body(response).await["data"]["order_id"].clone();

    let response = app
        .admin_request(Method::GET, "/api/v1/admin/coupons/ONEOFF/redemptions", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["times_used"], 1);
    assert_eq!(body["data"]["redemptions"][0]["order_id"], order_id);
}

#[tokio::test]
async fn order_status_transitions_via_admin() {
    let app = TestApp::new().await;
    app.seed_product(CylinderCategory::Domestic, dec!(2500), true).await;

    let created = json_body(
        app.request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload("Domestic", 1, None)),
            None,
        )
        .await,
    )
    .await;
    let order_id = created["data"]["order_id"].as_str().unwrap().to_string();
    let status_uri = format!("/api/v1/admin/orders/{}/status", order_id);

    let response = app
        .admin_request(Method::PATCH, &status_uri, Some(json!({ "status": "confirmed" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["status"], "confirmed");

    let response = app
        .admin_request(Method::PATCH, &status_uri, Some(json!({ "status": "pending" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let listed = json_body(
        app.admin_request(Method::GET, "/api/v1/admin/orders?status=confirmed", None)
            .await,
    )
    .await;
    assert_eq!(listed["data"]["pagination"]["total"], 1);
    assert_eq!(listed["data"]["items"][0]["id"], order_id.as_str());
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", uuid::Uuid::new_v4()),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn error_body_echoes_request_id() {
    let app = TestApp::new().await;
    let router = gas_orders_api::app_router(app.state.clone());

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/api/v1/admin/orders")
                .header("x-request-id", "trace-me-7")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-me-7");
    let body = json_body(response).await;
    assert_eq!(body["request_id"], "trace-me-7");
}
