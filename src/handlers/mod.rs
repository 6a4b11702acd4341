pub mod common;
pub mod coupons;
pub mod orders;
pub mod products;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{
        catalog::CatalogService, coupons::CouponService, orders::OrderService,
        pricing::PricingService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub coupons: Arc<CouponService>,
    pub pricing: Arc<PricingService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    /// Wires the pricing engine from configuration. Every storage call the
    /// engine makes is bounded by `storage_timeout_ms`.
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig) -> Self {
        let deadline = config.storage_timeout();

        let catalog = CatalogService::new(db_pool.clone(), deadline);
        let coupons = CouponService::new(
            db_pool.clone(),
            deadline,
            config.default_usage_limit,
            config.business_offset(),
        );
        let pricing = PricingService::new(
            db_pool.clone(),
            catalog.clone(),
            coupons.clone(),
            deadline,
            config.ledger_commit_mode,
        );
        let orders = OrderService::new(db_pool, pricing.clone());

        Self {
            catalog: Arc::new(catalog),
            coupons: Arc::new(coupons),
            pricing: Arc::new(pricing),
            orders: Arc::new(orders),
        }
    }
}
