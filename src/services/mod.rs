//! Business logic. `catalog`, `coupons`, `redemptions` and `pricing` form the
//! pricing engine; `orders` wraps it for the HTTP layer.

pub mod catalog;
pub mod coupons;
pub mod orders;
pub mod pricing;
pub mod redemptions;
