pub mod coupon;
pub mod coupon_redemption;
pub mod order;
pub mod product;

pub use coupon::{
    CouponApplicability, DiscountKind, Entity as Coupon, Model as CouponModel,
};
pub use coupon_redemption::{Entity as CouponRedemption, Model as CouponRedemptionModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use product::{CylinderCategory, Entity as Product, Model as ProductModel};
