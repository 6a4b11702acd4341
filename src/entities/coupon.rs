use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::product::CylinderCategory;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "flat")]
    Flat,
}

/// Which cylinder categories a coupon may be applied to.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum CouponApplicability {
    #[sea_orm(string_value = "Domestic")]
    Domestic,
    #[sea_orm(string_value = "Commercial")]
    Commercial,
    #[sea_orm(string_value = "Both")]
    Both,
}

impl CouponApplicability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Domestic => "Domestic",
            Self::Commercial => "Commercial",
            Self::Both => "Both",
        }
    }

    pub fn covers(self, category: CylinderCategory) -> bool {
        match self {
            Self::Both => true,
            Self::Domestic => category == CylinderCategory::Domestic,
            Self::Commercial => category == CylinderCategory::Commercial,
        }
    }
}

/// A redeemable discount rule. `code` is stored trimmed and upper-cased.
///
/// There is no usage counter column: the number of
/// `coupon_redemptions` rows for the code is the usage count.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_value: Decimal,
    pub applicable_category: CouponApplicability,
    pub min_order_amount: Option<Decimal>,
    /// Last calendar day on which the coupon is still valid.
    pub expires_on: Option<NaiveDate>,
    pub usage_limit: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_redemption::Entity")]
    Redemptions,
}

impl Related<super::coupon_redemption::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Redemptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
