use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cylinder type. Products and coupon applicability are keyed on it.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum CylinderCategory {
    #[sea_orm(string_value = "Domestic")]
    Domestic,
    #[sea_orm(string_value = "Commercial")]
    Commercial,
}

impl CylinderCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Domestic => "Domestic",
            Self::Commercial => "Commercial",
        }
    }
}

/// One purchasable category. Exactly one row exists per category.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub category: CylinderCategory,
    pub unit_price: Decimal,
    pub in_stock: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
