use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::product::CylinderCategory;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "in-transit")]
    InTransit,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::InTransit => "in-transit",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Forward-only lifecycle: pending -> confirmed -> in-transit -> delivered,
    /// with cancellation allowed from any non-terminal state.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Confirmed)
            | (Self::Confirmed, Self::InTransit)
            | (Self::InTransit, Self::Delivered) => true,
            (current, Self::Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_name: String,
    pub phone: String,
    #[sea_orm(column_type = "Text")]
    pub address: String,
    pub category: CylinderCategory,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
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

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if insert {
            check_pricing_invariant(&self)?;
            return Ok(self);
        }

        // Price fields are fixed at creation time.
        let pricing_touched = [&self.unit_price, &self.subtotal, &self.discount, &self.total]
            .iter()
            .any(|field| matches!(field, ActiveValue::Set(_)))
            || matches!(self.quantity, ActiveValue::Set(_))
            || matches!(self.coupon_code, ActiveValue::Set(_));
        if pricing_touched {
            return Err(DbErr::Custom(
                "order pricing fields are immutable after creation".to_string(),
            ));
        }

        Ok(self)
    }
}

fn check_pricing_invariant(model: &ActiveModel) -> Result<(), DbErr> {
    let (
        ActiveValue::Set(unit_price),
        ActiveValue::Set(quantity),
        ActiveValue::Set(subtotal),
        ActiveValue::Set(discount),
        ActiveValue::Set(total),
    ) = (
        &model.unit_price,
        &model.quantity,
        &model.subtotal,
        &model.discount,
        &model.total,
    )
    else {
        return Err(DbErr::Custom(
            "order pricing fields must all be set on insert".to_string(),
        ));
    };

    if *quantity < 1
        || *subtotal != *unit_price * Decimal::from(*quantity)
        || *discount < Decimal::ZERO
        || *discount > *subtotal
        || *total != *subtotal - *discount
    {
        return Err(DbErr::Custom(format!(
            "order pricing invariant violated: {} x {} = {}, discount {}, total {}",
            unit_price, quantity, subtotal, discount, total
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sea_orm::Set;

    fn priced(unit_price: Decimal, quantity: i32, discount: Decimal, total: Decimal) -> ActiveModel {
        ActiveModel {
            unit_price: Set(unit_price),
            quantity: Set(quantity),
            subtotal: Set(unit_price * Decimal::from(quantity)),
            discount: Set(discount),
            total: Set(total),
            ..Default::default()
        }
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::InTransit));
        assert!(OrderStatus::InTransit.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn cancellation_only_from_open_states() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::InTransit.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&OrderStatus::InTransit).unwrap();
        assert_eq!(json, "\"in-transit\"");
        assert_eq!(OrderStatus::InTransit.as_str(), "in-transit");
    }

    #[test]
    fn invariant_accepts_consistent_pricing() {
        let model = priced(dec!(3000), 3, dec!(900), dec!(8100));
        assert!(check_pricing_invariant(&model).is_ok());
    }

    #[test]
    fn invariant_rejects_mismatched_total() {
        let model = priced(dec!(2500), 2, dec!(0), dec!(4999));
        assert!(check_pricing_invariant(&model).is_err());
    }

    #[test]
    fn invariant_rejects_discount_above_subtotal() {
        let model = priced(dec!(100), 1, dec!(150), dec!(-50));
        assert!(check_pricing_invariant(&model).is_err());
    }
}
