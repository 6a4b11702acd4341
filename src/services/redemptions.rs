//! Redemption ledger: one row per order that applied a coupon.
//!
//! The number of rows for a code is the coupon's usage count. The UNIQUE
//! constraint on `coupon_code` is what stops two concurrent commits from
//! both spending the same code; the usage-limit check in the evaluator only
//! runs before the write and cannot.

use crate::entities::{coupon_redemption, CouponRedemption, CouponRedemptionModel};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("coupon {0} already has a redemption recorded")]
    Duplicate(String),
    #[error("ledger storage error: {0}")]
    Storage(#[source] DbErr),
}

/// Authoritative "times used" counter for `code` (already normalized).
pub async fn count_usage<C: ConnectionTrait>(conn: &C, code: &str) -> Result<u64, DbErr> {
    CouponRedemption::find()
        .filter(coupon_redemption::Column::CouponCode.eq(code))
        .count(conn)
        .await
}

/// Appends a ledger row. `conn` may be a transaction so the row commits or
/// rolls back together with its order.
#[instrument(skip(conn))]
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    order_id: Uuid,
    discount_amount: Decimal,
) -> Result<CouponRedemptionModel, LedgerError> {
    let entry = coupon_redemption::ActiveModel {
        id: Set(Uuid::new_v4()),
        coupon_code: Set(code.to_string()),
        order_id: Set(order_id),
        discount_amount: Set(discount_amount),
        created_at: Set(Utc::now()),
    };

    match entry.insert(conn).await {
        Ok(model) => {
            debug!(coupon_code = code, %order_id, "Redemption recorded");
            Ok(model)
        }
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Err(LedgerError::Duplicate(code.to_string())),
            _ => Err(LedgerError::Storage(err)),
        },
    }
}

/// Ledger rows for `code`, oldest first.
pub async fn list_for_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Vec<CouponRedemptionModel>, DbErr> {
    CouponRedemption::find()
        .filter(coupon_redemption::Column::CouponCode.eq(code))
        .order_by_asc(coupon_redemption::Column::CreatedAt)
        .all(conn)
        .await
}
