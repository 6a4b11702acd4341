use crate::{
    config::LedgerCommitMode,
    db::{with_deadline, DeadlineExceeded},
    entities::{order, CylinderCategory, OrderModel, OrderStatus},
    services::{
        catalog::CatalogService,
        coupons::{CouponResult, CouponService, RejectionReason},
        redemptions::{self, LedgerError},
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, Set, TransactionError, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const MIN_QUANTITY: i32 = 1;
pub const MAX_QUANTITY: i32 = 999;

/// Every failure the pricing engine reports. Lower-level errors are folded
/// into `Storage` or `Timeout` here and go no further.
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("no product configured for category {}", .0.as_str())]
    ProductNotFound(CylinderCategory),
    #[error("product currently out of stock: {}", .0.as_str())]
    OutOfStock(CylinderCategory),
    #[error("coupon rejected: {0}")]
    CouponRejected(RejectionReason),
    #[error("coupon {0} has already been redeemed")]
    AlreadyRedeemed(String),
    #[error("quantity {0} outside 1..=999")]
    InvalidQuantity(i32),
    #[error(transparent)]
    Timeout(#[from] DeadlineExceeded),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<DbErr> for PricingError {
    fn from(err: DbErr) -> Self {
        PricingError::Storage(err.to_string())
    }
}

impl From<LedgerError> for PricingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Duplicate(code) => PricingError::AlreadyRedeemed(code),
            LedgerError::Storage(e) => PricingError::Storage(e.to_string()),
        }
    }
}

/// Authoritative price for a prospective order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PricingResult {
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub applied_coupon_code: Option<String>,
}

/// Customer-supplied part of an order; every price comes from a [`PricingResult`].
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub category: CylinderCategory,
    pub quantity: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    Recorded,
    NotApplicable,
    /// Best-effort mode only: the order stands but no ledger row was written.
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct CommitOutcome {
    pub order: OrderModel,
    pub redemption: RedemptionStatus,
}

/// Composes catalog lookup, coupon evaluation and the redemption ledger into
/// `quote` and `commit`.
#[derive(Clone)]
pub struct PricingService {
    db: Arc<DatabaseConnection>,
    catalog: CatalogService,
    coupons: CouponService,
    deadline: Duration,
    commit_mode: LedgerCommitMode,
}

impl PricingService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: CatalogService,
        coupons: CouponService,
        deadline: Duration,
        commit_mode: LedgerCommitMode,
    ) -> Self {
        Self {
            db,
            catalog,
            coupons,
            deadline,
            commit_mode,
        }
    }

    /// Prices `quantity` cylinders of `category`, applying `coupon_code` when
    /// given. Stock is checked before any coupon work, and an explicitly
    /// supplied coupon that does not apply fails the whole quote.
    #[instrument(skip(self))]
    pub async fn quote(
        &self,
        category: CylinderCategory,
        quantity: i32,
        coupon_code: Option<&str>,
    ) -> Result<PricingResult, PricingError> {
        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
            return Err(PricingError::InvalidQuantity(quantity));
        }

        let pricing = self.catalog.get_pricing(category).await?;
        if !pricing.in_stock {
            counter!("gas_orders.quotes.out_of_stock", 1, "category" => category.as_str());
            return Err(PricingError::OutOfStock(category));
        }

        let subtotal = pricing.unit_price * Decimal::from(quantity);

        let (discount, applied_coupon_code) =
            match coupon_code.map(str::trim).filter(|code| !code.is_empty()) {
                None => (Decimal::ZERO, None),
                Some(code) => match self.coupons.evaluate(code, category, subtotal).await? {
                    CouponResult::Applied {
                        discount_amount,
                        normalized_code,
                    } => (discount_amount, Some(normalized_code)),
                    CouponResult::Rejected(reason) => {
                        counter!("gas_orders.coupons.rejected", 1, "reason" => reason.code());
                        return Err(PricingError::CouponRejected(reason));
                    }
                },
            };

        counter!("gas_orders.quotes.served", 1);
        Ok(PricingResult {
            unit_price: pricing.unit_price,
            subtotal,
            discount,
            total: subtotal - discount,
            applied_coupon_code,
        })
    }

    /// Persists the order with the quoted numbers and, when a coupon produced
    /// a discount, writes its ledger row. See [`LedgerCommitMode`] for how a
    /// ledger failure is handled.
    #[instrument(skip(self, order, pricing), fields(category = order.category.as_str(), quantity = order.quantity))]
    pub async fn commit(
        &self,
        order: NewOrder,
        pricing: PricingResult,
    ) -> Result<CommitOutcome, PricingError> {
        let redeem = pricing
            .applied_coupon_code
            .clone()
            .filter(|_| pricing.discount > Decimal::ZERO);
        let discount = pricing.discount;
        let model = order_active_model(order, pricing);
        let deadline = self.deadline;

        let outcome = match self.commit_mode {
            LedgerCommitMode::Atomic => self.commit_atomic(model, redeem, discount, deadline).await?,
            LedgerCommitMode::BestEffort => {
                self.commit_best_effort(model, redeem, discount, deadline)
                    .await?
            }
        };

        counter!("gas_orders.orders.committed", 1);
        info!(
            order_id = %outcome.order.id,
            total = %outcome.order.total,
            coupon_code = outcome.order.coupon_code.as_deref().unwrap_or(""),
            redemption = ?outcome.redemption,
            "Order committed"
        );
        Ok(outcome)
    }

    async fn commit_atomic(
        &self,
        model: order::ActiveModel,
        redeem: Option<String>,
        discount: Decimal,
        deadline: Duration,
    ) -> Result<CommitOutcome, PricingError> {
        let result = self
            .db
            .transaction::<_, CommitOutcome, PricingError>(move |txn| {
                Box::pin(async move {
                    let order = with_deadline(deadline, "order_insert", async {
                        model.insert(txn).await.map_err(PricingError::from)
                    })
                    .await?;

                    let redemption = match redeem {
                        Some(code) => {
                            with_deadline(deadline, "ledger_insert", async {
                                redemptions::record(txn, &code, order.id, discount)
                                    .await
                                    .map_err(PricingError::from)
                            })
                            .await?;
                            RedemptionStatus::Recorded
                        }
                        None => RedemptionStatus::NotApplicable,
                    };

                    Ok(CommitOutcome { order, redemption })
                })
            })
            .await;

        result.map_err(|err| match err {
            TransactionError::Connection(e) => PricingError::from(e),
            TransactionError::Transaction(PricingError::AlreadyRedeemed(code)) => {
                counter!("gas_orders.ledger.conflicts", 1);
                warn!(coupon_code = %code, "Coupon already redeemed; order rolled back");
                PricingError::AlreadyRedeemed(code)
            }
            TransactionError::Transaction(e) => e,
        })
    }

    async fn commit_best_effort(
        &self,
        model: order::ActiveModel,
        redeem: Option<String>,
        discount: Decimal,
        deadline: Duration,
    ) -> Result<CommitOutcome, PricingError> {
        let order = with_deadline(deadline, "order_insert", async {
            model.insert(&*self.db).await.map_err(PricingError::from)
        })
        .await?;

        let Some(code) = redeem else {
            return Ok(CommitOutcome {
                order,
                redemption: RedemptionStatus::NotApplicable,
            });
        };

        let recorded = with_deadline(deadline, "ledger_insert", async {
            redemptions::record(&*self.db, &code, order.id, discount)
                .await
                .map_err(PricingError::from)
        })
        .await;

        let redemption = match recorded {
            Ok(_) => RedemptionStatus::Recorded,
            Err(err) => {
                if matches!(err, PricingError::AlreadyRedeemed(_)) {
                    counter!("gas_orders.ledger.conflicts", 1);
                }
                counter!("gas_orders.ledger.unrecorded", 1);
                warn!(
                    coupon_code = %code,
                    order_id = %order.id,
                    error = %err,
                    "Order kept without a redemption record"
                );
                RedemptionStatus::Failed
            }
        };

        Ok(CommitOutcome { order, redemption })
    }
}

fn order_active_model(order: NewOrder, pricing: PricingResult) -> order::ActiveModel {
    let now = Utc::now();
    order::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_name: Set(order.customer_name),
        phone: Set(order.phone),
        address: Set(order.address),
        category: Set(order.category),
        quantity: Set(order.quantity),
        unit_price: Set(pricing.unit_price),
        subtotal: Set(pricing.subtotal),
        discount: Set(pricing.discount),
        total: Set(pricing.total),
        coupon_code: Set(pricing.applied_coupon_code),
        status: Set(OrderStatus::Pending),
        created_at: Set(now),
        updated_at: Set(now),
    }
}
