use crate::{
    db::with_deadline,
    entities::{
        coupon, coupon_redemption, Coupon, CouponApplicability, CouponModel, CouponRedemption,
        CouponRedemptionModel, CylinderCategory, DiscountKind,
    },
    errors::ServiceError,
    services::{pricing::PricingError, redemptions},
};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Longest code the coupons table accepts.
pub const MAX_CODE_LEN: usize = 32;

const FALLBACK_USAGE_LIMIT: i32 = 100;

/// Why a coupon could not be applied. Variants are listed in evaluation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    NotFound,
    Inactive,
    Expired,
    WrongCategory { applicable: CouponApplicability },
    BelowMinimum { minimum: Decimal },
    LimitReached,
}

impl RejectionReason {
    /// Stable identifier exposed to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::WrongCategory { .. } => "wrong_category",
            Self::BelowMinimum { .. } => "below_minimum",
            Self::LimitReached => "limit_reached",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Invalid coupon code"),
            Self::Inactive => write!(f, "Coupon is not active"),
            Self::Expired => write!(f, "Coupon has expired"),
            Self::WrongCategory { applicable } => write!(
                f,
                "Coupon is only valid for {} cylinders",
                applicable.as_str()
            ),
            Self::BelowMinimum { minimum } => write!(
                f,
                "Minimum order amount of {} required",
                minimum.normalize()
            ),
            Self::LimitReached => write!(f, "Coupon usage limit reached"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CouponResult {
    Applied {
        discount_amount: Decimal,
        normalized_code: String,
    },
    Rejected(RejectionReason),
}

/// Codes are case-insensitive and stored upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Rounds a money amount half-up to whole currency units.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Discount for `subtotal`; never negative and never above the subtotal.
pub fn compute_discount(kind: DiscountKind, value: Decimal, subtotal: Decimal) -> Decimal {
    let raw = match kind {
        DiscountKind::Percentage => round_money(subtotal * value / Decimal::ONE_HUNDRED),
        DiscountKind::Flat => value,
    };
    raw.min(subtotal).max(Decimal::ZERO)
}

/// Calendar date at `now` in the business timezone; expiry is compared against it.
pub fn business_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Decides whether `coupon` applies to an order of `category` worth `subtotal`.
///
/// Checks run in a fixed order and the first failure wins: existence,
/// active flag, expiry (inclusive of `today`), category, minimum amount,
/// then usage limit.
pub fn evaluate_coupon(
    coupon: Option<&CouponModel>,
    category: CylinderCategory,
    subtotal: Decimal,
    usage_count: u64,
    today: NaiveDate,
) -> CouponResult {
    let Some(coupon) = coupon else {
        return CouponResult::Rejected(RejectionReason::NotFound);
    };

    if !coupon.is_active {
        return CouponResult::Rejected(RejectionReason::Inactive);
    }

    if coupon.expires_on.is_some_and(|last_day| today > last_day) {
        return CouponResult::Rejected(RejectionReason::Expired);
    }

    if !coupon.applicable_category.covers(category) {
        return CouponResult::Rejected(RejectionReason::WrongCategory {
            applicable: coupon.applicable_category,
        });
    }

    if let Some(minimum) = coupon.min_order_amount {
        if subtotal < minimum {
            return CouponResult::Rejected(RejectionReason::BelowMinimum { minimum });
        }
    }

    let limit = if coupon.usage_limit > 0 {
        coupon.usage_limit
    } else {
        FALLBACK_USAGE_LIMIT
    };
    if usage_count >= limit as u64 {
        return CouponResult::Rejected(RejectionReason::LimitReached);
    }

    CouponResult::Applied {
        discount_amount: compute_discount(coupon.discount_kind, coupon.discount_value, subtotal),
        normalized_code: normalize_code(&coupon.code),
    }
}

pub async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    normalized_code: &str,
) -> Result<Option<CouponModel>, DbErr> {
    Coupon::find()
        .filter(coupon::Column::Code.eq(normalized_code))
        .one(conn)
        .await
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateCouponInput {
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_value: Decimal,
    #[serde(default)]
    pub applicable_category: Option<CouponApplicability>,
    #[serde(default)]
    pub min_order_amount: Option<Decimal>,
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
    #[serde(default)]
    pub usage_limit: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Partial update; the code itself cannot be changed.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateCouponInput {
    pub discount_kind: Option<DiscountKind>,
    pub discount_value: Option<Decimal>,
    pub applicable_category: Option<CouponApplicability>,
    #[serde(default, with = "double_option")]
    pub min_order_amount: Option<Option<Decimal>>,
    #[serde(default, with = "double_option")]
    pub expires_on: Option<Option<NaiveDate>>,
    pub usage_limit: Option<i32>,
    pub is_active: Option<bool>,
}

/// Distinguishes an absent field (leave unchanged) from an explicit `null` (clear).
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CouponSummary {
    #[serde(flatten)]
    pub coupon: CouponModel,
    pub times_used: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct RedemptionReport {
    pub code: String,
    pub usage_limit: i32,
    pub times_used: u64,
    pub redemptions: Vec<CouponRedemptionModel>,
}

fn validate_rule(
    kind: DiscountKind,
    value: Decimal,
    min_order_amount: Option<Decimal>,
    usage_limit: i32,
) -> Result<(), ServiceError> {
    if value <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "discount_value must be greater than zero".to_string(),
        ));
    }
    if kind == DiscountKind::Percentage && value > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(
            "percentage discount cannot exceed 100".to_string(),
        ));
    }
    if min_order_amount.is_some_and(|min| min < Decimal::ZERO) {
        return Err(ServiceError::ValidationError(
            "min_order_amount cannot be negative".to_string(),
        ));
    }
    if usage_limit < 1 {
        return Err(ServiceError::ValidationError(
            "usage_limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Coupon evaluation against live storage, plus admin management of coupons.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    deadline: Duration,
    default_usage_limit: i32,
    business_offset: FixedOffset,
}

impl CouponService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        deadline: Duration,
        default_usage_limit: i32,
        business_offset: FixedOffset,
    ) -> Self {
        Self {
            db,
            deadline,
            default_usage_limit,
            business_offset,
        }
    }

    /// Looks up the coupon and its ledger count, then runs [`evaluate_coupon`]
    /// against today's date in the configured business timezone.
    #[instrument(skip(self))]
    pub async fn evaluate(
        &self,
        code: &str,
        category: CylinderCategory,
        subtotal: Decimal,
    ) -> Result<CouponResult, PricingError> {
        let normalized = normalize_code(code);
        let coupon = with_deadline(self.deadline, "coupon_lookup", async {
            find_by_code(&*self.db, &normalized)
                .await
                .map_err(PricingError::from)
        })
        .await?;

        let usage_count = match &coupon {
            Some(_) => {
                with_deadline(self.deadline, "ledger_count", async {
                    redemptions::count_usage(&*self.db, &normalized)
                        .await
                        .map_err(PricingError::from)
                })
                .await?
            }
            None => 0,
        };

        // Expiry dates are calendar days in the business timezone, UTC unless configured.
        let result = evaluate_coupon(
            coupon.as_ref(),
            category,
            subtotal,
            usage_count,
            business_date(Utc::now(), self.business_offset),
        );
        debug!(coupon_code = %normalized, usage_count, ?result, "Coupon evaluated");
        Ok(result)
    }

    #[instrument(skip(self))]
    pub async fn create_coupon(&self, input: CreateCouponInput) -> Result<CouponModel, ServiceError> {
        let code = normalize_code(&input.code);
        if code.is_empty() || code.len() > MAX_CODE_LEN {
            return Err(ServiceError::ValidationError(format!(
                "code must be between 1 and {} characters",
                MAX_CODE_LEN
            )));
        }
        let usage_limit = input.usage_limit.unwrap_or(self.default_usage_limit);
        validate_rule(
            input.discount_kind,
            input.discount_value,
            input.min_order_amount,
            usage_limit,
        )?;

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            discount_kind: Set(input.discount_kind),
            discount_value: Set(input.discount_value),
            applicable_category: Set(input
                .applicable_category
                .unwrap_or(CouponApplicability::Both)),
            min_order_amount: Set(input.min_order_amount),
            expires_on: Set(input.expires_on),
            usage_limit: Set(usage_limit),
            is_active: Set(input.is_active.unwrap_or(true)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await.map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::Conflict(format!("Coupon {} already exists", code))
            }
            _ => ServiceError::DatabaseError(err),
        })?;

        info!(coupon_code = %created.code, "Coupon created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn update_coupon(
        &self,
        code: &str,
        input: UpdateCouponInput,
    ) -> Result<CouponModel, ServiceError> {
        let existing = self.require(code).await?;

        let kind = input.discount_kind.unwrap_or(existing.discount_kind);
        let value = input.discount_value.unwrap_or(existing.discount_value);
        let min_order_amount = input
            .min_order_amount
            .unwrap_or(existing.min_order_amount);
        let usage_limit = input.usage_limit.unwrap_or(existing.usage_limit);
        validate_rule(kind, value, min_order_amount, usage_limit)?;

        let mut active: coupon::ActiveModel = existing.into();
        active.discount_kind = Set(kind);
        active.discount_value = Set(value);
        active.min_order_amount = Set(min_order_amount);
        active.usage_limit = Set(usage_limit);
        if let Some(category) = input.applicable_category {
            active.applicable_category = Set(category);
        }
        if let Some(expires_on) = input.expires_on {
            active.expires_on = Set(expires_on);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;
        info!(coupon_code = %updated.code, "Coupon updated");
        Ok(updated)
    }

    /// Removes the coupon and its ledger rows in one transaction.
    #[instrument(skip(self))]
    pub async fn delete_coupon(&self, code: &str) -> Result<u64, ServiceError> {
        let existing = self.require(code).await?;

        let txn = self.db.begin().await?;
        let removed = CouponRedemption::delete_many()
            .filter(coupon_redemption::Column::CouponCode.eq(existing.code.as_str()))
            .exec(&txn)
            .await?
            .rows_affected;
        Coupon::delete_by_id(existing.id).exec(&txn).await?;
        txn.commit().await?;

        info!(
            coupon_code = %existing.code,
            redemptions_removed = removed,
            "Coupon deleted"
        );
        Ok(removed)
    }

    #[instrument(skip(self))]
    pub async fn list_coupons(&self) -> Result<Vec<CouponSummary>, ServiceError> {
        let coupons = Coupon::find()
            .order_by_asc(coupon::Column::Code)
            .all(&*self.db)
            .await?;

        let usage: HashMap<String, i64> = CouponRedemption::find()
            .select_only()
            .column(coupon_redemption::Column::CouponCode)
            .column_as(coupon_redemption::Column::Id.count(), "uses")
            .group_by(coupon_redemption::Column::CouponCode)
            .into_tuple::<(String, i64)>()
            .all(&*self.db)
            .await?
            .into_iter()
            .collect();

        Ok(coupons
            .into_iter()
            .map(|coupon| {
                let times_used = usage
                    .get(&coupon.code)
                    .map(|n| (*n).max(0) as u64)
                    .unwrap_or(0);
                CouponSummary { coupon, times_used }
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn redemption_report(&self, code: &str) -> Result<RedemptionReport, ServiceError> {
        let coupon = self.require(code).await?;
        let entries = redemptions::list_for_code(&*self.db, &coupon.code).await?;

        Ok(RedemptionReport {
            times_used: entries.len() as u64,
            code: coupon.code,
            usage_limit: coupon.usage_limit,
            redemptions: entries,
        })
    }

    async fn require(&self, code: &str) -> Result<CouponModel, ServiceError> {
        let normalized = normalize_code(code);
        find_by_code(&*self.db, &normalized)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", normalized)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn coupon(kind: DiscountKind, value: Decimal) -> CouponModel {
        let now = Utc::now();
        CouponModel {
            id: Uuid::new_v4(),
            code: "WELCOME10".into(),
            discount_kind: kind,
            discount_value: value,
            applicable_category: CouponApplicability::Both,
            min_order_amount: None,
            expires_on: None,
            usage_limit: 100,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn rejected(result: CouponResult) -> RejectionReason {
        match result {
            CouponResult::Rejected(reason) => reason,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn missing_coupon_is_not_found() {
        let result = evaluate_coupon(None, CylinderCategory::Domestic, dec!(5000), 0, today());
        assert_eq!(rejected(result), RejectionReason::NotFound);
    }

    #[test]
    fn first_failing_check_wins() {
        // Inactive, expired, wrong category, below minimum and exhausted all at once.
        let mut c = coupon(DiscountKind::Flat, dec!(500));
        c.is_active = false;
        c.expires_on = Some(today().pred_opt().unwrap());
        c.applicable_category = CouponApplicability::Domestic;
        c.min_order_amount = Some(dec!(10000));
        c.usage_limit = 1;

        let eval = |c: &CouponModel| {
            rejected(evaluate_coupon(
                Some(c),
                CylinderCategory::Commercial,
                dec!(3000),
                5,
                today(),
            ))
        };

        assert_eq!(eval(&c), RejectionReason::Inactive);
        c.is_active = true;
        assert_eq!(eval(&c), RejectionReason::Expired);
        c.expires_on = None;
        assert_eq!(
            eval(&c),
            RejectionReason::WrongCategory {
                applicable: CouponApplicability::Domestic
            }
        );
        c.applicable_category = CouponApplicability::Both;
        assert_eq!(
            eval(&c),
            RejectionReason::BelowMinimum {
                minimum: dec!(10000)
            }
        );
        c.min_order_amount = None;
        assert_eq!(eval(&c), RejectionReason::LimitReached);
    }

    #[rstest]
    #[case(Some(0), true)]
    #[case(Some(1), true)]
    #[case(Some(-1), false)]
    #[case(None, true)]
    fn expiry_is_inclusive_of_last_day(#[case] offset_days: Option<i64>, #[case] valid: bool) {
        let mut c = coupon(DiscountKind::Percentage, dec!(10));
        c.expires_on = offset_days.map(|d| today() + chrono::Duration::days(d));
        let result = evaluate_coupon(Some(&c), CylinderCategory::Domestic, dec!(1000), 0, today());
        assert_eq!(matches!(result, CouponResult::Applied { .. }), valid);
    }

    #[test]
    fn expiry_follows_business_calendar() {
        // 20:00 UTC on the 14th is already the 15th at +05:00.
        let now = Utc.with_ymd_and_hms(2024, 6, 14, 20, 0, 0).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let plus_five = FixedOffset::east_opt(5 * 3600).unwrap();
        assert_eq!(business_date(now, utc), today().pred_opt().unwrap());
        assert_eq!(business_date(now, plus_five), today());

        let mut c = coupon(DiscountKind::Flat, dec!(100));
        c.expires_on = today().pred_opt();
        let at = |offset| {
            evaluate_coupon(Some(&c), CylinderCategory::Domestic, dec!(1000), 0, business_date(now, offset))
        };
        assert!(matches!(at(utc), CouponResult::Applied { .. }));
        assert_eq!(rejected(at(plus_five)), RejectionReason::Expired);
    }

    #[rstest]
    #[case(CouponApplicability::Domestic, CylinderCategory::Domestic, true)]
    #[case(CouponApplicability::Domestic, CylinderCategory::Commercial, false)]
    #[case(CouponApplicability::Commercial, CylinderCategory::Domestic, false)]
    #[case(CouponApplicability::Both, CylinderCategory::Domestic, true)]
    #[case(CouponApplicability::Both, CylinderCategory::Commercial, true)]
    fn category_gating(
        #[case] applicable: CouponApplicability,
        #[case] category: CylinderCategory,
        #[case] accepted: bool,
    ) {
        let mut c = coupon(DiscountKind::Flat, dec!(100));
        c.applicable_category = applicable;
        let result = evaluate_coupon(Some(&c), category, dec!(2500), 0, today());
        assert_eq!(matches!(result, CouponResult::Applied { .. }), accepted);
    }

    #[test]
    fn minimum_is_inclusive() {
        let mut c = coupon(DiscountKind::Flat, dec!(100));
        c.min_order_amount = Some(dec!(5000));
        assert_matches::assert_matches!(
            evaluate_coupon(Some(&c), CylinderCategory::Domestic, dec!(5000), 0, today()),
            CouponResult::Applied { .. }
        );
        assert_eq!(
            rejected(evaluate_coupon(
                Some(&c),
                CylinderCategory::Domestic,
                dec!(3000),
                0,
                today()
            )),
            RejectionReason::BelowMinimum {
                minimum: dec!(5000)
            }
        );
    }

    #[rstest]
    #[case(4, false)]
    #[case(5, true)]
    #[case(6, true)]
    fn usage_limit_counts_ledger_rows(#[case] used: u64, #[case] exhausted: bool) {
        let mut c = coupon(DiscountKind::Flat, dec!(100));
        c.usage_limit = 5;
        let result = evaluate_coupon(Some(&c), CylinderCategory::Domestic, dec!(2500), used, today());
        assert_eq!(
            result == CouponResult::Rejected(RejectionReason::LimitReached),
            exhausted
        );
    }

    #[rstest]
    #[case(DiscountKind::Percentage, dec!(10), dec!(9000), dec!(900))]
    #[case(DiscountKind::Percentage, dec!(15), dec!(2500), dec!(375))]
    #[case(DiscountKind::Percentage, dec!(12.5), dec!(2500), dec!(313))]
    #[case(DiscountKind::Percentage, dec!(12.5), dec!(2499), dec!(312))]
    #[case(DiscountKind::Percentage, dec!(100), dec!(2500), dec!(2500))]
    #[case(DiscountKind::Flat, dec!(500), dec!(400), dec!(400))]
    #[case(DiscountKind::Flat, dec!(500), dec!(5000), dec!(500))]
    fn discount_amounts(
        #[case] kind: DiscountKind,
        #[case] value: Decimal,
        #[case] subtotal: Decimal,
        #[case] expected: Decimal,
    ) {
        assert_eq!(compute_discount(kind, value, subtotal), expected);
    }

    #[test]
    fn round_money_is_half_up() {
        assert_eq!(round_money(dec!(312.5)), dec!(313));
        assert_eq!(round_money(dec!(312.49)), dec!(312));
        assert_eq!(round_money(dec!(0.5)), dec!(1));
    }

    #[test]
    fn applied_result_carries_normalized_code() {
        let mut c = coupon(DiscountKind::Percentage, dec!(10));
        c.code = "welcome10".into();
        assert_eq!(
            evaluate_coupon(Some(&c), CylinderCategory::Commercial, dec!(9000), 0, today()),
            CouponResult::Applied {
                discount_amount: dec!(900),
                normalized_code: "WELCOME10".into()
            }
        );
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_code("  flat500 \n"), "FLAT500");
    }

    #[test]
    fn rule_validation() {
        assert!(validate_rule(DiscountKind::Percentage, dec!(100), None, 1).is_ok());
        assert!(validate_rule(DiscountKind::Percentage, dec!(100.5), None, 1).is_err());
        assert!(validate_rule(DiscountKind::Flat, dec!(0), None, 1).is_err());
        assert!(validate_rule(DiscountKind::Flat, dec!(250), Some(dec!(-1)), 1).is_err());
        assert!(validate_rule(DiscountKind::Flat, dec!(250), None, 0).is_err());
    }

    #[test]
    fn rejection_messages_are_user_facing() {
        assert_eq!(RejectionReason::Expired.to_string(), "Coupon has expired");
        assert_eq!(
            RejectionReason::LimitReached.to_string(),
            "Coupon usage limit reached"
        );
        assert_eq!(
            RejectionReason::WrongCategory {
                applicable: CouponApplicability::Domestic
            }
            .to_string(),
            "Coupon is only valid for Domestic cylinders"
        );
    }
}
