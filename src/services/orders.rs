use crate::{
    entities::{order, CylinderCategory, Order, OrderModel, OrderStatus},
    errors::ServiceError,
    services::pricing::{CommitOutcome, NewOrder, PricingResult, PricingService},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

const MAX_PAGE_SIZE: u64 = 100;

/// Validated order input as it arrives from the HTTP layer.
#[derive(Clone, Debug)]
pub struct CreateOrderInput {
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub category: CylinderCategory,
    pub quantity: i32,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderModel>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Order creation (quote + commit), reads, and the admin status lifecycle.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    pricing: PricingService,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, pricing: PricingService) -> Self {
        Self { db, pricing }
    }

    /// Prices the order server-side and persists it. Any client notion of
    /// price is ignored; only category, quantity and coupon code are used.
    #[instrument(skip(self, input), fields(category = input.category.as_str(), quantity = input.quantity))]
    pub async fn create_order(
        &self,
        input: CreateOrderInput,
    ) -> Result<CommitOutcome, ServiceError> {
        let pricing: PricingResult = self
            .pricing
            .quote(input.category, input.quantity, input.coupon_code.as_deref())
            .await?;

        let new_order = NewOrder {
            customer_name: input.customer_name.trim().to_string(),
            phone: input.phone.trim().to_string(),
            address: input.address.trim().to_string(),
            category: input.category,
            quantity: input.quantity,
        };

        Ok(self.pricing.commit(new_order, pricing).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Newest first, optionally narrowed to one status.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);

        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Moves an order along its lifecycle. Only the status and timestamp
    /// change; price fields are left untouched.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let current = self.get_order(order_id).await?;

        if !current.status.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "cannot move order from {} to {}",
                current.status.as_str(),
                next.as_str()
            )));
        }

        let previous = current.status;
        let mut active: order::ActiveModel = current.into();
        active.status = Set(next);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(
            %order_id,
            from = previous.as_str(),
            to = next.as_str(),
            "Order status updated"
        );
        Ok(updated)
    }
}
