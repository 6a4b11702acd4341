use crate::{
    db::with_deadline,
    entities::{product, CylinderCategory, Product, ProductModel},
    errors::ServiceError,
    services::pricing::PricingError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Price and stock flag the pricing engine needs for one category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProductPricing {
    pub unit_price: Decimal,
    pub in_stock: bool,
}

impl From<&ProductModel> for ProductPricing {
    fn from(model: &ProductModel) -> Self {
        Self {
            unit_price: model.unit_price,
            in_stock: model.in_stock,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UpsertProductInput {
    pub unit_price: Decimal,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}

fn default_in_stock() -> bool {
    true
}

pub async fn find_pricing<C: ConnectionTrait>(
    conn: &C,
    category: CylinderCategory,
) -> Result<Option<ProductPricing>, DbErr> {
    let product = Product::find()
        .filter(product::Column::Category.eq(category))
        .one(conn)
        .await?;
    Ok(product.as_ref().map(ProductPricing::from))
}

/// Catalog lookup for quotes plus the admin-side product upsert.
///
/// Prices are never cached: every quote re-reads the row, so an admin price
/// change shows up on the next quote and never on orders already placed.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    deadline: Duration,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, deadline: Duration) -> Self {
        Self { db, deadline }
    }

    #[instrument(skip(self))]
    pub async fn get_pricing(
        &self,
        category: CylinderCategory,
    ) -> Result<ProductPricing, PricingError> {
        let found = with_deadline(self.deadline, "catalog_lookup", async {
            find_pricing(&*self.db, category)
                .await
                .map_err(PricingError::from)
        })
        .await?;

        found.ok_or(PricingError::ProductNotFound(category))
    }

    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .order_by_asc(product::Column::Category)
            .all(&*self.db)
            .await?)
    }

    /// Creates the product row for `category` or replaces its price and stock flag.
    #[instrument(skip(self))]
    pub async fn upsert_product(
        &self,
        category: CylinderCategory,
        input: UpsertProductInput,
    ) -> Result<ProductModel, ServiceError> {
        if input.unit_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "unit_price must be greater than zero".to_string(),
            ));
        }

        let now = Utc::now();
        let existing = Product::find()
            .filter(product::Column::Category.eq(category))
            .one(&*self.db)
            .await?;

        let saved = match existing {
            Some(model) => {
                let mut active: product::ActiveModel = model.into();
                active.unit_price = Set(input.unit_price);
                active.in_stock = Set(input.in_stock);
                active.updated_at = Set(now);
                active.update(&*self.db).await?
            }
            None => {
                product::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    category: Set(category),
                    unit_price: Set(input.unit_price),
                    in_stock: Set(input.in_stock),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };

        info!(
            category = category.as_str(),
            unit_price = %saved.unit_price,
            in_stock = saved.in_stock,
            "Product pricing updated"
        );
        Ok(saved)
    }
}
