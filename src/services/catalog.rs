use crate::{
    db::DbPool,
    entities::{
        color::{self, Entity as Color},
        product::{self, Entity as Product},
        product_variant::{self, Entity as ProductVariant},
        size::{self, Entity as Size},
    },
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// One size/color combination to create alongside a product.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateVariantInput {
    pub size_id: Uuid,
    pub color_id: Uuid,
    pub initial_stock: i32,
    pub min_stock: i32,
    pub price: Option<Decimal>,
    pub barcode: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, message = "Product name is required"))]
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: Decimal,
    pub variants: Vec<CreateVariantInput>,
}

#[derive(Debug, Serialize)]
pub struct ProductWithVariants {
    pub product: product::Model,
    pub variants: Vec<product_variant::Model>,
}

/// Products, sizes, colors and their sellable variants.
///
/// Variant stock is seeded here at creation time (the conservation baseline);
/// every later change goes through the stock ledger.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Creates a product with one variant per requested size/color
    /// combination, in one transaction.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductWithVariants, ServiceError> {
        input.validate()?;

        if input.variants.is_empty() {
            return Err(ServiceError::ValidationError(
                "a product needs at least one size/color variant".to_string(),
            ));
        }
        if input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "product price must not be negative".to_string(),
            ));
        }
        for variant in &input.variants {
            if variant.initial_stock < 0 || variant.min_stock < 0 {
                return Err(ServiceError::ValidationError(
                    "variant stock levels must not be negative".to_string(),
                ));
            }
        }

        let created = self
            .db
            .transaction::<_, ProductWithVariants, ServiceError>(move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let product_model = product::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        name: Set(input.name.clone()),
                        category: Set(input.category.clone()),
                        description: Set(input.description.clone()),
                        price: Set(input.price),
                        is_active: Set(true),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };
                    let product_model = product_model.insert(txn).await?;

                    let mut variants = Vec::with_capacity(input.variants.len());
                    for item in &input.variants {
                        let variant = product_variant::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            product_id: Set(product_model.id),
                            size_id: Set(item.size_id),
                            color_id: Set(item.color_id),
                            stock: Set(item.initial_stock),
                            min_stock: Set(item.min_stock),
                            price: Set(item.price),
                            barcode: Set(item.barcode.clone()),
                            is_active: Set(true),
                            created_at: Set(now),
                            updated_at: Set(now),
                        };
                        variants.push(variant.insert(txn).await?);
                    }

                    Ok(ProductWithVariants {
                        product: product_model,
                        variants,
                    })
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            product_id = %created.product.id,
            variant_count = created.variants.len(),
            "Product created"
        );

        Ok(created)
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductWithVariants, ServiceError> {
        let product_model = Product::find_by_id(product_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .order_by_asc(product_variant::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        Ok(ProductWithVariants {
            product: product_model,
            variants,
        })
    }

    /// Lists products, newest first. Inactive products are excluded unless
    /// explicitly requested.
    pub async fn list_products(
        &self,
        include_inactive: bool,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let mut query = Product::find().order_by_desc(product::Column::CreatedAt);
        if !include_inactive {
            query = query.filter(product::Column::IsActive.eq(true));
        }

        let paginator = query.paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((products, total))
    }

    pub async fn get_variant(
        &self,
        variant_id: Uuid,
    ) -> Result<product_variant::Model, ServiceError> {
        ProductVariant::find_by_id(variant_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))
    }

    /// Looks up an active variant by barcode (register scans).
    pub async fn find_variant_by_barcode(
        &self,
        barcode: &str,
    ) -> Result<product_variant::Model, ServiceError> {
        ProductVariant::find()
            .filter(product_variant::Column::Barcode.eq(barcode))
            .filter(product_variant::Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No active variant with barcode {}", barcode))
            })
    }

    /// Soft-deactivates a variant; history and movements are kept.
    #[instrument(skip(self))]
    pub async fn deactivate_variant(
        &self,
        variant_id: Uuid,
    ) -> Result<product_variant::Model, ServiceError> {
        let variant = self.get_variant(variant_id).await?;
        if !variant.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Variant {} is already inactive",
                variant_id
            )));
        }

        let mut active: product_variant::ActiveModel = variant.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let variant = active.update(self.db.as_ref()).await?;

        info!(variant_id = %variant.id, "Variant deactivated");
        Ok(variant)
    }

    pub async fn create_size(&self, name: String) -> Result<size::Model, ServiceError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "size name must not be blank".to_string(),
            ));
        }

        let model = size::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            created_at: Set(Utc::now()),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }

    pub async fn create_color(&self, name: String) -> Result<color::Model, ServiceError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "color name must not be blank".to_string(),
            ));
        }

        let model = color::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            created_at: Set(Utc::now()),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }

    pub async fn list_sizes(&self) -> Result<Vec<size::Model>, ServiceError> {
        Ok(Size::find()
            .order_by_asc(size::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn list_colors(&self) -> Result<Vec<color::Model>, ServiceError> {
        Ok(Color::find()
            .order_by_asc(color::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }
}
