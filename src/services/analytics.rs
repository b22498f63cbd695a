use crate::{
    db::DbPool,
    entities::{
        product_variant::{self, Entity as ProductVariant},
        stock_movement::{self, Entity as StockMovement, StockMovementType},
    },
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Days of cover the supplier needs to deliver a restock.
pub const LEAD_TIME_DAYS: i64 = 7;
/// Window assumed when the movement sample is too small to measure one.
pub const DEFAULT_SALES_WINDOW_DAYS: i64 = 30;
/// How many recent OUT movements feed the velocity estimate.
pub const SALES_SAMPLE_SIZE: u64 = 10;
/// Lower bound of the derived stock ceiling.
pub const MAX_STOCK_FLOOR: i32 = 50;
/// Reported when a variant has no measurable outbound velocity.
pub const STOCKOUT_SENTINEL_DAYS: i64 = 999;

/// Stock health of a variant. Variant order is ascending alert priority, so
/// sorting descending puts CRITICAL first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    Normal,
    Overstock,
    Low,
    Critical,
}

/// Restock urgency. Variant order is ascending, so sorting descending puts
/// URGENT first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReorderPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockHealth {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub barcode: Option<String>,
    pub stock: i32,
    pub min_stock: i32,
    pub max_stock: i32,
    pub status: StockStatus,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReorderSuggestion {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub current_stock: i32,
    pub min_stock: i32,
    pub max_stock: i32,
    pub avg_daily_sales: f64,
    pub safety_stock: f64,
    pub suggested_quantity: i32,
    pub days_until_stockout: i64,
    pub priority: ReorderPriority,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InventorySummary {
    pub total_variants: u64,
    pub critical: u64,
    pub low: u64,
    pub normal: u64,
    pub overstock: u64,
    pub total_units: i64,
}

/// Derived stock ceiling: three times the reorder threshold, floored at 50.
pub fn max_stock(min_stock: i32) -> i32 {
    (min_stock.saturating_mul(3)).max(MAX_STOCK_FLOOR)
}

/// Classifies available stock against the reorder threshold and the derived
/// ceiling.
pub fn classify(available: i32, min_stock: i32) -> StockStatus {
    if available <= 0 {
        StockStatus::Critical
    } else if available <= min_stock {
        StockStatus::Low
    } else if available >= max_stock(min_stock) {
        StockStatus::Overstock
    } else {
        StockStatus::Normal
    }
}

/// Restock urgency for a stock level. The half-threshold boundary is
/// inclusive: stock exactly at min_stock/2 is already HIGH.
pub fn reorder_priority(stock: i32, min_stock: i32) -> ReorderPriority {
    if stock <= 0 {
        ReorderPriority::Urgent
    } else if f64::from(stock) <= f64::from(min_stock) / 2.0 {
        ReorderPriority::High
    } else if stock <= min_stock {
        ReorderPriority::Medium
    } else {
        ReorderPriority::Low
    }
}

/// Average units sold per day, measured over the sampled OUT movements.
///
/// The window is the true elapsed span between the oldest and newest sampled
/// movement (floored at one day). A sample of fewer than two movements has
/// no measurable span, so the default window is assumed instead.
fn sales_velocity(sample: &[stock_movement::Model]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }

    let total: i64 = sample.iter().map(|m| i64::from(m.quantity)).sum();
    let window_days = if sample.len() < 2 {
        DEFAULT_SALES_WINDOW_DAYS
    } else {
        // Sorted newest first by the caller
        let newest = sample.first().map(|m| m.created_at).unwrap_or_default();
        let oldest = sample.last().map(|m| m.created_at).unwrap_or_default();
        (newest - oldest).num_days().max(1)
    };

    total as f64 / window_days as f64
}

/// Builds the reorder suggestion for one variant from its sampled outbound
/// movements.
fn build_suggestion(
    variant: &product_variant::Model,
    sample: &[stock_movement::Model],
) -> ReorderSuggestion {
    let avg_daily_sales = sales_velocity(sample);
    let max_stock = max_stock(variant.min_stock);
    let stock = variant.stock;

    let lead_time_demand = avg_daily_sales * LEAD_TIME_DAYS as f64;
    let safety_stock = lead_time_demand.max(f64::from(variant.min_stock));

    let refill_to_ceiling = f64::from(max_stock - stock);
    let refill_to_demand = safety_stock + lead_time_demand - f64::from(stock);
    let suggested_quantity = refill_to_ceiling.max(refill_to_demand).ceil().max(0.0) as i32;

    let days_until_stockout = if avg_daily_sales > 0.0 {
        (f64::from(stock) / avg_daily_sales).floor().max(0.0) as i64
    } else {
        STOCKOUT_SENTINEL_DAYS
    };

    ReorderSuggestion {
        variant_id: variant.id,
        product_id: variant.product_id,
        current_stock: stock,
        min_stock: variant.min_stock,
        max_stock,
        avg_daily_sales,
        safety_stock,
        suggested_quantity,
        days_until_stockout,
        priority: reorder_priority(stock, variant.min_stock),
    }
}

/// Read-only derivations over current stock and movement history.
#[derive(Clone)]
pub struct InventoryAnalyticsService {
    db: Arc<DbPool>,
}

impl InventoryAnalyticsService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Classifies every active variant, most alarming first.
    #[instrument(skip(self))]
    pub async fn stock_health(&self) -> Result<Vec<StockHealth>, ServiceError> {
        let variants = self.active_variants().await?;

        let mut health: Vec<StockHealth> = variants
            .iter()
            .map(|v| StockHealth {
                variant_id: v.id,
                product_id: v.product_id,
                barcode: v.barcode.clone(),
                stock: v.stock,
                min_stock: v.min_stock,
                max_stock: max_stock(v.min_stock),
                status: classify(v.stock, v.min_stock),
            })
            .collect();

        health.sort_by(|a, b| b.status.cmp(&a.status).then(a.stock.cmp(&b.stock)));
        Ok(health)
    }

    /// Reorder suggestions for every active variant that needs restocking,
    /// most urgent first.
    #[instrument(skip(self))]
    pub async fn reorder_suggestions(&self) -> Result<Vec<ReorderSuggestion>, ServiceError> {
        let variants = self.active_variants().await?;

        let mut suggestions = Vec::new();
        for variant in &variants {
            let sample = self.outbound_sample(variant.id).await?;
            let suggestion = build_suggestion(variant, &sample);
            if suggestion.suggested_quantity > 0 {
                suggestions.push(suggestion);
            }
        }

        suggestions.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.days_until_stockout.cmp(&b.days_until_stockout))
        });
        Ok(suggestions)
    }

    /// The suggestion for one variant, regardless of whether it needs
    /// restocking right now.
    pub async fn variant_reorder(
        &self,
        variant_id: Uuid,
    ) -> Result<ReorderSuggestion, ServiceError> {
        let variant = ProductVariant::find_by_id(variant_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

        let sample = self.outbound_sample(variant.id).await?;
        Ok(build_suggestion(&variant, &sample))
    }

    /// Status counts and total units across active variants.
    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<InventorySummary, ServiceError> {
        let variants = self.active_variants().await?;

        let mut summary = InventorySummary {
            total_variants: variants.len() as u64,
            critical: 0,
            low: 0,
            normal: 0,
            overstock: 0,
            total_units: 0,
        };
        for variant in &variants {
            summary.total_units += i64::from(variant.stock);
            match classify(variant.stock, variant.min_stock) {
                StockStatus::Critical => summary.critical += 1,
                StockStatus::Low => summary.low += 1,
                StockStatus::Normal => summary.normal += 1,
                StockStatus::Overstock => summary.overstock += 1,
            }
        }

        Ok(summary)
    }

    async fn active_variants(&self) -> Result<Vec<product_variant::Model>, ServiceError> {
        Ok(ProductVariant::find()
            .filter(product_variant::Column::IsActive.eq(true))
            .all(self.db.as_ref())
            .await?)
    }

    /// The last N outbound movements for a variant, newest first.
    async fn outbound_sample(
        &self,
        variant_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        Ok(StockMovement::find()
            .filter(stock_movement::Column::VariantId.eq(variant_id))
            .filter(stock_movement::Column::MovementType.eq(StockMovementType::Out))
            .order_by_desc(stock_movement::Column::CreatedAt)
            .limit(SALES_SAMPLE_SIZE)
            .all(self.db.as_ref())
            .await?)
    }
}
