use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product variant entity - one purchasable SKU (product x size x color).
///
/// `stock` is the single source of truth for sellable units. It is mutated
/// exclusively through the stock ledger, which pairs every change with one
/// `stock_movement` row inside the same transaction.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_variants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub size_id: Uuid,
    pub color_id: Uuid,
    /// Sellable units on hand; never negative
    pub stock: i32,
    /// Reorder threshold
    pub min_stock: i32,
    /// Variant-level price override; falls back to the product price
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub price: Option<Decimal>,
    #[sea_orm(nullable, unique)]
    pub barcode: Option<String>,
    /// Soft-delete flag; variants are never hard-deleted
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::size::Entity",
        from = "Column::SizeId",
        to = "super::size::Column::Id"
    )]
    Size,
    #[sea_orm(
        belongs_to = "super::color::Entity",
        from = "Column::ColorId",
        to = "super::color::Column::Id"
    )]
    Color,
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovements,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::size::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Size.def()
    }
}

impl Related<super::color::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Color.def()
    }
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
