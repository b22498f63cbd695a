use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Direction of a stock movement.
///
/// `In` and `Out` are implied by the sign of the applied delta; `Adjustment`
/// is requested explicitly by administrative corrections and may run in
/// either direction (recoverable from `previous_stock`/`new_stock`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockMovementType {
    #[sea_orm(string_value = "IN")]
    In,
    #[sea_orm(string_value = "OUT")]
    Out,
    #[sea_orm(string_value = "ADJUSTMENT")]
    Adjustment,
}

/// Immutable audit record of one stock change.
///
/// Append-only: rows are created inside the same transaction as the variant
/// stock update and are never modified afterwards. The chain of
/// `previous_stock` -> `new_stock` values reconstructs the full history of a
/// variant's stock.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub variant_id: Uuid,
    pub movement_type: StockMovementType,
    /// Positive magnitude of the change; direction comes from the type and
    /// the previous/new pair
    pub quantity: i32,
    pub reason: String,
    /// Invoice/production number of the originating order, when there is one
    #[sea_orm(nullable)]
    pub reference: Option<String>,
    pub previous_stock: i32,
    pub new_stock: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Model {
    /// The signed delta this movement applied to the variant's stock.
    pub fn signed_quantity(&self) -> i32 {
        self.new_stock - self.previous_stock
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product_variant::Entity",
        from = "Column::VariantId",
        to = "super::product_variant::Column::Id"
    )]
    Variant,
}

impl Related<super::product_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Variant.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if !insert {
            return Err(DbErr::Custom(
                "stock movements are append-only and cannot be updated".to_string(),
            ));
        }

        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }

    async fn before_delete<C: ConnectionTrait>(self, _db: &C) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        Err(DbErr::Custom(
            "stock movements are append-only and cannot be deleted".to_string(),
        ))
    }
}
