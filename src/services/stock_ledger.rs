use crate::{
    db::{self, DbPool},
    entities::{
        product_variant::{self, Entity as ProductVariant},
        stock_movement::{self, Entity as StockMovement, StockMovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionError, TransactionTrait,
};
use sea_orm::ConnectionTrait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// How many times a transient write conflict is retried before the operation
/// surfaces as `ConcurrentModification`.
const MAX_CONFLICT_RETRIES: u32 = 3;

/// Parameters for one ledger application.
#[derive(Debug, Clone)]
pub struct StockDelta {
    pub variant_id: Uuid,
    /// Signed change; non-zero
    pub delta: i32,
    pub movement_type: StockMovementType,
    pub reason: String,
    pub reference: Option<String>,
    pub created_by: Uuid,
}

/// Result of one ledger application: the updated variant paired with the
/// movement that records the change.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LedgerEntry {
    pub variant: product_variant::Model,
    pub movement: stock_movement::Model,
}

/// Emits the post-commit events for a batch of ledger entries: one movement
/// event each, plus a low-stock alert when the variant is at or below its
/// threshold. Failures are logged, never propagated.
pub(crate) async fn emit_movement_events(event_sender: &EventSender, entries: &[LedgerEntry]) {
    for entry in entries {
        let movement = &entry.movement;
        if let Err(e) = event_sender
            .send(Event::StockMovementRecorded {
                movement_id: movement.id,
                variant_id: movement.variant_id,
                movement_type: movement.movement_type,
                quantity: movement.quantity,
                new_stock: movement.new_stock,
            })
            .await
        {
            warn!(error = %e, movement_id = %movement.id, "Failed to send stock movement event");
        }

        if entry.variant.stock <= entry.variant.min_stock {
            if let Err(e) = event_sender
                .send(Event::LowStockDetected {
                    variant_id: entry.variant.id,
                    stock: entry.variant.stock,
                    min_stock: entry.variant.min_stock,
                })
                .await
            {
                warn!(error = %e, variant_id = %entry.variant.id, "Failed to send low stock event");
            }
        }
    }
}

/// Rejects deltas whose sign contradicts the requested movement type.
fn validate_delta(input: &StockDelta) -> Result<(), ServiceError> {
    if input.delta == 0 {
        return Err(ServiceError::ValidationError(
            "stock delta must be non-zero".to_string(),
        ));
    }

    match input.movement_type {
        StockMovementType::In if input.delta < 0 => Err(ServiceError::ValidationError(
            "IN movements require a positive delta".to_string(),
        )),
        StockMovementType::Out if input.delta > 0 => Err(ServiceError::ValidationError(
            "OUT movements require a negative delta".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Applies a signed stock delta and appends the paired movement record,
/// using the caller's connection or transaction.
///
/// This is the one place in the crate that writes `product_variants.stock`.
/// Callers that mutate several variants (multi-item sales, production
/// completion) invoke it repeatedly inside their own transaction so the
/// whole batch commits or rolls back together.
pub(crate) async fn apply_delta_within<C: ConnectionTrait>(
    conn: &C,
    input: &StockDelta,
) -> Result<LedgerEntry, ServiceError> {
    validate_delta(input)?;

    // Row lock against concurrent writers; SQLite ignores the clause and
    // serializes writers itself.
    let variant = ProductVariant::find_by_id(input.variant_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Variant {} not found", input.variant_id))
        })?;

    let previous_stock = variant.stock;
    let new_stock = previous_stock + input.delta;
    if new_stock < 0 {
        return Err(ServiceError::InsufficientStock {
            available: previous_stock,
            requested: input.delta.abs(),
        });
    }

    let mut active_variant: product_variant::ActiveModel = variant.into();
    active_variant.stock = Set(new_stock);
    active_variant.updated_at = Set(Utc::now());
    let variant = active_variant.update(conn).await?;

    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        variant_id: Set(input.variant_id),
        movement_type: Set(input.movement_type),
        quantity: Set(input.delta.abs()),
        reason: Set(input.reason.clone()),
        reference: Set(input.reference.clone()),
        previous_stock: Set(previous_stock),
        new_stock: Set(new_stock),
        created_by: Set(input.created_by),
        created_at: Set(Utc::now()),
    };
    let movement = movement.insert(conn).await?;

    Ok(LedgerEntry { variant, movement })
}

/// The authoritative engine for stock mutation.
///
/// Every public operation runs in its own database transaction and pairs the
/// stock write with exactly one movement record; no caller can observe one
/// without the other.
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl StockLedgerService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Applies a signed stock delta to one variant, atomically.
    #[instrument(skip(self, input), fields(variant_id = %input.variant_id, delta = input.delta))]
    pub async fn apply_stock_delta(&self, input: StockDelta) -> Result<LedgerEntry, ServiceError> {
        let mut attempt = 0u32;
        let entry = loop {
            match self.apply_in_transaction(&input).await {
                Err(ServiceError::DatabaseError(err)) if db::is_transient_conflict(&err) => {
                    attempt += 1;
                    if attempt >= MAX_CONFLICT_RETRIES {
                        return Err(ServiceError::ConcurrentModification(
                            input.variant_id.to_string(),
                        ));
                    }
                    warn!(
                        variant_id = %input.variant_id,
                        attempt = attempt,
                        "Transient write conflict on stock mutation; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                }
                other => break other?,
            }
        };

        info!(
            variant_id = %entry.variant.id,
            new_stock = entry.variant.stock,
            movement_id = %entry.movement.id,
            "Stock delta applied"
        );

        emit_movement_events(&self.event_sender, std::slice::from_ref(&entry)).await;

        Ok(entry)
    }

    /// Sets the stock of a variant to an absolute value via an ADJUSTMENT
    /// movement. Rejects negative targets and no-op requests.
    #[instrument(skip(self, reason), fields(variant_id = %variant_id, new_stock = new_stock))]
    pub async fn set_stock_absolute(
        &self,
        variant_id: Uuid,
        new_stock: i32,
        reason: String,
        created_by: Uuid,
    ) -> Result<LedgerEntry, ServiceError> {
        if new_stock < 0 {
            return Err(ServiceError::ValidationError(
                "target stock must not be negative".to_string(),
            ));
        }

        let entry = self
            .db
            .transaction::<_, LedgerEntry, ServiceError>(move |txn| {
                Box::pin(async move {
                    let variant = ProductVariant::find_by_id(variant_id)
                        .lock_exclusive()
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Variant {} not found", variant_id))
                        })?;

                    let delta = new_stock - variant.stock;
                    if delta == 0 {
                        return Err(ServiceError::NoChangeRequested);
                    }

                    apply_delta_within(
                        txn,
                        &StockDelta {
                            variant_id,
                            delta,
                            movement_type: StockMovementType::Adjustment,
                            reason,
                            reference: None,
                            created_by,
                        },
                    )
                    .await
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(
            variant_id = %entry.variant.id,
            new_stock = entry.variant.stock,
            "Stock set to absolute value"
        );

        emit_movement_events(&self.event_sender, std::slice::from_ref(&entry)).await;

        Ok(entry)
    }

    /// Lists movements, most recent first, optionally scoped to one variant.
    pub async fn list_movements(
        &self,
        variant_id: Option<Uuid>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        let mut query = StockMovement::find().order_by_desc(stock_movement::Column::CreatedAt);
        if let Some(variant_id) = variant_id {
            query = query.filter(stock_movement::Column::VariantId.eq(variant_id));
        }

        let paginator = query.paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let movements = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((movements, total))
    }

    async fn apply_in_transaction(&self, input: &StockDelta) -> Result<LedgerEntry, ServiceError> {
        let input = input.clone();
        self.db
            .transaction::<_, LedgerEntry, ServiceError>(move |txn| {
                Box::pin(async move { apply_delta_within(txn, &input).await })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })
    }
}
