use crate::{
    db::{self, DbPool},
    entities::{
        product_variant::Entity as ProductVariant,
        stock_movement::StockMovementType,
        transaction::{self, Entity as Transaction, TransactionStatus, TransactionType},
        transaction_item::{self, Entity as TransactionItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        invoice,
        stock_ledger::{self, LedgerEntry, StockDelta},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

const MAX_INVOICE_ATTEMPTS: u32 = 3;
const MAX_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductionItemInput {
    pub variant_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateProductionOrderInput {
    pub items: Vec<ProductionItemInput>,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ProductionOrderResponse {
    pub transaction: transaction::Model,
    pub items: Vec<transaction_item::Model>,
}

/// Production orders: internally generated purchase transactions that
/// replenish stock when manufacturing output is received.
///
/// Orders are created PENDING with no stock effect; the stock increment
/// happens exactly once, at completion. A PENDING order represents inventory
/// that has not been received yet.
#[derive(Clone)]
pub struct ProductionOrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ProductionOrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a PENDING production order with its items. Stock is untouched
    /// until `complete_production_order`.
    #[instrument(skip(self, input), fields(item_count = input.items.len()))]
    pub async fn create_production_order(
        &self,
        input: CreateProductionOrderInput,
    ) -> Result<ProductionOrderResponse, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "a production order needs at least one item".to_string(),
            ));
        }
        for item in &input.items {
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(
                    "item quantity must be positive".to_string(),
                ));
            }
            if item.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "unit price must not be negative".to_string(),
                ));
            }
        }

        let mut attempt = 0u32;
        let response = loop {
            let invoice_number = invoice::generate_invoice_number(TransactionType::Purchase);
            match self.run_create_transaction(input.clone(), invoice_number).await {
                Err(ServiceError::DatabaseError(err))
                    if invoice::is_unique_violation(&err) && attempt + 1 < MAX_INVOICE_ATTEMPTS =>
                {
                    attempt += 1;
                    warn!(attempt = attempt, "Invoice number collision; regenerating");
                }
                other => break other?,
            }
        };

        info!(
            transaction_id = %response.transaction.id,
            invoice_number = %response.transaction.invoice_number,
            "Production order created"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::ProductionOrderCreated {
                transaction_id: response.transaction.id,
                invoice_number: response.transaction.invoice_number.clone(),
            })
            .await
        {
            warn!(error = %e, "Failed to send production order created event");
        }

        Ok(response)
    }

    /// Receives the order's output into stock and marks it COMPLETED.
    ///
    /// The status guard and the increments run in one transaction, so a
    /// retried completion either sees PENDING (and applies once) or a
    /// terminal status (and is rejected) — never a double increment.
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn complete_production_order(
        &self,
        transaction_id: Uuid,
        completed_by: Uuid,
    ) -> Result<ProductionOrderResponse, ServiceError> {
        let mut attempt = 0u32;
        let (response, entries) = loop {
            match self.run_complete_transaction(transaction_id, completed_by).await {
                Err(ServiceError::DatabaseError(err)) if db::is_transient_conflict(&err) => {
                    attempt += 1;
                    if attempt >= MAX_CONFLICT_RETRIES {
                        return Err(ServiceError::ConcurrentModification(
                            transaction_id.to_string(),
                        ));
                    }
                    warn!(
                        attempt = attempt,
                        "Transient write conflict completing production order; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                }
                other => break other?,
            }
        };

        info!(
            transaction_id = %response.transaction.id,
            invoice_number = %response.transaction.invoice_number,
            "Production order completed"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::ProductionOrderCompleted {
                transaction_id: response.transaction.id,
                invoice_number: response.transaction.invoice_number.clone(),
            })
            .await
        {
            warn!(error = %e, "Failed to send production order completed event");
        }
        stock_ledger::emit_movement_events(&self.event_sender, &entries).await;

        Ok(response)
    }

    /// Cancels a PENDING order. Terminal states are rejected.
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn cancel_production_order(
        &self,
        transaction_id: Uuid,
    ) -> Result<ProductionOrderResponse, ServiceError> {
        let response = self
            .db
            .transaction::<_, ProductionOrderResponse, ServiceError>(move |txn| {
                Box::pin(async move {
                    let order = load_order_for_update(txn, transaction_id).await?;
                    ensure_pending(&order)?;

                    let mut active: transaction::ActiveModel = order.into();
                    active.status = Set(TransactionStatus::Cancelled);
                    active.updated_at = Set(Utc::now());
                    let order = active.update(txn).await?;

                    let items = TransactionItem::find()
                        .filter(transaction_item::Column::TransactionId.eq(transaction_id))
                        .all(txn)
                        .await?;

                    Ok(ProductionOrderResponse {
                        transaction: order,
                        items,
                    })
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        info!(transaction_id = %transaction_id, "Production order cancelled");

        if let Err(e) = self
            .event_sender
            .send(Event::ProductionOrderCancelled {
                transaction_id: response.transaction.id,
                invoice_number: response.transaction.invoice_number.clone(),
            })
            .await
        {
            warn!(error = %e, "Failed to send production order cancelled event");
        }

        Ok(response)
    }

    /// Deletes a PENDING order and its items.
    ///
    /// No movement reversal happens here: a PENDING order has never touched
    /// stock, which is exactly why deletion is restricted to that state.
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn delete_production_order(
        &self,
        transaction_id: Uuid,
    ) -> Result<(), ServiceError> {
        let invoice_number = self
            .db
            .transaction::<_, String, ServiceError>(move |txn| {
                Box::pin(async move {
                    let order = load_order_for_update(txn, transaction_id).await?;
                    ensure_pending(&order)?;

                    TransactionItem::delete_many()
                        .filter(transaction_item::Column::TransactionId.eq(transaction_id))
                        .exec(txn)
                        .await?;

                    let invoice_number = order.invoice_number.clone();
                    order.delete(txn).await?;
                    Ok(invoice_number)
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        info!(transaction_id = %transaction_id, "Production order deleted");

        if let Err(e) = self
            .event_sender
            .send(Event::ProductionOrderDeleted {
                transaction_id,
                invoice_number,
            })
            .await
        {
            warn!(error = %e, "Failed to send production order deleted event");
        }

        Ok(())
    }

    pub async fn get_production_order(
        &self,
        transaction_id: Uuid,
    ) -> Result<ProductionOrderResponse, ServiceError> {
        let order = Transaction::find_by_id(transaction_id)
            .filter(transaction::Column::TransactionType.eq(TransactionType::Purchase))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Production order {} not found", transaction_id))
            })?;

        let items = TransactionItem::find()
            .filter(transaction_item::Column::TransactionId.eq(transaction_id))
            .all(self.db.as_ref())
            .await?;

        Ok(ProductionOrderResponse {
            transaction: order,
            items,
        })
    }

    /// Lists production orders, most recent first, optionally by status.
    pub async fn list_production_orders(
        &self,
        status: Option<TransactionStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<transaction::Model>, u64), ServiceError> {
        let mut query = Transaction::find()
            .filter(transaction::Column::TransactionType.eq(TransactionType::Purchase))
            .order_by_desc(transaction::Column::TransactionDate);
        if let Some(status) = status {
            query = query.filter(transaction::Column::Status.eq(status));
        }

        let paginator = query.paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders, total))
    }

    async fn run_create_transaction(
        &self,
        input: CreateProductionOrderInput,
        invoice_number: String,
    ) -> Result<ProductionOrderResponse, ServiceError> {
        self.db
            .transaction::<_, ProductionOrderResponse, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut total = Decimal::ZERO;
                    let mut resolved = Vec::with_capacity(input.items.len());
                    for item in &input.items {
                        let variant = ProductVariant::find_by_id(item.variant_id)
                            .one(txn)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Variant {} not found",
                                    item.variant_id
                                ))
                            })?;
                        if !variant.is_active {
                            return Err(ServiceError::InvalidOperation(format!(
                                "Variant {} is inactive",
                                variant.id
                            )));
                        }

                        let line_total = item.unit_price * Decimal::from(item.quantity);
                        total += line_total;
                        resolved.push((variant, item.quantity, item.unit_price, line_total));
                    }

                    let now = Utc::now();
                    let transaction_id = Uuid::new_v4();
                    let header = transaction::ActiveModel {
                        id: Set(transaction_id),
                        transaction_type: Set(TransactionType::Purchase),
                        invoice_number: Set(invoice_number),
                        total_amount: Set(total),
                        discount_amount: Set(Decimal::ZERO),
                        tax_amount: Set(Decimal::ZERO),
                        status: Set(TransactionStatus::Pending),
                        supplier_id: Set(None),
                        user_id: Set(input.created_by),
                        notes: Set(input.notes.clone()),
                        transaction_date: Set(now),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };
                    let header = header.insert(txn).await?;

                    let mut items = Vec::with_capacity(resolved.len());
                    for (variant, quantity, unit_price, line_total) in &resolved {
                        let item = transaction_item::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            transaction_id: Set(transaction_id),
                            product_id: Set(variant.product_id),
                            variant_id: Set(Some(variant.id)),
                            quantity: Set(*quantity),
                            unit_price: Set(*unit_price),
                            total_price: Set(*line_total),
                        };
                        items.push(item.insert(txn).await?);
                    }

                    Ok(ProductionOrderResponse {
                        transaction: header,
                        items,
                    })
                })
            })
            .await
            .map_err(unwrap_txn_err)
    }

    async fn run_complete_transaction(
        &self,
        transaction_id: Uuid,
        completed_by: Uuid,
    ) -> Result<(ProductionOrderResponse, Vec<LedgerEntry>), ServiceError> {
        self.db
            .transaction::<_, (ProductionOrderResponse, Vec<LedgerEntry>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let order = load_order_for_update(txn, transaction_id).await?;
                        ensure_pending(&order)?;

                        let items = TransactionItem::find()
                            .filter(transaction_item::Column::TransactionId.eq(transaction_id))
                            .all(txn)
                            .await?;

                        let mut entries = Vec::with_capacity(items.len());
                        for item in &items {
                            let variant_id = item.variant_id.ok_or_else(|| {
                                ServiceError::InternalError(format!(
                                    "Production order item {} has no variant",
                                    item.id
                                ))
                            })?;

                            let entry = stock_ledger::apply_delta_within(
                                txn,
                                &StockDelta {
                                    variant_id,
                                    delta: item.quantity,
                                    movement_type: StockMovementType::In,
                                    reason: "PRODUCTION".to_string(),
                                    reference: Some(order.invoice_number.clone()),
                                    created_by: completed_by,
                                },
                            )
                            .await?;
                            entries.push(entry);
                        }

                        let mut active: transaction::ActiveModel = order.into();
                        active.status = Set(TransactionStatus::Completed);
                        active.updated_at = Set(Utc::now());
                        let order = active.update(txn).await?;

                        Ok((
                            ProductionOrderResponse {
                                transaction: order,
                                items,
                            },
                            entries,
                        ))
                    })
                },
            )
            .await
            .map_err(unwrap_txn_err)
    }
}

/// Loads a purchase transaction under a row lock for a guarded state change.
async fn load_order_for_update<C: sea_orm::ConnectionTrait>(
    conn: &C,
    transaction_id: Uuid,
) -> Result<transaction::Model, ServiceError> {
    Transaction::find_by_id(transaction_id)
        .filter(transaction::Column::TransactionType.eq(TransactionType::Purchase))
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Production order {} not found", transaction_id))
        })
}

/// The guarded transition: only PENDING orders may be completed, cancelled,
/// or deleted.
fn ensure_pending(order: &transaction::Model) -> Result<(), ServiceError> {
    match order.status {
        TransactionStatus::Pending => Ok(()),
        TransactionStatus::Completed => {
            Err(ServiceError::AlreadyCompleted(order.invoice_number.clone()))
        }
        TransactionStatus::Cancelled => {
            Err(ServiceError::AlreadyCancelled(order.invoice_number.clone()))
        }
    }
}

fn unwrap_txn_err(e: TransactionError<ServiceError>) -> ServiceError {
    match e {
        TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_with_status(status: TransactionStatus) -> transaction::Model {
        transaction::Model {
            id: Uuid::new_v4(),
            transaction_type: TransactionType::Purchase,
            invoice_number: "PRD-20260101120000-0001".to_string(),
            total_amount: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            status,
            supplier_id: None,
            user_id: Uuid::new_v4(),
            notes: None,
            transaction_date: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn pending_orders_pass_the_guard() {
        assert!(ensure_pending(&order_with_status(TransactionStatus::Pending)).is_ok());
    }

    #[test]
    fn completed_orders_are_rejected() {
        let err = ensure_pending(&order_with_status(TransactionStatus::Completed)).unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyCompleted(_)));
    }

    #[test]
    fn cancelled_orders_are_rejected() {
        let err = ensure_pending(&order_with_status(TransactionStatus::Cancelled)).unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyCancelled(_)));
    }
}
