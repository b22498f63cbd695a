use crate::{
    db::DbPool,
    entities::{
        customer,
        product::Entity as Product,
        product_variant::Entity as ProductVariant,
        stock_movement::StockMovementType,
        transaction::{self, Entity as Transaction, TransactionStatus, TransactionType},
        transaction_item::{self, Entity as TransactionItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        customers,
        invoice,
        stock_ledger::{self, LedgerEntry, StockDelta},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// How many fresh invoice numbers are tried when the unique constraint fires.
const MAX_INVOICE_ATTEMPTS: u32 = 3;

/// Who the sale is for: an existing record, or name/phone to upsert at the
/// register.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CustomerSelector {
    Existing { id: Uuid },
    Upsert { name: String, phone: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SaleItemInput {
    /// The variant the customer asked for; shown on the receipt
    pub variant_id: Uuid,
    pub quantity: i32,
    /// Negotiated price override; takes precedence over variant and product
    /// prices
    pub price_override: Option<Decimal>,
    /// When set, stock is checked and deducted from this variant instead of
    /// the requested one
    pub substitute_from_variant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateSaleInput {
    pub customer: CustomerSelector,
    pub items: Vec<SaleItemInput>,
    /// Absolute discount in currency, not a percentage
    pub discount: Decimal,
    /// Tax rate in percent
    pub tax_rate: Decimal,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SaleResponse {
    pub transaction: transaction::Model,
    pub items: Vec<transaction_item::Model>,
    pub customer: customer::Model,
}

struct SaleTxnOutcome {
    transaction: transaction::Model,
    items: Vec<transaction_item::Model>,
    customer: customer::Model,
    customer_created: bool,
    ledger_entries: Vec<LedgerEntry>,
}

/// Computed monetary breakdown of a sale.
#[derive(Debug, PartialEq, Eq)]
struct SaleTotals {
    subtotal: Decimal,
    discount_amount: Decimal,
    tax_amount: Decimal,
    total: Decimal,
}

/// `subtotal` is the sum of line totals; the discount is an absolute amount
/// subtracted before tax, and tax applies to the discounted base.
fn compute_totals(
    subtotal: Decimal,
    discount: Decimal,
    tax_rate: Decimal,
) -> Result<SaleTotals, ServiceError> {
    if discount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "discount must not be negative".to_string(),
        ));
    }
    if tax_rate < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "tax rate must not be negative".to_string(),
        ));
    }
    if discount > subtotal {
        return Err(ServiceError::ValidationError(
            "discount must not exceed the subtotal".to_string(),
        ));
    }

    let taxable = subtotal - discount;
    let tax_amount = taxable * tax_rate / Decimal::ONE_HUNDRED;
    let total = taxable + tax_amount;

    Ok(SaleTotals {
        subtotal,
        discount_amount: discount,
        tax_amount,
        total,
    })
}

/// Point-of-sale workflow: finalizes a sale and deducts stock, atomically.
#[derive(Clone)]
pub struct SaleService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl SaleService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a finalized sale: upserts the customer, writes the order and
    /// its items, and deducts stock per item through the ledger, all in one
    /// transaction. Any item failure aborts the whole sale.
    #[instrument(skip(self, input), fields(item_count = input.items.len()))]
    pub async fn create_sale(&self, input: CreateSaleInput) -> Result<SaleResponse, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "a sale needs at least one item".to_string(),
            ));
        }
        for item in &input.items {
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(
                    "item quantity must be positive".to_string(),
                ));
            }
            if matches!(item.price_override, Some(p) if p < Decimal::ZERO) {
                return Err(ServiceError::ValidationError(
                    "price override must not be negative".to_string(),
                ));
            }
        }

        let mut attempt = 0u32;
        let outcome = loop {
            let invoice_number = invoice::generate_invoice_number(TransactionType::Sale);
            match self.run_sale_transaction(input.clone(), invoice_number).await {
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
            transaction_id = %outcome.transaction.id,
            invoice_number = %outcome.transaction.invoice_number,
            total = %outcome.transaction.total_amount,
            "Sale completed"
        );

        if outcome.customer_created {
            if let Err(e) = self
                .event_sender
                .send(Event::CustomerCreated(outcome.customer.id))
                .await
            {
                warn!(error = %e, "Failed to send customer created event");
            }
        }
        if let Err(e) = self
            .event_sender
            .send(Event::SaleCompleted {
                transaction_id: outcome.transaction.id,
                invoice_number: outcome.transaction.invoice_number.clone(),
                total_amount: outcome.transaction.total_amount,
            })
            .await
        {
            warn!(error = %e, "Failed to send sale completed event");
        }
        stock_ledger::emit_movement_events(&self.event_sender, &outcome.ledger_entries).await;

        Ok(SaleResponse {
            transaction: outcome.transaction,
            items: outcome.items,
            customer: outcome.customer,
        })
    }

    pub async fn get_sale(&self, transaction_id: Uuid) -> Result<SaleResponse, ServiceError> {
        let header = Transaction::find_by_id(transaction_id)
            .filter(transaction::Column::TransactionType.eq(TransactionType::Sale))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", transaction_id)))?;

        let items = TransactionItem::find()
            .filter(transaction_item::Column::TransactionId.eq(transaction_id))
            .all(self.db.as_ref())
            .await?;

        let customer_id = header.supplier_id.ok_or_else(|| {
            ServiceError::InternalError(format!("Sale {} has no customer", transaction_id))
        })?;
        let customer = customer::Entity::find_by_id(customer_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", customer_id))
            })?;

        Ok(SaleResponse {
            transaction: header,
            items,
            customer,
        })
    }

    /// Lists sales, most recent first.
    pub async fn list_sales(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<transaction::Model>, u64), ServiceError> {
        let paginator = Transaction::find()
            .filter(transaction::Column::TransactionType.eq(TransactionType::Sale))
            .order_by_desc(transaction::Column::TransactionDate)
            .paginate(self.db.as_ref(), per_page.max(1));

        let total = paginator.num_items().await?;
        let sales = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((sales, total))
    }

    async fn run_sale_transaction(
        &self,
        input: CreateSaleInput,
        invoice_number: String,
    ) -> Result<SaleTxnOutcome, ServiceError> {
        self.db
            .transaction::<_, SaleTxnOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    // Resolve the customer first so the order header can
                    // reference it.
                    let (customer, customer_created) = match &input.customer {
                        CustomerSelector::Existing { id } => {
                            let found = customer::Entity::find_by_id(*id)
                                .one(txn)
                                .await?
                                .ok_or_else(|| {
                                    ServiceError::NotFound(format!("Customer {} not found", id))
                                })?;
                            (found, false)
                        }
                        CustomerSelector::Upsert { name, phone } => {
                            let outcome =
                                customers::upsert_by_phone_within(txn, name, phone.as_deref())
                                    .await?;
                            (outcome.customer, outcome.created)
                        }
                    };

                    // Resolve each line: the variant shown on the receipt,
                    // the variant stock is deducted from, and the unit price.
                    let mut lines = Vec::with_capacity(input.items.len());
                    let mut subtotal = Decimal::ZERO;
                    for item in &input.items {
                        let requested = ProductVariant::find_by_id(item.variant_id)
                            .one(txn)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Variant {} not found",
                                    item.variant_id
                                ))
                            })?;

                        let effective_id = item
                            .substitute_from_variant_id
                            .unwrap_or(item.variant_id);
                        let effective = if effective_id == requested.id {
                            requested.clone()
                        } else {
                            ProductVariant::find_by_id(effective_id)
                                .one(txn)
                                .await?
                                .ok_or_else(|| {
                                    ServiceError::NotFound(format!(
                                        "Substitute variant {} not found",
                                        effective_id
                                    ))
                                })?
                        };
                        if !effective.is_active {
                            return Err(ServiceError::InvalidOperation(format!(
                                "Variant {} is inactive",
                                effective.id
                            )));
                        }

                        // Price precedence: per-item override, then the
                        // requested variant's price, then the product price.
                        let unit_price = match (item.price_override, requested.price) {
                            (Some(price), _) => price,
                            (None, Some(price)) => price,
                            (None, None) => {
                                Product::find_by_id(requested.product_id)
                                    .one(txn)
                                    .await?
                                    .ok_or_else(|| {
                                        ServiceError::NotFound(format!(
                                            "Product {} not found",
                                            requested.product_id
                                        ))
                                    })?
                                    .price
                            }
                        };

                        let line_total = unit_price * Decimal::from(item.quantity);
                        subtotal += line_total;
                        lines.push((requested, effective, unit_price, line_total, item.quantity));
                    }

                    let totals = compute_totals(subtotal, input.discount, input.tax_rate)?;

                    let now = Utc::now();
                    let transaction_id = Uuid::new_v4();
                    let header = transaction::ActiveModel {
                        id: Set(transaction_id),
                        transaction_type: Set(TransactionType::Sale),
                        invoice_number: Set(invoice_number.clone()),
                        total_amount: Set(totals.total),
                        discount_amount: Set(totals.discount_amount),
                        tax_amount: Set(totals.tax_amount),
                        status: Set(TransactionStatus::Completed),
                        supplier_id: Set(Some(customer.id)),
                        user_id: Set(input.created_by),
                        notes: Set(input.notes.clone()),
                        transaction_date: Set(now),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };
                    let header = header.insert(txn).await?;

                    let mut items = Vec::with_capacity(lines.len());
                    let mut ledger_entries = Vec::with_capacity(lines.len());
                    for (requested, effective, unit_price, line_total, quantity) in &lines {
                        let item = transaction_item::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            transaction_id: Set(transaction_id),
                            product_id: Set(requested.product_id),
                            variant_id: Set(Some(requested.id)),
                            quantity: Set(*quantity),
                            unit_price: Set(*unit_price),
                            total_price: Set(*line_total),
                        };
                        items.push(item.insert(txn).await?);

                        // Deduct from the effective (possibly substituted)
                        // variant; rolls everything back on insufficiency.
                        let entry = stock_ledger::apply_delta_within(
                            txn,
                            &StockDelta {
                                variant_id: effective.id,
                                delta: -*quantity,
                                movement_type: StockMovementType::Out,
                                reason: "SALE".to_string(),
                                reference: Some(invoice_number.clone()),
                                created_by: input.created_by,
                            },
                        )
                        .await?;
                        ledger_entries.push(entry);
                    }

                    Ok(SaleTxnOutcome {
                        transaction: header,
                        items,
                        customer,
                        customer_created,
                        ledger_entries,
                    })
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })
    }
}
