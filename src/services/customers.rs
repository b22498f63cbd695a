use crate::{
    db::DbPool,
    entities::customer::{self, Entity as Customer},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionError, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Customer records, upserted from the register at sale time.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

/// Result of an upsert: the record plus whether it was newly created.
pub(crate) struct UpsertOutcome {
    pub customer: customer::Model,
    pub created: bool,
}

/// Upserts a customer inside the caller's transaction.
///
/// Matching is by phone number; a match updates the stored name, no phone
/// means an anonymous walk-in record is always created fresh.
pub(crate) async fn upsert_by_phone_within<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    phone: Option<&str>,
) -> Result<UpsertOutcome, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::ValidationError(
            "customer name must not be blank".to_string(),
        ));
    }

    if let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(existing) = Customer::find()
            .filter(customer::Column::Phone.eq(phone))
            .one(conn)
            .await?
        {
            if existing.name == name {
                return Ok(UpsertOutcome {
                    customer: existing,
                    created: false,
                });
            }

            let mut active: customer::ActiveModel = existing.into();
            active.name = Set(name.to_string());
            active.updated_at = Set(Utc::now());
            let updated = active.update(conn).await?;
            return Ok(UpsertOutcome {
                customer: updated,
                created: false,
            });
        }

        let model = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            phone: Set(Some(phone.to_string())),
            email: Set(None),
            address: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let created = model.insert(conn).await?;
        return Ok(UpsertOutcome {
            customer: created,
            created: true,
        });
    }

    let model = customer::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        phone: Set(None),
        email: Set(None),
        address: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    };
    let created = model.insert(conn).await?;
    Ok(UpsertOutcome {
        customer: created,
        created: true,
    })
}

impl CustomerService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Upserts a customer by phone number in its own transaction.
    #[instrument(skip(self, name, phone))]
    pub async fn upsert_by_phone(
        &self,
        name: String,
        phone: Option<String>,
    ) -> Result<customer::Model, ServiceError> {
        let outcome = self
            .db
            .transaction::<_, UpsertOutcome, ServiceError>(move |txn| {
                Box::pin(
                    async move { upsert_by_phone_within(txn, &name, phone.as_deref()).await },
                )
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        if outcome.created {
            info!(customer_id = %outcome.customer.id, "Customer created");
            if let Err(e) = self
                .event_sender
                .send(Event::CustomerCreated(outcome.customer.id))
                .await
            {
                warn!(error = %e, "Failed to send customer created event");
            }
        }

        Ok(outcome.customer)
    }

    pub async fn get_customer(&self, customer_id: Uuid) -> Result<customer::Model, ServiceError> {
        Customer::find_by_id(customer_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", customer_id)))
    }

    /// Lists customers, newest first, optionally filtered by a name/phone
    /// search term.
    pub async fn list_customers(
        &self,
        search: Option<String>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<customer::Model>, u64), ServiceError> {
        let mut query = Customer::find().order_by_desc(customer::Column::CreatedAt);

        if let Some(term) = search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", term);
            query = query.filter(
                Condition::any()
                    .add(customer::Column::Name.like(pattern.clone()))
                    .add(customer::Column::Phone.like(pattern)),
            );
        }

        let paginator = query.paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let customers = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((customers, total))
    }
}
