use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::stock_movement::StockMovementType;

/// Events emitted by the services after their transaction commits.
///
/// Consumers are fire-and-forget: a dropped event never rolls back the
/// operation that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Sale events
    SaleCompleted {
        transaction_id: Uuid,
        invoice_number: String,
        total_amount: Decimal,
    },

    // Production order events
    ProductionOrderCreated {
        transaction_id: Uuid,
        invoice_number: String,
    },
    ProductionOrderCompleted {
        transaction_id: Uuid,
        invoice_number: String,
    },
    ProductionOrderCancelled {
        transaction_id: Uuid,
        invoice_number: String,
    },
    ProductionOrderDeleted {
        transaction_id: Uuid,
        invoice_number: String,
    },

    // Stock ledger events
    StockMovementRecorded {
        movement_id: Uuid,
        variant_id: Uuid,
        movement_type: StockMovementType,
        quantity: i32,
        new_stock: i32,
    },
    LowStockDetected {
        variant_id: Uuid,
        stock: i32,
        min_stock: i32,
    },

    // Customer events
    CustomerCreated(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Consumes events from the channel and logs them.
///
/// Runs as a background task for the lifetime of the process; dashboards and
/// notification integrations subscribe here rather than inside the services.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::LowStockDetected {
                variant_id,
                stock,
                min_stock,
            } => {
                warn!(
                    variant_id = %variant_id,
                    stock = stock,
                    min_stock = min_stock,
                    "Variant fell to or below its reorder threshold"
                );
            }
            other => {
                info!(event = ?other, "Event processed");
            }
        }
    }

    info!("Event channel closed; event processor shutting down");
}
