pub mod customers;
pub mod health;
pub mod inventory;
pub mod production_orders;
pub mod products;
pub mod sales;

use crate::db::DbPool;
use crate::events::EventSender;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<crate::services::catalog::CatalogService>,
    pub customers: Arc<crate::services::customers::CustomerService>,
    pub sales: Arc<crate::services::sales::SaleService>,
    pub production: Arc<crate::services::production::ProductionOrderService>,
    pub stock_ledger: Arc<crate::services::stock_ledger::StockLedgerService>,
    pub adjustments: Arc<crate::services::adjustments::StockAdjustmentService>,
    pub analytics: Arc<crate::services::analytics::InventoryAnalyticsService>,
}

impl AppServices {
    /// Build the service container over one shared connection pool.
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        let stock_ledger = crate::services::stock_ledger::StockLedgerService::new(
            db_pool.clone(),
            event_sender.clone(),
        );

        Self {
            catalog: Arc::new(crate::services::catalog::CatalogService::new(
                db_pool.clone(),
            )),
            customers: Arc::new(crate::services::customers::CustomerService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            sales: Arc::new(crate::services::sales::SaleService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            production: Arc::new(crate::services::production::ProductionOrderService::new(
                db_pool.clone(),
                event_sender,
            )),
            adjustments: Arc::new(crate::services::adjustments::StockAdjustmentService::new(
                stock_ledger.clone(),
            )),
            stock_ledger: Arc::new(stock_ledger),
            analytics: Arc::new(crate::services::analytics::InventoryAnalyticsService::new(
                db_pool,
            )),
        }
    }
}
