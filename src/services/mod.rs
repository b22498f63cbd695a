pub mod adjustments;
pub mod analytics;
pub mod catalog;
pub mod customers;
pub mod invoice;
pub mod production;
pub mod sales;
pub mod stock_ledger;
