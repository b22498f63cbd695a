use chrono::Utc;
use rand::Rng;
use sea_orm::{DbErr, SqlErr};

use crate::entities::transaction::TransactionType;

/// Generates a human-readable invoice/production reference.
///
/// The timestamp plus random suffix makes collisions rare; actual uniqueness
/// is enforced by the store's unique constraint, and creation paths retry
/// with a fresh number when it fires.
pub fn generate_invoice_number(transaction_type: TransactionType) -> String {
    let prefix = match transaction_type {
        TransactionType::Sale => "INV",
        TransactionType::Purchase => "PRD",
    };
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{}-{}-{:04}", prefix, timestamp, suffix)
}

/// Whether a database error is a unique-constraint violation, i.e. a
/// retryable invoice-number collision on the creation paths.
pub fn is_unique_violation(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    // SQLite reports constraint failures without a structured code in some
    // driver paths
    err.to_string().to_ascii_lowercase().contains("unique")
}
