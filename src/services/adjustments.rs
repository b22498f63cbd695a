use crate::{
    errors::ServiceError,
    services::stock_ledger::{LedgerEntry, StockLedgerService},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockAdjustmentInput {
    pub variant_id: Uuid,
    /// Target absolute stock level
    pub new_stock: i32,
    /// Why the correction is being made; required
    pub reason: String,
    pub created_by: Uuid,
}

fn validate_reason(reason: &str) -> Result<&str, ServiceError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ServiceError::ValidationError(
            "an adjustment requires a reason".to_string(),
        ));
    }
    Ok(reason)
}

/// Manual stock corrections (recounts, damaged goods, shrinkage).
///
/// The target is an absolute stock level; the ledger turns it into a signed
/// ADJUSTMENT delta and rejects no-ops.
#[derive(Clone)]
pub struct StockAdjustmentService {
    ledger: StockLedgerService,
}

impl StockAdjustmentService {
    pub fn new(ledger: StockLedgerService) -> Self {
        Self { ledger }
    }

    #[instrument(skip(self, input), fields(variant_id = %input.variant_id, new_stock = input.new_stock))]
    pub async fn adjust_stock(
        &self,
        input: StockAdjustmentInput,
    ) -> Result<LedgerEntry, ServiceError> {
        let reason = validate_reason(&input.reason)?.to_string();

        self.ledger
            .set_stock_absolute(input.variant_id, input.new_stock, reason, input.created_by)
            .await
    }
}
