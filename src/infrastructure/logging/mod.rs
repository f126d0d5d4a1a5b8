pub mod in_memory;

use crate::core::errors::LedgerError;
use crate::core::models::ActivityLogEntry;
use async_trait::async_trait;

/// Append-only audit trail of successful mutations.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record(&self, action: &str, details: serde_json::Value, user_id: Option<i64>) -> Result<(), LedgerError>;
    async fn entries(&self) -> Result<Vec<ActivityLogEntry>, LedgerError>;
}
