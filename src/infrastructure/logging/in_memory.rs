use crate::core::errors::LedgerError;
use crate::core::models::ActivityLogEntry;
use crate::infrastructure::logging::ActivityLog;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct InMemoryActivityLog {
    entries: Arc<RwLock<Vec<ActivityLogEntry>>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        InMemoryActivityLog {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ActivityLog for InMemoryActivityLog {
    async fn record(&self, action: &str, details: serde_json::Value, user_id: Option<i64>) -> Result<(), LedgerError> {
        if !details.is_object() {
            return Err(LedgerError::LoggingError(format!(
                "details for {} must be a JSON object",
                action
            )));
        }
        let mut entries = self.entries.write().await;
        entries.push(ActivityLogEntry {
            id: Uuid::new_v4().to_string(),
            action: action.to_string(),
            user_id,
            details,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<ActivityLogEntry>, LedgerError> {
        let entries = self.entries.read().await;
        Ok(entries.clone())
    }
}
