pub mod api;
pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod infrastructure;

pub use crate::api::handlers::{AppService, app};
pub use crate::core::errors::LedgerError;
pub use crate::core::services::LedgerService;
pub use crate::infrastructure::logging::in_memory::InMemoryActivityLog;
pub use crate::infrastructure::storage::in_memory::InMemoryStorage;

#[cfg(test)]
mod tests; // Include integration tests
