mod api_tests;

use crate::core::models::{
    CreateTransactionRequest, GroupDetails, NewUser, TransactionDetailInput, TransactionInput, User,
};
use crate::core::services::LedgerService;
use crate::infrastructure::logging::in_memory::InMemoryActivityLog;
use crate::infrastructure::storage::in_memory::InMemoryStorage;
use rust_decimal::Decimal;

pub const TEST_SECRET: &str = "test-secret";

pub fn create_test_service() -> LedgerService<InMemoryActivityLog, InMemoryStorage> {
    let storage = InMemoryStorage::new();
    let logging = InMemoryActivityLog::new();
    LedgerService::new(storage, logging, TEST_SECRET.to_string())
}

pub fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

pub async fn add_user(service: &LedgerService<InMemoryActivityLog, InMemoryStorage>, name: &str) -> User {
    service
        .create_user(NewUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            first_name: name.to_string(),
            last_name: "Tester".to_string(),
        })
        .await
        .unwrap()
}

/// Alice owns a group that Bob belongs to.
pub async fn seed_group(service: &LedgerService<InMemoryActivityLog, InMemoryStorage>) -> (User, User, GroupDetails) {
    let alice = add_user(service, "alice").await;
    let bob = add_user(service, "bob").await;
    let group = service
        .create_group("Flat".to_string(), Some("Shared flat costs".to_string()), alice.id)
        .await
        .unwrap();
    service.add_members(group.group.id, vec![bob.id], alice.id).await.unwrap();
    let group = service.get_group(group.group.id).await.unwrap();
    (alice, bob, group)
}

/// Builds a request where `payer` pays `amount` in `group_id`, split as `(amount, recipient)` rows
/// that all share the payer and group.
pub fn transaction_request(amount: &str, payer: i64, group_id: i64, splits: &[(&str, i64)]) -> CreateTransactionRequest {
    CreateTransactionRequest {
        transaction: Some(TransactionInput {
            amount: Some(dec(amount)),
            created_by: Some(payer),
            payer_id: Some(payer),
            group_id: Some(group_id),
            description: Some("Groceries".to_string()),
        }),
        details: Some(
            splits
                .iter()
                .map(|(split, recipient)| TransactionDetailInput {
                    amount: Some(dec(split)),
                    payer_id: Some(payer),
                    recipient_id: Some(*recipient),
                    group_id: Some(group_id),
                })
                .collect(),
        ),
    }
}
