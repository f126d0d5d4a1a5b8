//! Acceptance rules for a transaction and its detail rows.
//!
//! Checks run in a fixed order and the first failure wins:
//! shape, negative amounts, group existence, group consistency, sum, payer.

use crate::core::errors::LedgerError;
use crate::core::models::{
    CreateTransactionRequest, NewTransaction, NewTransactionDetail, TransactionDetailInput, TransactionInput,
};
use async_trait::async_trait;
use rust_decimal::Decimal;

pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Existence lookup for the group a transaction is filed under.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn group_exists(&self, group_id: i64) -> Result<bool, LedgerError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionValidator;

impl TransactionValidator {
    pub fn new() -> Self {
        TransactionValidator
    }

    /// Runs every check against `request` and returns the canonical shape to persist.
    /// Nothing is written here; committing is the caller's job.
    pub async fn validate<G>(&self, request: CreateTransactionRequest, groups: &G) -> Result<NewTransaction, LedgerError>
    where
        G: GroupDirectory + ?Sized,
    {
        let draft = self.check_shape(request)?;
        self.check_non_negative(&draft)?;
        if !groups.group_exists(draft.group_id).await? {
            return Err(LedgerError::GroupDoesNotExist(draft.group_id));
        }
        self.check_group_consistency(&draft)?;
        self.check_sum(&draft)?;
        self.check_payer_consistency(&draft)?;
        Ok(draft)
    }

    fn check_shape(&self, request: CreateTransactionRequest) -> Result<NewTransaction, LedgerError> {
        let TransactionInput {
            amount,
            created_by,
            payer_id,
            group_id,
            description,
        } = request
            .transaction
            .ok_or_else(|| LedgerError::InvalidRequest("missing field `Transaction`".to_string()))?;
        let details = request
            .details
            .ok_or_else(|| LedgerError::InvalidRequest("missing field `TransactionDetailsPartial`".to_string()))?;
        if details.is_empty() {
            return Err(LedgerError::InvalidRequest(
                "a transaction needs at least one transaction detail".to_string(),
            ));
        }

        if let Some(ref text) = description {
            if text.chars().count() > MAX_DESCRIPTION_LENGTH {
                return Err(LedgerError::InvalidRequest(format!(
                    "description cannot exceed {} characters",
                    MAX_DESCRIPTION_LENGTH
                )));
            }
        }

        let details = details
            .into_iter()
            .enumerate()
            .map(|(index, detail)| detail_shape(index, detail))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NewTransaction {
            created_by: required(created_by, "createdBy", "Transaction")?,
            payer_id: required(payer_id, "payerId", "Transaction")?,
            group_id: required(group_id, "groupId", "Transaction")?,
            amount: required(amount, "amount", "Transaction")?,
            description,
            details,
        })
    }

    fn check_non_negative(&self, draft: &NewTransaction) -> Result<(), LedgerError> {
        if draft.amount < Decimal::ZERO || draft.details.iter().any(|d| d.amount < Decimal::ZERO) {
            return Err(LedgerError::NegativeAmount);
        }
        Ok(())
    }

    /// Every detail must be filed under the transaction's group, even when only one of
    /// several details disagrees.
    pub fn check_group_consistency(&self, draft: &NewTransaction) -> Result<(), LedgerError> {
        if draft.details.iter().any(|d| d.group_id != draft.group_id) {
            return Err(LedgerError::GroupMismatch);
        }
        Ok(())
    }

    fn check_sum(&self, draft: &NewTransaction) -> Result<(), LedgerError> {
        let total = draft
            .details
            .iter()
            .try_fold(Decimal::ZERO, |acc, d| acc.checked_add(d.amount));
        match total {
            Some(total) if total == draft.amount => Ok(()),
            _ => Err(LedgerError::SumMismatch),
        }
    }

    fn check_payer_consistency(&self, draft: &NewTransaction) -> Result<(), LedgerError> {
        if draft.details.iter().any(|d| d.payer_id != draft.payer_id) {
            return Err(LedgerError::PayerMismatch);
        }
        Ok(())
    }
}

fn detail_shape(index: usize, detail: TransactionDetailInput) -> Result<NewTransactionDetail, LedgerError> {
    let location = format!("TransactionDetailsPartial[{}]", index);
    Ok(NewTransactionDetail {
        payer_id: required(detail.payer_id, "payerId", &location)?,
        recipient_id: required(detail.recipient_id, "recipientId", &location)?,
        group_id: required(detail.group_id, "groupId", &location)?,
        amount: required(detail.amount, "amount", &location)?,
    })
}

fn required<T>(value: Option<T>, field: &str, location: &str) -> Result<T, LedgerError> {
    value.ok_or_else(|| LedgerError::InvalidRequest(format!("missing field `{}` in {}", field, location)))
}
