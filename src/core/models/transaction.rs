use super::group::Group;
use super::user::User;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, de};
use std::str::FromStr;
use utoipa::ToSchema;

/// A persisted transaction joined with its creator, payer, group and detail rows.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub created_by: i64,
    pub payer_id: i64,
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub description: Option<String>,
    #[schema(value_type = String, example = "2024-06-01T12:34:56Z")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, example = "2024-06-01T12:34:56Z")]
    pub updated_at: DateTime<Utc>,
    pub group_id: i64,
    pub user: Option<User>,
    pub payer: Option<User>,
    pub group: Option<Group>,
    pub transaction_details: Vec<TransactionDetail>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    pub id: i64,
    pub transaction_id: i64,
    pub payer_id: i64,
    pub recipient_id: i64,
    pub group_id: i64,
    #[schema(value_type = f64)]
    pub amount: Decimal,
}

/// Client-supplied transaction fields. Every field is optional on the wire so that missing
/// values surface as a validation failure instead of an extractor rejection.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    #[serde(default, deserialize_with = "json_amount")]
    #[schema(value_type = Option<f64>)]
    pub amount: Option<Decimal>,
    pub created_by: Option<i64>,
    pub payer_id: Option<i64>,
    pub group_id: Option<i64>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetailInput {
    #[serde(default, deserialize_with = "json_amount")]
    #[schema(value_type = Option<f64>)]
    pub amount: Option<Decimal>,
    pub payer_id: Option<i64>,
    pub recipient_id: Option<i64>,
    pub group_id: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    #[serde(rename = "Transaction", alias = "transaction")]
    pub transaction: Option<TransactionInput>,
    #[serde(rename = "TransactionDetailsPartial", alias = "transactionDetailsPartial")]
    pub details: Option<Vec<TransactionDetailInput>>,
}

/// Partial edit of a stored transaction. `createdBy` and `groupId` cannot change.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransactionRequest {
    #[serde(default, deserialize_with = "json_amount")]
    #[schema(value_type = Option<f64>)]
    pub amount: Option<Decimal>,
    pub payer_id: Option<i64>,
    /// Absent keeps the stored description; an explicit `null` clears it.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(alias = "TransactionDetailsPartial")]
    pub transaction_details: Option<Vec<TransactionDetailInput>>,
}

/// A transaction that passed validation and is ready to be committed.
#[derive(Clone, Debug, PartialEq)]
pub struct NewTransaction {
    pub created_by: i64,
    pub payer_id: i64,
    pub group_id: i64,
    pub amount: Decimal,
    pub description: Option<String>,
    pub details: Vec<NewTransactionDetail>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewTransactionDetail {
    pub payer_id: i64,
    pub recipient_id: i64,
    pub group_id: i64,
    pub amount: Decimal,
}

impl TransactionDetailInput {
    pub fn from_detail(detail: &TransactionDetail) -> Self {
        TransactionDetailInput {
            amount: Some(detail.amount),
            payer_id: Some(detail.payer_id),
            recipient_id: Some(detail.recipient_id),
            group_id: Some(detail.group_id),
        }
    }
}

/// Accepts only JSON numbers; `serde-float` on its own would also take numeric strings.
fn json_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(number) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Some)
        .map_err(|_| de::Error::custom(format!("amount out of range: {}", text)))
}

// distinguishes an explicit null from a missing field
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
