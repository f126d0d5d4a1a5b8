use serde::Serialize;
use thiserror::Error;

/// HTTP-facing classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    InternalError,
}

#[derive(Error, Debug, Serialize)]
pub enum LedgerError {
    /// Body missing, not JSON, or a required field is absent or mistyped
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Path segment is not a positive integer id
    #[error("Invalid transaction id: {0}")]
    InvalidTransactionId(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Transaction amounts cannot be negative")]
    NegativeAmount,

    /// Referenced group is absent while validating a transaction
    #[error("group id does not exist: {0}")]
    GroupDoesNotExist(i64),

    #[error("Transaction group does not match transaction details group")]
    GroupMismatch,

    #[error("Transaction total does not equal sum of transaction details")]
    SumMismatch,

    #[error("Transaction payer does not match transaction details payer")]
    PayerMismatch,

    #[error("Transaction not found: {0}")]
    TransactionNotFound(i64),

    #[error("Group not found: {0}")]
    GroupNotFound(i64),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    /// Acting user named by a token or body is absent
    #[error("user id does not exist: {0}")]
    UserDoesNotExist(i64),

    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Email {0} already registered")]
    EmailAlreadyRegistered(String),

    #[error("User {0} is already a group member")]
    AlreadyGroupMember(i64),

    #[error("User {0} is not a group member")]
    NotGroupMember(i64),

    #[error("User {0} lacks permission for this group")]
    InsufficientRole(i64),

    #[error("Owner must transfer ownership before leaving")]
    OwnerCannotLeave,

    #[error("The group owner cannot be modified this way")]
    OwnerImmutable,

    #[error("User {0} still owns groups")]
    UserOwnsGroups(i64),

    #[error("Cannot act on another user's account")]
    NotAccountOwner,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Logging error: {0}")]
    LoggingError(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidRequest(_)
            | LedgerError::InvalidTransactionId(_)
            | LedgerError::InvalidId(_)
            | LedgerError::NegativeAmount
            | LedgerError::GroupMismatch
            | LedgerError::SumMismatch
            | LedgerError::PayerMismatch
            | LedgerError::InvalidEmail(_) => ErrorKind::InvalidRequest,
            LedgerError::Unauthorized(_) => ErrorKind::Unauthorized,
            LedgerError::NotGroupMember(_)
            | LedgerError::InsufficientRole(_)
            | LedgerError::OwnerCannotLeave
            | LedgerError::OwnerImmutable
            | LedgerError::NotAccountOwner => ErrorKind::Forbidden,
            LedgerError::GroupDoesNotExist(_)
            | LedgerError::TransactionNotFound(_)
            | LedgerError::GroupNotFound(_)
            | LedgerError::UserNotFound(_)
            | LedgerError::UserDoesNotExist(_) => ErrorKind::NotFound,
            LedgerError::EmailAlreadyRegistered(_)
            | LedgerError::AlreadyGroupMember(_)
            | LedgerError::UserOwnsGroups(_) => ErrorKind::Conflict,
            LedgerError::InternalServerError(_) | LedgerError::StorageError(_) | LedgerError::LoggingError(_) => {
                ErrorKind::InternalError
            }
        }
    }

    /// Text shown to API clients. Internal failures share one prefix and keep their detail.
    pub fn public_message(&self) -> String {
        match self {
            LedgerError::InternalServerError(_) => self.to_string(),
            LedgerError::StorageError(_) | LedgerError::LoggingError(_) => {
                format!("Internal server error: {}", self)
            }
            _ => self.to_string(),
        }
    }
}
