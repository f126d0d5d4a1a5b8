use crate::core::errors::LedgerError;
use crate::core::models::{
    Group, GroupDetails, GroupMember, GroupPatch, MemberStatus, NewGroup, NewTransaction, NewUser, Role, Transaction,
    TransactionDetail, User, UserPatch,
};
use crate::core::validator::GroupDirectory;
use async_trait::async_trait;

/// Persistence collaborator. Each method is a single atomic unit: it either applies fully or
/// leaves the store untouched.
#[async_trait]
pub trait Storage: GroupDirectory {
    async fn insert_user(&self, user: NewUser) -> Result<User, LedgerError>;
    async fn get_user(&self, user_id: i64) -> Result<Option<User>, LedgerError>;
    async fn list_users(&self) -> Result<Vec<User>, LedgerError>;
    async fn update_user(&self, user_id: i64, patch: UserPatch) -> Result<User, LedgerError>;
    /// Removes the user and their memberships. Fails while the user still owns a group.
    async fn delete_user(&self, user_id: i64) -> Result<User, LedgerError>;

    /// Creates the group with `created_by` as its active owner.
    async fn insert_group(&self, group: NewGroup) -> Result<GroupDetails, LedgerError>;
    async fn get_group(&self, group_id: i64) -> Result<Option<GroupDetails>, LedgerError>;
    async fn list_groups(&self) -> Result<Vec<Group>, LedgerError>;
    async fn update_group(&self, group_id: i64, patch: GroupPatch) -> Result<GroupDetails, LedgerError>;
    /// Removes the group, its memberships, and every transaction filed under it.
    async fn delete_group(&self, group_id: i64) -> Result<GroupDetails, LedgerError>;
    async fn user_groups(&self, user_id: i64) -> Result<Vec<Group>, LedgerError>;

    async fn list_memberships(&self) -> Result<Vec<GroupMember>, LedgerError>;
    async fn get_membership(&self, group_id: i64, user_id: i64) -> Result<Option<GroupMember>, LedgerError>;
    /// Adds every user as an active member, or none of them.
    async fn insert_memberships(&self, group_id: i64, user_ids: &[i64]) -> Result<Vec<GroupMember>, LedgerError>;
    async fn update_membership(
        &self,
        group_id: i64,
        user_id: i64,
        role: Option<Role>,
        status: Option<MemberStatus>,
    ) -> Result<GroupMember, LedgerError>;
    /// Makes `to` the owner and demotes the current owner `from` to admin.
    async fn transfer_ownership(&self, group_id: i64, from: i64, to: i64) -> Result<GroupDetails, LedgerError>;
    async fn remove_membership(&self, group_id: i64, user_id: i64) -> Result<GroupMember, LedgerError>;

    /// Commits a validated transaction with all of its details. Group existence and detail
    /// group consistency are checked again inside the write.
    async fn insert_transaction(&self, transaction: NewTransaction) -> Result<Transaction, LedgerError>;
    /// Replaces the transaction row and its whole detail set, keeping `id` and `createdAt`.
    async fn replace_transaction(&self, transaction_id: i64, transaction: NewTransaction)
    -> Result<Transaction, LedgerError>;
    async fn get_transaction(&self, transaction_id: i64) -> Result<Option<Transaction>, LedgerError>;
    async fn list_transactions(&self) -> Result<Vec<Transaction>, LedgerError>;
    async fn list_transaction_details(&self) -> Result<Vec<TransactionDetail>, LedgerError>;
    /// Removes the transaction and cascades to its details, returning the prior snapshot.
    async fn delete_transaction(&self, transaction_id: i64) -> Result<Transaction, LedgerError>;
}

pub mod in_memory;
