use crate::core::errors::LedgerError;
use crate::core::models::{
    Group, GroupDetails, GroupMember, GroupPatch, MemberStatus, NewGroup, NewTransaction, NewUser, Role, Transaction,
    TransactionDetail, User, UserPatch,
};
use crate::core::validator::{GroupDirectory, TransactionValidator};
use crate::infrastructure::storage::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
struct TransactionRow {
    id: i64,
    created_by: i64,
    payer_id: i64,
    amount: Decimal,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    group_id: i64,
}

/// Every table sits behind one lock so multi-row writes are all-or-nothing.
#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    groups: BTreeMap<i64, Group>,
    members: Vec<GroupMember>,
    transactions: BTreeMap<i64, TransactionRow>,
    details: BTreeMap<i64, TransactionDetail>,
    // detail ids per transaction, ascending
    details_by_transaction: BTreeMap<i64, Vec<i64>>,
    user_seq: i64,
    group_seq: i64,
    transaction_seq: i64,
    detail_seq: i64,
}

fn next_id(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id) != except)
    }

    fn group_details(&self, group: &Group) -> GroupDetails {
        GroupDetails {
            group: group.clone(),
            members: self
                .members
                .iter()
                .filter(|m| m.group_id == group.id)
                .cloned()
                .collect(),
        }
    }

    fn member_mut(&mut self, group_id: i64, user_id: i64) -> Result<&mut GroupMember, LedgerError> {
        self.members
            .iter_mut()
            .find(|m| m.group_id == group_id && m.user_id == user_id)
            .ok_or(LedgerError::NotGroupMember(user_id))
    }

    fn check_writable(&self, transaction: &NewTransaction) -> Result<(), LedgerError> {
        if !self.groups.contains_key(&transaction.group_id) {
            return Err(LedgerError::GroupDoesNotExist(transaction.group_id));
        }
        TransactionValidator::new().check_group_consistency(transaction)
    }

    fn write_details(&mut self, transaction_id: i64, transaction: &NewTransaction) {
        for detail in &transaction.details {
            let id = next_id(&mut self.detail_seq);
            self.details_by_transaction.entry(transaction_id).or_default().push(id);
            self.details.insert(
                id,
                TransactionDetail {
                    id,
                    transaction_id,
                    payer_id: detail.payer_id,
                    recipient_id: detail.recipient_id,
                    group_id: detail.group_id,
                    amount: detail.amount,
                },
            );
        }
    }

    /// Joins a transaction row with its creator, payer, group and details.
    fn assemble(&self, row: &TransactionRow) -> Transaction {
        Transaction {
            id: row.id,
            created_by: row.created_by,
            payer_id: row.payer_id,
            amount: row.amount,
            description: row.description.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            group_id: row.group_id,
            user: self.users.get(&row.created_by).cloned(),
            payer: self.users.get(&row.payer_id).cloned(),
            group: self.groups.get(&row.group_id).cloned(),
            transaction_details: self
                .details_by_transaction
                .get(&row.id)
                .into_iter()
                .flatten()
                .filter_map(|id| self.details.get(id))
                .cloned()
                .collect(),
        }
    }

    fn drop_details(&mut self, transaction_id: i64) {
        for id in self.details_by_transaction.remove(&transaction_id).unwrap_or_default() {
            self.details.remove(&id);
        }
    }

    fn remove_transaction(&mut self, transaction_id: i64) -> Option<Transaction> {
        let row = self.transactions.get(&transaction_id)?.clone();
        let snapshot = self.assemble(&row);
        self.transactions.remove(&transaction_id);
        self.drop_details(transaction_id);
        Some(snapshot)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

#[async_trait]
impl GroupDirectory for InMemoryStorage {
    async fn group_exists(&self, group_id: i64) -> Result<bool, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables.groups.contains_key(&group_id))
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn insert_user(&self, user: NewUser) -> Result<User, LedgerError> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email, None) {
            return Err(LedgerError::EmailAlreadyRegistered(user.email));
        }
        let id = next_id(&mut tables.user_seq);
        let created = User {
            id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: Utc::now(),
        };
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().cloned().collect())
    }

    async fn update_user(&self, user_id: i64, patch: UserPatch) -> Result<User, LedgerError> {
        let mut tables = self.tables.write().await;
        if let Some(ref email) = patch.email {
            if tables.email_taken(email, Some(user_id)) {
                return Err(LedgerError::EmailAlreadyRegistered(email.clone()));
            }
        }
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(LedgerError::UserNotFound(user_id))?;
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(first_name) = patch.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            user.last_name = last_name;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: i64) -> Result<User, LedgerError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(LedgerError::UserNotFound(user_id));
        }
        if tables.members.iter().any(|m| m.user_id == user_id && m.is_owner()) {
            return Err(LedgerError::UserOwnsGroups(user_id));
        }
        tables.members.retain(|m| m.user_id != user_id);
        tables
            .users
            .remove(&user_id)
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    async fn insert_group(&self, group: NewGroup) -> Result<GroupDetails, LedgerError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&group.created_by) {
            return Err(LedgerError::UserDoesNotExist(group.created_by));
        }
        let id = next_id(&mut tables.group_seq);
        let now = Utc::now();
        let created = Group {
            id,
            name: group.name,
            created_by: group.created_by,
            description: group.description,
            created_at: now,
            updated_at: now,
        };
        tables.groups.insert(id, created.clone());
        tables.members.push(GroupMember {
            group_id: id,
            user_id: group.created_by,
            role: Role::Owner,
            status: MemberStatus::Active,
            joined_at: now,
        });
        Ok(tables.group_details(&created))
    }

    async fn get_group(&self, group_id: i64) -> Result<Option<GroupDetails>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables.groups.get(&group_id).map(|g| tables.group_details(g)))
    }

    async fn list_groups(&self) -> Result<Vec<Group>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables.groups.values().cloned().collect())
    }

    async fn update_group(&self, group_id: i64, patch: GroupPatch) -> Result<GroupDetails, LedgerError> {
        let mut tables = self.tables.write().await;
        let group = tables
            .groups
            .get_mut(&group_id)
            .ok_or(LedgerError::GroupNotFound(group_id))?;
        if let Some(name) = patch.name {
            group.name = name;
        }
        if let Some(description) = patch.description {
            group.description = description;
        }
        group.updated_at = Utc::now();
        let group = group.clone();
        Ok(tables.group_details(&group))
    }

    async fn delete_group(&self, group_id: i64) -> Result<GroupDetails, LedgerError> {
        let mut tables = self.tables.write().await;
        let group = tables
            .groups
            .get(&group_id)
            .cloned()
            .ok_or(LedgerError::GroupNotFound(group_id))?;
        let snapshot = tables.group_details(&group);
        let owned: Vec<i64> = tables
            .transactions
            .values()
            .filter(|t| t.group_id == group_id)
            .map(|t| t.id)
            .collect();
        for transaction_id in owned {
            tables.remove_transaction(transaction_id);
        }
        tables.members.retain(|m| m.group_id != group_id);
        tables.groups.remove(&group_id);
        Ok(snapshot)
    }

    async fn user_groups(&self, user_id: i64) -> Result<Vec<Group>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables
            .groups
            .values()
            .filter(|g| tables.members.iter().any(|m| m.group_id == g.id && m.user_id == user_id))
            .cloned()
            .collect())
    }

    async fn list_memberships(&self) -> Result<Vec<GroupMember>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables.members.clone())
    }

    async fn get_membership(&self, group_id: i64, user_id: i64) -> Result<Option<GroupMember>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .iter()
            .find(|m| m.group_id == group_id && m.user_id == user_id)
            .cloned())
    }

    async fn insert_memberships(&self, group_id: i64, user_ids: &[i64]) -> Result<Vec<GroupMember>, LedgerError> {
        let mut tables = self.tables.write().await;
        if !tables.groups.contains_key(&group_id) {
            return Err(LedgerError::GroupNotFound(group_id));
        }
        for (index, &user_id) in user_ids.iter().enumerate() {
            if !tables.users.contains_key(&user_id) {
                return Err(LedgerError::UserDoesNotExist(user_id));
            }
            let duplicate = user_ids[..index].contains(&user_id);
            if duplicate || tables.members.iter().any(|m| m.group_id == group_id && m.user_id == user_id) {
                return Err(LedgerError::AlreadyGroupMember(user_id));
            }
        }
        let now = Utc::now();
        let added: Vec<GroupMember> = user_ids
            .iter()
            .map(|&user_id| GroupMember {
                group_id,
                user_id,
                role: Role::Member,
                status: MemberStatus::Active,
                joined_at: now,
            })
            .collect();
        tables.members.extend(added.iter().cloned());
        Ok(added)
    }

    async fn update_membership(
        &self,
        group_id: i64,
        user_id: i64,
        role: Option<Role>,
        status: Option<MemberStatus>,
    ) -> Result<GroupMember, LedgerError> {
        let mut tables = self.tables.write().await;
        let member = tables.member_mut(group_id, user_id)?;
        if let Some(role) = role {
            member.role = role;
        }
        if let Some(status) = status {
            member.status = status;
        }
        Ok(member.clone())
    }

    async fn transfer_ownership(&self, group_id: i64, from: i64, to: i64) -> Result<GroupDetails, LedgerError> {
        let mut tables = self.tables.write().await;
        let group = tables
            .groups
            .get(&group_id)
            .cloned()
            .ok_or(LedgerError::GroupNotFound(group_id))?;
        if !tables.member_mut(group_id, from)?.is_owner() {
            return Err(LedgerError::InsufficientRole(from));
        }
        // target must already be a member before either row changes
        tables.member_mut(group_id, to)?;
        tables.member_mut(group_id, from)?.role = Role::Admin;
        let new_owner = tables.member_mut(group_id, to)?;
        new_owner.role = Role::Owner;
        new_owner.status = MemberStatus::Active;
        Ok(tables.group_details(&group))
    }

    async fn remove_membership(&self, group_id: i64, user_id: i64) -> Result<GroupMember, LedgerError> {
        let mut tables = self.tables.write().await;
        let position = tables
            .members
            .iter()
            .position(|m| m.group_id == group_id && m.user_id == user_id)
            .ok_or(LedgerError::NotGroupMember(user_id))?;
        Ok(tables.members.remove(position))
    }

    async fn insert_transaction(&self, transaction: NewTransaction) -> Result<Transaction, LedgerError> {
        let mut tables = self.tables.write().await;
        tables.check_writable(&transaction)?;
        let id = next_id(&mut tables.transaction_seq);
        let now = Utc::now();
        let row = TransactionRow {
            id,
            created_by: transaction.created_by,
            payer_id: transaction.payer_id,
            amount: transaction.amount,
            description: transaction.description.clone(),
            created_at: now,
            updated_at: now,
            group_id: transaction.group_id,
        };
        tables.transactions.insert(id, row.clone());
        tables.write_details(id, &transaction);
        Ok(tables.assemble(&row))
    }

    async fn replace_transaction(
        &self,
        transaction_id: i64,
        transaction: NewTransaction,
    ) -> Result<Transaction, LedgerError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .transactions
            .get(&transaction_id)
            .cloned()
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        tables.check_writable(&transaction)?;
        let row = TransactionRow {
            id: transaction_id,
            created_by: existing.created_by,
            payer_id: transaction.payer_id,
            amount: transaction.amount,
            description: transaction.description.clone(),
            created_at: existing.created_at,
            updated_at: Utc::now(),
            group_id: existing.group_id,
        };
        tables.drop_details(transaction_id);
        tables.transactions.insert(transaction_id, row.clone());
        tables.write_details(transaction_id, &transaction);
        Ok(tables.assemble(&row))
    }

    async fn get_transaction(&self, transaction_id: i64) -> Result<Option<Transaction>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.get(&transaction_id).map(|row| tables.assemble(row)))
    }

    async fn list_transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.values().map(|row| tables.assemble(row)).collect())
    }

    async fn list_transaction_details(&self) -> Result<Vec<TransactionDetail>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables.details.values().cloned().collect())
    }

    async fn delete_transaction(&self, transaction_id: i64) -> Result<Transaction, LedgerError> {
        let mut tables = self.tables.write().await;
        tables
            .remove_transaction(transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))
    }
}
