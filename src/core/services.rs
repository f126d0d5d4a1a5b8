use crate::auth::jwt::{Claims, JwtService};
use crate::constants::{
    FORCED_ERROR_MESSAGE, GROUP_CREATED, GROUP_DELETED, GROUP_UPDATED, MEMBER_DEMOTED, MEMBER_LEFT, MEMBER_PROMOTED,
    MEMBER_REMOVED, MEMBER_STATUS_CHANGED, MEMBERS_ADDED, OWNERSHIP_TRANSFERRED, TRANSACTION_CREATED,
    TRANSACTION_DELETED, TRANSACTION_UPDATED, USER_CREATED, USER_DELETED, USER_UPDATED,
};
use crate::core::errors::LedgerError;
use crate::core::models::{
    ActivityLogEntry, CreateTransactionRequest, Group, GroupDetails, GroupMember, GroupPatch, MemberStatus, NewGroup,
    NewUser, Role, Transaction, TransactionDetail, TransactionDetailInput, TransactionInput, UpdateTransactionRequest,
    User, UserPatch,
};
use crate::core::validator::TransactionValidator;
use crate::infrastructure::logging::ActivityLog;
use crate::infrastructure::storage::Storage;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

const MAX_NAME_LENGTH: usize = 100;
const MAX_GROUP_DESCRIPTION_LENGTH: usize = 500;
/// Idle per-group guards are pruned once the registry grows past this size.
const GROUP_LOCK_PRUNE_THRESHOLD: usize = 1024;

pub struct LedgerService<L: ActivityLog, S: Storage> {
    storage: S,
    logging: L,
    validator: TransactionValidator,
    jwt_service: JwtService,
    group_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    require_auth: bool,
    force_list_error: bool,
}

impl<L: ActivityLog, S: Storage> LedgerService<L, S> {
    pub fn new(storage: S, logging: L, jwt_secret: String) -> Self {
        LedgerService {
            storage,
            logging,
            validator: TransactionValidator::new(),
            jwt_service: JwtService::new(jwt_secret),
            group_locks: Mutex::new(HashMap::new()),
            require_auth: false,
            force_list_error: false,
        }
    }

    pub fn with_require_auth(mut self, enabled: bool) -> Self {
        self.require_auth = enabled;
        self
    }

    pub fn with_forced_list_error(mut self, enabled: bool) -> Self {
        self.force_list_error = enabled;
        self
    }

    pub fn require_auth(&self) -> bool {
        self.require_auth
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, LedgerError> {
        self.jwt_service.validate_token(token)
    }

    pub fn issue_token(&self, user_id: i64) -> Result<String, LedgerError> {
        self.jwt_service.generate_token(user_id)
    }

    /// Serializes validate-then-commit sequences touching the same group. Unrelated groups
    /// get independent guards.
    async fn lock_group(&self, group_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.group_locks.lock().await;
            if locks.len() > GROUP_LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(group_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn log_activity(&self, action: &str, details: serde_json::Value, user_id: Option<i64>) {
        // the mutation is already committed; a failed audit write must not turn it into an error
        if let Err(err) = self.logging.record(action, details, user_id).await {
            warn!(action, error = %err, "failed to record activity");
        }
    }

    fn validate_string_input(&self, field: &str, value: &str, max_length: usize) -> Result<(), LedgerError> {
        if value.trim().is_empty() {
            return Err(LedgerError::InvalidRequest(format!("{} cannot be empty", field)));
        }
        if value.chars().count() > max_length {
            return Err(LedgerError::InvalidRequest(format!(
                "{} cannot exceed {} characters",
                field, max_length
            )));
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(LedgerError::InvalidRequest(format!("{} contains invalid characters", field)));
        }
        Ok(())
    }

    fn validate_email(&self, email: &str) -> Result<(), LedgerError> {
        self.validate_string_input("email", email, MAX_NAME_LENGTH)?;
        let valid = match email.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
            None => false,
        };
        if !valid || email.len() < 5 || email.contains(char::is_whitespace) {
            return Err(LedgerError::InvalidEmail(email.to_string()));
        }
        Ok(())
    }

    // ---- transactions ----

    pub async fn list_transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        if self.force_list_error {
            return Err(LedgerError::InternalServerError(FORCED_ERROR_MESSAGE.to_string()));
        }
        self.storage.list_transactions().await
    }

    pub async fn list_transaction_details(&self) -> Result<Vec<TransactionDetail>, LedgerError> {
        self.storage.list_transaction_details().await
    }

    pub async fn get_transaction(&self, transaction_id: i64) -> Result<Transaction, LedgerError> {
        self.storage
            .get_transaction(transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(transaction_id))
    }

    pub async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
        actor: Option<i64>,
    ) -> Result<Transaction, LedgerError> {
        let group_id = request.transaction.as_ref().and_then(|t| t.group_id);
        let _guard = match group_id {
            Some(id) => Some(self.lock_group(id).await),
            None => None,
        };

        let draft = self.validator.validate(request, &self.storage).await?;
        let transaction = self.storage.insert_transaction(draft).await?;
        info!(
            transaction_id = transaction.id,
            group_id = transaction.group_id,
            details = transaction.transaction_details.len(),
            "transaction created"
        );

        self.log_activity(
            TRANSACTION_CREATED,
            json!({
                "transaction_id": transaction.id,
                "group_id": transaction.group_id,
                "amount": transaction.amount.to_string(),
                "detail_count": transaction.transaction_details.len()
            }),
            actor.or(Some(transaction.created_by)),
        )
        .await;
        Ok(transaction)
    }

    /// Merges `patch` over the stored transaction and re-runs every acceptance check on the
    /// result before replacing it.
    pub async fn update_transaction(
        &self,
        transaction_id: i64,
        patch: UpdateTransactionRequest,
        actor: Option<i64>,
    ) -> Result<Transaction, LedgerError> {
        let group_id = self.get_transaction(transaction_id).await?.group_id;
        let _guard = self.lock_group(group_id).await;
        // re-read under the guard; a concurrent delete may have won
        let existing = self.get_transaction(transaction_id).await?;

        let details = patch.transaction_details.unwrap_or_else(|| {
            existing
                .transaction_details
                .iter()
                .map(TransactionDetailInput::from_detail)
                .collect()
        });
        let request = CreateTransactionRequest {
            transaction: Some(TransactionInput {
                amount: Some(patch.amount.unwrap_or(existing.amount)),
                created_by: Some(existing.created_by),
                payer_id: Some(patch.payer_id.unwrap_or(existing.payer_id)),
                group_id: Some(existing.group_id),
                description: patch.description.unwrap_or(existing.description),
            }),
            details: Some(details),
        };

        let draft = self.validator.validate(request, &self.storage).await?;
        let updated = self.storage.replace_transaction(transaction_id, draft).await?;
        info!(transaction_id, "transaction updated");

        self.log_activity(
            TRANSACTION_UPDATED,
            json!({
                "transaction_id": transaction_id,
                "group_id": updated.group_id,
                "amount": updated.amount.to_string(),
                "detail_count": updated.transaction_details.len()
            }),
            actor,
        )
        .await;
        Ok(updated)
    }

    pub async fn delete_transaction(&self, transaction_id: i64, actor: Option<i64>) -> Result<Transaction, LedgerError> {
        let group_id = self.get_transaction(transaction_id).await?.group_id;
        let _guard = self.lock_group(group_id).await;
        let deleted = self.storage.delete_transaction(transaction_id).await?;
        info!(transaction_id, group_id, "transaction deleted");

        self.log_activity(
            TRANSACTION_DELETED,
            json!({
                "transaction_id": transaction_id,
                "group_id": group_id,
                "detail_count": deleted.transaction_details.len()
            }),
            actor,
        )
        .await;
        Ok(deleted)
    }

    // ---- users ----

    pub async fn create_user(&self, user: NewUser) -> Result<User, LedgerError> {
        self.validate_string_input("username", &user.username, MAX_NAME_LENGTH)?;
        self.validate_email(&user.email)?;
        self.validate_string_input("firstName", &user.first_name, MAX_NAME_LENGTH)?;
        self.validate_string_input("lastName", &user.last_name, MAX_NAME_LENGTH)?;

        let created = self.storage.insert_user(user).await?;
        info!(user_id = created.id, "user created");
        self.log_activity(
            USER_CREATED,
            json!({ "user_id": created.id, "username": created.username, "email": created.email }),
            Some(created.id),
        )
        .await;
        Ok(created)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User, LedgerError> {
        self.storage
            .get_user(user_id)
            .await?
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, LedgerError> {
        self.storage.list_users().await
    }

    pub async fn update_user(&self, user_id: i64, patch: UserPatch, caller: i64) -> Result<User, LedgerError> {
        self.get_user(user_id).await?;
        if caller != user_id {
            return Err(LedgerError::NotAccountOwner);
        }
        if let Some(ref username) = patch.username {
            self.validate_string_input("username", username, MAX_NAME_LENGTH)?;
        }
        if let Some(ref email) = patch.email {
            self.validate_email(email)?;
        }
        if let Some(ref first_name) = patch.first_name {
            self.validate_string_input("firstName", first_name, MAX_NAME_LENGTH)?;
        }
        if let Some(ref last_name) = patch.last_name {
            self.validate_string_input("lastName", last_name, MAX_NAME_LENGTH)?;
        }

        let updated = self.storage.update_user(user_id, patch).await?;
        self.log_activity(USER_UPDATED, json!({ "user_id": user_id }), Some(caller))
            .await;
        Ok(updated)
    }

    pub async fn delete_user(&self, user_id: i64, caller: i64) -> Result<User, LedgerError> {
        self.get_user(user_id).await?;
        if caller != user_id {
            return Err(LedgerError::NotAccountOwner);
        }
        let deleted = self.storage.delete_user(user_id).await?;
        info!(user_id, "user deleted");
        self.log_activity(USER_DELETED, json!({ "user_id": user_id }), Some(caller))
            .await;
        Ok(deleted)
    }

    pub async fn user_groups(&self, caller: i64) -> Result<Vec<Group>, LedgerError> {
        self.storage
            .get_user(caller)
            .await?
            .ok_or(LedgerError::UserDoesNotExist(caller))?;
        self.storage.user_groups(caller).await
    }

    // ---- groups ----

    async fn require_membership(&self, group_id: i64, user_id: i64) -> Result<GroupMember, LedgerError> {
        if !self.storage.group_exists(group_id).await? {
            return Err(LedgerError::GroupNotFound(group_id));
        }
        self.storage
            .get_membership(group_id, user_id)
            .await?
            .ok_or(LedgerError::NotGroupMember(user_id))
    }

    async fn require_manager(&self, group_id: i64, user_id: i64) -> Result<GroupMember, LedgerError> {
        let member = self.require_membership(group_id, user_id).await?;
        if !member.can_manage() {
            return Err(LedgerError::InsufficientRole(user_id));
        }
        Ok(member)
    }

    async fn require_owner(&self, group_id: i64, user_id: i64) -> Result<GroupMember, LedgerError> {
        let member = self.require_membership(group_id, user_id).await?;
        if !member.is_owner() {
            return Err(LedgerError::InsufficientRole(user_id));
        }
        Ok(member)
    }

    pub async fn create_group(
        &self,
        name: String,
        description: Option<String>,
        caller: i64,
    ) -> Result<GroupDetails, LedgerError> {
        self.validate_string_input("name", &name, MAX_NAME_LENGTH)?;
        let description = description.unwrap_or_default();
        if description.chars().count() > MAX_GROUP_DESCRIPTION_LENGTH {
            return Err(LedgerError::InvalidRequest(format!(
                "description cannot exceed {} characters",
                MAX_GROUP_DESCRIPTION_LENGTH
            )));
        }

        let group = self
            .storage
            .insert_group(NewGroup {
                name,
                description,
                created_by: caller,
            })
            .await?;
        info!(group_id = group.group.id, owner = caller, "group created");

        self.log_activity(
            GROUP_CREATED,
            json!({ "group_id": group.group.id, "name": group.group.name }),
            Some(caller),
        )
        .await;
        Ok(group)
    }

    pub async fn get_group(&self, group_id: i64) -> Result<GroupDetails, LedgerError> {
        self.storage
            .get_group(group_id)
            .await?
            .ok_or(LedgerError::GroupNotFound(group_id))
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, LedgerError> {
        self.storage.list_groups().await
    }

    pub async fn list_group_members(&self) -> Result<Vec<GroupMember>, LedgerError> {
        self.storage.list_memberships().await
    }

    pub async fn update_group(&self, group_id: i64, patch: GroupPatch, caller: i64) -> Result<GroupDetails, LedgerError> {
        self.require_manager(group_id, caller).await?;
        if let Some(ref name) = patch.name {
            self.validate_string_input("name", name, MAX_NAME_LENGTH)?;
        }
        if let Some(ref description) = patch.description {
            if description.chars().count() > MAX_GROUP_DESCRIPTION_LENGTH {
                return Err(LedgerError::InvalidRequest(format!(
                    "description cannot exceed {} characters",
                    MAX_GROUP_DESCRIPTION_LENGTH
                )));
            }
        }

        let updated = self.storage.update_group(group_id, patch).await?;
        self.log_activity(
            GROUP_UPDATED,
            json!({ "group_id": group_id, "name": updated.group.name }),
            Some(caller),
        )
        .await;
        Ok(updated)
    }

    pub async fn add_members(&self, group_id: i64, member_ids: Vec<i64>, caller: i64) -> Result<Vec<GroupMember>, LedgerError> {
        self.require_manager(group_id, caller).await?;
        if member_ids.is_empty() {
            return Err(LedgerError::InvalidRequest("memberIds cannot be empty".to_string()));
        }

        let lookups = member_ids.iter().map(|&id| async move {
            self.storage
                .get_user(id)
                .await?
                .ok_or(LedgerError::UserDoesNotExist(id))
        });
        futures::future::try_join_all(lookups).await?;

        let added = self.storage.insert_memberships(group_id, &member_ids).await?;
        debug!(group_id, count = added.len(), "members added");
        self.log_activity(
            MEMBERS_ADDED,
            json!({ "group_id": group_id, "member_ids": member_ids }),
            Some(caller),
        )
        .await;
        Ok(added)
    }

    pub async fn change_member_status(
        &self,
        group_id: i64,
        member_id: i64,
        status: MemberStatus,
        caller: i64,
    ) -> Result<GroupMember, LedgerError> {
        self.require_manager(group_id, caller).await?;
        let target = self.require_membership(group_id, member_id).await?;
        if target.is_owner() {
            return Err(LedgerError::OwnerImmutable);
        }

        let updated = self
            .storage
            .update_membership(group_id, member_id, None, Some(status))
            .await?;
        self.log_activity(
            MEMBER_STATUS_CHANGED,
            json!({ "group_id": group_id, "user_id": member_id, "status": status }),
            Some(caller),
        )
        .await;
        Ok(updated)
    }

    pub async fn promote_member(&self, group_id: i64, member_id: i64, caller: i64) -> Result<GroupMember, LedgerError> {
        self.set_member_role(group_id, member_id, Role::Admin, caller, MEMBER_PROMOTED)
            .await
    }

    pub async fn demote_member(&self, group_id: i64, member_id: i64, caller: i64) -> Result<GroupMember, LedgerError> {
        self.set_member_role(group_id, member_id, Role::Member, caller, MEMBER_DEMOTED)
            .await
    }

    async fn set_member_role(
        &self,
        group_id: i64,
        member_id: i64,
        role: Role,
        caller: i64,
        action: &str,
    ) -> Result<GroupMember, LedgerError> {
        self.require_owner(group_id, caller).await?;
        let target = self.require_membership(group_id, member_id).await?;
        if target.is_owner() {
            return Err(LedgerError::OwnerImmutable);
        }

        let updated = self
            .storage
            .update_membership(group_id, member_id, Some(role), None)
            .await?;
        self.log_activity(
            action,
            json!({ "group_id": group_id, "user_id": member_id, "role": role }),
            Some(caller),
        )
        .await;
        Ok(updated)
    }

    pub async fn transfer_ownership(
        &self,
        group_id: i64,
        new_owner_id: i64,
        caller: i64,
    ) -> Result<GroupDetails, LedgerError> {
        self.require_owner(group_id, caller).await?;
        if new_owner_id == caller {
            return Err(LedgerError::InvalidRequest("user already owns this group".to_string()));
        }
        self.require_membership(group_id, new_owner_id).await?;

        let group = self
            .storage
            .transfer_ownership(group_id, caller, new_owner_id)
            .await?;
        info!(group_id, from = caller, to = new_owner_id, "ownership transferred");
        self.log_activity(
            OWNERSHIP_TRANSFERRED,
            json!({ "group_id": group_id, "old_owner_id": caller, "new_owner_id": new_owner_id }),
            Some(caller),
        )
        .await;
        Ok(group)
    }

    pub async fn remove_member(&self, group_id: i64, member_id: i64, caller: i64) -> Result<GroupMember, LedgerError> {
        let acting = self.require_manager(group_id, caller).await?;
        let target = self.require_membership(group_id, member_id).await?;
        if target.is_owner() {
            return Err(LedgerError::OwnerImmutable);
        }
        if target.role == Role::Admin && !acting.is_owner() {
            return Err(LedgerError::InsufficientRole(caller));
        }

        let removed = self.storage.remove_membership(group_id, member_id).await?;
        self.log_activity(
            MEMBER_REMOVED,
            json!({ "group_id": group_id, "user_id": member_id }),
            Some(caller),
        )
        .await;
        Ok(removed)
    }

    pub async fn leave_group(&self, group_id: i64, caller: i64) -> Result<GroupMember, LedgerError> {
        let member = self.require_membership(group_id, caller).await?;
        if member.is_owner() {
            return Err(LedgerError::OwnerCannotLeave);
        }

        let removed = self.storage.remove_membership(group_id, caller).await?;
        self.log_activity(MEMBER_LEFT, json!({ "group_id": group_id, "user_id": caller }), Some(caller))
            .await;
        Ok(removed)
    }

    /// Deletes the group together with every transaction filed under it.
    pub async fn delete_group(&self, group_id: i64, caller: i64) -> Result<GroupDetails, LedgerError> {
        self.require_owner(group_id, caller).await?;
        let _guard = self.lock_group(group_id).await;
        let deleted = self.storage.delete_group(group_id).await?;
        info!(group_id, "group deleted");

        self.log_activity(
            GROUP_DELETED,
            json!({ "group_id": group_id, "name": deleted.group.name }),
            Some(caller),
        )
        .await;
        Ok(deleted)
    }

    pub async fn activity_log(&self) -> Result<Vec<ActivityLogEntry>, LedgerError> {
        self.logging.entries().await
    }
}
