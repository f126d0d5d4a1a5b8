use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{
    api::models::{
        AddMembersRequest, ChangeStatusRequest, CreateGroupRequest, CreateUserRequest, ErrorResponse,
        UpdateGroupRequest, UpdateUserRequest,
    },
    core::models::{
        ActivityLogEntry, CreateTransactionRequest, Group, GroupDetails, GroupMember, MemberStatus, Role, Transaction,
        TransactionDetail, TransactionDetailInput, TransactionInput, UpdateTransactionRequest, User,
    },
};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::list_transactions,
        super::handlers::list_transaction_details,
        super::handlers::get_transaction,
        super::handlers::create_transaction,
        super::handlers::update_transaction,
        super::handlers::delete_transaction,
        super::handlers::list_groups,
        super::handlers::list_group_members,
        super::handlers::get_group,
        super::handlers::create_group,
        super::handlers::update_group,
        super::handlers::add_members,
        super::handlers::change_member_status,
        super::handlers::promote_member,
        super::handlers::demote_member,
        super::handlers::transfer_ownership,
        super::handlers::remove_member,
        super::handlers::leave_group,
        super::handlers::delete_group,
        super::handlers::list_users,
        super::handlers::create_user,
        super::handlers::user_groups,
        super::handlers::get_user,
        super::handlers::update_user,
        super::handlers::delete_user,
        super::handlers::get_activity_log
    ),
    components(schemas(
        CreateTransactionRequest,
        TransactionInput,
        TransactionDetailInput,
        UpdateTransactionRequest,
        CreateGroupRequest,
        UpdateGroupRequest,
        AddMembersRequest,
        ChangeStatusRequest,
        CreateUserRequest,
        UpdateUserRequest,
        ErrorResponse,
        Transaction,
        TransactionDetail,
        Group,
        GroupDetails,
        GroupMember,
        Role,
        MemberStatus,
        User,
        ActivityLogEntry
    )),
    modifiers(&BearerAuth),
    info(
        title = "Splitledger API",
        description = "Group expense ledger: users, groups, and validated transactions with per-recipient details",
        version = "0.1.0"
    )
)]
pub struct ApiDoc;
