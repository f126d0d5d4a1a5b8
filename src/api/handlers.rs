use crate::{
    api::{models::*, openapi::ApiDoc},
    auth::jwt::Claims,
    core::{
        errors::LedgerError,
        models::{
            ActivityLogEntry, CreateTransactionRequest, Group, GroupDetails, GroupMember, GroupPatch, NewUser,
            Transaction, TransactionDetail, UpdateTransactionRequest, User, UserPatch,
        },
        services::LedgerService,
    },
    infrastructure::{logging::in_memory::InMemoryActivityLog, storage::in_memory::InMemoryStorage},
};
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Request, State, rejection::JsonRejection},
    http::{StatusCode, request::Parts},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use http::header;
use std::sync::Arc;
use tracing::debug;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub type AppService = LedgerService<InMemoryActivityLog, InMemoryStorage>;

/// Verified user id taken from the bearer token. Rejects with 401 when no token was sent.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .ok_or_else(|| LedgerError::Unauthorized("Missing Authorization header".to_string()))?;
        Ok(Caller(claims.user_id()?))
    }
}

/// Like [`Caller`] but anonymous requests pass through as `None`.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub Option<i64>);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Claims>() {
            Some(claims) => Ok(Actor(Some(claims.user_id()?))),
            None => Ok(Actor(None)),
        }
    }
}

// Verifies a bearer token when one is sent; anonymous requests continue without claims
async fn auth_middleware(
    State(service): State<Arc<AppService>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        let auth_header = value
            .to_str()
            .map_err(|_| LedgerError::Unauthorized("Invalid Authorization header".to_string()))?;
        let claims = service.validate_token(bearer_token(auth_header))?;
        debug!(sub = %claims.sub, "bearer token accepted");
        req.extensions_mut().insert(claims);
    }
    Ok(next.run(req).await)
}

// Accepts `Bearer <jwt>`, `Bearer: <jwt>` and a bare `<jwt>`
fn bearer_token(auth_header: &str) -> &str {
    let auth_header = auth_header.trim();
    match auth_header.get(..6) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer") => auth_header[6..].trim_start_matches(':').trim(),
        _ => auth_header,
    }
}

// Rejects anonymous transaction writes while REQUIRE_AUTH is on
async fn require_token_middleware(
    State(service): State<Arc<AppService>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    if service.require_auth() && req.extensions().get::<Claims>().is_none() {
        return Err(LedgerError::Unauthorized("Missing Authorization header".to_string()).into());
    }
    Ok(next.run(req).await)
}

fn parse_positive(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

fn parse_transaction_id(raw: &str) -> Result<i64, LedgerError> {
    parse_positive(raw).ok_or_else(|| LedgerError::InvalidTransactionId(raw.to_string()))
}

fn parse_id(raw: &str) -> Result<i64, LedgerError> {
    parse_positive(raw).ok_or_else(|| LedgerError::InvalidId(raw.to_string()))
}

// Define API routes
pub fn api_routes(service: Arc<AppService>) -> Router {
    let transaction_writes = Router::new()
        .route("/Transactions/add", post(create_transaction))
        .route("/Transactions/{id}/edit", put(update_transaction))
        .route("/Transactions/{id}/delete", delete(delete_transaction))
        .route_layer(middleware::from_fn_with_state(service.clone(), require_token_middleware));

    Router::new()
        .route("/Transactions", get(list_transactions))
        .route("/Transactions/details", get(list_transaction_details))
        .route("/Transactions/{id}", get(get_transaction))
        .merge(transaction_writes)
        .route("/Groups", get(list_groups))
        .route("/Groups/create", post(create_group))
        .route("/Groups/members", get(list_group_members))
        .route("/Groups/{id}", get(get_group))
        .route("/Groups/{id}/update", put(update_group))
        .route("/Groups/{id}/addmembers", post(add_members))
        .route("/Groups/{id}/changestatus/{member_id}", put(change_member_status))
        .route("/Groups/{id}/promote/{member_id}", put(promote_member))
        .route("/Groups/{id}/demote/{member_id}", put(demote_member))
        .route("/Groups/{id}/transferownership/{member_id}", put(transfer_ownership))
        .route("/Groups/{id}/removemember/{member_id}", delete(remove_member))
        .route("/Groups/{id}/leave", delete(leave_group))
        .route("/Groups/{id}/delete", delete(delete_group))
        .route("/Users", get(list_users))
        .route("/Users/create", post(create_user))
        .route("/Users/groups", get(user_groups))
        .route("/Users/{id}", get(get_user))
        .route("/Users/{id}/update", put(update_user))
        .route("/Users/{id}/delete", delete(delete_user))
        .route("/logs", get(get_activity_log))
        .layer(middleware::from_fn_with_state(service.clone(), auth_middleware))
        .with_state(service)
}

/// Full application: versioned API, health check and the OpenAPI browser.
pub fn app(service: Arc<AppService>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api/v1", api_routes(service))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

// ---- transactions ----

#[utoipa::path(
    get,
    path = "/api/v1/Transactions",
    responses(
        (status = 200, description = "All transactions with their details", body = [Transaction]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub(crate) async fn list_transactions(State(service): State<Arc<AppService>>) -> Result<Json<Vec<Transaction>>, ApiError> {
    let transactions = service.list_transactions().await?;
    Ok(Json(transactions))
}

#[utoipa::path(
    get,
    path = "/api/v1/Transactions/details",
    responses(
        (status = 200, description = "Every stored transaction detail", body = [TransactionDetail])
    )
)]
pub(crate) async fn list_transaction_details(
    State(service): State<Arc<AppService>>,
) -> Result<Json<Vec<TransactionDetail>>, ApiError> {
    let details = service.list_transaction_details().await?;
    Ok(Json(details))
}

#[utoipa::path(
    get,
    path = "/api/v1/Transactions/{id}",
    params(
        ("id" = String, Path, description = "ID of the transaction to retrieve")
    ),
    responses(
        (status = 200, description = "Transaction retrieved successfully", body = Transaction),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Transaction not found", body = ErrorResponse)
    )
)]
pub(crate) async fn get_transaction(
    State(service): State<Arc<AppService>>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    let transaction = service.get_transaction(parse_transaction_id(&id)?).await?;
    Ok(Json(transaction))
}

#[utoipa::path(
    post,
    path = "/api/v1/Transactions/add",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction created with all details", body = Transaction),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 404, description = "Group does not exist", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn create_transaction(
    State(service): State<Arc<AppService>>,
    Actor(actor): Actor,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let Json(req) = payload?;
    let transaction = service.create_transaction(req, actor).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

#[utoipa::path(
    put,
    path = "/api/v1/Transactions/{id}/edit",
    params(
        ("id" = String, Path, description = "ID of the transaction to edit")
    ),
    request_body = UpdateTransactionRequest,
    responses(
        (status = 200, description = "Transaction replaced", body = Transaction),
        (status = 400, description = "Malformed id or validation failed", body = ErrorResponse),
        (status = 404, description = "Transaction not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn update_transaction(
    State(service): State<Arc<AppService>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTransactionRequest>, JsonRejection>,
) -> Result<Json<Transaction>, ApiError> {
    let id = parse_transaction_id(&id)?;
    let Json(req) = payload?;
    let transaction = service.update_transaction(id, req, actor).await?;
    Ok(Json(transaction))
}

#[utoipa::path(
    delete,
    path = "/api/v1/Transactions/{id}/delete",
    params(
        ("id" = String, Path, description = "ID of the transaction to delete")
    ),
    responses(
        (status = 200, description = "Snapshot of the deleted transaction", body = Transaction),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Transaction not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn delete_transaction(
    State(service): State<Arc<AppService>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    let deleted = service.delete_transaction(parse_transaction_id(&id)?, actor).await?;
    Ok(Json(deleted))
}

// ---- groups ----

#[utoipa::path(
    get,
    path = "/api/v1/Groups",
    responses(
        (status = 200, description = "All groups", body = [Group])
    )
)]
pub(crate) async fn list_groups(State(service): State<Arc<AppService>>) -> Result<Json<Vec<Group>>, ApiError> {
    Ok(Json(service.list_groups().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/Groups/members",
    responses(
        (status = 200, description = "Every membership row", body = [GroupMember])
    )
)]
pub(crate) async fn list_group_members(
    State(service): State<Arc<AppService>>,
) -> Result<Json<Vec<GroupMember>>, ApiError> {
    Ok(Json(service.list_group_members().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/Groups/{id}",
    params(
        ("id" = String, Path, description = "ID of the group")
    ),
    responses(
        (status = 200, description = "Group with its members", body = GroupDetails),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse)
    )
)]
pub(crate) async fn get_group(
    State(service): State<Arc<AppService>>,
    Path(id): Path<String>,
) -> Result<Json<GroupDetails>, ApiError> {
    Ok(Json(service.get_group(parse_id(&id)?).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/Groups/create",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group created with the caller as owner", body = GroupDetails),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Caller does not exist", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn create_group(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    payload: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GroupDetails>), ApiError> {
    let Json(req) = payload?;
    let group = service
        .create_group(req.name.unwrap_or_default(), req.description, caller)
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    put,
    path = "/api/v1/Groups/{id}/update",
    params(
        ("id" = String, Path, description = "ID of the group")
    ),
    request_body = UpdateGroupRequest,
    responses(
        (status = 200, description = "Group updated", body = GroupDetails),
        (status = 403, description = "Caller is not owner or admin", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn update_group(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateGroupRequest>, JsonRejection>,
) -> Result<Json<GroupDetails>, ApiError> {
    let group_id = parse_id(&id)?;
    let Json(req) = payload?;
    let patch = GroupPatch {
        name: req.name,
        description: req.description,
    };
    Ok(Json(service.update_group(group_id, patch, caller).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/Groups/{id}/addmembers",
    params(
        ("id" = String, Path, description = "ID of the group")
    ),
    request_body = AddMembersRequest,
    responses(
        (status = 200, description = "Members added", body = [GroupMember]),
        (status = 403, description = "Caller is not owner or admin", body = ErrorResponse),
        (status = 404, description = "Group or user not found", body = ErrorResponse),
        (status = 409, description = "User already a member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn add_members(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    payload: Result<Json<AddMembersRequest>, JsonRejection>,
) -> Result<Json<Vec<GroupMember>>, ApiError> {
    let group_id = parse_id(&id)?;
    let Json(req) = payload?;
    let member_ids = req.member_ids.unwrap_or_default();
    Ok(Json(service.add_members(group_id, member_ids, caller).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/Groups/{id}/changestatus/{member_id}",
    params(
        ("id" = String, Path, description = "ID of the group"),
        ("member_id" = String, Path, description = "ID of the member")
    ),
    request_body = ChangeStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = GroupMember),
        (status = 403, description = "Not permitted", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn change_member_status(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    Path((id, member_id)): Path<(String, String)>,
    payload: Result<Json<ChangeStatusRequest>, JsonRejection>,
) -> Result<Json<GroupMember>, ApiError> {
    let (group_id, member_id) = (parse_id(&id)?, parse_id(&member_id)?);
    let Json(req) = payload?;
    let status = req
        .status
        .ok_or_else(|| LedgerError::InvalidRequest("missing field `status`".to_string()))?;
    Ok(Json(
        service
            .change_member_status(group_id, member_id, status, caller)
            .await?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/Groups/{id}/promote/{member_id}",
    params(
        ("id" = String, Path, description = "ID of the group"),
        ("member_id" = String, Path, description = "ID of the member")
    ),
    responses(
        (status = 200, description = "Member is now an admin", body = GroupMember),
        (status = 403, description = "Caller is not the owner", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn promote_member(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<Json<GroupMember>, ApiError> {
    let (group_id, member_id) = (parse_id(&id)?, parse_id(&member_id)?);
    Ok(Json(service.promote_member(group_id, member_id, caller).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/Groups/{id}/demote/{member_id}",
    params(
        ("id" = String, Path, description = "ID of the group"),
        ("member_id" = String, Path, description = "ID of the member")
    ),
    responses(
        (status = 200, description = "Admin is now a plain member", body = GroupMember),
        (status = 403, description = "Caller is not the owner", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn demote_member(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<Json<GroupMember>, ApiError> {
    let (group_id, member_id) = (parse_id(&id)?, parse_id(&member_id)?);
    Ok(Json(service.demote_member(group_id, member_id, caller).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/Groups/{id}/transferownership/{member_id}",
    params(
        ("id" = String, Path, description = "ID of the group"),
        ("member_id" = String, Path, description = "ID of the new owner")
    ),
    responses(
        (status = 200, description = "Ownership transferred", body = GroupDetails),
        (status = 403, description = "Caller is not the owner or target is not a member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn transfer_ownership(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<Json<GroupDetails>, ApiError> {
    let (group_id, member_id) = (parse_id(&id)?, parse_id(&member_id)?);
    Ok(Json(service.transfer_ownership(group_id, member_id, caller).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/Groups/{id}/removemember/{member_id}",
    params(
        ("id" = String, Path, description = "ID of the group"),
        ("member_id" = String, Path, description = "ID of the member to remove")
    ),
    responses(
        (status = 200, description = "Member removed", body = GroupMember),
        (status = 403, description = "Not permitted", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn remove_member(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<Json<GroupMember>, ApiError> {
    let (group_id, member_id) = (parse_id(&id)?, parse_id(&member_id)?);
    Ok(Json(service.remove_member(group_id, member_id, caller).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/Groups/{id}/leave",
    params(
        ("id" = String, Path, description = "ID of the group")
    ),
    responses(
        (status = 200, description = "Caller left the group", body = GroupMember),
        (status = 403, description = "Not a member, or caller is the owner", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn leave_group(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<GroupMember>, ApiError> {
    Ok(Json(service.leave_group(parse_id(&id)?, caller).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/Groups/{id}/delete",
    params(
        ("id" = String, Path, description = "ID of the group")
    ),
    responses(
        (status = 200, description = "Group and its transactions deleted", body = GroupDetails),
        (status = 403, description = "Caller is not the owner", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn delete_group(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<GroupDetails>, ApiError> {
    Ok(Json(service.delete_group(parse_id(&id)?, caller).await?))
}

// ---- users ----

#[utoipa::path(
    get,
    path = "/api/v1/Users",
    responses(
        (status = 200, description = "All users", body = [User])
    )
)]
pub(crate) async fn list_users(State(service): State<Arc<AppService>>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(service.list_users().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/Users/create",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created successfully", body = User),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    )
)]
pub(crate) async fn create_user(
    State(service): State<Arc<AppService>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(req) = payload?;
    let user = NewUser {
        username: req.username.unwrap_or_default(),
        email: req.email.unwrap_or_default(),
        first_name: req.first_name.unwrap_or_default(),
        last_name: req.last_name.unwrap_or_default(),
    };
    let created = service.create_user(user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/v1/Users/groups",
    responses(
        (status = 200, description = "Groups the caller belongs to", body = [Group]),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn user_groups(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Group>>, ApiError> {
    Ok(Json(service.user_groups(caller).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/Users/{id}",
    params(
        ("id" = String, Path, description = "ID of the user to retrieve")
    ),
    responses(
        (status = 200, description = "User retrieved successfully", body = User),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub(crate) async fn get_user(
    State(service): State<Arc<AppService>>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(service.get_user(parse_id(&id)?).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/Users/{id}/update",
    params(
        ("id" = String, Path, description = "ID of the user")
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 403, description = "Caller is not this user", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn update_user(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let user_id = parse_id(&id)?;
    let Json(req) = payload?;
    let patch = UserPatch {
        username: req.username,
        email: req.email,
        first_name: req.first_name,
        last_name: req.last_name,
    };
    Ok(Json(service.update_user(user_id, patch, caller).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/Users/{id}/delete",
    params(
        ("id" = String, Path, description = "ID of the user")
    ),
    responses(
        (status = 200, description = "User deleted", body = User),
        (status = 403, description = "Caller is not this user", body = ErrorResponse),
        (status = 409, description = "User still owns groups", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
pub(crate) async fn delete_user(
    State(service): State<Arc<AppService>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(service.delete_user(parse_id(&id)?, caller).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/logs",
    responses(
        (status = 200, description = "Activity log in append order", body = [ActivityLogEntry]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub(crate) async fn get_activity_log(
    State(service): State<Arc<AppService>>,
) -> Result<Json<Vec<ActivityLogEntry>>, ApiError> {
    Ok(Json(service.activity_log().await?))
}
