//! HTTP handlers for user accounts and the caller's own profile

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::models::{Capability, ClientQrCode, User, UserProfile};
use shared::types::PaginatedResponse;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::account::{
    AccountView, CreateUserInput, UpdateProfileInput, UpdateUserInput, UserFilter,
};
use crate::services::listing::ListQuery;
use crate::services::AccountService;
use crate::AppState;

// ============================================================================
// User administration
// ============================================================================

pub async fn list_users(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(list): Query<ListQuery>,
    Query(filter): Query<UserFilter>,
) -> AppResult<Json<PaginatedResponse<User>>> {
    current_user.0.require(Capability::ManageUsers)?;
    let service = AccountService::new(state.db);
    Ok(Json(service.list_users(&list, &filter).await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    current_user.0.require(Capability::ManageUsers)?;
    let service = AccountService::new(state.db);
    Ok(Json(service.get_user(user_id).await?))
}

/// Create an account of any type
pub async fn create_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateUserInput>,
) -> AppResult<(StatusCode, Json<User>)> {
    current_user.0.require(Capability::ManageUsers)?;
    let service = AccountService::new(state.db);
    let user = service.create_user(input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(input): Json<UpdateUserInput>,
) -> AppResult<Json<User>> {
    current_user.0.require(Capability::ManageUsers)?;
    let service = AccountService::new(state.db);
    Ok(Json(service.update_user(user_id, input).await?))
}

/// Accounts are deactivated, never removed
pub async fn deactivate_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Capability::ManageUsers)?;
    let service = AccountService::new(state.db);
    service.deactivate_user(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Own account
// ============================================================================

pub async fn get_me(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<AccountView>> {
    let service = AccountService::new(state.db);
    Ok(Json(service.get_account(current_user.0.user_id).await?))
}

pub async fn update_my_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<UpdateProfileInput>,
) -> AppResult<Json<UserProfile>> {
    let service = AccountService::new(state.db);
    Ok(Json(service.update_profile(current_user.0.user_id, input).await?))
}

/// QR code of a client account
pub async fn get_my_qr_code(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ClientQrCode>> {
    let service = AccountService::new(state.db);
    Ok(Json(service.get_qr_code(current_user.0.user_id).await?))
}
