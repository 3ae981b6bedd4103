//! Authentication handlers

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::services::auth::{AuthTokens, RegisterInput, RegisterResponse, TokenInfo};
use crate::services::AuthService;
use crate::AppState;

#[derive(Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token to check, from the body or else the Authorization header
#[derive(Deserialize, Default)]
pub struct VerifyRequest {
    pub token: Option<String>,
}

/// Issue a token pair for email and password
pub async fn issue_token(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> AppResult<Json<AuthTokens>> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.login(&body.email, &body.password).await?;
    Ok(Json(tokens))
}

/// Public sign-up endpoint handler
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let result = auth_service.register(input).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Refresh token endpoint handler
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<AuthTokens>> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.refresh_token(&body.refresh_token).await?;
    Ok(Json(tokens))
}

/// Check an access token
pub async fn verify_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<VerifyRequest>>,
) -> AppResult<Json<TokenInfo>> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);

    let token = body
        .and_then(|Json(b)| b.token)
        .or(from_header)
        .ok_or_else(|| AppError::validation("token", "A token is required", "Un jeton est requis"))?;

    let auth_service = AuthService::new(state.db.clone(), &state.config);
    Ok(Json(auth_service.verify(&token)?))
}
