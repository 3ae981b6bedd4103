//! Authentication middleware
//!
//! Bearer-token authentication and capability checks

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::models::{Capability, UserType};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::auth::AuthService;
use crate::AppState;

/// Authenticated user information extracted from the access token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub user_type: UserType,
}

impl AuthUser {
    pub fn can(&self, capability: Capability) -> bool {
        self.user_type.can(capability)
    }

    /// Permission guard for use in handlers and services
    pub fn require(&self, capability: Capability) -> AppResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            tracing::debug!(
                user_id = %self.user_id,
                user_type = %self.user_type,
                ?capability,
                "permission denied"
            );
            Err(AppError::InsufficientPermissions)
        }
    }

    /// Passes when any one of `capabilities` is granted
    pub fn require_any(&self, capabilities: &[Capability]) -> AppResult<()> {
        match capabilities.iter().find(|c| self.can(**c)) {
            Some(_) => Ok(()),
            None => {
                tracing::debug!(
                    user_id = %self.user_id,
                    user_type = %self.user_type,
                    ?capabilities,
                    "permission denied"
                );
                Err(AppError::InsufficientPermissions)
            }
        }
    }

    /// Clients may read their own records; everyone else needs `capabilities`
    pub fn require_own_or_any(&self, capabilities: &[Capability]) -> AppResult<()> {
        if self.is_client() {
            Ok(())
        } else {
            self.require_any(capabilities)
        }
    }

    /// Clients only see their own records
    pub fn is_client(&self) -> bool {
        self.user_type.is_scoped_to_self()
    }
}

/// Authentication middleware that validates the bearer token
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        Some(token) => token,
        None => {
            return AppError::Unauthorized {
                message: "Missing or invalid Authorization header".to_string(),
                message_fr: "En-tête Authorization manquant ou invalide".to_string(),
            }
            .into_response()
        }
    };

    let claims = match AuthService::decode_access_token(token, &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };

    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => return AppError::InvalidToken.into_response(),
    };

    request.extensions_mut().insert(AuthUser {
        user_id,
        user_type: claims.user_type,
    });

    next.run(request).await
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authentication required".to_string(),
                message_fr: "Authentification requise".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require() {
        let supervisor = AuthUser {
            user_id: Uuid::new_v4(),
            user_type: UserType::Supervisor,
        };
        assert!(supervisor.require(Capability::ViewActiveAgents).is_ok());
        assert!(matches!(
            supervisor.require(Capability::ManageInvoices),
            Err(AppError::InsufficientPermissions)
        ));
        assert!(!supervisor.is_client());
    }

    #[test]
    fn test_require_any() {
        let collector = AuthUser {
            user_id: Uuid::new_v4(),
            user_type: UserType::PaymentCollector,
        };
        assert!(collector
            .require_any(&[Capability::ValidatePayments, Capability::RecordPayments])
            .is_ok());
        assert!(collector.require_any(&[Capability::ManageInvoices]).is_err());
        assert!(collector.require_any(&[]).is_err());
    }

    #[test]
    fn test_require_own_or_any() {
        let client = AuthUser {
            user_id: Uuid::new_v4(),
            user_type: UserType::Client,
        };
        let visitor = AuthUser {
            user_id: Uuid::new_v4(),
            user_type: UserType::Visitor,
        };
        assert!(client.require_own_or_any(&[Capability::ViewRegistry]).is_ok());
        assert!(visitor.require_own_or_any(&[Capability::ViewRegistry]).is_err());
    }
}
