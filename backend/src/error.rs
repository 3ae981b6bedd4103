//! Error handling for the Waste Collection Management Platform
//!
//! Provides consistent error responses in English and French

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use shared::models::TeamRuleViolation;
use shared::types::TransitionError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String, message_fr: String },

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_fr: String,
    },

    #[error("Validation failed on {} field(s)", .0.len())]
    ValidationFields(BTreeMap<String, Vec<String>>),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Conflict: {message}")]
    Conflict {
        resource: String,
        message: String,
        message_fr: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Validation error on a single field
    pub fn validation(field: &str, message: &str, message_fr: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
            message_fr: message_fr.to_string(),
        }
    }

    /// Validation error from one of the `shared::validation` rules
    pub fn invalid_field(field: &str, message: &'static str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
            message_fr: format!("Valeur invalide pour {}", field),
        }
    }

    /// Map a failed insert/update, turning unique violations into a
    /// duplicate error on `field`
    pub fn from_write(err: sqlx::Error, field: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                AppError::DuplicateEntry(field.to_string())
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
                AppError::NotFound(field.to_string())
            }
            _ => AppError::DatabaseError(err),
        }
    }

    /// Map a failed delete, turning foreign-key violations into a conflict
    pub fn from_delete(err: sqlx::Error, resource: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
                AppError::Conflict {
                    resource: resource.to_string(),
                    message: format!("This {} is still referenced by other records", resource),
                    message_fr: format!("Ce {} est encore référencé par d'autres enregistrements", resource),
                }
            }
            _ => AppError::DatabaseError(err),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::InvalidStateTransition(err.to_string())
    }
}

impl From<TeamRuleViolation> for AppError {
    fn from(err: TeamRuleViolation) -> Self {
        let message_fr = match err {
            TeamRuleViolation::LeadNotTeamLead => "Le chef d'équipe doit occuper le poste de chef d'équipe",
            TeamRuleViolation::VehicleNotOperational => "Le véhicule affecté doit être opérationnel",
            TeamRuleViolation::MemberNotActive => "Seuls les agents actifs peuvent rejoindre une équipe",
        };
        AppError::Conflict {
            resource: err.field().to_string(),
            message: err.to_string(),
            message_fr: message_fr.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        AppError::ValidationFields(fields)
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_fr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}

impl ErrorDetail {
    fn new(code: &str, message_en: impl Into<String>, message_fr: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message_en: message_en.into(),
            message_fr: message_fr.into(),
            field: None,
            fields: None,
        }
    }

    fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new(
                    "INVALID_CREDENTIALS",
                    "Invalid email or password",
                    "Email ou mot de passe incorrect",
                ),
            ),
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("TOKEN_EXPIRED", "Token has expired", "Le jeton a expiré"),
            ),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_TOKEN", "Invalid token", "Jeton invalide"),
            ),
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action",
                    "Vous n'avez pas la permission d'effectuer cette action",
                ),
            ),
            AppError::Unauthorized { message, message_fr } => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", message.clone(), message_fr.clone()),
            ),
            AppError::Validation {
                field,
                message,
                message_fr,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone(), message_fr.clone())
                    .with_field(field),
            ),
            AppError::ValidationFields(fields) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    fields: Some(fields.clone()),
                    ..ErrorDetail::new(
                        "VALIDATION_ERROR",
                        "One or more fields are invalid",
                        "Un ou plusieurs champs sont invalides",
                    )
                },
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "DUPLICATE_ENTRY",
                    format!("A record with this {} already exists", field),
                    format!("Un enregistrement avec ce {} existe déjà", field),
                )
                .with_field(field),
            ),
            AppError::Conflict {
                resource,
                message,
                message_fr,
            } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("CONFLICT", message.clone(), message_fr.clone())
                    .with_field(resource),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new(
                    "NOT_FOUND",
                    format!("{} not found", resource),
                    format!("{} introuvable", resource),
                ),
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "INVALID_STATE_TRANSITION",
                    msg.clone(),
                    format!("Changement de statut impossible : {}", msg),
                ),
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "CONFIGURATION_ERROR",
                    format!("Configuration error: {}", msg),
                    "Erreur de configuration du serveur",
                ),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "DATABASE_ERROR",
                    "A database error occurred",
                    "Une erreur de base de données est survenue",
                ),
            ),
            AppError::Internal(_) | AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    "An internal server error occurred",
                    "Une erreur interne est survenue",
                ),
            ),
        };

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::InsufficientPermissions, StatusCode::FORBIDDEN),
            (AppError::NotFound("Invoice".into()), StatusCode::NOT_FOUND),
            (AppError::DuplicateEntry("email".into()), StatusCode::CONFLICT),
            (
                AppError::validation("visit_order", "taken", "déjà utilisé"),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::InvalidStateTransition("nope".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AppError::InvalidToken, StatusCode::UNAUTHORIZED),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_transition_error_maps_to_unprocessable() {
        let err: AppError = TransitionError {
            entity: "round",
            from: "completed",
            action: "start",
        }
        .into();
        assert!(matches!(err, AppError::InvalidStateTransition(ref m) if m.contains("round")));
    }

    #[test]
    fn test_team_rule_is_a_conflict_on_its_field() {
        let err: AppError = TeamRuleViolation::VehicleNotOperational.into();
        assert!(matches!(err, AppError::Conflict { ref resource, .. } if resource == "vehicle_id"));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
