//! Authentication service for sign-up, login and token management

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::account::{insert_account, NewAccount};
use shared::models::{User, UserType};

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub user_type: UserType,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Public sign-up input. Accounts created this way are visitors.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(min = 1, max = 150))]
    pub first_name: String,
    #[validate(length(max = 150))]
    pub last_name: String,
    pub phone: Option<String>,
}

/// Response after successful registration
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: AuthTokens,
}

/// Result of checking an access token
#[derive(Debug, Serialize)]
pub struct TokenInfo {
    pub valid: bool,
    pub user_id: Uuid,
    pub user_type: UserType,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct Credentials {
    id: Uuid,
    password_hash: String,
    user_type: UserType,
    is_active: bool,
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Create a visitor account and log it in
    pub async fn register(&self, input: RegisterInput) -> AppResult<RegisterResponse> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let user = insert_account(
            &mut tx,
            NewAccount {
                email: &input.email,
                password: &input.password,
                first_name: &input.first_name,
                last_name: &input.last_name,
                phone: input.phone.as_deref(),
                user_type: UserType::Visitor,
            },
        )
        .await?;

        let tokens = self.generate_tokens(user.id, user.user_type)?;
        self.store_refresh_token(&mut tx, user.id, &tokens.refresh_token).await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, "visitor account registered");

        Ok(RegisterResponse { user, tokens })
    }

    /// Authenticate user with email and password
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthTokens> {
        let user = sqlx::query_as::<_, Credentials>(
            "SELECT id, password_hash, user_type, is_active FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AppError::Unauthorized {
                message: "Account is disabled".to_string(),
                message_fr: "Le compte est désactivé".to_string(),
            });
        }

        let valid = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        let mut conn = self.db.acquire().await?;
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&mut *conn)
            .await?;

        let tokens = self.generate_tokens(user.id, user.user_type)?;
        self.store_refresh_token(&mut conn, user.id, &tokens.refresh_token).await?;

        tracing::debug!(user_id = %user.id, user_type = %user.user_type, "login");

        Ok(tokens)
    }

    /// Exchange a refresh token for a new pair. Revoking the old token and
    /// storing the new one commit together.
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let mut tx = self.db.begin().await?;
        let (user_id, user_type) = Self::revoke_refresh_token(&mut tx, refresh_token).await?;

        let tokens = self.generate_tokens(user_id, user_type)?;
        self.store_refresh_token(&mut tx, user_id, &tokens.refresh_token).await?;
        tx.commit().await?;

        Ok(tokens)
    }

    /// Revoke a live refresh token and return its owner
    async fn revoke_refresh_token(
        conn: &mut PgConnection,
        refresh_token: &str,
    ) -> AppResult<(Uuid, UserType)> {
        let token_hash = Self::hash_token(refresh_token);

        // Revoking and reading in one statement makes each token single-use
        sqlx::query_as::<_, (Uuid, UserType)>(
            r#"
            UPDATE refresh_tokens rt
            SET revoked_at = NOW()
            FROM users u
            WHERE rt.token_hash = $1
              AND rt.expires_at > NOW()
              AND rt.revoked_at IS NULL
              AND u.id = rt.user_id
              AND u.is_active = true
            RETURNING rt.user_id, u.user_type
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Invalid or expired refresh token".to_string(),
            message_fr: "Jeton de rafraîchissement invalide ou expiré".to_string(),
        })
    }

    /// Check an access token and describe it
    pub fn verify(&self, token: &str) -> AppResult<TokenInfo> {
        let claims = Self::decode_access_token(token, &self.jwt_secret)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(AppError::InvalidToken)?;

        Ok(TokenInfo {
            valid: true,
            user_id,
            user_type: claims.user_type,
            expires_at,
        })
    }

    /// Decode and validate an access token signed with `secret`
    pub fn decode_access_token(token: &str, secret: &str) -> AppResult<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken,
        })
    }

    /// Generate access and refresh tokens
    fn generate_tokens(&self, user_id: Uuid, user_type: UserType) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let access_claims = Claims {
            sub: user_id.to_string(),
            user_type,
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        let refresh_token = Uuid::new_v4().to_string();

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    /// Store refresh token in database
    async fn store_refresh_token(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        token: &str,
    ) -> AppResult<()> {
        let token_hash = Self::hash_token(token);
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// SHA-256 hex digest of a token
    fn hash_token(token: &str) -> String {
        format!("{:x}", Sha256::digest(token.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn token_for(user_type: UserType, exp_offset: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            user_type,
            exp: now + exp_offset,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_hash_token_is_stable_sha256() {
        let hash = AuthService::hash_token("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash, AuthService::hash_token("abc"));
        assert_ne!(hash, AuthService::hash_token("abd"));
    }

    #[test]
    fn test_decode_round_trips_user_type() {
        let token = token_for(UserType::PaymentCollector, 3600);
        let claims = AuthService::decode_access_token(&token, SECRET).unwrap();
        assert_eq!(claims.user_type, UserType::PaymentCollector);
    }

    #[test]
    fn test_decode_rejects_wrong_secret() {
        let token = token_for(UserType::Admin, 3600);
        assert!(matches!(
            AuthService::decode_access_token(&token, "other-secret"),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_decode_reports_expiry() {
        // Default validation allows 60s of leeway
        let token = token_for(UserType::Client, -3600);
        assert!(matches!(
            AuthService::decode_access_token(&token, SECRET),
            Err(AppError::TokenExpired)
        ));
    }

    fn database_service() -> AuthService {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        AuthService {
            db: PgPool::connect_lazy(&url).expect("valid database URL"),
            jwt_secret: SECRET.to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 3600,
        }
    }

    #[tokio::test]
    #[ignore] // Requires database connection
    async fn test_abandoned_rotation_keeps_old_refresh_token() {
        let service = database_service();
        let registered = service
            .register(RegisterInput {
                email: format!("rotation-{}@ete.bf", Uuid::new_v4().simple()),
                password: "collecte-2026".to_string(),
                first_name: "Awa".to_string(),
                last_name: "Ouedraogo".to_string(),
                phone: None,
            })
            .await
            .unwrap();
        let old = registered.tokens.refresh_token;

        // Revoked but never committed, as when storing the new token fails
        let mut tx = service.db.begin().await.unwrap();
        AuthService::revoke_refresh_token(&mut tx, &old).await.unwrap();
        tx.rollback().await.unwrap();

        let rotated = service.refresh_token(&old).await.unwrap();
        assert!(service.refresh_token(&old).await.is_err());
        assert!(service.refresh_token(&rotated.refresh_token).await.is_ok());
    }
}
