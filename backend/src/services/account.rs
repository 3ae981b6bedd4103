//! Account management: users, profiles and client QR codes

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::listing::ListQuery;
use shared::codes::{generate_code, CodePrefix};
use shared::models::{account_extras, ClientQrCode, User, UserProfile, UserType};
use shared::types::PaginatedResponse;
use shared::validation::{validate_coordinates, validate_email, validate_password, validate_phone};

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, phone, user_type, is_active, date_joined, updated_at";

const PROFILE_COLUMNS: &str = "id, user_id, address, city, postal_code, country, latitude, longitude, \
     receive_notifications, language, created_at, updated_at";

/// Everything needed to create an account row
#[derive(Debug, Clone, Copy)]
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: Option<&'a str>,
    pub user_type: UserType,
}

/// Insert a user followed by its post-creation records.
///
/// Every account gets a profile; client accounts also get a QR code. Runs on
/// the caller's connection so the whole set commits or rolls back together.
pub async fn insert_account(conn: &mut PgConnection, new: NewAccount<'_>) -> AppResult<User> {
    validate_email(new.email).map_err(|m| AppError::invalid_field("email", m))?;
    validate_password(new.password).map_err(|m| AppError::invalid_field("password", m))?;
    if let Some(phone) = new.phone {
        validate_phone(phone).map_err(|m| AppError::invalid_field("phone", m))?;
    }

    let password_hash = bcrypt::hash(new.password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (email, password_hash, first_name, last_name, phone, user_type)
        VALUES (LOWER($1), $2, $3, $4, $5, $6)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(new.email.trim())
    .bind(&password_hash)
    .bind(new.first_name)
    .bind(new.last_name)
    .bind(new.phone)
    .bind(new.user_type)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::from_write(e, "email"))?;

    let extras = account_extras(user.user_type);
    if extras.profile {
        sqlx::query("INSERT INTO user_profiles (user_id) VALUES ($1)")
            .bind(user.id)
            .execute(&mut *conn)
            .await?;
    }
    if extras.qr_code {
        sqlx::query("INSERT INTO client_qr_codes (user_id, code) VALUES ($1, $2)")
            .bind(user.id)
            .bind(generate_code(CodePrefix::QrCode))
            .execute(&mut *conn)
            .await?;
    }

    Ok(user)
}

/// Admin input for creating an account of any type
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(max = 150))]
    pub first_name: String,
    #[validate(length(max = 150))]
    pub last_name: String,
    pub phone: Option<String>,
    pub user_type: UserType,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserInput {
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub user_type: Option<UserType>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileInput {
    pub address: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
    #[validate(length(max = 100))]
    pub country: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub receive_notifications: Option<bool>,
    #[validate(length(min = 2, max = 10))]
    pub language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub user_type: Option<UserType>,
    pub is_active: Option<bool>,
}

/// The caller's own account with its one-to-one extensions
#[derive(Debug, Serialize)]
pub struct AccountView {
    #[serde(flatten)]
    pub user: User,
    pub profile: Option<UserProfile>,
    pub qr_code: Option<ClientQrCode>,
}

/// Account service
#[derive(Clone)]
pub struct AccountService {
    db: PgPool,
}

impl AccountService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_users(
        &self,
        list: &ListQuery,
        filter: &UserFilter,
    ) -> AppResult<PaginatedResponse<User>> {
        let pagination = list.pagination();
        let order = list.order_by(
            &["email", "last_name", "date_joined", "user_type"],
            "date_joined DESC",
        );
        let conditions = r#"
            ($1::varchar IS NULL OR user_type = $1)
            AND ($2::boolean IS NULL OR is_active = $2)
            AND ($3::text IS NULL OR email ILIKE $3 OR first_name ILIKE $3
                 OR last_name ILIKE $3 OR phone ILIKE $3)
        "#;
        let search = list.search_pattern();

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {conditions} ORDER BY {order} LIMIT $4 OFFSET $5"
        ))
        .bind(filter.user_type)
        .bind(filter.is_active)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM users WHERE {conditions}"
        ))
        .bind(filter.user_type)
        .bind(filter.is_active)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(users, &pagination, total))
    }

    pub async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    pub async fn create_user(&self, input: CreateUserInput) -> AppResult<User> {
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
                user_type: input.user_type,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, user_type = %user.user_type, "account created");
        Ok(user)
    }

    /// Update an account. Promoting an account to client creates its QR code.
    pub async fn update_user(&self, user_id: Uuid, input: UpdateUserInput) -> AppResult<User> {
        input.validate()?;
        if let Some(phone) = input.phone.as_deref() {
            validate_phone(phone).map_err(|m| AppError::invalid_field("phone", m))?;
        }

        let mut tx = self.db.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                phone = COALESCE($4, phone),
                user_type = COALESCE($5, user_type),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.phone)
        .bind(input.user_type)
        .bind(input.is_active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        if account_extras(user.user_type).qr_code {
            sqlx::query(
                "INSERT INTO client_qr_codes (user_id, code) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(user.id)
            .bind(generate_code(CodePrefix::QrCode))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(user)
    }

    /// Accounts are never hard-deleted; deactivation blocks login and refresh
    pub async fn deactivate_user(&self, user_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET is_active = false, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }

        sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn get_account(&self, user_id: Uuid) -> AppResult<AccountView> {
        let user = self.get_user(user_id).await?;

        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let qr_code = self.find_qr_code(user_id).await?;

        Ok(AccountView {
            user,
            profile,
            qr_code,
        })
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        input: UpdateProfileInput,
    ) -> AppResult<UserProfile> {
        input.validate()?;
        match (input.latitude, input.longitude) {
            (Some(lat), Some(lon)) => {
                validate_coordinates(lat, lon).map_err(|m| AppError::invalid_field("latitude", m))?
            }
            (None, None) => {}
            _ => {
                return Err(AppError::validation(
                    "latitude",
                    "Latitude and longitude must be given together",
                    "La latitude et la longitude doivent être fournies ensemble",
                ))
            }
        }

        // Profiles are created with the account; the upsert covers accounts
        // that predate it
        sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            INSERT INTO user_profiles (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET
                address = COALESCE($2, user_profiles.address),
                city = COALESCE($3, user_profiles.city),
                postal_code = COALESCE($4, user_profiles.postal_code),
                country = COALESCE($5, user_profiles.country),
                latitude = COALESCE($6, user_profiles.latitude),
                longitude = COALESCE($7, user_profiles.longitude),
                receive_notifications = COALESCE($8, user_profiles.receive_notifications),
                language = COALESCE($9, user_profiles.language),
                updated_at = NOW()
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.postal_code)
        .bind(&input.country)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(input.receive_notifications)
        .bind(&input.language)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_write(e, "user"))
    }

    pub async fn get_qr_code(&self, user_id: Uuid) -> AppResult<ClientQrCode> {
        self.find_qr_code(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("QR code".to_string()))
    }

    async fn find_qr_code(&self, user_id: Uuid) -> AppResult<Option<ClientQrCode>> {
        let qr = sqlx::query_as::<_, ClientQrCode>(
            "SELECT id, user_id, code, is_active, created_at FROM client_qr_codes WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(qr)
    }
}
