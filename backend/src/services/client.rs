//! Client registry: client records, inactivity tracking and history

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::account::{insert_account, NewAccount};
use crate::services::contract::{Bin, Contract, BIN_COLUMNS, CONTRACT_COLUMNS};
use crate::services::listing::ListQuery;
use shared::codes::{generate_code, CodePrefix};
use shared::models::{inactivity_cutoff, ClientStatus, ClientType, UserType};
use shared::types::PaginatedResponse;
use shared::validation::{validate_coordinates, validate_phone};

pub(crate) const CLIENT_COLUMNS: &str = r#"
    c.id, c.user_id, c.code, c.client_type, c.status, c.company_name, c.contact_person,
    c.secondary_phone, c.service_address, c.service_city, c.service_postal_code,
    c.latitude, c.longitude, c.zone_id, c.billing_address, c.registration_date,
    c.last_collection_at, c.last_payment_at, c.inactivity_alert, c.prospecting_agent_id,
    c.notes, c.created_at, c.updated_at,
    u.email, u.first_name, u.last_name, u.phone
"#;

const CLIENT_ORDERING: [&str; 5] = ["code", "registration_date", "status", "service_city", "created_at"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Client {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub client_type: ClientType,
    pub status: ClientStatus,
    pub company_name: Option<String>,
    pub contact_person: Option<String>,
    pub secondary_phone: Option<String>,
    pub service_address: String,
    pub service_city: String,
    pub service_postal_code: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub zone_id: Option<Uuid>,
    pub billing_address: Option<String>,
    pub registration_date: NaiveDate,
    pub last_collection_at: Option<DateTime<Utc>>,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub inactivity_alert: bool,
    pub prospecting_agent_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // From the linked account
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

/// Login details for the account created alongside a new client
#[derive(Debug, Deserialize, Validate)]
pub struct ClientAccountInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(max = 150))]
    pub first_name: String,
    #[validate(length(max = 150))]
    pub last_name: String,
    pub phone: Option<String>,
}

/// Either link an existing client-type account or create one
#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientInput {
    pub user_id: Option<Uuid>,
    #[validate]
    pub account: Option<ClientAccountInput>,
    pub client_type: ClientType,
    pub status: Option<ClientStatus>,
    #[validate(length(max = 200))]
    pub company_name: Option<String>,
    #[validate(length(max = 100))]
    pub contact_person: Option<String>,
    pub secondary_phone: Option<String>,
    #[validate(length(min = 1))]
    pub service_address: String,
    #[validate(length(min = 1, max = 100))]
    pub service_city: String,
    #[validate(length(max = 20))]
    pub service_postal_code: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub zone_id: Option<Uuid>,
    pub billing_address: Option<String>,
    pub registration_date: Option<NaiveDate>,
    pub prospecting_agent_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClientInput {
    pub client_type: Option<ClientType>,
    pub status: Option<ClientStatus>,
    #[validate(length(max = 200))]
    pub company_name: Option<String>,
    #[validate(length(max = 100))]
    pub contact_person: Option<String>,
    pub secondary_phone: Option<String>,
    #[validate(length(min = 1))]
    pub service_address: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub service_city: Option<String>,
    #[validate(length(max = 20))]
    pub service_postal_code: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub zone_id: Option<Uuid>,
    pub billing_address: Option<String>,
    pub inactivity_alert: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientFilter {
    pub status: Option<ClientStatus>,
    pub client_type: Option<ClientType>,
    pub zone_id: Option<Uuid>,
    pub inactivity_alert: Option<bool>,
}

/// Fields of a client row; codes and dates are filled in on insert
#[derive(Debug, Clone)]
pub(crate) struct NewClient<'a> {
    pub user_id: Uuid,
    pub client_type: ClientType,
    pub status: ClientStatus,
    pub company_name: Option<&'a str>,
    pub service_address: &'a str,
    pub service_city: &'a str,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub zone_id: Option<Uuid>,
    pub prospecting_agent_id: Option<Uuid>,
}

/// Insert a client row on the caller's connection and return its id
pub(crate) async fn insert_client(conn: &mut PgConnection, new: NewClient<'_>) -> AppResult<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO clients (user_id, code, client_type, status, company_name, service_address,
                             service_city, latitude, longitude, zone_id, prospecting_agent_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(new.user_id)
    .bind(generate_code(CodePrefix::Client))
    .bind(new.client_type)
    .bind(new.status)
    .bind(new.company_name)
    .bind(new.service_address)
    .bind(new.service_city)
    .bind(new.latitude)
    .bind(new.longitude)
    .bind(new.zone_id)
    .bind(new.prospecting_agent_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::from_write(e, "user_id"))?;

    Ok(id)
}

#[derive(Debug, Serialize)]
pub struct ClientStatistics {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub new_this_month: i64,
    pub inactivity_alerts: i64,
}

#[derive(Debug, Serialize)]
pub struct ClientHistory {
    pub client: Client,
    pub contracts: Vec<Contract>,
    pub bins: Vec<Bin>,
}

fn check_position(latitude: Option<Decimal>, longitude: Option<Decimal>) -> AppResult<()> {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => {
            validate_coordinates(lat, lon).map_err(|m| AppError::invalid_field("latitude", m))
        }
        (None, None) => Ok(()),
        _ => Err(AppError::validation(
            "latitude",
            "Latitude and longitude must be given together",
            "La latitude et la longitude doivent être fournies ensemble",
        )),
    }
}

/// Client service
#[derive(Clone)]
pub struct ClientService {
    db: PgPool,
}

impl ClientService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Client users only ever see their own record
    pub async fn list_clients(
        &self,
        viewer: &AuthUser,
        list: &ListQuery,
        filter: &ClientFilter,
    ) -> AppResult<PaginatedResponse<Client>> {
        let pagination = list.pagination();
        let order = list.order_by(&CLIENT_ORDERING, "created_at DESC");
        let owner = viewer.is_client().then_some(viewer.user_id);
        let conditions = r#"
            ($1::varchar IS NULL OR c.status = $1)
            AND ($2::varchar IS NULL OR c.client_type = $2)
            AND ($3::uuid IS NULL OR c.zone_id = $3)
            AND ($4::boolean IS NULL OR c.inactivity_alert = $4)
            AND ($5::uuid IS NULL OR c.user_id = $5)
            AND ($6::text IS NULL OR c.code ILIKE $6 OR c.company_name ILIKE $6
                 OR c.service_address ILIKE $6 OR c.service_city ILIKE $6
                 OR u.email ILIKE $6 OR u.first_name ILIKE $6 OR u.last_name ILIKE $6
                 OR u.phone ILIKE $6)
        "#;
        let search = list.search_pattern();

        let clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients c JOIN users u ON u.id = c.user_id \
             WHERE {conditions} ORDER BY c.{order} LIMIT $7 OFFSET $8"
        ))
        .bind(filter.status)
        .bind(filter.client_type)
        .bind(filter.zone_id)
        .bind(filter.inactivity_alert)
        .bind(owner)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM clients c JOIN users u ON u.id = c.user_id WHERE {conditions}"
        ))
        .bind(filter.status)
        .bind(filter.client_type)
        .bind(filter.zone_id)
        .bind(filter.inactivity_alert)
        .bind(owner)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(clients, &pagination, total))
    }

    pub async fn get_client(&self, viewer: &AuthUser, client_id: Uuid) -> AppResult<Client> {
        let client = self.fetch_client(client_id).await?;
        if viewer.is_client() && client.user_id != viewer.user_id {
            return Err(AppError::NotFound("Client".to_string()));
        }
        Ok(client)
    }

    pub(crate) async fn fetch_client(&self, client_id: Uuid) -> AppResult<Client> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients c JOIN users u ON u.id = c.user_id WHERE c.id = $1"
        ))
        .bind(client_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Client".to_string()))
    }

    pub async fn create_client(&self, input: CreateClientInput) -> AppResult<Client> {
        input.validate()?;
        check_position(input.latitude, input.longitude)?;
        if let Some(phone) = input.secondary_phone.as_deref() {
            validate_phone(phone).map_err(|m| AppError::invalid_field("secondary_phone", m))?;
        }

        let mut tx = self.db.begin().await?;

        let user_id = match (input.user_id, &input.account) {
            (Some(user_id), None) => {
                let user_type = sqlx::query_scalar::<_, UserType>(
                    "SELECT user_type FROM users WHERE id = $1",
                )
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound("User".to_string()))?;

                if user_type != UserType::Client {
                    return Err(AppError::validation(
                        "user_id",
                        "The linked account must be a client account",
                        "Le compte lié doit être un compte client",
                    ));
                }
                user_id
            }
            (None, Some(account)) => {
                insert_account(
                    &mut tx,
                    NewAccount {
                        email: &account.email,
                        password: &account.password,
                        first_name: &account.first_name,
                        last_name: &account.last_name,
                        phone: account.phone.as_deref(),
                        user_type: UserType::Client,
                    },
                )
                .await?
                .id
            }
            _ => {
                return Err(AppError::validation(
                    "user_id",
                    "Provide either user_id or account",
                    "Fournir soit user_id soit account",
                ))
            }
        };

        let client_id = insert_client(
            &mut tx,
            NewClient {
                user_id,
                client_type: input.client_type,
                status: input.status.unwrap_or(ClientStatus::Active),
                company_name: input.company_name.as_deref(),
                service_address: &input.service_address,
                service_city: &input.service_city,
                latitude: input.latitude,
                longitude: input.longitude,
                zone_id: input.zone_id,
                prospecting_agent_id: input.prospecting_agent_id,
            },
        )
        .await?;

        sqlx::query(
            r#"
            UPDATE clients
            SET contact_person = $2, secondary_phone = $3, service_postal_code = $4,
                billing_address = $5, notes = $6,
                registration_date = COALESCE($7, registration_date)
            WHERE id = $1
            "#,
        )
        .bind(client_id)
        .bind(&input.contact_person)
        .bind(&input.secondary_phone)
        .bind(&input.service_postal_code)
        .bind(&input.billing_address)
        .bind(&input.notes)
        .bind(input.registration_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(client_id = %client_id, user_id = %user_id, "client created");
        self.fetch_client(client_id).await
    }

    pub async fn update_client(&self, client_id: Uuid, input: UpdateClientInput) -> AppResult<Client> {
        input.validate()?;
        check_position(input.latitude, input.longitude)?;
        if let Some(phone) = input.secondary_phone.as_deref() {
            validate_phone(phone).map_err(|m| AppError::invalid_field("secondary_phone", m))?;
        }

        let result = sqlx::query(
            r#"
            UPDATE clients
            SET client_type = COALESCE($2, client_type),
                status = COALESCE($3, status),
                company_name = COALESCE($4, company_name),
                contact_person = COALESCE($5, contact_person),
                secondary_phone = COALESCE($6, secondary_phone),
                service_address = COALESCE($7, service_address),
                service_city = COALESCE($8, service_city),
                service_postal_code = COALESCE($9, service_postal_code),
                latitude = COALESCE($10, latitude),
                longitude = COALESCE($11, longitude),
                zone_id = COALESCE($12, zone_id),
                billing_address = COALESCE($13, billing_address),
                inactivity_alert = COALESCE($14, inactivity_alert),
                notes = COALESCE($15, notes),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(client_id)
        .bind(input.client_type)
        .bind(input.status)
        .bind(&input.company_name)
        .bind(&input.contact_person)
        .bind(&input.secondary_phone)
        .bind(&input.service_address)
        .bind(&input.service_city)
        .bind(&input.service_postal_code)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(input.zone_id)
        .bind(&input.billing_address)
        .bind(input.inactivity_alert)
        .bind(&input.notes)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::from_write(e, "zone_id"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Client".to_string()));
        }

        self.fetch_client(client_id).await
    }

    pub async fn delete_client(&self, client_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(client_id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::from_delete(e, "client"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Client".to_string()));
        }
        Ok(())
    }

    /// Set a client inactive and raise its inactivity alert
    pub async fn mark_inactive(&self, client_id: Uuid) -> AppResult<Client> {
        let result = sqlx::query(
            "UPDATE clients SET status = $2, inactivity_alert = true, updated_at = NOW() WHERE id = $1",
        )
        .bind(client_id)
        .bind(ClientStatus::Inactive)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Client".to_string()));
        }

        tracing::info!(client_id = %client_id, "client marked inactive");
        self.fetch_client(client_id).await
    }

    /// Active clients without a payment in the inactivity window.
    ///
    /// Clients that never paid are measured from their registration date.
    pub async fn inactive_candidates(&self, today: NaiveDate) -> AppResult<Vec<Client>> {
        let clients = sqlx::query_as::<_, Client>(&format!(
            r#"
            SELECT {CLIENT_COLUMNS}
            FROM clients c JOIN users u ON u.id = c.user_id
            WHERE c.status = $1
              AND COALESCE(c.last_payment_at::date, c.registration_date) < $2
            ORDER BY COALESCE(c.last_payment_at::date, c.registration_date)
            "#
        ))
        .bind(ClientStatus::Active)
        .bind(inactivity_cutoff(today))
        .fetch_all(&self.db)
        .await?;

        Ok(clients)
    }

    pub async fn statistics(&self, today: NaiveDate) -> AppResult<ClientStatistics> {
        let month_start = today.with_day(1).unwrap_or(today);

        let (total, active, inactive, new_this_month, inactivity_alerts) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
                r#"
                SELECT COUNT(*),
                       COUNT(*) FILTER (WHERE status = 'active'),
                       COUNT(*) FILTER (WHERE status = 'inactive'),
                       COUNT(*) FILTER (WHERE registration_date >= $1),
                       COUNT(*) FILTER (WHERE inactivity_alert)
                FROM clients
                "#,
            )
            .bind(month_start)
            .fetch_one(&self.db)
            .await?;

        Ok(ClientStatistics {
            total,
            active,
            inactive,
            new_this_month,
            inactivity_alerts,
        })
    }

    /// A client with all its contracts and bins
    pub async fn history(&self, viewer: &AuthUser, client_id: Uuid) -> AppResult<ClientHistory> {
        let client = self.get_client(viewer, client_id).await?;

        let contracts = sqlx::query_as::<_, Contract>(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE client_id = $1 ORDER BY start_date DESC"
        ))
        .bind(client_id)
        .fetch_all(&self.db)
        .await?;

        let bins = sqlx::query_as::<_, Bin>(&format!(
            "SELECT {BIN_COLUMNS} FROM bins WHERE client_id = $1 ORDER BY installed_on DESC"
        ))
        .bind(client_id)
        .fetch_all(&self.db)
        .await?;

        Ok(ClientHistory {
            client,
            contracts,
            bins,
        })
    }
}
