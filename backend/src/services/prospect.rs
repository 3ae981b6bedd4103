//! Prospect requests: public service requests, assignment to prospecting
//! agents and conversion into clients

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::account::{insert_account, NewAccount};
use crate::services::client::{insert_client, NewClient};
use crate::services::contract::{insert_contract, Contract, NewContract};
use crate::services::listing::ListQuery;
use shared::models::{
    default_contract_end, split_full_name, Capability, ClientStatus, ClientType,
    CollectionFrequency, ProspectAction, ProspectStatus, ServiceType, UserType,
};
use shared::types::PaginatedResponse;
use shared::validation::{validate_coordinates, validate_phone};

const REQUEST_COLUMNS: &str = "id, full_name, email, phone, company_name, address, city, latitude, \
     longitude, service_type, desired_frequency, message, status, assigned_agent_id, client_id, \
     requested_at, assigned_at, visited_at, processed_at, agent_notes, rejection_reason";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProspectRequest {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub company_name: Option<String>,
    pub address: String,
    pub city: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub service_type: ServiceType,
    pub desired_frequency: Option<CollectionFrequency>,
    pub message: Option<String>,
    pub status: ProspectStatus,
    pub assigned_agent_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub requested_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub visited_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub agent_notes: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProspectInput {
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    pub phone: String,
    #[validate(length(max = 200))]
    pub company_name: Option<String>,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub service_type: ServiceType,
    pub desired_frequency: Option<CollectionFrequency>,
    #[validate(length(max = 2000))]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignProspectInput {
    pub agent_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VisitProspectInput {
    pub agent_notes: Option<String>,
}

/// Terms agreed with the prospect during the visit
#[derive(Debug, Deserialize, Validate)]
pub struct ConvertProspectInput {
    pub client_type: ClientType,
    pub zone_id: Option<Uuid>,
    pub frequency: CollectionFrequency,
    pub monthly_rate: Decimal,
    #[serde(default)]
    pub collection_days: Vec<String>,
    pub pass_time: Option<NaiveTime>,
    #[serde(default)]
    pub waste_types: Vec<String>,
    pub agent_notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectProspectInput {
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProspectFilter {
    pub status: Option<ProspectStatus>,
    pub service_type: Option<ServiceType>,
    pub assigned_agent_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConversionResult {
    pub request: ProspectRequest,
    pub user_id: Uuid,
    pub client_id: Uuid,
    pub contract: Contract,
    /// Initial password of the new client account, shown once
    pub temporary_password: String,
}

fn temporary_password() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("Wc-{}", &raw[..12])
}

/// Prospect request service
#[derive(Clone)]
pub struct ProspectService {
    db: PgPool,
}

impl ProspectService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Public service request. The email must not already have an account.
    pub async fn create_request(&self, input: CreateProspectInput) -> AppResult<ProspectRequest> {
        input.validate()?;
        validate_phone(&input.phone).map_err(|m| AppError::invalid_field("phone", m))?;
        if let (Some(lat), Some(lon)) = (input.latitude, input.longitude) {
            validate_coordinates(lat, lon).map_err(|m| AppError::invalid_field("latitude", m))?;
        }
        self.ensure_email_free(&input.email).await?;

        let request = sqlx::query_as::<_, ProspectRequest>(&format!(
            r#"
            INSERT INTO prospect_requests (full_name, email, phone, company_name, address, city,
                                           latitude, longitude, service_type, desired_frequency, message)
            VALUES ($1, LOWER($2), $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(input.full_name.trim())
        .bind(input.email.trim())
        .bind(&input.phone)
        .bind(&input.company_name)
        .bind(&input.address)
        .bind(&input.city)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(input.service_type)
        .bind(input.desired_frequency)
        .bind(&input.message)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(request_id = %request.id, "prospect request received");
        Ok(request)
    }

    /// Prospecting agents only see the requests assigned to them
    pub async fn list_requests(
        &self,
        viewer: &AuthUser,
        list: &ListQuery,
        filter: &ProspectFilter,
    ) -> AppResult<PaginatedResponse<ProspectRequest>> {
        let pagination = list.pagination();
        let order = list.order_by(&["requested_at", "status", "city", "full_name"], "requested_at DESC");
        let agent_id = if viewer.user_type == UserType::ProspectingAgent {
            Some(viewer.user_id)
        } else {
            filter.assigned_agent_id
        };
        let conditions = r#"
            ($1::varchar IS NULL OR status = $1)
            AND ($2::varchar IS NULL OR service_type = $2)
            AND ($3::uuid IS NULL OR assigned_agent_id = $3)
            AND ($4::text IS NULL OR full_name ILIKE $4 OR email ILIKE $4 OR phone ILIKE $4
                 OR company_name ILIKE $4 OR city ILIKE $4)
        "#;
        let search = list.search_pattern();

        let requests = sqlx::query_as::<_, ProspectRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM prospect_requests WHERE {conditions} \
             ORDER BY {order} LIMIT $5 OFFSET $6"
        ))
        .bind(filter.status)
        .bind(filter.service_type)
        .bind(agent_id)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM prospect_requests WHERE {conditions}"
        ))
        .bind(filter.status)
        .bind(filter.service_type)
        .bind(agent_id)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(requests, &pagination, total))
    }

    pub async fn get_request(&self, viewer: &AuthUser, request_id: Uuid) -> AppResult<ProspectRequest> {
        let request = self.fetch(request_id).await?;
        if viewer.user_type == UserType::ProspectingAgent
            && request.assigned_agent_id != Some(viewer.user_id)
        {
            return Err(AppError::NotFound("Prospect request".to_string()));
        }
        Ok(request)
    }

    /// Hand a request to a prospecting agent
    pub async fn assign(&self, request_id: Uuid, input: AssignProspectInput) -> AppResult<ProspectRequest> {
        let mut tx = self.db.begin().await?;

        let agent_type = sqlx::query_scalar::<_, UserType>(
            "SELECT user_type FROM users WHERE id = $1 AND is_active",
        )
        .bind(input.agent_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Agent".to_string()))?;

        if !agent_type.can(Capability::ConvertProspects) {
            return Err(AppError::validation(
                "agent_id",
                "Requests can only be assigned to prospecting agents",
                "Les demandes ne peuvent être assignées qu'à des agents de prospection",
            ));
        }

        let current = Self::lock(&mut tx, request_id).await?;
        let next = current.status.apply(ProspectAction::Assign)?;

        let request = sqlx::query_as::<_, ProspectRequest>(&format!(
            r#"
            UPDATE prospect_requests
            SET status = $2, assigned_agent_id = $3, assigned_at = NOW()
            WHERE id = $1
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request_id)
        .bind(next)
        .bind(input.agent_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(request_id = %request_id, agent_id = %input.agent_id, "prospect request assigned");
        Ok(request)
    }

    /// The assigned agent records the on-site visit
    pub async fn start_visit(
        &self,
        agent: &AuthUser,
        request_id: Uuid,
        input: VisitProspectInput,
    ) -> AppResult<ProspectRequest> {
        input.validate()?;
        let mut tx = self.db.begin().await?;

        let current = Self::lock(&mut tx, request_id).await?;
        Self::ensure_assignee(&current, agent)?;
        let next = current.status.apply(ProspectAction::StartVisit)?;

        let request = sqlx::query_as::<_, ProspectRequest>(&format!(
            r#"
            UPDATE prospect_requests
            SET status = $2, visited_at = NOW(), agent_notes = COALESCE($3, agent_notes)
            WHERE id = $1
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request_id)
        .bind(next)
        .bind(&input.agent_notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(request)
    }

    /// Turn a request into a client account, client record and one-year
    /// contract, all in one transaction.
    pub async fn convert(
        &self,
        agent: &AuthUser,
        request_id: Uuid,
        input: ConvertProspectInput,
        currency: &str,
    ) -> AppResult<ConversionResult> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        let current = Self::lock(&mut tx, request_id).await?;
        Self::ensure_assignee(&current, agent)?;
        let next = current.status.apply(ProspectAction::Convert)?;

        let (first_name, last_name) = split_full_name(&current.full_name);
        let password = temporary_password();

        let user = insert_account(
            &mut tx,
            NewAccount {
                email: &current.email,
                password: &password,
                first_name: &first_name,
                last_name: &last_name,
                phone: Some(&current.phone),
                user_type: UserType::Client,
            },
        )
        .await?;

        let client_id = insert_client(
            &mut tx,
            NewClient {
                user_id: user.id,
                client_type: input.client_type,
                status: ClientStatus::Active,
                company_name: current.company_name.as_deref(),
                service_address: &current.address,
                service_city: &current.city,
                latitude: current.latitude,
                longitude: current.longitude,
                zone_id: input.zone_id,
                prospecting_agent_id: Some(agent.user_id),
            },
        )
        .await?;

        let today = Utc::now().date_naive();
        let contract = insert_contract(
            &mut tx,
            NewContract {
                client_id,
                start_date: today,
                end_date: default_contract_end(today),
                frequency: input.frequency,
                collection_days: &input.collection_days,
                pass_time: input.pass_time,
                monthly_rate: input.monthly_rate,
                currency,
                waste_types: &input.waste_types,
                special_conditions: None,
            },
        )
        .await?;

        let request = sqlx::query_as::<_, ProspectRequest>(&format!(
            r#"
            UPDATE prospect_requests
            SET status = $2, client_id = $3, processed_at = NOW(),
                agent_notes = COALESCE($4, agent_notes)
            WHERE id = $1
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request_id)
        .bind(next)
        .bind(client_id)
        .bind(&input.agent_notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            request_id = %request_id,
            client_id = %client_id,
            agent_id = %agent.user_id,
            "prospect converted into client"
        );

        Ok(ConversionResult {
            request,
            user_id: user.id,
            client_id,
            contract,
            temporary_password: password,
        })
    }

    pub async fn reject(&self, request_id: Uuid, input: RejectProspectInput) -> AppResult<ProspectRequest> {
        input.validate()?;
        let mut tx = self.db.begin().await?;

        let current = Self::lock(&mut tx, request_id).await?;
        let next = current.status.apply(ProspectAction::Reject)?;

        let request = sqlx::query_as::<_, ProspectRequest>(&format!(
            r#"
            UPDATE prospect_requests
            SET status = $2, rejection_reason = $3, processed_at = NOW()
            WHERE id = $1
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request_id)
        .bind(next)
        .bind(input.reason.trim())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(request)
    }

    async fn fetch(&self, request_id: Uuid) -> AppResult<ProspectRequest> {
        sqlx::query_as::<_, ProspectRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM prospect_requests WHERE id = $1"
        ))
        .bind(request_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Prospect request".to_string()))
    }

    async fn lock(conn: &mut PgConnection, request_id: Uuid) -> AppResult<ProspectRequest> {
        sqlx::query_as::<_, ProspectRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM prospect_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Prospect request".to_string()))
    }

    fn ensure_assignee(request: &ProspectRequest, agent: &AuthUser) -> AppResult<()> {
        if request.assigned_agent_id != Some(agent.user_id) {
            return Err(AppError::Conflict {
                resource: "prospect_request".to_string(),
                message: "This request is assigned to another agent".to_string(),
                message_fr: "Cette demande est assignée à un autre agent".to_string(),
            });
        }
        Ok(())
    }

    async fn ensure_email_free(&self, email: &str) -> AppResult<()> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))",
        )
        .bind(email.trim())
        .fetch_one(&self.db)
        .await?;

        if taken {
            return Err(AppError::validation(
                "email",
                "An account already exists for this email",
                "Un compte existe déjà pour cet email",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::validation::validate_password;

    #[test]
    fn test_temporary_password_is_acceptable() {
        let password = temporary_password();
        assert!(validate_password(&password).is_ok());
        assert_ne!(password, temporary_password());
    }
}
