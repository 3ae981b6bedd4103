//! Field workforce: agent records and zone assignments

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::listing::ListQuery;
use shared::codes::{generate_code, CodePrefix};
use shared::models::{average_completion_rate, AgentPosition, AgentStatus, Capability, UserType};
use shared::types::PaginatedResponse;
use shared::validation::validate_phone;

pub(crate) const AGENT_COLUMNS: &str = r#"
    a.id, a.user_id, a.matricule, a.position, a.status, a.hire_date, a.base_salary,
    a.licence_number, a.licence_type, a.licence_expiry, a.certifications, a.primary_zone_id,
    a.emergency_contact_name, a.emergency_contact_phone, a.evaluation_score, a.evaluated_on,
    a.created_at, a.updated_at,
    u.email, u.first_name, u.last_name, u.phone
"#;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Agent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub matricule: String,
    pub position: AgentPosition,
    pub status: AgentStatus,
    pub hire_date: NaiveDate,
    pub base_salary: Option<Decimal>,
    pub licence_number: Option<String>,
    pub licence_type: Option<String>,
    pub licence_expiry: Option<NaiveDate>,
    pub certifications: serde_json::Value,
    pub primary_zone_id: Option<Uuid>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub evaluation_score: Option<Decimal>,
    pub evaluated_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // From the linked account
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAgentInput {
    pub user_id: Uuid,
    pub position: AgentPosition,
    pub status: Option<AgentStatus>,
    pub hire_date: NaiveDate,
    pub base_salary: Option<Decimal>,
    #[validate(length(max = 50))]
    pub licence_number: Option<String>,
    #[validate(length(max = 10))]
    pub licence_type: Option<String>,
    pub licence_expiry: Option<NaiveDate>,
    #[serde(default)]
    pub certifications: Vec<String>,
    pub primary_zone_id: Option<Uuid>,
    #[validate(length(max = 100))]
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAgentInput {
    pub position: Option<AgentPosition>,
    pub status: Option<AgentStatus>,
    pub base_salary: Option<Decimal>,
    #[validate(length(max = 50))]
    pub licence_number: Option<String>,
    #[validate(length(max = 10))]
    pub licence_type: Option<String>,
    pub licence_expiry: Option<NaiveDate>,
    pub certifications: Option<Vec<String>>,
    #[validate(length(max = 100))]
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub evaluation_score: Option<Decimal>,
    pub evaluated_on: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentFilter {
    pub position: Option<AgentPosition>,
    pub status: Option<AgentStatus>,
    pub zone_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AssignZoneInput {
    pub zone_id: Uuid,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Serialize)]
pub struct AgentZones {
    pub agent_id: Uuid,
    pub primary_zone_id: Option<Uuid>,
    pub zone_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PositionCount {
    pub position: AgentPosition,
    pub total: i64,
    pub active: i64,
}

/// Field record of an agent over the rounds of the teams they belong to or lead
#[derive(Debug, Serialize)]
pub struct AgentPerformance {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub completed_rounds: i64,
    pub completion_rate: Decimal,
    pub evaluation_score: Option<Decimal>,
    /// Failed stops in those rounds
    pub incidents: i64,
}

fn check_evaluation(score: Option<Decimal>) -> AppResult<()> {
    match score {
        Some(s) if s < Decimal::ZERO || s > Decimal::TEN => Err(AppError::validation(
            "evaluation_score",
            "Evaluation score must be between 0 and 10",
            "La note d'évaluation doit être comprise entre 0 et 10",
        )),
        _ => Ok(()),
    }
}

/// Agent service
#[derive(Clone)]
pub struct AgentService {
    db: PgPool,
}

impl AgentService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Admins and supervisors see every agent; agents only themselves
    pub async fn list_agents(
        &self,
        viewer: &AuthUser,
        list: &ListQuery,
        filter: &AgentFilter,
    ) -> AppResult<PaginatedResponse<Agent>> {
        let pagination = list.pagination();
        let order = list.order_by(&["matricule", "hire_date", "position", "status"], "matricule ASC");
        let owner = (!viewer.can(Capability::ViewActiveAgents)).then_some(viewer.user_id);
        let conditions = r#"
            ($1::varchar IS NULL OR a.position = $1)
            AND ($2::varchar IS NULL OR a.status = $2)
            AND ($3::uuid IS NULL OR a.primary_zone_id = $3
                 OR EXISTS (SELECT 1 FROM agent_zones az WHERE az.agent_id = a.id AND az.zone_id = $3))
            AND ($4::uuid IS NULL OR a.user_id = $4)
            AND ($5::text IS NULL OR a.matricule ILIKE $5 OR u.first_name ILIKE $5
                 OR u.last_name ILIKE $5 OR u.email ILIKE $5)
        "#;
        let search = list.search_pattern();

        let agents = sqlx::query_as::<_, Agent>(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents a JOIN users u ON u.id = a.user_id \
             WHERE {conditions} ORDER BY a.{order} LIMIT $6 OFFSET $7"
        ))
        .bind(filter.position)
        .bind(filter.status)
        .bind(filter.zone_id)
        .bind(owner)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM agents a JOIN users u ON u.id = a.user_id WHERE {conditions}"
        ))
        .bind(filter.position)
        .bind(filter.status)
        .bind(filter.zone_id)
        .bind(owner)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(agents, &pagination, total))
    }

    pub async fn get_agent(&self, viewer: &AuthUser, agent_id: Uuid) -> AppResult<Agent> {
        let agent = self.fetch_agent(agent_id).await?;
        if !viewer.can(Capability::ViewActiveAgents) && agent.user_id != viewer.user_id {
            return Err(AppError::NotFound("Agent".to_string()));
        }
        Ok(agent)
    }

    pub(crate) async fn fetch_agent(&self, agent_id: Uuid) -> AppResult<Agent> {
        sqlx::query_as::<_, Agent>(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents a JOIN users u ON u.id = a.user_id WHERE a.id = $1"
        ))
        .bind(agent_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Agent".to_string()))
    }

    pub async fn create_agent(&self, input: CreateAgentInput) -> AppResult<Agent> {
        input.validate()?;
        if let Some(phone) = input.emergency_contact_phone.as_deref() {
            validate_phone(phone).map_err(|m| AppError::invalid_field("emergency_contact_phone", m))?;
        }

        let user_type = sqlx::query_scalar::<_, UserType>("SELECT user_type FROM users WHERE id = $1")
            .bind(input.user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        if !user_type.is_field_agent() {
            return Err(AppError::validation(
                "user_id",
                "Agent records can only be attached to field-agent accounts",
                "Une fiche agent ne peut être liée qu'à un compte d'agent de terrain",
            ));
        }

        let agent_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO agents (user_id, matricule, position, status, hire_date, base_salary,
                                licence_number, licence_type, licence_expiry, certifications,
                                primary_zone_id, emergency_contact_name, emergency_contact_phone)
            VALUES ($1, $2, $3, COALESCE($4, 'active'), $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(input.user_id)
        .bind(generate_code(CodePrefix::Agent))
        .bind(input.position)
        .bind(input.status)
        .bind(input.hire_date)
        .bind(input.base_salary)
        .bind(&input.licence_number)
        .bind(&input.licence_type)
        .bind(input.licence_expiry)
        .bind(serde_json::json!(input.certifications))
        .bind(input.primary_zone_id)
        .bind(&input.emergency_contact_name)
        .bind(&input.emergency_contact_phone)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_write(e, "user_id"))?;

        if let Some(zone_id) = input.primary_zone_id {
            sqlx::query("INSERT INTO agent_zones (agent_id, zone_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(agent_id)
                .bind(zone_id)
                .execute(&self.db)
                .await?;
        }

        tracing::info!(agent_id = %agent_id, "agent created");
        self.fetch_agent(agent_id).await
    }

    pub async fn update_agent(&self, agent_id: Uuid, input: UpdateAgentInput) -> AppResult<Agent> {
        input.validate()?;
        check_evaluation(input.evaluation_score)?;
        if let Some(phone) = input.emergency_contact_phone.as_deref() {
            validate_phone(phone).map_err(|m| AppError::invalid_field("emergency_contact_phone", m))?;
        }

        let result = sqlx::query(
            r#"
            UPDATE agents
            SET position = COALESCE($2, position),
                status = COALESCE($3, status),
                base_salary = COALESCE($4, base_salary),
                licence_number = COALESCE($5, licence_number),
                licence_type = COALESCE($6, licence_type),
                licence_expiry = COALESCE($7, licence_expiry),
                certifications = COALESCE($8, certifications),
                emergency_contact_name = COALESCE($9, emergency_contact_name),
                emergency_contact_phone = COALESCE($10, emergency_contact_phone),
                evaluation_score = COALESCE($11, evaluation_score),
                evaluated_on = COALESCE($12, evaluated_on),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(agent_id)
        .bind(input.position)
        .bind(input.status)
        .bind(input.base_salary)
        .bind(&input.licence_number)
        .bind(&input.licence_type)
        .bind(input.licence_expiry)
        .bind(input.certifications.as_ref().map(|c| serde_json::json!(c)))
        .bind(&input.emergency_contact_name)
        .bind(&input.emergency_contact_phone)
        .bind(input.evaluation_score)
        .bind(input.evaluated_on)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Agent".to_string()));
        }
        self.fetch_agent(agent_id).await
    }

    pub async fn delete_agent(&self, agent_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(agent_id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::from_delete(e, "agent"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Agent".to_string()));
        }
        Ok(())
    }

    /// Agents whose status allows scheduling
    pub async fn available_agents(&self) -> AppResult<Vec<Agent>> {
        let agents = sqlx::query_as::<_, Agent>(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents a JOIN users u ON u.id = a.user_id \
             WHERE a.status = $1 ORDER BY a.position, a.matricule"
        ))
        .bind(AgentStatus::Active)
        .fetch_all(&self.db)
        .await?;

        Ok(agents)
    }

    /// Head-count per position
    pub async fn statistics(&self) -> AppResult<Vec<PositionCount>> {
        let counts = sqlx::query_as::<_, PositionCount>(
            r#"
            SELECT position, COUNT(*) AS total, COUNT(*) FILTER (WHERE status = 'active') AS active
            FROM agents
            GROUP BY position
            ORDER BY position
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(counts)
    }

    /// Add a zone to an agent's assignments, optionally as primary zone
    pub async fn assign_zone(&self, agent_id: Uuid, input: AssignZoneInput) -> AppResult<AgentZones> {
        let mut tx = self.db.begin().await?;

        sqlx::query("SELECT id FROM agents WHERE id = $1 FOR UPDATE")
            .bind(agent_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Agent".to_string()))?;

        let zone_exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM zones WHERE id = $1)")
            .bind(input.zone_id)
            .fetch_one(&mut *tx)
            .await?;
        if !zone_exists {
            return Err(AppError::NotFound("Zone".to_string()));
        }

        sqlx::query("INSERT INTO agent_zones (agent_id, zone_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(agent_id)
            .bind(input.zone_id)
            .execute(&mut *tx)
            .await?;

        if input.primary {
            sqlx::query("UPDATE agents SET primary_zone_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(agent_id)
                .bind(input.zone_id)
                .execute(&mut *tx)
                .await?;
        }

        let primary_zone_id = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT primary_zone_id FROM agents WHERE id = $1",
        )
        .bind(agent_id)
        .fetch_one(&mut *tx)
        .await?;

        let zone_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT zone_id FROM agent_zones WHERE agent_id = $1 ORDER BY zone_id",
        )
        .bind(agent_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(agent_id = %agent_id, zone_id = %input.zone_id, primary = input.primary, "zone assigned");

        Ok(AgentZones {
            agent_id,
            primary_zone_id,
            zone_ids,
        })
    }

    pub async fn performance(&self, viewer: &AuthUser, agent_id: Uuid) -> AppResult<AgentPerformance> {
        let agent = self.get_agent(viewer, agent_id).await?;
        let team_rounds = r#"
            team_id IN (
                SELECT team_id FROM team_members WHERE agent_id = $1
                UNION
                SELECT id FROM teams WHERE team_lead_id = $1
            )
        "#;

        let rates: Vec<Decimal> = sqlx::query_scalar(&format!(
            "SELECT COALESCE(completion_rate, 0) FROM collection_rounds \
             WHERE status = 'completed' AND {team_rounds}"
        ))
        .bind(agent_id)
        .fetch_all(&self.db)
        .await?;

        let incidents: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM collection_stops WHERE status = 'failed' AND round_id IN \
             (SELECT id FROM collection_rounds WHERE {team_rounds})"
        ))
        .bind(agent_id)
        .fetch_one(&self.db)
        .await?;

        Ok(AgentPerformance {
            agent_id,
            agent_name: format!("{} {}", agent.first_name, agent.last_name).trim().to_string(),
            completed_rounds: rates.len() as i64,
            completion_rate: average_completion_rate(&rates),
            evaluation_score: agent.evaluation_score,
            incidents,
        })
    }
}
