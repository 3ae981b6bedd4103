//! Field sessions of agents: connection with GPS position, at most one open per agent

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::listing::ListQuery;
use shared::models::{supersede, AgentSession, Capability, EndedSession, UserType};
use shared::types::PaginatedResponse;
use shared::validation::validate_coordinates;

const SESSION_COLUMNS: &str =
    "id, agent_id, latitude, longitude, started_at, ended_at, is_active, device_info";

#[derive(Debug, Deserialize)]
pub struct StartSessionInput {
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub device_info: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session: AgentSession,
    /// Sessions of the same agent closed by this start
    pub closed_sessions: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionFilter {
    pub agent_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

/// An agent currently connected in the field
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ActiveAgent {
    pub session_id: Uuid,
    pub agent_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: UserType,
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub started_at: DateTime<Utc>,
}

/// Agent session service
#[derive(Clone)]
pub struct SessionService {
    db: PgPool,
}

impl SessionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Open a session for the caller, closing any session still open
    pub async fn start_session(
        &self,
        agent: &AuthUser,
        input: StartSessionInput,
    ) -> AppResult<StartSessionResponse> {
        if !agent.user_type.is_field_agent() {
            return Err(AppError::InsufficientPermissions);
        }
        validate_coordinates(input.latitude, input.longitude)
            .map_err(|m| AppError::invalid_field("latitude", m))?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        // Serialises concurrent starts of the same agent
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(agent.user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        let mut open = sqlx::query_as::<_, AgentSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM agent_sessions WHERE agent_id = $1 AND is_active FOR UPDATE"
        ))
        .bind(agent.user_id)
        .fetch_all(&mut *tx)
        .await?;

        let closed_sessions = supersede(&mut open, agent.user_id, now);
        if closed_sessions > 0 {
            let ids: Vec<Uuid> = open.iter().map(|s| s.id).collect();
            sqlx::query(
                "UPDATE agent_sessions SET is_active = false, ended_at = $2 WHERE id = ANY($1)",
            )
            .bind(&ids)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let session = AgentSession::open(
            agent.user_id,
            input.latitude,
            input.longitude,
            input
                .device_info
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            now,
        );

        sqlx::query(
            r#"
            INSERT INTO agent_sessions (id, agent_id, latitude, longitude, started_at, is_active, device_info)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.id)
        .bind(session.agent_id)
        .bind(session.latitude)
        .bind(session.longitude)
        .bind(session.started_at)
        .bind(session.is_active)
        .bind(&session.device_info)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, "agent_id"))?;

        tx.commit().await?;

        tracing::info!(
            agent_id = %agent.user_id,
            session_id = %session.id,
            closed_sessions,
            "agent session started"
        );

        Ok(StartSessionResponse {
            session,
            closed_sessions,
        })
    }

    /// End a session; only its own agent may do so
    pub async fn end_session(&self, agent: &AuthUser, session_id: Uuid) -> AppResult<EndedSession> {
        let mut tx = self.db.begin().await?;

        let mut session = sqlx::query_as::<_, AgentSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM agent_sessions WHERE id = $1 FOR UPDATE"
        ))
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Session".to_string()))?;

        if !session.is_owned_by(agent.user_id) {
            return Err(AppError::Conflict {
                resource: "session".to_string(),
                message: "Only the agent who opened this session can end it".to_string(),
                message_fr: "Seul l'agent ayant ouvert cette session peut la terminer".to_string(),
            });
        }

        let now = Utc::now();
        session.close(now)?;

        sqlx::query("UPDATE agent_sessions SET is_active = false, ended_at = $2 WHERE id = $1")
            .bind(session.id)
            .bind(session.ended_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            agent_id = %agent.user_id,
            session_id = %session.id,
            "agent session ended"
        );

        Ok(session.into_ended(now))
    }

    /// Supervisors and admins see every session, agents their own
    pub async fn list_sessions(
        &self,
        viewer: &AuthUser,
        list: &ListQuery,
        filter: &SessionFilter,
    ) -> AppResult<PaginatedResponse<AgentSession>> {
        let pagination = list.pagination();
        let order = list.order_by(&["started_at", "ended_at"], "started_at DESC");
        let agent_id = if viewer.can(Capability::ViewActiveAgents) {
            filter.agent_id
        } else {
            Some(viewer.user_id)
        };
        let conditions = "($1::uuid IS NULL OR agent_id = $1) AND ($2::boolean IS NULL OR is_active = $2)";

        let sessions = sqlx::query_as::<_, AgentSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM agent_sessions WHERE {conditions} \
             ORDER BY {order} LIMIT $3 OFFSET $4"
        ))
        .bind(agent_id)
        .bind(filter.is_active)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM agent_sessions WHERE {conditions}"
        ))
        .bind(agent_id)
        .bind(filter.is_active)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(sessions, &pagination, total))
    }

    pub async fn get_session(&self, viewer: &AuthUser, session_id: Uuid) -> AppResult<AgentSession> {
        let session = sqlx::query_as::<_, AgentSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM agent_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.db)
        .await?
        .filter(|s| viewer.can(Capability::ViewActiveAgents) || s.is_owned_by(viewer.user_id))
        .ok_or_else(|| AppError::NotFound("Session".to_string()))?;

        Ok(session)
    }

    /// Agents with an open session, most recent first
    pub async fn active_agents(&self) -> AppResult<Vec<ActiveAgent>> {
        let agents = sqlx::query_as::<_, ActiveAgent>(
            r#"
            SELECT s.id AS session_id, u.id AS agent_id, u.email, u.first_name, u.last_name,
                   u.user_type, s.latitude, s.longitude, s.started_at
            FROM agent_sessions s
            JOIN users u ON u.id = s.agent_id
            WHERE s.is_active
            ORDER BY s.started_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(agents)
    }
}
