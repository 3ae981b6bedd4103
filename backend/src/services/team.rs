//! Collection teams: lead, members, vehicle and zones

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::listing::ListQuery;
use crate::services::round::{Round, ROUND_COLUMNS};
use shared::models::{
    check_team_lead, check_team_member, check_team_vehicle, shift_hours, weekly_hours,
    AgentPosition, AgentStatus, VehicleStatus,
};
use shared::types::PaginatedResponse;
use shared::validation::validate_time_window;

const TEAM_COLUMNS: &str = "id, name, team_lead_id, vehicle_id, working_days, start_hour, end_hour, \
     is_active, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub team_lead_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub working_days: serde_json::Value,
    pub start_hour: NaiveTime,
    pub end_hour: NaiveTime,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    pub member_ids: Vec<Uuid>,
    pub zone_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTeamInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub team_lead_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    #[serde(default)]
    pub working_days: Vec<String>,
    pub start_hour: NaiveTime,
    pub end_hour: NaiveTime,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
    #[serde(default)]
    pub zone_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTeamInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub team_lead_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub working_days: Option<Vec<String>>,
    pub start_hour: Option<NaiveTime>,
    pub end_hour: Option<NaiveTime>,
    pub is_active: Option<bool>,
    pub zone_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeamFilter {
    pub is_active: Option<bool>,
    pub zone_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct TeamMemberInput {
    pub agent_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TeamStatistics {
    pub total_teams: i64,
    pub active_teams: i64,
    pub available_agents: i64,
    pub operational_vehicles: i64,
}

/// Working schedule of a team and the rounds it still has to run
#[derive(Debug, Serialize)]
pub struct TeamPlanning {
    pub team: TeamDetail,
    pub working_days: Vec<String>,
    pub start_hour: NaiveTime,
    pub end_hour: NaiveTime,
    pub daily_hours: Decimal,
    pub weekly_hours: Decimal,
    pub upcoming_rounds: Vec<Round>,
}

impl TeamPlanning {
    fn new(team: TeamDetail, upcoming_rounds: Vec<Round>) -> Self {
        let working_days: Vec<String> = team
            .team
            .working_days
            .as_array()
            .map(|days| days.iter().filter_map(|d| d.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let (start_hour, end_hour) = (team.team.start_hour, team.team.end_hour);

        Self {
            daily_hours: shift_hours(start_hour, end_hour),
            weekly_hours: weekly_hours(start_hour, end_hour, working_days.len()),
            working_days,
            start_hour,
            end_hour,
            team,
            upcoming_rounds,
        }
    }
}

/// Team service
#[derive(Clone)]
pub struct TeamService {
    db: PgPool,
}

impl TeamService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_teams(
        &self,
        list: &ListQuery,
        filter: &TeamFilter,
    ) -> AppResult<PaginatedResponse<Team>> {
        let pagination = list.pagination();
        let order = list.order_by(&["name", "created_at"], "name ASC");
        let conditions = r#"
            ($1::boolean IS NULL OR is_active = $1)
            AND ($2::uuid IS NULL OR EXISTS (SELECT 1 FROM team_zones tz WHERE tz.team_id = teams.id AND tz.zone_id = $2))
            AND ($3::text IS NULL OR name ILIKE $3)
        "#;
        let search = list.search_pattern();

        let teams = sqlx::query_as::<_, Team>(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams WHERE {conditions} ORDER BY {order} LIMIT $4 OFFSET $5"
        ))
        .bind(filter.is_active)
        .bind(filter.zone_id)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM teams WHERE {conditions}"
        ))
        .bind(filter.is_active)
        .bind(filter.zone_id)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(teams, &pagination, total))
    }

    pub async fn get_team(&self, team_id: Uuid) -> AppResult<TeamDetail> {
        let mut conn = self.db.acquire().await?;
        Self::detail(&mut conn, team_id).await
    }

    pub async fn create_team(&self, input: CreateTeamInput) -> AppResult<TeamDetail> {
        input.validate()?;
        validate_time_window(input.start_hour, input.end_hour)
            .map_err(|m| AppError::invalid_field("end_hour", m))?;

        let mut tx = self.db.begin().await?;

        Self::check_lead(&mut tx, input.team_lead_id).await?;
        if let Some(vehicle_id) = input.vehicle_id {
            Self::check_vehicle(&mut tx, vehicle_id).await?;
        }

        let team_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO teams (name, team_lead_id, vehicle_id, working_days, start_hour, end_hour)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&input.name)
        .bind(input.team_lead_id)
        .bind(input.vehicle_id)
        .bind(serde_json::json!(input.working_days))
        .bind(input.start_hour)
        .bind(input.end_hour)
        .fetch_one(&mut *tx)
        .await?;

        for agent_id in &input.member_ids {
            Self::check_member(&mut tx, *agent_id).await?;
            sqlx::query("INSERT INTO team_members (team_id, agent_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(team_id)
                .bind(agent_id)
                .execute(&mut *tx)
                .await?;
        }
        Self::replace_zones(&mut tx, team_id, &input.zone_ids).await?;

        let detail = Self::detail(&mut tx, team_id).await?;
        tx.commit().await?;

        tracing::info!(team_id = %team_id, members = detail.member_ids.len(), "team created");
        Ok(detail)
    }

    /// Lead and vehicle rules are re-checked whenever either changes
    pub async fn update_team(&self, team_id: Uuid, input: UpdateTeamInput) -> AppResult<TeamDetail> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, Team>(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams WHERE id = $1 FOR UPDATE"
        ))
        .bind(team_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Team".to_string()))?;

        validate_time_window(
            input.start_hour.unwrap_or(current.start_hour),
            input.end_hour.unwrap_or(current.end_hour),
        )
        .map_err(|m| AppError::invalid_field("end_hour", m))?;

        if let Some(lead_id) = input.team_lead_id {
            Self::check_lead(&mut tx, lead_id).await?;
        }
        if let Some(vehicle_id) = input.vehicle_id {
            Self::check_vehicle(&mut tx, vehicle_id).await?;
        }

        sqlx::query(
            r#"
            UPDATE teams
            SET name = COALESCE($2, name),
                team_lead_id = COALESCE($3, team_lead_id),
                vehicle_id = COALESCE($4, vehicle_id),
                working_days = COALESCE($5, working_days),
                start_hour = COALESCE($6, start_hour),
                end_hour = COALESCE($7, end_hour),
                is_active = COALESCE($8, is_active),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(team_id)
        .bind(&input.name)
        .bind(input.team_lead_id)
        .bind(input.vehicle_id)
        .bind(input.working_days.as_ref().map(|d| serde_json::json!(d)))
        .bind(input.start_hour)
        .bind(input.end_hour)
        .bind(input.is_active)
        .execute(&mut *tx)
        .await?;

        if let Some(zone_ids) = input.zone_ids.as_deref() {
            Self::replace_zones(&mut tx, team_id, zone_ids).await?;
        }

        let detail = Self::detail(&mut tx, team_id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    pub async fn delete_team(&self, team_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(team_id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::from_delete(e, "team"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Team".to_string()));
        }
        Ok(())
    }

    /// Only active agents can join
    pub async fn add_member(&self, team_id: Uuid, input: TeamMemberInput) -> AppResult<TeamDetail> {
        let mut tx = self.db.begin().await?;

        Self::lock_team(&mut tx, team_id).await?;
        Self::check_member(&mut tx, input.agent_id).await?;

        sqlx::query("INSERT INTO team_members (team_id, agent_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(team_id)
            .bind(input.agent_id)
            .execute(&mut *tx)
            .await?;

        let detail = Self::detail(&mut tx, team_id).await?;
        tx.commit().await?;

        tracing::debug!(team_id = %team_id, agent_id = %input.agent_id, "team member added");
        Ok(detail)
    }

    pub async fn remove_member(&self, team_id: Uuid, agent_id: Uuid) -> AppResult<TeamDetail> {
        let mut tx = self.db.begin().await?;

        Self::lock_team(&mut tx, team_id).await?;

        let result = sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND agent_id = $2")
            .bind(team_id)
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Team member".to_string()));
        }

        let detail = Self::detail(&mut tx, team_id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    pub async fn statistics(&self) -> AppResult<TeamStatistics> {
        let (total_teams, active_teams, available_agents, operational_vehicles) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM teams),
                    (SELECT COUNT(*) FROM teams WHERE is_active),
                    (SELECT COUNT(*) FROM agents WHERE status = $1),
                    (SELECT COUNT(*) FROM vehicles WHERE status = $2)
                "#,
            )
            .bind(AgentStatus::Active)
            .bind(VehicleStatus::Operational)
            .fetch_one(&self.db)
            .await?;

        Ok(TeamStatistics {
            total_teams,
            active_teams,
            available_agents,
            operational_vehicles,
        })
    }

    async fn lock_team(conn: &mut PgConnection, team_id: Uuid) -> AppResult<()> {
        sqlx::query("SELECT id FROM teams WHERE id = $1 FOR UPDATE")
            .bind(team_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Team".to_string()))?;
        Ok(())
    }

    async fn check_lead(conn: &mut PgConnection, agent_id: Uuid) -> AppResult<()> {
        let position = sqlx::query_scalar::<_, AgentPosition>("SELECT position FROM agents WHERE id = $1")
            .bind(agent_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Agent".to_string()))?;
        check_team_lead(position)?;
        Ok(())
    }

    async fn check_vehicle(conn: &mut PgConnection, vehicle_id: Uuid) -> AppResult<()> {
        let status = sqlx::query_scalar::<_, VehicleStatus>("SELECT status FROM vehicles WHERE id = $1")
            .bind(vehicle_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))?;
        check_team_vehicle(status)?;
        Ok(())
    }

    async fn check_member(conn: &mut PgConnection, agent_id: Uuid) -> AppResult<()> {
        let status = sqlx::query_scalar::<_, AgentStatus>("SELECT status FROM agents WHERE id = $1")
            .bind(agent_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Agent".to_string()))?;
        check_team_member(status)?;
        Ok(())
    }

    async fn replace_zones(conn: &mut PgConnection, team_id: Uuid, zone_ids: &[Uuid]) -> AppResult<()> {
        sqlx::query("DELETE FROM team_zones WHERE team_id = $1")
            .bind(team_id)
            .execute(&mut *conn)
            .await?;

        if !zone_ids.is_empty() {
            sqlx::query(
                "INSERT INTO team_zones (team_id, zone_id) SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
            )
            .bind(team_id)
            .bind(zone_ids)
            .execute(&mut *conn)
            .await
            .map_err(|e| match AppError::from_write(e, "zone_ids") {
                AppError::NotFound(_) => AppError::NotFound("Zone".to_string()),
                other => other,
            })?;
        }
        Ok(())
    }

    async fn detail(conn: &mut PgConnection, team_id: Uuid) -> AppResult<TeamDetail> {
        let team = sqlx::query_as::<_, Team>(&format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = $1"))
            .bind(team_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Team".to_string()))?;

        let member_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT agent_id FROM team_members WHERE team_id = $1 ORDER BY agent_id",
        )
        .bind(team_id)
        .fetch_all(&mut *conn)
        .await?;

        let zone_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT zone_id FROM team_zones WHERE team_id = $1 ORDER BY zone_id",
        )
        .bind(team_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(TeamDetail {
            team,
            member_ids,
            zone_ids,
        })
    }

    /// Rounds not yet closed, from `today` on
    pub async fn planning(&self, team_id: Uuid, today: NaiveDate) -> AppResult<TeamPlanning> {
        let mut conn = self.db.acquire().await?;
        let team = Self::detail(&mut conn, team_id).await?;

        let upcoming_rounds = sqlx::query_as::<_, Round>(&format!(
            "SELECT {ROUND_COLUMNS} FROM collection_rounds \
             WHERE team_id = $1 AND scheduled_date >= $2 \
               AND status IN ('planned', 'postponed', 'in_progress') \
             ORDER BY scheduled_date, planned_start"
        ))
        .bind(team_id)
        .bind(today)
        .fetch_all(&mut *conn)
        .await?;

        Ok(TeamPlanning::new(team, upcoming_rounds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planning_counts_working_days() {
        let now = Utc::now();
        let team = TeamDetail {
            team: Team {
                id: Uuid::new_v4(),
                name: "Equipe Tampouy".to_string(),
                team_lead_id: Uuid::new_v4(),
                vehicle_id: None,
                working_days: serde_json::json!(["monday", "wednesday", "friday"]),
                start_hour: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
                end_hour: NaiveTime::from_hms_opt(13, 30, 0).unwrap(),
                is_active: true,
                created_at: now,
                updated_at: now,
            },
            member_ids: vec![],
            zone_ids: vec![],
        };

        let planning = TeamPlanning::new(team, vec![]);
        assert_eq!(planning.working_days, vec!["monday", "wednesday", "friday"]);
        assert_eq!(planning.daily_hours, Decimal::new(750, 2));
        assert_eq!(planning.weekly_hours, Decimal::new(2250, 2));
        assert!(planning.upcoming_rounds.is_empty());
    }
}
