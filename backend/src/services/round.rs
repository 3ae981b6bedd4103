//! Collection rounds and their stops
//!
//! Rounds and stops are never deleted; cancelling or failing is a status.
//! Every status change goes through the lifecycle tables in
//! `shared::models::round`, so illegal transitions surface as 422.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::services::listing::ListQuery;
use shared::models::{
    completion_rate, reported_completion_rate, validate_visit_order, FailureReason, RoundAction,
    RoundStatus, StopAction, StopStatus,
};
use shared::types::PaginatedResponse;
use shared::validation::{validate_coordinates, validate_time_window};

pub(crate) const ROUND_COLUMNS: &str = "id, name, scheduled_date, planned_start, planned_end, team_id, \
     vehicle_id, zone_id, status, planned_clients, realized_clients, distance_km, fuel_litres, \
     actual_start_at, actual_end_at, completion_rate, notes, problems, created_at, updated_at";

const STOP_COLUMNS: &str = "id, round_id, client_id, visit_order, planned_time, status, arrived_at, \
     departed_at, waste_types, estimated_quantity_kg, container_count, failure_reason, \
     failure_details, signature, signatory_name, photo_before, photo_after, latitude, longitude, \
     agent_notes, client_comment, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Round {
    pub id: Uuid,
    pub name: String,
    pub scheduled_date: NaiveDate,
    pub planned_start: NaiveTime,
    pub planned_end: NaiveTime,
    pub team_id: Uuid,
    pub vehicle_id: Uuid,
    pub zone_id: Uuid,
    pub status: RoundStatus,
    pub planned_clients: i32,
    pub realized_clients: i32,
    pub distance_km: Option<Decimal>,
    pub fuel_litres: Option<Decimal>,
    pub actual_start_at: Option<DateTime<Utc>>,
    pub actual_end_at: Option<DateTime<Utc>>,
    /// Frozen when the round ends
    pub completion_rate: Option<Decimal>,
    pub notes: Option<String>,
    pub problems: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A round as returned by the API, with the live rate clamped for display
#[derive(Debug, Serialize)]
pub struct RoundView {
    #[serde(flatten)]
    pub round: Round,
    pub current_completion_rate: Decimal,
}

impl From<Round> for RoundView {
    fn from(round: Round) -> Self {
        let current_completion_rate =
            reported_completion_rate(round.planned_clients, round.realized_clients);
        Self {
            round,
            current_completion_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Stop {
    pub id: Uuid,
    pub round_id: Uuid,
    pub client_id: Uuid,
    pub visit_order: i32,
    pub planned_time: NaiveTime,
    pub status: StopStatus,
    pub arrived_at: Option<DateTime<Utc>>,
    pub departed_at: Option<DateTime<Utc>>,
    pub waste_types: serde_json::Value,
    pub estimated_quantity_kg: Option<Decimal>,
    pub container_count: i32,
    pub failure_reason: Option<FailureReason>,
    pub failure_details: Option<String>,
    pub signature: Option<String>,
    pub signatory_name: Option<String>,
    pub photo_before: Option<String>,
    pub photo_after: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub agent_notes: Option<String>,
    pub client_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoundInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub scheduled_date: NaiveDate,
    pub planned_start: NaiveTime,
    pub planned_end: NaiveTime,
    pub team_id: Uuid,
    pub vehicle_id: Uuid,
    pub zone_id: Uuid,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub planned_clients: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRoundInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub planned_start: Option<NaiveTime>,
    pub planned_end: Option<NaiveTime>,
    pub team_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub zone_id: Option<Uuid>,
    #[validate(range(min = 0))]
    pub planned_clients: Option<i32>,
    pub distance_km: Option<Decimal>,
    pub fuel_litres: Option<Decimal>,
    pub notes: Option<String>,
    pub problems: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoundFilter {
    pub status: Option<RoundStatus>,
    pub team_id: Option<Uuid>,
    pub zone_id: Option<Uuid>,
    pub scheduled_date: Option<NaiveDate>,
}

/// Optional field notes sent with end/cancel/postpone
#[derive(Debug, Default, Deserialize)]
pub struct RoundActionInput {
    pub distance_km: Option<Decimal>,
    pub fuel_litres: Option<Decimal>,
    pub problems: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStopInput {
    pub client_id: Uuid,
    pub visit_order: i32,
    pub planned_time: NaiveTime,
}

#[derive(Debug, Default, Deserialize)]
pub struct StopFilter {
    pub round_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub status: Option<StopStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArriveStopInput {
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CompleteStopInput {
    #[serde(default)]
    pub waste_types: Vec<String>,
    pub estimated_quantity_kg: Option<Decimal>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub container_count: i32,
    pub signature: Option<String>,
    #[validate(length(max = 100))]
    pub signatory_name: Option<String>,
    #[validate(length(max = 255))]
    pub photo_before: Option<String>,
    #[validate(length(max = 255))]
    pub photo_after: Option<String>,
    pub agent_notes: Option<String>,
    pub client_comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FailStopInput {
    pub reason: FailureReason,
    pub details: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PostponeStopInput {
    pub agent_notes: Option<String>,
}

/// Round and stop service
#[derive(Clone)]
pub struct RoundService {
    db: PgPool,
}

impl RoundService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_rounds(
        &self,
        list: &ListQuery,
        filter: &RoundFilter,
    ) -> AppResult<PaginatedResponse<RoundView>> {
        let pagination = list.pagination();
        let order = list.order_by(
            &["scheduled_date", "name", "status", "created_at"],
            "scheduled_date DESC",
        );
        let conditions = r#"
            ($1::varchar IS NULL OR status = $1)
            AND ($2::uuid IS NULL OR team_id = $2)
            AND ($3::uuid IS NULL OR zone_id = $3)
            AND ($4::date IS NULL OR scheduled_date = $4)
            AND ($5::text IS NULL OR name ILIKE $5 OR notes ILIKE $5)
        "#;
        let search = list.search_pattern();

        let rounds = sqlx::query_as::<_, Round>(&format!(
            "SELECT {ROUND_COLUMNS} FROM collection_rounds WHERE {conditions} \
             ORDER BY {order} LIMIT $6 OFFSET $7"
        ))
        .bind(filter.status)
        .bind(filter.team_id)
        .bind(filter.zone_id)
        .bind(filter.scheduled_date)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM collection_rounds WHERE {conditions}"
        ))
        .bind(filter.status)
        .bind(filter.team_id)
        .bind(filter.zone_id)
        .bind(filter.scheduled_date)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        let rounds = rounds.into_iter().map(RoundView::from).collect();
        Ok(PaginatedResponse::new(rounds, &pagination, total))
    }

    pub async fn get_round(&self, round_id: Uuid) -> AppResult<RoundView> {
        let mut conn = self.db.acquire().await?;
        Self::fetch_round(&mut conn, round_id, false)
            .await
            .map(RoundView::from)
    }

    pub async fn create_round(&self, input: CreateRoundInput) -> AppResult<RoundView> {
        input.validate()?;
        validate_time_window(input.planned_start, input.planned_end)
            .map_err(|m| AppError::invalid_field("planned_end", m))?;

        let round = sqlx::query_as::<_, Round>(&format!(
            r#"
            INSERT INTO collection_rounds
                (name, scheduled_date, planned_start, planned_end, team_id, vehicle_id, zone_id,
                 planned_clients, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ROUND_COLUMNS}
            "#
        ))
        .bind(&input.name)
        .bind(input.scheduled_date)
        .bind(input.planned_start)
        .bind(input.planned_end)
        .bind(input.team_id)
        .bind(input.vehicle_id)
        .bind(input.zone_id)
        .bind(input.planned_clients)
        .bind(&input.notes)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_write(e, "team, vehicle or zone"))?;

        tracing::info!(
            round_id = %round.id,
            scheduled_date = %round.scheduled_date,
            team_id = %round.team_id,
            "round planned"
        );
        Ok(round.into())
    }

    /// Planning fields only; status and timestamps move through the actions
    pub async fn update_round(&self, round_id: Uuid, input: UpdateRoundInput) -> AppResult<RoundView> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let current = Self::fetch_round(&mut tx, round_id, true).await?;

        if current.status.is_terminal() {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot edit a round that is {}",
                current.status
            )));
        }
        validate_time_window(
            input.planned_start.unwrap_or(current.planned_start),
            input.planned_end.unwrap_or(current.planned_end),
        )
        .map_err(|m| AppError::invalid_field("planned_end", m))?;

        let round = sqlx::query_as::<_, Round>(&format!(
            r#"
            UPDATE collection_rounds
            SET name = COALESCE($2, name),
                scheduled_date = COALESCE($3, scheduled_date),
                planned_start = COALESCE($4, planned_start),
                planned_end = COALESCE($5, planned_end),
                team_id = COALESCE($6, team_id),
                vehicle_id = COALESCE($7, vehicle_id),
                zone_id = COALESCE($8, zone_id),
                planned_clients = COALESCE($9, planned_clients),
                distance_km = COALESCE($10, distance_km),
                fuel_litres = COALESCE($11, fuel_litres),
                notes = COALESCE($12, notes),
                problems = COALESCE($13, problems),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ROUND_COLUMNS}
            "#
        ))
        .bind(round_id)
        .bind(&input.name)
        .bind(input.scheduled_date)
        .bind(input.planned_start)
        .bind(input.planned_end)
        .bind(input.team_id)
        .bind(input.vehicle_id)
        .bind(input.zone_id)
        .bind(input.planned_clients)
        .bind(input.distance_km)
        .bind(input.fuel_litres)
        .bind(&input.notes)
        .bind(&input.problems)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, "team, vehicle or zone"))?;

        tx.commit().await?;
        Ok(round.into())
    }

    pub async fn start_round(&self, round_id: Uuid) -> AppResult<RoundView> {
        let mut tx = self.db.begin().await?;
        let round = Self::fetch_round(&mut tx, round_id, true).await?;
        let next = round.status.apply(RoundAction::Start)?;

        let round = sqlx::query_as::<_, Round>(&format!(
            "UPDATE collection_rounds SET status = $2, actual_start_at = NOW(), updated_at = NOW() \
             WHERE id = $1 RETURNING {ROUND_COLUMNS}"
        ))
        .bind(round_id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(round_id = %round_id, "round started");
        Ok(round.into())
    }

    /// Ends the round and freezes its completion rate
    pub async fn end_round(&self, round_id: Uuid, input: RoundActionInput) -> AppResult<RoundView> {
        let mut tx = self.db.begin().await?;
        let round = Self::fetch_round(&mut tx, round_id, true).await?;
        let next = round.status.apply(RoundAction::End)?;
        let rate = completion_rate(round.planned_clients, round.realized_clients);

        let round = sqlx::query_as::<_, Round>(&format!(
            r#"
            UPDATE collection_rounds
            SET status = $2,
                actual_end_at = NOW(),
                completion_rate = $3,
                distance_km = COALESCE($4, distance_km),
                fuel_litres = COALESCE($5, fuel_litres),
                problems = COALESCE($6, problems),
                notes = COALESCE($7, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ROUND_COLUMNS}
            "#
        ))
        .bind(round_id)
        .bind(next)
        .bind(rate)
        .bind(input.distance_km)
        .bind(input.fuel_litres)
        .bind(&input.problems)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            round_id = %round_id,
            planned = round.planned_clients,
            realized = round.realized_clients,
            completion_rate = %rate,
            "round completed"
        );
        Ok(round.into())
    }

    pub async fn cancel_round(&self, round_id: Uuid, input: RoundActionInput) -> AppResult<RoundView> {
        self.plain_transition(round_id, RoundAction::Cancel, input).await
    }

    pub async fn postpone_round(&self, round_id: Uuid, input: RoundActionInput) -> AppResult<RoundView> {
        self.plain_transition(round_id, RoundAction::Postpone, input).await
    }

    async fn plain_transition(
        &self,
        round_id: Uuid,
        action: RoundAction,
        input: RoundActionInput,
    ) -> AppResult<RoundView> {
        let mut tx = self.db.begin().await?;
        let round = Self::fetch_round(&mut tx, round_id, true).await?;
        let next = round.status.apply(action)?;

        let round = sqlx::query_as::<_, Round>(&format!(
            r#"
            UPDATE collection_rounds
            SET status = $2,
                problems = COALESCE($3, problems),
                notes = COALESCE($4, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ROUND_COLUMNS}
            "#
        ))
        .bind(round_id)
        .bind(next)
        .bind(&input.problems)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(round_id = %round_id, status = %next, "round status changed");
        Ok(round.into())
    }

    pub async fn round_stops(&self, round_id: Uuid) -> AppResult<Vec<Stop>> {
        let mut conn = self.db.acquire().await?;
        Self::fetch_round(&mut conn, round_id, false).await?;

        let stops = sqlx::query_as::<_, Stop>(&format!(
            "SELECT {STOP_COLUMNS} FROM collection_stops WHERE round_id = $1 ORDER BY visit_order"
        ))
        .bind(round_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(stops)
    }

    // ========================================================================
    // Stops
    // ========================================================================

    /// Clients only see stops at their own address
    pub async fn list_stops(
        &self,
        viewer: &AuthUser,
        list: &ListQuery,
        filter: &StopFilter,
    ) -> AppResult<PaginatedResponse<Stop>> {
        let pagination = list.pagination();
        let order = list.order_by(&["visit_order", "planned_time", "created_at"], "visit_order ASC");
        let owner = viewer.is_client().then_some(viewer.user_id);
        let conditions = r#"
            ($1::uuid IS NULL OR round_id = $1)
            AND ($2::uuid IS NULL OR client_id = $2)
            AND ($3::varchar IS NULL OR status = $3)
            AND ($4::uuid IS NULL OR client_id IN (SELECT id FROM clients WHERE user_id = $4))
        "#;

        let stops = sqlx::query_as::<_, Stop>(&format!(
            "SELECT {STOP_COLUMNS} FROM collection_stops WHERE {conditions} \
             ORDER BY {order} LIMIT $5 OFFSET $6"
        ))
        .bind(filter.round_id)
        .bind(filter.client_id)
        .bind(filter.status)
        .bind(owner)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM collection_stops WHERE {conditions}"
        ))
        .bind(filter.round_id)
        .bind(filter.client_id)
        .bind(filter.status)
        .bind(owner)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(stops, &pagination, total))
    }

    pub async fn get_stop(&self, viewer: &AuthUser, stop_id: Uuid) -> AppResult<Stop> {
        let owner = viewer.is_client().then_some(viewer.user_id);
        sqlx::query_as::<_, Stop>(&format!(
            "SELECT {STOP_COLUMNS} FROM collection_stops WHERE id = $1 \
             AND ($2::uuid IS NULL OR client_id IN (SELECT id FROM clients WHERE user_id = $2))"
        ))
        .bind(stop_id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stop".to_string()))
    }

    /// Adds a stop to a round. The round row is locked while the visit order
    /// is checked so two concurrent inserts cannot both take the same slot.
    pub async fn create_stop(&self, round_id: Uuid, input: CreateStopInput) -> AppResult<Stop> {
        let mut tx = self.db.begin().await?;
        let round = Self::fetch_round(&mut tx, round_id, true).await?;

        if round.status.is_terminal() {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot add a stop to a round that is {}",
                round.status
            )));
        }

        let existing = sqlx::query_scalar::<_, i32>(
            "SELECT visit_order FROM collection_stops WHERE round_id = $1",
        )
        .bind(round_id)
        .fetch_all(&mut *tx)
        .await?;

        validate_visit_order(&existing, input.visit_order)
            .map_err(|m| AppError::invalid_field("visit_order", m))?;

        let stop = sqlx::query_as::<_, Stop>(&format!(
            r#"
            INSERT INTO collection_stops (round_id, client_id, visit_order, planned_time)
            VALUES ($1, $2, $3, $4)
            RETURNING {STOP_COLUMNS}
            "#
        ))
        .bind(round_id)
        .bind(input.client_id)
        .bind(input.visit_order)
        .bind(input.planned_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match AppError::from_write(e, "visit_order") {
            AppError::DuplicateEntry(_) => AppError::invalid_field(
                "visit_order",
                "This visit order is already used in the round",
            ),
            AppError::NotFound(_) => AppError::NotFound("Client".to_string()),
            other => other,
        })?;

        tx.commit().await?;

        tracing::debug!(round_id = %round_id, stop_id = %stop.id, visit_order = stop.visit_order, "stop added");
        Ok(stop)
    }

    pub async fn arrive(&self, stop_id: Uuid, input: ArriveStopInput) -> AppResult<Stop> {
        if let (Some(lat), Some(lng)) = (input.latitude, input.longitude) {
            validate_coordinates(lat, lng).map_err(|m| AppError::invalid_field("latitude", m))?;
        }

        let mut tx = self.db.begin().await?;
        let (stop, next) = Self::lock_stop_for(&mut tx, stop_id, StopAction::Arrive).await?;

        let stop = sqlx::query_as::<_, Stop>(&format!(
            r#"
            UPDATE collection_stops
            SET status = $2,
                arrived_at = NOW(),
                latitude = COALESCE($3, latitude),
                longitude = COALESCE($4, longitude),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {STOP_COLUMNS}
            "#
        ))
        .bind(stop_id)
        .bind(next)
        .bind(input.latitude)
        .bind(input.longitude)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stop)
    }

    /// Completing a stop records what was collected, counts the client as
    /// realized on the round and stamps the client's last collection.
    pub async fn complete(&self, stop_id: Uuid, input: CompleteStopInput) -> AppResult<Stop> {
        input.validate()?;
        if input.estimated_quantity_kg.is_some_and(|q| q.is_sign_negative()) {
            return Err(AppError::validation(
                "estimated_quantity_kg",
                "Quantity cannot be negative",
                "La quantité ne peut pas être négative",
            ));
        }

        let mut tx = self.db.begin().await?;
        let (stop, next) = Self::lock_stop_for(&mut tx, stop_id, StopAction::Complete).await?;

        let stop = sqlx::query_as::<_, Stop>(&format!(
            r#"
            UPDATE collection_stops
            SET status = $2,
                departed_at = NOW(),
                waste_types = $3,
                estimated_quantity_kg = $4,
                container_count = $5,
                signature = $6,
                signatory_name = $7,
                photo_before = $8,
                photo_after = $9,
                agent_notes = COALESCE($10, agent_notes),
                client_comment = COALESCE($11, client_comment),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {STOP_COLUMNS}
            "#
        ))
        .bind(stop_id)
        .bind(next)
        .bind(serde_json::json!(input.waste_types))
        .bind(input.estimated_quantity_kg)
        .bind(input.container_count)
        .bind(&input.signature)
        .bind(&input.signatory_name)
        .bind(&input.photo_before)
        .bind(&input.photo_after)
        .bind(&input.agent_notes)
        .bind(&input.client_comment)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE collection_rounds SET realized_clients = realized_clients + 1, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(stop.round_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE clients SET last_collection_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(stop.client_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(stop_id = %stop_id, round_id = %stop.round_id, client_id = %stop.client_id, "stop completed");
        Ok(stop)
    }

    /// Failing a stop records the reason and nothing else
    pub async fn fail(&self, stop_id: Uuid, input: FailStopInput) -> AppResult<Stop> {
        let mut tx = self.db.begin().await?;
        let (stop, next) = Self::lock_stop_for(&mut tx, stop_id, StopAction::Fail(input.reason)).await?;

        let stop = sqlx::query_as::<_, Stop>(&format!(
            r#"
            UPDATE collection_stops
            SET status = $2, failure_reason = $3, failure_details = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {STOP_COLUMNS}
            "#
        ))
        .bind(stop_id)
        .bind(next)
        .bind(input.reason)
        .bind(&input.details)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(stop_id = %stop_id, reason = %input.reason, "stop failed");
        Ok(stop)
    }

    pub async fn postpone_stop(&self, stop_id: Uuid, input: PostponeStopInput) -> AppResult<Stop> {
        let mut tx = self.db.begin().await?;
        let (stop, next) = Self::lock_stop_for(&mut tx, stop_id, StopAction::Postpone).await?;

        let stop = sqlx::query_as::<_, Stop>(&format!(
            "UPDATE collection_stops SET status = $2, agent_notes = COALESCE($3, agent_notes), \
             updated_at = NOW() WHERE id = $1 RETURNING {STOP_COLUMNS}"
        ))
        .bind(stop_id)
        .bind(next)
        .bind(&input.agent_notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stop)
    }

    async fn fetch_round(conn: &mut PgConnection, round_id: Uuid, lock: bool) -> AppResult<Round> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        sqlx::query_as::<_, Round>(&format!(
            "SELECT {ROUND_COLUMNS} FROM collection_rounds WHERE id = $1{suffix}"
        ))
        .bind(round_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Round".to_string()))
    }

    /// Locks the stop's round, then the stop, and checks both lifecycles
    async fn lock_stop_for(
        conn: &mut PgConnection,
        stop_id: Uuid,
        action: StopAction,
    ) -> AppResult<(Stop, StopStatus)> {
        let round_id = sqlx::query_scalar::<_, Uuid>("SELECT round_id FROM collection_stops WHERE id = $1")
            .bind(stop_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Stop".to_string()))?;

        let round = Self::fetch_round(&mut *conn, round_id, true).await?;
        let stop = Self::lock_stop(&mut *conn, stop_id).await?;
        round.status.allows_stop(action)?;
        let next = stop.status.apply(action)?;
        Ok((stop, next))
    }

    async fn lock_stop(conn: &mut PgConnection, stop_id: Uuid) -> AppResult<Stop> {
        sqlx::query_as::<_, Stop>(&format!(
            "SELECT {STOP_COLUMNS} FROM collection_stops WHERE id = $1 FOR UPDATE"
        ))
        .bind(stop_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Stop".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(planned: i32, realized: i32) -> Round {
        Round {
            id: Uuid::new_v4(),
            name: "Tournée Gounghin".to_string(),
            scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            planned_start: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            planned_end: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            team_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            zone_id: Uuid::new_v4(),
            status: RoundStatus::InProgress,
            planned_clients: planned,
            realized_clients: realized,
            distance_km: None,
            fuel_litres: None,
            actual_start_at: None,
            actual_end_at: None,
            completion_rate: None,
            notes: None,
            problems: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_view_clamps_live_rate() {
        assert_eq!(RoundView::from(round(25, 20)).current_completion_rate, Decimal::from(80));
        assert_eq!(RoundView::from(round(10, 14)).current_completion_rate, Decimal::from(100));
        assert_eq!(RoundView::from(round(0, 0)).current_completion_rate, Decimal::ZERO);
    }

    #[test]
    fn test_fail_input_rejects_unknown_reason() {
        let ok: Result<FailStopInput, _> =
            serde_json::from_str(r#"{"reason": "access_blocked", "details": "portail fermé"}"#);
        assert!(ok.is_ok());
        let bad: Result<FailStopInput, _> = serde_json::from_str(r#"{"reason": "rain"}"#);
        assert!(bad.is_err());
    }
}
