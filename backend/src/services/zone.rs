//! Collection zones

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::client::{Client, CLIENT_COLUMNS};
use crate::services::listing::ListQuery;
use shared::types::PaginatedResponse;
use shared::validation::{validate_hex_color, validate_zone_code};

const ZONE_COLUMNS: &str =
    "id, name, code, description, color, polygon, responsible_id, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub color: String,
    /// Boundary as a list of `[latitude, longitude]` pairs
    pub polygon: serde_json::Value,
    pub responsible_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateZoneInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub polygon: Option<serde_json::Value>,
    pub responsible_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateZoneInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub polygon: Option<serde_json::Value>,
    pub responsible_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ZoneStatistics {
    pub zone_id: Uuid,
    pub clients: i64,
    pub active_clients: i64,
    pub agents: i64,
    pub planned_rounds: i64,
}

fn check_polygon(polygon: &serde_json::Value) -> AppResult<()> {
    let valid = polygon.as_array().is_some_and(|points| {
        points.iter().all(|p| {
            p.as_array()
                .is_some_and(|pair| pair.len() == 2 && pair.iter().all(serde_json::Value::is_number))
        })
    });
    if valid {
        Ok(())
    } else {
        Err(AppError::validation(
            "polygon",
            "Polygon must be a list of [latitude, longitude] pairs",
            "Le polygone doit être une liste de paires [latitude, longitude]",
        ))
    }
}

/// Zone service
#[derive(Clone)]
pub struct ZoneService {
    db: PgPool,
}

impl ZoneService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_zones(&self, list: &ListQuery) -> AppResult<PaginatedResponse<Zone>> {
        let pagination = list.pagination();
        let order = list.order_by(&["name", "code", "created_at"], "name ASC");
        let conditions = "($1::text IS NULL OR name ILIKE $1 OR code ILIKE $1 OR description ILIKE $1)";
        let search = list.search_pattern();

        let zones = sqlx::query_as::<_, Zone>(&format!(
            "SELECT {ZONE_COLUMNS} FROM zones WHERE {conditions} ORDER BY {order} LIMIT $2 OFFSET $3"
        ))
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM zones WHERE {conditions}"
        ))
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(zones, &pagination, total))
    }

    pub async fn get_zone(&self, zone_id: Uuid) -> AppResult<Zone> {
        sqlx::query_as::<_, Zone>(&format!("SELECT {ZONE_COLUMNS} FROM zones WHERE id = $1"))
            .bind(zone_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Zone".to_string()))
    }

    pub async fn create_zone(&self, input: CreateZoneInput) -> AppResult<Zone> {
        input.validate()?;
        let code = input.code.trim().to_ascii_uppercase();
        validate_zone_code(&code).map_err(|m| AppError::invalid_field("code", m))?;
        if let Some(color) = input.color.as_deref() {
            validate_hex_color(color).map_err(|m| AppError::invalid_field("color", m))?;
        }
        let polygon = input.polygon.unwrap_or_else(|| serde_json::json!([]));
        check_polygon(&polygon)?;

        let zone = sqlx::query_as::<_, Zone>(&format!(
            r#"
            INSERT INTO zones (name, code, description, color, polygon, responsible_id)
            VALUES ($1, $2, $3, COALESCE($4, '#3b82f6'), $5, $6)
            RETURNING {ZONE_COLUMNS}
            "#
        ))
        .bind(&input.name)
        .bind(&code)
        .bind(&input.description)
        .bind(&input.color)
        .bind(&polygon)
        .bind(input.responsible_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_write(e, "code"))?;

        tracing::info!(zone_id = %zone.id, code = %zone.code, "zone created");
        Ok(zone)
    }

    pub async fn update_zone(&self, zone_id: Uuid, input: UpdateZoneInput) -> AppResult<Zone> {
        input.validate()?;
        if let Some(color) = input.color.as_deref() {
            validate_hex_color(color).map_err(|m| AppError::invalid_field("color", m))?;
        }
        if let Some(polygon) = input.polygon.as_ref() {
            check_polygon(polygon)?;
        }

        sqlx::query_as::<_, Zone>(&format!(
            r#"
            UPDATE zones
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                color = COALESCE($4, color),
                polygon = COALESCE($5, polygon),
                responsible_id = COALESCE($6, responsible_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ZONE_COLUMNS}
            "#
        ))
        .bind(zone_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.color)
        .bind(&input.polygon)
        .bind(input.responsible_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::from_write(e, "responsible_id"))?
        .ok_or_else(|| AppError::NotFound("Zone".to_string()))
    }

    pub async fn delete_zone(&self, zone_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM zones WHERE id = $1")
            .bind(zone_id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::from_delete(e, "zone"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Zone".to_string()));
        }
        Ok(())
    }

    pub async fn zone_clients(&self, zone_id: Uuid) -> AppResult<Vec<Client>> {
        self.get_zone(zone_id).await?;

        let clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients c JOIN users u ON u.id = c.user_id \
             WHERE c.zone_id = $1 ORDER BY c.code"
        ))
        .bind(zone_id)
        .fetch_all(&self.db)
        .await?;

        Ok(clients)
    }

    pub async fn statistics(&self, zone_id: Uuid) -> AppResult<ZoneStatistics> {
        self.get_zone(zone_id).await?;

        let (clients, active_clients, agents, planned_rounds) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM clients WHERE zone_id = $1),
                    (SELECT COUNT(*) FROM clients WHERE zone_id = $1 AND status = 'active'),
                    (SELECT COUNT(*) FROM agent_zones WHERE zone_id = $1),
                    (SELECT COUNT(*) FROM collection_rounds WHERE zone_id = $1 AND status = 'planned')
                "#,
            )
            .bind(zone_id)
            .fetch_one(&self.db)
            .await?;

        Ok(ZoneStatistics {
            zone_id,
            clients,
            active_clients,
            agents,
            planned_rounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_polygon() {
        assert!(check_polygon(&serde_json::json!([])).is_ok());
        assert!(check_polygon(&serde_json::json!([[12.37, -1.52], [12.38, -1.51]])).is_ok());
        assert!(check_polygon(&serde_json::json!([[12.37]])).is_err());
        assert!(check_polygon(&serde_json::json!({"lat": 1})).is_err());
    }
}
