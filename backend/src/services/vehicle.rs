//! Vehicle fleet and maintenance history

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::listing::ListQuery;
use shared::models::{maintenance_due, revision_schedule, MaintenanceType, VehicleStatus, VehicleType};
use shared::types::PaginatedResponse;

pub(crate) const VEHICLE_COLUMNS: &str = "id, plate_number, make, model, year, vehicle_type, \
     load_capacity_kg, volume_m3, status, mileage, last_revision, next_revision, insurance_number, \
     insurance_expiry, inspection_expiry, equipment, average_consumption, created_at, updated_at";

const MAINTENANCE_COLUMNS: &str =
    "id, vehicle_id, maintenance_type, performed_on, description, cost, mileage, recorded_by, created_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Vehicle {
    pub id: Uuid,
    pub plate_number: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub vehicle_type: VehicleType,
    pub load_capacity_kg: Decimal,
    pub volume_m3: Option<Decimal>,
    pub status: VehicleStatus,
    pub mileage: i32,
    pub last_revision: Option<NaiveDate>,
    pub next_revision: Option<NaiveDate>,
    pub insurance_number: Option<String>,
    pub insurance_expiry: Option<NaiveDate>,
    pub inspection_expiry: Option<NaiveDate>,
    pub equipment: serde_json::Value,
    pub average_consumption: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn maintenance_due(&self, today: NaiveDate) -> bool {
        maintenance_due(
            today,
            self.next_revision,
            self.insurance_expiry,
            self.inspection_expiry,
        )
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MaintenanceRecord {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub maintenance_type: MaintenanceType,
    pub performed_on: NaiveDate,
    pub description: Option<String>,
    pub cost: Option<Decimal>,
    pub mileage: Option<i32>,
    pub recorded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVehicleInput {
    #[validate(length(min = 2, max = 20))]
    pub plate_number: String,
    #[validate(length(min = 1, max = 50))]
    pub make: String,
    #[validate(length(min = 1, max = 50))]
    pub model: String,
    #[validate(range(min = 1950, max = 2100))]
    pub year: i32,
    pub vehicle_type: VehicleType,
    pub load_capacity_kg: Decimal,
    pub volume_m3: Option<Decimal>,
    pub status: Option<VehicleStatus>,
    #[validate(range(min = 0))]
    pub mileage: Option<i32>,
    pub last_revision: Option<NaiveDate>,
    pub next_revision: Option<NaiveDate>,
    #[validate(length(max = 50))]
    pub insurance_number: Option<String>,
    pub insurance_expiry: Option<NaiveDate>,
    pub inspection_expiry: Option<NaiveDate>,
    #[serde(default)]
    pub equipment: Vec<String>,
    pub average_consumption: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateVehicleInput {
    pub status: Option<VehicleStatus>,
    #[validate(range(min = 0))]
    pub mileage: Option<i32>,
    pub next_revision: Option<NaiveDate>,
    #[validate(length(max = 50))]
    pub insurance_number: Option<String>,
    pub insurance_expiry: Option<NaiveDate>,
    pub inspection_expiry: Option<NaiveDate>,
    pub equipment: Option<Vec<String>>,
    pub average_consumption: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VehicleFilter {
    pub status: Option<VehicleStatus>,
    pub vehicle_type: Option<VehicleType>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterMaintenanceInput {
    pub maintenance_type: MaintenanceType,
    pub performed_on: NaiveDate,
    pub description: Option<String>,
    pub cost: Option<Decimal>,
    #[validate(range(min = 0))]
    pub mileage: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct MaintenanceOutcome {
    pub vehicle: Vehicle,
    pub record: MaintenanceRecord,
}

/// Vehicle service
#[derive(Clone)]
pub struct VehicleService {
    db: PgPool,
}

impl VehicleService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_vehicles(
        &self,
        list: &ListQuery,
        filter: &VehicleFilter,
    ) -> AppResult<PaginatedResponse<Vehicle>> {
        let pagination = list.pagination();
        let order = list.order_by(
            &["plate_number", "year", "mileage", "next_revision", "status"],
            "plate_number ASC",
        );
        let conditions = r#"
            ($1::varchar IS NULL OR status = $1)
            AND ($2::varchar IS NULL OR vehicle_type = $2)
            AND ($3::text IS NULL OR plate_number ILIKE $3 OR make ILIKE $3 OR model ILIKE $3)
        "#;
        let search = list.search_pattern();

        let vehicles = sqlx::query_as::<_, Vehicle>(&format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE {conditions} ORDER BY {order} LIMIT $4 OFFSET $5"
        ))
        .bind(filter.status)
        .bind(filter.vehicle_type)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM vehicles WHERE {conditions}"
        ))
        .bind(filter.status)
        .bind(filter.vehicle_type)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(vehicles, &pagination, total))
    }

    pub async fn get_vehicle(&self, vehicle_id: Uuid) -> AppResult<Vehicle> {
        sqlx::query_as::<_, Vehicle>(&format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = $1"))
            .bind(vehicle_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))
    }

    pub async fn create_vehicle(&self, input: CreateVehicleInput) -> AppResult<Vehicle> {
        input.validate()?;
        if input.load_capacity_kg <= Decimal::ZERO {
            return Err(AppError::validation(
                "load_capacity_kg",
                "Load capacity must be positive",
                "La capacité de charge doit être positive",
            ));
        }

        let vehicle = sqlx::query_as::<_, Vehicle>(&format!(
            r#"
            INSERT INTO vehicles (plate_number, make, model, year, vehicle_type, load_capacity_kg,
                                  volume_m3, status, mileage, last_revision, next_revision,
                                  insurance_number, insurance_expiry, inspection_expiry, equipment,
                                  average_consumption)
            VALUES (UPPER($1), $2, $3, $4, $5, $6, $7, COALESCE($8, 'operational'), COALESCE($9, 0),
                    $10, $11, $12, $13, $14, $15, $16)
            RETURNING {VEHICLE_COLUMNS}
            "#
        ))
        .bind(input.plate_number.trim())
        .bind(&input.make)
        .bind(&input.model)
        .bind(input.year)
        .bind(input.vehicle_type)
        .bind(input.load_capacity_kg)
        .bind(input.volume_m3)
        .bind(input.status)
        .bind(input.mileage)
        .bind(input.last_revision)
        .bind(input.next_revision)
        .bind(&input.insurance_number)
        .bind(input.insurance_expiry)
        .bind(input.inspection_expiry)
        .bind(serde_json::json!(input.equipment))
        .bind(input.average_consumption)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_write(e, "plate_number"))?;

        tracing::info!(vehicle_id = %vehicle.id, plate = %vehicle.plate_number, "vehicle registered");
        Ok(vehicle)
    }

    pub async fn update_vehicle(&self, vehicle_id: Uuid, input: UpdateVehicleInput) -> AppResult<Vehicle> {
        input.validate()?;

        sqlx::query_as::<_, Vehicle>(&format!(
            r#"
            UPDATE vehicles
            SET status = COALESCE($2, status),
                mileage = COALESCE($3, mileage),
                next_revision = COALESCE($4, next_revision),
                insurance_number = COALESCE($5, insurance_number),
                insurance_expiry = COALESCE($6, insurance_expiry),
                inspection_expiry = COALESCE($7, inspection_expiry),
                equipment = COALESCE($8, equipment),
                average_consumption = COALESCE($9, average_consumption),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VEHICLE_COLUMNS}
            "#
        ))
        .bind(vehicle_id)
        .bind(input.status)
        .bind(input.mileage)
        .bind(input.next_revision)
        .bind(&input.insurance_number)
        .bind(input.insurance_expiry)
        .bind(input.inspection_expiry)
        .bind(input.equipment.as_ref().map(|e| serde_json::json!(e)))
        .bind(input.average_consumption)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))
    }

    pub async fn delete_vehicle(&self, vehicle_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM vehicles WHERE id = $1")
            .bind(vehicle_id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::from_delete(e, "vehicle"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Vehicle".to_string()));
        }
        Ok(())
    }

    pub async fn operational_vehicles(&self) -> AppResult<Vec<Vehicle>> {
        let vehicles = sqlx::query_as::<_, Vehicle>(&format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE status = $1 ORDER BY plate_number"
        ))
        .bind(VehicleStatus::Operational)
        .fetch_all(&self.db)
        .await?;

        Ok(vehicles)
    }

    /// Vehicles with a revision, insurance or inspection deadline on or before `today`
    pub async fn maintenance_due(&self, today: NaiveDate) -> AppResult<Vec<Vehicle>> {
        let vehicles = sqlx::query_as::<_, Vehicle>(&format!(
            r#"
            SELECT {VEHICLE_COLUMNS} FROM vehicles
            WHERE status <> $1
              AND (next_revision IS NOT NULL OR insurance_expiry IS NOT NULL
                   OR inspection_expiry IS NOT NULL)
            ORDER BY LEAST(next_revision, insurance_expiry, inspection_expiry)
            "#
        ))
        .bind(VehicleStatus::Retired)
        .fetch_all(&self.db)
        .await?;

        Ok(vehicles
            .into_iter()
            .filter(|v| v.maintenance_due(today))
            .collect())
    }

    /// Record a maintenance operation. Revisions move the revision schedule.
    pub async fn register_maintenance(
        &self,
        vehicle_id: Uuid,
        recorded_by: Uuid,
        input: RegisterMaintenanceInput,
    ) -> AppResult<MaintenanceOutcome> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        let vehicle = sqlx::query_as::<_, Vehicle>(&format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = $1 FOR UPDATE"
        ))
        .bind(vehicle_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))?;

        let (last_revision, next_revision) =
            match revision_schedule(input.maintenance_type, input.performed_on) {
                Some((last, next)) => (Some(last), Some(next)),
                None => (vehicle.last_revision, vehicle.next_revision),
            };

        let vehicle = sqlx::query_as::<_, Vehicle>(&format!(
            r#"
            UPDATE vehicles
            SET last_revision = $2, next_revision = $3,
                mileage = COALESCE($4, mileage),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VEHICLE_COLUMNS}
            "#
        ))
        .bind(vehicle_id)
        .bind(last_revision)
        .bind(next_revision)
        .bind(input.mileage)
        .fetch_one(&mut *tx)
        .await?;

        let record = sqlx::query_as::<_, MaintenanceRecord>(&format!(
            r#"
            INSERT INTO vehicle_maintenance (vehicle_id, maintenance_type, performed_on, description,
                                             cost, mileage, recorded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {MAINTENANCE_COLUMNS}
            "#
        ))
        .bind(vehicle_id)
        .bind(input.maintenance_type)
        .bind(input.performed_on)
        .bind(&input.description)
        .bind(input.cost)
        .bind(input.mileage)
        .bind(recorded_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            vehicle_id = %vehicle_id,
            maintenance_type = %input.maintenance_type,
            next_revision = ?vehicle.next_revision,
            "maintenance registered"
        );

        Ok(MaintenanceOutcome { vehicle, record })
    }

    pub async fn maintenance_history(&self, vehicle_id: Uuid) -> AppResult<Vec<MaintenanceRecord>> {
        self.get_vehicle(vehicle_id).await?;

        let records = sqlx::query_as::<_, MaintenanceRecord>(&format!(
            "SELECT {MAINTENANCE_COLUMNS} FROM vehicle_maintenance WHERE vehicle_id = $1 \
             ORDER BY performed_on DESC, created_at DESC"
        ))
        .bind(vehicle_id)
        .fetch_all(&self.db)
        .await?;

        Ok(records)
    }
}
