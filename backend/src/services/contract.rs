//! Service contracts and waste bins of clients

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::listing::ListQuery;
use shared::codes::{generate_code, CodePrefix};
use shared::models::{
    contract_in_force, default_contract_end, BinStatus, BinType, CollectionFrequency,
    ContractStatus,
};
use shared::types::PaginatedResponse;
use shared::validation::{validate_date_range, validate_money_precision};

pub(crate) const CONTRACT_COLUMNS: &str = "id, client_id, number, start_date, end_date, frequency, \
     collection_days, pass_time, monthly_rate, currency, waste_types, status, special_conditions, \
     created_at, updated_at";

pub(crate) const BIN_COLUMNS: &str = "id, client_id, number, bin_type, capacity_litres, status, \
     installed_on, last_collection_at, location_note, created_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Contract {
    pub id: Uuid,
    pub client_id: Uuid,
    pub number: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: CollectionFrequency,
    pub collection_days: serde_json::Value,
    pub pass_time: Option<NaiveTime>,
    pub monthly_rate: Decimal,
    pub currency: String,
    pub waste_types: serde_json::Value,
    pub status: ContractStatus,
    pub special_conditions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn in_force(&self, today: NaiveDate) -> bool {
        contract_in_force(self.status, self.start_date, self.end_date, today)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Bin {
    pub id: Uuid,
    pub client_id: Uuid,
    pub number: String,
    pub bin_type: BinType,
    pub capacity_litres: i32,
    pub status: BinStatus,
    pub installed_on: NaiveDate,
    pub last_collection_at: Option<DateTime<Utc>>,
    pub location_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContractInput {
    pub client_id: Uuid,
    pub start_date: NaiveDate,
    /// Defaults to one year after the start
    pub end_date: Option<NaiveDate>,
    pub frequency: CollectionFrequency,
    #[serde(default)]
    pub collection_days: Vec<String>,
    pub pass_time: Option<NaiveTime>,
    pub monthly_rate: Decimal,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[serde(default)]
    pub waste_types: Vec<String>,
    pub special_conditions: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateContractInput {
    pub end_date: Option<NaiveDate>,
    pub frequency: Option<CollectionFrequency>,
    pub collection_days: Option<Vec<String>>,
    pub pass_time: Option<NaiveTime>,
    pub monthly_rate: Option<Decimal>,
    pub waste_types: Option<Vec<String>>,
    pub status: Option<ContractStatus>,
    pub special_conditions: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContractFilter {
    pub client_id: Option<Uuid>,
    pub status: Option<ContractStatus>,
    pub frequency: Option<CollectionFrequency>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBinInput {
    pub client_id: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub number: String,
    pub bin_type: BinType,
    /// Defaults to the nominal capacity of the bin type
    #[validate(range(min = 1))]
    pub capacity_litres: Option<i32>,
    pub installed_on: Option<NaiveDate>,
    pub location_note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBinInput {
    pub status: Option<BinStatus>,
    pub location_note: Option<String>,
    pub last_collection_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BinFilter {
    pub client_id: Option<Uuid>,
    pub status: Option<BinStatus>,
    pub bin_type: Option<BinType>,
}

/// Fields of a new contract row
#[derive(Debug, Clone)]
pub(crate) struct NewContract<'a> {
    pub client_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: CollectionFrequency,
    pub collection_days: &'a [String],
    pub pass_time: Option<NaiveTime>,
    pub monthly_rate: Decimal,
    pub currency: &'a str,
    pub waste_types: &'a [String],
    pub special_conditions: Option<&'a str>,
}

impl CreateContractInput {
    fn new_contract<'a>(&'a self, default_currency: &'a str) -> NewContract<'a> {
        NewContract {
            client_id: self.client_id,
            start_date: self.start_date,
            end_date: self
                .end_date
                .unwrap_or_else(|| default_contract_end(self.start_date)),
            frequency: self.frequency,
            collection_days: &self.collection_days,
            pass_time: self.pass_time,
            monthly_rate: self.monthly_rate,
            currency: self.currency.as_deref().unwrap_or(default_currency),
            waste_types: &self.waste_types,
            special_conditions: self.special_conditions.as_deref(),
        }
    }
}

/// Monthly rates are stored to the cent
fn check_monthly_rate(rate: Decimal) -> AppResult<()> {
    if rate < Decimal::ZERO {
        return Err(AppError::validation(
            "monthly_rate",
            "Monthly rate cannot be negative",
            "Le tarif mensuel ne peut pas être négatif",
        ));
    }
    validate_money_precision(rate).map_err(|m| AppError::invalid_field("monthly_rate", m))
}

/// Insert an active contract on the caller's connection
pub(crate) async fn insert_contract(
    conn: &mut PgConnection,
    new: NewContract<'_>,
) -> AppResult<Contract> {
    validate_date_range(new.start_date, new.end_date)
        .map_err(|m| AppError::invalid_field("end_date", m))?;
    check_monthly_rate(new.monthly_rate)?;

    let contract = sqlx::query_as::<_, Contract>(&format!(
        r#"
        INSERT INTO contracts (client_id, number, start_date, end_date, frequency, collection_days,
                               pass_time, monthly_rate, currency, waste_types, special_conditions)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {CONTRACT_COLUMNS}
        "#
    ))
    .bind(new.client_id)
    .bind(generate_code(CodePrefix::Contract))
    .bind(new.start_date)
    .bind(new.end_date)
    .bind(new.frequency)
    .bind(serde_json::json!(new.collection_days))
    .bind(new.pass_time)
    .bind(new.monthly_rate)
    .bind(new.currency)
    .bind(serde_json::json!(new.waste_types))
    .bind(new.special_conditions)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::from_write(e, "client_id"))?;

    Ok(contract)
}

/// Contract and bin service
#[derive(Clone)]
pub struct ContractService {
    db: PgPool,
}

impl ContractService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ========================================================================
    // Contracts
    // ========================================================================

    pub async fn list_contracts(
        &self,
        viewer: &AuthUser,
        list: &ListQuery,
        filter: &ContractFilter,
    ) -> AppResult<PaginatedResponse<Contract>> {
        let pagination = list.pagination();
        let order = list.order_by(
            &["start_date", "end_date", "monthly_rate", "number", "created_at"],
            "start_date DESC",
        );
        let owner = viewer.is_client().then_some(viewer.user_id);
        let conditions = r#"
            ($1::uuid IS NULL OR client_id = $1)
            AND ($2::varchar IS NULL OR status = $2)
            AND ($3::varchar IS NULL OR frequency = $3)
            AND ($4::uuid IS NULL OR client_id IN (SELECT id FROM clients WHERE user_id = $4))
            AND ($5::text IS NULL OR number ILIKE $5 OR special_conditions ILIKE $5)
        "#;
        let search = list.search_pattern();

        let contracts = sqlx::query_as::<_, Contract>(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE {conditions} \
             ORDER BY {order} LIMIT $6 OFFSET $7"
        ))
        .bind(filter.client_id)
        .bind(filter.status)
        .bind(filter.frequency)
        .bind(owner)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM contracts WHERE {conditions}"
        ))
        .bind(filter.client_id)
        .bind(filter.status)
        .bind(filter.frequency)
        .bind(owner)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(contracts, &pagination, total))
    }

    pub async fn get_contract(&self, viewer: &AuthUser, contract_id: Uuid) -> AppResult<Contract> {
        let owner = viewer.is_client().then_some(viewer.user_id);
        sqlx::query_as::<_, Contract>(&format!(
            r#"
            SELECT {CONTRACT_COLUMNS} FROM contracts
            WHERE id = $1
              AND ($2::uuid IS NULL OR client_id IN (SELECT id FROM clients WHERE user_id = $2))
            "#
        ))
        .bind(contract_id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Contract".to_string()))
    }

    pub async fn create_contract(
        &self,
        input: CreateContractInput,
        default_currency: &str,
    ) -> AppResult<Contract> {
        input.validate()?;

        let mut conn = self.db.acquire().await?;
        let contract = insert_contract(&mut conn, input.new_contract(default_currency)).await?;

        tracing::info!(contract_id = %contract.id, client_id = %contract.client_id, "contract created");
        Ok(contract)
    }

    pub async fn update_contract(
        &self,
        contract_id: Uuid,
        input: UpdateContractInput,
    ) -> AppResult<Contract> {
        input.validate()?;
        if let Some(rate) = input.monthly_rate {
            check_monthly_rate(rate)?;
        }

        let mut tx = self.db.begin().await?;

        let start_date = sqlx::query_scalar::<_, NaiveDate>(
            "SELECT start_date FROM contracts WHERE id = $1 FOR UPDATE",
        )
        .bind(contract_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Contract".to_string()))?;

        if let Some(end_date) = input.end_date {
            validate_date_range(start_date, end_date)
                .map_err(|m| AppError::invalid_field("end_date", m))?;
        }

        let contract = sqlx::query_as::<_, Contract>(&format!(
            r#"
            UPDATE contracts
            SET end_date = COALESCE($2, end_date),
                frequency = COALESCE($3, frequency),
                collection_days = COALESCE($4, collection_days),
                pass_time = COALESCE($5, pass_time),
                monthly_rate = COALESCE($6, monthly_rate),
                waste_types = COALESCE($7, waste_types),
                status = COALESCE($8, status),
                special_conditions = COALESCE($9, special_conditions),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CONTRACT_COLUMNS}
            "#
        ))
        .bind(contract_id)
        .bind(input.end_date)
        .bind(input.frequency)
        .bind(input.collection_days.as_ref().map(|d| serde_json::json!(d)))
        .bind(input.pass_time)
        .bind(input.monthly_rate)
        .bind(input.waste_types.as_ref().map(|w| serde_json::json!(w)))
        .bind(input.status)
        .bind(&input.special_conditions)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(contract)
    }

    pub async fn delete_contract(&self, contract_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM contracts WHERE id = $1")
            .bind(contract_id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::from_delete(e, "contract"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Contract".to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // Bins
    // ========================================================================

    pub async fn list_bins(
        &self,
        viewer: &AuthUser,
        list: &ListQuery,
        filter: &BinFilter,
    ) -> AppResult<PaginatedResponse<Bin>> {
        let pagination = list.pagination();
        let order = list.order_by(&["number", "installed_on", "status"], "installed_on DESC");
        let owner = viewer.is_client().then_some(viewer.user_id);
        let conditions = r#"
            ($1::uuid IS NULL OR client_id = $1)
            AND ($2::varchar IS NULL OR status = $2)
            AND ($3::varchar IS NULL OR bin_type = $3)
            AND ($4::uuid IS NULL OR client_id IN (SELECT id FROM clients WHERE user_id = $4))
            AND ($5::text IS NULL OR number ILIKE $5 OR location_note ILIKE $5)
        "#;
        let search = list.search_pattern();

        let bins = sqlx::query_as::<_, Bin>(&format!(
            "SELECT {BIN_COLUMNS} FROM bins WHERE {conditions} ORDER BY {order} LIMIT $6 OFFSET $7"
        ))
        .bind(filter.client_id)
        .bind(filter.status)
        .bind(filter.bin_type)
        .bind(owner)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM bins WHERE {conditions}"
        ))
        .bind(filter.client_id)
        .bind(filter.status)
        .bind(filter.bin_type)
        .bind(owner)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(bins, &pagination, total))
    }

    pub async fn get_bin(&self, viewer: &AuthUser, bin_id: Uuid) -> AppResult<Bin> {
        let owner = viewer.is_client().then_some(viewer.user_id);
        sqlx::query_as::<_, Bin>(&format!(
            r#"
            SELECT {BIN_COLUMNS} FROM bins
            WHERE id = $1
              AND ($2::uuid IS NULL OR client_id IN (SELECT id FROM clients WHERE user_id = $2))
            "#
        ))
        .bind(bin_id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Bin".to_string()))
    }

    pub async fn create_bin(&self, input: CreateBinInput) -> AppResult<Bin> {
        input.validate()?;

        let bin = sqlx::query_as::<_, Bin>(&format!(
            r#"
            INSERT INTO bins (client_id, number, bin_type, capacity_litres, installed_on, location_note)
            VALUES ($1, $2, $3, $4, COALESCE($5, CURRENT_DATE), $6)
            RETURNING {BIN_COLUMNS}
            "#
        ))
        .bind(input.client_id)
        .bind(input.number.trim())
        .bind(input.bin_type)
        .bind(input.capacity_litres.unwrap_or_else(|| input.bin_type.capacity_litres()))
        .bind(input.installed_on)
        .bind(&input.location_note)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match AppError::from_write(e, "number") {
            AppError::NotFound(_) => AppError::NotFound("Client".to_string()),
            other => other,
        })?;

        Ok(bin)
    }

    pub async fn update_bin(&self, bin_id: Uuid, input: UpdateBinInput) -> AppResult<Bin> {
        input.validate()?;

        sqlx::query_as::<_, Bin>(&format!(
            r#"
            UPDATE bins
            SET status = COALESCE($2, status),
                location_note = COALESCE($3, location_note),
                last_collection_at = COALESCE($4, last_collection_at)
            WHERE id = $1
            RETURNING {BIN_COLUMNS}
            "#
        ))
        .bind(bin_id)
        .bind(input.status)
        .bind(&input.location_note)
        .bind(input.last_collection_at)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Bin".to_string()))
    }

    pub async fn delete_bin(&self, bin_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM bins WHERE id = $1")
            .bind(bin_id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::from_delete(e, "bin"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Bin".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn contract_input(monthly_rate: &str) -> CreateContractInput {
        CreateContractInput {
            client_id: Uuid::new_v4(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: None,
            frequency: CollectionFrequency::Weekly,
            collection_days: vec!["monday".to_string()],
            pass_time: None,
            monthly_rate: Decimal::from_str(monthly_rate).unwrap(),
            currency: None,
            waste_types: vec![],
            special_conditions: Some("Gate closed after 18:00".to_string()),
        }
    }

    #[test]
    fn test_new_contract_keeps_special_conditions() {
        let input = contract_input("5000");
        let new = input.new_contract("XOF");

        assert_eq!(new.special_conditions, Some("Gate closed after 18:00"));
        assert_eq!(new.currency, "XOF");
        assert_eq!(new.end_date, default_contract_end(input.start_date));
    }

    #[test]
    fn test_monthly_rate_must_be_cents() {
        assert!(check_monthly_rate(Decimal::from_str("5000.50").unwrap()).is_ok());
        assert!(check_monthly_rate(Decimal::from_str("5000.505").unwrap()).is_err());
        assert!(check_monthly_rate(Decimal::from_str("-1").unwrap()).is_err());
    }
}
