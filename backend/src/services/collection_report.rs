//! Daily collection reports of payment collectors

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::services::listing::ListQuery;
use shared::models::{CollectionTotals, PaymentChannel, UserType};
use shared::types::PaginatedResponse;

const REPORT_COLUMNS: &str = "id, agent_id, report_date, zone_id, payment_count, total_amount, \
     cash_amount, mobile_money_amount, transmitted, transmitted_at, validated, observations, \
     created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CollectionReport {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub report_date: NaiveDate,
    pub zone_id: Option<Uuid>,
    pub payment_count: i32,
    pub total_amount: Decimal,
    pub cash_amount: Decimal,
    pub mobile_money_amount: Decimal,
    pub transmitted: bool,
    pub transmitted_at: Option<DateTime<Utc>>,
    pub validated: bool,
    pub observations: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateReportInput {
    /// Defaults to the caller
    pub agent_id: Option<Uuid>,
    pub report_date: Option<NaiveDate>,
    pub zone_id: Option<Uuid>,
    pub observations: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportFilter {
    pub agent_id: Option<Uuid>,
    pub report_date: Option<NaiveDate>,
    pub transmitted: Option<bool>,
    pub validated: Option<bool>,
}

/// Collection report service
#[derive(Clone)]
pub struct CollectionReportService {
    db: PgPool,
}

impl CollectionReportService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Collectors only see their own reports
    pub async fn list_reports(
        &self,
        viewer: &AuthUser,
        list: &ListQuery,
        filter: &ReportFilter,
    ) -> AppResult<PaginatedResponse<CollectionReport>> {
        let pagination = list.pagination();
        let order = list.order_by(&["report_date", "total_amount", "created_at"], "report_date DESC");
        let own = (viewer.user_type == UserType::PaymentCollector).then_some(viewer.user_id);
        let conditions = r#"
            ($1::uuid IS NULL OR agent_id = $1)
            AND ($2::date IS NULL OR report_date = $2)
            AND ($3::boolean IS NULL OR transmitted = $3)
            AND ($4::boolean IS NULL OR validated = $4)
            AND ($5::uuid IS NULL OR agent_id = $5)
        "#;

        let reports = sqlx::query_as::<_, CollectionReport>(&format!(
            "SELECT {REPORT_COLUMNS} FROM agent_collection_reports WHERE {conditions} \
             ORDER BY {order} LIMIT $6 OFFSET $7"
        ))
        .bind(filter.agent_id)
        .bind(filter.report_date)
        .bind(filter.transmitted)
        .bind(filter.validated)
        .bind(own)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM agent_collection_reports WHERE {conditions}"
        ))
        .bind(filter.agent_id)
        .bind(filter.report_date)
        .bind(filter.transmitted)
        .bind(filter.validated)
        .bind(own)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(reports, &pagination, total))
    }

    pub async fn get_report(&self, viewer: &AuthUser, report_id: Uuid) -> AppResult<CollectionReport> {
        let own = (viewer.user_type == UserType::PaymentCollector).then_some(viewer.user_id);
        sqlx::query_as::<_, CollectionReport>(&format!(
            "SELECT {REPORT_COLUMNS} FROM agent_collection_reports \
             WHERE id = $1 AND ($2::uuid IS NULL OR agent_id = $2)"
        ))
        .bind(report_id)
        .bind(own)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Collection report".to_string()))
    }

    /// Aggregates the agent's validated payments for the day and upserts the
    /// report. A validated report is frozen.
    pub async fn generate(
        &self,
        caller: &AuthUser,
        input: GenerateReportInput,
        today: NaiveDate,
    ) -> AppResult<CollectionReport> {
        let agent_id = match (caller.user_type, input.agent_id) {
            (UserType::PaymentCollector, Some(other)) if other != caller.user_id => {
                return Err(AppError::InsufficientPermissions)
            }
            (_, Some(agent_id)) => agent_id,
            (_, None) => caller.user_id,
        };
        let report_date = input.report_date.unwrap_or(today);

        let mut tx = self.db.begin().await?;

        let collected = sqlx::query_as::<_, (PaymentChannel, Decimal)>(
            r#"
            SELECT channel, amount FROM payments
            WHERE collecting_agent_id = $1 AND status = 'validated' AND paid_at::date = $2
            "#,
        )
        .bind(agent_id)
        .bind(report_date)
        .fetch_all(&mut *tx)
        .await?;

        let totals: CollectionTotals = collected.into_iter().collect();

        let report = sqlx::query_as::<_, CollectionReport>(&format!(
            r#"
            INSERT INTO agent_collection_reports AS r
                (agent_id, report_date, zone_id, payment_count, total_amount, cash_amount,
                 mobile_money_amount, observations)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (agent_id, report_date) DO UPDATE
            SET zone_id = COALESCE(EXCLUDED.zone_id, r.zone_id),
                payment_count = EXCLUDED.payment_count,
                total_amount = EXCLUDED.total_amount,
                cash_amount = EXCLUDED.cash_amount,
                mobile_money_amount = EXCLUDED.mobile_money_amount,
                observations = COALESCE(EXCLUDED.observations, r.observations),
                updated_at = NOW()
            WHERE NOT r.validated
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(agent_id)
        .bind(report_date)
        .bind(input.zone_id)
        .bind(totals.payment_count)
        .bind(totals.total_amount)
        .bind(totals.cash_amount)
        .bind(totals.mobile_money_amount)
        .bind(&input.observations)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, "agent_id"))?
        .ok_or_else(|| {
            AppError::InvalidStateTransition("cannot regenerate a validated report".to_string())
        })?;

        tx.commit().await?;

        tracing::info!(
            agent_id = %agent_id,
            report_date = %report_date,
            payments = totals.payment_count,
            total = %totals.total_amount,
            "collection report generated"
        );
        Ok(report)
    }

    /// Only the reporting agent transmits
    pub async fn transmit(&self, agent: &AuthUser, report_id: Uuid) -> AppResult<CollectionReport> {
        let report = self.get_report(agent, report_id).await?;
        if report.agent_id != agent.user_id {
            return Err(AppError::Conflict {
                resource: "collection_report".to_string(),
                message: "Only the reporting agent can transmit this report".to_string(),
                message_fr: "Seul l'agent concerné peut transmettre ce rapport".to_string(),
            });
        }
        if report.transmitted {
            return Err(AppError::InvalidStateTransition(
                "cannot transmit a report that is already transmitted".to_string(),
            ));
        }

        let report = sqlx::query_as::<_, CollectionReport>(&format!(
            "UPDATE agent_collection_reports SET transmitted = TRUE, transmitted_at = NOW(), \
             updated_at = NOW() WHERE id = $1 AND NOT transmitted RETURNING {REPORT_COLUMNS}"
        ))
        .bind(report_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            AppError::InvalidStateTransition("cannot transmit a report that is already transmitted".to_string())
        })?;

        Ok(report)
    }

    pub async fn validate(&self, report_id: Uuid) -> AppResult<CollectionReport> {
        let report = sqlx::query_as::<_, CollectionReport>(&format!(
            "UPDATE agent_collection_reports SET validated = TRUE, updated_at = NOW() \
             WHERE id = $1 AND transmitted AND NOT validated RETURNING {REPORT_COLUMNS}"
        ))
        .bind(report_id)
        .fetch_optional(&self.db)
        .await?;

        match report {
            Some(report) => {
                tracing::info!(report_id = %report_id, agent_id = %report.agent_id, "collection report validated");
                Ok(report)
            }
            None => {
                let state = sqlx::query_as::<_, (bool, bool)>(
                    "SELECT transmitted, validated FROM agent_collection_reports WHERE id = $1",
                )
                .bind(report_id)
                .fetch_optional(&self.db)
                .await?;
                Err(match state {
                    None => AppError::NotFound("Collection report".to_string()),
                    Some((_, true)) => AppError::InvalidStateTransition(
                        "cannot validate a report that is already validated".to_string(),
                    ),
                    Some(_) => AppError::InvalidStateTransition(
                        "cannot validate a report that has not been transmitted".to_string(),
                    ),
                })
            }
        }
    }
}
