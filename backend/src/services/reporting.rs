//! Reporting service for the dashboard and data export

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::models::{average_completion_rate, PaymentChannel, ReportPeriod};
use shared::types::DateRange;

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

/// `period`, `start_date` and `end_date` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub period: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ReportQuery {
    pub fn period(&self) -> AppResult<ReportPeriod> {
        let period = ReportPeriod::from_query(self.period.as_deref(), self.start_date, self.end_date)
            .map_err(|m| AppError::invalid_field("period", m))?;
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AppError::validation(
                    "end_date",
                    "End date must be on or after start date",
                    "La date de fin doit être postérieure ou égale à la date de début",
                ));
            }
        }
        Ok(period)
    }
}

/// Validated revenue through one channel
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ChannelTotal {
    pub channel: PaymentChannel,
    pub payment_count: i64,
    pub amount: Decimal,
}

/// Money collected by one field collector
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AgentTotal {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub payment_count: i64,
    pub amount: Decimal,
}

/// Dashboard metrics
#[derive(Debug, Serialize)]
pub struct DashboardMetrics {
    pub period: &'static str,
    pub range: DateRange,
    pub active_clients: i64,
    pub active_agents: i64,
    pub pending_rounds: i64,
    pub zones: i64,
    pub pending_payments: i64,
    pub revenue: Decimal,
    pub payments_by_channel: Vec<ChannelTotal>,
    pub completed_stops: i64,
    pub average_completion_rate: Decimal,
    pub overdue_invoices: i64,
    pub new_clients: i64,
    pub collected_by_agent: Vec<AgentTotal>,
}

/// One line of the payment export
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PaymentExportRow {
    pub number: String,
    pub invoice_number: String,
    pub client_code: String,
    pub amount: Decimal,
    pub channel: PaymentChannel,
    pub status: String,
    pub paid_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub collecting_agent: Option<String>,
    pub transaction_reference: Option<String>,
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get dashboard metrics for a period
    pub async fn dashboard(&self, period: ReportPeriod, today: NaiveDate) -> AppResult<DashboardMetrics> {
        let range = period.bounds(today);

        let (active_clients, active_agents, pending_rounds, zones, pending_payments, new_clients) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM clients WHERE status = 'active'),
                    (SELECT COUNT(*) FROM agents WHERE status = 'active'),
                    (SELECT COUNT(*) FROM collection_rounds WHERE status IN ('planned', 'in_progress')),
                    (SELECT COUNT(*) FROM zones),
                    (SELECT COUNT(*) FROM payments WHERE status IN ('pending', 'under_verification')),
                    (SELECT COUNT(*) FROM clients WHERE registration_date BETWEEN $1 AND $2)
                "#,
            )
            .bind(range.start)
            .bind(range.end)
            .fetch_one(&self.db)
            .await?;

        // Validated revenue in the period, by channel
        let payments_by_channel = sqlx::query_as::<_, ChannelTotal>(
            r#"
            SELECT channel, COUNT(*) AS payment_count, COALESCE(SUM(amount), 0) AS amount
            FROM payments
            WHERE status = 'validated' AND validated_at::date BETWEEN $1 AND $2
            GROUP BY channel
            ORDER BY amount DESC
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;
        let revenue = payments_by_channel.iter().map(|c| c.amount).sum();

        let completed_stops: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM collection_stops WHERE status = 'completed' \
             AND departed_at::date BETWEEN $1 AND $2",
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.db)
        .await?;

        let completed_rounds: Vec<Decimal> = sqlx::query_scalar(
            "SELECT COALESCE(completion_rate, 0) FROM collection_rounds \
             WHERE status = 'completed' AND scheduled_date BETWEEN $1 AND $2",
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        let overdue_invoices: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM invoices WHERE due_date < $1 AND status NOT IN ('paid', 'cancelled', 'draft')",
        )
        .bind(today)
        .fetch_one(&self.db)
        .await?;

        let collected_by_agent = sqlx::query_as::<_, AgentTotal>(
            r#"
            SELECT p.collecting_agent_id AS agent_id,
                   TRIM(u.first_name || ' ' || u.last_name) AS agent_name,
                   COUNT(*) AS payment_count,
                   COALESCE(SUM(p.amount), 0) AS amount
            FROM payments p
            JOIN users u ON u.id = p.collecting_agent_id
            WHERE p.status = 'validated' AND p.validated_at::date BETWEEN $1 AND $2
            GROUP BY p.collecting_agent_id, u.first_name, u.last_name
            ORDER BY amount DESC
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        Ok(DashboardMetrics {
            period: period.name(),
            range,
            active_clients,
            active_agents,
            pending_rounds,
            zones,
            pending_payments,
            revenue,
            payments_by_channel,
            completed_stops,
            average_completion_rate: average_completion_rate(&completed_rounds),
            overdue_invoices,
            new_clients,
            collected_by_agent,
        })
    }

    /// Payments made in the period, oldest first
    pub async fn payment_export(&self, period: ReportPeriod, today: NaiveDate) -> AppResult<Vec<PaymentExportRow>> {
        let range = period.bounds(today);

        let rows = sqlx::query_as::<_, PaymentExportRow>(
            r#"
            SELECT p.number, i.number AS invoice_number, c.code AS client_code, p.amount,
                   p.channel, p.status, p.paid_at, p.validated_at,
                   NULLIF(TRIM(COALESCE(u.first_name, '') || ' ' || COALESCE(u.last_name, '')), '')
                       AS collecting_agent,
                   p.transaction_reference
            FROM payments p
            JOIN invoices i ON i.id = p.invoice_id
            JOIN clients c ON c.id = p.client_id
            LEFT JOIN users u ON u.id = p.collecting_agent_id
            WHERE p.paid_at::date BETWEEN $1 AND $2
            ORDER BY p.paid_at
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Export report data as CSV
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_report_query_rejects_reversed_range() {
        let query = ReportQuery {
            period: Some("custom".to_string()),
            start_date: NaiveDate::from_ymd_opt(2026, 5, 10),
            end_date: NaiveDate::from_ymd_opt(2026, 5, 1),
        };
        assert!(query.period().is_err());
        assert_eq!(ReportQuery::default().period().unwrap(), ReportPeriod::Month);
    }

    #[test]
    fn test_export_to_csv() {
        #[derive(Serialize)]
        struct Row {
            number: &'static str,
            amount: Decimal,
        }
        let csv = ReportingService::export_to_csv(&[Row {
            number: "PAY-0A1B2C3D4E",
            amount: Decimal::from_str("14160.00").unwrap(),
        }])
        .unwrap();
        assert_eq!(csv, "number,amount\nPAY-0A1B2C3D4E,14160.00\n");
    }
}
