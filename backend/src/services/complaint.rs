//! Complaints about collection stops

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::services::listing::ListQuery;
use shared::codes::{generate_code, CodePrefix};
use shared::models::{ComplaintAction, ComplaintPriority, ComplaintStatus, ComplaintType};
use shared::types::PaginatedResponse;
use shared::validation::validate_satisfaction_score;

const COMPLAINT_COLUMNS: &str = "id, number, stop_id, client_id, complaint_type, description, \
     priority, status, opened_at, resolved_at, assignee_id, corrective_actions, satisfaction_score, \
     resolution_comment, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Complaint {
    pub id: Uuid,
    pub number: String,
    pub stop_id: Uuid,
    pub client_id: Uuid,
    pub complaint_type: ComplaintType,
    pub description: String,
    pub priority: ComplaintPriority,
    pub status: ComplaintStatus,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub assignee_id: Option<Uuid>,
    pub corrective_actions: Option<String>,
    pub satisfaction_score: Option<i32>,
    pub resolution_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateComplaintInput {
    pub stop_id: Uuid,
    pub complaint_type: ComplaintType,
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
    #[serde(default)]
    pub priority: ComplaintPriority,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateComplaintInput {
    pub complaint_type: Option<ComplaintType>,
    #[validate(length(min = 1, max = 2000))]
    pub description: Option<String>,
    pub priority: Option<ComplaintPriority>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ComplaintFilter {
    pub status: Option<ComplaintStatus>,
    pub priority: Option<ComplaintPriority>,
    pub complaint_type: Option<ComplaintType>,
    pub client_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AssignComplaintInput {
    pub assignee_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ResolveComplaintInput {
    pub corrective_actions: String,
    pub resolution_comment: Option<String>,
    pub satisfaction_score: Option<i32>,
}

/// Complaint service
#[derive(Clone)]
pub struct ComplaintService {
    db: PgPool,
}

impl ComplaintService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_complaints(
        &self,
        viewer: &AuthUser,
        list: &ListQuery,
        filter: &ComplaintFilter,
    ) -> AppResult<PaginatedResponse<Complaint>> {
        let pagination = list.pagination();
        let order = list.order_by(&["opened_at", "priority", "status", "number"], "opened_at DESC");
        let owner = viewer.is_client().then_some(viewer.user_id);
        let conditions = r#"
            ($1::varchar IS NULL OR status = $1)
            AND ($2::varchar IS NULL OR priority = $2)
            AND ($3::varchar IS NULL OR complaint_type = $3)
            AND ($4::uuid IS NULL OR client_id = $4)
            AND ($5::uuid IS NULL OR assignee_id = $5)
            AND ($6::uuid IS NULL OR client_id IN (SELECT id FROM clients WHERE user_id = $6))
            AND ($7::text IS NULL OR number ILIKE $7 OR description ILIKE $7)
        "#;
        let search = list.search_pattern();

        let complaints = sqlx::query_as::<_, Complaint>(&format!(
            "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE {conditions} \
             ORDER BY {order} LIMIT $8 OFFSET $9"
        ))
        .bind(filter.status)
        .bind(filter.priority)
        .bind(filter.complaint_type)
        .bind(filter.client_id)
        .bind(filter.assignee_id)
        .bind(owner)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM complaints WHERE {conditions}"
        ))
        .bind(filter.status)
        .bind(filter.priority)
        .bind(filter.complaint_type)
        .bind(filter.client_id)
        .bind(filter.assignee_id)
        .bind(owner)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        Ok(PaginatedResponse::new(complaints, &pagination, total))
    }

    pub async fn get_complaint(&self, viewer: &AuthUser, complaint_id: Uuid) -> AppResult<Complaint> {
        let owner = viewer.is_client().then_some(viewer.user_id);
        sqlx::query_as::<_, Complaint>(&format!(
            "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = $1 \
             AND ($2::uuid IS NULL OR client_id IN (SELECT id FROM clients WHERE user_id = $2))"
        ))
        .bind(complaint_id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Complaint".to_string()))
    }

    /// The complaint is attached to the stop's client. A client may only
    /// complain about their own stops.
    pub async fn create_complaint(
        &self,
        author: &AuthUser,
        input: CreateComplaintInput,
    ) -> AppResult<Complaint> {
        input.validate()?;

        let owner = author.is_client().then_some(author.user_id);
        let client_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT s.client_id
            FROM collection_stops s
            JOIN clients c ON c.id = s.client_id
            WHERE s.id = $1 AND ($2::uuid IS NULL OR c.user_id = $2)
            "#,
        )
        .bind(input.stop_id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stop".to_string()))?;

        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            r#"
            INSERT INTO complaints (number, stop_id, client_id, complaint_type, description, priority)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COMPLAINT_COLUMNS}
            "#
        ))
        .bind(generate_code(CodePrefix::Complaint))
        .bind(input.stop_id)
        .bind(client_id)
        .bind(input.complaint_type)
        .bind(&input.description)
        .bind(input.priority)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_write(e, "number"))?;

        tracing::info!(
            complaint_id = %complaint.id,
            number = %complaint.number,
            priority = %complaint.priority,
            "complaint opened"
        );
        Ok(complaint)
    }

    pub async fn update_complaint(
        &self,
        complaint_id: Uuid,
        input: UpdateComplaintInput,
    ) -> AppResult<Complaint> {
        input.validate()?;

        sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET complaint_type = COALESCE($2, complaint_type),
                description = COALESCE($3, description),
                priority = COALESCE($4, priority),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COMPLAINT_COLUMNS}
            "#
        ))
        .bind(complaint_id)
        .bind(input.complaint_type)
        .bind(&input.description)
        .bind(input.priority)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Complaint".to_string()))
    }

    pub async fn assign(&self, complaint_id: Uuid, input: AssignComplaintInput) -> AppResult<Complaint> {
        let mut tx = self.db.begin().await?;
        let complaint = Self::lock(&mut tx, complaint_id).await?;
        let next = complaint.status.apply(ComplaintAction::Assign)?;

        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            "UPDATE complaints SET status = $2, assignee_id = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {COMPLAINT_COLUMNS}"
        ))
        .bind(complaint_id)
        .bind(next)
        .bind(input.assignee_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match AppError::from_write(e, "assignee_id") {
            AppError::NotFound(_) => AppError::NotFound("User".to_string()),
            other => other,
        })?;

        tx.commit().await?;
        Ok(complaint)
    }

    pub async fn resolve(&self, complaint_id: Uuid, input: ResolveComplaintInput) -> AppResult<Complaint> {
        if input.corrective_actions.trim().is_empty() {
            return Err(AppError::validation(
                "corrective_actions",
                "Corrective actions are required",
                "Les actions correctives sont obligatoires",
            ));
        }
        if let Some(score) = input.satisfaction_score {
            validate_satisfaction_score(score)
                .map_err(|m| AppError::invalid_field("satisfaction_score", m))?;
        }

        let mut tx = self.db.begin().await?;
        let complaint = Self::lock(&mut tx, complaint_id).await?;
        let next = complaint.status.apply(ComplaintAction::Resolve)?;

        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            r#"
            UPDATE complaints
            SET status = $2,
                resolved_at = NOW(),
                corrective_actions = $3,
                resolution_comment = $4,
                satisfaction_score = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COMPLAINT_COLUMNS}
            "#
        ))
        .bind(complaint_id)
        .bind(next)
        .bind(&input.corrective_actions)
        .bind(&input.resolution_comment)
        .bind(input.satisfaction_score)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(complaint_id = %complaint_id, "complaint resolved");
        Ok(complaint)
    }

    pub async fn close(&self, complaint_id: Uuid) -> AppResult<Complaint> {
        let mut tx = self.db.begin().await?;
        let complaint = Self::lock(&mut tx, complaint_id).await?;
        let next = complaint.status.apply(ComplaintAction::Close)?;

        let complaint = sqlx::query_as::<_, Complaint>(&format!(
            "UPDATE complaints SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {COMPLAINT_COLUMNS}"
        ))
        .bind(complaint_id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(complaint)
    }

    async fn lock(conn: &mut PgConnection, complaint_id: Uuid) -> AppResult<Complaint> {
        sqlx::query_as::<_, Complaint>(&format!(
            "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = $1 FOR UPDATE"
        ))
        .bind(complaint_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Complaint".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_input_defaults_priority() {
        let input: CreateComplaintInput = serde_json::from_value(serde_json::json!({
            "stop_id": Uuid::nil(),
            "complaint_type": "missed_collection",
            "description": "Le camion n'est pas passé"
        }))
        .unwrap();
        assert_eq!(input.priority, ComplaintPriority::Normal);
        assert!(input.validate().is_ok());
    }
}
