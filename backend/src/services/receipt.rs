//! Payment receipts and their signatures

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use shared::codes::{generate_code, CodePrefix};
use shared::models::ReceiptType;

type HmacSha256 = Hmac<Sha256>;

const RECEIPT_COLUMNS: &str = "r.id, r.payment_id, r.number, r.receipt_type, r.content, r.signature, \
     r.sent, r.sent_at, r.recipient_email, r.recipient_sms, r.created_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Receipt {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub number: String,
    pub receipt_type: ReceiptType,
    pub content: serde_json::Value,
    pub signature: String,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub recipient_email: Option<String>,
    pub recipient_sms: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptVerification {
    pub receipt_id: Uuid,
    pub number: String,
    pub valid: bool,
}

/// Base64 HMAC-SHA256 of the serialized receipt content
pub fn sign_receipt(secret: &str, content: &serde_json::Value) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Configuration("Invalid receipt signing key".to_string()))?;
    mac.update(content.to_string().as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

pub fn verify_receipt(secret: &str, content: &serde_json::Value, signature: &str) -> bool {
    let Ok(expected) = BASE64.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(content.to_string().as_bytes());
    mac.verify_slice(&expected).is_ok()
}

pub(crate) struct NewReceipt<'a> {
    pub payment_id: Uuid,
    pub content: serde_json::Value,
    pub recipient_email: Option<&'a str>,
    pub recipient_sms: Option<&'a str>,
}

/// Writes the signed receipt for a payment. The content gets the receipt
/// number before it is signed.
pub(crate) async fn insert_receipt(
    conn: &mut PgConnection,
    secret: &str,
    new: NewReceipt<'_>,
) -> AppResult<Receipt> {
    let number = generate_code(CodePrefix::Receipt);
    let mut content = new.content;
    if let Some(map) = content.as_object_mut() {
        map.insert("receipt_number".to_string(), serde_json::json!(number));
    }
    let signature = sign_receipt(secret, &content)?;

    sqlx::query_as::<_, Receipt>(&format!(
        r#"
        INSERT INTO receipts AS r
            (payment_id, number, receipt_type, content, signature, recipient_email, recipient_sms)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {RECEIPT_COLUMNS}
        "#
    ))
    .bind(new.payment_id)
    .bind(&number)
    .bind(ReceiptType::default())
    .bind(&content)
    .bind(&signature)
    .bind(new.recipient_email)
    .bind(new.recipient_sms)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::from_write(e, "payment_id"))
}

/// Receipt service
#[derive(Clone)]
pub struct ReceiptService {
    db: PgPool,
}

impl ReceiptService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_receipt(&self, viewer: &AuthUser, receipt_id: Uuid) -> AppResult<Receipt> {
        self.fetch(viewer, "r.id = $1", receipt_id).await
    }

    pub async fn receipt_for_payment(&self, viewer: &AuthUser, payment_id: Uuid) -> AppResult<Receipt> {
        self.fetch(viewer, "r.payment_id = $1", payment_id).await
    }

    pub async fn verify(
        &self,
        viewer: &AuthUser,
        receipt_id: Uuid,
        secret: &str,
    ) -> AppResult<ReceiptVerification> {
        let receipt = self.get_receipt(viewer, receipt_id).await?;
        Ok(ReceiptVerification {
            receipt_id: receipt.id,
            valid: verify_receipt(secret, &receipt.content, &receipt.signature),
            number: receipt.number,
        })
    }

    async fn fetch(&self, viewer: &AuthUser, condition: &str, id: Uuid) -> AppResult<Receipt> {
        let owner = viewer.is_client().then_some(viewer.user_id);
        sqlx::query_as::<_, Receipt>(&format!(
            r#"
            SELECT {RECEIPT_COLUMNS}
            FROM receipts r
            JOIN payments p ON p.id = r.payment_id
            WHERE {condition}
              AND ($2::uuid IS NULL OR p.client_id IN (SELECT id FROM clients WHERE user_id = $2))
            "#
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Receipt".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_verifies() {
        let content = serde_json::json!({"payment_number": "PAY-0A1B2C3D4E", "amount": "14160.00"});
        let signature = sign_receipt("receipt-secret", &content).unwrap();
        assert!(verify_receipt("receipt-secret", &content, &signature));
        assert!(!verify_receipt("other-secret", &content, &signature));
    }

    #[test]
    fn test_tampered_content_fails() {
        let content = serde_json::json!({"amount": "14160.00"});
        let signature = sign_receipt("receipt-secret", &content).unwrap();
        let tampered = serde_json::json!({"amount": "1.00"});
        assert!(!verify_receipt("receipt-secret", &tampered, &signature));
        assert!(!verify_receipt("receipt-secret", &content, "not base64!"));
    }
}
