//! Data models for DocSign API

use chrono::{DateTime, Utc};
use docsign_core::DocsignError;
use serde::{Deserialize, Serialize};
use shared_types::{
    AuditAction, AuditEvent, Coordinates, Document, NewSignature, PageSize, Signature,
    SignatureImage, SignatureStatus,
};
use sqlx::FromRow;
use uuid::Uuid;

/// Every JSON response is wrapped as `{ "data": ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Request to upload a PDF
#[derive(Debug, Clone, Deserialize)]
pub struct UploadDocumentRequest {
    #[serde(default)]
    pub title: String,
    pub file_name: String,
    pub pdf_base64: String,
}

/// Request to add a placeholder, or to sign directly when an image is present
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSignatureRequest {
    pub document_id: Uuid,
    #[serde(flatten)]
    pub signature: NewSignature,
}

/// Submission from the public signing page
#[derive(Debug, Clone, Deserialize)]
pub struct PublicSignRequest {
    #[serde(default, alias = "signature_data")]
    pub signature_image: Option<SignatureImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectRequest {
    #[serde(default, alias = "reason")]
    pub rejection_reason: Option<String>,
}

fn corrupt(table: &str, detail: impl std::fmt::Display) -> DocsignError {
    DocsignError::Unavailable(format!("corrupt {} row: {}", table, detail))
}

fn parse_id(table: &str, raw: &str) -> Result<Uuid, DocsignError> {
    Uuid::parse_str(raw).map_err(|e| corrupt(table, e))
}

/// Document stored in database
#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: String,
    pub title: String,
    pub file_name: String,
    pub page_sizes_json: String,
    pub created_at: DateTime<Utc>,
    pub signed_file_url: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbDocument> for Document {
    type Error = DocsignError;

    fn try_from(row: DbDocument) -> Result<Self, Self::Error> {
        let page_sizes: Vec<PageSize> =
            serde_json::from_str(&row.page_sizes_json).map_err(|e| corrupt("documents", e))?;
        Ok(Document {
            id: parse_id("documents", &row.id)?,
            title: row.title,
            file_name: row.file_name,
            page_sizes,
            created_at: row.created_at,
            signed_file_url: row.signed_file_url,
            finalized_at: row.finalized_at,
        })
    }
}

/// Signature stored in database
#[derive(Debug, Clone, FromRow)]
pub struct DbSignature {
    pub id: String,
    pub document_id: String,
    pub page_number: i64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub signer_name: String,
    pub signer_email: Option<String>,
    pub status: String,
    pub signature_image: Option<String>,
    pub rejection_reason: Option<String>,
    pub link_sent: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbSignature> for Signature {
    type Error = DocsignError;

    fn try_from(row: DbSignature) -> Result<Self, Self::Error> {
        let status: SignatureStatus = row.status.parse().map_err(|e| corrupt("signatures", e))?;
        let page_number = u32::try_from(row.page_number).map_err(|e| corrupt("signatures", e))?;
        Ok(Signature {
            id: parse_id("signatures", &row.id)?,
            document_id: parse_id("signatures", &row.document_id)?,
            page_number,
            coordinates: Coordinates::new(row.x, row.y, row.width, row.height),
            signer_name: row.signer_name,
            signer_email: row.signer_email,
            status,
            signature_image: row.signature_image.map(SignatureImage::from_data_url),
            rejection_reason: row.rejection_reason,
            link_sent: row.link_sent,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Audit event stored in database
#[derive(Debug, Clone, FromRow)]
pub struct DbAuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    pub document_id: String,
    pub signature_id: Option<String>,
    pub previous_hash: Option<String>,
    pub details: Option<String>,
}

impl TryFrom<DbAuditEvent> for AuditEvent {
    type Error = DocsignError;

    fn try_from(row: DbAuditEvent) -> Result<Self, Self::Error> {
        let action = AuditAction::parse(&row.action)
            .ok_or_else(|| corrupt("audit_events", format!("unknown action {}", row.action)))?;
        Ok(AuditEvent {
            event_id: parse_id("audit_events", &row.event_id)?,
            timestamp: row.timestamp,
            action,
            actor: row.actor,
            document_id: parse_id("audit_events", &row.document_id)?,
            signature_id: row
                .signature_id
                .as_deref()
                .map(|id| parse_id("audit_events", id))
                .transpose()?,
            previous_hash: row.previous_hash,
            details: row.details,
        })
    }
}
