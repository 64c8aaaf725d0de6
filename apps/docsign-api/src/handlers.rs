//! HTTP handlers for DocSign API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use docsign_core::{DocumentProgress, NewDocument, ValidationError};
use shared_types::{
    AuditEvent, Document, FinalizeResult, LinkRecipient, PositionUpdate, Signature, SigningLink,
    SigningRequest, StatusUpdate,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::new(data)))
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Upload a PDF
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadDocumentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Document>>), ApiError> {
    let pdf = BASE64
        .decode(req.pdf_base64.trim())
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid PDF base64: {}", e)))?;

    let document = state
        .store
        .upload_document(NewDocument {
            title: req.title,
            file_name: req.file_name,
            pdf,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(document))))
}

pub async fn list_documents(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Document>> {
    ok(state.store.list_documents().await?)
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Document> {
    ok(state.store.get_document(id).await?)
}

fn pdf_response(file_name: &str, bytes: Vec<u8>) -> (StatusCode, [(String, String); 2], Vec<u8>) {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE.to_string(), "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION.to_string(),
                format!("inline; filename=\"{}\"", file_name.replace('"', "")),
            ),
        ],
        bytes,
    )
}

/// The uploaded PDF, for rendering pages in the editor
pub async fn get_document_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, [(String, String); 2], Vec<u8>), ApiError> {
    let document = state.store.get_document(id).await?;
    let bytes = state.store.source_pdf(id).await?;
    Ok(pdf_response(&document.file_name, bytes))
}

pub async fn document_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<DocumentProgress> {
    let signatures = state.store.fetch_signatures(id).await?;
    ok(DocumentProgress::from_signatures(&signatures))
}

/// Burn every signed signature into a new PDF
pub async fn finalize_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<FinalizeResult> {
    ok(state.store.finalize_document(id).await?)
}

pub async fn audit_trail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<AuditEvent>> {
    ok(state.store.audit_trail(id).await?)
}

pub async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, [(String, String); 2], Vec<u8>), ApiError> {
    let bytes = state.store.artifact(id).await?;
    Ok(pdf_response(&format!("signed-{}.pdf", id), bytes))
}

pub async fn list_signatures(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Vec<Signature>> {
    ok(state.store.fetch_signatures(document_id).await?)
}

/// Add a placeholder, or sign directly when the body carries an image
pub async fn create_signature(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSignatureRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Signature>>), ApiError> {
    let signature = state
        .store
        .create_signature(req.document_id, req.signature)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(signature))))
}

pub async fn update_signature_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Signature> {
    ok(state.store.update_signature_status(id, update).await?)
}

pub async fn update_signature_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<PositionUpdate>,
) -> Result<StatusCode, ApiError> {
    state.store.update_signature_position(id, update).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_signature(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_signature(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Issue a public signing link; the placement is locked from here on
pub async fn send_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(recipient): Json<LinkRecipient>,
) -> ApiResult<SigningLink> {
    ok(state.store.generate_signing_link(id, recipient).await?)
}

pub async fn get_signing_request(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<SigningRequest> {
    ok(state.store.get_signing_request(&token).await?)
}

pub async fn submit_public_signature(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<PublicSignRequest>,
) -> ApiResult<Signature> {
    let image = req.signature_image.ok_or(ValidationError::MissingImage)?;
    ok(state.store.submit_signature(&token, image).await?)
}

pub async fn reject_public_signature(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<Signature> {
    let reason = req.rejection_reason.unwrap_or_default();
    ok(state.store.reject_signing_request(&token, reason).await?)
}
