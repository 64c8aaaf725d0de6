//! The persistence seam and an in-memory implementation of it
//!
//! Stores enforce the same rules as the editor: a locked placement cannot be
//! moved or deleted, status changes go through the lifecycle checks, and
//! every mutation appends to the document's audit chain.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_pdf::PdfDocument;
use shared_types::{
    AuditAction, AuditChain, AuditEvent, Document, DocumentId, FinalizeResult, LinkRecipient,
    NewSignature, PositionUpdate, Signature, SignatureId, SignatureImage, SignatureStatus,
    SigningLink, SigningRequest, StatusUpdate,
};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PlacementPolicy;
use crate::error::{DocsignError, Result, ValidationError};
use crate::finalize::{artifact_url, render_signed_pdf, signed_fingerprint};
use crate::lifecycle::{
    apply_position_update, apply_status_update, create_signature, ensure_unlocked, Actor,
};
use crate::links::{check_link, issue_link};

/// Actor recorded in the audit trail for owner actions
pub const OWNER_ACTOR: &str = "owner";

/// An uploaded PDF before it is stored
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub file_name: String,
    pub pdf: Vec<u8>,
}

/// Parse an upload and build its document record
pub fn prepare_document(upload: &NewDocument, now: DateTime<Utc>) -> Result<Document> {
    let pdf = PdfDocument::from_bytes(&upload.pdf)
        .map_err(|e| ValidationError::InvalidPdf(e.to_string()))?;
    let page_sizes = pdf
        .page_sizes()
        .map_err(|e| ValidationError::InvalidPdf(e.to_string()))?;
    if page_sizes.is_empty() {
        return Err(ValidationError::InvalidPdf("document has no pages".to_string()).into());
    }

    let file_name = upload.file_name.trim().to_string();
    let title = match upload.title.trim() {
        "" => file_name.trim_end_matches(".pdf").to_string(),
        title => title.to_string(),
    };

    Ok(Document {
        id: Uuid::new_v4(),
        title,
        file_name,
        page_sizes,
        created_at: now,
        signed_file_url: None,
        finalized_at: None,
    })
}

/// Audit details for a placement change
pub fn position_details(update: &PositionUpdate) -> Option<String> {
    serde_json::to_string(update).ok()
}

#[async_trait]
pub trait SignatureStore: Send + Sync {
    /// Store an uploaded PDF
    async fn upload_document(&self, upload: NewDocument) -> Result<Document>;

    async fn list_documents(&self) -> Result<Vec<Document>>;

    async fn get_document(&self, document_id: DocumentId) -> Result<Document>;

    /// The PDF as uploaded, never modified by finalization
    async fn source_pdf(&self, document_id: DocumentId) -> Result<Vec<u8>>;

    /// Signatures of a document, oldest first
    async fn fetch_signatures(&self, document_id: DocumentId) -> Result<Vec<Signature>>;

    async fn create_signature(
        &self,
        document_id: DocumentId,
        new: NewSignature,
    ) -> Result<Signature>;

    /// Owner status change
    async fn update_signature_status(
        &self,
        signature_id: SignatureId,
        update: StatusUpdate,
    ) -> Result<Signature>;

    /// Persist a committed placement. Fails with `LockedPlacement` when the
    /// signature can no longer move, leaving the stored coordinates unchanged.
    async fn update_signature_position(
        &self,
        signature_id: SignatureId,
        update: PositionUpdate,
    ) -> Result<()>;

    async fn delete_signature(&self, signature_id: SignatureId) -> Result<()>;

    /// Issue a public link and lock the placement
    async fn generate_signing_link(
        &self,
        signature_id: SignatureId,
        recipient: LinkRecipient,
    ) -> Result<SigningLink>;

    /// Burn every signed signature into a new artifact, or return the
    /// existing artifact when the signed set has not changed
    async fn finalize_document(&self, document_id: DocumentId) -> Result<FinalizeResult>;

    async fn get_signing_request(&self, token: &str) -> Result<SigningRequest>;

    async fn submit_signature(&self, token: &str, image: SignatureImage) -> Result<Signature>;

    async fn reject_signing_request(&self, token: &str, reason: String) -> Result<Signature>;

    async fn audit_trail(&self, document_id: DocumentId) -> Result<Vec<AuditEvent>>;

    /// Bytes of a finalized PDF
    async fn artifact(&self, artifact_id: Uuid) -> Result<Vec<u8>>;
}

struct StoredDocument {
    document: Document,
    pdf: Vec<u8>,
    /// Current artifact id and the fingerprint of the signed set it was made from
    current_artifact: Option<(Uuid, String)>,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<DocumentId, StoredDocument>,
    signatures: HashMap<SignatureId, Signature>,
    tokens: HashMap<String, SignatureId>,
    artifacts: HashMap<Uuid, Vec<u8>>,
    audit: HashMap<DocumentId, AuditChain>,
}

impl MemoryState {
    fn document(&self, id: DocumentId) -> Result<&StoredDocument> {
        self.documents
            .get(&id)
            .ok_or_else(|| DocsignError::not_found(format!("document {}", id)))
    }

    fn signature(&self, id: SignatureId) -> Result<&Signature> {
        self.signatures
            .get(&id)
            .ok_or_else(|| DocsignError::not_found(format!("signature {}", id)))
    }

    fn by_token(&self, token: &str) -> Result<&Signature> {
        let id = self
            .tokens
            .get(token)
            .ok_or_else(|| DocsignError::not_found("signing link"))?;
        self.signature(*id)
    }

    fn signatures_of(&self, document_id: DocumentId) -> Vec<Signature> {
        let mut list: Vec<Signature> = self
            .signatures
            .values()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        list
    }

    fn record(
        &mut self,
        document_id: DocumentId,
        action: AuditAction,
        actor: &str,
        signature_id: Option<SignatureId>,
        details: Option<String>,
    ) {
        self.audit
            .entry(document_id)
            .or_insert_with(|| AuditChain::new(document_id))
            .append(action, actor, signature_id, details);
    }
}

/// Store backed by in-process maps
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    policy: PlacementPolicy,
    public_base_url: String,
}

impl MemoryStore {
    pub fn new(policy: PlacementPolicy, public_base_url: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            policy,
            public_base_url: public_base_url.into(),
        }
    }

    pub fn policy(&self) -> &PlacementPolicy {
        &self.policy
    }

    async fn resolve_link(
        &self,
        token: &str,
        update: StatusUpdate,
        action: AuditAction,
    ) -> Result<Signature> {
        let mut state = self.state.write().await;
        let current = state.by_token(token)?.clone();
        let now = Utc::now();
        check_link(&current, now)?;

        let next = apply_status_update(&current, Actor::ExternalSigner, &update, now)?;
        state.signatures.insert(next.id, next.clone());
        state.record(
            next.document_id,
            action,
            &next.signer_name,
            Some(next.id),
            next.rejection_reason.clone(),
        );
        info!(signature_id = %next.id, status = %next.status, "public signing request resolved");
        Ok(next)
    }
}

#[async_trait]
impl SignatureStore for MemoryStore {
    async fn upload_document(&self, upload: NewDocument) -> Result<Document> {
        let document = prepare_document(&upload, Utc::now())?;
        let mut state = self.state.write().await;
        state.documents.insert(
            document.id,
            StoredDocument {
                document: document.clone(),
                pdf: upload.pdf,
                current_artifact: None,
            },
        );
        state.record(
            document.id,
            AuditAction::DocumentUploaded,
            OWNER_ACTOR,
            None,
            Some(document.file_name.clone()),
        );
        info!(document_id = %document.id, pages = document.page_count(), "document uploaded");
        Ok(document)
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state
            .documents
            .values()
            .map(|d| d.document.clone())
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn get_document(&self, document_id: DocumentId) -> Result<Document> {
        let state = self.state.read().await;
        Ok(state.document(document_id)?.document.clone())
    }

    async fn source_pdf(&self, document_id: DocumentId) -> Result<Vec<u8>> {
        let state = self.state.read().await;
        Ok(state.document(document_id)?.pdf.clone())
    }

    async fn fetch_signatures(&self, document_id: DocumentId) -> Result<Vec<Signature>> {
        let state = self.state.read().await;
        state.document(document_id)?;
        Ok(state.signatures_of(document_id))
    }

    async fn create_signature(
        &self,
        document_id: DocumentId,
        new: NewSignature,
    ) -> Result<Signature> {
        let mut state = self.state.write().await;
        let document = &state.document(document_id)?.document;
        let signature = create_signature(document, new, &self.policy, Utc::now())?;

        state.signatures.insert(signature.id, signature.clone());
        state.record(
            document_id,
            AuditAction::SignatureCreated,
            OWNER_ACTOR,
            Some(signature.id),
            Some(format!("page {}", signature.page_number)),
        );
        if signature.status == SignatureStatus::Signed {
            state.record(
                document_id,
                AuditAction::SignatureSigned,
                OWNER_ACTOR,
                Some(signature.id),
                None,
            );
        }
        info!(signature_id = %signature.id, status = %signature.status, "signature created");
        Ok(signature)
    }

    async fn update_signature_status(
        &self,
        signature_id: SignatureId,
        update: StatusUpdate,
    ) -> Result<Signature> {
        let mut state = self.state.write().await;
        let current = state.signature(signature_id)?;
        let next = apply_status_update(current, Actor::Owner, &update, Utc::now())?;

        state.signatures.insert(next.id, next.clone());
        let action = match next.status {
            SignatureStatus::Rejected => AuditAction::SignatureRejected,
            _ => AuditAction::SignatureSigned,
        };
        state.record(
            next.document_id,
            action,
            OWNER_ACTOR,
            Some(next.id),
            next.rejection_reason.clone(),
        );
        info!(signature_id = %next.id, status = %next.status, "signature status changed");
        Ok(next)
    }

    async fn update_signature_position(
        &self,
        signature_id: SignatureId,
        update: PositionUpdate,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let current = state.signature(signature_id)?;
        let document = &state.document(current.document_id)?.document;
        let next = apply_position_update(current, document, &update, &self.policy, Utc::now())?;

        state.signatures.insert(next.id, next.clone());
        state.record(
            next.document_id,
            AuditAction::SignatureMoved,
            OWNER_ACTOR,
            Some(next.id),
            position_details(&update),
        );
        debug!(signature_id = %next.id, "signature position saved");
        Ok(())
    }

    async fn delete_signature(&self, signature_id: SignatureId) -> Result<()> {
        let mut state = self.state.write().await;
        let current = state.signature(signature_id)?;
        ensure_unlocked(current)?;
        let document_id = current.document_id;

        state.signatures.remove(&signature_id);
        state.tokens.retain(|_, id| *id != signature_id);
        state.record(
            document_id,
            AuditAction::SignatureDeleted,
            OWNER_ACTOR,
            Some(signature_id),
            None,
        );
        info!(%signature_id, "signature deleted");
        Ok(())
    }

    async fn generate_signing_link(
        &self,
        signature_id: SignatureId,
        recipient: LinkRecipient,
    ) -> Result<SigningLink> {
        let mut state = self.state.write().await;
        let current = state.signature(signature_id)?;
        let issued = issue_link(
            current,
            &recipient,
            &self.public_base_url,
            self.policy.link_ttl(),
            Utc::now(),
        )?;

        state.tokens.retain(|_, id| *id != signature_id);
        state
            .tokens
            .insert(issued.link.token.clone(), signature_id);
        state
            .signatures
            .insert(signature_id, issued.signature.clone());
        state.record(
            issued.signature.document_id,
            AuditAction::SigningLinkSent,
            OWNER_ACTOR,
            Some(signature_id),
            Some(issued.signature.signer_name.clone()),
        );
        info!(%signature_id, expires_at = %issued.link.expires_at, "signing link issued");
        Ok(issued.link)
    }

    async fn finalize_document(&self, document_id: DocumentId) -> Result<FinalizeResult> {
        let mut state = self.state.write().await;
        let signatures = state.signatures_of(document_id);
        let stored = state.document(document_id)?;
        let fingerprint = signed_fingerprint(&signatures).ok_or(DocsignError::NothingToFinalize)?;

        if let (Some((artifact_id, existing)), Some(url), Some(at)) = (
            &stored.current_artifact,
            &stored.document.signed_file_url,
            stored.document.finalized_at,
        ) {
            if *existing == fingerprint {
                debug!(%document_id, "signed set unchanged; reusing artifact");
                return Ok(FinalizeResult {
                    artifact_id: *artifact_id,
                    signed_file_url: url.clone(),
                    finalized_at: at,
                });
            }
        }

        let rendered = render_signed_pdf(&stored.pdf, &signatures)?;
        let artifact_id = Uuid::new_v4();
        let result = FinalizeResult {
            artifact_id,
            signed_file_url: artifact_url(artifact_id),
            finalized_at: Utc::now(),
        };

        state.artifacts.insert(artifact_id, rendered.bytes);
        if let Some(stored) = state.documents.get_mut(&document_id) {
            stored.current_artifact = Some((artifact_id, rendered.fingerprint));
            stored.document.signed_file_url = Some(result.signed_file_url.clone());
            stored.document.finalized_at = Some(result.finalized_at);
        }
        state.record(
            document_id,
            AuditAction::DocumentFinalized,
            OWNER_ACTOR,
            None,
            Some(rendered.content_hash),
        );
        info!(%document_id, %artifact_id, "document finalized");
        Ok(result)
    }

    async fn get_signing_request(&self, token: &str) -> Result<SigningRequest> {
        let state = self.state.read().await;
        let signature = state.by_token(token)?;
        check_link(signature, Utc::now())?;
        let document = state.document(signature.document_id)?.document.clone();
        Ok(SigningRequest {
            document,
            signature: signature.clone(),
        })
    }

    async fn submit_signature(&self, token: &str, image: SignatureImage) -> Result<Signature> {
        self.resolve_link(
            token,
            StatusUpdate::sign(Some(image)),
            AuditAction::PublicSignatureSubmitted,
        )
        .await
    }

    async fn reject_signing_request(&self, token: &str, reason: String) -> Result<Signature> {
        self.resolve_link(
            token,
            StatusUpdate::reject(reason),
            AuditAction::PublicSignatureRejected,
        )
        .await
    }

    async fn audit_trail(&self, document_id: DocumentId) -> Result<Vec<AuditEvent>> {
        let state = self.state.read().await;
        state.document(document_id)?;
        Ok(state
            .audit
            .get(&document_id)
            .map(|chain| chain.events.clone())
            .unwrap_or_default())
    }

    async fn artifact(&self, artifact_id: Uuid) -> Result<Vec<u8>> {
        let state = self.state.read().await;
        state
            .artifacts
            .get(&artifact_id)
            .cloned()
            .ok_or_else(|| DocsignError::not_found(format!("artifact {}", artifact_id)))
    }
}
