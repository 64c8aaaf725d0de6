//! SQLite-backed [`SignatureStore`]
//!
//! Timestamps are written with `to_rfc3339()` so audit events read back
//! byte-identical and their hash chain still verifies. Guarded updates carry
//! their precondition in the `WHERE` clause; zero affected rows means another
//! writer got there first.

use async_trait::async_trait;
use chrono::Utc;
use docsign_core::finalize::{artifact_url, render_signed_pdf, signed_fingerprint};
use docsign_core::lifecycle::{
    apply_position_update, apply_status_update, create_signature, ensure_unlocked, Actor,
};
use docsign_core::links::{check_link, issue_link};
use docsign_core::store::{position_details, prepare_document, NewDocument, OWNER_ACTOR};
use docsign_core::{DocsignError, PlacementPolicy, Result, SignatureStore};
use shared_types::{
    AuditAction, AuditEvent, Document, DocumentId, FinalizeResult, LinkRecipient, NewSignature,
    PositionUpdate, Signature, SignatureId, SignatureImage, SignatureStatus, SigningLink,
    SigningRequest, StatusUpdate,
};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::{DbAuditEvent, DbDocument, DbSignature};

const DOCUMENT_COLUMNS: &str =
    "id, title, file_name, page_sizes_json, created_at, signed_file_url, finalized_at";

const SIGNATURE_COLUMNS: &str = "id, document_id, page_number, x, y, width, height, \
     signer_name, signer_email, status, signature_image, rejection_reason, link_sent, \
     expires_at, created_at, updated_at";

const AUDIT_COLUMNS: &str =
    "event_id, timestamp, action, actor, document_id, signature_id, previous_hash, details";

fn db(err: sqlx::Error) -> DocsignError {
    DocsignError::Unavailable(err.to_string())
}

fn conflict(what: &str, id: Uuid) -> DocsignError {
    DocsignError::Conflict(format!("{} {} changed concurrently", what, id))
}

pub struct SqliteStore {
    pool: SqlitePool,
    policy: PlacementPolicy,
    public_base_url: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, policy: PlacementPolicy, public_base_url: String) -> Self {
        Self {
            pool,
            policy,
            public_base_url,
        }
    }

    async fn resolve_link(
        &self,
        token: &str,
        update: StatusUpdate,
        action: AuditAction,
    ) -> Result<Signature> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let current = signature_by_token(&mut tx, token).await?;
        let now = Utc::now();
        check_link(&current, now)?;

        let next = apply_status_update(&current, Actor::ExternalSigner, &update, now)?;
        let result = sqlx::query(
            r#"
            UPDATE signatures
            SET status = ?, signature_image = ?, rejection_reason = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(next.status.as_str())
        .bind(next.signature_image.as_ref().map(|i| i.as_str().to_string()))
        .bind(&next.rejection_reason)
        .bind(now.to_rfc3339())
        .bind(next.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(DocsignError::AlreadyResolved);
        }

        append_audit(
            &mut tx,
            next.document_id,
            action,
            &next.signer_name,
            Some(next.id),
            next.rejection_reason.clone(),
        )
        .await?;
        tx.commit().await.map_err(db)?;

        tracing::info!(signature_id = %next.id, status = %next.status, "public signing request resolved");
        Ok(next)
    }
}

async fn load_document(conn: &mut SqliteConnection, id: DocumentId) -> Result<Document> {
    let sql = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
    let row: Option<DbDocument> = sqlx::query_as(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;
    row.ok_or_else(|| DocsignError::not_found(format!("document {}", id)))?
        .try_into()
}

async fn load_signature(conn: &mut SqliteConnection, id: SignatureId) -> Result<Signature> {
    let sql = format!("SELECT {} FROM signatures WHERE id = ?", SIGNATURE_COLUMNS);
    let row: Option<DbSignature> = sqlx::query_as(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;
    row.ok_or_else(|| DocsignError::not_found(format!("signature {}", id)))?
        .try_into()
}

async fn signature_by_token(conn: &mut SqliteConnection, token: &str) -> Result<Signature> {
    let sql = format!(
        "SELECT {} FROM signatures WHERE link_token = ?",
        SIGNATURE_COLUMNS
    );
    let row: Option<DbSignature> = sqlx::query_as(&sql)
        .bind(token)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;
    row.ok_or_else(|| DocsignError::not_found("signing link"))?
        .try_into()
}

async fn load_signatures(
    conn: &mut SqliteConnection,
    document_id: DocumentId,
) -> Result<Vec<Signature>> {
    let sql = format!(
        "SELECT {} FROM signatures WHERE document_id = ?",
        SIGNATURE_COLUMNS
    );
    let rows: Vec<DbSignature> = sqlx::query_as(&sql)
        .bind(document_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(db)?;
    let mut signatures = rows
        .into_iter()
        .map(Signature::try_from)
        .collect::<Result<Vec<_>>>()?;
    signatures.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
    Ok(signatures)
}

/// Append an event linked to the document's latest one
async fn append_audit(
    conn: &mut SqliteConnection,
    document_id: DocumentId,
    action: AuditAction,
    actor: &str,
    signature_id: Option<SignatureId>,
    details: Option<String>,
) -> Result<()> {
    let sql = format!(
        "SELECT {} FROM audit_events WHERE document_id = ? ORDER BY seq DESC LIMIT 1",
        AUDIT_COLUMNS
    );
    let last: Option<DbAuditEvent> = sqlx::query_as(&sql)
        .bind(document_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?;
    let previous_hash = last
        .map(AuditEvent::try_from)
        .transpose()?
        .map(|event| event.compute_hash());

    let event = AuditEvent::new(
        action,
        actor,
        document_id,
        signature_id,
        previous_hash,
        details,
    );
    sqlx::query(
        r#"
        INSERT INTO audit_events (event_id, document_id, timestamp, action, actor, signature_id, previous_hash, details)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.event_id.to_string())
    .bind(document_id.to_string())
    .bind(event.timestamp.to_rfc3339())
    .bind(action.as_str())
    .bind(&event.actor)
    .bind(signature_id.map(|id| id.to_string()))
    .bind(&event.previous_hash)
    .bind(&event.details)
    .execute(&mut *conn)
    .await
    .map_err(db)?;
    Ok(())
}

async fn insert_signature(conn: &mut SqliteConnection, sig: &Signature) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO signatures (id, document_id, page_number, x, y, width, height, signer_name,
                                signer_email, status, signature_image, rejection_reason, link_sent,
                                expires_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(sig.id.to_string())
    .bind(sig.document_id.to_string())
    .bind(sig.page_number as i64)
    .bind(sig.coordinates.x)
    .bind(sig.coordinates.y)
    .bind(sig.coordinates.width)
    .bind(sig.coordinates.height)
    .bind(&sig.signer_name)
    .bind(&sig.signer_email)
    .bind(sig.status.as_str())
    .bind(sig.signature_image.as_ref().map(|i| i.as_str().to_string()))
    .bind(&sig.rejection_reason)
    .bind(sig.link_sent)
    .bind(sig.expires_at.map(|t| t.to_rfc3339()))
    .bind(sig.created_at.to_rfc3339())
    .bind(sig.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(db)?;
    Ok(())
}

#[async_trait]
impl SignatureStore for SqliteStore {
    async fn upload_document(&self, upload: NewDocument) -> Result<Document> {
        let document = prepare_document(&upload, Utc::now())?;
        let page_sizes_json = serde_json::to_string(&document.page_sizes)
            .map_err(|e| DocsignError::Unavailable(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(db)?;
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, file_name, pdf_data, page_sizes_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(document.id.to_string())
        .bind(&document.title)
        .bind(&document.file_name)
        .bind(&upload.pdf)
        .bind(&page_sizes_json)
        .bind(document.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        append_audit(
            &mut tx,
            document.id,
            AuditAction::DocumentUploaded,
            OWNER_ACTOR,
            None,
            Some(document.file_name.clone()),
        )
        .await?;
        tx.commit().await.map_err(db)?;

        tracing::info!(document_id = %document.id, pages = document.page_count(), "Document uploaded");
        Ok(document)
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        );
        let rows: Vec<DbDocument> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        rows.into_iter().map(Document::try_from).collect()
    }

    async fn get_document(&self, document_id: DocumentId) -> Result<Document> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        load_document(&mut conn, document_id).await
    }

    async fn source_pdf(&self, document_id: DocumentId) -> Result<Vec<u8>> {
        let pdf: Option<Vec<u8>> = sqlx::query_scalar("SELECT pdf_data FROM documents WHERE id = ?")
            .bind(document_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        pdf.ok_or_else(|| DocsignError::not_found(format!("document {}", document_id)))
    }

    async fn fetch_signatures(&self, document_id: DocumentId) -> Result<Vec<Signature>> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        load_document(&mut conn, document_id).await?;
        load_signatures(&mut conn, document_id).await
    }

    async fn create_signature(
        &self,
        document_id: DocumentId,
        new: NewSignature,
    ) -> Result<Signature> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let document = load_document(&mut tx, document_id).await?;
        let signature = create_signature(&document, new, &self.policy, Utc::now())?;

        insert_signature(&mut tx, &signature).await?;
        append_audit(
            &mut tx,
            document_id,
            AuditAction::SignatureCreated,
            OWNER_ACTOR,
            Some(signature.id),
            Some(format!("page {}", signature.page_number)),
        )
        .await?;
        if signature.status == SignatureStatus::Signed {
            append_audit(
                &mut tx,
                document_id,
                AuditAction::SignatureSigned,
                OWNER_ACTOR,
                Some(signature.id),
                None,
            )
            .await?;
        }
        tx.commit().await.map_err(db)?;

        tracing::info!(signature_id = %signature.id, status = %signature.status, "Signature created");
        Ok(signature)
    }

    async fn update_signature_status(
        &self,
        signature_id: SignatureId,
        update: StatusUpdate,
    ) -> Result<Signature> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let current = load_signature(&mut tx, signature_id).await?;
        let now = Utc::now();
        let next = apply_status_update(&current, Actor::Owner, &update, now)?;

        let result = sqlx::query(
            r#"
            UPDATE signatures
            SET status = ?, signature_image = ?, rejection_reason = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(next.status.as_str())
        .bind(next.signature_image.as_ref().map(|i| i.as_str().to_string()))
        .bind(&next.rejection_reason)
        .bind(now.to_rfc3339())
        .bind(signature_id.to_string())
        .bind(current.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(conflict("signature", signature_id));
        }

        let action = match next.status {
            SignatureStatus::Rejected => AuditAction::SignatureRejected,
            _ => AuditAction::SignatureSigned,
        };
        append_audit(
            &mut tx,
            next.document_id,
            action,
            OWNER_ACTOR,
            Some(signature_id),
            next.rejection_reason.clone(),
        )
        .await?;
        tx.commit().await.map_err(db)?;

        tracing::info!(%signature_id, status = %next.status, "Signature status changed");
        Ok(next)
    }

    async fn update_signature_position(
        &self,
        signature_id: SignatureId,
        update: PositionUpdate,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let current = load_signature(&mut tx, signature_id).await?;
        let document = load_document(&mut tx, current.document_id).await?;
        let now = Utc::now();
        let next = apply_position_update(&current, &document, &update, &self.policy, now)?;

        let result = sqlx::query(
            r#"
            UPDATE signatures
            SET page_number = ?, x = ?, y = ?, width = ?, height = ?, updated_at = ?
            WHERE id = ? AND status = 'pending' AND link_sent = 0
            "#,
        )
        .bind(next.page_number as i64)
        .bind(next.coordinates.x)
        .bind(next.coordinates.y)
        .bind(next.coordinates.width)
        .bind(next.coordinates.height)
        .bind(now.to_rfc3339())
        .bind(signature_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(conflict("signature", signature_id));
        }

        append_audit(
            &mut tx,
            next.document_id,
            AuditAction::SignatureMoved,
            OWNER_ACTOR,
            Some(signature_id),
            position_details(&update),
        )
        .await?;
        tx.commit().await.map_err(db)?;

        tracing::debug!(%signature_id, "Signature position saved");
        Ok(())
    }

    async fn delete_signature(&self, signature_id: SignatureId) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let current = load_signature(&mut tx, signature_id).await?;
        ensure_unlocked(&current)?;

        let result = sqlx::query(
            "DELETE FROM signatures WHERE id = ? AND status = 'pending' AND link_sent = 0",
        )
        .bind(signature_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(conflict("signature", signature_id));
        }

        append_audit(
            &mut tx,
            current.document_id,
            AuditAction::SignatureDeleted,
            OWNER_ACTOR,
            Some(signature_id),
            None,
        )
        .await?;
        tx.commit().await.map_err(db)?;

        tracing::info!(%signature_id, "Signature deleted");
        Ok(())
    }

    async fn generate_signing_link(
        &self,
        signature_id: SignatureId,
        recipient: LinkRecipient,
    ) -> Result<SigningLink> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let current = load_signature(&mut tx, signature_id).await?;
        let issued = issue_link(
            &current,
            &recipient,
            &self.public_base_url,
            self.policy.link_ttl(),
            Utc::now(),
        )?;
        let next = &issued.signature;

        let result = sqlx::query(
            r#"
            UPDATE signatures
            SET signer_name = ?, signer_email = ?, link_sent = 1, link_token = ?, expires_at = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(&next.signer_name)
        .bind(&next.signer_email)
        .bind(&issued.link.token)
        .bind(issued.link.expires_at.to_rfc3339())
        .bind(next.updated_at.to_rfc3339())
        .bind(signature_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(conflict("signature", signature_id));
        }

        append_audit(
            &mut tx,
            next.document_id,
            AuditAction::SigningLinkSent,
            OWNER_ACTOR,
            Some(signature_id),
            Some(next.signer_name.clone()),
        )
        .await?;
        tx.commit().await.map_err(db)?;

        tracing::info!(%signature_id, expires_at = %issued.link.expires_at, "Signing link issued");
        Ok(issued.link)
    }

    async fn finalize_document(&self, document_id: DocumentId) -> Result<FinalizeResult> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        let document = load_document(&mut conn, document_id).await?;
        let signatures = load_signatures(&mut conn, document_id).await?;
        let fingerprint = signed_fingerprint(&signatures).ok_or(DocsignError::NothingToFinalize)?;

        let (current_artifact, current_fingerprint): (Option<String>, Option<String>) =
            sqlx::query_as(
                "SELECT current_artifact_id, current_fingerprint FROM documents WHERE id = ?",
            )
            .bind(document_id.to_string())
            .fetch_one(&mut *conn)
            .await
            .map_err(db)?;

        if let (Some(artifact_id), Some(url), Some(finalized_at)) = (
            current_artifact.filter(|_| current_fingerprint.as_deref() == Some(fingerprint.as_str())),
            document.signed_file_url.clone(),
            document.finalized_at,
        ) {
            tracing::debug!(%document_id, "Signed set unchanged; reusing artifact");
            return Ok(FinalizeResult {
                artifact_id: Uuid::parse_str(&artifact_id)
                    .map_err(|e| DocsignError::Unavailable(e.to_string()))?,
                signed_file_url: url,
                finalized_at,
            });
        }

        let source: Vec<u8> = sqlx::query_scalar("SELECT pdf_data FROM documents WHERE id = ?")
            .bind(document_id.to_string())
            .fetch_one(&mut *conn)
            .await
            .map_err(db)?;
        drop(conn);

        let rendered =
            tokio::task::spawn_blocking(move || render_signed_pdf(&source, &signatures))
                .await
                .map_err(|e| DocsignError::Unavailable(format!("render task failed: {}", e)))??;

        let artifact_id = Uuid::new_v4();
        let result = FinalizeResult {
            artifact_id,
            signed_file_url: artifact_url(artifact_id),
            finalized_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await.map_err(db)?;
        sqlx::query(
            r#"
            INSERT INTO artifacts (id, document_id, fingerprint, content_hash, pdf_data, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(artifact_id.to_string())
        .bind(document_id.to_string())
        .bind(&rendered.fingerprint)
        .bind(&rendered.content_hash)
        .bind(&rendered.bytes)
        .bind(result.finalized_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        sqlx::query(
            r#"
            UPDATE documents
            SET signed_file_url = ?, finalized_at = ?, current_artifact_id = ?, current_fingerprint = ?
            WHERE id = ?
            "#,
        )
        .bind(&result.signed_file_url)
        .bind(result.finalized_at.to_rfc3339())
        .bind(artifact_id.to_string())
        .bind(&rendered.fingerprint)
        .bind(document_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        append_audit(
            &mut tx,
            document_id,
            AuditAction::DocumentFinalized,
            OWNER_ACTOR,
            None,
            Some(rendered.content_hash.clone()),
        )
        .await?;
        tx.commit().await.map_err(db)?;

        tracing::info!(%document_id, %artifact_id, stamped = rendered.stamped, "Document finalized");
        Ok(result)
    }

    async fn get_signing_request(&self, token: &str) -> Result<SigningRequest> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        let signature = signature_by_token(&mut conn, token).await?;
        check_link(&signature, Utc::now())?;
        let document = load_document(&mut conn, signature.document_id).await?;
        Ok(SigningRequest {
            document,
            signature,
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
        let mut conn = self.pool.acquire().await.map_err(db)?;
        load_document(&mut conn, document_id).await?;
        let sql = format!(
            "SELECT {} FROM audit_events WHERE document_id = ? ORDER BY seq",
            AUDIT_COLUMNS
        );
        let rows: Vec<DbAuditEvent> = sqlx::query_as(&sql)
            .bind(document_id.to_string())
            .fetch_all(&mut *conn)
            .await
            .map_err(db)?;
        rows.into_iter().map(AuditEvent::try_from).collect()
    }

    async fn artifact(&self, artifact_id: Uuid) -> Result<Vec<u8>> {
        let pdf: Option<Vec<u8>> = sqlx::query_scalar("SELECT pdf_data FROM artifacts WHERE id = ?")
            .bind(artifact_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        pdf.ok_or_else(|| DocsignError::not_found(format!("artifact {}", artifact_id)))
    }
}
