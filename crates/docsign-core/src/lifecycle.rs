//! Signature lifecycle: who may move a signature between which statuses, and
//! what each transition must carry.
//!
//! ```text
//!            sign (owner or signer, needs image)
//!   pending ─────────────────────────────────────▶ signed
//!      │                                            │
//!      │ reject (signer, needs reason)              │ reject (owner, needs reason)
//!      ▼                                            ▼
//!   rejected ◀──────────────────────────────────────┘
//! ```
//!
//! `rejected` is terminal. A sent signing link locks the placement without
//! changing the status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{
    Document, NewSignature, Signature, SignatureImage, SignatureStatus, StatusUpdate,
};
use uuid::Uuid;

use crate::config::PlacementPolicy;
use crate::coords::validate_placement;
use crate::error::{DocsignError, ValidationError};

/// Who is asking for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// The document owner working in the editor
    Owner,
    /// Someone holding a public signing link
    ExternalSigner,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Owner => f.write_str("owner"),
            Actor::ExternalSigner => f.write_str("external signer"),
        }
    }
}

/// Check that `actor` may move a signature from `from` to `to`
pub fn check_transition(
    actor: Actor,
    from: SignatureStatus,
    to: SignatureStatus,
) -> Result<(), ValidationError> {
    use SignatureStatus::*;

    let allowed: &[Actor] = match (from, to) {
        (Pending, Signed) => &[Actor::Owner, Actor::ExternalSigner],
        (Pending, Rejected) => &[Actor::ExternalSigner],
        (Signed, Rejected) => &[Actor::Owner],
        _ => return Err(ValidationError::InvalidTransition { from, to }),
    };

    if allowed.contains(&actor) {
        Ok(())
    } else {
        Err(ValidationError::ActorNotPermitted { actor, from, to })
    }
}

/// Apply a status change to a copy of `signature`.
///
/// Nothing is returned unless the transition is allowed and every field it
/// requires is present, so callers can persist the result as-is.
pub fn apply_status_update(
    signature: &Signature,
    actor: Actor,
    update: &StatusUpdate,
    now: DateTime<Utc>,
) -> Result<Signature, ValidationError> {
    check_transition(actor, signature.status, update.status)?;

    let mut next = signature.clone();
    match update.status {
        SignatureStatus::Signed => {
            let image = update
                .signature_image
                .as_ref()
                .or(signature.signature_image.as_ref())
                .ok_or(ValidationError::MissingImage)?;
            image.decode()?;
            next.signature_image = Some(image.clone());
            next.rejection_reason = None;
        }
        SignatureStatus::Rejected => {
            let reason = update
                .rejection_reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or(ValidationError::MissingReason)?;
            next.rejection_reason = Some(reason.to_string());
        }
        // check_transition never admits a move into pending
        SignatureStatus::Pending => {
            return Err(ValidationError::InvalidTransition {
                from: signature.status,
                to: update.status,
            })
        }
    }

    next.status = update.status;
    next.updated_at = now;
    Ok(next)
}

/// Reject gestures, moves and deletes on a locked placement
pub fn ensure_unlocked(signature: &Signature) -> Result<(), DocsignError> {
    match signature.lock_reason() {
        Some(reason) => Err(DocsignError::LockedPlacement {
            id: signature.id,
            reason,
        }),
        None => Ok(()),
    }
}

fn validate_signer_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptySignerName);
    }
    Ok(trimmed.to_string())
}

fn validate_image(image: &Option<SignatureImage>) -> Result<(), ValidationError> {
    if let Some(image) = image {
        image.decode()?;
    }
    Ok(())
}

/// Build a new signature record for `document`.
///
/// Missing coordinates get the policy's default placement, clamped to the
/// target page. Supplying an image creates the signature already signed.
pub fn create_signature(
    document: &Document,
    new: NewSignature,
    policy: &PlacementPolicy,
    now: DateTime<Utc>,
) -> Result<Signature, ValidationError> {
    let signer_name = validate_signer_name(&new.signer_name)?;
    let page = document
        .page_size(new.page_number)
        .ok_or(ValidationError::PageOutOfRange {
            page: new.page_number,
            page_count: document.page_count(),
        })?;

    let coordinates = match new.coordinates {
        Some(coords) => coords,
        None => crate::coords::clamp_to_page(policy.default_placement, page),
    };
    validate_placement(&coordinates, page, &policy.size_bounds)?;
    validate_image(&new.signature_image)?;

    let status = if new.signature_image.is_some() {
        SignatureStatus::Signed
    } else {
        SignatureStatus::Pending
    };

    Ok(Signature {
        id: Uuid::new_v4(),
        document_id: document.id,
        page_number: new.page_number,
        coordinates,
        signer_name,
        signer_email: new
            .signer_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty()),
        status,
        signature_image: new.signature_image,
        rejection_reason: None,
        link_sent: false,
        expires_at: None,
        created_at: now,
        updated_at: now,
    })
}

/// Validate a committed move and apply it to a copy of `signature`
pub fn apply_position_update(
    signature: &Signature,
    document: &Document,
    update: &shared_types::PositionUpdate,
    policy: &PlacementPolicy,
    now: DateTime<Utc>,
) -> Result<Signature, DocsignError> {
    ensure_unlocked(signature)?;
    let page = document
        .page_size(update.page_number)
        .ok_or(ValidationError::PageOutOfRange {
            page: update.page_number,
            page_count: document.page_count(),
        })?;
    validate_placement(&update.coordinates, page, &policy.size_bounds)?;

    let mut next = signature.clone();
    next.coordinates = update.coordinates;
    next.page_number = update.page_number;
    next.updated_at = now;
    Ok(next)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use shared_types::{Coordinates, PageSize};

    pub fn png_image() -> SignatureImage {
        SignatureImage::from_png(&shared_pdf::fixtures::signature_png(16, 8))
    }

    pub fn document(pages: &[PageSize]) -> Document {
        Document {
            id: Uuid::new_v4(),
            title: "Lease".to_string(),
            file_name: "lease.pdf".to_string(),
            page_sizes: pages.to_vec(),
            created_at: Utc::now(),
            signed_file_url: None,
            finalized_at: None,
        }
    }

    pub fn pending(document: &Document) -> Signature {
        let now = Utc::now();
        Signature {
            id: Uuid::new_v4(),
            document_id: document.id,
            page_number: 1,
            coordinates: Coordinates::DEFAULT_PLACEMENT,
            signer_name: "Signer".to_string(),
            signer_email: None,
            status: SignatureStatus::Pending,
            signature_image: None,
            rejection_reason: None,
            link_sent: false,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
