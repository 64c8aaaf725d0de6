//! Public signing links
//!
//! A link is an opaque token bound to one pending signature. Issuing it locks
//! the placement; it resolves exactly once (sign or reject) and stops working
//! after its expiry.

use chrono::{DateTime, Duration, Utc};
use shared_types::{LinkRecipient, Signature, SignatureStatus, SigningLink};
use uuid::Uuid;

use crate::error::{DocsignError, ValidationError};

/// Route the public signing page is served from
pub const PUBLIC_SIGN_PATH: &str = "/sign/public";

/// Link state to persist alongside the signature
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedLink {
    /// The signature with `link_sent`, `expires_at` and the recipient applied
    pub signature: Signature,
    pub link: SigningLink,
}

pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn public_url(base_url: &str, token: &str) -> String {
    format!(
        "{}{}/{}",
        base_url.trim_end_matches('/'),
        PUBLIC_SIGN_PATH,
        token
    )
}

/// Issue a link for `signature`. Re-issuing replaces any earlier token.
pub fn issue_link(
    signature: &Signature,
    recipient: &LinkRecipient,
    base_url: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<IssuedLink, ValidationError> {
    if signature.status != SignatureStatus::Pending {
        return Err(ValidationError::LinkNotAllowed(signature.status));
    }
    let signer_name = recipient.signer_name.trim();
    if signer_name.is_empty() {
        return Err(ValidationError::EmptySignerName);
    }

    let token = generate_token();
    let expires_at = now + ttl;

    let mut next = signature.clone();
    next.signer_name = signer_name.to_string();
    next.signer_email = recipient
        .signer_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .or(next.signer_email);
    next.link_sent = true;
    next.expires_at = Some(expires_at);
    next.updated_at = now;

    Ok(IssuedLink {
        signature: next,
        link: SigningLink {
            public_url: public_url(base_url, &token),
            token,
            expires_at,
        },
    })
}

/// Check that the signature behind a token can still be acted on.
///
/// A resolved request reports [`DocsignError::AlreadyResolved`] even once
/// its link has also expired.
pub fn check_link(signature: &Signature, now: DateTime<Utc>) -> Result<(), DocsignError> {
    if signature.status != SignatureStatus::Pending {
        return Err(DocsignError::AlreadyResolved);
    }
    match signature.expires_at {
        Some(expires_at) if expires_at <= now => Err(DocsignError::ExpiredLink),
        _ => Ok(()),
    }
}
