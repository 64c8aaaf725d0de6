//! Tamper-evident audit log for document and signature events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::types::{DocumentId, SignatureId};

/// Types of auditable events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    DocumentUploaded,
    SignatureCreated,
    SignatureMoved,
    SignatureSigned,
    SignatureRejected,
    SignatureDeleted,
    SigningLinkSent,
    PublicSignatureSubmitted,
    PublicSignatureRejected,
    DocumentFinalized,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DocumentUploaded => "DOCUMENT_UPLOADED",
            AuditAction::SignatureCreated => "SIGNATURE_CREATED",
            AuditAction::SignatureMoved => "SIGNATURE_MOVED",
            AuditAction::SignatureSigned => "SIGNATURE_SIGNED",
            AuditAction::SignatureRejected => "SIGNATURE_REJECTED",
            AuditAction::SignatureDeleted => "SIGNATURE_DELETED",
            AuditAction::SigningLinkSent => "SIGNING_LINK_SENT",
            AuditAction::PublicSignatureSubmitted => "PUBLIC_SIGNATURE_SUBMITTED",
            AuditAction::PublicSignatureRejected => "PUBLIC_SIGNATURE_REJECTED",
            AuditAction::DocumentFinalized => "DOCUMENT_FINALIZED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let action = match s {
            "DOCUMENT_UPLOADED" => AuditAction::DocumentUploaded,
            "SIGNATURE_CREATED" => AuditAction::SignatureCreated,
            "SIGNATURE_MOVED" => AuditAction::SignatureMoved,
            "SIGNATURE_SIGNED" => AuditAction::SignatureSigned,
            "SIGNATURE_REJECTED" => AuditAction::SignatureRejected,
            "SIGNATURE_DELETED" => AuditAction::SignatureDeleted,
            "SIGNING_LINK_SENT" => AuditAction::SigningLinkSent,
            "PUBLIC_SIGNATURE_SUBMITTED" => AuditAction::PublicSignatureSubmitted,
            "PUBLIC_SIGNATURE_REJECTED" => AuditAction::PublicSignatureRejected,
            "DOCUMENT_FINALIZED" => AuditAction::DocumentFinalized,
            _ => return None,
        };
        Some(action)
    }
}

/// A single audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// `owner`, or the external signer's name for public-link actions
    pub actor: String,
    pub document_id: DocumentId,
    pub signature_id: Option<SignatureId>,
    pub previous_hash: Option<String>,
    pub details: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(
        action: AuditAction,
        actor: &str,
        document_id: DocumentId,
        signature_id: Option<SignatureId>,
        previous_hash: Option<String>,
        details: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            actor: actor.to_string(),
            document_id,
            signature_id,
            previous_hash,
            details,
        }
    }

    /// Compute the hash of this event (for chain linking)
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.event_id.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(self.action.as_str().as_bytes());
        hasher.update(self.actor.as_bytes());
        hasher.update(self.document_id.as_bytes());
        if let Some(signature_id) = self.signature_id {
            hasher.update(signature_id.as_bytes());
        }
        if let Some(ref details) = self.details {
            hasher.update(details.as_bytes());
        }
        if let Some(ref prev) = self.previous_hash {
            hasher.update(prev.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Chain of audit events with hash linking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditChain {
    pub events: Vec<AuditEvent>,
    pub document_id: DocumentId,
}

impl AuditChain {
    /// Create a new audit chain for a document
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            events: Vec::new(),
            document_id,
        }
    }

    /// Rebuild a chain from stored events, oldest first
    pub fn from_events(document_id: DocumentId, events: Vec<AuditEvent>) -> Self {
        Self {
            events,
            document_id,
        }
    }

    /// Get the hash of the last event (for linking)
    pub fn last_hash(&self) -> Option<String> {
        self.events.last().map(|e| e.compute_hash())
    }

    /// Append an event, automatically linking to previous hash
    pub fn append(
        &mut self,
        action: AuditAction,
        actor: &str,
        signature_id: Option<SignatureId>,
        details: Option<String>,
    ) -> &AuditEvent {
        let event = AuditEvent::new(
            action,
            actor,
            self.document_id,
            signature_id,
            self.last_hash(),
            details,
        );
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    /// Verify the integrity of the chain
    pub fn verify(&self) -> Result<(), String> {
        let mut expected_prev: Option<String> = None;

        for (i, event) in self.events.iter().enumerate() {
            if event.document_id != self.document_id {
                return Err(format!(
                    "Event {} belongs to document {}, not {}",
                    i, event.document_id, self.document_id
                ));
            }
            if event.previous_hash != expected_prev {
                return Err(format!(
                    "Chain broken at event {}: expected prev {:?}, got {:?}",
                    i, expected_prev, event.previous_hash
                ));
            }
            expected_prev = Some(event.compute_hash());
        }

        Ok(())
    }
}

/// Compute SHA-256 hash of document bytes
pub fn hash_document(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_integrity() {
        let mut chain = AuditChain::new(Uuid::new_v4());
        let sig = Uuid::new_v4();

        chain.append(AuditAction::DocumentUploaded, "owner", None, None);
        chain.append(
            AuditAction::SignatureCreated,
            "owner",
            Some(sig),
            Some("Placeholder on page 1".to_string()),
        );
        chain.append(AuditAction::SignatureSigned, "owner", Some(sig), None);

        assert!(chain.verify().is_ok());
        assert_eq!(chain.events.len(), 3);
        assert!(chain.events[0].previous_hash.is_none());
    }

    #[test]
    fn test_chain_tamper_detection() {
        let mut chain = AuditChain::new(Uuid::new_v4());

        chain.append(AuditAction::DocumentUploaded, "owner", None, None);
        chain.append(AuditAction::DocumentFinalized, "owner", None, None);

        chain.events[0].actor = "mallory".to_string();

        assert!(chain.verify().is_err());
    }

    #[test]
    fn test_foreign_event_detected() {
        let mut chain = AuditChain::new(Uuid::new_v4());
        chain.append(AuditAction::DocumentUploaded, "owner", None, None);
        chain.events[0].document_id = Uuid::new_v4();
        assert!(chain.verify().is_err());
    }

    #[test]
    fn test_action_wire_names_match_parse() {
        let actions = [
            AuditAction::DocumentUploaded,
            AuditAction::SignatureCreated,
            AuditAction::SignatureMoved,
            AuditAction::SignatureSigned,
            AuditAction::SignatureRejected,
            AuditAction::SignatureDeleted,
            AuditAction::SigningLinkSent,
            AuditAction::PublicSignatureSubmitted,
            AuditAction::PublicSignatureRejected,
            AuditAction::DocumentFinalized,
        ];
        for action in actions {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("VIEWED"), None);
    }
}
