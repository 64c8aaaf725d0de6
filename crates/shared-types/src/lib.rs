//! Types shared between the signing core, the PDF layer and the API server.

pub mod audit;
pub mod types;

pub use audit::{hash_document, AuditAction, AuditChain, AuditEvent};
pub use types::{
    Coordinates, Document, DocumentId, FinalizeResult, ImageDataError, LinkRecipient, LockReason,
    NewSignature, PageSize, PositionUpdate, Signature, SignatureId, SignatureImage,
    SignatureStatus, SigningLink, SigningRequest, StatusUpdate,
};
