use shared_pdf::PdfError;
use shared_types::{ImageDataError, LockReason, SignatureId, SignatureStatus};
use thiserror::Error;

use crate::lifecycle::Actor;

/// Which edge of a signature box a size constraint applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Width,
    Height,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Width => f.write_str("width"),
            Axis::Height => f.write_str("height"),
        }
    }
}

/// Input rejected before anything was mutated
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("signature_image is required to sign")]
    MissingImage,

    #[error("rejection_reason is required to reject")]
    MissingReason,

    #[error("cannot change signature status from {from} to {to}")]
    InvalidTransition {
        from: SignatureStatus,
        to: SignatureStatus,
    },

    #[error("{actor} may not change signature status from {from} to {to}")]
    ActorNotPermitted {
        actor: Actor,
        from: SignatureStatus,
        to: SignatureStatus,
    },

    #[error("{axis} {value} is outside {min}..={max}")]
    DimensionOutOfBounds {
        axis: Axis,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("signature box ({x}, {y}, {width}x{height}) extends outside the {page_width}x{page_height} page")]
    OffPage {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        page_width: f64,
        page_height: f64,
    },

    #[error("coordinates must be finite numbers")]
    NonFiniteCoordinates,

    #[error("render scale must be finite and positive, got {0}")]
    InvalidScale(f64),

    #[error("page {page} does not exist (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("signer_name must not be empty")]
    EmptySignerName,

    #[error("invalid signature image: {0}")]
    InvalidImage(#[from] ImageDataError),

    #[error("invalid PDF: {0}")]
    InvalidPdf(String),

    #[error("signing links can only be issued for pending signatures (signature is {0})")]
    LinkNotAllowed(SignatureStatus),

    #[error("signatures with an image cannot be resized")]
    ResizeWithImage,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocsignError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("signature {id} is locked: {reason}")]
    LockedPlacement { id: SignatureId, reason: LockReason },

    #[error("conflicting update: {0}")]
    Conflict(String),

    #[error("signing link has expired")]
    ExpiredLink,

    #[error("signing request was already resolved")]
    AlreadyResolved,

    #[error("document has no signed signatures to finalize")]
    NothingToFinalize,

    #[error("failed to render signed document: {0}")]
    Render(#[from] PdfError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("another gesture is already in progress")]
    GestureBusy,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl DocsignError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        DocsignError::NotFound(what.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DocsignError>;
