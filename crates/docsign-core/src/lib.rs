//! Signature placement and finalization
//!
//! Signatures live in canonical page coordinates (scale 1.0, top-left
//! origin). This crate owns everything between a pointer on a scaled page
//! and a signed PDF:
//! - `coords` / `gesture`: display-space math and the drag and resize engine
//! - `lifecycle` / `links`: the status machine and public signing links
//! - `store` / `sync`: the persistence seam and local reconciliation
//! - `finalize`: compositing signed signatures into the PDF

pub mod config;
pub mod coords;
pub mod error;
pub mod finalize;
pub mod gesture;
pub mod lifecycle;
pub mod links;
pub mod progress;
pub mod store;
pub mod sync;

pub use config::PlacementPolicy;
pub use coords::{
    clamp_to_page, to_canonical, to_display, validate_placement, DisplayRect, Scale, SizeBounds,
    Viewport,
};
pub use error::{Axis, DocsignError, Result, ValidationError};
pub use finalize::{artifact_url, render_signed_pdf, signed_fingerprint, RenderedArtifact};
pub use gesture::{GestureEvent, GestureSession, LeavePolicy, PlacementEngine, Point};
pub use lifecycle::{
    apply_position_update, apply_status_update, check_transition, create_signature,
    ensure_unlocked, Actor,
};
pub use links::{check_link, issue_link, public_url, IssuedLink};
pub use progress::DocumentProgress;
pub use store::{prepare_document, MemoryStore, NewDocument, SignatureStore, OWNER_ACTOR};
pub use sync::{CommitOutcome, PendingCommit, PlacementSync};
