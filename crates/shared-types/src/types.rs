//! Documents, signatures and the request/response shapes exchanged with the store

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub type DocumentId = Uuid;
pub type SignatureId = Uuid;

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Position and size of a signature overlay in canonical page units.
///
/// Canonical means render scale 1.0 with a top-left origin: `x` grows to the
/// right and `y` grows downwards, exactly like the page as displayed. Nothing
/// that is persisted or finalized is ever expressed at another scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Coordinates {
    /// Placement given to a signature created without explicit coordinates.
    pub const DEFAULT_PLACEMENT: Coordinates = Coordinates {
        x: 80.0,
        y: 80.0,
        width: 220.0,
        height: 110.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// Page dimensions in canonical units (PDF points)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn letter() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
        }
    }

    pub fn a4() -> Self {
        Self {
            width: 595.0,
            height: 842.0,
        }
    }
}

/// Signature lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Pending,
    Signed,
    Rejected,
}

impl SignatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureStatus::Pending => "pending",
            SignatureStatus::Signed => "signed",
            SignatureStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SignatureStatus::Pending),
            "signed" => Ok(SignatureStatus::Signed),
            "rejected" => Ok(SignatureStatus::Rejected),
            other => Err(format!("unknown signature status: {}", other)),
        }
    }
}

/// Why a placement can no longer be moved or resized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum LockReason {
    /// A public signing link was generated; the signer saw this position
    LinkSent,
    /// The signature already left `pending`
    Status(SignatureStatus),
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockReason::LinkSent => write!(f, "a signing link was already sent"),
            LockReason::Status(status) => write!(f, "signature is {}", status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageDataError {
    #[error("image data is empty")]
    Empty,

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("data URL is not base64 encoded")]
    NotBase64,

    #[error("invalid base64: {0}")]
    Base64(String),

    #[error("image is not a PNG")]
    NotPng,
}

/// A signature image as captured by the signing pad: a PNG data URL with a
/// transparent background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureImage(String);

impl SignatureImage {
    pub fn from_data_url(data_url: impl Into<String>) -> Self {
        Self(data_url.into())
    }

    pub fn from_png(bytes: &[u8]) -> Self {
        Self(format!("data:image/png;base64,{}", BASE64.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode to raw PNG bytes. Bare base64 without a `data:` header is accepted.
    pub fn decode(&self) -> Result<Vec<u8>, ImageDataError> {
        let raw = self.0.trim();
        if raw.is_empty() {
            return Err(ImageDataError::Empty);
        }

        let payload = match raw.strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest.split_once(',').ok_or(ImageDataError::NotBase64)?;
                let mut parts = header.split(';');
                let media_type = parts.next().unwrap_or_default();
                if media_type != "image/png" {
                    return Err(ImageDataError::UnsupportedMediaType(media_type.to_string()));
                }
                if !parts.any(|p| p == "base64") {
                    return Err(ImageDataError::NotBase64);
                }
                data
            }
            None => raw,
        };

        let bytes = BASE64
            .decode(payload)
            .map_err(|e| ImageDataError::Base64(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ImageDataError::Empty);
        }
        if !bytes.starts_with(&PNG_MAGIC) {
            return Err(ImageDataError::NotPng);
        }
        Ok(bytes)
    }
}

/// An uploaded PDF and, once finalized, its signed rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub file_name: String,
    /// Size of every page, index 0 is page 1
    pub page_sizes: Vec<PageSize>,
    pub created_at: DateTime<Utc>,
    pub signed_file_url: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    /// Size of a 1-based page
    pub fn page_size(&self, page_number: u32) -> Option<PageSize> {
        if page_number == 0 {
            return None;
        }
        self.page_sizes.get(page_number as usize - 1).copied()
    }
}

/// A signature placeholder or a collected signature anchored to one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: SignatureId,
    pub document_id: DocumentId,
    /// 1-based page the overlay is anchored to
    pub page_number: u32,
    pub coordinates: Coordinates,
    pub signer_name: String,
    pub signer_email: Option<String>,
    pub status: SignatureStatus,
    pub signature_image: Option<SignatureImage>,
    pub rejection_reason: Option<String>,
    pub link_sent: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Signature {
    /// `None` while the placement may still be moved
    pub fn lock_reason(&self) -> Option<LockReason> {
        if self.status != SignatureStatus::Pending {
            Some(LockReason::Status(self.status))
        } else if self.link_sent {
            Some(LockReason::LinkSent)
        } else {
            None
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock_reason().is_some()
    }

    /// Pending and still waiting for an image
    pub fn is_placeholder(&self) -> bool {
        self.status == SignatureStatus::Pending && self.signature_image.is_none()
    }
}

/// Fields supplied when adding a placeholder or signing directly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSignature {
    pub page_number: u32,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    pub signer_name: String,
    #[serde(default)]
    pub signer_email: Option<String>,
    /// Present for "sign now": the signature is created already signed
    #[serde(default, alias = "signature_data")]
    pub signature_image: Option<SignatureImage>,
}

impl NewSignature {
    pub fn placeholder(page_number: u32, signer_name: impl Into<String>) -> Self {
        Self {
            page_number,
            coordinates: None,
            signer_name: signer_name.into(),
            signer_email: None,
            signature_image: None,
        }
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_image(mut self, image: SignatureImage) -> Self {
        self.signature_image = Some(image);
        self
    }
}

/// Requested status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: SignatureStatus,
    #[serde(default, alias = "signature_data")]
    pub signature_image: Option<SignatureImage>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl StatusUpdate {
    pub fn sign(image: Option<SignatureImage>) -> Self {
        Self {
            status: SignatureStatus::Signed,
            signature_image: image,
            rejection_reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            status: SignatureStatus::Rejected,
            signature_image: None,
            rejection_reason: Some(reason.into()),
        }
    }
}

/// Committed placement, always canonical
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub coordinates: Coordinates,
    pub page_number: u32,
}

/// Who a public signing link is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecipient {
    pub signer_name: String,
    #[serde(default)]
    pub signer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningLink {
    pub public_url: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeResult {
    pub artifact_id: Uuid,
    pub signed_file_url: String,
    pub finalized_at: DateTime<Utc>,
}

/// What an external signer sees when opening a public link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningRequest {
    pub document: Document,
    pub signature: Signature,
}
