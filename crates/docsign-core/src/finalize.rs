//! Finalization: burning signed signatures into the PDF
//!
//! Only `signed` signatures are projected. Each image is stretched over its
//! stored canonical box at scale 1.0, so the artifact reproduces the editor
//! layout exactly. On a page, older signatures are drawn first.

use sha2::{Digest, Sha256};
use shared_pdf::{stamp_images, ImageStamp, PdfDocument, PdfError};
use shared_types::{hash_document, Signature, SignatureStatus};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DocsignError, Result};

/// Route finalized artifacts are served from
pub const ARTIFACT_PATH: &str = "/api/artifacts";

pub fn artifact_url(artifact_id: Uuid) -> String {
    format!("{}/{}", ARTIFACT_PATH, artifact_id)
}

/// Output of a successful render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`
    pub content_hash: String,
    /// Identifies the signed set that produced the artifact
    pub fingerprint: String,
    pub stamped: usize,
}

/// Signed signatures in drawing order: by page, then `(created_at, id)`
pub fn signed_set(signatures: &[Signature]) -> Vec<&Signature> {
    let mut signed: Vec<&Signature> = signatures
        .iter()
        .filter(|s| s.status == SignatureStatus::Signed)
        .filter(|s| {
            let has_image = s.signature_image.is_some();
            if !has_image {
                warn!(signature_id = %s.id, "signed signature has no image; skipping");
            }
            has_image
        })
        .collect();
    signed.sort_by(|a, b| {
        (a.page_number, a.created_at, a.id).cmp(&(b.page_number, b.created_at, b.id))
    });
    signed
}

/// Fingerprint of a signed set. Changes whenever a member, its placement or
/// its image changes.
pub fn fingerprint(signed: &[&Signature]) -> String {
    let mut hasher = Sha256::new();
    for sig in signed {
        hasher.update(sig.id.as_bytes());
        hasher.update(sig.page_number.to_be_bytes());
        for value in [
            sig.coordinates.x,
            sig.coordinates.y,
            sig.coordinates.width,
            sig.coordinates.height,
        ] {
            hasher.update(value.to_bits().to_be_bytes());
        }
        if let Some(image) = &sig.signature_image {
            hasher.update(image.as_str().as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint of the signed members of `signatures`, or `None` when there are none
pub fn signed_fingerprint(signatures: &[Signature]) -> Option<String> {
    let signed = signed_set(signatures);
    if signed.is_empty() {
        None
    } else {
        Some(fingerprint(&signed))
    }
}

/// Composite every signed signature onto `source` and return the new PDF.
///
/// `source` is never modified.
pub fn render_signed_pdf(source: &[u8], signatures: &[Signature]) -> Result<RenderedArtifact> {
    let signed = signed_set(signatures);
    if signed.is_empty() {
        return Err(DocsignError::NothingToFinalize);
    }

    let mut pdf = PdfDocument::from_bytes(source)?;

    let stamps = signed
        .iter()
        .map(|sig| {
            let png = sig
                .signature_image
                .as_ref()
                .ok_or_else(|| PdfError::Image(format!("signature {} has no image", sig.id)))?
                .decode()
                .map_err(|e| PdfError::Image(format!("signature {}: {}", sig.id, e)))?;
            Ok(ImageStamp {
                page: sig.page_number,
                rect: sig.coordinates,
                png,
            })
        })
        .collect::<std::result::Result<Vec<_>, PdfError>>()?;

    stamp_images(&mut pdf, &stamps)?;
    let bytes = pdf.save_to_bytes()?;

    let artifact = RenderedArtifact {
        content_hash: hash_document(&bytes),
        fingerprint: fingerprint(&signed),
        stamped: stamps.len(),
        bytes,
    };
    info!(
        stamped = artifact.stamped,
        content_hash = %artifact.content_hash,
        "rendered signed document"
    );
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::test_support::{document, pending, png_image};
    use chrono::{Duration, Utc};
    use lopdf::content::Content;
    use lopdf::Object;
    use pretty_assertions::assert_eq;
    use shared_pdf::fixtures::sample_pdf;
    use shared_types::{Coordinates, PageSize};

    fn signed_at(page: u32, coords: Coordinates, age_secs: i64) -> Signature {
        let mut sig = pending(&document(&[PageSize::letter(), PageSize::letter()]));
        sig.page_number = page;
        sig.coordinates = coords;
        sig.status = SignatureStatus::Signed;
        sig.signature_image = Some(png_image());
        sig.created_at = Utc::now() - Duration::seconds(age_secs);
        sig
    }

    fn number(obj: &Object) -> f64 {
        match obj {
            Object::Integer(i) => *i as f64,
            Object::Real(r) => *r as f64,
            other => panic!("not a number: {:?}", other),
        }
    }

    /// `(x, y)` of every image drawn on each page, in drawing order
    fn drawn_positions(bytes: &[u8]) -> Vec<Vec<(f64, f64)>> {
        let doc = lopdf::Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|page_id| {
                let content = Content::decode(&doc.get_page_content(*page_id).unwrap()).unwrap();
                let mut positions = Vec::new();
                let mut last_cm = None;
                for op in content.operations {
                    match op.operator.as_str() {
                        "cm" => {
                            last_cm = Some((number(&op.operands[4]), number(&op.operands[5])))
                        }
                        "Do" => positions.extend(last_cm),
                        _ => {}
                    }
                }
                positions
            })
            .collect()
    }

    #[test]
    fn test_two_pages_composited() {
        let source = sample_pdf(&[PageSize::letter(), PageSize::letter()]);
        let sigs = vec![
            signed_at(1, Coordinates::new(80.0, 80.0, 220.0, 110.0), 30),
            signed_at(1, Coordinates::new(300.0, 500.0, 200.0, 100.0), 20),
            signed_at(2, Coordinates::new(50.0, 600.0, 150.0, 60.0), 10),
        ];

        let artifact = render_signed_pdf(&source, &sigs).unwrap();
        assert_eq!(artifact.stamped, 3);
        assert_eq!(artifact.content_hash, hash_document(&artifact.bytes));
        assert_eq!(
            drawn_positions(&artifact.bytes),
            vec![
                vec![(80.0, 792.0 - 190.0), (300.0, 792.0 - 600.0)],
                vec![(50.0, 792.0 - 660.0)],
            ]
        );
    }

    #[test]
    fn test_only_signed_are_projected() {
        let source = sample_pdf(&[PageSize::letter()]);
        let signed = signed_at(1, Coordinates::DEFAULT_PLACEMENT, 5);
        let mut placeholder = signed_at(1, Coordinates::new(300.0, 300.0, 200.0, 100.0), 4);
        placeholder.status = SignatureStatus::Pending;
        placeholder.signature_image = None;
        let mut rejected = signed_at(1, Coordinates::new(300.0, 500.0, 200.0, 100.0), 3);
        rejected.status = SignatureStatus::Rejected;

        let artifact = render_signed_pdf(&source, &[placeholder, signed, rejected]).unwrap();
        assert_eq!(artifact.stamped, 1);
        assert_eq!(drawn_positions(&artifact.bytes), vec![vec![(80.0, 602.0)]]);
    }

    #[test]
    fn test_older_signatures_draw_first() {
        let source = sample_pdf(&[PageSize::letter()]);
        let newer = signed_at(1, Coordinates::new(100.0, 100.0, 200.0, 100.0), 1);
        let older = signed_at(1, Coordinates::new(150.0, 120.0, 200.0, 100.0), 60);

        let artifact = render_signed_pdf(&source, &[newer, older]).unwrap();
        let xs: Vec<f64> = drawn_positions(&artifact.bytes)[0]
            .iter()
            .map(|(x, _)| *x)
            .collect();
        assert_eq!(xs, vec![150.0, 100.0]);
    }

    #[test]
    fn test_nothing_to_finalize_checked_before_parsing() {
        let mut placeholder = signed_at(1, Coordinates::DEFAULT_PLACEMENT, 0);
        placeholder.status = SignatureStatus::Pending;
        assert_eq!(
            render_signed_pdf(b"not a pdf", &[placeholder]),
            Err(DocsignError::NothingToFinalize)
        );
        assert_eq!(
            render_signed_pdf(b"not a pdf", &[]),
            Err(DocsignError::NothingToFinalize)
        );
    }

    #[test]
    fn test_unreadable_pdf_is_render_error() {
        let sig = signed_at(1, Coordinates::DEFAULT_PLACEMENT, 0);
        assert!(matches!(
            render_signed_pdf(b"<html>not a pdf</html>", &[sig]),
            Err(DocsignError::Render(PdfError::Parse(_)))
        ));
    }

    #[test]
    fn test_signature_on_missing_page_is_render_error() {
        let source = sample_pdf(&[PageSize::letter()]);
        let sig = signed_at(2, Coordinates::DEFAULT_PLACEMENT, 0);
        assert!(matches!(
            render_signed_pdf(&source, &[sig]),
            Err(DocsignError::Render(PdfError::PageNotFound { page: 2, .. }))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_signed_set() {
        let a = signed_at(1, Coordinates::DEFAULT_PLACEMENT, 10);
        let b = signed_at(1, Coordinates::new(300.0, 300.0, 200.0, 100.0), 5);

        let base = signed_fingerprint(&[a.clone(), b.clone()]).unwrap();
        // Input order does not matter
        assert_eq!(signed_fingerprint(&[b.clone(), a.clone()]).unwrap(), base);

        let mut moved = b.clone();
        moved.coordinates.x += 1.0;
        assert_ne!(signed_fingerprint(&[a.clone(), moved]).unwrap(), base);

        let mut disputed = b;
        disputed.status = SignatureStatus::Rejected;
        assert_ne!(signed_fingerprint(&[a, disputed]).unwrap(), base);

        assert_eq!(signed_fingerprint(&[]), None);
    }
}
