//! Shared PDF handling utilities
//!
//! Page geometry lookup, coordinate conversion between the top-left canonical
//! space and PDF user space, and compositing of transparent signature images.

pub mod coords;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod parser;
pub mod stamp;

pub use coords::{canonical_to_pdf, pdf_to_canonical, rect_to_pdf, PageBox, PageGeometry, Rotation};
pub use error::PdfError;
pub use parser::PdfDocument;
pub use stamp::{stamp_images, DecodedImage, ImageStamp};
