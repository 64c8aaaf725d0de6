use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PdfError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Page {page} not found (document has {page_count} pages)")]
    PageNotFound { page: u32, page_count: u32 },

    #[error("Malformed page {page}: {reason}")]
    MalformedPage { page: u32, reason: String },

    #[error("Invalid signature image: {0}")]
    Image(String),

    #[error("Failed to write PDF: {0}")]
    Write(String),
}
