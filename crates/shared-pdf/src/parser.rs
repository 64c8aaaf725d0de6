//! PDF parsing and page geometry using lopdf

use lopdf::{Dictionary, Document, Object, ObjectId};
use shared_types::PageSize;

use crate::coords::{PageBox, PageGeometry, Rotation};
use crate::error::PdfError;

/// Inheritable page attributes are looked up at most this many levels up the page tree
const MAX_TREE_DEPTH: usize = 32;

/// Wrapper around lopdf::Document
pub struct PdfDocument {
    pub(crate) doc: Document,
}

impl PdfDocument {
    /// Load a PDF from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        let doc = Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
        Ok(Self { doc })
    }

    /// Get the number of pages
    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// Get page object ID for a given page number (1-indexed)
    pub fn page_id(&self, page_num: u32) -> Result<ObjectId, PdfError> {
        self.doc
            .get_pages()
            .get(&page_num)
            .copied()
            .ok_or(PdfError::PageNotFound {
                page: page_num,
                page_count: self.page_count(),
            })
    }

    /// MediaBox of a page, inherited from the page tree when the page has none
    pub fn media_box(&self, page_num: u32) -> Result<PageBox, PdfError> {
        let page_id = self.page_id(page_num)?;
        match self.inherited(page_id, b"MediaBox") {
            Some(obj) => self.parse_rect(obj).map_err(|reason| PdfError::MalformedPage {
                page: page_num,
                reason,
            }),
            // Default to US Letter size
            None => Ok(PageBox::from_page_size(PageSize::letter())),
        }
    }

    /// Visible area and rotation of a page, as a viewer displays it
    pub fn geometry(&self, page_num: u32) -> Result<PageGeometry, PdfError> {
        let page_id = self.page_id(page_num)?;
        let malformed = |reason: String| PdfError::MalformedPage {
            page: page_num,
            reason,
        };
        let media = self.media_box(page_num)?;

        let visible = match self.inherited(page_id, b"CropBox") {
            Some(obj) => {
                let crop = self.parse_rect(obj).map_err(malformed)?;
                // A CropBox outside the MediaBox is ignored
                media.intersect(&crop).unwrap_or(media)
            }
            None => media,
        };

        let rotation = match self.inherited(page_id, b"Rotate") {
            Some(obj) => {
                let degrees = self.extract_number(obj).map_err(malformed)?;
                Rotation::from_degrees(degrees as i64).ok_or_else(|| {
                    malformed(format!("Rotate {} is not a multiple of 90", degrees))
                })?
            }
            None => Rotation::None,
        };

        Ok(PageGeometry { visible, rotation })
    }

    /// Displayed size of every page, in page order
    pub fn page_sizes(&self) -> Result<Vec<PageSize>, PdfError> {
        (1..=self.page_count())
            .map(|page| self.geometry(page).map(|g| g.view_size()))
            .collect()
    }

    /// Walk from a page node up through `Parent` links looking for `key`
    pub(crate) fn inherited(&self, node_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = Some(node_id);
        for _ in 0..MAX_TREE_DEPTH {
            let id = current?;
            let dict = self.doc.get_object(id).and_then(|o| o.as_dict()).ok()?;
            if let Ok(value) = dict.get(key) {
                return Some(value);
            }
            current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
        }
        None
    }

    /// Resolve a value that may be an indirect reference to a dictionary
    pub(crate) fn resolve_dict<'a>(&'a self, obj: &'a Object) -> Option<&'a Dictionary> {
        match obj {
            Object::Dictionary(dict) => Some(dict),
            Object::Reference(id) => self.doc.get_object(*id).and_then(|o| o.as_dict()).ok(),
            _ => None,
        }
    }

    /// Parse a PDF rectangle array
    fn parse_rect(&self, obj: &Object) -> Result<PageBox, String> {
        let arr = match obj {
            Object::Array(a) => a,
            Object::Reference(id) => self
                .doc
                .get_object(*id)
                .map_err(|e| format!("Failed to resolve reference: {}", e))?
                .as_array()
                .map_err(|_| "Rectangle reference is not an array".to_string())?,
            _ => return Err("Rectangle is not an array".to_string()),
        };

        if arr.len() != 4 {
            return Err(format!("Rectangle has {} elements, expected 4", arr.len()));
        }

        let mut values = [0.0f64; 4];
        for (i, obj) in arr.iter().enumerate() {
            values[i] = self.extract_number(obj)?;
        }

        // Corners may be given in any order
        let (x1, x2) = (values[0].min(values[2]), values[0].max(values[2]));
        let (y1, y2) = (values[1].min(values[3]), values[1].max(values[3]));
        Ok(PageBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }

    /// Extract a number from a PDF object
    fn extract_number(&self, obj: &Object) -> Result<f64, String> {
        match obj {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(r) => Ok(*r as f64),
            Object::Reference(id) => {
                let resolved = self
                    .doc
                    .get_object(*id)
                    .map_err(|e| format!("Failed to resolve: {}", e))?;
                self.extract_number(resolved)
            }
            _ => Err("Expected number in rectangle".to_string()),
        }
    }

    /// Get mutable access to the internal document
    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Save the document to bytes
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, PdfError> {
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfError::Write(e.to_string()))?;
        Ok(buffer)
    }
}
