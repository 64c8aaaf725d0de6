//! Compositing of transparent signature images onto PDF pages
//!
//! Each image becomes an RGB image XObject with a DeviceGray soft mask carrying
//! the PNG alpha channel, so the signature's transparent background never
//! covers page content. Stamps are drawn in slice order; later stamps paint
//! over earlier ones.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};
use shared_types::Coordinates;
use tracing::debug;

use crate::coords::rect_to_pdf;
use crate::error::PdfError;
use crate::parser::PdfDocument;

/// 8-bit pixels split into colour and alpha planes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB triples
    pub rgb: Vec<u8>,
    /// Row-major alpha, one byte per pixel
    pub alpha: Vec<u8>,
}

impl DecodedImage {
    /// Decode a PNG of any colour type and bit depth
    pub fn from_png(bytes: &[u8]) -> Result<Self, PdfError> {
        let mut decoder = png::Decoder::new(bytes);
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder
            .read_info()
            .map_err(|e| PdfError::Image(e.to_string()))?;

        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut buf)
            .map_err(|e| PdfError::Image(e.to_string()))?;
        let data = &buf[..info.buffer_size()];

        if info.width == 0 || info.height == 0 {
            return Err(PdfError::Image("image has no pixels".to_string()));
        }

        let pixels = (info.width as usize) * (info.height as usize);
        let mut rgb = Vec::with_capacity(pixels * 3);
        let mut alpha = Vec::with_capacity(pixels);

        match info.color_type {
            png::ColorType::Rgba => {
                for px in data.chunks_exact(4) {
                    rgb.extend_from_slice(&px[..3]);
                    alpha.push(px[3]);
                }
            }
            png::ColorType::Rgb => {
                rgb.extend_from_slice(data);
                alpha.resize(pixels, u8::MAX);
            }
            png::ColorType::GrayscaleAlpha => {
                for px in data.chunks_exact(2) {
                    rgb.extend_from_slice(&[px[0], px[0], px[0]]);
                    alpha.push(px[1]);
                }
            }
            png::ColorType::Grayscale => {
                for &g in data {
                    rgb.extend_from_slice(&[g, g, g]);
                }
                alpha.resize(pixels, u8::MAX);
            }
            other => {
                return Err(PdfError::Image(format!(
                    "unsupported colour type after expansion: {:?}",
                    other
                )))
            }
        }

        if rgb.len() != pixels * 3 || alpha.len() != pixels {
            return Err(PdfError::Image("truncated pixel data".to_string()));
        }

        Ok(Self {
            width: info.width,
            height: info.height,
            rgb,
            alpha,
        })
    }
}

/// One image to draw: PNG bytes stretched over a canonical rectangle
#[derive(Debug, Clone)]
pub struct ImageStamp {
    /// 1-based page number
    pub page: u32,
    pub rect: Coordinates,
    pub png: Vec<u8>,
}

/// Draw every stamp onto its page.
///
/// All images are decoded and every page is checked before the document is
/// touched, so a failure leaves `pdf` unchanged.
pub fn stamp_images(pdf: &mut PdfDocument, stamps: &[ImageStamp]) -> Result<(), PdfError> {
    let mut by_page: BTreeMap<u32, Vec<(&ImageStamp, DecodedImage)>> = BTreeMap::new();
    for stamp in stamps {
        pdf.page_id(stamp.page)?;
        let image = DecodedImage::from_png(&stamp.png)?;
        by_page.entry(stamp.page).or_default().push((stamp, image));
    }

    for (page, entries) in by_page {
        let page_id = pdf.page_id(page)?;
        let geometry = pdf.geometry(page)?;
        let mut resources = pdf.owned_resources(page_id, page)?;
        let mut xobjects = pdf.owned_xobjects(&resources, page)?;

        let mut operations = Vec::with_capacity(entries.len() * 4);
        for (stamp, image) in &entries {
            let image_id = add_image_xobject(pdf, image)?;
            let name = free_name(&xobjects);
            xobjects.set(name.as_bytes().to_vec(), image_id);

            let matrix = rect_to_pdf(&stamp.rect, geometry);
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                matrix.iter().map(|v| Object::Real(*v as f32)).collect(),
            ));
            operations.push(Operation::new(
                "Do",
                vec![Object::Name(name.into_bytes())],
            ));
            operations.push(Operation::new("Q", vec![]));
        }

        resources.set("XObject", Object::Dictionary(xobjects));
        let overlay = Content { operations }
            .encode()
            .map_err(|e| PdfError::Write(e.to_string()))?;
        pdf.append_isolated_contents(page_id, page, resources, overlay)?;

        debug!(page, stamps = entries.len(), "stamped signature images");
    }

    Ok(())
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PdfError::Write(e.to_string()))?;
    encoder.finish().map_err(|e| PdfError::Write(e.to_string()))
}

fn add_image_xobject(pdf: &mut PdfDocument, image: &DecodedImage) -> Result<ObjectId, PdfError> {
    let doc = pdf.doc_mut();

    let smask = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        deflate(&image.alpha)?,
    );
    let smask_id = doc.add_object(smask);

    let rgb = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
            "SMask" => smask_id,
        },
        deflate(&image.rgb)?,
    );
    Ok(doc.add_object(rgb))
}

fn free_name(xobjects: &Dictionary) -> String {
    let mut n = 1usize;
    loop {
        let name = format!("DsSig{}", n);
        if !xobjects.has(name.as_bytes()) {
            return name;
        }
        n += 1;
    }
}

impl PdfDocument {
    /// Copy of the page's effective Resources, including ones inherited from the page tree
    fn owned_resources(&self, page_id: ObjectId, page: u32) -> Result<Dictionary, PdfError> {
        match self.inherited(page_id, b"Resources") {
            None => Ok(Dictionary::new()),
            Some(obj) => self
                .resolve_dict(obj)
                .cloned()
                .ok_or_else(|| PdfError::MalformedPage {
                    page,
                    reason: "Resources is not a dictionary".to_string(),
                }),
        }
    }

    /// Copy of the XObject map inside `resources`, keeping existing entries
    fn owned_xobjects(&self, resources: &Dictionary, page: u32) -> Result<Dictionary, PdfError> {
        match resources.get(b"XObject") {
            Err(_) => Ok(Dictionary::new()),
            Ok(obj) => self
                .resolve_dict(obj)
                .cloned()
                .ok_or_else(|| PdfError::MalformedPage {
                    page,
                    reason: "XObject resource is not a dictionary".to_string(),
                }),
        }
    }

    /// Install `resources` on the page and draw `overlay` after the existing
    /// contents, which are wrapped in `q`/`Q` so their graphics state cannot
    /// leak into the overlay.
    fn append_isolated_contents(
        &mut self,
        page_id: ObjectId,
        page: u32,
        resources: Dictionary,
        overlay: Vec<u8>,
    ) -> Result<(), PdfError> {
        let existing = self.content_streams(page_id, page)?;

        let doc = self.doc_mut();
        let mut contents = Vec::with_capacity(existing.len() + 3);
        if !existing.is_empty() {
            contents.push(Object::Reference(
                doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec())),
            ));
            contents.extend(existing);
            contents.push(Object::Reference(
                doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec())),
            ));
        }
        contents.push(Object::Reference(
            doc.add_object(Stream::new(Dictionary::new(), overlay)),
        ));

        let page_dict = doc
            .get_object_mut(page_id)
            .and_then(|o| o.as_dict_mut())
            .map_err(|_| PdfError::MalformedPage {
                page,
                reason: "page object is not a dictionary".to_string(),
            })?;
        page_dict.set("Resources", Object::Dictionary(resources));
        page_dict.set("Contents", Object::Array(contents));
        Ok(())
    }

    /// References to the page's content streams in drawing order
    fn content_streams(&self, page_id: ObjectId, page: u32) -> Result<Vec<Object>, PdfError> {
        let malformed = |reason: &str| PdfError::MalformedPage {
            page,
            reason: reason.to_string(),
        };
        let page_dict = self
            .doc
            .get_object(page_id)
            .and_then(|o| o.as_dict())
            .map_err(|_| malformed("page object is not a dictionary"))?;

        let contents = match page_dict.get(b"Contents") {
            Err(_) => return Ok(Vec::new()),
            Ok(obj) => obj,
        };

        match contents {
            Object::Array(items) => Ok(items.clone()),
            Object::Reference(id) => match self.doc.get_object(*id) {
                Ok(Object::Array(items)) => Ok(items.clone()),
                Ok(Object::Stream(_)) => Ok(vec![Object::Reference(*id)]),
                _ => Err(malformed("Contents does not reference a stream")),
            },
            _ => Err(malformed("Contents is neither a stream nor an array")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{grayscale_png, sample_pdf, signature_png};
    use pretty_assertions::assert_eq;
    use shared_types::PageSize;

    fn number(obj: &Object) -> f64 {
        match obj {
            Object::Integer(i) => *i as f64,
            Object::Real(r) => *r as f64,
            other => panic!("not a number: {:?}", other),
        }
    }

    fn page_operations(pdf: &PdfDocument, page: u32) -> Vec<Operation> {
        let page_id = pdf.page_id(page).unwrap();
        let bytes = pdf.doc.get_page_content(page_id).unwrap();
        Content::decode(&bytes).unwrap().operations
    }

    fn page_bytes(pdf: &PdfDocument, page: u32) -> Vec<u8> {
        pdf.doc.get_page_content(pdf.page_id(page).unwrap()).unwrap()
    }

    fn drawn_names(pdf: &PdfDocument, page: u32) -> Vec<String> {
        page_operations(pdf, page)
            .into_iter()
            .filter(|op| op.operator == "Do")
            .map(|op| String::from_utf8(op.operands[0].as_name().unwrap().to_vec()).unwrap())
            .collect()
    }

    fn page_xobjects(pdf: &PdfDocument, page: u32) -> Dictionary {
        let page_id = pdf.page_id(page).unwrap();
        let resources = pdf.owned_resources(page_id, page).unwrap();
        pdf.owned_xobjects(&resources, page).unwrap()
    }

    fn reload(pdf: &mut PdfDocument) -> PdfDocument {
        let bytes = pdf.save_to_bytes().unwrap();
        PdfDocument::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_decode_rgba_splits_alpha() {
        let image = DecodedImage::from_png(&signature_png(8, 4)).unwrap();
        assert_eq!(image.width, 8);
        assert_eq!(image.height, 4);
        assert_eq!(image.rgb.len(), 8 * 4 * 3);
        assert_eq!(image.alpha.len(), 8 * 4);
        // Background is fully transparent, the stroke is opaque
        assert!(image.alpha.contains(&0));
        assert!(image.alpha.contains(&255));
    }

    #[test]
    fn test_decode_grayscale_is_opaque() {
        let image = DecodedImage::from_png(&grayscale_png(3, 2, 40)).unwrap();
        assert_eq!(image.rgb, vec![40; 3 * 2 * 3]);
        assert_eq!(image.alpha, vec![255; 6]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            DecodedImage::from_png(b"definitely not a png"),
            Err(PdfError::Image(_))
        ));
    }

    #[test]
    fn test_stamp_places_image_at_flipped_rect() {
        let mut pdf = PdfDocument::from_bytes(&sample_pdf(&[PageSize::letter()])).unwrap();
        let stamp = ImageStamp {
            page: 1,
            rect: Coordinates::new(80.0, 80.0, 220.0, 110.0),
            png: signature_png(20, 10),
        };
        stamp_images(&mut pdf, &[stamp]).unwrap();
        let pdf = reload(&mut pdf);

        let ops = page_operations(&pdf, 1);
        let cm = ops
            .iter()
            .rev()
            .find(|op| op.operator == "cm")
            .expect("overlay transform");
        let values: Vec<f64> = cm.operands.iter().map(number).collect();
        assert_eq!(values, vec![220.0, 0.0, 0.0, 110.0, 80.0, 602.0]);

        let xobjects = page_xobjects(&pdf, 1);
        let image_id = xobjects.get(b"DsSig1").unwrap().as_reference().unwrap();
        let image = pdf.doc.get_object(image_id).unwrap().as_stream().unwrap();
        assert_eq!(image.dict.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceRGB");
        let smask_id = image.dict.get(b"SMask").unwrap().as_reference().unwrap();
        let smask = pdf.doc.get_object(smask_id).unwrap().as_stream().unwrap();
        assert_eq!(smask.dict.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceGray");
    }

    #[test]
    fn test_stamp_on_rotated_page_is_upright() {
        let mut pdf = PdfDocument::from_bytes(&sample_pdf(&[PageSize::letter()])).unwrap();
        let page_id = pdf.page_id(1).unwrap();
        pdf.doc
            .get_object_mut(page_id)
            .and_then(|o| o.as_dict_mut())
            .unwrap()
            .set("Rotate", 90i64);

        let stamp = ImageStamp {
            page: 1,
            rect: Coordinates::new(100.0, 50.0, 200.0, 80.0),
            png: signature_png(20, 10),
        };
        stamp_images(&mut pdf, &[stamp]).unwrap();
        let pdf = reload(&mut pdf);

        let ops = page_operations(&pdf, 1);
        let cm = ops
            .iter()
            .rev()
            .find(|op| op.operator == "cm")
            .expect("overlay transform");
        let values: Vec<f64> = cm.operands.iter().map(number).collect();
        assert_eq!(values, vec![0.0, 200.0, -80.0, 0.0, 130.0, 100.0]);
    }

    #[test]
    fn test_existing_content_is_kept_and_isolated() {
        let mut pdf = PdfDocument::from_bytes(&sample_pdf(&[PageSize::letter()])).unwrap();
        let before = page_operations(&pdf, 1);

        let stamp = ImageStamp {
            page: 1,
            rect: Coordinates::new(0.0, 0.0, 100.0, 50.0),
            png: signature_png(4, 4),
        };
        stamp_images(&mut pdf, &[stamp]).unwrap();
        let ops = page_operations(&reload(&mut pdf), 1);

        assert_eq!(ops[0].operator, "q");
        let original: Vec<&str> = before.iter().map(|op| op.operator.as_str()).collect();
        let carried: Vec<&str> = ops[1..=before.len()]
            .iter()
            .map(|op| op.operator.as_str())
            .collect();
        assert_eq!(carried, original);
        assert_eq!(ops[before.len() + 1].operator, "Q");
    }

    #[test]
    fn test_later_stamps_draw_on_top() {
        let mut pdf = PdfDocument::from_bytes(&sample_pdf(&[PageSize::letter()])).unwrap();
        let stamps = vec![
            ImageStamp {
                page: 1,
                rect: Coordinates::new(100.0, 100.0, 200.0, 100.0),
                png: signature_png(4, 4),
            },
            ImageStamp {
                page: 1,
                rect: Coordinates::new(150.0, 120.0, 200.0, 100.0),
                png: grayscale_png(4, 4, 0),
            },
        ];
        stamp_images(&mut pdf, &stamps).unwrap();
        let pdf = reload(&mut pdf);

        assert_eq!(drawn_names(&pdf, 1), vec!["DsSig1", "DsSig2"]);
    }

    #[test]
    fn test_only_target_page_changes() {
        let mut pdf =
            PdfDocument::from_bytes(&sample_pdf(&[PageSize::letter(), PageSize::a4()])).unwrap();
        let first_page_before = page_bytes(&pdf, 1);

        let stamp = ImageStamp {
            page: 2,
            rect: Coordinates::new(10.0, 10.0, 100.0, 50.0),
            png: signature_png(4, 4),
        };
        stamp_images(&mut pdf, &[stamp]).unwrap();
        let pdf = reload(&mut pdf);

        assert_eq!(page_bytes(&pdf, 1), first_page_before);
        assert_eq!(drawn_names(&pdf, 2), vec!["DsSig1"]);
        // A4 height drives the flip on page 2
        let cm = page_operations(&pdf, 2)
            .into_iter()
            .rev()
            .find(|op| op.operator == "cm")
            .unwrap();
        assert_eq!(number(&cm.operands[5]), 842.0 - 60.0);
    }

    #[test]
    fn test_existing_xobject_reference_is_preserved() {
        let mut pdf = PdfDocument::from_bytes(&sample_pdf(&[PageSize::letter()])).unwrap();
        let page_id = pdf.page_id(1).unwrap();
        {
            let doc = pdf.doc_mut();
            let logo = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
            let xobjects = doc.add_object(dictionary! { "Logo" => logo });
            let page = doc.get_object_mut(page_id).unwrap().as_dict_mut().unwrap();
            page.set(
                "Resources",
                dictionary! { "XObject" => xobjects },
            );
        }

        let stamp = ImageStamp {
            page: 1,
            rect: Coordinates::new(10.0, 10.0, 100.0, 50.0),
            png: signature_png(4, 4),
        };
        stamp_images(&mut pdf, &[stamp]).unwrap();
        let pdf = reload(&mut pdf);

        let xobjects = page_xobjects(&pdf, 1);
        assert!(xobjects.has(b"Logo"));
        assert!(xobjects.has(b"DsSig1"));
    }

    #[test]
    fn test_missing_page_leaves_document_untouched() {
        let mut pdf = PdfDocument::from_bytes(&sample_pdf(&[PageSize::letter()])).unwrap();
        let objects_before = pdf.doc.objects.len();
        let stamps = vec![
            ImageStamp {
                page: 1,
                rect: Coordinates::new(0.0, 0.0, 100.0, 50.0),
                png: signature_png(4, 4),
            },
            ImageStamp {
                page: 3,
                rect: Coordinates::new(0.0, 0.0, 100.0, 50.0),
                png: signature_png(4, 4),
            },
        ];
        assert_eq!(
            stamp_images(&mut pdf, &stamps),
            Err(PdfError::PageNotFound {
                page: 3,
                page_count: 1
            })
        );
        assert_eq!(pdf.doc.objects.len(), objects_before);
    }

    #[test]
    fn test_bad_image_fails_before_writing() {
        let mut pdf = PdfDocument::from_bytes(&sample_pdf(&[PageSize::letter()])).unwrap();
        let objects_before = pdf.doc.objects.len();
        let stamp = ImageStamp {
            page: 1,
            rect: Coordinates::new(0.0, 0.0, 100.0, 50.0),
            png: b"nope".to_vec(),
        };
        assert!(matches!(
            stamp_images(&mut pdf, &[stamp]),
            Err(PdfError::Image(_))
        ));
        assert_eq!(pdf.doc.objects.len(), objects_before);
    }
}
