//! Conversion between canonical page coordinates and PDF user space
//!
//! Canonical coordinates describe the page as a viewer shows it: top-left
//! origin, `y` growing downwards, one unit per PDF point, after cropping to
//! the CropBox and applying `/Rotate`. PDF user space has a bottom-left origin
//! with `y` growing upwards and is unaffected by either.

use shared_types::{Coordinates, PageSize};

/// A page boundary box (MediaBox or CropBox) as origin plus size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    pub fn from_page_size(size: PageSize) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size.width,
            height: size.height,
        }
    }

    pub fn size(&self) -> PageSize {
        PageSize::new(self.width, self.height)
    }

    /// Overlap with `other`, or `None` when they do not overlap
    pub fn intersect(&self, other: &PageBox) -> Option<PageBox> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        (x2 > x1 && y2 > y1).then(|| PageBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }
}

/// Clockwise page rotation as a viewer applies it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarters,
}

impl Rotation {
    /// Normalise a `/Rotate` value. Only multiples of 90 are valid.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Quarter),
            180 => Some(Rotation::Half),
            270 => Some(Rotation::ThreeQuarters),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarters => 270,
        }
    }

    fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Quarter | Rotation::ThreeQuarters)
    }
}

/// The visible area of a page and how it is turned
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// CropBox clipped to the MediaBox
    pub visible: PageBox,
    pub rotation: Rotation,
}

impl PageGeometry {
    pub fn upright(visible: PageBox) -> Self {
        Self {
            visible,
            rotation: Rotation::None,
        }
    }

    /// Page size as displayed
    pub fn view_size(&self) -> PageSize {
        if self.rotation.swaps_axes() {
            PageSize::new(self.visible.height, self.visible.width)
        } else {
            self.visible.size()
        }
    }
}

/// Convert a canonical point to PDF user space
pub fn canonical_to_pdf(x: f64, y: f64, geometry: PageGeometry) -> (f64, f64) {
    let PageBox {
        x: ox,
        y: oy,
        width: w,
        height: h,
    } = geometry.visible;
    match geometry.rotation {
        Rotation::None => (ox + x, oy + (h - y)),
        Rotation::Quarter => (ox + y, oy + x),
        Rotation::Half => (ox + (w - x), oy + y),
        Rotation::ThreeQuarters => (ox + (w - y), oy + (h - x)),
    }
}

/// Convert a PDF user space point to canonical coordinates
pub fn pdf_to_canonical(pdf_x: f64, pdf_y: f64, geometry: PageGeometry) -> (f64, f64) {
    let PageBox {
        x: ox,
        y: oy,
        width: w,
        height: h,
    } = geometry.visible;
    let (px, py) = (pdf_x - ox, pdf_y - oy);
    match geometry.rotation {
        Rotation::None => (px, h - py),
        Rotation::Quarter => (py, px),
        Rotation::Half => (w - px, py),
        Rotation::ThreeQuarters => (h - py, w - px),
    }
}

/// `cm` operands mapping the unit square onto a canonical rectangle, so that
/// an image drawn in it appears upright on the displayed page
pub fn rect_to_pdf(rect: &Coordinates, geometry: PageGeometry) -> [f64; 6] {
    // Image space origin is the rectangle's bottom-left corner as displayed
    let (e, f) = canonical_to_pdf(rect.x, rect.bottom(), geometry);
    let (rx, ry) = canonical_to_pdf(rect.right(), rect.bottom(), geometry);
    let (tx, ty) = canonical_to_pdf(rect.x, rect.y, geometry);
    [rx - e, ry - f, tx - e, ty - f, e, f]
}
