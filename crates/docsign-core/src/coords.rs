//! Canonical coordinate model
//!
//! Every persisted or finalized signature box is expressed in canonical units:
//! render scale 1.0, top-left origin, one unit per PDF point. Only the
//! interactive layer deals in display units, and the two are related by a
//! single multiply or divide by the current [`Scale`].

use serde::{Deserialize, Serialize};
use shared_types::{Coordinates, PageSize};

use crate::error::{Axis, ValidationError};

/// Slack allowed when comparing edges against the page, absorbing float error
/// from scale round trips
const EDGE_TOLERANCE: f64 = 1e-6;

/// Render scale of the page as displayed
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scale(f64);

impl Scale {
    pub const ONE: Scale = Scale(1.0);

    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(ValidationError::InvalidScale(value))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Scale {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Scale::new(value).map_err(serde::de::Error::custom)
    }
}

/// A signature box in display units at some scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Canonical box as displayed at `scale`
pub fn to_display(coords: Coordinates, scale: Scale) -> DisplayRect {
    let s = scale.get();
    DisplayRect {
        x: coords.x * s,
        y: coords.y * s,
        width: coords.width * s,
        height: coords.height * s,
    }
}

/// Displayed box converted back to canonical units
pub fn to_canonical(display: DisplayRect, scale: Scale) -> Coordinates {
    let s = scale.get();
    Coordinates {
        x: display.x / s,
        y: display.y / s,
        width: display.width / s,
        height: display.height / s,
    }
}

/// Keep a canonical box on the page.
///
/// The box never ends up larger than the page and never at a negative
/// position. Applying the clamp twice gives the same result as applying it
/// once. `page` is the unscaled page size; for a box measured on screen use
/// [`Viewport::clamp_display`], which clamps at the viewport's scale.
pub fn clamp_to_page(coords: Coordinates, page: PageSize) -> Coordinates {
    // Non-finite input is left for validate_placement to reject
    if !coords.is_finite() {
        return coords;
    }
    let width = coords.width.clamp(0.0, page.width);
    let height = coords.height.clamp(0.0, page.height);
    Coordinates {
        x: coords.x.clamp(0.0, page.width - width),
        y: coords.y.clamp(0.0, page.height - height),
        width,
        height,
    }
}

/// A page as currently rendered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub page: PageSize,
    pub scale: Scale,
}

impl Viewport {
    pub fn new(page: PageSize, scale: Scale) -> Self {
        Self { page, scale }
    }

    /// Displayed page bounds
    pub fn display_size(&self) -> (f64, f64) {
        (
            self.page.width * self.scale.get(),
            self.page.height * self.scale.get(),
        )
    }

    /// Clamp `coords` so its displayed footprint stays within
    /// `[0, page_width * scale] x [0, page_height * scale]`.
    ///
    /// Both sides of that comparison scale by the same factor, so the clamp is
    /// carried out on the canonical box directly.
    pub fn clamp_to_page(&self, coords: Coordinates) -> Coordinates {
        clamp_to_page(coords, self.page)
    }

    /// Clamp a displayed box to the displayed page and return it in canonical units
    pub fn clamp_display(&self, display: DisplayRect) -> Coordinates {
        self.clamp_to_page(to_canonical(display, self.scale))
    }
}

/// Allowed signature box dimensions in canonical units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeBounds {
    pub min_width: f64,
    pub max_width: f64,
    pub min_height: f64,
    pub max_height: f64,
}

impl Default for SizeBounds {
    fn default() -> Self {
        Self {
            min_width: 100.0,
            max_width: 500.0,
            min_height: 50.0,
            max_height: 250.0,
        }
    }
}

impl SizeBounds {
    pub fn clamp_width(&self, width: f64) -> f64 {
        width.max(self.min_width).min(self.max_width)
    }

    pub fn clamp_height(&self, height: f64) -> f64 {
        height.max(self.min_height).min(self.max_height)
    }
}

/// Check a committed placement against the size bounds and the page
pub fn validate_placement(
    coords: &Coordinates,
    page: PageSize,
    bounds: &SizeBounds,
) -> Result<(), ValidationError> {
    if !coords.is_finite() {
        return Err(ValidationError::NonFiniteCoordinates);
    }

    let checks = [
        (Axis::Width, coords.width, bounds.min_width, bounds.max_width),
        (Axis::Height, coords.height, bounds.min_height, bounds.max_height),
    ];
    for (axis, value, min, max) in checks {
        if value < min - EDGE_TOLERANCE || value > max + EDGE_TOLERANCE {
            return Err(ValidationError::DimensionOutOfBounds {
                axis,
                value,
                min,
                max,
            });
        }
    }

    let off_page = coords.x < -EDGE_TOLERANCE
        || coords.y < -EDGE_TOLERANCE
        || coords.right() > page.width + EDGE_TOLERANCE
        || coords.bottom() > page.height + EDGE_TOLERANCE;
    if off_page {
        return Err(ValidationError::OffPage {
            x: coords.x,
            y: coords.y,
            width: coords.width,
            height: coords.height,
            page_width: page.width,
            page_height: page.height,
        });
    }

    Ok(())
}
