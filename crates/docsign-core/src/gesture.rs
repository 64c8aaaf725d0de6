//! Drag-to-move and corner-resize gestures over a scaled page
//!
//! Pointer positions arrive in display units relative to the page's top-left
//! corner. The engine turns them into canonical coordinates, clamped to the
//! page, and reports what the host should do with them:
//! - [`GestureEvent::Live`] on every pointer move, to update local state
//! - [`GestureEvent::Commit`] once at the end, to persist
//! - [`GestureEvent::Revert`] when the gesture is abandoned or ends where it
//!   started

use serde::{Deserialize, Serialize};
use shared_types::{Coordinates, PageSize, Signature, SignatureId};
use tracing::warn;

use crate::config::PlacementPolicy;
use crate::coords::{to_display, Scale, SizeBounds, Viewport};
use crate::error::{DocsignError, ValidationError};
use crate::lifecycle::ensure_unlocked;

/// Pointer position in display units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// What happens when the pointer leaves the page mid-gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeavePolicy {
    /// Same as releasing the pointer
    #[default]
    Commit,
    /// Put the signature back where the gesture started
    Revert,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GestureMode {
    /// Pointer offset inside the displayed box at grab time
    Moving { grab_offset: Point },
    /// Pointer position when the bottom-right handle was grabbed
    Resizing { start_pointer: Point },
}

/// The gesture currently in progress on one signature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureSession {
    pub signature_id: SignatureId,
    pub page_number: u32,
    page: PageSize,
    mode: GestureMode,
    /// Coordinates when the gesture began
    pub start: Coordinates,
    /// Latest live coordinates
    pub current: Coordinates,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    Live {
        signature_id: SignatureId,
        coordinates: Coordinates,
    },
    Commit {
        signature_id: SignatureId,
        page_number: u32,
        coordinates: Coordinates,
    },
    Revert {
        signature_id: SignatureId,
        coordinates: Coordinates,
    },
}

impl GestureEvent {
    pub fn signature_id(&self) -> SignatureId {
        match self {
            GestureEvent::Live { signature_id, .. }
            | GestureEvent::Commit { signature_id, .. }
            | GestureEvent::Revert { signature_id, .. } => *signature_id,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        match self {
            GestureEvent::Live { coordinates, .. }
            | GestureEvent::Commit { coordinates, .. }
            | GestureEvent::Revert { coordinates, .. } => *coordinates,
        }
    }
}

/// Gesture handling for one page view. Owns at most one [`GestureSession`].
#[derive(Debug, Clone)]
pub struct PlacementEngine {
    scale: Scale,
    bounds: SizeBounds,
    leave_policy: LeavePolicy,
    session: Option<GestureSession>,
}

impl PlacementEngine {
    pub fn new(scale: Scale, policy: &PlacementPolicy) -> Self {
        Self {
            scale,
            bounds: policy.size_bounds,
            leave_policy: policy.leave_policy,
            session: None,
        }
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Follow a zoom or container resize. Safe mid-gesture: the next pointer
    /// move is interpreted at the new scale.
    pub fn set_scale(&mut self, scale: Scale) {
        self.scale = scale;
    }

    pub fn active(&self) -> Option<&GestureSession> {
        self.session.as_ref()
    }

    pub fn active_signature(&self) -> Option<SignatureId> {
        self.session.map(|s| s.signature_id)
    }

    /// Start dragging `signature`, grabbed at `pointer`
    pub fn begin_move(
        &mut self,
        signature: &Signature,
        page: PageSize,
        pointer: Point,
    ) -> Result<(), DocsignError> {
        self.check_can_begin(signature)?;

        let origin = to_display(signature.coordinates, self.scale);
        let grab_offset = Point::new(pointer.x - origin.x, pointer.y - origin.y);
        self.start(signature, page, GestureMode::Moving { grab_offset });
        Ok(())
    }

    /// Start resizing `signature` from its bottom-right handle
    pub fn begin_resize(
        &mut self,
        signature: &Signature,
        page: PageSize,
        pointer: Point,
    ) -> Result<(), DocsignError> {
        self.check_can_begin(signature)?;
        if signature.signature_image.is_some() {
            warn!(signature_id = %signature.id, "resize rejected: signature has an image");
            return Err(ValidationError::ResizeWithImage.into());
        }

        self.start(
            signature,
            page,
            GestureMode::Resizing {
                start_pointer: pointer,
            },
        );
        Ok(())
    }

    fn check_can_begin(&self, signature: &Signature) -> Result<(), DocsignError> {
        if let Some(active) = self.session {
            warn!(
                signature_id = %signature.id,
                active = %active.signature_id,
                "gesture rejected: another gesture is in progress"
            );
            return Err(DocsignError::GestureBusy);
        }
        ensure_unlocked(signature).inspect_err(|e| {
            warn!(signature_id = %signature.id, error = %e, "gesture rejected");
        })
    }

    fn start(&mut self, signature: &Signature, page: PageSize, mode: GestureMode) {
        self.session = Some(GestureSession {
            signature_id: signature.id,
            page_number: signature.page_number,
            page,
            mode,
            start: signature.coordinates,
            current: signature.coordinates,
        });
    }

    /// Track the pointer. Returns the live coordinates while a gesture is active.
    pub fn pointer_move(&mut self, pointer: Point) -> Option<GestureEvent> {
        let session = self.session.as_mut()?;
        let s = self.scale.get();
        let viewport = Viewport::new(session.page, self.scale);

        session.current = match session.mode {
            GestureMode::Moving { grab_offset } => viewport.clamp_to_page(Coordinates {
                x: (pointer.x - grab_offset.x) / s,
                y: (pointer.y - grab_offset.y) / s,
                ..session.current
            }),
            GestureMode::Resizing { start_pointer } => {
                let start = session.start;
                let dx = (pointer.x - start_pointer.x) / s;
                let dy = (pointer.y - start_pointer.y) / s;
                // The page edge wins over the minimum size
                let width = self
                    .bounds
                    .clamp_width(start.width + dx)
                    .min(session.page.width - start.x)
                    .max(0.0);
                let height = self
                    .bounds
                    .clamp_height(start.height + dy)
                    .min(session.page.height - start.y)
                    .max(0.0);
                Coordinates {
                    width,
                    height,
                    ..start
                }
            }
        };

        Some(GestureEvent::Live {
            signature_id: session.signature_id,
            coordinates: session.current,
        })
    }

    /// Finish the gesture. A placement that did not change ends with a
    /// [`GestureEvent::Revert`] to the start, so nothing is committed.
    pub fn pointer_up(&mut self) -> Option<GestureEvent> {
        let session = self.session.take()?;
        if session.current == session.start {
            return Some(GestureEvent::Revert {
                signature_id: session.signature_id,
                coordinates: session.start,
            });
        }
        Some(GestureEvent::Commit {
            signature_id: session.signature_id,
            page_number: session.page_number,
            coordinates: session.current,
        })
    }

    /// The pointer left the page while a gesture was active
    pub fn pointer_leave(&mut self) -> Option<GestureEvent> {
        match self.leave_policy {
            LeavePolicy::Commit => self.pointer_up(),
            LeavePolicy::Revert => self.cancel(),
        }
    }

    /// Abandon the gesture, e.g. when the page view is torn down
    pub fn cancel(&mut self) -> Option<GestureEvent> {
        let session = self.session.take()?;
        Some(GestureEvent::Revert {
            signature_id: session.signature_id,
            coordinates: session.start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::test_support::{document, pending, png_image};
    use pretty_assertions::assert_eq;
    use shared_types::{LockReason, SignatureStatus};

    fn engine(scale: f64) -> PlacementEngine {
        PlacementEngine::new(Scale::new(scale).unwrap(), &PlacementPolicy::default())
    }

    fn placeholder() -> Signature {
        pending(&document(&[PageSize::letter()]))
    }

    #[test]
    fn test_drag_at_half_scale() {
        let sig = placeholder();
        let mut engine = engine(0.5);

        // Displayed at {40, 40, 110, 55}; grab 10 units inside the corner
        engine
            .begin_move(&sig, PageSize::letter(), Point::new(50.0, 50.0))
            .unwrap();
        let live = engine.pointer_move(Point::new(70.0, 60.0)).unwrap();
        assert_eq!(
            live,
            GestureEvent::Live {
                signature_id: sig.id,
                coordinates: Coordinates::new(120.0, 100.0, 220.0, 110.0),
            }
        );

        assert_eq!(
            engine.pointer_up(),
            Some(GestureEvent::Commit {
                signature_id: sig.id,
                page_number: 1,
                coordinates: Coordinates::new(120.0, 100.0, 220.0, 110.0),
            })
        );
        assert!(engine.active().is_none());
    }

    #[test]
    fn test_drag_is_clamped_to_page() {
        let sig = placeholder();
        let mut engine = engine(1.0);
        engine
            .begin_move(&sig, PageSize::letter(), Point::new(90.0, 90.0))
            .unwrap();
        let live = engine.pointer_move(Point::new(-300.0, 5000.0)).unwrap();
        assert_eq!(
            live.coordinates(),
            Coordinates::new(0.0, 792.0 - 110.0, 220.0, 110.0)
        );
    }

    #[test]
    fn test_shrinking_below_minimum_clamps_to_minimum() {
        let sig = placeholder();
        let mut engine = engine(1.0);
        // Bottom-right handle of {80, 80, 220, 110}
        engine
            .begin_resize(&sig, PageSize::letter(), Point::new(300.0, 190.0))
            .unwrap();
        let live = engine.pointer_move(Point::new(150.0, 190.0)).unwrap();
        assert_eq!(live.coordinates().width, 100.0);
        assert_eq!(live.coordinates().height, 110.0);
        assert_eq!(live.coordinates().x, 80.0);
    }

    #[test]
    fn test_resize_delta_uses_scale() {
        let sig = placeholder();
        let mut engine = engine(2.0);
        engine
            .begin_resize(&sig, PageSize::letter(), Point::new(600.0, 380.0))
            .unwrap();
        // 40 display units is 20 canonical units at scale 2
        let live = engine.pointer_move(Point::new(640.0, 400.0)).unwrap();
        assert_eq!(live.coordinates(), Coordinates::new(80.0, 80.0, 240.0, 120.0));
    }

    #[test]
    fn test_resize_stops_at_maximum_and_page_edge() {
        let sig = placeholder();
        let mut engine = engine(1.0);
        engine
            .begin_resize(&sig, PageSize::letter(), Point::new(300.0, 190.0))
            .unwrap();
        let live = engine.pointer_move(Point::new(2000.0, 2000.0)).unwrap();
        assert_eq!(live.coordinates().width, 500.0);
        assert_eq!(live.coordinates().height, 250.0);

        // On a 300 wide page the right edge is reached before the maximum
        let mut narrow = engine_on_narrow_page();
        let live = narrow.pointer_move(Point::new(2000.0, 0.0)).unwrap();
        assert_eq!(live.coordinates().width, 300.0 - 80.0);
    }

    fn engine_on_narrow_page() -> PlacementEngine {
        let sig = placeholder();
        let mut engine = engine(1.0);
        engine
            .begin_resize(&sig, PageSize::new(300.0, 400.0), Point::new(300.0, 190.0))
            .unwrap();
        engine
    }

    #[test]
    fn test_scale_change_mid_gesture() {
        let sig = placeholder();
        let mut engine = engine(1.0);
        engine
            .begin_resize(&sig, PageSize::letter(), Point::new(300.0, 190.0))
            .unwrap();
        engine.set_scale(Scale::new(2.0).unwrap());
        let live = engine.pointer_move(Point::new(340.0, 190.0)).unwrap();
        assert_eq!(live.coordinates().width, 240.0);
    }

    #[test]
    fn test_locked_signature_rejects_gestures() {
        let mut sig = placeholder();
        sig.link_sent = true;
        let mut engine = engine(1.0);

        let err = engine
            .begin_move(&sig, PageSize::letter(), Point::new(90.0, 90.0))
            .unwrap_err();
        assert_eq!(
            err,
            DocsignError::LockedPlacement {
                id: sig.id,
                reason: LockReason::LinkSent
            }
        );
        assert!(engine.active().is_none());
        assert_eq!(engine.pointer_move(Point::new(0.0, 0.0)), None);

        sig.link_sent = false;
        sig.status = SignatureStatus::Signed;
        assert!(matches!(
            engine.begin_resize(&sig, PageSize::letter(), Point::new(0.0, 0.0)),
            Err(DocsignError::LockedPlacement { .. })
        ));
    }

    #[test]
    fn test_resize_rejected_when_image_attached() {
        let mut sig = placeholder();
        sig.signature_image = Some(png_image());
        let mut engine = engine(1.0);
        assert_eq!(
            engine.begin_resize(&sig, PageSize::letter(), Point::new(300.0, 190.0)),
            Err(DocsignError::Validation(ValidationError::ResizeWithImage))
        );
        // Moving is still allowed
        assert!(engine
            .begin_move(&sig, PageSize::letter(), Point::new(100.0, 100.0))
            .is_ok());
    }

    #[test]
    fn test_second_gesture_is_busy() {
        let first = placeholder();
        let second = placeholder();
        let mut engine = engine(1.0);
        engine
            .begin_move(&first, PageSize::letter(), Point::new(90.0, 90.0))
            .unwrap();
        assert_eq!(
            engine.begin_move(&second, PageSize::letter(), Point::new(90.0, 90.0)),
            Err(DocsignError::GestureBusy)
        );
        assert_eq!(engine.active_signature(), Some(first.id));
    }

    #[test]
    fn test_release_without_change_reverts() {
        let sig = placeholder();
        let mut engine = engine(1.0);
        engine
            .begin_move(&sig, PageSize::letter(), Point::new(90.0, 90.0))
            .unwrap();
        engine.pointer_move(Point::new(120.0, 90.0));
        engine.pointer_move(Point::new(90.0, 90.0));
        assert_eq!(
            engine.pointer_up(),
            Some(GestureEvent::Revert {
                signature_id: sig.id,
                coordinates: Coordinates::DEFAULT_PLACEMENT,
            })
        );
        assert!(engine.active().is_none());
        assert_eq!(engine.pointer_up(), None);
    }

    #[test]
    fn test_leave_policies() {
        let sig = placeholder();

        let mut committing = engine(1.0);
        committing
            .begin_move(&sig, PageSize::letter(), Point::new(90.0, 90.0))
            .unwrap();
        committing.pointer_move(Point::new(100.0, 90.0));
        assert!(matches!(
            committing.pointer_leave(),
            Some(GestureEvent::Commit { .. })
        ));

        let policy = PlacementPolicy {
            leave_policy: LeavePolicy::Revert,
            ..PlacementPolicy::default()
        };
        let mut reverting = PlacementEngine::new(Scale::ONE, &policy);
        reverting
            .begin_move(&sig, PageSize::letter(), Point::new(90.0, 90.0))
            .unwrap();
        reverting.pointer_move(Point::new(100.0, 90.0));
        assert_eq!(
            reverting.pointer_leave(),
            Some(GestureEvent::Revert {
                signature_id: sig.id,
                coordinates: Coordinates::DEFAULT_PLACEMENT,
            })
        );
        assert!(reverting.active().is_none());
    }

    #[test]
    fn test_cancel_tears_down_session() {
        let sig = placeholder();
        let mut engine = engine(1.0);
        assert_eq!(engine.cancel(), None);
        engine
            .begin_move(&sig, PageSize::letter(), Point::new(90.0, 90.0))
            .unwrap();
        assert!(engine.cancel().is_some());
        assert!(engine.active().is_none());
        assert_eq!(engine.pointer_up(), None);
    }
}
