//! Pointer-drag state machine converting pointer motion into rotation deltas.

use tracing::trace;

/// Identifies one physical pointer (mouse, pen, finger)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PointerId(pub u64);

/// Pointer input in container-local pixel coordinates
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Down { id: PointerId, x: f64, y: f64 },
    Move { id: PointerId, x: f64, y: f64 },
    Up { id: PointerId, x: f64, y: f64 },
    Cancel { id: PointerId },
    /// Scroll wheel; positive `delta` zooms in
    Wheel { delta: f64 },
}

/// Pixel movement observed during a drag
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct RotationDelta {
    pub dx: f64,
    pub dy: f64,
}

impl RotationDelta {
    /// Rotation in radians as `(about_x, about_y)`: vertical drags tilt,
    /// horizontal drags spin
    pub fn to_radians(self, radians_per_pixel: f64) -> (f64, f64) {
        (self.dy * radians_per_pixel, self.dx * radians_per_pixel)
    }
}

impl std::ops::AddAssign for RotationDelta {
    fn add_assign(&mut self, rhs: Self) {
        self.dx += rhs.dx;
        self.dy += rhs.dy;
    }
}

/// Interaction mode. The last pointer position exists only while dragging.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        pointer: PointerId,
        last_x: f64,
        last_y: f64,
    },
}

/// Exclusive pointer routing requested by a transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routing {
    Capture(PointerId),
    Release(PointerId),
}

/// Result of feeding one event to a [`DragState`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    pub state: DragState,
    pub delta: Option<RotationDelta>,
    pub routing: Option<Routing>,
}

impl DragState {
    pub fn is_dragging(&self) -> bool {
        matches!(self, DragState::Dragging { .. })
    }

    /// Pure transition function. Only one gesture is tracked at a time;
    /// events from any other pointer are ignored while dragging.
    pub fn transition(self, event: &PointerEvent) -> Transition {
        let unchanged = Transition {
            state: self,
            delta: None,
            routing: None,
        };
        match (self, *event) {
            (DragState::Idle, PointerEvent::Down { id, x, y }) => Transition {
                state: DragState::Dragging {
                    pointer: id,
                    last_x: x,
                    last_y: y,
                },
                delta: None,
                routing: Some(Routing::Capture(id)),
            },
            (
                DragState::Dragging {
                    pointer,
                    last_x,
                    last_y,
                },
                PointerEvent::Move { id, x, y },
            ) if id == pointer => Transition {
                state: DragState::Dragging {
                    pointer,
                    last_x: x,
                    last_y: y,
                },
                delta: Some(RotationDelta {
                    dx: x - last_x,
                    dy: y - last_y,
                }),
                routing: None,
            },
            // A repeated press (its release was lost) re-anchors the gesture
            (DragState::Dragging { pointer, .. }, PointerEvent::Down { id, x, y })
                if id == pointer =>
            {
                Transition {
                    state: DragState::Dragging {
                        pointer,
                        last_x: x,
                        last_y: y,
                    },
                    delta: None,
                    routing: None,
                }
            }
            (DragState::Dragging { pointer, .. }, PointerEvent::Up { id, .. })
            | (DragState::Dragging { pointer, .. }, PointerEvent::Cancel { id })
                if id == pointer =>
            {
                Transition {
                    state: DragState::Idle,
                    delta: None,
                    routing: Some(Routing::Release(pointer)),
                }
            }
            _ => unchanged,
        }
    }
}

/// Host-side pointer capture so a gesture keeps receiving events after the
/// pointer leaves the surface.
pub trait PointerRouting {
    fn capture_pointer(&mut self, id: PointerId);
    fn release_pointer(&mut self, id: PointerId);
}

/// Owns the [`DragState`] of one mounted instance.
#[derive(Debug, Default)]
pub struct DragController {
    state: DragState,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    /// Feeds one pointer event and returns the drag delta it produced, if any
    pub fn handle(
        &mut self,
        event: &PointerEvent,
        routing: &mut dyn PointerRouting,
    ) -> Option<RotationDelta> {
        let transition = self.state.transition(event);
        match transition.routing {
            Some(Routing::Capture(id)) => {
                trace!(pointer = id.0, "drag started");
                routing.capture_pointer(id);
            }
            Some(Routing::Release(id)) => {
                trace!(pointer = id.0, "drag ended");
                routing.release_pointer(id);
            }
            None => {}
        }
        self.state = transition.state;
        transition.delta
    }

    /// Forces Idle, releasing any captured pointer
    pub fn reset(&mut self, routing: &mut dyn PointerRouting) {
        if let DragState::Dragging { pointer, .. } = self.state {
            routing.release_pointer(pointer);
        }
        self.state = DragState::Idle;
    }
}
