//! Seams between the visualization core and the environment it runs in.

use std::cell::RefCell;
use std::rc::Rc;

use crate::drag::{PointerEvent, PointerId};
use crate::error::Result;
use crate::graphics::Framebuffer;
use crate::resize::ViewportSize;
use crate::scheduler::FrameSource;

/// Notification delivered by the host between frames
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HostEvent {
    Pointer(PointerEvent),
    /// New surface dimensions in pixels
    Resize { width: u32, height: u32 },
}

/// Which events a listener wants
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Pointer,
    Resize,
}

impl HostEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            HostEvent::Pointer(_) => EventKind::Pointer,
            HostEvent::Resize { .. } => EventKind::Resize,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Box<dyn FnMut(&HostEvent)>;

/// Per-host listener table. Listeners are called in registration order.
#[derive(Default)]
pub struct EventRouter {
    next_id: u64,
    listeners: Vec<(ListenerId, EventKind, Listener)>,
}

pub type SharedRouter = Rc<RefCell<EventRouter>>;

impl EventRouter {
    pub fn shared() -> SharedRouter {
        Rc::new(RefCell::new(EventRouter::default()))
    }

    pub fn register(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, kind, listener));
        id
    }

    /// Returns false if `id` was not registered
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers `event` to every listener of its kind; returns how many ran
    pub fn dispatch(&mut self, event: &HostEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        for (_, listener_kind, listener) in self.listeners.iter_mut() {
            if *listener_kind == kind {
                listener(event);
                delivered += 1;
            }
        }
        delivered
    }
}

/// A drawing surface handed out by the host. Owned by a render context.
pub trait Surface {
    /// Current dimensions in pixels
    fn size(&self) -> ViewportSize;

    /// Shows a finished frame, with optional overlay text lines
    fn present(&mut self, frame: &Framebuffer, overlay: &[String]) -> Result<()>;

    fn capture_pointer(&mut self, id: PointerId);

    fn release_pointer(&mut self, id: PointerId);

    /// Gives the surface back to the host. Must tolerate repeated calls.
    fn release(&mut self) -> Result<()>;
}

/// The container a visualization mounts into.
pub trait Host {
    fn router(&self) -> SharedRouter;

    /// Acquires a drawing surface sized to the container
    fn acquire_surface(&mut self) -> Result<Box<dyn Surface>>;

    /// The animation cadence for one mounted instance
    fn frame_source(&mut self) -> Box<dyn FrameSource>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn dispatch_only_reaches_matching_listeners() {
        let mut router = EventRouter::default();
        let pointer_hits = Rc::new(Cell::new(0));
        let resize_hits = Rc::new(Cell::new(0));
        let p = pointer_hits.clone();
        let r = resize_hits.clone();
        router.register(EventKind::Pointer, Box::new(move |_| p.set(p.get() + 1)));
        let resize_id = router.register(EventKind::Resize, Box::new(move |_| r.set(r.get() + 1)));

        router.dispatch(&HostEvent::Resize { width: 10, height: 10 });
        assert_eq!((pointer_hits.get(), resize_hits.get()), (0, 1));

        assert!(router.unregister(resize_id));
        assert!(!router.unregister(resize_id));
        assert_eq!(router.dispatch(&HostEvent::Resize { width: 20, height: 10 }), 0);
        assert_eq!(router.len(), 1);
    }
}
