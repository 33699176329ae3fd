//! Viewport dimensions and change detection for the hosting surface.

use tracing::debug;

/// Current width/height of the hosting drawing surface, in surface pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    /// Returns `None` when either dimension is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(ViewportSize { width, height })
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn width_f64(&self) -> f64 {
        self.width as f64
    }

    pub fn height_f64(&self) -> f64 {
        self.height as f64
    }
}

/// Anything whose state depends on the viewport dimensions.
pub trait ResizeConsumer {
    fn on_resize(&mut self, size: ViewportSize);
}

/// Gate between raw host resize notifications and the consumers that
/// recompute on them. Only genuine changes get through.
#[derive(Debug)]
pub struct ResizeWatcher {
    current: ViewportSize,
    changes: u64,
}

impl ResizeWatcher {
    pub fn new(initial: ViewportSize) -> Self {
        ResizeWatcher {
            current: initial,
            changes: 0,
        }
    }

    pub fn current(&self) -> ViewportSize {
        self.current
    }

    /// Number of changes let through since construction
    pub fn changes(&self) -> u64 {
        self.changes
    }

    /// Records a host measurement. Returns the new size when it differs from
    /// the last one; zero-area and unchanged measurements yield `None`.
    pub fn observe(&mut self, width: u32, height: u32) -> Option<ViewportSize> {
        let size = ViewportSize::new(width, height)?;
        if size == self.current {
            return None;
        }
        debug!(
            from_w = self.current.width,
            from_h = self.current.height,
            to_w = size.width,
            to_h = size.height,
            "viewport resized"
        );
        self.current = size;
        self.changes += 1;
        Some(size)
    }

    /// Observes a measurement and, on change, notifies every consumer in order.
    pub fn notify(
        &mut self,
        width: u32,
        height: u32,
        consumers: &mut [&mut dyn ResizeConsumer],
    ) -> Option<ViewportSize> {
        let size = self.observe(width, height)?;
        for consumer in consumers.iter_mut() {
            consumer.on_resize(size);
        }
        Some(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<ViewportSize>);

    impl ResizeConsumer for Recorder {
        fn on_resize(&mut self, size: ViewportSize) {
            self.0.push(size);
        }
    }

    #[test]
    fn unchanged_dimensions_do_not_fire() {
        let start = ViewportSize::new(80, 48).unwrap();
        let mut watcher = ResizeWatcher::new(start);
        assert_eq!(watcher.observe(80, 48), None);
        assert_eq!(watcher.changes(), 0);
    }

    #[test]
    fn zero_area_is_ignored() {
        let mut watcher = ResizeWatcher::new(ViewportSize::new(80, 48).unwrap());
        assert_eq!(watcher.observe(0, 48), None);
        assert_eq!(watcher.current(), ViewportSize::new(80, 48).unwrap());
    }

    #[test]
    fn consumers_see_each_change_once() {
        let mut watcher = ResizeWatcher::new(ViewportSize::new(80, 48).unwrap());
        let mut a = Recorder(Vec::new());
        let mut b = Recorder(Vec::new());
        watcher.notify(100, 60, &mut [&mut a, &mut b]);
        watcher.notify(100, 60, &mut [&mut a, &mut b]);
        watcher.notify(120, 60, &mut [&mut a, &mut b]);
        assert_eq!(a.0.len(), 2);
        assert_eq!(b.0, a.0);
        assert_eq!(a.0[1], ViewportSize::new(120, 60).unwrap());
    }
}
