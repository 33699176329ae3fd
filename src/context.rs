//! The acquired drawing context: host surface, framebuffer and the ledger of
//! scene resources allocated against it.

use std::fmt;

use tracing::{debug, trace};

use crate::drag::{PointerId, PointerRouting};
use crate::error::Result;
use crate::graphics::Framebuffer;
use crate::host::Surface;
use crate::math::Color;
use crate::resize::{ResizeConsumer, ViewportSize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

/// What a context-owned allocation holds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Geometry,
    Material,
    PointBuffer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Geometry => "geometry",
            ResourceKind::Material => "material",
            ResourceKind::PointBuffer => "point buffer",
        })
    }
}

/// A released allocation, as recorded by [`RenderContext::release_resource`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleasedResource {
    pub kind: ResourceKind,
    pub label: &'static str,
}

pub struct RenderContext {
    surface: Box<dyn Surface>,
    framebuffer: Framebuffer,
    next_id: u64,
    /// Live allocations in acquisition order
    live: Vec<(ResourceId, ReleasedResource)>,
    released_log: Vec<ReleasedResource>,
    draw_calls: u64,
    released: bool,
}

impl RenderContext {
    pub fn new(surface: Box<dyn Surface>, background: Color) -> Self {
        let size = surface.size();
        debug!(width = size.width, height = size.height, "render context acquired");
        RenderContext {
            surface,
            framebuffer: Framebuffer::new(size, background),
            next_id: 0,
            live: Vec::new(),
            released_log: Vec::new(),
            draw_calls: 0,
            released: false,
        }
    }

    pub fn size(&self) -> ViewportSize {
        // The framebuffer is created from a valid size and only resized to valid ones
        ViewportSize {
            width: self.framebuffer.width() as u32,
            height: self.framebuffer.height() as u32,
        }
    }

    pub fn framebuffer_mut(&mut self) -> &mut Framebuffer {
        &mut self.framebuffer
    }

    pub fn allocate(&mut self, kind: ResourceKind, label: &'static str) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        trace!(%kind, label, "resource allocated");
        self.live.push((id, ReleasedResource { kind, label }));
        id
    }

    /// Frees one allocation. Returns false if it was already released.
    pub fn release_resource(&mut self, id: ResourceId) -> bool {
        let Some(pos) = self.live.iter().position(|(live, _)| *live == id) else {
            return false;
        };
        let (_, resource) = self.live.remove(pos);
        trace!(kind = %resource.kind, label = resource.label, "resource released");
        self.released_log.push(resource);
        true
    }

    pub fn live_resources(&self) -> usize {
        self.live.len()
    }

    /// Released allocations, oldest release first
    pub fn released_resources(&self) -> &[ReleasedResource] {
        &self.released_log
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    /// Issues one draw call: hands the framebuffer to the surface
    pub fn present(&mut self, overlay: &[String]) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.draw_calls += 1;
        self.surface.present(&self.framebuffer, overlay)
    }

    /// Frees every remaining allocation newest-first, then the surface.
    /// Repeated calls do nothing.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        while let Some((id, _)) = self.live.last().cloned() {
            self.release_resource(id);
        }
        self.released = true;
        debug!(draw_calls = self.draw_calls, "render context released");
        self.surface.release()
    }
}

impl ResizeConsumer for RenderContext {
    fn on_resize(&mut self, size: ViewportSize) {
        self.framebuffer.on_resize(size);
    }
}

impl PointerRouting for RenderContext {
    fn capture_pointer(&mut self, id: PointerId) {
        if !self.released {
            self.surface.capture_pointer(id);
        }
    }

    fn release_pointer(&mut self, id: PointerId) {
        if !self.released {
            self.surface.release_pointer(id);
        }
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("size", &self.size())
            .field("live", &self.live.len())
            .field("draw_calls", &self.draw_calls)
            .field("released", &self.released)
            .finish()
    }
}
