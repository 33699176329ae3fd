#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use planetviz::asset::{LoadError, MeshLoader, MeshSource, PendingMesh};
use planetviz::drag::{PointerEvent, PointerId};
use planetviz::error::{Result, VizError};
use planetviz::graphics::Framebuffer;
use planetviz::host::{EventRouter, Host, HostEvent, SharedRouter, Surface};
use planetviz::resize::ViewportSize;
use planetviz::scheduler::{FrameSource, FrameStamp};

/// What the surface saw over its lifetime
#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub presents: u32,
    pub painted: usize,
    pub overlay: Vec<String>,
    pub captured: Vec<PointerId>,
    pub released_pointers: Vec<PointerId>,
    pub releases: u32,
}

pub type Hook = Rc<RefCell<Option<Box<dyn FnMut()>>>>;

pub struct TestHost {
    pub router: SharedRouter,
    pub size: ViewportSize,
    pub surface_fails: bool,
    pub frames_fail: bool,
    pub log: Rc<RefCell<SurfaceLog>>,
    /// Runs inside every frame wait
    pub during_wait: Hook,
}

impl TestHost {
    pub fn new(width: u32, height: u32) -> Self {
        TestHost {
            router: EventRouter::shared(),
            size: ViewportSize::new(width, height).unwrap(),
            surface_fails: false,
            frames_fail: false,
            log: Rc::default(),
            during_wait: Rc::default(),
        }
    }

    pub fn dispatch(&self, event: HostEvent) -> usize {
        self.router.borrow_mut().dispatch(&event)
    }

    pub fn pointer(&self, event: PointerEvent) -> usize {
        self.dispatch(HostEvent::Pointer(event))
    }

    pub fn listeners(&self) -> usize {
        self.router.borrow().len()
    }
}

impl Host for TestHost {
    fn router(&self) -> SharedRouter {
        self.router.clone()
    }

    fn acquire_surface(&mut self) -> Result<Box<dyn Surface>> {
        if self.surface_fails {
            return Err(VizError::ContextUnavailable("no display".into()));
        }
        Ok(Box::new(RecordingSurface {
            size: self.size,
            log: self.log.clone(),
        }))
    }

    fn frame_source(&mut self) -> Box<dyn FrameSource> {
        Box::new(ImmediateFrames {
            index: 0,
            fails: self.frames_fail,
            during_wait: self.during_wait.clone(),
        })
    }
}

pub struct RecordingSurface {
    size: ViewportSize,
    log: Rc<RefCell<SurfaceLog>>,
}

impl Surface for RecordingSurface {
    fn size(&self) -> ViewportSize {
        self.size
    }

    fn present(&mut self, frame: &Framebuffer, overlay: &[String]) -> Result<()> {
        let mut log = self.log.borrow_mut();
        log.presents += 1;
        log.painted = frame.painted_pixels();
        log.overlay = overlay.to_vec();
        Ok(())
    }

    fn capture_pointer(&mut self, id: PointerId) {
        self.log.borrow_mut().captured.push(id);
    }

    fn release_pointer(&mut self, id: PointerId) {
        self.log.borrow_mut().released_pointers.push(id);
    }

    fn release(&mut self) -> Result<()> {
        self.log.borrow_mut().releases += 1;
        Ok(())
    }
}

pub struct ImmediateFrames {
    index: u64,
    fails: bool,
    during_wait: Hook,
}

impl FrameSource for ImmediateFrames {
    fn probe(&self) -> Result<()> {
        if self.fails {
            return Err(VizError::FrameSourceUnavailable("hidden".into()));
        }
        Ok(())
    }

    fn wait_for_frame(&mut self) -> Result<FrameStamp> {
        if let Some(hook) = self.during_wait.borrow_mut().as_mut() {
            hook();
        }
        let stamp = FrameStamp {
            index: self.index,
            at: Instant::now(),
        };
        self.index += 1;
        Ok(stamp)
    }
}

/// Resolves every load with a fixed failure
pub struct FailingLoader;

impl MeshLoader for FailingLoader {
    fn load(&self, _source: &MeshSource) -> PendingMesh {
        PendingMesh::resolved(Err(LoadError::Io("planet.obj: not found".into())))
    }
}
