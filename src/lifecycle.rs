//! Mounting, driving and tearing down one visualization instance.
//!
//! Mount order: acquire the render context, build the particle field and
//! scene viewer, register host listeners, start the frame scheduler. A
//! failure at any step unwinds the steps before it. Teardown runs the same
//! steps in reverse and is idempotent.
//!
//! Host events never touch instance state directly. Listeners forward them
//! into a channel owned by the instance, and each tick drains that channel
//! before simulating, so an event delivered before a tick is visible in it
//! and nothing is applied twice.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver};
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::asset::{MeshLoader, ThreadedMeshLoader};
use crate::config::MountConfig;
use crate::context::{RenderContext, ResourceKind};
use crate::drag::{DragController, DragState, PointerEvent, PointerId};
use crate::error::Result;
use crate::host::{EventKind, Host, HostEvent, ListenerId, SharedRouter};
use crate::math::Color;
use crate::particles::{Particle, ParticleField};
use crate::resize::{ResizeConsumer, ResizeWatcher, ViewportSize};
use crate::scene::{FocalStatus, SceneViewer};
use crate::scheduler::{CancellationToken, FrameScheduler, FrameStamp};
use crate::state::{RotationState, ViewState};

pub const BACKGROUND: Color = Color::BLACK;

/// One step of an instance teardown, in the order it happened
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TeardownStep {
    CancelScheduler,
    UnregisterListener(EventKind),
    ReleasePointer(PointerId),
    ReleaseResource {
        kind: ResourceKind,
        label: &'static str,
    },
    DropParticleField,
    ReleaseContext,
}

/// Entry point for mounting visualizations into a [`Host`].
pub struct LifecycleManager;

impl LifecycleManager {
    /// Mounts with the default threaded mesh loader
    pub fn mount(host: &mut dyn Host, config: MountConfig) -> Result<LifecycleHandle> {
        Self::mount_with_loader(host, config, &ThreadedMeshLoader)
    }

    pub fn mount_with_loader(
        host: &mut dyn Host,
        config: MountConfig,
        loader: &dyn MeshLoader,
    ) -> Result<LifecycleHandle> {
        // Acquire context. Nothing else exists yet, so failure needs no cleanup.
        let surface = host.acquire_surface()?;
        let mut context = RenderContext::new(surface, BACKGROUND);
        let size = context.size();

        // Construct scene and particle state
        let field = config
            .backdrop
            .then(|| ParticleField::create(config.particle_count, size));
        let viewer = config
            .planet
            .then(|| SceneViewer::mount(&mut context, &config, loader));

        // Register listeners
        let alive = CancellationToken::new();
        let (tx, inbox) = mpsc::channel();
        let router = host.router();
        let listeners: Vec<(ListenerId, EventKind)> = [EventKind::Pointer, EventKind::Resize]
            .into_iter()
            .map(|kind| {
                let tx = tx.clone();
                let alive = alive.clone();
                let id = router.borrow_mut().register(
                    kind,
                    Box::new(move |event: &HostEvent| {
                        if alive.is_cancelled() {
                            trace!(?event, "host event after dispose ignored");
                            return;
                        }
                        // The receiver only goes away during teardown
                        let _ = tx.send(*event);
                    }),
                );
                (id, kind)
            })
            .collect();

        let mut runtime = Runtime {
            context,
            watcher: ResizeWatcher::new(size),
            drag: DragController::new(),
            field,
            viewer,
            view: ViewState {
                wireframe: config.wireframe,
                debug: config.debug,
            },
            stats: FrameStats::default(),
        };

        // Start the scheduler
        let mut scheduler = FrameScheduler::new(host.frame_source());
        let token = match scheduler.start() {
            Ok(token) => token,
            Err(err) => {
                warn!(%err, "frame scheduler unavailable, unmounting");
                alive.cancel();
                let mut router = router.borrow_mut();
                for (id, _) in &listeners {
                    router.unregister(*id);
                }
                runtime.release_scene();
                if let Err(release_err) = runtime.context.release() {
                    warn!(%release_err, "failed to release render context");
                }
                return Err(err);
            }
        };

        info!(
            width = size.width,
            height = size.height,
            backdrop = runtime.field.is_some(),
            planet = runtime.viewer.is_some(),
            "visualization mounted"
        );

        let instance = Instance {
            scheduler,
            token: token.clone(),
            router,
            listeners,
            inbox: Some(inbox),
            runtime: Some(runtime),
            teardown: Vec::new(),
            torn_down: false,
            draw_calls: 0,
        };
        Ok(LifecycleHandle {
            shared: Rc::new(Shared {
                token,
                alive,
                disposing: Cell::new(false),
                instance: RefCell::new(instance),
            }),
        })
    }
}

struct Shared {
    token: CancellationToken,
    alive: CancellationToken,
    disposing: Cell<bool>,
    instance: RefCell<Instance>,
}

/// Opaque token for a mounted instance. Clones refer to the same instance.
///
/// Driving methods must not be called from inside the instance's own frame
/// (for example from a frame source); [`LifecycleHandle::dispose`] is the
/// exception and defers its teardown until the frame completes.
#[derive(Clone)]
pub struct LifecycleHandle {
    shared: Rc<Shared>,
}

impl LifecycleHandle {
    /// Stops the instance and releases everything it acquired. Calling it
    /// again does nothing.
    pub fn dispose(&self) {
        if self.shared.disposing.replace(true) {
            trace!("dispose called again, ignoring");
            return;
        }
        // Both flags flip before anything else so no tick or callback can
        // observe a half-released instance.
        self.shared.alive.cancel();
        self.shared.token.cancel();
        match self.shared.instance.try_borrow_mut() {
            Ok(mut instance) => instance.teardown(),
            Err(_) => debug!("dispose requested mid-frame, teardown deferred"),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposing.get()
    }

    /// Waits for and runs one frame. `Ok(false)` once the instance is stopped.
    pub fn run_frame(&self) -> Result<bool> {
        let mut instance = self.shared.instance.borrow_mut();
        let result = instance.run_frame();
        if self.shared.disposing.get() {
            instance.teardown();
        }
        result
    }

    /// Runs frames until disposed. Returns the number of ticks delivered.
    pub fn run(&self) -> Result<u64> {
        while self.run_frame()? {}
        Ok(self.ticks())
    }

    pub fn ticks(&self) -> u64 {
        self.shared.instance.borrow().scheduler.ticks()
    }

    pub fn draw_calls(&self) -> u64 {
        self.shared.instance.borrow().draw_calls
    }

    pub fn rotation(&self) -> Option<RotationState> {
        self.with_runtime(|rt| rt.viewer.as_ref().map(SceneViewer::rotation))
    }

    pub fn camera_aspect(&self) -> Option<f64> {
        self.with_runtime(|rt| rt.viewer.as_ref().map(|v| v.camera().aspect()))
    }

    pub fn focal_status(&self) -> Option<FocalStatus> {
        self.with_runtime(|rt| rt.viewer.as_ref().map(SceneViewer::focal_status))
    }

    pub fn viewport(&self) -> Option<ViewportSize> {
        self.with_runtime(|rt| Some(rt.watcher.current()))
    }

    pub fn drag_state(&self) -> DragState {
        self.with_runtime(|rt| Some(rt.drag.state()))
            .unwrap_or_default()
    }

    /// Snapshot of the backdrop particles; empty once torn down
    pub fn particles(&self) -> Vec<Particle> {
        self.with_runtime(|rt| rt.field.as_ref().map(|f| f.particles().to_vec()))
            .unwrap_or_default()
    }

    pub fn live_resources(&self) -> usize {
        self.with_runtime(|rt| Some(rt.context.live_resources()))
            .unwrap_or(0)
    }

    pub fn teardown_log(&self) -> Vec<TeardownStep> {
        self.shared.instance.borrow().teardown.clone()
    }

    fn with_runtime<T>(&self, f: impl FnOnce(&Runtime) -> Option<T>) -> Option<T> {
        self.shared.instance.borrow().runtime.as_ref().and_then(f)
    }
}

struct Instance {
    scheduler: FrameScheduler,
    token: CancellationToken,
    router: SharedRouter,
    listeners: Vec<(ListenerId, EventKind)>,
    inbox: Option<Receiver<HostEvent>>,
    runtime: Option<Runtime>,
    teardown: Vec<TeardownStep>,
    torn_down: bool,
    draw_calls: u64,
}

impl Instance {
    fn run_frame(&mut self) -> Result<bool> {
        let (Some(runtime), Some(inbox)) = (self.runtime.as_mut(), self.inbox.as_ref()) else {
            return Ok(false);
        };
        let mut outcome = Ok(());
        let running = self
            .scheduler
            .run_frame(|stamp| outcome = runtime.tick(inbox, stamp))?;
        self.draw_calls = runtime.context.draw_calls();
        outcome?;
        Ok(running)
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.scheduler.cancel(&self.token);
        self.teardown.push(TeardownStep::CancelScheduler);

        {
            let mut router = self.router.borrow_mut();
            for (id, kind) in self.listeners.drain(..) {
                if router.unregister(id) {
                    self.teardown.push(TeardownStep::UnregisterListener(kind));
                }
            }
        }
        self.inbox = None;

        let Some(mut runtime) = self.runtime.take() else {
            return;
        };
        if let DragState::Dragging { pointer, .. } = runtime.drag.state() {
            runtime.drag.reset(&mut runtime.context);
            self.teardown.push(TeardownStep::ReleasePointer(pointer));
        }

        let mark = runtime.context.released_resources().len();
        runtime.release_scene();
        self.record_releases(&runtime.context, mark);

        if runtime.field.take().is_some() {
            self.teardown.push(TeardownStep::DropParticleField);
        }

        let mark = runtime.context.released_resources().len();
        if let Err(err) = runtime.context.release() {
            warn!(%err, "failed to release render context");
        }
        self.record_releases(&runtime.context, mark);
        self.teardown.push(TeardownStep::ReleaseContext);
        self.draw_calls = runtime.context.draw_calls();
        info!(ticks = self.scheduler.ticks(), "visualization disposed");
    }

    fn record_releases(&mut self, context: &RenderContext, since: usize) {
        self.teardown.extend(
            context.released_resources()[since..]
                .iter()
                .map(|r| TeardownStep::ReleaseResource {
                    kind: r.kind,
                    label: r.label,
                }),
        );
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct Runtime {
    context: RenderContext,
    watcher: ResizeWatcher,
    drag: DragController,
    field: Option<ParticleField>,
    viewer: Option<SceneViewer>,
    view: ViewState,
    stats: FrameStats,
}

impl Runtime {
    fn tick(&mut self, inbox: &Receiver<HostEvent>, stamp: FrameStamp) -> Result<()> {
        while let Ok(event) = inbox.try_recv() {
            self.apply(event);
        }

        let size = self.watcher.current();
        if let Some(field) = &mut self.field {
            field.step(size);
        }
        if let Some(viewer) = &mut self.viewer {
            viewer.advance(&mut self.context);
        }

        let fb = self.context.framebuffer_mut();
        match &self.field {
            Some(field) => field.draw(&mut *fb),
            None => fb.clear_color(),
        }
        if let Some(viewer) = &self.viewer {
            viewer.draw(fb);
        }

        self.stats.record(stamp.at);
        let overlay = if self.view.debug {
            self.hud()
        } else {
            Vec::new()
        };
        self.context.present(&overlay)
    }

    fn apply(&mut self, event: HostEvent) {
        match event {
            HostEvent::Pointer(PointerEvent::Wheel { delta }) => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.zoom(delta);
                }
            }
            HostEvent::Pointer(pointer) => {
                let delta = self.drag.handle(&pointer, &mut self.context);
                if let (Some(delta), Some(viewer)) = (delta, &mut self.viewer) {
                    viewer.push_drag(delta);
                }
            }
            HostEvent::Resize { width, height } => {
                // The particle field picks the new bounds up from `step`
                let mut consumers: Vec<&mut dyn ResizeConsumer> = Vec::with_capacity(2);
                consumers.push(&mut self.context);
                if let Some(viewer) = self.viewer.as_mut() {
                    consumers.push(viewer);
                }
                self.watcher.notify(width, height, &mut consumers);
            }
        }
    }

    /// Mesh resources before the cloud buffer
    fn release_scene(&mut self) {
        if let Some(mut viewer) = self.viewer.take() {
            viewer.release_mesh(&mut self.context);
            viewer.release_cloud(&mut self.context);
        }
    }

    fn hud(&self) -> Vec<String> {
        let size = self.watcher.current();
        let mut lines = vec![
            format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            format!("FPS: {:.2}", self.stats.fps),
            format!("Viewport: {}x{}", size.width, size.height),
        ];
        if let Some(viewer) = &self.viewer {
            let (x, y) = viewer.rotation().normalized();
            lines.push(format!("Rotation: x {x:.2} y {y:.2}"));
            lines.push(format!("Camera: distance {:.2}", viewer.camera().distance()));
            lines.push(format!("Mesh: {:?}", viewer.focal_status()));
            if self.view.wireframe {
                lines.push("Wireframe".to_string());
            }
        }
        if self.drag.state().is_dragging() {
            lines.push("Dragging".to_string());
        }
        lines
    }
}

/// Frame-rate estimate refreshed about once a second
#[derive(Debug, Default)]
struct FrameStats {
    frames_since_last_update: usize,
    last_fps_calculation: Option<Instant>,
    fps: f64,
}

impl FrameStats {
    fn record(&mut self, now: Instant) {
        self.frames_since_last_update += 1;
        let Some(last) = self.last_fps_calculation else {
            self.last_fps_calculation = Some(now);
            return;
        };
        let duration = now.duration_since(last);
        if duration.as_secs_f64() >= 1.0 {
            self.fps = self.frames_since_last_update as f64 / duration.as_secs_f64();
            self.frames_since_last_update = 0;
            self.last_fps_calculation = Some(now);
        }
    }
}
