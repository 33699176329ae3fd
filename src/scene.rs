//! The 3D planet viewer: camera, lights, focal mesh and background cloud.
//!
//! Per tick the viewer adds the autonomous spin and any drag accumulated
//! since the previous tick to its [`RotationState`], counter-rotates the
//! point cloud, and draws. All speeds are per tick, not per second.

use rand::Rng;
use tracing::{info, warn};

use crate::asset::{
    LoadError, Mesh, MeshLoader, MeshPoll, MeshSource, PendingMesh, FOCAL_RADIUS, SPHERE_SEGMENTS,
};
use crate::config::MountConfig;
use crate::context::{RenderContext, ResourceId, ResourceKind};
use crate::drag::RotationDelta;
use crate::graphics::{draw_line, draw_triangle, plot_point, Framebuffer};
use crate::math::{
    calculate_light_intensity, euler_xy, length, multiply_matrix_vector, rotation_y, sub, Color,
};
use crate::resize::{ResizeConsumer, ViewportSize};
use crate::state::RotationState;
use crate::vertex::Vertex;

pub const FIELD_OF_VIEW_DEG: f64 = 45.0;
pub const NEAR_PLANE: f64 = 0.1;
pub const FAR_PLANE: f64 = 1000.0;
pub const CAMERA_DISTANCE: f64 = 3.0;
pub const MIN_CAMERA_DISTANCE: f64 = 1.5;
pub const MAX_CAMERA_DISTANCE: f64 = 12.0;
/// Fractional dolly per wheel notch
pub const ZOOM_STEP: f64 = 0.1;

/// Autonomous spin about the Y axis, radians per tick
pub const AUTO_ROTATE_STEP: f64 = 0.0025;
/// Cloud rotation about the Y axis, radians per tick
pub const CLOUD_ROTATE_STEP: f64 = -0.0008;
pub const DRAG_RADIANS_PER_PIXEL: f64 = 0.005;

pub const CLOUD_POINTS: usize = 1200;
/// Edge length of the cube the cloud is scattered in
pub const CLOUD_EXTENT: f64 = 20.0;
pub const CLOUD_COLOR: Color = Color::rgb8(0xa7, 0x9b, 0xff);
pub const CLOUD_OPACITY: f64 = 0.9;

/// Perspective camera on the +Z axis looking at the origin
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: [f64; 3],
    pub fov_deg: f64,
    pub near: f64,
    pub far: f64,
    aspect: f64,
    /// `1 / tan(fov / 2)`, refreshed by `update_projection`
    focal_length: f64,
}

impl Camera {
    pub fn new(aspect: f64) -> Self {
        let mut camera = Camera {
            position: [0.0, 0.0, CAMERA_DISTANCE],
            fov_deg: FIELD_OF_VIEW_DEG,
            near: NEAR_PLANE,
            far: FAR_PLANE,
            aspect,
            focal_length: 1.0,
        };
        camera.update_projection();
        camera
    }

    pub fn aspect(&self) -> f64 {
        self.aspect
    }

    pub fn distance(&self) -> f64 {
        self.position[2]
    }

    pub fn set_aspect(&mut self, aspect: f64) {
        self.aspect = aspect;
        self.update_projection();
    }

    pub fn update_projection(&mut self) {
        self.focal_length = 1.0 / (self.fov_deg.to_radians() / 2.0).tan();
    }

    /// Moves the camera towards (positive `notches`) or away from the origin
    pub fn dolly(&mut self, notches: f64) {
        let distance = self.position[2] * (1.0 - notches * ZOOM_STEP);
        self.position[2] = distance.clamp(MIN_CAMERA_DISTANCE, MAX_CAMERA_DISTANCE);
    }

    /// Projects a world-space point onto a `width` x `height` pixel grid.
    /// Returns the screen position and view depth, or `None` outside the
    /// near/far planes.
    pub fn project(&self, point: &[f64; 3], width: f64, height: f64) -> Option<([f64; 2], f64)> {
        let rel = sub(point, &self.position);
        let depth = -rel[2];
        if depth < self.near || depth > self.far {
            return None;
        }
        let ndc_x = self.focal_length / self.aspect * rel[0] / depth;
        let ndc_y = self.focal_length * rel[1] / depth;
        Some((
            [(ndc_x + 1.0) * 0.5 * width, (1.0 - ndc_y) * 0.5 * height],
            depth,
        ))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Light {
    Ambient {
        color: Color,
        intensity: f64,
    },
    Point {
        color: Color,
        intensity: f64,
        position: [f64; 3],
        /// Distance at which the light fades out; 0 means no falloff
        range: f64,
    },
}

impl Light {
    fn contribution(&self, position: &[f64; 3], normal: &[f64; 3]) -> [f64; 3] {
        let (color, strength) = match self {
            Light::Ambient { color, intensity } => (color, *intensity),
            Light::Point {
                color,
                intensity,
                position: light_pos,
                range,
            } => {
                let lambert = calculate_light_intensity(normal, position, light_pos);
                let falloff = if *range > 0.0 {
                    (1.0 - length(&sub(light_pos, position)) / range).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                (color, intensity * lambert * falloff)
            }
        };
        let [r, g, b] = color.to_unit();
        [r * strength, g * strength, b * strength]
    }
}

/// Default rig: a violet point light up and to the right plus a dim fill
pub fn default_lights() -> Vec<Light> {
    vec![
        Light::Point {
            color: Color::rgb8(0x7c, 0x86, 0xff),
            intensity: 2.0,
            position: [2.0, 2.0, 2.0],
            range: 10.0,
        },
        Light::Ambient {
            color: Color::WHITE,
            intensity: 0.2,
        },
    ]
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub color: Color,
    pub emissive: Color,
    pub emissive_intensity: f64,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            color: Color::rgb8(0x83, 0xff, 0xf6),
            emissive: Color::rgb8(0x2f, 0xe1, 0xd5),
            emissive_intensity: 0.15,
        }
    }
}

impl Material {
    fn shade(&self, lights: &[Light], position: &[f64; 3], normal: &[f64; 3]) -> Color {
        let base = self.color.to_unit();
        let emissive = self.emissive.to_unit();
        let mut light = [0.0; 3];
        for l in lights {
            let c = l.contribution(position, normal);
            for i in 0..3 {
                light[i] += c[i];
            }
        }
        Color::from_unit([
            base[0] * light[0] + emissive[0] * self.emissive_intensity,
            base[1] * light[1] + emissive[1] * self.emissive_intensity,
            base[2] * light[2] + emissive[2] * self.emissive_intensity,
        ])
    }
}

/// The planet once its geometry is resident in the context
#[derive(Debug)]
struct FocalMesh {
    mesh: Mesh,
    material: Material,
    geometry_id: ResourceId,
    material_id: ResourceId,
}

impl FocalMesh {
    fn acquire(ctx: &mut RenderContext, mesh: Mesh) -> Self {
        let geometry_id = ctx.allocate(ResourceKind::Geometry, "planet");
        let material_id = ctx.allocate(ResourceKind::Material, "planet");
        FocalMesh {
            mesh,
            material: Material::default(),
            geometry_id,
            material_id,
        }
    }
}

#[derive(Debug)]
enum FocalSlot {
    Pending(PendingMesh),
    Ready(FocalMesh),
    Failed(LoadError),
    Released,
}

/// Observable state of the focal mesh slot
#[derive(Clone, Debug, PartialEq)]
pub enum FocalStatus {
    Pending,
    Ready { triangles: usize },
    Failed(LoadError),
    Released,
}

/// Static points rotated as one rigid body
#[derive(Debug)]
pub struct PointCloud {
    positions: Vec<[f64; 3]>,
    rotation_y: f64,
    color: Color,
    opacity: f64,
    buffer_id: ResourceId,
}

impl PointCloud {
    /// Scatters `count` points uniformly in a cube of edge [`CLOUD_EXTENT`]
    pub fn scatter<R: Rng + ?Sized>(ctx: &mut RenderContext, count: usize, rng: &mut R) -> Self {
        let half = CLOUD_EXTENT / 2.0;
        let positions = (0..count)
            .map(|_| {
                [
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                ]
            })
            .collect();
        PointCloud {
            positions,
            rotation_y: 0.0,
            color: CLOUD_COLOR,
            opacity: CLOUD_OPACITY,
            buffer_id: ctx.allocate(ResourceKind::PointBuffer, "starfield"),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn rotation_y(&self) -> f64 {
        self.rotation_y
    }
}

/// Owns the scene graph of one mounted viewer.
#[derive(Debug)]
pub struct SceneViewer {
    camera: Camera,
    lights: Vec<Light>,
    focal: FocalSlot,
    cloud: Option<PointCloud>,
    rotation: RotationState,
    pending_drag: RotationDelta,
    auto_rotate: bool,
    enable_zoom: bool,
    wireframe: bool,
}

impl SceneViewer {
    /// Builds the scene against `ctx`. A procedural sphere is ready at once;
    /// any other source is requested from `loader` and slotted in whenever
    /// it resolves.
    pub fn mount(ctx: &mut RenderContext, config: &MountConfig, loader: &dyn MeshLoader) -> Self {
        let cloud = config
            .cloud
            .then(|| PointCloud::scatter(ctx, CLOUD_POINTS, &mut rand::thread_rng()));
        let focal = match &config.mesh_source {
            MeshSource::Sphere => {
                let (w, h) = SPHERE_SEGMENTS;
                FocalSlot::Ready(FocalMesh::acquire(ctx, Mesh::sphere(FOCAL_RADIUS, w, h)))
            }
            source => {
                info!(%source, "requesting focal mesh");
                FocalSlot::Pending(loader.load(source))
            }
        };
        SceneViewer {
            camera: Camera::new(ctx.size().aspect()),
            lights: default_lights(),
            focal,
            cloud,
            rotation: RotationState::default(),
            pending_drag: RotationDelta::default(),
            auto_rotate: config.auto_rotate,
            enable_zoom: config.enable_zoom,
            wireframe: config.wireframe,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn rotation(&self) -> RotationState {
        self.rotation
    }

    pub fn cloud(&self) -> Option<&PointCloud> {
        self.cloud.as_ref()
    }

    pub fn focal_status(&self) -> FocalStatus {
        match &self.focal {
            FocalSlot::Pending(_) => FocalStatus::Pending,
            FocalSlot::Ready(focal) => FocalStatus::Ready {
                triangles: focal.mesh.triangles.len(),
            },
            FocalSlot::Failed(err) => FocalStatus::Failed(err.clone()),
            FocalSlot::Released => FocalStatus::Released,
        }
    }

    /// Queues drag movement for the next tick
    pub fn push_drag(&mut self, delta: RotationDelta) {
        self.pending_drag += delta;
    }

    /// Applies wheel input; ignored unless zoom is enabled
    pub fn zoom(&mut self, notches: f64) -> bool {
        if !self.enable_zoom {
            return false;
        }
        self.camera.dolly(notches);
        true
    }

    /// One tick of simulation: resolve the focal mesh, then rotate.
    pub fn advance(&mut self, ctx: &mut RenderContext) {
        self.poll_focal(ctx);

        let drag = std::mem::take(&mut self.pending_drag);
        let (about_x, about_y) = drag.to_radians(DRAG_RADIANS_PER_PIXEL);
        if self.auto_rotate {
            self.rotation.y += AUTO_ROTATE_STEP;
        }
        self.rotation.y += about_y;
        self.rotation.x += about_x;

        if let Some(cloud) = &mut self.cloud {
            cloud.rotation_y += CLOUD_ROTATE_STEP;
        }
    }

    fn poll_focal(&mut self, ctx: &mut RenderContext) {
        let FocalSlot::Pending(pending) = &mut self.focal else {
            return;
        };
        match pending.poll() {
            MeshPoll::Pending => {}
            MeshPoll::Ready(mesh) => {
                info!(
                    vertices = mesh.positions.len(),
                    triangles = mesh.triangles.len(),
                    "focal mesh ready"
                );
                self.focal = FocalSlot::Ready(FocalMesh::acquire(ctx, mesh));
            }
            MeshPoll::Failed(err) => {
                warn!(%err, "focal mesh unavailable, rendering without it");
                self.focal = FocalSlot::Failed(err);
            }
        }
    }

    /// Renders the cloud and focal mesh over whatever `fb` already holds
    pub fn draw(&self, fb: &mut Framebuffer) {
        fb.clear_depth();
        let (width, height) = (fb.width() as f64, fb.height() as f64);

        if let Some(cloud) = &self.cloud {
            let spin = rotation_y(cloud.rotation_y);
            for p in &cloud.positions {
                let world = multiply_matrix_vector(&spin, p);
                if let Some((screen, depth)) = self.camera.project(&world, width, height) {
                    plot_point(fb, screen[0], screen[1], depth, cloud.color, cloud.opacity);
                }
            }
        }

        if let FocalSlot::Ready(focal) = &self.focal {
            self.draw_focal(focal, fb);
        }
    }

    fn draw_focal(&self, focal: &FocalMesh, fb: &mut Framebuffer) {
        let (width, height) = (fb.width() as f64, fb.height() as f64);
        let orientation = euler_xy(self.rotation.x, self.rotation.y);

        // Transform and project vertices
        let vertices: Vec<Option<Vertex>> = focal
            .mesh
            .positions
            .iter()
            .zip(focal.mesh.normals.iter())
            .map(|(p, n)| {
                let position = multiply_matrix_vector(&orientation, p);
                let normal = multiply_matrix_vector(&orientation, n);
                self.camera
                    .project(&position, width, height)
                    .map(|(screen_position, depth)| Vertex {
                        position,
                        screen_position,
                        depth,
                        normal,
                    })
            })
            .collect();

        for &[a, b, c] in &focal.mesh.triangles {
            let (Some(v0), Some(v1), Some(v2)) = (&vertices[a], &vertices[b], &vertices[c]) else {
                continue;
            };
            if self.wireframe {
                for (from, to) in [(v0, v1), (v1, v2), (v2, v0)] {
                    if on_canvas(from, width, height) && on_canvas(to, width, height) {
                        draw_line(
                            from.screen_position[0],
                            from.screen_position[1],
                            to.screen_position[0],
                            to.screen_position[1],
                            fb,
                            focal.material.color,
                        );
                    }
                }
            } else {
                draw_triangle(v0, v1, v2, fb, |position, normal| {
                    focal.material.shade(&self.lights, position, normal)
                });
            }
        }
    }

    /// Releases the focal mesh material and geometry. A load still in flight
    /// is abandoned. Returns false if there was nothing left to release.
    pub fn release_mesh(&mut self, ctx: &mut RenderContext) -> bool {
        match std::mem::replace(&mut self.focal, FocalSlot::Released) {
            FocalSlot::Ready(focal) => {
                ctx.release_resource(focal.material_id);
                ctx.release_resource(focal.geometry_id);
                true
            }
            FocalSlot::Pending(_) | FocalSlot::Failed(_) => true,
            FocalSlot::Released => false,
        }
    }

    /// Releases the background cloud's point buffer
    pub fn release_cloud(&mut self, ctx: &mut RenderContext) -> bool {
        match self.cloud.take() {
            Some(cloud) => ctx.release_resource(cloud.buffer_id),
            None => false,
        }
    }
}

/// Wireframe edges are only drawn when both ends are near the canvas
fn on_canvas(v: &Vertex, width: f64, height: f64) -> bool {
    let [x, y] = v.screen_position;
    (-width..=2.0 * width).contains(&x) && (-height..=2.0 * height).contains(&y)
}

impl ResizeConsumer for SceneViewer {
    fn on_resize(&mut self, size: ViewportSize) {
        self.camera.set_aspect(size.aspect());
    }
}
