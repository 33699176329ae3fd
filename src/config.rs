//! Mount configuration and the command line that produces it.

use std::path::PathBuf;

use clap::Parser;

use crate::asset::MeshSource;
use crate::particles::DEFAULT_PARTICLE_COUNT;

pub const DEFAULT_FPS: u32 = 60;

/// Options recognised by [`crate::lifecycle::LifecycleManager::mount`]
#[derive(Clone, Debug, PartialEq)]
pub struct MountConfig {
    /// Particles in the 2D backdrop
    pub particle_count: usize,
    /// Spin the planet on its own
    pub auto_rotate: bool,
    /// Let the scroll wheel dolly the camera
    pub enable_zoom: bool,
    pub mesh_source: MeshSource,
    /// Draw the drifting 2D backdrop
    pub backdrop: bool,
    /// Mount the 3D scene viewer
    pub planet: bool,
    /// Include the counter-rotating 3D point cloud
    pub cloud: bool,
    pub wireframe: bool,
    pub debug: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            particle_count: DEFAULT_PARTICLE_COUNT,
            auto_rotate: true,
            enable_zoom: false,
            mesh_source: MeshSource::Sphere,
            backdrop: true,
            planet: true,
            cloud: true,
            wireframe: false,
            debug: false,
        }
    }
}

/// Drifting starfield and rotating planet, rendered in the terminal.
///
/// Drag with the left mouse button to turn the planet; q or Esc quits.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Number of particles in the drifting backdrop
    #[arg(short, long, default_value_t = DEFAULT_PARTICLE_COUNT)]
    pub particles: usize,

    /// Only rotate the planet while it is being dragged
    #[arg(long)]
    pub no_auto_rotate: bool,

    /// Enable scroll-wheel zoom
    #[arg(short, long)]
    pub zoom: bool,

    /// Focal mesh: `sphere`, a path to an OBJ file, or `file://<path>`
    #[arg(short, long, default_value = "sphere")]
    pub mesh: MeshSource,

    /// Hide the 2D particle backdrop
    #[arg(long)]
    pub no_backdrop: bool,

    /// Hide the 3D planet viewer
    #[arg(long)]
    pub no_planet: bool,

    /// Hide the 3D background point cloud
    #[arg(long)]
    pub no_cloud: bool,

    /// Target frame rate
    #[arg(long, default_value_t = DEFAULT_FPS, value_parser = clap::value_parser!(u32).range(1..=240))]
    pub fps: u32,

    /// Draw the planet as a wireframe
    #[arg(short, long)]
    pub wireframe: bool,

    /// Overlay frame rate and rotation readouts
    #[arg(short, long)]
    pub debug: bool,

    /// Write logs to this file (the terminal itself is used for drawing)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn mount_config(&self) -> MountConfig {
        MountConfig {
            particle_count: self.particles,
            auto_rotate: !self.no_auto_rotate,
            enable_zoom: self.zoom,
            mesh_source: self.mesh.clone(),
            backdrop: !self.no_backdrop,
            planet: !self.no_planet,
            cloud: !self.no_cloud,
            wireframe: self.wireframe,
            debug: self.debug,
        }
    }
}
