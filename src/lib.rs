//! A drifting particle starfield behind an interactive rotating planet,
//! software-rendered into a framebuffer and shown in the terminal.
//!
//! [`LifecycleManager::mount`] wires everything to a [`Host`]; the returned
//! [`LifecycleHandle`] drives frames and tears the instance down again.

pub mod asset;
pub mod config;
pub mod context;
pub mod drag;
pub mod error;
pub mod graphics;
pub mod host;
pub mod lifecycle;
pub mod math;
pub mod particles;
pub mod resize;
pub mod scene;
pub mod scheduler;
pub mod state;
pub mod terminal;
pub mod vertex;

pub use config::{Cli, MountConfig};
pub use error::{Result, VizError};
pub use host::{Host, HostEvent, Surface};
pub use lifecycle::{LifecycleHandle, LifecycleManager, TeardownStep};
pub use terminal::TerminalHost;
