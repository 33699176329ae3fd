use std::f64::consts::TAU;

/// Accumulated orientation of the focal mesh, in radians
///
/// The angles grow without bound; only their value modulo 2π is meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct RotationState {
    /// Current rotation angle around the X-axis
    pub x: f64,
    /// Current rotation angle around the Y-axis
    pub y: f64,
}

impl RotationState {
    /// Angles folded into `[0, 2π)`
    pub fn normalized(&self) -> (f64, f64) {
        (self.x.rem_euclid(TAU), self.y.rem_euclid(TAU))
    }
}

/// Presentation toggles that are not part of the scene itself
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewState {
    /// Draw triangle edges instead of shaded faces
    pub wireframe: bool,
    /// Overlay frame rate and rotation readouts
    pub debug: bool,
}
