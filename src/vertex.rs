/// Vertex structure with view-space position, screen position, depth and normal
#[derive(Clone, Copy, Debug)]
pub struct Vertex {
    pub position: [f64; 3],
    pub screen_position: [f64; 2],
    /// Distance along the camera's viewing axis
    pub depth: f64,
    pub normal: [f64; 3],
}
