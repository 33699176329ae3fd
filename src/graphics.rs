use crate::math::{edge_function, Color};
use crate::resize::{ResizeConsumer, ViewportSize};
use crate::vertex::Vertex;

/// Software colour + depth buffer the scene and backdrop are drawn into
#[derive(Clone, Debug)]
pub struct Framebuffer {
    width: usize,
    height: usize,
    background: Color,
    pixels: Vec<Color>,
    depth: Vec<f64>,
}

impl Framebuffer {
    pub fn new(size: ViewportSize, background: Color) -> Self {
        let len = size.width as usize * size.height as usize;
        Framebuffer {
            width: size.width as usize,
            height: size.height as usize,
            background,
            pixels: vec![background; len],
            depth: vec![f64::INFINITY; len],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Color {
        self.pixels[y * self.width + x]
    }

    /// Resets every pixel to the background colour
    pub fn clear_color(&mut self) {
        self.pixels.fill(self.background);
    }

    pub fn clear_depth(&mut self) {
        self.depth.fill(f64::INFINITY);
    }

    /// Number of pixels that differ from the background
    pub fn painted_pixels(&self) -> usize {
        self.pixels.iter().filter(|&&p| p != self.background).count()
    }

    /// Blends `color` over the pixel at (x, y); out-of-range coordinates are ignored
    pub fn blend(&mut self, x: isize, y: isize, color: Color, alpha: f64) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let offset = y as usize * self.width + x as usize;
        self.pixels[offset] = color.blend_over(self.pixels[offset], alpha);
    }

    /// Depth test that records `depth` when it is nearer than what the pixel holds
    fn test_and_set_depth(&mut self, offset: usize, depth: f64) -> bool {
        if depth < self.depth[offset] {
            self.depth[offset] = depth;
            true
        } else {
            false
        }
    }
}

impl ResizeConsumer for Framebuffer {
    fn on_resize(&mut self, size: ViewportSize) {
        *self = Framebuffer::new(size, self.background);
    }
}

/// Minimal 2D drawing surface used by the particle backdrop
pub trait Canvas2d {
    fn clear(&mut self);
    fn fill_disc(&mut self, x: f64, y: f64, radius: f64, color: Color, alpha: f64);
}

impl Canvas2d for Framebuffer {
    fn clear(&mut self) {
        self.clear_color();
    }

    fn fill_disc(&mut self, x: f64, y: f64, radius: f64, color: Color, alpha: f64) {
        let reach = radius.max(0.5);
        // Sub-pixel discs still light the pixel they sit in
        let (home_x, home_y) = (x.floor() as isize, y.floor() as isize);
        let min_x = (x - reach).floor() as isize;
        let max_x = (x + reach).ceil() as isize;
        let min_y = (y - reach).floor() as isize;
        let max_y = (y + reach).ceil() as isize;
        for py in min_y..=max_y {
            for px in min_x..=max_x {
                let cx = px as f64 + 0.5 - x;
                let cy = py as f64 + 0.5 - y;
                if cx * cx + cy * cy <= reach * reach || (px == home_x && py == home_y) {
                    self.blend(px, py, color, alpha);
                }
            }
        }
    }
}

/// Draws a depth-tested triangle, shading each covered pixel with `shade`
/// (given the interpolated view-space position and normal)
pub fn draw_triangle<F>(v0: &Vertex, v1: &Vertex, v2: &Vertex, fb: &mut Framebuffer, shade: F)
where
    F: Fn(&[f64; 3], &[f64; 3]) -> Color,
{
    if fb.width == 0 || fb.height == 0 {
        return;
    }

    // Compute bounding box of the triangle
    let min_x = v0.screen_position[0]
        .min(v1.screen_position[0])
        .min(v2.screen_position[0])
        .floor()
        .max(0.0);
    let max_x = v0.screen_position[0]
        .max(v1.screen_position[0])
        .max(v2.screen_position[0])
        .ceil()
        .min(fb.width as f64 - 1.0);
    let min_y = v0.screen_position[1]
        .min(v1.screen_position[1])
        .min(v2.screen_position[1])
        .floor()
        .max(0.0);
    let max_y = v0.screen_position[1]
        .max(v1.screen_position[1])
        .max(v2.screen_position[1])
        .ceil()
        .min(fb.height as f64 - 1.0);
    if min_x > max_x || min_y > max_y {
        return;
    }

    // Precompute area of the triangle; degenerate ones cover nothing
    let area = edge_function(&v0.screen_position, &v1.screen_position, &v2.screen_position);
    if area.abs() <= f64::EPSILON {
        return;
    }

    for y in min_y as usize..=max_y as usize {
        for x in min_x as usize..=max_x as usize {
            let p = [x as f64 + 0.5, y as f64 + 0.5];

            // Normalized barycentric coordinates; the sign of `area` absorbs winding
            let w0 = edge_function(&v1.screen_position, &v2.screen_position, &p) / area;
            let w1 = edge_function(&v2.screen_position, &v0.screen_position, &p) / area;
            let w2 = edge_function(&v0.screen_position, &v1.screen_position, &p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let depth = v0.depth * w0 + v1.depth * w1 + v2.depth * w2;
            let offset = y * fb.width + x;
            if !fb.test_and_set_depth(offset, depth) {
                continue;
            }

            let lerp = |a: &[f64; 3], b: &[f64; 3], c: &[f64; 3]| {
                [
                    a[0] * w0 + b[0] * w1 + c[0] * w2,
                    a[1] * w0 + b[1] * w1 + c[1] * w2,
                    a[2] * w0 + b[2] * w1 + c[2] * w2,
                ]
            };
            let position = lerp(&v0.position, &v1.position, &v2.position);
            let normal = crate::math::normalize(&lerp(&v0.normal, &v1.normal, &v2.normal));
            fb.pixels[offset] = shade(&position, &normal);
        }
    }
}

/// Draws a line between two points using Bresenham's algorithm
pub fn draw_line(x0: f64, y0: f64, x1: f64, y1: f64, fb: &mut Framebuffer, color: Color) {
    let (mut x0, mut y0, x1, y1) = (
        x0.round() as isize,
        y0.round() as isize,
        x1.round() as isize,
        y1.round() as isize,
    );
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy; // error value e_xy

    loop {
        fb.blend(x0, y0, color, 1.0);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Plots a single depth-tested point
pub fn plot_point(fb: &mut Framebuffer, x: f64, y: f64, depth: f64, color: Color, alpha: f64) {
    if x < 0.0 || y < 0.0 {
        return;
    }
    let (px, py) = (x as usize, y as usize);
    if px >= fb.width || py >= fb.height {
        return;
    }
    let offset = py * fb.width + px;
    if fb.test_and_set_depth(offset, depth) {
        fb.pixels[offset] = color.blend_over(fb.pixels[offset], alpha);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fb(w: u32, h: u32) -> Framebuffer {
        Framebuffer::new(ViewportSize::new(w, h).unwrap(), Color::BLACK)
    }

    fn vertex(x: f64, y: f64, depth: f64) -> Vertex {
        Vertex {
            position: [x, y, -depth],
            screen_position: [x, y],
            depth,
            normal: [0.0, 0.0, 1.0],
        }
    }

    #[test]
    fn triangle_fills_regardless_of_winding() {
        let mut a = fb(16, 16);
        let mut b = fb(16, 16);
        let (p, q, r) = (vertex(1.0, 1.0, 1.0), vertex(14.0, 1.0, 1.0), vertex(1.0, 14.0, 1.0));
        draw_triangle(&p, &q, &r, &mut a, |_, _| Color::WHITE);
        draw_triangle(&p, &r, &q, &mut b, |_, _| Color::WHITE);
        assert!(a.painted_pixels() > 50);
        assert_eq!(a.painted_pixels(), b.painted_pixels());
    }

    #[test]
    fn nearer_triangle_wins_depth_test() {
        let mut f = fb(8, 8);
        let red = Color::rgb8(255, 0, 0);
        let near = [vertex(0.0, 0.0, 1.0), vertex(8.0, 0.0, 1.0), vertex(0.0, 8.0, 1.0)];
        let far = [vertex(0.0, 0.0, 5.0), vertex(8.0, 0.0, 5.0), vertex(0.0, 8.0, 5.0)];
        draw_triangle(&near[0], &near[1], &near[2], &mut f, |_, _| red);
        draw_triangle(&far[0], &far[1], &far[2], &mut f, |_, _| Color::WHITE);
        assert_eq!(f.pixel(1, 1), red);
    }

    #[test]
    fn disc_outside_surface_is_clipped() {
        let mut f = fb(4, 4);
        f.fill_disc(-10.0, -10.0, 1.5, Color::WHITE, 1.0);
        assert_eq!(f.painted_pixels(), 0);
        f.fill_disc(2.0, 2.0, 0.3, Color::WHITE, 1.0);
        assert!(f.painted_pixels() >= 1);
    }
}
