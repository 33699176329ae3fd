//! Drifting 2D particle backdrop on a torus.
//!
//! Particles move by a constant per-tick velocity (speed is tied to tick
//! count, not wall time). A coordinate that leaves `[0, bound)` is folded
//! back with a Euclidean remainder, so leaving one edge re-enters at the
//! opposite edge in the same step and a coordinate exactly on the far
//! bound becomes zero.

use rand::Rng;

use crate::graphics::Canvas2d;
use crate::math::Color;
use crate::resize::ViewportSize;

pub const DEFAULT_PARTICLE_COUNT: usize = 180;
/// Opacity of a particle at depth 1.0
pub const BASE_ALPHA: f64 = 0.6;
/// Width of the per-axis velocity range, centred on zero
pub const VELOCITY_SPAN: f64 = 0.2;
pub const MIN_DEPTH: f64 = 0.2;
pub const MIN_RADIUS: f64 = 0.3;
pub const MAX_RADIUS: f64 = 1.5;
/// oklch(0.78 0.14 190) rendered to sRGB
pub const PARTICLE_COLOR: Color = Color::rgb8(0, 208, 200);

/// A single simulated drifting point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    /// Depth in `(0, 1]`; scales opacity
    pub z: f64,
    pub r: f64,
}

impl Particle {
    pub fn alpha(&self) -> f64 {
        BASE_ALPHA * self.z
    }

    fn random<R: Rng + ?Sized>(rng: &mut R, bounds: ViewportSize) -> Self {
        Particle {
            x: rng.gen::<f64>() * bounds.width_f64(),
            y: rng.gen::<f64>() * bounds.height_f64(),
            vx: (rng.gen::<f64>() - 0.5) * VELOCITY_SPAN,
            vy: (rng.gen::<f64>() - 0.5) * VELOCITY_SPAN,
            z: rng.gen_range(MIN_DEPTH..=1.0),
            r: rng.gen_range(MIN_RADIUS..=MAX_RADIUS),
        }
    }
}

/// Fixed-size set of particles. The count never changes after creation.
#[derive(Clone, Debug)]
pub struct ParticleField {
    particles: Vec<Particle>,
    bounds: ViewportSize,
    color: Color,
}

impl ParticleField {
    /// Scatters `n` particles uniformly within `bounds`
    pub fn create(n: usize, bounds: ViewportSize) -> Self {
        Self::create_with_rng(n, bounds, &mut rand::thread_rng())
    }

    pub fn create_with_rng<R: Rng + ?Sized>(n: usize, bounds: ViewportSize, rng: &mut R) -> Self {
        let particles = (0..n).map(|_| Particle::random(rng, bounds)).collect();
        Self::from_particles(particles, bounds)
    }

    /// Builds a field from explicit particles, e.g. for a seeded layout
    pub fn from_particles(particles: Vec<Particle>, bounds: ViewportSize) -> Self {
        ParticleField {
            particles,
            bounds,
            color: PARTICLE_COLOR,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn bounds(&self) -> ViewportSize {
        self.bounds
    }

    /// Advances every particle by one tick inside `bounds`. The viewport is
    /// passed on every step; particles left outside a shrunken viewport fold
    /// back in here.
    pub fn step(&mut self, bounds: ViewportSize) {
        self.bounds = bounds;
        let (w, h) = (bounds.width_f64(), bounds.height_f64());
        for p in &mut self.particles {
            p.x = wrap(p.x + p.vx, w);
            p.y = wrap(p.y + p.vy, h);
        }
    }

    /// Clears `canvas` and paints every particle as a filled disc
    pub fn draw(&self, canvas: &mut dyn Canvas2d) {
        canvas.clear();
        for p in &self.particles {
            canvas.fill_disc(p.x, p.y, p.r, self.color, p.alpha());
        }
    }
}

/// Folds `value` into `[0, extent)`
pub fn wrap(value: f64, extent: f64) -> f64 {
    if (0.0..extent).contains(&value) {
        return value;
    }
    let folded = value.rem_euclid(extent);
    // rem_euclid can round up to `extent` for tiny negative inputs
    if folded >= extent {
        0.0
    } else {
        folded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Default)]
    struct CountingCanvas {
        clears: usize,
        discs: Vec<(f64, f64, f64, f64)>,
    }

    impl Canvas2d for CountingCanvas {
        fn clear(&mut self) {
            self.clears += 1;
            self.discs.clear();
        }

        fn fill_disc(&mut self, x: f64, y: f64, radius: f64, _color: Color, alpha: f64) {
            self.discs.push((x, y, radius, alpha));
        }
    }

    fn size(w: u32, h: u32) -> ViewportSize {
        ViewportSize::new(w, h).unwrap()
    }

    fn particle(x: f64, y: f64, vx: f64, vy: f64) -> Particle {
        Particle {
            x,
            y,
            vx,
            vy,
            z: 1.0,
            r: 1.0,
        }
    }

    #[test]
    fn corner_particles_wrap_to_opposite_edges() {
        let bounds = size(10, 10);
        let mut field = ParticleField::from_particles(
            vec![
                particle(0.0, 0.0, 1.0, 0.0),
                particle(10.0, 0.0, 0.0, 1.0),
                particle(0.0, 10.0, -1.0, 0.0),
                particle(10.0, 10.0, 0.0, -1.0),
            ],
            bounds,
        );
        field.step(bounds);
        let got: Vec<(f64, f64)> = field.particles().iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(got, vec![(1.0, 0.0), (0.0, 1.0), (9.0, 0.0), (0.0, 9.0)]);
    }

    #[test]
    fn random_init_respects_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        let bounds = size(120, 40);
        let field = ParticleField::create_with_rng(500, bounds, &mut rng);
        assert_eq!(field.len(), 500);
        for p in field.particles() {
            assert!((0.0..120.0).contains(&p.x));
            assert!((0.0..40.0).contains(&p.y));
            assert!(p.vx.abs() <= 0.1 && p.vy.abs() <= 0.1);
            assert!((MIN_DEPTH..=1.0).contains(&p.z));
            assert!((MIN_RADIUS..=MAX_RADIUS).contains(&p.r));
        }
    }

    #[test]
    fn step_into_smaller_viewport_folds_stragglers() {
        let mut field = ParticleField::from_particles(vec![particle(90.0, 5.0, 0.0, 0.0)], size(100, 10));
        field.step(size(50, 10));
        assert_eq!(field.bounds(), size(50, 10));
        assert_eq!(field.particles()[0].x, 40.0);
    }

    #[test]
    fn draw_clears_then_paints_each_particle_with_depth_alpha() {
        let mut field = ParticleField::from_particles(
            vec![particle(1.0, 1.0, 0.0, 0.0), Particle { z: 0.5, ..particle(2.0, 2.0, 0.0, 0.0) }],
            size(10, 10),
        );
        field.step(size(10, 10));
        let mut canvas = CountingCanvas::default();
        field.draw(&mut canvas);
        assert_eq!(canvas.clears, 1);
        assert_eq!(canvas.discs.len(), 2);
        assert!((canvas.discs[0].3 - 0.6).abs() < 1e-12);
        assert!((canvas.discs[1].3 - 0.3).abs() < 1e-12);
    }

    #[test]
    fn empty_field_steps_and_draws() {
        let mut field = ParticleField::create(0, size(4, 4));
        field.step(size(4, 4));
        let mut canvas = CountingCanvas::default();
        field.draw(&mut canvas);
        assert!(field.is_empty());
        assert_eq!(canvas.clears, 1);
    }

    #[test]
    fn wrap_handles_tiny_negative_values() {
        assert_eq!(wrap(-1e-18, 10.0), 0.0);
        assert_eq!(wrap(10.0, 10.0), 0.0);
        assert_eq!(wrap(-0.5, 10.0), 9.5);
    }
}
