use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use planetviz::particles::{wrap, Particle, ParticleField};
use planetviz::resize::ViewportSize;

fn particle() -> impl Strategy<Value = Particle> {
    (0.0..1.0f64, 0.0..1.0f64, -50.0..50.0f64, -50.0..50.0f64).prop_map(|(u, v, vx, vy)| {
        Particle {
            x: u,
            y: v,
            vx,
            vy,
            z: 0.5,
            r: 1.0,
        }
    })
}

proptest! {
    #[test]
    fn stepping_keeps_count_and_bounds(
        seed in any::<u64>(),
        n in 0usize..64,
        width in 1u32..300,
        height in 1u32..300,
        steps in 0usize..40,
    ) {
        let bounds = ViewportSize::new(width, height).unwrap();
        let mut field = ParticleField::create_with_rng(n, bounds, &mut StdRng::seed_from_u64(seed));
        for _ in 0..steps {
            field.step(bounds);
        }
        prop_assert_eq!(field.len(), n);
        for p in field.particles() {
            prop_assert!(p.x >= 0.0 && p.x < f64::from(width));
            prop_assert!(p.y >= 0.0 && p.y < f64::from(height));
        }
    }

    #[test]
    fn fast_particles_fold_back_after_resize(
        particles in proptest::collection::vec(particle(), 1..32),
        width in 1u32..50,
        height in 1u32..50,
    ) {
        // Start in a large viewport, then shrink: stragglers re-enter on the next step
        let large = ViewportSize::new(1000, 1000).unwrap();
        let scaled = particles
            .into_iter()
            .map(|p| Particle { x: p.x * 1000.0, y: p.y * 1000.0, ..p })
            .collect();
        let mut field = ParticleField::from_particles(scaled, large);
        let small = ViewportSize::new(width, height).unwrap();
        field.step(small);
        for p in field.particles() {
            prop_assert!((0.0..f64::from(width)).contains(&p.x));
            prop_assert!((0.0..f64::from(height)).contains(&p.y));
        }
    }

    #[test]
    fn wrap_stays_in_range(value in -1e6..1e6f64, extent in 1e-3..1e4f64) {
        let folded = wrap(value, extent);
        prop_assert!((0.0..extent).contains(&folded), "{} -> {}", value, folded);
    }
}
