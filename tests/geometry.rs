use burn_physics::domains::{Circle, Domain, Interval, Parallelogram, ProductDomain};
use burn_physics::samplers::{GridSampler, PointSampler, RandomUniformSampler, SamplerExt};
use burn_physics::{Points, r1, r2};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;

fn all_inside(domain: &dyn Domain, points: &Points) -> bool {
    domain.contains(points).unwrap().into_iter().all(|inside| inside)
}

fn rectangle_strategy() -> impl Strategy<Value = ([f32; 2], [f32; 2])> {
    (-1.0f32..1.0, -1.0f32..1.0, 0.5f32..2.0, 0.5f32..2.0)
        .prop_map(|(x, y, w, h)| ([x, y], [x + w, y + h]))
}

proptest! {
    #[test]
    fn random_points_lie_in_circles(
        cx in -2.0f32..2.0,
        cy in -2.0f32..2.0,
        radius in 0.1f32..3.0,
        n in 1usize..200,
        seed in any::<u64>(),
    ) {
        let circle = Circle::new(r2("x"), [cx, cy], radius).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let points = circle.sample_random_uniform(n, &mut rng).unwrap();
        prop_assert_eq!(points.len(), n);
        prop_assert!(all_inside(&circle, &points));

        let boundary = circle.boundary().unwrap();
        let edge = boundary.sample_random_uniform(n, &mut rng).unwrap();
        prop_assert!(all_inside(boundary.as_ref(), &edge));
    }

    #[test]
    fn grid_points_fill_rectangles_exactly(
        (lower, upper) in rectangle_strategy(),
        n in 1usize..300,
        seed in any::<u64>(),
    ) {
        let rect = Parallelogram::rectangle(r2("x"), lower, upper).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let grid = rect.sample_grid(n, &mut rng).unwrap();
        prop_assert_eq!(grid.len(), n);
        prop_assert!(all_inside(&rect, &grid));

        let boundary = rect.boundary().unwrap();
        let edge = boundary.sample_grid(n, &mut rng).unwrap();
        prop_assert_eq!(edge.len(), n);
        prop_assert!(all_inside(boundary.as_ref(), &edge));
    }

    #[test]
    fn product_samples_respect_both_factors(
        t_end in 0.1f32..5.0,
        n in 1usize..150,
        seed in any::<u64>(),
    ) {
        let t: Arc<dyn Domain> = Arc::new(Interval::new(r1("t"), 0.0, t_end).unwrap());
        let x: Arc<dyn Domain> = Arc::new(Circle::new(r2("x"), [0.0, 0.0], 1.0).unwrap());
        let product = ProductDomain::new(t, x).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        for points in [
            product.sample_random_uniform(n, &mut rng).unwrap(),
            product.sample_grid(n, &mut rng).unwrap(),
        ] {
            prop_assert_eq!(points.len(), n);
            prop_assert_eq!(points.space(), &(r1("t") * r2("x")));
            prop_assert!(all_inside(&product, &points));
        }
    }
}

#[test]
fn filtered_sampler_keeps_only_accepted_points() {
    let domain: Arc<dyn Domain> = Arc::new(Interval::new(r1("x"), -1.0, 1.0).unwrap());
    let mut sampler = RandomUniformSampler::new(domain, 64)
        .with_filter(Arc::new(|p: &Points| -> Vec<bool> { p.as_slice().iter().map(|x| *x > 0.0).collect() }));
    let mut rng = StdRng::seed_from_u64(7);
    let points = sampler.sample_points(&mut rng).unwrap();
    assert_eq!(points.len(), 64);
    assert!(points.as_slice().iter().all(|x| *x > 0.0));
}

#[test]
fn combined_samplers_build_space_time_points() {
    let t: Arc<dyn Domain> = Arc::new(Interval::new(r1("t"), 0.0, 1.0).unwrap());
    let x: Arc<dyn Domain> = Arc::new(Interval::new(r1("x"), 0.0, 2.0).unwrap());
    let mut rng = StdRng::seed_from_u64(3);

    let mut product = GridSampler::new(t.clone(), 4)
        .product(GridSampler::new(x.clone(), 5))
        .unwrap();
    let points = product.sample_points(&mut rng).unwrap();
    assert_eq!(points.len(), 20);
    assert_eq!(points.space(), &(r1("t") * r1("x")));

    let mut fixed = RandomUniformSampler::new(t, 10).make_static();
    let first = fixed.sample_points(&mut rng).unwrap();
    let second = fixed.sample_points(&mut rng).unwrap();
    assert_eq!(first, second);

    let mut joined = RandomUniformSampler::new(x.clone(), 3)
        .concat(GridSampler::new(x, 2))
        .unwrap();
    assert_eq!(joined.sample_points(&mut rng).unwrap().len(), 5);
}
