use super::{BOUNDARY_TOLERANCE, Domain, coordinates, ensure_space_dim, top_up};
use crate::error::{PhysicsError, Result};
use crate::points::Points;
use crate::spaces::Space;
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;

/// 2次元の平行四辺形。
///
/// `origin + a * (corner_1 - origin) + b * (corner_2 - origin)` (`a, b ∈ [0, 1]`)
/// で表される点の集合です。
#[derive(Debug, Clone)]
pub struct Parallelogram {
    space: Space,
    origin: [f32; 2],
    edge_1: [f32; 2],
    edge_2: [f32; 2],
    det: f32,
}

impl Parallelogram {
    pub fn new(space: Space, origin: [f32; 2], corner_1: [f32; 2], corner_2: [f32; 2]) -> Result<Self> {
        ensure_space_dim(&space, 2, "Parallelogram")?;
        let edge_1 = [corner_1[0] - origin[0], corner_1[1] - origin[1]];
        let edge_2 = [corner_2[0] - origin[0], corner_2[1] - origin[1]];
        let det = edge_1[0] * edge_2[1] - edge_1[1] * edge_2[0];
        if det.abs() <= f32::EPSILON {
            return Err(PhysicsError::InvalidDomain(
                "平行四辺形の辺が一次従属です".to_string(),
            ));
        }
        Ok(Parallelogram {
            space,
            origin,
            edge_1,
            edge_2,
            det,
        })
    }

    /// 軸に平行な長方形 `[x0, x1] × [y0, y1]`。
    pub fn rectangle(space: Space, lower: [f32; 2], upper: [f32; 2]) -> Result<Self> {
        Parallelogram::new(space, lower, [upper[0], lower[1]], [lower[0], upper[1]])
    }

    fn point_at(&self, a: f32, b: f32) -> [f32; 2] {
        [
            self.origin[0] + a * self.edge_1[0] + b * self.edge_2[0],
            self.origin[1] + a * self.edge_1[1] + b * self.edge_2[1],
        ]
    }

    /// 座標を辺ベクトルに関するパラメータ `(a, b)` に変換します。
    fn parameters(&self, x: &[f32]) -> (f32, f32) {
        let px = x[0] - self.origin[0];
        let py = x[1] - self.origin[1];
        let a = (px * self.edge_2[1] - py * self.edge_2[0]) / self.det;
        let b = (self.edge_1[0] * py - self.edge_1[1] * px) / self.det;
        (a, b)
    }

    fn side_lengths(&self) -> (f32, f32) {
        (norm(self.edge_1), norm(self.edge_2))
    }

    fn from_parameters(&self, params: impl Iterator<Item = (f32, f32)>) -> Result<Points> {
        let mut data = Vec::new();
        for (a, b) in params {
            data.extend_from_slice(&self.point_at(a, b));
        }
        Points::new(data, self.space.clone())
    }
}

fn norm(v: [f32; 2]) -> f32 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}

impl Domain for Parallelogram {
    fn space(&self) -> &Space {
        &self.space
    }

    fn dim(&self) -> usize {
        2
    }

    fn contains(&self, points: &Points) -> Result<Vec<bool>> {
        let coords = coordinates(self, points)?;
        let inside = |t: f32| (-BOUNDARY_TOLERANCE..=1.0 + BOUNDARY_TOLERANCE).contains(&t);
        Ok((0..coords.len())
            .map(|i| {
                let (a, b) = self.parameters(coords.row(i));
                inside(a) && inside(b)
            })
            .collect())
    }

    fn bounding_box(&self) -> Vec<(f32, f32)> {
        let corners = [
            self.point_at(0.0, 0.0),
            self.point_at(1.0, 0.0),
            self.point_at(0.0, 1.0),
            self.point_at(1.0, 1.0),
        ];
        (0..2)
            .map(|k| {
                corners.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), c| {
                    (lo.min(c[k]), hi.max(c[k]))
                })
            })
            .collect()
    }

    fn volume(&self) -> f32 {
        self.det.abs()
    }

    fn sample_random_uniform(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        let params: Vec<(f32, f32)> = (0..n)
            .map(|_| (rng.random::<f32>(), rng.random::<f32>()))
            .collect();
        self.from_parameters(params.into_iter())
    }

    fn sample_grid(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        if n == 0 {
            return Points::new(Vec::new(), self.space.clone());
        }
        let (l1, l2) = self.side_lengths();
        let nx = ((n as f32 * l1 / l2).sqrt().floor() as usize).clamp(1, n);
        let ny = (n / nx).max(1);
        let grid = self.from_parameters((0..nx).flat_map(|i| {
            (0..ny).map(move |j| {
                (
                    (i + 1) as f32 / (nx + 1) as f32,
                    (j + 1) as f32 / (ny + 1) as f32,
                )
            })
        }))?;
        top_up(self, grid, n, rng)
    }

    fn boundary(&self) -> Option<Arc<dyn Domain>> {
        Some(Arc::new(ParallelogramBoundary {
            interior: self.clone(),
        }))
    }
}

/// 平行四辺形の4辺からなる1次元の境界。
#[derive(Debug, Clone)]
pub struct ParallelogramBoundary {
    interior: Parallelogram,
}

impl ParallelogramBoundary {
    /// 周上の位置 `s ∈ [0, 周長)` を辺のパラメータに写します。
    fn position(&self, s: f32) -> (f32, f32) {
        let (l1, l2) = self.interior.side_lengths();
        if s < l1 {
            (s / l1, 0.0)
        } else if s < l1 + l2 {
            (1.0, (s - l1) / l2)
        } else if s < 2.0 * l1 + l2 {
            (1.0 - (s - l1 - l2) / l1, 1.0)
        } else {
            (0.0, (1.0 - (s - 2.0 * l1 - l2) / l2).max(0.0))
        }
    }
}

impl Domain for ParallelogramBoundary {
    fn space(&self) -> &Space {
        &self.interior.space
    }

    fn dim(&self) -> usize {
        1
    }

    fn contains(&self, points: &Points) -> Result<Vec<bool>> {
        let coords = coordinates(self, points)?;
        let near = |t: f32, v: f32| (t - v).abs() <= BOUNDARY_TOLERANCE;
        let inside = |t: f32| (-BOUNDARY_TOLERANCE..=1.0 + BOUNDARY_TOLERANCE).contains(&t);
        Ok((0..coords.len())
            .map(|i| {
                let (a, b) = self.interior.parameters(coords.row(i));
                inside(a)
                    && inside(b)
                    && (near(a, 0.0) || near(a, 1.0) || near(b, 0.0) || near(b, 1.0))
            })
            .collect())
    }

    fn bounding_box(&self) -> Vec<(f32, f32)> {
        self.interior.bounding_box()
    }

    fn volume(&self) -> f32 {
        let (l1, l2) = self.interior.side_lengths();
        2.0 * (l1 + l2)
    }

    fn sample_random_uniform(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        let perimeter = self.volume();
        let params: Vec<(f32, f32)> = (0..n)
            .map(|_| self.position(rng.random_range(0.0..perimeter)))
            .collect();
        self.interior.from_parameters(params.into_iter())
    }

    fn sample_grid(&self, n: usize, _rng: &mut StdRng) -> Result<Points> {
        let perimeter = self.volume();
        let params: Vec<(f32, f32)> = (0..n)
            .map(|i| self.position(i as f32 * perimeter / n as f32))
            .collect();
        self.interior.from_parameters(params.into_iter())
    }

    fn boundary(&self) -> Option<Arc<dyn Domain>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::r2;
    use rand::SeedableRng;

    #[test]
    fn rejects_degenerate_corners() {
        assert!(Parallelogram::new(r2("x"), [0.0, 0.0], [1.0, 1.0], [2.0, 2.0]).is_err());
    }

    #[test]
    fn grid_fills_requested_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let square = Parallelogram::rectangle(r2("x"), [0.0, 0.0], [1.0, 1.0]).unwrap();
        let grid = square.sample_grid(50, &mut rng).unwrap();
        assert_eq!(grid.len(), 50);
        assert!(square.contains(&grid).unwrap().iter().all(|&b| b));
    }

    #[test]
    fn boundary_points_lie_on_edges() {
        let mut rng = StdRng::seed_from_u64(2);
        let shape = Parallelogram::new(r2("x"), [0.0, 0.0], [2.0, 0.0], [1.0, 1.0]).unwrap();
        let boundary = shape.boundary().unwrap();
        let points = boundary.sample_random_uniform(200, &mut rng).unwrap();
        assert_eq!(points.len(), 200);
        assert!(boundary.contains(&points).unwrap().iter().all(|&b| b));
        let centre = Points::new(vec![1.0, 0.5], r2("x")).unwrap();
        assert_eq!(boundary.contains(&centre).unwrap(), vec![false]);
        assert_eq!(shape.contains(&centre).unwrap(), vec![true]);
    }
}
