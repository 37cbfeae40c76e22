use super::{BOUNDARY_TOLERANCE, Domain, coordinates, ensure_space_dim, top_up};
use crate::error::{PhysicsError, Result};
use crate::points::Points;
use crate::spaces::Space;
use rand::Rng;
use rand::rngs::StdRng;
use std::f32::consts::PI;
use std::sync::Arc;

/// 2次元の円板。
#[derive(Debug, Clone)]
pub struct Circle {
    space: Space,
    center: [f32; 2],
    radius: f32,
}

impl Circle {
    pub fn new(space: Space, center: [f32; 2], radius: f32) -> Result<Self> {
        ensure_space_dim(&space, 2, "Circle")?;
        if !(radius > 0.0) {
            return Err(PhysicsError::InvalidDomain(format!(
                "半径は正でなければなりません ({})",
                radius
            )));
        }
        Ok(Circle {
            space,
            center,
            radius,
        })
    }

    fn distance(&self, x: &[f32]) -> f32 {
        let dx = x[0] - self.center[0];
        let dy = x[1] - self.center[1];
        (dx * dx + dy * dy).sqrt()
    }

    fn polar(&self, r: f32, angle: f32) -> [f32; 2] {
        [
            self.center[0] + r * angle.cos(),
            self.center[1] + r * angle.sin(),
        ]
    }
}

impl Domain for Circle {
    fn space(&self) -> &Space {
        &self.space
    }

    fn dim(&self) -> usize {
        2
    }

    fn contains(&self, points: &Points) -> Result<Vec<bool>> {
        let coords = coordinates(self, points)?;
        Ok((0..coords.len())
            .map(|i| self.distance(coords.row(i)) <= self.radius + BOUNDARY_TOLERANCE)
            .collect())
    }

    fn bounding_box(&self) -> Vec<(f32, f32)> {
        vec![
            (self.center[0] - self.radius, self.center[0] + self.radius),
            (self.center[1] - self.radius, self.center[1] + self.radius),
        ]
    }

    fn volume(&self) -> f32 {
        PI * self.radius * self.radius
    }

    /// 面積を保つように `r * sqrt(u)` で半径を選びます。
    fn sample_random_uniform(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        let mut data = Vec::with_capacity(2 * n);
        for _ in 0..n {
            let r = self.radius * rng.random::<f32>().sqrt();
            let angle = rng.random_range(0.0..2.0 * PI);
            data.extend_from_slice(&self.polar(r, angle));
        }
        Points::new(data, self.space.clone())
    }

    /// 正方格子を円板で切り取り、不足分をランダムな点で補います。
    fn sample_grid(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        if n == 0 {
            return Points::new(Vec::new(), self.space.clone());
        }
        let spacing = (self.volume() / n as f32).sqrt();
        let steps = (2.0 * self.radius / spacing).ceil() as usize;
        let mut data = Vec::with_capacity(2 * n);
        let mut count = 0;
        'outer: for i in 0..steps {
            for j in 0..steps {
                let x = [
                    self.center[0] - self.radius + (i as f32 + 0.5) * spacing,
                    self.center[1] - self.radius + (j as f32 + 0.5) * spacing,
                ];
                if self.distance(&x) < self.radius {
                    data.extend_from_slice(&x);
                    count += 1;
                    if count == n {
                        break 'outer;
                    }
                }
            }
        }
        let grid = Points::new(data, self.space.clone())?;
        top_up(self, grid, n, rng)
    }

    fn boundary(&self) -> Option<Arc<dyn Domain>> {
        Some(Arc::new(CircleBoundary {
            circle: self.clone(),
        }))
    }
}

/// 円周。
#[derive(Debug, Clone)]
pub struct CircleBoundary {
    circle: Circle,
}

impl Domain for CircleBoundary {
    fn space(&self) -> &Space {
        &self.circle.space
    }

    fn dim(&self) -> usize {
        1
    }

    fn contains(&self, points: &Points) -> Result<Vec<bool>> {
        let coords = coordinates(self, points)?;
        Ok((0..coords.len())
            .map(|i| (self.circle.distance(coords.row(i)) - self.circle.radius).abs() <= BOUNDARY_TOLERANCE)
            .collect())
    }

    fn bounding_box(&self) -> Vec<(f32, f32)> {
        self.circle.bounding_box()
    }

    fn volume(&self) -> f32 {
        2.0 * PI * self.circle.radius
    }

    fn sample_random_uniform(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        let mut data = Vec::with_capacity(2 * n);
        for _ in 0..n {
            let angle = rng.random_range(0.0..2.0 * PI);
            data.extend_from_slice(&self.circle.polar(self.circle.radius, angle));
        }
        Points::new(data, self.circle.space.clone())
    }

    fn sample_grid(&self, n: usize, _rng: &mut StdRng) -> Result<Points> {
        let mut data = Vec::with_capacity(2 * n);
        for i in 0..n {
            let angle = 2.0 * PI * i as f32 / n as f32;
            data.extend_from_slice(&self.circle.polar(self.circle.radius, angle));
        }
        Points::new(data, self.circle.space.clone())
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
    fn samples_stay_inside() {
        let mut rng = StdRng::seed_from_u64(3);
        let disc = Circle::new(r2("x"), [1.0, -1.0], 2.0).unwrap();
        for points in [
            disc.sample_random_uniform(300, &mut rng).unwrap(),
            disc.sample_grid(300, &mut rng).unwrap(),
        ] {
            assert_eq!(points.len(), 300);
            assert!(disc.contains(&points).unwrap().iter().all(|&b| b));
        }
    }

    #[test]
    fn boundary_samples_on_circle() {
        let mut rng = StdRng::seed_from_u64(4);
        let disc = Circle::new(r2("x"), [0.0, 0.0], 1.0).unwrap();
        let boundary = disc.boundary().unwrap();
        let points = boundary.sample_grid(16, &mut rng).unwrap();
        assert!(boundary.contains(&points).unwrap().iter().all(|&b| b));
        assert!((boundary.volume() - 2.0 * PI).abs() < 1e-6);
    }
}
