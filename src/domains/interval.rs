use super::{BOUNDARY_TOLERANCE, Domain, coordinates, ensure_space_dim};
use crate::error::{PhysicsError, Result};
use crate::points::Points;
use crate::spaces::Space;
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Arc;

/// 1次元の閉区間 `[lower, upper]`。
#[derive(Debug, Clone)]
pub struct Interval {
    space: Space,
    lower: f32,
    upper: f32,
}

impl Interval {
    pub fn new(space: Space, lower: f32, upper: f32) -> Result<Self> {
        ensure_space_dim(&space, 1, "Interval")?;
        if !(lower < upper) {
            return Err(PhysicsError::InvalidDomain(format!(
                "区間の下端 {} は上端 {} より小さくなければなりません",
                lower, upper
            )));
        }
        if !(upper - lower).is_finite() {
            return Err(PhysicsError::InvalidDomain(format!(
                "区間 [{}, {}] の幅が有限ではありません",
                lower, upper
            )));
        }
        Ok(Interval {
            space,
            lower,
            upper,
        })
    }

    pub fn lower(&self) -> f32 {
        self.lower
    }

    pub fn upper(&self) -> f32 {
        self.upper
    }

    /// 区間の両端点のみを含む境界。
    pub fn boundary_points(&self) -> IntervalBoundary {
        IntervalBoundary {
            space: self.space.clone(),
            lower: self.lower,
            upper: self.upper,
        }
    }
}

impl Domain for Interval {
    fn space(&self) -> &Space {
        &self.space
    }

    fn dim(&self) -> usize {
        1
    }

    fn contains(&self, points: &Points) -> Result<Vec<bool>> {
        let coords = coordinates(self, points)?;
        Ok(coords
            .as_slice()
            .iter()
            .map(|&x| {
                x >= self.lower - BOUNDARY_TOLERANCE && x <= self.upper + BOUNDARY_TOLERANCE
            })
            .collect())
    }

    fn bounding_box(&self) -> Vec<(f32, f32)> {
        vec![(self.lower, self.upper)]
    }

    fn volume(&self) -> f32 {
        self.upper - self.lower
    }

    fn sample_random_uniform(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        let data = (0..n)
            .map(|_| rng.random_range(self.lower..self.upper))
            .collect();
        Points::new(data, self.space.clone())
    }

    /// 端点を除いた等間隔の内点を生成します。
    fn sample_grid(&self, n: usize, _rng: &mut StdRng) -> Result<Points> {
        let width = self.upper - self.lower;
        let data = (0..n)
            .map(|i| self.lower + (i + 1) as f32 * width / (n + 1) as f32)
            .collect();
        Points::new(data, self.space.clone())
    }

    fn boundary(&self) -> Option<Arc<dyn Domain>> {
        Some(Arc::new(self.boundary_points()))
    }
}

/// 区間の両端点からなる0次元の境界。
#[derive(Debug, Clone)]
pub struct IntervalBoundary {
    space: Space,
    lower: f32,
    upper: f32,
}

impl Domain for IntervalBoundary {
    fn space(&self) -> &Space {
        &self.space
    }

    fn dim(&self) -> usize {
        0
    }

    fn contains(&self, points: &Points) -> Result<Vec<bool>> {
        let coords = coordinates(self, points)?;
        Ok(coords
            .as_slice()
            .iter()
            .map(|&x| {
                (x - self.lower).abs() <= BOUNDARY_TOLERANCE
                    || (x - self.upper).abs() <= BOUNDARY_TOLERANCE
            })
            .collect())
    }

    fn bounding_box(&self) -> Vec<(f32, f32)> {
        vec![(self.lower, self.upper)]
    }

    fn volume(&self) -> f32 {
        2.0
    }

    fn sample_random_uniform(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        let data = (0..n)
            .map(|_| {
                if rng.random_bool(0.5) {
                    self.lower
                } else {
                    self.upper
                }
            })
            .collect();
        Points::new(data, self.space.clone())
    }

    /// 下端と上端を交互に並べます。
    fn sample_grid(&self, n: usize, _rng: &mut StdRng) -> Result<Points> {
        let data = (0..n)
            .map(|i| if i % 2 == 0 { self.lower } else { self.upper })
            .collect();
        Points::new(data, self.space.clone())
    }

    fn boundary(&self) -> Option<Arc<dyn Domain>> {
        None
    }
}
