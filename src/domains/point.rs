use super::{BOUNDARY_TOLERANCE, Domain, coordinates};
use crate::error::{PhysicsError, Result};
use crate::points::Points;
use crate::spaces::Space;
use rand::rngs::StdRng;
use std::sync::Arc;

/// 1点だけからなる0次元の領域。
#[derive(Debug, Clone)]
pub struct Point {
    space: Space,
    coordinates: Vec<f32>,
}

impl Point {
    pub fn new(space: Space, coordinates: Vec<f32>) -> Result<Self> {
        if coordinates.len() != space.dim() {
            return Err(PhysicsError::InvalidDomain(format!(
                "点の座標数 {} は空間 {} の次元と一致しません",
                coordinates.len(),
                space
            )));
        }
        Ok(Point { space, coordinates })
    }

    pub fn coordinates(&self) -> &[f32] {
        &self.coordinates
    }

    fn repeated(&self, n: usize) -> Result<Points> {
        let mut data = Vec::with_capacity(n * self.coordinates.len());
        for _ in 0..n {
            data.extend_from_slice(&self.coordinates);
        }
        Points::new(data, self.space.clone())
    }
}

impl Domain for Point {
    fn space(&self) -> &Space {
        &self.space
    }

    fn dim(&self) -> usize {
        0
    }

    fn contains(&self, points: &Points) -> Result<Vec<bool>> {
        let coords = coordinates(self, points)?;
        Ok((0..coords.len())
            .map(|i| {
                coords
                    .row(i)
                    .iter()
                    .zip(&self.coordinates)
                    .all(|(x, c)| (x - c).abs() <= BOUNDARY_TOLERANCE)
            })
            .collect())
    }

    fn bounding_box(&self) -> Vec<(f32, f32)> {
        self.coordinates.iter().map(|&c| (c, c)).collect()
    }

    fn volume(&self) -> f32 {
        1.0
    }

    fn sample_random_uniform(&self, n: usize, _rng: &mut StdRng) -> Result<Points> {
        self.repeated(n)
    }

    fn sample_grid(&self, n: usize, _rng: &mut StdRng) -> Result<Points> {
        self.repeated(n)
    }

    fn boundary(&self) -> Option<Arc<dyn Domain>> {
        None
    }
}
