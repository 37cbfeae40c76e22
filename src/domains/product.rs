use super::{Domain, UnionDomain, top_up};
use crate::error::{PhysicsError, Result};
use crate::points::Points;
use crate::spaces::Space;
use rand::rngs::StdRng;
use std::sync::Arc;

/// 2つの領域の直積。例えば時間区間と空間領域の組み合わせ。
#[derive(Debug, Clone)]
pub struct ProductDomain {
    first: Arc<dyn Domain>,
    second: Arc<dyn Domain>,
    space: Space,
}

impl ProductDomain {
    pub fn new(first: Arc<dyn Domain>, second: Arc<dyn Domain>) -> Result<Self> {
        if !first.space().is_disjoint(second.space()) {
            return Err(PhysicsError::InvalidDomain(format!(
                "直積領域の空間 {} と {} は共通の変数を持てません",
                first.space(),
                second.space()
            )));
        }
        let space = first.space().product(second.space());
        Ok(ProductDomain {
            first,
            second,
            space,
        })
    }

    pub fn factors(&self) -> (&Arc<dyn Domain>, &Arc<dyn Domain>) {
        (&self.first, &self.second)
    }

    /// 格子点の個数を各因子の多様体次元に応じて分配します。
    ///
    /// 0次元の因子には点の個数（測度）だけ割り当て、全ての点が格子に現れるようにします。
    fn grid_split(&self, n: usize) -> (usize, usize) {
        let (d1, d2) = (self.first.dim(), self.second.dim());
        let locations = |domain: &Arc<dyn Domain>| (domain.volume().round() as usize).clamp(1, n);
        if d1 == 0 {
            let n1 = locations(&self.first);
            return (n1, n / n1);
        }
        if d2 == 0 {
            let n2 = locations(&self.second);
            return (n / n2, n2);
        }
        let share = d1 as f32 / (d1 + d2) as f32;
        let n1 = ((n as f32).powf(share).round() as usize).clamp(1, n);
        (n1, n / n1)
    }
}

impl Domain for ProductDomain {
    fn space(&self) -> &Space {
        &self.space
    }

    fn dim(&self) -> usize {
        self.first.dim() + self.second.dim()
    }

    fn contains(&self, points: &Points) -> Result<Vec<bool>> {
        let a = self.first.contains(points)?;
        let b = self.second.contains(points)?;
        Ok(a.into_iter().zip(b).map(|(x, y)| x && y).collect())
    }

    fn bounding_box(&self) -> Vec<(f32, f32)> {
        let mut bounds = self.first.bounding_box();
        bounds.extend(self.second.bounding_box());
        bounds
    }

    fn volume(&self) -> f32 {
        self.first.volume() * self.second.volume()
    }

    fn sample_random_uniform(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        let a = self.first.sample_random_uniform(n, rng)?;
        let b = self.second.sample_random_uniform(n, rng)?;
        a.join(&b)
    }

    fn sample_grid(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        if n == 0 {
            return Ok(Points::empty(self.space.clone()));
        }
        let (n1, n2) = self.grid_split(n);
        let a = self.first.sample_grid(n1, rng)?;
        let b = self.second.sample_grid(n2, rng)?;
        let grid = a.cartesian(&b)?;
        top_up(self, grid, n, rng)
    }

    /// `(∂A × B) ∪ (A × ∂B)`
    fn boundary(&self) -> Option<Arc<dyn Domain>> {
        // 境界は元の領域と同じ空間にあるため、各部分の因子は互いに素なまま
        let part = |first: Arc<dyn Domain>, second: Arc<dyn Domain>| -> Arc<dyn Domain> {
            debug_assert_eq!(first.space().product(second.space()), self.space);
            Arc::new(ProductDomain {
                first,
                second,
                space: self.space.clone(),
            })
        };
        let mut parts = Vec::with_capacity(2);
        if let Some(boundary) = self.first.boundary() {
            parts.push(part(boundary, self.second.clone()));
        }
        if let Some(boundary) = self.second.boundary() {
            parts.push(part(self.first.clone(), boundary));
        }
        if parts.is_empty() {
            return None;
        }
        Some(Arc::new(UnionDomain {
            parts,
            space: self.space.clone(),
        }))
    }
}
