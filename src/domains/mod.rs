//! 残差点をサンプリングする幾何学的な領域。

mod circle;
mod interval;
mod parallelogram;
mod point;
mod product;

pub use circle::{Circle, CircleBoundary};
pub use interval::{Interval, IntervalBoundary};
pub use parallelogram::{Parallelogram, ParallelogramBoundary};
pub use point::Point;
pub use product::ProductDomain;

use crate::error::{PhysicsError, Result};
use crate::points::Points;
use crate::spaces::Space;
use rand::Rng;
use rand::rngs::StdRng;
use std::fmt;
use std::sync::Arc;

/// 境界上の判定に使う絶対許容誤差
pub const BOUNDARY_TOLERANCE: f32 = 1e-5;

/// 点をサンプリングできる領域。
pub trait Domain: fmt::Debug + Send + Sync {
    /// 領域が属する空間
    fn space(&self) -> &Space;

    /// 多様体としての次元（区間は1、区間の端点は0）
    fn dim(&self) -> usize;

    /// 各点が領域に含まれるかを判定します。
    fn contains(&self, points: &Points) -> Result<Vec<bool>>;

    /// 空間の各列についての `(最小値, 最大値)`
    fn bounding_box(&self) -> Vec<(f32, f32)>;

    /// 領域の測度。0次元の領域では点の個数です。
    fn volume(&self) -> f32;

    fn sample_random_uniform(&self, n: usize, rng: &mut StdRng) -> Result<Points>;

    /// 格子状の点を `n` 個生成します。格子で埋めきれない分はランダムな点で補います。
    fn sample_grid(&self, n: usize, rng: &mut StdRng) -> Result<Points>;

    /// 領域の境界。境界を持たない場合は `None`。
    fn boundary(&self) -> Option<Arc<dyn Domain>>;
}

/// 点群から領域の空間に対応する列を取り出します。
pub(crate) fn coordinates(domain: &dyn Domain, points: &Points) -> Result<Points> {
    points.select(domain.space())
}

pub(crate) fn ensure_space_dim(space: &Space, expected: usize, name: &str) -> Result<()> {
    if space.dim() != expected {
        return Err(PhysicsError::InvalidDomain(format!(
            "{} には {} 次元の空間が必要です ({} が与えられました)",
            name, expected, space
        )));
    }
    Ok(())
}

/// 格子点が `n` 個に満たない場合、ランダムな点で補います。
pub(crate) fn top_up(
    domain: &dyn Domain,
    grid: Points,
    n: usize,
    rng: &mut StdRng,
) -> Result<Points> {
    if grid.len() >= n {
        return Ok(grid);
    }
    let missing = n - grid.len();
    log::debug!(
        "格子点 {} 個に {} 個のランダムな点を追加します",
        grid.len(),
        missing
    );
    let extra = domain.sample_random_uniform(missing, rng)?;
    grid.append(&extra)
}

/// `n` 個の点を重みに比例して各部分へ割り振ります。
pub(crate) fn split_by_weight(n: usize, weights: &[f32]) -> Vec<usize> {
    let total: f32 = weights.iter().sum();
    if total <= 0.0 || weights.is_empty() {
        let mut counts = vec![0; weights.len()];
        if let Some(first) = counts.first_mut() {
            *first = n;
        }
        return counts;
    }
    let mut counts: Vec<usize> = weights
        .iter()
        .map(|w| ((w / total) * n as f32).floor() as usize)
        .collect();
    let assigned: usize = counts.iter().sum();
    let largest = weights
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    counts[largest] += n - assigned;
    counts
}

/// 重みに比例して確率的に割り振ります。
pub(crate) fn split_randomly(n: usize, weights: &[f32], rng: &mut StdRng) -> Vec<usize> {
    let total: f32 = weights.iter().sum();
    let mut counts = vec![0; weights.len()];
    if counts.is_empty() {
        return counts;
    }
    if total <= 0.0 {
        counts[0] = n;
        return counts;
    }
    for _ in 0..n {
        let mut r = rng.random_range(0.0..total);
        let mut chosen = weights.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if r < *w {
                chosen = i;
                break;
            }
            r -= w;
        }
        counts[chosen] += 1;
    }
    counts
}

/// 同じ空間上の領域の和集合。直積領域の境界に使われます。
#[derive(Debug, Clone)]
pub struct UnionDomain {
    parts: Vec<Arc<dyn Domain>>,
    space: Space,
}

impl UnionDomain {
    pub fn new(parts: Vec<Arc<dyn Domain>>) -> Result<Self> {
        let space = match parts.first() {
            Some(first) => first.space().clone(),
            None => {
                return Err(PhysicsError::InvalidDomain(
                    "和集合には少なくとも1つの領域が必要です".to_string(),
                ));
            }
        };
        for part in &parts {
            if part.space() != &space {
                return Err(PhysicsError::SpaceMismatch {
                    expected: space.to_string(),
                    found: part.space().to_string(),
                });
            }
        }
        Ok(UnionDomain { parts, space })
    }

    fn weights(&self) -> Vec<f32> {
        self.parts.iter().map(|p| p.volume()).collect()
    }

    fn collect(&self, samples: Vec<Points>) -> Result<Points> {
        let mut out = Points::empty(self.space.clone());
        for s in samples {
            out = out.append(&s)?;
        }
        Ok(out)
    }
}

impl Domain for UnionDomain {
    fn space(&self) -> &Space {
        &self.space
    }

    fn dim(&self) -> usize {
        self.parts.iter().map(|p| p.dim()).max().unwrap_or(0)
    }

    fn contains(&self, points: &Points) -> Result<Vec<bool>> {
        let mut inside = vec![false; points.len()];
        for part in &self.parts {
            for (flag, hit) in inside.iter_mut().zip(part.contains(points)?) {
                *flag |= hit;
            }
        }
        Ok(inside)
    }

    fn bounding_box(&self) -> Vec<(f32, f32)> {
        let mut bounds = vec![(f32::INFINITY, f32::NEG_INFINITY); self.space.dim()];
        for part in &self.parts {
            for (b, (lo, hi)) in bounds.iter_mut().zip(part.bounding_box()) {
                b.0 = b.0.min(lo);
                b.1 = b.1.max(hi);
            }
        }
        bounds
    }

    fn volume(&self) -> f32 {
        self.weights().iter().sum()
    }

    fn sample_random_uniform(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        let counts = split_randomly(n, &self.weights(), rng);
        let mut samples = Vec::with_capacity(self.parts.len());
        for (part, count) in self.parts.iter().zip(counts) {
            samples.push(part.sample_random_uniform(count, rng)?);
        }
        self.collect(samples)
    }

    fn sample_grid(&self, n: usize, rng: &mut StdRng) -> Result<Points> {
        let counts = split_by_weight(n, &self.weights());
        let mut samples = Vec::with_capacity(self.parts.len());
        for (part, count) in self.parts.iter().zip(counts) {
            samples.push(part.sample_grid(count, rng)?);
        }
        self.collect(samples)
    }

    fn boundary(&self) -> Option<Arc<dyn Domain>> {
        None
    }
}
