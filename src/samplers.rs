//! 領域から点群を生成するサンプラー。

use crate::domains::Domain;
use crate::error::{PhysicsError, Result};
use crate::points::Points;
use crate::spaces::Space;
use rand::rngs::StdRng;
use rand::seq::index;
use std::sync::Arc;

/// サンプリングした点を残すかどうかを判定するフィルタ。
pub type PointFilter = Arc<dyn Fn(&Points) -> Vec<bool> + Send + Sync>;

/// ランダムサンプリングでフィルタを満たす点を探す最大回数
const MAX_FILTER_ROUNDS: usize = 100;

/// 損失の評価に使う点群の生成器。
pub trait PointSampler: Send {
    fn sample_points(&mut self, rng: &mut StdRng) -> Result<Points>;

    /// 1回のサンプリングで生成される点の数
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn space(&self) -> &Space;
}

/// サンプラーを組み合わせるための拡張メソッド。
pub trait SamplerExt: PointSampler + Sized + 'static {
    /// 初回のサンプリング結果を保持し、以降は同じ点を返すようにします。
    fn make_static(self) -> StaticSampler {
        StaticSampler::new(Box::new(self))
    }

    /// 同じ空間の点を行方向に連結します。
    fn concat<S: PointSampler + 'static>(self, other: S) -> Result<ConcatSampler> {
        ConcatSampler::new(Box::new(self), Box::new(other))
    }

    /// 異なる空間の点を列方向に結合します。
    fn append<S: PointSampler + 'static>(self, other: S) -> Result<AppendSampler> {
        AppendSampler::new(Box::new(self), Box::new(other))
    }

    /// 全ての点の組み合わせを作ります。
    fn product<S: PointSampler + 'static>(self, other: S) -> Result<ProductSampler> {
        ProductSampler::new(Box::new(self), Box::new(other))
    }
}

impl<T: PointSampler + 'static> SamplerExt for T {}

fn apply_filter(points: Points, filter: &PointFilter) -> Result<Points> {
    let keep = filter(&points);
    let indices: Vec<usize> = keep
        .iter()
        .enumerate()
        .filter_map(|(i, &k)| k.then_some(i))
        .collect();
    points.rows(&indices)
}

/// 領域上の一様ランダムサンプラー。
pub struct RandomUniformSampler {
    domain: Arc<dyn Domain>,
    n_points: usize,
    filter: Option<PointFilter>,
}

impl RandomUniformSampler {
    pub fn new(domain: Arc<dyn Domain>, n_points: usize) -> Self {
        RandomUniformSampler {
            domain,
            n_points,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: PointFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl PointSampler for RandomUniformSampler {
    fn sample_points(&mut self, rng: &mut StdRng) -> Result<Points> {
        let Some(filter) = &self.filter else {
            return self.domain.sample_random_uniform(self.n_points, rng);
        };
        let mut points = Points::empty(self.domain.space().clone());
        for _ in 0..MAX_FILTER_ROUNDS {
            let missing = self.n_points - points.len();
            if missing == 0 {
                return Ok(points);
            }
            let candidates = self.domain.sample_random_uniform(missing, rng)?;
            let accepted = apply_filter(candidates, filter)?;
            points = points.append(&accepted)?;
        }
        if points.len() == self.n_points {
            return Ok(points);
        }
        Err(PhysicsError::Sampling(format!(
            "{} 回の試行でフィルタを満たす点が {} / {} 個しか見つかりませんでした",
            MAX_FILTER_ROUNDS,
            points.len(),
            self.n_points
        )))
    }

    fn len(&self) -> usize {
        self.n_points
    }

    fn space(&self) -> &Space {
        self.domain.space()
    }
}

/// 領域上の格子点サンプラー。
pub struct GridSampler {
    domain: Arc<dyn Domain>,
    n_points: usize,
    filter: Option<PointFilter>,
}

impl GridSampler {
    pub fn new(domain: Arc<dyn Domain>, n_points: usize) -> Self {
        GridSampler {
            domain,
            n_points,
            filter: None,
        }
    }

    /// フィルタを満たさない格子点は取り除かれ、ランダムな点で補われます。
    pub fn with_filter(mut self, filter: PointFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl PointSampler for GridSampler {
    fn sample_points(&mut self, rng: &mut StdRng) -> Result<Points> {
        let grid = self.domain.sample_grid(self.n_points, rng)?;
        let Some(filter) = self.filter.clone() else {
            return Ok(grid);
        };
        let grid = apply_filter(grid, &filter)?;
        let missing = self.n_points - grid.len();
        if missing == 0 {
            return Ok(grid);
        }
        log::debug!("フィルタで除外された格子点 {} 個を補います", missing);
        let mut extra =
            RandomUniformSampler::new(self.domain.clone(), missing).with_filter(filter);
        grid.append(&extra.sample_points(rng)?)
    }

    fn len(&self) -> usize {
        self.n_points
    }

    fn space(&self) -> &Space {
        self.domain.space()
    }
}

/// 最初に生成した点群を保持し続けるサンプラー。
pub struct StaticSampler {
    inner: Box<dyn PointSampler>,
    cache: Option<Points>,
}

impl StaticSampler {
    pub fn new(inner: Box<dyn PointSampler>) -> Self {
        StaticSampler { inner, cache: None }
    }
}

impl PointSampler for StaticSampler {
    fn sample_points(&mut self, rng: &mut StdRng) -> Result<Points> {
        if let Some(points) = &self.cache {
            return Ok(points.clone());
        }
        let points = self.inner.sample_points(rng)?;
        self.cache = Some(points.clone());
        Ok(points)
    }

    fn len(&self) -> usize {
        match &self.cache {
            Some(points) => points.len(),
            None => self.inner.len(),
        }
    }

    fn space(&self) -> &Space {
        self.inner.space()
    }
}

/// 2つのサンプラーの点を行方向に連結します。
pub struct ConcatSampler {
    first: Box<dyn PointSampler>,
    second: Box<dyn PointSampler>,
}

impl ConcatSampler {
    pub fn new(first: Box<dyn PointSampler>, second: Box<dyn PointSampler>) -> Result<Self> {
        if !first.space().same_variables(second.space()) {
            return Err(PhysicsError::SpaceMismatch {
                expected: first.space().to_string(),
                found: second.space().to_string(),
            });
        }
        Ok(ConcatSampler { first, second })
    }
}

impl PointSampler for ConcatSampler {
    fn sample_points(&mut self, rng: &mut StdRng) -> Result<Points> {
        let a = self.first.sample_points(rng)?;
        let b = self.second.sample_points(rng)?;
        a.append(&b)
    }

    fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    fn space(&self) -> &Space {
        self.first.space()
    }
}

/// 2つのサンプラーの点を列方向に結合します。点の数が一致している必要があります。
pub struct AppendSampler {
    first: Box<dyn PointSampler>,
    second: Box<dyn PointSampler>,
    space: Space,
}

impl AppendSampler {
    pub fn new(first: Box<dyn PointSampler>, second: Box<dyn PointSampler>) -> Result<Self> {
        if first.len() != second.len() {
            return Err(PhysicsError::ShapeMismatch(format!(
                "結合するサンプラーの点数が一致しません: {} と {}",
                first.len(),
                second.len()
            )));
        }
        if !first.space().is_disjoint(second.space()) {
            return Err(PhysicsError::SpaceMismatch {
                expected: first.space().to_string(),
                found: second.space().to_string(),
            });
        }
        let space = first.space().product(second.space());
        Ok(AppendSampler {
            first,
            second,
            space,
        })
    }
}

impl PointSampler for AppendSampler {
    fn sample_points(&mut self, rng: &mut StdRng) -> Result<Points> {
        let a = self.first.sample_points(rng)?;
        let b = self.second.sample_points(rng)?;
        a.join(&b)
    }

    fn len(&self) -> usize {
        self.first.len()
    }

    fn space(&self) -> &Space {
        &self.space
    }
}

/// 2つのサンプラーの点の全ての組み合わせを生成します。
pub struct ProductSampler {
    first: Box<dyn PointSampler>,
    second: Box<dyn PointSampler>,
    space: Space,
}

impl ProductSampler {
    pub fn new(first: Box<dyn PointSampler>, second: Box<dyn PointSampler>) -> Result<Self> {
        if !first.space().is_disjoint(second.space()) {
            return Err(PhysicsError::SpaceMismatch {
                expected: first.space().to_string(),
                found: second.space().to_string(),
            });
        }
        let space = first.space().product(second.space());
        Ok(ProductSampler {
            first,
            second,
            space,
        })
    }
}

impl PointSampler for ProductSampler {
    fn sample_points(&mut self, rng: &mut StdRng) -> Result<Points> {
        let a = self.first.sample_points(rng)?;
        let b = self.second.sample_points(rng)?;
        a.cartesian(&b)
    }

    fn len(&self) -> usize {
        self.first.len() * self.second.len()
    }

    fn space(&self) -> &Space {
        &self.space
    }
}

/// 与えられた点群をそのまま、またはランダムなバッチとして返すサンプラー。
pub struct DataSampler {
    points: Points,
    batch_size: Option<usize>,
}

impl DataSampler {
    pub fn new(points: Points) -> Self {
        DataSampler {
            points,
            batch_size: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

impl PointSampler for DataSampler {
    fn sample_points(&mut self, rng: &mut StdRng) -> Result<Points> {
        match self.batch_size {
            Some(size) if size < self.points.len() => {
                let indices = index::sample(rng, self.points.len(), size).into_vec();
                self.points.rows(&indices)
            }
            _ => Ok(self.points.clone()),
        }
    }

    fn len(&self) -> usize {
        match self.batch_size {
            Some(size) => size.min(self.points.len()),
            None => self.points.len(),
        }
    }

    fn space(&self) -> &Space {
        self.points.space()
    }
}
