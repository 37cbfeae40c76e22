//! 空間上の点の集まり。

use crate::error::{PhysicsError, Result};
use crate::spaces::Space;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

/// `Space` 上の `n` 個の座標を行優先で保持します。
///
/// 行が点、列が空間の各成分に対応します。列の並びは `Space` の変数順です。
#[derive(Debug, Clone, PartialEq)]
pub struct Points {
    data: Vec<f32>,
    n: usize,
    space: Space,
}

impl Points {
    pub fn new(data: Vec<f32>, space: Space) -> Result<Self> {
        let dim = space.dim();
        let n = if dim == 0 {
            if !data.is_empty() {
                return Err(PhysicsError::ShapeMismatch(
                    "0次元空間にデータは格納できません".to_string(),
                ));
            }
            0
        } else {
            if data.len() % dim != 0 {
                return Err(PhysicsError::ShapeMismatch(format!(
                    "データ長 {} は空間の次元 {} で割り切れません",
                    data.len(),
                    dim
                )));
            }
            data.len() / dim
        };
        Ok(Points { data, n, space })
    }

    pub fn empty(space: Space) -> Self {
        Points {
            data: Vec::new(),
            n: 0,
            space,
        }
    }

    /// 変数ごとの列データから点群を作成します。各列は `n * dim(var)` 個の値を持ちます。
    pub fn from_columns(columns: Vec<(&str, usize, Vec<f32>)>) -> Result<Self> {
        let space = Space::new(columns.iter().map(|(name, dim, _)| (*name, *dim)));
        if space.dim() == 0 {
            return Ok(Points::empty(space));
        }
        let (_, first_dim, first) = &columns[0];
        let n = first.len() / (*first_dim).max(1);
        for (name, dim, values) in &columns {
            if values.len() != n * dim {
                return Err(PhysicsError::ShapeMismatch(format!(
                    "列 '{}' の長さ {} は {} 点と一致しません",
                    name,
                    values.len(),
                    n
                )));
            }
        }
        let mut data = Vec::with_capacity(n * space.dim());
        for i in 0..n {
            for (_, dim, values) in &columns {
                data.extend_from_slice(&values[i * dim..(i + 1) * dim]);
            }
        }
        Ok(Points {
            data,
            n,
            space,
        })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn dim(&self) -> usize {
        self.space.dim()
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn row(&self, i: usize) -> &[f32] {
        let dim = self.dim();
        &self.data[i * dim..(i + 1) * dim]
    }

    /// 変数の列を `n * dim(var)` 個の値として取り出します。
    pub fn column(&self, name: &str) -> Result<Vec<f32>> {
        let range = self.space.column_range(name)?;
        let mut out = Vec::with_capacity(self.n * range.len());
        for i in 0..self.n {
            out.extend_from_slice(&self.row(i)[range.clone()]);
        }
        Ok(out)
    }

    /// 列方向に結合します。行数が等しく、空間が共通の変数を持たない必要があります。
    pub fn join(&self, other: &Points) -> Result<Points> {
        if !self.space.is_disjoint(&other.space) {
            return Err(PhysicsError::SpaceMismatch {
                expected: self.space.to_string(),
                found: other.space.to_string(),
            });
        }
        if self.space.is_empty() {
            return Ok(other.clone());
        }
        if other.space.is_empty() {
            return Ok(self.clone());
        }
        if self.n != other.n {
            return Err(PhysicsError::ShapeMismatch(format!(
                "行数が一致しません: {} と {}",
                self.n, other.n
            )));
        }
        let mut data = Vec::with_capacity(self.data.len() + other.data.len());
        for i in 0..self.n {
            data.extend_from_slice(self.row(i));
            data.extend_from_slice(other.row(i));
        }
        Ok(Points {
            data,
            n: self.n,
            space: self.space.product(&other.space),
        })
    }

    /// 行方向に結合します。空間が一致する必要があります。
    pub fn append(&self, other: &Points) -> Result<Points> {
        let other = if other.space == self.space {
            other.clone()
        } else if other.space.same_variables(&self.space) {
            other.select(&self.space)?
        } else {
            return Err(PhysicsError::SpaceMismatch {
                expected: self.space.to_string(),
                found: other.space.to_string(),
            });
        };
        let mut data = self.data.clone();
        data.extend_from_slice(&other.data);
        Ok(Points {
            data,
            n: self.n + other.n,
            space: self.space.clone(),
        })
    }

    /// 全ての行の組み合わせを作成します。結果は `self.len() * other.len()` 行です。
    pub fn cartesian(&self, other: &Points) -> Result<Points> {
        let left = self.repeat_each(other.n);
        let right = other.repeat(self.n);
        left.join(&right)
    }

    /// 点群全体を `k` 回繰り返します。
    pub fn repeat(&self, k: usize) -> Points {
        let mut data = Vec::with_capacity(self.data.len() * k);
        for _ in 0..k {
            data.extend_from_slice(&self.data);
        }
        Points {
            data,
            n: self.n * k,
            space: self.space.clone(),
        }
    }

    /// 各行を `k` 回ずつ連続して繰り返します。
    pub fn repeat_each(&self, k: usize) -> Points {
        let mut data = Vec::with_capacity(self.data.len() * k);
        for i in 0..self.n {
            for _ in 0..k {
                data.extend_from_slice(self.row(i));
            }
        }
        Points {
            data,
            n: self.n * k,
            space: self.space.clone(),
        }
    }

    /// 指定したインデックスの行を集めます。
    pub fn rows(&self, indices: &[usize]) -> Result<Points> {
        let mut data = Vec::with_capacity(indices.len() * self.dim());
        for &i in indices {
            if i >= self.n {
                return Err(PhysicsError::ShapeMismatch(format!(
                    "行 {} は範囲外です (行数 {})",
                    i, self.n
                )));
            }
            data.extend_from_slice(self.row(i));
        }
        Ok(Points {
            data,
            n: indices.len(),
            space: self.space.clone(),
        })
    }

    /// 列を別の空間の並びに並べ替えます。`space` は部分空間でも構いません。
    pub fn select(&self, space: &Space) -> Result<Points> {
        let mut ranges = Vec::new();
        for (name, dim) in space.iter() {
            let range = self.space.column_range(name)?;
            if range.len() != dim {
                return Err(PhysicsError::SpaceMismatch {
                    expected: space.to_string(),
                    found: self.space.to_string(),
                });
            }
            ranges.push(range);
        }
        let mut data = Vec::with_capacity(self.n * space.dim());
        for i in 0..self.n {
            let row = self.row(i);
            for range in &ranges {
                data.extend_from_slice(&row[range.clone()]);
            }
        }
        Ok(Points {
            data,
            n: self.n,
            space: space.clone(),
        })
    }

    /// `[n, dim]` 形状のテンソルに変換します。
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let data = TensorData::new(self.data.clone(), [self.n, self.dim()]);
        Tensor::from_data(data, device)
    }

    /// `[n, dim]` 形状のテンソルから点群を作成します。
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 2>, space: Space) -> Result<Points> {
        let [n, dim] = tensor.dims();
        if dim != space.dim() {
            return Err(PhysicsError::ShapeMismatch(format!(
                "テンソルの列数 {} は空間 {} の次元と一致しません",
                dim, space
            )));
        }
        let data = tensor
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| PhysicsError::ShapeMismatch(format!("{:?}", e)))?;
        Ok(Points { data, n, space })
    }
}
