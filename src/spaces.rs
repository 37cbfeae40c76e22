//! 微分方程式に現れる変数とその次元を定義する空間。

use crate::error::{PhysicsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Mul, Range};

/// 変数名と次元の順序付きリスト。
///
/// 同じ変数名を持つ次元は結合され、それ以外は生成順に並びます。
/// 例えば `r1("t") * r1("x")` は軸 `t` と `x` を持つ2次元空間です。
///
/// `==` は変数の並び順まで比較するため、`r1("t") * r1("x")` と `r1("x") * r1("t")` は等しくありません。
/// 順序を無視して比べるには [`Space::same_variables`] を使います。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Space {
    variables: Vec<(String, usize)>,
}

impl Space {
    /// 変数名と次元の組から空間を作成します。重複する変数名の次元は加算されます。
    pub fn new<S: Into<String>>(pairs: impl IntoIterator<Item = (S, usize)>) -> Self {
        let mut space = Space {
            variables: Vec::new(),
        };
        for (name, dim) in pairs {
            space.push(name.into(), dim);
        }
        space
    }

    /// 空の空間。
    pub fn empty() -> Self {
        Space {
            variables: Vec::new(),
        }
    }

    fn push(&mut self, name: String, dim: usize) {
        match self.variables.iter_mut().find(|(n, _)| *n == name) {
            Some((_, d)) => *d += dim,
            None => self.variables.push((name, dim)),
        }
    }

    /// 2つの空間の直積空間を作成します。
    pub fn product(&self, other: &Space) -> Space {
        let mut space = self.clone();
        for (name, dim) in &other.variables {
            space.push(name.clone(), *dim);
        }
        space
    }

    /// 空間の次元（各変数の次元の和）。
    pub fn dim(&self) -> usize {
        self.variables.iter().map(|(_, d)| d).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// 変数名を定義順に返します。
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.variables.iter().map(|(n, d)| (n.as_str(), *d))
    }

    /// 変数の次元。存在しない場合は `None`。
    pub fn variable_dim(&self, name: &str) -> Option<usize> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| *d)
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.variable_dim(name).is_some()
    }

    /// `other` の全変数がこの空間に、同じかそれ以下の次元で含まれるかを判定します。
    pub fn contains(&self, other: &Space) -> bool {
        other
            .iter()
            .all(|(name, dim)| self.variable_dim(name).is_some_and(|d| dim <= d))
    }

    /// 2つの空間が共通の変数を持たないかを判定します。
    pub fn is_disjoint(&self, other: &Space) -> bool {
        other.variables().all(|name| !self.contains_variable(name))
    }

    /// 順序を無視して同じ変数と次元を持つかを判定します。
    pub fn same_variables(&self, other: &Space) -> bool {
        self.contains(other) && other.contains(self)
    }

    /// 指定した変数からなる部分空間を、指定した順序で作成します。
    pub fn subspace(&self, names: &[&str]) -> Result<Space> {
        let mut pairs = Vec::with_capacity(names.len());
        for name in names {
            let dim = self
                .variable_dim(name)
                .ok_or_else(|| PhysicsError::UnknownVariable(name.to_string()))?;
            pairs.push((name.to_string(), dim));
        }
        Ok(Space::new(pairs))
    }

    /// 変数名で指定した連続範囲の部分空間。`end` は含みません。
    pub fn slice(&self, start: Option<&str>, end: Option<&str>) -> Result<Space> {
        let index_of = |name: &str| {
            self.variables
                .iter()
                .position(|(n, _)| n == name)
                .ok_or_else(|| PhysicsError::UnknownVariable(name.to_string()))
        };
        let from = start.map(index_of).transpose()?.unwrap_or(0);
        let to = end
            .map(index_of)
            .transpose()?
            .unwrap_or(self.variables.len());
        let pairs = self.variables[from..to.max(from)].to_vec();
        Ok(Space { variables: pairs })
    }

    /// 点群テンソル中で変数が占める列範囲。
    pub fn column_range(&self, name: &str) -> Result<Range<usize>> {
        let mut offset = 0;
        for (n, d) in &self.variables {
            if n == name {
                return Ok(offset..offset + d);
            }
            offset += d;
        }
        Err(PhysicsError::UnknownVariable(name.to_string()))
    }

    /// 空間の包含を要求し、満たさない場合はエラーを返します。
    pub fn ensure_contains(&self, other: &Space) -> Result<()> {
        if self.contains(other) {
            Ok(())
        } else {
            Err(PhysicsError::SpaceMismatch {
                expected: self.to_string(),
                found: other.to_string(),
            })
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Space{{")?;
        for (i, (name, dim)) in self.variables.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, dim)?;
        }
        write!(f, "}}")
    }
}

impl Mul for Space {
    type Output = Space;

    fn mul(self, rhs: Space) -> Space {
        self.product(&rhs)
    }
}

impl Mul for &Space {
    type Output = Space;

    fn mul(self, rhs: &Space) -> Space {
        self.product(rhs)
    }
}

/// 1次元実数空間。
pub fn r1(name: &str) -> Space {
    Space::new([(name, 1)])
}

/// 2次元実数空間。
pub fn r2(name: &str) -> Space {
    Space::new([(name, 2)])
}

/// 3次元実数空間。
pub fn r3(name: &str) -> Space {
    Space::new([(name, 3)])
}
