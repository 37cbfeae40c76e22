//! DeepONet の入力となる関数空間と関数の集合。

use crate::domains::Domain;
use crate::error::{PhysicsError, Result};
use crate::points::Points;
use crate::samplers::PointSampler;
use crate::spaces::Space;
use rand::rngs::StdRng;
use std::sync::Arc;

/// 定義域 `input_domain` から `output_space` への関数の空間。
#[derive(Debug, Clone)]
pub struct FunctionSpace {
    input_domain: Arc<dyn Domain>,
    output_space: Space,
}

impl FunctionSpace {
    pub fn new(input_domain: Arc<dyn Domain>, output_space: Space) -> Self {
        FunctionSpace {
            input_domain,
            output_space,
        }
    }

    pub fn input_domain(&self) -> &Arc<dyn Domain> {
        &self.input_domain
    }

    pub fn input_space(&self) -> &Space {
        self.input_domain.space()
    }

    pub fn output_space(&self) -> &Space {
        &self.output_space
    }
}

/// 関数のバッチを生成する集合。
pub trait FunctionSet: Send {
    fn function_space(&self) -> &FunctionSpace;

    /// 1バッチに含まれる関数の数
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 関数を決めるパラメータを新たにサンプリングします。
    fn sample_params(&mut self, rng: &mut StdRng) -> Result<()>;

    /// 現在のパラメータの関数を `points` で評価します。
    ///
    /// 戻り値は `[len, points.len() * 出力次元]` の行優先データです。
    fn create_function_batch(&self, points: &Points) -> Result<Vec<f32>>;
}

/// パラメータ1組と入力点から関数値を計算するユーザー関数。
pub type ParametricFunction = Arc<dyn Fn(&Points, &Points) -> Vec<f32> + Send + Sync>;

/// パラメータ空間からのサンプリングでユーザー関数の族を作る関数集合。
pub struct CustomFunctionSet {
    function_space: FunctionSpace,
    parameter_sampler: Box<dyn PointSampler>,
    function: ParametricFunction,
    params: Option<Points>,
}

impl CustomFunctionSet {
    pub fn new(
        function_space: FunctionSpace,
        parameter_sampler: Box<dyn PointSampler>,
        function: ParametricFunction,
    ) -> Self {
        CustomFunctionSet {
            function_space,
            parameter_sampler,
            function,
            params: None,
        }
    }

    /// 最後にサンプリングしたパラメータ
    pub fn params(&self) -> Option<&Points> {
        self.params.as_ref()
    }
}

impl FunctionSet for CustomFunctionSet {
    fn function_space(&self) -> &FunctionSpace {
        &self.function_space
    }

    fn len(&self) -> usize {
        match &self.params {
            Some(params) => params.len(),
            None => self.parameter_sampler.len(),
        }
    }

    fn sample_params(&mut self, rng: &mut StdRng) -> Result<()> {
        self.params = Some(self.parameter_sampler.sample_points(rng)?);
        Ok(())
    }

    fn create_function_batch(&self, points: &Points) -> Result<Vec<f32>> {
        let params = self.params.as_ref().ok_or_else(|| {
            PhysicsError::Sampling(
                "関数を評価する前に sample_params を呼び出してください".to_string(),
            )
        })?;
        let inputs = points.select(self.function_space.input_space())?;
        let expected = inputs.len() * self.function_space.output_space.dim();
        let mut batch = Vec::with_capacity(params.len() * expected);
        for i in 0..params.len() {
            let row = params.rows(&[i])?;
            let values = (self.function)(&row, &inputs);
            if values.len() != expected {
                return Err(PhysicsError::ShapeMismatch(format!(
                    "関数の出力数 {} は期待値 {} と一致しません",
                    values.len(),
                    expected
                )));
            }
            batch.extend(values);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::Interval;
    use crate::samplers::GridSampler;
    use crate::spaces::r1;
    use rand::SeedableRng;

    #[test]
    fn batch_has_one_row_per_parameter() {
        let mut rng = StdRng::seed_from_u64(12);
        let domain: Arc<dyn Domain> = Arc::new(Interval::new(r1("t"), 0.0, 1.0).unwrap());
        let params: Arc<dyn Domain> = Arc::new(Interval::new(r1("k"), 0.0, 1.0).unwrap());
        let space = FunctionSpace::new(domain.clone(), r1("f"));
        let function: ParametricFunction = Arc::new(|p: &Points, x: &Points| {
            let k = p.as_slice()[0];
            x.as_slice().iter().map(|t| k * t).collect()
        });
        let mut set = CustomFunctionSet::new(space, Box::new(GridSampler::new(params, 20)), function);

        let points = GridSampler::new(domain, 10).sample_points(&mut rng).unwrap();
        assert!(set.create_function_batch(&points).is_err());

        set.sample_params(&mut rng).unwrap();
        let batch = set.create_function_batch(&points).unwrap();
        assert_eq!(set.len(), 20);
        assert_eq!(batch.len(), 20 * 10);
    }
}
