//! 残差関数から使う微分演算子。
//!
//! 導関数はモデルをずらした入力で再評価する中心差分で計算します。
//! 再評価はモデルの計算グラフ上で行われるため、`Autodiff` バックエンドでは
//! 残差の損失がモデルのパラメータについて微分可能なまま保たれます。

use crate::error::{PhysicsError, Result};
use crate::spaces::Space;
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use std::collections::HashMap;
use std::ops::Range;

/// 差分の既定の刻み幅
pub const DEFAULT_STEP: f32 = 1e-2;

/// 残差関数に渡される評価コンテキスト。
///
/// サンプリングした入力点、そこでのモデル出力、任意の補助データを変数名で参照できます。
pub struct Field<'a, B: Backend> {
    model: &'a dyn Fn(Tensor<B, 2>) -> Tensor<B, 2>,
    input: Tensor<B, 2>,
    output: Tensor<B, 2>,
    input_space: Space,
    output_space: Space,
    data: HashMap<String, Tensor<B, 2>>,
    step: f32,
}

impl<'a, B: Backend> Field<'a, B> {
    /// `model` を `input` で評価したコンテキストを作成します。
    pub fn new(
        model: &'a dyn Fn(Tensor<B, 2>) -> Tensor<B, 2>,
        input: Tensor<B, 2>,
        input_space: Space,
        output_space: Space,
    ) -> Self {
        let output = model(input.clone());
        Field {
            model,
            input,
            output,
            input_space,
            output_space,
            data: HashMap::new(),
            step: DEFAULT_STEP,
        }
    }

    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    /// 補助データ（右辺の関数値など）を名前付きで追加します。
    pub fn with_data(mut self, name: &str, values: Tensor<B, 2>) -> Self {
        self.data.insert(name.to_string(), values);
        self
    }

    pub fn len(&self) -> usize {
        self.input.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn device(&self) -> B::Device {
        self.input.device()
    }

    pub fn input_space(&self) -> &Space {
        &self.input_space
    }

    pub fn output_space(&self) -> &Space {
        &self.output_space
    }

    /// 入力変数の列 `[n, dim(var)]`。
    pub fn input(&self, var: &str) -> Result<Tensor<B, 2>> {
        let range = self.input_space.column_range(var)?;
        Ok(self.input.clone().slice([0..self.len(), range]))
    }

    /// 出力変数の列 `[n, dim(var)]`。
    pub fn output(&self, var: &str) -> Result<Tensor<B, 2>> {
        let range = self.output_space.column_range(var)?;
        Ok(self.output.clone().slice([0..self.len(), range]))
    }

    /// モデル出力全体 `[n, dim(出力空間)]`。
    pub fn outputs(&self) -> Tensor<B, 2> {
        self.output.clone()
    }

    pub fn data(&self, name: &str) -> Result<Tensor<B, 2>> {
        self.data
            .get(name)
            .cloned()
            .ok_or_else(|| PhysicsError::UnknownVariable(name.to_string()))
    }

    /// 偏導関数 `∂^k out / ∂wrt_1 ... ∂wrt_k`。
    ///
    /// `wrt` の各変数は1次元である必要があります。同じ変数を繰り返すと高階の導関数になります。
    pub fn partial(&self, out_var: &str, wrt: &[&str]) -> Result<Tensor<B, 2>> {
        let out = self.output_space.column_range(out_var)?;
        let mut cols = Vec::with_capacity(wrt.len());
        for var in wrt {
            let range = self.input_space.column_range(var)?;
            if range.len() != 1 {
                return Err(PhysicsError::ShapeMismatch(format!(
                    "変数 '{}' は {} 次元です。多次元の変数には grad を使ってください",
                    var,
                    range.len()
                )));
            }
            cols.push(range.start);
        }
        cols.sort_unstable();
        Ok(self.stencil(self.input.clone(), out, &cols, false))
    }

    /// 1次元の出力変数の勾配 `[n, dim(var)]`。
    pub fn grad(&self, out_var: &str, var: &str) -> Result<Tensor<B, 2>> {
        let out = self.scalar_output(out_var)?;
        let columns = self.input_space.column_range(var)?;
        let parts: Vec<Tensor<B, 2>> = columns
            .map(|c| self.stencil(self.input.clone(), out.clone(), &[c], false))
            .collect();
        Ok(Tensor::cat(parts, 1))
    }

    /// 指定した変数の全成分についての2階導関数の和 `[n, 1]`。
    pub fn laplacian(&self, out_var: &str, vars: &[&str]) -> Result<Tensor<B, 2>> {
        let out = self.scalar_output(out_var)?;
        let mut total: Option<Tensor<B, 2>> = None;
        for var in vars {
            for c in self.input_space.column_range(var)? {
                let second = self.stencil(self.input.clone(), out.clone(), &[c, c], false);
                total = Some(match total {
                    Some(acc) => acc + second,
                    None => second,
                });
            }
        }
        total.ok_or_else(|| {
            PhysicsError::ShapeMismatch("ラプラシアンには変数が1つ以上必要です".to_string())
        })
    }

    /// 発散 `Σ_i ∂out_i / ∂var_i` `[n, 1]`。出力変数と入力変数の次元が等しい必要があります。
    pub fn div(&self, out_var: &str, var: &str) -> Result<Tensor<B, 2>> {
        let out = self.output_space.column_range(out_var)?;
        let columns = self.input_space.column_range(var)?;
        if out.len() != columns.len() {
            return Err(PhysicsError::ShapeMismatch(format!(
                "発散には同じ次元の変数が必要です: '{}' ({}) と '{}' ({})",
                out_var,
                out.len(),
                var,
                columns.len()
            )));
        }
        let mut total: Option<Tensor<B, 2>> = None;
        for (o, c) in out.zip(columns) {
            let part = self.stencil(self.input.clone(), o..o + 1, &[c], false);
            total = Some(match total {
                Some(acc) => acc + part,
                None => part,
            });
        }
        total.ok_or_else(|| PhysicsError::ShapeMismatch("0次元の変数です".to_string()))
    }

    fn scalar_output(&self, out_var: &str) -> Result<Range<usize>> {
        let out = self.output_space.column_range(out_var)?;
        if out.len() != 1 {
            return Err(PhysicsError::ShapeMismatch(format!(
                "出力変数 '{}' は1次元である必要があります",
                out_var
            )));
        }
        Ok(out)
    }

    /// 列 `column` だけに刻み幅を持つ `[n, dim]` のテンソル。
    fn shift(&self, column: usize, like: &Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, dim] = like.dims();
        let mut row = vec![0.0f32; dim];
        row[column] = self.step;
        Tensor::<B, 2>::from_data(TensorData::new(row, [1, dim]), &like.device()).repeat_dim(0, n)
    }

    /// 差分ステンシルを再帰的に適用します。同じ列が連続する場合は3点の2階差分を使います。
    fn stencil(&self, x: Tensor<B, 2>, out: Range<usize>, cols: &[usize], shifted: bool) -> Tensor<B, 2> {
        match cols {
            [] => {
                let y = if shifted {
                    (self.model)(x)
                } else {
                    self.output.clone()
                };
                let n = y.dims()[0];
                y.slice([0..n, out])
            }
            [c, d, rest @ ..] if c == d => {
                let shift = self.shift(*c, &x);
                let plus = self.stencil(x.clone() + shift.clone(), out.clone(), rest, true);
                let centre = self.stencil(x.clone(), out.clone(), rest, shifted);
                let minus = self.stencil(x - shift, out, rest, true);
                (plus - centre.mul_scalar(2.0) + minus).div_scalar(self.step * self.step)
            }
            [c, rest @ ..] => {
                let shift = self.shift(*c, &x);
                let plus = self.stencil(x.clone() + shift.clone(), out.clone(), rest, true);
                let minus = self.stencil(x - shift, out, rest, true);
                (plus - minus).div_scalar(2.0 * self.step)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::{r1, r2};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn values(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < tol, "{} != {}", a, e);
        }
    }

    /// u(t, x) = t * x^2 + 3x
    fn polynomial(x: Tensor<TestBackend, 2>) -> Tensor<TestBackend, 2> {
        let n = x.dims()[0];
        let t = x.clone().slice([0..n, 0..1]);
        let s = x.slice([0..n, 1..2]);
        t * s.clone().powf_scalar(2.0) + s.mul_scalar(3.0)
    }

    fn input() -> Tensor<TestBackend, 2> {
        Tensor::from_data(
            TensorData::new(vec![0.5, 1.0, 2.0, -1.0, 1.0, 0.0], [3, 2]),
            &Default::default(),
        )
    }

    #[test]
    fn first_and_second_partials() {
        let model = polynomial;
        let field = Field::new(&model, input(), r1("t") * r1("x"), r1("u"));
        // u_x = 2tx + 3, u_t = x^2, u_xx = 2t, u_tx = 2x
        assert_close(&values(field.partial("u", &["x"]).unwrap()), &[4.0, -1.0, 3.0], 1e-2);
        assert_close(&values(field.partial("u", &["t"]).unwrap()), &[1.0, 1.0, 0.0], 1e-2);
        assert_close(&values(field.partial("u", &["x", "x"]).unwrap()), &[1.0, 4.0, 2.0], 5e-2);
        assert_close(&values(field.partial("u", &["x", "t"]).unwrap()), &[2.0, -2.0, 0.0], 5e-2);
    }

    #[test]
    fn laplacian_grad_and_div_on_vector_input() {
        // u(x) = x1^2 + x2^2, so grad = 2x and laplacian = 4
        let model = |x: Tensor<TestBackend, 2>| x.powf_scalar(2.0).sum_dim(1);
        let field = Field::new(&model, input(), r2("x"), r1("u"));
        assert_close(
            &values(field.grad("u", "x").unwrap()),
            &[1.0, 2.0, 4.0, -2.0, 2.0, 0.0],
            1e-2,
        );
        assert_close(&values(field.laplacian("u", &["x"]).unwrap()), &[4.0, 4.0, 4.0], 5e-2);
        assert!(field.partial("u", &["x"]).is_err());

        // v(x) = x, so div v = 2
        let identity = |x: Tensor<TestBackend, 2>| x;
        let field = Field::new(&identity, input(), r2("x"), r2("v"));
        assert_close(&values(field.div("v", "x").unwrap()), &[2.0, 2.0, 2.0], 1e-2);
        assert!(field.laplacian("v", &["x"]).is_err());
    }

    #[test]
    fn named_columns_and_data() {
        let model = polynomial;
        let field = Field::new(&model, input(), r1("t") * r1("x"), r1("u"))
            .with_data("f", Tensor::ones([3, 1], &Default::default()));
        assert_eq!(values(field.input("t").unwrap()), vec![0.5, 2.0, 1.0]);
        assert_eq!(field.output("u").unwrap().dims(), [3, 1]);
        assert_eq!(field.data("f").unwrap().dims(), [3, 1]);
        assert!(field.data("g").is_err());
        assert!(field.output("w").is_err());
    }
}
