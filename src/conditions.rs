//! 学習の損失項を定義する条件。
//!
//! 条件はサンプラー、モデル、残差関数の組で、1つの損失項を表します。

use crate::deeponet::DeepONet;
use crate::differential::{DEFAULT_STEP, Field};
use crate::domains::{Domain, Interval};
use crate::error::{PhysicsError, Result};
use crate::functionsets::FunctionSet;
use crate::model::FieldModel;
use crate::points::Points;
use crate::samplers::PointSampler;
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::index;

/// 1ステップの損失評価に必要な状態。
pub struct StepContext<'r, B: Backend> {
    pub rng: &'r mut StdRng,
    pub device: B::Device,
    pub step: usize,
}

/// 1つの損失項。
pub trait Condition<B: Backend, M> {
    fn name(&self) -> &str;

    /// 合計損失に対する重み
    fn weight(&self) -> f32;

    fn loss(&mut self, model: &M, ctx: &mut StepContext<'_, B>) -> Result<Tensor<B, 1>>;
}

/// 点ごとの残差 `[n, k]` を返す関数。
pub type Residual<B> = Box<dyn Fn(&Field<'_, B>) -> Result<Tensor<B, 2>>>;

/// 周期条件の両端での残差を返す関数。
pub type PeriodicResidual<B> = Box<dyn Fn(&Field<'_, B>, &Field<'_, B>) -> Result<Tensor<B, 2>>>;

/// サンプリングした点から補助データを計算する関数。
pub type DataFunction = Box<dyn Fn(&Points) -> Vec<f32>>;

/// 残差の二乗を出力成分で和を取り、点について平均します。
fn squared_error_mean<B: Backend>(residual: Tensor<B, 2>) -> Tensor<B, 1> {
    residual.powf_scalar(2.0).sum_dim(1).mean()
}

fn zero_loss<B: Backend>(device: &B::Device) -> Tensor<B, 1> {
    Tensor::zeros([1], device)
}

fn values_to_tensor<B: Backend>(
    values: Vec<f32>,
    rows: usize,
    cols: usize,
    name: &str,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    if values.len() != rows * cols {
        return Err(PhysicsError::ShapeMismatch(format!(
            "データ '{}' の値の数 {} は {} x {} と一致しません",
            name,
            values.len(),
            rows,
            cols
        )));
    }
    Ok(Tensor::from_data(TensorData::new(values, [rows, cols]), device))
}

/// 微分方程式の残差を最小化する条件。
pub struct PinnCondition<B: Backend> {
    name: String,
    sampler: Box<dyn PointSampler>,
    residual: Residual<B>,
    data_functions: Vec<(String, usize, DataFunction)>,
    weight: f32,
    step: f32,
}

impl<B: Backend> PinnCondition<B> {
    pub fn new(name: &str, sampler: Box<dyn PointSampler>, residual: Residual<B>) -> Self {
        PinnCondition {
            name: name.to_string(),
            sampler,
            residual,
            data_functions: Vec::new(),
            weight: 1.0,
            step: DEFAULT_STEP,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// 差分の刻み幅を変更します。
    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    /// サンプリング点から計算した `[n, dim]` のデータを `Field::data(name)` で参照できるようにします。
    pub fn with_data(mut self, name: &str, dim: usize, function: DataFunction) -> Self {
        self.data_functions.push((name.to_string(), dim, function));
        self
    }
}

impl<B: Backend, M: FieldModel<B>> Condition<B, M> for PinnCondition<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f32 {
        self.weight
    }

    fn loss(&mut self, model: &M, ctx: &mut StepContext<'_, B>) -> Result<Tensor<B, 1>> {
        let points = self.sampler.sample_points(ctx.rng)?;
        if points.is_empty() {
            return Ok(zero_loss(&ctx.device));
        }
        let inputs = points.select(model.input_space())?;
        let eval = |x: Tensor<B, 2>| model.forward(x);
        let mut field = Field::new(
            &eval,
            inputs.to_tensor(&ctx.device),
            model.input_space().clone(),
            model.output_space().clone(),
        )
        .with_step(self.step);
        for (name, dim, function) in &self.data_functions {
            let values = function(&points);
            let tensor = values_to_tensor(values, points.len(), *dim, name, &ctx.device)?;
            field = field.with_data(name, tensor);
        }
        let residual = (self.residual)(&field)?;
        Ok(squared_error_mean(residual))
    }
}

/// 既知のデータ点にモデルを合わせる条件。
pub struct DataCondition {
    name: String,
    inputs: Points,
    targets: Points,
    norm: f32,
    batch_size: Option<usize>,
    weight: f32,
}

impl DataCondition {
    pub fn new(name: &str, inputs: Points, targets: Points) -> Result<Self> {
        if inputs.len() != targets.len() {
            return Err(PhysicsError::ShapeMismatch(format!(
                "入力点 {} 個と目標値 {} 個の数が一致しません",
                inputs.len(),
                targets.len()
            )));
        }
        Ok(DataCondition {
            name: name.to_string(),
            inputs,
            targets,
            norm: 2.0,
            batch_size: None,
            weight: 1.0,
        })
    }

    /// 誤差のノルムの指数 `p`。
    pub fn with_norm(mut self, norm: f32) -> Self {
        self.norm = norm;
        self
    }

    /// 各ステップでランダムに選ぶデータ数。
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }
}

impl<B: Backend, M: FieldModel<B>> Condition<B, M> for DataCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f32 {
        self.weight
    }

    fn loss(&mut self, model: &M, ctx: &mut StepContext<'_, B>) -> Result<Tensor<B, 1>> {
        let (inputs, targets) = match self.batch_size {
            Some(size) if size < self.inputs.len() => {
                let indices = index::sample(&mut *ctx.rng, self.inputs.len(), size).into_vec();
                (self.inputs.rows(&indices)?, self.targets.rows(&indices)?)
            }
            _ => (self.inputs.clone(), self.targets.clone()),
        };
        if inputs.is_empty() {
            return Ok(zero_loss(&ctx.device));
        }
        let prediction = model.forward_points(&inputs, &ctx.device)?;
        let target = targets
            .select(model.output_space())?
            .to_tensor::<B>(&ctx.device);
        Ok((prediction - target)
            .abs()
            .powf_scalar(self.norm)
            .sum_dim(1)
            .mean())
    }
}

/// 区間の両端でモデルの値が一致することを要求する周期条件。
pub struct PeriodicCondition<B: Backend> {
    name: String,
    variable: String,
    lower: f32,
    upper: f32,
    sampler: Box<dyn PointSampler>,
    residual: Option<PeriodicResidual<B>>,
    weight: f32,
    step: f32,
}

impl<B: Backend> PeriodicCondition<B> {
    /// `sampler` は周期変数以外の変数の点を生成します。
    pub fn new(name: &str, interval: &Interval, sampler: Box<dyn PointSampler>) -> Result<Self> {
        let variable = interval
            .space()
            .variables()
            .next()
            .ok_or_else(|| PhysicsError::InvalidDomain("周期変数がありません".to_string()))?
            .to_string();
        if sampler.space().contains_variable(&variable) {
            return Err(PhysicsError::SpaceMismatch {
                expected: format!("'{}' を含まない空間", variable),
                found: sampler.space().to_string(),
            });
        }
        Ok(PeriodicCondition {
            name: name.to_string(),
            variable,
            lower: interval.lower(),
            upper: interval.upper(),
            sampler,
            residual: None,
            weight: 1.0,
            step: DEFAULT_STEP,
        })
    }

    /// 既定の残差 `u(lower) - u(upper)` の代わりに使う残差。
    pub fn with_residual(mut self, residual: PeriodicResidual<B>) -> Self {
        self.residual = Some(residual);
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    fn at(&self, others: &Points, value: f32) -> Result<Points> {
        let column = Points::from_columns(vec![(
            self.variable.as_str(),
            1,
            vec![value; others.len()],
        )])?;
        others.join(&column)
    }
}

impl<B: Backend, M: FieldModel<B>> Condition<B, M> for PeriodicCondition<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f32 {
        self.weight
    }

    fn loss(&mut self, model: &M, ctx: &mut StepContext<'_, B>) -> Result<Tensor<B, 1>> {
        let others = self.sampler.sample_points(ctx.rng)?;
        if others.is_empty() {
            return Ok(zero_loss(&ctx.device));
        }
        let left = self.at(&others, self.lower)?.select(model.input_space())?;
        let right = self.at(&others, self.upper)?.select(model.input_space())?;
        let eval = |x: Tensor<B, 2>| model.forward(x);
        let field = |points: &Points| {
            Field::new(
                &eval,
                points.to_tensor(&ctx.device),
                model.input_space().clone(),
                model.output_space().clone(),
            )
            .with_step(self.step)
        };
        let (left, right) = (field(&left), field(&right));
        let residual = match &self.residual {
            Some(residual) => residual(&left, &right)?,
            None => left.outputs() - right.outputs(),
        };
        Ok(squared_error_mean(residual))
    }
}

/// DeepONet で関数集合全体について残差を最小化する条件。
///
/// 残差関数に渡される `Field` の行は (関数, 点) の組を平坦化したもので、
/// 関数集合の値は関数空間の出力変数名で `Field::data` から参照できます。
pub struct OperatorCondition<B: Backend> {
    name: String,
    function_set: Box<dyn FunctionSet>,
    sampler: Box<dyn PointSampler>,
    residual: Residual<B>,
    weight: f32,
    step: f32,
}

impl<B: Backend> OperatorCondition<B> {
    pub fn new(
        name: &str,
        function_set: Box<dyn FunctionSet>,
        sampler: Box<dyn PointSampler>,
        residual: Residual<B>,
    ) -> Self {
        OperatorCondition {
            name: name.to_string(),
            function_set,
            sampler,
            residual,
            weight: 1.0,
            step: DEFAULT_STEP,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }
}

impl<B: Backend> Condition<B, DeepONet<B>> for OperatorCondition<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f32 {
        self.weight
    }

    fn loss(&mut self, model: &DeepONet<B>, ctx: &mut StepContext<'_, B>) -> Result<Tensor<B, 1>> {
        self.function_set.sample_params(ctx.rng)?;
        let fixed = model.fix_branch_set(self.function_set.as_ref(), &ctx.device)?;
        let points = self.sampler.sample_points(ctx.rng)?;
        let n = points.len();
        let batch = self.function_set.len();
        if n == 0 || batch == 0 {
            return Ok(zero_loss(&ctx.device));
        }
        let out_dim = model.output_space().dim();

        // 全ての行に同じずらしが加わるため、先頭の n 行だけを Trunk net に通せば十分
        let eval = |x: Tensor<B, 2>| {
            let [_, dim] = x.dims();
            let x = x.slice([0..n, 0..dim]);
            model.forward_fixed(x, &fixed).reshape([batch * n, out_dim])
        };
        let inputs = points.select(model.input_space())?.repeat(batch);
        let mut field = Field::new(
            &eval,
            inputs.to_tensor(&ctx.device),
            model.input_space().clone(),
            model.output_space().clone(),
        )
        .with_step(self.step);

        let function_space = self.function_set.function_space().output_space().clone();
        let values = self.function_set.create_function_batch(&points)?;
        let values = values_to_tensor::<B>(
            values,
            batch * n,
            function_space.dim(),
            "function set",
            &ctx.device,
        )?;
        for (name, _) in function_space.iter() {
            let range = function_space.column_range(name)?;
            field = field.with_data(name, values.clone().slice([0..batch * n, range]));
        }

        let residual = (self.residual)(&field)?;
        Ok(squared_error_mean(residual))
    }
}
