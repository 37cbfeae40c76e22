//! 作用素を学習する DeepONet (Trunk net と Branch net の組)。

use crate::error::PhysicsError;
use crate::functionsets::FunctionSet;
use crate::model::{ActivationKind, fc_forward, fc_layers};
use crate::points::Points;
use crate::spaces::Space;
use burn::config::Config;
use burn::module::{Ignored, Module, Param};
use burn::nn::Linear;
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};

/// Trunk net の設定。
#[derive(Config, Debug)]
pub struct TrunkNetConfig {
    pub input_space: Space,
    pub output_space: Space,
    /// 内部で使う出力ニューロン数。出力空間の次元の倍数である必要があります。
    pub output_neurons: usize,
    #[config(default = "vec![20, 20, 20]")]
    pub hidden: Vec<usize>,
    #[config(default = "ActivationKind::Tanh")]
    pub activation: ActivationKind,
    #[config(default = "5.0 / 3.0")]
    pub xavier_gain: f64,
}

/// Branch net の設定。入力数は離散化点の数から決まります。
#[derive(Config, Debug)]
pub struct BranchNetConfig {
    pub output_space: Space,
    pub output_neurons: usize,
    /// 入力関数の出力次元
    #[config(default = 1)]
    pub function_output_dim: usize,
    #[config(default = "vec![20, 20, 20]")]
    pub hidden: Vec<usize>,
    #[config(default = "ActivationKind::Tanh")]
    pub activation: ActivationKind,
    #[config(default = "5.0 / 3.0")]
    pub xavier_gain: f64,
}

#[derive(Config, Debug)]
pub struct DeepONetConfig {
    pub trunk: TrunkNetConfig,
    pub branch: BranchNetConfig,
}

/// 評価点を受け取る側のネットワーク。
#[derive(Module, Debug)]
pub struct TrunkNet<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Ignored<ActivationKind>,
    input_space: Ignored<Space>,
    output_space: Ignored<Space>,
    output_neurons: Ignored<usize>,
}

impl TrunkNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TrunkNet<B> {
        TrunkNet {
            linears: fc_layers(
                self.input_space.dim(),
                &self.hidden,
                self.output_neurons,
                self.xavier_gain,
                device,
            ),
            activation: Ignored(self.activation),
            input_space: Ignored(self.input_space.clone()),
            output_space: Ignored(self.output_space.clone()),
            output_neurons: Ignored(self.output_neurons),
        }
    }
}

impl<B: Backend> TrunkNet<B> {
    /// `[n, 入力次元]` から `[n, output_neurons]` を計算します。
    pub fn forward(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        fc_forward(&self.linears, *self.activation, points)
    }

    pub fn input_space(&self) -> &Space {
        &self.input_space
    }

    pub fn output_space(&self) -> &Space {
        &self.output_space
    }

    pub fn output_neurons(&self) -> usize {
        *self.output_neurons
    }
}

/// 入力関数を離散化した値を受け取る側のネットワーク。
///
/// 関数は固定された離散化点で評価されるため、入力ニューロン数は
/// 離散化点の数と関数の出力次元の積になります。
#[derive(Module, Debug)]
pub struct BranchNet<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Ignored<ActivationKind>,
    output_space: Ignored<Space>,
    output_neurons: Ignored<usize>,
    discretization: Ignored<Points>,
    function_output_dim: Ignored<usize>,
}

impl BranchNetConfig {
    /// `discretization` は毎回同じ点を返すサンプラーで作成してください。
    pub fn init<B: Backend>(&self, discretization: Points, device: &B::Device) -> BranchNet<B> {
        let input_dim = discretization.len() * self.function_output_dim;
        BranchNet {
            linears: fc_layers(
                input_dim,
                &self.hidden,
                self.output_neurons,
                self.xavier_gain,
                device,
            ),
            activation: Ignored(self.activation),
            output_space: Ignored(self.output_space.clone()),
            output_neurons: Ignored(self.output_neurons),
            discretization: Ignored(discretization),
            function_output_dim: Ignored(self.function_output_dim),
        }
    }
}

impl<B: Backend> BranchNet<B> {
    /// `[関数の数, input_dim]` から `[関数の数, output_neurons]` を計算します。
    pub fn forward(&self, discrete_functions: Tensor<B, 2>) -> Tensor<B, 2> {
        fc_forward(&self.linears, *self.activation, discrete_functions)
    }

    pub fn input_dim(&self) -> usize {
        self.discretization.len() * *self.function_output_dim
    }

    pub fn output_neurons(&self) -> usize {
        *self.output_neurons
    }

    pub fn output_space(&self) -> &Space {
        &self.output_space
    }

    pub fn discretization(&self) -> &Points {
        &self.discretization
    }

    /// 1つの関数を離散化点で評価し、`[1, input_dim]` のテンソルにします。
    pub fn discretize<F>(&self, function: F, device: &B::Device) -> crate::Result<Tensor<B, 2>>
    where
        F: Fn(&Points) -> Vec<f32>,
    {
        let values = function(&self.discretization);
        if values.len() != self.input_dim() {
            return Err(PhysicsError::ShapeMismatch(format!(
                "関数の値の数 {} は Branch net の入力数 {} と一致しません",
                values.len(),
                self.input_dim()
            )));
        }
        Ok(Tensor::from_data(
            TensorData::new(values, [1, self.input_dim()]),
            device,
        ))
    }

    /// 関数集合の現在のバッチを離散化し、`[関数の数, input_dim]` のテンソルにします。
    pub fn discretize_function_set(
        &self,
        function_set: &dyn FunctionSet,
        device: &B::Device,
    ) -> crate::Result<Tensor<B, 2>> {
        let values = function_set.create_function_batch(&self.discretization)?;
        let rows = values.len() / self.input_dim().max(1);
        if rows * self.input_dim() != values.len() {
            return Err(PhysicsError::ShapeMismatch(format!(
                "関数集合の出力数 {} は Branch net の入力数 {} の倍数ではありません",
                values.len(),
                self.input_dim()
            )));
        }
        Ok(Tensor::from_data(
            TensorData::new(values, [rows, self.input_dim()]),
            device,
        ))
    }
}

/// 固定した入力関数に対する Branch net の出力。
#[derive(Debug, Clone)]
pub struct FixedBranch<B: Backend> {
    coefficients: Tensor<B, 2>,
}

impl<B: Backend> FixedBranch<B> {
    pub fn coefficients(&self) -> &Tensor<B, 2> {
        &self.coefficients
    }
}

/// Trunk net と Branch net の出力の内積で作用素を近似するモデル。
#[derive(Module, Debug)]
pub struct DeepONet<B: Backend> {
    trunk: TrunkNet<B>,
    branch: BranchNet<B>,
    bias: Param<Tensor<B, 1>>,
}

impl DeepONetConfig {
    pub fn init<B: Backend>(&self, discretization: Points, device: &B::Device) -> crate::Result<DeepONet<B>> {
        DeepONet::new(self.trunk.init(device), self.branch.init(discretization, device))
    }
}

impl<B: Backend> DeepONet<B> {
    pub fn new(trunk: TrunkNet<B>, branch: BranchNet<B>) -> crate::Result<Self> {
        if trunk.output_space() != branch.output_space() {
            return Err(PhysicsError::SpaceMismatch {
                expected: trunk.output_space().to_string(),
                found: branch.output_space().to_string(),
            });
        }
        let out_dim = trunk.output_space().dim();
        if trunk.output_neurons() != branch.output_neurons()
            || out_dim == 0
            || trunk.output_neurons() % out_dim != 0
        {
            return Err(PhysicsError::ShapeMismatch(format!(
                "Trunk net ({}) と Branch net ({}) の出力ニューロン数は等しく、出力次元 {} の倍数でなければなりません",
                trunk.output_neurons(),
                branch.output_neurons(),
                out_dim
            )));
        }
        let device = trunk.devices().into_iter().next().unwrap_or_default();
        let bias = Param::from_tensor(Tensor::zeros([out_dim], &device));
        Ok(DeepONet {
            trunk,
            branch,
            bias,
        })
    }

    pub fn trunk(&self) -> &TrunkNet<B> {
        &self.trunk
    }

    pub fn branch(&self) -> &BranchNet<B> {
        &self.branch
    }

    pub fn input_space(&self) -> &Space {
        self.trunk.input_space()
    }

    pub fn output_space(&self) -> &Space {
        self.trunk.output_space()
    }

    /// 評価点 `[n, 入力次元]` と離散化された関数 `[b, input_dim]` から `[b, n, 出力次元]` を計算します。
    pub fn forward(&self, points: Tensor<B, 2>, branch_input: Tensor<B, 2>) -> Tensor<B, 3> {
        let coefficients = self.branch.forward(branch_input);
        self.combine(points, coefficients)
    }

    /// Branch net を1つの関数に固定します。
    pub fn fix_branch<F>(&self, function: F, device: &B::Device) -> crate::Result<FixedBranch<B>>
    where
        F: Fn(&Points) -> Vec<f32>,
    {
        let input = self.branch.discretize(function, device)?;
        Ok(FixedBranch {
            coefficients: self.branch.forward(input),
        })
    }

    /// 関数集合の現在のバッチで Branch net を固定します。
    pub fn fix_branch_set(
        &self,
        function_set: &dyn FunctionSet,
        device: &B::Device,
    ) -> crate::Result<FixedBranch<B>> {
        let input = self.branch.discretize_function_set(function_set, device)?;
        Ok(FixedBranch {
            coefficients: self.branch.forward(input),
        })
    }

    pub fn forward_fixed(&self, points: Tensor<B, 2>, fixed: &FixedBranch<B>) -> Tensor<B, 3> {
        self.combine(points, fixed.coefficients.clone())
    }

    /// `u[b, n, k] = Σ_i B[b, i, k] T[n, i, k] + bias[k]`
    fn combine(&self, points: Tensor<B, 2>, coefficients: Tensor<B, 2>) -> Tensor<B, 3> {
        let trunk = self.trunk.forward(points);
        let [n, neurons] = trunk.dims();
        let [b, _] = coefficients.dims();
        let k = self.output_space().dim();
        let p = neurons / k;
        let trunk = trunk.reshape([n, p, k]);
        let branch = coefficients.reshape([b, p, k]);
        let components: Vec<Tensor<B, 2>> = (0..k)
            .map(|j| {
                let bj = branch.clone().slice([0..b, 0..p, j..j + 1]).reshape([b, p]);
                let tj = trunk.clone().slice([0..n, 0..p, j..j + 1]).reshape([n, p]);
                bj.matmul(tj.transpose())
            })
            .collect();
        let out = Tensor::stack::<3>(components, 2);
        let bias = self
            .bias
            .val()
            .reshape([1, 1, k])
            .repeat_dim(0, b)
            .repeat_dim(1, n);
        out + bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::{Domain, Interval};
    use crate::functionsets::{CustomFunctionSet, FunctionSpace, ParametricFunction};
    use crate::samplers::{GridSampler, PointSampler};
    use crate::spaces::{r1, r2};
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;

    type TestBackend = NdArray<f32>;

    fn discretization(n: usize) -> Points {
        let mut rng = StdRng::seed_from_u64(0);
        let domain: Arc<dyn Domain> = Arc::new(Interval::new(r1("t"), 0.0, 1.0).unwrap());
        GridSampler::new(domain, n).sample_points(&mut rng).unwrap()
    }

    fn function_set() -> CustomFunctionSet {
        let domain: Arc<dyn Domain> = Arc::new(Interval::new(r1("t"), 0.0, 1.0).unwrap());
        let params: Arc<dyn Domain> = Arc::new(Interval::new(r1("k"), 0.0, 1.0).unwrap());
        let function: ParametricFunction = Arc::new(|p: &Points, x: &Points| {
            let k = p.as_slice()[0];
            x.as_slice().iter().map(|t| k * t).collect()
        });
        CustomFunctionSet::new(
            FunctionSpace::new(domain, r1("e")),
            Box::new(GridSampler::new(params, 20)),
            function,
        )
    }

    fn deeponet(neurons: usize, m: usize) -> DeepONet<TestBackend> {
        let device = Default::default();
        DeepONetConfig::new(
            TrunkNetConfig::new(r1("t"), r1("u"), neurons),
            BranchNetConfig::new(r1("u"), neurons),
        )
        .init(discretization(m), &device)
        .unwrap()
    }

    #[test]
    fn trunk_net_output_neurons() {
        let device = Default::default();
        let trunk = TrunkNetConfig::new(r2("x"), r1("u"), 20).init::<TestBackend>(&device);
        let out = trunk.forward(Tensor::from_data(
            TensorData::new(vec![2.0, 3.0, 0.0, 1.0], [2, 2]),
            &device,
        ));
        assert_eq!(out.dims(), [2, 20]);
        assert_eq!(trunk.input_space(), &r2("x"));
    }

    #[test]
    fn branch_net_discretizes_functions() {
        let device = Default::default();
        let branch = BranchNetConfig::new(r1("u"), 22).init::<TestBackend>(discretization(15), &device);
        assert_eq!(branch.input_dim(), 15);
        let input = branch
            .discretize(|p: &Points| p.as_slice().iter().map(|t| 20.0 * t).collect(), &device)
            .unwrap();
        assert_eq!(branch.forward(input).dims(), [1, 22]);
        assert!(branch.discretize(|_: &Points| vec![1.0; 3], &device).is_err());
    }

    #[test]
    fn branch_net_discretizes_function_sets() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut set = function_set();
        set.sample_params(&mut rng).unwrap();
        let branch = BranchNetConfig::new(r1("u"), 20).init::<TestBackend>(discretization(10), &device);
        let batch = branch.discretize_function_set(&set, &device).unwrap();
        assert_eq!(batch.dims(), [20, 10]);
    }

    #[test]
    fn deeponet_forward_shape() {
        let device = Default::default();
        let net = deeponet(20, 15);
        assert_eq!(net.input_space(), &r1("t"));
        assert_eq!(net.output_space(), &r1("u"));
        let points = discretization(50).to_tensor::<TestBackend>(&device);
        let fixed = net
            .fix_branch(|p: &Points| p.as_slice().iter().map(|t| t.sin()).collect(), &device)
            .unwrap();
        assert_eq!(fixed.coefficients().dims(), [1, 20]);
        assert_eq!(net.forward_fixed(points, &fixed).dims(), [1, 50, 1]);
    }

    #[test]
    fn deeponet_with_function_batch() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(2);
        let mut set = function_set();
        set.sample_params(&mut rng).unwrap();
        let net = deeponet(20, 15);
        let fixed = net.fix_branch_set(&set, &device).unwrap();
        let points = discretization(30).to_tensor::<TestBackend>(&device);
        assert_eq!(net.forward_fixed(points, &fixed).dims(), [20, 30, 1]);
    }

    #[test]
    fn mismatched_subnets_are_rejected() {
        let device = Default::default();
        let trunk = TrunkNetConfig::new(r1("t"), r1("u"), 20).init::<TestBackend>(&device);
        let branch = BranchNetConfig::new(r1("v"), 20).init(discretization(5), &device);
        assert!(DeepONet::new(trunk, branch).is_err());

        let trunk = TrunkNetConfig::new(r1("t"), r2("u"), 21).init::<TestBackend>(&device);
        let branch = BranchNetConfig::new(r2("u"), 21).init(discretization(5), &device);
        assert!(DeepONet::new(trunk, branch).is_err());
    }
}
