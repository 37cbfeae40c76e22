//! コマンドラインから実行できる組み込みの問題。
//!
//! 各問題は領域、サンプラー、条件を組み合わせてライブラリの使い方を示します。

use crate::conditions::{
    Condition, DataFunction, OperatorCondition, PeriodicCondition, PinnCondition, Residual,
};
use crate::deeponet::{BranchNetConfig, DeepONet, DeepONetConfig, TrunkNetConfig};
use crate::differential::Field;
use crate::domains::{Domain, Interval, Parallelogram, Point, ProductDomain};
use crate::error::PhysicsError;
use crate::functionsets::{CustomFunctionSet, FunctionSpace, ParametricFunction};
use crate::inference::{evaluate, plot_heatmap, relative_l2_error, write_csv};
use crate::model::{ActivationKind, Fcn, FcnConfig, load_model, save_model};
use crate::points::Points;
use crate::samplers::{GridSampler, PointSampler, RandomUniformSampler, SamplerExt};
use crate::spaces::{r1, r2};
use crate::training::{LossHistory, Solver, TrainerConfig, plot_loss_history};
use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use burn::prelude::Backend;
use burn::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 学習に使うバックエンド
pub type TrainBackend = Autodiff<NdArray<f32>>;
/// 推論に使うバックエンド
pub type InferBackend = NdArray<f32>;

/// 組み込みの問題。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Problem {
    /// 周期境界を持つ1次元の移流方程式 u_t + c u_x = 0
    Advection,
    /// ディリクレ境界を持つ1次元の熱方程式 u_t = a u_xx
    Heat,
    /// 単位正方形上のポアソン方程式 -Δu = f
    Poisson,
    /// DeepONet による原始関数作用素 u' = f, u(0) = 0
    Antiderivative,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Problem::Advection => "advection",
            Problem::Heat => "heat",
            Problem::Poisson => "poisson",
            Problem::Antiderivative => "antiderivative",
        };
        write!(f, "{}", name)
    }
}

/// 問題ごとの実験設定。
#[derive(Config, Debug)]
pub struct ExperimentConfig {
    #[config(default = "TrainerConfig::new()")]
    pub trainer: TrainerConfig,
    #[config(default = "vec![20, 20, 20]")]
    pub hidden: Vec<usize>,
    #[config(default = "ActivationKind::Tanh")]
    pub activation: ActivationKind,
    /// 内部の残差点の数
    #[config(default = 2000)]
    pub n_interior: usize,
    /// 初期条件・境界条件の点の数
    #[config(default = 200)]
    pub n_boundary: usize,
    /// 移流速度または拡散係数
    #[config(default = 1.0)]
    pub coefficient: f32,
    /// DeepONet の1バッチあたりの関数の数
    #[config(default = 20)]
    pub n_functions: usize,
    /// Branch net の離散化点の数
    #[config(default = 20)]
    pub discretization_points: usize,
    /// DeepONet の内部出力ニューロン数
    #[config(default = 40)]
    pub output_neurons: usize,
}

/// 全結合ネットワークで解く問題の構成要素。
pub struct FieldProblem<B: Backend> {
    pub model: FcnConfig,
    pub domain: Arc<dyn Domain>,
    pub conditions: Vec<Box<dyn Condition<B, Fcn<B>>>>,
}

/// DeepONet で解く問題の構成要素。
pub struct OperatorProblem<B: Backend> {
    pub model: DeepONetConfig,
    pub discretization: Points,
    pub conditions: Vec<Box<dyn Condition<B, DeepONet<B>>>>,
}

fn interval(name: &str, lower: f32, upper: f32) -> crate::Result<Arc<Interval>> {
    Ok(Arc::new(Interval::new(r1(name), lower, upper)?))
}

fn product(first: Arc<dyn Domain>, second: Arc<dyn Domain>) -> crate::Result<Arc<dyn Domain>> {
    Ok(Arc::new(ProductDomain::new(first, second)?))
}

fn initial_time() -> crate::Result<Arc<dyn Domain>> {
    Ok(Arc::new(Point::new(r1("t"), vec![0.0])?))
}

fn random(domain: Arc<dyn Domain>, n: usize) -> Box<dyn PointSampler> {
    Box::new(RandomUniformSampler::new(domain, n))
}

/// 初期値 `u(0, x) = sin(πx)` の残差。
fn initial_sine<B: Backend>() -> Residual<B> {
    Box::new(|f: &Field<'_, B>| -> crate::Result<Tensor<B, 2>> {
        Ok(f.output("u")? - f.input("x")?.mul_scalar(PI).sin())
    })
}

impl Problem {
    pub fn default_config(&self) -> ExperimentConfig {
        let config = ExperimentConfig::new();
        match self {
            Problem::Advection => config,
            Problem::Heat => config
                .with_coefficient(0.1)
                .with_trainer(TrainerConfig::new().with_max_steps(5000)),
            Problem::Poisson => config
                .with_hidden(vec![32, 32, 32])
                .with_n_interior(1500)
                .with_trainer(TrainerConfig::new().with_max_steps(5000)),
            Problem::Antiderivative => config
                .with_n_interior(50)
                .with_trainer(TrainerConfig::new().with_max_steps(3000)),
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, Problem::Antiderivative)
    }

    /// 全結合ネットワークで解く問題を組み立てます。
    pub fn field_problem<B: Backend>(&self, config: &ExperimentConfig) -> crate::Result<FieldProblem<B>> {
        let c = config.coefficient;
        let (domain, conditions): (Arc<dyn Domain>, Vec<Box<dyn Condition<B, Fcn<B>>>>) = match self {
            Problem::Advection => {
                let t = interval("t", 0.0, 1.0)?;
                let x = interval("x", -1.0, 1.0)?;
                let domain = product(t.clone(), x.clone())?;
                let pde: Residual<B> = Box::new(move |f: &Field<'_, B>| -> crate::Result<Tensor<B, 2>> {
                    Ok(f.partial("u", &["t"])? + f.partial("u", &["x"])?.mul_scalar(c))
                });
                let initial_domain = product(initial_time()?, x.clone())?;
                let conditions: Vec<Box<dyn Condition<B, Fcn<B>>>> = vec![
                    Box::new(PinnCondition::new("pde", random(domain.clone(), config.n_interior), pde)),
                    Box::new(PinnCondition::new(
                        "initial",
                        random(initial_domain, config.n_boundary),
                        initial_sine(),
                    )),
                    Box::new(PeriodicCondition::new(
                        "periodic",
                        &x,
                        random(t, config.n_boundary),
                    )?),
                ];
                (domain, conditions)
            }
            Problem::Heat => {
                let t = interval("t", 0.0, 1.0)?;
                let x = interval("x", 0.0, 1.0)?;
                let domain = product(t.clone(), x.clone())?;
                let pde: Residual<B> = Box::new(move |f: &Field<'_, B>| -> crate::Result<Tensor<B, 2>> {
                    Ok(f.partial("u", &["t"])? - f.partial("u", &["x", "x"])?.mul_scalar(c))
                });
                let x_boundary = x
                    .boundary()
                    .ok_or_else(|| PhysicsError::InvalidDomain("区間の境界がありません".to_string()))?;
                let boundary_domain = product(t, x_boundary)?;
                let dirichlet: Residual<B> = Box::new(|f: &Field<'_, B>| f.output("u"));
                let conditions: Vec<Box<dyn Condition<B, Fcn<B>>>> = vec![
                    Box::new(PinnCondition::new("pde", random(domain.clone(), config.n_interior), pde)),
                    Box::new(PinnCondition::new(
                        "initial",
                        random(product(initial_time()?, x)?, config.n_boundary),
                        initial_sine(),
                    )),
                    Box::new(PinnCondition::new(
                        "boundary",
                        random(boundary_domain, config.n_boundary),
                        dirichlet,
                    )),
                ];
                (domain, conditions)
            }
            Problem::Poisson => {
                let square: Arc<dyn Domain> =
                    Arc::new(Parallelogram::rectangle(r2("x"), [0.0, 0.0], [1.0, 1.0])?);
                let boundary = square
                    .boundary()
                    .ok_or_else(|| PhysicsError::InvalidDomain("正方形の境界がありません".to_string()))?;
                let pde: Residual<B> = Box::new(|f: &Field<'_, B>| -> crate::Result<Tensor<B, 2>> {
                    Ok(f.laplacian("u", &["x"])? + f.data("f")?)
                });
                let source: DataFunction = Box::new(|points: &Points| -> Vec<f32> {
                    (0..points.len())
                        .map(|i| {
                            let x = points.row(i);
                            2.0 * PI * PI * (PI * x[0]).sin() * (PI * x[1]).sin()
                        })
                        .collect()
                });
                let dirichlet: Residual<B> = Box::new(|f: &Field<'_, B>| f.output("u"));
                let conditions: Vec<Box<dyn Condition<B, Fcn<B>>>> = vec![
                    Box::new(
                        PinnCondition::new("pde", random(square.clone(), config.n_interior), pde)
                            .with_data("f", 1, source),
                    ),
                    Box::new(
                        PinnCondition::new("boundary", random(boundary, config.n_boundary), dirichlet)
                            .with_weight(10.0),
                    ),
                ];
                (square, conditions)
            }
            Problem::Antiderivative => {
                return Err(PhysicsError::InvalidDomain(format!(
                    "問題 '{}' は DeepONet で解く問題です",
                    self
                )));
            }
        };
        let model = FcnConfig::new(domain.space().clone(), r1("u"))
            .with_hidden(config.hidden.clone())
            .with_activation(config.activation)
            .with_input_bounds(Some(domain.bounding_box()));
        Ok(FieldProblem {
            model,
            domain,
            conditions,
        })
    }

    /// DeepONet で解く問題を組み立てます。
    pub fn operator_problem<B: Backend>(&self, config: &ExperimentConfig) -> crate::Result<OperatorProblem<B>> {
        if !self.is_operator() {
            return Err(PhysicsError::InvalidDomain(format!(
                "問題 '{}' は全結合ネットワークで解く問題です",
                self
            )));
        }
        let t = interval("t", 0.0, 1.0)?;
        let params: Arc<dyn Domain> = interval("k", 0.5, 3.0)?;
        let function_space = FunctionSpace::new(t.clone(), r1("f"));
        let function_set = || {
            CustomFunctionSet::new(
                function_space.clone(),
                random(params.clone(), config.n_functions),
                cosine_family(),
            )
        };

        let mut rng = StdRng::seed_from_u64(config.trainer.seed);
        let discretization = GridSampler::new(t.clone(), config.discretization_points)
            .make_static()
            .sample_points(&mut rng)?;

        let ode: Residual<B> = Box::new(|f: &Field<'_, B>| -> crate::Result<Tensor<B, 2>> {
            Ok(f.partial("u", &["t"])? - f.data("f")?)
        });
        let initial: Residual<B> = Box::new(|f: &Field<'_, B>| f.output("u"));
        let conditions: Vec<Box<dyn Condition<B, DeepONet<B>>>> = vec![
            Box::new(OperatorCondition::new(
                "ode",
                Box::new(function_set()),
                random(t.clone(), config.n_interior),
                ode,
            )),
            Box::new(OperatorCondition::new(
                "initial",
                Box::new(function_set()),
                random(initial_time()?, 1),
                initial,
            )),
        ];

        let model = DeepONetConfig::new(
            TrunkNetConfig::new(r1("t"), r1("u"), config.output_neurons)
                .with_hidden(config.hidden.clone())
                .with_activation(config.activation),
            BranchNetConfig::new(r1("u"), config.output_neurons)
                .with_hidden(config.hidden.clone())
                .with_activation(config.activation),
        );
        Ok(OperatorProblem {
            model,
            discretization,
            conditions,
        })
    }

    /// 入力点での厳密解。
    pub fn exact_solution(&self, config: &ExperimentConfig, inputs: &Points) -> crate::Result<Vec<f32>> {
        let c = config.coefficient;
        match self {
            Problem::Advection => {
                let t = inputs.column("t")?;
                let x = inputs.column("x")?;
                Ok(t.iter().zip(&x).map(|(t, x)| (PI * (x - c * t)).sin()).collect())
            }
            Problem::Heat => {
                let t = inputs.column("t")?;
                let x = inputs.column("x")?;
                Ok(t.iter()
                    .zip(&x)
                    .map(|(t, x)| (-c * PI * PI * t).exp() * (PI * x).sin())
                    .collect())
            }
            Problem::Poisson => {
                let x = inputs.select(&r2("x"))?;
                Ok((0..x.len())
                    .map(|i| {
                        let p = x.row(i);
                        (PI * p[0]).sin() * (PI * p[1]).sin()
                    })
                    .collect())
            }
            Problem::Antiderivative => {
                let t = inputs.column("t")?;
                let k = inputs.column("k")?;
                Ok(t.iter().zip(&k).map(|(t, k)| (k * t).sin() / k).collect())
            }
        }
    }

    fn output_file(&self, output_dir: &Path, suffix: &str) -> PathBuf {
        output_dir.join(format!("{}_{}", self, suffix))
    }

    /// モデルを学習し、モデル・設定・損失の履歴を `output_dir` に保存します。
    pub fn train(&self, config: &ExperimentConfig, output_dir: &Path) -> crate::Result<LossHistory> {
        std::fs::create_dir_all(output_dir)?;
        let device = Default::default();
        log::info!("問題 '{}' の学習を開始します - バックエンド: NdArray (CPU)", self);

        let history = if self.is_operator() {
            let problem = self.operator_problem::<TrainBackend>(config)?;
            let model = problem.model.init::<TrainBackend>(problem.discretization, &device)?;
            let outcome = Solver::new(problem.conditions).fit(model, &config.trainer, &device)?;
            save_model(outcome.model, &self.output_file(output_dir, "model"))?;
            outcome.history
        } else {
            let problem = self.field_problem::<TrainBackend>(config)?;
            let model = problem.model.init::<TrainBackend>(&device);
            let outcome = Solver::new(problem.conditions).fit(model, &config.trainer, &device)?;
            save_model(outcome.model, &self.output_file(output_dir, "model"))?;
            outcome.history
        };
        log::info!("=> モデルを '{}' に保存しました。", self.output_file(output_dir, "model.mpk").display());

        config.save(self.output_file(output_dir, "config.json"))?;
        history.save_json(&self.output_file(output_dir, "loss.json"))?;
        let graph = self.output_file(output_dir, "loss.png");
        match plot_loss_history(&history, &graph) {
            Ok(()) => log::info!("=> 損失グラフを '{}' に保存しました。", graph.display()),
            Err(e) => log::warn!("{}", e),
        }
        Ok(history)
    }

    /// 保存済みモデルを格子点で評価し、予測をCSVに書き出して厳密解との相対 L2 誤差を返します。
    pub fn infer(&self, config: &ExperimentConfig, output_dir: &Path, grid: usize) -> crate::Result<f32> {
        let device = Default::default();
        let model_path = self.output_file(output_dir, "model");
        log::info!("保存済みモデルを '{}' からロード中...", model_path.display());

        let (inputs, outputs) = if self.is_operator() {
            let problem = self.operator_problem::<InferBackend>(config)?;
            let model = problem.model.init::<InferBackend>(problem.discretization, &device)?;
            let model = load_model(model, &model_path, &device)?;
            self.infer_operator(&model, grid, &device)?
        } else {
            let problem = self.field_problem::<InferBackend>(config)?;
            let model = load_model(problem.model.init::<InferBackend>(&device), &model_path, &device)?;
            let mut rng = StdRng::seed_from_u64(config.trainer.seed);
            let inputs = GridSampler::new(problem.domain.clone(), grid * grid).sample_points(&mut rng)?;
            let outputs = evaluate(&model, &inputs, &device)?;
            (inputs, outputs)
        };

        let exact = self.exact_solution(config, &inputs)?;
        let error = relative_l2_error(outputs.as_slice(), &exact)?;
        log::info!("推論が完了しました。入力点数: {}, 相対 L2 誤差: {:.4e}", inputs.len(), error);

        let csv_path = self.output_file(output_dir, "prediction.csv");
        write_csv(&inputs, &outputs, &csv_path)?;
        log::info!("=> 予測を '{}' に保存しました。", csv_path.display());
        if inputs.dim() == 2 {
            let image = self.output_file(output_dir, "prediction.png");
            match plot_heatmap(&inputs, outputs.as_slice(), "u", &image) {
                Ok(()) => log::info!("=> 予測の図を '{}' に保存しました。", image.display()),
                Err(e) => log::warn!("{}", e),
            }
        }
        Ok(error)
    }

    /// いくつかのパラメータ `k` について DeepONet を評価し、`(t, k)` と `u` の点群を返します。
    fn infer_operator<B: Backend>(&self, model: &DeepONet<B>, grid: usize, device: &B::Device) -> crate::Result<(Points, Points)> {
        let t = interval("t", 0.0, 1.0)?;
        let mut rng = StdRng::seed_from_u64(0);
        let points = GridSampler::new(t, grid).sample_points(&mut rng)?;
        let mut inputs: Option<Points> = None;
        let mut outputs = Vec::new();
        for k in [0.5f32, 1.0, 2.0, 3.0] {
            let fixed = model.fix_branch(
                |p: &Points| p.as_slice().iter().map(|t| (k * t).cos()).collect(),
                device,
            )?;
            let u: Tensor<B, 3> = model.forward_fixed(points.to_tensor(device), &fixed);
            let values = Points::from_tensor(u.reshape([points.len(), 1]), r1("u"))?;
            outputs.extend(values.into_vec());
            let k_column = Points::new(vec![k; points.len()], r1("k"))?;
            let rows = points.join(&k_column)?;
            inputs = Some(match inputs {
                Some(acc) => acc.append(&rows)?,
                None => rows,
            });
        }
        let inputs = inputs.unwrap_or_else(|| Points::empty(r1("t") * r1("k")));
        Ok((inputs, Points::new(outputs, r1("u"))?))
    }
}

/// `f_k(t) = cos(k t)` の関数族。
fn cosine_family() -> ParametricFunction {
    Arc::new(|params: &Points, inputs: &Points| {
        let k = params.as_slice()[0];
        inputs.as_slice().iter().map(|t| (k * t).cos()).collect()
    })
}

/// 設定ファイルを読み込みます。
pub fn load_config(path: &Path) -> crate::Result<ExperimentConfig> {
    Ok(ExperimentConfig::load(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_solutions_satisfy_initial_data() {
        let config = Problem::Advection.default_config();
        let inputs = Points::from_columns(vec![("t", 1, vec![0.0, 0.0]), ("x", 1, vec![0.5, -0.5])]).unwrap();
        let exact = Problem::Advection.exact_solution(&config, &inputs).unwrap();
        assert!((exact[0] - 1.0).abs() < 1e-6);
        assert!((exact[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn field_problems_build_conditions() {
        for problem in [Problem::Advection, Problem::Heat, Problem::Poisson] {
            let config = problem.default_config();
            let built = problem.field_problem::<InferBackend>(&config).unwrap();
            assert!(built.conditions.len() >= 2);
            assert_eq!(built.model.output_space, r1("u"));
        }
        let config = Problem::Antiderivative.default_config();
        assert!(Problem::Antiderivative.field_problem::<InferBackend>(&config).is_err());
        assert!(Problem::Heat.operator_problem::<InferBackend>(&config).is_err());
    }

    #[test]
    fn experiment_config_defaults_to_trainer_defaults() {
        let config = ExperimentConfig::new();
        assert_eq!(config.trainer.max_steps, TrainerConfig::new().max_steps);
        let tuned = config.with_trainer(TrainerConfig::new().with_max_steps(10));
        assert_eq!(tuned.trainer.max_steps, 10);
        assert_eq!(Problem::Poisson.default_config().trainer.max_steps, 5000);
    }

    #[test]
    fn config_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heat.json");
        let config = Problem::Heat.default_config();
        config.save(&path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.coefficient, config.coefficient);
        assert_eq!(loaded.trainer.max_steps, 5000);
    }
}
