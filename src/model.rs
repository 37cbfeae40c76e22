use crate::error::PhysicsError;
use crate::points::Points;
use crate::spaces::Space;
use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::{Tensor, TensorData, activation};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 隠れ層の間に挟む活性化関数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationKind {
    Tanh,
    Relu,
    Sigmoid,
    Gelu,
    Silu,
}

impl ActivationKind {
    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            ActivationKind::Tanh => activation::tanh(x),
            ActivationKind::Relu => activation::relu(x),
            ActivationKind::Sigmoid => activation::sigmoid(x),
            ActivationKind::Gelu => activation::gelu(x),
            ActivationKind::Silu => activation::silu(x),
        }
    }
}

/// 全結合ネットワークの設定。
#[derive(Config, Debug)]
pub struct FcnConfig {
    /// 入力点の空間
    pub input_space: Space,
    /// 出力の空間
    pub output_space: Space,
    /// 隠れ層ごとのニューロン数
    #[config(default = "vec![20, 20, 20]")]
    pub hidden: Vec<usize>,
    #[config(default = "ActivationKind::Tanh")]
    pub activation: ActivationKind,
    /// Xavier初期化のゲイン
    #[config(default = "5.0 / 3.0")]
    pub xavier_gain: f64,
    /// 入力を `[-1, 1]` に正規化するための各列の範囲
    pub input_bounds: Option<Vec<(f32, f32)>>,
}

/// 入力のアフィン正規化 `x * scale + shift`。
#[derive(Debug, Clone)]
pub struct Normalization {
    scale: Vec<f32>,
    shift: Vec<f32>,
}

impl Normalization {
    /// 範囲 `[lo, hi]` を `[-1, 1]` に写す正規化を作成します。
    pub fn from_bounds(bounds: &[(f32, f32)]) -> Self {
        let mut scale = Vec::with_capacity(bounds.len());
        let mut shift = Vec::with_capacity(bounds.len());
        for &(lo, hi) in bounds {
            let half = (hi - lo) / 2.0;
            let s = if half > 0.0 { 1.0 / half } else { 1.0 };
            scale.push(s);
            shift.push(-(lo + hi) / 2.0 * s);
        }
        Normalization { scale, shift }
    }

    pub fn apply<B: Backend>(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, dim] = x.dims();
        let device = x.device();
        let scale = Tensor::<B, 2>::from_data(TensorData::new(self.scale.clone(), [1, dim]), &device)
            .repeat_dim(0, n);
        let shift = Tensor::<B, 2>::from_data(TensorData::new(self.shift.clone(), [1, dim]), &device)
            .repeat_dim(0, n);
        x * scale + shift
    }
}

/// 全結合の線形層を作成します。
pub(crate) fn fc_layers<B: Backend>(
    input_dim: usize,
    hidden: &[usize],
    output_dim: usize,
    xavier_gain: f64,
    device: &B::Device,
) -> Vec<Linear<B>> {
    let mut sizes = Vec::with_capacity(hidden.len() + 2);
    sizes.push(input_dim);
    sizes.extend_from_slice(hidden);
    sizes.push(output_dim);
    sizes
        .windows(2)
        .map(|w| {
            LinearConfig::new(w[0], w[1])
                .with_initializer(Initializer::XavierUniform { gain: xavier_gain })
                .init(device)
        })
        .collect()
}

/// 活性化関数を最後の層以外に適用しながら線形層を順に通します。
pub(crate) fn fc_forward<B: Backend>(
    linears: &[Linear<B>],
    activation: ActivationKind,
    input: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let last = linears.len().saturating_sub(1);
    let mut x = input;
    for (i, linear) in linears.iter().enumerate() {
        x = linear.forward(x);
        if i < last {
            x = activation.apply(x);
        }
    }
    x
}

/// PINNの本体となる全結合ニューラルネットワーク。
///
/// 入力空間の座標を受け取り、その点における物理量を出力空間の並びで予測します。
#[derive(Module, Debug)]
pub struct Fcn<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Ignored<ActivationKind>,
    input_space: Ignored<Space>,
    output_space: Ignored<Space>,
    normalization: Ignored<Option<Normalization>>,
}

impl FcnConfig {
    /// 新しいモデルを初期化します。
    pub fn init<B: Backend>(&self, device: &B::Device) -> Fcn<B> {
        let linears = fc_layers(
            self.input_space.dim(),
            &self.hidden,
            self.output_space.dim(),
            self.xavier_gain,
            device,
        );
        Fcn {
            linears,
            activation: Ignored(self.activation),
            input_space: Ignored(self.input_space.clone()),
            output_space: Ignored(self.output_space.clone()),
            normalization: Ignored(self.input_bounds.as_deref().map(Normalization::from_bounds)),
        }
    }
}

impl<B: Backend> Fcn<B> {
    /// モデルの順伝播を実行します。入力は `[n, 入力次元]` です。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = match &*self.normalization {
            Some(normalization) => normalization.apply(input),
            None => input,
        };
        fc_forward(&self.linears, *self.activation, x)
    }

    pub fn num_layers(&self) -> usize {
        self.linears.len()
    }
}

/// 座標から物理量を予測するモデル。
pub trait FieldModel<B: Backend> {
    fn input_space(&self) -> &Space;

    fn output_space(&self) -> &Space;

    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;

    /// 点群の列をモデルの入力空間の並びに揃えてから評価します。
    fn forward_points(&self, points: &Points, device: &B::Device) -> crate::Result<Tensor<B, 2>> {
        let inputs = points.select(self.input_space())?;
        Ok(self.forward(inputs.to_tensor(device)))
    }
}

impl<B: Backend> FieldModel<B> for Fcn<B> {
    fn input_space(&self) -> &Space {
        &self.input_space
    }

    fn output_space(&self) -> &Space {
        &self.output_space
    }

    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        Fcn::forward(self, input)
    }
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// 学習済みモデルをファイルに保存します。
pub fn save_model<B: Backend, M: Module<B>>(model: M, path: &Path) -> crate::Result<()> {
    model.save_file(path.to_path_buf(), &recorder())?;
    Ok(())
}

/// 保存済みの重みを `model` に読み込みます。
pub fn load_model<B: Backend, M: Module<B>>(model: M, path: &Path, device: &B::Device) -> crate::Result<M> {
    let file = path.with_extension("mpk");
    if !path.exists() && !file.exists() {
        return Err(PhysicsError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!(
                "モデルファイル '{}' が見つかりません。最初に 'train' コマンドでモデルを学習・保存してください。",
                path.display()
            ),
        )));
    }
    Ok(model.load_file(path.to_path_buf(), &recorder(), device)?)
}
