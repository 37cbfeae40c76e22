use crate::conditions::{Condition, StepContext};
use crate::error::PhysicsError;
use burn::config::Config;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};
use plotters::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

/// 使用するオプティマイザ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
}

/// 学習ループの設定。
#[derive(Config, Debug)]
pub struct TrainerConfig {
    #[config(default = 8000)]
    pub max_steps: usize,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    #[config(default = "OptimizerKind::Adam")]
    pub optimizer: OptimizerKind,
    /// 損失を記録・表示する間隔
    #[config(default = 200)]
    pub log_every: usize,
    /// 検証条件を評価する間隔。`None` の場合は評価しません。
    pub val_every: Option<usize>,
    #[config(default = 42)]
    pub seed: u64,
}

/// 学習中に記録した損失の履歴。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    pub steps: Vec<usize>,
    pub total: Vec<f32>,
    /// 条件名ごとの重み付き損失
    pub conditions: BTreeMap<String, Vec<f32>>,
    pub validation_steps: Vec<usize>,
    pub validation: BTreeMap<String, Vec<f32>>,
}

impl LossHistory {
    fn record(&mut self, step: usize, total: f32, parts: &[(String, f32)]) {
        self.steps.push(step);
        self.total.push(total);
        for (name, value) in parts {
            self.conditions.entry(name.clone()).or_default().push(*value);
        }
    }

    fn record_validation(&mut self, step: usize, parts: &[(String, f32)]) {
        self.validation_steps.push(step);
        for (name, value) in parts {
            self.validation.entry(name.clone()).or_default().push(*value);
        }
    }

    pub fn last_total(&self) -> Option<f32> {
        self.total.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 履歴をJSONファイルに書き出します。
    pub fn save_json(&self, path: &Path) -> crate::Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> crate::Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

/// 学習の結果。
#[derive(Debug)]
pub struct TrainingOutcome<M> {
    pub model: M,
    pub history: LossHistory,
    pub duration: Duration,
}

/// 学習条件の集まりを最小化する学習ループ。
pub struct Solver<B: AutodiffBackend, M> {
    train_conditions: Vec<Box<dyn Condition<B, M>>>,
    val_conditions: Vec<Box<dyn Condition<B, M>>>,
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> Solver<B, M> {
    pub fn new(train_conditions: Vec<Box<dyn Condition<B, M>>>) -> Self {
        Solver {
            train_conditions,
            val_conditions: Vec::new(),
        }
    }

    pub fn with_validation(mut self, val_conditions: Vec<Box<dyn Condition<B, M>>>) -> Self {
        self.val_conditions = val_conditions;
        self
    }

    /// 設定で指定したオプティマイザでモデルを学習します。
    pub fn fit(&mut self, model: M, config: &TrainerConfig, device: &B::Device) -> crate::Result<TrainingOutcome<M>> {
        match config.optimizer {
            OptimizerKind::Adam => self.fit_with(model, AdamConfig::new().init(), config, device),
            OptimizerKind::AdamW => self.fit_with(model, AdamWConfig::new().init(), config, device),
            OptimizerKind::Sgd => self.fit_with(model, SgdConfig::new().init(), config, device),
        }
    }

    /// 任意のオプティマイザでモデルを学習します。
    pub fn fit_with<O: Optimizer<M, B>>(
        &mut self,
        mut model: M,
        mut optim: O,
        config: &TrainerConfig,
        device: &B::Device,
    ) -> crate::Result<TrainingOutcome<M>> {
        if self.train_conditions.is_empty() {
            return Err(PhysicsError::ShapeMismatch(
                "学習条件が1つもありません".to_string(),
            ));
        }
        B::seed(config.seed);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let log_every = config.log_every.max(1);
        let mut history = LossHistory::default();
        let training_start = Instant::now();

        log::info!(
            "学習を開始します - 条件数: {}, ステップ数: {}, 学習率: {}",
            self.train_conditions.len(),
            config.max_steps,
            config.learning_rate
        );

        for step in 1..=config.max_steps {
            let mut ctx = StepContext {
                rng: &mut rng,
                device: device.clone(),
                step,
            };
            let (total_loss, parts) = weighted_losses(&mut self.train_conditions, &model, &mut ctx)?;

            let total_loss_val = total_loss.clone().into_scalar().elem::<f32>();
            if !total_loss_val.is_finite() {
                log::error!("ステップ {} で損失が有限ではなくなりました", step);
                return Err(PhysicsError::Diverged { step });
            }

            if step % log_every == 0 || step == config.max_steps {
                let values = scalar_values(&parts);
                history.record(step, total_loss_val, &values);
                log::info!("[Step {}] Total Loss: {:.6}{}", step, total_loss_val, format_parts(&values));
            }

            let grads = total_loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(config.learning_rate, model, grads);

            if let Some(every) = config.val_every {
                if every > 0 && step % every == 0 && !self.val_conditions.is_empty() {
                    let mut ctx = StepContext {
                        rng: &mut rng,
                        device: device.clone(),
                        step,
                    };
                    let (_, parts) = weighted_losses(&mut self.val_conditions, &model, &mut ctx)?;
                    let values = scalar_values(&parts);
                    history.record_validation(step, &values);
                    log::info!("[Step {}] Validation{}", step, format_parts(&values));
                }
            }
        }

        let duration = training_start.elapsed();
        log::info!("学習が完了しました。学習時間: {:.2?}", duration);

        Ok(TrainingOutcome {
            model,
            history,
            duration,
        })
    }
}

type NamedLoss<B> = (String, Tensor<B, 1>);

/// 各条件の重み付き損失とその合計を計算します。
fn weighted_losses<B: AutodiffBackend, M>(
    conditions: &mut [Box<dyn Condition<B, M>>],
    model: &M,
    ctx: &mut StepContext<'_, B>,
) -> crate::Result<(Tensor<B, 1>, Vec<NamedLoss<B>>)> {
    let mut parts = Vec::with_capacity(conditions.len());
    let mut total: Option<Tensor<B, 1>> = None;
    for condition in conditions.iter_mut() {
        let loss = condition.loss(model, ctx)?.mul_scalar(condition.weight());
        total = Some(match total {
            Some(acc) => acc + loss.clone(),
            None => loss.clone(),
        });
        parts.push((condition.name().to_string(), loss));
    }
    let total = total.unwrap_or_else(|| Tensor::zeros([1], &ctx.device));
    Ok((total, parts))
}

fn scalar_values<B: AutodiffBackend>(parts: &[NamedLoss<B>]) -> Vec<(String, f32)> {
    sum_by_name(
        parts
            .iter()
            .map(|(name, loss)| (name.clone(), loss.clone().into_scalar().elem::<f32>())),
    )
}

/// 同名の条件の損失を足し合わせ、名前ごとに1つの値にします。順序は最初の出現順です。
fn sum_by_name(values: impl IntoIterator<Item = (String, f32)>) -> Vec<(String, f32)> {
    let mut merged: Vec<(String, f32)> = Vec::new();
    for (name, value) in values {
        match merged.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, total)) => *total += value,
            None => merged.push((name, value)),
        }
    }
    merged
}

fn format_parts(values: &[(String, f32)]) -> String {
    values
        .iter()
        .map(|(name, value)| format!(", {}: {:.6}", name, value))
        .collect()
}

/// 学習過程の損失をグラフとしてPNGファイルに出力します。
pub fn plot_loss_history(history: &LossHistory, path: &Path) -> crate::Result<()> {
    draw_loss_history(history, path).map_err(|e| PhysicsError::Plot(e.to_string()))
}

fn draw_loss_history(
    history: &LossHistory,
    path: &Path,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let log10 = |v: f32| v.max(1e-12).log10();
    let all_values = history
        .total
        .iter()
        .chain(history.conditions.values().flatten());
    let (min_log_loss, max_log_loss) = all_values.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(log10(v)), hi.max(log10(v)))
    });
    let (min_log_loss, max_log_loss) = if min_log_loss.is_finite() {
        (min_log_loss - 0.5, max_log_loss + 0.5)
    } else {
        (-6.0, 0.0)
    };
    let first_step = history.steps.first().copied().unwrap_or(0);
    let last_step = history.steps.last().copied().unwrap_or(1).max(first_step + 1);

    let mut chart = ChartBuilder::on(&root)
        .caption("Loss History", ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(first_step..last_step, min_log_loss..max_log_loss)?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("Steps")
        .draw()?;
    chart
        .draw_series(LineSeries::new(
            history
                .steps
                .iter()
                .zip(&history.total)
                .map(|(&step, &val)| (step, log10(val))),
            &RED,
        ))?
        .label("Total Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    for (i, (name, values)) in history.conditions.iter().enumerate() {
        let color = Palette99::pick(i + 1).to_rgba();
        chart
            .draw_series(LineSeries::new(
                history
                    .steps
                    .iter()
                    .zip(values)
                    .map(|(&step, &val)| (step, log10(val))),
                &color,
            ))?
            .label(name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
    }
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_groups_values_by_condition() {
        let mut history = LossHistory::default();
        history.record(10, 3.0, &[("pde".to_string(), 2.0), ("bc".to_string(), 1.0)]);
        history.record(20, 1.5, &[("pde".to_string(), 1.0), ("bc".to_string(), 0.5)]);
        assert_eq!(history.steps, vec![10, 20]);
        assert_eq!(history.conditions["pde"], vec![2.0, 1.0]);
        assert_eq!(history.last_total(), Some(1.5));
    }

    #[test]
    fn same_named_losses_are_summed() {
        let merged = sum_by_name(vec![
            ("data".to_string(), 1.0),
            ("pde".to_string(), 0.5),
            ("data".to_string(), 2.0),
        ]);
        assert_eq!(merged, vec![("data".to_string(), 3.0), ("pde".to_string(), 0.5)]);
    }

    #[test]
    fn trainer_config_defaults() {
        let config = TrainerConfig::new();
        assert_eq!(config.max_steps, 8000);
        assert_eq!(config.optimizer, OptimizerKind::Adam);
        assert!(config.val_every.is_none());
    }

    #[test]
    fn history_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loss.json");
        let mut history = LossHistory::default();
        history.record(1, 1.0, &[("pde".to_string(), 0.5)]);
        history.record_validation(1, &[("exact".to_string(), 0.25)]);
        history.save_json(&path).unwrap();
        assert_eq!(LossHistory::load_json(&path).unwrap(), history);
    }
}
