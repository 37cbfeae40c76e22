use burn::backend::NdArray;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use burn_physics::conditions::{
    Condition, DataCondition, OperatorCondition, PeriodicCondition, Residual, StepContext,
};
use burn_physics::deeponet::{BranchNetConfig, DeepONetConfig, TrunkNetConfig};
use burn_physics::differential::Field;
use burn_physics::domains::{Domain, Interval};
use burn_physics::functionsets::{CustomFunctionSet, FunctionSpace, ParametricFunction};
use burn_physics::model::FieldModel;
use burn_physics::samplers::{GridSampler, PointSampler, RandomUniformSampler};
use burn_physics::{Points, Result, Space, r1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::f32::consts::PI;
use std::sync::Arc;

type TestBackend = NdArray<f32>;

/// 式で与えた `(t, x) -> u` のモデル。
struct Formula {
    input: Space,
    output: Space,
    f: fn(Tensor<TestBackend, 2>) -> Tensor<TestBackend, 2>,
}

impl FieldModel<TestBackend> for Formula {
    fn input_space(&self) -> &Space {
        &self.input
    }

    fn output_space(&self) -> &Space {
        &self.output
    }

    fn forward(&self, input: Tensor<TestBackend, 2>) -> Tensor<TestBackend, 2> {
        (self.f)(input)
    }
}

fn interval(name: &str, lower: f32, upper: f32) -> Arc<Interval> {
    Arc::new(Interval::new(r1(name), lower, upper).unwrap())
}

fn loss_value<M, C: Condition<TestBackend, M>>(condition: &mut C, model: &M) -> f32 {
    let mut rng = StdRng::seed_from_u64(11);
    let mut ctx = StepContext {
        rng: &mut rng,
        device: Default::default(),
        step: 1,
    };
    condition
        .loss(model, &mut ctx)
        .unwrap()
        .into_scalar()
        .elem::<f32>()
}

fn columns(x: &Tensor<TestBackend, 2>) -> (Tensor<TestBackend, 2>, Tensor<TestBackend, 2>) {
    let n = x.dims()[0];
    (x.clone().slice([0..n, 0..1]), x.clone().slice([0..n, 1..2]))
}

#[test]
fn periodic_condition_compares_both_ends() {
    let x = interval("x", 0.0, 1.0);
    let t: Arc<dyn Domain> = interval("t", 0.0, 1.0);
    let periodic = Formula {
        input: r1("t") * r1("x"),
        output: r1("u"),
        f: |input| {
            let (t, x) = columns(&input);
            x.mul_scalar(2.0 * PI).cos() + t
        },
    };
    let drifting = Formula {
        input: r1("t") * r1("x"),
        output: r1("u"),
        f: |input| {
            let (t, x) = columns(&input);
            x + t
        },
    };

    let mut condition: PeriodicCondition<TestBackend> =
        PeriodicCondition::new("periodic", &x, Box::new(RandomUniformSampler::new(t, 16))).unwrap();
    assert!(loss_value(&mut condition, &periodic) < 1e-10);
    // u(0) - u(1) = -1
    assert!((loss_value(&mut condition, &drifting) - 1.0).abs() < 1e-5);
}

#[test]
fn data_condition_uses_the_norm_exponent() {
    let zero = Formula {
        input: r1("x"),
        output: r1("u"),
        f: |input| input.zeros_like(),
    };
    let inputs = Points::new(vec![0.0, 0.5, 1.0], r1("x")).unwrap();
    let targets = Points::new(vec![2.0, -2.0, 2.0], r1("u")).unwrap();
    let condition = |p: f32| {
        DataCondition::new("data", inputs.clone(), targets.clone())
            .unwrap()
            .with_norm(p)
    };
    assert!((loss_value(&mut condition(1.0), &zero) - 2.0).abs() < 1e-5);
    assert!((loss_value(&mut condition(2.0), &zero) - 4.0).abs() < 1e-5);
    assert!((loss_value(&mut condition(3.0), &zero) - 8.0).abs() < 1e-4);
}

#[test]
fn operator_rows_are_grouped_by_function() {
    let device = Default::default();
    let t = interval("t", 0.0, 1.0);
    // k ∈ {1, 2, 3}
    let params: Arc<dyn Domain> = interval("k", 0.0, 4.0);
    // f_k(t) = k + t
    let shifted: ParametricFunction = Arc::new(|p: &Points, x: &Points| {
        let k = p.as_slice()[0];
        x.as_slice().iter().map(|t| k + t).collect()
    });
    let functions = CustomFunctionSet::new(
        FunctionSpace::new(t.clone(), r1("f")),
        Box::new(GridSampler::new(params, 3)),
        shifted,
    );

    let n = 4;
    let residual: Residual<TestBackend> =
        Box::new(move |f: &Field<'_, TestBackend>| -> Result<Tensor<TestBackend, 2>> {
            // 行 r は関数 r / n と点 r % n の組
            let expected: Vec<f32> = (0..3 * n).map(|r| (1 + r / n) as f32).collect();
            let k = Tensor::from_data(TensorData::new(expected, [3 * n, 1]), &f.device());
            Ok(f.data("f")? - f.input("t")? - k)
        });
    let mut condition = OperatorCondition::new(
        "operator",
        Box::new(functions),
        Box::new(GridSampler::new(t.clone(), n)),
        residual,
    );

    let mut rng = StdRng::seed_from_u64(0);
    let discretization = GridSampler::new(t, 5).sample_points(&mut rng).unwrap();
    let model = DeepONetConfig::new(
        TrunkNetConfig::new(r1("t"), r1("u"), 8).with_hidden(vec![8]),
        BranchNetConfig::new(r1("u"), 8).with_hidden(vec![8]),
    )
    .init::<TestBackend>(discretization, &device)
    .unwrap();

    assert!(loss_value(&mut condition, &model) < 1e-10);
}
