use burn::backend::{Autodiff, NdArray};
use burn::tensor::Tensor;
use burn_physics::conditions::{Condition, DataCondition, PinnCondition, Residual};
use burn_physics::differential::Field;
use burn_physics::domains::{Domain, Interval};
use burn_physics::model::{Fcn, FcnConfig, FieldModel, load_model, save_model};
use burn_physics::problems::{ExperimentConfig, Problem};
use burn_physics::samplers::RandomUniformSampler;
use burn_physics::training::{Solver, TrainerConfig};
use burn_physics::{PhysicsError, Points, Result, r1};
use std::sync::Arc;

type TrainBackend = Autodiff<NdArray<f32>>;

fn unit_interval() -> Arc<dyn Domain> {
    Arc::new(Interval::new(r1("x"), 0.0, 1.0).unwrap())
}

fn quadratic_data() -> DataCondition {
    let xs: Vec<f32> = (0..16).map(|i| i as f32 / 15.0).collect();
    let us: Vec<f32> = xs.iter().map(|x| x * x).collect();
    DataCondition::new(
        "data",
        Points::new(xs, r1("x")).unwrap(),
        Points::new(us, r1("u")).unwrap(),
    )
    .unwrap()
}

#[test]
fn fitting_data_reduces_the_loss() {
    let device = Default::default();
    let model = FcnConfig::new(r1("x"), r1("u"))
        .with_hidden(vec![16, 16])
        .init::<TrainBackend>(&device);
    let conditions: Vec<Box<dyn Condition<TrainBackend, Fcn<TrainBackend>>>> =
        vec![Box::new(quadratic_data())];
    let config = TrainerConfig::new()
        .with_max_steps(200)
        .with_learning_rate(1e-2)
        .with_log_every(10);

    let outcome = Solver::new(conditions).fit(model, &config, &device).unwrap();
    let history = outcome.history;
    assert_eq!(history.steps.len(), 20);
    assert_eq!(history.conditions["data"].len(), 20);
    let first = history.total[0];
    let last = history.last_total().unwrap();
    assert!(last < first, "loss did not decrease: {} -> {}", first, last);
}

#[test]
fn physics_residual_trains_through_finite_differences() {
    let device = Default::default();
    let model = FcnConfig::new(r1("x"), r1("u")).init::<TrainBackend>(&device);
    // u' = 1
    let residual: Residual<TrainBackend> =
        Box::new(|f: &Field<'_, TrainBackend>| -> Result<Tensor<TrainBackend, 2>> {
            Ok(f.partial("u", &["x"])?.sub_scalar(1.0))
        });
    let conditions: Vec<Box<dyn Condition<TrainBackend, Fcn<TrainBackend>>>> = vec![Box::new(
        PinnCondition::new("pde", Box::new(RandomUniformSampler::new(unit_interval(), 64)), residual),
    )];
    let config = TrainerConfig::new().with_max_steps(300).with_log_every(50);

    let history = Solver::new(conditions).fit(model, &config, &device).unwrap().history;
    let first = history.total[0];
    let last = history.last_total().unwrap();
    assert!(last < first, "residual loss did not decrease: {} -> {}", first, last);
}

#[test]
fn same_named_conditions_share_one_value_per_step() {
    let device = Default::default();
    let model = FcnConfig::new(r1("x"), r1("u"))
        .with_hidden(vec![8])
        .init::<TrainBackend>(&device);
    let conditions: Vec<Box<dyn Condition<TrainBackend, Fcn<TrainBackend>>>> =
        vec![Box::new(quadratic_data()), Box::new(quadratic_data().with_weight(2.0))];
    let config = TrainerConfig::new().with_max_steps(3).with_log_every(1);

    let history = Solver::new(conditions).fit(model, &config, &device).unwrap().history;
    assert_eq!(history.steps, vec![1, 2, 3]);
    assert_eq!(history.conditions.len(), 1);
    let data = &history.conditions["data"];
    assert_eq!(data.len(), 3);
    for (part, total) in data.iter().zip(&history.total) {
        assert!((part - total).abs() <= 1e-5 * total.abs().max(1.0));
    }
}

#[test]
fn non_finite_loss_is_reported_as_divergence() {
    let device = Default::default();
    let model = FcnConfig::new(r1("x"), r1("u")).init::<TrainBackend>(&device);
    let residual: Residual<TrainBackend> =
        Box::new(|f: &Field<'_, TrainBackend>| -> Result<Tensor<TrainBackend, 2>> {
            Ok(f.output("u")?.mul_scalar(f32::NAN))
        });
    let conditions: Vec<Box<dyn Condition<TrainBackend, Fcn<TrainBackend>>>> = vec![Box::new(
        PinnCondition::new("nan", Box::new(RandomUniformSampler::new(unit_interval(), 8)), residual),
    )];
    let config = TrainerConfig::new().with_max_steps(10);

    match Solver::new(conditions).fit(model, &config, &device) {
        Err(PhysicsError::Diverged { step }) => assert_eq!(step, 1),
        other => panic!("expected divergence, got {:?}", other.map(|o| o.history)),
    }
}

#[test]
fn validation_conditions_are_recorded() {
    let device = Default::default();
    let model = FcnConfig::new(r1("x"), r1("u"))
        .with_hidden(vec![8])
        .init::<TrainBackend>(&device);
    let train: Vec<Box<dyn Condition<TrainBackend, Fcn<TrainBackend>>>> =
        vec![Box::new(quadratic_data())];
    let val: Vec<Box<dyn Condition<TrainBackend, Fcn<TrainBackend>>>> =
        vec![Box::new(quadratic_data().with_batch_size(4))];
    let config = TrainerConfig::new()
        .with_max_steps(20)
        .with_log_every(5)
        .with_val_every(Some(10));

    let outcome = Solver::new(train)
        .with_validation(val)
        .fit(model, &config, &device)
        .unwrap();
    assert_eq!(outcome.history.validation_steps, vec![10, 20]);
    assert_eq!(outcome.history.validation["data"].len(), 2);
}

fn small(problem: Problem) -> ExperimentConfig {
    problem
        .default_config()
        .with_hidden(vec![8, 8])
        .with_n_interior(32)
        .with_n_boundary(8)
        .with_n_functions(4)
        .with_discretization_points(6)
        .with_output_neurons(8)
        .with_trainer(TrainerConfig::new().with_max_steps(3).with_log_every(1))
}

#[test]
fn built_in_pinn_problems_train_for_a_few_steps() {
    let device = Default::default();
    for problem in [Problem::Advection, Problem::Heat, Problem::Poisson] {
        let config = small(problem);
        let built = problem.field_problem::<TrainBackend>(&config).unwrap();
        let model = built.model.init::<TrainBackend>(&device);
        let outcome = Solver::new(built.conditions)
            .fit(model, &config.trainer, &device)
            .unwrap();
        assert_eq!(outcome.history.steps, vec![1, 2, 3]);
        assert!(outcome.history.total.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn antiderivative_operator_trains_for_a_few_steps() {
    let device = Default::default();
    let config = small(Problem::Antiderivative);
    let built = Problem::Antiderivative
        .operator_problem::<TrainBackend>(&config)
        .unwrap();
    assert_eq!(built.discretization.len(), 6);
    let model = built
        .model
        .init::<TrainBackend>(built.discretization, &device)
        .unwrap();
    let outcome = Solver::new(built.conditions)
        .fit(model, &config.trainer, &device)
        .unwrap();
    assert_eq!(outcome.history.conditions.len(), 2);
    assert!(outcome.history.total.iter().all(|v| v.is_finite()));
}

#[test]
fn saved_model_loads_on_the_inference_backend() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model");
    let device = Default::default();
    let config = FcnConfig::new(r1("x"), r1("u")).with_hidden(vec![4]);
    let trained = config.init::<TrainBackend>(&device);
    let points = Points::new(vec![0.0, 0.5, 1.0], r1("x")).unwrap();
    let expected = trained
        .forward_points(&points, &device)
        .unwrap()
        .into_data()
        .to_vec::<f32>()
        .unwrap();
    save_model(trained, &path).unwrap();

    let fresh = config.init::<NdArray<f32>>(&device);
    let loaded = load_model(fresh, &path, &device).unwrap();
    let actual = loaded
        .forward_points(&points, &device)
        .unwrap()
        .into_data()
        .to_vec::<f32>()
        .unwrap();
    for (a, e) in actual.iter().zip(&expected) {
        assert!((a - e).abs() < 1e-6);
    }
    assert!(load_model(config.init::<NdArray<f32>>(&device), &dir.path().join("missing"), &device).is_err());
}
