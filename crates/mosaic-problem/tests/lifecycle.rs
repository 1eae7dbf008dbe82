//! Integration tests: setup failures, time-step lifecycle, stateful
//! properties, checkpoint round trips, and user actions.

use std::sync::{Arc, Mutex};

use mosaic_core::{
    CouplingKind, ElementId, ParamIssue, ParameterSet, SetupError, Subsystem, RESIDUAL_TAG,
};
use mosaic_factory::Registry;
use mosaic_mesh::EdgeMesh;
use mosaic_problem::{
    build_problem, build_problem_in, build_problem_with, builtin_tasks, register_builtins, tasks,
    InputDeck, Phase, Problem, ProblemConfig, RuntimeError,
};
use mosaic_store::{SnapshotEntry, State, StoreError};
use mosaic_test_utils::{register_fixtures, RecordingAction};
use nalgebra::DVector;

// ── Helpers ─────────────────────────────────────────────────────

fn registry() -> Arc<Registry> {
    let mut reg = Registry::new();
    register_builtins(&mut reg).unwrap();
    mosaic_physics::register_all(&mut reg).unwrap();
    register_fixtures(&mut reg).unwrap();
    Arc::new(reg)
}

fn mesh(n: u32) -> Arc<EdgeMesh> {
    Arc::new(EdgeMesh::new(0.0, 1.0, n).unwrap())
}

fn try_build(deck: &InputDeck) -> Result<Problem, SetupError> {
    build_problem(deck, registry(), mesh(4), ProblemConfig::serial())
}

fn with_u() -> InputDeck {
    InputDeck::new().object(Subsystem::Variables, "Variable", "u", ParameterSet::new())
}

fn on(variable: &str) -> ParameterSet {
    ParameterSet::new().with("variable", variable)
}

fn constant(problem: &mut Problem, value: f64) {
    let x = DVector::from_element(problem.n_dofs(), value);
    problem.set_solution(&x).unwrap();
}

// ── Setup failures ──────────────────────────────────────────────

#[test]
fn missing_required_parameter_is_named() {
    let deck = with_u().object(Subsystem::BoundaryConditions, "DirichletBC", "fix", on("u"));
    match try_build(&deck) {
        Err(SetupError::ParameterValidation {
            object,
            type_id,
            issues,
        }) => {
            assert_eq!(object, "fix");
            assert_eq!(type_id, "DirichletBC");
            assert!(issues.contains(&ParamIssue::Missing {
                name: "boundary".to_string()
            }));
        }
        other => panic!("expected ParameterValidation, got {other:?}"),
    }
}

#[test]
fn unknown_type_is_reported() {
    let deck = with_u().object(Subsystem::Kernels, "Nope", "k", on("u"));
    match try_build(&deck) {
        Err(SetupError::UnknownType { subsystem, type_id }) => {
            assert_eq!(subsystem, Subsystem::Kernels);
            assert_eq!(type_id, "Nope");
        }
        other => panic!("expected UnknownType, got {other:?}"),
    }
}

#[test]
fn missing_variable_fails_at_setup() {
    let deck = with_u().object(Subsystem::Kernels, "CoupledForce", "cf", on("u").with("v", "w"));
    match try_build(&deck) {
        Err(SetupError::MissingCoupling { object, name, kind }) => {
            assert_eq!((object.as_str(), name.as_str()), ("cf", "w"));
            assert_eq!(kind, CouplingKind::Variable);
        }
        other => panic!("expected MissingCoupling, got {other:?}"),
    }
}

#[test]
fn missing_material_property_fails_at_setup() {
    let deck = with_u().object(Subsystem::Kernels, "MatDiffusion", "md", on("u"));
    match try_build(&deck) {
        Err(SetupError::MissingCoupling { object, name, kind }) => {
            assert_eq!((object.as_str(), name.as_str()), ("md", "diffusivity"));
            assert_eq!(kind, CouplingKind::MaterialProperty);
        }
        other => panic!("expected MissingCoupling, got {other:?}"),
    }
}

#[test]
fn overlapping_declarers_are_rejected() {
    let material = ParameterSet::new()
        .with("prop_names", vec!["diffusivity"])
        .with("prop_values", vec![1.0]);
    let deck = with_u()
        .object(Subsystem::Materials, "GenericConstantMaterial", "a", material.clone())
        .object(Subsystem::Materials, "GenericConstantMaterial", "b", material);
    match try_build(&deck) {
        Err(SetupError::InvalidState { reason }) => {
            assert!(reason.contains("diffusivity"), "{reason}");
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[test]
fn duplicate_names_within_a_subsystem() {
    let deck = with_u().object(Subsystem::Variables, "Variable", "u", ParameterSet::new());
    match try_build(&deck) {
        Err(SetupError::DuplicateObject { subsystem, name }) => {
            assert_eq!(subsystem, Subsystem::Variables);
            assert_eq!(name, "u");
        }
        other => panic!("expected DuplicateObject, got {other:?}"),
    }
}

#[test]
fn kernels_cannot_act_on_aux_variables() {
    let deck = InputDeck::new()
        .object(Subsystem::AuxVariables, "AuxVariable", "a", ParameterSet::new())
        .object(Subsystem::Kernels, "Diffusion", "d", on("a"));
    match try_build(&deck) {
        Err(SetupError::InvalidState { reason }) => assert!(reason.contains("auxiliary")),
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[test]
fn invalid_config_fails_before_setup() {
    let config = ProblemConfig {
        dt: 0.0,
        ..ProblemConfig::default()
    };
    match build_problem(&with_u(), registry(), mesh(2), config) {
        Err(SetupError::Config { .. }) => {}
        other => panic!("expected Config, got {other:?}"),
    }
}

// ── Materials feeding kernels ───────────────────────────────────

#[test]
fn material_property_drives_kernel() {
    let material = ParameterSet::new()
        .with("prop_names", vec!["diffusivity"])
        .with("prop_values", vec![4.0]);
    let deck = with_u()
        .object(Subsystem::Kernels, "MatDiffusion", "md", on("u"))
        .object(Subsystem::Materials, "GenericConstantMaterial", "m", material);
    let mut problem = try_build(&deck).unwrap();
    let x = DVector::from_fn(problem.n_dofs(), |i, _| i as f64 * 0.25);
    problem.set_solution(&x).unwrap();
    let r = problem.evaluate_residual(RESIDUAL_TAG).unwrap();
    assert!((r[0] + 4.0).abs() < 1e-12);
    assert!((r[4] - 4.0).abs() < 1e-12);
}

// ── Time stepping ───────────────────────────────────────────────

#[test]
fn time_derivative_follows_accepted_steps() {
    let deck = with_u().object(Subsystem::Kernels, "TimeDerivative", "dudt", on("u"));
    let mut problem = try_build(&deck).unwrap();
    problem.set_dt(0.5).unwrap();
    constant(&mut problem, 1.0);

    // u̇ = 2 everywhere on [0, 1].
    let r = problem.evaluate_residual(RESIDUAL_TAG).unwrap();
    assert!((r.sum() - 2.0).abs() < 1e-12);

    problem.accept_step().unwrap();
    assert_eq!(problem.variable_values("u", State::Old).unwrap(), &[1.0; 5]);
    let r = problem.evaluate_residual(RESIDUAL_TAG).unwrap();
    assert!(r.amax() < 1e-12);

    match problem.set_dt(-1.0) {
        Err(RuntimeError::InvalidValue { .. }) => {}
        other => panic!("expected InvalidValue, got {other:?}"),
    }
}

#[test]
fn variable_history_rotates_and_rejects() {
    let mut problem = try_build(&with_u()).unwrap();
    for step in 1..=3 {
        constant(&mut problem, step as f64);
        problem.accept_step().unwrap();
    }
    let values = |p: &Problem, s| p.variable_values("u", s).unwrap()[0];
    assert_eq!(values(&problem, State::Current), 3.0);
    assert_eq!(values(&problem, State::Old), 3.0);
    assert_eq!(values(&problem, State::Older), 2.0);

    constant(&mut problem, 10.0);
    problem.reject_step();
    assert_eq!(values(&problem, State::Current), 3.0);
    assert_eq!(values(&problem, State::Old), 3.0);
    assert_eq!(values(&problem, State::Older), 2.0);
}

fn history_deck() -> InputDeck {
    with_u()
        .object(Subsystem::Kernels, "Diffusion", "d", on("u"))
        .object(Subsystem::Materials, "HistoryMaterial", "hist", on("u"))
}

fn history_at(problem: &Problem, state: State) -> f64 {
    let id = problem.properties().id("history").unwrap();
    problem.store().values(id, state, ElementId(1)).unwrap()[0]
}

#[test]
fn stateful_property_rotates_with_accepted_steps() {
    let mut problem = try_build(&history_deck()).unwrap();
    assert_eq!(problem.phase(), Phase::Ready);
    assert_eq!(history_at(&problem, State::Old), 0.0);
    constant(&mut problem, 1.0);

    problem.evaluate_residual(RESIDUAL_TAG).unwrap();
    assert_eq!(history_at(&problem, State::Current), 1.0);
    problem.accept_step().unwrap();

    problem.evaluate_residual(RESIDUAL_TAG).unwrap();
    problem.accept_step().unwrap();
    assert_eq!(history_at(&problem, State::Old), 2.0);
    assert_eq!(history_at(&problem, State::Older), 1.0);

    // Repeated evaluations within a step recompute from old.
    problem.evaluate_residual(RESIDUAL_TAG).unwrap();
    problem.evaluate_residual(RESIDUAL_TAG).unwrap();
    assert_eq!(history_at(&problem, State::Current), 3.0);

    problem.reject_step();
    assert_eq!(history_at(&problem, State::Current), 2.0);
    assert_eq!(history_at(&problem, State::Old), 2.0);
    assert_eq!(history_at(&problem, State::Older), 1.0);
}

#[test]
fn rejected_evaluation_commits_nothing() {
    let deck = history_deck().object(
        Subsystem::Kernels,
        "PoisonKernel",
        "poison",
        on("u").with("element", 3i64),
    );
    let mut problem = try_build(&deck).unwrap();
    constant(&mut problem, 1.0);
    assert!(problem.evaluate_residual(RESIDUAL_TAG).is_err());
    assert_eq!(history_at(&problem, State::Current), 0.0);
}

// ── Checkpoint ──────────────────────────────────────────────────

#[test]
fn snapshot_round_trip() {
    let mut problem = try_build(&history_deck()).unwrap();
    constant(&mut problem, 1.0);
    problem.evaluate_residual(RESIDUAL_TAG).unwrap();
    problem.accept_step().unwrap();
    let snapshot = problem.snapshot_entries();

    let keys: Vec<(&str, &str)> = snapshot
        .iter()
        .map(|e| (e.object.as_str(), e.property.as_str()))
        .collect();
    assert!(keys.contains(&("u", "value")));
    assert!(keys.contains(&("hist", "history")));

    constant(&mut problem, 5.0);
    problem.evaluate_residual(RESIDUAL_TAG).unwrap();
    problem.accept_step().unwrap();
    assert_ne!(problem.snapshot_entries(), snapshot);

    problem.restore_entries(&snapshot).unwrap();
    assert_eq!(problem.snapshot_entries(), snapshot);

    let mut bad = snapshot.clone();
    bad[0].values.pop();
    match problem.restore_entries(&bad) {
        Err(RuntimeError::SizeMismatch { .. }) => {}
        other => panic!("expected SizeMismatch, got {other:?}"),
    }
    assert_eq!(problem.snapshot_entries(), snapshot);
}

#[test]
fn failed_restore_changes_nothing() {
    let mut problem = try_build(&history_deck()).unwrap();
    let before = problem.snapshot_entries();
    let n = problem.mesh().node_count();

    let mut entries = vec![SnapshotEntry {
        object: "u".into(),
        property: "value".into(),
        state: State::Current,
        values: vec![9.0; n],
    }];
    entries.push(SnapshotEntry {
        object: "nobody".into(),
        property: "history".into(),
        state: State::Old,
        values: vec![1.0],
    });
    match problem.restore_entries(&entries) {
        Err(RuntimeError::Store(StoreError::UnknownEntry { object, .. })) => {
            assert_eq!(object, "nobody")
        }
        other => panic!("expected UnknownEntry, got {other:?}"),
    }
    assert_eq!(problem.snapshot_entries(), before);
    assert_eq!(problem.variable_values("u", State::Current), Some(&vec![0.0; n][..]));

    entries.pop();
    problem.restore_entries(&entries).unwrap();
    assert_eq!(problem.variable_values("u", State::Current), Some(&vec![9.0; n][..]));
}

// ── Aux variables ───────────────────────────────────────────────

#[test]
fn aux_variables_couple_without_dofs() {
    let deck = with_u()
        .object(Subsystem::AuxVariables, "AuxVariable", "a", ParameterSet::new())
        .object(Subsystem::Kernels, "CoupledForce", "cf", on("u").with("v", "a"));
    let mut problem = try_build(&deck).unwrap();
    assert_eq!(problem.n_dofs(), 5);
    problem.set_aux_values("a", &[2.0; 5]).unwrap();
    let r = problem.evaluate_residual(RESIDUAL_TAG).unwrap();
    assert!((r.sum() + 2.0).abs() < 1e-12);

    match problem.set_aux_values("u", &[0.0; 5]) {
        Err(RuntimeError::UnknownVariable { name }) => assert_eq!(name, "u"),
        other => panic!("expected UnknownVariable, got {other:?}"),
    }
}

// ── Actions ─────────────────────────────────────────────────────

#[test]
fn user_actions_join_builtin_tasks() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let diff = format!("{}/d", Subsystem::Kernels);
    let recorder = RecordingAction::new(
        "recorder",
        &[tasks::ADD_KERNEL, tasks::INIT_STATEFUL],
        log.clone(),
    )
    .runs_before(&diff);
    let deck = with_u().object(Subsystem::Kernels, "Diffusion", "d", on("u"));
    let (problem, plan) = build_problem_with(
        &deck,
        registry(),
        mesh(2),
        ProblemConfig::serial(),
        vec![Box::new(recorder)],
    )
    .unwrap();
    assert_eq!(problem.phase(), Phase::Ready);

    let calls: Vec<(&str, &str)> = plan.calls().collect();
    let recorder_at = calls.iter().position(|c| *c == (tasks::ADD_KERNEL, "recorder"));
    let diff_at = calls.iter().position(|c| *c == (tasks::ADD_KERNEL, diff.as_str()));
    assert!(recorder_at.unwrap() < diff_at.unwrap());
    assert_eq!(
        *log.lock().unwrap(),
        vec!["recorder@add_kernel".to_string(), "recorder@init_stateful".to_string()]
    );
}

#[test]
fn custom_task_runs_after_setup() {
    let mut graph = builtin_tasks();
    graph.add_task("postprocess");
    graph
        .add_dependency("postprocess", tasks::INIT_STATEFUL)
        .unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let recorder = RecordingAction::new("post", &["postprocess"], log.clone());
    let (_, plan) = build_problem_in(
        graph,
        &with_u(),
        registry(),
        mesh(2),
        ProblemConfig::serial(),
        vec![Box::new(recorder)],
    )
    .unwrap();
    assert_eq!(plan.steps().last().unwrap().task, "postprocess");
    assert_eq!(*log.lock().unwrap(), vec!["post@postprocess".to_string()]);
}
