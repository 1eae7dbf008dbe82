//! Built-in variable types, setup tasks, and the actions that drive them.

use std::sync::Arc;

use mosaic_action::{Action, ActionPipeline, Plan, TaskGraph};
use mosaic_core::{ParameterSet, SetupError, Subsystem};
use mosaic_factory::{ObjectHandle, Registry, TypeDescriptor, VariableSpec};
use mosaic_kernel::{CapabilitySet, VariableKind};
use mosaic_mesh::Mesh;

use crate::config::ProblemConfig;
use crate::input::{InputDeck, InputRecord};
use crate::problem::Problem;

/// Names of the built-in setup tasks, in execution order.
pub mod tasks {
    /// Nonlinear variables.
    pub const ADD_VARIABLE: &str = "add_variable";
    /// Auxiliary variables.
    pub const ADD_AUX_VARIABLE: &str = "add_aux_variable";
    /// Materials.
    pub const ADD_MATERIAL: &str = "add_material";
    /// Aux kernels.
    pub const ADD_AUX_KERNEL: &str = "add_aux_kernel";
    /// Kernels.
    pub const ADD_KERNEL: &str = "add_kernel";
    /// Boundary conditions.
    pub const ADD_BC: &str = "add_bc";
    /// Coupling validation, material ordering, DOF numbering.
    pub const RESOLVE_COUPLING: &str = "resolve_coupling";
    /// Stateful property initialization.
    pub const INIT_STATEFUL: &str = "init_stateful";

    /// All of the above.
    pub const ALL: [&str; 8] = [
        ADD_VARIABLE,
        ADD_AUX_VARIABLE,
        ADD_MATERIAL,
        ADD_AUX_KERNEL,
        ADD_KERNEL,
        ADD_BC,
        RESOLVE_COUPLING,
        INIT_STATEFUL,
    ];
}

/// The built-in task graph.
pub fn builtin_tasks() -> TaskGraph {
    TaskGraph::sequence(&tasks::ALL)
}

/// The setup task that adds objects of `subsystem`.
pub fn task_for(subsystem: Subsystem) -> &'static str {
    match subsystem {
        Subsystem::Variables => tasks::ADD_VARIABLE,
        Subsystem::AuxVariables => tasks::ADD_AUX_VARIABLE,
        Subsystem::Materials => tasks::ADD_MATERIAL,
        Subsystem::AuxKernels => tasks::ADD_AUX_KERNEL,
        Subsystem::Kernels => tasks::ADD_KERNEL,
        Subsystem::BoundaryConditions => tasks::ADD_BC,
    }
}

fn variable_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_param("initial_condition", 0.0, "Value every state starts from");
    p
}

fn variable_type(subsystem: Subsystem, kind: VariableKind) -> TypeDescriptor {
    TypeDescriptor::new(subsystem, CapabilitySet::EMPTY, variable_schema, move |ctx| {
        Ok(ObjectHandle::Variable(VariableSpec {
            kind,
            initial_condition: ctx.param("initial_condition")?,
        }))
    })
}

/// Register `Variable` and `AuxVariable`.
pub fn register_builtins(registry: &mut Registry) -> Result<(), SetupError> {
    registry.register(
        "Variable",
        variable_type(Subsystem::Variables, VariableKind::Nonlinear),
    )?;
    registry.register(
        "AuxVariable",
        variable_type(Subsystem::AuxVariables, VariableKind::Auxiliary),
    )?;
    Ok(())
}

// ── Actions ────────────────────────────────────────────────────────

/// Adds one input record in its subsystem's task.
#[derive(Debug)]
pub struct AddObjectAction {
    name: String,
    record: InputRecord,
}

impl AddObjectAction {
    /// An action for `record`, named `"<subsystem>/<name>"`.
    pub fn new(record: InputRecord) -> Self {
        Self {
            name: format!("{}/{}", record.subsystem, record.name),
            record,
        }
    }
}

impl Action<Problem> for AddObjectAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn tasks(&self) -> Vec<String> {
        vec![task_for(self.record.subsystem).to_string()]
    }

    fn mutate(&mut self, _task: &str, problem: &mut Problem) -> Result<(), SetupError> {
        let r = &self.record;
        problem.add_object(r.subsystem, &r.type_id, &r.name, &r.params)
    }
}

/// Runs [`Problem::resolve_coupling`] and [`Problem::init_stateful`].
#[derive(Debug, Default)]
pub struct FinalizeAction;

impl Action<Problem> for FinalizeAction {
    fn name(&self) -> &str {
        "finalize"
    }

    fn tasks(&self) -> Vec<String> {
        vec![
            tasks::RESOLVE_COUPLING.to_string(),
            tasks::INIT_STATEFUL.to_string(),
        ]
    }

    fn mutate(&mut self, task: &str, problem: &mut Problem) -> Result<(), SetupError> {
        match task {
            tasks::RESOLVE_COUPLING => problem.resolve_coupling(),
            tasks::INIT_STATEFUL => problem.init_stateful(),
            other => Err(SetupError::UnknownTask {
                task: other.to_string(),
                action: self.name().to_string(),
            }),
        }
    }
}

// ── Entry point ────────────────────────────────────────────────────

/// Set up a problem from an input deck with the built-in tasks.
pub fn build_problem(
    input: &InputDeck,
    registry: Arc<Registry>,
    mesh: Arc<dyn Mesh>,
    config: ProblemConfig,
) -> Result<Problem, SetupError> {
    build_problem_with(input, registry, mesh, config, Vec::new()).map(|(p, _)| p)
}

/// Like [`build_problem`], with extra actions on the built-in tasks.
/// Also returns the executed plan.
pub fn build_problem_with(
    input: &InputDeck,
    registry: Arc<Registry>,
    mesh: Arc<dyn Mesh>,
    config: ProblemConfig,
    extra: Vec<Box<dyn Action<Problem>>>,
) -> Result<(Problem, Plan), SetupError> {
    build_problem_in(builtin_tasks(), input, registry, mesh, config, extra)
}

/// Set up a problem over a caller-supplied task graph, which must contain
/// the built-in tasks.
pub fn build_problem_in(
    graph: TaskGraph,
    input: &InputDeck,
    registry: Arc<Registry>,
    mesh: Arc<dyn Mesh>,
    config: ProblemConfig,
    extra: Vec<Box<dyn Action<Problem>>>,
) -> Result<(Problem, Plan), SetupError> {
    let mut problem = Problem::new(mesh, registry, config)?;
    for (name, kind) in &input.tags {
        problem.add_tag(name, *kind)?;
    }

    let mut seen = std::collections::HashSet::new();
    let mut pipeline = ActionPipeline::new(graph);
    for record in &input.records {
        if !seen.insert((record.subsystem, record.name.as_str())) {
            return Err(SetupError::DuplicateObject {
                subsystem: record.subsystem,
                name: record.name.clone(),
            });
        }
        pipeline.add(Box::new(AddObjectAction::new(record.clone())))?;
    }
    pipeline.add(Box::new(FinalizeAction))?;
    for action in extra {
        pipeline.add(action)?;
    }
    let plan = pipeline.run(&mut problem)?;
    Ok((problem, plan))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_task_order() {
        let order = builtin_tasks().order().unwrap();
        assert_eq!(order, tasks::ALL.map(String::from).to_vec());
    }

    #[test]
    fn every_subsystem_has_a_task() {
        let graph = builtin_tasks();
        for s in Subsystem::ALL {
            assert!(graph.contains(task_for(s)), "{s}");
        }
    }

    #[test]
    fn builtins_register_once() {
        let mut reg = Registry::new();
        register_builtins(&mut reg).unwrap();
        assert!(reg.contains("Variable"));
        assert!(reg.contains("AuxVariable"));
        match register_builtins(&mut reg) {
            Err(SetupError::DuplicateType { .. }) => {}
            other => panic!("expected DuplicateType, got {other:?}"),
        }
    }
}
