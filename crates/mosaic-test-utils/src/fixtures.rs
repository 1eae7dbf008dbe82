//! Mock contributors and actions.
//!
//! - [`ConstantSource`]: residual `-value * phi_i`, registered as `ConstantSource`.
//! - [`PoisonKernel`]: NaN on one element while its `poison` control is
//!   non-zero, registered as `PoisonKernel`.
//! - [`RecordingAction`]: logs `name@task` for every call.

use std::sync::{Arc, Mutex};

use mosaic_action::Action;
use mosaic_core::{ControlledReal, ElementId, ParameterSet, SetupError, Subsystem};
use mosaic_factory::{ObjectHandle, Registry, TypeDescriptor};
use mosaic_kernel::{CapabilitySet, Contributor, QpView};

/// Residual `-value * phi_i`; no Jacobian.
pub struct ConstantSource {
    pub value: f64,
}

impl Contributor for ConstantSource {
    fn residual(&self, qp: &QpView<'_>, i: usize) -> f64 {
        -self.value * qp.phi(i)
    }
}

/// Emits NaN on one element while `poison` is non-zero.
pub struct PoisonKernel {
    pub element: ElementId,
    pub poison: ControlledReal,
}

impl PoisonKernel {
    fn value(&self, qp: &QpView<'_>) -> f64 {
        if qp.element() == self.element && self.poison.get() != 0.0 {
            f64::NAN
        } else {
            0.0
        }
    }
}

impl Contributor for PoisonKernel {
    fn residual(&self, qp: &QpView<'_>, _i: usize) -> f64 {
        self.value(qp)
    }

    fn jacobian(&self, qp: &QpView<'_>, _i: usize, _j: usize) -> f64 {
        self.value(qp)
    }
}

fn constant_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_param("value", 1.0, "Source strength");
    p
}

fn poison_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_param("element", 0i64, "Element that goes bad");
    p.add_param("poison", 1.0, "Non-zero to emit NaN");
    p.mark_controllable("poison").expect("declared above");
    p
}

/// Register `ConstantSource` and `PoisonKernel`.
pub fn register_fixtures(registry: &mut Registry) -> Result<(), SetupError> {
    registry.register(
        "ConstantSource",
        TypeDescriptor::new(
            Subsystem::Kernels,
            CapabilitySet::RESIDUAL,
            constant_schema,
            |ctx| {
                ctx.primary_variable()?;
                Ok(ObjectHandle::Kernel(Box::new(ConstantSource {
                    value: ctx.param("value")?,
                })))
            },
        ),
    )?;
    registry.register(
        "PoisonKernel",
        TypeDescriptor::new(
            Subsystem::Kernels,
            CapabilitySet::RESIDUAL_JACOBIAN,
            poison_schema,
            |ctx| {
                ctx.primary_variable()?;
                let element: i64 = ctx.param("element")?;
                Ok(ObjectHandle::Kernel(Box::new(PoisonKernel {
                    element: ElementId(element as u32),
                    poison: ctx.controlled("poison")?,
                })))
            },
        ),
    )?;
    Ok(())
}

/// An action that records each call as `name@task`.
pub struct RecordingAction {
    pub name: String,
    pub tasks: Vec<String>,
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl RecordingAction {
    pub fn new(name: &str, tasks: &[&str], log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
            before: Vec::new(),
            after: Vec::new(),
            log,
        }
    }

    pub fn runs_before(mut self, other: &str) -> Self {
        self.before.push(other.to_string());
        self
    }

    pub fn runs_after(mut self, other: &str) -> Self {
        self.after.push(other.to_string());
        self
    }
}

impl<T> Action<T> for RecordingAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn tasks(&self) -> Vec<String> {
        self.tasks.clone()
    }

    fn before(&self) -> Vec<String> {
        self.before.clone()
    }

    fn after(&self) -> Vec<String> {
        self.after.clone()
    }

    fn mutate(&mut self, task: &str, _target: &mut T) -> Result<(), SetupError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(format!("{}@{task}", self.name));
        }
        Ok(())
    }
}
