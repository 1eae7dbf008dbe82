//! Volumetric sources and reactions.

use mosaic_core::{ControlledReal, ParamType, ParameterSet, SetupError, Subsystem, VariableId};
use mosaic_factory::{ObjectHandle, Registry, TypeDescriptor};
use mosaic_kernel::{CapabilitySet, Contributor, QpView, VarHandle};

/// `rate * u * φ_i`.
#[derive(Debug)]
pub struct Reaction {
    rate: f64,
}

impl Contributor for Reaction {
    fn residual(&self, qp: &QpView<'_>, i: usize) -> f64 {
        self.rate * qp.u() * qp.phi(i)
    }

    fn jacobian(&self, qp: &QpView<'_>, i: usize, j: usize) -> f64 {
        self.rate * qp.phi(j) * qp.phi(i)
    }
}

/// `-value * φ_i`. Residual only.
#[derive(Debug)]
pub struct BodyForce {
    value: ControlledReal,
}

impl Contributor for BodyForce {
    fn residual(&self, qp: &QpView<'_>, i: usize) -> f64 {
        -self.value.get() * qp.phi(i)
    }
}

/// `-coef * v * φ_i`, where `v` is a coupled variable or a constant.
#[derive(Debug)]
pub struct CoupledForce {
    coef: f64,
    v: VarHandle,
}

impl Contributor for CoupledForce {
    fn residual(&self, qp: &QpView<'_>, i: usize) -> f64 {
        -self.coef * qp.value(self.v) * qp.phi(i)
    }

    fn off_diagonal_jacobian(&self, qp: &QpView<'_>, i: usize, j: usize, jvar: VariableId) -> f64 {
        if self.v.is(jvar) {
            -self.coef * qp.phi(j) * qp.phi(i)
        } else {
            0.0
        }
    }
}

fn reaction_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_param("rate", 1.0, "Reaction rate");
    p
}

fn body_force_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_param("value", 1.0, "Source strength");
    crate::controllable(&mut p, "value");
    p
}

fn coupled_force_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_optional_param("v", ParamType::Str, "Coupled variable or a constant")
        .add_param("coef", 1.0, "Scaling");
    p
}

pub(crate) fn register(registry: &mut Registry) -> Result<(), SetupError> {
    registry.register(
        "Reaction",
        TypeDescriptor::new(
            Subsystem::Kernels,
            CapabilitySet::RESIDUAL_JACOBIAN,
            reaction_schema,
            |ctx| {
                ctx.primary_variable()?;
                Ok(ObjectHandle::Kernel(Box::new(Reaction {
                    rate: ctx.param("rate")?,
                })))
            },
        ),
    )?;
    registry.register(
        "BodyForce",
        TypeDescriptor::new(
            Subsystem::Kernels,
            CapabilitySet::RESIDUAL,
            body_force_schema,
            |ctx| {
                ctx.primary_variable()?;
                Ok(ObjectHandle::Kernel(Box::new(BodyForce {
                    value: ctx.controlled("value")?,
                })))
            },
        ),
    )?;
    registry.register(
        "CoupledForce",
        TypeDescriptor::new(
            Subsystem::Kernels,
            CapabilitySet::RESIDUAL_JACOBIAN,
            coupled_force_schema,
            |ctx| {
                ctx.primary_variable()?;
                Ok(ObjectHandle::Kernel(Box::new(CoupledForce {
                    coef: ctx.param("coef")?,
                    v: ctx.coupled_or("v", 0.0)?,
                })))
            },
        ),
    )?;
    Ok(())
}
