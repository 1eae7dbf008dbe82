//! Aux kernels: nodal values of auxiliary variables.

use mosaic_core::{ControlledReal, ParamType, ParameterSet, SetupError, Subsystem};
use mosaic_factory::{ObjectHandle, Registry, TypeDescriptor};
use mosaic_kernel::{AuxContributor, CapabilitySet, NodeView, VarHandle};

/// `value` at every node.
#[derive(Debug)]
pub struct ConstantAux {
    value: ControlledReal,
}

impl AuxContributor for ConstantAux {
    fn compute_value(&self, _node: &NodeView<'_>) -> f64 {
        self.value.get()
    }
}

/// `coef * v + offset`, where `v` is a coupled variable or a constant.
#[derive(Debug)]
pub struct CoupledAux {
    coef: f64,
    offset: f64,
    v: VarHandle,
}

impl AuxContributor for CoupledAux {
    fn compute_value(&self, node: &NodeView<'_>) -> f64 {
        self.coef * node.value(self.v) + self.offset
    }
}

fn constant_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_param("value", 0.0, "Value at every node");
    crate::controllable(&mut p, "value");
    p
}

fn coupled_schema() -> ParameterSet {
    let mut p = ParameterSet::new();
    p.add_required_param("v", ParamType::Str, "Coupled variable or a constant")
        .add_param("coef", 1.0, "Scaling")
        .add_param("offset", 0.0, "Added after scaling");
    p
}

pub(crate) fn register(registry: &mut Registry) -> Result<(), SetupError> {
    registry.register(
        "ConstantAux",
        TypeDescriptor::new(
            Subsystem::AuxKernels,
            CapabilitySet::EMPTY,
            constant_schema,
            |ctx| {
                ctx.primary_variable()?;
                Ok(ObjectHandle::AuxKernel(Box::new(ConstantAux {
                    value: ctx.controlled("value")?,
                })))
            },
        ),
    )?;
    registry.register(
        "CoupledAux",
        TypeDescriptor::new(
            Subsystem::AuxKernels,
            CapabilitySet::EMPTY,
            coupled_schema,
            |ctx| {
                ctx.primary_variable()?;
                Ok(ObjectHandle::AuxKernel(Box::new(CoupledAux {
                    coef: ctx.param("coef")?,
                    offset: ctx.param("offset")?,
                    v: ctx.coupled_or("v", 0.0)?,
                })))
            },
        ),
    )?;
    Ok(())
}
