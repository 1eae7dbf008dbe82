//! Reference physics objects for Mosaic.
//!
//! | type id | subsystem | notes |
//! |---|---|---|
//! | `Diffusion` / `ADDiffusion` | Kernels | `coeff` controllable; `SimpleDiffusion` is a retired alias |
//! | `MatDiffusion` | Kernels | coefficient from a material property |
//! | `Reaction` | Kernels | `rate * u` |
//! | `BodyForce` | Kernels | residual only; `value` controllable |
//! | `CoupledForce` | Kernels | `-coef * v`, off-diagonal Jacobian in `v` |
//! | `TimeDerivative` | Kernels | backward Euler `du/dt` |
//! | `NeumannBC` | BCs | integrated flux |
//! | `MatNeumannBC` | BCs | flux scaled by a material property |
//! | `DirichletBC` | BCs | nodal, `u = value` |
//! | `GenericConstantMaterial` | Materials | `prop_names` / `prop_values` |
//! | `HistoryMaterial` | Materials | stateful: `h = h_old + u` |
//! | `ConstantAux` | AuxKernels | `value` controllable |
//! | `CoupledAux` | AuxKernels | `coef * v + offset` |
//!
//! [`register_all`] adds every type to a registry.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod aux_kernels;
pub mod bcs;
pub mod diffusion;
pub mod materials;
pub mod source;
pub mod time;

use mosaic_core::{ParameterSet, SetupError};
use mosaic_factory::Registry;

pub use aux_kernels::{ConstantAux, CoupledAux};
pub use bcs::{DirichletBc, MatNeumannBc, NeumannBc};
pub use diffusion::{AdDiffusion, Diffusion, MatDiffusion};
pub use materials::{GenericConstantMaterial, HistoryMaterial};
pub use source::{BodyForce, CoupledForce, Reaction};
pub use time::TimeDerivative;

/// Register every type in this crate.
pub fn register_all(registry: &mut Registry) -> Result<(), SetupError> {
    diffusion::register(registry)?;
    source::register(registry)?;
    time::register(registry)?;
    bcs::register(registry)?;
    materials::register(registry)?;
    aux_kernels::register(registry)?;
    Ok(())
}

/// Mark a just-declared `Real` parameter controllable.
pub(crate) fn controllable(p: &mut ParameterSet, name: &str) {
    if let Err(e) = p.mark_controllable(name) {
        log::warn!("schema: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::Subsystem;

    #[test]
    fn registers_every_type() {
        let mut reg = Registry::new();
        register_all(&mut reg).unwrap();
        for id in [
            "Diffusion",
            "ADDiffusion",
            "MatDiffusion",
            "Reaction",
            "BodyForce",
            "CoupledForce",
            "TimeDerivative",
            "NeumannBC",
            "MatNeumannBC",
            "DirichletBC",
            "GenericConstantMaterial",
            "HistoryMaterial",
            "ConstantAux",
            "CoupledAux",
        ] {
            assert!(reg.contains(id), "{id} missing");
        }
        assert_eq!(reg.types_in(Subsystem::Materials).count(), 2);
        assert_eq!(reg.types_in(Subsystem::BoundaryConditions).count(), 3);
        assert_eq!(reg.types_in(Subsystem::AuxKernels).count(), 2);
    }

    #[test]
    fn retired_name_resolves() {
        let mut reg = Registry::new();
        register_all(&mut reg).unwrap();
        let desc = reg.descriptor("SimpleDiffusion").unwrap();
        assert_eq!(desc.type_id(), "Diffusion");
    }

    #[test]
    fn double_registration_fails() {
        let mut reg = Registry::new();
        register_all(&mut reg).unwrap();
        assert!(register_all(&mut reg).is_err());
    }
}
