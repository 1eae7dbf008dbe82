//! Mosaic: the extensibility core of a multiphysics finite-element framework.
//!
//! This facade re-exports the public API of every Mosaic sub-crate. Most
//! users depend on `mosaic` alone.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use mosaic::prelude::*;
//!
//! let registry = Arc::new(mosaic::default_registry().unwrap());
//! let mesh: Arc<dyn Mesh> = Arc::new(EdgeMesh::new(0.0, 1.0, 8).unwrap());
//!
//! let deck = InputDeck::new()
//!     .object(Subsystem::Variables, "Variable", "u", ParameterSet::new())
//!     .object(
//!         Subsystem::Kernels,
//!         "Diffusion",
//!         "diff",
//!         ParameterSet::new().with("variable", "u"),
//!     )
//!     .object(
//!         Subsystem::Kernels,
//!         "BodyForce",
//!         "source",
//!         ParameterSet::new().with("variable", "u"),
//!     )
//!     .object(
//!         Subsystem::BoundaryConditions,
//!         "DirichletBC",
//!         "ends",
//!         ParameterSet::new()
//!             .with("variable", "u")
//!             .with("boundary", vec!["left", "right"]),
//!     );
//!
//! let mut problem = build_problem(&deck, registry, mesh, ProblemConfig::default()).unwrap();
//! let r = problem.evaluate_residual(RESIDUAL_TAG).unwrap();
//! assert_eq!(r.len(), problem.n_dofs());
//! // u = 0 satisfies both Dirichlet rows.
//! assert_eq!(r[0], 0.0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `mosaic-core` | IDs, parameters, tags, error types, dependency graph |
//! | [`mesh`] | `mosaic-mesh` | Mesh trait, 1D and quad meshes, quadrature |
//! | [`store`] | `mosaic-store` | Solution histories and stateful property storage |
//! | [`kernel`] | `mosaic-kernel` | Contributor and material traits, coupling, AD |
//! | [`factory`] | `mosaic-factory` | Type registry and object construction |
//! | [`action`] | `mosaic-action` | Setup tasks and action scheduling |
//! | [`problem`] | `mosaic-problem` | Problem setup, threaded assembly, step control |
//! | [`physics`] | `mosaic-physics` | Reference kernels, BCs, and materials |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// IDs, parameter sets, tags, and error types (`mosaic-core`).
pub use mosaic_core as types;

/// The [`mesh::Mesh`] trait and bundled meshes (`mosaic-mesh`).
pub use mosaic_mesh as mesh;

/// Nodal solution histories and the stateful property store (`mosaic-store`).
pub use mosaic_store as store;

/// Contributor, nodal contributor, and material traits (`mosaic-kernel`).
///
/// [`kernel::BuildContext`] is what a constructor uses to request
/// parameters, coupled variables, and material properties.
pub use mosaic_kernel as kernel;

/// The type [`factory::Registry`] (`mosaic-factory`).
pub use mosaic_factory as factory;

/// Setup tasks and actions (`mosaic-action`).
pub use mosaic_action as action;

/// Problem setup and evaluation (`mosaic-problem`).
pub use mosaic_problem as problem;

/// Reference physics objects (`mosaic-physics`).
pub use mosaic_physics as physics;

use mosaic_core::SetupError;
use mosaic_factory::Registry;

/// A registry holding the built-in variable types and every reference
/// physics object.
pub fn default_registry() -> Result<Registry, SetupError> {
    let mut registry = Registry::new();
    mosaic_problem::register_builtins(&mut registry)?;
    mosaic_physics::register_all(&mut registry)?;
    Ok(registry)
}

/// Common imports for typical Mosaic usage.
///
/// ```rust
/// use mosaic::prelude::*;
/// ```
pub mod prelude {
    // Core
    pub use mosaic_core::{
        ControlledReal, ParamType, ParameterSet, Subsystem, TagKind, JACOBIAN_TAG, RESIDUAL_TAG,
    };

    // Errors
    pub use mosaic_core::{AssemblyError, AssemblyReport, ParamError, SetupError};
    pub use mosaic_problem::{EvalFailure, RuntimeError};

    // Mesh
    pub use mosaic_mesh::{EdgeMesh, Mesh, QuadGrid};

    // Store
    pub use mosaic_store::State;

    // Extension traits
    pub use mosaic_kernel::{
        AdContributor, AuxContributor, BuildContext, CapabilitySet, Contributor, Material,
        NodalContributor, NodeView, QpView,
    };
    pub use mosaic_factory::{ObjectHandle, Registry, TypeDescriptor};
    pub use mosaic_action::Action;

    // Problem
    pub use mosaic_problem::{
        build_problem, build_problem_with, EvalRequest, InputDeck, Problem, ProblemConfig,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_builtins_and_physics() {
        let reg = default_registry().unwrap();
        for id in [
            "Variable",
            "AuxVariable",
            "Diffusion",
            "DirichletBC",
            "HistoryMaterial",
            "CoupledAux",
        ] {
            assert!(reg.contains(id), "{id}");
        }
    }
}
