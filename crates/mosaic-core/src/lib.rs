//! Core types and traits for the Mosaic multiphysics framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other Mosaic crate: strongly-typed ids,
//! tag sets, the typed [`ParameterSet`], the deterministic
//! [`DependencyGraph`], and the setup/assembly error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod graph;
pub mod id;
pub mod params;
pub mod subsystem;
pub mod tag;

pub use error::{
    AssemblyError, AssemblyReport, CouplingKind, Location, ParamError, ParamIssue,
    ProgrammerError, SetupError, Target,
};
pub use graph::{CycleError, DependencyGraph};
pub use id::{BlockId, BoundaryId, ElementId, NodeId, PropertyId, TagId, VariableId};
pub use params::{ControlledReal, FromParam, ParamType, ParamValue, ParameterSet};
pub use subsystem::Subsystem;
pub use tag::{TagKind, TagRegistry, TagSet, TagSetIter, JACOBIAN_TAG, RESIDUAL_TAG};
