//! Contributor, material, and coupling interfaces for Mosaic.
//!
//! A plugin type implements one of the interfaces in [`contributor`]:
//!
//! - [`Contributor`]: element kernels and integrated boundary conditions
//! - [`NodalContributor`]: strongly imposed boundary conditions
//! - [`AuxContributor`]: nodal producers of auxiliary field values
//! - [`Material`]: producers of quadrature-point properties
//! - [`AdContributor`]: contributors differentiated by [`Dual`] arithmetic
//!
//! Its constructor receives a [`BuildContext`], through which it resolves
//! coupled variables and material properties by name. The recorded
//! [`Couplings`] drive material ordering, off-diagonal Jacobian blocks,
//! and setup-time validation in [`PropertyRegistry::resolve`].
//!
//! During assembly, plugins see only read-only [`QpView`] / [`NodeView`]
//! values backed by a worker-private [`AssemblyContext`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod capability;
pub mod context;
pub mod contributor;
pub mod coupling;
pub mod dual;
pub mod field;
pub mod property;
pub mod view;

pub use capability::{Capability, CapabilitySet};
pub use context::{AssemblyContext, ElementData, LocalBlocks};
pub use contributor::{
    AdAdapter, AdContributor, AuxContributor, Contributor, Material, NodalContributor,
};
pub use coupling::{resolve_tags, BuildContext, Couplings, PropHandle, Restriction, VarHandle};
pub use dual::Dual;
pub use field::{FieldValues, VariableInfo, VariableKind, VariableTable};
pub use property::{DeclaredProp, PropertyRegistry, PropertyValues, PropertyWriter};
pub use view::{DualQp, NodeView, QpView};
