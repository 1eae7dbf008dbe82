//! Type registry and object factory for Mosaic.
//!
//! Plugin types are registered once, at process start, as
//! [`TypeDescriptor`]s keyed by a type id string. The [`Registry`] then
//! builds objects from `(subsystem, type_id, name, parameters)` records:
//! it merges the type's schema with the subsystem's common parameters and
//! the user's values, validates the result, resolves the object's block
//! and boundary restriction, and invokes the constructor.
//!
//! Implementation variants (manual vs AD Jacobians) are separate
//! descriptors, selected by type id at registration time.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod common;
pub mod descriptor;
pub mod registry;

pub use common::{common_params, EXEC_INITIAL, EXEC_LINEAR, EXEC_TIMESTEP_END};
pub use descriptor::{Constructor, ObjectHandle, SchemaFn, TypeDescriptor, Variant, VariableSpec};
pub use registry::{Created, Registry, AD_PREFIX};
