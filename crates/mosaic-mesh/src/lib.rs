//! Mesh and geometry collaborator for Mosaic.
//!
//! This crate defines the [`Mesh`] trait through which the assembly loop
//! iterates elements and boundary sides and obtains shape functions and
//! quadrature data, along with two reference backends.
//!
//! # Backends
//!
//! - [`EdgeMesh`]: uniform 1D mesh of EDGE2 elements
//! - [`QuadGrid`]: structured 2D grid of QUAD4 elements
//!
//! Mesh generation, partitioning, and distribution are out of scope; any
//! external mesh can be used by implementing [`Mesh`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod edge;
pub mod error;
pub mod mesh;
pub mod quad;
pub mod quadrature;

#[cfg(test)]
pub(crate) mod compliance;

pub use edge::EdgeMesh;
pub use error::MeshError;
pub use mesh::{
    block_id, boundary_id, BoundarySide, ElementGeometry, ElementInfo, Mesh, NameTable, Point,
};
pub use quad::QuadGrid;
pub use quadrature::gauss_legendre;
