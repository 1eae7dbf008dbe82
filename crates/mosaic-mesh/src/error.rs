//! Error types for mesh construction and geometry queries.

use mosaic_core::{BoundaryId, ElementId, NodeId};
use std::fmt;

/// Errors arising from mesh construction or element queries.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshError {
    /// Attempted to construct a mesh with zero elements.
    EmptyMesh,
    /// An element id is outside the mesh.
    ElementOutOfRange {
        /// The offending element.
        element: ElementId,
        /// Number of elements in the mesh.
        count: usize,
    },
    /// A node id is outside the mesh.
    NodeOutOfRange {
        /// The offending node.
        node: NodeId,
        /// Number of nodes in the mesh.
        count: usize,
    },
    /// A side index is not valid for the element type.
    InvalidSide {
        /// The element.
        element: ElementId,
        /// The side index.
        side: u8,
    },
    /// No boundary with this id.
    UnknownBoundary {
        /// The offending boundary.
        boundary: BoundaryId,
    },
    /// An element maps to zero or negative volume.
    DegenerateElement {
        /// The offending element.
        element: ElementId,
    },
    /// Construction parameters are invalid.
    InvalidGeometry {
        /// What went wrong.
        reason: String,
    },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMesh => write!(f, "mesh must have at least one element"),
            Self::ElementOutOfRange { element, count } => {
                write!(f, "element {element} out of range (mesh has {count})")
            }
            Self::NodeOutOfRange { node, count } => {
                write!(f, "node {node} out of range (mesh has {count})")
            }
            Self::InvalidSide { element, side } => {
                write!(f, "element {element} has no side {side}")
            }
            Self::UnknownBoundary { boundary } => write!(f, "unknown boundary {boundary}"),
            Self::DegenerateElement { element } => {
                write!(f, "element {element} has non-positive jacobian")
            }
            Self::InvalidGeometry { reason } => write!(f, "invalid geometry: {reason}"),
        }
    }
}

impl std::error::Error for MeshError {}
