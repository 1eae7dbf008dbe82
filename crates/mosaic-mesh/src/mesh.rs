//! The [`Mesh`] collaborator trait and the per-element geometry buffers.

use indexmap::IndexMap;
use mosaic_core::{BlockId, BoundaryId, ElementId, NodeId};
use smallvec::SmallVec;

use crate::error::MeshError;

/// A point in physical space. Unused trailing components are zero.
pub type Point = [f64; 3];

/// Topology of one element.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementInfo {
    /// The element.
    pub id: ElementId,
    /// The block the element belongs to.
    pub block: BlockId,
    /// Element nodes in local (shape function) order.
    pub nodes: SmallVec<[NodeId; 8]>,
}

/// One element side lying on a named boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundarySide {
    /// The element owning the side.
    pub element: ElementId,
    /// Local side index.
    pub side: u8,
    /// The boundary the side belongs to.
    pub boundary: BoundaryId,
}

/// Shape functions and quadrature data for one element or element side.
///
/// Owned per worker and refilled by [`Mesh::reinit_element`] /
/// [`Mesh::reinit_side`]; buffers are reused across elements.
/// Shape function arrays are indexed `[shape][qp]`. On a side, shape
/// functions are those of the whole element evaluated at side points.
#[derive(Clone, Debug, Default)]
pub struct ElementGeometry {
    /// Element (or owning element of the side).
    pub element: ElementId,
    /// Quadrature points in physical coordinates.
    pub q_points: Vec<Point>,
    /// Quadrature weight times Jacobian determinant.
    pub jxw: Vec<f64>,
    /// Shape function values.
    pub phi: Vec<Vec<f64>>,
    /// Shape function gradients in physical coordinates.
    pub grad_phi: Vec<Vec<Point>>,
    /// Outward unit normals (sides only; empty on interiors).
    pub normals: Vec<Point>,
}

impl ElementGeometry {
    /// Number of quadrature points.
    pub fn n_qp(&self) -> usize {
        self.jxw.len()
    }

    /// Number of shape functions.
    pub fn n_shape(&self) -> usize {
        self.phi.len()
    }

    /// Size every buffer for `n_shape` functions at `n_qp` points.
    pub fn resize(&mut self, n_shape: usize, n_qp: usize, side: bool) {
        self.q_points.clear();
        self.q_points.resize(n_qp, [0.0; 3]);
        self.jxw.clear();
        self.jxw.resize(n_qp, 0.0);
        self.phi.resize_with(n_shape, Vec::new);
        self.grad_phi.resize_with(n_shape, Vec::new);
        for row in &mut self.phi {
            row.clear();
            row.resize(n_qp, 0.0);
        }
        for row in &mut self.grad_phi {
            row.clear();
            row.resize(n_qp, [0.0; 3]);
        }
        self.normals.clear();
        if side {
            self.normals.resize(n_qp, [0.0; 3]);
        }
    }
}

/// Read-only mesh and geometry collaborator.
///
/// Supplies element iteration, shape functions, and quadrature. The core
/// never mutates topology. `Sync` is required because every assembly
/// worker holds a shared reference.
///
/// Element, node, block, and boundary ids are dense and in canonical order;
/// two calls return the same data.
pub trait Mesh: Send + Sync + 'static {
    /// Spatial dimension (1 or 2 for the reference meshes).
    fn dim(&self) -> usize;

    /// Number of elements.
    fn element_count(&self) -> usize;

    /// Number of nodes.
    fn node_count(&self) -> usize;

    /// Topology of one element.
    fn element(&self, e: ElementId) -> Result<ElementInfo, MeshError>;

    /// Coordinates of a node.
    fn node_point(&self, n: NodeId) -> Result<Point, MeshError>;

    /// Fill `geom` with interior quadrature data for `e`.
    fn reinit_element(&self, e: ElementId, geom: &mut ElementGeometry) -> Result<(), MeshError>;

    /// Fill `geom` with quadrature data for side `side` of `e`.
    fn reinit_side(
        &self,
        e: ElementId,
        side: u8,
        geom: &mut ElementGeometry,
    ) -> Result<(), MeshError>;

    /// Every boundary side, sorted by (element, side, boundary).
    fn boundary_sides(&self) -> &[BoundarySide];

    /// Nodes on a boundary, ascending and deduplicated.
    fn boundary_nodes(&self, b: BoundaryId) -> Result<&[NodeId], MeshError>;

    /// Named blocks.
    fn blocks(&self) -> &NameTable;

    /// Named boundaries.
    fn boundaries(&self) -> &NameTable;
}

/// A bidirectional name ↔ dense id table for blocks and boundaries.
///
/// Lookups accept either a registered name or the id's decimal form.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NameTable {
    names: IndexMap<String, u32>,
}

impl NameTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name, returning its id. Existing names keep their id.
    pub fn insert(&mut self, name: &str) -> u32 {
        let next = self.names.len() as u32;
        *self.names.entry(name.to_string()).or_insert(next)
    }

    /// Look up an id by name or by decimal id.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        if let Some(&id) = self.names.get(name) {
            return Some(id);
        }
        name.parse::<u32>()
            .ok()
            .filter(|id| self.names.values().any(|v| v == id))
    }

    /// Name registered for an id.
    pub fn name(&self, id: u32) -> Option<&str> {
        self.names
            .iter()
            .find(|(_, &v)| v == id)
            .map(|(k, _)| k.as_str())
    }

    /// `(name, id)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.names.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if no names are registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Look up a block id by name.
pub fn block_id(mesh: &dyn Mesh, name: &str) -> Option<BlockId> {
    mesh.blocks().lookup(name).map(BlockId)
}

/// Look up a boundary id by name.
pub fn boundary_id(mesh: &dyn Mesh, name: &str) -> Option<BoundaryId> {
    mesh.boundaries().lookup(name).map(BoundaryId)
}

/// Invert a 2×2 matrix stored row-major, returning `(inverse, det)`.
pub(crate) fn invert_2x2(m: [[f64; 2]; 2]) -> ([[f64; 2]; 2], f64) {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    let inv = [
        [m[1][1] / det, -m[0][1] / det],
        [-m[1][0] / det, m[0][0] / det],
    ];
    (inv, det)
}
