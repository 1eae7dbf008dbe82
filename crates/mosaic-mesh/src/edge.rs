//! One-dimensional mesh of two-node (EDGE2) elements.

use std::ops::Range;

use mosaic_core::{BlockId, BoundaryId, ElementId, NodeId};
use smallvec::smallvec;

use crate::error::MeshError;
use crate::mesh::{BoundarySide, ElementGeometry, ElementInfo, Mesh, NameTable, Point};
use crate::quadrature::gauss_legendre;

/// A uniform 1D mesh on `[x0, x1]`.
///
/// Node `i` sits at `x0 + i * h`; element `e` spans nodes `e` and `e + 1`.
/// Boundaries are `left` (id 0, side 0 of the first element) and `right`
/// (id 1, side 1 of the last element). All elements start in block `main`
/// (id 0); [`assign_block`](EdgeMesh::assign_block) carves out others.
///
/// ```
/// use mosaic_mesh::{EdgeMesh, Mesh};
///
/// let mut mesh = EdgeMesh::new(0.0, 1.0, 4).unwrap();
/// let right = mesh.assign_block("right_half", 2..4).unwrap();
/// assert_eq!(mesh.element_count(), 4);
/// assert_eq!(mesh.node_count(), 5);
/// assert_eq!(mesh.element(mosaic_core::ElementId(3)).unwrap().block, right);
/// ```
#[derive(Clone, Debug)]
pub struct EdgeMesh {
    x0: f64,
    h: f64,
    n_elem: u32,
    element_blocks: Vec<BlockId>,
    blocks: NameTable,
    boundaries: NameTable,
    sides: Vec<BoundarySide>,
    boundary_nodes: [Vec<NodeId>; 2],
    qp_points: Vec<f64>,
    qp_weights: Vec<f64>,
}

impl EdgeMesh {
    /// Default Gauss points per element.
    pub const DEFAULT_QP: usize = 2;

    /// Create a uniform mesh of `n_elem` elements on `[x0, x1]`.
    pub fn new(x0: f64, x1: f64, n_elem: u32) -> Result<Self, MeshError> {
        if n_elem == 0 {
            return Err(MeshError::EmptyMesh);
        }
        if !(x0.is_finite() && x1.is_finite()) || x1 <= x0 {
            return Err(MeshError::InvalidGeometry {
                reason: format!("interval [{x0}, {x1}] must be finite with x1 > x0"),
            });
        }
        let (qp_points, qp_weights) = gauss_legendre(Self::DEFAULT_QP)?;
        let mut blocks = NameTable::new();
        blocks.insert("main");
        let mut boundaries = NameTable::new();
        boundaries.insert("left");
        boundaries.insert("right");
        let last = ElementId(n_elem - 1);
        Ok(Self {
            x0,
            h: (x1 - x0) / n_elem as f64,
            n_elem,
            element_blocks: vec![BlockId(0); n_elem as usize],
            blocks,
            boundaries,
            sides: vec![
                BoundarySide {
                    element: ElementId(0),
                    side: 0,
                    boundary: BoundaryId(0),
                },
                BoundarySide {
                    element: last,
                    side: 1,
                    boundary: BoundaryId(1),
                },
            ],
            boundary_nodes: [vec![NodeId(0)], vec![NodeId(n_elem)]],
            qp_points,
            qp_weights,
        })
    }

    /// Use an `n`-point Gauss rule per element.
    pub fn with_qp(mut self, n: usize) -> Result<Self, MeshError> {
        let (p, w) = gauss_legendre(n)?;
        self.qp_points = p;
        self.qp_weights = w;
        Ok(self)
    }

    /// Move the elements in `range` into the named block, creating it if
    /// needed.
    pub fn assign_block(&mut self, name: &str, range: Range<u32>) -> Result<BlockId, MeshError> {
        if range.end > self.n_elem || range.start >= range.end {
            return Err(MeshError::InvalidGeometry {
                reason: format!(
                    "block range {}..{} invalid for {} elements",
                    range.start, range.end, self.n_elem
                ),
            });
        }
        let id = BlockId(self.blocks.insert(name));
        for e in range {
            self.element_blocks[e as usize] = id;
        }
        Ok(id)
    }

    /// Element size.
    pub fn h(&self) -> f64 {
        self.h
    }

    fn check(&self, e: ElementId) -> Result<(), MeshError> {
        if e.0 >= self.n_elem {
            return Err(MeshError::ElementOutOfRange {
                element: e,
                count: self.n_elem as usize,
            });
        }
        Ok(())
    }

    fn fill(&self, e: ElementId, xi: &[f64], w: &[f64], side: bool, geom: &mut ElementGeometry) {
        geom.resize(2, xi.len(), side);
        geom.element = e;
        let left = self.x0 + e.0 as f64 * self.h;
        let jac = self.h / 2.0;
        for (qp, (&x, &wt)) in xi.iter().zip(w).enumerate() {
            geom.q_points[qp] = [left + (x + 1.0) * jac, 0.0, 0.0];
            geom.jxw[qp] = wt * jac;
            geom.phi[0][qp] = (1.0 - x) / 2.0;
            geom.phi[1][qp] = (1.0 + x) / 2.0;
            geom.grad_phi[0][qp] = [-1.0 / self.h, 0.0, 0.0];
            geom.grad_phi[1][qp] = [1.0 / self.h, 0.0, 0.0];
        }
    }
}

impl Mesh for EdgeMesh {
    fn dim(&self) -> usize {
        1
    }

    fn element_count(&self) -> usize {
        self.n_elem as usize
    }

    fn node_count(&self) -> usize {
        self.n_elem as usize + 1
    }

    fn element(&self, e: ElementId) -> Result<ElementInfo, MeshError> {
        self.check(e)?;
        Ok(ElementInfo {
            id: e,
            block: self.element_blocks[e.index()],
            nodes: smallvec![NodeId(e.0), NodeId(e.0 + 1)],
        })
    }

    fn node_point(&self, n: NodeId) -> Result<Point, MeshError> {
        if n.0 > self.n_elem {
            return Err(MeshError::NodeOutOfRange {
                node: n,
                count: self.node_count(),
            });
        }
        Ok([self.x0 + n.0 as f64 * self.h, 0.0, 0.0])
    }

    fn reinit_element(&self, e: ElementId, geom: &mut ElementGeometry) -> Result<(), MeshError> {
        self.check(e)?;
        self.fill(e, &self.qp_points, &self.qp_weights, false, geom);
        Ok(())
    }

    fn reinit_side(
        &self,
        e: ElementId,
        side: u8,
        geom: &mut ElementGeometry,
    ) -> Result<(), MeshError> {
        self.check(e)?;
        let (xi, normal) = match side {
            0 => (-1.0, -1.0),
            1 => (1.0, 1.0),
            _ => return Err(MeshError::InvalidSide { element: e, side }),
        };
        // A point side: one quadrature point with unit weight.
        self.fill(e, &[xi], &[1.0], true, geom);
        geom.jxw[0] = 1.0;
        geom.normals[0] = [normal, 0.0, 0.0];
        Ok(())
    }

    fn boundary_sides(&self) -> &[BoundarySide] {
        &self.sides
    }

    fn boundary_nodes(&self, b: BoundaryId) -> Result<&[NodeId], MeshError> {
        self.boundary_nodes
            .get(b.0 as usize)
            .map(Vec::as_slice)
            .ok_or(MeshError::UnknownBoundary { boundary: b })
    }

    fn blocks(&self) -> &NameTable {
        &self.blocks
    }

    fn boundaries(&self) -> &NameTable {
        &self.boundaries
    }
}
