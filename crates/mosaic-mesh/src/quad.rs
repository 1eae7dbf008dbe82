//! Structured 2D grid of four-node bilinear (QUAD4) elements.

use std::ops::Range;

use mosaic_core::{BlockId, BoundaryId, ElementId, NodeId};
use smallvec::smallvec;

use crate::error::MeshError;
use crate::mesh::{
    invert_2x2, BoundarySide, ElementGeometry, ElementInfo, Mesh, NameTable, Point,
};
use crate::quadrature::gauss_legendre;

const REF_XI: [f64; 4] = [-1.0, 1.0, 1.0, -1.0];
const REF_ETA: [f64; 4] = [-1.0, -1.0, 1.0, 1.0];

/// A structured `nx × ny` grid on `[x0, x1] × [y0, y1]`.
///
/// Node `(i, j)` has id `j * (nx + 1) + i`; element `(i, j)` has id
/// `j * nx + i` with nodes ordered counterclockwise from its lower-left
/// corner. Sides follow the node order: side 0 is the bottom edge, then
/// right, top, left. Boundaries are `bottom` (0), `right` (1), `top` (2),
/// and `left` (3).
#[derive(Clone, Debug)]
pub struct QuadGrid {
    origin: [f64; 2],
    h: [f64; 2],
    nx: u32,
    ny: u32,
    element_blocks: Vec<BlockId>,
    blocks: NameTable,
    boundaries: NameTable,
    sides: Vec<BoundarySide>,
    boundary_nodes: [Vec<NodeId>; 4],
    qp_points: Vec<f64>,
    qp_weights: Vec<f64>,
}

impl QuadGrid {
    /// Default Gauss points per direction.
    pub const DEFAULT_QP: usize = 2;

    /// Create a grid of `nx × ny` elements.
    pub fn new(x: [f64; 2], y: [f64; 2], nx: u32, ny: u32) -> Result<Self, MeshError> {
        if nx == 0 || ny == 0 {
            return Err(MeshError::EmptyMesh);
        }
        for (lo, hi) in [(x[0], x[1]), (y[0], y[1])] {
            if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
                return Err(MeshError::InvalidGeometry {
                    reason: format!("interval [{lo}, {hi}] must be finite with hi > lo"),
                });
            }
        }
        let (qp_points, qp_weights) = gauss_legendre(Self::DEFAULT_QP)?;

        let mut blocks = NameTable::new();
        blocks.insert("main");
        let mut boundaries = NameTable::new();
        for name in ["bottom", "right", "top", "left"] {
            boundaries.insert(name);
        }

        let node = |i: u32, j: u32| NodeId(j * (nx + 1) + i);
        let elem = |i: u32, j: u32| ElementId(j * nx + i);
        let mut sides = Vec::with_capacity(2 * (nx + ny) as usize);
        for i in 0..nx {
            sides.push(BoundarySide {
                element: elem(i, 0),
                side: 0,
                boundary: BoundaryId(0),
            });
            sides.push(BoundarySide {
                element: elem(i, ny - 1),
                side: 2,
                boundary: BoundaryId(2),
            });
        }
        for j in 0..ny {
            sides.push(BoundarySide {
                element: elem(nx - 1, j),
                side: 1,
                boundary: BoundaryId(1),
            });
            sides.push(BoundarySide {
                element: elem(0, j),
                side: 3,
                boundary: BoundaryId(3),
            });
        }
        sides.sort();

        let boundary_nodes = [
            (0..=nx).map(|i| node(i, 0)).collect(),
            (0..=ny).map(|j| node(nx, j)).collect(),
            (0..=nx).map(|i| node(i, ny)).collect(),
            (0..=ny).map(|j| node(0, j)).collect(),
        ];

        Ok(Self {
            origin: [x[0], y[0]],
            h: [(x[1] - x[0]) / nx as f64, (y[1] - y[0]) / ny as f64],
            nx,
            ny,
            element_blocks: vec![BlockId(0); (nx * ny) as usize],
            blocks,
            boundaries,
            sides,
            boundary_nodes,
            qp_points,
            qp_weights,
        })
    }

    /// Use an `n × n` Gauss rule per element (`n` points per side).
    pub fn with_qp(mut self, n: usize) -> Result<Self, MeshError> {
        let (p, w) = gauss_legendre(n)?;
        self.qp_points = p;
        self.qp_weights = w;
        Ok(self)
    }

    /// Move the elements with column in `cols` and row in `rows` into the
    /// named block, creating it if needed.
    pub fn assign_block(
        &mut self,
        name: &str,
        cols: Range<u32>,
        rows: Range<u32>,
    ) -> Result<BlockId, MeshError> {
        if cols.end > self.nx || rows.end > self.ny || cols.is_empty() || rows.is_empty() {
            return Err(MeshError::InvalidGeometry {
                reason: format!(
                    "block cols {cols:?} rows {rows:?} invalid for {}x{} grid",
                    self.nx, self.ny
                ),
            });
        }
        let id = BlockId(self.blocks.insert(name));
        for j in rows {
            for i in cols.clone() {
                self.element_blocks[(j * self.nx + i) as usize] = id;
            }
        }
        Ok(id)
    }

    fn check(&self, e: ElementId) -> Result<(u32, u32), MeshError> {
        if e.index() >= self.element_blocks.len() {
            return Err(MeshError::ElementOutOfRange {
                element: e,
                count: self.element_blocks.len(),
            });
        }
        Ok((e.0 % self.nx, e.0 / self.nx))
    }

    fn corners(&self, i: u32, j: u32) -> [[f64; 2]; 4] {
        let x = |i: u32| self.origin[0] + i as f64 * self.h[0];
        let y = |j: u32| self.origin[1] + j as f64 * self.h[1];
        [
            [x(i), y(j)],
            [x(i + 1), y(j)],
            [x(i + 1), y(j + 1)],
            [x(i), y(j + 1)],
        ]
    }

    /// Evaluate shapes and the reference-to-physical Jacobian at `(xi, eta)`.
    /// Returns the Jacobian (rows are ξ- and η-derivatives of (x, y)).
    fn eval_point(
        corners: &[[f64; 2]; 4],
        xi: f64,
        eta: f64,
        qp: usize,
        geom: &mut ElementGeometry,
    ) -> Option<[[f64; 2]; 2]> {
        let mut dxi = [0.0; 4];
        let mut deta = [0.0; 4];
        let mut jac = [[0.0; 2]; 2];
        let mut point = [0.0; 3];
        for a in 0..4 {
            let phi = (1.0 + xi * REF_XI[a]) * (1.0 + eta * REF_ETA[a]) / 4.0;
            dxi[a] = REF_XI[a] * (1.0 + eta * REF_ETA[a]) / 4.0;
            deta[a] = REF_ETA[a] * (1.0 + xi * REF_XI[a]) / 4.0;
            geom.phi[a][qp] = phi;
            for d in 0..2 {
                point[d] += phi * corners[a][d];
                jac[0][d] += dxi[a] * corners[a][d];
                jac[1][d] += deta[a] * corners[a][d];
            }
        }
        let (inv, det) = invert_2x2(jac);
        if det.is_nan() || det <= 0.0 {
            return None;
        }
        geom.q_points[qp] = point;
        for a in 0..4 {
            geom.grad_phi[a][qp] = [
                inv[0][0] * dxi[a] + inv[0][1] * deta[a],
                inv[1][0] * dxi[a] + inv[1][1] * deta[a],
                0.0,
            ];
        }
        Some(jac)
    }
}

impl Mesh for QuadGrid {
    fn dim(&self) -> usize {
        2
    }

    fn element_count(&self) -> usize {
        self.element_blocks.len()
    }

    fn node_count(&self) -> usize {
        ((self.nx + 1) * (self.ny + 1)) as usize
    }

    fn element(&self, e: ElementId) -> Result<ElementInfo, MeshError> {
        let (i, j) = self.check(e)?;
        let row = self.nx + 1;
        let n0 = j * row + i;
        Ok(ElementInfo {
            id: e,
            block: self.element_blocks[e.index()],
            nodes: smallvec![
                NodeId(n0),
                NodeId(n0 + 1),
                NodeId(n0 + row + 1),
                NodeId(n0 + row)
            ],
        })
    }

    fn node_point(&self, n: NodeId) -> Result<Point, MeshError> {
        if n.index() >= self.node_count() {
            return Err(MeshError::NodeOutOfRange {
                node: n,
                count: self.node_count(),
            });
        }
        let row = self.nx + 1;
        Ok([
            self.origin[0] + (n.0 % row) as f64 * self.h[0],
            self.origin[1] + (n.0 / row) as f64 * self.h[1],
            0.0,
        ])
    }

    fn reinit_element(&self, e: ElementId, geom: &mut ElementGeometry) -> Result<(), MeshError> {
        let (i, j) = self.check(e)?;
        let corners = self.corners(i, j);
        let n = self.qp_points.len();
        geom.resize(4, n * n, false);
        geom.element = e;
        for (b, (&eta, &we)) in self.qp_points.iter().zip(&self.qp_weights).enumerate() {
            for (a, (&xi, &wx)) in self.qp_points.iter().zip(&self.qp_weights).enumerate() {
                let qp = b * n + a;
                let jac = Self::eval_point(&corners, xi, eta, qp, geom)
                    .ok_or(MeshError::DegenerateElement { element: e })?;
                let det = jac[0][0] * jac[1][1] - jac[0][1] * jac[1][0];
                geom.jxw[qp] = wx * we * det;
            }
        }
        Ok(())
    }

    fn reinit_side(
        &self,
        e: ElementId,
        side: u8,
        geom: &mut ElementGeometry,
    ) -> Result<(), MeshError> {
        let (i, j) = self.check(e)?;
        if side > 3 {
            return Err(MeshError::InvalidSide { element: e, side });
        }
        let corners = self.corners(i, j);
        let n = self.qp_points.len();
        geom.resize(4, n, true);
        geom.element = e;
        for (qp, (&t, &w)) in self.qp_points.iter().zip(&self.qp_weights).enumerate() {
            let (xi, eta) = match side {
                0 => (t, -1.0),
                1 => (1.0, t),
                2 => (-t, 1.0),
                _ => (-1.0, -t),
            };
            let jac = Self::eval_point(&corners, xi, eta, qp, geom)
                .ok_or(MeshError::DegenerateElement { element: e })?;
            // Counterclockwise tangent along the side; outward normal is
            // the tangent rotated clockwise.
            let tangent = match side {
                0 => jac[0],
                1 => jac[1],
                2 => [-jac[0][0], -jac[0][1]],
                _ => [-jac[1][0], -jac[1][1]],
            };
            let len = (tangent[0] * tangent[0] + tangent[1] * tangent[1]).sqrt();
            geom.jxw[qp] = w * len;
            geom.normals[qp] = [tangent[1] / len, -tangent[0] / len, 0.0];
        }
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
