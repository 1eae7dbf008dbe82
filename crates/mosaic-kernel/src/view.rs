//! Read-only views handed to contributors and materials.

use mosaic_core::{BlockId, ElementId, NodeId, VariableId};
use mosaic_mesh::Point;
use mosaic_store::State;

use crate::context::ElementData;
use crate::coupling::{PropHandle, VarHandle};
use crate::dual::{self, Dual};

/// One quadrature point of the element being assembled.
///
/// The "primary" accessors (`u`, `grad_u`, ...) read the variable the
/// contributor was built for; they return zero for objects without one.
#[derive(Clone, Copy)]
pub struct QpView<'a> {
    data: &'a ElementData,
    qp: usize,
    var: Option<VariableId>,
}

impl<'a> QpView<'a> {
    /// View of point `qp` with primary variable `var`.
    pub fn new(data: &'a ElementData, qp: usize, var: Option<VariableId>) -> Self {
        Self { data, qp, var }
    }

    /// Quadrature point index.
    pub fn qp(&self) -> usize {
        self.qp
    }

    /// Weight times Jacobian determinant.
    pub fn jxw(&self) -> f64 {
        self.data.geom.jxw[self.qp]
    }

    /// Physical coordinates.
    pub fn q_point(&self) -> Point {
        self.data.geom.q_points[self.qp]
    }

    /// Number of shape functions on the element.
    pub fn n_shape(&self) -> usize {
        self.data.geom.n_shape()
    }

    /// Shape function `i`.
    pub fn phi(&self, i: usize) -> f64 {
        self.data.geom.phi[i][self.qp]
    }

    /// Gradient of shape function `i`.
    pub fn grad_phi(&self, i: usize) -> Point {
        self.data.geom.grad_phi[i][self.qp]
    }

    /// Outward unit normal; zero on element interiors.
    pub fn normal(&self) -> Point {
        self.data
            .geom
            .normals
            .get(self.qp)
            .copied()
            .unwrap_or([0.0; 3])
    }

    /// Time step size.
    pub fn dt(&self) -> f64 {
        self.data.dt
    }

    /// The element.
    pub fn element(&self) -> ElementId {
        self.data.element
    }

    /// The element's block.
    pub fn block(&self) -> BlockId {
        self.data.block
    }

    /// The primary variable, if any.
    pub fn variable(&self) -> Option<VariableId> {
        self.var
    }

    fn field(&self, var: VariableId, state: State) -> (f64, Point) {
        match self.data.fields.get(var.0 as usize) {
            Some(f) => (f.value(state, self.qp), f.gradient(state, self.qp)),
            None => (0.0, [0.0; 3]),
        }
    }

    fn primary(&self, state: State) -> (f64, Point) {
        self.var
            .map(|v| self.field(v, state))
            .unwrap_or((0.0, [0.0; 3]))
    }

    /// Primary variable value.
    pub fn u(&self) -> f64 {
        self.primary(State::Current).0
    }

    /// Primary variable gradient.
    pub fn grad_u(&self) -> Point {
        self.primary(State::Current).1
    }

    /// Primary variable at the last accepted step.
    pub fn u_old(&self) -> f64 {
        self.primary(State::Old).0
    }

    /// Primary variable two accepted steps back.
    pub fn u_older(&self) -> f64 {
        self.primary(State::Older).0
    }

    /// Backward-Euler time derivative of the primary variable.
    pub fn u_dot(&self) -> f64 {
        (self.u() - self.u_old()) / self.data.dt
    }

    /// Derivative of [`u_dot`](Self::u_dot) with respect to `u`.
    pub fn du_dot_du(&self) -> f64 {
        1.0 / self.data.dt
    }

    /// Value of a coupled variable.
    pub fn value(&self, h: VarHandle) -> f64 {
        match h {
            VarHandle::Field { var, state } => self.field(var, state).0,
            VarHandle::Constant(c) => c,
        }
    }

    /// Gradient of a coupled variable.
    pub fn gradient(&self, h: VarHandle) -> Point {
        match h {
            VarHandle::Field { var, state } => self.field(var, state).1,
            VarHandle::Constant(_) => [0.0; 3],
        }
    }

    /// Backward-Euler time derivative of a coupled variable.
    pub fn dot(&self, h: VarHandle) -> f64 {
        match h {
            VarHandle::Field { var, .. } => {
                (self.field(var, State::Current).0 - self.field(var, State::Old).0) / self.data.dt
            }
            VarHandle::Constant(_) => 0.0,
        }
    }

    /// Value of a consumed material property.
    pub fn property(&self, h: PropHandle) -> f64 {
        self.data.props.get(h.id, h.state, self.qp)
    }
}

/// A node seen by a nodal contributor or an aux kernel.
#[derive(Clone, Copy)]
pub struct NodeView<'a> {
    node: NodeId,
    point: Point,
    values: &'a [[f64; 3]],
    var: VariableId,
}

impl<'a> NodeView<'a> {
    /// `values[v]` holds variable `v`'s current/old/older value at `node`.
    pub fn new(node: NodeId, point: Point, values: &'a [[f64; 3]], var: VariableId) -> Self {
        Self {
            node,
            point,
            values,
            var,
        }
    }

    /// The node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The node's coordinates.
    pub fn point(&self) -> Point {
        self.point
    }

    fn at(&self, var: VariableId, state: State) -> f64 {
        let s = match state {
            State::Current => 0,
            State::Old => 1,
            State::Older => 2,
        };
        self.values.get(var.0 as usize).map_or(0.0, |v| v[s])
    }

    /// Primary variable value.
    pub fn u(&self) -> f64 {
        self.at(self.var, State::Current)
    }

    /// Primary variable at the last accepted step.
    pub fn u_old(&self) -> f64 {
        self.at(self.var, State::Old)
    }

    /// Value of a coupled variable.
    pub fn value(&self, h: VarHandle) -> f64 {
        match h {
            VarHandle::Field { var, state } => self.at(var, state),
            VarHandle::Constant(c) => c,
        }
    }
}

/// A quadrature point seen by an AD contributor.
///
/// Values of the seeded variable's current state carry the derivative
/// with respect to the coefficient of trial function `trial`; everything
/// else is constant. Material properties are treated as constants.
pub struct DualQp<'v, 'a> {
    view: &'v QpView<'a>,
    seed: Option<(VariableId, usize)>,
}

impl<'v, 'a> DualQp<'v, 'a> {
    /// Seed `(var, trial)`, or nothing for a residual-only evaluation.
    pub fn new(view: &'v QpView<'a>, seed: Option<(VariableId, usize)>) -> Self {
        Self { view, seed }
    }

    /// The underlying plain view.
    pub fn view(&self) -> &QpView<'a> {
        self.view
    }

    fn seeded(&self, var: VariableId, state: State) -> Option<usize> {
        match self.seed {
            Some((v, trial)) if v == var && state == State::Current => Some(trial),
            _ => None,
        }
    }

    fn field(&self, h: VarHandle) -> (Dual, [Dual; 3]) {
        let v = self.view.value(h);
        let g = self.view.gradient(h);
        let trial = match h {
            VarHandle::Field { var, state } => self.seeded(var, state),
            VarHandle::Constant(_) => None,
        };
        match trial {
            Some(j) => {
                let phi = self.view.phi(j);
                let gp = self.view.grad_phi(j);
                (
                    Dual::new(v, phi),
                    [
                        Dual::new(g[0], gp[0]),
                        Dual::new(g[1], gp[1]),
                        Dual::new(g[2], gp[2]),
                    ],
                )
            }
            None => (dual::constant(v), dual::constant_grad(g)),
        }
    }

    fn primary(&self) -> VarHandle {
        match self.view.variable() {
            Some(var) => VarHandle::Field {
                var,
                state: State::Current,
            },
            None => VarHandle::Constant(0.0),
        }
    }

    /// Primary variable value.
    pub fn u(&self) -> Dual {
        self.field(self.primary()).0
    }

    /// Primary variable gradient.
    pub fn grad_u(&self) -> [Dual; 3] {
        self.field(self.primary()).1
    }

    /// Backward-Euler time derivative of the primary variable.
    pub fn u_dot(&self) -> Dual {
        (self.u() - self.view.u_old()) / self.view.dt()
    }

    /// Value of a coupled variable.
    pub fn value(&self, h: VarHandle) -> Dual {
        self.field(h).0
    }

    /// Gradient of a coupled variable.
    pub fn gradient(&self, h: VarHandle) -> [Dual; 3] {
        self.field(h).1
    }

    /// Test function `i`.
    pub fn phi(&self, i: usize) -> f64 {
        self.view.phi(i)
    }

    /// Gradient of test function `i`.
    pub fn grad_phi(&self, i: usize) -> Point {
        self.view.grad_phi(i)
    }

    /// A consumed material property, as a constant.
    pub fn property(&self, h: PropHandle) -> Dual {
        dual::constant(self.view.property(h))
    }
}
