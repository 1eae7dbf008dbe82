//! Plugin interfaces: contributors, nodal contributors, aux kernels, and
//! materials.
//!
//! Each interface is keyed by what it contributes rather than by a class
//! hierarchy. A residual-only type implements just
//! [`Contributor::residual`]; one with hand-coded derivatives also
//! overrides [`Contributor::jacobian`]; an AD type implements
//! [`AdContributor`] and is wrapped in an [`AdAdapter`] at registration.
//! The declared [`CapabilitySet`](crate::CapabilitySet) tells the assembly
//! loop which methods are meaningful.

use mosaic_core::VariableId;

use crate::dual::Dual;
use crate::property::PropertyWriter;
use crate::view::{DualQp, NodeView, QpView};

/// A term integrated over element interiors (kernels) or boundary sides
/// (integrated boundary conditions).
///
/// Every method returns the integrand at one quadrature point for one test
/// function; the framework multiplies by `JxW` and sums. Instances are
/// built once per worker thread and only read during assembly.
///
/// # Contract
///
/// Methods must be pure functions of the view and of parameters fixed at
/// construction (controllable cells included). They must not panic on
/// finite inputs; a non-finite result is reported, not propagated.
pub trait Contributor: Send + 'static {
    /// Residual integrand `R_i` for test function `test`.
    fn residual(&self, qp: &QpView<'_>, test: usize) -> f64;

    /// `∂R_test / ∂u_trial` for the primary variable.
    fn jacobian(&self, _qp: &QpView<'_>, _test: usize, _trial: usize) -> f64 {
        0.0
    }

    /// `∂R_test / ∂v_trial` for a coupled nonlinear variable `jvar`.
    fn off_diagonal_jacobian(
        &self,
        _qp: &QpView<'_>,
        _test: usize,
        _trial: usize,
        _jvar: VariableId,
    ) -> f64 {
        0.0
    }
}

/// A boundary condition applied strongly at boundary nodes.
///
/// The residual row of each boundary DOF is replaced by
/// [`residual`](Self::residual) and the Jacobian row by its derivatives.
pub trait NodalContributor: Send + 'static {
    /// Replacement residual at the node.
    fn residual(&self, node: &NodeView<'_>) -> f64;

    /// Derivative with respect to the node's own DOF.
    fn jacobian(&self, _node: &NodeView<'_>) -> f64 {
        1.0
    }

    /// Derivative with respect to another variable's DOF at the same node.
    fn off_diagonal_jacobian(&self, _node: &NodeView<'_>, _jvar: VariableId) -> f64 {
        0.0
    }
}

/// A producer of nodal values for an auxiliary variable.
///
/// [`NodeView::u`] is the auxiliary variable's own value before the
/// update. The result becomes its current value at the node.
pub trait AuxContributor: Send + 'static {
    /// New value at the node.
    fn compute_value(&self, node: &NodeView<'_>) -> f64;
}

/// A producer of per-quadrature-point material properties.
pub trait Material: Send + 'static {
    /// Compute current values of the declared properties at one point.
    fn compute_qp_properties(&self, qp: &QpView<'_>, out: &mut PropertyWriter);

    /// Initial values of stateful properties. Called once per point before
    /// the first evaluation; values seed current, old, and older alike.
    fn init_qp_stateful_properties(&self, _qp: &QpView<'_>, _out: &mut PropertyWriter) {}
}

/// A contributor whose derivatives come from forward-mode AD.
pub trait AdContributor: Send + 'static {
    /// Residual integrand for test function `test`, in dual arithmetic.
    fn residual(&self, qp: &DualQp<'_, '_>, test: usize) -> Dual;
}

/// Presents an [`AdContributor`] as a [`Contributor`].
///
/// The Jacobian entry for `(test, trial)` is the derivative part of the
/// residual evaluated with `trial` seeded.
pub struct AdAdapter<C>(pub C);

impl<C: AdContributor> Contributor for AdAdapter<C> {
    fn residual(&self, qp: &QpView<'_>, test: usize) -> f64 {
        self.0.residual(&DualQp::new(qp, None), test).re
    }

    fn jacobian(&self, qp: &QpView<'_>, test: usize, trial: usize) -> f64 {
        let seed = qp.variable().map(|v| (v, trial));
        self.0.residual(&DualQp::new(qp, seed), test).eps
    }

    fn off_diagonal_jacobian(
        &self,
        qp: &QpView<'_>,
        test: usize,
        trial: usize,
        jvar: VariableId,
    ) -> f64 {
        self.0
            .residual(&DualQp::new(qp, Some((jvar, trial))), test)
            .eps
    }
}
