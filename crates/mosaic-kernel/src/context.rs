//! Per-worker assembly scratch.
//!
//! Each worker owns one [`AssemblyContext`] for the whole evaluation and
//! reuses its buffers from element to element. Local blocks are indexed by
//! `slot * n_shape + i`, where `slot` is the variable's position among the
//! nonlinear variables.

use mosaic_core::{BlockId, ElementId, NodeId, VariableId};
use mosaic_mesh::ElementGeometry;
use mosaic_store::SolutionHistory;
use nalgebra::{DMatrix, DVector};

use crate::contributor::{Contributor, Material};
use crate::field::{FieldValues, VariableTable};
use crate::property::{PropertyValues, PropertyWriter};
use crate::view::QpView;

/// Geometry, interpolated fields, and property values of one element (or
/// one element side).
#[derive(Clone, Debug, Default)]
pub struct ElementData {
    /// Shape functions and quadrature.
    pub geom: ElementGeometry,
    /// The element.
    pub element: ElementId,
    /// The element's block.
    pub block: BlockId,
    /// Time step size.
    pub dt: f64,
    /// Interpolated variables, indexed by variable id.
    pub fields: Vec<FieldValues>,
    /// Property values at the element's quadrature points.
    pub props: PropertyValues,
}

impl ElementData {
    /// Interpolate every variable at the current quadrature points.
    ///
    /// `histories` is indexed by variable id; `nodes` are the element's
    /// nodes in shape-function order. `geom` must already be filled.
    pub fn reinit_fields(
        &mut self,
        variables: &VariableTable,
        histories: &[SolutionHistory],
        nodes: &[NodeId],
    ) {
        self.fields.resize_with(variables.len(), FieldValues::default);
        for (info, (field, history)) in variables
            .iter()
            .zip(self.fields.iter_mut().zip(histories))
        {
            field.reinit(info.is_defined_on(self.block), history, nodes, &self.geom);
        }
    }

    /// Returns `true` if `var` is defined on this element's block.
    pub fn is_defined(&self, var: VariableId) -> bool {
        self.fields
            .get(var.0 as usize)
            .is_some_and(FieldValues::is_defined)
    }
}

/// Dense local residual and Jacobian of one contributor on one element.
#[derive(Clone, Debug)]
pub struct LocalBlocks {
    /// Local residual.
    pub residual: DVector<f64>,
    /// Local Jacobian.
    pub jacobian: DMatrix<f64>,
}

impl Default for LocalBlocks {
    fn default() -> Self {
        Self {
            residual: DVector::zeros(0),
            jacobian: DMatrix::zeros(0, 0),
        }
    }
}

impl LocalBlocks {
    /// Zero both blocks, resizing to `n` local DOFs.
    pub fn reset(&mut self, n: usize) {
        if self.residual.len() != n {
            self.residual = DVector::zeros(n);
            self.jacobian = DMatrix::zeros(n, n);
        } else {
            self.residual.fill(0.0);
            self.jacobian.fill(0.0);
        }
    }

    /// Returns `true` if every residual entry is finite.
    pub fn residual_is_finite(&self) -> bool {
        self.residual.iter().all(|v| v.is_finite())
    }

    /// Returns `true` if every Jacobian entry is finite.
    pub fn jacobian_is_finite(&self) -> bool {
        self.jacobian.iter().all(|v| v.is_finite())
    }
}

/// Private scratch of one assembly worker.
#[derive(Debug, Default)]
pub struct AssemblyContext {
    /// The element being assembled.
    pub data: ElementData,
    /// Local blocks of the contributor being evaluated.
    pub local: LocalBlocks,
    writer: PropertyWriter,
    qp_evaluations: u64,
}

impl AssemblyContext {
    /// A fresh context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Quadrature-point evaluations since the last [`take_qp_evaluations`](Self::take_qp_evaluations).
    pub fn take_qp_evaluations(&mut self) -> u64 {
        std::mem::take(&mut self.qp_evaluations)
    }

    /// Run a material over every quadrature point of the current element.
    ///
    /// With `init` set, calls the stateful initializer and writes all
    /// three states.
    pub fn run_material(&mut self, material: &dyn Material, var: Option<VariableId>, init: bool) {
        let n_qp = self.data.geom.n_qp();
        for qp in 0..n_qp {
            {
                let view = QpView::new(&self.data, qp, var);
                if init {
                    material.init_qp_stateful_properties(&view, &mut self.writer);
                } else {
                    material.compute_qp_properties(&view, &mut self.writer);
                }
            }
            self.data.props.apply(qp, &mut self.writer, init);
        }
        self.qp_evaluations += n_qp as u64;
    }

    /// Add `Σ_qp JxW · R_i` of `c` to rows `slot * n_shape ..`.
    pub fn add_residual(&mut self, c: &dyn Contributor, var: VariableId, slot: usize) {
        let n_shape = self.data.geom.n_shape();
        let n_qp = self.data.geom.n_qp();
        for qp in 0..n_qp {
            let view = QpView::new(&self.data, qp, Some(var));
            let jxw = view.jxw();
            for i in 0..n_shape {
                self.local.residual[slot * n_shape + i] += jxw * c.residual(&view, i);
            }
        }
        self.qp_evaluations += n_qp as u64;
    }

    /// Add the Jacobian block `(var, jvar)` of `c`.
    ///
    /// `coupled` is `None` for the diagonal block, or `(jvar, jslot)` for
    /// an off-diagonal one.
    pub fn add_jacobian(
        &mut self,
        c: &dyn Contributor,
        var: VariableId,
        slot: usize,
        coupled: Option<(VariableId, usize)>,
    ) {
        let n_shape = self.data.geom.n_shape();
        let n_qp = self.data.geom.n_qp();
        let col_slot = coupled.map_or(slot, |(_, s)| s);
        for qp in 0..n_qp {
            let view = QpView::new(&self.data, qp, Some(var));
            let jxw = view.jxw();
            for i in 0..n_shape {
                for j in 0..n_shape {
                    let v = match coupled {
                        None => c.jacobian(&view, i, j),
                        Some((jvar, _)) => c.off_diagonal_jacobian(&view, i, j, jvar),
                    };
                    self.local.jacobian[(slot * n_shape + i, col_slot * n_shape + j)] += jxw * v;
                }
            }
        }
        self.qp_evaluations += n_qp as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contributor::AdAdapter;
    use crate::contributor::AdContributor;
    use crate::dual::{self, Dual};
    use crate::field::VariableKind;
    use crate::property::DeclaredProp;
    use crate::view::DualQp;
    use mosaic_core::PropertyId;
    use mosaic_mesh::{EdgeMesh, Mesh};
    use mosaic_store::State;
    use std::collections::BTreeSet;

    struct Diffusion;

    impl Contributor for Diffusion {
        fn residual(&self, qp: &QpView<'_>, i: usize) -> f64 {
            let g = qp.grad_u();
            let t = qp.grad_phi(i);
            g[0] * t[0] + g[1] * t[1] + g[2] * t[2]
        }

        fn jacobian(&self, qp: &QpView<'_>, i: usize, j: usize) -> f64 {
            let a = qp.grad_phi(j);
            let t = qp.grad_phi(i);
            a[0] * t[0] + a[1] * t[1] + a[2] * t[2]
        }
    }

    // u² · φ_i, nonlinear so AD has something to do.
    struct AdSquare;

    impl AdContributor for AdSquare {
        fn residual(&self, qp: &DualQp<'_, '_>, i: usize) -> Dual {
            let u = qp.u();
            u * u * qp.phi(i) + dual::dot(&qp.grad_u(), &qp.grad_phi(i))
        }
    }

    struct Doubler(DeclaredProp);

    impl Material for Doubler {
        fn compute_qp_properties(&self, qp: &QpView<'_>, out: &mut PropertyWriter) {
            out.set(self.0, 2.0 * qp.u());
        }

        fn init_qp_stateful_properties(&self, _qp: &QpView<'_>, out: &mut PropertyWriter) {
            out.set(self.0, -1.0);
        }
    }

    fn setup(values: &[f64]) -> (EdgeMesh, VariableTable, Vec<SolutionHistory>, AssemblyContext) {
        let mesh = EdgeMesh::new(0.0, 1.0, values.len() as u32 - 1).unwrap();
        let mut vars = VariableTable::new();
        vars.add("u", VariableKind::Nonlinear, BTreeSet::from([BlockId(0)]))
            .unwrap();
        let mut h = SolutionHistory::new(values.len(), 0.0);
        h.current_mut().copy_from_slice(values);
        let mut ctx = AssemblyContext::new();
        ctx.data.dt = 1.0;
        (mesh, vars, vec![h], ctx)
    }

    fn load(
        ctx: &mut AssemblyContext,
        mesh: &EdgeMesh,
        vars: &VariableTable,
        h: &[SolutionHistory],
    ) {
        let info = mesh.element(ElementId(0)).unwrap();
        mesh.reinit_element(ElementId(0), &mut ctx.data.geom).unwrap();
        ctx.data.element = info.id;
        ctx.data.block = info.block;
        ctx.data.reinit_fields(vars, h, &info.nodes);
        ctx.local.reset(2);
    }

    #[test]
    fn diffusion_local_blocks() {
        let (mesh, vars, h, mut ctx) = setup(&[0.0, 1.0]);
        load(&mut ctx, &mesh, &vars, &h);
        ctx.add_residual(&Diffusion, VariableId(0), 0);
        ctx.add_jacobian(&Diffusion, VariableId(0), 0, None);
        // One element of length 1, u = x: R = [-1, 1], K = [[1,-1],[-1,1]].
        assert!((ctx.local.residual[0] + 1.0).abs() < 1e-12);
        assert!((ctx.local.residual[1] - 1.0).abs() < 1e-12);
        assert!((ctx.local.jacobian[(0, 1)] + 1.0).abs() < 1e-12);
        assert!(ctx.local.residual_is_finite());
        assert_eq!(ctx.take_qp_evaluations(), 2 * EdgeMesh::DEFAULT_QP as u64);
    }

    #[test]
    fn ad_jacobian_matches_finite_difference() {
        let base = [0.3, 0.8];
        let (mesh, vars, h, mut ctx) = setup(&base);
        load(&mut ctx, &mesh, &vars, &h);
        let ad = AdAdapter(AdSquare);
        ctx.add_jacobian(&ad, VariableId(0), 0, None);
        let jac = ctx.local.jacobian.clone();

        let eps = 1e-7;
        for j in 0..2 {
            let mut plus = base;
            plus[j] += eps;
            let (mesh, vars, h, mut c2) = setup(&plus);
            load(&mut c2, &mesh, &vars, &h);
            c2.add_residual(&ad, VariableId(0), 0);
            let (mesh, vars, h, mut c1) = setup(&base);
            load(&mut c1, &mesh, &vars, &h);
            c1.add_residual(&ad, VariableId(0), 0);
            for i in 0..2 {
                let fd = (c2.local.residual[i] - c1.local.residual[i]) / eps;
                let exact = jac[(i, j)];
                assert!((fd - exact).abs() < 1e-5, "entry ({i},{j}): {fd} vs {exact}");
            }
        }
    }

    #[test]
    fn material_writes_current_or_all_states() {
        let (mesh, vars, h, mut ctx) = setup(&[1.0, 3.0]);
        load(&mut ctx, &mesh, &vars, &h);
        let n_qp = ctx.data.geom.n_qp();
        ctx.data.props.reset(1, n_qp);
        let m = Doubler(DeclaredProp(PropertyId(0)));
        ctx.run_material(&m, Some(VariableId(0)), true);
        assert_eq!(ctx.data.props.get(PropertyId(0), State::Older, 0), -1.0);
        ctx.run_material(&m, Some(VariableId(0)), false);
        let u0 = ctx.data.fields[0].value(State::Current, 0);
        assert_eq!(ctx.data.props.get(PropertyId(0), State::Current, 0), 2.0 * u0);
        assert_eq!(ctx.data.props.get(PropertyId(0), State::Old, 0), -1.0);
    }
}
