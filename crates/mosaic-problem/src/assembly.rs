//! Threaded element loop, reduction, and nodal boundary conditions.
//!
//! Each worker owns a contiguous element range and its own contributor
//! instances and [`AssemblyContext`]. Workers emit triplets instead of
//! writing shared storage; the calling thread concatenates them in
//! worker order, so sums are taken in element order whatever the thread
//! count. Boundary sides are visited together with their element for the
//! same reason.

use std::ops::Range;
use std::time::Instant;

use indexmap::IndexMap;
use mosaic_core::{
    AssemblyError, AssemblyReport, BoundaryId, ElementId, Location, NodeId, ProgrammerError,
    PropertyId, TagId, TagKind, TagSet, Target, VariableId,
};
use mosaic_kernel::{AssemblyContext, Contributor, NodeView, VariableTable};
use mosaic_mesh::Mesh;
use mosaic_store::{SolutionHistory, StagedWrites, State, StatefulStore};
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use smallvec::{smallvec, SmallVec};

use crate::auxiliary::ExecFlag;
use crate::dof::DofMap;
use crate::error::EvalFailure;
use crate::metrics::EvalMetrics;
use crate::problem::{Binding, Phase, Problem, ThreadObjects};
use crate::request::{CancelToken, EvalOutput, EvalRequest};

type Triplet = (usize, usize, f64);

/// Everything a worker reads; shared by reference across workers.
struct Shared<'a> {
    mesh: &'a dyn Mesh,
    variables: &'a VariableTable,
    histories: &'a [SolutionHistory],
    dofs: &'a DofMap,
    store: &'a StatefulStore,
    kernels: &'a [Binding],
    side_bcs: &'a [Binding],
    materials: &'a [Binding],
    material_order: &'a [usize],
    element_sides: &'a [SmallVec<[(u8, BoundaryId); 2]>],
    stateful: Vec<PropertyId>,
    vector_tags: &'a [TagId],
    matrix_tags: &'a [TagId],
    n_props: usize,
    dt: f64,
    check_finite: bool,
    cancel: &'a CancelToken,
}

struct WorkerOutput {
    vectors: Vec<Vec<(usize, f64)>>,
    matrices: Vec<Vec<Triplet>>,
    errors: Vec<AssemblyError>,
    staged: StagedWrites,
    elements: u64,
    sides: u64,
    qp_evaluations: u64,
    cancelled: bool,
}

impl WorkerOutput {
    fn new(n_vec: usize, n_mat: usize) -> Self {
        Self {
            vectors: vec![Vec::new(); n_vec],
            matrices: vec![Vec::new(); n_mat],
            errors: Vec::new(),
            staged: StagedWrites::new(),
            elements: 0,
            sides: 0,
            qp_evaluations: 0,
            cancelled: false,
        }
    }
}

/// Positions in `requested` of the tags `wanted` contains.
fn targets(requested: &[TagId], wanted: &TagSet) -> SmallVec<[usize; 4]> {
    requested
        .iter()
        .enumerate()
        .filter(|(_, t)| wanted.contains(**t))
        .map(|(k, _)| k)
        .collect()
}

fn contribute(
    shared: &Shared<'_>,
    ctx: &mut AssemblyContext,
    c: &dyn Contributor,
    b: &Binding,
    location: Location,
    nodes: &[NodeId],
    out: &mut WorkerOutput,
) {
    let Some(var) = b.var else { return };
    if !ctx.data.is_defined(var) {
        out.errors.push(AssemblyError::RestrictionMismatch {
            object: b.object.clone(),
            element: ctx.data.element,
            block: ctx.data.block,
        });
        return;
    }
    let n_shape = ctx.data.geom.n_shape();
    let n_local = shared.variables.nonlinear_count() * n_shape;
    let rows: SmallVec<[Option<usize>; 8]> =
        nodes.iter().map(|&n| shared.dofs.dof(var, n)).collect();

    let vec_targets = targets(shared.vector_tags, &b.vector_tags);
    if !vec_targets.is_empty() {
        ctx.local.reset(n_local);
        ctx.add_residual(c, var, b.slot);
        if shared.check_finite && !ctx.local.residual_is_finite() {
            out.errors.push(AssemblyError::NonFiniteContribution {
                object: b.object.clone(),
                location,
                target: Target::Residual,
            });
        } else {
            for (i, row) in rows.iter().enumerate() {
                let Some(row) = *row else { continue };
                let v = ctx.local.residual[b.slot * n_shape + i];
                for &k in &vec_targets {
                    out.vectors[k].push((row, v));
                }
            }
        }
    }

    if !b.jacobian {
        return;
    }
    let mat_targets = targets(shared.matrix_tags, &b.matrix_tags);
    if mat_targets.is_empty() {
        return;
    }
    ctx.local.reset(n_local);
    ctx.add_jacobian(c, var, b.slot, None);
    let mut cols: SmallVec<[(VariableId, usize); 4]> = smallvec![(var, b.slot)];
    for &(jvar, jslot) in &b.coupled {
        if ctx.data.is_defined(jvar) {
            ctx.add_jacobian(c, var, b.slot, Some((jvar, jslot)));
            cols.push((jvar, jslot));
        }
    }
    if shared.check_finite && !ctx.local.jacobian_is_finite() {
        out.errors.push(AssemblyError::NonFiniteContribution {
            object: b.object.clone(),
            location,
            target: Target::Jacobian,
        });
        return;
    }
    for (i, row) in rows.iter().enumerate() {
        let Some(row) = *row else { continue };
        for &(cvar, cslot) in &cols {
            for (j, &node) in nodes.iter().enumerate() {
                let Some(col) = shared.dofs.dof(cvar, node) else {
                    continue;
                };
                let v = ctx.local.jacobian[(b.slot * n_shape + i, cslot * n_shape + j)];
                for &k in &mat_targets {
                    out.matrices[k].push((row, col, v));
                }
            }
        }
    }
}

fn run_worker(
    shared: &Shared<'_>,
    objs: &mut ThreadObjects,
    elements: Range<usize>,
) -> Result<WorkerOutput, EvalFailure> {
    let mut out = WorkerOutput::new(shared.vector_tags.len(), shared.matrix_tags.len());
    let mut ctx = AssemblyContext::new();
    ctx.data.dt = shared.dt;

    for e in elements {
        if shared.cancel.is_cancelled() {
            out.cancelled = true;
            break;
        }
        let id = ElementId(e as u32);
        let info = shared.mesh.element(id)?;
        shared.mesh.reinit_element(id, &mut ctx.data.geom)?;
        ctx.data.element = id;
        ctx.data.block = info.block;
        ctx.data.reinit_fields(shared.variables, shared.histories, &info.nodes);
        ctx.data.props.reset(shared.n_props, ctx.data.geom.n_qp());
        if shared.store.is_allocated() {
            for &p in &shared.stateful {
                for state in [State::Old, State::Older] {
                    ctx.data.props.load(p, state, shared.store.values(p, state, id)?);
                }
            }
        }

        for &m in shared.material_order {
            let b = &shared.materials[m];
            if !b.restriction.has_block(info.block) {
                continue;
            }
            ctx.run_material(objs.materials[m].as_ref(), b.var, false);
            for &p in &b.stateful {
                out.staged
                    .push(p, id, ctx.data.props.state(p, State::Current).to_vec());
            }
        }

        for (k, b) in shared.kernels.iter().enumerate() {
            if b.restriction.has_block(info.block) {
                contribute(
                    shared,
                    &mut ctx,
                    objs.kernels[k].as_ref(),
                    b,
                    Location::Element(id),
                    &info.nodes,
                    &mut out,
                );
            }
        }
        out.elements += 1;

        if shared.side_bcs.is_empty() {
            continue;
        }
        for &(side, boundary) in &shared.element_sides[e] {
            if !shared
                .side_bcs
                .iter()
                .any(|b| b.restriction.has_boundary(boundary))
            {
                continue;
            }
            shared.mesh.reinit_side(id, side, &mut ctx.data.geom)?;
            ctx.data.reinit_fields(shared.variables, shared.histories, &info.nodes);
            // Side points keep no history: old states read as zero and
            // nothing is staged.
            ctx.data.props.reset(shared.n_props, ctx.data.geom.n_qp());
            for &m in shared.material_order {
                let b = &shared.materials[m];
                if b.restriction.has_block(info.block) {
                    ctx.run_material(objs.materials[m].as_ref(), b.var, false);
                }
            }
            for (k, b) in shared.side_bcs.iter().enumerate() {
                if b.restriction.has_boundary(boundary) {
                    contribute(
                        shared,
                        &mut ctx,
                        objs.side_bcs[k].as_ref(),
                        b,
                        Location::Side(id, side),
                        &info.nodes,
                        &mut out,
                    );
                }
            }
            out.sides += 1;
        }
    }
    out.qp_evaluations = ctx.take_qp_evaluations();
    Ok(out)
}

fn to_csr(n: usize, triplets: &[Triplet]) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(n, n);
    for &(r, c, v) in triplets {
        coo.push(r, c, v);
    }
    CsrMatrix::from(&coo)
}

impl Problem {
    /// Fill the requested tag vectors and matrices at the current state.
    ///
    /// On any non-finite or misplaced contribution the whole evaluation is
    /// rejected and no stateful property is committed; the next call starts
    /// from scratch. The cancel token is cleared when the call returns,
    /// however it ends.
    pub fn evaluate(&mut self, request: &EvalRequest) -> Result<EvalOutput, EvalFailure> {
        let result = self.evaluate_once(request);
        self.cancel.reset();
        result
    }

    fn evaluate_once(&mut self, request: &EvalRequest) -> Result<EvalOutput, EvalFailure> {
        if self.phase != Phase::Ready {
            return Err(EvalFailure::NotReady);
        }
        let started = Instant::now();
        let vec_ids = self.request_tags(&request.vector_tags, TagKind::Vector)?;
        let mat_ids = self.request_tags(&request.matrix_tags, TagKind::Matrix)?;
        self.compute_aux(ExecFlag::Linear).map_err(EvalFailure::Rejected)?;

        let n_elem = self.mesh.element_count();
        let workers = self.threads.min(n_elem).max(1);
        let chunk = n_elem.div_ceil(workers);
        let ranges: Vec<Range<usize>> = (0..workers)
            .map(|w| (w * chunk).min(n_elem)..((w + 1) * chunk).min(n_elem))
            .collect();

        let shared = Shared {
            mesh: &*self.mesh,
            variables: &self.variables,
            histories: &self.histories,
            dofs: &self.dofs,
            store: &self.store,
            kernels: &self.kernels,
            side_bcs: &self.side_bcs,
            materials: &self.materials,
            material_order: &self.material_order,
            element_sides: &self.element_sides,
            stateful: (0..self.properties.len() as u32)
                .map(PropertyId)
                .filter(|&p| self.store.is_stateful(p))
                .collect(),
            vector_tags: &vec_ids,
            matrix_tags: &mat_ids,
            n_props: self.properties.len(),
            dt: self.dt,
            check_finite: self.config.check_finite,
            cancel: &self.cancel,
        };

        let loop_started = Instant::now();
        let instances = &mut self.instances;
        let mut results: Vec<(usize, Result<WorkerOutput, EvalFailure>)> = if workers == 1 {
            vec![(0, run_worker(&shared, &mut instances[0], ranges[0].clone()))]
        } else {
            let (tx, rx) = crossbeam_channel::bounded(workers);
            std::thread::scope(|s| {
                for (w, (objs, range)) in instances.iter_mut().zip(ranges).enumerate() {
                    let tx = tx.clone();
                    let shared = &shared;
                    s.spawn(move || {
                        // Capacity equals the worker count; never blocks.
                        let _ = tx.send((w, run_worker(shared, objs, range)));
                    });
                }
            });
            drop(tx);
            rx.try_iter().collect()
        };
        let element_loop_us = loop_started.elapsed().as_micros() as u64;
        results.sort_by_key(|(w, _)| *w);

        let mut outputs = Vec::with_capacity(results.len());
        for (_, r) in results {
            outputs.push(r?);
        }
        if outputs.iter().any(|o| o.cancelled) {
            log::debug!("evaluation cancelled");
            return Err(EvalFailure::Cancelled);
        }

        let reduce_started = Instant::now();
        let n = self.dofs.len();
        let mut errors: Vec<AssemblyError> = Vec::new();
        let mut vectors: Vec<DVector<f64>> = vec_ids.iter().map(|_| DVector::zeros(n)).collect();
        let mut triplets: Vec<Vec<Triplet>> = vec![Vec::new(); mat_ids.len()];
        for o in &mut outputs {
            errors.append(&mut o.errors);
            for (k, entries) in o.vectors.iter().enumerate() {
                for &(row, v) in entries {
                    vectors[k][row] += v;
                }
            }
            for (k, entries) in o.matrices.iter_mut().enumerate() {
                triplets[k].append(entries);
            }
        }
        self.apply_nodal_bcs(&vec_ids, &mat_ids, &mut vectors, &mut triplets, &mut errors)?;

        if !errors.is_empty() {
            let report = AssemblyReport::new(errors);
            if let Some(first) = report.errors().first() {
                log::warn!("evaluation rejected with {} error(s); first: {first}", report.len());
            }
            return Err(EvalFailure::Rejected(report));
        }
        for o in &outputs {
            self.store.commit(&o.staged)?;
        }

        let mut output = EvalOutput::default();
        for (name, v) in request.vector_tags.iter().zip(vectors) {
            output.vectors.insert(name.clone(), v);
        }
        for (name, t) in request.matrix_tags.iter().zip(&triplets) {
            output.matrices.insert(name.clone(), to_csr(n, t));
        }

        self.metrics = EvalMetrics {
            total_us: started.elapsed().as_micros() as u64,
            element_loop_us,
            reduce_us: reduce_started.elapsed().as_micros() as u64,
            elements: outputs.iter().map(|o| o.elements).sum(),
            sides: outputs.iter().map(|o| o.sides).sum(),
            qp_evaluations: outputs.iter().map(|o| o.qp_evaluations).sum(),
            workers,
        };
        log::trace!(
            "evaluated {:?}/{:?} over {} elements in {}us",
            request.vector_tags,
            request.matrix_tags,
            self.metrics.elements,
            self.metrics.total_us
        );
        Ok(output)
    }

    /// Assemble one vector tag.
    pub fn evaluate_residual(&mut self, tag: &str) -> Result<DVector<f64>, EvalFailure> {
        let mut out = self.evaluate(&EvalRequest::residual(tag))?;
        out.vectors
            .swap_remove(tag)
            .ok_or_else(|| EvalFailure::UnknownTag {
                tag: tag.to_string(),
            })
    }

    /// Assemble one matrix tag.
    pub fn evaluate_jacobian(&mut self, tag: &str) -> Result<CsrMatrix<f64>, EvalFailure> {
        let mut out = self.evaluate(&EvalRequest::jacobian(tag))?;
        out.matrices
            .swap_remove(tag)
            .ok_or_else(|| EvalFailure::UnknownTag {
                tag: tag.to_string(),
            })
    }

    fn request_tags(&self, names: &[String], kind: TagKind) -> Result<Vec<TagId>, EvalFailure> {
        names
            .iter()
            .map(|name| match self.tags.lookup(name) {
                Some((id, k)) if k == kind => Ok(id),
                Some(_) => Err(EvalFailure::Programmer(ProgrammerError::TagMismatch {
                    object: "evaluation request".to_string(),
                    tag: name.clone(),
                    expected: kind,
                })),
                None => Err(EvalFailure::UnknownTag { tag: name.clone() }),
            })
            .collect()
    }

    /// Replace the rows of boundary DOFs. Later BCs win on shared nodes.
    fn apply_nodal_bcs(
        &self,
        vec_ids: &[TagId],
        mat_ids: &[TagId],
        vectors: &mut [DVector<f64>],
        triplets: &mut [Vec<Triplet>],
        errors: &mut Vec<AssemblyError>,
    ) -> Result<(), EvalFailure> {
        if self.nodal_bcs.is_empty() {
            return Ok(());
        }
        let mut rows: Vec<IndexMap<usize, f64>> = vec![IndexMap::new(); vec_ids.len()];
        let mut mat_rows: Vec<IndexMap<usize, SmallVec<[(usize, f64); 4]>>> =
            vec![IndexMap::new(); mat_ids.len()];
        let mut values = vec![[0.0; 3]; self.variables.len()];

        for (b, bc) in self.nodal_bcs.iter().zip(&self.nodal) {
            let Some(var) = b.var else { continue };
            let vec_targets = targets(vec_ids, &b.vector_tags);
            let mat_targets = if b.jacobian {
                targets(mat_ids, &b.matrix_tags)
            } else {
                SmallVec::new()
            };
            if vec_targets.is_empty() && mat_targets.is_empty() {
                continue;
            }
            for &boundary in &b.restriction.boundaries {
                for &node in self.mesh.boundary_nodes(boundary)? {
                    let Some(row) = self.dofs.dof(var, node) else {
                        continue;
                    };
                    for (v, h) in values.iter_mut().zip(&self.histories) {
                        let i = node.index();
                        *v = [
                            h.get(State::Current)[i],
                            h.get(State::Old)[i],
                            h.get(State::Older)[i],
                        ];
                    }
                    let point = self.mesh.node_point(node)?;
                    let view = NodeView::new(node, point, &values, var);

                    if !vec_targets.is_empty() {
                        let r = bc.residual(&view);
                        if self.config.check_finite && !r.is_finite() {
                            errors.push(AssemblyError::NonFiniteContribution {
                                object: b.object.clone(),
                                location: Location::Node(node),
                                target: Target::Residual,
                            });
                        } else {
                            for &k in &vec_targets {
                                rows[k].insert(row, r);
                            }
                        }
                    }
                    if !mat_targets.is_empty() {
                        let mut entries: SmallVec<[(usize, f64); 4]> =
                            smallvec![(row, bc.jacobian(&view))];
                        for &(jvar, _) in &b.coupled {
                            if let Some(col) = self.dofs.dof(jvar, node) {
                                entries.push((col, bc.off_diagonal_jacobian(&view, jvar)));
                            }
                        }
                        if self.config.check_finite && entries.iter().any(|(_, v)| !v.is_finite()) {
                            errors.push(AssemblyError::NonFiniteContribution {
                                object: b.object.clone(),
                                location: Location::Node(node),
                                target: Target::Jacobian,
                            });
                        } else {
                            for &k in &mat_targets {
                                mat_rows[k].insert(row, entries.clone());
                            }
                        }
                    }
                }
            }
        }

        for (vector, replaced) in vectors.iter_mut().zip(rows) {
            for (row, r) in replaced {
                vector[row] = r;
            }
        }
        for (list, replaced) in triplets.iter_mut().zip(mat_rows) {
            if replaced.is_empty() {
                continue;
            }
            list.retain(|(r, _, _)| !replaced.contains_key(r));
            for (row, entries) in replaced {
                list.extend(entries.into_iter().map(|(col, v)| (row, col, v)));
            }
        }
        Ok(())
    }
}
