//! Aux kernels: nodal updates of auxiliary variables.
//!
//! Aux kernels run on the calling thread, in dependency order: one that
//! reads another's variable at the current state runs after it. Each
//! scheduled pass is all-or-nothing; on a non-finite value every
//! auxiliary variable it wrote is put back.

use std::collections::BTreeSet;

use mosaic_core::{
    AssemblyError, AssemblyReport, DependencyGraph, ElementId, Location, NodeId, SetupError,
    Target, VariableId,
};
use mosaic_factory::{EXEC_INITIAL, EXEC_LINEAR, EXEC_TIMESTEP_END};
use mosaic_kernel::{Couplings, NodeView, Restriction, VariableKind, VariableTable};
use mosaic_mesh::{Mesh, MeshError, Point};
use mosaic_store::State;
use smallvec::SmallVec;

use crate::problem::Problem;

/// A point in the solve at which aux kernels may run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecFlag {
    /// Once, before stateful properties are initialized.
    Initial,
    /// Before every evaluation.
    Linear,
    /// When a step is accepted, before histories rotate.
    TimestepEnd,
}

impl ExecFlag {
    /// The flag spelled `name` in an `execute_on` list.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            EXEC_INITIAL => Some(Self::Initial),
            EXEC_LINEAR => Some(Self::Linear),
            EXEC_TIMESTEP_END => Some(Self::TimestepEnd),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Initial => 1,
            Self::Linear => 2,
            Self::TimestepEnd => 4,
        }
    }
}

/// The flags an aux kernel runs on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecuteOn(u8);

impl ExecuteOn {
    /// Parse the `execute_on` list of `object`.
    pub fn from_names(object: &str, names: &[String]) -> Result<Self, SetupError> {
        let mut bits = 0;
        for name in names {
            let flag = ExecFlag::parse(name).ok_or_else(|| SetupError::InvalidState {
                reason: format!("'{object}': unknown execute_on flag '{name}'"),
            })?;
            bits |= flag.bit();
        }
        Ok(Self(bits))
    }

    /// Returns `true` if the kernel runs on `flag`.
    pub fn contains(self, flag: ExecFlag) -> bool {
        self.0 & flag.bit() != 0
    }
}

/// Read-only metadata of one aux kernel.
#[derive(Clone, Debug)]
pub(crate) struct AuxBinding {
    pub(crate) object: String,
    pub(crate) var: VariableId,
    pub(crate) reads: SmallVec<[VariableId; 4]>,
    pub(crate) restriction: Restriction,
    pub(crate) execute_on: ExecuteOn,
    pub(crate) nodes: Vec<(NodeId, Point)>,
}

impl AuxBinding {
    pub(crate) fn new(
        name: &str,
        couplings: &Couplings,
        variables: &VariableTable,
        restriction: &Restriction,
        execute_on: ExecuteOn,
    ) -> Result<Self, SetupError> {
        let var = couplings.primary.ok_or_else(|| SetupError::InvalidState {
            reason: format!("'{name}' never requested its variable"),
        })?;
        if variables.by_id(var).map(|i| i.kind) != Some(VariableKind::Auxiliary) {
            return Err(SetupError::InvalidState {
                reason: format!("aux kernel '{name}' acts on a nonlinear variable"),
            });
        }
        let reads = couplings
            .variables
            .iter()
            .filter(|(v, s)| *s == State::Current && *v != var)
            .filter(|(v, _)| {
                variables
                    .by_id(*v)
                    .is_some_and(|i| i.kind == VariableKind::Auxiliary)
            })
            .map(|(v, _)| *v)
            .collect();
        Ok(Self {
            object: name.to_string(),
            var,
            reads,
            restriction: restriction.clone(),
            execute_on,
            nodes: Vec::new(),
        })
    }

    /// Collect the nodes of every element on the kernel's blocks.
    pub(crate) fn locate(&mut self, mesh: &dyn Mesh) -> Result<(), MeshError> {
        let mut nodes = BTreeSet::new();
        for e in 0..mesh.element_count() {
            let info = mesh.element(ElementId(e as u32))?;
            if self.restriction.has_block(info.block) {
                nodes.extend(info.nodes.iter().copied());
            }
        }
        self.nodes = nodes
            .into_iter()
            .map(|n| mesh.node_point(n).map(|p| (n, p)))
            .collect::<Result<_, _>>()?;
        Ok(())
    }
}

/// Execution order of `bindings`: writers before readers, ties in
/// declaration order.
pub(crate) fn aux_order(bindings: &[AuxBinding]) -> Result<Vec<usize>, SetupError> {
    let mut graph = DependencyGraph::new();
    for (i, b) in bindings.iter().enumerate() {
        graph.add_node(i);
        for (j, writer) in bindings.iter().enumerate() {
            if i != j && b.reads.contains(&writer.var) {
                graph.add_edge(j, i);
            }
        }
    }
    graph.sort().map_err(|e| SetupError::CyclicDependency {
        context: "aux kernels".to_string(),
        members: e.members.iter().map(|&i| bindings[i].object.clone()).collect(),
    })
}

/// Reject a second aux kernel writing `var` on a block another already
/// covers.
pub(crate) fn check_single_writer(
    bindings: &[AuxBinding],
    name: &str,
    var: VariableId,
    restriction: &Restriction,
) -> Result<(), SetupError> {
    match bindings
        .iter()
        .find(|b| b.var == var && !b.restriction.blocks.is_disjoint(&restriction.blocks))
    {
        Some(other) => Err(SetupError::InvalidState {
            reason: format!(
                "aux kernels '{}' and '{name}' both compute the same variable",
                other.object
            ),
        }),
        None => Ok(()),
    }
}

impl Problem {
    /// Run the aux kernels scheduled on `flag`.
    pub(crate) fn compute_aux(&mut self, flag: ExecFlag) -> Result<(), AssemblyReport> {
        let active: Vec<usize> = self
            .aux_order
            .iter()
            .copied()
            .filter(|&a| self.aux_bindings[a].execute_on.contains(flag))
            .collect();
        if active.is_empty() {
            return Ok(());
        }
        let mut written: Vec<VariableId> =
            active.iter().map(|&a| self.aux_bindings[a].var).collect();
        written.sort_unstable();
        written.dedup();
        let saved: Vec<(VariableId, Vec<f64>)> = written
            .iter()
            .map(|&v| (v, self.histories[v.0 as usize].current().to_vec()))
            .collect();

        let mut values = vec![[0.0; 3]; self.variables.len()];
        let mut errors = Vec::new();
        for a in active {
            let b = &self.aux_bindings[a];
            let kernel = &self.aux_kernels[a];
            for &(node, point) in &b.nodes {
                let i = node.index();
                for (v, h) in values.iter_mut().zip(&self.histories) {
                    *v = [
                        h.get(State::Current)[i],
                        h.get(State::Old)[i],
                        h.get(State::Older)[i],
                    ];
                }
                let value = kernel.compute_value(&NodeView::new(node, point, &values, b.var));
                if self.config.check_finite && !value.is_finite() {
                    errors.push(AssemblyError::NonFiniteContribution {
                        object: b.object.clone(),
                        location: Location::Node(node),
                        target: Target::AuxValue,
                    });
                    continue;
                }
                self.histories[b.var.0 as usize].current_mut()[i] = value;
            }
        }

        if errors.is_empty() {
            return Ok(());
        }
        for (v, old) in saved {
            self.histories[v.0 as usize]
                .current_mut()
                .copy_from_slice(&old);
        }
        let report = AssemblyReport::new(errors);
        log::warn!("aux pass {flag:?} rejected: {report}");
        Err(report)
    }
}
