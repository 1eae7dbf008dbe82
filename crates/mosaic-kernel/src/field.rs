//! Variable table and per-element field interpolation.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use mosaic_core::{BlockId, NodeId, SetupError, Subsystem, VariableId};
use mosaic_mesh::{ElementGeometry, Point};
use mosaic_store::{SolutionHistory, State};

/// Whether a variable carries degrees of freedom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// Solved for; one DOF per node in the variable's blocks.
    Nonlinear,
    /// Caller-supplied nodal values; coupled but never solved for.
    Auxiliary,
}

impl VariableKind {
    /// The subsystem variables of this kind are declared in.
    pub fn subsystem(self) -> Subsystem {
        match self {
            Self::Nonlinear => Subsystem::Variables,
            Self::Auxiliary => Subsystem::AuxVariables,
        }
    }
}

/// One declared variable.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableInfo {
    /// Dense id, shared sequence for both kinds.
    pub id: VariableId,
    /// Declared name.
    pub name: String,
    /// Nonlinear or auxiliary.
    pub kind: VariableKind,
    /// Blocks the variable is defined on.
    pub blocks: BTreeSet<BlockId>,
}

impl VariableInfo {
    /// Returns `true` if the variable is defined on `block`.
    pub fn is_defined_on(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }
}

/// All variables of a problem, in declaration order.
///
/// Names are unique across nonlinear and auxiliary variables since
/// couplings refer to either by name.
#[derive(Clone, Debug, Default)]
pub struct VariableTable {
    vars: IndexMap<String, VariableInfo>,
}

impl VariableTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn add(
        &mut self,
        name: &str,
        kind: VariableKind,
        blocks: BTreeSet<BlockId>,
    ) -> Result<VariableId, SetupError> {
        if self.vars.contains_key(name) {
            return Err(SetupError::DuplicateObject {
                subsystem: kind.subsystem(),
                name: name.to_string(),
            });
        }
        let id = VariableId(self.vars.len() as u32);
        self.vars.insert(
            name.to_string(),
            VariableInfo {
                id,
                name: name.to_string(),
                kind,
                blocks,
            },
        );
        Ok(id)
    }

    /// Look up by name.
    pub fn get(&self, name: &str) -> Option<&VariableInfo> {
        self.vars.get(name)
    }

    /// Look up by id.
    pub fn by_id(&self, id: VariableId) -> Option<&VariableInfo> {
        self.vars.get_index(id.0 as usize).map(|(_, v)| v)
    }

    /// Every variable in id order.
    pub fn iter(&self) -> impl Iterator<Item = &VariableInfo> {
        self.vars.values()
    }

    /// Nonlinear variables in id order.
    pub fn nonlinear(&self) -> impl Iterator<Item = &VariableInfo> {
        self.vars
            .values()
            .filter(|v| v.kind == VariableKind::Nonlinear)
    }

    /// Position of a nonlinear variable among the nonlinear variables.
    ///
    /// This is the variable's slot in local residual/Jacobian blocks.
    pub fn nonlinear_index(&self, id: VariableId) -> Option<usize> {
        self.nonlinear().position(|v| v.id == id)
    }

    /// Number of nonlinear variables.
    pub fn nonlinear_count(&self) -> usize {
        self.nonlinear().count()
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if no variables are declared.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// One variable interpolated at the quadrature points of one element.
#[derive(Clone, Debug, Default)]
pub struct FieldValues {
    defined: bool,
    values: [Vec<f64>; 3],
    grads: [Vec<Point>; 3],
}

fn slot(state: State) -> usize {
    match state {
        State::Current => 0,
        State::Old => 1,
        State::Older => 2,
    }
}

impl FieldValues {
    /// Interpolate `u = Σ u_i φ_i` (and its gradient) for every state.
    ///
    /// `history` is indexed by global node; `nodes` lists the element's
    /// nodes in shape-function order.
    pub fn reinit(
        &mut self,
        defined: bool,
        history: &SolutionHistory,
        nodes: &[NodeId],
        geom: &ElementGeometry,
    ) {
        self.defined = defined;
        let n_qp = geom.n_qp();
        for state in State::ALL {
            let s = slot(state);
            let nodal = history.get(state);
            let values = &mut self.values[s];
            let grads = &mut self.grads[s];
            values.clear();
            values.resize(n_qp, 0.0);
            grads.clear();
            grads.resize(n_qp, [0.0; 3]);
            for (i, node) in nodes.iter().enumerate() {
                let ui = nodal.get(node.index()).copied().unwrap_or(0.0);
                for qp in 0..n_qp {
                    values[qp] += ui * geom.phi[i][qp];
                    let g = geom.grad_phi[i][qp];
                    for d in 0..3 {
                        grads[qp][d] += ui * g[d];
                    }
                }
            }
        }
    }

    /// Returns `true` if the variable is defined on the element's block.
    pub fn is_defined(&self) -> bool {
        self.defined
    }

    /// Interpolated value.
    pub fn value(&self, state: State, qp: usize) -> f64 {
        self.values[slot(state)].get(qp).copied().unwrap_or(0.0)
    }

    /// Interpolated gradient.
    pub fn gradient(&self, state: State, qp: usize) -> Point {
        self.grads[slot(state)]
            .get(qp)
            .copied()
            .unwrap_or([0.0; 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::ElementId;
    use mosaic_mesh::{EdgeMesh, Mesh};

    #[test]
    fn names_unique_across_kinds() {
        let mut t = VariableTable::new();
        let u = t.add("u", VariableKind::Nonlinear, BTreeSet::new()).unwrap();
        let a = t.add("a", VariableKind::Auxiliary, BTreeSet::new()).unwrap();
        let v = t.add("v", VariableKind::Nonlinear, BTreeSet::new()).unwrap();
        assert_eq!((u, a, v), (VariableId(0), VariableId(1), VariableId(2)));
        assert_eq!(t.nonlinear_index(v), Some(1));
        assert_eq!(t.nonlinear_index(a), None);
        match t.add("u", VariableKind::Auxiliary, BTreeSet::new()) {
            Err(SetupError::DuplicateObject { subsystem, name }) => {
                assert_eq!(subsystem, Subsystem::AuxVariables);
                assert_eq!(name, "u");
            }
            other => panic!("expected DuplicateObject, got {other:?}"),
        }
    }

    #[test]
    fn interpolates_linear_field_per_state() {
        let mesh = EdgeMesh::new(0.0, 1.0, 2).unwrap();
        let mut geom = ElementGeometry::default();
        mesh.reinit_element(ElementId(1), &mut geom).unwrap();
        let info = mesh.element(ElementId(1)).unwrap();
        // u(x) = 2x at the current state, zero before.
        let mut h = SolutionHistory::new(3, 0.0);
        h.current_mut().copy_from_slice(&[0.0, 1.0, 2.0]);
        let mut f = FieldValues::default();
        f.reinit(true, &h, &info.nodes, &geom);
        for qp in 0..geom.n_qp() {
            let x = geom.q_points[qp][0];
            assert!((f.value(State::Current, qp) - 2.0 * x).abs() < 1e-12);
            assert!((f.gradient(State::Current, qp)[0] - 2.0).abs() < 1e-12);
            assert_eq!(f.value(State::Old, qp), 0.0);
        }
    }
}
