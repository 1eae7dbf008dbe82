//! Degree-of-freedom numbering.

use std::collections::BTreeSet;

use mosaic_core::{ElementId, NodeId, VariableId};
use mosaic_kernel::VariableTable;
use mosaic_mesh::{Mesh, MeshError};

/// Maps `(nonlinear variable, node)` to a global row index.
///
/// Variable-major: all DOFs of the first nonlinear variable, then the
/// next, each in ascending node order. A variable owns only the nodes of
/// elements in its blocks. Auxiliary variables have no DOFs.
#[derive(Clone, Debug, Default)]
pub struct DofMap {
    // Indexed by variable id, then node index.
    rows: Vec<Vec<Option<usize>>>,
    owners: Vec<(VariableId, NodeId)>,
}

impl DofMap {
    /// Number the DOFs of every nonlinear variable on `mesh`.
    pub fn build(mesh: &dyn Mesh, variables: &VariableTable) -> Result<Self, MeshError> {
        let n_nodes = mesh.node_count();
        let mut rows = vec![Vec::new(); variables.len()];
        let mut owners = Vec::new();
        for info in variables.nonlinear() {
            let mut nodes = BTreeSet::new();
            for e in 0..mesh.element_count() {
                let elem = mesh.element(ElementId(e as u32))?;
                if info.is_defined_on(elem.block) {
                    nodes.extend(elem.nodes.iter().copied());
                }
            }
            let mut map = vec![None; n_nodes];
            for node in nodes {
                map[node.index()] = Some(owners.len());
                owners.push((info.id, node));
            }
            rows[info.id.0 as usize] = map;
        }
        Ok(Self { rows, owners })
    }

    /// Global row of `var` at `node`, if the variable lives there.
    pub fn dof(&self, var: VariableId, node: NodeId) -> Option<usize> {
        self.rows
            .get(var.0 as usize)
            .and_then(|m| m.get(node.index()))
            .copied()
            .flatten()
    }

    /// The `(variable, node)` pair owning a row.
    pub fn owner(&self, dof: usize) -> Option<(VariableId, NodeId)> {
        self.owners.get(dof).copied()
    }

    /// Total number of DOFs.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns `true` if there are no DOFs.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// All rows in order with their owners.
    pub fn iter(&self) -> impl Iterator<Item = (usize, VariableId, NodeId)> + '_ {
        self.owners
            .iter()
            .enumerate()
            .map(|(dof, &(v, n))| (dof, v, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::BlockId;
    use mosaic_kernel::VariableKind;
    use mosaic_mesh::EdgeMesh;

    #[test]
    fn block_restricted_variables_number_only_their_nodes() {
        let mut mesh = EdgeMesh::new(0.0, 1.0, 4).unwrap();
        let left = mesh.assign_block("L", 0..2).unwrap();
        let all: BTreeSet<BlockId> = mesh.blocks().iter().map(|(_, b)| BlockId(b)).collect();
        let mut vars = VariableTable::new();
        let u = vars.add("u", VariableKind::Nonlinear, all).unwrap();
        let a = vars
            .add("a", VariableKind::Auxiliary, [left].into_iter().collect())
            .unwrap();
        let v = vars
            .add("v", VariableKind::Nonlinear, [left].into_iter().collect())
            .unwrap();
        let dofs = DofMap::build(&mesh, &vars).unwrap();
        // u on all 5 nodes, v on nodes 0..=2.
        assert_eq!(dofs.len(), 8);
        assert_eq!(dofs.dof(u, NodeId(0)), Some(0));
        assert_eq!(dofs.dof(u, NodeId(4)), Some(4));
        assert_eq!(dofs.dof(v, NodeId(0)), Some(5));
        assert_eq!(dofs.dof(v, NodeId(2)), Some(7));
        assert_eq!(dofs.dof(v, NodeId(3)), None);
        assert_eq!(dofs.dof(a, NodeId(0)), None);
        assert_eq!(dofs.owner(6), Some((v, NodeId(1))));
        assert_eq!(dofs.iter().count(), 8);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn rows_are_dense_and_invert_owner(n in 1u32..12, split in 0u32..12) {
                let split = split.min(n);
                let mut mesh = EdgeMesh::new(0.0, 1.0, n).unwrap();
                let mut restricted = BTreeSet::new();
                if split > 0 {
                    restricted.insert(mesh.assign_block("L", 0..split).unwrap());
                }
                let all: BTreeSet<BlockId> =
                    mesh.blocks().iter().map(|(_, b)| BlockId(b)).collect();
                let mut vars = VariableTable::new();
                let u = vars.add("u", VariableKind::Nonlinear, all).unwrap();
                let v = vars.add("v", VariableKind::Nonlinear, restricted).unwrap();
                let dofs = DofMap::build(&mesh, &vars).unwrap();

                let v_nodes = if split > 0 { split + 1 } else { 0 };
                prop_assert_eq!(dofs.len() as u32, n + 1 + v_nodes);
                for (row, var, node) in dofs.iter() {
                    prop_assert_eq!(dofs.dof(var, node), Some(row));
                }
                // Variable-major: every row of u precedes every row of v.
                for node in 0..=n {
                    prop_assert_eq!(dofs.dof(u, NodeId(node)), Some(node as usize));
                }
                prop_assert_eq!(dofs.dof(v, NodeId(v_nodes)), None);
            }
        }
    }
}
