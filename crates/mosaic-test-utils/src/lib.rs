//! Test fixtures and mock objects for Mosaic development.
//!
//! [`Bench`] holds a small 1D mesh with variables and solution histories,
//! and builds objects through a real [`Registry`] so unit tests can
//! exercise one contributor on one element without a full problem.
//! [`fixtures`] provides mock contributors and a recording action.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::BTreeSet;

use mosaic_core::{BlockId, ElementId, ParameterSet, SetupError, Subsystem, VariableId};
use mosaic_factory::{Created, Registry};
use mosaic_kernel::{AssemblyContext, PropertyRegistry, VariableKind, VariableTable};
use mosaic_mesh::{EdgeMesh, Mesh};
use mosaic_store::SolutionHistory;

pub use fixtures::{register_fixtures, ConstantSource, PoisonKernel, RecordingAction};

/// A uniform mesh on `[0, 1]` with `n` elements.
pub fn unit_edge_mesh(n: u32) -> EdgeMesh {
    EdgeMesh::new(0.0, 1.0, n).expect("valid unit mesh")
}

/// Every block id of a mesh.
pub fn all_blocks(mesh: &dyn Mesh) -> BTreeSet<BlockId> {
    mesh.blocks().iter().map(|(_, b)| BlockId(b)).collect()
}

/// One mesh, its variables, and their nodal histories.
pub struct Bench {
    pub mesh: EdgeMesh,
    pub variables: VariableTable,
    pub histories: Vec<SolutionHistory>,
    pub properties: PropertyRegistry,
}

impl Bench {
    /// `n` elements on `[0, 1]` with one nonlinear variable `u = 0`.
    pub fn new(n: u32) -> Self {
        let mut bench = Self {
            mesh: unit_edge_mesh(n),
            variables: VariableTable::new(),
            histories: Vec::new(),
            properties: PropertyRegistry::new(),
        };
        bench.add_variable("u", VariableKind::Nonlinear);
        bench
    }

    /// Add a variable on every block, initialized to zero.
    pub fn add_variable(&mut self, name: &str, kind: VariableKind) -> VariableId {
        let id = self
            .variables
            .add(name, kind, all_blocks(&self.mesh))
            .expect("unique variable name");
        self.histories
            .push(SolutionHistory::new(self.mesh.node_count(), 0.0));
        id
    }

    /// Id of a variable by name.
    pub fn var(&self, name: &str) -> VariableId {
        self.variables.get(name).expect("declared variable").id
    }

    /// Overwrite the current nodal values of a variable.
    pub fn set(&mut self, name: &str, values: &[f64]) {
        let id = self.var(name);
        self.histories[id.0 as usize]
            .current_mut()
            .copy_from_slice(values);
    }

    /// Rotate every history as on an accepted step.
    pub fn advance(&mut self) {
        for h in &mut self.histories {
            h.advance();
        }
    }

    /// Build an object through `registry`.
    pub fn create(
        &mut self,
        registry: &Registry,
        subsystem: Subsystem,
        type_id: &str,
        name: &str,
        params: &ParameterSet,
    ) -> Result<Created, SetupError> {
        registry.create(
            subsystem,
            type_id,
            name,
            params,
            &self.mesh,
            &self.variables,
            &mut self.properties,
        )
    }

    /// An assembly context positioned on element `e`, with fields
    /// interpolated and property storage sized, and with the local blocks
    /// sized for every nonlinear variable.
    pub fn context(&self, e: u32, dt: f64) -> AssemblyContext {
        let id = ElementId(e);
        let info = self.mesh.element(id).expect("element in range");
        let mut ctx = AssemblyContext::new();
        self.mesh
            .reinit_element(id, &mut ctx.data.geom)
            .expect("reinit");
        ctx.data.element = id;
        ctx.data.block = info.block;
        ctx.data.dt = dt;
        ctx.data
            .reinit_fields(&self.variables, &self.histories, &info.nodes);
        ctx.data
            .props
            .reset(self.properties.len(), ctx.data.geom.n_qp());
        let n = self.variables.nonlinear_count() * ctx.data.geom.n_shape();
        ctx.local.reset(n);
        ctx
    }
}
