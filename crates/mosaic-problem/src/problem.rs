//! The problem: object records, setup phases, and runtime state.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use mosaic_core::{
    BoundaryId, ElementId, ParameterSet, ProgrammerError, PropertyId, SetupError, Subsystem,
    TagId, TagKind, TagRegistry, TagSet, VariableId,
};
use mosaic_factory::{ObjectHandle, Registry, TypeDescriptor, Variant};
use mosaic_kernel::{
    resolve_tags, AssemblyContext, BuildContext, Capability, CapabilitySet, Contributor,
    AuxContributor, Couplings, Material, NodalContributor, PropertyRegistry, Restriction,
    VariableKind, VariableTable,
};
use mosaic_mesh::{ElementGeometry, Mesh, MeshError};
use mosaic_store::{
    SnapshotEntry, SolutionHistory, State, StatefulStore, StoreError, VALUE_PROPERTY,
};
use nalgebra::DVector;
use smallvec::SmallVec;

use crate::auxiliary::{self, AuxBinding, ExecFlag, ExecuteOn};
use crate::config::ProblemConfig;
use crate::dof::DofMap;
use crate::error::RuntimeError;
use crate::metrics::EvalMetrics;
use crate::request::CancelToken;

// ── Records ────────────────────────────────────────────────────────

/// Where the live instances of a record sit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectSlot {
    /// A variable and its id.
    Variable(VariableId),
    /// Index into the kernel list.
    Kernel(usize),
    /// Index into the integrated-BC list.
    IntegratedBc(usize),
    /// Index into the nodal-BC list.
    NodalBc(usize),
    /// Index into the material list.
    Material(usize),
    /// Index into the aux kernel list.
    AuxKernel(usize),
}

/// Everything known about one constructed object.
#[derive(Clone, Debug)]
pub struct ObjectRecord {
    /// Subsystem the object lives in.
    pub subsystem: Subsystem,
    /// Registered type id it was built from.
    pub type_id: String,
    /// Object name.
    pub name: String,
    /// Validated parameters. Controllable cells are shared with every
    /// per-thread instance.
    pub params: ParameterSet,
    /// Declared capabilities of the type.
    pub capabilities: CapabilitySet,
    /// Manual or AD variant.
    pub variant: Variant,
    /// Resolved blocks and boundaries.
    pub restriction: Restriction,
    /// Couplings recorded by the constructor.
    pub couplings: Couplings,
    /// Vector tags the object contributes to.
    pub vector_tags: TagSet,
    /// Matrix tags the object contributes to.
    pub matrix_tags: TagSet,
    /// Where the instances sit.
    pub slot: ObjectSlot,
}

/// Read-only assembly metadata of one contributor or material.
#[derive(Clone, Debug)]
pub(crate) struct Binding {
    pub(crate) object: String,
    pub(crate) var: Option<VariableId>,
    pub(crate) slot: usize,
    pub(crate) coupled: SmallVec<[(VariableId, usize); 4]>,
    pub(crate) vector_tags: TagSet,
    pub(crate) matrix_tags: TagSet,
    pub(crate) restriction: Restriction,
    pub(crate) jacobian: bool,
    pub(crate) stateful: SmallVec<[PropertyId; 4]>,
}

/// One worker's private instances.
#[derive(Default)]
pub(crate) struct ThreadObjects {
    pub(crate) kernels: Vec<Box<dyn Contributor>>,
    pub(crate) side_bcs: Vec<Box<dyn Contributor>>,
    pub(crate) materials: Vec<Box<dyn Material>>,
}

/// How far setup has progressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Objects may still be added.
    Setup,
    /// Couplings checked, DOFs numbered, store laid out.
    Resolved,
    /// Stateful properties initialized; evaluations allowed.
    Ready,
}

// ── Problem ────────────────────────────────────────────────────────

/// A fully described problem: mesh, variables, tags, and objects.
///
/// Built in phases by the built-in setup tasks (see
/// [`build_problem`](crate::build_problem)): objects are added, then
/// [`resolve_coupling`](Self::resolve_coupling) validates the dependency
/// graph and numbers the DOFs, then [`init_stateful`](Self::init_stateful)
/// seeds stateful properties. After that the solver loop drives
/// evaluations and time steps.
pub struct Problem {
    pub(crate) config: ProblemConfig,
    pub(crate) threads: usize,
    pub(crate) mesh: Arc<dyn Mesh>,
    registry: Arc<Registry>,
    pub(crate) tags: TagRegistry,
    pub(crate) variables: VariableTable,
    pub(crate) histories: Vec<SolutionHistory>,
    pub(crate) dofs: DofMap,
    pub(crate) properties: PropertyRegistry,
    pub(crate) store: StatefulStore,
    records: IndexMap<(Subsystem, String), ObjectRecord>,
    pub(crate) kernels: Vec<Binding>,
    pub(crate) side_bcs: Vec<Binding>,
    pub(crate) nodal_bcs: Vec<Binding>,
    pub(crate) materials: Vec<Binding>,
    pub(crate) instances: Vec<ThreadObjects>,
    pub(crate) nodal: Vec<Box<dyn NodalContributor>>,
    pub(crate) aux_bindings: Vec<AuxBinding>,
    pub(crate) aux_kernels: Vec<Box<dyn AuxContributor>>,
    pub(crate) aux_order: Vec<usize>,
    pub(crate) material_order: Vec<usize>,
    pub(crate) element_sides: Vec<SmallVec<[(u8, BoundaryId); 2]>>,
    pub(crate) dt: f64,
    pub(crate) phase: Phase,
    pub(crate) cancel: CancelToken,
    pub(crate) metrics: EvalMetrics,
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("phase", &self.phase)
            .field("threads", &self.threads)
            .field("variables", &self.variables.len())
            .field("dofs", &self.dofs.len())
            .field("objects", &self.records.len())
            .field("dt", &self.dt)
            .finish()
    }
}

impl Problem {
    /// An empty problem on `mesh`, building objects from `registry`.
    pub fn new(
        mesh: Arc<dyn Mesh>,
        registry: Arc<Registry>,
        config: ProblemConfig,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        let threads = config.resolved_threads();
        log::debug!("problem: {} elements, {threads} assembly threads", mesh.element_count());
        Ok(Self {
            dt: config.dt,
            config,
            threads,
            mesh,
            registry,
            tags: TagRegistry::new(),
            variables: VariableTable::new(),
            histories: Vec::new(),
            dofs: DofMap::default(),
            properties: PropertyRegistry::new(),
            store: StatefulStore::new(),
            records: IndexMap::new(),
            kernels: Vec::new(),
            side_bcs: Vec::new(),
            nodal_bcs: Vec::new(),
            materials: Vec::new(),
            instances: (0..threads).map(|_| ThreadObjects::default()).collect(),
            nodal: Vec::new(),
            aux_bindings: Vec::new(),
            aux_kernels: Vec::new(),
            aux_order: Vec::new(),
            material_order: Vec::new(),
            element_sides: Vec::new(),
            phase: Phase::Setup,
            cancel: CancelToken::new(),
            metrics: EvalMetrics::default(),
        })
    }

    fn require_phase(&self, phase: Phase, doing: &str) -> Result<(), SetupError> {
        if self.phase != phase {
            return Err(SetupError::InvalidState {
                reason: format!("cannot {doing} in phase {:?}", self.phase),
            });
        }
        Ok(())
    }

    // ── Setup ──────────────────────────────────────────────────────

    /// Register a tag. Re-registering with the same kind returns the
    /// existing id.
    pub fn add_tag(&mut self, name: &str, kind: TagKind) -> Result<TagId, SetupError> {
        self.require_phase(Phase::Setup, "add a tag")?;
        self.tags.register(name, kind).map_err(|_| {
            ProgrammerError::TagMismatch {
                object: "tags".to_string(),
                tag: name.to_string(),
                expected: kind,
            }
            .into()
        })
    }

    /// Build and record one object.
    ///
    /// Contributors and materials are constructed once per assembly
    /// thread, all from the same validated parameter set.
    pub fn add_object(
        &mut self,
        subsystem: Subsystem,
        type_id: &str,
        name: &str,
        user: &ParameterSet,
    ) -> Result<(), SetupError> {
        self.require_phase(Phase::Setup, "add an object")?;
        let key = (subsystem, name.to_string());
        if self.records.contains_key(&key) {
            return Err(SetupError::DuplicateObject {
                subsystem,
                name: name.to_string(),
            });
        }
        let created = self.registry.create(
            subsystem,
            type_id,
            name,
            user,
            &*self.mesh,
            &self.variables,
            &mut self.properties,
        )?;
        let (vector_tags, matrix_tags) = match subsystem {
            Subsystem::Kernels | Subsystem::BoundaryConditions => {
                resolve_tags(name, &created.params, &self.tags)?
            }
            _ => (TagSet::empty(), TagSet::empty()),
        };
        let desc = created.descriptor;
        let params = created.params;
        let restriction = created.restriction;
        let couplings = created.couplings;

        let slot = match created.handle {
            ObjectHandle::Variable(spec) => {
                let id = self.variables.add(name, spec.kind, restriction.blocks.clone())?;
                self.histories.push(SolutionHistory::new(
                    self.mesh.node_count(),
                    spec.initial_condition,
                ));
                ObjectSlot::Variable(id)
            }
            ObjectHandle::Kernel(first) => {
                let binding = self.contributor_binding(
                    name,
                    &restriction,
                    &couplings,
                    &vector_tags,
                    &matrix_tags,
                    desc.capabilities(),
                )?;
                let rest = self.rebuild(&desc, name, &params, &restriction, |h| match h {
                    ObjectHandle::Kernel(k) => Some(k),
                    _ => None,
                })?;
                let all = std::iter::once(first).chain(rest);
                for (objs, k) in self.instances.iter_mut().zip(all) {
                    objs.kernels.push(k);
                }
                self.kernels.push(binding);
                ObjectSlot::Kernel(self.kernels.len() - 1)
            }
            ObjectHandle::IntegratedBc(first) => {
                let binding = self.contributor_binding(
                    name,
                    &restriction,
                    &couplings,
                    &vector_tags,
                    &matrix_tags,
                    desc.capabilities(),
                )?;
                let rest = self.rebuild(&desc, name, &params, &restriction, |h| match h {
                    ObjectHandle::IntegratedBc(k) => Some(k),
                    _ => None,
                })?;
                let all = std::iter::once(first).chain(rest);
                for (objs, k) in self.instances.iter_mut().zip(all) {
                    objs.side_bcs.push(k);
                }
                self.side_bcs.push(binding);
                ObjectSlot::IntegratedBc(self.side_bcs.len() - 1)
            }
            ObjectHandle::NodalBc(bc) => {
                // Nodal BCs run on the calling thread after reduction.
                let binding = self.contributor_binding(
                    name,
                    &restriction,
                    &couplings,
                    &vector_tags,
                    &matrix_tags,
                    desc.capabilities(),
                )?;
                self.nodal.push(bc);
                self.nodal_bcs.push(binding);
                ObjectSlot::NodalBc(self.nodal_bcs.len() - 1)
            }
            ObjectHandle::Material(first) => {
                let rest = self.rebuild(&desc, name, &params, &restriction, |h| match h {
                    ObjectHandle::Material(m) => Some(m),
                    _ => None,
                })?;
                let all = std::iter::once(first).chain(rest);
                for (objs, m) in self.instances.iter_mut().zip(all) {
                    objs.materials.push(m);
                }
                self.materials.push(Binding {
                    object: name.to_string(),
                    var: couplings.primary,
                    slot: 0,
                    coupled: SmallVec::new(),
                    vector_tags: TagSet::empty(),
                    matrix_tags: TagSet::empty(),
                    restriction: restriction.clone(),
                    jacobian: false,
                    stateful: SmallVec::new(),
                });
                ObjectSlot::Material(self.materials.len() - 1)
            }
            ObjectHandle::AuxKernel(kernel) => {
                // Aux kernels run on the calling thread, like nodal BCs.
                let names: Vec<String> = params.get("execute_on").map_err(|reason| {
                    SetupError::Parameter {
                        object: name.to_string(),
                        reason,
                    }
                })?;
                let execute_on = ExecuteOn::from_names(name, &names)?;
                let binding =
                    AuxBinding::new(name, &couplings, &self.variables, &restriction, execute_on)?;
                auxiliary::check_single_writer(
                    &self.aux_bindings,
                    name,
                    binding.var,
                    &restriction,
                )?;
                self.aux_kernels.push(kernel);
                self.aux_bindings.push(binding);
                ObjectSlot::AuxKernel(self.aux_bindings.len() - 1)
            }
        };
        log::debug!("added [{subsystem}] '{name}' ({})", desc.type_id());
        self.records.insert(
            key,
            ObjectRecord {
                subsystem,
                type_id: desc.type_id().to_string(),
                name: name.to_string(),
                params,
                capabilities: desc.capabilities(),
                variant: desc.variant(),
                restriction,
                couplings,
                vector_tags,
                matrix_tags,
                slot,
            },
        );
        Ok(())
    }

    fn contributor_binding(
        &self,
        name: &str,
        restriction: &Restriction,
        couplings: &Couplings,
        vector_tags: &TagSet,
        matrix_tags: &TagSet,
        capabilities: CapabilitySet,
    ) -> Result<Binding, SetupError> {
        let var = couplings.primary.ok_or_else(|| SetupError::InvalidState {
            reason: format!("'{name}' never requested its variable"),
        })?;
        let slot = self
            .variables
            .nonlinear_index(var)
            .ok_or_else(|| SetupError::InvalidState {
                reason: format!("'{name}' acts on an auxiliary variable"),
            })?;
        let coupled = couplings
            .coupled_nonlinear(&self.variables)
            .into_iter()
            .filter_map(|v| self.variables.nonlinear_index(v).map(|s| (v, s)))
            .collect();
        Ok(Binding {
            object: name.to_string(),
            var: Some(var),
            slot,
            coupled,
            vector_tags: vector_tags.clone(),
            matrix_tags: matrix_tags.clone(),
            restriction: restriction.clone(),
            jacobian: capabilities.provides_jacobian(),
            stateful: SmallVec::new(),
        })
    }

    /// Construct the instances for threads `1..threads`.
    fn rebuild<T>(
        &mut self,
        desc: &TypeDescriptor,
        name: &str,
        params: &ParameterSet,
        restriction: &Restriction,
        pick: impl Fn(ObjectHandle) -> Option<T>,
    ) -> Result<Vec<T>, SetupError> {
        let mut out = Vec::with_capacity(self.threads.saturating_sub(1));
        for _ in 1..self.threads {
            let mut ctx = BuildContext::new(
                name,
                desc.subsystem(),
                params,
                restriction,
                &self.variables,
                &mut self.properties,
            )
            .with_capabilities(desc.capabilities());
            let handle = desc.construct(&mut ctx)?;
            let kind = handle.kind_name();
            out.push(pick(handle).ok_or_else(|| SetupError::InvalidState {
                reason: format!("'{name}' built a {kind} on rebuild"),
            })?);
        }
        Ok(out)
    }

    /// Validate couplings, order materials, number DOFs, lay out the
    /// stateful store.
    pub fn resolve_coupling(&mut self) -> Result<(), SetupError> {
        self.require_phase(Phase::Setup, "resolve couplings")?;
        self.properties.resolve()?;

        let names: Vec<&str> = self.materials.iter().map(|b| b.object.as_str()).collect();
        let order = self.properties.material_order(&names)?;
        self.material_order = order
            .iter()
            .filter_map(|n| self.materials.iter().position(|b| &b.object == n))
            .collect();

        for (id, name) in self.properties.iter() {
            let owner = self.properties.owner(id).unwrap_or_default();
            let sid = self
                .store
                .declare(name, owner, self.properties.is_stateful(id))
                .map_err(store_setup)?;
            if sid != id {
                return Err(SetupError::InvalidState {
                    reason: format!(
                        "property '{name}' numbered {sid} in the store but {id} at setup"
                    ),
                });
            }
        }
        for binding in &mut self.materials {
            let key = (Subsystem::Materials, binding.object.clone());
            if let Some(record) = self.records.get(&key) {
                binding.stateful = record
                    .couplings
                    .declared
                    .iter()
                    .copied()
                    .filter(|&p| self.properties.is_stateful(p))
                    .collect();
            }
        }

        for binding in &mut self.aux_bindings {
            binding.locate(&*self.mesh).map_err(mesh_setup)?;
        }
        self.aux_order = auxiliary::aux_order(&self.aux_bindings)?;

        self.dofs = DofMap::build(&*self.mesh, &self.variables).map_err(mesh_setup)?;
        self.element_sides = vec![SmallVec::new(); self.mesh.element_count()];
        for s in self.mesh.boundary_sides() {
            if let Some(list) = self.element_sides.get_mut(s.element.index()) {
                list.push((s.side, s.boundary));
            }
        }
        if self.store.has_stateful() {
            let mut geom = ElementGeometry::default();
            let mut counts = Vec::with_capacity(self.mesh.element_count());
            for e in 0..self.mesh.element_count() {
                self.mesh
                    .reinit_element(ElementId(e as u32), &mut geom)
                    .map_err(mesh_setup)?;
                counts.push(geom.n_qp());
            }
            self.store.allocate(&counts).map_err(store_setup)?;
        }
        log::debug!(
            "resolved: {} dofs, {} properties, material order {:?}",
            self.dofs.len(),
            self.properties.len(),
            order
        );
        self.phase = Phase::Resolved;
        Ok(())
    }

    /// Run the `initial` aux kernels, then seed old/older/current of every
    /// stateful property from the declaring materials' initializers.
    pub fn init_stateful(&mut self) -> Result<(), SetupError> {
        self.require_phase(Phase::Resolved, "initialize stateful properties")?;
        self.compute_aux(ExecFlag::Initial)
            .map_err(|report| SetupError::InvalidState {
                reason: format!("initial aux values: {report}"),
            })?;
        if self.store.has_stateful() {
            let mut ctx = AssemblyContext::new();
            ctx.data.dt = self.dt;
            let n_props = self.properties.len();
            for e in 0..self.mesh.element_count() {
                let id = ElementId(e as u32);
                let info = self.mesh.element(id).map_err(mesh_setup)?;
                self.mesh
                    .reinit_element(id, &mut ctx.data.geom)
                    .map_err(mesh_setup)?;
                ctx.data.element = id;
                ctx.data.block = info.block;
                ctx.data.reinit_fields(&self.variables, &self.histories, &info.nodes);
                ctx.data.props.reset(n_props, ctx.data.geom.n_qp());
                for &m in &self.material_order {
                    let binding = &self.materials[m];
                    if !binding.restriction.has_block(info.block) {
                        continue;
                    }
                    ctx.run_material(self.instances[0].materials[m].as_ref(), binding.var, true);
                    for &p in &binding.stateful {
                        self.store
                            .initialize(p, id, ctx.data.props.state(p, State::Current))
                            .map_err(store_setup)?;
                    }
                }
                self.store.mark_initialized(id);
            }
        }
        self.phase = Phase::Ready;
        log::info!(
            "problem ready: {} variables, {} dofs, {} objects",
            self.variables.len(),
            self.dofs.len(),
            self.records.len()
        );
        Ok(())
    }

    // ── Lookup ─────────────────────────────────────────────────────

    /// Setup progress.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The record of `name` in `subsystem`.
    pub fn object(&self, subsystem: Subsystem, name: &str) -> Option<&ObjectRecord> {
        self.records.get(&(subsystem, name.to_string()))
    }

    /// Records of one subsystem, in creation order.
    pub fn objects(&self, subsystem: Subsystem) -> impl Iterator<Item = &ObjectRecord> {
        self.records.values().filter(move |r| r.subsystem == subsystem)
    }

    /// Records whose type declares `capability`, in creation order.
    pub fn objects_with(&self, capability: Capability) -> impl Iterator<Item = &ObjectRecord> {
        self.records
            .values()
            .filter(move |r| r.capabilities.contains(capability))
    }

    /// Number of objects of every subsystem.
    pub fn object_count(&self) -> usize {
        self.records.len()
    }

    /// The mesh.
    pub fn mesh(&self) -> &dyn Mesh {
        &*self.mesh
    }

    /// The type registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registered tags.
    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    /// All variables.
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// The DOF numbering. Empty before [`resolve_coupling`](Self::resolve_coupling).
    pub fn dof_map(&self) -> &DofMap {
        &self.dofs
    }

    /// Total nonlinear DOFs.
    pub fn n_dofs(&self) -> usize {
        self.dofs.len()
    }

    /// Declared material properties.
    pub fn properties(&self) -> &PropertyRegistry {
        &self.properties
    }

    /// Stored property values.
    pub fn store(&self) -> &StatefulStore {
        &self.store
    }

    /// The configuration the problem was built with.
    pub fn config(&self) -> &ProblemConfig {
        &self.config
    }

    /// Assembly threads in use.
    pub fn threads(&self) -> usize {
        self.threads
    }

    // ── Runtime state ──────────────────────────────────────────────

    /// A handle that cancels the current evaluation, or the next one when
    /// none is running.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Counters of the last successful evaluation.
    pub fn last_metrics(&self) -> &EvalMetrics {
        &self.metrics
    }

    /// Current time step size.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Change the time step size.
    pub fn set_dt(&mut self, dt: f64) -> Result<(), RuntimeError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(RuntimeError::InvalidValue {
                reason: format!("dt must be finite and positive, got {dt}"),
            });
        }
        self.dt = dt;
        Ok(())
    }

    /// The current nonlinear solution in DOF order.
    pub fn solution(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.dofs.len(),
            self.dofs
                .iter()
                .map(|(_, v, n)| self.histories[v.0 as usize].current()[n.index()]),
        )
    }

    /// Overwrite the current nonlinear solution.
    pub fn set_solution(&mut self, x: &DVector<f64>) -> Result<(), RuntimeError> {
        if x.len() != self.dofs.len() {
            return Err(RuntimeError::SizeMismatch {
                what: "solution".to_string(),
                expected: self.dofs.len(),
                found: x.len(),
            });
        }
        for (dof, v, n) in self.dofs.iter() {
            self.histories[v.0 as usize].current_mut()[n.index()] = x[dof];
        }
        Ok(())
    }

    /// Nodal values of one variable in one state.
    pub fn variable_values(&self, name: &str, state: State) -> Option<&[f64]> {
        let info = self.variables.get(name)?;
        self.histories.get(info.id.0 as usize).map(|h| h.get(state))
    }

    /// Overwrite the current nodal values of an auxiliary variable.
    pub fn set_aux_values(&mut self, name: &str, values: &[f64]) -> Result<(), RuntimeError> {
        let id = match self.variables.get(name) {
            Some(info) if info.kind == VariableKind::Auxiliary => info.id,
            _ => {
                return Err(RuntimeError::UnknownVariable {
                    name: name.to_string(),
                })
            }
        };
        let current = self.histories[id.0 as usize].current_mut();
        if current.len() != values.len() {
            return Err(RuntimeError::SizeMismatch {
                what: format!("aux variable '{name}'"),
                expected: current.len(),
                found: values.len(),
            });
        }
        current.copy_from_slice(values);
        Ok(())
    }

    /// Update a controllable parameter. Every thread's instance sees the
    /// new value from its next evaluation on.
    pub fn set_controllable(
        &mut self,
        subsystem: Subsystem,
        object: &str,
        param: &str,
        value: f64,
    ) -> Result<(), RuntimeError> {
        let record = self
            .records
            .get_mut(&(subsystem, object.to_string()))
            .ok_or_else(|| RuntimeError::UnknownObject {
                subsystem,
                name: object.to_string(),
            })?;
        record
            .params
            .set_controlled(param, value)
            .map_err(RuntimeError::Param)?;
        log::debug!("control: [{subsystem}] {object}/{param} = {value}");
        Ok(())
    }

    /// Accept the step: the `timestep_end` aux kernels run, then every
    /// history and the stateful store rotate. Nothing rotates if an aux
    /// value is non-finite.
    pub fn accept_step(&mut self) -> Result<(), RuntimeError> {
        self.compute_aux(ExecFlag::TimestepEnd).map_err(RuntimeError::Rejected)?;
        for h in &mut self.histories {
            h.advance();
        }
        self.store.shift();
        Ok(())
    }

    /// Reject the step: current values fall back to old.
    pub fn reject_step(&mut self) {
        for h in &mut self.histories {
            h.restore();
        }
        self.store.restore();
    }

    // ── Checkpoint ─────────────────────────────────────────────────

    /// Every variable (under [`VALUE_PROPERTY`]) and stateful property
    /// snapshot, in a stable order.
    pub fn snapshot_entries(&self) -> Vec<SnapshotEntry> {
        let mut entries = Vec::new();
        for info in self.variables.iter() {
            let history = &self.histories[info.id.0 as usize];
            for state in State::ALL {
                entries.push(SnapshotEntry {
                    object: info.name.clone(),
                    property: VALUE_PROPERTY.to_string(),
                    state,
                    values: history.get(state).to_vec(),
                });
            }
        }
        entries.extend(self.store.entries());
        entries
    }

    fn entry_variable(&self, entry: &SnapshotEntry) -> Option<VariableId> {
        (entry.property == VALUE_PROPERTY)
            .then(|| self.variables.get(&entry.object).map(|i| i.id))
            .flatten()
    }

    /// Write entries produced by [`snapshot_entries`](Self::snapshot_entries) back.
    ///
    /// Every entry is checked before any is written, so on error the
    /// problem is unchanged.
    pub fn restore_entries(&mut self, entries: &[SnapshotEntry]) -> Result<(), RuntimeError> {
        for entry in entries {
            match self.entry_variable(entry) {
                Some(id) => {
                    let expected = self.histories[id.0 as usize].len();
                    if expected != entry.values.len() {
                        return Err(RuntimeError::SizeMismatch {
                            what: format!("variable '{}' {:?}", entry.object, entry.state),
                            expected,
                            found: entry.values.len(),
                        });
                    }
                }
                None => {
                    self.store.check_entry(entry).map_err(RuntimeError::Store)?;
                }
            }
        }
        for entry in entries {
            match self.entry_variable(entry) {
                Some(id) => self.histories[id.0 as usize]
                    .get_mut(entry.state)
                    .copy_from_slice(&entry.values),
                None => self.store.restore_entry(entry).map_err(RuntimeError::Store)?,
            }
        }
        Ok(())
    }
}

fn store_setup(e: StoreError) -> SetupError {
    SetupError::InvalidState {
        reason: e.to_string(),
    }
}

fn mesh_setup(e: MeshError) -> SetupError {
    SetupError::InvalidState {
        reason: format!("mesh: {e}"),
    }
}
