//! Coupling requests made while an object is being built.
//!
//! A constructor receives a [`BuildContext`] and asks it for everything it
//! will read during assembly: its primary variable, coupled variables
//! (current, old, or older), and material properties. Each request returns
//! a small copyable handle and records a dependency edge; a name that
//! resolves to nothing fails here, at setup, never during assembly.
//!
//! Requests are idempotent, so the same constructor can run once per
//! worker thread against the same registry.

use std::collections::BTreeSet;

use indexmap::IndexSet;
use mosaic_core::{
    BlockId, BoundaryId, ControlledReal, CouplingKind, FromParam, ParamError, ParameterSet,
    ProgrammerError, PropertyId, SetupError, Subsystem, TagKind, TagRegistry, TagSet, VariableId,
};
use mosaic_mesh::Mesh;
use mosaic_store::State;
use smallvec::SmallVec;

use crate::capability::{Capability, CapabilitySet};
use crate::field::{VariableKind, VariableTable};
use crate::property::{DeclaredProp, PropertyRegistry};

// ── Handles ────────────────────────────────────────────────────────

/// A coupled variable value, or a constant standing in for an unset
/// optional coupling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VarHandle {
    /// A variable at one temporal state.
    Field {
        /// The variable.
        var: VariableId,
        /// Which snapshot.
        state: State,
    },
    /// A constant default: zero gradient, zero time derivative.
    Constant(f64),
}

impl VarHandle {
    /// Returns `true` if this handle reads the current state of `var`,
    /// i.e. the handle depends on `var`'s unknowns.
    pub fn is(&self, var: VariableId) -> bool {
        matches!(self, Self::Field { var: v, state: State::Current } if *v == var)
    }

    /// The variable read, if any.
    pub fn var(&self) -> Option<VariableId> {
        match self {
            Self::Field { var, .. } => Some(*var),
            Self::Constant(_) => None,
        }
    }
}

/// A consumed material property at one temporal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropHandle {
    /// The property.
    pub id: PropertyId,
    /// Which snapshot.
    pub state: State,
}

// ── Restriction ────────────────────────────────────────────────────

/// The blocks and boundaries an object is active on.
///
/// Blocks are always explicit: an object without a `block` parameter gets
/// its primary variable's blocks, or every mesh block if it has none.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Restriction {
    /// Active blocks.
    pub blocks: BTreeSet<BlockId>,
    /// Active boundaries (boundary conditions only).
    pub boundaries: BTreeSet<BoundaryId>,
}

fn opt_list(params: &ParameterSet, name: &str, object: &str) -> Result<Vec<String>, SetupError> {
    match params.get_opt::<Vec<String>>(name) {
        Ok(v) => Ok(v.unwrap_or_default()),
        Err(ParamError::NotFound { .. }) => Ok(Vec::new()),
        Err(reason) => Err(SetupError::Parameter {
            object: object.to_string(),
            reason,
        }),
    }
}

impl Restriction {
    /// Resolve the `block` and `boundary` parameters against the mesh.
    ///
    /// `primary` is the name of the object's primary variable, if it has
    /// one and it is already declared.
    pub fn resolve(
        object: &str,
        params: &ParameterSet,
        mesh: &dyn Mesh,
        variables: &VariableTable,
        primary: Option<&str>,
    ) -> Result<Self, SetupError> {
        let missing = |name: &str| SetupError::MissingCoupling {
            object: object.to_string(),
            name: name.to_string(),
            kind: CouplingKind::Region,
        };
        let block_names = opt_list(params, "block", object)?;
        let blocks = if block_names.is_empty() {
            match primary.and_then(|p| variables.get(p)) {
                Some(v) => v.blocks.clone(),
                None => mesh.blocks().iter().map(|(_, id)| BlockId(id)).collect(),
            }
        } else {
            block_names
                .iter()
                .map(|n| mesh.blocks().lookup(n).map(BlockId).ok_or_else(|| missing(n)))
                .collect::<Result<_, _>>()?
        };
        let boundaries = opt_list(params, "boundary", object)?
            .iter()
            .map(|n| {
                mesh.boundaries()
                    .lookup(n)
                    .map(BoundaryId)
                    .ok_or_else(|| missing(n))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { blocks, boundaries })
    }

    /// Returns `true` if the object is active on `block`.
    pub fn has_block(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// Returns `true` if the object is active on `boundary`.
    pub fn has_boundary(&self, boundary: BoundaryId) -> bool {
        self.boundaries.contains(&boundary)
    }
}

// ── Tags ───────────────────────────────────────────────────────────

/// Resolve an object's `vector_tags`/`extra_vector_tags` and
/// `matrix_tags`/`extra_matrix_tags` to `(vector, matrix)` tag sets.
///
/// An unregistered name is a `MissingCoupling`; a name registered with the
/// other kind is a `TagMismatch`.
pub fn resolve_tags(
    object: &str,
    params: &ParameterSet,
    tags: &TagRegistry,
) -> Result<(TagSet, TagSet), SetupError> {
    let resolve = |lists: [&str; 2], kind: TagKind| -> Result<TagSet, SetupError> {
        let mut set = TagSet::empty();
        for list in lists {
            for name in opt_list(params, list, object)? {
                match tags.lookup(&name) {
                    Some((id, k)) if k == kind => set.insert(id),
                    Some(_) => {
                        return Err(ProgrammerError::TagMismatch {
                            object: object.to_string(),
                            tag: name,
                            expected: kind,
                        }
                        .into())
                    }
                    None => {
                        return Err(SetupError::MissingCoupling {
                            object: object.to_string(),
                            name,
                            kind: CouplingKind::Tag,
                        })
                    }
                }
            }
        }
        Ok(set)
    };
    let vector = resolve(["vector_tags", "extra_vector_tags"], TagKind::Vector)?;
    let matrix = resolve(["matrix_tags", "extra_matrix_tags"], TagKind::Matrix)?;
    Ok((vector, matrix))
}

// ── Couplings ──────────────────────────────────────────────────────

/// Everything one object asked for while being built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Couplings {
    /// The primary variable, if requested.
    pub primary: Option<VariableId>,
    /// Coupled variables, in request order.
    pub variables: IndexSet<(VariableId, State)>,
    /// Consumed properties, in request order.
    pub properties: IndexSet<PropHandle>,
    /// Declared properties, in declaration order.
    pub declared: IndexSet<PropertyId>,
}

impl Couplings {
    /// Nonlinear variables other than the primary whose current state is
    /// coupled. These get off-diagonal Jacobian blocks.
    pub fn coupled_nonlinear(&self, table: &VariableTable) -> SmallVec<[VariableId; 4]> {
        self.variables
            .iter()
            .filter(|(v, s)| {
                *s == State::Current
                    && Some(*v) != self.primary
                    && table
                        .by_id(*v)
                        .is_some_and(|i| i.kind == VariableKind::Nonlinear)
            })
            .map(|(v, _)| *v)
            .collect()
    }
}

// ── Build context ──────────────────────────────────────────────────

/// What a constructor sees while building one object.
pub struct BuildContext<'a> {
    object: &'a str,
    subsystem: Subsystem,
    params: &'a ParameterSet,
    restriction: &'a Restriction,
    variables: &'a VariableTable,
    properties: &'a mut PropertyRegistry,
    capabilities: CapabilitySet,
    couplings: Couplings,
}

impl<'a> BuildContext<'a> {
    /// A context for building `object`, with no capabilities until
    /// [`with_capabilities`](Self::with_capabilities) grants them.
    pub fn new(
        object: &'a str,
        subsystem: Subsystem,
        params: &'a ParameterSet,
        restriction: &'a Restriction,
        variables: &'a VariableTable,
        properties: &'a mut PropertyRegistry,
    ) -> Self {
        Self {
            object,
            subsystem,
            params,
            restriction,
            variables,
            properties,
            capabilities: CapabilitySet::EMPTY,
            couplings: Couplings::default(),
        }
    }

    /// Grant the capabilities the object's type registered with.
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Capabilities granted to the object being built.
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Name of the object being built.
    pub fn name(&self) -> &str {
        self.object
    }

    /// Subsystem of the object being built.
    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// The validated parameters.
    pub fn params(&self) -> &ParameterSet {
        self.params
    }

    /// The object's resolved restriction.
    pub fn restriction(&self) -> &Restriction {
        self.restriction
    }

    fn param_error(&self, reason: ParamError) -> SetupError {
        SetupError::Parameter {
            object: self.object.to_string(),
            reason,
        }
    }

    /// Typed parameter lookup.
    pub fn param<T: FromParam>(&self, name: &str) -> Result<T, SetupError> {
        self.params.get(name).map_err(|e| self.param_error(e))
    }

    /// The live cell of a controllable parameter.
    pub fn controlled(&self, name: &str) -> Result<ControlledReal, SetupError> {
        self.params.controlled(name).map_err(|e| self.param_error(e))
    }

    // ── Variables ──────────────────────────────────────────────

    fn lookup_var(&self, name: &str) -> Result<VariableId, SetupError> {
        self.variables
            .get(name)
            .map(|v| v.id)
            .ok_or_else(|| SetupError::MissingCoupling {
                object: self.object.to_string(),
                name: name.to_string(),
                kind: CouplingKind::Variable,
            })
    }

    /// The variable named by the `variable` parameter.
    pub fn primary_variable(&mut self) -> Result<VariableId, SetupError> {
        let name: String = self.param("variable")?;
        let var = self.lookup_var(&name)?;
        self.couplings.primary = Some(var);
        self.couplings.variables.insert((var, State::Current));
        Ok(var)
    }

    fn coupled_at(&mut self, param: &str, state: State) -> Result<VarHandle, SetupError> {
        let name: String = self.param(param)?;
        let var = self.lookup_var(&name)?;
        self.couplings.variables.insert((var, state));
        Ok(VarHandle::Field { var, state })
    }

    /// The variable named by `param`, current state.
    pub fn coupled(&mut self, param: &str) -> Result<VarHandle, SetupError> {
        self.coupled_at(param, State::Current)
    }

    /// The variable named by `param`, previous accepted step.
    pub fn coupled_old(&mut self, param: &str) -> Result<VarHandle, SetupError> {
        self.coupled_at(param, State::Old)
    }

    /// The variable named by `param`, two accepted steps back.
    pub fn coupled_older(&mut self, param: &str) -> Result<VarHandle, SetupError> {
        self.coupled_at(param, State::Older)
    }

    /// The variable named by `param`, or `default` if the parameter is
    /// unset. A numeric string also binds a constant. Constants record no
    /// coupling.
    pub fn coupled_or(&mut self, param: &str, default: f64) -> Result<VarHandle, SetupError> {
        match self.params.get_opt::<String>(param) {
            Ok(None) | Err(ParamError::NotFound { .. }) => Ok(VarHandle::Constant(default)),
            Ok(Some(name)) => match name.parse::<f64>() {
                Ok(v) => Ok(VarHandle::Constant(v)),
                Err(_) => {
                    let var = self.lookup_var(&name)?;
                    self.couplings.variables.insert((var, State::Current));
                    Ok(VarHandle::Field {
                        var,
                        state: State::Current,
                    })
                }
            },
            Err(e) => Err(self.param_error(e)),
        }
    }

    // ── Material properties ────────────────────────────────────

    fn property_at(&mut self, name: &str, state: State) -> Result<PropHandle, SetupError> {
        if self.subsystem == Subsystem::AuxKernels {
            return Err(SetupError::InvalidState {
                reason: format!(
                    "'{}' reads property '{name}' but aux kernels run at nodes",
                    self.object
                ),
            });
        }
        let id = self.properties.consume(
            name,
            self.object,
            &self.restriction.blocks,
            state,
            self.subsystem == Subsystem::Materials,
        );
        let handle = PropHandle { id, state };
        self.couplings.properties.insert(handle);
        Ok(handle)
    }

    /// A material property, current state.
    pub fn material_property(&mut self, name: &str) -> Result<PropHandle, SetupError> {
        self.property_at(name, State::Current)
    }

    /// A material property, previous accepted step. The declarer must
    /// declare it stateful.
    pub fn material_property_old(&mut self, name: &str) -> Result<PropHandle, SetupError> {
        self.property_at(name, State::Old)
    }

    /// A material property, two accepted steps back.
    pub fn material_property_older(&mut self, name: &str) -> Result<PropHandle, SetupError> {
        self.property_at(name, State::Older)
    }

    fn declare(&mut self, name: &str, stateful: bool) -> Result<DeclaredProp, SetupError> {
        if self.subsystem != Subsystem::Materials {
            return Err(SetupError::InvalidState {
                reason: format!(
                    "'{}' declares property '{name}' but is not a material",
                    self.object
                ),
            });
        }
        if stateful && !self.capabilities.contains(Capability::Stateful) {
            return Err(SetupError::Programmer(
                ProgrammerError::UndeclaredCapability {
                    object: self.object.to_string(),
                    capability: CapabilitySet::EMPTY.with(Capability::Stateful).to_string(),
                },
            ));
        }
        let id = self
            .properties
            .declare(name, self.object, &self.restriction.blocks, stateful);
        self.couplings.declared.insert(id);
        Ok(DeclaredProp(id))
    }

    /// Declare a property this material computes.
    pub fn declare_property(&mut self, name: &str) -> Result<DeclaredProp, SetupError> {
        self.declare(name, false)
    }

    /// Declare a property with old/older history.
    pub fn declare_stateful_property(&mut self, name: &str) -> Result<DeclaredProp, SetupError> {
        self.declare(name, true)
    }

    /// Finish building and return the recorded couplings.
    pub fn finish(self) -> Couplings {
        self.couplings
    }
}
