//! Type descriptors and capability-typed object handles.

use std::fmt;
use std::sync::Arc;

use mosaic_core::{ParameterSet, SetupError, Subsystem};
use mosaic_kernel::{
    AuxContributor, BuildContext, CapabilitySet, Contributor, Material, NodalContributor,
    VariableKind,
};

/// Which implementation strategy a descriptor provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Hand-coded derivatives (or none).
    Manual,
    /// Derivatives from dual-number arithmetic.
    Ad,
}

/// What a variable type's constructor produces.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableSpec {
    /// Nonlinear or auxiliary.
    pub kind: VariableKind,
    /// Value every snapshot starts from.
    pub initial_condition: f64,
}

/// A constructed object, tagged by the interface it implements.
pub enum ObjectHandle {
    /// A nonlinear or auxiliary variable.
    Variable(VariableSpec),
    /// An element-interior contributor.
    Kernel(Box<dyn Contributor>),
    /// A boundary-side contributor.
    IntegratedBc(Box<dyn Contributor>),
    /// A boundary-node contributor.
    NodalBc(Box<dyn NodalContributor>),
    /// A material property producer.
    Material(Box<dyn Material>),
    /// A nodal producer of auxiliary values.
    AuxKernel(Box<dyn AuxContributor>),
}

impl ObjectHandle {
    /// Short name of the handle kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Variable(_) => "variable",
            Self::Kernel(_) => "kernel",
            Self::IntegratedBc(_) => "integrated BC",
            Self::NodalBc(_) => "nodal BC",
            Self::Material(_) => "material",
            Self::AuxKernel(_) => "aux kernel",
        }
    }

    fn fits(&self, subsystem: Subsystem) -> bool {
        match self {
            Self::Variable(spec) => match spec.kind {
                VariableKind::Nonlinear => subsystem == Subsystem::Variables,
                VariableKind::Auxiliary => subsystem == Subsystem::AuxVariables,
            },
            Self::Kernel(_) => subsystem == Subsystem::Kernels,
            Self::IntegratedBc(_) | Self::NodalBc(_) => subsystem == Subsystem::BoundaryConditions,
            Self::Material(_) => subsystem == Subsystem::Materials,
            Self::AuxKernel(_) => subsystem == Subsystem::AuxKernels,
        }
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(spec) => f.debug_tuple("Variable").field(spec).finish(),
            other => write!(f, "ObjectHandle({})", other.kind_name()),
        }
    }
}

/// Builds one object from a [`BuildContext`].
pub type Constructor =
    Arc<dyn Fn(&mut BuildContext<'_>) -> Result<ObjectHandle, SetupError> + Send + Sync>;

/// Returns a type's own parameter schema, without the common parameters.
pub type SchemaFn = fn() -> ParameterSet;

/// Everything the registry knows about one type.
#[derive(Clone)]
pub struct TypeDescriptor {
    type_id: String,
    subsystem: Subsystem,
    capabilities: CapabilitySet,
    variant: Variant,
    schema: SchemaFn,
    ctor: Constructor,
}

impl TypeDescriptor {
    /// A manual-variant descriptor. The type id is assigned on
    /// registration.
    pub fn new<F>(
        subsystem: Subsystem,
        capabilities: CapabilitySet,
        schema: SchemaFn,
        ctor: F,
    ) -> Self
    where
        F: Fn(&mut BuildContext<'_>) -> Result<ObjectHandle, SetupError> + Send + Sync + 'static,
    {
        Self {
            type_id: String::new(),
            subsystem,
            capabilities,
            variant: Variant::Manual,
            schema,
            ctor: Arc::new(ctor),
        }
    }

    pub(crate) fn with_identity(mut self, type_id: &str, variant: Variant) -> Self {
        self.type_id = type_id.to_string();
        self.variant = variant;
        self
    }

    /// Registered type id.
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// Subsystem the type belongs to.
    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// Declared capabilities.
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Implementation variant.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// The type's own schema.
    pub fn own_schema(&self) -> ParameterSet {
        (self.schema)()
    }

    /// Invoke the constructor.
    ///
    /// Fails with `InvalidState` if the constructor returns a handle that
    /// does not belong to the descriptor's subsystem.
    pub fn construct(&self, ctx: &mut BuildContext<'_>) -> Result<ObjectHandle, SetupError> {
        let handle = (self.ctor)(ctx)?;
        if !handle.fits(self.subsystem) {
            return Err(SetupError::InvalidState {
                reason: format!(
                    "type '{}' built a {} for [{}]",
                    self.type_id,
                    handle.kind_name(),
                    self.subsystem
                ),
            });
        }
        Ok(handle)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_id", &self.type_id)
            .field("subsystem", &self.subsystem)
            .field("capabilities", &self.capabilities)
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}
