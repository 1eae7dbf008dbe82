//! Error types for the Mosaic framework.
//!
//! Organized by failure class:
//!
//! - [`SetupError`]: fatal, raised before any solve attempt.
//! - [`AssemblyError`] / [`AssemblyReport`]: soft, collected during an
//!   evaluation and surfaced once so the external solver may reject the step.
//! - [`ProgrammerError`]: a plugin violated its contract; fatal at first use.
//! - [`ParamError`] / [`ParamIssue`]: parameter lookups and schema validation.

use std::error::Error;
use std::fmt;

use crate::id::{BlockId, ElementId, NodeId};
use crate::params::ParamType;
use crate::subsystem::Subsystem;
use crate::tag::TagKind;

// ── Parameters ─────────────────────────────────────────────────────

/// Failure of a single parameter lookup or update.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamError {
    /// The name is not declared in the set.
    NotFound {
        /// The requested name.
        name: String,
    },
    /// The stored type differs from the requested type.
    TypeMismatch {
        /// Parameter name.
        name: String,
        /// The type the caller asked for.
        expected: ParamType,
        /// The type actually stored.
        found: ParamType,
    },
    /// The parameter is declared but holds no value.
    Unset {
        /// Parameter name.
        name: String,
    },
    /// A runtime update targeted a parameter not marked controllable.
    NotControllable {
        /// Parameter name.
        name: String,
    },
    /// A value lies outside the declared closed range.
    OutOfRange {
        /// Parameter name.
        name: String,
        /// The rejected value.
        value: f64,
        /// Lower bound.
        lo: f64,
        /// Upper bound.
        hi: f64,
    },
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "parameter '{name}' is not declared"),
            Self::TypeMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "parameter '{name}' has type {found}, requested as {expected}"
            ),
            Self::Unset { name } => write!(f, "parameter '{name}' has no value"),
            Self::NotControllable { name } => {
                write!(f, "parameter '{name}' is not controllable")
            }
            Self::OutOfRange {
                name,
                value,
                lo,
                hi,
            } => write!(f, "parameter '{name}' = {value} outside [{lo}, {hi}]"),
        }
    }
}

impl Error for ParamError {}

/// One itemized problem found when validating a parameter set.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamIssue {
    /// A required parameter was not supplied and has no default.
    Missing {
        /// Parameter name.
        name: String,
    },
    /// A supplied value has the wrong type.
    TypeMismatch {
        /// Parameter name.
        name: String,
        /// Declared type.
        expected: ParamType,
        /// Supplied type.
        found: ParamType,
    },
    /// A supplied real value lies outside the declared range.
    OutOfRange {
        /// Parameter name.
        name: String,
        /// The rejected value.
        value: f64,
        /// Lower bound.
        lo: f64,
        /// Upper bound.
        hi: f64,
    },
    /// A supplied name that the type's schema does not declare.
    Unknown {
        /// Parameter name.
        name: String,
    },
}

impl ParamIssue {
    /// The parameter this issue concerns.
    pub fn name(&self) -> &str {
        match self {
            Self::Missing { name }
            | Self::TypeMismatch { name, .. }
            | Self::OutOfRange { name, .. }
            | Self::Unknown { name } => name,
        }
    }
}

impl fmt::Display for ParamIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { name } => write!(f, "missing required parameter '{name}'"),
            Self::TypeMismatch {
                name,
                expected,
                found,
            } => write!(f, "parameter '{name}' expects {expected}, got {found}"),
            Self::OutOfRange {
                name,
                value,
                lo,
                hi,
            } => write!(f, "parameter '{name}' = {value} outside [{lo}, {hi}]"),
            Self::Unknown { name } => write!(f, "unknown parameter '{name}'"),
        }
    }
}

// ── Programmer errors ──────────────────────────────────────────────

/// A plugin author violated the contributor/material contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgrammerError {
    /// `old`/`older` access to a property whose declarer did not
    /// declare it stateful.
    StatefulAccessWithoutDeclaration {
        /// The object performing the access.
        object: String,
        /// The property name.
        property: String,
    },
    /// A tag was used as the wrong kind (a vector tag on a matrix
    /// contribution or vice versa).
    TagMismatch {
        /// The object that declared the tag.
        object: String,
        /// Tag name.
        tag: String,
        /// The kind the usage required.
        expected: TagKind,
    },
    /// A constructor used a capability its type did not register with.
    UndeclaredCapability {
        /// The object being built.
        object: String,
        /// The missing capability.
        capability: String,
    },
}

impl fmt::Display for ProgrammerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatefulAccessWithoutDeclaration { object, property } => write!(
                f,
                "'{object}' requested old state of property '{property}', \
                 which is not declared stateful"
            ),
            Self::TagMismatch {
                object,
                tag,
                expected,
            } => write!(f, "'{object}' used tag '{tag}' as a {expected} tag"),
            Self::UndeclaredCapability { object, capability } => write!(
                f,
                "'{object}' needs capability {capability}, which its type does not declare"
            ),
        }
    }
}

impl Error for ProgrammerError {}

// ── Setup errors ───────────────────────────────────────────────────

/// What kind of entity a coupling request names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CouplingKind {
    /// A nonlinear or auxiliary variable.
    Variable,
    /// A material property.
    MaterialProperty,
    /// A residual/Jacobian tag.
    Tag,
    /// A mesh block or boundary name.
    Region,
}

impl fmt::Display for CouplingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable => f.write_str("variable"),
            Self::MaterialProperty => f.write_str("material property"),
            Self::Tag => f.write_str("tag"),
            Self::Region => f.write_str("block/boundary"),
        }
    }
}

/// Fatal errors raised while building a problem.
///
/// Every variant identifies the offending object, task, or parameter.
/// No setup error is recovered from; the run halts before any solve.
#[derive(Clone, Debug, PartialEq)]
pub enum SetupError {
    /// Parameter validation failed for an object, itemized per parameter.
    ParameterValidation {
        /// Object name.
        object: String,
        /// Registered type id.
        type_id: String,
        /// Every issue found.
        issues: Vec<ParamIssue>,
    },
    /// A parameter lookup failed during construction.
    Parameter {
        /// Object name.
        object: String,
        /// The underlying failure.
        reason: ParamError,
    },
    /// No type registered under this id.
    UnknownType {
        /// Subsystem the record was filed under.
        subsystem: Subsystem,
        /// The unknown id.
        type_id: String,
    },
    /// A type id was registered twice.
    DuplicateType {
        /// The duplicated id.
        type_id: String,
    },
    /// Two objects in one subsystem share a name.
    DuplicateObject {
        /// Subsystem.
        subsystem: Subsystem,
        /// The duplicated name.
        name: String,
    },
    /// A record lists a type under the wrong subsystem.
    SubsystemMismatch {
        /// The type id.
        type_id: String,
        /// Subsystem of the record.
        requested: Subsystem,
        /// Subsystem the type was registered for.
        registered: Subsystem,
    },
    /// A coupled name resolves to nothing.
    MissingCoupling {
        /// The requesting object.
        object: String,
        /// The unresolved name.
        name: String,
        /// What the name was expected to be.
        kind: CouplingKind,
    },
    /// A dependency cycle among actions, tasks, or materials.
    CyclicDependency {
        /// Where the cycle was found (e.g. `"task 'add_kernel'"`).
        context: String,
        /// Names of the nodes on or between cycles, in declaration order.
        members: Vec<String>,
    },
    /// An action declared membership in an unregistered task.
    UnknownTask {
        /// The task name.
        task: String,
        /// The declaring action.
        action: String,
    },
    /// A plugin contract violation detected during setup.
    Programmer(ProgrammerError),
    /// Invalid problem configuration.
    Config {
        /// Description of the invalid value.
        reason: String,
    },
    /// An operation was invoked in the wrong setup phase.
    InvalidState {
        /// Description of the phase violation.
        reason: String,
    },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParameterValidation {
                object,
                type_id,
                issues,
            } => {
                write!(f, "invalid parameters for '{object}' ({type_id}): ")?;
                for (i, issue) in issues.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{issue}")?;
                }
                Ok(())
            }
            Self::Parameter { object, reason } => write!(f, "'{object}': {reason}"),
            Self::UnknownType { subsystem, type_id } => {
                write!(f, "unknown type '{type_id}' in [{subsystem}]")
            }
            Self::DuplicateType { type_id } => {
                write!(f, "type '{type_id}' is already registered")
            }
            Self::DuplicateObject { subsystem, name } => {
                write!(f, "[{subsystem}] already has an object named '{name}'")
            }
            Self::SubsystemMismatch {
                type_id,
                requested,
                registered,
            } => write!(
                f,
                "type '{type_id}' belongs to [{registered}], not [{requested}]"
            ),
            Self::MissingCoupling { object, name, kind } => {
                write!(f, "'{object}' couples to unknown {kind} '{name}'")
            }
            Self::CyclicDependency { context, members } => {
                write!(f, "dependency cycle in {context}: {}", members.join(" -> "))
            }
            Self::UnknownTask { task, action } => {
                write!(f, "action '{action}' belongs to unregistered task '{task}'")
            }
            Self::Programmer(e) => write!(f, "{e}"),
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::InvalidState { reason } => write!(f, "invalid state: {reason}"),
        }
    }
}

impl Error for SetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parameter { reason, .. } => Some(reason),
            Self::Programmer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProgrammerError> for SetupError {
    fn from(e: ProgrammerError) -> Self {
        Self::Programmer(e)
    }
}

// ── Assembly errors ────────────────────────────────────────────────

/// Where in the mesh an assembly error occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    /// Element interior.
    Element(ElementId),
    /// A boundary side of an element.
    Side(ElementId, u8),
    /// A boundary node.
    Node(NodeId),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(e) => write!(f, "element {e}"),
            Self::Side(e, s) => write!(f, "element {e} side {s}"),
            Self::Node(n) => write!(f, "node {n}"),
        }
    }
}

/// Which kind of local block was being accumulated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    /// Local residual entries.
    Residual,
    /// Local Jacobian entries.
    Jacobian,
    /// Nodal values of an auxiliary variable.
    AuxValue,
}

/// A soft failure during one evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssemblyError {
    /// A contributor produced NaN or infinity. The offending local block is
    /// not accumulated.
    NonFiniteContribution {
        /// Contributor name.
        object: String,
        /// Where it happened.
        location: Location,
        /// Residual or Jacobian block.
        target: Target,
    },
    /// A contributor is active on an element of a block where its
    /// variable is not defined.
    RestrictionMismatch {
        /// Contributor name.
        object: String,
        /// The element visited.
        element: ElementId,
        /// The element's block.
        block: BlockId,
    },
}

impl AssemblyError {
    fn sort_key(&self) -> (Location, &str, u8) {
        match self {
            Self::NonFiniteContribution {
                object,
                location,
                target,
            } => (*location, object, *target as u8),
            Self::RestrictionMismatch {
                object, element, ..
            } => (Location::Element(*element), object, 3),
        }
    }
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFiniteContribution {
                object,
                location,
                target,
            } => {
                let what = match target {
                    Target::Residual => "residual",
                    Target::Jacobian => "jacobian",
                    Target::AuxValue => "aux value",
                };
                write!(f, "'{object}' produced a non-finite {what} at {location}")
            }
            Self::RestrictionMismatch {
                object,
                element,
                block,
            } => write!(
                f,
                "'{object}' visited element {element} on block {block} \
                 where its variable is undefined"
            ),
        }
    }
}

impl Error for AssemblyError {}

/// All assembly errors of one evaluation, in deterministic order.
///
/// Ordered by location, then object name, then target, so the report is
/// identical whatever the worker count or element partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblyReport {
    errors: Vec<AssemblyError>,
}

impl AssemblyReport {
    /// Merge per-worker error lists into one sorted, deduplicated report.
    pub fn new(mut errors: Vec<AssemblyError>) -> Self {
        errors.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        errors.dedup();
        Self { errors }
    }

    /// The errors, sorted.
    pub fn errors(&self) -> &[AssemblyError] {
        &self.errors
    }

    /// Number of errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if no errors were collected.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AssemblyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} assembly error(s)", self.errors.len())?;
        if let Some(first) = self.errors.first() {
            write!(f, ", first: {first}")?;
        }
        Ok(())
    }
}

impl Error for AssemblyReport {}
