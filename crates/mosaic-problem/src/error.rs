//! Errors raised after setup: by evaluations and by runtime mutators.

use std::error::Error;
use std::fmt;

use mosaic_core::{AssemblyReport, ParamError, ProgrammerError, Subsystem};
use mosaic_mesh::MeshError;
use mosaic_store::StoreError;

/// Why an evaluation produced no result.
///
/// `Rejected` is the soft failure the solver may react to by cutting the
/// step; the rest indicate misuse or a broken collaborator.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalFailure {
    /// One or more contributions were non-finite or misplaced.
    Rejected(AssemblyReport),
    /// The caller cancelled the evaluation.
    Cancelled,
    /// Setup has not finished.
    NotReady,
    /// No tag of this name is registered.
    UnknownTag {
        /// The requested name.
        tag: String,
    },
    /// A tag was requested as the wrong kind.
    Programmer(ProgrammerError),
    /// The mesh failed while being iterated.
    Mesh(MeshError),
    /// The stateful store failed while being read or committed.
    Store(StoreError),
}

impl fmt::Display for EvalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(report) => write!(f, "evaluation rejected: {report}"),
            Self::Cancelled => write!(f, "evaluation cancelled"),
            Self::NotReady => write!(f, "problem setup is not complete"),
            Self::UnknownTag { tag } => write!(f, "unknown tag '{tag}'"),
            Self::Programmer(e) => write!(f, "{e}"),
            Self::Mesh(e) => write!(f, "mesh error: {e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl Error for EvalFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Rejected(r) => Some(r),
            Self::Programmer(e) => Some(e),
            Self::Mesh(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MeshError> for EvalFailure {
    fn from(e: MeshError) -> Self {
        Self::Mesh(e)
    }
}

impl From<StoreError> for EvalFailure {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Failure of a runtime mutator (solution, aux values, controls,
/// checkpoints, time stepping).
#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeError {
    /// An input array has the wrong length.
    SizeMismatch {
        /// What was being written.
        what: String,
        /// Required length.
        expected: usize,
        /// Supplied length.
        found: usize,
    },
    /// No variable of this name (or of the required kind).
    UnknownVariable {
        /// The name.
        name: String,
    },
    /// No object of this name in the subsystem.
    UnknownObject {
        /// Subsystem searched.
        subsystem: Subsystem,
        /// The name.
        name: String,
    },
    /// A controllable-parameter update failed.
    Param(ParamError),
    /// A checkpoint entry could not be restored.
    Store(StoreError),
    /// A value outside its valid domain.
    InvalidValue {
        /// Description.
        reason: String,
    },
    /// Aux kernels produced non-finite values.
    Rejected(AssemblyReport),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeMismatch {
                what,
                expected,
                found,
            } => write!(f, "{what}: expected {expected} values, got {found}"),
            Self::UnknownVariable { name } => write!(f, "unknown variable '{name}'"),
            Self::UnknownObject { subsystem, name } => {
                write!(f, "no object '{name}' in [{subsystem}]")
            }
            Self::Param(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::InvalidValue { reason } => write!(f, "invalid value: {reason}"),
            Self::Rejected(report) => write!(f, "aux values rejected: {report}"),
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Param(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }
}
