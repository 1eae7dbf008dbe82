//! Object subsystems.

use std::fmt;
use std::str::FromStr;

/// The subsystem an object record belongs to.
///
/// Object names are unique within a subsystem; the same name may be
/// reused across subsystems (a variable and a kernel both called `u`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subsystem {
    /// Nonlinear field unknowns.
    Variables,
    /// Auxiliary fields: coupled like variables but carry no DOFs.
    AuxVariables,
    /// Element-interior contributors.
    Kernels,
    /// Integrated (side) and nodal boundary contributors.
    BoundaryConditions,
    /// Material property producers.
    Materials,
    /// Nodal producers of auxiliary field values.
    AuxKernels,
}

impl Subsystem {
    /// All subsystems, in setup order.
    pub const ALL: [Subsystem; 6] = [
        Self::Variables,
        Self::AuxVariables,
        Self::Materials,
        Self::AuxKernels,
        Self::Kernels,
        Self::BoundaryConditions,
    ];

    /// Canonical input-block name (e.g. `"Kernels"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Variables => "Variables",
            Self::AuxVariables => "AuxVariables",
            Self::Kernels => "Kernels",
            Self::BoundaryConditions => "BCs",
            Self::Materials => "Materials",
            Self::AuxKernels => "AuxKernels",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subsystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Variables" => Ok(Self::Variables),
            "AuxVariables" => Ok(Self::AuxVariables),
            "Kernels" => Ok(Self::Kernels),
            "BCs" | "BoundaryConditions" => Ok(Self::BoundaryConditions),
            "Materials" => Ok(Self::Materials),
            "AuxKernels" => Ok(Self::AuxKernels),
            other => Err(format!("unknown subsystem '{other}'")),
        }
    }
}
