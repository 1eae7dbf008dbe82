//! Parameters every object of a subsystem accepts.

use mosaic_core::{ParamType, ParameterSet, Subsystem, JACOBIAN_TAG, RESIDUAL_TAG};

fn tag_params(p: &mut ParameterSet) {
    p.add_param(
        "vector_tags",
        vec![RESIDUAL_TAG],
        "Vector tags the residual contribution is accumulated into",
    )
    .add_param(
        "matrix_tags",
        vec![JACOBIAN_TAG],
        "Matrix tags the Jacobian contribution is accumulated into",
    )
    .add_optional_param(
        "extra_vector_tags",
        ParamType::StrVec,
        "Additional vector tags",
    )
    .add_optional_param(
        "extra_matrix_tags",
        ParamType::StrVec,
        "Additional matrix tags",
    );
}

/// The implicit schema shared by every type in `subsystem`.
///
/// - Variables, auxiliary variables, and materials: `block`.
/// - Kernels: `block`, `variable`, and the tag lists.
/// - Boundary conditions: `boundary` (required), `variable`, and the tag
///   lists.
/// - Aux kernels: `block`, `variable`, and `execute_on`.
pub fn common_params(subsystem: Subsystem) -> ParameterSet {
    let mut p = ParameterSet::new();
    match subsystem {
        Subsystem::Variables | Subsystem::AuxVariables | Subsystem::Materials => {
            p.add_optional_param("block", ParamType::StrVec, "Blocks the object is active on");
        }
        Subsystem::Kernels => {
            p.add_optional_param("block", ParamType::StrVec, "Blocks the object is active on")
                .add_required_param("variable", ParamType::Str, "The variable this object acts on");
            tag_params(&mut p);
        }
        Subsystem::BoundaryConditions => {
            p.add_required_param(
                "boundary",
                ParamType::StrVec,
                "Boundaries the object is active on",
            )
            .add_required_param("variable", ParamType::Str, "The variable this object acts on");
            tag_params(&mut p);
        }
        Subsystem::AuxKernels => {
            p.add_optional_param("block", ParamType::StrVec, "Blocks the object is active on")
                .add_required_param("variable", ParamType::Str, "The auxiliary variable computed")
                .add_param(
                    "execute_on",
                    vec![EXEC_LINEAR, EXEC_TIMESTEP_END],
                    "When the values are computed: initial, linear, timestep_end",
                );
        }
    }
    p
}

/// `execute_on` flag: once, when the problem becomes ready.
pub const EXEC_INITIAL: &str = "initial";
/// `execute_on` flag: before every evaluation.
pub const EXEC_LINEAR: &str = "linear";
/// `execute_on` flag: when a step is accepted, before histories rotate.
pub const EXEC_TIMESTEP_END: &str = "timestep_end";
