//! Problem setup and assembly for Mosaic.
//!
//! A [`Problem`] owns the variables, tags, objects, and stateful storage of
//! one simulation. It is normally built by [`build_problem`], which runs the
//! built-in setup [`tasks`] over an [`InputDeck`]:
//!
//! 1. variables, aux variables, materials, aux kernels, kernels, BCs are
//!    constructed (one instance per assembly thread);
//! 2. `resolve_coupling` checks every property and variable dependency,
//!    orders materials, and numbers the DOFs;
//! 3. `init_stateful` runs the `initial` aux kernels and seeds stateful
//!    material properties.
//!
//! After setup, [`Problem::evaluate`] fills any combination of tag vectors
//! and tag matrices from the current solution. Failed evaluations return
//! [`EvalFailure::Rejected`] with a deterministic report and leave all
//! state untouched, so the caller may cut the step and retry.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod assembly;
pub mod auxiliary;
pub mod builtin;
pub mod config;
pub mod dof;
pub mod error;
pub mod input;
pub mod metrics;
pub mod problem;
pub mod request;

pub use auxiliary::{ExecFlag, ExecuteOn};
pub use builtin::{
    build_problem, build_problem_in, build_problem_with, builtin_tasks, register_builtins,
    task_for, tasks, AddObjectAction, FinalizeAction,
};
pub use config::ProblemConfig;
pub use dof::DofMap;
pub use error::{EvalFailure, RuntimeError};
pub use input::{InputDeck, InputRecord};
pub use metrics::EvalMetrics;
pub use problem::{ObjectRecord, ObjectSlot, Phase, Problem};
pub use request::{CancelToken, EvalOutput, EvalRequest};
