//! Dependency-ordered setup pipeline for Mosaic.
//!
//! Setup is a sequence of named [tasks](TaskGraph) (`add_variable`,
//! `add_kernel`, ...). [`Action`]s join one or more tasks and may ask to
//! run before or after other actions of the same task. The
//! [`ActionPipeline`] computes a deterministic order and runs each
//! action's [`mutate`](Action::mutate) once per task it belongs to.
//!
//! Execution is single-threaded and consumes the pipeline; running setup
//! again needs a fresh pipeline and a fresh target.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod action;
pub mod pipeline;
pub mod task;

pub use action::Action;
pub use pipeline::{ActionPipeline, Plan, PlanStep};
pub use task::TaskGraph;
