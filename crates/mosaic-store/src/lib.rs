//! Temporal state storage for Mosaic.
//!
//! Two stores, both with current/old/older snapshot chains that rotate
//! once per accepted time step:
//!
//! - [`StatefulStore`]: per-quadrature-point material property histories,
//!   with current values staged per evaluation and committed on success.
//! - [`SolutionHistory`]: nodal value chains for variables.
//!
//! Both expose their contents as [`SnapshotEntry`] values for external
//! checkpoint and restore.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod history;
pub mod snapshot;
pub mod state;
pub mod store;

pub use error::StoreError;
pub use history::SolutionHistory;
pub use snapshot::{SnapshotEntry, VALUE_PROPERTY};
pub use state::State;
pub use store::{StagedWrites, StatefulStore};
