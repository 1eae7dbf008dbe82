//! Store-specific error types.

use std::error::Error;
use std::fmt;

use mosaic_core::PropertyId;

use crate::state::State;

/// Errors that can occur during store operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// A `PropertyId` that is not declared in the store.
    UnknownProperty {
        /// The unrecognised property.
        property: PropertyId,
    },
    /// The property exists but was not declared stateful, so it has no
    /// stored history.
    NotStateful {
        /// Property name.
        name: String,
    },
    /// Storage has not been allocated yet (no element layout).
    NotAllocated,
    /// Storage was already allocated; the layout is fixed once set.
    AlreadyAllocated,
    /// An `(element, qp)` slot outside the allocated layout.
    SlotOutOfRange {
        /// Element index.
        element: u32,
        /// Quadrature point.
        qp: usize,
    },
    /// A checkpoint entry names nothing in the store.
    UnknownEntry {
        /// Object name.
        object: String,
        /// Property name.
        property: String,
        /// Snapshot state.
        state: State,
    },
    /// A checkpoint entry has the wrong length.
    SizeMismatch {
        /// Object name.
        object: String,
        /// Property name.
        property: String,
        /// Expected number of values.
        expected: usize,
        /// Provided number of values.
        found: usize,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProperty { property } => write!(f, "unknown property: {property}"),
            Self::NotStateful { name } => write!(f, "property '{name}' is not stateful"),
            Self::NotAllocated => write!(f, "stateful storage not allocated"),
            Self::AlreadyAllocated => write!(f, "stateful storage already allocated"),
            Self::SlotOutOfRange { element, qp } => {
                write!(f, "no stateful slot for element {element} qp {qp}")
            }
            Self::UnknownEntry {
                object,
                property,
                state,
            } => write!(f, "no checkpoint entry {object}/{property}/{state}"),
            Self::SizeMismatch {
                object,
                property,
                expected,
                found,
            } => write!(
                f,
                "checkpoint entry {object}/{property}: expected {expected} values, got {found}"
            ),
        }
    }
}

impl Error for StoreError {}
