//! Checkpoint enumeration.

use crate::state::State;

/// One `(object, property, state) → values` pair exposed for external
/// checkpoint and restore.
///
/// Variables appear with `object` = the variable name and `property` =
/// [`VALUE_PROPERTY`]. Serialization is left to the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotEntry {
    /// Owning object (variable or declaring material).
    pub object: String,
    /// Property name.
    pub property: String,
    /// Which temporal snapshot.
    pub state: State,
    /// The values, in the store's canonical slot order.
    pub values: Vec<f64>,
}

/// Property name under which variable values are enumerated.
pub const VALUE_PROPERTY: &str = "value";
