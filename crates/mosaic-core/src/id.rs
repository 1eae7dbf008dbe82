//! Strongly-typed identifiers.
//!
//! Every id is a transparent newtype over a `u32` index into the owning
//! table (variable list, tag registry, mesh element list, ...). Ids are
//! assigned sequentially at setup and never reused within a run.

use std::fmt;

/// Identifies a field unknown (nonlinear or auxiliary) within a problem.
///
/// `VariableId(n)` is the n-th variable added to the problem, counting
/// nonlinear and auxiliary variables in one sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub u32);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for VariableId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a global residual vector or Jacobian matrix target.
///
/// Vector and matrix tags share one id sequence; the kind of a tag is
/// recorded by the [`TagRegistry`](crate::TagRegistry).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(pub u32);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TagId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a mesh block (subdomain).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BlockId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a named boundary (side set and its node set).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundaryId(pub u32);

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BoundaryId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Index of an element in the mesh's canonical element ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

impl ElementId {
    /// The id as a `usize` index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ElementId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Index of a node in the mesh's canonical node ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The id as a `usize` index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a declared material property.
///
/// Assigned by the stateful property store in declaration order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub u32);

impl PropertyId {
    /// The id as a `usize` index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PropertyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
