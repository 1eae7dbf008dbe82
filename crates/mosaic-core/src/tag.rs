//! Tags, [`TagSet`] routing lists, and the [`TagRegistry`].
//!
//! A tag names one global residual vector or Jacobian matrix. Every
//! contributor declares the set of tags its local contribution belongs to;
//! the router adds the contribution to exactly those containers.

use std::collections::{btree_set, BTreeSet};

use indexmap::IndexMap;

use crate::id::TagId;

/// Whether a tag addresses a residual vector or a Jacobian matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// A global residual vector.
    Vector,
    /// A global Jacobian (or preconditioning) matrix.
    Matrix,
}

impl std::fmt::Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vector => f.write_str("vector"),
            Self::Matrix => f.write_str("matrix"),
        }
    }
}

/// The tags one contribution is routed to.
///
/// A contributor rarely feeds more than a handful of containers. Iteration
/// is in ascending id order, which is registration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    tags: BTreeSet<TagId>,
}

impl TagSet {
    /// No tags.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Route to `tag` as well. Adding a tag twice keeps one entry.
    pub fn insert(&mut self, tag: TagId) {
        self.tags.insert(tag);
    }

    /// Returns `true` if contributions are routed to `tag`.
    pub fn contains(&self, tag: TagId) -> bool {
        self.tags.contains(&tag)
    }

    /// Returns `true` if nothing is routed anywhere.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Tags in ascending id order.
    pub fn iter(&self) -> TagSetIter<'_> {
        TagSetIter(self.tags.iter())
    }
}

impl FromIterator<TagId> for TagSet {
    fn from_iter<I: IntoIterator<Item = TagId>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = TagId;
    type IntoIter = TagSetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`TagSet`].
#[derive(Clone, Debug)]
pub struct TagSetIter<'a>(btree_set::Iter<'a, TagId>);

impl Iterator for TagSetIter<'_> {
    type Item = TagId;

    fn next(&mut self) -> Option<TagId> {
        self.0.next().copied()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

// ── TagRegistry ────────────────────────────────────────────────────

/// Name of the default residual vector tag, registered by [`TagRegistry::new`].
pub const RESIDUAL_TAG: &str = "residual";
/// Name of the default Jacobian matrix tag, registered by [`TagRegistry::new`].
pub const JACOBIAN_TAG: &str = "jacobian";

/// Interns tag names and records their kind.
///
/// Tag ids are dense and assigned in registration order. Registering an
/// existing name with the same kind returns the existing id.
#[derive(Clone, Debug)]
pub struct TagRegistry {
    tags: IndexMap<String, TagKind>,
}

impl TagRegistry {
    /// A registry holding the two default tags
    /// ([`RESIDUAL_TAG`] = `TagId(0)`, [`JACOBIAN_TAG`] = `TagId(1)`).
    pub fn new() -> Self {
        let mut tags = IndexMap::new();
        tags.insert(RESIDUAL_TAG.to_string(), TagKind::Vector);
        tags.insert(JACOBIAN_TAG.to_string(), TagKind::Matrix);
        Self { tags }
    }

    /// Register (or look up) a tag of the given kind.
    ///
    /// Returns `Err(existing_kind)` if the name is already registered with
    /// the other kind.
    pub fn register(&mut self, name: &str, kind: TagKind) -> Result<TagId, TagKind> {
        if let Some((idx, _, existing)) = self.tags.get_full(name) {
            if *existing != kind {
                return Err(*existing);
            }
            return Ok(TagId(idx as u32));
        }
        let (idx, _) = self.tags.insert_full(name.to_string(), kind);
        Ok(TagId(idx as u32))
    }

    /// Look up a tag by name.
    pub fn lookup(&self, name: &str) -> Option<(TagId, TagKind)> {
        self.tags
            .get_full(name)
            .map(|(idx, _, kind)| (TagId(idx as u32), *kind))
    }

    /// Name of a registered tag.
    pub fn name(&self, tag: TagId) -> Option<&str> {
        self.tags.get_index(tag.0 as usize).map(|(n, _)| n.as_str())
    }

    /// Kind of a registered tag.
    pub fn kind(&self, tag: TagId) -> Option<TagKind> {
        self.tags.get_index(tag.0 as usize).map(|(_, k)| *k)
    }

    /// All tags of one kind, in registration order.
    pub fn tags_of_kind(&self, kind: TagKind) -> TagSet {
        self.tags
            .values()
            .enumerate()
            .filter(|(_, k)| **k == kind)
            .map(|(i, _)| TagId(i as u32))
            .collect()
    }

    /// Number of registered tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Always `false`: the default tags are registered at construction.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn iteration_is_sorted_and_deduplicated(ids in prop::collection::vec(0u32..128, 0..32)) {
            let set: TagSet = ids.iter().copied().map(TagId).collect();
            let mut expected = ids.clone();
            expected.sort_unstable();
            expected.dedup();
            let got: Vec<u32> = set.iter().map(|t| t.0).collect();
            prop_assert_eq!(set.len(), expected.len());
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn insertion_order_does_not_matter(ids in prop::collection::vec(0u32..128, 0..32)) {
            let forward: TagSet = ids.iter().copied().map(TagId).collect();
            let mut backward = TagSet::empty();
            for &id in ids.iter().rev() {
                backward.insert(TagId(id));
            }
            prop_assert_eq!(forward, backward);
        }
    }

    #[test]
    fn routes_only_to_inserted_tags() {
        let mut set = TagSet::empty();
        assert!(set.is_empty());
        set.insert(TagId(3));
        set.insert(TagId(3));
        assert!(set.contains(TagId(3)));
        assert!(!set.contains(TagId(0)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn registry_has_default_tags() {
        let reg = TagRegistry::new();
        assert_eq!(reg.lookup(RESIDUAL_TAG), Some((TagId(0), TagKind::Vector)));
        assert_eq!(reg.lookup(JACOBIAN_TAG), Some((TagId(1), TagKind::Matrix)));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn registry_register_is_idempotent_per_kind() {
        let mut reg = TagRegistry::new();
        let a = reg.register("time", TagKind::Vector).unwrap();
        let b = reg.register("time", TagKind::Vector).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.register("time", TagKind::Matrix), Err(TagKind::Vector));
        assert_eq!(reg.name(a), Some("time"));
    }

    #[test]
    fn tags_of_kind_filters() {
        let mut reg = TagRegistry::new();
        let pc = reg.register("preconditioner", TagKind::Matrix).unwrap();
        let m = reg.tags_of_kind(TagKind::Matrix);
        assert!(m.contains(TagId(1)));
        assert!(m.contains(pc));
        assert!(!m.contains(TagId(0)));
    }
}
