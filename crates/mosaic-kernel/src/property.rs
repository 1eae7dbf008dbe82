//! Material property declarations, consumption records, and per-element
//! property values.
//!
//! The [`PropertyRegistry`] is the material half of the coupling resolver.
//! Materials declare the properties they produce; any object may consume
//! them by name. Consumption is recorded even before the declarer has been
//! built, so objects may be created in any order within a setup task;
//! [`PropertyRegistry::resolve`] checks the records once everything exists.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use mosaic_core::{
    BlockId, CouplingKind, DependencyGraph, ProgrammerError, PropertyId, SetupError,
};
use mosaic_store::State;
use smallvec::SmallVec;

#[derive(Clone, Debug)]
struct Declarer {
    object: String,
    blocks: BTreeSet<BlockId>,
    stateful: bool,
}

#[derive(Clone, Debug)]
struct Consumer {
    object: String,
    blocks: BTreeSet<BlockId>,
    state: State,
    material: bool,
}

#[derive(Clone, Debug, Default)]
struct PropertyEntry {
    declarers: Vec<Declarer>,
    consumers: Vec<Consumer>,
}

/// Interns property names and records who declares and consumes them.
#[derive(Clone, Debug, Default)]
pub struct PropertyRegistry {
    entries: IndexMap<String, PropertyEntry>,
}

impl PropertyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, name: &str) -> (PropertyId, &mut PropertyEntry) {
        let entry = self.entries.entry(name.to_string());
        let id = PropertyId(entry.index() as u32);
        (id, entry.or_default())
    }

    /// Record `object` as producer of `name` on `blocks`.
    ///
    /// Repeated declarations by the same object are merged; stateful wins.
    pub fn declare(
        &mut self,
        name: &str,
        object: &str,
        blocks: &BTreeSet<BlockId>,
        stateful: bool,
    ) -> PropertyId {
        let (id, entry) = self.intern(name);
        match entry.declarers.iter_mut().find(|d| d.object == object) {
            Some(d) => d.stateful |= stateful,
            None => entry.declarers.push(Declarer {
                object: object.to_string(),
                blocks: blocks.clone(),
                stateful,
            }),
        }
        id
    }

    /// Record `object` as a reader of `name` at `state`.
    ///
    /// `material` marks consumers that are themselves materials; only those
    /// take part in material ordering.
    pub fn consume(
        &mut self,
        name: &str,
        object: &str,
        blocks: &BTreeSet<BlockId>,
        state: State,
        material: bool,
    ) -> PropertyId {
        let (id, entry) = self.intern(name);
        let seen = entry
            .consumers
            .iter()
            .any(|c| c.object == object && c.state == state);
        if !seen {
            entry.consumers.push(Consumer {
                object: object.to_string(),
                blocks: blocks.clone(),
                state,
                material,
            });
        }
        id
    }

    /// Id of a name seen by either method.
    pub fn id(&self, name: &str) -> Option<PropertyId> {
        self.entries.get_index_of(name).map(|i| PropertyId(i as u32))
    }

    /// Name of an id.
    pub fn name(&self, id: PropertyId) -> Option<&str> {
        self.entries.get_index(id.index()).map(|(k, _)| k.as_str())
    }

    /// Returns `true` if any declarer asked for old/older history.
    pub fn is_stateful(&self, id: PropertyId) -> bool {
        self.entries
            .get_index(id.index())
            .is_some_and(|(_, e)| e.declarers.iter().any(|d| d.stateful))
    }

    /// First declarer of a property.
    pub fn owner(&self, id: PropertyId) -> Option<&str> {
        self.entries
            .get_index(id.index())
            .and_then(|(_, e)| e.declarers.first())
            .map(|d| d.object.as_str())
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no property has been named.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &str)> {
        self.entries
            .keys()
            .enumerate()
            .map(|(i, k)| (PropertyId(i as u32), k.as_str()))
    }

    /// Check every consumption record against the declarations.
    ///
    /// Fails on the first problem found, in property then consumer order:
    /// - two declarers of one property sharing a block,
    /// - a consumer block no declarer covers (`MissingCoupling`),
    /// - an old/older read of a non-stateful property.
    pub fn resolve(&self) -> Result<(), SetupError> {
        for (name, entry) in &self.entries {
            for (i, a) in entry.declarers.iter().enumerate() {
                for b in &entry.declarers[i + 1..] {
                    if let Some(block) = a.blocks.intersection(&b.blocks).next() {
                        return Err(SetupError::InvalidState {
                            reason: format!(
                                "property '{name}' is declared by both '{}' and '{}' \
                                 on block {block}",
                                a.object, b.object
                            ),
                        });
                    }
                }
            }
            let stateful = entry.declarers.iter().any(|d| d.stateful);
            for c in &entry.consumers {
                let covered = c
                    .blocks
                    .iter()
                    .all(|b| entry.declarers.iter().any(|d| d.blocks.contains(b)));
                if !covered {
                    return Err(SetupError::MissingCoupling {
                        object: c.object.clone(),
                        name: name.clone(),
                        kind: CouplingKind::MaterialProperty,
                    });
                }
                if c.state != State::Current && !stateful {
                    return Err(ProgrammerError::StatefulAccessWithoutDeclaration {
                        object: c.object.clone(),
                        property: name.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Evaluation order of `materials` (given in creation order).
    ///
    /// A material reading another's current-state property on a shared
    /// block runs after it. Old/older reads add no edge. Unordered
    /// materials keep creation order.
    pub fn material_order(&self, materials: &[&str]) -> Result<Vec<String>, SetupError> {
        let mut graph = DependencyGraph::new();
        for m in materials {
            graph.add_node(m.to_string());
        }
        for entry in self.entries.values() {
            for c in entry
                .consumers
                .iter()
                .filter(|c| c.material && c.state == State::Current)
            {
                for d in &entry.declarers {
                    if !d.blocks.is_disjoint(&c.blocks) {
                        graph.add_edge(d.object.clone(), c.object.clone());
                    }
                }
            }
        }
        let order = graph
            .sort()
            .map_err(|e| SetupError::CyclicDependency {
                context: "materials".to_string(),
                members: e.members,
            })?;
        log::debug!("material order: {order:?}");
        Ok(order)
    }
}

fn slot(state: State) -> usize {
    match state {
        State::Current => 0,
        State::Old => 1,
        State::Older => 2,
    }
}

/// Property values for the quadrature points of one element.
///
/// Current values are filled by materials as they run. Old/older values
/// of stateful properties are loaded from the store before any material
/// runs.
#[derive(Clone, Debug, Default)]
pub struct PropertyValues {
    values: Vec<[Vec<f64>; 3]>,
    n_qp: usize,
}

impl PropertyValues {
    /// Size for `n_props` properties at `n_qp` points, all zero.
    pub fn reset(&mut self, n_props: usize, n_qp: usize) {
        self.values.resize_with(n_props, Default::default);
        self.n_qp = n_qp;
        for states in &mut self.values {
            for v in states.iter_mut() {
                v.clear();
                v.resize(n_qp, 0.0);
            }
        }
    }

    /// One value.
    pub fn get(&self, id: PropertyId, state: State, qp: usize) -> f64 {
        self.values
            .get(id.index())
            .and_then(|s| s[slot(state)].get(qp))
            .copied()
            .unwrap_or(0.0)
    }

    /// All values of one state.
    pub fn state(&self, id: PropertyId, state: State) -> &[f64] {
        self.values
            .get(id.index())
            .map(|s| s[slot(state)].as_slice())
            .unwrap_or(&[])
    }

    /// Overwrite one state from stored values.
    pub fn load(&mut self, id: PropertyId, state: State, values: &[f64]) {
        if let Some(s) = self.values.get_mut(id.index()) {
            let dst = &mut s[slot(state)];
            let n = dst.len().min(values.len());
            dst[..n].copy_from_slice(&values[..n]);
        }
    }

    /// Apply a writer's buffered values at `qp` to the current state, or to
    /// every state when `all_states` is set (stateful initialization).
    pub fn apply(&mut self, qp: usize, writer: &mut PropertyWriter, all_states: bool) {
        for (id, v) in writer.writes.drain(..) {
            if let Some(s) = self.values.get_mut(id.index()) {
                let targets = if all_states { 0..3 } else { 0..1 };
                for t in targets {
                    if let Some(x) = s[t].get_mut(qp) {
                        *x = v;
                    }
                }
            }
        }
    }

    /// Quadrature points per property.
    pub fn n_qp(&self) -> usize {
        self.n_qp
    }
}

/// A property a material declared and may write.
///
/// Only obtainable from
/// [`BuildContext::declare_property`](crate::BuildContext::declare_property),
/// so a material can write nothing it did not declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeclaredProp(pub(crate) PropertyId);

impl DeclaredProp {
    /// The property id.
    pub fn id(self) -> PropertyId {
        self.0
    }
}

/// Write buffer handed to a material for one quadrature point.
#[derive(Clone, Debug, Default)]
pub struct PropertyWriter {
    writes: SmallVec<[(PropertyId, f64); 4]>,
}

impl PropertyWriter {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current value of a declared property at this point.
    pub fn set(&mut self, prop: DeclaredProp, value: f64) {
        self.writes.push((prop.0, value));
    }

    /// Buffered values, in write order.
    pub fn writes(&self) -> &[(PropertyId, f64)] {
        &self.writes
    }
}
