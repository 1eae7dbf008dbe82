//! Per-quadrature-point storage for stateful material properties.
//!
//! Every declared property gets a [`PropertyId`] in declaration order.
//! Properties declared stateful additionally get current/old/older arrays
//! laid out element-major: element `e` owns the slots
//! `offsets[e]..offsets[e + 1]`, one per quadrature point.
//!
//! The lifecycle is:
//! 1. `declare()` every property (setup, single-threaded)
//! 2. `allocate()` once the per-element quadrature counts are known
//! 3. `initialize()` each element's slots (all three states get the value)
//! 4. Evaluations read old/older through [`StatefulStore::values`] and stage
//!    current values in a [`StagedWrites`]; `commit()` applies them after a
//!    successful evaluation.
//! 5. `shift()` on an accepted step, `restore()` on a rejected one.

use indexmap::IndexMap;
use mosaic_core::{ElementId, PropertyId};

use crate::error::StoreError;
use crate::snapshot::SnapshotEntry;
use crate::state::State;

#[derive(Clone, Debug)]
struct PropertyInfo {
    owner: String,
    stateful: bool,
}

#[derive(Clone, Debug)]
struct StateArrays {
    current: Vec<f64>,
    old: Vec<f64>,
    older: Vec<f64>,
}

impl StateArrays {
    fn zeroed(n: usize) -> Self {
        Self {
            current: vec![0.0; n],
            old: vec![0.0; n],
            older: vec![0.0; n],
        }
    }

    fn get(&self, state: State) -> &[f64] {
        match state {
            State::Current => &self.current,
            State::Old => &self.old,
            State::Older => &self.older,
        }
    }

    fn get_mut(&mut self, state: State) -> &mut Vec<f64> {
        match state {
            State::Current => &mut self.current,
            State::Old => &mut self.old,
            State::Older => &mut self.older,
        }
    }
}

/// Current-state values produced by one worker during one evaluation.
///
/// Held aside until the evaluation as a whole succeeds; a rejected or
/// cancelled evaluation simply drops them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StagedWrites {
    writes: Vec<(PropertyId, ElementId, Vec<f64>)>,
}

impl StagedWrites {
    /// No staged writes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the current values of one property on one element.
    pub fn push(&mut self, property: PropertyId, element: ElementId, values: Vec<f64>) {
        self.writes.push((property, element, values));
    }

    /// Append another worker's writes.
    pub fn extend(&mut self, other: StagedWrites) {
        self.writes.extend(other.writes);
    }

    /// Number of staged element blocks.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Returns `true` if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// The stateful material property store.
#[derive(Clone, Debug, Default)]
pub struct StatefulStore {
    properties: IndexMap<String, PropertyInfo>,
    offsets: Option<Vec<usize>>,
    arrays: Vec<Option<StateArrays>>,
    initialized: Vec<bool>,
}

impl StatefulStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property, returning its id.
    ///
    /// Declaring an existing name returns the existing id; the property
    /// becomes stateful if any declaration asks for it. The first
    /// declarer is recorded as the owner for checkpoint keys.
    pub fn declare(
        &mut self,
        name: &str,
        owner: &str,
        stateful: bool,
    ) -> Result<PropertyId, StoreError> {
        if self.offsets.is_some() {
            return Err(StoreError::AlreadyAllocated);
        }
        let entry = self.properties.entry(name.to_string());
        let idx = entry.index();
        let info = entry.or_insert_with(|| PropertyInfo {
            owner: owner.to_string(),
            stateful: false,
        });
        info.stateful |= stateful;
        Ok(PropertyId(idx as u32))
    }

    /// Look up a property by name.
    pub fn id(&self, name: &str) -> Option<PropertyId> {
        self.properties
            .get_index_of(name)
            .map(|i| PropertyId(i as u32))
    }

    /// Name of a property.
    pub fn name(&self, id: PropertyId) -> Option<&str> {
        self.properties
            .get_index(id.index())
            .map(|(n, _)| n.as_str())
    }

    /// Returns `true` if the property is stateful.
    pub fn is_stateful(&self, id: PropertyId) -> bool {
        self.properties
            .get_index(id.index())
            .is_some_and(|(_, p)| p.stateful)
    }

    /// Number of declared properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns `true` if no properties are declared.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Returns `true` if any declared property is stateful.
    pub fn has_stateful(&self) -> bool {
        self.properties.values().any(|p| p.stateful)
    }

    /// Fix the element layout and allocate history arrays.
    ///
    /// `qp_counts[e]` is the number of quadrature points of element `e`.
    pub fn allocate(&mut self, qp_counts: &[usize]) -> Result<(), StoreError> {
        if self.offsets.is_some() {
            return Err(StoreError::AlreadyAllocated);
        }
        let mut offsets = Vec::with_capacity(qp_counts.len() + 1);
        let mut total = 0;
        offsets.push(0);
        for &n in qp_counts {
            total += n;
            offsets.push(total);
        }
        self.arrays = self
            .properties
            .values()
            .map(|p| p.stateful.then(|| StateArrays::zeroed(total)))
            .collect();
        self.initialized = vec![false; qp_counts.len()];
        self.offsets = Some(offsets);
        Ok(())
    }

    /// Returns `true` once [`allocate`](Self::allocate) has run.
    pub fn is_allocated(&self) -> bool {
        self.offsets.is_some()
    }

    fn range(&self, e: ElementId) -> Result<std::ops::Range<usize>, StoreError> {
        let offsets = self.offsets.as_ref().ok_or(StoreError::NotAllocated)?;
        match (offsets.get(e.index()), offsets.get(e.index() + 1)) {
            (Some(&a), Some(&b)) => Ok(a..b),
            _ => Err(StoreError::SlotOutOfRange {
                element: e.0,
                qp: 0,
            }),
        }
    }

    fn arrays(&self, id: PropertyId) -> Result<&StateArrays, StoreError> {
        match self.arrays.get(id.index()) {
            Some(Some(a)) => Ok(a),
            Some(None) => Err(StoreError::NotStateful {
                name: self.name(id).unwrap_or_default().to_string(),
            }),
            None if self.offsets.is_none() => Err(StoreError::NotAllocated),
            None => Err(StoreError::UnknownProperty { property: id }),
        }
    }

    fn arrays_mut(&mut self, id: PropertyId) -> Result<&mut StateArrays, StoreError> {
        if self.offsets.is_none() {
            return Err(StoreError::NotAllocated);
        }
        let name = self.name(id).map(str::to_string);
        match self.arrays.get_mut(id.index()) {
            Some(Some(a)) => Ok(a),
            Some(None) => Err(StoreError::NotStateful {
                name: name.unwrap_or_default(),
            }),
            None => Err(StoreError::UnknownProperty { property: id }),
        }
    }

    /// The per-qp values of one property on one element.
    pub fn values(&self, id: PropertyId, state: State, e: ElementId) -> Result<&[f64], StoreError> {
        let range = self.range(e)?;
        Ok(&self.arrays(id)?.get(state)[range])
    }

    /// Set all three states of one element's slots to `values`.
    pub fn initialize(
        &mut self,
        id: PropertyId,
        e: ElementId,
        values: &[f64],
    ) -> Result<(), StoreError> {
        let range = self.range(e)?;
        if values.len() != range.len() {
            return Err(StoreError::SlotOutOfRange {
                element: e.0,
                qp: values.len(),
            });
        }
        let arrays = self.arrays_mut(id)?;
        for state in State::ALL {
            arrays.get_mut(state)[range.clone()].copy_from_slice(values);
        }
        Ok(())
    }

    /// Record that element `e` has been initialized.
    pub fn mark_initialized(&mut self, e: ElementId) {
        if let Some(flag) = self.initialized.get_mut(e.index()) {
            *flag = true;
        }
    }

    /// Returns `true` if element `e` has been initialized.
    pub fn is_initialized(&self, e: ElementId) -> bool {
        self.initialized.get(e.index()).copied().unwrap_or(false)
    }

    /// Apply staged current values.
    pub fn commit(&mut self, staged: &StagedWrites) -> Result<(), StoreError> {
        for (id, e, values) in &staged.writes {
            let range = self.range(*e)?;
            if values.len() != range.len() {
                return Err(StoreError::SlotOutOfRange {
                    element: e.0,
                    qp: values.len(),
                });
            }
            self.arrays_mut(*id)?.current[range].copy_from_slice(values);
        }
        Ok(())
    }

    /// Accepted step: `older ← old`, `old ← current` for every stateful
    /// property.
    pub fn shift(&mut self) {
        for arrays in self.arrays.iter_mut().flatten() {
            std::mem::swap(&mut arrays.older, &mut arrays.old);
            arrays.old.copy_from_slice(&arrays.current);
        }
        log::trace!("stateful store shifted");
    }

    /// Rejected step: `current ← old` for every stateful property.
    pub fn restore(&mut self) {
        for arrays in self.arrays.iter_mut().flatten() {
            arrays.current.copy_from_slice(&arrays.old);
        }
    }

    /// Every `(owner, property, state)` array, in declaration order then
    /// current/old/older.
    pub fn entries(&self) -> Vec<SnapshotEntry> {
        let mut out = Vec::new();
        for (i, (name, info)) in self.properties.iter().enumerate() {
            if let Some(Some(arrays)) = self.arrays.get(i) {
                for state in State::ALL {
                    out.push(SnapshotEntry {
                        object: info.owner.clone(),
                        property: name.clone(),
                        state,
                        values: arrays.get(state).to_vec(),
                    });
                }
            }
        }
        out
    }

    /// Check that `entry` names a stored array of the same length,
    /// returning the property's index.
    pub fn check_entry(&self, entry: &SnapshotEntry) -> Result<usize, StoreError> {
        let unknown = || StoreError::UnknownEntry {
            object: entry.object.clone(),
            property: entry.property.clone(),
            state: entry.state,
        };
        let idx = self
            .properties
            .get_index_of(&entry.property)
            .ok_or_else(unknown)?;
        if self.properties[idx].owner != entry.object {
            return Err(unknown());
        }
        let len = match self.arrays.get(idx) {
            Some(Some(a)) => a.get(entry.state).len(),
            _ => return Err(unknown()),
        };
        if len != entry.values.len() {
            return Err(StoreError::SizeMismatch {
                object: entry.object.clone(),
                property: entry.property.clone(),
                expected: len,
                found: entry.values.len(),
            });
        }
        Ok(idx)
    }

    /// Write one checkpoint entry back. Nothing changes on error.
    pub fn restore_entry(&mut self, entry: &SnapshotEntry) -> Result<(), StoreError> {
        let idx = self.check_entry(entry)?;
        if let Some(Some(arrays)) = self.arrays.get_mut(idx) {
            arrays.get_mut(entry.state).copy_from_slice(&entry.values);
        }
        Ok(())
    }
}
