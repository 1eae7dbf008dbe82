//! Current/old/older value chains for field unknowns.

use crate::state::State;

/// Three snapshots of a nodal value array.
///
/// `current` is written by the solver loop; [`advance`](Self::advance)
/// rotates on an accepted step and [`restore`](Self::restore) discards the
/// current values of a rejected one. Before any step, all three snapshots
/// hold the initial value.
#[derive(Clone, Debug, PartialEq)]
pub struct SolutionHistory {
    current: Vec<f64>,
    old: Vec<f64>,
    older: Vec<f64>,
}

impl SolutionHistory {
    /// `len` values, all three snapshots set to `init`.
    pub fn new(len: usize, init: f64) -> Self {
        Self::from_values(vec![init; len])
    }

    /// All three snapshots set to `values`.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            old: values.clone(),
            older: values.clone(),
            current: values,
        }
    }

    /// Number of values per snapshot.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Returns `true` if the history holds no values.
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Read one snapshot.
    pub fn get(&self, state: State) -> &[f64] {
        match state {
            State::Current => &self.current,
            State::Old => &self.old,
            State::Older => &self.older,
        }
    }

    /// Mutable access to one snapshot, used by checkpoint restore.
    pub fn get_mut(&mut self, state: State) -> &mut [f64] {
        match state {
            State::Current => &mut self.current,
            State::Old => &mut self.old,
            State::Older => &mut self.older,
        }
    }

    /// Current values.
    pub fn current(&self) -> &[f64] {
        &self.current
    }

    /// Mutable current values.
    pub fn current_mut(&mut self) -> &mut [f64] {
        &mut self.current
    }

    /// Accepted step: `older ← old`, `old ← current`.
    pub fn advance(&mut self) {
        std::mem::swap(&mut self.older, &mut self.old);
        self.old.copy_from_slice(&self.current);
    }

    /// Rejected step: `current ← old`.
    pub fn restore(&mut self) {
        self.current.copy_from_slice(&self.old);
    }
}
