//! Temporal state selectors.

use std::fmt;

/// Which snapshot of a time-dependent quantity to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum State {
    /// The value being computed in the current step.
    Current,
    /// The value at the end of the last accepted step.
    Old,
    /// The value at the end of the step before that.
    Older,
}

impl State {
    /// All states, newest first.
    pub const ALL: [State; 3] = [State::Current, State::Old, State::Older];

    /// Lower-case name used in checkpoint keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Old => "old",
            Self::Older => "older",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
