//! Parsed input: the object records a front end hands to setup.

use mosaic_core::{ParameterSet, Subsystem, TagKind};

/// One object block of the input.
#[derive(Clone, Debug)]
pub struct InputRecord {
    /// Subsystem the object goes into.
    pub subsystem: Subsystem,
    /// Registered type id (`type = ...`).
    pub type_id: String,
    /// Object name, unique within the subsystem.
    pub name: String,
    /// User-supplied parameter values.
    pub params: ParameterSet,
}

impl InputRecord {
    /// A record with no parameters.
    pub fn new(subsystem: Subsystem, type_id: &str, name: &str) -> Self {
        Self {
            subsystem,
            type_id: type_id.to_string(),
            name: name.to_string(),
            params: ParameterSet::new(),
        }
    }

    /// Attach parameter values.
    pub fn with_params(mut self, params: ParameterSet) -> Self {
        self.params = params;
        self
    }
}

/// The whole input: extra tags plus object records in input order.
///
/// ```
/// use mosaic_core::{ParameterSet, Subsystem, TagKind};
/// use mosaic_problem::InputDeck;
///
/// let deck = InputDeck::new()
///     .tag("main", TagKind::Vector)
///     .object(Subsystem::Variables, "Variable", "u", ParameterSet::new());
/// assert_eq!(deck.records.len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InputDeck {
    /// Tags to register beyond `residual` and `jacobian`.
    pub tags: Vec<(String, TagKind)>,
    /// Object records, in input order.
    pub records: Vec<InputRecord>,
}

impl InputDeck {
    /// An empty deck.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a tag.
    pub fn tag(mut self, name: &str, kind: TagKind) -> Self {
        self.tags.push((name.to_string(), kind));
        self
    }

    /// Append an object record.
    pub fn object(
        mut self,
        subsystem: Subsystem,
        type_id: &str,
        name: &str,
        params: ParameterSet,
    ) -> Self {
        self.records
            .push(InputRecord::new(subsystem, type_id, name).with_params(params));
        self
    }

    /// Append a prepared record.
    pub fn push(&mut self, record: InputRecord) {
        self.records.push(record);
    }
}
