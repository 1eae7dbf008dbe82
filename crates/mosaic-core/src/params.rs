//! The typed, named, validated [`ParameterSet`].
//!
//! A registered type publishes a *schema*: a `ParameterSet` whose entries
//! are declared with a type, an optional default, a required flag, and
//! optional range/private/controllable markers. User input arrives as a
//! loose bag of values (entries inserted with [`ParameterSet::insert`]
//! carry no declaration). The factory merges the bag into the schema and
//! calls [`ParameterSet::validate`], which itemizes every problem.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ParamError, ParamIssue};

// ── Values ─────────────────────────────────────────────────────────

/// The type of a parameter value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// `f64`.
    Real,
    /// `i64`.
    Int,
    /// `bool`.
    Bool,
    /// `String`.
    Str,
    /// `Vec<f64>`.
    RealVec,
    /// `Vec<String>`.
    StrVec,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Real => "Real",
            Self::Int => "Int",
            Self::Bool => "Bool",
            Self::Str => "Str",
            Self::RealVec => "RealVec",
            Self::StrVec => "StrVec",
        };
        f.write_str(s)
    }
}

/// A parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    /// A real number.
    Real(f64),
    /// An integer.
    Int(i64),
    /// A flag.
    Bool(bool),
    /// A string.
    Str(String),
    /// A list of reals.
    RealVec(Vec<f64>),
    /// A list of strings.
    StrVec(Vec<String>),
}

impl ParamValue {
    /// The type of this value.
    pub fn ty(&self) -> ParamType {
        match self {
            Self::Real(_) => ParamType::Real,
            Self::Int(_) => ParamType::Int,
            Self::Bool(_) => ParamType::Bool,
            Self::Str(_) => ParamType::Str,
            Self::RealVec(_) => ParamType::RealVec,
            Self::StrVec(_) => ParamType::StrVec,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        Self::RealVec(v)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        Self::StrVec(v)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(v: Vec<&str>) -> Self {
        Self::StrVec(v.into_iter().map(str::to_string).collect())
    }
}

/// Conversion out of a [`ParamValue`] for typed retrieval.
///
/// Conversions are exact: an `Int` value is never read as a `Real`.
pub trait FromParam: Sized {
    /// The parameter type this Rust type reads.
    const TYPE: ParamType;

    /// Extract the value, or `None` if the variant differs.
    fn from_param(value: &ParamValue) -> Option<Self>;
}

impl FromParam for f64 {
    const TYPE: ParamType = ParamType::Real;
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Real(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromParam for i64 {
    const TYPE: ParamType = ParamType::Int;
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromParam for bool {
    const TYPE: ParamType = ParamType::Bool;
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromParam for String {
    const TYPE: ParamType = ParamType::Str;
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromParam for Vec<f64> {
    const TYPE: ParamType = ParamType::RealVec;
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::RealVec(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromParam for Vec<String> {
    const TYPE: ParamType = ParamType::StrVec;
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::StrVec(v) => Some(v.clone()),
            _ => None,
        }
    }
}

// ── Controllable cells ─────────────────────────────────────────────

/// A shared handle to the live value of a controllable real parameter.
///
/// Every per-thread instance of an object holds a clone of the same cell;
/// an update through [`ParameterSet::set_controlled`] is visible to all of
/// them at their next read. Updates only happen between evaluations.
#[derive(Clone, Debug)]
pub struct ControlledReal(Arc<AtomicU64>);

impl ControlledReal {
    fn new(v: f64) -> Self {
        Self(Arc::new(AtomicU64::new(v.to_bits())))
    }

    /// Current value.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Release);
    }
}

// ── Entries ────────────────────────────────────────────────────────

#[derive(Debug)]
struct ParamEntry {
    ty: ParamType,
    value: Option<ParamValue>,
    /// `false` for values inserted into a loose input bag.
    declared: bool,
    required: bool,
    private: bool,
    doc: String,
    range: Option<(f64, f64)>,
    cell: Option<ControlledReal>,
}

impl ParamEntry {
    fn declared(ty: ParamType, value: Option<ParamValue>, required: bool, doc: &str) -> Self {
        Self {
            ty,
            value,
            declared: true,
            required,
            private: false,
            doc: doc.to_string(),
            range: None,
            cell: None,
        }
    }

    fn loose(value: ParamValue) -> Self {
        Self {
            ty: value.ty(),
            value: Some(value),
            declared: false,
            required: false,
            private: false,
            doc: String::new(),
            range: None,
            cell: None,
        }
    }

    fn assign(&mut self, value: ParamValue) {
        if let (Some(cell), ParamValue::Real(v)) = (&self.cell, &value) {
            cell.store(*v);
        }
        self.value = Some(value);
    }
}

impl Clone for ParamEntry {
    // A cloned set gets its own cells so two objects built from copies of
    // one set never observe each other's controlled updates.
    fn clone(&self) -> Self {
        Self {
            ty: self.ty,
            value: self.value.clone(),
            declared: self.declared,
            required: self.required,
            private: self.private,
            doc: self.doc.clone(),
            range: self.range,
            cell: self.cell.as_ref().map(|c| ControlledReal::new(c.get())),
        }
    }
}

#[derive(Clone, Debug)]
struct Deprecation {
    replacement: String,
    note: String,
}

// ── ParameterSet ───────────────────────────────────────────────────

/// Typed, named configuration for one object.
///
/// Entries keep their declaration order, which is also the order of
/// [`validate`](Self::validate) issues and [`names`](Self::names).
#[derive(Clone, Debug, Default)]
pub struct ParameterSet {
    entries: IndexMap<String, ParamEntry>,
    deprecated: IndexMap<String, Deprecation>,
}

impl ParameterSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Declaration ────────────────────────────────────────────

    /// Declare a parameter with a default value.
    pub fn add_param(
        &mut self,
        name: &str,
        default: impl Into<ParamValue>,
        doc: &str,
    ) -> &mut Self {
        let value = default.into();
        let ty = value.ty();
        self.entries
            .insert(name.to_string(), ParamEntry::declared(ty, Some(value), false, doc));
        self
    }

    /// Declare a parameter that must be supplied by the user.
    pub fn add_required_param(&mut self, name: &str, ty: ParamType, doc: &str) -> &mut Self {
        self.entries
            .insert(name.to_string(), ParamEntry::declared(ty, None, true, doc));
        self
    }

    /// Declare a parameter with neither a default nor a requirement.
    pub fn add_optional_param(&mut self, name: &str, ty: ParamType, doc: &str) -> &mut Self {
        self.entries
            .insert(name.to_string(), ParamEntry::declared(ty, None, false, doc));
        self
    }

    /// Restrict a declared `Real` parameter to the closed range `[lo, hi]`.
    pub fn range(&mut self, name: &str, lo: f64, hi: f64) -> &mut Self {
        match self.entries.get_mut(name) {
            Some(e) if e.declared && e.ty == ParamType::Real => e.range = Some((lo, hi)),
            _ => log::warn!("range() ignored: '{name}' is not a declared Real parameter"),
        }
        self
    }

    /// Mark a declared parameter private: a later [`merge`](Self::merge)
    /// cannot override its value.
    pub fn private(&mut self, name: &str) -> &mut Self {
        match self.entries.get_mut(name) {
            Some(e) if e.declared => e.private = true,
            _ => log::warn!("private() ignored: '{name}' is not declared"),
        }
        self
    }

    /// Alias a retired name to its replacement. Access through `old`
    /// logs a warning carrying `note` and forwards to `new`.
    pub fn deprecate(&mut self, old: &str, new: &str, note: &str) -> &mut Self {
        self.deprecated.insert(
            old.to_string(),
            Deprecation {
                replacement: new.to_string(),
                note: note.to_string(),
            },
        );
        self
    }

    /// Permit runtime updates of a `Real` parameter.
    pub fn mark_controllable(&mut self, name: &str) -> Result<&mut Self, ParamError> {
        let key = self.resolve(name).to_string();
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or(ParamError::NotFound { name: key.clone() })?;
        if entry.ty != ParamType::Real {
            return Err(ParamError::TypeMismatch {
                name: key,
                expected: ParamType::Real,
                found: entry.ty,
            });
        }
        if entry.cell.is_none() {
            let v = match entry.value {
                Some(ParamValue::Real(v)) => v,
                _ => f64::NAN,
            };
            entry.cell = Some(ControlledReal::new(v));
        }
        Ok(self)
    }

    // ── Loose insertion (input bags) ───────────────────────────

    /// Insert a value without a declaration.
    ///
    /// If `name` is declared, the value replaces the stored one without a
    /// type check; a mismatch surfaces later in [`validate`](Self::validate).
    pub fn insert(&mut self, name: &str, value: impl Into<ParamValue>) {
        let key = self.resolve(name).to_string();
        let value = value.into();
        match self.entries.get_mut(&key) {
            Some(e) => e.assign(value),
            None => {
                self.entries.insert(key, ParamEntry::loose(value));
            }
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    // ── Access ─────────────────────────────────────────────────

    /// Typed retrieval.
    ///
    /// A controllable parameter returns its live value.
    pub fn get<T: FromParam>(&self, name: &str) -> Result<T, ParamError> {
        let key = self.resolve(name);
        let entry = self.entries.get(key).ok_or_else(|| ParamError::NotFound {
            name: key.to_string(),
        })?;
        let value = entry.value.as_ref().ok_or_else(|| ParamError::Unset {
            name: key.to_string(),
        })?;
        if let (Some(cell), ParamType::Real) = (&entry.cell, T::TYPE) {
            return T::from_param(&ParamValue::Real(cell.get())).ok_or_else(|| {
                ParamError::TypeMismatch {
                    name: key.to_string(),
                    expected: T::TYPE,
                    found: value.ty(),
                }
            });
        }
        T::from_param(value).ok_or_else(|| ParamError::TypeMismatch {
            name: key.to_string(),
            expected: T::TYPE,
            found: value.ty(),
        })
    }

    /// Typed retrieval of a parameter that may be unset.
    pub fn get_opt<T: FromParam>(&self, name: &str) -> Result<Option<T>, ParamError> {
        match self.get(name) {
            Ok(v) => Ok(Some(v)),
            Err(ParamError::Unset { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Override a declared parameter's value.
    ///
    /// Fails with `NotFound` for undeclared names and `TypeMismatch` when
    /// the value's type differs from the declaration.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<(), ParamError> {
        let key = self.resolve(name).to_string();
        let value = value.into();
        let entry = match self.entries.get_mut(&key) {
            Some(e) if e.declared => e,
            _ => return Err(ParamError::NotFound { name: key }),
        };
        if value.ty() != entry.ty {
            return Err(ParamError::TypeMismatch {
                name: key,
                expected: entry.ty,
                found: value.ty(),
            });
        }
        entry.assign(value);
        Ok(())
    }

    /// Returns `true` if `name` (or its replacement) is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(self.resolve_quiet(name))
    }

    /// Returns `true` if `name` is present and holds a value.
    pub fn is_set(&self, name: &str) -> bool {
        self.entries
            .get(self.resolve_quiet(name))
            .is_some_and(|e| e.value.is_some())
    }

    /// Declared type of a parameter.
    pub fn ty(&self, name: &str) -> Option<ParamType> {
        self.entries.get(self.resolve_quiet(name)).map(|e| e.ty)
    }

    /// Documentation string of a declared parameter.
    pub fn doc(&self, name: &str) -> Option<&str> {
        self.entries
            .get(self.resolve_quiet(name))
            .map(|e| e.doc.as_str())
    }

    /// Returns `true` if the parameter is marked controllable.
    pub fn is_controllable(&self, name: &str) -> bool {
        self.entries
            .get(self.resolve_quiet(name))
            .is_some_and(|e| e.cell.is_some())
    }

    /// Returns `true` if the parameter is marked private.
    pub fn is_private(&self, name: &str) -> bool {
        self.entries
            .get(self.resolve_quiet(name))
            .is_some_and(|e| e.private)
    }

    /// Names in declaration/insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the set holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── Controls ───────────────────────────────────────────────

    /// The live cell of a controllable parameter.
    pub fn controlled(&self, name: &str) -> Result<ControlledReal, ParamError> {
        let key = self.resolve(name);
        let entry = self.entries.get(key).ok_or_else(|| ParamError::NotFound {
            name: key.to_string(),
        })?;
        entry
            .cell
            .clone()
            .ok_or_else(|| ParamError::NotControllable {
                name: key.to_string(),
            })
    }

    /// Update a controllable parameter: the stored value and the cell
    /// shared by every instance built from this set.
    pub fn set_controlled(&mut self, name: &str, value: f64) -> Result<(), ParamError> {
        let key = self.resolve(name).to_string();
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or(ParamError::NotFound { name: key.clone() })?;
        if entry.cell.is_none() {
            return Err(ParamError::NotControllable { name: key });
        }
        if let Some((lo, hi)) = entry.range {
            if !(lo..=hi).contains(&value) {
                return Err(ParamError::OutOfRange {
                    name: key,
                    value,
                    lo,
                    hi,
                });
            }
        }
        entry.assign(ParamValue::Real(value));
        Ok(())
    }

    // ── Combination ────────────────────────────────────────────

    /// Combine `other` into `self`; `other` wins on shared keys unless
    /// the key is private in `self`.
    ///
    /// Declarations and deprecations in `other` are carried over. Keys of
    /// `other` that are deprecated names in `self` forward to their
    /// replacement.
    pub fn merge(&mut self, other: &ParameterSet) {
        for (old, dep) in &other.deprecated {
            self.deprecated.insert(old.clone(), dep.clone());
        }
        for (name, incoming) in &other.entries {
            let key = self.resolve(name).to_string();
            match self.entries.get_mut(&key) {
                Some(existing) if existing.private => {
                    log::warn!("parameter '{key}' is private and cannot be overridden");
                }
                Some(existing) => {
                    if incoming.declared {
                        let mut replacement = incoming.clone();
                        if replacement.cell.is_none() {
                            replacement.cell = existing.cell.take();
                        }
                        if replacement.value.is_none() {
                            replacement.value = existing.value.take();
                        }
                        *existing = replacement;
                        if let Some(v) = existing.value.clone() {
                            existing.assign(v);
                        }
                    } else if let Some(v) = incoming.value.clone() {
                        existing.assign(v);
                    }
                }
                None => {
                    self.entries.insert(key, incoming.clone());
                }
            }
        }
    }

    /// Check every entry and itemize all problems.
    ///
    /// Reports undeclared names, required parameters without a value,
    /// wrong-typed values, and reals outside their declared range.
    pub fn validate(&self) -> Result<(), Vec<ParamIssue>> {
        let mut issues = Vec::new();
        for (name, e) in &self.entries {
            if !e.declared {
                issues.push(ParamIssue::Unknown { name: name.clone() });
                continue;
            }
            match &e.value {
                None if e.required => issues.push(ParamIssue::Missing { name: name.clone() }),
                None => {}
                Some(v) if v.ty() != e.ty => issues.push(ParamIssue::TypeMismatch {
                    name: name.clone(),
                    expected: e.ty,
                    found: v.ty(),
                }),
                Some(ParamValue::Real(x)) => {
                    if let Some((lo, hi)) = e.range {
                        if !(lo..=hi).contains(x) {
                            issues.push(ParamIssue::OutOfRange {
                                name: name.clone(),
                                value: *x,
                                lo,
                                hi,
                            });
                        }
                    }
                }
                Some(_) => {}
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        match self.deprecated.get(name) {
            Some(dep) => {
                log::warn!(
                    "parameter '{name}' is deprecated, use '{}' instead: {}",
                    dep.replacement,
                    dep.note
                );
                &dep.replacement
            }
            None => name,
        }
    }

    fn resolve_quiet<'a>(&'a self, name: &'a str) -> &'a str {
        self.deprecated
            .get(name)
            .map_or(name, |dep| dep.replacement.as_str())
    }
}
