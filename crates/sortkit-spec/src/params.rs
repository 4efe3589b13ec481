//! Typed parameter schemas and parameter sets.
//!
//! Every backend declares its parameters up front as a [`ParamSchema`]. Caller
//! overrides are merged over the schema defaults with [`ParamSchema::merge`],
//! which rejects unknown names and values of the wrong type or outside the
//! declared constraint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{SortError, SortResult};

/// Raw parameter overrides supplied by a caller.
pub type ParamOverrides = BTreeMap<String, ParamValue>;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Returns true if the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    /// Returns the value as a bool, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float. Integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Parses a command-line style value: `null`, `true`/`false`, integers,
    /// floats, JSON lists, and everything else as a string.
    pub fn parse_loose(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<ParamValue>(trimmed) {
                return value;
            }
        }
        match trimmed {
            "null" | "None" => ParamValue::Null,
            "true" | "True" => ParamValue::Bool(true),
            "false" | "False" => ParamValue::Bool(false),
            _ => {
                if let Ok(i) = trimmed.parse::<i64>() {
                    ParamValue::Int(i)
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    ParamValue::Float(f)
                } else {
                    ParamValue::Str(trimmed.to_string())
                }
            }
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => f.write_str("null"),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Str(s) => write!(f, "'{}'", s),
            ParamValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    Str,
    IntList,
    FloatList,
}

impl ParamKind {
    /// Returns the display name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Str => "str",
            ParamKind::IntList => "list[int]",
            ParamKind::FloatList => "list[float]",
        }
    }
}

/// Optional value constraint attached to a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamConstraint {
    /// Inclusive numeric range.
    Range { min: f64, max: f64 },
    /// Value must equal one of the listed values.
    OneOf { values: Vec<ParamValue> },
}

/// Schema entry for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    name: String,
    kind: ParamKind,
    nullable: bool,
    default: ParamValue,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    constraint: Option<ParamConstraint>,
}

impl ParamSpec {
    /// Creates a new parameter spec.
    pub fn new(
        name: impl Into<String>,
        kind: ParamKind,
        default: ParamValue,
        description: impl Into<String>,
    ) -> Self {
        let nullable = default.is_null();
        Self {
            name: name.into(),
            kind,
            nullable,
            default,
            description: description.into(),
            constraint: None,
        }
    }

    /// Creates a boolean parameter.
    pub fn bool(name: impl Into<String>, default: bool, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Bool, ParamValue::Bool(default), description)
    }

    /// Creates an integer parameter.
    pub fn int(name: impl Into<String>, default: i64, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Int, ParamValue::Int(default), description)
    }

    /// Creates an integer parameter whose default is `null`.
    pub fn optional_int(
        name: impl Into<String>,
        default: Option<i64>,
        description: impl Into<String>,
    ) -> Self {
        let value = default.map(ParamValue::Int).unwrap_or(ParamValue::Null);
        Self::new(name, ParamKind::Int, value, description).nullable()
    }

    /// Creates a float parameter.
    pub fn float(name: impl Into<String>, default: f64, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Float, ParamValue::Float(default), description)
    }

    /// Creates a float parameter that accepts `null`.
    pub fn optional_float(
        name: impl Into<String>,
        default: Option<f64>,
        description: impl Into<String>,
    ) -> Self {
        let value = default.map(ParamValue::Float).unwrap_or(ParamValue::Null);
        Self::new(name, ParamKind::Float, value, description).nullable()
    }

    /// Creates a string parameter.
    pub fn string(name: impl Into<String>, default: &str, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Str, ParamValue::from(default), description)
    }

    /// Creates a string parameter that accepts `null`.
    pub fn optional_string(
        name: impl Into<String>,
        default: Option<&str>,
        description: impl Into<String>,
    ) -> Self {
        let value = default.map(ParamValue::from).unwrap_or(ParamValue::Null);
        Self::new(name, ParamKind::Str, value, description).nullable()
    }

    /// Creates an integer list parameter.
    pub fn int_list(
        name: impl Into<String>,
        default: &[i64],
        description: impl Into<String>,
    ) -> Self {
        let value = ParamValue::List(default.iter().copied().map(ParamValue::Int).collect());
        Self::new(name, ParamKind::IntList, value, description)
    }

    /// Creates a float list parameter.
    pub fn float_list(
        name: impl Into<String>,
        default: &[f64],
        description: impl Into<String>,
    ) -> Self {
        let value = ParamValue::List(default.iter().copied().map(ParamValue::Float).collect());
        Self::new(name, ParamKind::FloatList, value, description)
    }

    /// Allows `null` as a value.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Constrains numeric values to an inclusive range.
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.constraint = Some(ParamConstraint::Range { min, max });
        self
    }

    /// Constrains integer values to a fixed set.
    pub fn one_of_ints(mut self, values: &[i64]) -> Self {
        self.constraint = Some(ParamConstraint::OneOf {
            values: values.iter().copied().map(ParamValue::Int).collect(),
        });
        self
    }

    /// Constrains string values to a fixed set.
    pub fn one_of_strs(mut self, values: &[&str]) -> Self {
        self.constraint = Some(ParamConstraint::OneOf {
            values: values.iter().copied().map(ParamValue::from).collect(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default_value(&self) -> &ParamValue {
        &self.default
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn constraint(&self) -> Option<&ParamConstraint> {
        self.constraint.as_ref()
    }

    /// Checks a value against this spec and returns its normalized form.
    ///
    /// Integers are widened to floats for float parameters. No other
    /// coercion happens.
    pub fn validate(&self, value: &ParamValue) -> Result<ParamValue, String> {
        if value.is_null() {
            return if self.nullable {
                Ok(ParamValue::Null)
            } else {
                Err("null is not allowed".to_string())
            };
        }

        let normalized = match (self.kind, value) {
            (ParamKind::Bool, ParamValue::Bool(_))
            | (ParamKind::Int, ParamValue::Int(_))
            | (ParamKind::Float, ParamValue::Float(_))
            | (ParamKind::Str, ParamValue::Str(_)) => value.clone(),
            (ParamKind::Float, ParamValue::Int(i)) => ParamValue::Float(*i as f64),
            (ParamKind::IntList, ParamValue::List(items)) => {
                if items.iter().all(|v| matches!(v, ParamValue::Int(_))) {
                    value.clone()
                } else {
                    return Err("expected a list of integers".to_string());
                }
            }
            (ParamKind::FloatList, ParamValue::List(items)) => {
                let mut floats = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_f64() {
                        Some(f) => floats.push(ParamValue::Float(f)),
                        None => return Err("expected a list of numbers".to_string()),
                    }
                }
                ParamValue::List(floats)
            }
            _ => return Err(format!("expected {}, got {}", self.kind.as_str(), value)),
        };

        match &self.constraint {
            Some(ParamConstraint::Range { min, max }) => {
                let check = |v: &ParamValue| match v.as_f64() {
                    Some(x) if x >= *min && x <= *max => Ok(()),
                    _ => Err(format!("{} is outside [{}, {}]", v, min, max)),
                };
                match &normalized {
                    ParamValue::List(items) => items.iter().try_for_each(check)?,
                    other => check(other)?,
                }
            }
            Some(ParamConstraint::OneOf { values }) => {
                if !values.contains(&normalized) {
                    let allowed = values
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(format!("{} is not one of {}", normalized, allowed));
                }
            }
            None => {}
        }

        Ok(normalized)
    }
}

/// Ordered collection of parameter specs for one backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParamSchema {
    specs: Vec<ParamSpec>,
}

impl ParamSchema {
    /// Creates a schema from specs in declaration order.
    pub fn new(specs: Vec<ParamSpec>) -> Self {
        Self { specs }
    }

    /// Adds a spec at the end of the schema.
    pub fn push(&mut self, spec: ParamSpec) {
        self.specs.push(spec);
    }

    /// Looks up a spec by name.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Returns true if the schema declares `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates specs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ParamSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Returns parameter names declared more than once.
    pub fn duplicate_names(&self) -> Vec<&str> {
        let mut seen = std::collections::BTreeSet::new();
        let mut dups = Vec::new();
        for spec in &self.specs {
            if !seen.insert(spec.name.as_str()) {
                dups.push(spec.name.as_str());
            }
        }
        dups
    }

    /// Returns the default parameter set.
    pub fn defaults(&self) -> Params {
        Params(
            self.specs
                .iter()
                .map(|s| (s.name.clone(), s.default.clone()))
                .collect(),
        )
    }

    /// Returns the description of every parameter, keyed by name.
    pub fn descriptions(&self) -> BTreeMap<String, String> {
        self.specs
            .iter()
            .map(|s| (s.name.clone(), s.description.clone()))
            .collect()
    }

    /// Merges caller overrides over the defaults.
    ///
    /// Unknown names are all reported at once, in sorted order.
    pub fn merge(&self, backend: &str, overrides: &ParamOverrides) -> SortResult<Params> {
        let unknown: Vec<&str> = overrides
            .keys()
            .filter(|k| !self.contains(k))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(SortError::invalid_parameter(
                backend,
                unknown.join(", "),
                "not a parameter of this sorter",
            ));
        }

        let mut params = self.defaults();
        for (name, value) in overrides {
            // Known to exist after the unknown-name check.
            let Some(spec) = self.get(name) else { continue };
            let normalized = spec
                .validate(value)
                .map_err(|reason| SortError::invalid_parameter(backend, name, reason))?;
            params.0.insert(name.clone(), normalized);
        }
        Ok(params)
    }
}

/// A fully resolved parameter set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    /// Returns the raw value of a parameter.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Returns a boolean parameter, `None` if absent, null or not a bool.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }

    /// Returns an integer parameter.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_i64)
    }

    /// Returns a numeric parameter as a float.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    /// Returns a string parameter.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the parameters as raw overrides.
    pub fn to_overrides(&self) -> ParamOverrides {
        self.0.clone()
    }
}
