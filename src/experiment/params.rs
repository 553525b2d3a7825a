//! Parameter store: per-experiment input and output maps

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A parameter value: a scalar or an ordered list of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean scalar
    Bool(bool),
    /// Integer scalar
    Int(i64),
    /// Floating-point scalar
    Float(f64),
    /// Text scalar
    Text(String),
    /// Ordered list
    List(Vec<Value>),
}

impl Value {
    /// Numeric view of the value (integers are widened).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Integer view of the value (floats are truncated toward zero).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(x) => Some(*x as i64),
            _ => None,
        }
    }

    /// Text view of the value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether every float in the value is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(x) => x.is_finite(),
            Self::List(items) => items.iter().all(Self::is_finite),
            _ => true,
        }
    }

    /// List view of the value.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Self::Float(f64::from(x))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Map from parameter name to value.
pub type ParameterMap = BTreeMap<String, Value>;

/// Input and output parameters of one experiment.
///
/// Inputs are set before running and survive a reset; outputs are produced
/// by execution only and are discarded by a reset. Reads look at inputs
/// first, then outputs.
#[derive(Debug, Default)]
pub struct ParameterStore {
    inputs: RwLock<ParameterMap>,
    outputs: RwLock<ParameterMap>,
    descriptions: RwLock<BTreeMap<String, String>>,
}

impl ParameterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a parameter, inputs first.
    #[must_use]
    pub fn read(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.inputs.read().get(key) {
            return Some(v.clone());
        }
        self.outputs.read().get(key).cloned()
    }

    /// Write an input parameter.
    pub fn write_input(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inputs.write().insert(key.into(), value.into());
    }

    /// Write an output parameter.
    pub fn write_output(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.outputs.write().insert(key.into(), value.into());
    }

    /// Snapshot of the input map.
    #[must_use]
    pub fn inputs(&self) -> ParameterMap {
        self.inputs.read().clone()
    }

    /// Snapshot of the output map.
    #[must_use]
    pub fn outputs(&self) -> ParameterMap {
        self.outputs.read().clone()
    }

    /// Number of output parameters.
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.outputs.read().len()
    }

    /// Discard every output.
    pub fn clear_outputs(&self) {
        self.outputs.write().clear();
    }

    /// Replace both maps wholesale (used when loading persisted state).
    pub fn replace(&self, inputs: ParameterMap, outputs: ParameterMap) {
        *self.inputs.write() = inputs;
        *self.outputs.write() = outputs;
    }

    /// Attach a human-readable description to a parameter.
    pub fn describe(&self, key: impl Into<String>, description: impl Into<String>) {
        self.descriptions
            .write()
            .insert(key.into(), description.into());
    }

    /// Description of a parameter, empty if none was given.
    #[must_use]
    pub fn description(&self, key: &str) -> String {
        self.descriptions.read().get(key).cloned().unwrap_or_default()
    }
}
