//! Parsed argument values for a command invocation.
//!
//! The argv front-end owns tokenization and option binding; by the time the
//! processor sees an invocation, arguments are already typed [`ArgValue`]s
//! keyed by option name, plus the ordered positional list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A typed argument value as produced by the front-end parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    /// No value bound (e.g. a chained-step mapping that hit a missing path).
    Null,
    /// Boolean flag value.
    Bool(bool),
    /// Numeric value; all numbers are carried as f64.
    Num(f64),
    /// String value.
    Str(String),
    /// Repeatable/array value.
    Arr(Vec<ArgValue>),
}

impl ArgValue {
    /// The type name used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ArgValue::Null => "null",
            ArgValue::Bool(_) => "boolean",
            ArgValue::Num(_) => "number",
            ArgValue::Str(_) => "string",
            ArgValue::Arr(_) => "array",
        }
    }

    /// Borrow as a string, if the value is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a number, if the value is one.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            ArgValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrow as a boolean, if the value is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as an array, if the value is one.
    pub fn as_arr(&self) -> Option<&[ArgValue]> {
        match self {
            ArgValue::Arr(items) => Some(items),
            _ => None,
        }
    }

    /// Render the value the way validation messages and allowed-value
    /// comparisons see it.
    pub fn render(&self) -> String {
        match self {
            ArgValue::Null => "null".to_string(),
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::Num(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            ArgValue::Str(s) => s.clone(),
            ArgValue::Arr(items) => {
                let rendered: Vec<String> = items.iter().map(ArgValue::render).collect();
                format!("[{}]", rendered.join(", "))
            }
        }
    }

    /// Convert a JSON value into an argument value.
    ///
    /// Objects have no argument representation and collapse to their JSON
    /// text as a string; chained-step mappings that need structure should
    /// point at scalar leaves.
    pub fn from_json(value: &serde_json::Value) -> ArgValue {
        match value {
            serde_json::Value::Null => ArgValue::Null,
            serde_json::Value::Bool(b) => ArgValue::Bool(*b),
            serde_json::Value::Number(n) => ArgValue::Num(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => ArgValue::Str(s.clone()),
            serde_json::Value::Array(items) => {
                ArgValue::Arr(items.iter().map(ArgValue::from_json).collect())
            }
            serde_json::Value::Object(_) => ArgValue::Str(value.to_string()),
        }
    }

    /// Convert into a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ArgValue::Null => serde_json::Value::Null,
            ArgValue::Bool(b) => serde_json::Value::Bool(*b),
            ArgValue::Num(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ArgValue::Str(s) => serde_json::Value::String(s.clone()),
            ArgValue::Arr(items) => {
                serde_json::Value::Array(items.iter().map(ArgValue::to_json).collect())
            }
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Str(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Str(s)
    }
}

impl From<f64> for ArgValue {
    fn from(n: f64) -> Self {
        ArgValue::Num(n)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

/// The full argument set for one invocation: named option values plus the
/// ordered positional tokens the front-end matched on the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    /// Option name -> parsed value.
    #[serde(default)]
    pub options: BTreeMap<String, ArgValue>,
    /// Ordered positional tokens, including the command path.
    #[serde(default)]
    pub positional: Vec<String>,
}

impl Arguments {
    /// Create an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an argument set with the given positional path.
    pub fn with_positional<I, S>(positional: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: BTreeMap::new(),
            positional: positional.into_iter().map(Into::into).collect(),
        }
    }

    /// Bind an option value, replacing any prior binding.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        self.options.insert(name.into(), value.into());
    }

    /// Builder form of [`Arguments::set`].
    #[must_use]
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Look up an option value.
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.options.get(name)
    }

    /// Whether an option is bound at all (including to `Null`).
    pub fn contains(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }

    /// Look up an option and borrow it as a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ArgValue::as_str)
    }
}
