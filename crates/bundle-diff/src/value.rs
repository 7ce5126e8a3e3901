//! Structural JS values.
//!
//! Everything the harness observes from an execution (console arguments,
//! exported bindings, globals handed to fixtures) is normalized into [`Value`].
//! Values cross the process boundary to the Node driver as tagged JSON
//! (`{"t": "number", "v": "1"}`), so that `undefined`, `NaN`, `-0` and
//! bigints survive the trip.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Exported bindings of one module: export name to value.
pub type Bindings = BTreeMap<String, Value>;

/// A JS value, compared structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    BigInt(String),
    Symbol(String),
    /// Functions and classes, compared by name only.
    Function(String),
    Array(Vec<Value>),
    Object(Object),
    Date(String),
    RegExp(String),
    /// Own accessor property, kept unevaluated: `Getter`, `Setter` or
    /// `Getter/Setter`.
    Accessor(String),
    /// Back-reference to an object already being encoded.
    Circular,
}

/// A plain object or class instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Object {
    /// Constructor name for anything that is not a plain `Object`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default)]
    pub props: Bindings,
}

/// JS number. `NaN` equals `NaN`, and `0` equals `-0`, matching loose deep
/// equality.
#[derive(Debug, Clone, Copy)]
pub struct Number(pub f64);

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        (self.0.is_nan() && other.0.is_nan()) || self.0 == other.0
    }
}

impl Serialize for Number {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_number(self.0))
    }
}

impl<'de> Deserialize<'de> for Number {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = String::deserialize(deserializer)?;
        parse_number(&repr)
            .map(Number)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid number `{}`", repr)))
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 && n.is_sign_negative() {
        "-0".to_string()
    } else {
        n.to_string()
    }
}

fn parse_number(repr: &str) -> Option<f64> {
    match repr {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

impl Value {
    /// Plain object from key/value pairs.
    pub fn object<K, I>(props: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(Object {
            class: None,
            props: props.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        })
    }

    pub fn number(n: f64) -> Self {
        Value::Number(Number(n))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.0),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::number(n as f64)
    }
}

impl From<serde_json::Value> for Value {
    /// Plain JSON (and TOML, via serde) maps onto the JS data subset.
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::object(map.into_iter().map(|(k, v)| (k, v.into()))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(n.0)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::BigInt(b) => write!(f, "{}n", b),
            Value::Symbol(s) => write!(f, "Symbol({})", s),
            Value::Function(name) if name.is_empty() => write!(f, "[Function (anonymous)]"),
            Value::Function(name) => write!(f, "[Function: {}]", name),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(obj) => {
                if let Some(class) = &obj.class {
                    write!(f, "{} ", class)?;
                }
                if obj.props.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                for (i, (key, value)) in obj.props.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, " }}")
            }
            Value::Date(iso) => write!(f, "{}", iso),
            Value::RegExp(re) => write!(f, "{}", re),
            Value::Accessor(kind) => write!(f, "[{}]", kind),
            Value::Circular => write!(f, "[Circular]"),
        }
    }
}

/// First point at which two values stop being structurally equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// Access path from the root, e.g. `console[1][0]`.
    pub path: String,
    pub expected: String,
    pub actual: String,
}

const MISSING: &str = "<missing>";

/// Locate the first divergence between `expected` and `actual`, walking
/// arrays by index and objects by sorted key. `root` names the top level.
pub fn first_divergence(root: &str, expected: &Value, actual: &Value) -> Option<Divergence> {
    diverge(root.to_string(), expected, actual)
}

fn diverge(path: String, expected: &Value, actual: &Value) -> Option<Divergence> {
    match (expected, actual) {
        (Value::Array(left), Value::Array(right)) => {
            for (i, (l, r)) in left.iter().zip(right).enumerate() {
                if let Some(d) = diverge(format!("{}[{}]", path, i), l, r) {
                    return Some(d);
                }
            }
            if left.len() != right.len() {
                let i = left.len().min(right.len());
                return Some(Divergence {
                    path: format!("{}[{}]", path, i),
                    expected: describe(left.get(i)),
                    actual: describe(right.get(i)),
                });
            }
            None
        }
        (Value::Object(left), Value::Object(right)) if left.class == right.class => {
            let keys: BTreeSet<&String> = left.props.keys().chain(right.props.keys()).collect();
            for key in keys {
                let child = key_path(&path, key);
                match (left.props.get(key), right.props.get(key)) {
                    (Some(l), Some(r)) => {
                        if let Some(d) = diverge(child, l, r) {
                            return Some(d);
                        }
                    }
                    (l, r) => {
                        return Some(Divergence {
                            path: child,
                            expected: describe(l),
                            actual: describe(r),
                        });
                    }
                }
            }
            None
        }
        _ if expected == actual => None,
        _ => Some(Divergence {
            path,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
    }
}

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| MISSING.to_string(), Value::to_string)
}

fn key_path(path: &str, key: &str) -> String {
    let is_ident = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if is_ident {
        format!("{}.{}", path, key)
    } else {
        format!("{}[{:?}]", path, key)
    }
}
