//! Format-agnostic value tree exchanged with wire decoders/encoders.
//!
//! Decoders hand us a `Value`, encoders take one back. Floats are kept as
//! `OrderedFloat` so `NaN`/`INF` coming out of string formats survive and the
//! whole tree stays `Eq`.
use indexmap::IndexMap;
use ordered_float::OrderedFloat;

pub type Mapping = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(String),
    Sequence(Vec<Value>),
    Mapping(Mapping),
}

// ————————————————————————————————————————————————————————————————————————————
// ACCESSORS
// ————————————————————————————————————————————————————————————————————————————

impl Value {
    pub fn float(f: f64) -> Self {
        Value::Float(OrderedFloat(f))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Runtime kind as reported in type-mismatch diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) | Value::Mapping(_) => "array",
        }
    }

    /// Mapping key lookup; `None` for non-mappings.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    /// Follow `path` through nested mappings. Absent as soon as one segment is missing.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let mut cur = self;
        for segment in path {
            cur = cur.get(segment.as_ref())?;
        }
        Some(cur)
    }

    /// Remove the leaf at `path`, then drop every parent mapping left empty by the removal.
    pub fn remove_path<S: AsRef<str>>(&mut self, path: &[S]) -> Option<Value> {
        let (head, rest) = path.split_first()?;
        let Value::Mapping(map) = self else {
            return None;
        };
        if rest.is_empty() {
            return map.shift_remove(head.as_ref());
        }
        let child = map.get_mut(head.as_ref())?;
        let removed = child.remove_path(rest);
        if matches!(child, Value::Mapping(m) if m.is_empty()) {
            map.shift_remove(head.as_ref());
        }
        removed
    }

    /// Write `value` at `path`, creating intermediate mappings.
    ///
    /// Returns the value back when a segment is occupied by a non-mapping or the
    /// leaf is already populated.
    pub fn insert_path<S: AsRef<str>>(&mut self, path: &[S], value: Value) -> Result<(), Value> {
        let Some((head, rest)) = path.split_first() else {
            return Err(value);
        };
        if self.is_null() {
            *self = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(map) = self else {
            return Err(value);
        };
        if rest.is_empty() {
            if map.get(head.as_ref()).is_some_and(|v| !v.is_null()) {
                return Err(value);
            }
            map.insert(head.as_ref().to_string(), value);
            return Ok(());
        }
        map.entry(head.as_ref().to_string())
            .or_insert(Value::Null)
            .insert_path(rest, value)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CONVERSIONS
// ————————————————————————————————————————————————————————————————————————————

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                // u64 beyond i64 and real floats both land here
                None => Value::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(xs) => Value::Sequence(xs.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(m) => {
                Value::Mapping(m.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    /// Non-finite floats have no JSON spelling and encode as null.
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Value::from(f.0),
            Value::String(s) => serde_json::Value::String(s),
            Value::Sequence(xs) => serde_json::Value::Array(xs.into_iter().map(Into::into).collect()),
            Value::Mapping(m) => {
                serde_json::Value::Object(m.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
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

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ------------------------------- Tests ------------------------------------ //
