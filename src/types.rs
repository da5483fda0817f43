//! Declared property types, unions, discriminator tables and nested paths.
//!
//! Everything here is immutable once built and cheap to share; the resolver
//! caches `AttributeTypes` for the lifetime of the process.
use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{NormalizerError, Result};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Builtin {
    Null,
    Bool,
    True,           // literal `true` only
    False,          // literal `false` only
    Int,
    Float,
    String,
    Array,          // sequences and string-keyed mappings alike
    Object,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Null => "null",
            Builtin::Bool => "bool",
            Builtin::True => "true",
            Builtin::False => "false",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::String => "string",
            Builtin::Array => "array",
            Builtin::Object => "object",
        }
    }

    /// Native-kind test: does `value` already have this runtime kind?
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Builtin::Null, Value::Null) => true,
            (Builtin::Bool, Value::Bool(_)) => true,
            (Builtin::True, Value::Bool(b)) => *b,
            (Builtin::False, Value::Bool(b)) => !*b,
            (Builtin::Int, Value::Int(_)) => true,
            (Builtin::Float, Value::Float(_)) => true,
            (Builtin::String, Value::String(_)) => true,
            (Builtin::Array, Value::Sequence(_) | Value::Mapping(_)) => true,
            _ => false,
        }
    }

    pub fn is_scalar_coercible(&self) -> bool {
        matches!(self, Builtin::Bool | Builtin::Int | Builtin::Float)
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE DESCRIPTOR
// ————————————————————————————————————————————————————————————————————————————

/// One declared type of a property. Collections nest through `value_types`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDescriptor {
    pub builtin: Builtin,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub collection: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_types: Vec<TypeDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_types: Vec<TypeDescriptor>,
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl TypeDescriptor {
    pub fn builtin(builtin: Builtin) -> Self {
        Self {
            builtin,
            nullable: false,
            collection: false,
            key_types: Vec::new(),
            value_types: Vec::new(),
            class_name: None,
        }
    }

    pub fn object(class: impl Into<String>) -> Self {
        Self { class_name: Some(class.into()), ..Self::builtin(Builtin::Object) }
    }

    /// `array` of `value`, integer keyed.
    pub fn list_of(value: TypeDescriptor) -> Self {
        Self {
            collection: true,
            key_types: vec![Self::builtin(Builtin::Int)],
            value_types: vec![value],
            ..Self::builtin(Builtin::Array)
        }
    }

    /// `array` of `value`, string keyed.
    pub fn map_of(value: TypeDescriptor) -> Self {
        Self {
            collection: true,
            key_types: vec![Self::builtin(Builtin::String)],
            value_types: vec![value],
            ..Self::builtin(Builtin::Array)
        }
    }

    /// A container class (e.g. `OrderedCollection`) holding `value` elements.
    pub fn collection_of(class: impl Into<String>, value: TypeDescriptor) -> Self {
        Self { collection: true, value_types: vec![value], ..Self::object(class) }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// First declared element type, for collections declaring exactly one.
    pub fn collection_value_type(&self) -> Option<&TypeDescriptor> {
        if self.collection { self.value_types.first() } else { None }
    }

    pub fn collection_key_type(&self) -> Option<&TypeDescriptor> {
        self.key_types.first()
    }

    /// Name listed in union diagnostics: the class for objects, the builtin otherwise.
    /// Typed arrays read as `int[]`, `Cat[][]`.
    pub fn display_name(&self) -> String {
        match (&self.builtin, &self.class_name) {
            (Builtin::Object, Some(class)) => class.clone(),
            (Builtin::Array, _) => match self.collection_value_type() {
                Some(inner) => format!("{}[]", inner.display_name()),
                None => Builtin::Array.name().to_string(),
            },
            (builtin, _) => builtin.name().to_string(),
        }
    }

    /// `class` is reserved for object types, recursively.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.class_name.is_some() && self.builtin != Builtin::Object {
            return Err(format!("a {} type cannot carry a class name", self.builtin));
        }
        for t in self.key_types.iter().chain(self.value_types.iter()) {
            t.validate()?;
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// UNION
// ————————————————————————————————————————————————————————————————————————————

/// Ordered, non-empty union of candidate types for one (class, attribute).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeTypes(Vec<TypeDescriptor>);

impl AttributeTypes {
    pub fn new(types: Vec<TypeDescriptor>) -> Option<Self> {
        if types.is_empty() { None } else { Some(Self(types)) }
    }

    pub fn single(ty: TypeDescriptor) -> Self {
        Self(vec![ty])
    }

    pub fn is_union(&self) -> bool {
        self.0.len() > 1
    }

    pub fn any_nullable(&self) -> bool {
        self.0.iter().any(|t| t.nullable)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TypeDescriptor> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[TypeDescriptor] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a AttributeTypes {
    type Item = &'a TypeDescriptor;
    type IntoIter = std::slice::Iter<'a, TypeDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DISCRIMINATOR
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscriminatorMapping {
    #[serde(rename = "property")]
    pub type_property: String,
    #[serde(rename = "mapping")]
    pub type_to_class: IndexMap<String, String>,
}

impl DiscriminatorMapping {
    pub fn new<I, K, V>(type_property: impl Into<String>, mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            type_property: type_property.into(),
            type_to_class: mapping.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Exact-string lookup; no fallback.
    pub fn class_for(&self, tag: &str) -> Option<&str> {
        self.type_to_class.get(tag).map(String::as_str)
    }

    pub fn tag_for(&self, class: &str) -> Option<&str> {
        self.type_to_class
            .iter()
            .find(|(_, c)| c.as_str() == class)
            .map(|(tag, _)| tag.as_str())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.type_to_class.values().map(String::as_str)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// NESTED PATHS
// ————————————————————————————————————————————————————————————————————————————

/// Properties whose wire representation lives below the top level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NestedPathMap {
    paths: IndexMap<String, Vec<String>>,
}

impl NestedPathMap {
    /// Build from `(property, path)` pairs; two properties on one path is fatal.
    pub fn from_paths<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut seen: HashMap<Vec<String>, String> = HashMap::new();
        let mut paths = IndexMap::new();
        for (property, path) in pairs {
            if let Some(first) = seen.get(&path) {
                return Err(NormalizerError::DuplicateSerializedPath {
                    path: path.join(","),
                    first: first.clone(),
                    second: property,
                });
            }
            seen.insert(path.clone(), property.clone());
            paths.insert(property, path);
        }
        Ok(Self { paths })
    }

    pub fn get(&self, property: &str) -> Option<&[String]> {
        self.paths.get(property).map(Vec::as_slice)
    }

    pub fn contains(&self, property: &str) -> bool {
        self.paths.contains_key(property)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.paths.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// FORMAT
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Xml,
    Csv,
    Other(String),
}

impl Format {
    pub fn name(&self) -> &str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Csv => "csv",
            Format::Other(name) => name,
        }
    }

    /// Formats that carry every scalar as a string.
    pub fn has_string_scalars(&self) -> bool {
        matches!(self, Format::Xml | Format::Csv)
    }

    /// A lone child node decodes as a scalar/mapping instead of a one-element list.
    pub fn collapses_single_nodes(&self) -> bool {
        matches!(self, Format::Xml)
    }

    /// One number type on the wire: integral floats come back as ints.
    pub fn is_json_like(&self) -> bool {
        matches!(self, Format::Json) || self.name().contains("json")
    }
}

impl From<&str> for Format {
    fn from(name: &str) -> Self {
        match name {
            "json" => Format::Json,
            "xml" => Format::Xml,
            "csv" => Format::Csv,
            other => Format::Other(other.to_string()),
        }
    }
}
