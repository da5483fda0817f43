//! Typed side of the conversion: registered-class objects, lazy proxies and
//! the ordered key-value container.
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;

use crate::value::Value;

/// Class name of the built-in ordered key-value container.
pub const ORDERED_COLLECTION: &str = "OrderedCollection";

/// Class names the date-time adapter answers for.
pub const DATETIME_CLASSES: &[&str] = &["DateTime", "DateTimeImmutable", "DateTimeInterface"];

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Data {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(String),
    List(Vec<Data>),
    Map(IndexMap<String, Data>),
    Object(ObjectRef),
    Collection(OrderedCollection),
    DateTime(DateTime<FixedOffset>),
}

impl Data {
    pub fn is_null(&self) -> bool {
        matches!(self, Data::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Data::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Kind (or class) name used in diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Data::Null => "null".into(),
            Data::Bool(_) => "bool".into(),
            Data::Int(_) => "int".into(),
            Data::Float(_) => "float".into(),
            Data::String(_) => "string".into(),
            Data::List(_) | Data::Map(_) => "array".into(),
            Data::Object(o) => o.class(),
            Data::Collection(_) => ORDERED_COLLECTION.into(),
            Data::DateTime(_) => "DateTime".into(),
        }
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Data::Null,
            Value::Bool(b) => Data::Bool(b),
            Value::Int(i) => Data::Int(i),
            Value::Float(f) => Data::Float(f),
            Value::String(s) => Data::String(s),
            Value::Sequence(xs) => Data::List(xs.into_iter().map(Data::from).collect()),
            Value::Mapping(m) => Data::Map(m.into_iter().map(|(k, v)| (k, Data::from(v))).collect()),
        }
    }
}

impl From<ObjectRef> for Data {
    fn from(o: ObjectRef) -> Self {
        Data::Object(o)
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Data::String(s.to_string())
    }
}

impl From<i64> for Data {
    fn from(i: i64) -> Self {
        Data::Int(i)
    }
}

impl From<f64> for Data {
    fn from(f: f64) -> Self {
        Data::Float(OrderedFloat(f))
    }
}

impl From<bool> for Data {
    fn from(b: bool) -> Self {
        Data::Bool(b)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// OBJECTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
enum Load {
    Loaded,
    /// Placeholder for a related entity that has not been fetched yet.
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    class: String,
    fields: IndexMap<String, Data>,
    load: Load,
}

impl Object {
    pub fn new(class: impl Into<String>) -> Self {
        Self { class: class.into(), fields: IndexMap::new(), load: Load::Loaded }
    }

    /// Uninitialized lazy proxy; only the identifier fields are known.
    pub fn proxy(class: impl Into<String>, identifier: IndexMap<String, Data>) -> Self {
        Self { class: class.into(), fields: identifier, load: Load::Pending }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Data>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn get(&self, name: &str) -> Option<&Data> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Data) {
        self.fields.insert(name.into(), value);
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_proxy(&self) -> bool {
        self.load == Load::Pending
    }
}

/// Shared handle on an [`Object`]; identity is the allocation.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<Object>>);

impl ObjectRef {
    pub fn new(object: Object) -> Self {
        Self(Rc::new(RefCell::new(object)))
    }

    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Object> {
        self.0.borrow_mut()
    }

    pub fn class(&self) -> String {
        self.0.borrow().class.clone()
    }

    pub fn get(&self, name: &str) -> Option<Data> {
        self.0.borrow().fields.get(name).cloned()
    }

    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_uninitialized_proxy(&self) -> bool {
        self.0.borrow().is_proxy()
    }

    /// Load a pending proxy in place; every holder sees the loaded fields.
    pub fn initialize(&self, fields: IndexMap<String, Data>) {
        let mut object = self.0.borrow_mut();
        object.fields.extend(fields);
        object.load = Load::Loaded;
    }
}

impl From<Object> for ObjectRef {
    fn from(object: Object) -> Self {
        ObjectRef::new(object)
    }
}

/// Identity, not content: graphs may be cyclic. Compare `*a.borrow()` for
/// a one-level structural check.
impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    // graphs may be cyclic: print the class and address only
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(o) => write!(f, "{}@{:#x}", o.class, self.identity()),
            Err(_) => write!(f, "<borrowed>@{:#x}", self.identity()),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ORDERED COLLECTION
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionKey {
    Index(i64),
    Name(String),
}

impl CollectionKey {
    /// Canonical decimal integers only: `"01"`, `"+2"` and `"-0"` stay names.
    pub fn is_index_key(key: &str) -> bool {
        key.parse::<i64>().is_ok_and(|i| i.to_string() == key)
    }
}

impl From<String> for CollectionKey {
    fn from(key: String) -> Self {
        match key.parse::<i64>() {
            Ok(i) if i.to_string() == key => CollectionKey::Index(i),
            _ => CollectionKey::Name(key),
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKey::Index(i) => write!(f, "{i}"),
            CollectionKey::Name(s) => f.write_str(s),
        }
    }
}

/// Ordered key-value container: a list when keyed `0..n`, a map otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderedCollection {
    entries: IndexMap<CollectionKey, Data>,
}

impl OrderedCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Data) {
        let next = self
            .entries
            .keys()
            .filter_map(|k| match k {
                CollectionKey::Index(i) => Some(*i + 1),
                CollectionKey::Name(_) => None,
            })
            .max()
            .unwrap_or(0);
        self.entries.insert(CollectionKey::Index(next), value);
    }

    pub fn insert(&mut self, key: CollectionKey, value: Data) {
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &CollectionKey) -> Option<&Data> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CollectionKey, &Data)> {
        self.entries.iter()
    }

    pub fn is_list(&self) -> bool {
        self.entries
            .keys()
            .enumerate()
            .all(|(i, k)| *k == CollectionKey::Index(i as i64))
    }
}

impl From<Vec<Data>> for OrderedCollection {
    fn from(items: Vec<Data>) -> Self {
        let entries = items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (CollectionKey::Index(i as i64), v))
            .collect();
        Self { entries }
    }
}

impl From<IndexMap<String, Data>> for OrderedCollection {
    fn from(map: IndexMap<String, Data>) -> Self {
        let entries = map.into_iter().map(|(k, v)| (CollectionKey::from(k), v)).collect();
        Self { entries }
    }
}
