//! Collaborator seams: everything the core asks about classes and objects.
//!
//! [`ClassTable`](crate::registry::ClassTable) implements the class-level
//! traits from a registry; hosts with their own metadata plug in here.
//! Every seam is `Send + Sync` so one configured serializer, caches included,
//! can serve many threads.
use indexmap::IndexSet;

use crate::context::NormalizationContext;
use crate::error::{AccessError, Result};
use crate::object::{Data, ObjectRef};
use crate::types::{AttributeTypes, DiscriminatorMapping, Format, NestedPathMap};
use crate::value::Mapping;

/// Attributes a class exposes under one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedAttributes {
    /// No metadata restricts the set.
    All,
    Only(IndexSet<String>),
}

impl AllowedAttributes {
    pub fn contains(&self, attribute: &str) -> bool {
        match self {
            AllowedAttributes::All => true,
            AllowedAttributes::Only(set) => set.contains(attribute),
        }
    }
}

pub trait MetadataProvider: Send + Sync {
    fn has_class(&self, class: &str) -> bool;

    /// `class` is `ancestor` or derives from it.
    fn is_a(&self, class: &str, ancestor: &str) -> bool {
        class == ancestor
    }

    /// Declared union for `attribute`, if any.
    fn types_of(&self, class: &str, attribute: &str) -> Option<AttributeTypes>;

    fn allowed_attributes(&self, class: &str, context: &NormalizationContext) -> AllowedAttributes;

    fn nested_paths(&self, class: &str) -> Result<NestedPathMap>;

    /// Wire key -> canonical attribute name.
    fn attribute_name_for(&self, wire_key: &str, class: &str) -> String {
        let _ = class;
        wire_key.to_string()
    }

    /// Canonical attribute name -> wire key.
    fn wire_key_for(&self, attribute: &str, class: &str) -> String {
        let _ = class;
        attribute.to_string()
    }

    /// Relation to another entity, as declared by the persistence layer.
    fn is_association(&self, class: &str, attribute: &str) -> bool {
        let _ = (class, attribute);
        false
    }
}

pub trait DiscriminatorProvider: Send + Sync {
    /// Mapping declared on `class` itself; drives input resolution.
    fn mapping_for(&self, class: &str) -> Option<DiscriminatorMapping>;

    /// Mapping an instance of `class` is tagged with on output: its own or
    /// the closest ancestor's.
    fn mapping_for_mapped_class(&self, class: &str) -> Option<DiscriminatorMapping> {
        self.mapping_for(class)
    }
}

pub trait Instantiator: Send + Sync {
    /// Bare object of `class` built from `data`. Constructor arguments may be
    /// consumed from or defaulted into `data`.
    fn instantiate(
        &self,
        class: &str,
        data: &mut Mapping,
        context: &NormalizationContext,
        allowed: &AllowedAttributes,
        format: Option<&Format>,
    ) -> Result<ObjectRef>;
}

pub trait PropertyAccessor: Send + Sync {
    /// `None` when the object has no such property.
    fn get(&self, object: &ObjectRef, name: &str) -> Option<Data>;

    fn set(&self, object: &ObjectRef, name: &str, value: Data) -> Result<(), AccessError>;

    /// Names readable on `object` when metadata does not restrict them.
    fn readable(&self, object: &ObjectRef) -> Vec<String> {
        object.borrow().field_names().map(str::to_string).collect()
    }
}

pub trait ProxyIntrospector: Send + Sync {
    fn is_uninitialized_proxy(&self, value: &Data) -> bool;
}

/// Reads the load state carried by [`Object`](crate::object::Object) itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct LazyProxyIntrospector;

impl ProxyIntrospector for LazyProxyIntrospector {
    fn is_uninitialized_proxy(&self, value: &Data) -> bool {
        value.as_object().is_some_and(ObjectRef::is_uninitialized_proxy)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// NAME CONVERSION
// ————————————————————————————————————————————————————————————————————————————

pub trait NameConverter: Send + Sync {
    /// Attribute name -> wire key.
    fn normalize(&self, name: &str) -> String;
    /// Wire key -> attribute name.
    fn denormalize(&self, key: &str) -> String;
}

/// `firstName` <-> `first_name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CamelCaseToSnakeCase {
    /// Leave the first character's case untouched when denormalizing.
    pub lower_camel_case: bool,
}

impl CamelCaseToSnakeCase {
    pub fn new() -> Self {
        Self { lower_camel_case: true }
    }
}

impl NameConverter for CamelCaseToSnakeCase {
    fn normalize(&self, name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 4);
        for (i, c) in name.chars().enumerate() {
            if c.is_ascii_uppercase() {
                if i > 0 {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    fn denormalize(&self, key: &str) -> String {
        let mut out = String::with_capacity(key.len());
        let mut upper = !self.lower_camel_case;
        for c in key.chars() {
            if c == '_' {
                upper = true;
            } else if upper {
                out.push(c.to_ascii_uppercase());
                upper = false;
            } else {
                out.push(c);
            }
        }
        out
    }
}
