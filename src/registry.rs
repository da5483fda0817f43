//! Registry-backed class metadata.
//!
//! A `ClassTable` is the static type table the normalizers consult: one
//! `ClassDef` per class, inheritance through `parent`, validated once when
//! built so lookups never fail later.
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::context::NormalizationContext;
use crate::error::{AccessError, NormalizerError, Result};
use crate::metadata::{
    AllowedAttributes, DiscriminatorProvider, Instantiator, MetadataProvider, NameConverter, PropertyAccessor,
};
use crate::object::{DATETIME_CLASSES, Data, ORDERED_COLLECTION, Object, ObjectRef};
use crate::types::{AttributeTypes, Builtin, DiscriminatorMapping, Format, NestedPathMap, TypeDescriptor};
use crate::value::{Mapping, Value};

// ————————————————————————————————————————————————————————————————————————————
// DEFINITIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PropertyDef {
    pub types: Vec<TypeDescriptor>,
    pub serialized_name: Option<String>,
    pub serialized_path: Option<Vec<String>>,
    pub groups: Vec<String>,
    /// Relation to another entity (may hold a lazy proxy).
    pub association: bool,
    pub ignore: bool,
}

impl PropertyDef {
    pub fn typed(ty: TypeDescriptor) -> Self {
        Self { types: vec![ty], ..Self::default() }
    }

    pub fn union<I: IntoIterator<Item = TypeDescriptor>>(types: I) -> Self {
        Self { types: types.into_iter().collect(), ..Self::default() }
    }

    /// Declared without type information.
    pub fn untyped() -> Self {
        Self::default()
    }

    pub fn serialized_name(mut self, name: impl Into<String>) -> Self {
        self.serialized_name = Some(name.into());
        self
    }

    pub fn at_path<I: IntoIterator<Item = S>, S: Into<String>>(mut self, path: I) -> Self {
        self.serialized_path = Some(path.into_iter().map(Into::into).collect());
        self
    }

    pub fn groups<I: IntoIterator<Item = S>, S: Into<String>>(mut self, groups: I) -> Self {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn association(mut self) -> Self {
        self.association = true;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstructorArg {
    pub name: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl ConstructorArg {
    pub fn required(name: impl Into<String>) -> Self {
        Self { name: name.into(), default: None }
    }

    pub fn with_default(name: impl Into<String>, default: serde_json::Value) -> Self {
        Self { name: name.into(), default: Some(default) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassDef {
    pub parent: Option<String>,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    pub discriminator: Option<DiscriminatorMapping>,
    pub properties: IndexMap<String, PropertyDef>,
    pub constructor: Vec<ConstructorArg>,
}

impl ClassDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn discriminator(mut self, mapping: DiscriminatorMapping) -> Self {
        self.discriminator = Some(mapping);
        self
    }

    pub fn property(mut self, name: impl Into<String>, def: PropertyDef) -> Self {
        self.properties.insert(name.into(), def);
        self
    }

    pub fn constructor<I: IntoIterator<Item = ConstructorArg>>(mut self, args: I) -> Self {
        self.constructor = args.into_iter().collect();
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableDoc {
    classes: IndexMap<String, ClassDef>,
}

// ————————————————————————————————————————————————————————————————————————————
// TABLE
// ————————————————————————————————————————————————————————————————————————————

pub struct ClassTable {
    classes: IndexMap<String, ClassDef>,
    nested: HashMap<String, NestedPathMap>,
    name_converter: Option<Arc<dyn NameConverter>>,
}

#[derive(Default)]
pub struct ClassTableBuilder {
    classes: IndexMap<String, ClassDef>,
    name_converter: Option<Arc<dyn NameConverter>>,
}

impl ClassTableBuilder {
    pub fn class(mut self, name: impl Into<String>, def: ClassDef) -> Self {
        self.classes.insert(name.into(), def);
        self
    }

    pub fn name_converter(mut self, converter: impl NameConverter + 'static) -> Self {
        self.name_converter = Some(Arc::new(converter));
        self
    }

    /// Validate every class and precompute nested paths.
    pub fn build(self) -> Result<ClassTable> {
        let mut table = ClassTable {
            classes: self.classes,
            nested: HashMap::new(),
            name_converter: self.name_converter,
        };
        table.validate()?;
        let nested = table
            .classes
            .keys()
            .map(|name| Ok((name.clone(), table.collect_nested_paths(name)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        table.nested = nested;
        Ok(table)
    }
}

impl ClassTable {
    pub fn builder() -> ClassTableBuilder {
        ClassTableBuilder::default()
    }

    /// Load `{"classes": {...}}`; errors carry the JSON path of the offending node.
    pub fn from_json_str(src: &str) -> Result<Self> {
        let de = &mut serde_json::Deserializer::from_str(src);
        let doc: TableDoc = serde_path_to_error::deserialize(de).map_err(|err| NormalizerError::Schema {
            path: err.path().to_string(),
            message: err.into_inner().to_string(),
        })?;
        let mut builder = ClassTable::builder();
        builder.classes = doc.classes;
        builder.build()
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// `class`, then its parent, grandparent, ...
    ///
    /// Everything yielded borrows from the table, never from `class`.
    fn lineage<'s>(&'s self, class: &str) -> impl Iterator<Item = (&'s str, &'s ClassDef)> + use<'s> {
        let mut next = self.classes.get_key_value(class);
        std::iter::from_fn(move || {
            let (key, def) = next?;
            next = def.parent.as_deref().and_then(|parent| self.classes.get_key_value(parent));
            Some((key.as_str(), def))
        })
    }

    fn property(&self, class: &str, name: &str) -> Option<&PropertyDef> {
        self.lineage(class).find_map(|(_, def)| def.properties.get(name))
    }

    /// Inherited properties first, overridden by descendants in place.
    fn properties(&self, class: &str) -> IndexMap<&str, &PropertyDef> {
        let chain: Vec<_> = self.lineage(class).collect();
        let mut out = IndexMap::new();
        for (_, def) in chain.into_iter().rev() {
            for (name, prop) in &def.properties {
                out.insert(name.as_str(), prop);
            }
        }
        out
    }

    fn validate(&self) -> Result<()> {
        let schema = |path: String, message: String| NormalizerError::Schema { path, message };
        for (name, def) in &self.classes {
            if let Some(parent) = &def.parent {
                if !self.classes.contains_key(parent) {
                    return Err(schema(format!("classes.{name}.parent"), format!("unknown parent class \"{parent}\"")));
                }
            }
            if self.lineage(name).take(self.classes.len() + 1).count() > self.classes.len() {
                return Err(schema(format!("classes.{name}.parent"), "inheritance cycle".into()));
            }
            if let Some(mapping) = &def.discriminator {
                for target in mapping.classes() {
                    if !self.classes.contains_key(target) {
                        return Err(schema(
                            format!("classes.{name}.discriminator.mapping"),
                            format!("unknown mapped class \"{target}\""),
                        ));
                    }
                }
            }
            for (prop, pdef) in &def.properties {
                for t in &pdef.types {
                    t.validate().map_err(|m| schema(format!("classes.{name}.properties.{prop}.types"), m))?;
                }
            }
            for arg in &def.constructor {
                if self.property(name, &arg.name).is_none() {
                    return Err(schema(
                        format!("classes.{name}.constructor"),
                        format!("constructor argument \"{}\" is not a property", arg.name),
                    ));
                }
            }
        }
        Ok(())
    }

    fn collect_nested_paths(&self, class: &str) -> Result<NestedPathMap> {
        NestedPathMap::from_paths(
            self.properties(class)
                .into_iter()
                .filter_map(|(name, p)| p.serialized_path.clone().map(|path| (name.to_string(), path))),
        )
    }

    fn constructor_args(&self, class: &str) -> &[ConstructorArg] {
        self.lineage(class)
            .map(|(_, def)| def.constructor.as_slice())
            .find(|args| !args.is_empty())
            .unwrap_or(&[])
    }

    /// Does `value` satisfy `ty`? Used to police property writes.
    pub fn fits(&self, value: &Data, ty: &TypeDescriptor) -> bool {
        match value {
            Data::Null => ty.nullable || ty.builtin == Builtin::Null,
            Data::Bool(b) => match ty.builtin {
                Builtin::Bool => true,
                Builtin::True => *b,
                Builtin::False => !*b,
                _ => false,
            },
            // int widens to float
            Data::Int(_) => matches!(ty.builtin, Builtin::Int | Builtin::Float),
            Data::Float(_) => ty.builtin == Builtin::Float,
            Data::String(_) => ty.builtin == Builtin::String,
            Data::List(items) => ty.builtin == Builtin::Array && self.elements_fit(items.iter(), ty),
            Data::Map(map) => ty.builtin == Builtin::Array && self.elements_fit(map.values(), ty),
            Data::Object(o) => {
                ty.builtin == Builtin::Object
                    && ty.class_name.as_deref().is_none_or(|c| self.is_a(o.class().as_str(), c))
            }
            Data::Collection(c) => {
                ty.builtin == Builtin::Object
                    && ty.class_name.as_deref().is_none_or(|n| n == ORDERED_COLLECTION)
                    && self.elements_fit(c.iter().map(|(_, v)| v), ty)
            }
            Data::DateTime(_) => {
                ty.builtin == Builtin::Object
                    && ty.class_name.as_deref().is_none_or(|n| DATETIME_CLASSES.contains(&n))
            }
        }
    }

    fn elements_fit<'a>(&self, mut items: impl Iterator<Item = &'a Data>, ty: &TypeDescriptor) -> bool {
        match ty.collection_value_type() {
            Some(vt) => items.all(|v| self.fits(v, vt)),
            None => true,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// COLLABORATOR IMPLEMENTATIONS
// ————————————————————————————————————————————————————————————————————————————

impl MetadataProvider for ClassTable {
    fn has_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    fn is_a(&self, class: &str, ancestor: &str) -> bool {
        self.lineage(class).any(|(name, _)| name == ancestor)
    }

    fn types_of(&self, class: &str, attribute: &str) -> Option<AttributeTypes> {
        self.property(class, attribute)
            .and_then(|p| AttributeTypes::new(p.types.clone()))
    }

    fn allowed_attributes(&self, class: &str, context: &NormalizationContext) -> AllowedAttributes {
        if !self.has_class(class) {
            return AllowedAttributes::All;
        }
        let groups = context.options.groups.as_deref();
        let only = context.options.attributes.as_deref();
        let set: IndexSet<String> = self
            .properties(class)
            .into_iter()
            .filter(|(_, p)| !p.ignore)
            .filter(|(_, p)| match groups {
                None => true,
                Some(gs) => gs.iter().any(|g| g == "*" || p.groups.contains(g)),
            })
            .filter(|(name, _)| only.is_none_or(|names| names.iter().any(|n| n == name)))
            .map(|(name, _)| name.to_string())
            .collect();
        AllowedAttributes::Only(set)
    }

    fn nested_paths(&self, class: &str) -> Result<NestedPathMap> {
        match self.nested.get(class) {
            Some(map) => Ok(map.clone()),
            None => Ok(NestedPathMap::default()),
        }
    }

    fn attribute_name_for(&self, wire_key: &str, class: &str) -> String {
        let renamed = self
            .properties(class)
            .into_iter()
            .find(|(_, p)| p.serialized_name.as_deref() == Some(wire_key))
            .map(|(name, _)| name.to_string());
        match (renamed, &self.name_converter) {
            (Some(name), _) => name,
            (None, Some(conv)) => conv.denormalize(wire_key),
            (None, None) => wire_key.to_string(),
        }
    }

    fn wire_key_for(&self, attribute: &str, class: &str) -> String {
        if let Some(name) = self.property(class, attribute).and_then(|p| p.serialized_name.clone()) {
            return name;
        }
        match &self.name_converter {
            Some(conv) => conv.normalize(attribute),
            None => attribute.to_string(),
        }
    }

    fn is_association(&self, class: &str, attribute: &str) -> bool {
        self.property(class, attribute).is_some_and(|p| p.association)
    }
}

impl DiscriminatorProvider for ClassTable {
    fn mapping_for(&self, class: &str) -> Option<DiscriminatorMapping> {
        self.class(class).and_then(|def| def.discriminator.clone())
    }

    fn mapping_for_mapped_class(&self, class: &str) -> Option<DiscriminatorMapping> {
        self.lineage(class).find_map(|(_, def)| def.discriminator.clone())
    }
}

impl Instantiator for ClassTable {
    fn instantiate(
        &self,
        class: &str,
        data: &mut Mapping,
        context: &NormalizationContext,
        allowed: &AllowedAttributes,
        _format: Option<&Format>,
    ) -> Result<ObjectRef> {
        if let Some(target) = context.object_to_populate() {
            if self.is_a(&target.class(), class) {
                return Ok(target.clone());
            }
        }
        let def = self.class(class).ok_or_else(|| NormalizerError::UnknownClass(class.to_string()))?;
        if def.is_abstract {
            return Err(NormalizerError::unexpected_type(
                format!("cannot create an instance of \"{class}\" from serialized data because it is an abstract class"),
                vec![class.to_string()],
                "array",
                context.path().map(str::to_string),
            ));
        }

        let mut missing = Vec::new();
        for arg in self.constructor_args(class) {
            let key = self.wire_key_for(&arg.name, class);
            let usable = allowed.contains(&arg.name) && !context.is_ignored(&arg.name);
            if usable && data.contains_key(&key) {
                continue;
            }
            if let Some(default) = &arg.default {
                if usable {
                    data.insert(key, Value::from(default.clone()));
                }
            } else if self.types_of(class, &arg.name).is_some_and(|t| t.any_nullable()) {
                if usable {
                    data.insert(key, Value::Null);
                }
            } else {
                missing.push(arg.name.clone());
            }
        }
        if !missing.is_empty() {
            return Err(NormalizerError::MissingConstructorArguments { class: class.to_string(), arguments: missing });
        }
        Ok(ObjectRef::new(Object::new(class)))
    }
}

impl PropertyAccessor for ClassTable {
    fn get(&self, object: &ObjectRef, name: &str) -> Option<Data> {
        let class = object.class();
        if self.has_class(&class) && self.property(&class, name).is_none() {
            return None;
        }
        match object.get(name) {
            Some(v) => Some(v),
            None if self.has_class(&class) => Some(Data::Null),
            None => None,
        }
    }

    fn set(&self, object: &ObjectRef, name: &str, value: Data) -> Result<(), AccessError> {
        let class = object.class();
        if self.has_class(&class) {
            let Some(prop) = self.property(&class, name) else {
                return Err(AccessError::NoSuchProperty { class, property: name.to_string() });
            };
            if !prop.types.is_empty() && !prop.types.iter().any(|t| self.fits(&value, t)) {
                return Err(AccessError::InvalidType {
                    property: name.to_string(),
                    expected: prop.types.iter().map(TypeDescriptor::display_name).collect::<Vec<_>>().join("|"),
                    given: value.type_name(),
                });
            }
        }
        object.borrow_mut().set(name, value);
        Ok(())
    }

    fn readable(&self, object: &ObjectRef) -> Vec<String> {
        let class = object.class();
        if !self.has_class(&class) {
            return object.borrow().field_names().map(str::to_string).collect();
        }
        self.properties(&class)
            .into_iter()
            .filter(|(_, p)| !p.ignore)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}
