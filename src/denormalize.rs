//! Generic value -> typed object graph.
//!
//! Two mutually recursive halves: [`GraphDenormalizer::denormalize_object`]
//! builds one object from a mapping, and
//! [`GraphDenormalizer::resolve_attribute_value`] turns one raw attribute
//! value into a typed value by trying every member of its declared union.
//! Nested objects go back through the composing serializer so adapters can
//! claim them.
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::coerce::{AttributeSite, ScalarCoercer};
use crate::context::NormalizationContext;
use crate::discriminator::DiscriminatorResolver;
use crate::error::{AccessError, NormalizerError, Result};
use crate::metadata::{AllowedAttributes, DiscriminatorProvider, Instantiator, MetadataProvider, PropertyAccessor};
use crate::object::{CollectionKey, Data};
use crate::registry::ClassTable;
use crate::resolve::{AllowedAttributesCache, TypeResolver};
use crate::serializer::{Compose, Denormalizer};
use crate::types::{AttributeTypes, Builtin, Format, NestedPathMap, TypeDescriptor};
use crate::value::{Mapping, Value};

/// Element types carried into the context of a nested container.
type ElementTypes = (Option<TypeDescriptor>, Option<TypeDescriptor>);

pub struct GraphDenormalizer {
    metadata: Option<Arc<dyn MetadataProvider>>,
    discriminators: Option<Arc<dyn DiscriminatorProvider>>,
    instantiator: Arc<dyn Instantiator>,
    accessor: Arc<dyn PropertyAccessor>,
    types: TypeResolver,
    discriminator: DiscriminatorResolver,
    coercer: ScalarCoercer,
    allowed: AllowedAttributesCache,
}

impl GraphDenormalizer {
    pub fn new(instantiator: Arc<dyn Instantiator>, accessor: Arc<dyn PropertyAccessor>) -> Self {
        Self {
            metadata: None,
            discriminators: None,
            instantiator,
            accessor,
            types: TypeResolver::new(None, None),
            discriminator: DiscriminatorResolver::new(None),
            coercer: ScalarCoercer,
            allowed: AllowedAttributesCache::default(),
        }
    }

    pub fn from_class_table(table: Arc<ClassTable>) -> Self {
        Self::new(table.clone(), table.clone())
            .with_metadata(table.clone())
            .with_discriminators(table)
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(metadata);
        self.types = TypeResolver::new(self.metadata.clone(), self.discriminators.clone());
        self
    }

    pub fn with_discriminators(mut self, discriminators: Arc<dyn DiscriminatorProvider>) -> Self {
        self.discriminators = Some(discriminators);
        self.types = TypeResolver::new(self.metadata.clone(), self.discriminators.clone());
        self.discriminator = DiscriminatorResolver::new(self.discriminators.clone());
        self
    }

    // ————————————————————————————————————————————————————————————————————————
    // OBJECTS
    // ————————————————————————————————————————————————————————————————————————

    pub fn denormalize_object(
        &self,
        data: Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
    ) -> Result<Data> {
        let mut context = context.clone();
        let cache_key = context.cache_key(format);
        context.set_cache_key(cache_key);

        if data.is_null() && context.value_type().is_some_and(|t| t.nullable) {
            return Ok(Data::Null);
        }

        let allowed = self.allowed_attributes(target, &context, format);
        let mut data = Self::prepare(data, target, &context)?;
        let mapped = self.discriminator.mapped_class(target, &data, &context)?;

        let nested_paths = match &self.metadata {
            Some(metadata) => metadata.nested_paths(&mapped)?,
            None => NestedPathMap::default(),
        };
        let nested = Self::extract_nested(&mut data, &nested_paths);

        let object = self.instantiator.instantiate(&mapped, &mut data, &context, &allowed, format)?;
        let resolved = object.class();

        let mut extra_attributes = Vec::new();
        for (key, raw) in data {
            let attribute = match &self.metadata {
                Some(metadata) => metadata.attribute_name_for(&key, &resolved),
                None => key.clone(),
            };
            if nested.contains_key(&key) && !nested.contains_key(&attribute) {
                return Err(NormalizerError::DuplicateSerializedName {
                    path: nested_paths.get(&key).map(|p| p.join("->")).unwrap_or_default(),
                    key,
                    name: attribute,
                });
            }

            if !allowed.contains(&attribute) || context.is_ignored(&attribute) {
                if context.options.allow_extra_attributes {
                    tracing::trace!(class = %resolved, attribute = %attribute, "ignoring extra attribute");
                } else {
                    extra_attributes.push(attribute);
                }
                continue;
            }

            let mut attribute_context = context.child(&attribute);
            if context.options.deep_object_to_populate {
                if let Some(Data::Object(current)) = self.accessor.get(&object, &attribute) {
                    attribute_context.set_object_to_populate(Some(current));
                }
            }

            let value = match self.types.resolve(&resolved, &attribute) {
                Some(types) => {
                    match self.resolve_attribute_value(&types, &resolved, &attribute, raw, format, &attribute_context, composer) {
                        Ok(value) => value,
                        Err(err) => {
                            Self::collect(&context, err)?;
                            continue;
                        }
                    }
                }
                None => Data::from(raw),
            };
            let value = apply_callback(value, &attribute, format, &attribute_context)?;

            let given = value.type_name();
            match self.accessor.set(&object, &attribute, value) {
                Ok(()) => {}
                Err(AccessError::NoSuchProperty { .. }) => {
                    tracing::trace!(class = %resolved, attribute = %attribute, "no such property, value dropped");
                }
                Err(err) => {
                    let err = NormalizerError::NotNormalizableValue {
                        message: format!("failed to denormalize attribute \"{attribute}\" value for class \"{target}\": {err}"),
                        path: attribute_context.path().map(str::to_string),
                        expected: vec!["unknown".to_string()],
                        actual: given,
                        source: Some(err),
                    };
                    Self::collect(&context, err)?;
                }
            }
        }

        if !extra_attributes.is_empty() {
            return Err(NormalizerError::ExtraAttributes { attributes: extra_attributes });
        }
        Ok(Data::Object(object))
    }

    /// Allowed set of `class`, widened by the discriminator: the type property
    /// plus everything any mapped subclass accepts.
    fn allowed_attributes(&self, class: &str, context: &NormalizationContext, format: Option<&Format>) -> AllowedAttributes {
        let Some(metadata) = &self.metadata else {
            return AllowedAttributes::All;
        };
        self.allowed.get_or_compute(class, context.cache_key(format), || {
            let mut allowed = metadata.allowed_attributes(class, context);
            if let (AllowedAttributes::Only(set), Some(discriminators)) = (&mut allowed, &self.discriminators) {
                if let Some(mapping) = discriminators.mapping_for_mapped_class(class) {
                    set.insert(mapping.type_property);
                }
                if let Some(mapping) = discriminators.mapping_for(class) {
                    for mapped in mapping.classes() {
                        match metadata.allowed_attributes(mapped, context) {
                            AllowedAttributes::All => return AllowedAttributes::All,
                            AllowedAttributes::Only(more) => set.extend(more),
                        }
                    }
                }
            }
            allowed
        })
    }

    fn prepare(data: Value, target: &str, context: &NormalizationContext) -> Result<Mapping> {
        match data {
            Value::Mapping(m) => Ok(m),
            Value::Null => Ok(Mapping::new()),
            Value::Sequence(items) => Ok(items.into_iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect()),
            other => Err(NormalizerError::unexpected_type(
                format!("data expected to be \"array\" to build \"{target}\", \"{}\" given", other.kind_name()),
                vec!["array".to_string()],
                other.kind_name(),
                context.path().map(str::to_string),
            )),
        }
    }

    /// Pull nested-path values up to the top level under their property name.
    /// Emptied parents are removed, so `address` disappears once `address.city`
    /// was its only entry.
    fn extract_nested(data: &mut Mapping, paths: &NestedPathMap) -> Mapping {
        let mut nested = Mapping::new();
        if paths.is_empty() {
            return nested;
        }
        let mut root = Value::Mapping(std::mem::take(data));
        for (property, path) in paths.iter() {
            match root.get_path(path) {
                None | Some(Value::Null) => continue,
                Some(v) => {
                    nested.insert(property.to_string(), v.clone());
                    root.remove_path(path);
                }
            }
        }
        if let Value::Mapping(m) = root {
            *data = m;
        }
        for (property, v) in &nested {
            data.insert(property.clone(), v.clone());
        }
        nested
    }

    fn collect(context: &NormalizationContext, err: NormalizerError) -> Result<()> {
        match context.errors() {
            Some(sink) if err.is_collectable() => {
                sink.push(err);
                Ok(())
            }
            _ => Err(err),
        }
    }

    // ————————————————————————————————————————————————————————————————————————
    // UNIONS
    // ————————————————————————————————————————————————————————————————————————

    /// First candidate that accepts `data` wins. Candidate failures stay local
    /// unless the attribute is not a union.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_attribute_value(
        &self,
        types: &AttributeTypes,
        class: &str,
        attribute: &str,
        data: Value,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
    ) -> Result<Data> {
        if data.is_null() && types.any_nullable() {
            return Ok(Data::Null);
        }

        let is_union = types.is_union();
        let site = AttributeSite { class, attribute, path: context.path() };
        let mut expected: IndexSet<String> = IndexSet::new();
        let mut deferred: Option<NormalizerError> = None;

        for ty in types {
            match self.try_candidate(ty, &data, format, context, composer, &site, &mut expected) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) if err.is_fatal() || !is_union => return Err(err),
                Err(err @ (NormalizerError::ExtraAttributes { .. } | NormalizerError::MissingConstructorArguments { .. })) => {
                    tracing::debug!(class, attribute, candidate = %ty.display_name(), error = %err, "union candidate rejected");
                    deferred.get_or_insert(err);
                }
                Err(err) if err.is_collectable() => {
                    tracing::debug!(class, attribute, candidate = %ty.display_name(), error = %err, "union candidate rejected");
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(err) = deferred {
            return Err(err);
        }
        if context.options.disable_type_enforcement {
            return Ok(Data::from(data));
        }

        let expected: Vec<String> = expected.into_iter().collect();
        Err(NormalizerError::NotNormalizableValue {
            message: format!(
                "the type of the \"{attribute}\" attribute for class \"{class}\" must be one of \"{}\" (\"{}\" given)",
                expected.join("\", \""),
                data.kind_name()
            ),
            path: Some(context.path().unwrap_or(attribute).to_string()),
            expected,
            actual: data.kind_name().to_string(),
            source: None,
        })
    }

    /// `Ok(None)`: plain kind mismatch, try the next candidate.
    #[allow(clippy::too_many_arguments)]
    fn try_candidate(
        &self,
        ty: &TypeDescriptor,
        data: &Value,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
        site: &AttributeSite<'_>,
        expected: &mut IndexSet<String>,
    ) -> Result<Option<Data>> {
        let mut data = data.clone();
        if format.is_some_and(Format::collapses_single_nodes)
            && ty.collection_value_type().is_some()
            && !matches!(data, Value::Sequence(_))
        {
            data = Value::Sequence(vec![data]);
        }

        if let Some(coerced) = self.coercer.coerce(&data, ty, format, site)? {
            return Ok(Some(Data::from(coerced)));
        }

        let (builtin, class, elements) = effective_target(ty);
        expected.insert(match (builtin, &class) {
            (Builtin::Object, Some(class)) => class.clone(),
            _ => ty.display_name(),
        });

        if let (Builtin::Object, Some(class)) = (builtin, &class) {
            let composer = composer.ok_or_else(|| NormalizerError::NotADenormalizer { what: class.clone() })?;
            let mut child = context.clone();
            if let Some((key, value)) = elements {
                child.set_element_types(key, value);
            }
            if composer.supports_denormalization(&data, class, format, &child) {
                return composer.denormalize(data, class, format, &child).map(Some);
            }
        }

        // one JSON number type: ints widen to floats
        if let (Builtin::Float, Value::Int(i)) = (builtin, &data) {
            if format.is_some_and(Format::is_json_like) {
                return Ok(Some(Data::from(*i as f64)));
            }
        }

        if builtin == Builtin::Array {
            if let Some(value_type) = ty.collection_value_type() {
                return self.resolve_elements(ty, value_type, data, format, context, composer, site);
            }
        }

        // literal true/false and the plain native kinds
        if builtin.matches(&data) {
            return Ok(Some(Data::from(data)));
        }
        Ok(None)
    }
}

impl GraphDenormalizer {
    /// Typed scalar arrays: every element goes through its own union
    /// resolution, so string formats get per-element coercion.
    /// `Ok(None)` when `data` is not an array or its keys do not fit.
    #[allow(clippy::too_many_arguments)]
    fn resolve_elements(
        &self,
        ty: &TypeDescriptor,
        value_type: &TypeDescriptor,
        data: Value,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
        site: &AttributeSite<'_>,
    ) -> Result<Option<Data>> {
        let element_types = AttributeTypes::single(value_type.clone());
        let key_builtin = ty.collection_key_type().map(|k| k.builtin);
        let element = |key: &str, item: Value| {
            self.resolve_attribute_value(
                &element_types,
                site.class,
                site.attribute,
                item,
                format,
                &context.element(key),
                composer,
            )
        };
        match data {
            Value::Sequence(items) => {
                if key_builtin == Some(Builtin::String) {
                    return Ok(None);
                }
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    out.push(element(&i.to_string(), item)?);
                }
                Ok(Some(Data::List(out)))
            }
            Value::Mapping(map) => {
                let keys_fit = |want_index: bool| map.keys().all(|k| CollectionKey::is_index_key(k) == want_index);
                match key_builtin {
                    Some(Builtin::Int) if !keys_fit(true) => return Ok(None),
                    Some(Builtin::String) if !keys_fit(false) => return Ok(None),
                    _ => {}
                }
                let mut out = IndexMap::with_capacity(map.len());
                for (key, item) in map {
                    let value = element(&key, item)?;
                    out.insert(key, value);
                }
                Ok(Some(Data::Map(out)))
            }
            _ => Ok(None),
        }
    }
}

/// Kind and class a candidate denormalizes as:
/// collection class of objects > `Class[]` > `Class[][]...` > the candidate itself.
fn effective_target(ty: &TypeDescriptor) -> (Builtin, Option<String>, Option<ElementTypes>) {
    if let Some(value_type) = ty.collection_value_type() {
        let elements = Some((ty.collection_key_type().cloned(), Some(value_type.clone())));
        if ty.builtin == Builtin::Object {
            return (Builtin::Object, ty.class_name.clone(), elements);
        }
        if let (Builtin::Object, Some(class)) = (value_type.builtin, &value_type.class_name) {
            return (Builtin::Object, Some(format!("{class}[]")), elements);
        }
    }

    if let Some(first) = ty.value_types.first().filter(|v| ty.collection && v.builtin == Builtin::Array) {
        let mut inner = first;
        let mut dimensions = String::from("[]");
        while inner.builtin == Builtin::Array {
            let Some(next) = inner.value_types.first() else {
                break;
            };
            dimensions.push_str("[]");
            inner = next;
        }
        if let Some(class) = &inner.class_name {
            return (inner.builtin, Some(format!("{class}{dimensions}")), None);
        }
    }

    (ty.builtin, ty.class_name.clone(), None)
}

pub(crate) fn apply_callback(
    value: Data,
    attribute: &str,
    format: Option<&Format>,
    context: &NormalizationContext,
) -> Result<Data> {
    let Some(callback) = context.callback(attribute) else {
        return Ok(value);
    };
    tracing::trace!(attribute, "applying value callback");
    callback(value, attribute, format).map_err(|source| NormalizerError::Callback { attribute: attribute.to_string(), source })
}

impl Denormalizer for GraphDenormalizer {
    fn supports_denormalization(
        &self,
        _data: &Value,
        target: &str,
        _format: Option<&Format>,
        _context: &NormalizationContext,
        _composer: Option<&dyn Compose>,
    ) -> bool {
        !target.ends_with("[]") && self.metadata.as_ref().is_none_or(|m| m.has_class(target))
    }

    fn denormalize(
        &self,
        data: Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
    ) -> Result<Data> {
        self.denormalize_object(data, target, format, context, composer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextOptions;
    use crate::metadata::CamelCaseToSnakeCase;
    use crate::object::{Object, ObjectRef};
    use crate::registry::{ClassDef, PropertyDef};
    use crate::testing::{serializer, value, zoo};
    use serde_json::json;

    fn denormalize(json: serde_json::Value, target: &str, format: Format) -> Result<Data> {
        let s = serializer();
        s.denormalize(value(json), target, Some(&format), &s.context())
    }

    fn object(data: Data) -> ObjectRef {
        match data {
            Data::Object(o) => o,
            other => panic!("expected an object, got {other:?}"),
        }
    }

    #[test]
    fn discriminator_picks_the_subclass() {
        let cat = object(denormalize(json!({"type": "cat", "name": "Tom"}), "Animal", Format::Json).unwrap());
        assert_eq!(cat.class(), "Cat");
        assert_eq!(cat.get("name"), Some(Data::from("Tom")));

        let err = denormalize(json!({"type": "fish", "name": "Nemo"}), "Animal", Format::Json).unwrap_err();
        assert!(matches!(err, NormalizerError::UnknownDiscriminatorValue { .. }));
    }

    #[test]
    fn subclass_attributes_are_allowed_through_the_base() {
        let s = serializer();
        let ctx = s.context().disallow_extra_attributes();
        let cat = s.denormalize(value(json!({"type": "cat", "lives": 9})), "Animal", None, &ctx).unwrap();
        assert_eq!(object(cat).get("lives"), Some(Data::Int(9)));
    }

    #[test]
    fn first_successful_candidate_wins() {
        let tom = object(denormalize(json!({"resident": "Tom"}), "Shelter", Format::Json).unwrap());
        assert_eq!(tom.get("resident"), Some(Data::from("Tom")));

        let shelter = object(denormalize(json!({"resident": {"name": "Tom"}}), "Shelter", Format::Json).unwrap());
        let resident = object(shelter.get("resident").unwrap());
        assert_eq!(resident.class(), "Cat");

        let reading = object(denormalize(json!({"value": 1.5}), "Reading", Format::Json).unwrap());
        assert_eq!(reading.get("value"), Some(Data::from(1.5)));
    }

    #[test]
    fn exhausted_union_lists_every_candidate() {
        let err = denormalize(json!({"value": "x"}), "Reading", Format::Json).unwrap_err();
        match err {
            NormalizerError::NotNormalizableValue { message, expected, actual, path, .. } => {
                assert_eq!(expected, vec!["int", "float"]);
                assert_eq!(actual, "string");
                assert_eq!(path.as_deref(), Some("value"));
                assert_eq!(
                    message,
                    "the type of the \"value\" attribute for class \"Reading\" must be one of \"int\", \"float\" (\"string\" given)"
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn string_scalar_formats_are_coerced() {
        let r = object(
            denormalize(json!({"value": "3", "flag": "0", "ratio": "1.5"}), "Reading", Format::Xml).unwrap(),
        );
        assert_eq!(r.get("value"), Some(Data::Int(3)));
        assert_eq!(r.get("flag"), Some(Data::Bool(false)));
        assert_eq!(r.get("ratio"), Some(Data::from(1.5)));

        let err = denormalize(json!({"ratio": "abc"}), "Reading", Format::Xml).unwrap_err();
        assert!(matches!(err, NormalizerError::InvalidScalar { expected: Builtin::Float, .. }));

        let csv = object(denormalize(json!({"tags": ""}), "Reading", Format::Csv).unwrap());
        assert_eq!(csv.get("tags"), Some(Data::List(vec![])));

        let p = object(denormalize(json!({"birth_year": ""}), "Person", Format::Csv).unwrap());
        assert_eq!(p.get("birthYear"), Some(Data::Null));
    }

    #[test]
    fn xml_single_node_becomes_a_list() {
        let s = object(denormalize(json!({"cats": {"name": "Tom"}}), "Shelter", Format::Xml).unwrap());
        match s.get("cats") {
            Some(Data::List(cats)) => assert_eq!(cats.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn json_ints_widen_to_floats() {
        let r = object(denormalize(json!({"ratio": 2}), "Reading", Format::Json).unwrap());
        assert_eq!(r.get("ratio"), Some(Data::from(2.0)));
        assert!(denormalize(json!({"ratio": 2}), "Reading", Format::Xml).is_err());
    }

    #[test]
    fn literal_true_accepts_only_true() {
        let r = object(denormalize(json!({"on": true}), "Reading", Format::Json).unwrap());
        assert_eq!(r.get("on"), Some(Data::Bool(true)));
        assert!(denormalize(json!({"on": false}), "Reading", Format::Json).is_err());
    }

    #[test]
    fn nested_paths_are_flattened_and_consumed() {
        let s = serializer();
        let ctx = s.context().disallow_extra_attributes();
        let p = s
            .denormalize(value(json!({"address": {"city": "Lyon"}, "other": 1})), "Person", None, &ctx)
            .unwrap();
        let p = object(p);
        assert_eq!(p.get("city"), Some(Data::from("Lyon")));
        assert_eq!(p.get("other"), Some(Data::Int(1)));

        // a sibling under `address` keeps the parent alive
        let err = s
            .denormalize(value(json!({"address": {"city": "Lyon", "zip": "1"}})), "Person", None, &ctx)
            .unwrap_err();
        assert!(matches!(err, NormalizerError::ExtraAttributes { ref attributes } if attributes == &["address"]));
    }

    #[test]
    fn extra_attributes_are_reported_together() {
        let s = serializer();
        let ctx = s.context().disallow_extra_attributes();
        let err = s.denormalize(value(json!({"a": 1, "b": 2})), "Cat", None, &ctx).unwrap_err();
        match err {
            NormalizerError::ExtraAttributes { attributes } => assert_eq!(attributes, vec!["a", "b"]),
            other => panic!("unexpected {other:?}"),
        }
        // allowed by default
        assert!(s.denormalize(value(json!({"a": 1})), "Cat", None, &s.context()).is_ok());
    }

    #[test]
    fn converted_nested_name_collision_is_fatal() {
        let table = ClassTable::builder()
            .name_converter(CamelCaseToSnakeCase::new())
            .class("Place", ClassDef::new().property("home_city", PropertyDef::untyped().at_path(["address", "city"])))
            .build()
            .unwrap();
        let d = GraphDenormalizer::from_class_table(Arc::new(table));
        let err = d
            .denormalize_object(value(json!({"address": {"city": "Lyon"}})), "Place", None, &NormalizationContext::new(), None)
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, NormalizerError::DuplicateSerializedName { ref key, ref name, .. }
            if key == "home_city" && name == "homeCity"));
    }

    #[test]
    fn collections_arrays_and_maps() {
        let s = object(
            denormalize(
                json!({
                    "animals": [{"type": "cat", "name": "Tom"}, {"type": "dog", "name": "Rex", "good": true}],
                    "grid": [[{"name": "A"}, {"name": "B"}]],
                    "counts": {"a": 1}
                }),
                "Shelter",
                Format::Json,
            )
            .unwrap(),
        );
        match s.get("animals") {
            Some(Data::Collection(c)) => {
                assert_eq!(c.len(), 2);
                let classes: Vec<_> = c.iter().filter_map(|(_, v)| v.as_object().map(ObjectRef::class)).collect();
                assert_eq!(classes, vec!["Cat", "Dog"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match s.get("grid") {
            Some(Data::List(rows)) => assert!(matches!(&rows[0], Data::List(row) if row.len() == 2)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(s.get("counts"), Some(Data::Map(_))));
    }

    #[test]
    fn rejected_writes_keep_the_access_error() {
        let s = serializer();
        let ctx = s.context().with_callback("ratio", |_, _, _| Ok(Data::from("wide")));
        let err = s.denormalize(value(json!({"ratio": 1.5})), "Reading", None, &ctx).unwrap_err();
        match err {
            NormalizerError::NotNormalizableValue { source, path, .. } => {
                assert!(matches!(source, Some(AccessError::InvalidType { .. })));
                assert_eq!(path.as_deref(), Some("ratio"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn typed_scalar_arrays_are_resolved_per_element() {
        let csv = object(denormalize(json!({"counts": {"a": "1", "b": "2"}}), "Shelter", Format::Csv).unwrap());
        let counts = IndexMap::from([("a".to_string(), Data::Int(1)), ("b".to_string(), Data::Int(2))]);
        assert_eq!(csv.get("counts"), Some(Data::Map(counts)));

        let xml = object(denormalize(json!({"tags": "solo"}), "Reading", Format::Xml).unwrap());
        assert_eq!(xml.get("tags"), Some(Data::List(vec![Data::from("solo")])));

        let err = denormalize(json!({"tags": ["ok", 1]}), "Reading", Format::Json).unwrap_err();
        match err {
            NormalizerError::NotNormalizableValue { expected, path, .. } => {
                assert_eq!(expected, vec!["string"]);
                assert_eq!(path.as_deref(), Some("tags[1]"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = denormalize(json!({"counts": [1]}), "Shelter", Format::Json).unwrap_err();
        assert!(matches!(err, NormalizerError::NotNormalizableValue { ref message, .. } if message.contains("\"int[]\"")));
    }

    #[test]
    fn missing_constructor_arguments() {
        let err = denormalize(json!({}), "Ticket", Format::Json).unwrap_err();
        assert!(matches!(err, NormalizerError::MissingConstructorArguments { .. }));
        let t = object(denormalize(json!({"code": "A1", "seat": 4}), "Ticket", Format::Json).unwrap());
        assert_eq!(t.get("price"), Some(Data::Int(10)));
    }

    #[test]
    fn exhausted_unions_report_the_first_structural_failure() {
        let s = serializer();
        let strict = s.context().disallow_extra_attributes();

        // Ticket lacks constructor arguments, Cat has an extra key: Ticket's failure wins.
        let err = s.denormalize(value(json!({"item": {"zzz": 1}})), "Booking", None, &strict).unwrap_err();
        assert!(matches!(err, NormalizerError::MissingConstructorArguments { .. }), "{err:?}");

        // both reject extras; Cat would report code and seat as well
        let input = value(json!({"item": {"code": "A1", "seat": 4, "zzz": 1}}));
        let err = s.denormalize(input, "Booking", None, &strict).unwrap_err();
        assert!(matches!(err, NormalizerError::ExtraAttributes { ref attributes } if attributes == &["zzz"]), "{err:?}");

        // a later candidate that succeeds still wins
        let booking = object(s.denormalize(value(json!({"item": {"name": "Tom"}})), "Booking", None, &strict).unwrap());
        let item = booking.get("item").and_then(|d| d.as_object().cloned()).unwrap();
        assert_eq!(item.class(), "Cat");
        assert_eq!(item.get("name"), Some(Data::from("Tom")));
    }

    #[test]
    fn nullable_null_short_circuits() {
        let s = object(denormalize(json!({"keeper": null}), "Shelter", Format::Json).unwrap());
        assert_eq!(s.get("keeper"), Some(Data::Null));
    }

    #[test]
    fn disabled_type_enforcement_returns_the_raw_value() {
        let table = Arc::new(zoo());
        let d = GraphDenormalizer::from_class_table(table);
        let types = AttributeTypes::single(TypeDescriptor::builtin(Builtin::Int));
        let ctx = NormalizationContext::with_options(ContextOptions {
            disable_type_enforcement: true,
            ..ContextOptions::default()
        });
        let out = d.resolve_attribute_value(&types, "Reading", "value", Value::from("x"), None, &ctx, None).unwrap();
        assert_eq!(out, Data::from("x"));
    }

    #[test]
    fn object_candidates_need_a_composer() {
        let d = GraphDenormalizer::from_class_table(Arc::new(zoo()));
        let types = AttributeTypes::single(TypeDescriptor::object("Cat"));
        let err = d
            .resolve_attribute_value(&types, "Shelter", "resident", value(json!({})), None, &NormalizationContext::new(), None)
            .unwrap_err();
        assert!(matches!(err, NormalizerError::NotADenormalizer { .. }));
    }

    #[test]
    fn deep_population_reuses_nested_objects() {
        let keeper = ObjectRef::new(Object::new("Person").with("name", "Ann"));
        let shelter = ObjectRef::new(Object::new("Shelter").with("keeper", keeper.clone()));
        let s = serializer();
        let mut ctx = s.context().with_object_to_populate(shelter.clone());
        ctx.options.deep_object_to_populate = true;
        let out = s.denormalize(value(json!({"keeper": {"other": 5}})), "Shelter", None, &ctx).unwrap();
        assert!(object(out).ptr_eq(&shelter));
        let kept = object(shelter.get("keeper").unwrap());
        assert!(kept.ptr_eq(&keeper));
        assert_eq!(keeper.get("other"), Some(Data::Int(5)));
        assert_eq!(keeper.get("name"), Some(Data::from("Ann")));
    }

    #[test]
    fn callbacks_transform_values() {
        let s = serializer();
        let ctx = s.context().with_callback("name", |d, _, _| match d {
            Data::String(s) => Ok(Data::String(s.to_uppercase())),
            other => Ok(other),
        });
        let cat = object(s.denormalize(value(json!({"name": "tom"})), "Cat", None, &ctx).unwrap());
        assert_eq!(cat.get("name"), Some(Data::from("TOM")));

        let failing = s.context().with_callback("name", |_, _, _| Err(anyhow::anyhow!("nope")));
        let err = s.denormalize(value(json!({"name": "tom"})), "Cat", None, &failing).unwrap_err();
        assert!(matches!(err, NormalizerError::Callback { .. }));
    }
}
