//! Typed object -> generic value.
use std::sync::Arc;

use crate::context::NormalizationContext;
use crate::denormalize::apply_callback;
use crate::error::{NormalizerError, Result};
use crate::metadata::{
    AllowedAttributes, DiscriminatorProvider, LazyProxyIntrospector, MetadataProvider, PropertyAccessor,
    ProxyIntrospector,
};
use crate::object::{Data, ObjectRef};
use crate::registry::ClassTable;
use crate::resolve::AllowedAttributesCache;
use crate::serializer::{Compose, Normalizer};
use crate::types::{Format, NestedPathMap};
use crate::value::{Mapping, Value};

pub struct GraphNormalizer {
    metadata: Option<Arc<dyn MetadataProvider>>,
    discriminators: Option<Arc<dyn DiscriminatorProvider>>,
    accessor: Arc<dyn PropertyAccessor>,
    proxies: Arc<dyn ProxyIntrospector>,
    allowed: AllowedAttributesCache,
}

impl GraphNormalizer {
    pub fn new(accessor: Arc<dyn PropertyAccessor>) -> Self {
        Self {
            metadata: None,
            discriminators: None,
            accessor,
            proxies: Arc::new(LazyProxyIntrospector),
            allowed: AllowedAttributesCache::default(),
        }
    }

    pub fn from_class_table(table: Arc<ClassTable>) -> Self {
        Self::new(table.clone()).with_metadata(table.clone()).with_discriminators(table)
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_discriminators(mut self, discriminators: Arc<dyn DiscriminatorProvider>) -> Self {
        self.discriminators = Some(discriminators);
        self
    }

    pub fn with_proxy_introspector(mut self, proxies: Arc<dyn ProxyIntrospector>) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn normalize_object(
        &self,
        object: &ObjectRef,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
    ) -> Result<Value> {
        let class = object.class();
        let limit = context.options.circular_reference_limit;
        if context.circular().count(object) >= limit {
            return Err(NormalizerError::CircularReference { class, limit });
        }
        let _visit = context.circular().enter(object);

        let mut context = context.clone();
        let cache_key = context.cache_key(format);
        context.set_cache_key(cache_key);

        let nested_paths = match &self.metadata {
            Some(metadata) => metadata.nested_paths(&class)?,
            None => NestedPathMap::default(),
        };
        let mut out = Value::Mapping(Mapping::new());
        let mapping = self.discriminators.as_ref().and_then(|d| d.mapping_for_mapped_class(&class));
        let type_property = mapping.as_ref().map(|m| m.type_property.as_str());
        if let Some(mapping) = &mapping {
            if let (Some(tag), Value::Mapping(m)) = (mapping.tag_for(&class), &mut out) {
                m.insert(mapping.type_property.clone(), Value::from(tag));
            }
        }

        for attribute in self.attributes(object, &class, &context, format) {
            if Some(attribute.as_str()) == type_property || context.is_ignored(&attribute) {
                continue;
            }
            let Some(value) = self.accessor.get(object, &attribute) else {
                continue;
            };
            if self.is_association(&class, &attribute) && self.skip_association(&value, &context) {
                tracing::debug!(class = %class, attribute = %attribute, "association skipped");
                continue;
            }

            let attribute_context = context.child(&attribute);
            let value = apply_callback(value, &attribute, format, &attribute_context)?;
            let normalized = match value {
                Data::Null => Value::Null,
                Data::Bool(b) => Value::Bool(b),
                Data::Int(i) => Value::Int(i),
                Data::Float(f) => Value::Float(f),
                Data::String(s) => Value::String(s),
                other => {
                    let composer = composer.ok_or_else(|| NormalizerError::NotANormalizer { what: other.type_name() })?;
                    composer.normalize(&other, format, &attribute_context)?
                }
            };
            if normalized.is_null() && context.options.skip_null_values {
                continue;
            }
            self.write(&mut out, &class, &attribute, &nested_paths, normalized)?;
        }
        Ok(out)
    }

    fn attributes(
        &self,
        object: &ObjectRef,
        class: &str,
        context: &NormalizationContext,
        format: Option<&Format>,
    ) -> Vec<String> {
        let allowed = match &self.metadata {
            Some(metadata) => self
                .allowed
                .get_or_compute(class, context.cache_key(format), || metadata.allowed_attributes(class, context)),
            None => AllowedAttributes::All,
        };
        match allowed {
            AllowedAttributes::All => self.accessor.readable(object),
            AllowedAttributes::Only(set) => set.into_iter().collect(),
        }
    }

    fn is_association(&self, class: &str, attribute: &str) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.is_association(class, attribute))
    }

    /// Unloaded proxies (when opted in) and objects already on the
    /// normalization stack are left out.
    fn skip_association(&self, value: &Data, context: &NormalizationContext) -> bool {
        if self.proxies.is_uninitialized_proxy(value) {
            return context.options.skip_uninitialized_proxies;
        }
        value.as_object().is_some_and(|o| context.circular().contains(o))
    }

    /// Place `value` under the attribute's wire key, or at its nested path.
    fn write(&self, out: &mut Value, class: &str, attribute: &str, nested_paths: &NestedPathMap, value: Value) -> Result<()> {
        if let Some(path) = nested_paths.get(attribute) {
            return out.insert_path(path, value).map_err(|_| NormalizerError::DuplicateSerializedName {
                key: path.first().cloned().unwrap_or_default(),
                path: path.join("->"),
                name: attribute.to_string(),
            });
        }

        let key = match &self.metadata {
            Some(metadata) => metadata.wire_key_for(attribute, class),
            None => attribute.to_string(),
        };
        let Value::Mapping(map) = out else {
            return Ok(());
        };
        if map.contains_key(&key) {
            return Err(NormalizerError::DuplicateSerializedName {
                path: key.clone(),
                key,
                name: attribute.to_string(),
            });
        }
        map.insert(key, value);
        Ok(())
    }
}

impl Normalizer for GraphNormalizer {
    fn supports_normalization(&self, data: &Data, _format: Option<&Format>) -> bool {
        match data {
            Data::Object(o) => self.metadata.as_ref().is_none_or(|m| m.has_class(&o.class())),
            _ => false,
        }
    }

    fn normalize(
        &self,
        data: &Data,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
    ) -> Result<Value> {
        match data {
            Data::Object(object) => self.normalize_object(object, format, context, composer),
            other => Err(NormalizerError::unexpected_type(
                format!("expected a registered object, \"{}\" given", other.type_name()),
                vec!["object".to_string()],
                other.type_name(),
                context.path().map(str::to_string),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CircularReferenceTracker;
    use crate::object::Object;
    use crate::testing::{serializer, value};
    use crate::types::AttributeTypes;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn normalize(object: &ObjectRef) -> Result<Value> {
        let s = serializer();
        s.normalize(&Data::Object(object.clone()), Some(&Format::Json), &s.context())
    }

    fn owner_with_pet(pet: ObjectRef) -> ObjectRef {
        ObjectRef::new(Object::new("Owner").with("name", "Ann").with("pet", pet))
    }

    #[test]
    fn uninitialized_proxies_are_omitted() {
        let pet = ObjectRef::new(Object::proxy("Cat", IndexMap::from([("name".to_string(), Data::from("Tom"))])));
        let owner = owner_with_pet(pet.clone());
        let out = normalize(&owner).unwrap();
        assert_eq!(out.get("pet"), None);
        assert_eq!(out.get("name"), Some(&Value::from("Ann")));

        pet.initialize(IndexMap::from([("lives".to_string(), Data::Int(9))]));
        let out = normalize(&owner).unwrap();
        assert_eq!(out.get("pet"), Some(&value(json!({"type": "cat", "name": "Tom", "lives": 9}))));
    }

    #[test]
    fn proxies_are_followed_when_not_skipping() {
        let pet = ObjectRef::new(Object::proxy("Cat", IndexMap::new()));
        let owner = owner_with_pet(pet);
        let s = serializer();
        let mut ctx = s.context();
        ctx.options.skip_uninitialized_proxies = false;
        let out = s.normalize(&Data::Object(owner), None, &ctx).unwrap();
        assert!(out.get("pet").is_some());
    }

    #[test]
    fn association_cycles_are_cut_silently() {
        let ann = ObjectRef::new(Object::new("Owner").with("name", "Ann"));
        let bob = ObjectRef::new(Object::new("Owner").with("name", "Bob").with("friend", ann.clone()));
        ann.borrow_mut().set("friend", Data::Object(bob));
        let out = normalize(&ann).unwrap();
        assert_eq!(out.get("friend").and_then(|f| f.get("name")), Some(&Value::from("Bob")));
        assert_eq!(out.get("friend").and_then(|f| f.get("friend")), None);
        ann.borrow_mut().set("friend", Data::Null);
    }

    #[test]
    fn plain_cycles_hit_the_limit() {
        let a = ObjectRef::new(Object::new("Node").with("label", "a"));
        let b = ObjectRef::new(Object::new("Node").with("label", "b").with("next", a.clone()));
        a.borrow_mut().set("next", Data::Object(b));
        let err = normalize(&a).unwrap_err();
        assert!(matches!(err, NormalizerError::CircularReference { limit: 1, .. }));
        // break the cycle so the Rc pair is freed
        a.borrow_mut().set("next", Data::Null);
    }

    #[test]
    fn the_same_object_may_appear_twice_on_separate_branches() {
        let tom = ObjectRef::new(Object::new("Cat").with("name", "Tom"));
        let shelter = ObjectRef::new(
            Object::new("Shelter").with("cats", Data::List(vec![Data::Object(tom.clone()), Data::Object(tom)])),
        );
        let tracker = CircularReferenceTracker::default();
        let s = serializer();
        let ctx = s.context().with_circular_tracker(tracker.clone());
        let out = s.normalize(&Data::Object(shelter), None, &ctx).unwrap();
        assert!(matches!(out.get("cats"), Some(Value::Sequence(c)) if c.len() == 2));
        assert!(tracker.is_empty());
    }

    #[test]
    fn names_paths_and_nulls_on_output() {
        let p = ObjectRef::new(
            Object::new("Person").with("name", "Ann").with("birthYear", 1990i64).with("city", "Lyon").with("other", Data::Null),
        );
        let out = normalize(&p).unwrap();
        assert_eq!(out.get("full_name"), Some(&Value::from("Ann")));
        assert_eq!(out.get("birth_year"), Some(&Value::Int(1990)));
        assert_eq!(out.get_path(&["address", "city"]), Some(&Value::from("Lyon")));
        assert_eq!(out.get("other"), Some(&Value::Null));

        let s = serializer();
        let mut ctx = s.context().with_groups(["public"]);
        ctx.options.skip_null_values = true;
        let out = s.normalize(&Data::Object(p), None, &ctx).unwrap();
        assert_eq!(out.get("other"), None);
        assert_eq!(out.get("secret"), None);
    }

    #[test]
    fn ignored_attributes_and_callbacks() {
        let cat = ObjectRef::new(Object::new("Cat").with("name", "Tom").with("lives", 9i64));
        let s = serializer();
        let ctx = s
            .context()
            .with_ignored_attributes(["lives"])
            .with_callback("name", |_, _, _| Ok(Data::from("***")));
        let out = s.normalize(&Data::Object(cat), None, &ctx).unwrap();
        assert_eq!(out, value(json!({"type": "cat", "name": "***"})));
    }

    /// Class table that counts nested path lookups.
    struct CountingPaths {
        table: ClassTable,
        lookups: AtomicUsize,
    }

    impl MetadataProvider for CountingPaths {
        fn has_class(&self, class: &str) -> bool {
            self.table.has_class(class)
        }

        fn types_of(&self, class: &str, attribute: &str) -> Option<AttributeTypes> {
            self.table.types_of(class, attribute)
        }

        fn allowed_attributes(&self, class: &str, context: &NormalizationContext) -> AllowedAttributes {
            self.table.allowed_attributes(class, context)
        }

        fn nested_paths(&self, class: &str) -> Result<NestedPathMap> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            self.table.nested_paths(class)
        }

        fn wire_key_for(&self, attribute: &str, class: &str) -> String {
            self.table.wire_key_for(attribute, class)
        }
    }

    #[test]
    fn nested_paths_are_looked_up_once_per_object() {
        let metadata = Arc::new(CountingPaths { table: crate::testing::zoo(), lookups: AtomicUsize::new(0) });
        let n = GraphNormalizer::new(Arc::new(crate::testing::zoo())).with_metadata(metadata.clone());
        let p = ObjectRef::new(Object::new("Person").with("name", "Ann").with("city", "Lyon"));
        let out = n.normalize_object(&p, None, &NormalizationContext::new(), None).unwrap();
        assert_eq!(out.get_path(&["address", "city"]), Some(&Value::from("Lyon")));
        assert_eq!(out.get("full_name"), Some(&Value::from("Ann")));
        assert_eq!(metadata.lookups.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn nested_values_need_a_composer() {
        let n = GraphNormalizer::from_class_table(Arc::new(crate::testing::zoo()));
        let s = ObjectRef::new(Object::new("Shelter").with("cats", Data::List(vec![])));
        let err = n.normalize_object(&s, None, &NormalizationContext::new(), None).unwrap_err();
        assert!(matches!(err, NormalizerError::NotANormalizer { .. }));
    }
}
