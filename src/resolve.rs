//! Per-(class, attribute) union lookup with a process-wide memo.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::metadata::{AllowedAttributes, DiscriminatorProvider, MetadataProvider};
use crate::types::{AttributeTypes, Builtin, TypeDescriptor};

type CacheKey = (String, String);

/// Resolves the declared union of an attribute. Results, including "nothing
/// declared", are cached forever: class shapes do not change at runtime.
pub struct TypeResolver {
    metadata: Option<Arc<dyn MetadataProvider>>,
    discriminators: Option<Arc<dyn DiscriminatorProvider>>,
    // `None` entries are negative results.
    cache: RwLock<HashMap<CacheKey, Option<Arc<AttributeTypes>>>>,
}

impl TypeResolver {
    pub fn new(
        metadata: Option<Arc<dyn MetadataProvider>>,
        discriminators: Option<Arc<dyn DiscriminatorProvider>>,
    ) -> Self {
        Self { metadata, discriminators, cache: RwLock::new(HashMap::new()) }
    }

    pub fn resolve(&self, class: &str, attribute: &str) -> Option<Arc<AttributeTypes>> {
        let metadata = self.metadata.as_ref()?;
        let key = (class.to_string(), attribute.to_string());
        if let Ok(cache) = self.cache.read() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        tracing::trace!(class, attribute, "attribute type cache miss");
        let resolved = self.lookup(metadata.as_ref(), class, attribute).map(Arc::new);
        // a poisoned lock only costs the memo
        if let Ok(mut cache) = self.cache.write() {
            cache.entry(key).or_insert_with(|| resolved.clone());
        }
        resolved
    }

    fn lookup(&self, metadata: &dyn MetadataProvider, class: &str, attribute: &str) -> Option<AttributeTypes> {
        if let Some(types) = metadata.types_of(class, attribute) {
            return Some(types);
        }
        let mapping = self.discriminators.as_ref()?.mapping_for(class)?;
        if mapping.type_property == attribute {
            return Some(AttributeTypes::single(TypeDescriptor::builtin(Builtin::String)));
        }
        mapping
            .classes()
            .filter(|mapped| *mapped != class)
            .find_map(|mapped| metadata.types_of(mapped, attribute))
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

/// Allowed-attribute sets memoized per (class, context cache key).
#[derive(Default)]
pub struct AllowedAttributesCache {
    entries: RwLock<HashMap<(String, u64), AllowedAttributes>>,
}

impl AllowedAttributesCache {
    /// Contexts without a cache key always recompute.
    pub fn get_or_compute<F>(&self, class: &str, cache_key: Option<u64>, compute: F) -> AllowedAttributes
    where
        F: FnOnce() -> AllowedAttributes,
    {
        let Some(ck) = cache_key else {
            return compute();
        };
        let key = (class.to_string(), ck);
        if let Some(hit) = self.entries.read().ok().and_then(|e| e.get(&key).cloned()) {
            return hit;
        }
        let allowed = compute();
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, allowed.clone());
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::zoo;

    fn resolver() -> TypeResolver {
        let table = Arc::new(zoo());
        TypeResolver::new(Some(table.clone()), Some(table))
    }

    #[test]
    fn declared_types_win() {
        let r = resolver();
        let types = r.resolve("Cat", "lives").unwrap();
        assert_eq!(types.as_slice(), &[TypeDescriptor::builtin(Builtin::Int)]);
    }

    #[test]
    fn discriminator_tag_is_a_string() {
        let r = resolver();
        let types = r.resolve("Animal", "type").unwrap();
        assert_eq!(types.as_slice(), &[TypeDescriptor::builtin(Builtin::String)]);
    }

    #[test]
    fn base_class_consults_mapped_classes() {
        let r = resolver();
        // `lives` is only declared on Cat
        let types = r.resolve("Animal", "lives").unwrap();
        assert_eq!(types.as_slice(), &[TypeDescriptor::builtin(Builtin::Int)]);
    }

    #[test]
    fn negative_results_are_cached() {
        let r = resolver();
        assert!(r.resolve("Cat", "wings").is_none());
        assert!(r.resolve("Cat", "wings").is_none());
        assert_eq!(r.cached_entries(), 1);
    }

    #[test]
    fn allowed_sets_are_memoized_per_cache_key() {
        let cache = AllowedAttributesCache::default();
        let calls = std::cell::Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            AllowedAttributes::All
        };
        cache.get_or_compute("Cat", Some(1), compute);
        cache.get_or_compute("Cat", Some(1), compute);
        cache.get_or_compute("Cat", Some(2), compute);
        cache.get_or_compute("Cat", None, compute);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn no_provider_means_no_types() {
        let r = TypeResolver::new(None, None);
        assert!(r.resolve("Cat", "lives").is_none());
        assert_eq!(r.cached_entries(), 0);
    }
}
