//! Per-call options plus the side channels threaded through one recursive walk.
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::NormalizerError;
use crate::object::{Data, ObjectRef};
use crate::types::{Format, TypeDescriptor};

/// Every recognized option. Deserializable so a host can keep defaults in its own config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Only attributes tagged with one of these groups (`*` = any group).
    pub groups: Option<Vec<String>>,
    /// Allow-list of attribute names.
    pub attributes: Option<Vec<String>>,
    pub ignored_attributes: Vec<String>,
    /// When false, unknown input keys fail with `ExtraAttributes`.
    pub allow_extra_attributes: bool,
    /// Merge nested objects into the values already present on the populated object.
    pub deep_object_to_populate: bool,
    /// Exhausted unions hand back the raw value instead of failing.
    pub disable_type_enforcement: bool,
    pub skip_uninitialized_proxies: bool,
    pub skip_null_values: bool,
    /// Multi-error mode.
    pub collect_denormalization_errors: bool,
    pub circular_reference_limit: usize,
    /// chrono `strftime` pattern; RFC 3339 when unset.
    pub datetime_format: Option<String>,
    /// Option names left out of the cache key.
    pub exclude_from_cache_key: Vec<String>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            groups: None,
            attributes: None,
            ignored_attributes: Vec::new(),
            allow_extra_attributes: true,
            deep_object_to_populate: false,
            disable_type_enforcement: false,
            skip_uninitialized_proxies: true,
            skip_null_values: false,
            collect_denormalization_errors: false,
            circular_reference_limit: 1,
            datetime_format: None,
            exclude_from_cache_key: Vec::new(),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SIDE CHANNELS
// ————————————————————————————————————————————————————————————————————————————

/// In-progress normalizations per object identity, shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct CircularReferenceTracker(Rc<RefCell<HashMap<usize, usize>>>);

impl CircularReferenceTracker {
    pub fn count(&self, object: &ObjectRef) -> usize {
        self.0.borrow().get(&object.identity()).copied().unwrap_or(0)
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.count(object) > 0
    }

    /// Count `object` as being normalized until the guard drops.
    pub fn enter(&self, object: &ObjectRef) -> VisitGuard {
        let id = object.identity();
        *self.0.borrow_mut().entry(id).or_insert(0) += 1;
        VisitGuard { tracker: self.clone(), id }
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

pub struct VisitGuard {
    tracker: CircularReferenceTracker,
    id: usize,
}

impl Drop for VisitGuard {
    fn drop(&mut self) {
        let mut counters = self.tracker.0.borrow_mut();
        if let Some(n) = counters.get_mut(&self.id) {
            *n -= 1;
            if *n == 0 {
                counters.remove(&self.id);
            }
        }
    }
}

/// Caller-visible list of collected per-attribute failures.
#[derive(Debug, Clone, Default)]
pub struct ErrorSink(Rc<RefCell<Vec<NormalizerError>>>);

impl ErrorSink {
    pub fn push(&self, error: NormalizerError) {
        self.0.borrow_mut().push(error);
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn take(&self) -> Vec<NormalizerError> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

/// Value transform applied to one attribute, after denormalization or before normalization.
pub type Callback = Arc<dyn Fn(Data, &str, Option<&Format>) -> anyhow::Result<Data>>;

// ————————————————————————————————————————————————————————————————————————————
// CONTEXT
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Default)]
pub struct NormalizationContext {
    pub options: ContextOptions,
    object_to_populate: Option<ObjectRef>,
    callbacks: IndexMap<String, Callback>,
    key_type: Option<TypeDescriptor>,
    value_type: Option<TypeDescriptor>,
    path: Option<String>,
    cache_key: Option<u64>,
    circular: CircularReferenceTracker,
    errors: Option<ErrorSink>,
}

impl NormalizationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ContextOptions) -> Self {
        Self { options, ..Self::default() }
    }

    // ---- builders ----

    pub fn with_groups<I: IntoIterator<Item = S>, S: Into<String>>(mut self, groups: I) -> Self {
        self.options.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_ignored_attributes<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.options.ignored_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn disallow_extra_attributes(mut self) -> Self {
        self.options.allow_extra_attributes = false;
        self
    }

    pub fn collecting_errors(mut self) -> Self {
        self.options.collect_denormalization_errors = true;
        self
    }

    pub fn with_object_to_populate(mut self, object: ObjectRef) -> Self {
        self.object_to_populate = Some(object);
        self
    }

    pub fn with_callback<F>(mut self, attribute: impl Into<String>, f: F) -> Self
    where
        F: Fn(Data, &str, Option<&Format>) -> anyhow::Result<Data> + 'static,
    {
        self.callbacks.insert(attribute.into(), Arc::new(f));
        self
    }

    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.errors = Some(sink);
        self
    }

    pub fn with_circular_tracker(mut self, tracker: CircularReferenceTracker) -> Self {
        self.circular = tracker;
        self
    }

    // ---- accessors ----

    pub fn object_to_populate(&self) -> Option<&ObjectRef> {
        self.object_to_populate.as_ref()
    }

    pub fn callback(&self, attribute: &str) -> Option<&Callback> {
        self.callbacks.get(attribute)
    }

    pub fn key_type(&self) -> Option<&TypeDescriptor> {
        self.key_type.as_ref()
    }

    pub fn value_type(&self) -> Option<&TypeDescriptor> {
        self.value_type.as_ref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn circular(&self) -> &CircularReferenceTracker {
        &self.circular
    }

    pub fn errors(&self) -> Option<&ErrorSink> {
        self.errors.as_ref()
    }

    pub fn is_ignored(&self, attribute: &str) -> bool {
        self.options.ignored_attributes.iter().any(|a| a == attribute)
    }

    /// `path.attribute`, or just `attribute` at the root.
    pub fn path_to(&self, attribute: &str) -> String {
        match &self.path {
            Some(p) => format!("{p}.{attribute}"),
            None => attribute.to_string(),
        }
    }

    // ---- derived contexts ----

    /// Context for descending into `attribute`: carried element types and the
    /// populate target are per level, side channels are shared.
    pub fn child(&self, attribute: &str) -> Self {
        Self {
            options: self.options.clone(),
            object_to_populate: None,
            callbacks: self.callbacks.clone(),
            key_type: None,
            value_type: None,
            path: Some(self.path_to(attribute)),
            cache_key: self.cache_key.map(|parent| Self::child_cache_key(parent, attribute)),
            circular: self.circular.clone(),
            errors: self.errors.clone(),
        }
    }

    /// Context for one element of a list or map: `path[key]`, element types kept.
    pub fn element(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.object_to_populate = None;
        next.path = Some(match &self.path {
            Some(p) => format!("{p}[{key}]"),
            None => format!("[{key}]"),
        });
        next
    }

    pub(crate) fn set_object_to_populate(&mut self, object: Option<ObjectRef>) {
        self.object_to_populate = object;
    }

    pub(crate) fn set_element_types(&mut self, key: Option<TypeDescriptor>, value: Option<TypeDescriptor>) {
        self.key_type = key;
        self.value_type = value;
    }

    pub(crate) fn set_cache_key(&mut self, key: Option<u64>) {
        self.cache_key = key;
    }

    // ---- cache key ----

    /// Key of an attribute's context, derived from the parent's key.
    fn child_cache_key(parent: u64, attribute: &str) -> u64 {
        let mut h = DefaultHasher::new();
        parent.hash(&mut h);
        attribute.hash(&mut h);
        h.finish()
    }

    /// Stored key, or a freshly computed one.
    pub fn cache_key(&self, format: Option<&Format>) -> Option<u64> {
        self.cache_key.or_else(|| self.compute_cache_key(format))
    }

    /// Hash of the format and the options, minus everything marked excluded.
    ///
    /// `None` when the options cannot be rendered; callers then skip caching.
    pub fn compute_cache_key(&self, format: Option<&Format>) -> Option<u64> {
        let mut rendered = serde_json::to_value(&self.options).ok()?;
        let map = rendered.as_object_mut()?;
        for key in &self.options.exclude_from_cache_key {
            map.remove(key);
        }
        map.remove("exclude_from_cache_key");
        let text = serde_json::to_string(map).ok()?;

        let mut h = DefaultHasher::new();
        format.map(Format::name).hash(&mut h);
        text.hash(&mut h);
        Some(h.finish())
    }
}

impl fmt::Debug for NormalizationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizationContext")
            .field("options", &self.options)
            .field("object_to_populate", &self.object_to_populate)
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .field("key_type", &self.key_type)
            .field("value_type", &self.value_type)
            .field("path", &self.path)
            .field("cache_key", &self.cache_key)
            .finish_non_exhaustive()
    }
}
