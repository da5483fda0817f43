//! The composing serializer: a chain of normalizers/denormalizers that
//! recursively dispatch nested values back through the chain.
use std::sync::Arc;

use indexmap::IndexMap;

use crate::adapters::{ArrayAdapter, CollectionAdapter, DateTimeAdapter};
use crate::context::{ContextOptions, ErrorSink, NormalizationContext};
use crate::denormalize::GraphDenormalizer;
use crate::error::{NormalizerError, Result};
use crate::normalize::GraphNormalizer;
use crate::object::Data;
use crate::registry::ClassTable;
use crate::types::Format;
use crate::value::Value;

pub trait Normalizer: Send + Sync {
    fn supports_normalization(&self, data: &Data, format: Option<&Format>) -> bool;

    fn normalize(
        &self,
        data: &Data,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
    ) -> Result<Value>;
}

pub trait Denormalizer: Send + Sync {
    /// `target` is a class name, optionally suffixed with `[]` per dimension.
    fn supports_denormalization(
        &self,
        data: &Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
    ) -> bool;

    fn denormalize(
        &self,
        data: Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
    ) -> Result<Data>;
}

/// Recursive entry point handed to every handler for nested values.
pub trait Compose {
    fn normalize(&self, data: &Data, format: Option<&Format>, context: &NormalizationContext) -> Result<Value>;

    fn denormalize(
        &self,
        data: Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
    ) -> Result<Data>;

    fn supports_denormalization(
        &self,
        data: &Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
    ) -> bool;
}

// ————————————————————————————————————————————————————————————————————————————
// SERIALIZER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Default)]
pub struct Serializer {
    normalizers: Vec<Arc<dyn Normalizer>>,
    denormalizers: Vec<Arc<dyn Denormalizer>>,
    defaults: ContextOptions,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard chain over a class table: date-times, ordered collections,
    /// `Class[]` arrays, then registered objects.
    pub fn with_class_table(table: Arc<ClassTable>) -> Self {
        let datetime = Arc::new(DateTimeAdapter::default());
        let collection = Arc::new(CollectionAdapter);
        Self::new()
            .normalizer(datetime.clone())
            .normalizer(collection.clone())
            .normalizer(Arc::new(GraphNormalizer::from_class_table(table.clone())))
            .denormalizer(datetime)
            .denormalizer(collection)
            .denormalizer(Arc::new(ArrayAdapter))
            .denormalizer(Arc::new(GraphDenormalizer::from_class_table(table)))
    }

    pub fn normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizers.push(normalizer);
        self
    }

    pub fn denormalizer(mut self, denormalizer: Arc<dyn Denormalizer>) -> Self {
        self.denormalizers.push(denormalizer);
        self
    }

    pub fn with_defaults(mut self, defaults: ContextOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &ContextOptions {
        &self.defaults
    }

    /// Fresh per-call context seeded with the default options.
    pub fn context(&self) -> NormalizationContext {
        NormalizationContext::with_options(self.defaults.clone())
    }

    pub fn normalize(&self, data: &Data, format: Option<&Format>, context: &NormalizationContext) -> Result<Value> {
        Compose::normalize(self, data, format, context)
    }

    /// Top-level denormalization. In multi-error mode every collected
    /// failure comes back together with the partial result.
    pub fn denormalize(
        &self,
        data: Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
    ) -> Result<Data> {
        if !context.options.collect_denormalization_errors || context.errors().is_some() {
            return Compose::denormalize(self, data, target, format, context);
        }

        let sink = ErrorSink::default();
        let context = context.clone().with_error_sink(sink.clone());
        let result = Compose::denormalize(self, data, target, format, &context);
        match result {
            Ok(data) if sink.is_empty() => Ok(data),
            Ok(data) => Err(NormalizerError::PartialDenormalization { data: Some(Box::new(data)), errors: sink.take() }),
            Err(err) if err.is_collectable() => {
                sink.push(err);
                Err(NormalizerError::PartialDenormalization { data: None, errors: sink.take() })
            }
            Err(err) => Err(err),
        }
    }

    fn normalizer_for(&self, data: &Data, format: Option<&Format>) -> Option<&Arc<dyn Normalizer>> {
        self.normalizers.iter().find(|n| n.supports_normalization(data, format))
    }

    fn denormalizer_for(
        &self,
        data: &Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
    ) -> Option<&Arc<dyn Denormalizer>> {
        self.denormalizers
            .iter()
            .find(|d| d.supports_denormalization(data, target, format, context, Some(self)))
    }
}

impl Compose for Serializer {
    fn normalize(&self, data: &Data, format: Option<&Format>, context: &NormalizationContext) -> Result<Value> {
        if let Some(normalizer) = self.normalizer_for(data, format) {
            return normalizer.normalize(data, format, context, Some(self));
        }
        match data {
            Data::Null => Ok(Value::Null),
            Data::Bool(b) => Ok(Value::Bool(*b)),
            Data::Int(i) => Ok(Value::Int(*i)),
            Data::Float(f) => Ok(Value::Float(*f)),
            Data::String(s) => Ok(Value::String(s.clone())),
            Data::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| Compose::normalize(self, item, format, &context.element(&i.to_string())))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            Data::Map(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), Compose::normalize(self, v, format, &context.element(k))?)))
                .collect::<Result<IndexMap<_, _>>>()
                .map(Value::Mapping),
            other => Err(NormalizerError::unexpected_type(
                format!("could not normalize object of type \"{}\", no supporting normalizer found", other.type_name()),
                Vec::new(),
                other.type_name(),
                context.path().map(str::to_string),
            )),
        }
    }

    fn denormalize(
        &self,
        data: Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
    ) -> Result<Data> {
        match self.denormalizer_for(&data, target, format, context) {
            Some(denormalizer) => denormalizer.denormalize(data, target, format, context, Some(self)),
            None => Err(NormalizerError::unexpected_type(
                format!("could not denormalize object of type \"{target}\", no supporting normalizer found"),
                vec![target.to_string()],
                data.kind_name(),
                context.path().map(str::to_string),
            )),
        }
    }

    fn supports_denormalization(
        &self,
        data: &Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
    ) -> bool {
        self.denormalizer_for(data, target, format, context).is_some()
    }
}
