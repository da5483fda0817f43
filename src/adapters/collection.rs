use crate::context::NormalizationContext;
use crate::error::{NormalizerError, Result};
use crate::object::{Data, ORDERED_COLLECTION, OrderedCollection};
use crate::serializer::{Compose, Denormalizer, Normalizer};
use crate::types::{Builtin, Format};
use crate::value::{Mapping, Value};

/// (De)normalizes [`OrderedCollection`] through the composer, element by element.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionAdapter;

impl Normalizer for CollectionAdapter {
    fn supports_normalization(&self, data: &Data, _format: Option<&Format>) -> bool {
        matches!(data, Data::Collection(_))
    }

    fn normalize(
        &self,
        data: &Data,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
    ) -> Result<Value> {
        let Data::Collection(collection) = data else {
            return Err(NormalizerError::unexpected_type(
                format!("expected an ordered collection, \"{}\" given", data.type_name()),
                vec![ORDERED_COLLECTION.to_string()],
                data.type_name(),
                context.path().map(str::to_string),
            ));
        };
        let composer = composer.ok_or_else(|| NormalizerError::NotANormalizer { what: ORDERED_COLLECTION.into() })?;

        if collection.is_list() {
            let items = collection
                .iter()
                .map(|(key, item)| composer.normalize(item, format, &context.element(&key.to_string())))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Value::Sequence(items));
        }
        let mut out = Mapping::with_capacity(collection.len());
        for (key, item) in collection.iter() {
            let key = key.to_string();
            let value = composer.normalize(item, format, &context.element(&key))?;
            out.insert(key, value);
        }
        Ok(Value::Mapping(out))
    }
}

impl Denormalizer for CollectionAdapter {
    fn supports_denormalization(
        &self,
        _data: &Value,
        target: &str,
        _format: Option<&Format>,
        _context: &NormalizationContext,
        _composer: Option<&dyn Compose>,
    ) -> bool {
        target == ORDERED_COLLECTION
    }

    fn denormalize(
        &self,
        data: Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
    ) -> Result<Data> {
        let composer = composer.ok_or_else(|| NormalizerError::NotADenormalizer { what: target.to_string() })?;
        let data = match data {
            Value::Null => return Ok(Data::Collection(OrderedCollection::new())),
            Value::Sequence(_) | Value::Mapping(_) => data,
            other => {
                return Err(NormalizerError::unexpected_type(
                    format!("an ordered collection needs a list or a map, \"{}\" given", other.kind_name()),
                    vec!["array".to_string()],
                    other.kind_name(),
                    context.path().map(str::to_string),
                ));
            }
        };

        let element_class = context
            .value_type()
            .filter(|t| t.builtin == Builtin::Object)
            .and_then(|t| t.class_name.clone());
        let elements = match element_class {
            Some(class) => composer.denormalize(data, &format!("{class}[]"), format, context)?,
            None => Data::from(data),
        };
        match elements {
            Data::List(items) => Ok(Data::Collection(OrderedCollection::from(items))),
            Data::Map(map) => Ok(Data::Collection(OrderedCollection::from(map))),
            other => Err(NormalizerError::unexpected_type(
                format!("elements of an ordered collection came back as \"{}\"", other.type_name()),
                vec!["array".to_string()],
                other.type_name(),
                context.path().map(str::to_string),
            )),
        }
    }
}
