//! Polymorphic base class + type tag -> concrete class.
use std::sync::Arc;

use crate::context::NormalizationContext;
use crate::error::{NormalizerError, Result};
use crate::metadata::DiscriminatorProvider;
use crate::value::{Mapping, Value};

#[derive(Clone)]
pub struct DiscriminatorResolver {
    provider: Option<Arc<dyn DiscriminatorProvider>>,
}

impl DiscriminatorResolver {
    pub fn new(provider: Option<Arc<dyn DiscriminatorProvider>>) -> Self {
        Self { provider }
    }

    pub fn mapped_class(&self, base: &str, data: &Mapping, context: &NormalizationContext) -> Result<String> {
        let Some(mapping) = self.provider.as_ref().and_then(|p| p.mapping_for(base)) else {
            return Ok(base.to_string());
        };
        let property = &mapping.type_property;
        let tag = match data.get(property) {
            None | Some(Value::Null) => {
                return Err(NormalizerError::MissingDiscriminator {
                    class: base.to_string(),
                    property: property.clone(),
                    path: context.path_to(property),
                });
            }
            Some(Value::String(s)) => s.clone(),
            Some(other) => serde_json::Value::from(other.clone()).to_string(),
        };
        match mapping.class_for(&tag) {
            Some(class) => {
                tracing::trace!(base, tag = %tag, class, "resolved discriminator");
                Ok(class.to_string())
            }
            None => Err(NormalizerError::UnknownDiscriminatorValue {
                class: base.to_string(),
                value: tag,
                path: context.path_to(property),
            }),
        }
    }
}
