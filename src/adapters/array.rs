use indexmap::IndexMap;

use crate::context::NormalizationContext;
use crate::error::{NormalizerError, Result};
use crate::object::{CollectionKey, Data};
use crate::serializer::{Compose, Denormalizer};
use crate::types::{Builtin, Format};
use crate::value::Value;

/// Denormalizes `Class[]` targets (any depth) one element at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayAdapter;

impl ArrayAdapter {
    /// Keys must match a carried `int` or `string` key type.
    fn check_key(key: &str, is_index: bool, context: &NormalizationContext) -> Result<()> {
        let Some(key_type) = context.key_type() else {
            return Ok(());
        };
        let is_int = is_index || CollectionKey::is_index_key(key);
        let given = if is_int { "int" } else { "string" };
        let ok = match key_type.builtin {
            Builtin::Int => is_int,
            Builtin::String => !is_int,
            _ => true,
        };
        if ok {
            return Ok(());
        }
        Err(NormalizerError::unexpected_type(
            format!("the type of the key \"{key}\" must be \"{}\" (\"{given}\" given)", key_type.builtin.name()),
            vec![key_type.builtin.name().to_string()],
            given,
            context.element(key).path().map(str::to_string),
        ))
    }
}

impl Denormalizer for ArrayAdapter {
    fn supports_denormalization(
        &self,
        data: &Value,
        target: &str,
        format: Option<&Format>,
        context: &NormalizationContext,
        composer: Option<&dyn Compose>,
    ) -> bool {
        match (target.strip_suffix("[]"), composer) {
            (Some(inner), Some(composer)) => composer.supports_denormalization(data, inner, format, context),
            _ => false,
        }
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
        let inner = target.strip_suffix("[]").unwrap_or(target);
        match data {
            Value::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let key = i.to_string();
                    Self::check_key(&key, true, context)?;
                    out.push(composer.denormalize(item, inner, format, &context.element(&key))?);
                }
                Ok(Data::List(out))
            }
            Value::Mapping(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (key, item) in map {
                    Self::check_key(&key, false, context)?;
                    let element = composer.denormalize(item, inner, format, &context.element(&key))?;
                    out.insert(key, element);
                }
                Ok(Data::Map(out))
            }
            other => Err(NormalizerError::unexpected_type(
                format!("data expected to be an array, \"{}\" given", other.kind_name()),
                vec!["array".to_string()],
                other.kind_name(),
                context.path().map(str::to_string),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{serializer, value};
    use crate::types::TypeDescriptor;
    use serde_json::json;

    #[test]
    fn supports_only_arrays_of_known_classes() {
        let s = serializer();
        let ctx = s.context();
        assert!(ArrayAdapter.supports_denormalization(&Value::Null, "Cat[]", None, &ctx, Some(&s)));
        assert!(ArrayAdapter.supports_denormalization(&Value::Null, "Cat[][]", None, &ctx, Some(&s)));
        assert!(!ArrayAdapter.supports_denormalization(&Value::Null, "Cat", None, &ctx, Some(&s)));
        assert!(!ArrayAdapter.supports_denormalization(&Value::Null, "Unicorn[]", None, &ctx, Some(&s)));
        assert!(!ArrayAdapter.supports_denormalization(&Value::Null, "Cat[]", None, &ctx, None));
    }

    #[test]
    fn element_errors_carry_their_index() {
        let s = serializer();
        let err = s
            .denormalize(value(json!([{"name": "Tom"}, {"name": 5}])), "Cat[]", Some(&Format::Json), &s.context())
            .unwrap_err();
        assert_eq!(err.path(), Some("[1].name"));
    }

    #[test]
    fn maps_keep_their_keys() {
        let s = serializer();
        let out = s.denormalize(value(json!({"tom": {"name": "Tom"}})), "Cat[]", None, &s.context()).unwrap();
        match out {
            Data::Map(m) => assert_eq!(m.get("tom").and_then(Data::as_object).map(|o| o.class()), Some("Cat".into())),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn carried_key_type_is_enforced() {
        let s = serializer();
        let mut ctx = s.context().child("cats");
        ctx.set_element_types(Some(TypeDescriptor::builtin(Builtin::Int)), Some(TypeDescriptor::object("Cat")));
        let err = ArrayAdapter
            .denormalize(value(json!({"tom": {"name": "Tom"}})), "Cat[]", None, &ctx, Some(&s))
            .unwrap_err();
        match err {
            NormalizerError::NotNormalizableValue { message, path, .. } => {
                assert_eq!(message, "the type of the key \"tom\" must be \"int\" (\"string\" given)");
                assert_eq!(path.as_deref(), Some("cats[tom]"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(ArrayAdapter.denormalize(value(json!({"0": {"name": "Tom"}})), "Cat[]", None, &ctx, Some(&s)).is_ok());
    }

    #[test]
    fn scalars_are_rejected() {
        let s = serializer();
        assert!(ArrayAdapter.denormalize(Value::from("x"), "Cat[]", None, &s.context(), Some(&s)).is_err());
    }
}
