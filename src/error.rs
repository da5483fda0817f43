//! Error taxonomy shared by every normalizer in the chain.
use crate::object::Data;
use crate::types::Builtin;

pub type Result<T, E = NormalizerError> = std::result::Result<T, E>;

/// Rejection reported by a [`PropertyAccessor`](crate::metadata::PropertyAccessor) write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("class \"{class}\" has no property \"{property}\"")]
    NoSuchProperty { class: String, property: String },
    #[error("expected argument of type \"{expected}\", \"{given}\" given at property path \"{property}\"")]
    InvalidType { property: String, expected: String, given: String },
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizerError {
    /// Runtime kind of a value matched none of the expected types.
    #[error("{message}")]
    NotNormalizableValue {
        message: String,
        path: Option<String>,
        expected: Vec<String>,
        actual: String,
        #[source]
        source: Option<AccessError>,
    },

    #[error("{}", extra_attributes_message(.attributes))]
    ExtraAttributes { attributes: Vec<String> },

    #[error("cannot create an instance of \"{class}\" from serialized data because its constructor requires the following parameters to be present: {}", quoted(.arguments, "$"))]
    MissingConstructorArguments { class: String, arguments: Vec<String> },

    #[error("duplicate values for key \"{key}\" found: one is set via the serialized path \"{path}\", the other via the serialized name \"{name}\"")]
    DuplicateSerializedName { key: String, path: String, name: String },

    #[error("duplicate serialized path \"{path}\" used for properties \"{first}\" and \"{second}\"")]
    DuplicateSerializedPath { path: String, first: String, second: String },

    #[error("type property \"{property}\" not found for the abstract object \"{class}\"")]
    MissingDiscriminator { class: String, property: String, path: String },

    #[error("the type \"{value}\" is not a valid value for \"{class}\"")]
    UnknownDiscriminatorValue { class: String, value: String, path: String },

    #[error("the type of the \"{attribute}\" attribute for class \"{class}\" must be {} (\"{given}\" given)", builtin_name(.expected))]
    InvalidScalar { class: String, attribute: String, expected: Builtin, given: String, path: Option<String> },

    #[error("cannot denormalize \"{what}\" because no composing denormalizer is configured")]
    NotADenormalizer { what: String },

    #[error("cannot normalize \"{what}\" because no composing normalizer is configured")]
    NotANormalizer { what: String },

    #[error("a circular reference has been detected when serializing the object of class \"{class}\" (configured limit: {limit})")]
    CircularReference { class: String, limit: usize },

    #[error("class \"{0}\" is not registered")]
    UnknownClass(String),

    #[error("invalid class table at {path}: {message}")]
    Schema { path: String, message: String },

    #[error("callback for attribute \"{attribute}\" failed")]
    Callback {
        attribute: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("denormalization collected {} error(s)", count(.errors))]
    PartialDenormalization { data: Option<Box<Data>>, errors: Vec<NormalizerError> },
}

fn quoted(items: &[String], prefix: &str) -> String {
    items
        .iter()
        .map(|s| format!("\"{prefix}{s}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

fn extra_attributes_message(attributes: &[String]) -> String {
    let verb = if attributes.len() > 1 { "are" } else { "is" };
    format!("extra attributes are not allowed ({} {verb} unknown)", quoted(attributes, ""))
}

fn count(errors: &[NormalizerError]) -> usize {
    errors.len()
}

fn builtin_name(b: &Builtin) -> &'static str {
    b.name()
}

impl NormalizerError {
    pub fn unexpected_type(
        message: impl Into<String>,
        expected: Vec<String>,
        actual: impl Into<String>,
        path: Option<String>,
    ) -> Self {
        NormalizerError::NotNormalizableValue {
            message: message.into(),
            path,
            expected,
            actual: actual.into(),
            source: None,
        }
    }

    /// Configuration defects. Never absorbed by union fallback nor collected per record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NormalizerError::NotADenormalizer { .. }
                | NormalizerError::NotANormalizer { .. }
                | NormalizerError::DuplicateSerializedName { .. }
                | NormalizerError::DuplicateSerializedPath { .. }
                | NormalizerError::UnknownClass(_)
                | NormalizerError::Schema { .. }
        )
    }

    /// Data defects that multi-error mode records instead of aborting on.
    pub fn is_collectable(&self) -> bool {
        matches!(
            self,
            NormalizerError::NotNormalizableValue { .. }
                | NormalizerError::InvalidScalar { .. }
                | NormalizerError::MissingDiscriminator { .. }
                | NormalizerError::UnknownDiscriminatorValue { .. }
        )
    }

    /// Attribute path the error is tied to, when known.
    pub fn path(&self) -> Option<&str> {
        match self {
            NormalizerError::NotNormalizableValue { path, .. }
            | NormalizerError::InvalidScalar { path, .. } => path.as_deref(),
            NormalizerError::MissingDiscriminator { path, .. }
            | NormalizerError::UnknownDiscriminatorValue { path, .. } => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_attributes_message_lists_every_key() {
        let e = NormalizerError::ExtraAttributes { attributes: vec!["a".into(), "b".into()] };
        assert_eq!(e.to_string(), "extra attributes are not allowed (\"a\", \"b\" are unknown)");
    }

    #[test]
    fn classification_is_disjoint() {
        let fatal = NormalizerError::NotADenormalizer { what: "Cat".into() };
        assert!(fatal.is_fatal() && !fatal.is_collectable());
        let data = NormalizerError::unexpected_type("bad", vec!["int".into()], "string", None);
        assert!(data.is_collectable() && !data.is_fatal());
    }
}
