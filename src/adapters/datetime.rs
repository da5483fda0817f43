use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, NaiveDateTime};

use crate::context::NormalizationContext;
use crate::error::{NormalizerError, Result};
use crate::object::{DATETIME_CLASSES, Data};
use crate::serializer::{Compose, Denormalizer, Normalizer};
use crate::types::Format;
use crate::value::Value;

// Offset-less inputs accepted when no format is configured; read as UTC.
const NAIVE_FALLBACKS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Date-times as strings: RFC 3339 unless the context names a `strftime` pattern.
#[derive(Debug, Clone, Default)]
pub struct DateTimeAdapter {
    /// Used when the context carries no `datetime_format`.
    pub default_format: Option<String>,
}

impl DateTimeAdapter {
    pub fn with_format(format: impl Into<String>) -> Self {
        Self { default_format: Some(format.into()) }
    }

    fn pattern<'a>(&'a self, context: &'a NormalizationContext) -> Option<&'a str> {
        context.options.datetime_format.as_deref().or(self.default_format.as_deref())
    }

    fn parse(&self, text: &str, context: &NormalizationContext) -> Option<DateTime<FixedOffset>> {
        match self.pattern(context) {
            Some(pattern) => DateTime::parse_from_str(text, pattern)
                .ok()
                .or_else(|| NaiveDateTime::parse_from_str(text, pattern).ok().map(|n| n.and_utc().fixed_offset())),
            None => DateTime::parse_from_rfc3339(text).ok().or_else(|| {
                NAIVE_FALLBACKS
                    .iter()
                    .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
                    .map(|n| n.and_utc().fixed_offset())
            }),
        }
    }
}

impl Normalizer for DateTimeAdapter {
    fn supports_normalization(&self, data: &Data, _format: Option<&Format>) -> bool {
        matches!(data, Data::DateTime(_))
    }

    fn normalize(
        &self,
        data: &Data,
        _format: Option<&Format>,
        context: &NormalizationContext,
        _composer: Option<&dyn Compose>,
    ) -> Result<Value> {
        let Data::DateTime(dt) = data else {
            return Err(NormalizerError::unexpected_type(
                format!("expected a date-time, \"{}\" given", data.type_name()),
                vec!["DateTime".to_string()],
                data.type_name(),
                context.path().map(str::to_string),
            ));
        };
        let Some(pattern) = self.pattern(context) else {
            return Ok(Value::String(dt.to_rfc3339()));
        };
        // an invalid pattern surfaces as a fmt error, not a panic
        let mut out = String::new();
        write!(out, "{}", dt.format(pattern)).map_err(|_| {
            NormalizerError::unexpected_type(
                format!("invalid date-time format \"{pattern}\""),
                vec!["DateTime".to_string()],
                "DateTime",
                context.path().map(str::to_string),
            )
        })?;
        Ok(Value::String(out))
    }
}

impl Denormalizer for DateTimeAdapter {
    fn supports_denormalization(
        &self,
        _data: &Value,
        target: &str,
        _format: Option<&Format>,
        _context: &NormalizationContext,
        _composer: Option<&dyn Compose>,
    ) -> bool {
        DATETIME_CLASSES.contains(&target)
    }

    fn denormalize(
        &self,
        data: Value,
        target: &str,
        _format: Option<&Format>,
        context: &NormalizationContext,
        _composer: Option<&dyn Compose>,
    ) -> Result<Data> {
        let path = || context.path().map(str::to_string);
        let text = match &data {
            Value::String(s) if !s.trim().is_empty() => s.as_str(),
            other => {
                return Err(NormalizerError::unexpected_type(
                    "the data is either not a string, an empty string, or null; you should pass a string that \
                     can be parsed with the passed format or a valid date-time string",
                    vec!["string".to_string()],
                    other.kind_name(),
                    path(),
                ));
            }
        };
        match self.parse(text, context) {
            Some(dt) => Ok(Data::DateTime(dt)),
            None => {
                tracing::debug!(target_class = target, text, "date-time parse failed");
                Err(NormalizerError::unexpected_type(
                    format!("failed to parse \"{text}\" as {target}"),
                    vec!["string".to_string()],
                    "string",
                    path(),
                ))
            }
        }
    }
}
