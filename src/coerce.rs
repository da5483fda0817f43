//! String-to-scalar coercion for formats that carry every scalar as text.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{NormalizerError, Result};
use crate::types::{Builtin, Format, TypeDescriptor};
use crate::value::Value;

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+$").unwrap());
static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?\s*$").unwrap());

/// Where a coerced value is headed; only used to build diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSite<'a> {
    pub class: &'a str,
    pub attribute: &'a str,
    pub path: Option<&'a str>,
}

impl AttributeSite<'_> {
    fn invalid(&self, expected: Builtin, given: &str) -> NormalizerError {
        NormalizerError::InvalidScalar {
            class: self.class.to_string(),
            attribute: self.attribute.to_string(),
            expected,
            given: given.to_string(),
            path: self.path.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarCoercer;

impl ScalarCoercer {
    /// `Ok(None)`: coercion does not apply (not a string, not a string-scalar
    /// format, or a target kind without a textual form).
    pub fn coerce(
        &self,
        value: &Value,
        ty: &TypeDescriptor,
        format: Option<&Format>,
        site: &AttributeSite<'_>,
    ) -> Result<Option<Value>> {
        let Some(raw) = value.as_str() else {
            return Ok(None);
        };
        if !format.is_some_and(Format::has_string_scalars) {
            return Ok(None);
        }

        if raw.is_empty() {
            if ty.builtin == Builtin::Array {
                return Ok(Some(Value::Sequence(Vec::new())));
            }
            if ty.nullable && ty.builtin.is_scalar_coercible() {
                return Ok(Some(Value::Null));
            }
        }

        match ty.builtin {
            Builtin::Bool => match raw {
                "false" | "0" => Ok(Some(Value::Bool(false))),
                "true" | "1" => Ok(Some(Value::Bool(true))),
                _ => Err(site.invalid(Builtin::Bool, raw)),
            },
            Builtin::Int => {
                if !INTEGER.is_match(raw) {
                    return Err(site.invalid(Builtin::Int, raw));
                }
                raw.parse::<i64>()
                    .map(|i| Some(Value::Int(i)))
                    .map_err(|_| site.invalid(Builtin::Int, raw))
            }
            Builtin::Float => match raw {
                "NaN" => Ok(Some(Value::float(f64::NAN))),
                "INF" => Ok(Some(Value::float(f64::INFINITY))),
                "-INF" => Ok(Some(Value::float(f64::NEG_INFINITY))),
                _ if NUMERIC.is_match(raw) => raw
                    .trim()
                    .parse::<f64>()
                    .map(|f| Some(Value::float(f)))
                    .map_err(|_| site.invalid(Builtin::Float, raw)),
                _ => Err(site.invalid(Builtin::Float, raw)),
            },
            _ => Ok(None),
        }
    }
}
