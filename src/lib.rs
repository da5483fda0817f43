//! Bidirectional normalizer between a generic value tree and a typed object graph.
//!
//! Denormalization walks a [`Value`] against declared class metadata and
//! builds [`Data`]: discriminated subclasses, unions tried in order,
//! scalar coercion for string-only formats, nested paths and constructor
//! arguments. Normalization goes the other way, cutting cycles and skipping
//! unloaded proxies.
//!
//! ```no_run
//! use std::sync::Arc;
//! use graph_normalizer::{ClassTable, Format, Serializer, Value};
//!
//! let table = ClassTable::from_json_str(r#"{"classes": {"Cat": {"properties": {
//!     "name": {"types": [{"builtin": "string"}]}
//! }}}}"#).unwrap();
//! let serializer = Serializer::with_class_table(Arc::new(table));
//! let json: serde_json::Value = serde_json::json!({"name": "Tom"});
//! let cat = serializer.denormalize(Value::from(json), "Cat", Some(&Format::Json), &serializer.context()).unwrap();
//! let back = serializer.normalize(&cat, Some(&Format::Json), &serializer.context()).unwrap();
//! assert_eq!(back.get("name"), Some(&Value::from("Tom")));
//! ```
pub mod adapters;
pub mod coerce;
pub mod context;
pub mod denormalize;
pub mod discriminator;
pub mod error;
pub mod metadata;
pub mod normalize;
pub mod object;
pub mod registry;
pub mod resolve;
pub mod serializer;
pub mod types;
pub mod value;

#[cfg(test)]
mod testing;

pub use adapters::{ArrayAdapter, CollectionAdapter, DateTimeAdapter};
pub use context::{ContextOptions, NormalizationContext};
pub use denormalize::GraphDenormalizer;
pub use error::{AccessError, NormalizerError, Result};
pub use metadata::{AllowedAttributes, DiscriminatorProvider, MetadataProvider};
pub use normalize::GraphNormalizer;
pub use object::{Data, Object, ObjectRef, OrderedCollection};
pub use registry::{ClassDef, ClassTable, ConstructorArg, PropertyDef};
pub use serializer::{Compose, Denormalizer, Normalizer, Serializer};
pub use types::{AttributeTypes, Builtin, DiscriminatorMapping, Format, TypeDescriptor};
pub use value::{Mapping, Value};
