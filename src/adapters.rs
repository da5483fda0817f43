//! Handlers for the built-in containers and value classes.
//!
//! Each one plugs into the [`Serializer`](crate::serializer::Serializer)
//! chain and hands nested elements back to the composer.
pub mod array;
pub mod collection;
pub mod datetime;

pub use array::ArrayAdapter;
pub use collection::CollectionAdapter;
pub use datetime::DateTimeAdapter;
