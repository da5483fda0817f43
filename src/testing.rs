//! Shared fixtures for unit tests.
use std::sync::Arc;

use crate::metadata::CamelCaseToSnakeCase;
use crate::object::{DATETIME_CLASSES, ORDERED_COLLECTION};
use crate::registry::{ClassDef, ClassTable, ConstructorArg, PropertyDef};
use crate::serializer::Serializer;
use crate::types::{Builtin, DiscriminatorMapping, TypeDescriptor};
use crate::value::{Mapping, Value};

pub fn value(json: serde_json::Value) -> Value {
    Value::from(json)
}

pub fn mapping(json: serde_json::Value) -> Mapping {
    match Value::from(json) {
        Value::Mapping(m) => m,
        other => panic!("fixture is not an object: {other:?}"),
    }
}

fn t(builtin: Builtin) -> TypeDescriptor {
    TypeDescriptor::builtin(builtin)
}

/// Small class table exercising every metadata feature.
pub fn zoo() -> ClassTable {
    ClassTable::builder()
        .name_converter(CamelCaseToSnakeCase::new())
        .class(
            "Animal",
            ClassDef::new()
                .abstract_class()
                .discriminator(DiscriminatorMapping::new("type", [("cat", "Cat"), ("dog", "Dog")]))
                .property("name", PropertyDef::typed(t(Builtin::String))),
        )
        .class("Cat", ClassDef::new().extends("Animal").property("lives", PropertyDef::typed(t(Builtin::Int))))
        .class("Dog", ClassDef::new().extends("Animal").property("good", PropertyDef::typed(t(Builtin::Bool))))
        .class(
            "Person",
            ClassDef::new()
                .property("name", PropertyDef::typed(t(Builtin::String)).serialized_name("full_name").groups(["public"]))
                .property("secret", PropertyDef::typed(t(Builtin::String)).groups(["private"]))
                .property("birthYear", PropertyDef::typed(t(Builtin::Int).nullable()).groups(["public"]))
                .property(
                    "city",
                    PropertyDef::typed(t(Builtin::String).nullable()).at_path(["address", "city"]).groups(["public"]),
                )
                .property("other", PropertyDef::typed(t(Builtin::Int).nullable()).groups(["public"])),
        )
        .class(
            "Ticket",
            ClassDef::new()
                .property("code", PropertyDef::typed(t(Builtin::String)))
                .property("seat", PropertyDef::typed(t(Builtin::Int)))
                .property("price", PropertyDef::typed(t(Builtin::Int)))
                .property("note", PropertyDef::typed(t(Builtin::String).nullable()))
                .constructor([
                    ConstructorArg::required("code"),
                    ConstructorArg::required("seat"),
                    ConstructorArg::with_default("price", serde_json::json!(10)),
                    ConstructorArg::required("note"),
                ]),
        )
        .class(
            "Booking",
            ClassDef::new()
                .property("item", PropertyDef::union([TypeDescriptor::object("Ticket"), TypeDescriptor::object("Cat")])),
        )
        .class(
            "Owner",
            ClassDef::new()
                .property("name", PropertyDef::typed(t(Builtin::String)))
                .property("pet", PropertyDef::typed(TypeDescriptor::object("Animal").nullable()).association())
                .property("friend", PropertyDef::typed(TypeDescriptor::object("Owner").nullable()).association()),
        )
        .class(
            "Node",
            ClassDef::new()
                .property("label", PropertyDef::typed(t(Builtin::String)))
                .property("next", PropertyDef::typed(TypeDescriptor::object("Node").nullable())),
        )
        .class(
            "Reading",
            ClassDef::new()
                .property("value", PropertyDef::union([t(Builtin::Int), t(Builtin::Float)]))
                .property("ratio", PropertyDef::typed(t(Builtin::Float)))
                .property("flag", PropertyDef::typed(t(Builtin::Bool)))
                .property("on", PropertyDef::typed(t(Builtin::True).nullable()))
                .property("tags", PropertyDef::typed(TypeDescriptor::list_of(t(Builtin::String))))
                .property("taken", PropertyDef::typed(TypeDescriptor::object(DATETIME_CLASSES[0]).nullable()))
                .property("extra", PropertyDef::untyped()),
        )
        .class(
            "Shelter",
            ClassDef::new()
                .property(
                    "animals",
                    PropertyDef::typed(TypeDescriptor::collection_of(ORDERED_COLLECTION, TypeDescriptor::object("Animal"))),
                )
                .property("cats", PropertyDef::typed(TypeDescriptor::list_of(TypeDescriptor::object("Cat"))))
                .property(
                    "grid",
                    PropertyDef::typed(TypeDescriptor::list_of(TypeDescriptor::list_of(TypeDescriptor::object("Cat")))),
                )
                .property("resident", PropertyDef::union([TypeDescriptor::object("Cat"), t(Builtin::String)]))
                .property("counts", PropertyDef::typed(TypeDescriptor::map_of(t(Builtin::Int))))
                .property("keeper", PropertyDef::typed(TypeDescriptor::object("Person").nullable())),
        )
        .build()
        .expect("zoo fixture is valid")
}

pub fn serializer() -> Serializer {
    Serializer::with_class_table(Arc::new(zoo()))
}
