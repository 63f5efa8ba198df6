//! Well-Known Types
//!
//! Built-in definitions of the `google/protobuf/*.proto` files the engine
//! depends on: Any, Duration, Timestamp, Empty, the scalar wrappers, and the
//! option messages of descriptor.proto. Files that import one of these get it
//! linked in automatically.

use std::sync::LazyLock;

use tracing::error;

use crate::descriptor::{
    DescriptorPool, EnumDef, FieldDef, FieldDescriptor, FileDef, Kind, MessageDef,
    MessageDescriptor, OptionTarget, Options, ScalarType, Syntax, MAX_FIELD_NUMBER,
};
use crate::dynamic::Value;

pub const PACKAGE: &str = "google.protobuf";
pub const ANY: &str = "google.protobuf.Any";

/// Names of every built-in file
pub const FILES: &[&str] = &[
    "google/protobuf/any.proto",
    "google/protobuf/duration.proto",
    "google/protobuf/timestamp.proto",
    "google/protobuf/empty.proto",
    "google/protobuf/wrappers.proto",
    "google/protobuf/descriptor.proto",
];

// =============================================================================
// Concrete types
// =============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct Duration {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Empty {}

// =============================================================================
// File definitions
// =============================================================================

fn proto3(name: &str) -> FileDef {
    FileDef::new(name, PACKAGE).with_syntax(Syntax::Proto3)
}

fn seconds_nanos(name: &str) -> MessageDef {
    MessageDef::new(name)
        .with_field(FieldDef::scalar("seconds", 1, ScalarType::Int64))
        .with_field(FieldDef::scalar("nanos", 2, ScalarType::Int32))
}

const WRAPPERS: &[(&str, ScalarType)] = &[
    ("DoubleValue", ScalarType::Double),
    ("FloatValue", ScalarType::Float),
    ("Int64Value", ScalarType::Int64),
    ("UInt64Value", ScalarType::Uint64),
    ("Int32Value", ScalarType::Int32),
    ("UInt32Value", ScalarType::Uint32),
    ("BoolValue", ScalarType::Bool),
    ("StringValue", ScalarType::String),
    ("BytesValue", ScalarType::Bytes),
];

fn options_message(name: &str, fields: Vec<FieldDef>) -> MessageDef {
    let mut message = MessageDef::new(name).with_extension_range(1000, MAX_FIELD_NUMBER);
    message.fields = fields;
    message
}

fn flag(name: &str, number: i32) -> FieldDef {
    FieldDef::scalar(name, number, ScalarType::Bool)
}

fn text(name: &str, number: i32) -> FieldDef {
    FieldDef::scalar(name, number, ScalarType::String)
}

fn descriptor_file() -> FileDef {
    let java_equals_and_hash = |number| {
        flag("java_generate_equals_and_hash", number)
            .with_options(Options::new().with_builtin("deprecated", Value::Bool(true)))
    };
    let file_options = options_message(
        "FileOptions",
        vec![
            text("java_package", 1),
            text("java_outer_classname", 8),
            FieldDef::enumeration("optimize_for", 9, "OptimizeMode"),
            flag("java_multiple_files", 10),
            text("go_package", 11),
            flag("cc_generic_services", 16),
            flag("java_generic_services", 17),
            flag("py_generic_services", 18),
            java_equals_and_hash(20),
            flag("deprecated", 23),
            flag("java_string_check_utf8", 27),
            flag("cc_enable_arenas", 31),
            text("objc_class_prefix", 36),
            text("csharp_namespace", 37),
            text("swift_prefix", 39),
            text("php_class_prefix", 40),
            text("php_namespace", 41),
            text("php_metadata_namespace", 44),
            text("ruby_package", 45),
        ],
    )
    .with_enum(
        EnumDef::new("OptimizeMode")
            .with_value("SPEED", 1)
            .with_value("CODE_SIZE", 2)
            .with_value("LITE_RUNTIME", 3),
    );

    let field_options = options_message(
        "FieldOptions",
        vec![
            FieldDef::enumeration("ctype", 1, "CType"),
            flag("packed", 2),
            flag("deprecated", 3),
            flag("lazy", 5),
            FieldDef::enumeration("jstype", 6, "JSType"),
            flag("weak", 10),
            flag("unverified_lazy", 15),
        ],
    )
    .with_enum(
        EnumDef::new("CType")
            .with_value("STRING", 0)
            .with_value("CORD", 1)
            .with_value("STRING_PIECE", 2),
    )
    .with_enum(
        EnumDef::new("JSType")
            .with_value("JS_NORMAL", 0)
            .with_value("JS_STRING", 1)
            .with_value("JS_NUMBER", 2),
    );

    let method_options = options_message(
        "MethodOptions",
        vec![
            flag("deprecated", 33),
            FieldDef::enumeration("idempotency_level", 34, "IdempotencyLevel"),
        ],
    )
    .with_enum(
        EnumDef::new("IdempotencyLevel")
            .with_value("IDEMPOTENCY_UNKNOWN", 0)
            .with_value("NO_SIDE_EFFECTS", 1)
            .with_value("IDEMPOTENT", 2),
    );

    FileDef::new("google/protobuf/descriptor.proto", PACKAGE)
        .with_message(file_options)
        .with_message(options_message(
            "MessageOptions",
            vec![
                flag("message_set_wire_format", 1),
                flag("no_standard_descriptor_accessor", 2),
                flag("deprecated", 3),
                flag("map_entry", 7),
            ],
        ))
        .with_message(field_options)
        .with_message(options_message("OneofOptions", Vec::new()))
        .with_message(options_message(
            "EnumOptions",
            vec![flag("allow_alias", 2), flag("deprecated", 3)],
        ))
        .with_message(options_message("EnumValueOptions", vec![flag("deprecated", 1)]))
        .with_message(options_message("ServiceOptions", vec![flag("deprecated", 33)]))
        .with_message(method_options)
        .with_message(options_message("ExtensionRangeOptions", Vec::new()))
}

/// Definition of a built-in file, by import path
pub fn file_def(name: &str) -> Option<FileDef> {
    let def = match name {
        "google/protobuf/any.proto" => proto3(name).with_message(
            MessageDef::new("Any")
                .with_field(text("type_url", 1))
                .with_field(FieldDef::scalar("value", 2, ScalarType::Bytes)),
        ),
        "google/protobuf/duration.proto" => proto3(name).with_message(seconds_nanos("Duration")),
        "google/protobuf/timestamp.proto" => proto3(name).with_message(seconds_nanos("Timestamp")),
        "google/protobuf/empty.proto" => proto3(name).with_message(MessageDef::new("Empty")),
        "google/protobuf/wrappers.proto" => WRAPPERS.iter().fold(proto3(name), |file, (wrapper, ty)| {
            file.with_message(MessageDef::new(*wrapper).with_field(FieldDef::scalar("value", 1, *ty)))
        }),
        "google/protobuf/descriptor.proto" => descriptor_file(),
        _ => return None,
    };
    Some(def)
}

// =============================================================================
// Shared pool
// =============================================================================

static POOL: LazyLock<DescriptorPool> = LazyLock::new(|| {
    let pool = DescriptorPool::new();
    for name in FILES {
        if let Some(def) = file_def(name) {
            if let Err(err) = pool.add_file(def) {
                error!(file = %name, error = %err, "failed to link well-known file");
            }
        }
    }
    pool
});

/// Pool holding every well-known file
pub fn pool() -> &'static DescriptorPool {
    &POOL
}

pub fn is_well_known(full_name: &str) -> bool {
    full_name
        .strip_prefix(PACKAGE)
        .map_or(false, |rest| rest.starts_with('.'))
}

/// Options message for an element kind, e.g. `google.protobuf.FieldOptions`
pub fn options_descriptor(target: OptionTarget) -> Option<MessageDescriptor> {
    pool().get_message_by_name(target.options_type_name())
}

/// Field of the options message for `target` named `name`
pub fn builtin_option(target: OptionTarget, name: &str) -> Option<FieldDescriptor> {
    options_descriptor(target)?.get_field_by_name(name)
}

/// Wrapper message that carries option values of `kind` inside an Any
pub fn wrapper_for(kind: &Kind) -> Option<&'static str> {
    let name = match kind {
        Kind::Scalar(s) => match s {
            ScalarType::Double => "google.protobuf.DoubleValue",
            ScalarType::Float => "google.protobuf.FloatValue",
            ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => {
                "google.protobuf.Int64Value"
            }
            ScalarType::Uint64 | ScalarType::Fixed64 => "google.protobuf.UInt64Value",
            ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => {
                "google.protobuf.Int32Value"
            }
            ScalarType::Uint32 | ScalarType::Fixed32 => "google.protobuf.UInt32Value",
            ScalarType::Bool => "google.protobuf.BoolValue",
            ScalarType::String => "google.protobuf.StringValue",
            ScalarType::Bytes => "google.protobuf.BytesValue",
        },
        Kind::Enum(_) => "google.protobuf.Int32Value",
        Kind::Message(_) => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_file_links() {
        for name in FILES {
            assert!(pool().get_file_by_name(name).is_some(), "{} missing", name);
        }
        assert!(pool().get_message_by_name(ANY).is_some());
        assert!(file_def("google/protobuf/struct.proto").is_none());
    }

    #[test]
    fn test_builtin_option_lookup() {
        let packed = builtin_option(OptionTarget::Field, "packed").unwrap();
        assert_eq!(packed.number(), 2);
        assert!(builtin_option(OptionTarget::Oneof, "packed").is_none());
        let level = builtin_option(OptionTarget::Method, "idempotency_level").unwrap();
        assert!(matches!(level.kind(), Kind::Enum(e) if e.full_name() == "google.protobuf.MethodOptions.IdempotencyLevel"));
    }

    #[test]
    fn test_is_well_known() {
        assert!(is_well_known("google.protobuf.Duration"));
        assert!(!is_well_known("google.protobufx.Duration"));
        assert!(!is_well_known("foo.Bar"));
    }
}
