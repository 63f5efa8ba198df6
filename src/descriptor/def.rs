//! Unlinked Descriptor Definitions
//!
//! Plain data describing files, messages, enums and services before they are
//! linked into a [`DescriptorPool`](super::DescriptorPool). Type references are
//! names: a leading dot marks a fully-qualified name, anything else is
//! resolved relative to the enclosing scope when the file is added.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::options::Options;

/// Highest field number a message may declare
pub const MAX_FIELD_NUMBER: i32 = 536_870_911;

// =============================================================================
// Enumerations
// =============================================================================

/// Schema syntax level of a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Syntax {
    #[default]
    Proto2,
    Proto3,
}

impl Syntax {
    pub fn as_str(&self) -> &'static str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        }
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field cardinality
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    #[default]
    Optional,
    Required,
    Repeated,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Optional => "optional",
            Label::Required => "required",
            Label::Repeated => "repeated",
        }
    }
}

/// Scalar field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Bytes,
    Uint32,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

impl ScalarType {
    /// Keyword used for this type in schema source
    pub fn keyword(&self) -> &'static str {
        match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int64 => "int64",
            ScalarType::Uint64 => "uint64",
            ScalarType::Int32 => "int32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
            ScalarType::Uint32 => "uint32",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
        }
    }

    /// Whether repeated values of this type may use packed encoding
    pub fn is_packable(&self) -> bool {
        !matches!(self, ScalarType::String | ScalarType::Bytes)
    }
}

/// Declared type of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarType),
    /// Reference to a message by (possibly relative) name
    Message(String),
    /// Reference to an enum by (possibly relative) name
    Enum(String),
}

// =============================================================================
// Comments and ranges
// =============================================================================

/// Comments attached to one element
///
/// Text is stored the way schema compilers record it: without the comment
/// markers, usually with a leading space on each line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comments {
    /// Comment blocks separated from the element by a blank line
    pub leading_detached: Vec<String>,
    /// Doc comment immediately preceding the element
    pub leading: Option<String>,
    /// Comment on the same line as (or directly after) the element
    pub trailing: Option<String>,
}

impl Comments {
    pub fn leading(text: impl Into<String>) -> Self {
        Self {
            leading: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_trailing(mut self, text: impl Into<String>) -> Self {
        self.trailing = Some(text.into());
        self
    }

    pub fn with_detached(mut self, text: impl Into<String>) -> Self {
        self.leading_detached.push(text.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.leading_detached.is_empty() && self.leading.is_none() && self.trailing.is_none()
    }
}

/// Inclusive number range (reserved numbers, extension ranges)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Range {
    pub start: i32,
    pub end: i32,
}

impl Range {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn single(number: i32) -> Self {
        Self::new(number, number)
    }

    pub fn contains(&self, number: i32) -> bool {
        number >= self.start && number <= self.end
    }
}

/// Extension range declared by a message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionRangeDef {
    pub start: i32,
    pub end: i32,
    pub options: Options,
}

// =============================================================================
// Definitions
// =============================================================================

/// A schema file before linking
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileDef {
    pub name: String,
    pub package: String,
    pub dependencies: Vec<String>,
    /// Indexes into `dependencies`
    pub public_dependencies: Vec<usize>,
    /// Indexes into `dependencies`
    pub weak_dependencies: Vec<usize>,
    pub syntax: Syntax,
    pub messages: Vec<MessageDef>,
    pub enums: Vec<EnumDef>,
    pub services: Vec<ServiceDef>,
    pub extensions: Vec<FieldDef>,
    pub options: Options,
    /// Comments attached to the syntax statement
    pub comments: Option<Comments>,
}

impl FileDef {
    pub fn new(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            ..Default::default()
        }
    }

    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn with_public_dependency(mut self, name: impl Into<String>) -> Self {
        self.public_dependencies.push(self.dependencies.len());
        self.dependencies.push(name.into());
        self
    }

    pub fn with_message(mut self, message: MessageDef) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_enum(mut self, def: EnumDef) -> Self {
        self.enums.push(def);
        self
    }

    pub fn with_service(mut self, service: ServiceDef) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_extension(mut self, field: FieldDef) -> Self {
        self.extensions.push(field);
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_comments(mut self, comments: Comments) -> Self {
        self.comments = Some(comments);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub oneofs: Vec<OneofDef>,
    pub messages: Vec<MessageDef>,
    pub enums: Vec<EnumDef>,
    pub extensions: Vec<FieldDef>,
    pub extension_ranges: Vec<ExtensionRangeDef>,
    pub reserved_ranges: Vec<Range>,
    pub reserved_names: Vec<String>,
    pub options: Options,
    pub comments: Option<Comments>,
}

impl MessageDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_oneof(mut self, oneof: OneofDef) -> Self {
        self.oneofs.push(oneof);
        self
    }

    pub fn with_message(mut self, message: MessageDef) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_enum(mut self, def: EnumDef) -> Self {
        self.enums.push(def);
        self
    }

    pub fn with_extension(mut self, field: FieldDef) -> Self {
        self.extensions.push(field);
        self
    }

    pub fn with_extension_range(mut self, start: i32, end: i32) -> Self {
        self.extension_ranges.push(ExtensionRangeDef {
            start,
            end,
            options: Options::default(),
        });
        self
    }

    pub fn with_reserved_range(mut self, start: i32, end: i32) -> Self {
        self.reserved_ranges.push(Range::new(start, end));
        self
    }

    pub fn with_reserved_name(mut self, name: impl Into<String>) -> Self {
        self.reserved_names.push(name.into());
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_comments(mut self, comments: Comments) -> Self {
        self.comments = Some(comments);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub number: i32,
    pub label: Label,
    pub ty: FieldType,
    /// Target message for extension fields
    pub extendee: Option<String>,
    /// Index into the enclosing message's `oneofs`
    pub oneof_index: Option<usize>,
    pub json_name: Option<String>,
    pub default_value: Option<String>,
    pub proto3_optional: bool,
    pub options: Options,
    pub comments: Option<Comments>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, number: i32, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            number,
            label: Label::Optional,
            ty,
            extendee: None,
            oneof_index: None,
            json_name: None,
            default_value: None,
            proto3_optional: false,
            options: Options::default(),
            comments: None,
        }
    }

    pub fn scalar(name: impl Into<String>, number: i32, ty: ScalarType) -> Self {
        Self::new(name, number, FieldType::Scalar(ty))
    }

    pub fn message(name: impl Into<String>, number: i32, type_name: impl Into<String>) -> Self {
        Self::new(name, number, FieldType::Message(type_name.into()))
    }

    pub fn enumeration(name: impl Into<String>, number: i32, type_name: impl Into<String>) -> Self {
        Self::new(name, number, FieldType::Enum(type_name.into()))
    }

    pub fn repeated(mut self) -> Self {
        self.label = Label::Repeated;
        self
    }

    pub fn required(mut self) -> Self {
        self.label = Label::Required;
        self
    }

    pub fn in_oneof(mut self, index: usize) -> Self {
        self.oneof_index = Some(index);
        self
    }

    pub fn extending(mut self, extendee: impl Into<String>) -> Self {
        self.extendee = Some(extendee.into());
        self
    }

    pub fn with_json_name(mut self, json_name: impl Into<String>) -> Self {
        self.json_name = Some(json_name.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn proto3_optional(mut self) -> Self {
        self.proto3_optional = true;
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_comments(mut self, comments: Comments) -> Self {
        self.comments = Some(comments);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OneofDef {
    pub name: String,
    pub options: Options,
    pub comments: Option<Comments>,
}

impl OneofDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_comments(mut self, comments: Comments) -> Self {
        self.comments = Some(comments);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<EnumValueDef>,
    pub reserved_ranges: Vec<Range>,
    pub reserved_names: Vec<String>,
    pub options: Options,
    pub comments: Option<Comments>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, number: i32) -> Self {
        self.values.push(EnumValueDef::new(name, number));
        self
    }

    pub fn with_value_def(mut self, value: EnumValueDef) -> Self {
        self.values.push(value);
        self
    }

    pub fn with_reserved_range(mut self, start: i32, end: i32) -> Self {
        self.reserved_ranges.push(Range::new(start, end));
        self
    }

    pub fn with_reserved_name(mut self, name: impl Into<String>) -> Self {
        self.reserved_names.push(name.into());
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_comments(mut self, comments: Comments) -> Self {
        self.comments = Some(comments);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumValueDef {
    pub name: String,
    pub number: i32,
    pub options: Options,
    pub comments: Option<Comments>,
}

impl EnumValueDef {
    pub fn new(name: impl Into<String>, number: i32) -> Self {
        Self {
            name: name.into(),
            number,
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_comments(mut self, comments: Comments) -> Self {
        self.comments = Some(comments);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceDef {
    pub name: String,
    pub methods: Vec<MethodDef>,
    pub options: Options,
    pub comments: Option<Comments>,
}

impl ServiceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_comments(mut self, comments: Comments) -> Self {
        self.comments = Some(comments);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodDef {
    pub name: String,
    pub input_type: String,
    pub output_type: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
    pub options: Options,
    pub comments: Option<Comments>,
}

impl MethodDef {
    pub fn new(
        name: impl Into<String>,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            input_type: input_type.into(),
            output_type: output_type.into(),
            ..Default::default()
        }
    }

    pub fn client_streaming(mut self) -> Self {
        self.client_streaming = true;
        self
    }

    pub fn server_streaming(mut self) -> Self {
        self.server_streaming = true;
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_comments(mut self, comments: Comments) -> Self {
        self.comments = Some(comments);
        self
    }
}
