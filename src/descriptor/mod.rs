//! Descriptor Graph
//!
//! A [`DescriptorPool`] is one linked universe of schema files. Nodes are
//! stored in an append-only arena and addressed by typed indices; the public
//! handle types ([`MessageDescriptor`], [`FieldDescriptor`], ...) pair a pool
//! with an index. Two handles are equal when they point at the same node of
//! the same pool, so references to one type shared across fields and methods
//! compare equal.
//!
//! Cyclic references (a message containing itself, two messages pointing at
//! each other) are plain index links and need no special handling.

pub mod def;
mod link;
pub mod options;

pub use def::{
    Comments, EnumDef, EnumValueDef, ExtensionRangeDef, FieldDef, FieldType, FileDef, Label,
    MessageDef, MethodDef, OneofDef, Range, ScalarType, ServiceDef, Syntax, MAX_FIELD_NUMBER,
};
pub use options::{OptionEntry, OptionName, OptionTarget, Options, UnknownOption};

use parking_lot::RwLock;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::Result;
use link::{
    Arena, EnumIndex, EnumNode, EnumValueIndex, EnumValueNode, FieldIndex, FieldKind, FieldNode,
    FileIndex, FileNode, MessageIndex, MessageNode, MethodIndex, MethodNode, OneofIndex,
    OneofNode, ServiceIndex, ServiceNode, Symbol,
};
pub(crate) use link::join_name;

// =============================================================================
// Node kinds
// =============================================================================

/// The closed set of descriptor node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    File,
    Message,
    Field,
    Oneof,
    Enum,
    EnumValue,
    Service,
    Method,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DescriptorKind::File => "file",
            DescriptorKind::Message => "message",
            DescriptorKind::Field => "field",
            DescriptorKind::Oneof => "oneof",
            DescriptorKind::Enum => "enum",
            DescriptorKind::EnumValue => "enum value",
            DescriptorKind::Service => "service",
            DescriptorKind::Method => "method",
        };
        f.write_str(name)
    }
}

/// Any node of the descriptor graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Descriptor {
    File(FileDescriptor),
    Message(MessageDescriptor),
    Field(FieldDescriptor),
    Oneof(OneofDescriptor),
    Enum(EnumDescriptor),
    EnumValue(EnumValueDescriptor),
    Service(ServiceDescriptor),
    Method(MethodDescriptor),
}

impl Descriptor {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            Descriptor::File(_) => DescriptorKind::File,
            Descriptor::Message(_) => DescriptorKind::Message,
            Descriptor::Field(_) => DescriptorKind::Field,
            Descriptor::Oneof(_) => DescriptorKind::Oneof,
            Descriptor::Enum(_) => DescriptorKind::Enum,
            Descriptor::EnumValue(_) => DescriptorKind::EnumValue,
            Descriptor::Service(_) => DescriptorKind::Service,
            Descriptor::Method(_) => DescriptorKind::Method,
        }
    }

    /// Fully-qualified name; for files, the file name
    pub fn full_name(&self) -> &str {
        match self {
            Descriptor::File(d) => d.name(),
            Descriptor::Message(d) => d.full_name(),
            Descriptor::Field(d) => d.full_name(),
            Descriptor::Oneof(d) => d.full_name(),
            Descriptor::Enum(d) => d.full_name(),
            Descriptor::EnumValue(d) => d.full_name(),
            Descriptor::Service(d) => d.full_name(),
            Descriptor::Method(d) => d.full_name(),
        }
    }

    pub fn file(&self) -> FileDescriptor {
        match self {
            Descriptor::File(d) => d.clone(),
            Descriptor::Message(d) => d.file(),
            Descriptor::Field(d) => d.file(),
            Descriptor::Oneof(d) => d.parent_message().file(),
            Descriptor::Enum(d) => d.file(),
            Descriptor::EnumValue(d) => d.parent_enum().file(),
            Descriptor::Service(d) => d.file(),
            Descriptor::Method(d) => d.parent_service().file(),
        }
    }
}

macro_rules! impl_from_handle {
    ($($variant:ident => $handle:ty),* $(,)?) => {
        $(
            impl From<$handle> for Descriptor {
                fn from(d: $handle) -> Self {
                    Descriptor::$variant(d)
                }
            }
        )*
    };
}

impl_from_handle!(
    File => FileDescriptor,
    Message => MessageDescriptor,
    Field => FieldDescriptor,
    Oneof => OneofDescriptor,
    Enum => EnumDescriptor,
    EnumValue => EnumValueDescriptor,
    Service => ServiceDescriptor,
    Method => MethodDescriptor,
);

// =============================================================================
// Pool
// =============================================================================

/// A linked universe of descriptors
///
/// Cloning is cheap and yields a handle to the same universe. Files can be
/// added at any time; existing nodes never move or change.
#[derive(Clone, Default)]
pub struct DescriptorPool {
    inner: Arc<RwLock<Arena>>,
}

impl fmt::Debug for DescriptorPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.inner.read();
        f.debug_struct("DescriptorPool")
            .field("files", &arena.files.len())
            .field("messages", &arena.messages.len())
            .finish()
    }
}

impl DescriptorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link one file into the pool
    pub fn add_file(&self, def: FileDef) -> Result<FileDescriptor> {
        let mut files = self.add_files(vec![def])?;
        Ok(files.remove(0))
    }

    /// Link several files at once; they may reference each other freely.
    ///
    /// Either every file is added or, on error, none is.
    pub fn add_files(&self, defs: Vec<FileDef>) -> Result<Vec<FileDescriptor>> {
        let indices = self.inner.write().link(defs)?;
        let arena = self.inner.read();
        Ok(indices
            .into_iter()
            .map(|i| FileDescriptor::at(self, &arena, i))
            .collect())
    }

    /// Make `file` (and its imports) available in this pool.
    ///
    /// Files already present under the same name are reused.
    pub fn import_file(&self, file: &FileDescriptor) -> Result<FileDescriptor> {
        if file.pool.ptr_eq(self) {
            return Ok(file.clone());
        }
        if let Some(existing) = self.get_file_by_name(file.name()) {
            return Ok(existing);
        }
        let mut defs = Vec::new();
        let mut seen = std::collections::HashSet::new();
        self.collect_missing(file, &mut defs, &mut seen);
        self.add_files(defs)?;
        self.get_file_by_name(file.name())
            .ok_or_else(|| crate::error::ReflectError::MissingDependency {
                file: file.name().to_string(),
                dependency: file.name().to_string(),
            })
    }

    fn collect_missing(
        &self,
        file: &FileDescriptor,
        defs: &mut Vec<FileDef>,
        seen: &mut std::collections::HashSet<String>,
    ) {
        if !seen.insert(file.name().to_string()) || self.get_file_by_name(file.name()).is_some() {
            return;
        }
        for dep in file.dependencies() {
            self.collect_missing(&dep, defs, seen);
        }
        defs.push(file.to_def());
    }

    pub fn ptr_eq(&self, other: &DescriptorPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn files(&self) -> Vec<FileDescriptor> {
        let arena = self.inner.read();
        (0..arena.files.len())
            .map(|i| FileDescriptor::at(self, &arena, FileIndex(i as u32)))
            .collect()
    }

    pub fn get_file_by_name(&self, name: &str) -> Option<FileDescriptor> {
        let arena = self.inner.read();
        arena
            .files_by_name
            .get(name)
            .map(|&i| FileDescriptor::at(self, &arena, i))
    }

    pub fn get_message_by_name(&self, full_name: &str) -> Option<MessageDescriptor> {
        match self.get_by_name(full_name)? {
            Descriptor::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn get_enum_by_name(&self, full_name: &str) -> Option<EnumDescriptor> {
        match self.get_by_name(full_name)? {
            Descriptor::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn get_service_by_name(&self, full_name: &str) -> Option<ServiceDescriptor> {
        match self.get_by_name(full_name)? {
            Descriptor::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_extension_by_name(&self, full_name: &str) -> Option<FieldDescriptor> {
        match self.get_by_name(full_name)? {
            Descriptor::Field(f) if f.is_extension() => Some(f),
            _ => None,
        }
    }

    /// Any named element; packages are not descriptors and yield `None`
    pub fn get_by_name(&self, full_name: &str) -> Option<Descriptor> {
        let arena = self.inner.read();
        let symbol = arena.lookup(full_name)?;
        self.descriptor_for(&arena, symbol)
    }

    /// Whether `name` is a package declared by some file of this pool
    pub fn is_package(&self, name: &str) -> bool {
        matches!(self.inner.read().lookup(name), Some(Symbol::Package))
    }

    /// Resolve `name` as schema source written inside `scope` would
    pub fn resolve_type_name(&self, scope: &str, name: &str) -> Option<Descriptor> {
        let arena = self.inner.read();
        let (_, symbol) = arena.resolve_type(scope, name)?;
        self.descriptor_for(&arena, symbol)
    }

    /// Extension `option_name` of the message `containing_type`
    pub fn find_extension(&self, containing_type: &str, option_name: &str) -> Option<FieldDescriptor> {
        let option_name = option_name.trim_start_matches('(').trim_end_matches(')');
        let option_name = option_name.strip_prefix('.').unwrap_or(option_name);
        self.get_extension_by_name(option_name)
            .filter(|ext| ext.extendee().map_or(false, |m| m.full_name() == containing_type))
    }

    fn descriptor_for(&self, arena: &Arena, symbol: Symbol) -> Option<Descriptor> {
        Some(match symbol {
            Symbol::Package => return None,
            Symbol::Message(i) => Descriptor::Message(MessageDescriptor::at(self, arena, i)),
            Symbol::Enum(i) => Descriptor::Enum(EnumDescriptor::at(self, arena, i)),
            Symbol::Service(i) => Descriptor::Service(ServiceDescriptor::at(self, arena, i)),
            Symbol::Method(i) => Descriptor::Method(MethodDescriptor::at(self, arena, i)),
            Symbol::Field(i) => Descriptor::Field(FieldDescriptor::at(self, arena, i)),
            Symbol::Oneof(i) => Descriptor::Oneof(OneofDescriptor::at(self, arena, i)),
        })
    }
}

// =============================================================================
// Handles
// =============================================================================

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $index:ty, $node:ty, $vec:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            pool: DescriptorPool,
            index: $index,
            node: Arc<$node>,
        }

        impl $name {
            fn at(pool: &DescriptorPool, arena: &Arena, index: $index) -> Self {
                Self {
                    pool: pool.clone(),
                    index,
                    node: arena.$vec[index.get()].clone(),
                }
            }

            /// The pool this node belongs to
            pub fn pool(&self) -> &DescriptorPool {
                &self.pool
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.index == other.index && self.pool.ptr_eq(&other.pool)
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                (Arc::as_ptr(&self.pool.inner) as usize).hash(state);
                self.index.hash(state);
            }
        }
    };
}

handle!(
    /// A linked schema file
    FileDescriptor, FileIndex, FileNode, files
);
handle!(
    /// A message type
    MessageDescriptor, MessageIndex, MessageNode, messages
);
handle!(
    /// A message field or an extension
    FieldDescriptor, FieldIndex, FieldNode, fields
);
handle!(OneofDescriptor, OneofIndex, OneofNode, oneofs);
handle!(EnumDescriptor, EnumIndex, EnumNode, enums);
handle!(EnumValueDescriptor, EnumValueIndex, EnumValueNode, enum_values);
handle!(ServiceDescriptor, ServiceIndex, ServiceNode, services);
handle!(MethodDescriptor, MethodIndex, MethodNode, methods);

macro_rules! debug_by_name {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_tuple(stringify!($name)).field(&self.node.$field).finish()
                }
            }
        )*
    };
}

debug_by_name!(
    FileDescriptor => name,
    MessageDescriptor => full_name,
    FieldDescriptor => full_name,
    OneofDescriptor => full_name,
    EnumDescriptor => full_name,
    EnumValueDescriptor => full_name,
    ServiceDescriptor => full_name,
    MethodDescriptor => full_name,
);

/// Linked kind of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Scalar(ScalarType),
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
}

impl FileDescriptor {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn package(&self) -> &str {
        &self.node.package
    }

    pub fn syntax(&self) -> Syntax {
        self.node.syntax
    }

    pub fn dependencies(&self) -> Vec<FileDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .dependencies
            .iter()
            .map(|&i| FileDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    pub fn is_public_dependency(&self, index: usize) -> bool {
        self.node.public_dependencies.contains(&index)
    }

    pub fn is_weak_dependency(&self, index: usize) -> bool {
        self.node.weak_dependencies.contains(&index)
    }

    pub fn messages(&self) -> Vec<MessageDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .messages
            .iter()
            .map(|&i| MessageDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    pub fn enums(&self) -> Vec<EnumDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .enums
            .iter()
            .map(|&i| EnumDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    pub fn services(&self) -> Vec<ServiceDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .services
            .iter()
            .map(|&i| ServiceDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    pub fn extensions(&self) -> Vec<FieldDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .extensions
            .iter()
            .map(|&i| FieldDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    pub fn options(&self) -> &Options {
        &self.node.options
    }

    pub fn comments(&self) -> Option<&Comments> {
        self.node.comments.as_ref()
    }

    /// Convert back into an unlinked definition with fully-qualified references
    pub fn to_def(&self) -> FileDef {
        FileDef {
            name: self.name().to_string(),
            package: self.package().to_string(),
            dependencies: self.dependencies().iter().map(|d| d.name().to_string()).collect(),
            public_dependencies: self.node.public_dependencies.clone(),
            weak_dependencies: self.node.weak_dependencies.clone(),
            syntax: self.syntax(),
            messages: self.messages().iter().map(MessageDescriptor::to_def).collect(),
            enums: self.enums().iter().map(EnumDescriptor::to_def).collect(),
            services: self.services().iter().map(ServiceDescriptor::to_def).collect(),
            extensions: self.extensions().iter().map(FieldDescriptor::to_def).collect(),
            options: self.options().clone(),
            comments: self.node.comments.clone(),
        }
    }
}

impl MessageDescriptor {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn full_name(&self) -> &str {
        &self.node.full_name
    }

    pub fn package_name(&self) -> String {
        self.file().package().to_string()
    }

    pub fn file(&self) -> FileDescriptor {
        let arena = self.pool.inner.read();
        FileDescriptor::at(&self.pool, &arena, self.node.file)
    }

    pub fn parent_message(&self) -> Option<MessageDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .parent
            .map(|i| MessageDescriptor::at(&self.pool, &arena, i))
    }

    pub fn fields(&self) -> Vec<FieldDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .fields
            .iter()
            .map(|&i| FieldDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    pub fn get_field(&self, number: i32) -> Option<FieldDescriptor> {
        self.fields().into_iter().find(|f| f.number() == number)
    }

    pub fn get_field_by_name(&self, name: &str) -> Option<FieldDescriptor> {
        self.fields().into_iter().find(|f| f.name() == name)
    }

    pub fn oneofs(&self) -> Vec<OneofDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .oneofs
            .iter()
            .map(|&i| OneofDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    pub fn nested_messages(&self) -> Vec<MessageDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .messages
            .iter()
            .map(|&i| MessageDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    pub fn nested_enums(&self) -> Vec<EnumDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .enums
            .iter()
            .map(|&i| EnumDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    /// Extensions declared inside this message
    pub fn nested_extensions(&self) -> Vec<FieldDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .extensions
            .iter()
            .map(|&i| FieldDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    pub fn extension_ranges(&self) -> &[ExtensionRangeDef] {
        &self.node.extension_ranges
    }

    pub fn reserved_ranges(&self) -> &[Range] {
        &self.node.reserved_ranges
    }

    pub fn reserved_names(&self) -> &[String] {
        &self.node.reserved_names
    }

    pub fn options(&self) -> &Options {
        &self.node.options
    }

    pub fn comments(&self) -> Option<&Comments> {
        self.node.comments.as_ref()
    }

    pub fn is_map_entry(&self) -> bool {
        self.node.options.flag("map_entry")
    }

    pub fn to_def(&self) -> MessageDef {
        MessageDef {
            name: self.name().to_string(),
            fields: self.fields().iter().map(FieldDescriptor::to_def).collect(),
            oneofs: self
                .oneofs()
                .iter()
                .map(|o| OneofDef {
                    name: o.name().to_string(),
                    options: o.options().clone(),
                    comments: o.comments().cloned(),
                })
                .collect(),
            messages: self.nested_messages().iter().map(MessageDescriptor::to_def).collect(),
            enums: self.nested_enums().iter().map(EnumDescriptor::to_def).collect(),
            extensions: self
                .nested_extensions()
                .iter()
                .map(FieldDescriptor::to_def)
                .collect(),
            extension_ranges: self.node.extension_ranges.clone(),
            reserved_ranges: self.node.reserved_ranges.clone(),
            reserved_names: self.node.reserved_names.clone(),
            options: self.options().clone(),
            comments: self.node.comments.clone(),
        }
    }
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn full_name(&self) -> &str {
        &self.node.full_name
    }

    pub fn number(&self) -> i32 {
        self.node.number
    }

    pub fn label(&self) -> Label {
        self.node.label
    }

    pub fn kind(&self) -> Kind {
        let arena = self.pool.inner.read();
        match self.node.kind {
            FieldKind::Scalar(s) => Kind::Scalar(s),
            FieldKind::Message(i) => Kind::Message(MessageDescriptor::at(&self.pool, &arena, i)),
            FieldKind::Enum(i) => Kind::Enum(EnumDescriptor::at(&self.pool, &arena, i)),
        }
    }

    pub fn is_list(&self) -> bool {
        self.node.label == Label::Repeated
    }

    /// Repeated field of a synthesized `map_entry` message
    pub fn is_map(&self) -> bool {
        self.is_list() && matches!(self.kind(), Kind::Message(m) if m.is_map_entry())
    }

    pub fn is_extension(&self) -> bool {
        self.node.extendee.is_some()
    }

    pub fn is_packed(&self) -> bool {
        if !self.is_list() {
            return false;
        }
        let packable = match self.node.kind {
            FieldKind::Scalar(s) => s.is_packable(),
            FieldKind::Enum(_) => true,
            FieldKind::Message(_) => false,
        };
        if !packable {
            return false;
        }
        match self.node.options.get("packed") {
            Some(crate::dynamic::Value::Bool(packed)) => *packed,
            _ => self.file().syntax() == Syntax::Proto3,
        }
    }

    pub fn file(&self) -> FileDescriptor {
        let arena = self.pool.inner.read();
        FileDescriptor::at(&self.pool, &arena, self.node.file)
    }

    /// Containing message for regular fields, declaring message for nested extensions
    pub fn parent_message(&self) -> Option<MessageDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .parent
            .map(|i| MessageDescriptor::at(&self.pool, &arena, i))
    }

    pub fn extendee(&self) -> Option<MessageDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .extendee
            .map(|i| MessageDescriptor::at(&self.pool, &arena, i))
    }

    pub fn containing_oneof(&self) -> Option<OneofDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .oneof
            .map(|i| OneofDescriptor::at(&self.pool, &arena, i))
    }

    /// Explicit json name, or the lowerCamelCase default
    pub fn json_name(&self) -> String {
        self.node
            .json_name
            .clone()
            .unwrap_or_else(|| default_json_name(&self.node.name))
    }

    pub fn has_custom_json_name(&self) -> bool {
        matches!(&self.node.json_name, Some(j) if *j != default_json_name(&self.node.name))
    }

    pub fn default_value(&self) -> Option<&str> {
        self.node.default_value.as_deref()
    }

    pub fn is_proto3_optional(&self) -> bool {
        self.node.proto3_optional
    }

    pub fn options(&self) -> &Options {
        &self.node.options
    }

    pub fn comments(&self) -> Option<&Comments> {
        self.node.comments.as_ref()
    }

    pub fn to_def(&self) -> FieldDef {
        let ty = match self.kind() {
            Kind::Scalar(s) => FieldType::Scalar(s),
            Kind::Message(m) => FieldType::Message(format!(".{}", m.full_name())),
            Kind::Enum(e) => FieldType::Enum(format!(".{}", e.full_name())),
        };
        let oneof_index = self.containing_oneof().and_then(|o| {
            let parent = o.parent_message();
            parent.oneofs().iter().position(|x| *x == o)
        });
        FieldDef {
            name: self.name().to_string(),
            number: self.number(),
            label: self.label(),
            ty,
            extendee: self.extendee().map(|m| format!(".{}", m.full_name())),
            oneof_index,
            json_name: self.node.json_name.clone(),
            default_value: self.node.default_value.clone(),
            proto3_optional: self.node.proto3_optional,
            options: self.options().clone(),
            comments: self.node.comments.clone(),
        }
    }
}

impl OneofDescriptor {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn full_name(&self) -> &str {
        &self.node.full_name
    }

    pub fn parent_message(&self) -> MessageDescriptor {
        let arena = self.pool.inner.read();
        MessageDescriptor::at(&self.pool, &arena, self.node.parent)
    }

    pub fn fields(&self) -> Vec<FieldDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .fields
            .iter()
            .map(|&i| FieldDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    /// Oneof generated for a single proto3 `optional` field
    pub fn is_synthetic(&self) -> bool {
        let fields = self.fields();
        fields.len() == 1 && fields[0].is_proto3_optional()
    }

    pub fn options(&self) -> &Options {
        &self.node.options
    }

    pub fn comments(&self) -> Option<&Comments> {
        self.node.comments.as_ref()
    }
}

impl EnumDescriptor {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn full_name(&self) -> &str {
        &self.node.full_name
    }

    pub fn file(&self) -> FileDescriptor {
        let arena = self.pool.inner.read();
        FileDescriptor::at(&self.pool, &arena, self.node.file)
    }

    pub fn parent_message(&self) -> Option<MessageDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .parent
            .map(|i| MessageDescriptor::at(&self.pool, &arena, i))
    }

    pub fn values(&self) -> Vec<EnumValueDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .values
            .iter()
            .map(|&i| EnumValueDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    /// First value declared with `number`
    pub fn get_value(&self, number: i32) -> Option<EnumValueDescriptor> {
        self.values().into_iter().find(|v| v.number() == number)
    }

    pub fn get_value_by_name(&self, name: &str) -> Option<EnumValueDescriptor> {
        self.values().into_iter().find(|v| v.name() == name)
    }

    pub fn reserved_ranges(&self) -> &[Range] {
        &self.node.reserved_ranges
    }

    pub fn reserved_names(&self) -> &[String] {
        &self.node.reserved_names
    }

    pub fn options(&self) -> &Options {
        &self.node.options
    }

    pub fn comments(&self) -> Option<&Comments> {
        self.node.comments.as_ref()
    }

    pub fn to_def(&self) -> EnumDef {
        EnumDef {
            name: self.name().to_string(),
            values: self
                .values()
                .iter()
                .map(|v| EnumValueDef {
                    name: v.name().to_string(),
                    number: v.number(),
                    options: v.options().clone(),
                    comments: v.comments().cloned(),
                })
                .collect(),
            reserved_ranges: self.node.reserved_ranges.clone(),
            reserved_names: self.node.reserved_names.clone(),
            options: self.options().clone(),
            comments: self.node.comments.clone(),
        }
    }
}

impl EnumValueDescriptor {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn full_name(&self) -> &str {
        &self.node.full_name
    }

    pub fn number(&self) -> i32 {
        self.node.number
    }

    pub fn parent_enum(&self) -> EnumDescriptor {
        let arena = self.pool.inner.read();
        EnumDescriptor::at(&self.pool, &arena, self.node.parent)
    }

    pub fn options(&self) -> &Options {
        &self.node.options
    }

    pub fn comments(&self) -> Option<&Comments> {
        self.node.comments.as_ref()
    }
}

impl ServiceDescriptor {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn full_name(&self) -> &str {
        &self.node.full_name
    }

    pub fn file(&self) -> FileDescriptor {
        let arena = self.pool.inner.read();
        FileDescriptor::at(&self.pool, &arena, self.node.file)
    }

    pub fn methods(&self) -> Vec<MethodDescriptor> {
        let arena = self.pool.inner.read();
        self.node
            .methods
            .iter()
            .map(|&i| MethodDescriptor::at(&self.pool, &arena, i))
            .collect()
    }

    pub fn options(&self) -> &Options {
        &self.node.options
    }

    pub fn comments(&self) -> Option<&Comments> {
        self.node.comments.as_ref()
    }

    pub fn to_def(&self) -> ServiceDef {
        ServiceDef {
            name: self.name().to_string(),
            methods: self
                .methods()
                .iter()
                .map(|m| MethodDef {
                    name: m.name().to_string(),
                    input_type: format!(".{}", m.input().full_name()),
                    output_type: format!(".{}", m.output().full_name()),
                    client_streaming: m.is_client_streaming(),
                    server_streaming: m.is_server_streaming(),
                    options: m.options().clone(),
                    comments: m.comments().cloned(),
                })
                .collect(),
            options: self.options().clone(),
            comments: self.node.comments.clone(),
        }
    }
}

impl MethodDescriptor {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn full_name(&self) -> &str {
        &self.node.full_name
    }

    pub fn parent_service(&self) -> ServiceDescriptor {
        let arena = self.pool.inner.read();
        ServiceDescriptor::at(&self.pool, &arena, self.node.parent)
    }

    pub fn input(&self) -> MessageDescriptor {
        let arena = self.pool.inner.read();
        MessageDescriptor::at(&self.pool, &arena, self.node.input)
    }

    pub fn output(&self) -> MessageDescriptor {
        let arena = self.pool.inner.read();
        MessageDescriptor::at(&self.pool, &arena, self.node.output)
    }

    pub fn is_client_streaming(&self) -> bool {
        self.node.client_streaming
    }

    pub fn is_server_streaming(&self) -> bool {
        self.node.server_streaming
    }

    pub fn options(&self) -> &Options {
        &self.node.options
    }

    pub fn comments(&self) -> Option<&Comments> {
        self.node.comments.as_ref()
    }
}

/// lowerCamelCase json name derived from a field name
pub fn default_json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pool() -> DescriptorPool {
        let pool = DescriptorPool::new();
        pool.add_file(
            FileDef::new("test/sample.proto", "test")
                .with_syntax(Syntax::Proto3)
                .with_message(
                    MessageDef::new("Node")
                        .with_oneof(OneofDef::new("payload"))
                        .with_field(FieldDef::scalar("id", 1, ScalarType::Int64))
                        .with_field(FieldDef::message("children", 2, "Node").repeated())
                        .with_field(FieldDef::scalar("text", 3, ScalarType::String).in_oneof(0))
                        .with_field(FieldDef::enumeration("color", 4, "Color").in_oneof(0))
                        .with_enum(EnumDef::new("Color").with_value("RED", 0).with_value("BLUE", 1)),
                ),
        )
        .unwrap();
        pool
    }

    #[test]
    fn test_self_reference_links_to_same_node() {
        let pool = sample_pool();
        let node = pool.get_message_by_name("test.Node").unwrap();
        let children = node.get_field_by_name("children").unwrap();
        assert_eq!(children.kind(), Kind::Message(node.clone()));
        assert!(children.is_list());
        assert!(!children.is_packed());
    }

    #[test]
    fn test_relative_enum_reference_resolves_nested() {
        let pool = sample_pool();
        let color = pool.get_enum_by_name("test.Node.Color").unwrap();
        let field = pool
            .get_message_by_name("test.Node")
            .unwrap()
            .get_field(4)
            .unwrap();
        assert_eq!(field.kind(), Kind::Enum(color.clone()));
        assert_eq!(color.values()[1].full_name(), "test.Node.BLUE");
    }

    #[test]
    fn test_oneof_members_in_declaration_order() {
        let pool = sample_pool();
        let node = pool.get_message_by_name("test.Node").unwrap();
        let oneofs = node.oneofs();
        let oneof = &oneofs[0];
        let names: Vec<_> = oneof.fields().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["text", "color"]);
        assert_eq!(node.get_field(3).unwrap().containing_oneof().as_ref(), Some(oneof));
    }

    #[test]
    fn test_duplicate_name_rejects_whole_batch() {
        let pool = sample_pool();
        let before = pool.files().len();
        let err = pool
            .add_files(vec![
                FileDef::new("ok.proto", "other").with_message(MessageDef::new("Fine")),
                FileDef::new("dup.proto", "test").with_message(MessageDef::new("Node")),
            ])
            .unwrap_err();
        assert!(matches!(err, crate::ReflectError::DuplicateName(n) if n == "test.Node"));
        assert_eq!(pool.files().len(), before);
        assert!(pool.get_message_by_name("other.Fine").is_none());
    }

    #[test]
    fn test_duplicate_field_number_rejected() {
        let pool = DescriptorPool::new();
        let err = pool
            .add_file(
                FileDef::new("bad.proto", "bad").with_message(
                    MessageDef::new("M")
                        .with_field(FieldDef::scalar("a", 1, ScalarType::Bool))
                        .with_field(FieldDef::scalar("b", 1, ScalarType::Bool)),
                ),
            )
            .unwrap_err();
        assert!(matches!(err, crate::ReflectError::Malformed { .. }));
    }

    #[test]
    fn test_missing_dependency() {
        let pool = DescriptorPool::new();
        let err = pool
            .add_file(FileDef::new("a.proto", "a").with_dependency("nope.proto"))
            .unwrap_err();
        assert!(matches!(err, crate::ReflectError::MissingDependency { .. }));
    }

    #[test]
    fn test_well_known_dependency_is_imported() {
        let pool = DescriptorPool::new();
        let file = pool
            .add_file(
                FileDef::new("a.proto", "a")
                    .with_dependency("google/protobuf/timestamp.proto")
                    .with_message(
                        MessageDef::new("Event")
                            .with_field(FieldDef::message("at", 1, "google.protobuf.Timestamp")),
                    ),
            )
            .unwrap();
        assert_eq!(file.dependencies()[0].name(), "google/protobuf/timestamp.proto");
        let at = file.messages()[0].get_field(1).unwrap();
        match at.kind() {
            Kind::Message(m) => assert_eq!(m.full_name(), "google.protobuf.Timestamp"),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_import_file_across_pools() {
        let source = sample_pool();
        let target = DescriptorPool::new();
        let file = source.get_file_by_name("test/sample.proto").unwrap();
        let imported = target.import_file(&file).unwrap();
        assert!(imported.pool().ptr_eq(&target));
        assert_eq!(imported.to_def(), file.to_def());
        // importing twice reuses the first copy
        assert_eq!(target.import_file(&file).unwrap(), imported);
    }

    #[test]
    fn test_default_json_name() {
        assert_eq!(default_json_name("foo_bar_baz"), "fooBarBaz");
        assert_eq!(default_json_name("id"), "id");
    }
}
