//! Canonical Printer
//!
//! Renders a file, or any element inside one, back into schema source. The
//! output is deterministic for a given [`PrinterConfig`]: elements appear in
//! declaration order unless sorting is enabled or a custom comparator is
//! installed, in which case the comparator decides the order at every
//! nesting level.
//!
//! ```text
//! syntax = "proto3";
//!
//! package acme;
//!
//! import "google/protobuf/timestamp.proto";
//!
//! message Event {
//!   google.protobuf.Timestamp at = 1;
//!   map<string, int64> counters = 2;
//! }
//! ```

mod quote;
mod sort;

pub use quote::{quote_bytes, quote_str};
pub use sort::{default_order, Element, ElementKind};

use std::cmp::Ordering;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::trace;

use crate::config::{CommentPolicy, PrinterConfig};
use crate::descriptor::{
    Comments, Descriptor, DescriptorPool, EnumDescriptor, EnumValueDescriptor, ExtensionRangeDef,
    FieldDescriptor, FileDescriptor, Kind, Label, MessageDescriptor, MethodDescriptor,
    OneofDescriptor, OptionName, OptionTarget, Options, Range, ScalarType, ServiceDescriptor,
    Syntax, MAX_FIELD_NUMBER,
};
use crate::dynamic::{DynamicMessage, Value};
use crate::error::Result;
use crate::wellknown;

/// Caller-supplied element order
pub type SortFn = dyn Fn(&Element, &Element) -> Ordering + Send + Sync;

/// Renders descriptors as schema source
#[derive(Clone, Default)]
pub struct Printer {
    config: PrinterConfig,
    sort_fn: Option<Arc<SortFn>>,
}

impl fmt::Debug for Printer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Printer")
            .field("config", &self.config)
            .field("custom_sort", &self.sort_fn.is_some())
            .finish()
    }
}

impl Printer {
    pub fn new(config: PrinterConfig) -> Self {
        Self {
            config,
            sort_fn: None,
        }
    }

    /// Order siblings with `sort_fn` instead of declaration order
    pub fn with_sort_fn<F>(mut self, sort_fn: F) -> Self
    where
        F: Fn(&Element, &Element) -> Ordering + Send + Sync + 'static,
    {
        self.sort_fn = Some(Arc::new(sort_fn));
        self
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    pub fn render<W: io::Write>(&self, descriptor: &Descriptor, mut out: W) -> Result<()> {
        let text = self.render_to_string(descriptor)?;
        out.write_all(text.as_bytes())?;
        Ok(())
    }

    pub fn render_to_string(&self, descriptor: &Descriptor) -> Result<String> {
        let file = descriptor.file();
        let mut renderer = Renderer {
            config: &self.config,
            sort_fn: self.sort_fn.as_deref(),
            pool: file.pool().clone(),
            syntax: file.syntax(),
            out: String::new(),
        };
        match descriptor {
            Descriptor::File(f) => renderer.file(f),
            Descriptor::Message(m) => renderer.message(0, m),
            Descriptor::Field(f) => {
                let scope = field_scope(f);
                if f.is_extension() {
                    renderer.extend_block(0, &scope, std::slice::from_ref(f));
                } else {
                    renderer.field(0, &scope, f, real_oneof(f).is_some());
                }
            }
            Descriptor::Oneof(o) => {
                let scope = o.parent_message().full_name().to_string();
                renderer.oneof(0, &scope, o, &o.fields());
            }
            Descriptor::Enum(e) => renderer.enumeration(0, e),
            Descriptor::EnumValue(v) => renderer.enum_value(0, v),
            Descriptor::Service(s) => renderer.service(0, s),
            Descriptor::Method(m) => {
                let scope = m.parent_service().full_name().to_string();
                renderer.method(0, &scope, m);
            }
        }
        Ok(renderer.out)
    }
}

// =============================================================================
// Elements
// =============================================================================

enum Body {
    Package(String),
    Import(String, &'static str),
    Option {
        name: OptionName,
        value: Value,
        field: Option<FieldDescriptor>,
    },
    Field(FieldDescriptor),
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
    Service(ServiceDescriptor),
    ExtensionRange(ExtensionRangeDef),
    Extension(FieldDescriptor),
    /// Range and the value written as `max`
    ReservedRange(Range, i32),
    ReservedName(String),
    EnumValue(EnumValueDescriptor),
    Method(MethodDescriptor),
}

struct Item {
    element: Element,
    body: Body,
}

impl Item {
    fn new(element: Element, body: Body) -> Self {
        Self { element, body }
    }

    fn field(field: &FieldDescriptor) -> Self {
        let element = Element::numbered(ElementKind::Field, field.name(), field.number());
        Self::new(element, Body::Field(field.clone()))
    }

    fn extension(field: &FieldDescriptor) -> Self {
        let mut element = Element::numbered(ElementKind::Extension, field.name(), field.number());
        element.extendee = field
            .extendee()
            .map(|m| m.full_name().to_string())
            .unwrap_or_default();
        Self::new(element, Body::Extension(field.clone()))
    }

    fn reserved(ranges: &[Range], names: &[String], max: i32) -> Vec<Item> {
        let mut items: Vec<Item> = ranges
            .iter()
            .map(|r| {
                let element = Element::ranged(ElementKind::ReservedRange, r.start, r.end);
                Item::new(element, Body::ReservedRange(*r, max))
            })
            .collect();
        items.extend(names.iter().map(|n| {
            Item::new(
                Element::new(ElementKind::ReservedName, n.clone()),
                Body::ReservedName(n.clone()),
            )
        }));
        items
    }
}

fn option_items(options: &Options, target: OptionTarget, pool: &DescriptorPool) -> Vec<Item> {
    let mut items = Vec::new();
    for entry in options.entries() {
        let field = option_field(&entry.name, target, pool);
        let values = match &entry.value {
            Value::List(values) => values.clone(),
            value => vec![value.clone()],
        };
        for value in values {
            let mut element = Element::new(ElementKind::Option, entry.name.name());
            element.custom = entry.name.is_custom();
            items.push(Item::new(
                element,
                Body::Option {
                    name: entry.name.clone(),
                    value,
                    field: field.clone(),
                },
            ));
        }
    }
    if !options.unknown().is_empty() {
        trace!(count = options.unknown().len(), "skipping uninterpreted options");
    }
    items
}

fn option_field(name: &OptionName, target: OptionTarget, pool: &DescriptorPool) -> Option<FieldDescriptor> {
    match name {
        OptionName::Builtin(name) => wellknown::builtin_option(target, name),
        OptionName::Extension(name) => pool
            .get_extension_by_name(name)
            .or_else(|| wellknown::pool().get_extension_by_name(name)),
    }
}

fn real_oneof(field: &FieldDescriptor) -> Option<OneofDescriptor> {
    field.containing_oneof().filter(|o| !o.is_synthetic())
}

/// Scope type names of `field` are resolved from
fn field_scope(field: &FieldDescriptor) -> String {
    match field.parent_message() {
        Some(message) => message.full_name().to_string(),
        None => field.file().package().to_string(),
    }
}

fn enum_of(field: Option<&FieldDescriptor>) -> Option<EnumDescriptor> {
    match field?.kind() {
        Kind::Enum(e) => Some(e),
        _ => None,
    }
}

fn range_text(start: i32, end: i32, max: i32) -> String {
    if start == end {
        start.to_string()
    } else if end == max {
        format!("{} to max", start)
    } else {
        format!("{} to {}", start, end)
    }
}

fn float_text(nan: bool, infinite: bool, negative: bool, display: String) -> String {
    if nan {
        "nan".to_string()
    } else if infinite && negative {
        "-inf".to_string()
    } else if infinite {
        "inf".to_string()
    } else {
        display
    }
}

// =============================================================================
// Rendering
// =============================================================================

struct Renderer<'p> {
    config: &'p PrinterConfig,
    sort_fn: Option<&'p SortFn>,
    pool: DescriptorPool,
    syntax: Syntax,
    out: String,
}

impl Renderer<'_> {
    fn indent(&self, depth: usize) -> String {
        self.config.indent.repeat(depth)
    }

    fn order(&self, items: &mut [Item]) {
        if let Some(sort_fn) = self.sort_fn {
            items.sort_by(|a, b| sort_fn(&a.element, &b.element));
        } else if self.config.sort_elements {
            items.sort_by(|a, b| default_order(&a.element, &b.element));
        }
    }

    // ---- comments -----------------------------------------------------------

    fn leading(&mut self, depth: usize, comments: Option<&Comments>) {
        let Some(comments) = comments else {
            return;
        };
        if self.config.comments == CommentPolicy::Omit {
            return;
        }
        if self.config.comments == CommentPolicy::All && !self.config.omit_detached_comments {
            for detached in &comments.leading_detached {
                self.comment(depth, detached);
                self.out.push('\n');
            }
        }
        if let Some(text) = &comments.leading {
            self.comment(depth, text);
        }
    }

    fn comment(&mut self, depth: usize, text: &str) {
        let indent = self.indent(depth);
        let text = text.strip_suffix('\n').unwrap_or(text);
        if !self.config.prefer_multiline_comments {
            for line in text.split('\n') {
                self.out.push_str(&format!("{}//{}\n", indent, line.trim_end()));
            }
            return;
        }
        let text = text.replace("*/", "* /");
        let lines: Vec<&str> = text.split('\n').collect();
        if lines.len() == 1 {
            self.out.push_str(&format!("{}/*{} */\n", indent, lines[0].trim_end()));
        } else {
            self.out.push_str(&format!("{}/*\n", indent));
            for line in lines {
                self.out.push_str(&format!("{} *{}\n", indent, line.trim_end()));
            }
            self.out.push_str(&format!("{} */\n", indent));
        }
    }

    /// Finish the current line along with its trailing comment
    fn end_line(&mut self, depth: usize, comments: Option<&Comments>) {
        let trailing = match comments {
            Some(c) if self.config.comments == CommentPolicy::All => c.trailing.as_deref(),
            _ => None,
        };
        let Some(text) = trailing else {
            self.out.push('\n');
            return;
        };
        let text = text.strip_suffix('\n').unwrap_or(text);
        if self.config.trailing_comments_on_separate_line || text.contains('\n') {
            self.out.push('\n');
            self.comment(depth, text);
        } else if self.config.prefer_multiline_comments {
            self.out
                .push_str(&format!(" /*{} */\n", text.replace("*/", "* /").trim_end()));
        } else {
            self.out.push_str(&format!(" //{}\n", text.trim_end()));
        }
    }

    fn statement(&mut self, depth: usize, text: &str, comments: Option<&Comments>) {
        self.leading(depth, comments);
        let indent = self.indent(depth);
        self.out.push_str(&indent);
        self.out.push_str(text);
        self.end_line(depth, comments);
    }

    fn open(&mut self, depth: usize, header: &str, comments: Option<&Comments>) {
        self.leading(depth, comments);
        let indent = self.indent(depth);
        self.out.push_str(&format!("{}{} {{", indent, header));
        self.end_line(depth + 1, comments);
    }

    fn close(&mut self, depth: usize) {
        let indent = self.indent(depth);
        self.out.push_str(&format!("{}}}\n", indent));
    }

    // ---- scopes -------------------------------------------------------------

    /// Emit the children of one scope, grouping runs that share a statement
    fn emit_items(&mut self, depth: usize, scope: &str, mut items: Vec<Item>) {
        self.order(&mut items);
        let mut done = vec![false; items.len()];
        let mut previous: Option<(ElementKind, bool)> = None;

        for i in 0..items.len() {
            if done[i] {
                continue;
            }
            let mut group = vec![i];
            let mut block = false;
            match &items[i].body {
                Body::ReservedRange(..) | Body::ReservedName(_) => {
                    let kind = items[i].element.kind;
                    group.extend(
                        (i + 1..items.len()).take_while(|&j| items[j].element.kind == kind),
                    );
                }
                Body::ExtensionRange(first) => {
                    group.extend((i + 1..items.len()).take_while(|&j| {
                        matches!(&items[j].body, Body::ExtensionRange(r) if r.options == first.options)
                    }));
                }
                Body::Extension(_) => {
                    let extendee = &items[i].element.extendee;
                    group.extend((i + 1..items.len()).take_while(|&j| {
                        items[j].element.kind == ElementKind::Extension
                            && items[j].element.extendee == *extendee
                    }));
                    block = true;
                }
                Body::Field(field) => {
                    if let Some(oneof) = real_oneof(field) {
                        group.extend((i + 1..items.len()).filter(|&j| {
                            matches!(&items[j].body, Body::Field(f) if real_oneof(f).as_ref() == Some(&oneof))
                        }));
                        block = true;
                    }
                }
                Body::Message(_) | Body::Enum(_) | Body::Service(_) => block = true,
                _ => {}
            }
            for &j in &group {
                done[j] = true;
            }

            let kind = items[i].element.kind;
            if let Some((previous_kind, previous_block)) = previous {
                if previous_kind != kind || previous_block || block {
                    self.out.push('\n');
                }
            }
            previous = Some((kind, block));

            let members: Vec<&Item> = group.iter().map(|&j| &items[j]).collect();
            self.emit_group(depth, scope, &members);
        }
    }

    fn emit_group(&mut self, depth: usize, scope: &str, members: &[&Item]) {
        let first = members[0];
        match &first.body {
            Body::Package(name) => self.statement(depth, &format!("package {};", name), None),
            Body::Import(name, modifier) => {
                let text = format!("import {}{};", modifier, quote_str(name));
                self.statement(depth, &text, None);
            }
            Body::Option { name, value, field } => {
                let value = self.value_text(depth, field.as_ref(), value);
                self.statement(depth, &format!("option {} = {};", name, value), None);
            }
            Body::Field(field) => match real_oneof(field) {
                Some(oneof) => {
                    let fields: Vec<FieldDescriptor> = members
                        .iter()
                        .filter_map(|m| match &m.body {
                            Body::Field(f) => Some(f.clone()),
                            _ => None,
                        })
                        .collect();
                    self.oneof(depth, scope, &oneof, &fields);
                }
                None => self.field(depth, scope, field, false),
            },
            Body::Message(message) => self.message(depth, message),
            Body::Enum(e) => self.enumeration(depth, e),
            Body::Service(service) => self.service(depth, service),
            Body::ExtensionRange(range) => {
                let ranges: Vec<String> = members
                    .iter()
                    .filter_map(|m| match &m.body {
                        Body::ExtensionRange(r) => Some(range_text(r.start, r.end, MAX_FIELD_NUMBER)),
                        _ => None,
                    })
                    .collect();
                let options = self.option_pairs(depth, &range.options, OptionTarget::ExtensionRange);
                let text = format!("extensions {}{};", ranges.join(", "), self.brackets(depth, options));
                self.statement(depth, &text, None);
            }
            Body::Extension(_) => {
                let fields: Vec<FieldDescriptor> = members
                    .iter()
                    .filter_map(|m| match &m.body {
                        Body::Extension(f) => Some(f.clone()),
                        _ => None,
                    })
                    .collect();
                self.extend_block(depth, scope, &fields);
            }
            Body::ReservedRange(..) => {
                let ranges: Vec<String> = members
                    .iter()
                    .filter_map(|m| match &m.body {
                        Body::ReservedRange(r, max) => Some(range_text(r.start, r.end, *max)),
                        _ => None,
                    })
                    .collect();
                self.statement(depth, &format!("reserved {};", ranges.join(", ")), None);
            }
            Body::ReservedName(_) => {
                let names: Vec<String> = members
                    .iter()
                    .filter_map(|m| match &m.body {
                        Body::ReservedName(n) => Some(quote_str(n)),
                        _ => None,
                    })
                    .collect();
                self.statement(depth, &format!("reserved {};", names.join(", ")), None);
            }
            Body::EnumValue(value) => self.enum_value(depth, value),
            Body::Method(method) => self.method(depth, scope, method),
        }
    }

    // ---- declarations -------------------------------------------------------

    fn file(&mut self, file: &FileDescriptor) {
        self.leading(0, file.comments());
        self.out
            .push_str(&format!("syntax = \"{}\";", file.syntax().as_str()));
        self.end_line(0, file.comments());

        let mut items = Vec::new();
        if !file.package().is_empty() {
            items.push(Item::new(
                Element::new(ElementKind::Package, file.package()),
                Body::Package(file.package().to_string()),
            ));
        }
        for (i, dependency) in file.dependencies().iter().enumerate() {
            let modifier = if file.is_public_dependency(i) {
                "public "
            } else if file.is_weak_dependency(i) {
                "weak "
            } else {
                ""
            };
            items.push(Item::new(
                Element::new(ElementKind::Import, dependency.name()),
                Body::Import(dependency.name().to_string(), modifier),
            ));
        }
        items.extend(option_items(file.options(), OptionTarget::File, &self.pool));
        items.extend(file.messages().into_iter().map(|m| {
            Item::new(Element::new(ElementKind::Message, m.name()), Body::Message(m))
        }));
        items.extend(file.enums().into_iter().map(|e| {
            Item::new(Element::new(ElementKind::Enum, e.name()), Body::Enum(e))
        }));
        items.extend(file.services().into_iter().map(|s| {
            Item::new(Element::new(ElementKind::Service, s.name()), Body::Service(s))
        }));
        items.extend(file.extensions().iter().map(Item::extension));

        if !items.is_empty() {
            self.out.push('\n');
        }
        self.emit_items(0, file.package(), items);
    }

    fn message(&mut self, depth: usize, message: &MessageDescriptor) {
        self.open(depth, &format!("message {}", message.name()), message.comments());

        let mut items = option_items(message.options(), OptionTarget::Message, &self.pool);
        items.extend(message.fields().iter().map(Item::field));
        items.extend(
            message
                .nested_messages()
                .into_iter()
                .filter(|m| !m.is_map_entry())
                .map(|m| Item::new(Element::new(ElementKind::Message, m.name()), Body::Message(m))),
        );
        items.extend(message.nested_enums().into_iter().map(|e| {
            Item::new(Element::new(ElementKind::Enum, e.name()), Body::Enum(e))
        }));
        items.extend(message.extension_ranges().iter().map(|r| {
            Item::new(
                Element::ranged(ElementKind::ExtensionRange, r.start, r.end),
                Body::ExtensionRange(r.clone()),
            )
        }));
        items.extend(message.nested_extensions().iter().map(Item::extension));
        items.extend(Item::reserved(
            message.reserved_ranges(),
            message.reserved_names(),
            MAX_FIELD_NUMBER,
        ));

        self.emit_items(depth + 1, message.full_name(), items);
        self.close(depth);
    }

    fn field(&mut self, depth: usize, scope: &str, field: &FieldDescriptor, in_oneof: bool) {
        let label = if in_oneof || field.is_map() {
            ""
        } else {
            match field.label() {
                Label::Repeated => "repeated ",
                Label::Required => "required ",
                Label::Optional if field.is_proto3_optional() => "optional ",
                Label::Optional if self.syntax == Syntax::Proto2 => "optional ",
                Label::Optional => "",
            }
        };
        let ty = self.field_type(scope, field);

        let mut options = Vec::new();
        if let Some(default) = field.default_value() {
            let value = match field.kind() {
                Kind::Scalar(ScalarType::String) => quote_str(default),
                Kind::Scalar(ScalarType::Bytes) => format!("\"{}\"", default),
                _ => default.to_string(),
            };
            options.push(("default".to_string(), value));
        }
        if field.has_custom_json_name() {
            options.push(("json_name".to_string(), quote_str(&field.json_name())));
        }
        options.extend(self.option_pairs(depth, field.options(), OptionTarget::Field));

        let text = format!(
            "{}{} {} = {}{};",
            label,
            ty,
            field.name(),
            field.number(),
            self.brackets(depth, options)
        );
        self.statement(depth, &text, field.comments());
    }

    fn field_type(&self, scope: &str, field: &FieldDescriptor) -> String {
        if field.is_map() {
            if let Kind::Message(entry) = field.kind() {
                if let (Some(key), Some(value)) = (entry.get_field(1), entry.get_field(2)) {
                    return format!(
                        "map<{}, {}>",
                        self.field_type(scope, &key),
                        self.field_type(scope, &value)
                    );
                }
            }
        }
        match field.kind() {
            Kind::Scalar(scalar) => scalar.keyword().to_string(),
            Kind::Message(m) => self.type_name(scope, m.full_name()),
            Kind::Enum(e) => self.type_name(scope, e.full_name()),
        }
    }

    /// Shortest name that resolves to `target` from `scope`, else the
    /// fully-qualified name with a leading dot
    fn type_name(&self, scope: &str, target: &str) -> String {
        let parts: Vec<&str> = target.split('.').collect();
        for start in (0..parts.len()).rev() {
            let candidate = parts[start..].join(".");
            let resolves = self
                .pool
                .resolve_type_name(scope, &candidate)
                .map_or(false, |d| d.full_name() == target);
            if resolves {
                return candidate;
            }
        }
        format!(".{}", target)
    }

    fn oneof(&mut self, depth: usize, scope: &str, oneof: &OneofDescriptor, fields: &[FieldDescriptor]) {
        self.open(depth, &format!("oneof {}", oneof.name()), oneof.comments());
        let options = option_items(oneof.options(), OptionTarget::Oneof, &self.pool);
        let has_options = !options.is_empty();
        self.emit_items(depth + 1, scope, options);
        if has_options && !fields.is_empty() {
            self.out.push('\n');
        }
        for field in fields {
            self.field(depth + 1, scope, field, true);
        }
        self.close(depth);
    }

    fn extend_block(&mut self, depth: usize, scope: &str, fields: &[FieldDescriptor]) {
        let Some(extendee) = fields.first().and_then(FieldDescriptor::extendee) else {
            return;
        };
        let header = format!("extend {}", self.type_name(scope, extendee.full_name()));
        self.open(depth, &header, None);
        for field in fields {
            self.field(depth + 1, scope, field, false);
        }
        self.close(depth);
    }

    fn enumeration(&mut self, depth: usize, e: &EnumDescriptor) {
        self.open(depth, &format!("enum {}", e.name()), e.comments());
        let mut items = option_items(e.options(), OptionTarget::Enum, &self.pool);
        items.extend(e.values().into_iter().map(|v| {
            Item::new(
                Element::numbered(ElementKind::EnumValue, v.name(), v.number()),
                Body::EnumValue(v),
            )
        }));
        items.extend(Item::reserved(e.reserved_ranges(), e.reserved_names(), i32::MAX));
        self.emit_items(depth + 1, e.full_name(), items);
        self.close(depth);
    }

    fn enum_value(&mut self, depth: usize, value: &EnumValueDescriptor) {
        let options = self.option_pairs(depth, value.options(), OptionTarget::EnumValue);
        let text = format!(
            "{} = {}{};",
            value.name(),
            value.number(),
            self.brackets(depth, options)
        );
        self.statement(depth, &text, value.comments());
    }

    fn service(&mut self, depth: usize, service: &ServiceDescriptor) {
        self.open(depth, &format!("service {}", service.name()), service.comments());
        let mut items = option_items(service.options(), OptionTarget::Service, &self.pool);
        items.extend(service.methods().into_iter().map(|m| {
            Item::new(Element::new(ElementKind::Method, m.name()), Body::Method(m))
        }));
        self.emit_items(depth + 1, service.full_name(), items);
        self.close(depth);
    }

    fn method(&mut self, depth: usize, scope: &str, method: &MethodDescriptor) {
        let stream = |streaming: bool| if streaming { "stream " } else { "" };
        let header = format!(
            "rpc {} ( {}{} ) returns ( {}{} )",
            method.name(),
            stream(method.is_client_streaming()),
            self.type_name(scope, method.input().full_name()),
            stream(method.is_server_streaming()),
            self.type_name(scope, method.output().full_name()),
        );
        let options = option_items(method.options(), OptionTarget::Method, &self.pool);
        if options.is_empty() {
            self.statement(depth, &format!("{};", header), method.comments());
            return;
        }
        self.open(depth, &header, method.comments());
        self.emit_items(depth + 1, scope, options);
        self.close(depth);
    }

    // ---- option values ------------------------------------------------------

    /// `name = value` pairs for a bracketed list, one per repeated value
    fn option_pairs(&self, depth: usize, options: &Options, target: OptionTarget) -> Vec<(String, String)> {
        option_items(options, target, &self.pool)
            .into_iter()
            .filter_map(|item| match item.body {
                Body::Option { name, value, field } => {
                    Some((name.to_string(), self.value_text(depth + 1, field.as_ref(), &value)))
                }
                _ => None,
            })
            .collect()
    }

    fn brackets(&self, depth: usize, options: Vec<(String, String)>) -> String {
        if options.is_empty() {
            return String::new();
        }
        let pairs: Vec<String> = options
            .iter()
            .map(|(name, value)| format!("{} = {}", name, value))
            .collect();
        let single = pairs.join(", ");
        let compact = &self.config.compact;
        if pairs.len() <= compact.short_options_count
            && single.len() <= compact.short_options_length
            && !single.contains('\n')
        {
            return format!(" [{}]", single);
        }
        let inner = self.indent(depth + 1);
        let lines: Vec<String> = pairs.iter().map(|p| format!("{}{}", inner, p)).collect();
        format!(" [\n{}\n{}]", lines.join(",\n"), self.indent(depth))
    }

    fn value_text(&self, depth: usize, field: Option<&FieldDescriptor>, value: &Value) -> String {
        match value {
            Value::Bool(v) => v.to_string(),
            Value::I32(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::U32(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::F32(v) => float_text(v.is_nan(), v.is_infinite(), v.is_sign_negative(), v.to_string()),
            Value::F64(v) => float_text(v.is_nan(), v.is_infinite(), v.is_sign_negative(), v.to_string()),
            Value::String(s) => quote_str(s),
            Value::Bytes(b) => quote_bytes(b),
            Value::EnumNumber(n) => enum_of(field)
                .and_then(|e| e.get_value(*n))
                .map(|v| v.name().to_string())
                .unwrap_or_else(|| n.to_string()),
            Value::Message(message) => self.message_literal(depth, message),
            Value::List(values) => {
                let values: Vec<String> = values
                    .iter()
                    .map(|v| self.value_text(depth, field, v))
                    .collect();
                format!("[{}]", values.join(", "))
            }
        }
    }

    /// Text-format literal, on one line when short enough
    fn message_literal(&self, depth: usize, message: &DynamicMessage) -> String {
        let mut entries = Vec::new();
        for (field, value) in message.fields() {
            match value {
                Value::List(values) if matches!(field.kind(), Kind::Message(_)) => {
                    for v in values {
                        let text = self.value_text(depth + 1, Some(&field), v);
                        entries.push(format!("{}: {}", field.name(), text));
                    }
                }
                _ => {
                    let text = self.value_text(depth + 1, Some(&field), value);
                    entries.push(format!("{}: {}", field.name(), text));
                }
            }
        }
        if entries.is_empty() {
            return "{}".to_string();
        }
        let single = format!("{{ {} }}", entries.join(" "));
        if single.len() <= self.config.compact.message_literal_length && !single.contains('\n') {
            return single;
        }
        let inner = self.indent(depth + 1);
        let mut out = String::from("{\n");
        for entry in entries {
            out.push_str(&format!("{}{}\n", inner, entry));
        }
        out.push_str(&format!("{}}}", self.indent(depth)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{EnumDef, FieldDef, FileDef, MessageDef};

    fn pool_with(def: FileDef) -> FileDescriptor {
        DescriptorPool::new().add_file(def).unwrap()
    }

    #[test]
    fn test_relative_type_names() {
        let file = pool_with(
            FileDef::new("a.proto", "pkg")
                .with_message(
                    MessageDef::new("Outer")
                        .with_message(MessageDef::new("Inner"))
                        .with_field(FieldDef::message("inner", 1, "Inner")),
                )
                .with_message(MessageDef::new("Other").with_field(FieldDef::message(
                    "inner",
                    1,
                    "Outer.Inner",
                ))),
        );
        let text = Printer::default()
            .render_to_string(&Descriptor::File(file))
            .unwrap();
        assert!(text.contains("  optional Inner inner = 1;"));
        assert!(text.contains("  optional Outer.Inner inner = 1;"));
    }

    #[test]
    fn test_reserved_ranges_share_a_statement() {
        let file = pool_with(
            FileDef::new("r.proto", "")
                .with_syntax(Syntax::Proto3)
                .with_enum(
                    EnumDef::new("E")
                        .with_value("A", 0)
                        .with_reserved_range(2, 2)
                        .with_reserved_range(5, i32::MAX)
                        .with_reserved_name("B"),
                ),
        );
        let text = Printer::default()
            .render_to_string(&Descriptor::Enum(file.enums()[0].clone()))
            .unwrap();
        assert_eq!(
            text,
            "enum E {\n  A = 0;\n\n  reserved 2, 5 to max;\n\n  reserved \"B\";\n}\n"
        );
    }

    #[test]
    fn test_long_option_lists_expand() {
        let mut printer_config = PrinterConfig::default();
        printer_config.compact.short_options_count = 1;
        let file = pool_with(
            FileDef::new("o.proto", "").with_message(
                MessageDef::new("M").with_field(
                    FieldDef::scalar("x", 1, ScalarType::Int32)
                        .with_json_name("ex")
                        .with_options(Options::new().with_builtin("deprecated", Value::Bool(true))),
                ),
            ),
        );
        let field = file.messages()[0].fields()[0].clone();
        let text = Printer::new(printer_config)
            .render_to_string(&Descriptor::Field(field))
            .unwrap();
        assert_eq!(
            text,
            "optional int32 x = 1 [\n  json_name = \"ex\",\n  deprecated = true\n];\n"
        );
    }
}
