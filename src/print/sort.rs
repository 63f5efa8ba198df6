//! Sortable view of the elements the printer emits

use std::cmp::Ordering;

/// Kind of a printed element, in the rank the built-in comparator uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    Package,
    Import,
    Option,
    Field,
    Message,
    Enum,
    Service,
    ExtensionRange,
    Extension,
    ReservedRange,
    ReservedName,
    EnumValue,
    Method,
}

/// One element inside a scope (file, message, enum or service body)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) name: String,
    pub(crate) number: i32,
    pub(crate) range: (i32, i32),
    pub(crate) extendee: String,
    pub(crate) custom: bool,
}

impl Element {
    pub(crate) fn new(kind: ElementKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            number: 0,
            range: (0, 0),
            extendee: String::new(),
            custom: false,
        }
    }

    pub(crate) fn numbered(kind: ElementKind, name: impl Into<String>, number: i32) -> Self {
        Self {
            number,
            ..Self::new(kind, name)
        }
    }

    pub(crate) fn ranged(kind: ElementKind, start: i32, end: i32) -> Self {
        Self {
            range: (start, end),
            ..Self::new(kind, "")
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Simple name; option names without parentheses; empty for ranges
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field, extension or enum value number; 0 otherwise
    pub fn number(&self) -> i32 {
        self.number
    }

    /// Inclusive bounds of extension and reserved ranges; `(0, 0)` otherwise
    pub fn number_range(&self) -> (i32, i32) {
        self.range
    }

    /// Fully-qualified extendee of an extension
    pub fn extendee(&self) -> &str {
        &self.extendee
    }

    /// Whether an option is an extension rather than a builtin
    pub fn is_custom_option(&self) -> bool {
        self.custom
    }
}

/// Built-in order: kind rank, extendee for extensions, builtin options
/// before custom ones, then name, number and range bounds
pub fn default_order(a: &Element, b: &Element) -> Ordering {
    a.kind
        .cmp(&b.kind)
        .then_with(|| match a.kind {
            ElementKind::Extension => a.extendee.cmp(&b.extendee),
            ElementKind::Option => a.custom.cmp(&b.custom),
            _ => Ordering::Equal,
        })
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.number.cmp(&b.number))
        .then_with(|| a.range.0.cmp(&b.range.0))
        .then_with(|| a.range.1.cmp(&b.range.1))
}
