//! Element options
//!
//! Options are kept as an ordered list of name/value pairs. Builtin options
//! are the fields of the `google.protobuf.*Options` messages; extension
//! options carry the extension's fully-qualified name. Values that could not
//! be interpreted are kept as opaque unknown options.

use std::fmt;

use crate::dynamic::Value;

/// Name of an option
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OptionName {
    /// A field of the options message itself, e.g. `deprecated`
    Builtin(String),
    /// A fully-qualified extension name, e.g. `foo.bar.my_option`
    Extension(String),
}

impl OptionName {
    pub fn name(&self) -> &str {
        match self {
            OptionName::Builtin(name) | OptionName::Extension(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, OptionName::Extension(_))
    }
}

impl fmt::Display for OptionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionName::Builtin(name) => f.write_str(name),
            OptionName::Extension(name) => write!(f, "({})", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionEntry {
    pub name: OptionName,
    pub value: Value,
}

/// Option whose name or value could not be interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOption {
    pub name: String,
    pub type_url: String,
    pub value: Vec<u8>,
}

/// Which options message applies to an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionTarget {
    File,
    Message,
    Field,
    Oneof,
    Enum,
    EnumValue,
    Service,
    Method,
    ExtensionRange,
}

impl OptionTarget {
    /// Fully-qualified name of the options message for this target
    pub fn options_type_name(&self) -> &'static str {
        match self {
            OptionTarget::File => "google.protobuf.FileOptions",
            OptionTarget::Message => "google.protobuf.MessageOptions",
            OptionTarget::Field => "google.protobuf.FieldOptions",
            OptionTarget::Oneof => "google.protobuf.OneofOptions",
            OptionTarget::Enum => "google.protobuf.EnumOptions",
            OptionTarget::EnumValue => "google.protobuf.EnumValueOptions",
            OptionTarget::Service => "google.protobuf.ServiceOptions",
            OptionTarget::Method => "google.protobuf.MethodOptions",
            OptionTarget::ExtensionRange => "google.protobuf.ExtensionRangeOptions",
        }
    }
}

/// Ordered options of one element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    entries: Vec<OptionEntry>,
    unknown: Vec<UnknownOption>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.unknown.is_empty()
    }

    pub fn entries(&self) -> &[OptionEntry] {
        &self.entries
    }

    pub fn unknown(&self) -> &[UnknownOption] {
        &self.unknown
    }

    /// Set a singular option, replacing any earlier value
    pub fn set(&mut self, name: OptionName, value: Value) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.value = value,
            None => self.entries.push(OptionEntry { name, value }),
        }
    }

    /// Append a value to a repeated option, keeping encounter order
    pub fn push(&mut self, name: OptionName, value: Value) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => match &mut entry.value {
                Value::List(items) => items.push(value),
                other => {
                    let first = std::mem::replace(other, Value::List(Vec::new()));
                    *other = Value::List(vec![first, value]);
                }
            },
            None => self.entries.push(OptionEntry {
                name,
                value: Value::List(vec![value]),
            }),
        }
    }

    pub fn push_unknown(&mut self, option: UnknownOption) {
        self.unknown.push(option);
    }

    pub fn with_builtin(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(OptionName::Builtin(name.into()), value);
        self
    }

    pub fn with_extension(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(OptionName::Extension(name.into()), value);
        self
    }

    /// Value of a builtin option
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.find(|n| matches!(n, OptionName::Builtin(b) if b == name))
    }

    /// Value of an extension option, by fully-qualified extension name
    pub fn get_extension(&self, full_name: &str) -> Option<&Value> {
        self.find(|n| matches!(n, OptionName::Extension(e) if e == full_name))
    }

    fn find(&self, pred: impl Fn(&OptionName) -> bool) -> Option<&Value> {
        self.entries.iter().find(|e| pred(&e.name)).map(|e| &e.value)
    }

    pub(crate) fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(Value::Bool(true)))
    }

    pub fn is_deprecated(&self) -> bool {
        self.flag("deprecated")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_value() {
        let mut options = Options::new();
        options.set(OptionName::Builtin("deprecated".into()), Value::Bool(false));
        options.set(OptionName::Builtin("deprecated".into()), Value::Bool(true));
        assert_eq!(options.entries().len(), 1);
        assert!(options.is_deprecated());
    }

    #[test]
    fn test_push_accumulates_in_order() {
        let name = OptionName::Extension("foo.tags".into());
        let mut options = Options::new();
        options.push(name.clone(), Value::String("a".into()));
        options.push(name.clone(), Value::String("b".into()));
        assert_eq!(
            options.get_extension("foo.tags"),
            Some(&Value::List(vec![
                Value::String("a".into()),
                Value::String("b".into())
            ]))
        );
    }

    #[test]
    fn test_option_name_display() {
        assert_eq!(OptionName::Builtin("packed".into()).to_string(), "packed");
        assert_eq!(OptionName::Extension("a.b".into()).to_string(), "(a.b)");
    }
}
