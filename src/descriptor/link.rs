//! Descriptor Arena and Linker
//!
//! Nodes live in per-kind vectors and refer to each other through typed
//! indices. A batch of [`FileDef`]s is linked against a staging area first
//! and only appended to the arena once every name resolved, so a failed batch
//! leaves the arena untouched and indices never move.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use super::def::*;
use super::options::Options;
use crate::error::{ReflectError, Result};
use crate::wellknown;

macro_rules! index_types {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub(crate) struct $name(pub(crate) u32);

            impl $name {
                #[inline]
                pub(crate) fn get(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

index_types!(
    FileIndex,
    MessageIndex,
    FieldIndex,
    OneofIndex,
    EnumIndex,
    EnumValueIndex,
    ServiceIndex,
    MethodIndex,
);

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Scalar(ScalarType),
    Message(MessageIndex),
    Enum(EnumIndex),
}

#[derive(Debug)]
pub(crate) struct FileNode {
    pub name: String,
    pub package: String,
    pub dependencies: Vec<FileIndex>,
    pub public_dependencies: Vec<usize>,
    pub weak_dependencies: Vec<usize>,
    pub syntax: Syntax,
    pub messages: Vec<MessageIndex>,
    pub enums: Vec<EnumIndex>,
    pub services: Vec<ServiceIndex>,
    pub extensions: Vec<FieldIndex>,
    pub options: Options,
    pub comments: Option<Comments>,
}

#[derive(Debug)]
pub(crate) struct MessageNode {
    pub name: String,
    pub full_name: String,
    pub file: FileIndex,
    pub parent: Option<MessageIndex>,
    pub fields: Vec<FieldIndex>,
    pub oneofs: Vec<OneofIndex>,
    pub messages: Vec<MessageIndex>,
    pub enums: Vec<EnumIndex>,
    pub extensions: Vec<FieldIndex>,
    pub extension_ranges: Vec<ExtensionRangeDef>,
    pub reserved_ranges: Vec<Range>,
    pub reserved_names: Vec<String>,
    pub options: Options,
    pub comments: Option<Comments>,
}

#[derive(Debug)]
pub(crate) struct FieldNode {
    pub name: String,
    pub full_name: String,
    pub number: i32,
    pub label: Label,
    pub kind: FieldKind,
    pub file: FileIndex,
    /// Containing message, or the declaring scope for extensions
    pub parent: Option<MessageIndex>,
    pub extendee: Option<MessageIndex>,
    pub oneof: Option<OneofIndex>,
    pub json_name: Option<String>,
    pub default_value: Option<String>,
    pub proto3_optional: bool,
    pub options: Options,
    pub comments: Option<Comments>,
}

#[derive(Debug)]
pub(crate) struct OneofNode {
    pub name: String,
    pub full_name: String,
    pub parent: MessageIndex,
    pub fields: Vec<FieldIndex>,
    pub options: Options,
    pub comments: Option<Comments>,
}

#[derive(Debug)]
pub(crate) struct EnumNode {
    pub name: String,
    pub full_name: String,
    pub file: FileIndex,
    pub parent: Option<MessageIndex>,
    pub values: Vec<EnumValueIndex>,
    pub reserved_ranges: Vec<Range>,
    pub reserved_names: Vec<String>,
    pub options: Options,
    pub comments: Option<Comments>,
}

#[derive(Debug)]
pub(crate) struct EnumValueNode {
    pub name: String,
    pub full_name: String,
    pub number: i32,
    pub parent: EnumIndex,
    pub options: Options,
    pub comments: Option<Comments>,
}

#[derive(Debug)]
pub(crate) struct ServiceNode {
    pub name: String,
    pub full_name: String,
    pub file: FileIndex,
    pub methods: Vec<MethodIndex>,
    pub options: Options,
    pub comments: Option<Comments>,
}

#[derive(Debug)]
pub(crate) struct MethodNode {
    pub name: String,
    pub full_name: String,
    pub parent: ServiceIndex,
    pub input: MessageIndex,
    pub output: MessageIndex,
    pub client_streaming: bool,
    pub server_streaming: bool,
    pub options: Options,
    pub comments: Option<Comments>,
}

/// Entry in the fully-qualified name table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Symbol {
    Package,
    Message(MessageIndex),
    Enum(EnumIndex),
    Service(ServiceIndex),
    Method(MethodIndex),
    Field(FieldIndex),
    Oneof(OneofIndex),
}

impl Symbol {
    fn is_type(&self) -> bool {
        matches!(self, Symbol::Message(_) | Symbol::Enum(_))
    }

    fn is_aggregate(&self) -> bool {
        matches!(self, Symbol::Package | Symbol::Message(_))
    }
}

// =============================================================================
// Arena
// =============================================================================

#[derive(Debug, Default)]
pub(crate) struct Arena {
    pub files: Vec<Arc<FileNode>>,
    pub messages: Vec<Arc<MessageNode>>,
    pub fields: Vec<Arc<FieldNode>>,
    pub oneofs: Vec<Arc<OneofNode>>,
    pub enums: Vec<Arc<EnumNode>>,
    pub enum_values: Vec<Arc<EnumValueNode>>,
    pub services: Vec<Arc<ServiceNode>>,
    pub methods: Vec<Arc<MethodNode>>,
    pub names: HashMap<String, Symbol>,
    /// First file registered under each name
    pub files_by_name: HashMap<String, FileIndex>,
}

impl Arena {
    /// Link a batch of files and append them.
    ///
    /// Returns the indices of `defs` in order. Missing `google/protobuf/*`
    /// dependencies are pulled in from the built-in well-known files.
    pub(crate) fn link(&mut self, defs: Vec<FileDef>) -> Result<Vec<FileIndex>> {
        let (batch, skipped) = self.complete_batch(defs)?;
        let staged = {
            let mut linker = Linker::new(self, &batch);
            for def in &batch {
                linker.add_file(def)?;
            }
            linker.resolve()?;
            linker.finish()
        };
        let base = self.files.len();
        self.commit(staged);
        Ok((base + skipped..base + batch.len())
            .map(|i| FileIndex(i as u32))
            .collect())
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Symbol> {
        self.names.get(name).copied()
    }

    /// Resolve a type name the way schema source would, starting at `scope`
    pub(crate) fn resolve_type(&self, scope: &str, name: &str) -> Option<(String, Symbol)> {
        resolve_relative(|n| self.lookup(n), scope, name)
    }

    /// Prepend well-known files the batch needs but nobody provides.
    fn complete_batch(&self, defs: Vec<FileDef>) -> Result<(Vec<FileDef>, usize)> {
        let mut provided: HashSet<String> = defs.iter().map(|d| d.name.clone()).collect();
        let mut extra: Vec<FileDef> = Vec::new();
        let mut queue: Vec<(String, String)> = defs
            .iter()
            .flat_map(|d| d.dependencies.iter().map(move |dep| (d.name.clone(), dep.clone())))
            .collect();

        while let Some((file, dependency)) = queue.pop() {
            if provided.contains(&dependency) || self.files_by_name.contains_key(&dependency) {
                continue;
            }
            match wellknown::file_def(&dependency) {
                Some(def) => {
                    debug!(file = %dependency, "importing well-known file");
                    provided.insert(dependency.clone());
                    queue.extend(def.dependencies.iter().map(|d| (dependency.clone(), d.clone())));
                    extra.push(def);
                }
                None => return Err(ReflectError::MissingDependency { file, dependency }),
            }
        }

        // dependencies of well-known files are themselves well-known and
        // were discovered after their dependents
        extra.reverse();
        let skipped = extra.len();
        extra.extend(defs);
        Ok((extra, skipped))
    }

    fn commit(&mut self, staged: Staged) {
        let first_file = self.files.len();
        self.files.extend(staged.files.into_iter().map(Arc::new));
        self.messages.extend(staged.messages.into_iter().map(Arc::new));
        self.fields.extend(staged.fields.into_iter().map(Arc::new));
        self.oneofs.extend(staged.oneofs.into_iter().map(Arc::new));
        self.enums.extend(staged.enums.into_iter().map(Arc::new));
        self.enum_values.extend(staged.enum_values.into_iter().map(Arc::new));
        self.services.extend(staged.services.into_iter().map(Arc::new));
        self.methods.extend(staged.methods.into_iter().map(Arc::new));
        self.names.extend(staged.names);
        for i in first_file..self.files.len() {
            let name = self.files[i].name.clone();
            self.files_by_name.entry(name).or_insert(FileIndex(i as u32));
        }
        trace!(files = self.files.len(), symbols = self.names.len(), "descriptor arena grown");
    }
}

/// Protobuf scoping: the first component of `name` is searched from the
/// innermost scope outward; the rest is resolved inside whatever it found.
pub(crate) fn resolve_relative(
    lookup: impl Fn(&str) -> Option<Symbol>,
    scope: &str,
    name: &str,
) -> Option<(String, Symbol)> {
    if let Some(full) = name.strip_prefix('.') {
        return lookup(full).map(|s| (full.to_string(), s));
    }

    let first = name.split('.').next().unwrap_or(name);
    let mut scope = scope;
    loop {
        if let Some(symbol) = lookup(&join_name(scope, first)) {
            if first == name {
                if symbol.is_type() {
                    return Some((join_name(scope, name), symbol));
                }
            } else if symbol.is_aggregate() {
                let full = join_name(scope, name);
                return lookup(&full).map(|s| (full, s));
            }
        }
        if scope.is_empty() {
            return None;
        }
        scope = match scope.rfind('.') {
            Some(pos) => &scope[..pos],
            None => "",
        };
    }
}

pub(crate) fn join_name(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

// =============================================================================
// Linker
// =============================================================================

struct PendingField {
    index: FieldIndex,
    scope: String,
    ty: FieldType,
    extendee: Option<String>,
}

struct PendingMethod {
    index: MethodIndex,
    scope: String,
    input: String,
    output: String,
}

#[derive(Default)]
struct Staged {
    files: Vec<FileNode>,
    messages: Vec<MessageNode>,
    fields: Vec<FieldNode>,
    oneofs: Vec<OneofNode>,
    enums: Vec<EnumNode>,
    enum_values: Vec<EnumValueNode>,
    services: Vec<ServiceNode>,
    methods: Vec<MethodNode>,
    names: HashMap<String, Symbol>,
}

struct Linker<'a> {
    arena: &'a Arena,
    staged: Staged,
    file_names: HashMap<String, FileIndex>,
    pending_fields: Vec<PendingField>,
    pending_methods: Vec<PendingMethod>,
}

impl<'a> Linker<'a> {
    fn new(arena: &'a Arena, batch: &[FileDef]) -> Self {
        let mut file_names = HashMap::new();
        for (i, def) in batch.iter().enumerate() {
            file_names
                .entry(def.name.clone())
                .or_insert(FileIndex((arena.files.len() + i) as u32));
        }
        Self {
            arena,
            staged: Staged::default(),
            file_names,
            pending_fields: Vec::new(),
            pending_methods: Vec::new(),
        }
    }

    fn finish(self) -> Staged {
        self.staged
    }

    fn lookup(&self, name: &str) -> Option<Symbol> {
        self.staged
            .names
            .get(name)
            .copied()
            .or_else(|| self.arena.lookup(name))
    }

    fn declare(&mut self, name: &str, symbol: Symbol) -> Result<()> {
        match self.lookup(name) {
            Some(Symbol::Package) if symbol == Symbol::Package => Ok(()),
            Some(_) => Err(ReflectError::DuplicateName(name.to_string())),
            None => {
                self.staged.names.insert(name.to_string(), symbol);
                Ok(())
            }
        }
    }

    fn declare_package(&mut self, package: &str) -> Result<()> {
        if package.is_empty() {
            return Ok(());
        }
        let mut end = 0;
        loop {
            end = match package[end..].find('.') {
                Some(pos) => end + pos,
                None => package.len(),
            };
            self.declare(&package[..end], Symbol::Package)?;
            if end == package.len() {
                return Ok(());
            }
            end += 1;
        }
    }

    // ---- allocation -------------------------------------------------------

    fn add_file(&mut self, def: &FileDef) -> Result<FileIndex> {
        let index = FileIndex((self.arena.files.len() + self.staged.files.len()) as u32);
        self.declare_package(&def.package)?;

        let mut dependencies = Vec::with_capacity(def.dependencies.len());
        for dep in &def.dependencies {
            let found = self
                .file_names
                .get(dep)
                .or_else(|| self.arena.files_by_name.get(dep))
                .copied()
                .ok_or_else(|| ReflectError::MissingDependency {
                    file: def.name.clone(),
                    dependency: dep.clone(),
                })?;
            dependencies.push(found);
        }
        for &i in def.public_dependencies.iter().chain(&def.weak_dependencies) {
            if i >= def.dependencies.len() {
                return Err(ReflectError::malformed(
                    &def.name,
                    format!("dependency index {} out of range", i),
                ));
            }
        }

        let scope = def.package.as_str();
        let messages = def
            .messages
            .iter()
            .map(|m| self.add_message(m, index, scope, None))
            .collect::<Result<Vec<_>>>()?;
        let enums = def
            .enums
            .iter()
            .map(|e| self.add_enum(e, index, scope, None))
            .collect::<Result<Vec<_>>>()?;
        let services = def
            .services
            .iter()
            .map(|s| self.add_service(s, index, scope))
            .collect::<Result<Vec<_>>>()?;
        let extensions = def
            .extensions
            .iter()
            .map(|f| self.add_field(f, index, scope, None, None))
            .collect::<Result<Vec<_>>>()?;

        self.staged.files.push(FileNode {
            name: def.name.clone(),
            package: def.package.clone(),
            dependencies,
            public_dependencies: def.public_dependencies.clone(),
            weak_dependencies: def.weak_dependencies.clone(),
            syntax: def.syntax,
            messages,
            enums,
            services,
            extensions,
            options: def.options.clone(),
            comments: def.comments.clone(),
        });
        Ok(index)
    }

    fn add_message(
        &mut self,
        def: &MessageDef,
        file: FileIndex,
        scope: &str,
        parent: Option<MessageIndex>,
    ) -> Result<MessageIndex> {
        let full_name = join_name(scope, &def.name);
        let index = MessageIndex((self.arena.messages.len() + self.staged.messages.len()) as u32);
        self.declare(&full_name, Symbol::Message(index))?;
        self.staged.messages.push(MessageNode {
            name: def.name.clone(),
            full_name: full_name.clone(),
            file,
            parent,
            fields: Vec::new(),
            oneofs: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
            extensions: Vec::new(),
            extension_ranges: def.extension_ranges.clone(),
            reserved_ranges: def.reserved_ranges.clone(),
            reserved_names: def.reserved_names.clone(),
            options: def.options.clone(),
            comments: def.comments.clone(),
        });

        let mut oneofs = Vec::with_capacity(def.oneofs.len());
        for oneof in &def.oneofs {
            let oneof_index =
                OneofIndex((self.arena.oneofs.len() + self.staged.oneofs.len()) as u32);
            let oneof_name = join_name(&full_name, &oneof.name);
            self.declare(&oneof_name, Symbol::Oneof(oneof_index))?;
            self.staged.oneofs.push(OneofNode {
                name: oneof.name.clone(),
                full_name: oneof_name,
                parent: index,
                fields: Vec::new(),
                options: oneof.options.clone(),
                comments: oneof.comments.clone(),
            });
            oneofs.push(oneof_index);
        }

        let mut numbers = HashSet::new();
        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            if !numbers.insert(field.number) {
                return Err(ReflectError::malformed(
                    &full_name,
                    format!("field number {} is used more than once", field.number),
                ));
            }
            let oneof = match field.oneof_index {
                Some(i) => Some(*oneofs.get(i).ok_or_else(|| {
                    ReflectError::malformed(
                        join_name(&full_name, &field.name),
                        format!("oneof index {} out of range", i),
                    )
                })?),
                None => None,
            };
            let field_index = self.add_field(field, file, &full_name, Some(index), oneof)?;
            if let Some(oneof) = oneof {
                self.oneof_mut(oneof).fields.push(field_index);
            }
            fields.push(field_index);
        }

        let messages = def
            .messages
            .iter()
            .map(|m| self.add_message(m, file, &full_name, Some(index)))
            .collect::<Result<Vec<_>>>()?;
        let enums = def
            .enums
            .iter()
            .map(|e| self.add_enum(e, file, &full_name, Some(index)))
            .collect::<Result<Vec<_>>>()?;
        let extensions = def
            .extensions
            .iter()
            .map(|f| self.add_field(f, file, &full_name, Some(index), None))
            .collect::<Result<Vec<_>>>()?;

        let node = self.message_mut(index);
        node.fields = fields;
        node.oneofs = oneofs;
        node.messages = messages;
        node.enums = enums;
        node.extensions = extensions;
        Ok(index)
    }

    fn add_field(
        &mut self,
        def: &FieldDef,
        file: FileIndex,
        scope: &str,
        parent: Option<MessageIndex>,
        oneof: Option<OneofIndex>,
    ) -> Result<FieldIndex> {
        let full_name = join_name(scope, &def.name);
        if def.number < 1 || def.number > MAX_FIELD_NUMBER {
            return Err(ReflectError::malformed(
                &full_name,
                format!("field number {} out of range", def.number),
            ));
        }
        let index = FieldIndex((self.arena.fields.len() + self.staged.fields.len()) as u32);
        self.declare(&full_name, Symbol::Field(index))?;

        let kind = match &def.ty {
            FieldType::Scalar(scalar) => FieldKind::Scalar(*scalar),
            // patched once every name in the batch is known
            FieldType::Message(_) | FieldType::Enum(_) => FieldKind::Scalar(ScalarType::Bytes),
        };
        if !matches!(def.ty, FieldType::Scalar(_)) || def.extendee.is_some() {
            self.pending_fields.push(PendingField {
                index,
                scope: scope.to_string(),
                ty: def.ty.clone(),
                extendee: def.extendee.clone(),
            });
        }

        self.staged.fields.push(FieldNode {
            name: def.name.clone(),
            full_name,
            number: def.number,
            label: def.label,
            kind,
            file,
            parent,
            extendee: None,
            oneof,
            json_name: def.json_name.clone(),
            default_value: def.default_value.clone(),
            proto3_optional: def.proto3_optional,
            options: def.options.clone(),
            comments: def.comments.clone(),
        });
        Ok(index)
    }

    fn add_enum(
        &mut self,
        def: &EnumDef,
        file: FileIndex,
        scope: &str,
        parent: Option<MessageIndex>,
    ) -> Result<EnumIndex> {
        let full_name = join_name(scope, &def.name);
        let index = EnumIndex((self.arena.enums.len() + self.staged.enums.len()) as u32);
        self.declare(&full_name, Symbol::Enum(index))?;

        let mut values = Vec::with_capacity(def.values.len());
        for value in &def.values {
            let value_index =
                EnumValueIndex((self.arena.enum_values.len() + self.staged.enum_values.len()) as u32);
            self.staged.enum_values.push(EnumValueNode {
                name: value.name.clone(),
                // enum values are scoped alongside their enum
                full_name: join_name(scope, &value.name),
                number: value.number,
                parent: index,
                options: value.options.clone(),
                comments: value.comments.clone(),
            });
            values.push(value_index);
        }

        self.staged.enums.push(EnumNode {
            name: def.name.clone(),
            full_name,
            file,
            parent,
            values,
            reserved_ranges: def.reserved_ranges.clone(),
            reserved_names: def.reserved_names.clone(),
            options: def.options.clone(),
            comments: def.comments.clone(),
        });
        Ok(index)
    }

    fn add_service(&mut self, def: &ServiceDef, file: FileIndex, scope: &str) -> Result<ServiceIndex> {
        let full_name = join_name(scope, &def.name);
        let index = ServiceIndex((self.arena.services.len() + self.staged.services.len()) as u32);
        self.declare(&full_name, Symbol::Service(index))?;

        let mut methods = Vec::with_capacity(def.methods.len());
        for method in &def.methods {
            let method_index =
                MethodIndex((self.arena.methods.len() + self.staged.methods.len()) as u32);
            let method_name = join_name(&full_name, &method.name);
            self.declare(&method_name, Symbol::Method(method_index))?;
            self.pending_methods.push(PendingMethod {
                index: method_index,
                scope: scope.to_string(),
                input: method.input_type.clone(),
                output: method.output_type.clone(),
            });
            self.staged.methods.push(MethodNode {
                name: method.name.clone(),
                full_name: method_name,
                parent: index,
                input: MessageIndex(u32::MAX),
                output: MessageIndex(u32::MAX),
                client_streaming: method.client_streaming,
                server_streaming: method.server_streaming,
                options: method.options.clone(),
                comments: method.comments.clone(),
            });
            methods.push(method_index);
        }

        self.staged.services.push(ServiceNode {
            name: def.name.clone(),
            full_name,
            file,
            methods,
            options: def.options.clone(),
            comments: def.comments.clone(),
        });
        Ok(index)
    }

    // ---- resolution -------------------------------------------------------

    fn resolve(&mut self) -> Result<()> {
        for pending in std::mem::take(&mut self.pending_fields) {
            if let Some(extendee) = &pending.extendee {
                let target = self.resolve_message(&pending.scope, extendee)?;
                self.field_mut(pending.index).extendee = Some(target);
            }
            let name = match &pending.ty {
                FieldType::Scalar(_) => continue,
                FieldType::Message(name) | FieldType::Enum(name) => name,
            };
            let kind = match self.resolve_name(&pending.scope, name) {
                Some(Symbol::Message(m)) => FieldKind::Message(m),
                Some(Symbol::Enum(e)) => FieldKind::Enum(e),
                _ => {
                    return Err(ReflectError::UnresolvedReference {
                        name: name.clone(),
                        scope: pending.scope,
                    })
                }
            };
            self.field_mut(pending.index).kind = kind;
        }

        for pending in std::mem::take(&mut self.pending_methods) {
            let input = self.resolve_message(&pending.scope, &pending.input)?;
            let output = self.resolve_message(&pending.scope, &pending.output)?;
            let node = self.method_mut(pending.index);
            node.input = input;
            node.output = output;
        }
        Ok(())
    }

    fn resolve_name(&self, scope: &str, name: &str) -> Option<Symbol> {
        resolve_relative(|n| self.lookup(n), scope, name).map(|(_, symbol)| symbol)
    }

    fn resolve_message(&self, scope: &str, name: &str) -> Result<MessageIndex> {
        match self.resolve_name(scope, name) {
            Some(Symbol::Message(index)) => Ok(index),
            _ => Err(ReflectError::UnresolvedReference {
                name: name.to_string(),
                scope: scope.to_string(),
            }),
        }
    }

    // ---- staged node access -------------------------------------------------

    fn message_mut(&mut self, index: MessageIndex) -> &mut MessageNode {
        let offset = self.arena.messages.len();
        &mut self.staged.messages[index.get() - offset]
    }

    fn field_mut(&mut self, index: FieldIndex) -> &mut FieldNode {
        let offset = self.arena.fields.len();
        &mut self.staged.fields[index.get() - offset]
    }

    fn oneof_mut(&mut self, index: OneofIndex) -> &mut OneofNode {
        let offset = self.arena.oneofs.len();
        &mut self.staged.oneofs[index.get() - offset]
    }

    fn method_mut(&mut self, index: MethodIndex) -> &mut MethodNode {
        let offset = self.arena.methods.len();
        &mut self.staged.methods[index.get() - offset]
    }
}
