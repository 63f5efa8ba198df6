//! Descriptor synthesis from flat metadata
//!
//! Synthesis runs in two phases. [`Resolution`] walks type URLs depth-first,
//! fetching flat descriptions and recording every type the result will
//! reference; a URL already on the walk is not fetched again, which is all
//! cycles need. [`TypeRegistry::build`] then groups the fetched types into
//! files, nests types under their enclosing messages and links every file in
//! one batch, so mutually recursive types resolve to each other.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

use super::flat::{
    AnyEnvelope, Cardinality, FlatApi, FlatDescription, FlatEnum, FlatField, FlatOption, FlatType,
};
use super::{ensure_scheme, expect_kind, ExtensionResolver, Registered, TypeRegistry};
use crate::descriptor::{
    join_name, DescriptorKind, EnumDef, EnumValueDef, FieldDef, FieldDescriptor, FieldType, FileDef,
    Kind, MessageDef, MethodDef, OneofDef, OptionName, OptionTarget, Options, ServiceDef, Syntax,
    UnknownOption,
};
use crate::dynamic::{DynamicMessage, Value};
use crate::error::{ReflectError, Result};
use crate::wellknown;

struct Target {
    full_name: String,
    kind: DescriptorKind,
}

/// Types gathered for one synthesis
pub(crate) struct Resolution<'r> {
    registry: &'r TypeRegistry,
    targets: HashMap<String, Target>,
    /// Fetched types still to be built, in discovery order
    pending: Vec<(String, Arc<FlatDescription>)>,
    pending_names: HashSet<String>,
}

impl<'r> Resolution<'r> {
    pub(crate) fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            targets: HashMap::new(),
            pending: Vec::new(),
            pending_names: HashSet::new(),
        }
    }

    /// Full type name behind `url`, fetching it and everything it references
    /// when needed; `Ok(None)` if nothing knows the URL
    pub(crate) fn resolve_url(&mut self, url: &str, want_enum: bool) -> Result<Option<String>> {
        let url = ensure_scheme(url);
        if let Some(target) = self.targets.get(&url) {
            expect_kind(&url, want_enum, target.kind)?;
            return Ok(Some(target.full_name.clone()));
        }

        if let Some(known) = self.registry.lookup_known(&url, want_enum)? {
            let name = known.full_name().to_string();
            self.record(&url, &name, known.kind());
            return Ok(Some(name));
        }

        let Some(fetcher) = self.registry.fetcher.as_ref() else {
            return Ok(None);
        };
        let Some(flat) = self
            .registry
            .cache
            .fetch(&url, || fetcher.fetch(&url, want_enum))?
        else {
            return Ok(None);
        };

        let kind = if flat.is_enum() {
            DescriptorKind::Enum
        } else {
            DescriptorKind::Message
        };
        expect_kind(&url, want_enum, kind)?;
        let name = flat.name().to_string();

        // Same type reached through another URL
        if self.pending_names.contains(&name) {
            self.record(&url, &name, kind);
            return Ok(Some(name));
        }
        if let Some(existing) = self.registry.pool.get_by_name(&name) {
            expect_kind(&url, want_enum, existing.kind())?;
            self.record(&url, &name, kind);
            return Ok(Some(name));
        }

        trace!(url = %url, name = %name, "queueing type for synthesis");
        self.record(&url, &name, kind);
        self.pending_names.insert(name.clone());
        self.pending.push((url.clone(), flat.clone()));
        self.pull_enclosing(&url, &name)?;

        if let FlatDescription::Message(message) = flat.as_ref() {
            for field in message.fields.iter().filter(|f| f.kind.is_reference()) {
                if field.type_url.is_empty() {
                    return Err(ReflectError::malformed(
                        join_name(&name, &field.name),
                        "reference field without a type URL",
                    ));
                }
                let want_enum = field.kind == super::FlatKind::Enum;
                if self.resolve_url(&field.type_url, want_enum)?.is_none() {
                    return Err(ReflectError::TypeNotFound(field.type_url.clone()));
                }
            }
        }
        Ok(Some(name))
    }

    /// Queue the message enclosing `name` when the fetcher knows one at the
    /// same domain, so a nested type is never linked ahead of its parent.
    ///
    /// Scopes already linked, queued or declared as packages are left alone.
    /// The probe stops at the first scope that is not a message; the parent,
    /// once queued, probes its own enclosing scope.
    fn pull_enclosing(&mut self, url: &str, name: &str) -> Result<()> {
        let registry = self.registry;
        let scope = parent_scope(name);
        if scope.is_empty()
            || self.pending_names.contains(scope)
            || registry.pool.is_package(scope)
            || registry.pool.get_by_name(scope).is_some()
        {
            return Ok(());
        }
        let (Some(fetcher), Some((domain, _))) = (registry.fetcher.as_ref(), url.rsplit_once('/'))
        else {
            return Ok(());
        };
        let scope_url = format!("{}/{}", domain, scope);
        if self.targets.contains_key(&scope_url) {
            return Ok(());
        }
        match registry.cache.probe(&scope_url, || fetcher.fetch(&scope_url, false)) {
            Some(flat) if !flat.is_enum() && flat.name() == scope => {
                debug!(url = %scope_url, nested = %name, "pulling in enclosing message");
                self.resolve_url(&scope_url, false)?;
            }
            _ => trace!(scope, "enclosing scope is not a fetched message"),
        }
        Ok(())
    }

    fn record(&mut self, url: &str, name: &str, kind: DescriptorKind) {
        self.targets.insert(
            url.to_string(),
            Target {
                full_name: name.to_string(),
                kind,
            },
        );
    }

    fn target_name(&self, url: &str) -> Result<&str> {
        self.targets
            .get(&ensure_scheme(url))
            .map(|t| t.full_name.as_str())
            .ok_or_else(|| ReflectError::TypeNotFound(url.to_string()))
    }
}

/// One file of a synthesis batch
struct FileGroup {
    name: String,
    items: Vec<Arc<FlatDescription>>,
    api: Option<FlatApi>,
}

/// Everything the registry needs while turning one group into a `FileDef`
struct Builder<'a> {
    registry: &'a TypeRegistry,
    resolution: &'a Resolution<'a>,
    /// Which batch file declares each new type
    homes: &'a HashMap<String, String>,
    dependencies: BTreeSet<String>,
}

impl TypeRegistry {
    /// Link the types of `resolution` (and the service of `api`) into the
    /// pool; returns every resolved URL with its descriptor
    pub(crate) fn build(
        &self,
        resolution: Resolution<'_>,
        api: Option<&FlatApi>,
    ) -> Result<HashMap<String, Registered>> {
        let _guard = self.build_lock.lock();

        // another thread may have linked some of these meanwhile
        let fresh: Vec<&(String, Arc<FlatDescription>)> = resolution
            .pending
            .iter()
            .filter(|(_, flat)| self.pool.get_by_name(flat.name()).is_none())
            .collect();

        // a concurrent call may have linked the same service
        let api = api.filter(|api| self.pool.get_service_by_name(api.full_name()).is_none());
        let groups = self.group_files(&fresh, api)?;
        if !groups.is_empty() {
            let mut homes = HashMap::new();
            for group in &groups {
                for item in &group.items {
                    homes.insert(item.name().to_string(), group.name.clone());
                }
            }

            let mut defs = Vec::with_capacity(groups.len());
            for group in groups {
                let mut builder = Builder {
                    registry: self,
                    resolution: &resolution,
                    homes: &homes,
                    dependencies: BTreeSet::new(),
                };
                defs.push(builder.file_def(group)?);
            }
            debug!(files = defs.len(), types = fresh.len(), "linking synthesized files");
            self.pool.add_files(defs)?;
        }

        let mut built = HashMap::new();
        for (url, target) in &resolution.targets {
            let found = self
                .pool
                .get_by_name(&target.full_name)
                .and_then(Registered::from_descriptor)
                .ok_or_else(|| ReflectError::TypeNotFound(target.full_name.clone()))?;
            built.insert(url.clone(), found);
        }
        for (url, _) in &resolution.pending {
            if let Some(found) = built.get(url) {
                self.cache.record_built(url.clone(), found.clone());
            }
        }
        Ok(built)
    }

    /// Assign each new type, and the service, to a file.
    ///
    /// Types go to their declared source file, or to one named after the
    /// type. Nested types always live with their enclosing message.
    fn group_files(
        &self,
        fresh: &[&(String, Arc<FlatDescription>)],
        api: Option<&FlatApi>,
    ) -> Result<Vec<FileGroup>> {
        let names: HashSet<&str> = fresh.iter().map(|(_, f)| f.name()).collect();
        let mut groups: Vec<FileGroup> = Vec::new();
        let mut by_file: HashMap<String, usize> = HashMap::new();
        let mut home_of: HashMap<String, String> = HashMap::new();

        let mut declared = |file: String, groups: &mut Vec<FileGroup>| -> usize {
            *by_file.entry(file.clone()).or_insert_with(|| {
                groups.push(FileGroup {
                    name: file,
                    items: Vec::new(),
                    api: None,
                });
                groups.len() - 1
            })
        };

        // outermost first so nested types can follow their parents
        let mut ordered: Vec<&Arc<FlatDescription>> = fresh.iter().map(|(_, f)| f).collect();
        ordered.sort_by_key(|f| f.name().matches('.').count());

        for flat in ordered {
            let name = flat.name();
            let mut file = flat
                .source_file()
                .map(str::to_string)
                .unwrap_or_else(|| file_name_for(name));

            let mut scope = parent_scope(name);
            while !scope.is_empty() {
                if names.contains(scope) {
                    if let Some(parent_file) = home_of.get(scope) {
                        file = parent_file.clone();
                    }
                    break;
                }
                if let Some(existing) = self.pool.get_message_by_name(scope) {
                    return Err(ReflectError::malformed(
                        name,
                        format!(
                            "enclosing message {} is already linked in {}",
                            scope,
                            existing.file().name()
                        ),
                    ));
                }
                scope = parent_scope(scope);
            }

            home_of.insert(name.to_string(), file.clone());
            let index = declared(file, &mut groups);
            groups[index].items.push(flat.clone());
        }

        if let Some(api) = api {
            let file = api
                .source_file
                .clone()
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| file_name_for(api.full_name()));
            let index = declared(file, &mut groups);
            groups[index].api = Some(api.clone());
        }

        for group in &mut groups {
            if self.pool.get_file_by_name(&group.name).is_some() {
                let renamed = self.unused_file_name(&group.name);
                debug!(file = %group.name, renamed = %renamed, "file name taken");
                group.name = renamed;
            }
        }
        Ok(groups)
    }

    fn unused_file_name(&self, name: &str) -> String {
        let stem = name.strip_suffix(".proto").unwrap_or(name);
        (1..)
            .map(|n| format!("{}_{}.proto", stem, n))
            .find(|candidate| self.pool.get_file_by_name(candidate).is_none())
            .unwrap_or_else(|| name.to_string())
    }

    fn extension_resolver(&self) -> &dyn ExtensionResolver {
        match &self.extensions {
            Some(resolver) => resolver.as_ref(),
            None => &self.pool,
        }
    }
}

impl Builder<'_> {
    fn file_def(&mut self, group: FileGroup) -> Result<FileDef> {
        let mut scopes: Vec<&str> = group.items.iter().map(|f| parent_scope(f.name())).collect();
        if let Some(api) = &group.api {
            scopes.push(parent_scope(api.full_name()));
        }
        let package = common_prefix(&scopes);

        let syntax = match &group.api {
            Some(api) => api.syntax,
            None => group.items.first().map_or(Syntax::default(), |f| f.syntax()),
        };

        let mut file = FileDef::new(group.name.clone(), package.clone()).with_syntax(syntax);

        for flat in &group.items {
            let relative = relative_path(&package, flat.name());
            let (simple, enclosing) = relative
                .split_last()
                .ok_or_else(|| ReflectError::malformed(flat.name(), "empty type name"))?;
            match flat.as_ref() {
                FlatDescription::Message(message) => {
                    let def = self.message_def(simple, message)?;
                    insert_message(&mut file.messages, enclosing, def);
                }
                FlatDescription::Enum(e) => {
                    let def = self.enum_def(simple, e)?;
                    match enclosing.split_first() {
                        Some((first, rest)) => {
                            message_at(&mut file.messages, first, rest).enums.push(def)
                        }
                        None => file.enums.push(def),
                    }
                }
            }
        }

        if let Some(api) = &group.api {
            if parent_scope(api.full_name()) != package {
                return Err(ReflectError::malformed(
                    api.full_name(),
                    format!("service must be declared in package {}", package),
                ));
            }
            file.services.push(self.service_def(api)?);
        }

        self.dependencies.remove(&group.name);
        file.dependencies = std::mem::take(&mut self.dependencies).into_iter().collect();
        trace!(file = %file.name, package = %file.package, "synthesized file");
        Ok(file)
    }

    fn message_def(&mut self, name: &str, flat: &FlatType) -> Result<MessageDef> {
        let element = flat.name.trim_start_matches('.');
        let mut def = MessageDef::new(name);
        for oneof in &flat.oneofs {
            def.oneofs.push(OneofDef::new(oneof.clone()));
        }
        for field in &flat.fields {
            def.fields.push(self.field_def(element, flat.oneofs.len(), field)?);
        }
        def.options = self.options(OptionTarget::Message, element, &flat.options)?;
        Ok(def)
    }

    fn field_def(&mut self, message: &str, oneofs: usize, flat: &FlatField) -> Result<FieldDef> {
        let element = join_name(message, &flat.name);
        let ty = match flat.kind.scalar() {
            Some(scalar) => FieldType::Scalar(scalar),
            None => {
                let target = self.reference(&flat.type_url)?;
                if flat.kind == super::FlatKind::Enum {
                    FieldType::Enum(target)
                } else {
                    FieldType::Message(target)
                }
            }
        };
        let mut def = FieldDef::new(flat.name.clone(), flat.number, ty);
        def = match flat.cardinality {
            Cardinality::Optional => def,
            Cardinality::Required => def.required(),
            Cardinality::Repeated => def.repeated(),
        };

        if flat.oneof_index != 0 {
            let index = usize::try_from(flat.oneof_index - 1)
                .ok()
                .filter(|i| *i < oneofs)
                .ok_or_else(|| {
                    ReflectError::malformed(
                        element.clone(),
                        format!("oneof index {} out of range", flat.oneof_index),
                    )
                })?;
            def = def.in_oneof(index);
        }
        if let Some(json_name) = &flat.json_name {
            if !json_name.is_empty() {
                def = def.with_json_name(json_name.clone());
            }
        }
        if let Some(default_value) = &flat.default_value {
            def = def.with_default(default_value.clone());
        }

        let mut options = self.options(OptionTarget::Field, &element, &flat.options)?;
        if flat.packed {
            options.set(OptionName::Builtin("packed".to_string()), Value::Bool(true));
        }
        def.options = options;
        Ok(def)
    }

    fn enum_def(&mut self, name: &str, flat: &FlatEnum) -> Result<EnumDef> {
        let element = flat.name.trim_start_matches('.');
        let mut def = EnumDef::new(name);
        for value in &flat.values {
            let value_element = join_name(element, &value.name);
            let options = self.options(OptionTarget::EnumValue, &value_element, &value.options)?;
            def.values
                .push(EnumValueDef::new(value.name.clone(), value.number).with_options(options));
        }
        def.options = self.options(OptionTarget::Enum, element, &flat.options)?;
        Ok(def)
    }

    fn service_def(&mut self, api: &FlatApi) -> Result<ServiceDef> {
        let element = api.full_name();
        let simple = element.rsplit('.').next().unwrap_or(element);
        let mut def = ServiceDef::new(simple);
        for method in &api.methods {
            let input = self.reference(&method.request_type_url)?;
            let output = self.reference(&method.response_type_url)?;
            let mut method_def = MethodDef::new(method.name.clone(), input, output);
            method_def.client_streaming = method.request_streaming;
            method_def.server_streaming = method.response_streaming;
            let method_element = join_name(element, &method.name);
            method_def.options =
                self.options(OptionTarget::Method, &method_element, &method.options)?;
            def.methods.push(method_def);
        }
        def.options = self.options(OptionTarget::Service, element, &api.options)?;
        Ok(def)
    }

    /// Absolute name for a referenced type URL, noting the file it needs
    fn reference(&mut self, url: &str) -> Result<String> {
        let name = self.resolution.target_name(url)?.to_string();
        let file = match self.homes.get(&name) {
            Some(file) => file.clone(),
            None => self
                .registry
                .pool
                .get_by_name(&name)
                .map(|d| d.file().name().to_string())
                .ok_or_else(|| ReflectError::TypeNotFound(name.clone()))?,
        };
        self.dependencies.insert(file);
        Ok(format!(".{}", name))
    }

    /// Decode flat options of one element into typed option values
    fn options(
        &mut self,
        target: OptionTarget,
        element: &str,
        flat: &[FlatOption],
    ) -> Result<Options> {
        let mut options = Options::new();
        for option in flat {
            let name = option.name.trim_start_matches('(').trim_end_matches(')');
            let name = name.strip_prefix('.').unwrap_or(name);

            let (field, option_name) = match wellknown::builtin_option(target, name) {
                Some(field) => (field, OptionName::Builtin(name.to_string())),
                None => match self.extension(target, name)? {
                    Some(field) => {
                        let full_name = field.full_name().to_string();
                        (field, OptionName::Extension(full_name))
                    }
                    None => {
                        if self.registry.config.retain_unknown_options {
                            options.push_unknown(UnknownOption {
                                name: option.name.clone(),
                                type_url: option.value.type_url.clone(),
                                value: option.value.value.clone(),
                            });
                        } else {
                            debug!(element, option = %option.name, "dropping unknown option");
                        }
                        continue;
                    }
                },
            };

            let value = self.option_value(&field, &option.value).map_err(|e| {
                ReflectError::malformed(format!("option {} of {}", option.name, element), e.to_string())
            })?;
            if field.is_list() {
                options.push(option_name, value);
            } else {
                options.set(option_name, value);
            }
        }
        Ok(options)
    }

    /// Extension of the options message for `target`, linked into the pool
    fn extension(&mut self, target: OptionTarget, name: &str) -> Result<Option<FieldDescriptor>> {
        let Some(found) = self
            .registry
            .extension_resolver()
            .find_extension(target.options_type_name(), name)
        else {
            return Ok(None);
        };
        let file = self.registry.pool.import_file(&found.file())?;
        self.dependencies.insert(file.name().to_string());
        Ok(self.registry.pool.get_extension_by_name(found.full_name()))
    }

    fn option_value(&self, field: &FieldDescriptor, any: &AnyEnvelope) -> Result<Value> {
        let kind = field.kind();
        if let Kind::Message(message) = &kind {
            if any.type_name() != message.full_name() {
                return Err(ReflectError::InvalidValue {
                    field: field.full_name().to_string(),
                    reason: format!("expected {}, got {}", message.full_name(), any.type_url),
                });
            }
            return Ok(Value::Message(DynamicMessage::decode(
                message.clone(),
                &any.value,
            )?));
        }

        let wrapper = wellknown::wrapper_for(&kind)
            .and_then(|name| wellknown::pool().get_message_by_name(name))
            .ok_or_else(|| ReflectError::TypeNotFound(format!("wrapper for {}", field.full_name())))?;
        if any.type_name() != wrapper.full_name() {
            return Err(ReflectError::InvalidValue {
                field: field.full_name().to_string(),
                reason: format!("expected {}, got {}", wrapper.full_name(), any.type_url),
            });
        }
        let inner = wrapper
            .get_field_by_name("value")
            .ok_or_else(|| ReflectError::malformed(wrapper.full_name(), "wrapper without value"))?;
        let decoded = DynamicMessage::decode(wrapper, &any.value)?;
        let value = decoded
            .get_field(&inner)
            .cloned()
            .unwrap_or_else(|| Value::default_for(&inner));
        Ok(match (kind, value) {
            (Kind::Enum(_), Value::I32(n)) => Value::EnumNumber(n),
            (_, value) => value,
        })
    }
}

/// `a.b.C` -> `a.b`
fn parent_scope(name: &str) -> &str {
    name.rfind('.').map_or("", |i| &name[..i])
}

/// File name used for a type that does not name its own
fn file_name_for(full_name: &str) -> String {
    format!("{}.proto", full_name.replace('.', "/"))
}

/// Longest dotted prefix shared by every scope
fn common_prefix(scopes: &[&str]) -> String {
    let mut iter = scopes.iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let mut common: Vec<&str> = if first.is_empty() {
        Vec::new()
    } else {
        first.split('.').collect()
    };
    for scope in iter {
        let parts: Vec<&str> = if scope.is_empty() {
            Vec::new()
        } else {
            scope.split('.').collect()
        };
        let shared = common
            .iter()
            .zip(&parts)
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
    }
    common.join(".")
}

/// Components of `name` below `package`
fn relative_path<'a>(package: &str, name: &'a str) -> Vec<&'a str> {
    let rest = if package.is_empty() {
        name
    } else {
        name.strip_prefix(package)
            .and_then(|r| r.strip_prefix('.'))
            .unwrap_or(name)
    };
    rest.split('.').collect()
}

/// Message at `first.rest`, creating empty enclosing messages as needed
fn message_at<'m>(
    messages: &'m mut Vec<MessageDef>,
    first: &str,
    rest: &[&str],
) -> &'m mut MessageDef {
    let index = match messages.iter().position(|m| m.name == first) {
        Some(index) => index,
        None => {
            messages.push(MessageDef::new(first));
            messages.len() - 1
        }
    };
    match rest.split_first() {
        Some((next, rest)) => message_at(&mut messages[index].messages, next, rest),
        None => &mut messages[index],
    }
}

/// Add `def` under `enclosing`; a placeholder of the same name created for
/// an earlier nested type is replaced, keeping its children
fn insert_message(messages: &mut Vec<MessageDef>, enclosing: &[&str], mut def: MessageDef) {
    let siblings = match enclosing.split_first() {
        Some((first, rest)) => &mut message_at(messages, first, rest).messages,
        None => messages,
    };
    match siblings.iter().position(|m| m.name == def.name) {
        Some(index) => {
            let placeholder = std::mem::replace(&mut siblings[index], MessageDef::new(""));
            def.messages.extend(placeholder.messages);
            def.enums.extend(placeholder.enums);
            siblings[index] = def;
        }
        None => siblings.push(def),
    }
}
