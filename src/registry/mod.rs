//! Type Registry
//!
//! Resolves type URLs (`{domain}/{full.type.Name}`) to message and enum
//! descriptors. Lookup order:
//!
//! 1. explicit registrations by exact URL
//! 2. types this registry already synthesized
//! 3. compiled types by bare name, when configured
//! 4. the built-in well-known `google.protobuf.*` types
//! 5. the fetcher: flat metadata is fetched and synthesized into descriptors,
//!    recursively resolving every type URL it references
//!
//! Every descriptor the registry hands out lives in the registry's own
//! [`DescriptorPool`]; descriptors registered from another pool are imported
//! together with their dependencies.

mod cache;
pub mod flat;
mod synth;

pub use flat::{
    AnyEnvelope, Cardinality, FlatApi, FlatDescription, FlatEnum, FlatEnumValue, FlatField,
    FlatKind, FlatMethod, FlatOption, FlatType, DEFAULT_BASE_URL,
};

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::RegistryConfig;
use crate::descriptor::{
    Descriptor, DescriptorKind, DescriptorPool, EnumDescriptor, FieldDescriptor, FileDescriptor,
    Kind, Label, MessageDescriptor, OptionName, Options, ServiceDescriptor,
};
use crate::dynamic::{CompiledTypes, DynamicMessage, GeneratedTypes, Message};
use crate::error::{ReflectError, Result};
use crate::wellknown;
use cache::SynthesisCache;
use flat::type_name_of;
use synth::Resolution;

// =============================================================================
// Collaborators
// =============================================================================

/// Supplies flat metadata for type URLs the registry does not know.
///
/// `Ok(None)` means the type does not exist; errors abort the lookup.
pub trait TypeFetcher: Send + Sync {
    fn fetch(&self, url: &str, want_enum: bool) -> anyhow::Result<Option<FlatDescription>>;
}

impl<F> TypeFetcher for F
where
    F: Fn(&str, bool) -> anyhow::Result<Option<FlatDescription>> + Send + Sync,
{
    fn fetch(&self, url: &str, want_enum: bool) -> anyhow::Result<Option<FlatDescription>> {
        self(url, want_enum)
    }
}

/// Finds extensions of the option messages while decoding flat options
pub trait ExtensionResolver: Send + Sync {
    /// Extension `name` of the message `containing_type`, e.g.
    /// `("google.protobuf.FieldOptions", "acme.rules")`
    fn find_extension(&self, containing_type: &str, name: &str) -> Option<FieldDescriptor>;
}

impl ExtensionResolver for DescriptorPool {
    fn find_extension(&self, containing_type: &str, name: &str) -> Option<FieldDescriptor> {
        DescriptorPool::find_extension(self, containing_type, name)
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Registered {
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
}

impl Registered {
    fn kind(&self) -> DescriptorKind {
        match self {
            Registered::Message(_) => DescriptorKind::Message,
            Registered::Enum(_) => DescriptorKind::Enum,
        }
    }

    pub(crate) fn full_name(&self) -> &str {
        match self {
            Registered::Message(m) => m.full_name(),
            Registered::Enum(e) => e.full_name(),
        }
    }

    fn from_descriptor(descriptor: Descriptor) -> Option<Self> {
        match descriptor {
            Descriptor::Message(m) => Some(Registered::Message(m)),
            Descriptor::Enum(e) => Some(Registered::Enum(e)),
            _ => None,
        }
    }
}

/// Fail with `UnexpectedKind` unless `found` is of the wanted kind
pub(crate) fn expect_kind(url: &str, want_enum: bool, found: DescriptorKind) -> Result<()> {
    let expected = if want_enum {
        DescriptorKind::Enum
    } else {
        DescriptorKind::Message
    };
    if found == expected {
        Ok(())
    } else {
        Err(ReflectError::UnexpectedKind {
            url: url.to_string(),
            expected,
            found,
        })
    }
}

/// `https://` is assumed for URLs without a scheme
pub(crate) fn ensure_scheme(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

struct RegistryState {
    types: HashMap<String, Registered>,
    base_urls: HashMap<String, String>,
    default_base_url: String,
}

/// Resolves type URLs to descriptors, synthesizing them on demand
pub struct TypeRegistry {
    pool: DescriptorPool,
    config: RegistryConfig,
    state: RwLock<RegistryState>,
    fetcher: Option<Arc<dyn TypeFetcher>>,
    extensions: Option<Arc<dyn ExtensionResolver>>,
    compiled: Option<Arc<dyn CompiledTypes>>,
    cache: SynthesisCache,
    /// Serializes linking into `pool`
    build_lock: Mutex<()>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("TypeRegistry")
            .field("pool", &self.pool)
            .field("registered", &state.types.len())
            .field("default_base_url", &state.default_base_url)
            .field("has_fetcher", &self.fetcher.is_some())
            .field("defaults", &self.compiled.is_some())
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::from_config(RegistryConfig::default())
    }
}

impl TypeRegistry {
    /// Registry with no registrations, no fetcher and no compiled types
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that also resolves the compiled well-known types by name
    pub fn with_defaults() -> Self {
        Self::new().with_compiled_types(GeneratedTypes::well_known())
    }

    pub fn from_config(config: RegistryConfig) -> Self {
        let registry = Self {
            pool: DescriptorPool::new(),
            state: RwLock::new(RegistryState {
                types: HashMap::new(),
                base_urls: HashMap::new(),
                default_base_url: config.default_base_url.clone(),
            }),
            config,
            fetcher: None,
            extensions: None,
            compiled: None,
            cache: SynthesisCache::default(),
            build_lock: Mutex::new(()),
        };
        if registry.config.include_defaults {
            registry.with_compiled_types(GeneratedTypes::well_known())
        } else {
            registry
        }
    }

    pub fn with_fetcher(mut self, fetcher: impl TypeFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Where extension options are looked up; defaults to the registry pool
    pub fn with_extension_resolver(mut self, resolver: Arc<dyn ExtensionResolver>) -> Self {
        self.extensions = Some(resolver);
        self
    }

    /// Enable lookup of compiled types by bare name
    pub fn with_compiled_types(mut self, compiled: Arc<dyn CompiledTypes>) -> Self {
        self.compiled = Some(compiled);
        self
    }

    pub fn with_default_base_url(self, base_url: &str) -> Self {
        self.set_default_base_url(base_url);
        self
    }

    /// Change the base URL used by [`compute_url`](Self::compute_url); an
    /// empty string restores the configured default
    pub fn set_default_base_url(&self, base_url: &str) {
        let mut state = self.state.write();
        state.default_base_url = if base_url.is_empty() {
            self.config.default_base_url.clone()
        } else {
            base_url.to_string()
        };
    }

    /// Use `base_url` for the element `name` (a package, or a type and its
    /// nested types) when computing URLs.
    ///
    /// # Panics
    ///
    /// Panics if either argument is empty.
    pub fn add_base_url_for_element(&self, base_url: &str, name: &str) {
        assert!(!base_url.is_empty(), "base URL must not be empty");
        assert!(!name.is_empty(), "element name must not be empty");
        let base = base_url.strip_suffix('/').unwrap_or(base_url);
        debug!(base, name, "registering base URL");
        self.state
            .write()
            .base_urls
            .insert(name.to_string(), base.to_string());
    }

    /// Pool holding every descriptor this registry hands out
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register a message under an exact URL ending in `/` + its full name
    pub fn add_message(&self, url: &str, descriptor: &MessageDescriptor) -> Result<()> {
        let descriptor = self.adopt(&Descriptor::Message(descriptor.clone()))?;
        self.register(url, descriptor)
    }

    /// Register an enum under an exact URL ending in `/` + its full name
    pub fn add_enum(&self, url: &str, descriptor: &EnumDescriptor) -> Result<()> {
        let descriptor = self.adopt(&Descriptor::Enum(descriptor.clone()))?;
        self.register(url, descriptor)
    }

    /// Register every message and enum of `file`, nested ones included,
    /// under `base_url`
    pub fn add_file(&self, base_url: &str, file: &FileDescriptor) -> Result<()> {
        let file = self.adopt_file(file)?;
        let base = base_url.strip_suffix('/').unwrap_or(base_url);
        let mut messages = file.messages();
        for e in file.enums() {
            self.register(&format!("{}/{}", base, e.full_name()), Registered::Enum(e))?;
        }
        while let Some(m) = messages.pop() {
            for e in m.nested_enums() {
                self.register(&format!("{}/{}", base, e.full_name()), Registered::Enum(e))?;
            }
            messages.extend(m.nested_messages());
            self.register(&format!("{}/{}", base, m.full_name()), Registered::Message(m))?;
        }
        Ok(())
    }

    fn register(&self, url: &str, registered: Registered) -> Result<()> {
        let url = ensure_scheme(url);
        let name = registered.full_name();
        let base = url
            .strip_suffix(name)
            .and_then(|b| b.strip_suffix('/'))
            .ok_or_else(|| ReflectError::InvalidUrl {
                url: url.clone(),
                reason: format!("must end with /{}", name),
            })?;
        trace!(url = %url, "registering type");
        let mut state = self.state.write();
        state.base_urls.insert(name.to_string(), base.to_string());
        state.types.insert(url, registered);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Message for `url`; `Ok(None)` when nothing knows the URL
    pub fn find_message_by_url(&self, url: &str) -> Result<Option<MessageDescriptor>> {
        match self.resolve(url, false)? {
            Some(Registered::Message(m)) => Ok(Some(m)),
            Some(other) => Err(ReflectError::UnexpectedKind {
                url: url.to_string(),
                expected: DescriptorKind::Message,
                found: other.kind(),
            }),
            None => Ok(None),
        }
    }

    /// Enum for `url`; `Ok(None)` when nothing knows the URL
    pub fn find_enum_by_url(&self, url: &str) -> Result<Option<EnumDescriptor>> {
        match self.resolve(url, true)? {
            Some(Registered::Enum(e)) => Ok(Some(e)),
            Some(other) => Err(ReflectError::UnexpectedKind {
                url: url.to_string(),
                expected: DescriptorKind::Enum,
                found: other.kind(),
            }),
            None => Ok(None),
        }
    }

    fn resolve(&self, url: &str, want_enum: bool) -> Result<Option<Registered>> {
        let url = ensure_scheme(url);
        if let Some(found) = self.lookup_known(&url, want_enum)? {
            return Ok(Some(found));
        }
        if self.fetcher.is_none() {
            return Ok(None);
        }
        let mut resolution = Resolution::new(self);
        if resolution.resolve_url(&url, want_enum)?.is_none() {
            return Ok(None);
        }
        let mut built = self.build(resolution, None)?;
        Ok(built.remove(&url))
    }

    /// Steps that need no fetcher: registrations, synthesized types,
    /// compiled types and well-known types
    pub(crate) fn lookup_known(&self, url: &str, want_enum: bool) -> Result<Option<Registered>> {
        if let Some(found) = self.state.read().types.get(url) {
            return Ok(Some(found.clone()));
        }
        if let Some(found) = self.cache.built(url) {
            trace!(url, "synthesized type cached");
            return Ok(Some(found));
        }

        let name = type_name_of(url);
        if name.is_empty() {
            return Err(ReflectError::InvalidUrl {
                url: url.to_string(),
                reason: "missing type name".to_string(),
            });
        }

        if let Some(compiled) = &self.compiled {
            let found = match compiled.find_message(name) {
                Some(m) => Some(Descriptor::Message(m)),
                None => compiled.find_enum(name).map(Descriptor::Enum),
            };
            if let Some(found) = found {
                expect_kind(url, want_enum, found.kind())?;
                return Ok(Some(self.adopt(&found)?));
            }
        }

        if wellknown::is_well_known(name) {
            if let Some(found) = wellknown::pool().get_by_name(name) {
                if matches!(found, Descriptor::Message(_) | Descriptor::Enum(_)) {
                    expect_kind(url, want_enum, found.kind())?;
                    return Ok(Some(self.adopt(&found)?));
                }
            }
        }
        Ok(None)
    }

    /// The same message or enum, linked into the registry pool
    fn adopt(&self, descriptor: &Descriptor) -> Result<Registered> {
        let _guard = self.build_lock.lock();
        self.adopt_locked(descriptor)
    }

    fn adopt_file(&self, file: &FileDescriptor) -> Result<FileDescriptor> {
        let _guard = self.build_lock.lock();
        self.pool.import_file(file)
    }

    /// [`adopt`](Self::adopt) for callers already holding `build_lock`
    pub(crate) fn adopt_locked(&self, descriptor: &Descriptor) -> Result<Registered> {
        let name = descriptor.full_name();
        let local = if descriptor.file().pool().ptr_eq(&self.pool) {
            Some(descriptor.clone())
        } else {
            self.pool.import_file(&descriptor.file())?;
            self.pool.get_by_name(name)
        };
        local
            .and_then(Registered::from_descriptor)
            .ok_or_else(|| ReflectError::TypeNotFound(name.to_string()))
    }

    // -------------------------------------------------------------------------
    // Any envelopes
    // -------------------------------------------------------------------------

    /// URL for a descriptor: the most specific base URL among the exact
    /// name, its enclosing names and packages, else the default
    pub fn compute_url(&self, descriptor: &Descriptor) -> String {
        let name = descriptor.full_name();
        let state = self.state.read();
        let mut candidate = Some(name);
        let base = loop {
            match candidate {
                Some(c) => {
                    if let Some(base) = state.base_urls.get(c) {
                        break base.as_str();
                    }
                    candidate = c.rfind('.').map(|i| &c[..i]);
                }
                None => break state.default_base_url.as_str(),
            }
        };
        if base.ends_with('/') {
            format!("{}{}", base, name)
        } else {
            format!("{}/{}", base, name)
        }
    }

    /// Pack a message with its computed type URL
    pub fn marshal_any(&self, message: &dyn Message) -> AnyEnvelope {
        let descriptor = Descriptor::Message(message.descriptor());
        AnyEnvelope::new(self.compute_url(&descriptor), message.encode_to_vec())
    }

    /// Unpack an envelope into the compiled type when one is known, else a
    /// [`DynamicMessage`]
    pub fn unmarshal_any(&self, envelope: &AnyEnvelope) -> Result<Box<dyn Message>> {
        let descriptor = self
            .find_message_by_url(&envelope.type_url)?
            .ok_or_else(|| ReflectError::TypeNotFound(envelope.type_url.clone()))?;

        if let Some(compiled) = &self.compiled {
            if let Some(decoded) = compiled.decode(&descriptor, &envelope.value) {
                return decoded;
            }
        }
        if wellknown::is_well_known(descriptor.full_name()) {
            if let Some(decoded) = GeneratedTypes::well_known().decode(&descriptor, &envelope.value) {
                return decoded;
            }
        }
        Ok(Box::new(DynamicMessage::decode(descriptor, &envelope.value)?))
    }

    // -------------------------------------------------------------------------
    // Services
    // -------------------------------------------------------------------------

    /// Build a service from API metadata; method types go through the same
    /// resolution as fields and share their descriptors
    pub fn resolve_api_to_service(&self, api: &FlatApi) -> Result<ServiceDescriptor> {
        let name = api.full_name();
        if let Some(existing) = self.pool.get_service_by_name(name) {
            return Ok(existing);
        }
        let mut resolution = Resolution::new(self);
        for method in &api.methods {
            for url in [&method.request_type_url, &method.response_type_url] {
                if resolution.resolve_url(url, false)?.is_none() {
                    return Err(ReflectError::TypeNotFound(url.clone()));
                }
            }
        }
        self.build(resolution, Some(api))?;
        self.pool
            .get_service_by_name(name)
            .ok_or_else(|| ReflectError::TypeNotFound(name.to_string()))
    }

    // -------------------------------------------------------------------------
    // Descriptor to flat metadata
    // -------------------------------------------------------------------------

    pub fn message_as_flat(&self, message: &MessageDescriptor) -> Result<FlatType> {
        let oneofs = message.oneofs();
        let mut fields = Vec::new();
        for field in message.fields() {
            let (kind, type_url) = match field.kind() {
                Kind::Scalar(s) => (FlatKind::from_scalar(s), String::new()),
                Kind::Message(m) => (FlatKind::Message, self.compute_url(&Descriptor::Message(m))),
                Kind::Enum(e) => (FlatKind::Enum, self.compute_url(&Descriptor::Enum(e))),
            };
            let oneof_index = field
                .containing_oneof()
                .and_then(|o| oneofs.iter().position(|x| *x == o))
                .map_or(0, |i| i as i32 + 1);
            let mut options = flat_options(field.options())?;
            options.retain(|o| o.name != "packed");
            let packed = field.options().flag("packed");
            fields.push(FlatField {
                name: field.name().to_string(),
                number: field.number(),
                kind,
                cardinality: match field.label() {
                    Label::Optional => Cardinality::Optional,
                    Label::Required => Cardinality::Required,
                    Label::Repeated => Cardinality::Repeated,
                },
                type_url,
                oneof_index,
                packed,
                json_name: Some(field.json_name()),
                default_value: field.default_value().map(str::to_string),
                options,
            });
        }
        let file = message.file();
        Ok(FlatType {
            name: message.full_name().to_string(),
            fields,
            oneofs: oneofs.iter().map(|o| o.name().to_string()).collect(),
            options: flat_options(message.options())?,
            source_file: Some(file.name().to_string()),
            syntax: file.syntax(),
        })
    }

    pub fn enum_as_flat(&self, descriptor: &EnumDescriptor) -> Result<FlatEnum> {
        let mut values = Vec::new();
        for value in descriptor.values() {
            values.push(FlatEnumValue {
                name: value.name().to_string(),
                number: value.number(),
                options: flat_options(value.options())?,
            });
        }
        let file = descriptor.file();
        Ok(FlatEnum {
            name: descriptor.full_name().to_string(),
            values,
            options: flat_options(descriptor.options())?,
            source_file: Some(file.name().to_string()),
            syntax: file.syntax(),
        })
    }

    pub fn service_as_api(&self, service: &ServiceDescriptor) -> Result<FlatApi> {
        let mut methods = Vec::new();
        for method in service.methods() {
            methods.push(FlatMethod {
                name: method.name().to_string(),
                request_type_url: self.compute_url(&Descriptor::Message(method.input())),
                request_streaming: method.is_client_streaming(),
                response_type_url: self.compute_url(&Descriptor::Message(method.output())),
                response_streaming: method.is_server_streaming(),
                options: flat_options(method.options())?,
            });
        }
        let file = service.file();
        Ok(FlatApi {
            name: service.full_name().to_string(),
            methods,
            options: flat_options(service.options())?,
            version: String::new(),
            source_file: Some(file.name().to_string()),
            syntax: file.syntax(),
        })
    }
}

/// Options as name/Any pairs; repeated values become one pair per element
fn flat_options(options: &Options) -> Result<Vec<FlatOption>> {
    let mut out = Vec::new();
    for entry in options.entries() {
        let name = match &entry.name {
            OptionName::Builtin(n) | OptionName::Extension(n) => n.clone(),
        };
        match &entry.value {
            crate::dynamic::Value::List(items) => {
                for item in items {
                    out.push(FlatOption::new(name.clone(), AnyEnvelope::wrap(item)?));
                }
            }
            single => out.push(FlatOption::new(name, AnyEnvelope::wrap(single)?)),
        }
    }
    for unknown in options.unknown() {
        out.push(FlatOption::new(
            unknown.name.clone(),
            AnyEnvelope::new(unknown.type_url.clone(), unknown.value.clone()),
        ));
    }
    Ok(out)
}
