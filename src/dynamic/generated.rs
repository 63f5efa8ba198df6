//! Compiled message types
//!
//! Types generated ahead of time (here: anything implementing
//! [`prost::Message`]) are exposed to the registry through the
//! [`CompiledTypes`] trait. When a type URL names a compiled type, Any
//! payloads decode into the concrete Rust value instead of a
//! [`DynamicMessage`](super::DynamicMessage).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use super::Message;
use crate::descriptor::{DescriptorPool, EnumDescriptor, MessageDescriptor};
use crate::error::Result;
use crate::wellknown;

/// A prost-generated value paired with its descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    value: T,
    descriptor: MessageDescriptor,
}

impl<T> Generated<T> {
    pub fn new(value: T, descriptor: MessageDescriptor) -> Self {
        Self { value, descriptor }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: prost::Message + 'static> Message for Generated<T> {
    fn descriptor(&self) -> MessageDescriptor {
        self.descriptor.clone()
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        prost::Message::encode_to_vec(&self.value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Source of compiled descriptors and their concrete decoders
pub trait CompiledTypes: Send + Sync {
    fn find_message(&self, full_name: &str) -> Option<MessageDescriptor>;

    fn find_enum(&self, full_name: &str) -> Option<EnumDescriptor>;

    /// Decode `bytes` into the compiled type for `descriptor`.
    ///
    /// `None` means no concrete type exists and the caller should fall back
    /// to a dynamic message.
    fn decode(&self, descriptor: &MessageDescriptor, bytes: &[u8]) -> Option<Result<Box<dyn Message>>> {
        let _ = (descriptor, bytes);
        None
    }
}

type DecodeFn = Arc<dyn Fn(&[u8], MessageDescriptor) -> Result<Box<dyn Message>> + Send + Sync>;

/// Descriptor pool plus decoders for prost-generated types
#[derive(Clone)]
pub struct GeneratedTypes {
    pool: DescriptorPool,
    decoders: HashMap<String, DecodeFn>,
}

impl fmt::Debug for GeneratedTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.decoders.keys().collect();
        names.sort();
        f.debug_struct("GeneratedTypes")
            .field("pool", &self.pool)
            .field("decoders", &names)
            .finish()
    }
}

static WELL_KNOWN: LazyLock<Arc<GeneratedTypes>> = LazyLock::new(|| {
    let mut types = GeneratedTypes::new(wellknown::pool().clone());
    types.register::<wellknown::Duration>("google.protobuf.Duration");
    types.register::<wellknown::Timestamp>("google.protobuf.Timestamp");
    types.register::<wellknown::Empty>("google.protobuf.Empty");
    Arc::new(types)
});

impl GeneratedTypes {
    pub fn new(pool: DescriptorPool) -> Self {
        Self {
            pool,
            decoders: HashMap::new(),
        }
    }

    /// The well-known types with concrete Rust counterparts
    pub fn well_known() -> Arc<GeneratedTypes> {
        WELL_KNOWN.clone()
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Decode messages named `full_name` into `T`
    pub fn register<T>(&mut self, full_name: impl Into<String>)
    where
        T: prost::Message + Default + 'static,
    {
        let decode: DecodeFn = Arc::new(|bytes, descriptor| {
            let value = T::decode(bytes)?;
            Ok(Box::new(Generated::new(value, descriptor)) as Box<dyn Message>)
        });
        self.decoders.insert(full_name.into(), decode);
    }
}

impl CompiledTypes for GeneratedTypes {
    fn find_message(&self, full_name: &str) -> Option<MessageDescriptor> {
        self.pool.get_message_by_name(full_name)
    }

    fn find_enum(&self, full_name: &str) -> Option<EnumDescriptor> {
        self.pool.get_enum_by_name(full_name)
    }

    fn decode(&self, descriptor: &MessageDescriptor, bytes: &[u8]) -> Option<Result<Box<dyn Message>>> {
        let decode = self.decoders.get(descriptor.full_name())?;
        Some(decode(bytes, descriptor.clone()))
    }
}
