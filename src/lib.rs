//! Proto Descriptors
//!
//! Runtime schema reflection for protobuf-style schemas: resolve import
//! paths and URL-style type references into a linked descriptor graph, and
//! print that graph back as canonical schema source.
//!
//! ## Features
//!
//! - **Import Resolution**: global and source-scoped import path rewriting
//! - **Type Registry**: type URL lookup, Any packing and unpacking, base URL
//!   overrides per package or type
//! - **Descriptor Synthesis**: full message, enum and service descriptors
//!   rebuilt from flat, URL-addressed metadata, cycles included
//! - **Canonical Printer**: comment-preserving schema source with
//!   configurable layout, compaction and ordering
//!
//! ## Architecture
//!
//! ```text
//! ImportResolver          (import path -> real path)
//!
//! TypeRegistry ──fetch──> TypeFetcher
//!      │
//!      └── synthesizes into ──> DescriptorPool ──> Printer ──> schema source
//! ```

pub mod config;
pub mod descriptor;
pub mod dynamic;
pub mod error;
pub mod imports;
pub mod print;
pub mod registry;
pub mod wellknown;

pub use config::{CommentPolicy, CompactionConfig, PrinterConfig, ReflectConfig, RegistryConfig};
pub use descriptor::{
    Descriptor, DescriptorKind, DescriptorPool, EnumDescriptor, FieldDescriptor, FileDescriptor,
    MessageDescriptor, ServiceDescriptor,
};
pub use dynamic::{DynamicMessage, Message, Value};
pub use error::{ReflectError, Result};
pub use imports::{register_import_path, resolve_import, ImportResolver};
pub use print::{Element, ElementKind, Printer};
pub use registry::{
    AnyEnvelope, ExtensionResolver, FlatApi, FlatDescription, TypeFetcher, TypeRegistry,
};
