//! Configuration for the type registry and the printer
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (proto-descriptors.toml)
//! - Environment variables (PROTO_DESCRIPTORS__*)
//!
//! ## Example config file (proto-descriptors.toml):
//! ```toml
//! [registry]
//! default_base_url = "type.googleapis.com/"
//! include_defaults = false
//! retain_unknown_options = true
//!
//! [printer]
//! indent = "    "
//! comments = "doc_only"
//! sort_elements = true
//!
//! [printer.compact]
//! short_options_count = 3
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::DEFAULT_BASE_URL;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflectConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub printer: PrinterConfig,
}

/// Type registry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL used when no per-package or per-type override applies
    #[serde(default = "default_base_url")]
    pub default_base_url: String,

    /// Consult the compiled well-known types by bare name
    #[serde(default)]
    pub include_defaults: bool,

    /// Keep options with unrecognized names as opaque unknown options
    #[serde(default = "default_true")]
    pub retain_unknown_options: bool,
}

/// Which comments the printer emits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentPolicy {
    #[default]
    All,
    /// Leading comments only
    DocOnly,
    Omit,
}

/// Thresholds below which option lists and message literals stay on one line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Maximum number of options in a single-line bracketed list; 0 always expands
    #[serde(default = "default_short_options_count")]
    pub short_options_count: usize,

    /// Maximum rendered length of a single-line bracketed list
    #[serde(default = "default_short_options_length")]
    pub short_options_length: usize,

    /// Maximum rendered length of a single-line message literal
    #[serde(default = "default_message_literal_length")]
    pub message_literal_length: usize,
}

/// Printer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterConfig {
    #[serde(default = "default_indent")]
    pub indent: String,

    #[serde(default)]
    pub comments: CommentPolicy,

    /// Drop comments separated from their element by a blank line
    #[serde(default)]
    pub omit_detached_comments: bool,

    /// Print trailing comments on the line after their element
    #[serde(default)]
    pub trailing_comments_on_separate_line: bool,

    /// Use one `/* */` block instead of `//` per line
    #[serde(default)]
    pub prefer_multiline_comments: bool,

    /// Sort siblings with the built-in comparator instead of declaration order
    #[serde(default)]
    pub sort_elements: bool,

    #[serde(default)]
    pub compact: CompactionConfig,
}

// Default value functions
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_indent() -> String {
    "  ".to_string()
}

fn default_short_options_count() -> usize {
    3
}

fn default_short_options_length() -> usize {
    50
}

fn default_message_literal_length() -> usize {
    50
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_base_url: default_base_url(),
            include_defaults: false,
            retain_unknown_options: true,
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            short_options_count: default_short_options_count(),
            short_options_length: default_short_options_length(),
            message_literal_length: default_message_literal_length(),
        }
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            comments: CommentPolicy::All,
            omit_detached_comments: false,
            trailing_comments_on_separate_line: false,
            prefer_multiline_comments: false,
            sort_elements: false,
            compact: CompactionConfig::default(),
        }
    }
}

impl ReflectConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = [
            "proto-descriptors.toml",
            ".proto-descriptors.toml",
            "config/proto-descriptors.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // PROTO_DESCRIPTORS__PRINTER__INDENT and friends
        builder = builder.add_source(
            Environment::with_prefix("PROTO_DESCRIPTORS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
