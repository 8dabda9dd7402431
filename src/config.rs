//! Configuration management for the XSD repository
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (xsd-repository.toml)
//! - Environment variables (XSD_REPOSITORY__*)
//!
//! ## Example config file (xsd-repository.toml):
//! ```toml
//! [[namespace_mappings]]
//! prefix = "gml"
//! uri = "http://www.opengis.net/gml/3.2"
//!
//! [[schema_location_mappings]]
//! from = '^http://schemas\.opengis\.net/(.+)$'
//! to = 'vendor/opengis/\1'
//! pattern = true
//!
//! [loader]
//! auto_register_prefixes = true
//! max_file_size = 67108864
//!
//! [hierarchy]
//! default_depth = 10
//!
//! [merge]
//! default_strategy = "error"
//! reject_equal_priority_ties = false
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::loader::SchemaLocationMapping;
use crate::package::ConflictResolution;
use crate::repository::NamespaceMapping;
use crate::xsd::parser::DEFAULT_MAX_SIZE;

/// Main configuration for the repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Prefix bindings registered before any schema is loaded
    #[serde(default)]
    pub namespace_mappings: Vec<NamespaceMapping>,

    /// Ordered schemaLocation rewrite rules
    #[serde(default)]
    pub schema_location_mappings: Vec<SchemaLocationMapping>,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub hierarchy: HierarchyConfig,

    #[serde(default)]
    pub merge: MergeConfig,
}

/// Loader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Register root-element prefixes that are not mapped yet
    #[serde(default = "default_true")]
    pub auto_register_prefixes: bool,

    /// Largest schema file accepted, in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Ignore location-less imports of xml: and xs: namespaces
    #[serde(default = "default_true")]
    pub skip_builtin_imports: bool,
}

/// Hierarchy analysis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    #[serde(default = "default_depth")]
    pub default_depth: usize,
}

/// Package merge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Strategy for packages that do not name one
    #[serde(default)]
    pub default_strategy: ConflictResolution,

    /// Fail instead of picking the first source on equal priorities
    #[serde(default)]
    pub reject_equal_priority_ties: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_file_size() -> usize {
    DEFAULT_MAX_SIZE
}

fn default_depth() -> usize {
    10
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            auto_register_prefixes: true,
            max_file_size: default_max_file_size(),
            skip_builtin_imports: true,
        }
    }
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            default_strategy: ConflictResolution::Error,
            reject_equal_priority_ties: false,
        }
    }
}

impl RepositoryConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "xsd-repository.toml",
            ".xsd-repository.toml",
            "config/xsd-repository.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "xsd", "xsd-repository") {
            let xdg_config = config_dir.config_dir().join("xsd-repository.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // XSD_REPOSITORY__LOADER__MAX_FILE_SIZE=...
        builder = builder.add_source(
            Environment::with_prefix("XSD_REPOSITORY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
