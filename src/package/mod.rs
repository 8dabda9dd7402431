//! Package Sources
//!
//! A package is a pre-resolved repository loaded from a bundle, together
//! with the settings that govern how it merges with others: priority,
//! conflict strategy, namespace-URI remapping and schema filters.

pub mod conflict;
pub mod filter;
pub mod merge;
pub mod store;

pub use conflict::{
    detect_conflicts, ConflictDetector, ConflictReport, NamespaceConflict, PackageSummary,
    SchemaFileConflict, SchemaFileEntry, TypeConflict,
};
pub use filter::SchemaFilter;
pub use merge::MergeResolver;
pub use store::{Bundle, BundleFile, BundleMetadata, DirectoryStore, PackageStore};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::config::RepositoryConfig;
use crate::error::{Result, SchemaError};
use crate::repository::Repository;

/// What to do when this package declares a symbol another package declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Lowest-priority contributor wins
    Keep,
    /// Highest-priority contributor wins
    Override,
    /// Abort the merge
    #[default]
    Error,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Override => "override",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keep" => Ok(Self::Keep),
            "override" => Ok(Self::Override),
            "error" => Ok(Self::Error),
            other => Err(SchemaError::config(format!(
                "unknown conflict_resolution '{}' (expected keep, override or error)",
                other
            ))),
        }
    }
}

/// Rewrite one namespace URI of a package before merging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceUriRemap {
    pub from_uri: String,
    pub to_uri: String,
}

/// Per-package configuration in its object form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub package: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespace_remapping: Vec<NamespaceUriRemap>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_only_schemas: Vec<String>,
}

impl PackageConfig {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            priority: 0,
            conflict_resolution: None,
            namespace_remapping: Vec::new(),
            exclude_schemas: Vec::new(),
            include_only_schemas: Vec::new(),
        }
    }
}

/// A package as configured: a bare bundle path or a full object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageSpec {
    Path(String),
    Config(PackageConfig),
}

impl PackageSpec {
    /// Accept a JSON string or object
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| SchemaError::config(format!("invalid package configuration: {}", e)))
    }

    pub fn into_config(self) -> PackageConfig {
        match self {
            Self::Path(path) => PackageConfig::new(path),
            Self::Config(config) => config,
        }
    }
}

impl From<&str> for PackageSpec {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<PackageConfig> for PackageSpec {
    fn from(config: PackageConfig) -> Self {
        Self::Config(config)
    }
}

/// A merge input: repository plus arbitration settings
#[derive(Debug, Clone)]
pub struct PackageSource {
    pub package_path: String,
    pub priority: u32,
    pub strategy: ConflictResolution,
    pub namespace_remapping: Vec<NamespaceUriRemap>,
    pub filter: SchemaFilter,
    /// Repository after remapping and filtering
    pub repository: Repository,
}

impl PackageSource {
    /// Source with default settings over an already-resolved repository
    pub fn new(package_path: impl Into<String>, repository: Repository) -> Self {
        Self {
            package_path: package_path.into(),
            priority: 0,
            strategy: ConflictResolution::default(),
            namespace_remapping: Vec::new(),
            filter: SchemaFilter::default(),
            repository,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_strategy(mut self, strategy: ConflictResolution) -> Self {
        self.strategy = strategy;
        self
    }

    /// Validate a configuration and apply its remap and filters to
    /// `repository`
    pub fn from_config(config: &PackageConfig, repository: Repository, defaults: &RepositoryConfig) -> Result<Self> {
        if config.package.trim().is_empty() {
            return Err(SchemaError::config("package path must not be empty"));
        }
        let priority = u32::try_from(config.priority).map_err(|_| {
            SchemaError::config(format!(
                "priority for '{}' must be a non-negative integer, got {}",
                config.package, config.priority
            ))
        })?;
        let strategy = match &config.conflict_resolution {
            Some(s) => s.parse::<ConflictResolution>()?,
            None => defaults.merge.default_strategy,
        };
        for remap in &config.namespace_remapping {
            if remap.from_uri.is_empty() || remap.to_uri.is_empty() {
                return Err(SchemaError::config(format!(
                    "namespace remapping for '{}' needs both from_uri and to_uri",
                    config.package
                )));
            }
        }
        let filter = SchemaFilter::new(&config.exclude_schemas, &config.include_only_schemas)?;

        let remaps: BTreeMap<String, String> = config
            .namespace_remapping
            .iter()
            .map(|r| (r.from_uri.clone(), r.to_uri.clone()))
            .collect();
        let remapped = repository.with_namespace_uris(&remaps);
        let repository = if filter.is_empty() {
            remapped
        } else {
            remapped.retain_documents(|document| filter.accepts(document.location()))
        };

        Ok(Self {
            package_path: config.package.clone(),
            priority,
            strategy,
            namespace_remapping: config.namespace_remapping.clone(),
            filter,
            repository,
        })
    }

    /// Normalize a spec, read its bundle and prepare the repository
    pub fn load(spec: &PackageSpec, store: &dyn PackageStore, defaults: &RepositoryConfig) -> Result<Self> {
        let config = spec.clone().into_config();
        let path = Path::new(&config.package);
        if !store.exists(path) {
            return Err(SchemaError::config(format!("package bundle not found: {}", config.package)));
        }

        let bundle = store.read_bundle(path)?;
        let repository = Repository::from_bundle(&bundle, &config.package, defaults)?;
        let source = Self::from_config(&config, repository, defaults)?;

        tracing::info!(
            package = %source.package_path,
            priority = source.priority,
            strategy = %source.strategy,
            declarations = source.repository.index().len(),
            "Loaded package"
        );
        Ok(source)
    }

    /// Path of a package file as reported in conflicts
    pub fn full_path(&self, location: &str) -> String {
        format!("{}/{}", self.package_path.trim_end_matches('/'), location.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Loader, MemorySource, SchemaCache};
    use serde_json::json;

    fn repository() -> Repository {
        let source = MemorySource::new()
            .with(
                "core/main.xsd",
                r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:p">
                     <xs:include schemaLocation="extra.xsd"/>
                     <xs:complexType name="Main"/>
                   </xs:schema>"#,
            )
            .with(
                "core/extra.xsd",
                r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:p">
                     <xs:complexType name="Extra"/>
                   </xs:schema>"#,
            );
        Loader::new(&source).load(&["core/main.xsd"], &mut SchemaCache::new()).unwrap()
    }

    #[test]
    fn test_spec_forms() {
        let bare = PackageSpec::from_value(json!("bundles/a")).unwrap();
        assert_eq!(bare, PackageSpec::Path("bundles/a".into()));
        assert_eq!(bare.into_config().priority, 0);

        let full = PackageSpec::from_value(json!({
            "package": "bundles/b",
            "priority": 3,
            "conflict_resolution": "override",
            "namespace_remapping": [{"from_uri": "urn:x", "to_uri": "urn:y"}],
            "exclude_schemas": ["*_test.xsd"]
        }))
        .unwrap()
        .into_config();
        assert_eq!(full.priority, 3);
        assert_eq!(full.namespace_remapping[0].to_uri, "urn:y");

        assert!(PackageSpec::from_value(json!(42)).is_err());
    }

    #[test]
    fn test_invalid_configs() {
        let defaults = RepositoryConfig::default();

        let mut config = PackageConfig::new("p");
        config.priority = -1;
        let err = PackageSource::from_config(&config, repository(), &defaults).unwrap_err();
        assert!(err.to_string().contains("non-negative"));

        let mut config = PackageConfig::new("p");
        config.conflict_resolution = Some("merge".into());
        let err = PackageSource::from_config(&config, repository(), &defaults).unwrap_err();
        assert!(matches!(err, SchemaError::Configuration(_)));
    }

    #[test]
    fn test_default_strategy_from_config() {
        let mut defaults = RepositoryConfig::default();
        defaults.merge.default_strategy = ConflictResolution::Keep;
        let source = PackageSource::from_config(&PackageConfig::new("p"), repository(), &defaults).unwrap();
        assert_eq!(source.strategy, ConflictResolution::Keep);
    }

    #[test]
    fn test_remap_and_filter_applied() {
        let mut config = PackageConfig::new("p");
        config.namespace_remapping.push(NamespaceUriRemap {
            from_uri: "urn:p".into(),
            to_uri: "urn:q".into(),
        });
        config.exclude_schemas.push("extra.xsd".into());

        let source = PackageSource::from_config(&config, repository(), &RepositoryConfig::default()).unwrap();
        assert_eq!(source.repository.all_namespaces(), vec!["urn:q".to_string()]);
        assert_eq!(source.repository.all_type_names(Some("urn:q")), vec!["Main".to_string()]);
        assert_eq!(source.full_path("core/main.xsd"), "p/core/main.xsd");
    }

    #[test]
    fn test_missing_bundle_is_configuration_error() {
        let err = PackageSource::load(&"/nonexistent/bundle".into(), &DirectoryStore, &RepositoryConfig::default())
            .unwrap_err();
        assert!(matches!(err, SchemaError::Configuration(ref m) if m.contains("not found")));
    }
}
