//! Package Store & Bundles
//!
//! A bundle is a self-contained schema set: metadata, the schema files and
//! the serialized type index. `DirectoryStore` keeps one bundle per
//! directory:
//!
//! ```text
//! <bundle>/metadata.json
//! <bundle>/index.json
//! <bundle>/schemas/<bundle-relative path>
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::checksum::Checksum;
use crate::config::RepositoryConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, SchemaError};
use crate::loader::location::{is_absolute, normalize_location};
use crate::loader::{Loader, MemorySource, SchemaCache, SchemaLocationMapping};
use crate::repository::{NamespaceMapping, Repository, SerializedIndexEntry};
use crate::version::{FormatVersion, BUNDLE_FORMAT, CURRENT_FORMAT_VERSION};

const METADATA_FILE: &str = "metadata.json";
const INDEX_FILE: &str = "index.json";
const SCHEMAS_DIR: &str = "schemas";

// =============================================================================
// Bundle Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub format: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Registered entry files, bundle-relative
    pub files: Vec<String>,
    pub namespace_mappings: Vec<NamespaceMapping>,
    pub schema_location_mappings: Vec<SchemaLocationMapping>,
    /// Old to new namespace URIs applied before bundling
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub namespace_aliases: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checksums: BTreeMap<String, Checksum>,
}

impl BundleMetadata {
    pub fn new(name: Option<String>) -> Self {
        Self {
            format: BUNDLE_FORMAT.to_string(),
            version: CURRENT_FORMAT_VERSION.to_string(),
            name,
            description: None,
            created_at: Some(Utc::now()),
            files: Vec::new(),
            namespace_mappings: Vec::new(),
            schema_location_mappings: Vec::new(),
            namespace_aliases: BTreeMap::new(),
            checksums: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
    /// Bundle-relative path with `/` separators
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub metadata: BundleMetadata,
    pub files: Vec<BundleFile>,
    pub index: Vec<SerializedIndexEntry>,
}

impl Bundle {
    pub fn file(&self, path: &str) -> Option<&BundleFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Check format, version, file references, checksums and location
    /// targets. Every error is collected before failing; relative targets
    /// that are missing from the bundle are only warnings.
    pub fn check(&self, bundle_path: &str) -> Result<Diagnostics> {
        let mut errors = Vec::new();
        let mut warnings = Diagnostics::new();
        let metadata = &self.metadata;

        if metadata.format != BUNDLE_FORMAT {
            errors.push(format!(
                "unsupported format '{}' (expected '{}')",
                metadata.format, BUNDLE_FORMAT
            ));
        }
        let version = match FormatVersion::parse(&metadata.version) {
            Ok(version) => Some(version),
            Err(e) => {
                errors.push(format!("invalid version '{}': {}", metadata.version, e));
                None
            }
        };

        let paths: BTreeSet<&str> = self.files.iter().map(|f| f.path.as_str()).collect();
        for file in &metadata.files {
            if !paths.contains(file.as_str()) {
                errors.push(format!("registered file '{}' is missing from the bundle", file));
            }
        }

        for mapping in &metadata.schema_location_mappings {
            if is_absolute(&mapping.to) {
                errors.push(format!(
                    "schema location mapping '{}' points outside the bundle: '{}'",
                    mapping.from, mapping.to
                ));
            } else if !has_group_reference(mapping) && !paths.contains(normalize_location(&mapping.to).as_str()) {
                warnings.ambiguous_location_target(bundle_path, &mapping.to);
            }
        }

        for (file, expected) in &metadata.checksums {
            match self.file(file) {
                Some(f) => {
                    if let Err(e) = expected.check(file, &f.content) {
                        errors.push(e.to_string());
                    }
                }
                None => errors.push(format!("checksum recorded for missing file '{}'", file)),
            }
        }

        if !errors.is_empty() {
            return Err(SchemaError::InvalidBundle {
                path: bundle_path.to_string(),
                errors,
            });
        }
        if let Some(version) = version {
            version.ensure_supported()?;
        }
        Ok(warnings)
    }
}

fn has_group_reference(mapping: &SchemaLocationMapping) -> bool {
    mapping.pattern && (mapping.to.contains('$') || mapping.to.contains('\\'))
}

/// Type-check raw metadata so every problem is reported at once
pub fn validate_metadata_value(value: &Value) -> Vec<String> {
    let Some(object) = value.as_object() else {
        return vec!["metadata must be a JSON object".to_string()];
    };

    let mut errors = Vec::new();
    let required: [(&str, fn(&Value) -> bool, &str); 5] = [
        ("format", Value::is_string, "a string"),
        ("version", Value::is_string, "a string"),
        ("files", is_string_array, "an array of strings"),
        ("namespace_mappings", Value::is_array, "an array"),
        ("schema_location_mappings", Value::is_array, "an array"),
    ];
    for (field, check, expected) in required {
        match object.get(field) {
            None => errors.push(format!("missing required field '{}'", field)),
            Some(v) if !check(v) => errors.push(format!("field '{}' must be {}", field, expected)),
            Some(_) => {}
        }
    }

    let optional: [(&str, fn(&Value) -> bool, &str); 5] = [
        ("name", Value::is_string, "a string"),
        ("description", Value::is_string, "a string"),
        ("created_at", Value::is_string, "a string"),
        ("checksums", Value::is_object, "an object"),
        ("namespace_aliases", Value::is_object, "an object"),
    ];
    for (field, check, expected) in optional {
        if let Some(v) = object.get(field) {
            if !v.is_null() && !check(v) {
                errors.push(format!("field '{}' must be {}", field, expected));
            }
        }
    }

    errors
}

fn is_string_array(value: &Value) -> bool {
    value
        .as_array()
        .map(|items| items.iter().all(Value::is_string))
        .unwrap_or(false)
}

// =============================================================================
// Package Store
// =============================================================================

/// Reads and writes bundles
pub trait PackageStore {
    fn exists(&self, path: &Path) -> bool;

    fn read_bundle(&self, path: &Path) -> Result<Bundle>;

    fn write_bundle(&self, path: &Path, bundle: &Bundle) -> Result<()>;
}

/// One bundle per directory
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryStore;

impl PackageStore for DirectoryStore {
    fn exists(&self, path: &Path) -> bool {
        path.join(METADATA_FILE).is_file()
    }

    fn read_bundle(&self, path: &Path) -> Result<Bundle> {
        if !self.exists(path) {
            return Err(SchemaError::config(format!(
                "package bundle not found: {}",
                path.display()
            )));
        }
        let bundle_path = path.display().to_string();

        let raw: Value = serde_json::from_str(&fs::read_to_string(path.join(METADATA_FILE))?)?;
        let errors = validate_metadata_value(&raw);
        if !errors.is_empty() {
            return Err(SchemaError::InvalidBundle {
                path: bundle_path,
                errors,
            });
        }
        let metadata: BundleMetadata = serde_json::from_value(raw).map_err(|e| SchemaError::InvalidBundle {
            path: bundle_path.clone(),
            errors: vec![e.to_string()],
        })?;

        let index_path = path.join(INDEX_FILE);
        let index = if index_path.is_file() {
            serde_json::from_str(&fs::read_to_string(&index_path)?)?
        } else {
            tracing::warn!(bundle = %bundle_path, "Bundle has no index.json");
            Vec::new()
        };

        let schemas_dir = path.join(SCHEMAS_DIR);
        let mut files = Vec::new();
        for entry in WalkDir::new(&schemas_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.path().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&schemas_dir) else {
                continue;
            };
            files.push(BundleFile {
                path: relative.to_string_lossy().replace('\\', "/"),
                content: fs::read_to_string(entry.path())?,
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::debug!(bundle = %bundle_path, files = files.len(), "Read bundle");
        Ok(Bundle { metadata, files, index })
    }

    fn write_bundle(&self, path: &Path, bundle: &Bundle) -> Result<()> {
        let schemas_dir = path.join(SCHEMAS_DIR);
        fs::create_dir_all(&schemas_dir)?;

        for file in &bundle.files {
            let target = bundle_file_path(&schemas_dir, &file.path)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &file.content)?;
        }

        fs::write(path.join(INDEX_FILE), serde_json::to_string_pretty(&bundle.index)?)?;
        fs::write(path.join(METADATA_FILE), serde_json::to_string_pretty(&bundle.metadata)?)?;

        tracing::info!(bundle = %path.display(), files = bundle.files.len(), "Wrote bundle");
        Ok(())
    }
}

fn bundle_file_path(schemas_dir: &Path, relative: &str) -> Result<PathBuf> {
    let normalized = normalize_location(relative);
    if is_absolute(relative) || normalized.split('/').any(|s| s == "..") {
        return Err(SchemaError::config(format!(
            "bundle file '{}' escapes the bundle directory",
            relative
        )));
    }
    Ok(schemas_dir.join(normalized))
}

// =============================================================================
// Repository <-> Bundle
// =============================================================================

impl Repository {
    /// Bundle every loaded document with paths relative to their common
    /// directory
    pub fn to_bundle(&self, name: Option<&str>) -> Result<Bundle> {
        let root = common_directory(self.documents.iter().map(|d| d.location()));
        let relative = |location: &str| -> String {
            let normalized = normalize_location(location);
            normalized
                .strip_prefix(root.as_str())
                .unwrap_or(&normalized)
                .trim_start_matches('/')
                .to_string()
        };

        let mut metadata = BundleMetadata::new(name.map(String::from));
        let mut files = Vec::with_capacity(self.documents.len());
        for document in &self.documents {
            let path = relative(document.location());
            if files.iter().any(|f: &BundleFile| f.path == path) {
                return Err(SchemaError::config(format!("two documents share bundle path '{}'", path)));
            }
            metadata.checksums.insert(path.clone(), Checksum::of(document.source()));
            files.push(BundleFile {
                path,
                content: document.source().to_string(),
            });
        }

        metadata.files = self.files.iter().map(|f| relative(f.as_str())).collect();
        metadata.namespace_mappings = self.namespace_mappings.clone();
        metadata.namespace_aliases = self.namespace_aliases.clone();
        metadata.schema_location_mappings = self
            .location_mappings
            .iter()
            .map(|mapping| {
                let mut mapping = mapping.clone();
                if !mapping.pattern {
                    let target = normalize_location(&mapping.to);
                    let known = self
                        .documents
                        .iter()
                        .map(|d| normalize_location(d.location()))
                        .find(|loc| loc == &target || loc.ends_with(&format!("/{}", target)));
                    if let Some(location) = known {
                        mapping.to = relative(location.as_str());
                    }
                }
                mapping
            })
            .collect();

        let index = self.index.to_serialized(|location| relative(location));
        Ok(Bundle { metadata, files, index })
    }

    /// Rebuild a repository from a bundle through an in-memory loader.
    ///
    /// Differences between the stored and the rebuilt index are recorded as
    /// `IndexMismatch` diagnostics.
    pub fn from_bundle(bundle: &Bundle, bundle_path: &str, config: &RepositoryConfig) -> Result<Repository> {
        let warnings = bundle.check(bundle_path)?;

        let mut source = MemorySource::new();
        for file in &bundle.files {
            source.insert(&file.path, file.content.clone());
        }

        let entries: Vec<String> = if bundle.metadata.files.is_empty() {
            bundle
                .files
                .iter()
                .filter(|f| f.path.ends_with(".xsd"))
                .map(|f| f.path.clone())
                .collect()
        } else {
            bundle.metadata.files.clone()
        };

        let mut cache = SchemaCache::new();
        let loaded = Loader::from_config(&source, config)?
            .with_namespace_mappings(bundle.metadata.namespace_mappings.clone())
            .with_location_mappings(bundle.metadata.schema_location_mappings.clone())?
            .load(&entries, &mut cache)
            .map_err(|e| match e {
                SchemaError::Load { location, reason } => SchemaError::InvalidBundle {
                    path: bundle_path.to_string(),
                    errors: vec![format!("{}: {}", location, reason)],
                },
                other => other,
            })?;

        let mut repository = loaded.with_namespace_uris(&bundle.metadata.namespace_aliases);
        repository.diagnostics.merge(warnings);

        if !bundle.index.is_empty() {
            let stored: BTreeSet<&SerializedIndexEntry> = bundle.index.iter().collect();
            let rebuilt = repository.index.to_serialized(|location| location.to_string());
            let rebuilt: BTreeSet<&SerializedIndexEntry> = rebuilt.iter().collect();

            for missing in stored.difference(&rebuilt) {
                repository.diagnostics.index_mismatch(
                    bundle_path,
                    format!("Stored index entry {} {} ({}) not found after reload", missing.category, entry_name(missing), missing.file),
                );
            }
            for extra in rebuilt.difference(&stored) {
                repository.diagnostics.index_mismatch(
                    bundle_path,
                    format!("Reloaded declaration {} {} ({}) missing from stored index", extra.category, entry_name(extra), extra.file),
                );
            }
        }

        Ok(repository)
    }
}

fn entry_name(entry: &SerializedIndexEntry) -> String {
    match &entry.namespace {
        Some(ns) => format!("{{{}}}{}", ns, entry.name),
        None => entry.name.clone(),
    }
}

/// Longest shared directory prefix of normalized locations
fn common_directory<'a>(locations: impl Iterator<Item = &'a str>) -> String {
    let mut common: Option<Vec<String>> = None;

    for location in locations {
        let normalized = normalize_location(location);
        let mut segments: Vec<String> = normalized.split('/').map(String::from).collect();
        segments.pop();
        common = Some(match common {
            None => segments,
            Some(prev) => prev
                .into_iter()
                .zip(segments)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }

    let segments = common.unwrap_or_default();
    if segments.is_empty() {
        String::new()
    } else {
        format!("{}/", segments.join("/"))
    }
}
