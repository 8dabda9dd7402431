//! Schema Loading
//!
//! Loads entry schemas and everything they import, include or redefine,
//! registering each parsed document in a caller-owned [`SchemaCache`].
//! The cache is keyed by canonical location, so a physical file is parsed at
//! most once per session no matter how many documents reference it.

pub mod location;

pub use location::{LocationResolver, SchemaLocationMapping};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::{LoaderConfig, RepositoryConfig};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, SchemaError};
use crate::repository::{NamespaceMapping, Repository, RepositoryParts, UnresolvedDirective};
use crate::xsd::{parse_document, Directive, ParseOptions, SchemaDocument, XML_NAMESPACE, XS_NAMESPACE};

use location::{is_remote, join_location, normalize_location};

// =============================================================================
// Sources
// =============================================================================

/// Where schema text comes from
pub trait SchemaSource {
    /// Canonical key for a location, or `None` if nothing exists there
    fn canonicalize(&self, location: &str) -> Option<String>;

    /// Read the text stored under a canonical key
    fn read(&self, canonical: &str) -> std::io::Result<String>;
}

/// Reads schemas from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemSource;

impl SchemaSource for FileSystemSource {
    fn canonicalize(&self, location: &str) -> Option<String> {
        let path = fs::canonicalize(location).ok()?;
        path.is_file().then(|| path.to_string_lossy().into_owned())
    }

    fn read(&self, canonical: &str) -> std::io::Result<String> {
        fs::read_to_string(canonical)
    }
}

/// Schemas held in memory, keyed by normalized relative path
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl AsRef<str>, content: impl Into<String>) {
        self.files.insert(normalize_location(path.as_ref()), content.into());
    }

    pub fn with(mut self, path: impl AsRef<str>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

impl SchemaSource for MemorySource {
    fn canonicalize(&self, location: &str) -> Option<String> {
        let key = normalize_location(location);
        self.files.contains_key(&key).then_some(key)
    }

    fn read(&self, canonical: &str) -> std::io::Result<String> {
        self.files.get(canonical).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("{} not in memory source", canonical))
        })
    }
}

// =============================================================================
// Session Cache
// =============================================================================

/// Session arena of parsed documents keyed by canonical location
#[derive(Debug, Default)]
pub struct SchemaCache {
    documents: HashMap<String, Arc<SchemaDocument>>,
    parse_count: usize,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, canonical: &str) -> Option<&Arc<SchemaDocument>> {
        self.documents.get(canonical)
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.documents.contains_key(canonical)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of documents parsed since the last reset
    pub fn parse_count(&self) -> usize {
        self.parse_count
    }

    /// Start a new session
    pub fn reset(&mut self) {
        self.documents.clear();
        self.parse_count = 0;
    }

    fn insert(&mut self, document: Arc<SchemaDocument>) {
        self.parse_count += 1;
        self.documents.insert(document.location().to_string(), document);
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Loader behaviour switches
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub parse: ParseOptions,
    /// Register prefixes declared on schema roots when not already mapped
    pub auto_register_prefixes: bool,
    /// Skip location-less imports of the XML and XMLSchema namespaces
    pub skip_builtin_imports: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self::from(&LoaderConfig::default())
    }
}

impl From<&LoaderConfig> for LoaderOptions {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            parse: ParseOptions {
                max_size: config.max_file_size,
            },
            auto_register_prefixes: config.auto_register_prefixes,
            skip_builtin_imports: config.skip_builtin_imports,
        }
    }
}

/// Per-call traversal state
#[derive(Default)]
struct LoadSession {
    visited: HashSet<String>,
    documents: Vec<Arc<SchemaDocument>>,
    diagnostics: Diagnostics,
    unresolved: Vec<UnresolvedDirective>,
}

/// Resolves and loads schema graphs into repositories
pub struct Loader<'s> {
    source: &'s dyn SchemaSource,
    resolver: LocationResolver,
    location_mappings: Vec<SchemaLocationMapping>,
    namespace_mappings: Vec<NamespaceMapping>,
    options: LoaderOptions,
}

impl<'s> Loader<'s> {
    pub fn new(source: &'s dyn SchemaSource) -> Self {
        Self {
            source,
            resolver: LocationResolver::default(),
            location_mappings: Vec::new(),
            namespace_mappings: Vec::new(),
            options: LoaderOptions::default(),
        }
    }

    /// Loader configured from a [`RepositoryConfig`]
    pub fn from_config(source: &'s dyn SchemaSource, config: &RepositoryConfig) -> Result<Self> {
        Self::new(source)
            .with_options(LoaderOptions::from(&config.loader))
            .with_namespace_mappings(config.namespace_mappings.clone())
            .with_location_mappings(config.schema_location_mappings.clone())
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_namespace_mappings(mut self, mappings: Vec<NamespaceMapping>) -> Self {
        self.namespace_mappings = mappings;
        self
    }

    /// Install location rules; fails on invalid patterns or templates
    pub fn with_location_mappings(mut self, mappings: Vec<SchemaLocationMapping>) -> Result<Self> {
        self.resolver = LocationResolver::new(&mappings)?;
        self.location_mappings = mappings;
        Ok(self)
    }

    /// Load entry schemas and their dependency graph
    pub fn load<S: AsRef<str>>(&self, entries: &[S], cache: &mut SchemaCache) -> Result<Repository> {
        let mut session = LoadSession::default();
        let mut files = Vec::with_capacity(entries.len());

        for entry in entries {
            let entry = entry.as_ref();
            let canonical = self.source.canonicalize(entry).ok_or_else(|| SchemaError::Load {
                location: entry.to_string(),
                reason: "schema not found".to_string(),
            })?;
            let document = self.fetch(&canonical, cache).map_err(|reason| SchemaError::Load {
                location: entry.to_string(),
                reason,
            })?;
            if !files.contains(&canonical) {
                files.push(canonical);
            }
            self.visit(document, cache, &mut session);
        }

        tracing::info!(
            entries = files.len(),
            documents = session.documents.len(),
            parsed = cache.parse_count(),
            "Loaded schema set"
        );

        let namespace_mappings = self.collect_namespace_mappings(&session.documents);

        Ok(Repository::build(RepositoryParts {
            files,
            namespace_mappings,
            location_mappings: self.location_mappings.clone(),
            documents: session.documents,
            namespace_aliases: BTreeMap::new(),
            diagnostics: session.diagnostics,
            unresolved: session.unresolved,
        }))
    }

    /// Load every `.xsd` file below a directory as an entry
    pub fn load_directory(&self, dir: &Path, cache: &mut SchemaCache) -> Result<Repository> {
        let mut entries: Vec<String> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter(|e| e.path().extension().map(|ext| ext == "xsd").unwrap_or(false))
            .map(|e| e.path().to_string_lossy().into_owned())
            .collect();
        entries.sort();

        if entries.is_empty() {
            return Err(SchemaError::Load {
                location: dir.display().to_string(),
                reason: "no .xsd files found".to_string(),
            });
        }
        self.load(&entries, cache)
    }

    fn fetch(&self, canonical: &str, cache: &mut SchemaCache) -> std::result::Result<Arc<SchemaDocument>, String> {
        if let Some(document) = cache.get(canonical) {
            return Ok(document.clone());
        }

        let text = self.source.read(canonical).map_err(|e| e.to_string())?;
        let document = Arc::new(parse_document(canonical, Arc::from(text), &self.options.parse)?);
        tracing::debug!(
            location = canonical,
            declarations = document.declarations().len(),
            directives = document.directives().len(),
            "Parsed schema"
        );
        cache.insert(document.clone());
        Ok(document)
    }

    fn visit(&self, document: Arc<SchemaDocument>, cache: &mut SchemaCache, session: &mut LoadSession) {
        if !session.visited.insert(document.location().to_string()) {
            return;
        }
        session.documents.push(document.clone());

        for directive in document.directives() {
            let Some(hint) = directive.location.as_deref() else {
                if !self.is_skippable_import(directive) {
                    tracing::debug!(
                        from = document.location(),
                        namespace = directive.namespace.as_deref().unwrap_or(""),
                        "Import without schemaLocation"
                    );
                }
                continue;
            };
            if self.is_skippable_import(directive) && self.resolver.map(hint).is_none() {
                continue;
            }

            let target = self.resolver.map(hint).unwrap_or_else(|| {
                if is_remote(hint) {
                    hint.to_string()
                } else {
                    join_location(document.location(), hint)
                }
            });

            let canonical = match (is_remote(&target), self.source.canonicalize(&target)) {
                (false, Some(canonical)) => canonical,
                _ => {
                    session.diagnostics.unresolved_location(hint, document.location());
                    session.unresolved.push(UnresolvedDirective {
                        from: document.location().to_string(),
                        kind: directive.kind,
                        hint: hint.to_string(),
                        reason: "location could not be resolved".to_string(),
                    });
                    continue;
                }
            };

            match self.fetch(&canonical, cache) {
                Ok(child) => self.visit(child, cache, session),
                Err(reason) => {
                    session
                        .diagnostics
                        .unreachable_dependency(&canonical, document.location(), &reason);
                    session.unresolved.push(UnresolvedDirective {
                        from: document.location().to_string(),
                        kind: directive.kind,
                        hint: hint.to_string(),
                        reason,
                    });
                }
            }
        }
    }

    fn is_skippable_import(&self, directive: &Directive) -> bool {
        self.options.skip_builtin_imports
            && matches!(directive.namespace.as_deref(), Some(XML_NAMESPACE) | Some(XS_NAMESPACE))
    }

    fn collect_namespace_mappings(&self, documents: &[Arc<SchemaDocument>]) -> Vec<NamespaceMapping> {
        let mut mappings = self.namespace_mappings.clone();
        if !self.options.auto_register_prefixes {
            return mappings;
        }

        for document in documents {
            for (prefix, uri) in document.namespaces() {
                let taken = mappings.iter().any(|m| &m.prefix == prefix || &m.uri == uri);
                if !taken {
                    mappings.push(NamespaceMapping::new(prefix, uri));
                }
            }
        }
        mappings
    }
}
