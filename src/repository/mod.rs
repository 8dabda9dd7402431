//! Schema Repository
//!
//! The resolved result of a load, merge or remap: entry files, prefix
//! bindings, location rules, the shared documents and the type index built
//! over them. Repositories are never mutated by merge or remap; those
//! produce siblings that share documents and, where possible, the index.

pub mod classify;
pub mod index;
pub mod resolve;

pub use classify::{ResolutionState, SchemaClassification, SchemaRole};
pub use index::{DuplicateKey, IndexEntry, IndexKey, SerializedIndexEntry, TypeIndex};
pub use resolve::{BatchResolution, FailureKind, ResolutionFailure, ResolvedType, TypeResolutionResult};

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::diagnostics::Diagnostics;
use crate::graph::DerivationGraph;
use crate::loader::SchemaLocationMapping;
use crate::xsd::{Category, Declaration, DirectiveKind, QName, SchemaDocument};

/// A prefix bound to a namespace URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespaceMapping {
    pub prefix: String,
    pub uri: String,
}

impl NamespaceMapping {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }
}

/// A directive whose target could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedDirective {
    /// Location of the referencing document
    pub from: String,
    pub kind: DirectiveKind,
    pub hint: String,
    pub reason: String,
}

/// Aggregate counts over a repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryStatistics {
    pub entry_files: usize,
    pub documents: usize,
    pub namespaces: usize,
    pub declarations: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub unresolved_directives: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// One fuzzy search match
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub qualified_name: String,
    pub qname: QName,
    pub category: Category,
    pub location: String,
    pub score: i64,
}

/// Raw inputs for assembling a repository
pub(crate) struct RepositoryParts {
    pub files: Vec<String>,
    pub namespace_mappings: Vec<NamespaceMapping>,
    pub location_mappings: Vec<SchemaLocationMapping>,
    pub documents: Vec<Arc<SchemaDocument>>,
    pub namespace_aliases: BTreeMap<String, String>,
    pub diagnostics: Diagnostics,
    pub unresolved: Vec<UnresolvedDirective>,
}

#[derive(Debug, Clone)]
pub struct Repository {
    pub(crate) files: Vec<String>,
    pub(crate) namespace_mappings: Vec<NamespaceMapping>,
    pub(crate) location_mappings: Vec<SchemaLocationMapping>,
    pub(crate) documents: Vec<Arc<SchemaDocument>>,
    pub(crate) index: Arc<TypeIndex>,
    pub(crate) namespace_aliases: BTreeMap<String, String>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) unresolved: Vec<UnresolvedDirective>,
    pub(crate) resolved: bool,
    pub(crate) validated: bool,
}

// =============================================================================
// Construction
// =============================================================================

impl Repository {
    /// Index the documents and record duplicate and cyclic declarations
    pub(crate) fn build(parts: RepositoryParts) -> Self {
        let aliases = parts.namespace_aliases.clone();
        let (index, duplicates) =
            TypeIndex::build(&parts.documents, |ns| apply_alias(&aliases, ns));

        let mut diagnostics = parts.diagnostics;
        for duplicate in duplicates {
            diagnostics.duplicate_declaration(
                &duplicate.location,
                &format!("{} {}", duplicate.key.category, duplicate.key.qname()),
                &duplicate.first_location,
            );
        }

        Self::assemble(RepositoryParts { diagnostics, ..parts }, index)
    }

    /// Wrap an already-built index
    pub(crate) fn assemble(parts: RepositoryParts, index: TypeIndex) -> Self {
        let mut repository = Self {
            files: parts.files,
            namespace_mappings: parts.namespace_mappings,
            location_mappings: parts.location_mappings,
            documents: parts.documents,
            index: Arc::new(index),
            namespace_aliases: parts.namespace_aliases,
            diagnostics: parts.diagnostics,
            unresolved: parts.unresolved,
            resolved: true,
            validated: false,
        };

        for cycle in DerivationGraph::build(&repository).cycles() {
            let members: Vec<String> = cycle.iter().map(QName::to_string).collect();
            repository.diagnostics.circular_derivation(&members);
        }
        repository
    }

    fn parts(&self) -> RepositoryParts {
        RepositoryParts {
            files: self.files.clone(),
            namespace_mappings: self.namespace_mappings.clone(),
            location_mappings: self.location_mappings.clone(),
            documents: self.documents.clone(),
            namespace_aliases: self.namespace_aliases.clone(),
            diagnostics: Diagnostics::new(),
            unresolved: self.unresolved.clone(),
        }
    }

    /// Sibling repository restricted to documents accepted by `keep`.
    ///
    /// Entry files and unresolved directives of dropped documents go too.
    pub fn retain_documents<F>(&self, keep: F) -> Repository
    where
        F: Fn(&SchemaDocument) -> bool,
    {
        let documents: Vec<_> = self.documents.iter().filter(|d| keep(d)).cloned().collect();
        let kept: HashSet<&str> = documents.iter().map(|d| d.location()).collect();

        let mut parts = self.parts();
        parts.files.retain(|f| kept.contains(f.as_str()));
        parts.unresolved.retain(|u| kept.contains(u.from.as_str()));
        parts.documents = documents.clone();
        parts.diagnostics = self.diagnostics_not_about(Some(&kept));

        let mut repository = Repository::build(parts);
        repository.validated = self.validated;
        repository
    }

    /// Sibling repository whose declarations are indexed under new namespace
    /// URIs. Base-type references to an old URI follow it to the new one.
    pub fn with_namespace_uris(&self, remaps: &BTreeMap<String, String>) -> Repository {
        if remaps.is_empty() {
            return self.clone();
        }

        let mut aliases: BTreeMap<String, String> = self
            .namespace_aliases
            .iter()
            .map(|(from, to)| (from.clone(), remaps.get(to).cloned().unwrap_or_else(|| to.clone())))
            .collect();
        for (from, to) in remaps {
            aliases.entry(from.clone()).or_insert_with(|| to.clone());
        }

        let mut parts = self.parts();
        parts.namespace_aliases = aliases;
        for mapping in &mut parts.namespace_mappings {
            if let Some(to) = remaps.get(&mapping.uri) {
                mapping.uri = to.clone();
            }
        }
        parts.namespace_mappings = dedup_mappings(parts.namespace_mappings);
        parts.diagnostics = self.diagnostics_not_about(None);

        let mut repository = Repository::build(parts);
        repository.validated = self.validated;
        repository
    }

    /// Diagnostics except those recomputed by `build`. With `kept`, load
    /// findings raised from a dropped document go too.
    fn diagnostics_not_about(&self, kept: Option<&HashSet<&str>>) -> Diagnostics {
        use crate::diagnostics::DiagnosticCode;

        let mut diagnostics = Diagnostics::new();
        for item in &self.diagnostics {
            let recomputed = matches!(
                item.code,
                DiagnosticCode::DuplicateDeclaration | DiagnosticCode::CircularDerivation
            );
            let dropped = match kept {
                Some(kept) => {
                    matches!(
                        item.code,
                        DiagnosticCode::UnreachableDependency | DiagnosticCode::UnresolvedLocation
                    ) && !item.referenced_from().is_some_and(|from| kept.contains(from))
                }
                None => false,
            };
            if !recomputed && !dropped {
                diagnostics.push(item.clone());
            }
        }
        diagnostics
    }
}

fn apply_alias(aliases: &BTreeMap<String, String>, namespace: Option<&str>) -> Option<String> {
    namespace.map(|ns| aliases.get(ns).cloned().unwrap_or_else(|| ns.to_string()))
}

/// Drop exact duplicate bindings, keeping first occurrences
fn dedup_mappings(mappings: Vec<NamespaceMapping>) -> Vec<NamespaceMapping> {
    let mut seen = HashSet::new();
    mappings
        .into_iter()
        .filter(|m| seen.insert((m.prefix.clone(), m.uri.clone())))
        .collect()
}

// =============================================================================
// Accessors
// =============================================================================

impl Repository {
    /// Entry files the repository was loaded from
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn namespace_mappings(&self) -> &[NamespaceMapping] {
        &self.namespace_mappings
    }

    pub fn schema_location_mappings(&self) -> &[SchemaLocationMapping] {
        &self.location_mappings
    }

    /// Every loaded document in discovery order
    pub fn documents(&self) -> &[Arc<SchemaDocument>] {
        &self.documents
    }

    pub fn index(&self) -> &TypeIndex {
        &self.index
    }

    /// Shared handle on the index
    pub fn index_arc(&self) -> &Arc<TypeIndex> {
        &self.index
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn unresolved_directives(&self) -> &[UnresolvedDirective] {
        &self.unresolved
    }

    /// Old to new namespace URIs applied by package remapping
    pub fn namespace_aliases(&self) -> &BTreeMap<String, String> {
        &self.namespace_aliases
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Mark the repository validated when no error diagnostics were recorded
    pub fn validate(&mut self) -> bool {
        self.validated = !self.diagnostics.has_errors();
        self.validated
    }

    pub fn uri_for(&self, prefix: &str) -> Option<&str> {
        self.namespace_mappings
            .iter()
            .find(|m| m.prefix == prefix)
            .map(|m| m.uri.as_str())
    }

    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.namespace_mappings
            .iter()
            .find(|m| m.uri == uri)
            .map(|m| m.prefix.as_str())
    }

    /// Namespace URI after package remapping
    pub fn canonical_namespace(&self, namespace: Option<&str>) -> Option<String> {
        apply_alias(&self.namespace_aliases, namespace)
    }

    pub fn canonical_qname(&self, qname: &QName) -> QName {
        QName::new(self.canonical_namespace(qname.namespace.as_deref()).as_deref(), qname.local.as_str())
    }

    /// `prefix:local` when a prefix maps the namespace, Clark notation otherwise
    pub fn display_name(&self, qname: &QName) -> String {
        match qname.namespace.as_deref().and_then(|ns| self.prefix_for(ns)) {
            Some(prefix) => format!("{}:{}", prefix, qname.local),
            None => qname.clark(),
        }
    }
}

// =============================================================================
// Validator-facing Lookups
// =============================================================================

impl Repository {
    /// Namespace URIs that own at least one declaration
    pub fn all_namespaces(&self) -> Vec<String> {
        self.index
            .namespaces()
            .into_iter()
            .flatten()
            .map(String::from)
            .collect()
    }

    /// Local names declared in a namespace (`None` for no namespace)
    pub fn all_type_names(&self, namespace: Option<&str>) -> Vec<String> {
        self.index
            .names_in(namespace)
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn find_declaration(&self, qname: &QName, category: Category) -> Option<&Declaration> {
        let key = IndexKey::new(qname.namespace.as_deref(), qname.local.as_str(), category);
        self.index.get(&key).map(IndexEntry::declaration)
    }

    /// Type definition a base reference points at, complex types first
    pub fn find_type_definition(&self, qname: &QName) -> Option<(IndexKey, &IndexEntry)> {
        let canonical = self.canonical_qname(qname);
        [Category::ComplexType, Category::SimpleType]
            .into_iter()
            .find_map(|category| {
                let key = IndexKey::new(canonical.namespace.as_deref(), canonical.local.as_str(), category);
                self.index.get(&key).map(|entry| (key, entry))
            })
    }

    /// Fuzzy search over local names
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let matcher = SkimMatcherV2::default();
        let mut results: Vec<SearchHit> = self
            .index
            .iter()
            .filter_map(|(key, entry)| {
                let score = matcher.fuzzy_match(&key.name, query)?;
                let qname = key.qname();
                Some(SearchHit {
                    qualified_name: self.display_name(&qname),
                    qname,
                    category: key.category,
                    location: entry.location().to_string(),
                    score,
                })
            })
            .collect();

        // Sort by score descending
        results.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.qname.cmp(&b.qname)));
        results.truncate(limit);
        results
    }

    pub fn statistics(&self) -> RepositoryStatistics {
        let mut by_category = BTreeMap::new();
        for key in self.index.keys() {
            *by_category.entry(key.category).or_insert(0) += 1;
        }

        RepositoryStatistics {
            entry_files: self.files.len(),
            documents: self.documents.len(),
            namespaces: self.all_namespaces().len(),
            declarations: self.index.len(),
            by_category,
            unresolved_directives: self.unresolved.len(),
            errors: self.diagnostics.error_count(),
            warnings: self.diagnostics.warning_count(),
        }
    }
}
