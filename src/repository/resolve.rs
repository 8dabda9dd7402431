//! Qualified-Name Resolution
//!
//! Accepts `prefix:local`, `{uri}local` and bare `local` queries. Failures
//! are values, never errors, so batch resolution can report every query.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::Serialize;

use super::{IndexEntry, Repository};
use crate::xsd::{Category, Declaration, QName};

const MAX_SUGGESTIONS: usize = 5;

/// Why a query did not resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidQuery,
    UnregisteredPrefix,
    NotFound,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidQuery => "invalid_query",
            Self::UnregisteredPrefix => "unregistered_prefix",
            Self::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionFailure {
    pub query: String,
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

/// A successfully resolved declaration
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedType<'r> {
    pub qname: QName,
    /// `prefix:local` or Clark notation
    pub qualified_name: String,
    pub namespace: Option<String>,
    pub category: Category,
    /// The indexed declaration itself
    pub definition: &'r Declaration,
    pub schema_location: &'r str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TypeResolutionResult<'r> {
    Resolved(ResolvedType<'r>),
    Failed(ResolutionFailure),
}

impl<'r> TypeResolutionResult<'r> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn resolved(&self) -> Option<&ResolvedType<'r>> {
        match self {
            Self::Resolved(r) => Some(r),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ResolutionFailure> {
        match self {
            Self::Resolved(_) => None,
            Self::Failed(f) => Some(f),
        }
    }

    pub fn into_resolved(self) -> Option<ResolvedType<'r>> {
        match self {
            Self::Resolved(r) => Some(r),
            Self::Failed(_) => None,
        }
    }
}

/// One query of a batch together with its outcome
#[derive(Debug, Clone, Serialize)]
pub struct BatchResolution<'r> {
    /// The query exactly as given
    pub query: String,
    pub result: TypeResolutionResult<'r>,
}

/// Syntactic form of a query
#[derive(Debug, Clone, PartialEq, Eq)]
enum Query<'q> {
    Clark { namespace: &'q str, local: &'q str },
    Prefixed { prefix: &'q str, local: &'q str },
    Bare(&'q str),
}

fn parse_query(query: &str) -> Result<Query<'_>, String> {
    let query = query.trim();
    if query.is_empty() {
        return Err("empty query".to_string());
    }

    let parsed = if let Some(rest) = query.strip_prefix('{') {
        let (namespace, local) = rest
            .split_once('}')
            .ok_or_else(|| format!("'{}' is missing a closing '}}'", query))?;
        Query::Clark { namespace, local }
    } else if let Some((prefix, local)) = query.split_once(':') {
        if prefix.is_empty() {
            return Err(format!("'{}' has an empty prefix", query));
        }
        Query::Prefixed { prefix, local }
    } else {
        Query::Bare(query)
    };

    let local = match parsed {
        Query::Clark { local, .. } | Query::Prefixed { local, .. } | Query::Bare(local) => local,
    };
    if local.is_empty() || local.contains(|c: char| matches!(c, ':' | '{' | '}') || c.is_whitespace()) {
        return Err(format!("'{}' has no valid local name", query));
    }
    Ok(parsed)
}

impl Repository {
    /// Resolve a qualified-name query against the type index
    pub fn find_type(&self, query: &str) -> TypeResolutionResult<'_> {
        let fail = |kind: FailureKind, message: String, suggestions: Vec<String>| {
            TypeResolutionResult::Failed(ResolutionFailure {
                query: query.to_string(),
                kind,
                message,
                suggestions,
            })
        };

        let parsed = match parse_query(query) {
            Ok(parsed) => parsed,
            Err(reason) => return fail(FailureKind::InvalidQuery, format!("Invalid query: {}", reason), Vec::new()),
        };

        let (namespace, local) = match parsed {
            Query::Clark { namespace, local } => {
                (self.canonical_namespace(Some(namespace).filter(|ns| !ns.is_empty())), local)
            }
            Query::Prefixed { prefix, local } => match self.uri_for(prefix) {
                Some(uri) => (self.canonical_namespace(Some(uri)), local),
                None => {
                    return fail(
                        FailureKind::UnregisteredPrefix,
                        format!("Namespace prefix '{}' is not registered", prefix),
                        Vec::new(),
                    )
                }
            },
            Query::Bare(local) => {
                return match self.lookup_bare(local) {
                    Some((category, entry, namespace)) => self.resolved(namespace.as_deref(), local, category, entry),
                    None => fail(
                        FailureKind::NotFound,
                        format!("Type '{}' not found in any namespace", local),
                        self.suggestions(None, local),
                    ),
                };
            }
        };

        match self.index.lookup(namespace.as_deref(), local) {
            Some((category, entry)) => self.resolved(namespace.as_deref(), local, category, entry),
            None => {
                let shown = QName::new(namespace.as_deref(), local);
                fail(
                    FailureKind::NotFound,
                    format!("Type '{}' not found", shown),
                    self.suggestions(Some(namespace.as_deref()), local),
                )
            }
        }
    }

    /// Resolve many queries in order; each result stands alone
    pub fn resolve_batch<S: AsRef<str>>(&self, queries: &[S]) -> Vec<BatchResolution<'_>> {
        queries
            .iter()
            .map(|q| BatchResolution {
                query: q.as_ref().to_string(),
                result: self.find_type(q.as_ref()),
            })
            .collect()
    }

    /// No-namespace partition first, then namespaces by ascending URI
    fn lookup_bare(&self, local: &str) -> Option<(Category, &IndexEntry, Option<String>)> {
        if let Some((category, entry)) = self.index.lookup(None, local) {
            return Some((category, entry, None));
        }
        self.index
            .namespaces()
            .into_iter()
            .flatten()
            .find_map(|ns| {
                self.index
                    .lookup(Some(ns), local)
                    .map(|(category, entry)| (category, entry, Some(ns.to_string())))
            })
    }

    fn resolved<'r>(
        &'r self,
        namespace: Option<&str>,
        local: &str,
        category: Category,
        entry: &'r IndexEntry,
    ) -> TypeResolutionResult<'r> {
        let qname = QName::new(namespace, local);
        TypeResolutionResult::Resolved(ResolvedType {
            qualified_name: self.display_name(&qname),
            namespace: qname.namespace.clone(),
            qname,
            category,
            definition: entry.declaration(),
            schema_location: entry.location(),
        })
    }

    /// Closest names in one namespace, or anywhere when `namespace` is `None`
    fn suggestions(&self, namespace: Option<Option<&str>>, local: &str) -> Vec<String> {
        let matcher = SkimMatcherV2::default().ignore_case();
        let mut scored: Vec<(i64, QName)> = self
            .index
            .keys()
            .filter(|k| namespace.map_or(true, |ns| k.namespace.as_deref() == ns))
            .filter_map(|k| matcher.fuzzy_match(&k.name, local).map(|score| (score, k.qname())))
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.dedup_by(|a, b| a.1 == b.1);
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, qname)| self.display_name(&qname))
            .collect()
    }
}
