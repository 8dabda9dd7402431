//! Include/exclude glob filters over package schema files

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{Result, SchemaError};
use crate::xsd::basename;

/// One compiled glob list
#[derive(Debug, Clone)]
struct GlobList {
    patterns: Vec<String>,
    set: GlobSet,
}

impl GlobList {
    /// `*` and `?` stay within one path segment, `**` crosses segments
    fn compile(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(compile_glob(pattern)?);
        }
        let set = builder
            .build()
            .map_err(|e| SchemaError::config(format!("invalid schema globs: {}", e)))?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Matches the whole path or just its file name
    fn matches(&self, path: &str) -> bool {
        let path = path.replace('\\', "/");
        self.set.is_match(&path) || self.set.is_match(basename(&path))
    }
}

impl Default for GlobList {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }
}

fn compile_glob(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| SchemaError::config(format!("invalid schema glob '{}': {}", pattern, e)))
}

/// Compiled `exclude_schemas` / `include_only_schemas` globs
#[derive(Debug, Clone, Default)]
pub struct SchemaFilter {
    exclude: GlobList,
    include_only: GlobList,
}

impl SchemaFilter {
    pub fn new(exclude: &[String], include_only: &[String]) -> Result<Self> {
        Ok(Self {
            exclude: GlobList::compile(exclude)?,
            include_only: GlobList::compile(include_only)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.exclude.is_empty() && self.include_only.is_empty()
    }

    /// Exclusion is checked first; a path excluded by any glob is dropped
    /// even when an include glob also matches
    pub fn accepts(&self, path: &str) -> bool {
        if self.exclude.matches(path) {
            return false;
        }
        self.include_only.is_empty() || self.include_only.matches(path)
    }

    pub fn exclude_patterns(&self) -> impl Iterator<Item = &str> {
        self.exclude.patterns.iter().map(String::as_str)
    }

    pub fn include_patterns(&self) -> impl Iterator<Item = &str> {
        self.include_only.patterns.iter().map(String::as_str)
    }
}
