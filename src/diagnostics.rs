//! Diagnostics
//!
//! Non-fatal findings collected while loading, indexing and unbundling
//! schemas. Fatal problems are `SchemaError`s; everything that should not
//! abort sibling processing lands here instead.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Loading ===
    /// Imported/included file is missing or unparsable
    UnreachableDependency,
    /// No mapping rule matched and the literal location does not exist
    UnresolvedLocation,

    // === Indexing ===
    /// Second declaration for an existing (namespace, name, category) key
    DuplicateDeclaration,
    /// Base-type chain loops back on itself
    CircularDerivation,

    // === Bundles ===
    /// Serialized index disagrees with the rebuilt one
    IndexMismatch,
    /// Relative schema-location target not present in the bundle
    AmbiguousLocationTarget,

    // === Merging ===
    /// Prefix bound to different URIs across packages; one was renamed
    PrefixRebound,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnreachableDependency => "E001",
            Self::UnresolvedLocation => "E002",
            Self::DuplicateDeclaration => "E003",
            Self::CircularDerivation => "W001",
            Self::IndexMismatch => "W002",
            Self::AmbiguousLocationTarget => "W003",
            Self::PrefixRebound => "W004",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::UnreachableDependency
            | Self::UnresolvedLocation
            | Self::DuplicateDeclaration => Severity::Error,

            Self::CircularDerivation
            | Self::IndexMismatch
            | Self::AmbiguousLocationTarget
            | Self::PrefixRebound => Severity::Warning,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Schema location (or package path) the finding is about
    pub location: String,
    pub code: DiagnosticCode,
    pub message: String,
    /// Additional context (referencing document, hint, related symbols)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(location: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Document named by a `Referenced from:` context line
    pub fn referenced_from(&self) -> Option<&str> {
        self.context.iter().find_map(|c| c.strip_prefix(REFERENCED_FROM))
    }
}

const REFERENCED_FROM: &str = "Referenced from: ";

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.location
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of diagnostics from one load or merge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic item, echoing it to the log
    pub fn push(&mut self, item: DiagnosticItem) {
        match item.severity() {
            Severity::Error | Severity::Warning => tracing::warn!(code = %item.code, location = %item.location, "{}", item.message),
            Severity::Info => tracing::debug!(code = %item.code, location = %item.location, "{}", item.message),
        }
        self.items.push(item);
    }

    pub fn unreachable_dependency(&mut self, location: &str, referenced_from: &str, reason: &str) {
        self.push(
            DiagnosticItem::new(
                location,
                DiagnosticCode::UnreachableDependency,
                format!("Dependency could not be loaded: {}", reason),
            )
            .with_context(format!("{}{}", REFERENCED_FROM, referenced_from)),
        );
    }

    pub fn unresolved_location(&mut self, hint: &str, referenced_from: &str) {
        self.push(
            DiagnosticItem::new(
                hint,
                DiagnosticCode::UnresolvedLocation,
                format!("Schema location '{}' could not be resolved", hint),
            )
            .with_context(format!("{}{}", REFERENCED_FROM, referenced_from)),
        );
    }

    pub fn duplicate_declaration(&mut self, location: &str, symbol: &str, first: &str) {
        self.push(
            DiagnosticItem::new(
                location,
                DiagnosticCode::DuplicateDeclaration,
                format!("Duplicate declaration of {}", symbol),
            )
            .with_context(format!("First declared in: {}", first)),
        );
    }

    pub fn circular_derivation(&mut self, members: &[String]) {
        let first = members.first().cloned().unwrap_or_default();
        self.push(
            DiagnosticItem::new(
                first,
                DiagnosticCode::CircularDerivation,
                "Circular type derivation detected",
            )
            .with_context(format!("Cycle: {}", members.join(" -> "))),
        );
    }

    pub fn index_mismatch(&mut self, bundle: &str, detail: impl Into<String>) {
        self.push(DiagnosticItem::new(bundle, DiagnosticCode::IndexMismatch, detail));
    }

    pub fn ambiguous_location_target(&mut self, bundle: &str, target: &str) {
        self.push(DiagnosticItem::new(
            bundle,
            DiagnosticCode::AmbiguousLocationTarget,
            format!("Schema location target '{}' is not part of the bundle", target),
        ));
    }

    pub fn prefix_rebound(&mut self, package: &str, prefix: &str, uri: &str, new_prefix: &str) {
        self.push(
            DiagnosticItem::new(
                package,
                DiagnosticCode::PrefixRebound,
                format!("Prefix '{}' already bound; '{}' rebound to '{}'", prefix, uri, new_prefix),
            )
            .with_context(format!("Namespace: {}", uri)),
        );
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    /// Items with the given code
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(move |i| i.code == code)
    }

    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Merge another Diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if self.has_errors() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        } else if !self.is_empty() {
            output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
