//! XSD Schema Repository
//!
//! Loads XML Schema files with their import/include graphs, indexes every
//! top-level declaration by namespace, and answers qualified-name and
//! type-hierarchy queries. Pre-resolved repositories can be bundled as
//! packages, compared for conflicts and merged under per-package rules.
//!
//! ## Features
//!
//! - **Session Cache**: each file is parsed once per caller-owned `SchemaCache`
//! - **Location Mappings**: literal and regex rewrites of `schemaLocation` hints
//! - **Namespace Index**: declarations keyed by (namespace, name, category)
//! - **Hierarchy Analysis**: ancestors and descendants with cycle protection
//! - **Packages**: checksummed bundles, conflict reports, priority-based merges
//!
//! ## Architecture
//!
//! ```text
//! entry.xsd ──► Loader ──► SchemaCache (Arc<SchemaDocument>)
//!                 │
//!                 ▼
//!             Repository ──► TypeIndex ──► find_type / HierarchyAnalyzer
//!                 ▲
//! bundle/ ──► PackageSource ──► ConflictDetector ──► MergeResolver
//! ├── metadata.json
//! ├── index.json
//! └── schemas/
//! ```

pub mod checksum;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod loader;
pub mod package;
pub mod remap;
pub mod repository;
pub mod version;
pub mod xsd;

pub use checksum::Checksum;
pub use config::RepositoryConfig;
pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};
pub use error::{PackageMergeError, RemapError, Result, SchemaError};
pub use graph::{HierarchyAnalyzer, TypeHierarchyNode};
pub use loader::{FileSystemSource, Loader, MemorySource, SchemaCache, SchemaLocationMapping, SchemaSource};
pub use package::{
    detect_conflicts, ConflictDetector, ConflictReport, ConflictResolution, DirectoryStore, MergeResolver,
    PackageConfig, PackageSource, PackageSpec, PackageStore,
};
pub use remap::NamespaceRemapper;
pub use repository::{NamespaceMapping, Repository, ResolvedType, TypeResolutionResult};
pub use version::FormatVersion;
pub use xsd::{Category, Declaration, QName, SchemaDocument};
