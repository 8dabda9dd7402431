//! Type Derivation Graphs
//!
//! Base-type relationships between indexed types: the petgraph derivation
//! graph used for cycle diagnostics and DOT export, the bounded-depth
//! hierarchy analyzer, and renderers for its trees.

pub mod derivation;
pub mod hierarchy;
pub mod render;

pub use derivation::{DerivationGraph, DerivationNode};
pub use hierarchy::{AncestorEntry, HierarchyAnalyzer, TypeHierarchyNode};
pub use render::{to_mermaid, to_text};
