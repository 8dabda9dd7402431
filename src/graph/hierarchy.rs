//! Type Hierarchy Analysis
//!
//! Ancestors follow one base reference per step until a built-in or
//! unresolvable base, a cycle, or the depth limit. Descendants come from a
//! reverse scan of the whole index and are expanded recursively; a type that
//! is already on the current path is listed but not expanded again.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::config::HierarchyConfig;
use crate::repository::{IndexKey, Repository};
use crate::xsd::{Category, DerivationKind, QName};

/// One step up the base-type chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AncestorEntry {
    pub qualified_name: String,
    pub qname: QName,
    pub category: Category,
    pub depth: usize,
    /// How the previous type in the chain derives from this one
    pub derived_by: DerivationKind,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeHierarchyNode {
    pub qualified_name: String,
    pub qname: QName,
    pub category: Category,
    pub depth: usize,
    pub location: String,
    /// How this node derives from its parent, for descendants
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_by: Option<DerivationKind>,
    /// Nearest base first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ancestors: Vec<AncestorEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub descendants: Vec<TypeHierarchyNode>,
    /// Built-in or unresolvable base where the ancestor walk stopped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_base: Option<QName>,
}

impl TypeHierarchyNode {
    /// Number of descendants at every level
    pub fn descendant_count(&self) -> usize {
        self.descendants
            .iter()
            .map(|d| 1 + d.descendant_count())
            .sum()
    }
}

type ReverseIndex = BTreeMap<QName, Vec<(IndexKey, DerivationKind)>>;

pub struct HierarchyAnalyzer<'r> {
    repository: &'r Repository,
    default_depth: usize,
}

impl<'r> HierarchyAnalyzer<'r> {
    pub fn new(repository: &'r Repository) -> Self {
        Self {
            repository,
            default_depth: HierarchyConfig::default().default_depth,
        }
    }

    pub fn with_config(repository: &'r Repository, config: &HierarchyConfig) -> Self {
        Self {
            repository,
            default_depth: config.default_depth,
        }
    }

    /// Analyze with the configured depth
    pub fn analyze_default(&self, query: &str) -> Option<TypeHierarchyNode> {
        self.analyze(query, self.default_depth)
    }

    /// Hierarchy around a type; `None` when the query does not resolve
    pub fn analyze(&self, query: &str, depth: usize) -> Option<TypeHierarchyNode> {
        let result = self.repository.find_type(query);
        let root = result.resolved()?;
        let root_key = IndexKey::new(root.qname.namespace.as_deref(), root.qname.local.as_str(), root.category);

        let (ancestors, terminal_base) = self.ancestors(&root_key, depth);

        let reverse = self.reverse_index();
        let mut path = vec![root.qname.clone()];
        let descendants = self.descendants(&reverse, &root.qname, 1, depth, &mut path);

        Some(TypeHierarchyNode {
            qualified_name: root.qualified_name.clone(),
            qname: root.qname.clone(),
            category: root.category,
            depth: 0,
            location: root.schema_location.to_string(),
            derived_by: None,
            ancestors,
            descendants,
            terminal_base,
        })
    }

    fn ancestors(&self, root: &IndexKey, depth: usize) -> (Vec<AncestorEntry>, Option<QName>) {
        let index = self.repository.index();
        let mut ancestors = Vec::new();
        let mut seen: HashSet<QName> = HashSet::from([root.qname()]);
        let mut current = root.clone();

        for step in 1..=depth {
            let Some(entry) = index.get(&current) else {
                break;
            };
            let Some((kind, base)) = entry.declaration().derivation() else {
                return (ancestors, None);
            };
            let base = self.repository.canonical_qname(base);
            if base.is_builtin() {
                return (ancestors, Some(base));
            }
            let Some((base_key, base_entry)) = self.repository.find_type_definition(&base) else {
                return (ancestors, Some(base));
            };
            if !seen.insert(base_key.qname()) {
                tracing::debug!(base = %base, "Derivation cycle reached during ancestor walk");
                break;
            }

            ancestors.push(AncestorEntry {
                qualified_name: self.repository.display_name(&base),
                qname: base_key.qname(),
                category: base_key.category,
                depth: step,
                derived_by: kind,
                location: base_entry.location().to_string(),
            });
            current = base_key;
        }

        (ancestors, None)
    }

    /// Derived types grouped by the canonical QName of their base
    fn reverse_index(&self) -> ReverseIndex {
        let mut reverse: ReverseIndex = BTreeMap::new();
        for (key, entry) in self.repository.index().iter() {
            if !key.category.is_type() {
                continue;
            }
            if let Some((kind, base)) = entry.declaration().derivation() {
                reverse
                    .entry(self.repository.canonical_qname(base))
                    .or_default()
                    .push((key.clone(), kind));
            }
        }
        for derived in reverse.values_mut() {
            derived.sort();
        }
        reverse
    }

    fn descendants(
        &self,
        reverse: &ReverseIndex,
        parent: &QName,
        level: usize,
        depth: usize,
        path: &mut Vec<QName>,
    ) -> Vec<TypeHierarchyNode> {
        if level > depth {
            return Vec::new();
        }
        let Some(children) = reverse.get(parent) else {
            return Vec::new();
        };

        children
            .iter()
            .filter_map(|(key, kind)| {
                let entry = self.repository.index().get(key)?;
                let qname = key.qname();
                let descendants = if path.contains(&qname) {
                    Vec::new()
                } else {
                    path.push(qname.clone());
                    let nested = self.descendants(reverse, &qname, level + 1, depth, path);
                    path.pop();
                    nested
                };
                Some(TypeHierarchyNode {
                    qualified_name: self.repository.display_name(&qname),
                    qname,
                    category: key.category,
                    depth: level,
                    location: entry.location().to_string(),
                    derived_by: Some(*kind),
                    ancestors: Vec::new(),
                    descendants,
                    terminal_base: None,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Loader, MemorySource, SchemaCache};
    use crate::repository::NamespaceMapping;

    fn repository(body: &str) -> Repository {
        let source = MemorySource::new().with(
            "h.xsd",
            format!(
                r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:t="urn:t" targetNamespace="urn:t">{body}</xs:schema>"#
            ),
        );
        Loader::new(&source)
            .with_namespace_mappings(vec![NamespaceMapping::new("t", "urn:t")])
            .load(&["h.xsd"], &mut SchemaCache::new())
            .unwrap()
    }

    fn ext(name: &str, base: &str) -> String {
        format!(
            r#"<xs:complexType name="{name}"><xs:complexContent><xs:extension base="{base}"/></xs:complexContent></xs:complexType>"#
        )
    }

    fn chain() -> Repository {
        repository(&format!(
            r#"<xs:complexType name="Root"><xs:simpleContent><xs:extension base="xs:string"/></xs:simpleContent></xs:complexType>{}{}{}{}"#,
            ext("Mid", "t:Root"),
            ext("Leaf", "t:Mid"),
            ext("Other", "t:Mid"),
            ext("Deep", "t:Leaf"),
        ))
    }

    #[test]
    fn test_ancestors_to_builtin() {
        let repo = chain();
        let node = HierarchyAnalyzer::new(&repo).analyze("t:Leaf", 10).unwrap();

        let names: Vec<_> = node.ancestors.iter().map(|a| a.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["t:Mid", "t:Root"]);
        assert_eq!(node.ancestors[1].depth, 2);
        assert_eq!(node.terminal_base.as_ref().unwrap().local, "string");
        assert_eq!(node.category, Category::ComplexType);
    }

    #[test]
    fn test_depth_limits_both_directions() {
        let repo = chain();
        let node = HierarchyAnalyzer::new(&repo).analyze("t:Mid", 1).unwrap();
        assert_eq!(node.ancestors.len(), 1);
        assert_eq!(node.terminal_base, None);

        let children: Vec<_> = node.descendants.iter().map(|d| d.qname.local.as_str()).collect();
        assert_eq!(children, vec!["Leaf", "Other"]);
        assert!(node.descendants[0].descendants.is_empty());

        let full = HierarchyAnalyzer::new(&repo).analyze("t:Mid", 5).unwrap();
        assert_eq!(full.descendant_count(), 3);
        assert_eq!(full.descendants[0].descendants[0].depth, 2);
    }

    #[test]
    fn test_cycle_terminates() {
        let repo = repository(&format!("{}{}", ext("A", "t:B"), ext("B", "t:A")));
        let node = HierarchyAnalyzer::new(&repo).analyze("t:A", 50).unwrap();
        assert_eq!(node.ancestors.len(), 1);
        assert_eq!(node.descendants.len(), 1);
        assert_eq!(node.descendants[0].qname.local, "B");
        assert_eq!(node.descendants[0].descendants.len(), 1);
        assert!(node.descendants[0].descendants[0].descendants.is_empty());
    }

    #[test]
    fn test_unresolved_base_is_terminal() {
        let repo = repository(&ext("Orphan", "t:Gone"));
        let node = HierarchyAnalyzer::new(&repo).analyze("t:Orphan", 3).unwrap();
        assert!(node.ancestors.is_empty());
        assert_eq!(node.terminal_base, Some(QName::new(Some("urn:t"), "Gone")));
    }

    #[test]
    fn test_unknown_root() {
        let repo = chain();
        assert!(HierarchyAnalyzer::new(&repo).analyze("t:Nope", 3).is_none());
    }
}
