//! Derivation Graph
//!
//! petgraph view of every base-type edge in a repository. Edges run from the
//! derived type to its base. Nodes are keyed by name and category, so a
//! complex and a simple type sharing a name stay apart. Bases that are
//! built-in or not indexed become leaf nodes without a category.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

use crate::repository::{IndexKey, Repository};
use crate::xsd::{Category, DerivationKind, QName};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DerivationNode {
    pub qname: QName,
    /// `None` for bases outside the index
    pub category: Option<Category>,
}

impl DerivationNode {
    fn indexed(key: &IndexKey) -> Self {
        Self {
            qname: key.qname(),
            category: Some(key.category),
        }
    }
}

#[derive(Debug, Default)]
pub struct DerivationGraph {
    graph: DiGraph<DerivationNode, DerivationKind>,
    node_indices: HashMap<DerivationNode, NodeIndex>,
}

impl DerivationGraph {
    pub fn build(repository: &Repository) -> Self {
        let mut graph = Self::default();
        let types: Vec<_> = repository
            .index()
            .iter()
            .filter(|(key, _)| key.category.is_type())
            .collect();

        for (key, _) in &types {
            graph.node(DerivationNode::indexed(key));
        }

        for (key, entry) in &types {
            let Some((kind, base)) = entry.declaration().derivation() else {
                continue;
            };
            let source = graph.node(DerivationNode::indexed(key));
            let target = match repository.find_type_definition(base) {
                Some((base_key, _)) => graph.node(DerivationNode::indexed(&base_key)),
                None => graph.node(DerivationNode {
                    qname: repository.canonical_qname(base),
                    category: None,
                }),
            };
            graph.graph.add_edge(source, target, kind);
        }

        graph
    }

    fn node(&mut self, node: DerivationNode) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.node_indices.insert(node, idx);
        idx
    }

    fn index_of(&self, key: &IndexKey) -> Option<NodeIndex> {
        self.node_indices.get(&DerivationNode::indexed(key)).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, key: &IndexKey) -> bool {
        self.index_of(key).is_some()
    }

    /// Direct base of a type, with the derivation method
    pub fn base_of(&self, key: &IndexKey) -> Option<(&DerivationNode, DerivationKind)> {
        let idx = self.index_of(key)?;
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .next()
            .map(|e| (&self.graph[e.target()], *e.weight()))
    }

    /// Types deriving directly from `key`, sorted
    pub fn derived_from(&self, key: &IndexKey) -> Vec<&DerivationNode> {
        let Some(idx) = self.index_of(key) else {
            return Vec::new();
        };
        let mut derived: Vec<&DerivationNode> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| &self.graph[e.source()])
            .collect();
        derived.sort();
        derived
    }

    /// Circular derivations, each listed in base-chain order starting from
    /// its smallest member
    pub fn cycles(&self) -> Vec<Vec<QName>> {
        let mut cycles = Vec::new();

        for scc in kosaraju_scc(&self.graph) {
            let looped = scc.len() > 1
                || self
                    .graph
                    .edges_directed(scc[0], Direction::Outgoing)
                    .any(|e| e.target() == scc[0]);
            if !looped {
                continue;
            }

            let Some(&start) = scc.iter().min_by(|a, b| self.graph[**a].cmp(&self.graph[**b])) else {
                continue;
            };
            let mut members = vec![self.graph[start].qname.clone()];
            let mut current = start;
            loop {
                let next = self
                    .graph
                    .edges_directed(current, Direction::Outgoing)
                    .map(|e| e.target())
                    .find(|t| scc.contains(t));
                match next {
                    Some(next) if next != start && members.len() < scc.len() => {
                        members.push(self.graph[next].qname.clone());
                        current = next;
                    }
                    _ => break,
                }
            }
            cycles.push(members);
        }

        cycles.sort();
        cycles
    }

    /// Export as Graphviz DOT
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph Derivation {\n");
        output.push_str("  rankdir=BT;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8, fontcolor=\"#808080\"];\n");
        output.push('\n');

        let mut nodes: Vec<_> = self.graph.node_indices().collect();
        nodes.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        for idx in &nodes {
            let node = &self.graph[*idx];
            let color = match node.category {
                Some(Category::ComplexType) => "#00BCD4",
                Some(Category::SimpleType) => "#FF9800",
                _ => "#9E9E9E",
            };
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\"];\n",
                dot_id(node),
                node.qname.local,
                color
            ));
        }

        output.push('\n');

        let mut edges: Vec<_> = self.graph.edge_references().collect();
        edges.sort_by(|a, b| {
            (&self.graph[a.source()], &self.graph[a.target()])
                .cmp(&(&self.graph[b.source()], &self.graph[b.target()]))
        });
        for edge in edges {
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                dot_id(&self.graph[edge.source()]),
                dot_id(&self.graph[edge.target()]),
                edge.weight().as_str()
            ));
        }

        output.push_str("}\n");
        output
    }
}

/// Clark name, with the category appended for indexed nodes
fn dot_id(node: &DerivationNode) -> String {
    let id = match node.category {
        Some(category) => format!("{}#{}", node.qname.clark(), category.as_str()),
        None => node.qname.clark(),
    };
    id.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Loader, MemorySource, SchemaCache};

    fn repository(body: &str) -> Repository {
        let source = MemorySource::new().with(
            "d.xsd",
            format!(
                r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:t="urn:t" targetNamespace="urn:t">{body}</xs:schema>"#
            ),
        );
        Loader::new(&source).load(&["d.xsd"], &mut SchemaCache::new()).unwrap()
    }

    fn key(name: &str, category: Category) -> IndexKey {
        IndexKey::new(Some("urn:t"), name, category)
    }

    fn ext(name: &str, base: &str) -> String {
        format!(
            r#"<xs:complexType name="{name}"><xs:complexContent><xs:extension base="{base}"/></xs:complexContent></xs:complexType>"#
        )
    }

    #[test]
    fn test_edges_and_builtin_leaves() {
        let repo = repository(&format!(
            r#"<xs:simpleType name="Code"><xs:restriction base="xs:token"/></xs:simpleType><xs:complexType name="Base"/>{}"#,
            ext("Child", "t:Base")
        ));
        let graph = DerivationGraph::build(&repo);

        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 2);
        let (base, kind) = graph.base_of(&key("Child", Category::ComplexType)).unwrap();
        assert_eq!(base.qname.local, "Base");
        assert_eq!(kind, DerivationKind::ComplexExtension);
        assert_eq!(graph.derived_from(&key("Base", Category::ComplexType)).len(), 1);
        assert!(graph.cycles().is_empty());

        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph Derivation {"));
        assert!(dot.contains(
            "\"{urn:t}Child#complex_type\" -> \"{urn:t}Base#complex_type\" [label=\"complexContent/extension\"]"
        ));
    }

    #[test]
    fn test_cycles_in_chain_order() {
        let repo = repository(&format!("{}{}{}", ext("B", "t:C"), ext("C", "t:A"), ext("A", "t:B")));
        let cycles = DerivationGraph::build(&repo).cycles();
        assert_eq!(cycles.len(), 1);
        let names: Vec<_> = cycles[0].iter().map(|q| q.local.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_self_derivation_is_cycle() {
        let repo = repository(&ext("Loop", "t:Loop"));
        let cycles = DerivationGraph::build(&repo).cycles();
        assert_eq!(cycles, vec![vec![QName::new(Some("urn:t"), "Loop")]]);
    }

    #[test]
    fn test_same_name_in_two_categories_stays_apart() {
        let repo = repository(&format!(
            r#"<xs:simpleType name="Code"><xs:restriction base="xs:token"/></xs:simpleType>{}"#,
            ext("Code", "t:Other")
        ));
        let graph = DerivationGraph::build(&repo);

        assert!(graph.contains(&key("Code", Category::SimpleType)));
        assert!(graph.contains(&key("Code", Category::ComplexType)));
        let (simple_base, _) = graph.base_of(&key("Code", Category::SimpleType)).unwrap();
        assert_eq!(simple_base.qname.local, "token");
        let (complex_base, _) = graph.base_of(&key("Code", Category::ComplexType)).unwrap();
        assert_eq!(complex_base.qname.local, "Other");
        assert!(graph.cycles().is_empty());
    }
}
