//! Hierarchy renderers

use std::collections::BTreeMap;

use super::hierarchy::TypeHierarchyNode;
use crate::xsd::QName;

/// Mermaid flowchart; arrows point from derived type to base
pub fn to_mermaid(node: &TypeHierarchyNode) -> String {
    let mut ids: BTreeMap<QName, String> = BTreeMap::new();
    let mut lines = vec!["graph BT".to_string()];
    let mut edges = Vec::new();

    let mut id_for = |qname: &QName, label: &str, lines: &mut Vec<String>| -> String {
        if let Some(id) = ids.get(qname) {
            return id.clone();
        }
        let id = format!("n{}", ids.len());
        lines.push(format!("  {}[\"{}\"]", id, label.replace('"', "'")));
        ids.insert(qname.clone(), id.clone());
        id
    };

    let root = id_for(&node.qname, &node.qualified_name, &mut lines);

    let mut below = root.clone();
    for ancestor in &node.ancestors {
        let id = id_for(&ancestor.qname, &ancestor.qualified_name, &mut lines);
        edges.push(format!("  {} -->|{}| {}", below, ancestor.derived_by.as_str(), id));
        below = id;
    }
    if let Some(terminal) = &node.terminal_base {
        let id = id_for(terminal, &terminal.to_string(), &mut lines);
        edges.push(format!("  {} --> {}", below, id));
    }

    let mut stack: Vec<(&TypeHierarchyNode, String)> = vec![(node, root)];
    while let Some((parent, parent_id)) = stack.pop() {
        for child in &parent.descendants {
            let id = id_for(&child.qname, &child.qualified_name, &mut lines);
            let label = child.derived_by.map(|k| k.as_str()).unwrap_or("derives");
            edges.push(format!("  {} -->|{}| {}", id, label, parent_id));
            stack.push((child, id));
        }
    }

    lines.extend(edges);
    lines.join("\n") + "\n"
}

/// Indented plain-text tree
pub fn to_text(node: &TypeHierarchyNode) -> String {
    let mut output = format!("{} ({})\n", node.qualified_name, node.category);

    if !node.ancestors.is_empty() || node.terminal_base.is_some() {
        output.push_str("  ancestors:\n");
        for ancestor in &node.ancestors {
            output.push_str(&format!(
                "    {}. {} [{}]\n",
                ancestor.depth,
                ancestor.qualified_name,
                ancestor.derived_by.as_str()
            ));
        }
        if let Some(terminal) = &node.terminal_base {
            output.push_str(&format!("    terminal: {}\n", terminal));
        }
    }

    if !node.descendants.is_empty() {
        output.push_str("  descendants:\n");
        write_descendants(&mut output, &node.descendants, 2);
    }

    output
}

fn write_descendants(output: &mut String, nodes: &[TypeHierarchyNode], indent: usize) {
    for node in nodes {
        output.push_str(&format!(
            "{}- {} ({})\n",
            "  ".repeat(indent),
            node.qualified_name,
            node.category
        ));
        write_descendants(output, &node.descendants, indent + 1);
    }
}
