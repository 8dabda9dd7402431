//! XSD Parsing
//!
//! Reads one schema document with roxmltree and extracts its top-level
//! declarations and directives. QName-valued attributes are resolved against
//! the in-scope namespace declarations of the node that carries them, so the
//! rest of the crate never deals with document-local prefixes.

use roxmltree::{Document, Node, ParsingOptions};
use std::sync::Arc;

use super::{
    AttributeDecl, AttributeGroupDef, ComplexTypeDef, Declaration, Derivation, DerivationKind,
    Directive, DirectiveKind, ElementDecl, GroupDef, QName, SchemaDocument, SimpleTypeDef,
    SimpleVariety, UNDECLARED_PREFIX_NAMESPACE, XS_NAMESPACE,
};

/// Default size limit for one schema document
pub const DEFAULT_MAX_SIZE: usize = 64 * 1024 * 1024;

/// Parser limits
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Documents larger than this are rejected
    pub max_size: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

/// Content model / derivation element pairs, in base-type priority order
const DERIVATION_PATHS: [(&str, &str, DerivationKind); 4] = [
    ("complexContent", "extension", DerivationKind::ComplexExtension),
    ("complexContent", "restriction", DerivationKind::ComplexRestriction),
    ("simpleContent", "extension", DerivationKind::SimpleContentExtension),
    ("simpleContent", "restriction", DerivationKind::SimpleContentRestriction),
];

/// Parse a schema document
pub fn parse_document(
    location: &str,
    source: Arc<str>,
    options: &ParseOptions,
) -> Result<SchemaDocument, String> {
    if source.len() > options.max_size {
        return Err(format!(
            "document too large: {} bytes (max {} bytes)",
            source.len(),
            options.max_size
        ));
    }

    let xml_opts = ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(&source, xml_opts).map_err(|e| format!("XML: {e}"))?;
    let root = doc.root_element();

    if !is_xs(&root, "schema") {
        return Err(format!(
            "root element must be xs:schema, found '{}'",
            root.tag_name().name()
        ));
    }

    let target_namespace = root
        .attribute("targetNamespace")
        .filter(|ns| !ns.is_empty())
        .map(String::from);

    let namespaces = root
        .namespaces()
        .filter_map(|ns| {
            let prefix = ns.name()?;
            (prefix != "xml").then(|| (prefix.to_string(), ns.uri().to_string()))
        })
        .collect();

    let mut declarations = Vec::new();
    let mut directives = Vec::new();

    for child in xs_children(&root) {
        match child.tag_name().name() {
            "import" | "include" | "redefine" => directives.push(extract_directive(&child)),
            _ => {
                if let Some(decl) = extract_declaration(&child) {
                    declarations.push(decl);
                }
            }
        }
    }

    Ok(SchemaDocument::new(
        location.to_string(),
        source.clone(),
        target_namespace,
        namespaces,
        declarations,
        directives,
    ))
}

fn is_xs(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(XS_NAMESPACE) && node.tag_name().name() == name
}

fn xs_children<'a, 'input>(node: &Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(|n| n.is_element() && n.tag_name().namespace() == Some(XS_NAMESPACE))
}

fn xs_child<'a, 'input>(node: &Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_xs(n, name))
}

fn flag(node: &Node, attr: &str) -> bool {
    matches!(node.attribute(attr), Some("true") | Some("1"))
}

fn extract_directive(node: &Node) -> Directive {
    let kind = match node.tag_name().name() {
        "import" => DirectiveKind::Import,
        "include" => DirectiveKind::Include,
        _ => DirectiveKind::Redefine,
    };
    Directive {
        kind,
        namespace: node.attribute("namespace").map(String::from),
        location: node
            .attribute("schemaLocation")
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from),
    }
}

fn extract_declaration(node: &Node) -> Option<Declaration> {
    let name = node.attribute("name")?.to_string();
    let documentation = documentation(node);

    let decl = match node.tag_name().name() {
        "element" => Declaration::Element(ElementDecl {
            name,
            type_ref: qname_attr(node, "type"),
            substitution_group: qname_attr(node, "substitutionGroup"),
            is_abstract: flag(node, "abstract"),
            documentation,
        }),
        "complexType" => Declaration::ComplexType(ComplexTypeDef {
            name,
            derivation: complex_derivation(node),
            is_abstract: flag(node, "abstract"),
            mixed: flag(node, "mixed"),
            documentation,
        }),
        "simpleType" => Declaration::SimpleType(SimpleTypeDef {
            name,
            variety: simple_variety(node),
            documentation,
        }),
        "attribute" => Declaration::Attribute(AttributeDecl {
            name,
            type_ref: qname_attr(node, "type"),
            documentation,
        }),
        "group" => Declaration::Group(GroupDef {
            name,
            compositor: xs_children(node)
                .map(|c| c.tag_name().name())
                .find(|n| matches!(*n, "sequence" | "choice" | "all"))
                .map(String::from),
            documentation,
        }),
        "attributeGroup" => Declaration::AttributeGroup(AttributeGroupDef {
            name,
            attributes: xs_children(node)
                .filter(|c| c.tag_name().name() == "attribute")
                .filter_map(|c| c.attribute("name").or_else(|| c.attribute("ref")))
                .map(String::from)
                .collect(),
            documentation,
        }),
        _ => return None,
    };
    Some(decl)
}

fn complex_derivation(node: &Node) -> Option<Derivation> {
    for (content, method, kind) in DERIVATION_PATHS {
        let Some(derivation) = xs_child(node, content).and_then(|c| xs_child(&c, method)) else {
            continue;
        };
        if let Some(base) = qname_attr(&derivation, "base") {
            return Some(Derivation { kind, base });
        }
    }
    None
}

fn simple_variety(node: &Node) -> SimpleVariety {
    if let Some(restriction) = xs_child(node, "restriction") {
        let enumerations = xs_children(&restriction)
            .filter(|c| c.tag_name().name() == "enumeration")
            .filter_map(|c| c.attribute("value"))
            .map(String::from)
            .collect();
        return SimpleVariety::Restriction {
            base: qname_attr(&restriction, "base"),
            enumerations,
        };
    }
    if let Some(list) = xs_child(node, "list") {
        return SimpleVariety::List {
            item_type: qname_attr(&list, "itemType"),
        };
    }
    if let Some(union) = xs_child(node, "union") {
        let member_types = union
            .attribute("memberTypes")
            .map(|v| {
                v.split_whitespace()
                    .map(|token| resolve_qname(&union, token))
                    .collect()
            })
            .unwrap_or_default();
        return SimpleVariety::Union { member_types };
    }
    SimpleVariety::Restriction {
        base: None,
        enumerations: Vec::new(),
    }
}

fn documentation(node: &Node) -> Option<String> {
    let annotation = xs_child(node, "annotation")?;
    let text: Vec<String> = xs_children(&annotation)
        .filter(|c| c.tag_name().name() == "documentation")
        .filter_map(|c| {
            let text: String = c
                .descendants()
                .filter(|d| d.is_text())
                .filter_map(|d| d.text())
                .collect();
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect();
    (!text.is_empty()).then(|| text.join("\n"))
}

fn qname_attr(node: &Node, attr: &str) -> Option<QName> {
    node.attribute(attr)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| resolve_qname(node, v))
}

/// Resolve a lexical QName against the node's in-scope namespaces.
///
/// Unprefixed names take the default namespace. An undeclared prefix is
/// placed under [`UNDECLARED_PREFIX_NAMESPACE`], which no schema declares.
fn resolve_qname(node: &Node, value: &str) -> QName {
    match value.split_once(':') {
        Some((prefix, local)) => match node.lookup_namespace_uri(Some(prefix)) {
            Some(uri) => QName::new(Some(uri), local),
            None => {
                let namespace = format!("{}:{}", UNDECLARED_PREFIX_NAMESPACE, prefix);
                QName::new(Some(namespace.as_str()), local)
            }
        },
        None => QName::new(node.lookup_namespace_uri(None), value),
    }
}
