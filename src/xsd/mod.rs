//! XSD Document Model
//!
//! Immutable representation of one parsed schema file. Documents are created
//! once per canonical location by the loader and shared by `Arc` between the
//! session cache and every repository that contains them.

pub mod parser;

pub use parser::{parse_document, ParseOptions};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// XML Schema namespace
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// The `xml:` namespace, always implicitly available
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace given to QNames whose prefix is not declared in scope; the
/// prefix is appended after a colon
pub const UNDECLARED_PREFIX_NAMESPACE: &str = "urn:xsd-repository:undeclared-prefix";

// =============================================================================
// Qualified Names
// =============================================================================

/// A (namespace URI, local name) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(String::from),
            local: local.into(),
        }
    }

    /// Name without a namespace
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    /// Whether this names one of the XML Schema built-in types
    pub fn is_builtin(&self) -> bool {
        self.namespace.as_deref() == Some(XS_NAMESPACE)
    }

    /// Clark notation: `{uri}local`, or `local` without a namespace
    pub fn clark(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

// =============================================================================
// Categories
// =============================================================================

/// Kind of top-level declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Element,
    ComplexType,
    SimpleType,
    Attribute,
    Group,
    AttributeGroup,
}

impl Category {
    /// Lookup order used when several categories share one name
    pub const RESOLUTION_ORDER: [Category; 6] = [
        Category::ComplexType,
        Category::SimpleType,
        Category::Element,
        Category::Attribute,
        Category::Group,
        Category::AttributeGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Element => "element",
            Self::ComplexType => "complex_type",
            Self::SimpleType => "simple_type",
            Self::Attribute => "attribute",
            Self::Group => "group",
            Self::AttributeGroup => "attribute_group",
        }
    }

    /// Whether declarations of this category can take part in derivation
    pub fn is_type(&self) -> bool {
        matches!(self, Self::ComplexType | Self::SimpleType)
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::RESOLUTION_ORDER.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Declarations
// =============================================================================

/// How a type derives from its base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationKind {
    ComplexExtension,
    ComplexRestriction,
    SimpleContentExtension,
    SimpleContentRestriction,
    SimpleRestriction,
}

impl DerivationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComplexExtension => "complexContent/extension",
            Self::ComplexRestriction => "complexContent/restriction",
            Self::SimpleContentExtension => "simpleContent/extension",
            Self::SimpleContentRestriction => "simpleContent/restriction",
            Self::SimpleRestriction => "simpleType/restriction",
        }
    }

    pub fn is_extension(&self) -> bool {
        matches!(self, Self::ComplexExtension | Self::SimpleContentExtension)
    }
}

/// Base-type reference of a derived type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    pub kind: DerivationKind,
    pub base: QName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDecl {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<QName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitution_group: Option<QName>,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexTypeDef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<Derivation>,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub mixed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

/// Simple type variety
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimpleVariety {
    Restriction {
        #[serde(skip_serializing_if = "Option::is_none")]
        base: Option<QName>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        enumerations: Vec<String>,
    },
    List {
        #[serde(skip_serializing_if = "Option::is_none")]
        item_type: Option<QName>,
    },
    Union {
        member_types: Vec<QName>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleTypeDef {
    pub name: String,
    pub variety: SimpleVariety,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDecl {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<QName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDef {
    pub name: String,
    /// `sequence`, `choice` or `all`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compositor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeGroupDef {
    pub name: String,
    /// Names of locally declared attributes, in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

/// A named top-level schema component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declaration {
    Element(ElementDecl),
    ComplexType(ComplexTypeDef),
    SimpleType(SimpleTypeDef),
    Attribute(AttributeDecl),
    Group(GroupDef),
    AttributeGroup(AttributeGroupDef),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Self::Element(d) => &d.name,
            Self::ComplexType(d) => &d.name,
            Self::SimpleType(d) => &d.name,
            Self::Attribute(d) => &d.name,
            Self::Group(d) => &d.name,
            Self::AttributeGroup(d) => &d.name,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Element(_) => Category::Element,
            Self::ComplexType(_) => Category::ComplexType,
            Self::SimpleType(_) => Category::SimpleType,
            Self::Attribute(_) => Category::Attribute,
            Self::Group(_) => Category::Group,
            Self::AttributeGroup(_) => Category::AttributeGroup,
        }
    }

    pub fn documentation(&self) -> Option<&str> {
        match self {
            Self::Element(d) => d.documentation.as_deref(),
            Self::ComplexType(d) => d.documentation.as_deref(),
            Self::SimpleType(d) => d.documentation.as_deref(),
            Self::Attribute(d) => d.documentation.as_deref(),
            Self::Group(d) => d.documentation.as_deref(),
            Self::AttributeGroup(d) => d.documentation.as_deref(),
        }
    }

    /// The base-type reference and how it is used, for derived types only
    pub fn derivation(&self) -> Option<(DerivationKind, &QName)> {
        match self {
            Self::ComplexType(ct) => ct.derivation.as_ref().map(|d| (d.kind, &d.base)),
            Self::SimpleType(SimpleTypeDef {
                variety: SimpleVariety::Restriction { base: Some(base), .. },
                ..
            }) => Some((DerivationKind::SimpleRestriction, base)),
            _ => None,
        }
    }

    pub fn base_type(&self) -> Option<&QName> {
        self.derivation().map(|(_, base)| base)
    }
}

// =============================================================================
// Directives & Documents
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    Import,
    Include,
    Redefine,
}

impl DirectiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Include => "include",
            Self::Redefine => "redefine",
        }
    }
}

/// An `xs:import` / `xs:include` / `xs:redefine` directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub kind: DirectiveKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One parsed schema file
#[derive(Debug)]
pub struct SchemaDocument {
    location: String,
    source: Arc<str>,
    target_namespace: Option<String>,
    namespaces: Vec<(String, String)>,
    declarations: Vec<Declaration>,
    directives: Vec<Directive>,
}

impl SchemaDocument {
    pub(crate) fn new(
        location: String,
        source: Arc<str>,
        target_namespace: Option<String>,
        namespaces: Vec<(String, String)>,
        declarations: Vec<Declaration>,
        directives: Vec<Directive>,
    ) -> Self {
        Self {
            location,
            source,
            target_namespace,
            namespaces,
            declarations,
            directives,
        }
    }

    /// Canonical location this document was loaded from
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Raw document text
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// Prefixed namespace declarations on the root element
    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// File name portion of the location
    pub fn basename(&self) -> &str {
        basename(&self.location)
    }

    /// Qualified name of a declaration in this document
    pub fn qname_of(&self, declaration: &Declaration) -> QName {
        QName::new(self.target_namespace(), declaration.name())
    }
}

/// Last path segment of a location, for either separator style
pub fn basename(location: &str) -> &str {
    location
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(location)
}
