//! Type Index
//!
//! Namespace-partitioned map from (namespace, local name, category) to the
//! declaration that owns the key. Entries point into shared documents, so
//! lookups hand out references to the very declaration that was parsed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::xsd::{Category, Declaration, QName, SchemaDocument};

/// Unique key of an indexed declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey {
    pub namespace: Option<String>,
    pub name: String,
    pub category: Category,
}

impl IndexKey {
    pub fn new(namespace: Option<&str>, name: impl Into<String>, category: Category) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(String::from),
            name: name.into(),
            category,
        }
    }

    pub fn qname(&self) -> QName {
        QName::new(self.namespace.as_deref(), self.name.as_str())
    }
}

/// Location of an indexed declaration inside its document
#[derive(Debug, Clone)]
pub struct IndexEntry {
    document: Arc<SchemaDocument>,
    position: usize,
}

impl IndexEntry {
    pub fn declaration(&self) -> &Declaration {
        &self.document.declarations()[self.position]
    }

    pub fn document(&self) -> &Arc<SchemaDocument> {
        &self.document
    }

    pub fn location(&self) -> &str {
        self.document.location()
    }
}

/// A key that was declared more than once
#[derive(Debug, Clone)]
pub struct DuplicateKey {
    pub key: IndexKey,
    pub location: String,
    pub first_location: String,
}

/// Serialized index row stored in bundles
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SerializedIndexEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub category: Category,
    pub file: String,
}

#[derive(Debug, Clone, Default)]
pub struct TypeIndex {
    entries: BTreeMap<IndexKey, IndexEntry>,
}

impl TypeIndex {
    /// Index every top-level declaration; the first declaration of a key wins.
    ///
    /// `namespace_of` maps a document's target namespace to the namespace the
    /// declaration is indexed under, which differs only after URI remapping.
    pub fn build<F>(documents: &[Arc<SchemaDocument>], namespace_of: F) -> (Self, Vec<DuplicateKey>)
    where
        F: Fn(Option<&str>) -> Option<String>,
    {
        let mut index = Self::default();
        let mut duplicates = Vec::new();

        for document in documents {
            let namespace = namespace_of(document.target_namespace());
            for (position, declaration) in document.declarations().iter().enumerate() {
                let key = IndexKey::new(namespace.as_deref(), declaration.name(), declaration.category());
                match index.entries.get(&key) {
                    Some(existing) => duplicates.push(DuplicateKey {
                        key,
                        location: document.location().to_string(),
                        first_location: existing.location().to_string(),
                    }),
                    None => {
                        index.entries.insert(
                            key,
                            IndexEntry {
                                document: document.clone(),
                                position,
                            },
                        );
                    }
                }
            }
        }

        (index, duplicates)
    }

    pub(crate) fn insert(&mut self, key: IndexKey, entry: IndexEntry) {
        self.entries.insert(key, entry);
    }

    pub fn get(&self, key: &IndexKey) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    /// Find `(namespace, name)` across categories in resolution order
    pub fn lookup(&self, namespace: Option<&str>, name: &str) -> Option<(Category, &IndexEntry)> {
        Category::RESOLUTION_ORDER.into_iter().find_map(|category| {
            self.entries
                .get(&IndexKey::new(namespace, name, category))
                .map(|entry| (category, entry))
        })
    }

    /// Declared namespaces, `None` for the no-namespace partition
    pub fn namespaces(&self) -> BTreeSet<Option<&str>> {
        self.entries.keys().map(|k| k.namespace.as_deref()).collect()
    }

    /// Local names declared in one namespace, any category
    pub fn names_in(&self, namespace: Option<&str>) -> BTreeSet<&str> {
        self.entries
            .keys()
            .filter(|k| k.namespace.as_deref() == namespace)
            .map(|k| k.name.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexKey, &IndexEntry)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &IndexKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows for a bundle's `index.json`; `relative` maps document locations
    /// to bundle-relative paths
    pub fn to_serialized<F>(&self, relative: F) -> Vec<SerializedIndexEntry>
    where
        F: Fn(&str) -> String,
    {
        self.entries
            .iter()
            .map(|(key, entry)| SerializedIndexEntry {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
                category: key.category,
                file: relative(entry.location()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsd::{parse_document, ParseOptions};

    fn doc(location: &str, body: &str) -> Arc<SchemaDocument> {
        let text = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">{body}</xs:schema>"#
        );
        Arc::new(parse_document(location, Arc::from(text), &ParseOptions::default()).unwrap())
    }

    fn identity(ns: Option<&str>) -> Option<String> {
        ns.map(String::from)
    }

    #[test]
    fn test_same_name_different_categories() {
        let d = doc("a.xsd", r#"<xs:element name="Item"/><xs:complexType name="Item"/>"#);
        let (index, duplicates) = TypeIndex::build(&[d], identity);
        assert!(duplicates.is_empty());
        assert_eq!(index.len(), 2);

        let (category, _) = index.lookup(Some("urn:t"), "Item").unwrap();
        assert_eq!(category, Category::ComplexType);
    }

    #[test]
    fn test_first_declaration_wins() {
        let a = doc("a.xsd", r#"<xs:complexType name="T"/>"#);
        let b = doc("b.xsd", r#"<xs:complexType name="T" mixed="true"/>"#);
        let (index, duplicates) = TypeIndex::build(&[a, b], identity);

        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].location, "b.xsd");
        assert_eq!(duplicates[0].first_location, "a.xsd");
        let entry = index.get(&IndexKey::new(Some("urn:t"), "T", Category::ComplexType)).unwrap();
        assert_eq!(entry.location(), "a.xsd");
    }

    #[test]
    fn test_namespace_override_and_serialization() {
        let d = doc("dir/a.xsd", r#"<xs:simpleType name="S"><xs:restriction base="xs:string"/></xs:simpleType>"#);
        let (index, _) = TypeIndex::build(&[d], |_| Some("urn:new".to_string()));
        assert_eq!(index.names_in(Some("urn:new")).into_iter().collect::<Vec<_>>(), vec!["S"]);

        let rows = index.to_serialized(|loc| loc.trim_start_matches("dir/").to_string());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file, "a.xsd");
        assert_eq!(rows[0].category, Category::SimpleType);
    }
}
