//! Namespace prefix remapping
//!
//! Renames prefixes of a resolved repository. The result shares documents
//! and the type index with its input; only the prefix table is rebuilt.

use std::collections::BTreeMap;

use crate::error::RemapError;
use crate::repository::{NamespaceMapping, Repository};

pub struct NamespaceRemapper;

impl NamespaceRemapper {
    /// Apply every `old prefix -> new prefix` change at once.
    ///
    /// Two prefixes may swap in one call. Validation happens before
    /// anything is copied, so a rejected request leaves nothing behind.
    pub fn remap(repository: &Repository, changes: &BTreeMap<String, String>) -> Result<Repository, RemapError> {
        let mappings = Self::remapped_mappings(repository.namespace_mappings(), changes)?;

        let mut remapped = repository.clone();
        remapped.namespace_mappings = mappings;

        tracing::debug!(changes = changes.len(), "Remapped namespace prefixes");
        Ok(remapped)
    }

    fn remapped_mappings(
        mappings: &[NamespaceMapping],
        changes: &BTreeMap<String, String>,
    ) -> Result<Vec<NamespaceMapping>, RemapError> {
        for (old, new) in changes {
            if !mappings.iter().any(|m| &m.prefix == old) {
                return Err(RemapError::UnknownPrefix { prefix: old.clone() });
            }
            if new.trim().is_empty() {
                return Err(RemapError::EmptyPrefix { prefix: old.clone() });
            }
        }

        let renamed: Vec<NamespaceMapping> = mappings
            .iter()
            .map(|m| NamespaceMapping::new(changes.get(&m.prefix).unwrap_or(&m.prefix).as_str(), m.uri.as_str()))
            .collect();

        let mut by_prefix: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for mapping in &renamed {
            let uris = by_prefix.entry(mapping.prefix.as_str()).or_default();
            if !uris.contains(&mapping.uri.as_str()) {
                uris.push(mapping.uri.as_str());
            }
        }
        if let Some((prefix, uris)) = by_prefix.into_iter().find(|(_, uris)| uris.len() > 1) {
            let mut uris: Vec<String> = uris.into_iter().map(String::from).collect();
            uris.sort();
            return Err(RemapError::PrefixConflict {
                prefix: prefix.to_string(),
                uris,
            });
        }

        let mut result: Vec<NamespaceMapping> = Vec::with_capacity(renamed.len());
        for mapping in renamed {
            if !result.contains(&mapping) {
                result.push(mapping);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Loader, MemorySource, SchemaCache};
    use std::sync::Arc;

    fn repository() -> Repository {
        let source = MemorySource::new().with(
            "main.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:a="urn:a" xmlns:b="urn:b"
                          targetNamespace="urn:a">
                 <xs:complexType name="T"/>
               </xs:schema>"#,
        );
        Loader::new(&source).load(&["main.xsd"], &mut SchemaCache::new()).unwrap()
    }

    fn changes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn test_swap_prefixes() {
        let repo = repository();
        let swapped = NamespaceRemapper::remap(&repo, &changes(&[("a", "b"), ("b", "a")])).unwrap();

        assert_eq!(swapped.uri_for("a"), Some("urn:b"));
        assert_eq!(swapped.uri_for("b"), Some("urn:a"));
        assert_eq!(swapped.uri_for("xs"), repo.uri_for("xs"));
        assert!(Arc::ptr_eq(swapped.index_arc(), repo.index_arc()));
        assert!(Arc::ptr_eq(&swapped.documents()[0], &repo.documents()[0]));
        assert_eq!(swapped.files(), repo.files());
        assert_eq!(swapped.is_resolved(), repo.is_resolved());
    }

    #[test]
    fn test_conflict_leaves_input_alone() {
        let repo = repository();
        let before = repo.namespace_mappings().to_vec();

        let err = NamespaceRemapper::remap(&repo, &changes(&[("a", "b")])).unwrap_err();
        assert_eq!(err.code(), "prefix_conflict");
        assert_eq!(
            err,
            RemapError::PrefixConflict {
                prefix: "b".into(),
                uris: vec!["urn:a".into(), "urn:b".into()]
            }
        );
        assert_eq!(repo.namespace_mappings(), before.as_slice());
    }

    #[test]
    fn test_unknown_and_empty_prefix() {
        let repo = repository();
        let err = NamespaceRemapper::remap(&repo, &changes(&[("zz", "y")])).unwrap_err();
        assert_eq!(err.code(), "unknown_prefix");

        let err = NamespaceRemapper::remap(&repo, &changes(&[("a", " ")])).unwrap_err();
        assert_eq!(err.code(), "empty_prefix");
    }

    #[test]
    fn test_rename_to_fresh_prefix() {
        let repo = repository();
        let renamed = NamespaceRemapper::remap(&repo, &changes(&[("a", "alpha")])).unwrap();
        assert_eq!(renamed.uri_for("alpha"), Some("urn:a"));
        assert_eq!(renamed.uri_for("a"), None);
        assert_eq!(renamed.display_name(&crate::xsd::QName::new(Some("urn:a"), "T")), "alpha:T");
    }
}
