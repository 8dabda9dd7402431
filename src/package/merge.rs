//! Package Merge Resolution
//!
//! Arbitrates conflicting symbols between package sources and assembles
//! one repository from the winners.
//!
//! Sources are ranked by ascending priority, registration order breaking
//! ties. For a contested symbol an `override` contributor with the highest
//! priority wins; with no `override` contributor the lowest-priority `keep`
//! source wins. Any conflict touching an `error` source aborts the merge.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::config::MergeConfig;
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::error::{PackageMergeError, Result, SchemaError};
use crate::loader::SchemaLocationMapping;
use crate::package::conflict::{ConflictDetector, ConflictReport};
use crate::package::{ConflictResolution, PackageSource};
use crate::repository::{IndexKey, NamespaceMapping, Repository, RepositoryParts, TypeIndex};
use crate::xsd::{basename, SchemaDocument};

#[derive(Debug, Clone, Default)]
pub struct MergeResolver {
    config: MergeConfig,
}

impl MergeResolver {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Merge `sources` into a new repository; inputs are left untouched
    pub fn merge(&self, sources: &[PackageSource]) -> Result<Repository> {
        let ranked = rank(sources);
        let report = ConflictDetector::detect(sources);
        check_error_strategies(sources, &report)?;

        // Union index
        let mut contributors: BTreeMap<&IndexKey, Vec<usize>> = BTreeMap::new();
        for &i in &ranked {
            for key in sources[i].repository.index().keys() {
                contributors.entry(key).or_default().push(i);
            }
        }

        let mut index = TypeIndex::default();
        let mut contested = 0;
        for (key, members) in &contributors {
            let winner = if members.len() == 1 {
                members[0]
            } else {
                contested += 1;
                let symbol = format!("{} {}", key.category, key.qname());
                self.arbitrate(sources, members, &symbol)?
            };
            if let Some(entry) = sources[winner].repository.index().get(key) {
                tracing::trace!(symbol = %key.qname(), package = %sources[winner].package_path, "Merged declaration");
                index.insert((*key).clone(), entry.clone());
            }
        }

        // Schema files: one winning source per contested basename
        let mut sources_by_basename: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for &i in &ranked {
            for document in sources[i].repository.documents() {
                let sources_for = sources_by_basename.entry(basename(document.location())).or_default();
                if !sources_for.contains(&i) {
                    sources_for.push(i);
                }
            }
        }
        let mut file_winner: BTreeMap<&str, usize> = BTreeMap::new();
        for (name, members) in &sources_by_basename {
            let winner = if members.len() == 1 {
                members[0]
            } else {
                self.arbitrate(sources, members, &format!("schema file {}", name))?
            };
            file_winner.insert(*name, winner);
        }
        let mut files = Vec::new();
        for &i in &ranked {
            for file in sources[i].repository.files() {
                if file_winner.get(basename(file)) == Some(&i) && !files.contains(file) {
                    files.push(file.clone());
                }
            }
        }

        // A losing document stays only while a merged declaration lives in it
        let referenced: HashSet<*const SchemaDocument> =
            index.iter().map(|(_, entry)| Arc::as_ptr(entry.document())).collect();

        let mut diagnostics = Diagnostics::new();
        let mapping_order = ranked_for_mappings(sources, &ranked);
        let namespace_mappings = union_namespace_mappings(sources, &mapping_order, &mut diagnostics);

        let mut documents = Vec::new();
        let mut seen_documents = HashSet::new();
        let mut location_mappings: Vec<SchemaLocationMapping> = Vec::new();
        let mut namespace_aliases = BTreeMap::new();
        let mut unresolved = Vec::new();
        for &i in &ranked {
            let repository = &sources[i].repository;
            for document in repository.documents() {
                let wins = file_winner.get(basename(document.location())) == Some(&i);
                let pointer = Arc::as_ptr(document);
                if !wins && !referenced.contains(&pointer) {
                    tracing::debug!(
                        location = document.location(),
                        package = %sources[i].package_path,
                        "Dropped losing schema file"
                    );
                    continue;
                }
                if seen_documents.insert(pointer) {
                    documents.push(document.clone());
                }
            }
            for mapping in repository.schema_location_mappings() {
                if !location_mappings.contains(mapping) {
                    location_mappings.push(mapping.clone());
                }
            }
            for (from, to) in repository.namespace_aliases() {
                namespace_aliases.entry(from.clone()).or_insert_with(|| to.clone());
            }
            unresolved.extend(repository.unresolved_directives().iter().cloned());
            for item in repository.diagnostics() {
                // Recomputed over the merged index
                if item.code != DiagnosticCode::CircularDerivation {
                    diagnostics.push(item.clone());
                }
            }
        }

        // An old URI some package still declares natively keeps its own meaning
        let declared: HashSet<&str> = index.namespaces().into_iter().flatten().collect();
        namespace_aliases.retain(|from: &String, _| !declared.contains(from.as_str()));

        let merged = Repository::assemble(
            RepositoryParts {
                files,
                namespace_mappings,
                location_mappings,
                documents,
                namespace_aliases,
                diagnostics,
                unresolved,
            },
            index,
        );

        tracing::info!(
            packages = sources.len(),
            declarations = merged.index().len(),
            contested,
            conflicts = report.total_conflicts(),
            "Merged packages"
        );
        Ok(merged)
    }

    /// Winning source among `members` (given in ranked order)
    fn arbitrate(&self, sources: &[PackageSource], members: &[usize], symbol: &str) -> Result<usize> {
        let overrides: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| sources[i].strategy == ConflictResolution::Override)
            .collect();

        let (candidates, best) = if overrides.is_empty() {
            let best = members.iter().map(|&i| sources[i].priority).min();
            (members.to_vec(), best)
        } else {
            let best = overrides.iter().map(|&i| sources[i].priority).max();
            (overrides, best)
        };

        let tied: Vec<usize> = candidates
            .into_iter()
            .filter(|&i| Some(sources[i].priority) == best)
            .collect();

        if tied.len() > 1 && self.config.reject_equal_priority_ties {
            let packages: Vec<&str> = tied.iter().map(|&i| sources[i].package_path.as_str()).collect();
            return Err(SchemaError::config(format!(
                "{} is contributed by packages with equal priority: {}",
                symbol,
                packages.join(", ")
            )));
        }

        tied.first().copied().ok_or_else(|| {
            SchemaError::config(format!("no package contributes {}", symbol))
        })
    }
}

/// Source indices by ascending priority, registration order for ties
fn rank(sources: &[PackageSource]) -> Vec<usize> {
    let mut ranked: Vec<usize> = (0..sources.len()).collect();
    ranked.sort_by_key(|&i| sources[i].priority);
    ranked
}

/// Overrides by descending priority first, then everything else ascending
fn ranked_for_mappings(sources: &[PackageSource], ranked: &[usize]) -> Vec<usize> {
    let mut overrides: Vec<usize> = ranked
        .iter()
        .copied()
        .filter(|&i| sources[i].strategy == ConflictResolution::Override)
        .collect();
    overrides.sort_by(|&a, &b| sources[b].priority.cmp(&sources[a].priority));

    let rest = ranked
        .iter()
        .copied()
        .filter(|&i| sources[i].strategy != ConflictResolution::Override);
    overrides.into_iter().chain(rest).collect()
}

fn union_namespace_mappings(
    sources: &[PackageSource],
    order: &[usize],
    diagnostics: &mut Diagnostics,
) -> Vec<NamespaceMapping> {
    let mut mappings: Vec<NamespaceMapping> = Vec::new();

    for &i in order {
        for mapping in sources[i].repository.namespace_mappings() {
            if mappings.iter().any(|m| m.uri == mapping.uri) {
                continue;
            }
            if !mappings.iter().any(|m| m.prefix == mapping.prefix) {
                mappings.push(mapping.clone());
                continue;
            }

            let fresh = (1..)
                .map(|n| format!("{}{}", mapping.prefix, n))
                .find(|candidate| !mappings.iter().any(|m| &m.prefix == candidate))
                .unwrap_or_else(|| format!("{}_", mapping.prefix));
            diagnostics.prefix_rebound(&sources[i].package_path, &mapping.prefix, &mapping.uri, &fresh);
            mappings.push(NamespaceMapping::new(fresh, mapping.uri.clone()));
        }
    }

    mappings
}

/// Abort when a conflict involves an `error` source; types first, then
/// namespaces, then schema files
fn check_error_strategies(sources: &[PackageSource], report: &ConflictReport) -> Result<()> {
    let is_error = |path: &String| {
        sources
            .iter()
            .any(|s| &s.package_path == path && s.strategy == ConflictResolution::Error)
    };

    let offending = report
        .type_conflicts
        .iter()
        .find(|c| c.package_paths.iter().any(is_error))
        .map(|c| (c.symbol(), c.package_paths.clone()))
        .or_else(|| {
            report
                .namespace_conflicts
                .iter()
                .find(|c| c.package_paths.iter().any(is_error))
                .map(|c| (format!("namespace {}", c.namespace_uri), c.package_paths.clone()))
        })
        .or_else(|| {
            report
                .schema_file_conflicts
                .iter()
                .map(|c| (c, c.package_paths()))
                .find(|(_, paths)| paths.iter().any(is_error))
                .map(|(c, paths)| (format!("schema file {}", c.basename), paths))
        });

    match offending {
        Some((symbol, packages)) => Err(PackageMergeError {
            symbol,
            packages,
            report: report.clone(),
        }
        .into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Loader, MemorySource, SchemaCache};
    use crate::xsd::{Category, Declaration, QName};

    fn repo(file: &str, prefix: &str, namespace: &str, body: &str) -> Repository {
        let text = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:{p}="{ns}" targetNamespace="{ns}">{body}</xs:schema>"#,
            p = prefix,
            ns = namespace,
            body = body
        );
        let source = MemorySource::new().with(file, text);
        Loader::new(&source).load(&[file], &mut SchemaCache::new()).unwrap()
    }

    fn source(path: &str, priority: u32, strategy: ConflictResolution, mixed: bool) -> PackageSource {
        let body = format!(r#"<xs:complexType name="T" mixed="{}"/>"#, mixed);
        PackageSource::new(path, repo(&format!("{}.xsd", path), "n", "urn:n", &body))
            .with_priority(priority)
            .with_strategy(strategy)
    }

    fn merged_t(repository: &Repository) -> &Declaration {
        repository
            .find_declaration(&QName::new(Some("urn:n"), "T"), Category::ComplexType)
            .unwrap()
    }

    fn is_mixed(declaration: &Declaration) -> bool {
        match declaration {
            Declaration::ComplexType(def) => def.mixed,
            _ => false,
        }
    }

    #[test]
    fn test_override_takes_highest_priority() {
        let a = source("a", 0, ConflictResolution::Override, false);
        let b = source("b", 10, ConflictResolution::Override, true);
        let merged = MergeResolver::default().merge(&[b, a]).unwrap();
        assert!(is_mixed(merged_t(&merged)));
        assert_eq!(merged.index().len(), 1);
    }

    #[test]
    fn test_keep_takes_lowest_priority() {
        let a = source("a", 0, ConflictResolution::Keep, false);
        let b = source("b", 10, ConflictResolution::Keep, true);
        let merged = MergeResolver::default().merge(&[a, b]).unwrap();
        assert!(!is_mixed(merged_t(&merged)));
    }

    #[test]
    fn test_override_beats_keep() {
        let a = source("a", 10, ConflictResolution::Keep, false);
        let b = source("b", 0, ConflictResolution::Override, true);
        let merged = MergeResolver::default().merge(&[a, b]).unwrap();
        assert!(is_mixed(merged_t(&merged)));
    }

    #[test]
    fn test_error_strategy_aborts() {
        let a = source("a", 0, ConflictResolution::Keep, false);
        let b = source("b", 10, ConflictResolution::Error, true);
        let err = MergeResolver::default().merge(&[a, b]).unwrap_err();
        match err {
            SchemaError::Merge(e) => {
                assert_eq!(e.symbol, "{urn:n}T");
                assert_eq!(e.packages, vec!["a", "b"]);
                assert!(e.report.has_conflicts());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_equal_priority_ties() {
        let a = source("a", 5, ConflictResolution::Keep, false);
        let b = source("b", 5, ConflictResolution::Keep, true);
        let merged = MergeResolver::default().merge(&[a.clone(), b.clone()]).unwrap();
        assert!(!is_mixed(merged_t(&merged)));

        let strict = MergeResolver::new(MergeConfig {
            reject_equal_priority_ties: true,
            ..MergeConfig::default()
        });
        let err = strict.merge(&[a, b]).unwrap_err();
        assert!(matches!(err, SchemaError::Configuration(ref m) if m.contains("equal priority")));
    }

    #[test]
    fn test_non_conflicting_symbols_survive() {
        let a = PackageSource::new("a", repo("a.xsd", "a", "urn:a", r#"<xs:complexType name="A"/>"#));
        let b = PackageSource::new("b", repo("b.xsd", "b", "urn:b", r#"<xs:complexType name="B"/>"#));
        let merged = MergeResolver::default().merge(&[a.clone(), b]).unwrap();

        assert_eq!(merged.all_namespaces(), vec!["urn:a".to_string(), "urn:b".to_string()]);
        assert_eq!(merged.files(), &["a.xsd".to_string(), "b.xsd".to_string()]);
        assert_eq!(merged.uri_for("b"), Some("urn:b"));
        assert_eq!(a.repository.index().len(), 1);
    }

    #[test]
    fn test_prefix_rebound_on_clash() {
        let a = PackageSource::new("a", repo("a.xsd", "p", "urn:a", r#"<xs:complexType name="A"/>"#));
        let b = PackageSource::new("b", repo("b.xsd", "p", "urn:b", r#"<xs:complexType name="B"/>"#))
            .with_priority(1);
        let merged = MergeResolver::default().merge(&[a, b]).unwrap();

        assert_eq!(merged.uri_for("p"), Some("urn:a"));
        assert_eq!(merged.uri_for("p1"), Some("urn:b"));
        assert_eq!(merged.diagnostics().with_code(DiagnosticCode::PrefixRebound).count(), 1);
    }

    #[test]
    fn test_conflicting_file_keeps_winner() {
        let a = PackageSource::new("a", repo("types.xsd", "n", "urn:n", r#"<xs:complexType name="T"/>"#))
            .with_strategy(ConflictResolution::Keep);
        let b = PackageSource::new("b", repo("types.xsd", "n", "urn:n", r#"<xs:complexType name="T" mixed="true"/>"#))
            .with_priority(3)
            .with_strategy(ConflictResolution::Override);
        let merged = MergeResolver::default().merge(&[a, b.clone()]).unwrap();

        assert_eq!(merged.files().len(), 1);
        assert!(is_mixed(merged_t(&merged)));
        let entry = merged.index().iter().next().unwrap().1;
        assert!(Arc::ptr_eq(entry.document(), &b.repository.documents()[0]));
    }

    #[test]
    fn test_losing_file_is_dropped_and_result_bundles() {
        let a = PackageSource::new("a", repo("types.xsd", "n", "urn:n", r#"<xs:complexType name="T"/>"#))
            .with_strategy(ConflictResolution::Keep);
        let b = PackageSource::new("b", repo("types.xsd", "n", "urn:n", r#"<xs:complexType name="T" mixed="true"/>"#))
            .with_priority(3)
            .with_strategy(ConflictResolution::Override);
        let merged = MergeResolver::default().merge(&[a, b.clone()]).unwrap();

        assert_eq!(merged.documents().len(), 1);
        assert!(Arc::ptr_eq(&merged.documents()[0], &b.repository.documents()[0]));
        assert_eq!(merged.statistics().documents, 1);

        let bundle = merged.to_bundle(Some("merged")).unwrap();
        assert_eq!(bundle.files.len(), 1);
        assert!(bundle.files[0].content.contains(r#"mixed="true""#));
    }

    #[test]
    fn test_losing_file_kept_while_it_holds_merged_declarations() {
        let a = PackageSource::new(
            "a",
            repo("types.xsd", "n", "urn:n", r#"<xs:complexType name="T"/><xs:complexType name="OnlyA"/>"#),
        )
        .with_strategy(ConflictResolution::Keep);
        let b = PackageSource::new("b", repo("types.xsd", "n", "urn:n", r#"<xs:complexType name="T" mixed="true"/>"#))
            .with_priority(3)
            .with_strategy(ConflictResolution::Override);
        let merged = MergeResolver::default().merge(&[a, b]).unwrap();

        assert_eq!(merged.documents().len(), 2);
        assert!(merged
            .find_declaration(&QName::new(Some("urn:n"), "OnlyA"), Category::ComplexType)
            .is_some());
    }
}
