//! Package Conflict Detection
//!
//! Read-only comparison of package sources. Each conflict lists its
//! contributors sorted by package path, so the report does not depend on
//! the order the sources were given in.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::config::RepositoryConfig;
use crate::error::Result;
use crate::package::{ConflictResolution, PackageSource, PackageSpec, PackageStore};
use crate::repository::IndexKey;
use crate::xsd::{basename, Category, QName};

/// A namespace URI declared by two sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConflict {
    pub namespace_uri: String,
    pub package_paths: Vec<String>,
    pub priorities: Vec<u32>,
}

/// A local name in one namespace declared by more than one source.
///
/// An element and a type sharing the name are one conflict; `categories`
/// lists every kind of declaration the contributors made under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeConflict {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    pub categories: Vec<Category>,
    pub package_paths: Vec<String>,
    pub priorities: Vec<u32>,
}

impl TypeConflict {
    pub fn qname(&self) -> QName {
        QName::new(self.namespace.as_deref(), self.name.as_str())
    }

    /// Index keys under this name
    pub fn keys(&self) -> Vec<IndexKey> {
        self.categories
            .iter()
            .map(|&category| IndexKey::new(self.namespace.as_deref(), self.name.as_str(), category))
            .collect()
    }

    /// `{uri}name`
    pub fn symbol(&self) -> String {
        self.qname().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFileEntry {
    pub package_path: String,
    pub file_path: String,
    pub priority: u32,
}

/// Schema files sharing a basename across sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFileConflict {
    pub basename: String,
    pub entries: Vec<SchemaFileEntry>,
}

impl SchemaFileConflict {
    /// Distinct contributing packages
    pub fn package_paths(&self) -> Vec<String> {
        let paths: BTreeSet<&str> = self.entries.iter().map(|e| e.package_path.as_str()).collect();
        paths.into_iter().map(String::from).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub package_path: String,
    pub priority: u32,
    pub strategy: ConflictResolution,
    pub namespaces: usize,
    pub declarations: usize,
    pub schema_files: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub namespace_conflicts: Vec<NamespaceConflict>,
    pub type_conflicts: Vec<TypeConflict>,
    pub schema_file_conflicts: Vec<SchemaFileConflict>,
    /// One entry per source, in input order
    pub packages: Vec<PackageSummary>,
}

impl ConflictReport {
    pub fn has_conflicts(&self) -> bool {
        self.total_conflicts() > 0
    }

    pub fn total_conflicts(&self) -> usize {
        self.namespace_conflicts.len() + self.type_conflicts.len() + self.schema_file_conflicts.len()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_conflicts() {
            return writeln!(f, "No conflicts between {} package(s)", self.packages.len());
        }

        writeln!(
            f,
            "{} conflict(s) between {} package(s)",
            self.total_conflicts(),
            self.packages.len()
        )?;

        if !self.namespace_conflicts.is_empty() {
            writeln!(f, "\nNamespace conflicts ({}):", self.namespace_conflicts.len())?;
            for conflict in &self.namespace_conflicts {
                writeln!(
                    f,
                    "  {}: {}",
                    conflict.namespace_uri,
                    contributors(&conflict.package_paths, &conflict.priorities)
                )?;
            }
        }

        if !self.type_conflicts.is_empty() {
            writeln!(f, "\nType conflicts ({}):", self.type_conflicts.len())?;
            for conflict in &self.type_conflicts {
                let categories: Vec<&str> = conflict.categories.iter().map(Category::as_str).collect();
                writeln!(
                    f,
                    "  {} [{}]: {}",
                    conflict.symbol(),
                    categories.join(", "),
                    contributors(&conflict.package_paths, &conflict.priorities)
                )?;
            }
        }

        if !self.schema_file_conflicts.is_empty() {
            writeln!(f, "\nSchema file conflicts ({}):", self.schema_file_conflicts.len())?;
            for conflict in &self.schema_file_conflicts {
                writeln!(f, "  {}:", conflict.basename)?;
                for entry in &conflict.entries {
                    writeln!(f, "    - {} (priority {})", entry.file_path, entry.priority)?;
                }
            }
        }

        Ok(())
    }
}

fn contributors(paths: &[String], priorities: &[u32]) -> String {
    paths
        .iter()
        .zip(priorities)
        .map(|(path, priority)| format!("{} (priority {})", path, priority))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Detection
// =============================================================================

pub struct ConflictDetector;

impl ConflictDetector {
    /// Compare every source against every other
    pub fn detect(sources: &[PackageSource]) -> ConflictReport {
        let report = ConflictReport {
            namespace_conflicts: namespace_conflicts(sources),
            type_conflicts: type_conflicts(sources),
            schema_file_conflicts: schema_file_conflicts(sources),
            packages: sources.iter().map(summarize).collect(),
        };

        tracing::debug!(
            packages = sources.len(),
            namespaces = report.namespace_conflicts.len(),
            types = report.type_conflicts.len(),
            files = report.schema_file_conflicts.len(),
            "Detected package conflicts"
        );
        report
    }
}

/// Load every configured package, then detect conflicts between them
pub fn detect_conflicts(
    specs: &[PackageSpec],
    store: &dyn PackageStore,
    config: &RepositoryConfig,
) -> Result<ConflictReport> {
    let sources = specs
        .iter()
        .map(|spec| PackageSource::load(spec, store, config))
        .collect::<Result<Vec<_>>>()?;

    let report = ConflictDetector::detect(&sources);
    tracing::info!(
        packages = sources.len(),
        conflicts = report.total_conflicts(),
        "Package conflict detection complete"
    );
    Ok(report)
}

fn summarize(source: &PackageSource) -> PackageSummary {
    PackageSummary {
        package_path: source.package_path.clone(),
        priority: source.priority,
        strategy: source.strategy,
        namespaces: source.repository.all_namespaces().len(),
        declarations: source.repository.index().len(),
        schema_files: source.repository.documents().len(),
    }
}

/// Contributing sources sorted by package path, then priority
fn sorted_contributors(sources: &[PackageSource], members: &[usize]) -> (Vec<String>, Vec<u32>) {
    let mut members: Vec<&PackageSource> = members.iter().map(|&i| &sources[i]).collect();
    members.sort_by(|a, b| {
        a.package_path
            .cmp(&b.package_path)
            .then_with(|| a.priority.cmp(&b.priority))
    });
    members
        .into_iter()
        .map(|s| (s.package_path.clone(), s.priority))
        .unzip()
}

fn namespace_conflicts(sources: &[PackageSource]) -> Vec<NamespaceConflict> {
    let namespaces: Vec<BTreeSet<String>> = sources
        .iter()
        .map(|s| s.repository.all_namespaces().into_iter().collect())
        .collect();

    let mut conflicts = Vec::new();
    for i in 0..sources.len() {
        for j in (i + 1)..sources.len() {
            for uri in namespaces[i].intersection(&namespaces[j]) {
                let (package_paths, priorities) = sorted_contributors(sources, &[i, j]);
                conflicts.push(NamespaceConflict {
                    namespace_uri: uri.clone(),
                    package_paths,
                    priorities,
                });
            }
        }
    }

    conflicts.sort_by(|a, b| {
        a.namespace_uri
            .cmp(&b.namespace_uri)
            .then_with(|| a.package_paths.cmp(&b.package_paths))
    });
    conflicts
}

/// Declarations of one (namespace, local name): contributing sources and
/// the categories they used
#[derive(Default)]
struct NameUse {
    sources: BTreeSet<usize>,
    categories: BTreeSet<Category>,
}

fn type_conflicts(sources: &[PackageSource]) -> Vec<TypeConflict> {
    let mut declared_by: BTreeMap<(Option<&str>, &str), NameUse> = BTreeMap::new();
    for (i, source) in sources.iter().enumerate() {
        for key in source.repository.index().keys() {
            let name_use = declared_by
                .entry((key.namespace.as_deref(), key.name.as_str()))
                .or_default();
            name_use.sources.insert(i);
            name_use.categories.insert(key.category);
        }
    }

    declared_by
        .into_iter()
        .filter(|(_, name_use)| name_use.sources.len() > 1)
        .map(|((namespace, name), name_use)| {
            let members: Vec<usize> = name_use.sources.into_iter().collect();
            let (package_paths, priorities) = sorted_contributors(sources, &members);
            TypeConflict {
                namespace: namespace.map(String::from),
                name: name.to_string(),
                categories: name_use.categories.into_iter().collect(),
                package_paths,
                priorities,
            }
        })
        .collect()
}

fn schema_file_conflicts(sources: &[PackageSource]) -> Vec<SchemaFileConflict> {
    let mut by_basename: BTreeMap<&str, Vec<(usize, &str)>> = BTreeMap::new();
    for (i, source) in sources.iter().enumerate() {
        for document in source.repository.documents() {
            by_basename
                .entry(basename(document.location()))
                .or_default()
                .push((i, document.location()));
        }
    }

    by_basename
        .into_iter()
        .filter(|(_, files)| {
            let distinct: BTreeSet<usize> = files.iter().map(|(i, _)| *i).collect();
            distinct.len() > 1
        })
        .map(|(name, files)| {
            let mut entries: Vec<SchemaFileEntry> = files
                .into_iter()
                .map(|(i, location)| SchemaFileEntry {
                    package_path: sources[i].package_path.clone(),
                    file_path: sources[i].full_path(location),
                    priority: sources[i].priority,
                })
                .collect();
            entries.sort_by(|a, b| {
                a.package_path
                    .cmp(&b.package_path)
                    .then_with(|| a.file_path.cmp(&b.file_path))
            });
            SchemaFileConflict {
                basename: name.to_string(),
                entries,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Loader, MemorySource, SchemaCache};
    use crate::repository::Repository;

    fn repo(file: &str, namespace: &str, types: &[&str]) -> Repository {
        let body: String = types
            .iter()
            .map(|t| format!(r#"<xs:complexType name="{}"/>"#, t))
            .collect();
        let text = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="{}">{}</xs:schema>"#,
            namespace, body
        );
        let source = MemorySource::new().with(file, text);
        Loader::new(&source).load(&[file], &mut SchemaCache::new()).unwrap()
    }

    #[test]
    fn test_two_packages_same_type() {
        let a = PackageSource::new("pkg/a", repo("a.xsd", "http://x/ns", &["Foo", "OnlyA"]));
        let b = PackageSource::new("pkg/b", repo("b.xsd", "http://x/ns", &["Foo"])).with_priority(10);

        let report = ConflictDetector::detect(&[a, b]);
        assert_eq!(report.namespace_conflicts.len(), 1);
        assert_eq!(report.type_conflicts.len(), 1);
        assert!(report.schema_file_conflicts.is_empty());
        assert_eq!(report.total_conflicts(), 2);

        let conflict = &report.type_conflicts[0];
        assert_eq!(conflict.name, "Foo");
        assert_eq!(conflict.package_paths, vec!["pkg/a", "pkg/b"]);
        assert_eq!(conflict.priorities, vec![0, 10]);
    }

    #[test]
    fn test_element_and_type_sharing_a_name_are_one_conflict() {
        let schema = |file: &str| {
            let text = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:n="urn:n" targetNamespace="urn:n"><xs:element name="Foo" type="n:Foo"/><xs:complexType name="Foo"/></xs:schema>"#;
            let source = MemorySource::new().with(file, text);
            Loader::new(&source).load(&[file], &mut SchemaCache::new()).unwrap()
        };
        let a = PackageSource::new("a", schema("a.xsd"));
        let b = PackageSource::new("b", schema("b.xsd")).with_priority(1);

        let report = ConflictDetector::detect(&[a, b]);
        assert_eq!(report.type_conflicts.len(), 1);
        assert_eq!(report.total_conflicts(), 2);

        let conflict = &report.type_conflicts[0];
        assert_eq!(conflict.symbol(), "{urn:n}Foo");
        assert_eq!(conflict.categories.len(), 2);
        assert!(conflict.categories.contains(&Category::Element));
        assert!(conflict.categories.contains(&Category::ComplexType));
        assert_eq!(conflict.keys().len(), 2);
    }

    #[test]
    fn test_detection_is_order_independent() {
        let a = PackageSource::new("a", repo("types.xsd", "urn:n", &["T"]));
        let b = PackageSource::new("b", repo("types.xsd", "urn:n", &["T", "U"])).with_priority(5);

        let forward = ConflictDetector::detect(&[a.clone(), b.clone()]);
        let backward = ConflictDetector::detect(&[b, a]);
        assert_eq!(forward.namespace_conflicts, backward.namespace_conflicts);
        assert_eq!(forward.type_conflicts, backward.type_conflicts);
        assert_eq!(forward.schema_file_conflicts, backward.schema_file_conflicts);
        assert_eq!(forward.schema_file_conflicts[0].entries[0].file_path, "a/types.xsd");
    }

    #[test]
    fn test_namespace_conflicts_are_pairwise() {
        let sources = [
            PackageSource::new("a", repo("a.xsd", "urn:n", &["A"])),
            PackageSource::new("b", repo("b.xsd", "urn:n", &["B"])),
            PackageSource::new("c", repo("c.xsd", "urn:n", &["C"])),
        ];
        let report = ConflictDetector::detect(&sources);
        assert_eq!(report.namespace_conflicts.len(), 3);
        assert!(report.type_conflicts.is_empty());
    }

    #[test]
    fn test_disjoint_packages() {
        let report = ConflictDetector::detect(&[
            PackageSource::new("a", repo("a.xsd", "urn:a", &["T"])),
            PackageSource::new("b", repo("b.xsd", "urn:b", &["T"])),
        ]);
        assert!(!report.has_conflicts());
        assert_eq!(report.packages.len(), 2);
        assert!(report.to_string().contains("No conflicts"));
    }

    #[test]
    fn test_report_display() {
        let report = ConflictDetector::detect(&[
            PackageSource::new("a", repo("t.xsd", "urn:n", &["T"])),
            PackageSource::new("b", repo("t.xsd", "urn:n", &["T"])).with_priority(2),
        ]);
        let text = report.to_string();
        assert!(text.contains("3 conflict(s)"));
        assert!(text.contains("{urn:n}T [complex_type]: a (priority 0), b (priority 2)"));
        assert!(text.contains("b/t.xsd (priority 2)"));
    }
}
