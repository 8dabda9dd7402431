//! Package bundle, conflict and merge integration tests

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use xsd_repository::config::MergeConfig;
use xsd_repository::package::{ConflictDetector, NamespaceUriRemap, PackageStore};
use xsd_repository::{
    detect_conflicts, ConflictResolution, DiagnosticCode, DirectoryStore, FileSystemSource, Loader, MergeResolver,
    PackageConfig, PackageSource, PackageSpec, Repository, RepositoryConfig, SchemaCache, SchemaError,
    SchemaLocationMapping,
};

fn fixture(relative: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
        .to_string_lossy()
        .into_owned()
}

fn load(relative: &str) -> Repository {
    Loader::new(&FileSystemSource)
        .load(&[fixture(relative)], &mut SchemaCache::new())
        .unwrap()
}

/// Bundle a fixture into `dir/name` and return the bundle path
fn write_bundle(dir: &TempDir, name: &str, relative: &str) -> PathBuf {
    let path = dir.path().join(name);
    let bundle = load(relative).to_bundle(Some(name)).unwrap();
    DirectoryStore.write_bundle(&path, &bundle).unwrap();
    path
}

fn package(path: &Path, priority: i64, strategy: &str) -> PackageSpec {
    let mut config = PackageConfig::new(path.to_string_lossy());
    config.priority = priority;
    config.conflict_resolution = Some(strategy.to_string());
    PackageSpec::Config(config)
}

fn sources(specs: &[PackageSpec]) -> Vec<PackageSource> {
    let config = RepositoryConfig::default();
    specs
        .iter()
        .map(|spec| PackageSource::load(spec, &DirectoryStore, &config).unwrap())
        .collect()
}

// =============================================================================
// Bundles
// =============================================================================

#[test]
fn test_bundle_round_trip_preserves_index() {
    let dir = TempDir::new().unwrap();
    let original = load("orders/main.xsd");
    let bundle = original.to_bundle(Some("orders")).unwrap();
    DirectoryStore.write_bundle(&dir.path().join("orders"), &bundle).unwrap();

    assert_eq!(bundle.metadata.files, vec!["orders/main.xsd".to_string()]);
    assert!(dir.path().join("orders/schemas/common/common.xsd").is_file());

    let read = DirectoryStore.read_bundle(&dir.path().join("orders")).unwrap();
    assert_eq!(read.index, bundle.index);

    let restored = Repository::from_bundle(&read, "orders", &RepositoryConfig::default()).unwrap();
    assert_eq!(restored.index().len(), original.index().len());
    assert_eq!(restored.index().to_serialized(|l| l.to_string()), bundle.index);
    assert_eq!(restored.diagnostics().with_code(DiagnosticCode::IndexMismatch).count(), 0);
    assert!(restored.find_type("ord:PriorityOrder").is_resolved());
    assert_eq!(restored.all_namespaces(), original.all_namespaces());
}

#[test]
fn test_missing_required_field() {
    let dir = TempDir::new().unwrap();
    let path = write_bundle(&dir, "orders", "orders/main.xsd");

    let metadata_path = path.join("metadata.json");
    let mut raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&metadata_path).unwrap()).unwrap();
    raw.as_object_mut().unwrap().remove("files");
    raw["version"] = serde_json::json!(1);
    fs::write(&metadata_path, raw.to_string()).unwrap();

    match DirectoryStore.read_bundle(&path).unwrap_err() {
        SchemaError::InvalidBundle { errors, .. } => {
            assert_eq!(errors.len(), 2);
            assert!(errors.iter().any(|e| e.contains("missing required field 'files'")));
            assert!(errors.iter().any(|e| e.contains("'version' must be a string")));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_external_location_target_rejected() {
    let mut bundle = load("orders/main.xsd").to_bundle(None).unwrap();
    bundle
        .metadata
        .schema_location_mappings
        .push(SchemaLocationMapping::literal("http://example.com/a.xsd", "/opt/schemas/a.xsd"));

    let err = Repository::from_bundle(&bundle, "orders", &RepositoryConfig::default()).unwrap_err();
    assert!(matches!(err, SchemaError::InvalidBundle { ref errors, .. } if errors[0].contains("outside the bundle")));
}

#[test]
fn test_relative_missing_target_is_warning() {
    let mut bundle = load("orders/main.xsd").to_bundle(None).unwrap();
    bundle
        .metadata
        .schema_location_mappings
        .push(SchemaLocationMapping::literal("http://example.com/a.xsd", "vendor/a.xsd"));

    let repo = Repository::from_bundle(&bundle, "orders", &RepositoryConfig::default()).unwrap();
    assert_eq!(repo.diagnostics().with_code(DiagnosticCode::AmbiguousLocationTarget).count(), 1);
}

#[test]
fn test_tampered_file_fails_checksum() {
    let dir = TempDir::new().unwrap();
    let path = write_bundle(&dir, "orders", "orders/main.xsd");
    let schema = path.join("schemas/orders/order-types.xsd");
    let text = fs::read_to_string(&schema).unwrap();
    fs::write(&schema, text.replace("Quantity", "Amount")).unwrap();

    let err = PackageSource::load(
        &PackageSpec::from(&*path.to_string_lossy()),
        &DirectoryStore,
        &RepositoryConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidBundle { ref errors, .. } if errors[0].contains("Checksum mismatch")));
}

#[test]
fn test_missing_bundle() {
    let dir = TempDir::new().unwrap();
    let spec = PackageSpec::from(&*dir.path().join("nope").to_string_lossy());
    let err = detect_conflicts(&[spec], &DirectoryStore, &RepositoryConfig::default()).unwrap_err();
    assert!(matches!(err, SchemaError::Configuration(_)));
}

// =============================================================================
// Conflicts & Merging
// =============================================================================

#[test]
fn test_override_scenario() {
    let dir = TempDir::new().unwrap();
    let p1 = write_bundle(&dir, "p1", "packages/p1/p1.xsd");
    let p2 = write_bundle(&dir, "p2", "packages/p2/p2.xsd");
    let specs = [package(&p1, 0, "keep"), package(&p2, 10, "override")];

    let report = detect_conflicts(&specs, &DirectoryStore, &RepositoryConfig::default()).unwrap();
    assert_eq!(report.total_conflicts(), 2);
    assert_eq!(report.namespace_conflicts[0].namespace_uri, "http://x/ns");
    assert_eq!(report.type_conflicts[0].name, "Foo");

    let merged = MergeResolver::default().merge(&sources(&specs)).unwrap();
    let foo = merged.find_type("x:Foo").into_resolved().unwrap();
    assert_eq!(foo.definition.documentation(), Some("Foo from P2"));
    assert!(merged.find_type("x:OnlyInP1").is_resolved());
    assert_eq!(merged.all_type_names(Some("http://x/ns")), vec!["Foo", "OnlyInP1"]);
    assert_eq!(merged.files().len(), 2);
}

#[test]
fn test_keep_and_error_strategies() {
    let dir = TempDir::new().unwrap();
    let p1 = write_bundle(&dir, "p1", "packages/p1/p1.xsd");
    let p2 = write_bundle(&dir, "p2", "packages/p2/p2.xsd");

    let kept = MergeResolver::default()
        .merge(&sources(&[package(&p1, 0, "keep"), package(&p2, 10, "keep")]))
        .unwrap();
    let foo = kept.find_type("x:Foo").into_resolved().unwrap();
    assert_eq!(foo.definition.documentation(), Some("Foo from P1"));

    let err = MergeResolver::default()
        .merge(&sources(&[package(&p1, 0, "keep"), package(&p2, 10, "error")]))
        .unwrap_err();
    match err {
        SchemaError::Merge(e) => {
            assert_eq!(e.packages.len(), 2);
            assert!(e.symbol.contains("Foo"));
            assert_eq!(e.report.total_conflicts(), 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_conflict_symmetry() {
    let dir = TempDir::new().unwrap();
    let a = write_bundle(&dir, "a", "packages/p1/p1.xsd");
    let b = write_bundle(&dir, "b", "packages/p2/p2.xsd");
    let loaded = sources(&[package(&a, 0, "keep"), package(&b, 3, "override")]);

    let forward = ConflictDetector::detect(&loaded);
    let reversed: Vec<PackageSource> = loaded.iter().rev().cloned().collect();
    let backward = ConflictDetector::detect(&reversed);

    assert_eq!(forward.namespace_conflicts, backward.namespace_conflicts);
    assert_eq!(forward.type_conflicts, backward.type_conflicts);
    assert_eq!(forward.schema_file_conflicts, backward.schema_file_conflicts);
}

#[test]
fn test_namespace_remap_and_filters_avoid_conflicts() {
    let dir = TempDir::new().unwrap();
    let p1 = write_bundle(&dir, "p1", "packages/p1/p1.xsd");
    let p2 = write_bundle(&dir, "p2", "packages/p2/p2.xsd");

    let mut moved = PackageConfig::new(p2.to_string_lossy());
    moved.namespace_remapping.push(NamespaceUriRemap {
        from_uri: "http://x/ns".into(),
        to_uri: "http://x/ns/v2".into(),
    });
    let specs = [PackageSpec::from(&*p1.to_string_lossy()), PackageSpec::Config(moved)];

    let report = detect_conflicts(&specs, &DirectoryStore, &RepositoryConfig::default()).unwrap();
    assert!(!report.has_conflicts());

    let merged = MergeResolver::default().merge(&sources(&specs)).unwrap();
    let moved_foo = merged.find_type("{http://x/ns/v2}Foo").into_resolved().unwrap();
    assert_eq!(moved_foo.definition.documentation(), Some("Foo from P2"));
    let foo = merged.find_type("{http://x/ns}Foo").into_resolved().unwrap();
    assert_eq!(foo.definition.documentation(), Some("Foo from P1"));
    assert_eq!(merged.uri_for("x"), Some("http://x/ns"));
    assert_eq!(merged.uri_for("x1"), Some("http://x/ns/v2"));
    assert_eq!(merged.diagnostics().with_code(DiagnosticCode::PrefixRebound).count(), 1);

    let mut filtered = PackageConfig::new(p2.to_string_lossy());
    filtered.exclude_schemas.push("p2.xsd".into());
    let specs = [PackageSpec::from(&*p1.to_string_lossy()), PackageSpec::Config(filtered)];
    let report = detect_conflicts(&specs, &DirectoryStore, &RepositoryConfig::default()).unwrap();
    assert!(!report.has_conflicts());
}

#[test]
fn test_equal_priority_tie_rejected_when_configured() {
    let dir = TempDir::new().unwrap();
    let p1 = write_bundle(&dir, "p1", "packages/p1/p1.xsd");
    let p2 = write_bundle(&dir, "p2", "packages/p2/p2.xsd");
    let loaded = sources(&[package(&p1, 5, "override"), package(&p2, 5, "override")]);

    let merged = MergeResolver::default().merge(&loaded).unwrap();
    let foo = merged.find_type("x:Foo").into_resolved().unwrap();
    assert_eq!(foo.definition.documentation(), Some("Foo from P1"));

    let strict = MergeResolver::new(MergeConfig {
        reject_equal_priority_ties: true,
        default_strategy: ConflictResolution::Error,
    });
    assert!(matches!(strict.merge(&loaded), Err(SchemaError::Configuration(_))));
}
