//! Filesystem-backed module resolution: source roots, projects and packages

use std::fs;
use std::path::Path;
use std::sync::Arc;

use pklsense_core::syntax::ModuleBuilder;
use pklsense_core::ModuleId;
use pklsense_registry::uri::file_id;
use pklsense_registry::{
    GraphConfig, ModuleDependencyGraph, ModuleGraph, ModuleStore, SnapshotLoader,
};
use semver::Version;
use tempfile::TempDir;

fn write_snapshot(path: &Path, uri: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let source = ModuleBuilder::new(uri).build();
    let mut name = path.as_os_str().to_os_string();
    name.push(".json");
    fs::write(name, source.to_json().unwrap()).unwrap();
}

fn write_manifest(dir: &Path, birds_version: &str) {
    fs::create_dir_all(dir).unwrap();
    let manifest = format!(
        r#"{{
  "schemaVersion": 1,
  "resolvedDependencies": {{
    "package://example.com/birds@1": {{
      "type": "remote",
      "uri": "projectpackage://example.com/birds@{}"
    }}
  }},
  "dependencies": {{ "birds": "package://example.com/birds@1" }}
}}"#,
        birds_version
    );
    fs::write(dir.join("PklProject.deps.json"), manifest).unwrap();
}

#[test]
fn test_relative_import_inside_source_root_searches_all_roots() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    let generated = temp.path().join("generated");
    let util = generated.join("app/shared/util.pkl");
    write_snapshot(&util, "");

    let config = GraphConfig {
        source_roots: vec![src.clone(), generated.clone()],
        ..Default::default()
    };
    let store = ModuleStore::new(config).with_loader(Arc::new(SnapshotLoader));
    let from = file_id(&src.join("app/main.pkl"));

    let tree = store.resolve_uri("shared/util.pkl", &from).unwrap();
    assert_eq!(tree.id(), &file_id(&util));

    // outside any root, the same path is a plain file-relative reference
    let outside = file_id(&temp.path().join("elsewhere/app/main.pkl"));
    assert!(store
        .resolve_uri("shared/util.pkl", &outside)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_nearest_project_manifest_pins_package_version() {
    let temp = TempDir::new().unwrap();
    let outer = temp.path().join("outer");
    let inner = outer.join("inner");
    write_manifest(&outer, "1.0.0");
    write_manifest(&inner, "1.3.0");

    let cache = temp.path().join("cache");
    for version in ["1.0.0", "1.3.0"] {
        let module = cache
            .join("package-2/example.com")
            .join(format!("birds@{}", version))
            .join("Bird.pkl");
        write_snapshot(&module, "");
    }

    let config = GraphConfig {
        package_cache: Some(cache),
        ..Default::default()
    };
    let store = ModuleStore::new(config).with_loader(Arc::new(SnapshotLoader));

    let from_inner = file_id(&inner.join("main.pkl"));
    let tree = store
        .resolve_uri("package://example.com/birds@1.0.0#/Bird.pkl", &from_inner)
        .unwrap();
    assert_eq!(
        tree.id().as_str(),
        "package://example.com/birds@1.3.0#/Bird.pkl"
    );

    let from_outer = file_id(&outer.join("main.pkl"));
    let tree = store.resolve_uri("@birds/Bird.pkl", &from_outer).unwrap();
    assert_eq!(
        tree.id().as_str(),
        "package://example.com/birds@1.0.0#/Bird.pkl"
    );

    assert_eq!(
        store.declared_dependency_version(&inner, "example.com/birds"),
        Some(Version::new(1, 3, 0))
    );
    assert_eq!(
        store.declared_dependency_version(&inner.join("nested/dir"), "birds"),
        Some(Version::new(1, 3, 0))
    );
    assert_eq!(
        store.declared_dependency_version(temp.path(), "birds"),
        None
    );
}

#[test]
fn test_transitive_package_import_uses_originating_project() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("project");
    write_manifest(&project, "1.3.0");

    let store = ModuleStore::new(GraphConfig::default());
    let bird = ModuleBuilder::new("package://example.com/birds@1.3.0#/Bird.pkl")
        .import("species/Parrot.pkl")
        .build();
    store.insert_source(&bird);
    store.insert_source(
        &ModuleBuilder::new("package://example.com/birds@1.3.0#/species/Parrot.pkl").build(),
    );

    let from = file_id(&project.join("main.pkl"));
    let bird = store.resolve_uri("@birds/Bird.pkl", &from).unwrap();
    let parrot = store.resolve_uri("species/Parrot.pkl", bird.id()).unwrap();
    assert_eq!(
        parrot.id().as_str(),
        "package://example.com/birds@1.3.0#/species/Parrot.pkl"
    );
    assert!(store.resolve_uri("@birds/Bird.pkl", bird.id()).is_ok());
}

#[test]
fn test_load_dir_and_dependency_graph() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    let base = ModuleBuilder::new("").build();
    let app = ModuleBuilder::new("")
        .amends("base.pkl")
        .import("missing.pkl")
        .build();
    fs::write(dir.join("base.pkl.json"), base.to_json().unwrap()).unwrap();
    fs::write(
        dir.join("app.pkl.yaml"),
        serde_yaml::to_string(&app).unwrap(),
    )
    .unwrap();
    fs::write(dir.join("notes.json"), "{}").unwrap();

    let store = ModuleStore::new(GraphConfig::default());
    assert_eq!(store.load_dir(dir), 2);

    let app_id: ModuleId = file_id(&dir.join("app.pkl"));
    let graph = ModuleDependencyGraph::build(&store, &[app_id.clone()]);
    assert_eq!(graph.module_count(), 2);
    assert_eq!(graph.dependencies(&app_id), vec![file_id(&dir.join("base.pkl"))]);
    assert_eq!(graph.broken().len(), 1);
    assert_eq!(graph.broken()[0].uri, "missing.pkl");
}
