//! Import list optimization

use std::sync::Arc;

use pklsense_core::syntax::{ExprSource, ModuleBuilder, PropertySource};
use pklsense_core::{SyntaxTree, TypeRef};
use pklsense_registry::{GraphConfig, ModuleStore};
use pklsense_resolve::Resolver;
use pretty_assertions::assert_eq;

fn module_with_imports(store: &ModuleStore, uri: &str, imports: &[&str]) -> Arc<SyntaxTree> {
    let builder = imports
        .iter()
        .fold(ModuleBuilder::new(uri), |builder, import| builder.import(*import));
    store.insert_source(
        &builder
            .property(PropertySource::new("x").value(ExprSource::access(ExprSource::ident("a"), "x")))
            .property(PropertySource::new("y").value(ExprSource::access(ExprSource::ident("pkg"), "y")))
            .build(),
    )
}

fn uris(tree: &SyntaxTree, resolver: &Resolver) -> (Vec<String>, bool, String) {
    let edit = resolver.optimize_imports(tree).unwrap();
    (
        edit.imports.iter().map(|i| i.uri.clone()).collect(),
        edit.changed,
        edit.text,
    )
}

#[test]
fn test_unused_imports_dropped_and_schemes_first() {
    let store = Arc::new(ModuleStore::new(GraphConfig::default()));
    let tree = module_with_imports(&store, "file:///w/main.pkl", &["b", "a:pkg", "a"]);
    let resolver = Resolver::new(store.clone());

    let (imports, changed, text) = uris(&tree, &resolver);
    assert_eq!(imports, vec!["a:pkg".to_string(), "a".to_string()]);
    assert!(changed);
    assert_eq!(text, "import \"a:pkg\"\nimport \"a\"");

    // optimizing the optimized list changes nothing
    let optimized = module_with_imports(&store, "file:///w/optimized.pkl", &["a:pkg", "a"]);
    let (again, changed, _) = uris(&optimized, &resolver);
    assert_eq!(again, imports);
    assert!(!changed);
}

#[test]
fn test_duplicate_imports_collapse() {
    let store = Arc::new(ModuleStore::new(GraphConfig::default()));
    store.insert_source(
        &ModuleBuilder::new("file:///w/birds.pkl")
            .class(pklsense_core::syntax::ClassSource::new("Bird"))
            .build(),
    );
    let tree = store.insert_source(
        &ModuleBuilder::new("file:///w/main.pkl")
            .import("birds.pkl")
            .import("birds.pkl")
            .import_as("birds.pkl", "b")
            .property(PropertySource::new("bird").ty(TypeRef::parse("birds.Bird").unwrap()))
            .property(PropertySource::new("other").ty(TypeRef::parse("b.Bird").unwrap()))
            .build(),
    );
    let resolver = Resolver::new(store);

    let edit = resolver.optimize_imports(&tree).unwrap();
    let kept: Vec<String> = edit.imports.iter().map(ToString::to_string).collect();
    assert_eq!(kept, vec!["import \"birds.pkl\"", "import \"birds.pkl\" as b"]);
    assert!(edit.changed);
}

#[test]
fn test_module_without_imports_has_no_edit() {
    let store = Arc::new(ModuleStore::new(GraphConfig::default()));
    let tree = store.insert_source(
        &ModuleBuilder::new("file:///w/plain.pkl")
            .property(PropertySource::new("x").value(ExprSource::int(1)))
            .build(),
    );
    let resolver = Resolver::new(store);
    assert_eq!(resolver.optimize_imports(&tree), None);
}

#[test]
fn test_used_package_import_is_kept() {
    let store = Arc::new(ModuleStore::new(GraphConfig::default()));
    store.insert_source(
        &ModuleBuilder::new("package://example.com/birds@1.0.0#/Bird.pkl")
            .property(PropertySource::new("name").ty(TypeRef::named("String")))
            .build(),
    );
    let tree = store.insert_source(
        &ModuleBuilder::new("file:///w/main.pkl")
            .import("package://example.com/birds@1.0.0#/Bird.pkl")
            .import("unused.pkl")
            .property(PropertySource::new("n").value(ExprSource::access(
                ExprSource::ident("Bird"),
                "name",
            )))
            .build(),
    );
    let resolver = Resolver::new(store.clone());

    let (imports, changed, text) = uris(&tree, &resolver);
    assert_eq!(
        imports,
        vec!["package://example.com/birds@1.0.0#/Bird.pkl".to_string()]
    );
    assert!(changed);
    assert_eq!(text, "import \"package://example.com/birds@1.0.0#/Bird.pkl\"");
}
