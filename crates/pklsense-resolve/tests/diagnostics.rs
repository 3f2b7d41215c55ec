//! Module diagnostics and their isolation from one another

use std::sync::Arc;

use pklsense_core::syntax::{ClassSource, ExprSource, ModuleBuilder, PropertySource};
use pklsense_core::TypeRef;
use pklsense_registry::{GraphConfig, ModuleStore};
use pklsense_resolve::{CheckOptions, Diagnostic, DiagnosticCode, Resolver};
use pretty_assertions::assert_eq;

fn count(diagnostics: &[Diagnostic], code: DiagnosticCode) -> usize {
    diagnostics.iter().filter(|d| d.code == code).count()
}

#[test]
fn test_broken_import_does_not_stop_other_checks() {
    let store = Arc::new(ModuleStore::new(GraphConfig::default()));
    let tree = store.insert_source(
        &ModuleBuilder::new("file:///w/main.pkl")
            .import("missing.pkl")
            .import("pkl:json")
            .class(ClassSource::new("A").extends(TypeRef::named("B")))
            .class(ClassSource::new("B").extends(TypeRef::named("A")))
            .property(PropertySource::new("a").value(ExprSource::access(
                ExprSource::ident("missing"),
                "foo",
            )))
            .property(PropertySource::new("b").value(ExprSource::ident("undefinedName")))
            .property(
                PropertySource::new("c")
                    .ty(TypeRef::named("Int"))
                    .value(ExprSource::string("text")),
            )
            .build(),
    );
    let resolver = Resolver::new(store);

    let diagnostics = resolver.check_module(&tree, &CheckOptions::default());
    assert_eq!(count(&diagnostics, DiagnosticCode::ModuleNotFound), 1);
    assert_eq!(count(&diagnostics, DiagnosticCode::UnresolvedReference), 1);
    assert_eq!(count(&diagnostics, DiagnosticCode::TypeMismatch), 1);
    assert_eq!(count(&diagnostics, DiagnosticCode::CircularInheritance), 2);
    assert_eq!(diagnostics.len(), 5);

    let unresolved = diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::UnresolvedReference)
        .unwrap();
    assert_eq!(unresolved.message, "Unresolved reference 'undefinedName'");
}

#[test]
fn test_members_of_open_receivers_are_not_reported() {
    let store = Arc::new(ModuleStore::new(GraphConfig::default()));
    let tree = store.insert_source(
        &ModuleBuilder::new("file:///w/main.pkl")
            .property(PropertySource::new("dyn").value(ExprSource::new_object(None, vec![])))
            .property(PropertySource::new("anything").value(ExprSource::access(
                ExprSource::ident("dyn"),
                "whatever",
            )))
            .property(PropertySource::new("text").ty(TypeRef::named("String")))
            .property(PropertySource::new("bad").value(ExprSource::access(
                ExprSource::ident("text"),
                "whatever",
            )))
            .build(),
    );
    let resolver = Resolver::new(store);

    let diagnostics = resolver.check_module(&tree, &CheckOptions::default());
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, DiagnosticCode::UnresolvedReference);
    assert_eq!(diagnostics[0].node, tree.child(tree.find_member("bad").unwrap(), 0).unwrap());
}

#[test]
fn test_diagnostics_serialize_for_reports() {
    let store = Arc::new(ModuleStore::new(GraphConfig::default()));
    let tree = store.insert_source(
        &ModuleBuilder::new("file:///w/main.pkl")
            .property(PropertySource::new("b").value(ExprSource::ident("nope")))
            .build(),
    );
    let resolver = Resolver::new(store);

    let diagnostics = resolver.check_module(&tree, &CheckOptions::default());
    let json = serde_json::to_value(&diagnostics).unwrap();
    assert_eq!(json[0]["code"], "unresolved-reference");
    assert_eq!(json[0]["severity"], "error");
}
