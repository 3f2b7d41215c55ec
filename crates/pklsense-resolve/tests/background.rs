//! Cancellable background module resolution

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use pklsense_core::syntax::ModuleBuilder;
use pklsense_core::{ModuleId, SyntaxTree};
use pklsense_registry::{GraphConfig, GraphError, ModuleGraph, ModuleStore};
use pklsense_resolve::{resolve_module_in_background, BackgroundError, Resolver};
use semver::Version;
use tokio::sync::watch;

/// A graph whose lookups wait until the test releases them
struct GatedGraph {
    store: ModuleStore,
    gate: Mutex<mpsc::Receiver<()>>,
    lookups: Arc<AtomicUsize>,
}

impl ModuleGraph for GatedGraph {
    fn resolve_uri(&self, uri: &str, from: &ModuleId) -> Result<Arc<SyntaxTree>, GraphError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap();
        let _ = gate.recv();
        self.store.resolve_uri(uri, from)
    }

    fn declared_dependency_version(&self, project: &Path, package: &str) -> Option<Version> {
        self.store.declared_dependency_version(project, package)
    }

    fn module(&self, id: &ModuleId) -> Option<Arc<SyntaxTree>> {
        self.store.module(id)
    }
}

fn gated() -> (Arc<Resolver>, mpsc::Sender<()>) {
    let (resolver, release, _) = counted();
    (resolver, release)
}

fn counted() -> (Arc<Resolver>, mpsc::Sender<()>, Arc<AtomicUsize>) {
    let store = ModuleStore::new(GraphConfig::default());
    store.insert_source(&ModuleBuilder::new("file:///w/birds.pkl").build());
    let (release, gate) = mpsc::channel();
    let lookups = Arc::new(AtomicUsize::new(0));
    let graph = GatedGraph {
        store,
        gate: Mutex::new(gate),
        lookups: lookups.clone(),
    };
    (Arc::new(Resolver::new(Arc::new(graph))), release, lookups)
}

fn from() -> ModuleId {
    ModuleId::new("file:///w/main.pkl")
}

#[tokio::test]
async fn test_lookup_completes_without_cancellation() {
    let (resolver, release) = gated();
    let (_cancel, cancelled) = watch::channel(false);
    release.send(()).unwrap();

    let tree = resolve_module_in_background(resolver, "birds.pkl".to_string(), from(), cancelled)
        .await
        .unwrap();
    assert_eq!(tree.id().as_str(), "file:///w/birds.pkl");
}

#[tokio::test]
async fn test_cancellation_abandons_blocked_lookup() {
    let (resolver, release) = gated();
    let (cancel, cancelled) = watch::channel(false);

    let task = tokio::spawn(resolve_module_in_background(
        resolver,
        "birds.pkl".to_string(),
        from(),
        cancelled,
    ));
    cancel.send(true).unwrap();
    let result = task.await.unwrap();
    assert_eq!(result.unwrap_err(), BackgroundError::Cancelled("birds.pkl".to_string()));

    // let the abandoned worker finish so the runtime can shut down
    let _ = release.send(());
}

#[tokio::test]
async fn test_graph_errors_pass_through() {
    let (resolver, release) = gated();
    let (_cancel, cancelled) = watch::channel(false);
    release.send(()).unwrap();

    let error = resolve_module_in_background(resolver, "missing.pkl".to_string(), from(), cancelled)
        .await
        .unwrap_err();
    assert!(matches!(error, BackgroundError::Graph(ref e) if e.is_not_found()));
}

#[tokio::test]
async fn test_lookup_cancelled_up_front_never_reaches_graph() {
    let (resolver, release, lookups) = counted();
    let (cancel, cancelled) = watch::channel(false);
    cancel.send(true).unwrap();
    release.send(()).unwrap();

    let error = resolve_module_in_background(resolver, "birds.pkl".to_string(), from(), cancelled)
        .await
        .unwrap_err();
    assert_eq!(error, BackgroundError::Cancelled("birds.pkl".to_string()));
    assert_eq!(lookups.load(Ordering::SeqCst), 0);
}
