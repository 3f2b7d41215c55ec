//! Module and package graph for pklsense
//!
//! Classifies module URIs, resolves relative references, reads project
//! dependency manifests and stores the syntax trees the resolver works on.

pub mod dependency_graph;
pub mod error;
pub mod graph;
pub mod package;
pub mod project;
pub mod store;
pub mod uri;

pub use dependency_graph::{DependencyKind, ModuleDependencyGraph};
pub use error::{GraphError, ProjectError};
pub use graph::{GraphConfig, ModuleGraph, ModuleLoader, SnapshotLoader};
pub use package::PackageUri;
pub use project::{DependencyManifest, Project, ProjectIndex, ResolvedDependency};
pub use store::ModuleStore;
pub use uri::{has_scheme, ModuleUri};
