//! The module graph seen by the resolution engine

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pklsense_core::{ModuleId, ModuleSource, SyntaxTree};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::uri::file_id;

/// Resolves module URIs to syntax trees
///
/// Implementations may block on I/O; callers on latency-sensitive paths
/// should go through a cancellable background task.
pub trait ModuleGraph: Send + Sync {
    /// Resolve `uri` as written in `from` to the module it names
    fn resolve_uri(&self, uri: &str, from: &ModuleId) -> Result<Arc<SyntaxTree>, GraphError>;

    /// Version of `package` declared by the project rooted at `project`
    fn declared_dependency_version(&self, project: &Path, package: &str) -> Option<Version>;

    /// A module already known under its canonical identity
    fn module(&self, id: &ModuleId) -> Option<Arc<SyntaxTree>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Directories whose contents are addressed as `modulepath:` URIs
    pub source_roots: Vec<PathBuf>,
    /// Where downloaded packages are unpacked:
    /// `<cache>/package-2/<host>/<path>@<version>/<module path>`
    pub package_cache: Option<PathBuf>,
    /// Project directories to register up front
    pub projects: Vec<PathBuf>,
}

/// Turns a module location on disk into a module description
///
/// The parser lives outside this crate; a loader is how a host plugs it in.
pub trait ModuleLoader: Send + Sync {
    /// `Ok(None)` when nothing exists at `path`
    fn load(&self, path: &Path) -> Result<Option<ModuleSource>, GraphError>;
}

/// Loads pre-parsed snapshots stored next to module files
///
/// For `dir/mod.pkl` the loader tries `dir/mod.pkl.json`, `dir/mod.pkl.yaml`
/// and `dir/mod.pkl.yml`, in that order. A path that is itself a `.json` or
/// `.yaml` snapshot is read directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotLoader;

impl SnapshotLoader {
    fn candidates(path: &Path) -> Vec<PathBuf> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json" | "yaml" | "yml") => vec![path.to_path_buf()],
            _ => ["json", "yaml", "yml"]
                .iter()
                .map(|ext| {
                    let mut name = path.as_os_str().to_os_string();
                    name.push(".");
                    name.push(ext);
                    PathBuf::from(name)
                })
                .collect(),
        }
    }

    pub fn read(path: &Path) -> Result<ModuleSource, GraphError> {
        let load_error = |message: String| GraphError::Load {
            uri: path.display().to_string(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let mut source = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ModuleSource::from_json(&text),
            _ => ModuleSource::from_yaml(&text),
        }
        .map_err(|e| load_error(e.to_string()))?;
        if source.uri.trim().is_empty() {
            let module = snapshot_target(path).unwrap_or_else(|| path.to_path_buf());
            source.uri = file_id(&module).to_string();
        }
        source.validate().map_err(|e| load_error(e.to_string()))?;
        Ok(source)
    }
}

impl ModuleLoader for SnapshotLoader {
    fn load(&self, path: &Path) -> Result<Option<ModuleSource>, GraphError> {
        for candidate in Self::candidates(path) {
            if candidate.is_file() {
                tracing::trace!("loading snapshot {}", candidate.display());
                return Self::read(&candidate).map(Some);
            }
        }
        Ok(None)
    }
}

/// `dir/mod.pkl.json` → `dir/mod.pkl`
pub fn snapshot_target(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    ["json", "yaml", "yml"].iter().find_map(|ext| {
        let stem = name.strip_suffix(ext)?.strip_suffix('.')?;
        stem.ends_with(".pkl").then(|| path.with_file_name(stem))
    })
}
