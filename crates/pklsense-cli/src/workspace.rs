//! A directory of module snapshots opened for analysis

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pklsense_core::SyntaxTree;
use pklsense_registry::graph::snapshot_target;
use pklsense_registry::uri::file_id;
use pklsense_registry::{GraphError, ModuleGraph, ModuleStore, ProjectError, SnapshotLoader};
use pklsense_resolve::Resolver;
use thiserror::Error;
use tracing::info;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to resolve {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Project(#[from] ProjectError),
}

pub struct Workspace {
    root: PathBuf,
    config: Config,
    store: Arc<ModuleStore>,
    resolver: Arc<Resolver>,
}

impl Workspace {
    /// Load every snapshot under `root` and the projects `config` names
    pub fn open(root: &Path, config: Config) -> Result<Self, SourceError> {
        let root = root.canonicalize().map_err(|source| SourceError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let store = Arc::new(
            ModuleStore::new(config.graph_config(&root)).with_loader(Arc::new(SnapshotLoader)),
        );
        let projects = store.load_configured_projects()?;
        let modules = store.load_dir(&root);
        info!(
            "opened {} with {} modules and {} projects",
            root.display(),
            modules,
            projects
        );
        let resolver = Arc::new(Resolver::new(store.clone()));
        Ok(Self {
            root,
            config,
            store,
            resolver,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<ModuleStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// The module at `path`, given as the `.pkl` file or its snapshot
    pub fn module(&self, path: &Path) -> Result<Arc<SyntaxTree>, SourceError> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let module = snapshot_target(&path).unwrap_or_else(|| path.clone());
        let id = file_id(&module);
        if let Some(tree) = self.store.module(&id) {
            return Ok(tree);
        }
        let snapshot = if snapshot_target(&path).is_some() {
            path
        } else {
            let mut name = path.into_os_string();
            name.push(".json");
            PathBuf::from(name)
        };
        let mut source = SnapshotLoader::read(&snapshot)?;
        source.uri = id.to_string();
        Ok(self.store.insert_source(&source))
    }

    /// All loaded modules, ordered by identity
    pub fn modules(&self) -> Vec<Arc<SyntaxTree>> {
        self.store.trees()
    }
}
