//! In-memory module store backed by an optional filesystem loader

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use pklsense_core::{ModuleId, ModuleSource, SyntaxTree};
use semver::Version;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::error::{GraphError, ProjectError};
use crate::graph::{snapshot_target, GraphConfig, ModuleGraph, ModuleLoader, SnapshotLoader};
use crate::project::{Project, ProjectIndex, ResolvedDependency};
use crate::uri::{file_id, join_normalized, ModuleUri};

/// One place a module may live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: ModuleId,
    pub path: Option<PathBuf>,
}

/// Where a URI may be found, in search order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub candidates: Vec<Candidate>,
    /// Project on whose behalf a package module is being resolved
    pub origin: Option<PathBuf>,
}

impl Target {
    fn single(id: ModuleId, path: Option<PathBuf>) -> Self {
        Self {
            candidates: vec![Candidate { id, path }],
            origin: None,
        }
    }
}

pub struct ModuleStore {
    config: GraphConfig,
    trees: DashMap<ModuleId, Arc<SyntaxTree>>,
    projects: ProjectIndex,
    /// Package base URI → directory of the project that pulled it in
    origins: DashMap<String, PathBuf>,
    loader: Option<Arc<dyn ModuleLoader>>,
}

impl ModuleStore {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            trees: DashMap::new(),
            projects: ProjectIndex::new(),
            origins: DashMap::new(),
            loader: None,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn projects(&self) -> &ProjectIndex {
        &self.projects
    }

    /// Load every project listed in the configuration
    pub fn load_configured_projects(&self) -> Result<usize, ProjectError> {
        for dir in &self.config.projects {
            self.projects.load(dir)?;
        }
        Ok(self.config.projects.len())
    }

    pub fn register_project(&self, project: Project) {
        self.projects.register(project);
    }

    pub fn insert(&self, tree: SyntaxTree) -> Arc<SyntaxTree> {
        let tree = Arc::new(tree);
        trace!("storing {} v{}", tree.id(), tree.version());
        self.trees.insert(tree.id().clone(), tree.clone());
        tree
    }

    /// Lower and store a module description, bumping the version of any
    /// previous tree with the same identity
    pub fn insert_source(&self, source: &ModuleSource) -> Arc<SyntaxTree> {
        let id = canonical_source_id(&source.uri);
        let version = self
            .trees
            .get(&id)
            .map(|previous| previous.version() + 1)
            .unwrap_or(1);
        self.insert(SyntaxTree::lower_as(source, id, version))
    }

    pub fn remove(&self, id: &ModuleId) -> Option<Arc<SyntaxTree>> {
        self.trees.remove(id).map(|(_, tree)| tree)
    }

    pub fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.trees.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn trees(&self) -> Vec<Arc<SyntaxTree>> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.module(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Load every snapshot found under `dir`
    ///
    /// Snapshots are `*.pkl.json`, `*.pkl.yaml` or `*.pkl.yml` files; each is
    /// stored under the identity of the `.pkl` file it describes unless it
    /// names an absolute URI itself. Broken snapshots are logged and skipped.
    pub fn load_dir(&self, dir: &Path) -> usize {
        let mut loaded = 0;
        for entry in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let Some(module_path) = snapshot_target(path) else {
                continue;
            };
            match SnapshotLoader::read(path) {
                Ok(mut source) => {
                    if ModuleUri::classify(&source.uri).map_or(true, |u| !u.is_absolute()) {
                        source.uri = file_id(&module_path).to_string();
                    }
                    self.insert_source(&source);
                    loaded += 1;
                }
                Err(e) => warn!("skipping {}: {}", path.display(), e),
            }
        }
        info!("loaded {} module snapshots from {}", loaded, dir.display());
        loaded
    }

    /// Work out where `uri`, written in `from`, may be found
    pub fn locate(&self, uri: &str, from: &ModuleId) -> Result<Target, GraphError> {
        match ModuleUri::classify(uri)? {
            ModuleUri::Relative(path) => {
                let absolute = ModuleUri::resolve_relative(&path, from, &self.config.source_roots)?;
                self.locate_absolute(absolute, from)
            }
            ModuleUri::Dependency { name, path } => {
                let project = self
                    .project_for(from)
                    .ok_or_else(|| GraphError::not_found(uri, from))?;
                let (_, dep) = project
                    .dependency(&name)
                    .ok_or_else(|| GraphError::not_found(uri, from))?;
                match dep {
                    ResolvedDependency::Local { .. } => {
                        let dir = project
                            .local_path(dep)
                            .ok_or_else(|| GraphError::not_found(uri, from))?;
                        let file = join_normalized(&dir.display().to_string(), path.trim_start_matches('/'))
                            .ok_or_else(|| GraphError::invalid(uri, "escapes the dependency"))?;
                        let file = PathBuf::from(file);
                        Ok(Target::single(file_id(&file), Some(file)))
                    }
                    ResolvedDependency::Remote { .. } => {
                        let package = dep
                            .package()
                            .map_err(|e| GraphError::invalid(uri, e.to_string()))?
                            .with_fragment(path);
                        self.locate_absolute(ModuleUri::Package(package), from)
                    }
                }
            }
            absolute => self.locate_absolute(absolute, from),
        }
    }

    fn locate_absolute(&self, uri: ModuleUri, from: &ModuleId) -> Result<Target, GraphError> {
        match uri {
            ModuleUri::File(path) => Ok(Target::single(file_id(&path), Some(path))),
            ModuleUri::ModulePath(rel) => {
                let inner = rel.trim_start_matches('/');
                let mut candidates: Vec<Candidate> = self
                    .config
                    .source_roots
                    .iter()
                    .map(|root| {
                        let path = root.join(inner);
                        Candidate {
                            id: file_id(&path),
                            path: Some(path),
                        }
                    })
                    .collect();
                candidates.push(Candidate {
                    id: ModuleId::new(format!("modulepath:{}", rel)),
                    path: None,
                });
                Ok(Target {
                    candidates,
                    origin: None,
                })
            }
            ModuleUri::Package(mut package) => {
                let project = self.project_for(from);
                if let Some(project) = &project {
                    if let Some((_, dep)) = project.dependency(&package.canonical_name()) {
                        if let Ok(declared) = dep.package() {
                            if declared.version != package.version {
                                debug!(
                                    "{} pinned to {} by project {}",
                                    package.name(),
                                    declared.version,
                                    project.dir.display()
                                );
                                package = package.with_version(declared.version);
                            }
                        }
                        if let Some(dir) = project.local_path(dep) {
                            let inner = package.fragment.as_deref().unwrap_or("/");
                            let path = dir.join(inner.trim_start_matches('/'));
                            return Ok(Target {
                                candidates: vec![Candidate {
                                    id: ModuleId::new(package.to_string()),
                                    path: Some(path),
                                }],
                                origin: Some(project.dir.clone()),
                            });
                        }
                    }
                }
                let path = self.config.package_cache.as_ref().map(|cache| {
                    cache
                        .join("package-2")
                        .join(&package.authority)
                        .join(format!(
                            "{}@{}",
                            package.path.trim_start_matches('/'),
                            package.version
                        ))
                        .join(
                            package
                                .fragment
                                .as_deref()
                                .unwrap_or("/")
                                .trim_start_matches('/'),
                        )
                });
                Ok(Target {
                    candidates: vec![Candidate {
                        id: ModuleId::new(package.to_string()),
                        path,
                    }],
                    origin: project.map(|p| p.dir.clone()),
                })
            }
            other @ (ModuleUri::Stdlib(_) | ModuleUri::Network(_)) => {
                let id = other
                    .module_id()
                    .ok_or_else(|| GraphError::invalid(format!("{:?}", other), "no identity"))?;
                Ok(Target::single(id, None))
            }
            ModuleUri::Dependency { .. } | ModuleUri::Relative(_) => Err(GraphError::invalid(
                format!("{:?}", uri),
                "expected an absolute module URI",
            )),
        }
    }

    /// Nearest project enclosing the referencing module
    fn project_for(&self, from: &ModuleId) -> Option<Arc<Project>> {
        match ModuleUri::classify(from.as_str()).ok()? {
            ModuleUri::File(path) => self.projects.nearest(path.parent()?),
            ModuleUri::Package(package) => {
                let origin = self.origins.get(&package.base_uri())?.clone();
                self.projects.nearest(&origin)
            }
            _ => None,
        }
    }

    fn record_origin(&self, target: &Target) {
        let Some(origin) = &target.origin else {
            return;
        };
        for candidate in &target.candidates {
            if let Ok(ModuleUri::Package(package)) = ModuleUri::classify(candidate.id.as_str()) {
                self.origins
                    .entry(package.base_uri())
                    .or_insert_with(|| origin.clone());
            }
        }
    }
}

impl ModuleGraph for ModuleStore {
    fn resolve_uri(&self, uri: &str, from: &ModuleId) -> Result<Arc<SyntaxTree>, GraphError> {
        let target = self.locate(uri, from)?;
        self.record_origin(&target);

        for candidate in &target.candidates {
            if let Some(tree) = self.module(&candidate.id) {
                trace!("resolved {} from {} to {}", uri, from, candidate.id);
                return Ok(tree);
            }
        }
        if let Some(loader) = &self.loader {
            for candidate in &target.candidates {
                let Some(path) = &candidate.path else {
                    continue;
                };
                if let Some(source) = loader.load(path)? {
                    debug!("loaded {} from {}", candidate.id, path.display());
                    return Ok(self.insert(SyntaxTree::lower_as(&source, candidate.id.clone(), 1)));
                }
            }
        }
        debug!("module not found: {} (from {})", uri, from);
        Err(GraphError::not_found(uri, from))
    }

    fn declared_dependency_version(&self, project: &Path, package: &str) -> Option<Version> {
        self.projects.nearest(project)?.dependency_version(package)
    }

    fn module(&self, id: &ModuleId) -> Option<Arc<SyntaxTree>> {
        self.trees.get(id).map(|tree| tree.clone())
    }
}

fn canonical_source_id(uri: &str) -> ModuleId {
    match ModuleUri::classify(uri) {
        Ok(parsed) => parsed.module_id().unwrap_or_else(|| ModuleId::new(uri)),
        Err(_) => ModuleId::new(uri),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pklsense_core::syntax::ModuleBuilder;

    #[test]
    fn test_snapshot_target() {
        assert_eq!(
            snapshot_target(Path::new("/a/b.pkl.json")),
            Some(PathBuf::from("/a/b.pkl"))
        );
        assert_eq!(
            snapshot_target(Path::new("/a/b.pkl.yml")),
            Some(PathBuf::from("/a/b.pkl"))
        );
        assert_eq!(snapshot_target(Path::new("/a/data.json")), None);
        assert_eq!(snapshot_target(Path::new("/a/b.pkl")), None);
    }

    #[test]
    fn test_insert_source_bumps_version() {
        let store = ModuleStore::new(GraphConfig::default());
        let source = ModuleBuilder::new("file:///a/main.pkl").build();
        assert_eq!(store.insert_source(&source).version(), 1);
        assert_eq!(store.insert_source(&source).version(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_in_memory_resolution() {
        let store = ModuleStore::new(GraphConfig::default());
        store.insert_source(&ModuleBuilder::new("file:///a/lib/util.pkl").build());
        store.insert_source(&ModuleBuilder::new("https://example.com/remote.pkl").build());
        let from = ModuleId::new("file:///a/app/main.pkl");

        let util = store.resolve_uri("../lib/util.pkl", &from).unwrap();
        assert_eq!(util.id().as_str(), "file:///a/lib/util.pkl");
        assert!(store.resolve_uri("https://example.com/remote.pkl", &from).is_ok());

        let missing = store.resolve_uri("nope.pkl", &from).unwrap_err();
        assert!(missing.is_not_found());
        assert!(!store
            .resolve_uri("ftp://x", &from)
            .unwrap_err()
            .is_not_found());
    }
}
