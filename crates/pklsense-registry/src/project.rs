//! Projects and their resolved dependency manifests
//!
//! A project is a directory holding a `PklProject.deps.json`. The manifest maps
//! each dependency's canonical name (`package://host/path@<major>`) to the
//! exact version it was resolved to, either as a remote package or as a local
//! project on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ProjectError;
use crate::package::PackageUri;

pub const DEPS_FILE: &str = "PklProject.deps.json";
pub const SUPPORTED_SCHEMA: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyManifest {
    pub schema_version: u32,
    #[serde(default)]
    pub resolved_dependencies: IndexMap<String, ResolvedDependency>,
    /// Dependency names usable in `@name/...` imports, mapped to canonical names
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResolvedDependency {
    Remote {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksums: Option<Checksums>,
    },
    Local {
        uri: String,
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    pub sha256: String,
}

impl ResolvedDependency {
    pub fn uri(&self) -> &str {
        match self {
            ResolvedDependency::Remote { uri, .. } | ResolvedDependency::Local { uri, .. } => uri,
        }
    }

    pub fn package(&self) -> Result<PackageUri, ProjectError> {
        PackageUri::parse(self.uri())
    }
}

impl DependencyManifest {
    pub fn parse(input: &str, path: &Path) -> Result<Self, ProjectError> {
        let manifest: DependencyManifest =
            serde_json::from_str(input).map_err(|source| ProjectError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        if manifest.schema_version != SUPPORTED_SCHEMA {
            return Err(ProjectError::UnsupportedSchema(manifest.schema_version));
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let input = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&input, path)
    }
}

/// A project directory with its parsed manifest
#[derive(Debug, Clone)]
pub struct Project {
    pub dir: PathBuf,
    pub manifest: DependencyManifest,
}

impl Project {
    /// Look up a dependency by canonical name (`package://host/path@1`), by
    /// bare package name (`host/path`), or by its `@name`
    pub fn dependency(&self, package: &str) -> Option<(&str, &ResolvedDependency)> {
        let deps = &self.manifest.resolved_dependencies;
        if let Some((key, dep)) = deps.get_key_value(package) {
            return Some((key.as_str(), dep));
        }
        if let Some(canonical) = self.manifest.dependencies.get(package) {
            if let Some((key, dep)) = deps.get_key_value(canonical) {
                return Some((key.as_str(), dep));
            }
        }
        let bare = package
            .strip_prefix("package://")
            .unwrap_or(package)
            .split('@')
            .next()
            .unwrap_or(package);
        deps.iter().find_map(|(key, dep)| {
            let name = key.strip_prefix("package://")?.split('@').next()?;
            (name == bare).then_some((key.as_str(), dep))
        })
    }

    pub fn dependency_version(&self, package: &str) -> Option<Version> {
        let (_, dep) = self.dependency(package)?;
        dep.package().ok().map(|p| p.version)
    }

    /// Directory of a local dependency, resolved against the project
    pub fn local_path(&self, dep: &ResolvedDependency) -> Option<PathBuf> {
        match dep {
            ResolvedDependency::Local { path, .. } => Some(self.dir.join(path)),
            ResolvedDependency::Remote { .. } => None,
        }
    }
}

/// Memoized nearest-project lookup
#[derive(Debug, Default)]
pub struct ProjectIndex {
    /// Directory → nearest project (or none), filled lazily
    nearest: DashMap<PathBuf, Option<Arc<Project>>>,
    /// Projects registered explicitly, keyed by directory
    explicit: DashMap<PathBuf, Arc<Project>>,
}

impl ProjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, project: Project) -> Arc<Project> {
        let project = Arc::new(project);
        self.explicit.insert(project.dir.clone(), project.clone());
        self.nearest.clear();
        project
    }

    /// Load a project from its directory and register it
    pub fn load(&self, dir: &Path) -> Result<Arc<Project>, ProjectError> {
        let manifest = DependencyManifest::load(&dir.join(DEPS_FILE))?;
        Ok(self.register(Project {
            dir: dir.to_path_buf(),
            manifest,
        }))
    }

    /// The project whose directory most closely encloses `dir`
    ///
    /// Registered projects win over manifests found on disk at the same
    /// directory. Malformed manifests are skipped.
    pub fn nearest(&self, dir: &Path) -> Option<Arc<Project>> {
        if let Some(hit) = self.nearest.get(dir) {
            return hit.clone();
        }
        let found = dir.ancestors().find_map(|candidate| {
            if let Some(project) = self.explicit.get(candidate) {
                return Some(project.clone());
            }
            let manifest_path = candidate.join(DEPS_FILE);
            if !manifest_path.is_file() {
                return None;
            }
            match DependencyManifest::load(&manifest_path) {
                Ok(manifest) => {
                    debug!("discovered project at {}", candidate.display());
                    Some(Arc::new(Project {
                        dir: candidate.to_path_buf(),
                        manifest,
                    }))
                }
                Err(e) => {
                    tracing::warn!("ignoring {}: {}", manifest_path.display(), e);
                    None
                }
            }
        });
        trace!(
            "nearest project for {}: {:?}",
            dir.display(),
            found.as_ref().map(|p| &p.dir)
        );
        self.nearest.insert(dir.to_path_buf(), found.clone());
        found
    }

    /// All registered projects, sorted by directory
    pub fn projects(&self) -> BTreeMap<PathBuf, Arc<Project>> {
        self.explicit
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn invalidate(&self) {
        self.nearest.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MANIFEST: &str = r#"{
  "schemaVersion": 1,
  "resolvedDependencies": {
    "package://example.com/birds@1": {
      "type": "remote",
      "uri": "projectpackage://example.com/birds@1.4.2",
      "checksums": { "sha256": "abc123" }
    },
    "package://example.com/fruit@2": {
      "type": "local",
      "uri": "projectpackage://example.com/fruit@2.0.1",
      "path": "../fruit"
    }
  },
  "dependencies": { "birds": "package://example.com/birds@1" }
}"#;

    fn project() -> Project {
        Project {
            dir: PathBuf::from("/work/app"),
            manifest: DependencyManifest::parse(MANIFEST, Path::new("deps.json")).unwrap(),
        }
    }

    #[test]
    fn test_dependency_lookup_forms() {
        let project = project();
        let v142 = Some(Version::new(1, 4, 2));
        assert_eq!(project.dependency_version("package://example.com/birds@1"), v142);
        assert_eq!(project.dependency_version("example.com/birds"), v142);
        assert_eq!(project.dependency_version("birds"), v142);
        assert_eq!(
            project.dependency_version("package://example.com/fruit@2.0.0"),
            Some(Version::new(2, 0, 1))
        );
        assert_eq!(project.dependency_version("example.com/trees"), None);
    }

    #[test]
    fn test_local_dependency_path() {
        let project = project();
        let (_, fruit) = project.dependency("example.com/fruit").unwrap();
        assert_eq!(
            project.local_path(fruit),
            Some(PathBuf::from("/work/app/../fruit"))
        );
    }

    #[test]
    fn test_rejects_unknown_schema() {
        let input = r#"{ "schemaVersion": 7, "resolvedDependencies": {} }"#;
        assert!(matches!(
            DependencyManifest::parse(input, Path::new("x")),
            Err(ProjectError::UnsupportedSchema(7))
        ));
    }
}
