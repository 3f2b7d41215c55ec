//! `pklsense.toml` loading and discovery

use std::fs;
use std::path::{Path, PathBuf};

use pklsense_registry::GraphConfig;
use pklsense_resolve::CheckOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::format::GrammarVersion;

pub const CONFIG_FILE: &str = "pklsense.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub formatter: FormatterConfig,
    pub diagnostics: CheckOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Roots whose modules are addressed as `modulepath:` URIs
    pub source_roots: Vec<PathBuf>,
    /// Unpacked package cache
    pub package_cache: Option<PathBuf>,
    /// Project directories holding `PklProject.deps.json`
    pub projects: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    /// Path to the `pkl` executable; looked up on `PATH` when unset
    pub executable: Option<PathBuf>,
    pub grammar_version: GrammarVersion,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find the nearest `pklsense.toml` at or above `start`
    pub fn discover(start: &Path) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        for dir in start.ancestors() {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                debug!("using configuration {}", candidate.display());
                let config = Self::from_file(&candidate)?;
                return Ok(Some((candidate, config)));
            }
        }
        Ok(None)
    }

    /// Graph settings with relative paths taken against `base`
    pub fn graph_config(&self, base: &Path) -> GraphConfig {
        let absolute = |path: &PathBuf| {
            if path.is_absolute() {
                path.clone()
            } else {
                base.join(path)
            }
        };
        GraphConfig {
            source_roots: self.analysis.source_roots.iter().map(absolute).collect(),
            package_cache: self.analysis.package_cache.as_ref().map(absolute),
            projects: self.analysis.projects.iter().map(absolute).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_sections() {
        let config: Config = toml::from_str(
            r#"
[analysis]
source_roots = ["src", "/abs/generated"]
package_cache = ".cache"

[formatter]
grammar_version = "v1"

[diagnostics]
type_mismatches = false
"#,
        )
        .unwrap();

        assert_eq!(config.formatter.grammar_version, GrammarVersion::V1);
        assert!(!config.diagnostics.type_mismatches);
        assert!(config.diagnostics.unresolved_references);

        let graph = config.graph_config(Path::new("/work"));
        assert_eq!(
            graph.source_roots,
            vec![PathBuf::from("/work/src"), PathBuf::from("/abs/generated")]
        );
        assert_eq!(graph.package_cache, Some(PathBuf::from("/work/.cache")));
    }

    #[test]
    fn test_discover_walks_up() {
        let temp = tempfile::TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "[formatter]\nexecutable = \"/opt/pkl\"\n").unwrap();
        let nested = temp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let (path, config) = Config::discover(&nested).unwrap().unwrap();
        assert_eq!(path, temp.path().join(CONFIG_FILE));
        assert_eq!(config.formatter.executable, Some(PathBuf::from("/opt/pkl")));
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "[analysis\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }
}
