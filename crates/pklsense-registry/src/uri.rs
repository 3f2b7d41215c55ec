//! Module URI classification and relative resolution
//!
//! Every addressing scheme is one arm of [`ModuleUri`]; resolving a relative
//! reference is a single exhaustive match over the referencing module's
//! scheme.

use std::path::{Component, Path, PathBuf};

use pklsense_core::ModuleId;

use crate::error::GraphError;
use crate::package::PackageUri;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleUri {
    /// `pkl:json`
    Stdlib(String),
    /// `file:///abs/path.pkl`
    File(PathBuf),
    /// `modulepath:/dir/mod.pkl`, searched across all source roots
    ModulePath(String),
    /// `package://host/path@1.0.0#/mod.pkl`
    Package(PackageUri),
    /// `https://host/mod.pkl`
    Network(String),
    /// `@birds/Bird.pkl`: a module of a project dependency
    Dependency { name: String, path: String },
    /// `../lib/util.pkl`
    Relative(String),
}

/// True when the URI text carries an explicit scheme separator
pub fn has_scheme(uri: &str) -> bool {
    uri.contains(':')
}

impl ModuleUri {
    pub fn classify(uri: &str) -> Result<Self, GraphError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(GraphError::invalid(uri, "empty module URI"));
        }
        if let Some(rest) = uri.strip_prefix('@') {
            let (name, path) = rest.split_once('/').unwrap_or((rest, ""));
            if name.is_empty() {
                return Err(GraphError::invalid(uri, "missing dependency name"));
            }
            return Ok(ModuleUri::Dependency {
                name: name.to_string(),
                path: format!("/{}", path),
            });
        }
        let Some((scheme, rest)) = uri.split_once(':') else {
            return Ok(ModuleUri::Relative(uri.to_string()));
        };
        match scheme {
            "pkl" => Ok(ModuleUri::Stdlib(rest.to_string())),
            "file" => {
                let path = rest.strip_prefix("//").unwrap_or(rest);
                if !path.starts_with('/') {
                    return Err(GraphError::invalid(uri, "file URIs must be absolute"));
                }
                Ok(ModuleUri::File(PathBuf::from(path)))
            }
            "modulepath" => {
                let path = rest.trim_start_matches('/');
                Ok(ModuleUri::ModulePath(format!("/{}", path)))
            }
            "package" | "projectpackage" => PackageUri::parse(uri)
                .map(ModuleUri::Package)
                .map_err(|e| GraphError::invalid(uri, e.to_string())),
            "http" | "https" => Ok(ModuleUri::Network(uri.to_string())),
            other => Err(GraphError::invalid(
                uri,
                format!("unsupported scheme '{}'", other),
            )),
        }
    }

    /// Canonical identity of an absolute URI
    ///
    /// Relative and dependency references have no identity of their own until
    /// resolved against a referencing module.
    pub fn module_id(&self) -> Option<ModuleId> {
        match self {
            ModuleUri::Stdlib(name) => Some(ModuleId::new(format!("pkl:{}", name))),
            ModuleUri::File(path) => Some(file_id(path)),
            ModuleUri::ModulePath(path) => Some(ModuleId::new(format!("modulepath:{}", path))),
            ModuleUri::Package(package) => Some(ModuleId::new(package.to_string())),
            ModuleUri::Network(url) => Some(ModuleId::new(url)),
            ModuleUri::Dependency { .. } | ModuleUri::Relative(_) => None,
        }
    }

    pub fn is_absolute(&self) -> bool {
        !matches!(self, ModuleUri::Dependency { .. } | ModuleUri::Relative(_))
    }

    /// Resolve a relative reference against the module that contains it
    ///
    /// A file module under one of `source_roots` resolves relative paths as
    /// `modulepath:` URIs, so the target may live in any root; other file
    /// modules resolve plainly against their directory. Package and network
    /// modules keep relative targets inside the same package or host.
    pub fn resolve_relative(
        path: &str,
        from: &ModuleId,
        source_roots: &[PathBuf],
    ) -> Result<ModuleUri, GraphError> {
        let base = ModuleUri::classify(from.as_str())?;
        match base {
            ModuleUri::File(file) => {
                let dir = file.parent().unwrap_or(Path::new("/"));
                for root in source_roots {
                    if let Ok(inner) = dir.strip_prefix(root) {
                        let joined = join_normalized(&format!("/{}", inner.display()), path)
                            .ok_or_else(|| GraphError::invalid(path, "escapes the source root"))?;
                        return Ok(ModuleUri::ModulePath(joined));
                    }
                }
                let joined = join_normalized(&dir.display().to_string(), path)
                    .unwrap_or_else(|| "/".to_string());
                Ok(ModuleUri::File(PathBuf::from(joined)))
            }
            ModuleUri::ModulePath(current) => {
                let joined = join_normalized(parent_of(&current), path)
                    .ok_or_else(|| GraphError::invalid(path, "escapes the module path"))?;
                Ok(ModuleUri::ModulePath(joined))
            }
            ModuleUri::Package(package) => {
                let current = package.fragment.as_deref().unwrap_or("/");
                let joined = join_normalized(parent_of(current), path)
                    .ok_or_else(|| GraphError::invalid(path, "escapes the package"))?;
                Ok(ModuleUri::Package(package.with_fragment(joined)))
            }
            ModuleUri::Network(url) => {
                let (origin, current) = split_url(&url);
                let joined = join_normalized(parent_of(current), path)
                    .ok_or_else(|| GraphError::invalid(path, "escapes the host"))?;
                Ok(ModuleUri::Network(format!("{}{}", origin, joined)))
            }
            ModuleUri::Stdlib(_) | ModuleUri::Dependency { .. } | ModuleUri::Relative(_) => Err(
                GraphError::invalid(path, format!("cannot resolve relative to {}", from)),
            ),
        }
    }
}

pub fn file_id(path: &Path) -> ModuleId {
    ModuleId::new(format!("file://{}", path.display()))
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

fn split_url(url: &str) -> (&str, &str) {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(index) => url.split_at(after_scheme + index),
        None => (url, "/"),
    }
}

/// Join `path` onto the absolute directory `dir`, collapsing `.` and `..`
///
/// Returns `None` when `..` would climb above `/`.
pub fn join_normalized(dir: &str, path: &str) -> Option<String> {
    let joined = if path.starts_with('/') {
        PathBuf::from(path)
    } else {
        Path::new(dir).join(path)
    };
    let mut parts: Vec<String> = Vec::new();
    for component in joined.components() {
        match component {
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }
    Some(format!("/{}", parts.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_schemes() {
        assert_eq!(
            ModuleUri::classify("pkl:json").unwrap(),
            ModuleUri::Stdlib("json".into())
        );
        assert_eq!(
            ModuleUri::classify("file:///a/b.pkl").unwrap(),
            ModuleUri::File(PathBuf::from("/a/b.pkl"))
        );
        assert_eq!(
            ModuleUri::classify("modulepath:/x/y.pkl").unwrap(),
            ModuleUri::ModulePath("/x/y.pkl".into())
        );
        assert!(matches!(
            ModuleUri::classify("package://example.com/birds@1.0.0#/Bird.pkl").unwrap(),
            ModuleUri::Package(_)
        ));
        assert_eq!(
            ModuleUri::classify("https://example.com/m.pkl").unwrap(),
            ModuleUri::Network("https://example.com/m.pkl".into())
        );
        assert_eq!(
            ModuleUri::classify("@birds/Bird.pkl").unwrap(),
            ModuleUri::Dependency {
                name: "birds".into(),
                path: "/Bird.pkl".into()
            }
        );
        assert_eq!(
            ModuleUri::classify("../lib.pkl").unwrap(),
            ModuleUri::Relative("../lib.pkl".into())
        );
        assert!(ModuleUri::classify("ftp://x/y.pkl").is_err());
        assert!(ModuleUri::classify("file:relative.pkl").is_err());
        assert!(ModuleUri::classify("").is_err());
    }

    #[test]
    fn test_relative_to_plain_file() {
        let from = ModuleId::new("file:///work/app/main.pkl");
        let resolved = ModuleUri::resolve_relative("../lib/util.pkl", &from, &[]).unwrap();
        assert_eq!(resolved, ModuleUri::File(PathBuf::from("/work/lib/util.pkl")));
    }

    #[test]
    fn test_relative_inside_source_root_becomes_modulepath() {
        let roots = vec![PathBuf::from("/work/src"), PathBuf::from("/work/gen")];
        let from = ModuleId::new("file:///work/src/app/main.pkl");
        let resolved = ModuleUri::resolve_relative("shared/util.pkl", &from, &roots).unwrap();
        assert_eq!(resolved, ModuleUri::ModulePath("/app/shared/util.pkl".into()));

        let escaping = ModuleUri::resolve_relative("../../x.pkl", &from, &roots);
        assert!(escaping.is_err());
    }

    #[test]
    fn test_relative_inside_package_and_network() {
        let from = ModuleId::new("package://example.com/birds@1.0.0#/species/Parrot.pkl");
        let resolved = ModuleUri::resolve_relative("../Bird.pkl", &from, &[]).unwrap();
        assert_eq!(
            resolved.module_id().unwrap().as_str(),
            "package://example.com/birds@1.0.0#/Bird.pkl"
        );

        let from = ModuleId::new("https://example.com/lib/a.pkl");
        let resolved = ModuleUri::resolve_relative("b.pkl", &from, &[]).unwrap();
        assert_eq!(resolved, ModuleUri::Network("https://example.com/lib/b.pkl".into()));

        let from = ModuleId::new("pkl:base");
        assert!(ModuleUri::resolve_relative("x.pkl", &from, &[]).is_err());
    }

    #[test]
    fn test_has_scheme() {
        assert!(has_scheme("a:pkg"));
        assert!(has_scheme("pkl:json"));
        assert!(!has_scheme("a"));
        assert!(!has_scheme("../b.pkl"));
    }
}
