//! Published package coordinates
//!
//! `package://example.com/birds@1.2.0#/Bird.pkl` names the module `/Bird.pkl`
//! inside version `1.2.0` of the package `example.com/birds`.

use std::fmt;
use std::str::FromStr;

use semver::Version;

use crate::error::ProjectError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageUri {
    pub authority: String,
    /// Package path, starting with `/`
    pub path: String,
    pub version: Version,
    /// Module path inside the package, starting with `/`
    pub fragment: Option<String>,
}

impl PackageUri {
    pub fn parse(input: &str) -> Result<Self, ProjectError> {
        let invalid = |reason: &str| ProjectError::InvalidPackage {
            uri: input.to_string(),
            reason: reason.to_string(),
        };

        let rest = input
            .strip_prefix("package://")
            .or_else(|| input.strip_prefix("projectpackage://"))
            .ok_or_else(|| invalid("expected a package:// scheme"))?;
        let (base, fragment) = match rest.split_once('#') {
            Some((base, fragment)) => (base, Some(fragment)),
            None => (rest, None),
        };
        let (location, version) = base
            .rsplit_once('@')
            .ok_or_else(|| invalid("missing @version"))?;
        let version = Version::parse(version).map_err(|e| invalid(&e.to_string()))?;
        let (authority, path) = location
            .split_once('/')
            .ok_or_else(|| invalid("missing package path"))?;
        if authority.is_empty() || path.is_empty() {
            return Err(invalid("empty authority or path"));
        }

        let fragment = match fragment {
            None | Some("") => None,
            Some(f) if f.starts_with('/') => Some(f.to_string()),
            Some(_) => return Err(invalid("fragment must be an absolute path")),
        };

        Ok(Self {
            authority: authority.to_string(),
            path: format!("/{}", path),
            version,
            fragment,
        })
    }

    /// `example.com/birds`
    pub fn name(&self) -> String {
        format!("{}{}", self.authority, self.path)
    }

    /// The package itself, without a module fragment
    pub fn base_uri(&self) -> String {
        format!("package://{}{}@{}", self.authority, self.path, self.version)
    }

    /// Key under which projects record this package: the URI with only the
    /// major version
    pub fn canonical_name(&self) -> String {
        format!(
            "package://{}{}@{}",
            self.authority, self.path, self.version.major
        )
    }

    pub fn with_version(&self, version: Version) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }

    pub fn with_fragment(&self, fragment: impl Into<String>) -> Self {
        Self {
            fragment: Some(fragment.into()),
            ..self.clone()
        }
    }
}

impl fmt::Display for PackageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_uri())?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

impl FromStr for PackageUri {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageUri::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_package_uri() {
        let uri = PackageUri::parse("package://example.com/birds@1.2.0#/Bird.pkl").unwrap();
        assert_eq!(uri.authority, "example.com");
        assert_eq!(uri.path, "/birds");
        assert_eq!(uri.version, Version::new(1, 2, 0));
        assert_eq!(uri.fragment.as_deref(), Some("/Bird.pkl"));
        assert_eq!(uri.name(), "example.com/birds");
        assert_eq!(uri.canonical_name(), "package://example.com/birds@1");
        assert_eq!(uri.to_string(), "package://example.com/birds@1.2.0#/Bird.pkl");
    }

    #[test]
    fn test_project_package_scheme() {
        let uri = PackageUri::parse("projectpackage://pkg.pkl-lang.org/pantry/toml@1.0.3").unwrap();
        assert_eq!(uri.base_uri(), "package://pkg.pkl-lang.org/pantry/toml@1.0.3");
        assert_eq!(uri.fragment, None);
    }

    #[test]
    fn test_invalid_package_uris() {
        for input in [
            "https://example.com/birds@1.0.0",
            "package://example.com/birds",
            "package://example.com/birds@one",
            "package://example.com@1.0.0",
            "package://example.com/birds@1.0.0#Bird.pkl",
        ] {
            assert!(PackageUri::parse(input).is_err(), "accepted {}", input);
        }
    }
}
