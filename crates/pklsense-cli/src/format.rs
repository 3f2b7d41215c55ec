//! Formatting through the external `pkl` executable
//!
//! pklsense never formats source itself. [`CliFormatter`] pipes the text
//! through `pkl format` and hands back whatever it prints; a rejection is
//! reported verbatim and never retried.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum GrammarVersion {
    V1,
    #[default]
    V2,
}

impl GrammarVersion {
    fn as_arg(self) -> &'static str {
        match self {
            GrammarVersion::V1 => "1",
            GrammarVersion::V2 => "2",
        }
    }
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Formatter executable '{0}' not found")]
    NotFound(String),

    #[error("Failed to run formatter: {0}")]
    Io(#[from] std::io::Error),

    #[error("Formatter rejected input: {message}")]
    Rejected { message: String },
}

pub trait Formatter {
    fn format(&self, source: &str, grammar: GrammarVersion) -> Result<String, FormatError>;
}

pub struct CliFormatter {
    executable: PathBuf,
}

impl CliFormatter {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Use `configured`, or find `pkl` on `PATH`
    pub fn locate(configured: Option<&Path>) -> Result<Self, FormatError> {
        let name = configured.unwrap_or_else(|| Path::new("pkl"));
        let executable =
            which::which(name).map_err(|_| FormatError::NotFound(name.display().to_string()))?;
        debug!("formatting with {}", executable.display());
        Ok(Self { executable })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl Formatter for CliFormatter {
    fn format(&self, source: &str, grammar: GrammarVersion) -> Result<String, FormatError> {
        let mut child = Command::new(&self.executable)
            .arg("format")
            .arg("--grammar-version")
            .arg(grammar.as_arg())
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => match stdin.write_all(source.as_bytes()) {
                    // the formatter may exit before reading everything
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                },
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            written.and(output)
        })?;

        if !output.status.success() {
            return Err(FormatError::Rejected {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_output_is_returned() {
        let dir = TempDir::new().unwrap();
        let formatter = CliFormatter::new(script(&dir, "pkl", "cat"));
        let formatted = formatter.format("foo = 1\n", GrammarVersion::V2).unwrap();
        assert_eq!(formatted, "foo = 1\n");
    }

    #[test]
    fn test_grammar_version_is_passed() {
        let dir = TempDir::new().unwrap();
        let formatter = CliFormatter::new(script(&dir, "pkl", "echo \"$3\""));
        assert_eq!(formatter.format("", GrammarVersion::V1).unwrap(), "1\n");
    }

    #[test]
    fn test_rejection_carries_message() {
        let dir = TempDir::new().unwrap();
        let formatter = CliFormatter::new(script(&dir, "pkl", "echo 'unexpected token' >&2\nexit 1"));
        match formatter.format("foo = = 1", GrammarVersion::V2) {
            Err(FormatError::Rejected { message }) => assert_eq!(message, "unexpected token"),
            other => panic!("expected rejection, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_executable() {
        let missing = Path::new("/nonexistent/pkl");
        assert!(matches!(
            CliFormatter::locate(Some(missing)),
            Err(FormatError::NotFound(_))
        ));
    }
}
