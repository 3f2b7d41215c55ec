//! Library interface for the pklsense command-line tool

pub mod commands;
pub mod config;
pub mod format;
pub mod workspace;

pub use config::{Config, ConfigError};
pub use format::{CliFormatter, FormatError, Formatter, GrammarVersion};
pub use workspace::{SourceError, Workspace};
