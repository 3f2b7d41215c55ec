//! Name resolution and static typing for Pkl modules
//!
//! The [`Resolver`] sits on top of a [`pklsense_registry::ModuleGraph`] and
//! answers the questions an editor asks about a module: what a reference
//! points to, what type an expression has, which members a value exposes,
//! which ancestor member a declaration overrides, which imports are unused
//! and what is wrong with the module.

pub mod background;
pub mod base;
pub mod check;
pub mod error;
pub mod imports;
pub mod overrides;
pub mod resolver;

pub use background::resolve_module_in_background;
pub use check::{CheckOptions, Diagnostic, DiagnosticCode, Severity};
pub use error::BackgroundError;
pub use imports::ImportEdit;
pub use overrides::{SuperMember, SuperMemberKind};
pub use resolver::{Completion, DeclKind, Declaration, Resolution, Resolver};
