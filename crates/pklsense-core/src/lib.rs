//! Syntax tree model and structural type lattice for pklsense

pub mod error;
pub mod members;
pub mod subtyping;
pub mod syntax;
pub mod table;
pub mod types;

pub use error::CoreError;
pub use members::{AncestorChain, CachedMember, MemberCache, MemberDef, MemberKind};
pub use syntax::{DeclId, ModuleId, ModuleSource, NodeId, NodeKind, Span, SyntaxTree, TypeRef};
pub use table::TypeTable;
pub use types::{AliasDef, BaseTypes, ClassDef, DeclRef, Type, TypeEnv, TypeParamDef, TypeParamRef};
