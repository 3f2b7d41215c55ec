//! Module diagnostics
//!
//! Every check runs on its own: a broken import produces one diagnostic and
//! leaves the remaining checks of the module untouched.

use pklsense_core::syntax::NodeKind;
use pklsense_core::{NodeId, Span, SyntaxTree, Type, TypeEnv};
use pklsense_registry::GraphError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::base::BASE_URI;
use crate::resolver::{DeclKind, Resolution, Resolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    UnresolvedReference,
    ModuleNotFound,
    InvalidModuleUri,
    CircularInheritance,
    TypeMismatch,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::UnresolvedReference => "unresolved-reference",
            DiagnosticCode::ModuleNotFound => "module-not-found",
            DiagnosticCode::InvalidModuleUri => "invalid-module-uri",
            DiagnosticCode::CircularInheritance => "circular-inheritance",
            DiagnosticCode::TypeMismatch => "type-mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Span,
    #[serde(skip)]
    pub node: NodeId,
}

impl Diagnostic {
    fn error(tree: &SyntaxTree, node: NodeId, code: DiagnosticCode, message: String) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message,
            span: tree.span(node),
            node,
        }
    }
}

/// Which checks [`Resolver::check_module`] runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckOptions {
    pub unresolved_references: bool,
    pub module_uris: bool,
    pub circular_inheritance: bool,
    pub type_mismatches: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            unresolved_references: true,
            module_uris: true,
            circular_inheritance: true,
            type_mismatches: true,
        }
    }
}

impl Resolver {
    /// Diagnostics for `tree`, ordered by position
    pub fn check_module(&self, tree: &SyntaxTree, options: &CheckOptions) -> Vec<Diagnostic> {
        self.adopt(tree);
        let mut diagnostics = Vec::new();
        if options.module_uris {
            self.check_module_uris(tree, &mut diagnostics);
        }
        if options.circular_inheritance {
            self.check_cycles(tree, &mut diagnostics);
        }
        if options.unresolved_references {
            self.check_references(tree, &mut diagnostics);
        }
        if options.type_mismatches {
            self.check_types(tree, &mut diagnostics);
        }
        diagnostics.sort_by_key(|d| (d.span.start, d.span.end));
        debug!("{} diagnostics in {}", diagnostics.len(), tree.id());
        diagnostics
    }

    fn check_module_uris(&self, tree: &SyntaxTree, out: &mut Vec<Diagnostic>) {
        for node in tree.descendants(NodeId::ROOT) {
            let uri = match tree.kind(node) {
                NodeKind::ModuleClause(clause) => &clause.uri,
                NodeKind::Import(clause) | NodeKind::ImportExpr(clause) => &clause.uri,
                _ => continue,
            };
            let Err(error) = self.resolve_module_uri(tree, uri) else {
                continue;
            };
            // The standard library is not part of the graph
            if uri.starts_with("pkl:") && uri != BASE_URI && error.is_not_found() {
                continue;
            }
            let code = match &error {
                GraphError::InvalidUri { .. } => DiagnosticCode::InvalidModuleUri,
                GraphError::NotFound { .. } | GraphError::Load { .. } => DiagnosticCode::ModuleNotFound,
            };
            out.push(Diagnostic::error(tree, node, code, error.to_string()));
        }
    }

    fn check_cycles(&self, tree: &SyntaxTree, out: &mut Vec<Diagnostic>) {
        let module = self.module_decl(tree);
        if self.ancestor_chain(&module).cyclic {
            let at = tree.module_clause().map_or(NodeId::ROOT, |(node, _)| node);
            out.push(Diagnostic::error(
                tree,
                at,
                DiagnosticCode::CircularInheritance,
                format!("Module '{}' inherits from itself", module.name),
            ));
        }
        for node in tree.descendants(NodeId::ROOT) {
            if !matches!(tree.kind(node), NodeKind::Class(_)) {
                continue;
            }
            let Some(class) = self.decl_ref(tree, node) else {
                continue;
            };
            if self.ancestor_chain(&class).cyclic {
                out.push(Diagnostic::error(
                    tree,
                    node,
                    DiagnosticCode::CircularInheritance,
                    format!("Class '{}' inherits from itself", class.name),
                ));
            }
        }
    }

    fn check_references(&self, tree: &SyntaxTree, out: &mut Vec<Diagnostic>) {
        for node in tree.descendants(NodeId::ROOT) {
            let (name, qualified) = match tree.kind(node) {
                NodeKind::Ident(name) => (name, false),
                NodeKind::Access { name, .. } => (name, true),
                NodeKind::Call { name, has_receiver } => (name, *has_receiver),
                _ => continue,
            };
            if self.resolve(tree, node).is_resolved() {
                continue;
            }
            let suppressed = if qualified {
                tree.child(node, 0)
                    .is_some_and(|receiver| self.is_open_receiver(tree, receiver))
            } else {
                self.has_open_scope(tree, node)
            };
            if suppressed {
                continue;
            }
            out.push(Diagnostic::error(
                tree,
                node,
                DiagnosticCode::UnresolvedReference,
                format!("Unresolved reference '{}'", name),
            ));
        }
    }

    /// A receiver whose members cannot be known statically
    fn is_open_receiver(&self, tree: &SyntaxTree, receiver: NodeId) -> bool {
        if let Resolution::Resolved(decl) = self.resolve(tree, receiver) {
            if decl.kind == DeclKind::Import {
                let target = match tree.kind(decl.node) {
                    NodeKind::Import(clause) => self.resolve_module_uri(tree, &clause.uri),
                    _ => return true,
                };
                return match target {
                    Ok(module) => self.has_unknown_ancestor(&self.module_decl(&module)),
                    Err(_) => true,
                };
            }
        }
        self.is_open_type(&self.type_of(tree, receiver))
    }

    fn is_open_type(&self, ty: &Type) -> bool {
        let base = TypeEnv::base(self);
        match ty.expand_aliases(self) {
            Type::Unknown | Type::Parameter(_) => true,
            Type::Class { class, .. } => {
                class.id == base.dynamic.id || self.has_unknown_ancestor(&class)
            }
            Type::Nullable(inner) => self.is_open_type(&inner),
            Type::Union(members) => members.iter().any(|m| self.is_open_type(m)),
            _ => false,
        }
    }

    /// Whether an enclosing implicit receiver has members that cannot be
    /// known statically
    fn has_open_scope(&self, tree: &SyntaxTree, node: NodeId) -> bool {
        let enclosing = tree.ancestors(node).any(|scope| match tree.kind(scope) {
            NodeKind::ObjectBody => matches!(self.type_of(tree, scope), Type::Unknown),
            NodeKind::Class(_) => self
                .decl_ref(tree, scope)
                .is_some_and(|class| self.has_unknown_ancestor(&class)),
            _ => false,
        });
        enclosing || self.has_unknown_ancestor(&self.module_decl(tree))
    }

    fn check_types(&self, tree: &SyntaxTree, out: &mut Vec<Diagnostic>) {
        for node in tree.descendants(NodeId::ROOT) {
            let (declared, value) = match tree.kind(node) {
                NodeKind::Property(_) => (
                    self.declared_property_type(tree, node),
                    value_expression(tree, node),
                ),
                NodeKind::ObjectProperty(binding) => (
                    binding
                        .ty
                        .as_ref()
                        .map(|annotation| self.resolve_type_ref(tree, node, annotation)),
                    value_expression(tree, node),
                ),
                NodeKind::Let(binding) => (
                    binding
                        .ty
                        .as_ref()
                        .map(|annotation| self.resolve_type_ref(tree, node, annotation)),
                    tree.child(node, 0),
                ),
                _ => continue,
            };
            let (Some(declared), Some(value)) = (declared, value) else {
                continue;
            };
            let declared = declared.erase_parameters();
            let actual = self.type_of(tree, value);
            if !actual.has_common_subtype_with(&declared, self) {
                out.push(Diagnostic::error(
                    tree,
                    value,
                    DiagnosticCode::TypeMismatch,
                    format!("Type mismatch: expected '{}', found '{}'", declared, actual),
                ));
            }
        }
    }
}

fn value_expression(tree: &SyntaxTree, node: NodeId) -> Option<NodeId> {
    tree.children(node)
        .iter()
        .copied()
        .find(|&child| tree.kind(child).is_expression())
}
