//! Removing unused imports and putting the rest in canonical order

use std::collections::HashSet;

use indexmap::IndexMap;
use pklsense_core::syntax::{ImportClause, NodeKind};
use pklsense_core::{NodeId, Span, SyntaxTree, TypeRef};
use pklsense_registry::has_scheme;
use serde::Serialize;
use tracing::debug;

use crate::resolver::{DeclKind, Resolver};

/// Replacement for a module's import list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportEdit {
    /// Covers every original import clause
    pub span: Span,
    #[serde(skip)]
    pub imports: Vec<ImportClause>,
    pub text: String,
    /// False when the optimized list equals the original one
    pub changed: bool,
}

impl Resolver {
    /// Compute the optimized import list of `tree`
    ///
    /// Keeps imports referenced from the module body, drops duplicates with
    /// the same target and alias, and orders URIs with a scheme before
    /// relative ones, then by URI, then by alias. Returns `None` for a
    /// module without imports.
    pub fn optimize_imports(&self, tree: &SyntaxTree) -> Option<ImportEdit> {
        self.adopt(tree);
        let original: Vec<(NodeId, &ImportClause)> = tree.imports().collect();
        let span = original
            .iter()
            .map(|(node, _)| tree.span(*node))
            .reduce(Span::cover)?;

        let used = self.used_imports(tree);
        let mut kept: IndexMap<(String, Option<String>), ImportClause> = IndexMap::new();
        for (node, clause) in &original {
            if !used.contains(node) {
                debug!("dropping unused import {} in {}", clause.uri, tree.id());
                continue;
            }
            let target = self
                .resolve_module_uri(tree, &clause.uri)
                .map(|module| module.id().to_string())
                .unwrap_or_else(|_| clause.uri.clone());
            kept.entry((target, clause.alias.clone()))
                .or_insert_with(|| (*clause).clone());
        }

        let mut imports: Vec<ImportClause> = kept.into_values().collect();
        imports.sort_by(|a, b| {
            (!has_scheme(&a.uri), &a.uri, &a.alias).cmp(&(!has_scheme(&b.uri), &b.uri, &b.alias))
        });
        let changed = imports.len() != original.len()
            || imports.iter().zip(&original).any(|(new, (_, old))| new != *old);
        let text = imports
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Some(ImportEdit {
            span,
            imports,
            text,
            changed,
        })
    }

    /// Import nodes referenced by a resolved reference or a type annotation
    fn used_imports(&self, tree: &SyntaxTree) -> HashSet<NodeId> {
        let own = tree.id().clone();
        let mut used = HashSet::new();
        let bindings: Vec<(NodeId, String)> = tree
            .imports()
            .map(|(node, clause)| (node, clause.binding_name()))
            .collect();

        for node in tree.descendants(NodeId::ROOT) {
            let kind = tree.kind(node);
            if matches!(
                kind,
                NodeKind::Ident(_) | NodeKind::Access { .. } | NodeKind::Call { .. }
            ) {
                if let Some(decl) = self.resolve(tree, node).declaration() {
                    if decl.kind == DeclKind::Import && decl.module == own {
                        used.insert(decl.node);
                    }
                }
            }
            for annotation in annotations(kind) {
                annotation.for_each_name(&mut |name| {
                    let head = name.split('.').next().unwrap_or(name);
                    let qualified = name.contains('.');
                    if !qualified && tree.find_type_decl(name).is_some() {
                        return;
                    }
                    for (import, binding) in &bindings {
                        if binding == head {
                            used.insert(*import);
                        }
                    }
                });
            }
        }
        used
    }
}

fn annotations(kind: &NodeKind) -> Vec<&TypeRef> {
    match kind {
        NodeKind::Class(header) => header.extends.iter().collect(),
        NodeKind::TypeAlias(header) => vec![&header.target],
        NodeKind::Property(header) => header.ty.iter().collect(),
        NodeKind::Method(header) => header.return_ty.iter().collect(),
        NodeKind::Parameter(binding) | NodeKind::Let(binding) | NodeKind::ObjectProperty(binding) => {
            binding.ty.iter().collect()
        }
        NodeKind::ForGenerator { key, value } => key
            .iter()
            .chain(std::iter::once(value))
            .filter_map(|binding| binding.ty.as_ref())
            .collect(),
        NodeKind::New(Some(annotation)) => vec![annotation],
        _ => Vec::new(),
    }
}

