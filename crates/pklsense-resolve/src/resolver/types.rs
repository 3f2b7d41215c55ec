//! Type annotations to lattice types

use std::sync::Arc;

use pklsense_core::syntax::NodeKind;
use pklsense_core::{DeclRef, NodeId, SyntaxTree, Type, TypeParamRef, TypeRef};
use tracing::debug;

use super::Resolver;

impl Resolver {
    /// Resolve an annotation written at `context` in `tree`
    ///
    /// Names are looked up among enclosing type parameters, the module and
    /// its supermodules, imports (`alias.Type`, or an import used as a module
    /// type) and finally the base module. Unresolved names become `Unknown`.
    pub fn resolve_type_ref(&self, tree: &SyntaxTree, context: NodeId, annotation: &TypeRef) -> Type {
        let base = &self.base;
        match annotation {
            TypeRef::Unknown => Type::Unknown,
            TypeRef::Nothing => Type::Nothing,
            TypeRef::Module => self.module_type(tree),
            TypeRef::StringLiteral(text) => Type::string_literal(text),
            TypeRef::Nullable(inner) => {
                Type::nullable(self.resolve_type_ref(tree, context, inner), base)
            }
            TypeRef::Union(members) => Type::union(
                members
                    .iter()
                    .map(|m| self.resolve_type_ref(tree, context, m)),
                base,
            ),
            TypeRef::Function { params, ret } => Type::function(
                params
                    .iter()
                    .map(|p| self.resolve_type_ref(tree, context, p))
                    .collect(),
                self.resolve_type_ref(tree, context, ret),
            ),
            TypeRef::Named { name, args } => {
                if args.is_empty() {
                    if let Some(param) = type_parameter(tree, context, name) {
                        return param;
                    }
                }
                let args: Vec<Type> = args
                    .iter()
                    .map(|a| self.resolve_type_ref(tree, context, a))
                    .collect();
                self.named_type(tree, name, args).unwrap_or_else(|| {
                    debug!("unresolved type name '{}' in {}", name, tree.id());
                    Type::Unknown
                })
            }
        }
    }

    fn named_type(&self, tree: &SyntaxTree, name: &str, args: Vec<Type>) -> Option<Type> {
        if let Some((qualifier, member)) = name.split_once('.') {
            let module = self.import_target(tree, qualifier)?;
            return std::iter::once(module.clone())
                .chain(self.supermodules(&module))
                .find_map(|m| exported_type_in(&m, member, &args));
        }
        if let Some(ty) = type_in(tree, name, &args) {
            return Some(ty);
        }
        if let Some(ty) = self
            .supermodules(tree)
            .iter()
            .find_map(|m| exported_type_in(m, name, &args))
        {
            return Some(ty);
        }
        if let Some(module) = self.import_target(tree, name) {
            return Some(self.module_type(&module));
        }
        type_in(&self.base_tree, name, &args)
    }

    /// Module bound by the import named `binding` in `tree`
    pub(crate) fn import_target(&self, tree: &SyntaxTree, binding: &str) -> Option<Arc<SyntaxTree>> {
        let (_, clause) = tree
            .imports()
            .find(|(_, clause)| !clause.is_glob && clause.binding_name() == binding)?;
        self.resolve_module_uri(tree, &clause.uri).ok()
    }
}

/// A class or alias declared at the top level of `tree`, applied to `args`
/// padded (or cut) to its declared arity
fn type_in(tree: &SyntaxTree, name: &str, args: &[Type]) -> Option<Type> {
    let node = tree.find_type_decl(name)?;
    let decl = DeclRef::new(tree.decl(node), name);
    match tree.kind(node) {
        NodeKind::Class(header) => Some(Type::class(decl, pad(args, header.type_params.len()))),
        NodeKind::TypeAlias(header) => Some(Type::Alias {
            alias: decl,
            args: pad(args, header.type_params.len()),
        }),
        _ => None,
    }
}

/// Like [`type_in`], for lookups from outside `tree`
fn exported_type_in(tree: &SyntaxTree, name: &str, args: &[Type]) -> Option<Type> {
    let node = tree.find_type_decl(name)?;
    if tree.kind(node).is_local() {
        return None;
    }
    type_in(tree, name, args)
}

fn pad(args: &[Type], arity: usize) -> Vec<Type> {
    (0..arity)
        .map(|i| args.get(i).cloned().unwrap_or(Type::Unknown))
        .collect()
}

/// A type parameter of the innermost enclosing class, alias or method
fn type_parameter(tree: &SyntaxTree, context: NodeId, name: &str) -> Option<Type> {
    std::iter::once(context)
        .chain(tree.ancestors(context))
        .find_map(|node| {
            let params = match tree.kind(node) {
                NodeKind::Class(header) => &header.type_params,
                NodeKind::TypeAlias(header) => &header.type_params,
                NodeKind::Method(header) => &header.type_params,
                _ => return None,
            };
            let index = params.iter().position(|p| p.name == name)?;
            Some(Type::Parameter(TypeParamRef {
                owner: tree.decl(node),
                index,
                name: Arc::from(name),
            }))
        })
}
