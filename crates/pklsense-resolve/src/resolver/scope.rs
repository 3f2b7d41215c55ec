//! Name resolution: lexical scopes, implicit receivers, imports and the base
//! module

use std::sync::Arc;

use pklsense_core::syntax::NodeKind;
use pklsense_core::{MemberDef, MemberKind, ModuleId, NodeId, SyntaxTree};
use tracing::trace;

use super::infer::Cx;
use super::Resolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Property,
    Method,
    Class,
    TypeAlias,
    Import,
    Module,
    Parameter,
    LetBinding,
    ForBinding,
    ObjectProperty,
}

/// A declaration a reference resolved to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Declaration {
    pub module: ModuleId,
    pub node: NodeId,
    pub kind: DeclKind,
    pub name: Arc<str>,
}

impl Declaration {
    pub fn new(tree: &SyntaxTree, node: NodeId, kind: DeclKind, name: &str) -> Self {
        Self {
            module: tree.id().clone(),
            node,
            kind,
            name: Arc::from(name),
        }
    }

    pub fn member(member: &MemberDef) -> Self {
        Self {
            module: member.decl.module.clone(),
            node: member.decl.node,
            kind: match member.kind {
                MemberKind::Property => DeclKind::Property,
                MemberKind::Method => DeclKind::Method,
            },
            name: member.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Declaration),
    Unresolved,
}

impl Resolution {
    pub fn declaration(&self) -> Option<&Declaration> {
        match self {
            Resolution::Resolved(decl) => Some(decl),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

impl From<Option<Declaration>> for Resolution {
    fn from(found: Option<Declaration>) -> Self {
        found.map_or(Resolution::Unresolved, Resolution::Resolved)
    }
}

impl Resolver {
    /// Resolve the reference at `node`
    ///
    /// Identifiers, member accesses, calls, imports, import expressions and
    /// module clauses are references; anything else is `Unresolved`.
    pub fn resolve(&self, tree: &SyntaxTree, node: NodeId) -> Resolution {
        self.adopt(tree);
        self.resolve_in(tree, node, &mut Cx::default())
    }

    pub(crate) fn resolve_in(&self, tree: &SyntaxTree, node: NodeId, cx: &mut Cx) -> Resolution {
        let Some(kind) = tree.get(node).map(|n| &n.kind) else {
            return Resolution::Unresolved;
        };
        let found = match kind {
            NodeKind::Ident(name) => self.resolve_unqualified(tree, node, name, MemberKind::Property, cx),
            NodeKind::Call {
                name,
                has_receiver: false,
            } => self.resolve_unqualified(tree, node, name, MemberKind::Method, cx),
            NodeKind::Access { name, .. } => tree
                .child(node, 0)
                .and_then(|receiver| self.resolve_qualified(tree, receiver, name, MemberKind::Property, cx)),
            NodeKind::Call {
                name,
                has_receiver: true,
            } => tree
                .child(node, 0)
                .and_then(|receiver| self.resolve_qualified(tree, receiver, name, MemberKind::Method, cx)),
            NodeKind::Import(clause) | NodeKind::ImportExpr(clause) => {
                self.module_declaration(tree, &clause.uri)
            }
            NodeKind::ModuleClause(clause) => self.module_declaration(tree, &clause.uri),
            _ => None,
        };
        if found.is_none() {
            trace!("unresolved reference at {:?} in {}", node, tree.id());
        }
        found.into()
    }

    fn module_declaration(&self, tree: &SyntaxTree, uri: &str) -> Option<Declaration> {
        let target = self.resolve_module_uri(tree, uri).ok()?;
        let name = self.module_decl(&target).name;
        Some(Declaration::new(&target, NodeId::ROOT, DeclKind::Module, &name))
    }

    fn resolve_unqualified(
        &self,
        tree: &SyntaxTree,
        node: NodeId,
        name: &str,
        kind: MemberKind,
        cx: &mut Cx,
    ) -> Option<Declaration> {
        let mut child = node;
        for scope in tree.ancestors(node) {
            if let Some(found) = self.lookup_in_scope(tree, scope, child, name, kind, cx) {
                return Some(found);
            }
            child = scope;
        }
        self.lookup_in_module(tree, name, kind)
            .or_else(|| self.lookup_import(tree, name, kind))
            .or_else(|| self.lookup_in_module(&self.base_tree, name, kind))
    }

    /// Bindings introduced by `scope` that are visible from its child `child`
    fn lookup_in_scope(
        &self,
        tree: &SyntaxTree,
        scope: NodeId,
        child: NodeId,
        name: &str,
        kind: MemberKind,
        cx: &mut Cx,
    ) -> Option<Declaration> {
        let property = kind == MemberKind::Property;
        match tree.kind(scope) {
            NodeKind::Let(binding)
                if property && binding.name == name && tree.child(scope, 1) == Some(child) =>
            {
                Some(Declaration::new(tree, scope, DeclKind::LetBinding, name))
            }
            NodeKind::Lambda | NodeKind::Method(_) if property => {
                if matches!(tree.kind(child), NodeKind::Parameter(_)) {
                    return None;
                }
                tree.children(scope)
                    .iter()
                    .copied()
                    .find(|&p| matches!(tree.kind(p), NodeKind::Parameter(b) if b.name == name))
                    .map(|p| Declaration::new(tree, p, DeclKind::Parameter, name))
            }
            NodeKind::ForGenerator { key, value }
                if property && tree.child(scope, 1) == Some(child) =>
            {
                let bound =
                    value.name == name || key.as_ref().is_some_and(|key| key.name == name);
                bound.then(|| Declaration::new(tree, scope, DeclKind::ForBinding, name))
            }
            NodeKind::ObjectBody => self.lookup_in_object(tree, scope, name, kind, cx),
            NodeKind::Class(_) => {
                let class = self.decl_ref(tree, scope)?;
                self.member_cache(&class)
                    .lookup(name, kind)
                    .map(|cached| Declaration::member(&cached.member))
            }
            _ => None,
        }
    }

    /// Properties declared in an object body, then members of its type
    fn lookup_in_object(
        &self,
        tree: &SyntaxTree,
        body: NodeId,
        name: &str,
        kind: MemberKind,
        cx: &mut Cx,
    ) -> Option<Declaration> {
        if kind == MemberKind::Property {
            let declared = tree.children(body).iter().copied().find(
                |&m| matches!(tree.kind(m), NodeKind::ObjectProperty(b) if b.name == name),
            );
            if let Some(member) = declared {
                return Some(Declaration::new(tree, member, DeclKind::ObjectProperty, name));
            }
        }
        let receiver = self.object_type(tree, body, cx);
        self.member_of_type(&receiver, name, kind)
            .map(|member| Declaration::member(&member))
    }

    /// Members of the module (and its supermodules), then its types
    fn lookup_in_module(&self, tree: &SyntaxTree, name: &str, kind: MemberKind) -> Option<Declaration> {
        let module = self.module_decl(tree);
        if let Some(cached) = self.member_cache(&module).lookup(name, kind) {
            return Some(Declaration::member(&cached.member));
        }
        if kind != MemberKind::Property {
            return None;
        }
        type_declaration(tree, name).or_else(|| {
            self.supermodules(tree)
                .iter()
                .find_map(|parent| exported_type_declaration(parent, name))
        })
    }

    fn lookup_import(&self, tree: &SyntaxTree, name: &str, kind: MemberKind) -> Option<Declaration> {
        if kind != MemberKind::Property {
            return None;
        }
        tree.imports()
            .find(|(_, clause)| clause.binding_name() == name)
            .map(|(node, _)| Declaration::new(tree, node, DeclKind::Import, name))
    }

    fn resolve_qualified(
        &self,
        tree: &SyntaxTree,
        receiver: NodeId,
        name: &str,
        kind: MemberKind,
        cx: &mut Cx,
    ) -> Option<Declaration> {
        match tree.kind(receiver) {
            NodeKind::ModuleRef => {
                let module = self.module_decl(tree);
                return self
                    .member_cache(&module)
                    .lookup(name, kind)
                    .map(|cached| Declaration::member(&cached.member));
            }
            NodeKind::ImportExpr(clause) => {
                let target = self.resolve_module_uri(tree, &clause.uri).ok()?;
                return self.top_level(&target, name, kind);
            }
            _ => {}
        }

        if let Resolution::Resolved(decl) = self.resolve_in(tree, receiver, cx) {
            if decl.kind == DeclKind::Import {
                let owner = self.tree(&decl.module)?;
                let NodeKind::Import(clause) = owner.kind(decl.node) else {
                    return None;
                };
                let target = self.resolve_module_uri(&owner, &clause.uri).ok()?;
                return self.top_level(&target, name, kind);
            }
        }

        let receiver_type = self.infer(tree, receiver, cx);
        self.member_of_type(&receiver_type, name, kind)
            .filter(|member| !member.is_local || member.decl.module == *tree.id())
            .map(|member| Declaration::member(&member))
    }

    /// A top-level declaration of `module` as seen from another module,
    /// falling back to members it inherits from its supermodules. `local`
    /// declarations are not visible.
    pub(crate) fn top_level(&self, module: &SyntaxTree, name: &str, kind: MemberKind) -> Option<Declaration> {
        let own = module.children(NodeId::ROOT).iter().copied().find(|&id| {
            match (module.kind(id), kind) {
                (node, _) if node.is_local() => false,
                (NodeKind::Property(header), MemberKind::Property) => header.name == name,
                (NodeKind::Method(header), MemberKind::Method) => header.name == name,
                _ => false,
            }
        });
        if let Some(node) = own {
            let decl_kind = match kind {
                MemberKind::Property => DeclKind::Property,
                MemberKind::Method => DeclKind::Method,
            };
            return Some(Declaration::new(module, node, decl_kind, name));
        }
        if kind == MemberKind::Property {
            if let Some(found) = exported_type_declaration(module, name) {
                return Some(found);
            }
        }
        let decl = self.module_decl(module);
        self.member_cache(&decl)
            .lookup(name, kind)
            .filter(|cached| !cached.member.is_local)
            .map(|cached| Declaration::member(&cached.member))
    }
}

fn type_declaration(tree: &SyntaxTree, name: &str) -> Option<Declaration> {
    let node = tree.find_type_decl(name)?;
    let kind = match tree.kind(node) {
        NodeKind::Class(_) => DeclKind::Class,
        _ => DeclKind::TypeAlias,
    };
    Some(Declaration::new(tree, node, kind, name))
}

fn exported_type_declaration(tree: &SyntaxTree, name: &str) -> Option<Declaration> {
    type_declaration(tree, name).filter(|found| !tree.kind(found.node).is_local())
}
