//! Static types of expressions and declarations

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use pklsense_core::syntax::{Literal, NodeKind};
use pklsense_core::{DeclRef, MemberDef, MemberKind, ModuleId, NodeId, SyntaxTree, Type, TypeEnv};

use super::scope::{DeclKind, Declaration, Resolution};
use super::Resolver;

const MAX_DEPTH: usize = 64;

/// Per-query state: recursion depth and the declarations being typed
#[derive(Debug, Default)]
pub(crate) struct Cx {
    depth: usize,
    typing: HashSet<(ModuleId, NodeId)>,
}

/// A member offered for completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub name: Arc<str>,
    pub kind: MemberKind,
    pub owner: Arc<str>,
}

impl Resolver {
    /// Static type of the expression or declaration at `node`
    pub fn type_of(&self, tree: &SyntaxTree, node: NodeId) -> Type {
        self.adopt(tree);
        self.infer(tree, node, &mut Cx::default())
    }

    /// Type of the declaration a reference resolved to
    pub fn declaration_type(&self, decl: &Declaration) -> Type {
        self.typed_declaration(decl, &mut Cx::default())
    }

    /// Members visible on a value of type `ty`, most specific first
    pub fn complete_members(&self, ty: &Type) -> Vec<Completion> {
        let mut seen: IndexMap<(Arc<str>, MemberKind), Completion> = IndexMap::new();
        for class in self.receiver_classes(ty) {
            let cache = self.member_cache(&class);
            let cached = cache.properties.values().chain(cache.methods.values());
            for entry in cached {
                let member = &entry.member;
                seen.entry((member.name.clone(), member.kind))
                    .or_insert_with(|| Completion {
                        name: member.name.clone(),
                        kind: member.kind,
                        owner: member.owner.name.clone(),
                    });
            }
        }
        seen.into_values().collect()
    }

    /// Classes whose members a value of type `ty` exposes
    fn receiver_classes(&self, ty: &Type) -> Vec<DeclRef> {
        match ty.expand_aliases(self) {
            Type::Class { class, .. } => vec![class],
            Type::Nullable(inner) => {
                let mut classes = self.receiver_classes(&inner);
                classes.push(self.base.null.clone());
                classes
            }
            Type::Union(members) => members
                .iter()
                .flat_map(|m| self.receiver_classes(m))
                .collect(),
            Type::Function { params, ret } => {
                self.receiver_classes(&self.base.function_class_view(&params, &ret))
            }
            Type::StringLiteral(_) => vec![self.base.string.clone()],
            Type::Unknown | Type::Nothing | Type::Alias { .. } | Type::Parameter(_) => Vec::new(),
        }
    }

    /// Most specific member named `name` on a value of type `ty`
    pub(crate) fn member_of_type(&self, ty: &Type, name: &str, kind: MemberKind) -> Option<MemberDef> {
        self.receiver_classes(ty).iter().find_map(|class| {
            self.member_cache(class)
                .lookup(name, kind)
                .map(|cached| cached.member.clone())
        })
    }

    pub(crate) fn infer(&self, tree: &SyntaxTree, node: NodeId, cx: &mut Cx) -> Type {
        if cx.depth >= MAX_DEPTH || tree.get(node).is_none() {
            return Type::Unknown;
        }
        cx.depth += 1;
        let ty = self.infer_node(tree, node, cx);
        cx.depth -= 1;
        ty
    }

    fn infer_node(&self, tree: &SyntaxTree, node: NodeId, cx: &mut Cx) -> Type {
        let base = &self.base;
        match tree.kind(node) {
            NodeKind::Literal(literal) => match literal {
                Literal::String(text) => Type::string_literal(text),
                Literal::Int(_) => base.class(&base.int),
                Literal::Float(_) => base.class(&base.float),
                Literal::Boolean(_) => base.class(&base.boolean),
                Literal::Null => base.null_type(),
            },
            NodeKind::Ident(_) | NodeKind::Call {
                has_receiver: false, ..
            } => match self.resolve_in(tree, node, cx) {
                Resolution::Resolved(decl) => self.typed_declaration(&decl, cx),
                Resolution::Unresolved => Type::Unknown,
            },
            NodeKind::Access { null_safe, .. } => {
                let ty = self.qualified_type(tree, node, cx);
                if *null_safe {
                    Type::nullable(ty, base)
                } else {
                    ty
                }
            }
            NodeKind::Call { .. } => self.qualified_type(tree, node, cx),
            NodeKind::This => self.this_type(tree, node, cx),
            NodeKind::ModuleRef => self.module_type(tree),
            NodeKind::Let(_) => match tree.child(node, 1) {
                Some(body) => self.infer(tree, body, cx),
                None => Type::Unknown,
            },
            NodeKind::Lambda => {
                let mut params = Vec::new();
                let mut ret = Type::Unknown;
                for &child in tree.children(node) {
                    match tree.kind(child) {
                        NodeKind::Parameter(binding) => params.push(match &binding.ty {
                            Some(annotation) => self.resolve_type_ref(tree, child, annotation),
                            None => Type::Unknown,
                        }),
                        _ => ret = self.infer(tree, child, cx),
                    }
                }
                Type::function(params, ret)
            }
            NodeKind::New(Some(annotation)) => self.resolve_type_ref(tree, node, annotation),
            NodeKind::New(None) => self
                .expected_type(tree, node, cx)
                .unwrap_or_else(|| base.class(&base.dynamic)),
            NodeKind::Amend => match tree.child(node, 0) {
                Some(parent) => self.infer(tree, parent, cx),
                None => Type::Unknown,
            },
            NodeKind::If => {
                let branches: Vec<Type> = tree
                    .children(node)
                    .iter()
                    .skip(1)
                    .map(|&branch| self.infer(tree, branch, cx))
                    .collect();
                Type::union(branches, base)
            }
            NodeKind::ImportExpr(clause) => match self.resolve_module_uri(tree, &clause.uri) {
                Ok(target) => self.module_type(&target),
                Err(_) => Type::Unknown,
            },
            NodeKind::ObjectBody => self.object_type(tree, node, cx),
            NodeKind::Module(_) => self.module_type(tree),
            NodeKind::Property(header) => {
                let decl = Declaration::new(tree, node, DeclKind::Property, &header.name);
                self.typed_declaration(&decl, cx)
            }
            NodeKind::Method(header) => {
                let decl = Declaration::new(tree, node, DeclKind::Method, &header.name);
                self.typed_declaration(&decl, cx)
            }
            NodeKind::Parameter(binding) => {
                let decl = Declaration::new(tree, node, DeclKind::Parameter, &binding.name);
                self.typed_declaration(&decl, cx)
            }
            NodeKind::ObjectProperty(binding) => {
                let decl = Declaration::new(tree, node, DeclKind::ObjectProperty, &binding.name);
                self.typed_declaration(&decl, cx)
            }
            NodeKind::Import(clause) => match self.resolve_module_uri(tree, &clause.uri) {
                Ok(target) => self.module_type(&target),
                Err(_) => Type::Unknown,
            },
            NodeKind::ModuleClause(_)
            | NodeKind::Class(_)
            | NodeKind::TypeAlias(_)
            | NodeKind::ObjectElement
            | NodeKind::ObjectEntry
            | NodeKind::ForGenerator { .. }
            | NodeKind::WhenGenerator => Type::Unknown,
        }
    }

    /// Type of `receiver.name` or `receiver.name(...)`, with the receiver's
    /// type arguments substituted into the member's declared type
    fn qualified_type(&self, tree: &SyntaxTree, node: NodeId, cx: &mut Cx) -> Type {
        let Resolution::Resolved(decl) = self.resolve_in(tree, node, cx) else {
            return Type::Unknown;
        };
        let declared = self.typed_declaration(&decl, cx);
        let owner = self
            .tree(&decl.module)
            .and_then(|owner_tree| self.owner_of(&owner_tree, decl.node));
        let (Some(receiver), Some(owner)) = (tree.child(node, 0), owner) else {
            return declared.erase_parameters();
        };
        let receiver_type = self.infer(tree, receiver, cx);
        match self.owner_args(&receiver_type, &owner) {
            Some(args) => declared.substitute(&owner.id, &args, &self.base),
            None => declared,
        }
        .erase_parameters()
    }

    /// Type arguments of `owner` as seen from a receiver of type `receiver`
    fn owner_args(&self, receiver: &Type, owner: &DeclRef) -> Option<Vec<Type>> {
        match receiver.expand_aliases(self) {
            class @ Type::Class { .. } => class.instantiate_as_supertype(owner, self),
            Type::Nullable(inner) => self.owner_args(&inner, owner),
            Type::Union(members) => members.iter().find_map(|m| self.owner_args(m, owner)),
            Type::Function { params, ret } => self
                .base
                .function_class_view(&params, &ret)
                .instantiate_as_supertype(owner, self),
            _ => None,
        }
    }

    fn this_type(&self, tree: &SyntaxTree, node: NodeId, cx: &mut Cx) -> Type {
        for scope in tree.ancestors(node) {
            match tree.kind(scope) {
                NodeKind::ObjectBody => return self.object_type(tree, scope, cx),
                NodeKind::Class(_) => {
                    return self
                        .decl_ref(tree, scope)
                        .and_then(|class| self.class_def(&class))
                        .map(|def| def.self_type())
                        .unwrap_or(Type::Unknown)
                }
                _ => {}
            }
        }
        self.module_type(tree)
    }

    /// Type of the object an object body belongs to
    pub(crate) fn object_type(&self, tree: &SyntaxTree, body: NodeId, cx: &mut Cx) -> Type {
        let base = &self.base;
        let Some(parent) = tree.parent(body) else {
            return Type::Unknown;
        };
        match tree.kind(parent) {
            NodeKind::New(_) | NodeKind::Amend => self.infer(tree, parent, cx),
            NodeKind::Property(_) => self
                .declared_property_type(tree, parent)
                .map(non_null)
                .unwrap_or_else(|| base.class(&base.dynamic)),
            NodeKind::ObjectProperty(binding) => {
                let declared = match &binding.ty {
                    Some(annotation) => Some(self.resolve_type_ref(tree, parent, annotation)),
                    None => self.object_member_type(tree, parent, &binding.name, cx),
                };
                declared
                    .map(non_null)
                    .unwrap_or_else(|| base.class(&base.dynamic))
            }
            NodeKind::ForGenerator { .. } | NodeKind::WhenGenerator => match tree.parent(parent) {
                Some(enclosing) => self.infer(tree, enclosing, cx),
                None => Type::Unknown,
            },
            _ => Type::Unknown,
        }
    }

    /// Type a `new` without an explicit type takes from its position
    fn expected_type(&self, tree: &SyntaxTree, new: NodeId, cx: &mut Cx) -> Option<Type> {
        let parent = tree.parent(new)?;
        let expected = match tree.kind(parent) {
            NodeKind::Property(_) => self.declared_property_type(tree, parent),
            NodeKind::ObjectProperty(binding) => match &binding.ty {
                Some(annotation) => Some(self.resolve_type_ref(tree, parent, annotation)),
                None => self.object_member_type(tree, parent, &binding.name, cx),
            },
            NodeKind::Let(binding) => binding
                .ty
                .as_ref()
                .map(|annotation| self.resolve_type_ref(tree, parent, annotation)),
            NodeKind::ObjectElement => {
                let enclosing = self.infer(tree, tree.parent(parent)?, cx);
                self.element_types(&enclosing).map(|(_, value)| value)
            }
            NodeKind::ObjectEntry if tree.child(parent, 1) == Some(new) => {
                let enclosing = self.infer(tree, tree.parent(parent)?, cx);
                self.element_types(&enclosing).map(|(_, value)| value)
            }
            _ => None,
        }?;
        match non_null(expected) {
            Type::Unknown => None,
            ty => Some(ty),
        }
    }

    /// Declared type of a member of the object enclosing `member`
    fn object_member_type(&self, tree: &SyntaxTree, member: NodeId, name: &str, cx: &mut Cx) -> Option<Type> {
        let body = tree.parent(member)?;
        let receiver = self.object_type(tree, body, cx);
        let found = self.member_of_type(&receiver, name, MemberKind::Property)?;
        let declared = self.typed_declaration(&Declaration::member(&found), cx);
        let ty = match self.owner_args(&receiver, &found.owner) {
            Some(args) => declared.substitute(&found.owner.id, &args, &self.base),
            None => declared,
        };
        Some(ty.erase_parameters())
    }

    /// Key and value types when iterating over or adding members to `ty`
    fn element_types(&self, ty: &Type) -> Option<(Type, Type)> {
        let base = &self.base;
        let int = base.class(&base.int);
        let first = |args: Vec<Type>| args.into_iter().next().unwrap_or(Type::Unknown);
        if let Some(args) = ty.instantiate_as_supertype(&base.listing, self) {
            return Some((int, first(args)));
        }
        if let Some(args) = ty.instantiate_as_supertype(&base.collection, self) {
            return Some((int, first(args)));
        }
        for keyed in [&base.mapping, &base.map] {
            if let Some(args) = ty.instantiate_as_supertype(keyed, self) {
                let mut args = args.into_iter();
                let key = args.next().unwrap_or(Type::Unknown);
                let value = args.next().unwrap_or(Type::Unknown);
                return Some((key, value));
            }
        }
        if let Some(args) = ty.instantiate_as_supertype(&base.pair, self) {
            let mut args = args.into_iter();
            return Some((
                args.next().unwrap_or(Type::Unknown),
                args.next().unwrap_or(Type::Unknown),
            ));
        }
        if ty.instantiate_as_supertype(&base.int_seq, self).is_some() {
            return Some((int.clone(), int));
        }
        None
    }

    /// A property's annotation, or the nearest annotation among the
    /// declarations it overrides
    pub(crate) fn declared_property_type(&self, tree: &SyntaxTree, node: NodeId) -> Option<Type> {
        let NodeKind::Property(header) = tree.kind(node) else {
            return None;
        };
        if let Some(annotation) = &header.ty {
            return Some(self.resolve_type_ref(tree, node, annotation));
        }
        let owner = self.owner_of(tree, node)?;
        let chain = self.ancestor_chain(&owner);
        chain.classes.iter().skip(1).find_map(|class| {
            let member = class
                .members
                .iter()
                .find(|m| m.kind == MemberKind::Property && *m.name == *header.name)?;
            let member_tree = self.tree(&member.decl.module)?;
            match member_tree.kind(member.decl.node) {
                NodeKind::Property(inherited) => inherited
                    .ty
                    .as_ref()
                    .map(|annotation| self.resolve_type_ref(&member_tree, member.decl.node, annotation)),
                _ => None,
            }
        })
    }

    pub(crate) fn typed_declaration(&self, decl: &Declaration, cx: &mut Cx) -> Type {
        let key = (decl.module.clone(), decl.node);
        if cx.depth >= MAX_DEPTH || !cx.typing.insert(key.clone()) {
            return Type::Unknown;
        }
        cx.depth += 1;
        let ty = self.declaration_type_uncached(decl, cx);
        cx.depth -= 1;
        cx.typing.remove(&key);
        ty
    }

    fn declaration_type_uncached(&self, decl: &Declaration, cx: &mut Cx) -> Type {
        let base = &self.base;
        let Some(tree) = self.tree(&decl.module) else {
            return Type::Unknown;
        };
        let node = decl.node;
        let Some(kind) = tree.get(node).map(|n| &n.kind) else {
            return Type::Unknown;
        };
        let value = |cx: &mut Cx| -> Option<Type> {
            let child = tree.children(node).iter().copied().find(|&c| tree.kind(c).is_expression())?;
            Some(self.infer(&tree, child, cx))
        };
        let has_body = tree
            .children(node)
            .iter()
            .any(|&c| matches!(tree.kind(c), NodeKind::ObjectBody));

        match kind {
            NodeKind::Property(_) => self
                .declared_property_type(&tree, node)
                .or_else(|| value(cx))
                .unwrap_or_else(|| {
                    if has_body {
                        base.class(&base.dynamic)
                    } else {
                        Type::Unknown
                    }
                }),
            NodeKind::ObjectProperty(binding) => match &binding.ty {
                Some(annotation) => self.resolve_type_ref(&tree, node, annotation),
                None => value(cx)
                    .or_else(|| self.object_member_type(&tree, node, &binding.name, cx))
                    .unwrap_or_else(|| base.class(&base.dynamic)),
            },
            NodeKind::Method(header) => match &header.return_ty {
                Some(annotation) => self.resolve_type_ref(&tree, node, annotation),
                None => value(cx).unwrap_or(Type::Unknown),
            },
            NodeKind::Parameter(binding) => match &binding.ty {
                Some(annotation) => self.resolve_type_ref(&tree, node, annotation),
                None => Type::Unknown,
            },
            NodeKind::Let(binding) => match &binding.ty {
                Some(annotation) => self.resolve_type_ref(&tree, node, annotation),
                None => match tree.child(node, 0) {
                    Some(bound) => self.infer(&tree, bound, cx),
                    None => Type::Unknown,
                },
            },
            NodeKind::ForGenerator { key, .. } => {
                let Some(iterable) = tree.child(node, 0) else {
                    return Type::Unknown;
                };
                let iterable = self.infer(&tree, iterable, cx);
                let is_key = key.as_ref().is_some_and(|k| *k.name == *decl.name);
                match self.element_types(&iterable) {
                    Some((key, _)) if is_key => key,
                    Some((_, value)) => value,
                    None => Type::Unknown,
                }
            }
            NodeKind::Import(clause) => match self.resolve_module_uri(&tree, &clause.uri) {
                Ok(target) => self.module_type(&target),
                Err(_) => Type::Unknown,
            },
            NodeKind::Module(_) => self.module_type(&tree),
            _ => Type::Unknown,
        }
    }
}

fn non_null(ty: Type) -> Type {
    match ty {
        Type::Nullable(inner) => *inner,
        other => other,
    }
}
