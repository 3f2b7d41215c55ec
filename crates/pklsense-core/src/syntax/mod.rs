//! Syntax tree model consumed by the analysis engine
//!
//! The parser is an external collaborator: it hands over an already-parsed
//! (possibly error-recovered) module as a [`ModuleSource`], which is lowered
//! here into an immutable arena of typed nodes with parent/child navigation and
//! source spans. Analysis never reparses; a changed module is a new tree with a
//! bumped version.
//!
//! ## Child layout
//!
//! Node payloads live in [`NodeKind`]; sub-nodes are stored as ordered
//! children:
//!
//! | kind | children |
//! |------|----------|
//! | `Module` | `ModuleClause`?, `Import`*, declarations* |
//! | `Class` | `Property`*, `Method`* |
//! | `Property`, `ObjectProperty` | value? (expression or `ObjectBody`) |
//! | `Method` | `Parameter`*, body? |
//! | `Access` | receiver |
//! | `Call` | receiver (when `has_receiver`), arguments* |
//! | `Let` | value, body |
//! | `Lambda` | `Parameter`*, body |
//! | `New` | `ObjectBody` |
//! | `Amend` | parent, `ObjectBody` |
//! | `If` | condition, then, else |
//! | `ObjectElement` | value |
//! | `ObjectEntry` | key, value |
//! | `ForGenerator` | iterable, `ObjectBody` |
//! | `WhenGenerator` | condition, `ObjectBody`, `ObjectBody`? |

mod builder;
mod source;
mod type_ref;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use builder::ModuleBuilder;
pub use source::{
    AliasSource, ClassSource, ExprSource, ImportSource, MemberSource, MethodSource, Modifier,
    ModuleSource, ParamSource, PropertySource, TypeParamSource,
};
pub use type_ref::TypeRef;

/// Identity of a module: its canonical URI
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    pub fn new(uri: impl AsRef<str>) -> Self {
        Self(Arc::from(uri.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({})", self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new(index: u32) -> Self {
        NodeId(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A declaration site: a node inside a specific module
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId {
    pub module: ModuleId,
    pub node: NodeId,
}

impl DeclId {
    pub fn new(module: ModuleId, node: NodeId) -> Self {
        Self { module, node }
    }
}

/// A byte-span into the module's source text.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn cover(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({}..{})", self.start, self.end)
    }
}

/// Declared variance of a type parameter (`in`, `out`, or neither)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variance {
    #[default]
    Invariant,
    #[serde(rename = "out")]
    Covariant,
    #[serde(rename = "in")]
    Contravariant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub is_abstract: bool,
    pub is_open: bool,
    pub is_local: bool,
    pub is_external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParamDecl {
    pub name: String,
    pub variance: Variance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    Amends,
    Extends,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHeader {
    pub name: Option<String>,
    pub is_open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleClause {
    pub kind: ClauseKind,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportClause {
    pub uri: String,
    pub alias: Option<String>,
    pub is_glob: bool,
}

impl ImportClause {
    /// The name this import binds in module scope: the explicit alias, or the
    /// last path segment of the URI without its `.pkl` extension.
    pub fn binding_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        // A package fragment names the module inside the package
        let path = match self.uri.split_once('#') {
            Some((_, fragment)) => fragment,
            None => self.uri.split('?').next().unwrap_or(&self.uri),
        };
        let last = path
            .rsplit(['/', ':'])
            .find(|segment| !segment.is_empty())
            .unwrap_or(path);
        let last = last.split('@').next().unwrap_or(last);
        last.strip_suffix(".pkl").unwrap_or(last).to_string()
    }
}

impl fmt::Display for ImportClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.is_glob { "import*" } else { "import" };
        write!(f, "{} \"{}\"", keyword, self.uri)?;
        if let Some(alias) = &self.alias {
            write!(f, " as {}", alias)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub name: String,
    pub type_params: Vec<TypeParamDecl>,
    pub extends: Option<TypeRef>,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasHeader {
    pub name: String,
    pub type_params: Vec<TypeParamDecl>,
    pub target: TypeRef,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyHeader {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHeader {
    pub name: String,
    pub type_params: Vec<TypeParamDecl>,
    pub return_ty: Option<TypeRef>,
    pub modifiers: Modifiers,
    pub has_body: bool,
}

/// A named binding with an optional annotation (parameters, `let`, `for`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: String,
    pub ty: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Module(ModuleHeader),
    ModuleClause(ModuleClause),
    Import(ImportClause),
    Class(ClassHeader),
    TypeAlias(AliasHeader),
    Property(PropertyHeader),
    Method(MethodHeader),
    Parameter(Binding),

    Literal(Literal),
    Ident(String),
    Access { name: String, null_safe: bool },
    Call { name: String, has_receiver: bool },
    This,
    ModuleRef,
    Let(Binding),
    Lambda,
    New(Option<TypeRef>),
    Amend,
    If,
    ImportExpr(ImportClause),

    ObjectBody,
    ObjectProperty(Binding),
    ObjectElement,
    ObjectEntry,
    ForGenerator { key: Option<Binding>, value: Binding },
    WhenGenerator,
}

impl NodeKind {
    /// Name of the declaration introduced by this node, if any
    pub fn declared_name(&self) -> Option<&str> {
        match self {
            NodeKind::Module(header) => header.name.as_deref(),
            NodeKind::Class(header) => Some(&header.name),
            NodeKind::TypeAlias(header) => Some(&header.name),
            NodeKind::Property(header) => Some(&header.name),
            NodeKind::Method(header) => Some(&header.name),
            NodeKind::Parameter(binding)
            | NodeKind::Let(binding)
            | NodeKind::ObjectProperty(binding) => Some(&binding.name),
            _ => None,
        }
    }

    pub fn modifiers(&self) -> Option<&Modifiers> {
        match self {
            NodeKind::Class(header) => Some(&header.modifiers),
            NodeKind::TypeAlias(header) => Some(&header.modifiers),
            NodeKind::Property(header) => Some(&header.modifiers),
            NodeKind::Method(header) => Some(&header.modifiers),
            _ => None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.modifiers().is_some_and(|m| m.is_local)
    }

    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            NodeKind::Literal(_)
                | NodeKind::Ident(_)
                | NodeKind::Access { .. }
                | NodeKind::Call { .. }
                | NodeKind::This
                | NodeKind::ModuleRef
                | NodeKind::Let(_)
                | NodeKind::Lambda
                | NodeKind::New(_)
                | NodeKind::Amend
                | NodeKind::If
                | NodeKind::ImportExpr(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub span: Span,
}

/// Immutable syntax tree of one module version
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    id: ModuleId,
    version: u64,
    nodes: Vec<Node>,
}

impl SyntaxTree {
    pub(crate) fn from_nodes(id: ModuleId, version: u64, nodes: Vec<Node>) -> Self {
        debug_assert!(matches!(
            nodes.first().map(|n| &n.kind),
            Some(NodeKind::Module(_))
        ));
        Self { id, version, nodes }
    }

    /// Lower a parsed module description into a tree
    pub fn lower(source: &ModuleSource, version: u64) -> Self {
        source::lower(source, ModuleId::new(&source.uri), version)
    }

    /// Lower a module description under an explicit (canonical) identity
    pub fn lower_as(source: &ModuleSource, id: ModuleId, version: u64) -> Self {
        source::lower(source, id, version)
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn decl(&self, node: NodeId) -> DeclId {
        DeclId::new(self.id.clone(), node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.node(id).children.get(index).copied()
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    /// Strict ancestors of `id`, innermost first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |n| self.parent(*n))
    }

    /// All node ids in pre-order (arena order is pre-order)
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Pre-order descendants of `id`, including `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub fn header(&self) -> &ModuleHeader {
        match self.kind(NodeId::ROOT) {
            NodeKind::Module(header) => header,
            _ => unreachable!("syntax tree root is always a module node"),
        }
    }

    pub fn module_clause(&self) -> Option<(NodeId, &ModuleClause)> {
        self.children(NodeId::ROOT)
            .iter()
            .find_map(|&id| match self.kind(id) {
                NodeKind::ModuleClause(clause) => Some((id, clause)),
                _ => None,
            })
    }

    pub fn imports(&self) -> impl Iterator<Item = (NodeId, &ImportClause)> + '_ {
        self.children(NodeId::ROOT)
            .iter()
            .filter_map(move |&id| match self.kind(id) {
                NodeKind::Import(clause) => Some((id, clause)),
                _ => None,
            })
    }

    /// Top-level class, type alias, property and method nodes
    pub fn declarations(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children(NodeId::ROOT).iter().copied().filter(move |&id| {
            matches!(
                self.kind(id),
                NodeKind::Class(_)
                    | NodeKind::TypeAlias(_)
                    | NodeKind::Property(_)
                    | NodeKind::Method(_)
            )
        })
    }

    /// Top-level class or type alias with the given name
    pub fn find_type_decl(&self, name: &str) -> Option<NodeId> {
        self.declarations().find(|&id| match self.kind(id) {
            NodeKind::Class(header) => header.name == name,
            NodeKind::TypeAlias(header) => header.name == name,
            _ => false,
        })
    }

    /// Top-level property or method, or a member of a top-level class,
    /// addressed as `name` or `Class.name`
    pub fn find_member(&self, path: &str) -> Option<NodeId> {
        let (owner, name) = match path.split_once('.') {
            Some((class, name)) => (self.find_type_decl(class)?, name),
            None => (NodeId::ROOT, path),
        };
        self.children(owner)
            .iter()
            .copied()
            .find(|&id| match self.kind(id) {
                NodeKind::Property(header) => header.name == name,
                NodeKind::Method(header) => header.name == name,
                _ => false,
            })
    }

    /// The innermost node whose span contains `offset`
    pub fn node_at_offset(&self, offset: usize) -> Option<NodeId> {
        let mut current = NodeId::ROOT;
        if !self.span(current).contains(offset) && !self.span(current).is_empty() {
            return None;
        }
        'descend: loop {
            for &child in self.children(current) {
                if self.span(child).contains(offset) {
                    current = child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_binding_names() {
        let cases = [
            ("foo.pkl", None, "foo"),
            ("../lib/bar.pkl", None, "bar"),
            ("a:pkg", None, "pkg"),
            ("package://example.com/birds@1.0.0#/Bird.pkl", None, "Bird"),
            ("package://example.com/birds@1.0.0#/lib/util.pkl", None, "util"),
            ("package://example.com/birds@1.0.0", None, "birds"),
            ("https://example.com/m.pkl?v=1", None, "m"),
            ("pkl:json", None, "json"),
            ("@deps/util.pkl", Some("u"), "u"),
        ];
        for (uri, alias, expected) in cases {
            let clause = ImportClause {
                uri: uri.to_string(),
                alias: alias.map(str::to_string),
                is_glob: false,
            };
            assert_eq!(clause.binding_name(), expected, "uri {}", uri);
        }
    }

    #[test]
    fn test_import_display() {
        let clause = ImportClause {
            uri: "a.pkl".into(),
            alias: Some("b".into()),
            is_glob: true,
        };
        assert_eq!(clause.to_string(), "import* \"a.pkl\" as b");
    }
}
