//! Serialized module descriptions and their lowering into [`SyntaxTree`]s
//!
//! A `ModuleSource` is what the external parser hands over. Spans are optional
//! on declarations; nodes without an explicit span receive synthetic, properly
//! nested positions in pre-order so offset queries still work.

use serde::{Deserialize, Serialize};

use super::{
    AliasHeader, Binding, ClassHeader, ClauseKind, ImportClause, Literal, MethodHeader,
    ModuleClause, ModuleHeader, ModuleId, Modifiers, Node, NodeId, NodeKind, PropertyHeader, Span,
    SyntaxTree, TypeParamDecl, TypeRef, Variance,
};
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSource {
    pub uri: String,
    pub name: Option<String>,
    pub open: bool,
    pub amends: Option<String>,
    pub extends: Option<String>,
    pub imports: Vec<ImportSource>,
    pub classes: Vec<ClassSource>,
    pub typealiases: Vec<AliasSource>,
    pub properties: Vec<PropertySource>,
    pub methods: Vec<MethodSource>,
}

impl ModuleSource {
    pub fn from_json(input: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_yaml(input: &str) -> Result<Self, CoreError> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject descriptions that cannot be lowered meaningfully
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.uri.trim().is_empty() {
            return Err(CoreError::InvalidSource("module uri is empty".into()));
        }
        if self.amends.is_some() && self.extends.is_some() {
            return Err(CoreError::InvalidSource(format!(
                "module '{}' both amends and extends",
                self.uri
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Abstract,
    Open,
    Local,
    External,
    Hidden,
    Fixed,
    Const,
}

fn modifiers(list: &[Modifier]) -> Modifiers {
    let mut out = Modifiers::default();
    for modifier in list {
        match modifier {
            Modifier::Abstract => out.is_abstract = true,
            Modifier::Open => out.is_open = true,
            Modifier::Local => out.is_local = true,
            Modifier::External => out.is_external = true,
            Modifier::Hidden | Modifier::Fixed | Modifier::Const => {}
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSource {
    pub uri: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub glob: bool,
    #[serde(default)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParamSource {
    pub name: String,
    #[serde(default)]
    pub variance: Variance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSource {
    pub name: String,
    #[serde(default)]
    pub type_params: Vec<TypeParamSource>,
    #[serde(default)]
    pub extends: Option<TypeRef>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub properties: Vec<PropertySource>,
    #[serde(default)]
    pub methods: Vec<MethodSource>,
    #[serde(default)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasSource {
    pub name: String,
    #[serde(default)]
    pub type_params: Vec<TypeParamSource>,
    pub target: TypeRef,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub span: Option<Span>,
}

/// A property declaration: `name: Type = value` or `name { ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySource {
    pub name: String,
    #[serde(default, rename = "type")]
    pub ty: Option<TypeRef>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub value: Option<ExprSource>,
    #[serde(default)]
    pub body: Option<Vec<MemberSource>>,
    #[serde(default)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSource {
    pub name: String,
    #[serde(default, rename = "type")]
    pub ty: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSource {
    pub name: String,
    #[serde(default)]
    pub type_params: Vec<TypeParamSource>,
    #[serde(default)]
    pub params: Vec<ParamSource>,
    #[serde(default, rename = "returns")]
    pub return_ty: Option<TypeRef>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub body: Option<ExprSource>,
    #[serde(default)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprSource {
    String {
        value: String,
    },
    Int {
        value: i64,
    },
    Float {
        value: f64,
    },
    Boolean {
        value: bool,
    },
    Null,
    Ident {
        name: String,
    },
    Access {
        receiver: Box<ExprSource>,
        name: String,
        #[serde(default)]
        null_safe: bool,
    },
    Call {
        #[serde(default)]
        receiver: Option<Box<ExprSource>>,
        name: String,
        #[serde(default)]
        args: Vec<ExprSource>,
    },
    This,
    Module,
    Let {
        name: String,
        #[serde(default, rename = "type")]
        ty: Option<TypeRef>,
        value: Box<ExprSource>,
        body: Box<ExprSource>,
    },
    Lambda {
        #[serde(default)]
        params: Vec<ParamSource>,
        body: Box<ExprSource>,
    },
    New {
        #[serde(default, rename = "type")]
        ty: Option<TypeRef>,
        #[serde(default)]
        body: Vec<MemberSource>,
    },
    Amend {
        parent: Box<ExprSource>,
        #[serde(default)]
        body: Vec<MemberSource>,
    },
    If {
        condition: Box<ExprSource>,
        then: Box<ExprSource>,
        otherwise: Box<ExprSource>,
    },
    Import {
        uri: String,
        #[serde(default)]
        glob: bool,
    },
}

/// A member of an object body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberSource {
    Property {
        name: String,
        #[serde(default, rename = "type")]
        ty: Option<TypeRef>,
        #[serde(default)]
        value: Option<ExprSource>,
        #[serde(default)]
        body: Option<Vec<MemberSource>>,
    },
    Element {
        value: ExprSource,
    },
    Entry {
        key: ExprSource,
        value: ExprSource,
    },
    For {
        #[serde(default)]
        key: Option<String>,
        value: String,
        iterable: ExprSource,
        #[serde(default)]
        body: Vec<MemberSource>,
    },
    When {
        condition: ExprSource,
        #[serde(default)]
        body: Vec<MemberSource>,
        #[serde(default)]
        otherwise: Option<Vec<MemberSource>>,
    },
}

fn type_params(params: &[TypeParamSource]) -> Vec<TypeParamDecl> {
    params
        .iter()
        .map(|p| TypeParamDecl {
            name: p.name.clone(),
            variance: p.variance,
        })
        .collect()
}

pub(super) fn lower(source: &ModuleSource, id: ModuleId, version: u64) -> SyntaxTree {
    let mut lowerer = Lowerer::default();
    let root = lowerer.open(
        NodeKind::Module(ModuleHeader {
            name: source.name.clone(),
            is_open: source.open,
        }),
        None,
    );

    let clause = match (&source.amends, &source.extends) {
        (Some(uri), _) => Some((ClauseKind::Amends, uri)),
        (None, Some(uri)) => Some((ClauseKind::Extends, uri)),
        (None, None) => None,
    };
    if let Some((kind, uri)) = clause {
        let node = lowerer.open(
            NodeKind::ModuleClause(ModuleClause {
                kind,
                uri: uri.clone(),
            }),
            Some(root),
        );
        lowerer.close(node, None);
    }

    for import in &source.imports {
        let node = lowerer.open(
            NodeKind::Import(ImportClause {
                uri: import.uri.clone(),
                alias: import.alias.clone(),
                is_glob: import.glob,
            }),
            Some(root),
        );
        lowerer.close(node, import.span);
    }

    for class in &source.classes {
        let node = lowerer.open(
            NodeKind::Class(ClassHeader {
                name: class.name.clone(),
                type_params: type_params(&class.type_params),
                extends: class.extends.clone(),
                modifiers: modifiers(&class.modifiers),
            }),
            Some(root),
        );
        for property in &class.properties {
            lowerer.property(property, node);
        }
        for method in &class.methods {
            lowerer.method(method, node);
        }
        lowerer.close(node, class.span);
    }

    for alias in &source.typealiases {
        let node = lowerer.open(
            NodeKind::TypeAlias(AliasHeader {
                name: alias.name.clone(),
                type_params: type_params(&alias.type_params),
                target: alias.target.clone(),
                modifiers: modifiers(&alias.modifiers),
            }),
            Some(root),
        );
        lowerer.close(node, alias.span);
    }

    for property in &source.properties {
        lowerer.property(property, root);
    }
    for method in &source.methods {
        lowerer.method(method, root);
    }

    lowerer.close(root, None);
    SyntaxTree::from_nodes(id, version, lowerer.nodes)
}

#[derive(Default)]
struct Lowerer {
    nodes: Vec<Node>,
    cursor: usize,
}

impl Lowerer {
    fn open(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            span: Span::new(self.cursor, self.cursor),
        });
        if let Some(parent) = parent {
            self.nodes[parent.index()].children.push(id);
        }
        self.cursor += 1;
        id
    }

    fn close(&mut self, id: NodeId, explicit: Option<Span>) {
        self.cursor += 1;
        let span = &mut self.nodes[id.index()].span;
        *span = match explicit {
            Some(explicit) => explicit,
            None => Span::new(span.start, self.cursor),
        };
    }

    fn leaf(&mut self, kind: NodeKind, parent: NodeId) -> NodeId {
        let id = self.open(kind, Some(parent));
        self.close(id, None);
        id
    }

    fn property(&mut self, property: &PropertySource, parent: NodeId) {
        let node = self.open(
            NodeKind::Property(PropertyHeader {
                name: property.name.clone(),
                ty: property.ty.clone(),
                modifiers: modifiers(&property.modifiers),
            }),
            Some(parent),
        );
        self.value_or_body(property.value.as_ref(), property.body.as_deref(), node);
        self.close(node, property.span);
    }

    fn value_or_body(
        &mut self,
        value: Option<&ExprSource>,
        body: Option<&[MemberSource]>,
        parent: NodeId,
    ) {
        if let Some(value) = value {
            self.expr(value, parent);
        } else if let Some(body) = body {
            self.object_body(body, parent);
        }
    }

    fn method(&mut self, method: &MethodSource, parent: NodeId) {
        let node = self.open(
            NodeKind::Method(MethodHeader {
                name: method.name.clone(),
                type_params: type_params(&method.type_params),
                return_ty: method.return_ty.clone(),
                modifiers: modifiers(&method.modifiers),
                has_body: method.body.is_some(),
            }),
            Some(parent),
        );
        self.params(&method.params, node);
        if let Some(body) = &method.body {
            self.expr(body, node);
        }
        self.close(node, method.span);
    }

    fn params(&mut self, params: &[ParamSource], parent: NodeId) {
        for param in params {
            self.leaf(
                NodeKind::Parameter(Binding {
                    name: param.name.clone(),
                    ty: param.ty.clone(),
                }),
                parent,
            );
        }
    }

    fn object_body(&mut self, members: &[MemberSource], parent: NodeId) -> NodeId {
        let body = self.open(NodeKind::ObjectBody, Some(parent));
        for member in members {
            self.member(member, body);
        }
        self.close(body, None);
        body
    }

    fn member(&mut self, member: &MemberSource, parent: NodeId) {
        match member {
            MemberSource::Property {
                name,
                ty,
                value,
                body,
            } => {
                let node = self.open(
                    NodeKind::ObjectProperty(Binding {
                        name: name.clone(),
                        ty: ty.clone(),
                    }),
                    Some(parent),
                );
                self.value_or_body(value.as_ref(), body.as_deref(), node);
                self.close(node, None);
            }
            MemberSource::Element { value } => {
                let node = self.open(NodeKind::ObjectElement, Some(parent));
                self.expr(value, node);
                self.close(node, None);
            }
            MemberSource::Entry { key, value } => {
                let node = self.open(NodeKind::ObjectEntry, Some(parent));
                self.expr(key, node);
                self.expr(value, node);
                self.close(node, None);
            }
            MemberSource::For {
                key,
                value,
                iterable,
                body,
            } => {
                let node = self.open(
                    NodeKind::ForGenerator {
                        key: key.as_ref().map(|name| Binding {
                            name: name.clone(),
                            ty: None,
                        }),
                        value: Binding {
                            name: value.clone(),
                            ty: None,
                        },
                    },
                    Some(parent),
                );
                self.expr(iterable, node);
                self.object_body(body, node);
                self.close(node, None);
            }
            MemberSource::When {
                condition,
                body,
                otherwise,
            } => {
                let node = self.open(NodeKind::WhenGenerator, Some(parent));
                self.expr(condition, node);
                self.object_body(body, node);
                if let Some(otherwise) = otherwise {
                    self.object_body(otherwise, node);
                }
                self.close(node, None);
            }
        }
    }

    fn expr(&mut self, expr: &ExprSource, parent: NodeId) -> NodeId {
        match expr {
            ExprSource::String { value } => {
                self.leaf(NodeKind::Literal(Literal::String(value.clone())), parent)
            }
            ExprSource::Int { value } => self.leaf(NodeKind::Literal(Literal::Int(*value)), parent),
            ExprSource::Float { value } => {
                self.leaf(NodeKind::Literal(Literal::Float(*value)), parent)
            }
            ExprSource::Boolean { value } => {
                self.leaf(NodeKind::Literal(Literal::Boolean(*value)), parent)
            }
            ExprSource::Null => self.leaf(NodeKind::Literal(Literal::Null), parent),
            ExprSource::Ident { name } => self.leaf(NodeKind::Ident(name.clone()), parent),
            ExprSource::This => self.leaf(NodeKind::This, parent),
            ExprSource::Module => self.leaf(NodeKind::ModuleRef, parent),
            ExprSource::Import { uri, glob } => self.leaf(
                NodeKind::ImportExpr(ImportClause {
                    uri: uri.clone(),
                    alias: None,
                    is_glob: *glob,
                }),
                parent,
            ),
            ExprSource::Access {
                receiver,
                name,
                null_safe,
            } => {
                let node = self.open(
                    NodeKind::Access {
                        name: name.clone(),
                        null_safe: *null_safe,
                    },
                    Some(parent),
                );
                self.expr(receiver, node);
                self.close(node, None);
                node
            }
            ExprSource::Call {
                receiver,
                name,
                args,
            } => {
                let node = self.open(
                    NodeKind::Call {
                        name: name.clone(),
                        has_receiver: receiver.is_some(),
                    },
                    Some(parent),
                );
                if let Some(receiver) = receiver {
                    self.expr(receiver, node);
                }
                for arg in args {
                    self.expr(arg, node);
                }
                self.close(node, None);
                node
            }
            ExprSource::Let {
                name,
                ty,
                value,
                body,
            } => {
                let node = self.open(
                    NodeKind::Let(Binding {
                        name: name.clone(),
                        ty: ty.clone(),
                    }),
                    Some(parent),
                );
                self.expr(value, node);
                self.expr(body, node);
                self.close(node, None);
                node
            }
            ExprSource::Lambda { params, body } => {
                let node = self.open(NodeKind::Lambda, Some(parent));
                self.params(params, node);
                self.expr(body, node);
                self.close(node, None);
                node
            }
            ExprSource::New { ty, body } => {
                let node = self.open(NodeKind::New(ty.clone()), Some(parent));
                self.object_body(body, node);
                self.close(node, None);
                node
            }
            ExprSource::Amend { parent: base, body } => {
                let node = self.open(NodeKind::Amend, Some(parent));
                self.expr(base, node);
                self.object_body(body, node);
                self.close(node, None);
                node
            }
            ExprSource::If {
                condition,
                then,
                otherwise,
            } => {
                let node = self.open(NodeKind::If, Some(parent));
                self.expr(condition, node);
                self.expr(then, node);
                self.expr(otherwise, node);
                self.close(node, None);
                node
            }
        }
    }
}
