//! Structural type model for Pkl
//!
//! Types are immutable values. Class and alias types point at their
//! declarations through [`DeclRef`]s; definitions are looked up on demand
//! through a [`TypeEnv`], so a `Type` never owns the declarations it names and
//! an unresolvable reference simply degrades to [`Type::Unknown`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::members::MemberDef;
use crate::syntax::{DeclId, Variance};

/// A named pointer at a class or type alias declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclRef {
    pub id: DeclId,
    pub name: Arc<str>,
}

impl DeclRef {
    pub fn new(id: DeclId, name: impl AsRef<str>) -> Self {
        Self {
            id,
            name: Arc::from(name.as_ref()),
        }
    }
}

/// A declared type parameter of a class, alias or method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeParamRef {
    pub owner: DeclId,
    pub index: usize,
    pub name: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// Absorbing element: both sub- and supertype of every type
    Unknown,
    /// Bottom type
    Nothing,
    Nullable(Box<Type>),
    Class {
        class: DeclRef,
        args: Vec<Type>,
    },
    Alias {
        alias: DeclRef,
        args: Vec<Type>,
    },
    /// Flattened, deduplicated members in first-occurrence order
    Union(Vec<Type>),
    Function {
        params: Vec<Type>,
        ret: Box<Type>,
    },
    StringLiteral(Arc<str>),
    Parameter(TypeParamRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParamDef {
    pub name: String,
    pub variance: Variance,
}

/// A class, or a module viewed as a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub decl: DeclRef,
    pub type_params: Vec<TypeParamDef>,
    /// Expressed in terms of this class's own [`Type::Parameter`]s
    pub superclass: Option<Type>,
    pub is_abstract: bool,
    pub is_open: bool,
    pub is_module: bool,
    pub members: Vec<MemberDef>,
}

impl ClassDef {
    pub fn variance(&self, index: usize) -> Variance {
        self.type_params
            .get(index)
            .map(|p| p.variance)
            .unwrap_or_default()
    }

    /// The class applied to its own type parameters
    pub fn self_type(&self) -> Type {
        Type::Class {
            class: self.decl.clone(),
            args: params_of(&self.decl.id, &self.type_params),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasDef {
    pub decl: DeclRef,
    pub type_params: Vec<TypeParamDef>,
    pub target: Type,
}

fn params_of(owner: &DeclId, params: &[TypeParamDef]) -> Vec<Type> {
    params
        .iter()
        .enumerate()
        .map(|(index, p)| {
            Type::Parameter(TypeParamRef {
                owner: owner.clone(),
                index,
                name: Arc::from(p.name.as_str()),
            })
        })
        .collect()
}

/// Declarations of the base module the lattice needs to know about
#[derive(Debug, Clone)]
pub struct BaseTypes {
    pub any: DeclRef,
    pub null: DeclRef,
    pub boolean: DeclRef,
    pub string: DeclRef,
    pub number: DeclRef,
    pub int: DeclRef,
    pub float: DeclRef,
    pub duration: DeclRef,
    pub data_size: DeclRef,
    pub object: DeclRef,
    pub typed: DeclRef,
    pub dynamic: DeclRef,
    pub module: DeclRef,
    pub listing: DeclRef,
    pub mapping: DeclRef,
    pub collection: DeclRef,
    pub list: DeclRef,
    pub set: DeclRef,
    pub map: DeclRef,
    pub pair: DeclRef,
    pub regex: DeclRef,
    pub int_seq: DeclRef,
    pub function: DeclRef,
    /// `Function0`, `Function1`, ... indexed by parameter count
    pub function_n: Vec<DeclRef>,
}

impl BaseTypes {
    pub fn class(&self, decl: &DeclRef) -> Type {
        Type::class(decl.clone(), Vec::new())
    }

    pub fn null_type(&self) -> Type {
        self.class(&self.null)
    }

    pub fn any_type(&self) -> Type {
        self.class(&self.any)
    }

    pub fn string_type(&self) -> Type {
        self.class(&self.string)
    }

    pub fn is_null(&self, ty: &Type) -> bool {
        matches!(ty, Type::Class { class, .. } if class.id == self.null.id)
    }

    /// `FunctionN<params..., ret>` for a function type, or `Function` when the
    /// arity has no dedicated class
    pub fn function_class_view(&self, params: &[Type], ret: &Type) -> Type {
        match self.function_n.get(params.len()) {
            Some(class) => {
                let mut args = params.to_vec();
                args.push(ret.clone());
                Type::class(class.clone(), args)
            }
            None => self.class(&self.function),
        }
    }

    pub fn function_arity(&self, class: &DeclRef) -> Option<usize> {
        self.function_n.iter().position(|f| f.id == class.id)
    }
}

/// Source of class and alias definitions
pub trait TypeEnv {
    fn class_def(&self, class: &DeclRef) -> Option<Arc<ClassDef>>;

    fn alias_def(&self, alias: &DeclRef) -> Option<Arc<AliasDef>>;

    fn base(&self) -> &BaseTypes;
}

const MAX_CHAIN: usize = 64;

impl Type {
    pub fn class(class: DeclRef, args: Vec<Type>) -> Type {
        Type::Class { class, args }
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Type {
        Type::Function {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn string_literal(text: impl AsRef<str>) -> Type {
        Type::StringLiteral(Arc::from(text.as_ref()))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// Normalizing union constructor
    pub fn union(members: impl IntoIterator<Item = Type>, base: &BaseTypes) -> Type {
        let mut flat: Vec<Type> = Vec::new();
        let mut has_null = false;
        let mut stack: Vec<Type> = members.into_iter().collect();
        stack.reverse();
        while let Some(member) = stack.pop() {
            match member {
                Type::Unknown => return Type::Unknown,
                Type::Nothing => {}
                Type::Union(inner) => stack.extend(inner.into_iter().rev()),
                Type::Nullable(inner) => {
                    has_null = true;
                    stack.push(*inner);
                }
                other if base.is_null(&other) => has_null = true,
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }

        let rest = match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Type::Union(flat)),
        };
        match (rest, has_null) {
            (None, false) => Type::Nothing,
            (None, true) => base.null_type(),
            (Some(rest), false) => rest,
            (Some(rest), true) => Type::Nullable(Box::new(rest)),
        }
    }

    /// `T?` in normalized form
    pub fn nullable(inner: Type, base: &BaseTypes) -> Type {
        Type::union([inner, base.null_type()], base)
    }

    /// Replace parameters owned by `owner` with positional `args`
    ///
    /// Missing arguments become `Unknown`; parameters of other owners are left
    /// alone.
    pub fn substitute(&self, owner: &DeclId, args: &[Type], base: &BaseTypes) -> Type {
        match self {
            Type::Parameter(param) if &param.owner == owner => {
                args.get(param.index).cloned().unwrap_or(Type::Unknown)
            }
            Type::Unknown | Type::Nothing | Type::StringLiteral(_) | Type::Parameter(_) => {
                self.clone()
            }
            Type::Nullable(inner) => Type::nullable(inner.substitute(owner, args, base), base),
            Type::Union(members) => Type::union(
                members.iter().map(|m| m.substitute(owner, args, base)),
                base,
            ),
            Type::Class { class, args: own } => Type::Class {
                class: class.clone(),
                args: own.iter().map(|a| a.substitute(owner, args, base)).collect(),
            },
            Type::Alias { alias, args: own } => Type::Alias {
                alias: alias.clone(),
                args: own.iter().map(|a| a.substitute(owner, args, base)).collect(),
            },
            Type::Function { params, ret } => Type::Function {
                params: params
                    .iter()
                    .map(|p| p.substitute(owner, args, base))
                    .collect(),
                ret: Box::new(ret.substitute(owner, args, base)),
            },
        }
    }

    /// Erase every type parameter to `Unknown`
    pub fn erase_parameters(&self) -> Type {
        match self {
            Type::Parameter(_) => Type::Unknown,
            Type::Unknown | Type::Nothing | Type::StringLiteral(_) => self.clone(),
            Type::Nullable(inner) => Type::Nullable(Box::new(inner.erase_parameters())),
            Type::Union(members) => Type::Union(members.iter().map(Type::erase_parameters).collect()),
            Type::Class { class, args } => Type::Class {
                class: class.clone(),
                args: args.iter().map(Type::erase_parameters).collect(),
            },
            Type::Alias { alias, args } => Type::Alias {
                alias: alias.clone(),
                args: args.iter().map(Type::erase_parameters).collect(),
            },
            Type::Function { params, ret } => Type::Function {
                params: params.iter().map(Type::erase_parameters).collect(),
                ret: Box::new(ret.erase_parameters()),
            },
        }
    }

    /// Expand alias references until the head is no longer an alias
    ///
    /// Undefined or cyclic aliases degrade to `Unknown`.
    pub fn expand_aliases(&self, env: &dyn TypeEnv) -> Type {
        let mut current = self.clone();
        let mut seen = HashSet::new();
        while let Type::Alias { alias, args } = &current {
            if !seen.insert(alias.id.clone()) || seen.len() > MAX_CHAIN {
                tracing::trace!("cyclic alias {} expanded to unknown", alias.name);
                return Type::Unknown;
            }
            current = match env.alias_def(alias) {
                Some(def) => def.target.substitute(&def.decl.id, args, env.base()),
                None => Type::Unknown,
            };
        }
        current
    }

    /// View a class type as its ancestor `target`, returning the ancestor's
    /// instantiated type arguments
    ///
    /// `List<String>` viewed as `Collection` yields `[String]`. Returns `None`
    /// when `target` is not on the superclass chain.
    pub fn instantiate_as_supertype(&self, target: &DeclRef, env: &dyn TypeEnv) -> Option<Vec<Type>> {
        let (mut class, mut args) = match self.expand_aliases(env) {
            Type::Class { class, args } => (class, args),
            _ => return None,
        };
        let mut seen = HashSet::new();
        loop {
            if class.id == target.id {
                return Some(args);
            }
            if !seen.insert(class.id.clone()) {
                return None;
            }
            let def = env.class_def(&class)?;
            let superclass = def.superclass.as_ref()?;
            match superclass
                .substitute(&def.decl.id, &args, env.base())
                .expand_aliases(env)
            {
                Type::Class {
                    class: next,
                    args: next_args,
                } => {
                    class = next;
                    args = next_args;
                }
                _ => return None,
            }
        }
    }

    pub fn is_subtype_of(&self, target: &Type, env: &dyn TypeEnv) -> bool {
        crate::subtyping::is_subtype_of(self, target, env)
    }

    pub fn has_common_subtype_with(&self, other: &Type, env: &dyn TypeEnv) -> bool {
        crate::subtyping::has_common_subtype(self, other, env)
    }

    /// Mutual subtypes
    pub fn is_equivalent_to(&self, other: &Type, env: &dyn TypeEnv) -> bool {
        self.is_subtype_of(other, env) && other.is_subtype_of(self, env)
    }

    fn fmt_member(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Union(_) | Type::Function { .. } => write!(f, "({})", self),
            _ => write!(f, "{}", self),
        }
    }
}

fn fmt_args(f: &mut fmt::Formatter<'_>, name: &str, args: &[Type]) -> fmt::Result {
    write!(f, "{}", name)?;
    if args.is_empty() {
        return Ok(());
    }
    write!(f, "<")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    write!(f, ">")
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unknown => write!(f, "unknown"),
            Type::Nothing => write!(f, "nothing"),
            Type::Nullable(inner) => {
                inner.fmt_member(f)?;
                write!(f, "?")
            }
            Type::Class { class, args } => fmt_args(f, &class.name, args),
            Type::Alias { alias, args } => fmt_args(f, &alias.name, args),
            Type::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    match member {
                        Type::Function { .. } => write!(f, "({})", member)?,
                        _ => write!(f, "{}", member)?,
                    }
                }
                Ok(())
            }
            Type::Function { params, ret } => {
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", ret)
            }
            Type::StringLiteral(text) => write!(f, "\"{}\"", text),
            Type::Parameter(param) => write!(f, "{}", param.name),
        }
    }
}
