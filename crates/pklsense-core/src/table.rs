//! A standalone, registration-based type environment
//!
//! Useful for hosts that want lattice queries without syntax trees, and for
//! exercising the lattice in isolation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::syntax::{DeclId, ModuleId, NodeId, Variance};
use crate::types::{AliasDef, BaseTypes, ClassDef, DeclRef, Type, TypeEnv, TypeParamDef, TypeParamRef};

/// Highest `FunctionN` arity registered by [`TypeTable::with_base`]
pub const MAX_FUNCTION_ARITY: usize = 5;

pub struct TypeTable {
    module: ModuleId,
    next: u32,
    classes: HashMap<DeclId, Arc<ClassDef>>,
    aliases: HashMap<DeclId, Arc<AliasDef>>,
    names: HashMap<String, DeclRef>,
    base: BaseTypes,
}

impl TypeTable {
    /// A table preloaded with the base class hierarchy
    pub fn with_base() -> Self {
        let module = ModuleId::new("pkl:base");
        let mut next = 0u32;
        let mut names = HashMap::new();
        let mut decl = |name: &str| {
            next += 1;
            let decl = DeclRef::new(DeclId::new(module.clone(), NodeId::new(next)), name);
            names.insert(name.to_string(), decl.clone());
            decl
        };
        let base = BaseTypes {
            any: decl("Any"),
            null: decl("Null"),
            boolean: decl("Boolean"),
            string: decl("String"),
            number: decl("Number"),
            int: decl("Int"),
            float: decl("Float"),
            duration: decl("Duration"),
            data_size: decl("DataSize"),
            object: decl("Object"),
            typed: decl("Typed"),
            dynamic: decl("Dynamic"),
            module: decl("Module"),
            listing: decl("Listing"),
            mapping: decl("Mapping"),
            collection: decl("Collection"),
            list: decl("List"),
            set: decl("Set"),
            map: decl("Map"),
            pair: decl("Pair"),
            regex: decl("Regex"),
            int_seq: decl("IntSeq"),
            function: decl("Function"),
            function_n: (0..=MAX_FUNCTION_ARITY)
                .map(|n| decl(&format!("Function{}", n)))
                .collect(),
        };

        let mut table = Self {
            module,
            next,
            classes: HashMap::new(),
            aliases: HashMap::new(),
            names,
            base: base.clone(),
        };

        let any = Some(base.any_type());
        let object = Some(base.class(&base.object));
        table.define_class(&base.any, Vec::new(), None);
        for simple in [
            &base.null,
            &base.boolean,
            &base.string,
            &base.number,
            &base.duration,
            &base.data_size,
            &base.object,
            &base.regex,
            &base.int_seq,
            &base.function,
        ] {
            table.define_class(simple, Vec::new(), any.clone());
        }
        table.define_class(&base.int, Vec::new(), Some(base.class(&base.number)));
        table.define_class(&base.float, Vec::new(), Some(base.class(&base.number)));
        table.define_class(&base.typed, Vec::new(), object.clone());
        table.define_class(&base.dynamic, Vec::new(), object.clone());
        table.define_class(&base.module, Vec::new(), Some(base.class(&base.typed)));
        table.define_class(&base.listing, vec![out("Element")], object.clone());
        table.define_class(&base.mapping, vec![out("Key"), out("Value")], object);
        table.define_class(&base.collection, vec![out("Element")], any.clone());
        for sequence in [&base.list, &base.set] {
            let element = param(sequence, 0, "Element");
            table.define_class(
                sequence,
                vec![out("Element")],
                Some(Type::class(base.collection.clone(), vec![element])),
            );
        }
        table.define_class(&base.map, vec![out("Key"), out("Value")], any.clone());
        table.define_class(&base.pair, vec![out("First"), out("Second")], any);
        for (arity, function) in base.function_n.iter().enumerate() {
            let mut params: Vec<TypeParamDef> = (1..=arity)
                .map(|i| TypeParamDef {
                    name: format!("Param{}", i),
                    variance: Variance::Contravariant,
                })
                .collect();
            params.push(out("Result"));
            table.define_class(function, params, Some(base.class(&base.function)));
        }
        table
    }

    /// Allocate a declaration for a class or alias to be defined later
    pub fn reserve(&mut self, name: &str) -> DeclRef {
        self.next += 1;
        let decl = DeclRef::new(
            DeclId::new(self.module.clone(), NodeId::new(self.next)),
            name,
        );
        self.names.insert(name.to_string(), decl.clone());
        decl
    }

    pub fn define_class(&mut self, decl: &DeclRef, type_params: Vec<TypeParamDef>, superclass: Option<Type>) {
        self.classes.insert(
            decl.id.clone(),
            Arc::new(ClassDef {
                decl: decl.clone(),
                type_params,
                superclass,
                is_abstract: false,
                is_open: true,
                is_module: false,
                members: Vec::new(),
            }),
        );
    }

    pub fn define_alias(&mut self, decl: &DeclRef, type_params: Vec<TypeParamDef>, target: Type) {
        self.aliases.insert(
            decl.id.clone(),
            Arc::new(AliasDef {
                decl: decl.clone(),
                type_params,
                target,
            }),
        );
    }

    /// Reserve and define a non-generic class in one step
    pub fn class(&mut self, name: &str, superclass: Option<Type>) -> DeclRef {
        let decl = self.reserve(name);
        let superclass = superclass.or_else(|| Some(self.base.any_type()));
        self.define_class(&decl, Vec::new(), superclass);
        decl
    }

    pub fn alias(&mut self, name: &str, target: Type) -> DeclRef {
        let decl = self.reserve(name);
        self.define_alias(&decl, Vec::new(), target);
        decl
    }

    pub fn lookup(&self, name: &str) -> Option<&DeclRef> {
        self.names.get(name)
    }

    /// `name<args>` as a class type, or an alias type when `name` is an alias
    pub fn ty(&self, name: &str, args: Vec<Type>) -> Type {
        match self.names.get(name) {
            Some(decl) if self.aliases.contains_key(&decl.id) => Type::Alias {
                alias: decl.clone(),
                args,
            },
            Some(decl) => Type::class(decl.clone(), args),
            None => Type::Unknown,
        }
    }
}

impl TypeEnv for TypeTable {
    fn class_def(&self, class: &DeclRef) -> Option<Arc<ClassDef>> {
        self.classes.get(&class.id).cloned()
    }

    fn alias_def(&self, alias: &DeclRef) -> Option<Arc<AliasDef>> {
        self.aliases.get(&alias.id).cloned()
    }

    fn base(&self) -> &BaseTypes {
        &self.base
    }
}

pub fn out(name: &str) -> TypeParamDef {
    TypeParamDef {
        name: name.to_string(),
        variance: Variance::Covariant,
    }
}

/// Reference to the `index`-th type parameter of `owner`
pub fn param(owner: &DeclRef, index: usize, name: &str) -> Type {
    Type::Parameter(TypeParamRef {
        owner: owner.id.clone(),
        index,
        name: Arc::from(name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_views_as_collection() {
        let table = TypeTable::with_base();
        let list_of_int = table.ty("List", vec![table.ty("Int", vec![])]);
        let collection = table.lookup("Collection").unwrap().clone();
        assert_eq!(
            list_of_int.instantiate_as_supertype(&collection, &table),
            Some(vec![table.ty("Int", vec![])])
        );
        let string = table.lookup("String").unwrap().clone();
        assert_eq!(list_of_int.instantiate_as_supertype(&string, &table), None);
    }

    #[test]
    fn test_unknown_name_degrades() {
        let table = TypeTable::with_base();
        assert_eq!(table.ty("Nope", vec![]), Type::Unknown);
    }
}
