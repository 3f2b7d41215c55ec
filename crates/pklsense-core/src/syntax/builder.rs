//! Builder for constructing module descriptions in code

use super::source::Modifier;
use super::{
    AliasSource, ClassSource, ExprSource, ImportSource, MemberSource, MethodSource, ModuleSource,
    ParamSource, PropertySource, SyntaxTree, TypeParamSource, TypeRef, Variance,
};

pub struct ModuleBuilder {
    source: ModuleSource,
}

impl ModuleBuilder {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            source: ModuleSource {
                uri: uri.into(),
                ..Default::default()
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.source.name = Some(name.into());
        self
    }

    pub fn open(mut self) -> Self {
        self.source.open = true;
        self
    }

    pub fn amends(mut self, uri: impl Into<String>) -> Self {
        self.source.amends = Some(uri.into());
        self
    }

    pub fn extends(mut self, uri: impl Into<String>) -> Self {
        self.source.extends = Some(uri.into());
        self
    }

    pub fn import(mut self, uri: impl Into<String>) -> Self {
        self.source.imports.push(ImportSource {
            uri: uri.into(),
            alias: None,
            glob: false,
            span: None,
        });
        self
    }

    pub fn import_as(mut self, uri: impl Into<String>, alias: impl Into<String>) -> Self {
        self.source.imports.push(ImportSource {
            uri: uri.into(),
            alias: Some(alias.into()),
            glob: false,
            span: None,
        });
        self
    }

    pub fn class(mut self, class: ClassSource) -> Self {
        self.source.classes.push(class);
        self
    }

    pub fn typealias(mut self, alias: AliasSource) -> Self {
        self.source.typealiases.push(alias);
        self
    }

    pub fn property(mut self, property: PropertySource) -> Self {
        self.source.properties.push(property);
        self
    }

    pub fn method(mut self, method: MethodSource) -> Self {
        self.source.methods.push(method);
        self
    }

    pub fn build(self) -> ModuleSource {
        self.source
    }

    /// Build and lower in one step
    pub fn tree(self, version: u64) -> SyntaxTree {
        SyntaxTree::lower(&self.source, version)
    }
}

impl TypeParamSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variance: Variance::Invariant,
        }
    }

    pub fn out(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variance: Variance::Covariant,
        }
    }

    pub fn contra(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variance: Variance::Contravariant,
        }
    }
}

impl ClassSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            extends: None,
            modifiers: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            span: None,
        }
    }

    pub fn type_param(mut self, param: TypeParamSource) -> Self {
        self.type_params.push(param);
        self
    }

    pub fn extends(mut self, ty: TypeRef) -> Self {
        self.extends = Some(ty);
        self
    }

    pub fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn property(mut self, property: PropertySource) -> Self {
        self.properties.push(property);
        self
    }

    pub fn method(mut self, method: MethodSource) -> Self {
        self.methods.push(method);
        self
    }
}

impl AliasSource {
    pub fn new(name: impl Into<String>, target: TypeRef) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            target,
            modifiers: Vec::new(),
            span: None,
        }
    }

    pub fn type_param(mut self, param: TypeParamSource) -> Self {
        self.type_params.push(param);
        self
    }
}

impl PropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            modifiers: Vec::new(),
            value: None,
            body: None,
            span: None,
        }
    }

    pub fn ty(mut self, ty: TypeRef) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn value(mut self, value: ExprSource) -> Self {
        self.value = Some(value);
        self
    }

    pub fn body(mut self, members: Vec<MemberSource>) -> Self {
        self.body = Some(members);
        self
    }
}

impl ParamSource {
    pub fn new(name: impl Into<String>, ty: Option<TypeRef>) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl MethodSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            params: Vec::new(),
            return_ty: None,
            modifiers: Vec::new(),
            body: None,
            span: None,
        }
    }

    pub fn type_param(mut self, param: TypeParamSource) -> Self {
        self.type_params.push(param);
        self
    }

    pub fn param(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.params.push(ParamSource::new(name, Some(ty)));
        self
    }

    pub fn returns(mut self, ty: TypeRef) -> Self {
        self.return_ty = Some(ty);
        self
    }

    pub fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn body(mut self, body: ExprSource) -> Self {
        self.body = Some(body);
        self
    }
}

impl ExprSource {
    pub fn string(value: impl Into<String>) -> Self {
        ExprSource::String {
            value: value.into(),
        }
    }

    pub fn int(value: i64) -> Self {
        ExprSource::Int { value }
    }

    pub fn boolean(value: bool) -> Self {
        ExprSource::Boolean { value }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        ExprSource::Ident { name: name.into() }
    }

    pub fn access(receiver: ExprSource, name: impl Into<String>) -> Self {
        ExprSource::Access {
            receiver: Box::new(receiver),
            name: name.into(),
            null_safe: false,
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<ExprSource>) -> Self {
        ExprSource::Call {
            receiver: None,
            name: name.into(),
            args,
        }
    }

    pub fn method_call(receiver: ExprSource, name: impl Into<String>, args: Vec<ExprSource>) -> Self {
        ExprSource::Call {
            receiver: Some(Box::new(receiver)),
            name: name.into(),
            args,
        }
    }

    pub fn let_in(name: impl Into<String>, value: ExprSource, body: ExprSource) -> Self {
        ExprSource::Let {
            name: name.into(),
            ty: None,
            value: Box::new(value),
            body: Box::new(body),
        }
    }

    pub fn lambda(params: Vec<ParamSource>, body: ExprSource) -> Self {
        ExprSource::Lambda {
            params,
            body: Box::new(body),
        }
    }

    pub fn new_object(ty: Option<TypeRef>, body: Vec<MemberSource>) -> Self {
        ExprSource::New { ty, body }
    }
}

impl MemberSource {
    pub fn property(name: impl Into<String>, value: ExprSource) -> Self {
        MemberSource::Property {
            name: name.into(),
            ty: None,
            value: Some(value),
            body: None,
        }
    }

    pub fn element(value: ExprSource) -> Self {
        MemberSource::Element { value }
    }

    pub fn for_each(
        key: Option<&str>,
        value: impl Into<String>,
        iterable: ExprSource,
        body: Vec<MemberSource>,
    ) -> Self {
        MemberSource::For {
            key: key.map(str::to_string),
            value: value.into(),
            iterable,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::NodeKind;

    #[test]
    fn test_builder_matches_source() {
        let tree = ModuleBuilder::new("file:///m.pkl")
            .import_as("other.pkl", "other")
            .class(
                ClassSource::new("Point")
                    .property(PropertySource::new("x").ty(TypeRef::named("Int")))
                    .method(
                        MethodSource::new("plus")
                            .param("other", TypeRef::named("Point"))
                            .returns(TypeRef::named("Point")),
                    ),
            )
            .property(PropertySource::new("origin").value(ExprSource::new_object(
                Some(TypeRef::named("Point")),
                vec![MemberSource::property("x", ExprSource::int(0))],
            )))
            .tree(3);

        assert_eq!(tree.version(), 3);
        let plus = tree.find_member("Point.plus").unwrap();
        match tree.kind(plus) {
            NodeKind::Method(header) => assert!(!header.has_body),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(tree.children(plus).len(), 1);
        let origin = tree.find_member("origin").unwrap();
        let new = tree.child(origin, 0).unwrap();
        assert!(matches!(tree.kind(new), NodeKind::New(Some(_))));
    }
}
