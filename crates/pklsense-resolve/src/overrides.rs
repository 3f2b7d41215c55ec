//! Overriding and implementing relationships between members

use pklsense_core::syntax::NodeKind;
use pklsense_core::{MemberKind, NodeId, SyntaxTree};
use serde::Serialize;
use tracing::trace;

use crate::resolver::{Declaration, Resolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuperMemberKind {
    /// The ancestor member is abstract
    Implements,
    Overrides,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperMember {
    pub declaration: Declaration,
    pub kind: SuperMemberKind,
}

impl Resolver {
    /// Nearest ancestor member that the property or method at `node`
    /// overrides or implements
    ///
    /// Ancestors are the superclass chain of the enclosing class, or the
    /// supermodule chain for module-level members. `local` ancestor members
    /// are never overridden.
    pub fn find_super_member(&self, tree: &SyntaxTree, node: NodeId) -> Option<SuperMember> {
        self.adopt(tree);
        let (name, kind) = match tree.get(node).map(|n| &n.kind)? {
            NodeKind::Property(header) => (header.name.as_str(), MemberKind::Property),
            NodeKind::Method(header) => (header.name.as_str(), MemberKind::Method),
            _ => return None,
        };
        let owner = self.owner_of(tree, node)?;
        let chain = self.ancestor_chain(&owner);
        let found = chain.classes.iter().skip(1).find_map(|class| {
            class
                .members
                .iter()
                .find(|m| m.kind == kind && !m.is_local && *m.name == *name)
        })?;
        trace!("{} in {} has super member in {}", name, owner.name, found.owner.name);
        Some(SuperMember {
            declaration: Declaration::member(found),
            kind: if found.is_abstract {
                SuperMemberKind::Implements
            } else {
                SuperMemberKind::Overrides
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pklsense_core::syntax::{ClassSource, MethodSource, Modifier, ModuleBuilder, PropertySource};
    use pklsense_core::TypeRef;
    use pklsense_registry::{GraphConfig, ModuleStore};
    use std::sync::Arc;

    #[test]
    fn test_local_members_are_not_overridden() {
        let store = Arc::new(ModuleStore::new(GraphConfig::default()));
        let tree = store.insert_source(
            &ModuleBuilder::new("file:///w/shapes.pkl")
                .class(
                    ClassSource::new("Shape")
                        .modifier(Modifier::Open)
                        .property(PropertySource::new("id").modifier(Modifier::Local))
                        .method(
                            MethodSource::new("area")
                                .returns(TypeRef::named("Float"))
                                .modifier(Modifier::Local),
                        ),
                )
                .class(
                    ClassSource::new("Square")
                        .extends(TypeRef::named("Shape"))
                        .property(PropertySource::new("id"))
                        .method(MethodSource::new("area").returns(TypeRef::named("Float"))),
                )
                .build(),
        );
        let resolver = Resolver::new(store);

        let id = tree.find_member("Square.id").unwrap();
        let area = tree.find_member("Square.area").unwrap();
        assert_eq!(resolver.find_super_member(&tree, id), None);
        assert_eq!(resolver.find_super_member(&tree, area), None);
    }

    #[test]
    fn test_base_members_are_overridden() {
        let store = Arc::new(ModuleStore::new(GraphConfig::default()));
        let tree = store.insert_source(
            &ModuleBuilder::new("file:///w/point.pkl")
                .class(
                    ClassSource::new("Point")
                        .method(MethodSource::new("toString").returns(TypeRef::named("String"))),
                )
                .build(),
        );
        let resolver = Resolver::new(store);

        let to_string = tree.find_member("Point.toString").unwrap();
        let found = resolver.find_super_member(&tree, to_string).unwrap();
        assert_eq!(found.kind, SuperMemberKind::Overrides);
        assert_eq!(found.declaration.module.as_str(), crate::base::BASE_URI);
    }
}
