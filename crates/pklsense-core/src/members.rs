//! Ancestor chains and member caches
//!
//! Inheritance is single: every class has at most one superclass, and a module
//! has at most one supermodule. Member lookup never relies on dispatch; it
//! walks an explicit ancestor list, most-derived first, and keeps the first
//! definition of each name.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::syntax::DeclId;
use crate::types::{ClassDef, DeclRef, Type, TypeEnv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Property,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDef {
    pub name: Arc<str>,
    pub kind: MemberKind,
    pub decl: DeclId,
    pub owner: DeclRef,
    pub is_abstract: bool,
    pub is_local: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMember {
    pub member: MemberDef,
    /// Abstract ancestor declaration this concrete member implements
    pub implements: Option<MemberDef>,
}

/// Superclass chain of a class, starting with the class itself
#[derive(Debug, Clone)]
pub struct AncestorChain {
    pub classes: Vec<Arc<ClassDef>>,
    /// The chain loops back onto itself
    pub cyclic: bool,
}

impl AncestorChain {
    pub fn compute(class: &DeclRef, env: &dyn TypeEnv) -> Self {
        let mut classes = Vec::new();
        let mut seen = HashSet::new();
        let mut current = env.class_def(class);
        let mut cyclic = false;
        while let Some(def) = current {
            if !seen.insert(def.decl.id.clone()) {
                cyclic = true;
                tracing::debug!("circular inheritance through {}", def.decl.name);
                break;
            }
            current = match def.superclass.as_ref().map(|s| s.expand_aliases(env)) {
                Some(Type::Class { class, .. }) => env.class_def(&class),
                _ => None,
            };
            classes.push(def);
        }
        Self { classes, cyclic }
    }

    pub fn contains(&self, class: &DeclId) -> bool {
        self.classes.iter().any(|c| &c.decl.id == class)
    }
}

/// Name → most specific member, separately for properties and methods
#[derive(Debug, Clone, Default)]
pub struct MemberCache {
    pub properties: IndexMap<Arc<str>, CachedMember>,
    pub methods: IndexMap<Arc<str>, CachedMember>,
}

impl MemberCache {
    /// Build from an ancestor list ordered most-derived first
    ///
    /// `local` members are visible only on the most-derived class.
    pub fn build(ancestors: &[Arc<ClassDef>]) -> Self {
        let mut cache = MemberCache::default();
        for (depth, class) in ancestors.iter().enumerate() {
            for member in &class.members {
                if member.is_local && depth > 0 {
                    continue;
                }
                let table = match member.kind {
                    MemberKind::Property => &mut cache.properties,
                    MemberKind::Method => &mut cache.methods,
                };
                match table.get_mut(&member.name) {
                    None => {
                        table.insert(
                            member.name.clone(),
                            CachedMember {
                                member: member.clone(),
                                implements: None,
                            },
                        );
                    }
                    Some(winner) => {
                        if !winner.member.is_abstract
                            && member.is_abstract
                            && winner.implements.is_none()
                        {
                            winner.implements = Some(member.clone());
                        }
                    }
                }
            }
        }
        cache
    }

    pub fn property(&self, name: &str) -> Option<&CachedMember> {
        self.properties.get(name)
    }

    pub fn method(&self, name: &str) -> Option<&CachedMember> {
        self.methods.get(name)
    }

    pub fn lookup(&self, name: &str, kind: MemberKind) -> Option<&CachedMember> {
        match kind {
            MemberKind::Property => self.property(name),
            MemberKind::Method => self.method(name),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = (&str, MemberKind)> {
        self.properties
            .keys()
            .map(|k| (k.as_ref(), MemberKind::Property))
            .chain(self.methods.keys().map(|k| (k.as_ref(), MemberKind::Method)))
    }

    pub fn len(&self) -> usize {
        self.properties.len() + self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{ModuleId, NodeId};
    use pretty_assertions::assert_eq;

    fn decl(name: &str, node: u32) -> DeclRef {
        DeclRef::new(
            DeclId::new(ModuleId::new("file:///t.pkl"), NodeId::new(node)),
            name,
        )
    }

    fn member(owner: &DeclRef, name: &str, is_abstract: bool, is_local: bool) -> MemberDef {
        MemberDef {
            name: Arc::from(name),
            kind: MemberKind::Property,
            decl: owner.id.clone(),
            owner: owner.clone(),
            is_abstract,
            is_local,
        }
    }

    fn class(decl: DeclRef, members: Vec<MemberDef>) -> Arc<ClassDef> {
        Arc::new(ClassDef {
            decl,
            type_params: Vec::new(),
            superclass: None,
            is_abstract: false,
            is_open: true,
            is_module: false,
            members,
        })
    }

    #[test]
    fn test_first_definition_wins_and_implements_pairs() {
        let derived = decl("Derived", 1);
        let base = decl("Base", 2);
        let chain = vec![
            class(
                derived.clone(),
                vec![
                    member(&derived, "name", false, false),
                    member(&derived, "secret", false, true),
                ],
            ),
            class(
                base.clone(),
                vec![
                    member(&base, "name", true, false),
                    member(&base, "hidden", false, true),
                    member(&base, "size", false, false),
                ],
            ),
        ];
        let cache = MemberCache::build(&chain);

        let name = cache.property("name").unwrap();
        assert_eq!(name.member.owner.name.as_ref(), "Derived");
        assert_eq!(
            name.implements.as_ref().map(|m| m.owner.name.as_ref()),
            Some("Base")
        );
        assert_eq!(cache.property("size").unwrap().implements, None);
        assert!(cache.property("secret").is_some());
        assert!(cache.property("hidden").is_none());
        assert_eq!(cache.len(), 3);
    }
}
