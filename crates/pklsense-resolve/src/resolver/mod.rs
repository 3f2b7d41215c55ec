//! The resolution engine
//!
//! A [`Resolver`] answers name, type and member questions over a
//! [`ModuleGraph`]. Class, alias, ancestor-chain and member-cache lookups are
//! memoized in concurrent maps: an entry is computed outside the map and then
//! inserted if still absent, so racing computations are harmless and every
//! reader observes the same value. [`Resolver::update_module`] swaps in a new
//! module version and drops every memo.

mod infer;
mod scope;
mod types;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use pklsense_core::members::MemberKind;
use pklsense_core::syntax::{NodeKind, TypeParamDecl};
use pklsense_core::{
    AliasDef, AncestorChain, BaseTypes, ClassDef, DeclId, DeclRef, MemberCache, MemberDef,
    ModuleId, NodeId, SyntaxTree, Type, TypeEnv, TypeParamDef,
};
use pklsense_registry::{GraphError, ModuleGraph};
use tracing::{debug, trace, warn};

use crate::base::{base_module, BASE_URI};

pub use infer::Completion;
pub use scope::{DeclKind, Declaration, Resolution};

pub struct Resolver {
    graph: Arc<dyn ModuleGraph>,
    base_tree: Arc<SyntaxTree>,
    base: BaseTypes,
    /// Trees handed to the resolver directly or loaded through it
    trees: DashMap<ModuleId, Arc<SyntaxTree>>,
    classes: DashMap<DeclId, Option<Arc<ClassDef>>>,
    aliases: DashMap<DeclId, Option<Arc<AliasDef>>>,
    chains: DashMap<DeclId, Arc<AncestorChain>>,
    members: DashMap<DeclId, Arc<MemberCache>>,
    /// (referencing module, uri) → target module
    modules: DashMap<(ModuleId, String), Result<ModuleId, GraphError>>,
}

impl Resolver {
    pub fn new(graph: Arc<dyn ModuleGraph>) -> Self {
        let base_tree = Arc::new(SyntaxTree::lower(&base_module(), 1));
        let base = base_types(&base_tree);
        Self {
            graph,
            base_tree,
            base,
            trees: DashMap::new(),
            classes: DashMap::new(),
            aliases: DashMap::new(),
            chains: DashMap::new(),
            members: DashMap::new(),
            modules: DashMap::new(),
        }
    }

    pub fn graph(&self) -> &Arc<dyn ModuleGraph> {
        &self.graph
    }

    pub fn base_tree(&self) -> &Arc<SyntaxTree> {
        &self.base_tree
    }

    /// Replace the known version of a module and drop every memoized result
    pub fn update_module(&self, tree: Arc<SyntaxTree>) {
        debug!("updating {} to v{}", tree.id(), tree.version());
        self.trees.insert(tree.id().clone(), tree);
        self.invalidate();
    }

    pub fn invalidate(&self) {
        self.classes.clear();
        self.aliases.clear();
        self.chains.clear();
        self.members.clear();
        self.modules.clear();
    }

    /// Make sure `tree` is the version analysis sees for its module, and pick
    /// up newer versions the graph holds for every module seen so far
    pub(crate) fn adopt(&self, tree: &SyntaxTree) {
        let mut fresh: Vec<Arc<SyntaxTree>> = self
            .trees
            .iter()
            .filter(|entry| entry.key() != tree.id())
            .filter_map(|entry| {
                self.graph
                    .module(entry.key())
                    .filter(|stored| stored.version() > entry.value().version())
            })
            .collect();

        let own = self.trees.get(tree.id()).map(|entry| entry.version());
        let stored = self.graph.module(tree.id()).map(|stored| stored.version());
        match (own, stored) {
            (Some(own), _) if own >= tree.version() => {}
            (None, Some(stored)) if stored == tree.version() => {
                self.trees.insert(tree.id().clone(), Arc::new(tree.clone()));
            }
            _ if is_base(tree) => {}
            _ => fresh.push(Arc::new(tree.clone())),
        }

        if fresh.is_empty() {
            return;
        }
        for tree in fresh {
            debug!("updating {} to v{}", tree.id(), tree.version());
            self.trees.insert(tree.id().clone(), tree);
        }
        self.invalidate();
    }

    /// The version of a module the memo tables were built from
    ///
    /// Newer versions in the graph are picked up at the start of the next
    /// query, so one query never mixes two versions of a module.
    pub fn tree(&self, id: &ModuleId) -> Option<Arc<SyntaxTree>> {
        if id.as_str() == BASE_URI {
            return Some(self.base_tree.clone());
        }
        if let Some(own) = self.trees.get(id) {
            return Some(own.value().clone());
        }
        let stored = self.graph.module(id)?;
        Some(
            self.trees
                .entry(id.clone())
                .or_insert(stored)
                .value()
                .clone(),
        )
    }

    /// Resolve a module URI as written in `from`
    pub fn resolve_module_uri(
        &self,
        from: &SyntaxTree,
        uri: &str,
    ) -> Result<Arc<SyntaxTree>, GraphError> {
        if uri == BASE_URI {
            return Ok(self.base_tree.clone());
        }
        let key = (from.id().clone(), uri.to_string());
        let cached = self.modules.get(&key).map(|entry| entry.value().clone());
        if let Some(cached) = cached {
            return cached.and_then(|id| {
                self.tree(&id)
                    .ok_or_else(|| GraphError::not_found(uri, from.id()))
            });
        }

        let result = self.graph.resolve_uri(uri, from.id());
        match &result {
            Ok(tree) => {
                trace!("{} -> {} (from {})", uri, tree.id(), from.id());
                self.trees
                    .entry(tree.id().clone())
                    .or_insert_with(|| tree.clone());
            }
            Err(e) => debug!("unresolved module uri: {}", e),
        }
        self.modules
            .entry(key)
            .or_insert_with(|| result.as_ref().map(|t| t.id().clone()).map_err(Clone::clone));
        result
    }

    /// The module of `tree`, viewed as a class
    pub fn module_decl(&self, tree: &SyntaxTree) -> DeclRef {
        DeclRef::new(tree.decl(NodeId::ROOT), module_name(tree))
    }

    pub fn module_type(&self, tree: &SyntaxTree) -> Type {
        Type::class(self.module_decl(tree), Vec::new())
    }

    /// Modules reached through `amends`/`extends`, nearest first
    pub fn supermodules(&self, tree: &SyntaxTree) -> Vec<Arc<SyntaxTree>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([tree.id().clone()]);
        let mut current = self.supermodule(tree);
        while let Some(parent) = current {
            if !seen.insert(parent.id().clone()) {
                break;
            }
            current = self.supermodule(&parent);
            chain.push(parent);
        }
        chain
    }

    fn supermodule(&self, tree: &SyntaxTree) -> Option<Arc<SyntaxTree>> {
        let (_, clause) = tree.module_clause()?;
        self.resolve_module_uri(tree, &clause.uri).ok()
    }

    /// The class or module declaration at `node`
    pub fn decl_ref(&self, tree: &SyntaxTree, node: NodeId) -> Option<DeclRef> {
        match &tree.get(node)?.kind {
            NodeKind::Class(header) => Some(DeclRef::new(tree.decl(node), &header.name)),
            NodeKind::TypeAlias(header) => Some(DeclRef::new(tree.decl(node), &header.name)),
            NodeKind::Module(_) => Some(self.module_decl(tree)),
            _ => None,
        }
    }

    /// Class or module that declares the member at `node`
    pub(crate) fn owner_of(&self, tree: &SyntaxTree, node: NodeId) -> Option<DeclRef> {
        let parent = tree.parent(node)?;
        match tree.kind(parent) {
            NodeKind::Class(_) | NodeKind::Module(_) => self.decl_ref(tree, parent),
            _ => None,
        }
    }

    pub fn ancestor_chain(&self, class: &DeclRef) -> Arc<AncestorChain> {
        if let Some(hit) = self.chains.get(&class.id) {
            return hit.value().clone();
        }
        let chain = Arc::new(AncestorChain::compute(class, self));
        self.chains
            .entry(class.id.clone())
            .or_insert(chain)
            .value()
            .clone()
    }

    pub fn member_cache(&self, class: &DeclRef) -> Arc<MemberCache> {
        if let Some(hit) = self.members.get(&class.id) {
            return hit.value().clone();
        }
        let chain = self.ancestor_chain(class);
        let cache = Arc::new(MemberCache::build(&chain.classes));
        trace!("member cache for {}: {} members", class.name, cache.len());
        self.members
            .entry(class.id.clone())
            .or_insert(cache)
            .value()
            .clone()
    }

    fn build_class(&self, class: &DeclRef) -> Option<ClassDef> {
        let tree = self.tree(&class.id.module)?;
        let node = class.id.node;
        match &tree.get(node)?.kind {
            NodeKind::Class(header) => {
                let superclass = match &header.extends {
                    Some(extends) => Some(self.resolve_type_ref(&tree, node, extends)),
                    None if is_base(&tree) => {
                        (header.name != "Any").then(|| self.base.any_type())
                    }
                    None => Some(self.base.class(&self.base.typed)),
                };
                Some(ClassDef {
                    decl: class.clone(),
                    type_params: type_params(&header.type_params),
                    superclass,
                    is_abstract: header.modifiers.is_abstract,
                    is_open: header.modifiers.is_open || header.modifiers.is_abstract,
                    is_module: false,
                    members: members_of(&tree, node, class),
                })
            }
            NodeKind::Module(header) => {
                let superclass = match tree.module_clause() {
                    Some((_, clause)) => match self.resolve_module_uri(&tree, &clause.uri) {
                        Ok(parent) => Some(self.module_type(&parent)),
                        Err(_) => Some(Type::Unknown),
                    },
                    None => Some(self.base.class(&self.base.module)),
                };
                Some(ClassDef {
                    decl: class.clone(),
                    type_params: Vec::new(),
                    superclass,
                    is_abstract: false,
                    is_open: header.is_open,
                    is_module: true,
                    members: members_of(&tree, node, class),
                })
            }
            _ => None,
        }
    }

    fn build_alias(&self, alias: &DeclRef) -> Option<AliasDef> {
        let tree = self.tree(&alias.id.module)?;
        match &tree.get(alias.id.node)?.kind {
            NodeKind::TypeAlias(header) => Some(AliasDef {
                decl: alias.clone(),
                type_params: type_params(&header.type_params),
                target: self.resolve_type_ref(&tree, alias.id.node, &header.target),
            }),
            _ => None,
        }
    }

    /// Whether the inheritance chain of `class` ends in something unresolved
    pub(crate) fn has_unknown_ancestor(&self, class: &DeclRef) -> bool {
        let chain = self.ancestor_chain(class);
        chain.cyclic
            || chain
                .classes
                .last()
                .is_some_and(|last| matches!(last.superclass, Some(Type::Unknown)))
    }
}

impl TypeEnv for Resolver {
    fn class_def(&self, class: &DeclRef) -> Option<Arc<ClassDef>> {
        if let Some(hit) = self.classes.get(&class.id) {
            return hit.value().clone();
        }
        let built = self.build_class(class).map(Arc::new);
        if built.is_none() {
            trace!("no class definition for {}", class.name);
        }
        self.classes
            .entry(class.id.clone())
            .or_insert(built)
            .value()
            .clone()
    }

    fn alias_def(&self, alias: &DeclRef) -> Option<Arc<AliasDef>> {
        if let Some(hit) = self.aliases.get(&alias.id) {
            return hit.value().clone();
        }
        let built = self.build_alias(alias).map(Arc::new);
        self.aliases
            .entry(alias.id.clone())
            .or_insert(built)
            .value()
            .clone()
    }

    fn base(&self) -> &BaseTypes {
        &self.base
    }
}

pub(crate) fn is_base(tree: &SyntaxTree) -> bool {
    tree.id().as_str() == BASE_URI
}

/// Declared name of a module, or the last segment of its URI
fn module_name(tree: &SyntaxTree) -> String {
    if let Some(name) = &tree.header().name {
        return name.clone();
    }
    let uri = tree.id().as_str();
    let path = uri.split('#').last().unwrap_or(uri);
    let last = path
        .rsplit(['/', ':'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(path);
    last.strip_suffix(".pkl").unwrap_or(last).to_string()
}

fn type_params(params: &[TypeParamDecl]) -> Vec<TypeParamDef> {
    params
        .iter()
        .map(|p| TypeParamDef {
            name: p.name.clone(),
            variance: p.variance,
        })
        .collect()
}

fn members_of(tree: &SyntaxTree, owner_node: NodeId, owner: &DeclRef) -> Vec<MemberDef> {
    tree.children(owner_node)
        .iter()
        .filter_map(|&child| {
            let (name, kind, modifiers) = match tree.kind(child) {
                NodeKind::Property(header) => (&header.name, MemberKind::Property, header.modifiers),
                NodeKind::Method(header) => (&header.name, MemberKind::Method, header.modifiers),
                _ => return None,
            };
            Some(MemberDef {
                name: Arc::from(name.as_str()),
                kind,
                decl: tree.decl(child),
                owner: owner.clone(),
                is_abstract: modifiers.is_abstract,
                is_local: modifiers.is_local,
            })
        })
        .collect()
}

fn base_types(tree: &SyntaxTree) -> BaseTypes {
    let decl = |name: &str| {
        let node = tree.find_type_decl(name).unwrap_or_else(|| {
            warn!("base module lacks {}", name);
            NodeId::ROOT
        });
        DeclRef::new(tree.decl(node), name)
    };
    BaseTypes {
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
        function_n: (0..=pklsense_core::table::MAX_FUNCTION_ARITY)
            .map(|n| decl(&format!("Function{}", n)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pklsense_core::syntax::{ClassSource, ModuleBuilder, PropertySource};
    use pklsense_core::TypeRef;
    use pklsense_registry::{GraphConfig, ModuleStore};

    fn store() -> Arc<ModuleStore> {
        Arc::new(ModuleStore::new(GraphConfig::default()))
    }

    #[test]
    fn test_base_hierarchy() {
        let resolver = Resolver::new(store());
        let base = resolver.base().clone();
        let list = Type::class(base.list.clone(), vec![base.string_type()]);
        let collection = Type::class(base.collection.clone(), vec![base.any_type()]);
        assert!(list.is_subtype_of(&collection, &resolver));
        assert!(!collection.is_subtype_of(&list, &resolver));
        assert!(base.class(&base.int).is_subtype_of(&base.class(&base.number), &resolver));
        assert!(base
            .class(&base.module)
            .is_subtype_of(&base.class(&base.object), &resolver));
        let any = resolver.class_def(&base.any).unwrap();
        assert_eq!(any.superclass, None);
    }

    #[test]
    fn test_module_superclass_follows_clause() {
        let store = store();
        let parent = store.insert_source(
            &ModuleBuilder::new("file:///w/parent.pkl")
                .open()
                .property(PropertySource::new("port").ty(TypeRef::named("Int")))
                .build(),
        );
        let child = store.insert_source(
            &ModuleBuilder::new("file:///w/child.pkl")
                .amends("parent.pkl")
                .build(),
        );
        let resolver = Resolver::new(store.clone());
        let child_decl = resolver.module_decl(&child);
        let chain = resolver.ancestor_chain(&child_decl);
        assert_eq!(chain.classes[1].decl, resolver.module_decl(&parent));
        assert!(resolver.member_cache(&child_decl).property("port").is_some());
        assert!(resolver.member_cache(&child_decl).property("output").is_some());
        assert_eq!(resolver.supermodules(&child).len(), 1);
    }

    #[test]
    fn test_update_module_drops_memos() {
        let store = store();
        let v1 = store.insert_source(
            &ModuleBuilder::new("file:///w/m.pkl")
                .class(ClassSource::new("Bird"))
                .build(),
        );
        let resolver = Resolver::new(store.clone());
        let bird = resolver.decl_ref(&v1, v1.find_type_decl("Bird").unwrap()).unwrap();
        assert!(resolver.member_cache(&bird).property("name").is_none());

        let v2 = store.insert_source(
            &ModuleBuilder::new("file:///w/m.pkl")
                .class(ClassSource::new("Bird").property(PropertySource::new("name")))
                .build(),
        );
        resolver.update_module(v2.clone());
        let bird = resolver.decl_ref(&v2, v2.find_type_decl("Bird").unwrap()).unwrap();
        assert!(resolver.member_cache(&bird).property("name").is_some());
    }
}
