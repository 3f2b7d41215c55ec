//! Module dependency graph using petgraph
//!
//! Nodes are modules, edges are `amends`/`extends`/`import` references.
//! Inheritance edges must form a forest; import edges may be cyclic.

use std::collections::HashMap;

use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};
use petgraph::visit::EdgeFiltered;
use petgraph::Direction;
use pklsense_core::syntax::ClauseKind;
use pklsense_core::ModuleId;
use serde::{Deserialize, Serialize};

use crate::graph::ModuleGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Amends,
    Extends,
    Import,
}

impl DependencyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyKind::Amends => "amends",
            DependencyKind::Extends => "extends",
            DependencyKind::Import => "import",
        }
    }

    pub fn is_inheritance(self) -> bool {
        matches!(self, DependencyKind::Amends | DependencyKind::Extends)
    }
}

/// A reference whose target could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenEdge {
    pub from: String,
    pub uri: String,
    pub kind: DependencyKind,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: DependencyKind,
}

#[derive(Debug, Default)]
pub struct ModuleDependencyGraph {
    graph: DiGraph<ModuleId, DependencyKind>,
    indices: HashMap<ModuleId, NodeIndex>,
    broken: Vec<BrokenEdge>,
}

impl ModuleDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph reachable from `roots` by following every reference
    pub fn build(graph: &dyn ModuleGraph, roots: &[ModuleId]) -> Self {
        let mut deps = Self::new();
        let mut queue: Vec<ModuleId> = roots.to_vec();
        while let Some(id) = queue.pop() {
            if deps.indices.contains_key(&id) {
                continue;
            }
            deps.add_module(id.clone());
            let Some(tree) = graph.module(&id) else {
                continue;
            };

            let mut references: Vec<(String, DependencyKind)> = Vec::new();
            if let Some((_, clause)) = tree.module_clause() {
                let kind = match clause.kind {
                    ClauseKind::Amends => DependencyKind::Amends,
                    ClauseKind::Extends => DependencyKind::Extends,
                };
                references.push((clause.uri.clone(), kind));
            }
            references.extend(
                tree.imports()
                    .filter(|(_, import)| !import.is_glob)
                    .map(|(_, import)| (import.uri.clone(), DependencyKind::Import)),
            );

            for (uri, kind) in references {
                match graph.resolve_uri(&uri, &id) {
                    Ok(target) => {
                        let target = target.id().clone();
                        deps.add_module(target.clone());
                        deps.add_dependency(&id, &target, kind);
                        queue.push(target);
                    }
                    Err(e) => deps.broken.push(BrokenEdge {
                        from: id.to_string(),
                        uri,
                        kind,
                        error: e.to_string(),
                    }),
                }
            }
        }
        deps
    }

    pub fn add_module(&mut self, id: ModuleId) -> NodeIndex {
        if let Some(&idx) = self.indices.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.indices.insert(id, idx);
        idx
    }

    pub fn add_dependency(&mut self, from: &ModuleId, to: &ModuleId, kind: DependencyKind) {
        if let (Some(&from_idx), Some(&to_idx)) = (self.indices.get(from), self.indices.get(to)) {
            self.graph.add_edge(from_idx, to_idx, kind);
        }
    }

    pub fn module_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.graph
            .raw_edges()
            .iter()
            .map(|edge| DependencyEdge {
                from: self.graph[edge.source()].to_string(),
                to: self.graph[edge.target()].to_string(),
                kind: edge.weight,
            })
            .collect()
    }

    pub fn broken(&self) -> &[BrokenEdge] {
        &self.broken
    }

    /// Dependencies before dependents; `None` when imports are cyclic
    pub fn topological_order(&self) -> Option<Vec<ModuleId>> {
        toposort(&self.graph, None).ok().map(|indices| {
            indices
                .into_iter()
                .rev()
                .map(|idx| self.graph[idx].clone())
                .collect()
        })
    }

    /// Strongly connected groups of more than one module, plus self-references
    pub fn detect_cycles(&self) -> Vec<Vec<ModuleId>> {
        self.cycles_where(|_| true)
    }

    /// Cycles formed by `amends`/`extends` alone
    pub fn inheritance_cycles(&self) -> Vec<Vec<ModuleId>> {
        self.cycles_where(DependencyKind::is_inheritance)
    }

    fn cycles_where(&self, keep: fn(DependencyKind) -> bool) -> Vec<Vec<ModuleId>> {
        let filtered = EdgeFiltered::from_fn(&self.graph, |edge: EdgeReference<'_, DependencyKind>| {
            keep(*edge.weight())
        });
        let mut cycles: Vec<Vec<ModuleId>> = kosaraju_scc(&filtered)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1
                    || self
                        .graph
                        .edges_connecting(scc[0], scc[0])
                        .any(|edge| keep(*edge.weight()))
            })
            .map(|scc| {
                let mut ids: Vec<ModuleId> = scc.into_iter().map(|idx| self.graph[idx].clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Modules that reference `id` directly
    pub fn dependents(&self, id: &ModuleId) -> Vec<ModuleId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Modules `id` references directly
    pub fn dependencies(&self, id: &ModuleId) -> Vec<ModuleId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &ModuleId, direction: Direction) -> Vec<ModuleId> {
        let Some(&idx) = self.indices.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<ModuleId> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> ModuleId {
        ModuleId::new(format!("file:///m/{}.pkl", name))
    }

    #[test]
    fn test_cycles_by_kind() {
        let mut graph = ModuleDependencyGraph::new();
        for name in ["a", "b", "c"] {
            graph.add_module(id(name));
        }
        graph.add_dependency(&id("a"), &id("b"), DependencyKind::Import);
        graph.add_dependency(&id("b"), &id("a"), DependencyKind::Import);
        graph.add_dependency(&id("c"), &id("c"), DependencyKind::Extends);

        assert_eq!(graph.detect_cycles().len(), 2);
        assert_eq!(graph.inheritance_cycles(), vec![vec![id("c")]]);
        assert!(graph.topological_order().is_none());
    }

    #[test]
    fn test_order_and_neighbors() {
        let mut graph = ModuleDependencyGraph::new();
        for name in ["app", "lib", "base"] {
            graph.add_module(id(name));
        }
        graph.add_dependency(&id("app"), &id("lib"), DependencyKind::Import);
        graph.add_dependency(&id("lib"), &id("base"), DependencyKind::Amends);

        assert_eq!(
            graph.topological_order().unwrap(),
            vec![id("base"), id("lib"), id("app")]
        );
        assert_eq!(graph.dependents(&id("lib")), vec![id("app")]);
        assert_eq!(graph.dependencies(&id("lib")), vec![id("base")]);
        assert!(graph.inheritance_cycles().is_empty());
    }
}
