// ABOUTME: Model "extends" graph; multiple inheritance is legal
// ABOUTME: Self-extension (augmenting a model in place) is tracked apart from real edges

use fieldgraph_core::{ExtensionDeclaration, ModelId, ModuleId};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// `model` extends another model.
    Parent,
    /// `model` extends itself: an in-place augmentation, never part of a cycle.
    SelfExtension,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelNode {
    pub id: ModelId,
    /// Directly extended models, in first-declaration order.
    pub parents: Vec<ModelId>,
    /// Modules declaring each parent edge.
    pub edge_modules: BTreeMap<ModelId, BTreeSet<ModuleId>>,
    /// How many times the model was declared as extending itself.
    pub self_extensions: usize,
    pub self_extension_modules: BTreeSet<ModuleId>,
}

impl ModelNode {
    fn new(id: ModelId) -> Self {
        Self {
            id,
            parents: Vec::new(),
            edge_modules: BTreeMap::new(),
            self_extensions: 0,
            self_extension_modules: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelExtensionGraph {
    nodes: BTreeMap<ModelId, ModelNode>,
}

impl ModelExtensionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the node on first reference. Returns true when it was created.
    pub fn ensure_model(&mut self, model: &ModelId) -> bool {
        if self.nodes.contains_key(model) {
            return false;
        }
        self.nodes.insert(model.clone(), ModelNode::new(model.clone()));
        true
    }

    pub fn add_edge(&mut self, child: &ModelId, parent: &ModelId, module: &ModuleId) -> EdgeKind {
        self.ensure_model(parent);
        let node = self
            .nodes
            .entry(child.clone())
            .or_insert_with(|| ModelNode::new(child.clone()));

        if child == parent {
            node.self_extensions += 1;
            node.self_extension_modules.insert(module.clone());
            return EdgeKind::SelfExtension;
        }

        if !node.parents.contains(parent) {
            node.parents.push(parent.clone());
        }
        node.edge_modules
            .entry(parent.clone())
            .or_default()
            .insert(module.clone());
        EdgeKind::Parent
    }

    /// Add every edge of one declaration; returns how many were self-extensions.
    pub fn add_declaration(&mut self, declaration: &ExtensionDeclaration) -> usize {
        declaration
            .parents
            .iter()
            .filter(|parent| {
                self.add_edge(&declaration.model, parent, &declaration.module)
                    == EdgeKind::SelfExtension
            })
            .count()
    }

    pub fn contains(&self, model: &ModelId) -> bool {
        self.nodes.contains_key(model)
    }

    pub fn node(&self, model: &ModelId) -> Option<&ModelNode> {
        self.nodes.get(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelId> {
        self.nodes.keys()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct cross-model edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.parents.len()).sum()
    }

    pub fn parents(&self, model: &ModelId) -> &[ModelId] {
        self.nodes
            .get(model)
            .map(|n| n.parents.as_slice())
            .unwrap_or(&[])
    }

    pub fn self_extension_count(&self, model: &ModelId) -> usize {
        self.nodes.get(model).map_or(0, |n| n.self_extensions)
    }

    /// Modules that declared `child` extends `parent`.
    pub fn edge_declarers(&self, child: &ModelId, parent: &ModelId) -> Option<&BTreeSet<ModuleId>> {
        self.nodes.get(child)?.edge_modules.get(parent)
    }

    /// All models reachable by following "extends" edges, depth-first in declaration order,
    /// each listed once and excluding `model` itself. Terminates on cycles.
    pub fn ancestors(&self, model: &ModelId) -> Vec<ModelId> {
        let mut out = Vec::new();
        let mut visited: FxHashSet<&ModelId> = FxHashSet::default();
        visited.insert(model);

        let mut stack = vec![self.parents(model).iter()];
        while let Some(frame) = stack.last_mut() {
            match frame.next() {
                Some(parent) => {
                    if visited.insert(parent) {
                        out.push(parent.clone());
                        stack.push(self.parents(parent).iter());
                    }
                }
                None => {
                    stack.pop();
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(name: &str) -> ModelId {
        ModelId::from(name)
    }

    #[test]
    fn first_reference_creates_an_empty_node() {
        let mut g = ModelExtensionGraph::new();
        assert!(g.ensure_model(&m("res.partner")));
        assert!(!g.ensure_model(&m("res.partner")));
        let node = g.node(&m("res.partner")).unwrap();
        assert_eq!(node.id, m("res.partner"));
        assert!(node.parents.is_empty());
        assert!(node.edge_modules.is_empty());
        assert_eq!(node.self_extensions, 0);

        let declared = ExtensionDeclaration {
            model: m("res.users"),
            parents: vec![m("res.partner"), m("res.users")],
            module: ModuleId::from("base"),
        };
        assert_eq!(g.add_declaration(&declared), 1);
        assert_eq!(g.parents(&m("res.users")), &[m("res.partner")]);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn self_extension_is_not_a_parent_edge() {
        let mut g = ModelExtensionGraph::new();
        let module = ModuleId::from("sale");
        for _ in 0..3 {
            assert_eq!(
                g.add_edge(&m("sale.order"), &m("sale.order"), &module),
                EdgeKind::SelfExtension
            );
        }
        assert!(g.parents(&m("sale.order")).is_empty());
        assert_eq!(g.self_extension_count(&m("sale.order")), 3);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn ancestors_follow_declaration_order_depth_first() {
        let mut g = ModelExtensionGraph::new();
        let module = ModuleId::from("x");
        g.add_edge(&m("c"), &m("b"), &module);
        g.add_edge(&m("c"), &m("d"), &module);
        g.add_edge(&m("b"), &m("a"), &module);
        g.add_edge(&m("d"), &m("a"), &module);
        assert_eq!(g.ancestors(&m("c")), vec![m("b"), m("a"), m("d")]);
    }

    #[test]
    fn ancestors_terminate_on_cycles() {
        let mut g = ModelExtensionGraph::new();
        let module = ModuleId::from("x");
        g.add_edge(&m("a"), &m("b"), &module);
        g.add_edge(&m("b"), &m("c"), &module);
        g.add_edge(&m("c"), &m("a"), &module);
        assert_eq!(g.ancestors(&m("a")), vec![m("b"), m("c")]);
    }

    #[test]
    fn repeated_edges_collapse_but_keep_declarers() {
        let mut g = ModelExtensionGraph::new();
        g.add_edge(&m("a"), &m("b"), &ModuleId::from("one"));
        g.add_edge(&m("a"), &m("b"), &ModuleId::from("two"));
        assert_eq!(g.parents(&m("a")), &[m("b")]);
        assert_eq!(g.edge_declarers(&m("a"), &m("b")).map(|s| s.len()), Some(2));
    }
}
