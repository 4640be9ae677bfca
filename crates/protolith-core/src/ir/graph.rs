//! Namespace reference graph.

use super::{Program, TypeHandle};
use std::collections::BTreeSet;

/// Directed graph over namespace indices; an edge `a -> b` means a type
/// placed in `a` has a property referencing a type placed in `b`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceGraph {
    edges: Vec<BTreeSet<usize>>,
}

impl NamespaceGraph {
    /// Builds the graph for the current placement of types
    pub fn build(program: &Program) -> Self {
        let locations = program.locations();
        let mut edges = vec![BTreeSet::new(); program.namespaces.len()];

        for (from, targets) in edges.iter_mut().enumerate() {
            for handle in program.namespace_types(from) {
                let TypeHandle::Class(id) = handle else {
                    continue;
                };
                for property in &program.class(id).properties {
                    let Some(target) = property.reference else {
                        continue;
                    };
                    if let Some(&to) = locations.get(&target) {
                        if to != from {
                            targets.insert(to);
                        }
                    }
                }
            }
        }

        Self { edges }
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true for an empty graph
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Namespaces referenced from `node`
    pub fn successors(&self, node: usize) -> &BTreeSet<usize> {
        &self.edges[node]
    }

    /// Returns true if some namespace transitively references itself
    pub fn has_cycle(&self) -> bool {
        !mutually_reachable(self).is_empty()
    }
}

/// Returns every group of two or more mutually reachable namespaces
/// (strongly connected components), each sorted ascending
pub fn mutually_reachable(graph: &NamespaceGraph) -> Vec<Vec<usize>> {
    let mut tarjan = Tarjan {
        graph,
        index: 0,
        indices: vec![None; graph.len()],
        lowlink: vec![0; graph.len()],
        on_stack: vec![false; graph.len()],
        stack: Vec::new(),
        components: Vec::new(),
    };
    for node in 0..graph.len() {
        if tarjan.indices[node].is_none() {
            tarjan.visit(node);
        }
    }
    let mut components = tarjan.components;
    components.sort();
    components
}

struct Tarjan<'a> {
    graph: &'a NamespaceGraph,
    index: usize,
    indices: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl Tarjan<'_> {
    fn visit(&mut self, node: usize) {
        self.indices[node] = Some(self.index);
        self.lowlink[node] = self.index;
        self.index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;

        let graph = self.graph;
        for &next in graph.successors(node) {
            match self.indices[next] {
                None => {
                    self.visit(next);
                    self.lowlink[node] = self.lowlink[node].min(self.lowlink[next]);
                }
                Some(index) if self.on_stack[next] => {
                    self.lowlink[node] = self.lowlink[node].min(index);
                }
                Some(_) => {}
            }
        }

        if Some(self.lowlink[node]) == self.indices[node] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack[member] = false;
                component.push(member);
                if member == node {
                    break;
                }
            }
            if component.len() > 1 {
                component.sort_unstable();
                self.components.push(component);
            }
        }
    }
}
