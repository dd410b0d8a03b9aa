//! Dependency ordering of resource kinds
//!
//! Owner kinds must be fully migrated before the kinds whose instances carry
//! ownerReferences to them, so that those references can be pointed at the
//! freshly created owners. The graph is tiny (a handful of kinds from the
//! owner mapping) and is rebuilt for every pass.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tracing::debug;

use crate::error::Error;

/// Traversal state of a node during the depth-first sort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Directed graph over resource kind names with owner -> dependent edges
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from (owner, dependent) pairs
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a (String, String)>) -> Self {
        let mut graph = Self::new();
        for (owner, dependent) in edges {
            graph.add_edge(owner, dependent);
        }
        graph
    }

    /// Register both nodes and a directed edge `owner -> dependent`
    pub fn add_edge(&mut self, owner: &str, dependent: &str) {
        self.nodes.insert(owner.to_string());
        self.nodes.insert(dependent.to_string());

        let successors = self.edges.entry(owner.to_string()).or_default();
        if !successors.iter().any(|s| s == dependent) {
            successors.push(dependent.to_string());
        }
    }

    /// Order all nodes so every owner precedes its dependents.
    ///
    /// Depth-first: a node is pushed to the front of the result only after
    /// all of its successors are done. Reaching a node that is still in
    /// progress means the edges form a cycle, and no partial order is
    /// returned.
    pub fn sort(&self) -> Result<Vec<String>, Error> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.nodes.len());
        let mut sorted: VecDeque<String> = VecDeque::with_capacity(self.nodes.len());

        for node in &self.nodes {
            if marks.contains_key(node.as_str()) {
                continue;
            }
            self.visit(node, &mut marks, &mut sorted)?;
        }

        debug!(order = ?sorted, "Computed resource priorities");
        Ok(sorted.into())
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        sorted: &mut VecDeque<String>,
    ) -> Result<(), Error> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(Error::Cycle {
                    node: node.to_string(),
                })
            }
            None => {}
        }

        marks.insert(node, Mark::InProgress);

        if let Some(successors) = self.edges.get(node) {
            for successor in successors {
                self.visit(successor, marks, sorted)?;
            }
        }

        marks.insert(node, Mark::Done);
        sorted.push_front(node.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[String], node: &str) -> usize {
        order
            .iter()
            .position(|n| n == node)
            .unwrap_or_else(|| panic!("{node} missing from {order:?}"))
    }

    fn assert_owners_first(graph_edges: &[(&str, &str)], order: &[String]) {
        for (owner, dependent) in graph_edges {
            assert!(
                position(order, owner) < position(order, dependent),
                "{owner} should precede {dependent} in {order:?}"
            );
        }
    }

    #[test]
    fn test_sort_respects_every_edge() {
        let edges = [("a", "b"), ("b", "c"), ("d", "c"), ("e", "c"), ("f", "b")];
        let mut graph = DependencyGraph::new();
        for (owner, dependent) in edges {
            graph.add_edge(owner, dependent);
        }

        let order = graph.sort().unwrap();

        assert_eq!(order.len(), 6);
        assert_owners_first(&edges, &order);
    }

    #[test]
    fn test_sort_shared_dependent() {
        let edges = [("bars", "foos"), ("bazs", "foos")];
        let pairs: Vec<(String, String)> = edges
            .iter()
            .map(|(o, d)| (o.to_string(), d.to_string()))
            .collect();
        let graph = DependencyGraph::from_edges(&pairs);

        let order = graph.sort().unwrap();

        assert_eq!(order.len(), 3);
        assert_owners_first(&edges, &order);
    }

    #[test]
    fn test_sort_cycle_is_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.add_edge("d", "c");
        graph.add_edge("e", "c");
        graph.add_edge("f", "b");
        graph.add_edge("c", "f");

        let err = graph.sort().unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "a");
        assert!(matches!(graph.sort(), Err(Error::Cycle { node }) if node == "a"));
    }

    #[test]
    fn test_duplicate_edges_are_collapsed() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("a", "b");

        assert_eq!(graph.sort().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new();
        assert!(graph.sort().unwrap().is_empty());
    }
}
