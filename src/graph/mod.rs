//! Weighted social graph snapshots
//!
//! A [`SocialGraph`] is an immutable, per-call snapshot of the connection
//! graph. It wraps an undirected petgraph graph together with a user-id to
//! index mapping. Indices are stable for the lifetime of a snapshot (users are
//! never removed), so the analytics code can use dense `Vec<f64>` buffers
//! indexed by [`NodeIndex::index`].

use std::collections::{HashMap, HashSet};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod builder;
pub mod edge;
pub mod node;

pub use builder::SnapshotBuilder;
pub use edge::{mutuality, Connection, WeightedEdge};
pub use node::UserNode;

/// Errors specific to graph snapshots
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("User not found in snapshot: {0}")]
    UserNotFound(String),

    #[error("Invalid edge: {0}")]
    InvalidEdge(String),
}

/// Dense adjacency view of a snapshot used by the iterative algorithms.
///
/// Vertex `i` corresponds to `NodeIndex::new(i)` of the owning snapshot.
#[derive(Debug, Clone)]
pub struct Adjacency {
    /// Neighbor lists: `(neighbor index, weight)`
    pub neighbors: Vec<Vec<(usize, f64)>>,
    /// Weighted degree of every vertex
    pub weighted_degree: Vec<f64>,
    /// Sum of all edge weights, each undirected edge counted once
    pub total_weight: f64,
}

impl Adjacency {
    /// Number of vertices
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Whether the view has no vertices
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Unweighted degree of a vertex
    pub fn degree(&self, i: usize) -> usize {
        self.neighbors[i].len()
    }
}

/// Summary counters of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub users: usize,
    pub connections: usize,
    pub total_weight: f64,
    pub density: f64,
}

/// Immutable weighted snapshot of the social graph
#[derive(Debug, Clone, Default)]
pub struct SocialGraph {
    /// The underlying undirected graph
    graph: UnGraph<UserNode, Connection>,

    /// User id to index mapping
    node_map: HashMap<String, NodeIndex>,
}

impl SocialGraph {
    /// Create a new empty snapshot
    pub fn new() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            node_map: HashMap::new(),
        }
    }

    /// Build a snapshot from directional edge records.
    ///
    /// The two directional records of a pair are merged into one undirected
    /// [`Connection`]. Self-loops are skipped.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = WeightedEdge>,
    {
        let mut directed: HashMap<(String, String), WeightedEdge> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for edge in edges {
            for id in [&edge.source_id, &edge.target_id] {
                if seen.insert(id.clone()) {
                    order.push(id.clone());
                }
            }
            if edge.source_id == edge.target_id {
                continue;
            }
            directed.insert((edge.source_id.clone(), edge.target_id.clone()), edge);
        }

        let mut graph = Self::new();
        for id in &order {
            graph.add_user(id.clone());
        }

        let mut merged: HashSet<(String, String)> = HashSet::new();
        let mut keys: Vec<&(String, String)> = directed.keys().collect();
        keys.sort();
        for key in keys {
            let (a, b) = key;
            let pair = if a < b {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            };
            if !merged.insert(pair) {
                continue;
            }
            let forward = &directed[key];
            let reverse = directed.get(&(b.clone(), a.clone()));
            let connection = Connection::merge(forward, reverse);
            // Both endpoints were added above, so this cannot fail.
            let _ = graph.add_connection(a, b, connection);
        }

        graph
    }

    /// Add a user to the snapshot, returning its index (idempotent)
    pub fn add_user(&mut self, id: impl Into<String>) -> NodeIndex {
        let id = id.into();
        if let Some(&idx) = self.node_map.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(UserNode::new(id.clone()));
        self.node_map.insert(id, idx);
        idx
    }

    /// Add or replace the connection between two users
    pub fn add_connection(&mut self, a: &str, b: &str, connection: Connection) -> Result<(), GraphError> {
        if a == b {
            return Err(GraphError::InvalidEdge(format!("self-loop on {a}")));
        }
        let a_idx = *self
            .node_map
            .get(a)
            .ok_or_else(|| GraphError::UserNotFound(a.to_string()))?;
        let b_idx = *self
            .node_map
            .get(b)
            .ok_or_else(|| GraphError::UserNotFound(b.to_string()))?;

        if let Some(existing) = self.graph.find_edge(a_idx, b_idx) {
            self.graph[existing] = connection;
        } else {
            self.graph.add_edge(a_idx, b_idx, connection);
        }
        Ok(())
    }

    /// Get the index of a user
    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    /// Get the user id stored at an index
    pub fn user_id(&self, idx: NodeIndex) -> Option<&str> {
        self.graph.node_weight(idx).map(|node| node.id.as_str())
    }

    /// Whether the snapshot contains a user
    pub fn contains(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    /// All user ids in index order
    pub fn user_ids(&self) -> Vec<String> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .map(|node| node.id.clone())
            .collect()
    }

    /// Get the connection between two users
    pub fn connection(&self, a: &str, b: &str) -> Option<&Connection> {
        let a_idx = self.index_of(a)?;
        let b_idx = self.index_of(b)?;
        self.graph
            .find_edge(a_idx, b_idx)
            .and_then(|edge| self.graph.edge_weight(edge))
    }

    /// Neighbors of a user with their connection records.
    ///
    /// Unknown users have no neighbors.
    pub fn neighbors(&self, id: &str) -> Vec<(&str, &Connection)> {
        let Some(idx) = self.index_of(id) else {
            return Vec::new();
        };
        self.graph
            .edges(idx)
            .filter_map(|edge| {
                let other = if edge.source() == idx {
                    edge.target()
                } else {
                    edge.source()
                };
                self.graph
                    .node_weight(other)
                    .map(|node| (node.id.as_str(), edge.weight()))
            })
            .collect()
    }

    /// Neighbor ids of a user
    pub fn neighbor_ids(&self, id: &str) -> HashSet<String> {
        self.neighbors(id)
            .into_iter()
            .map(|(neighbor, _)| neighbor.to_string())
            .collect()
    }

    /// Users adjacent to both `a` and `b`
    pub fn common_neighbors(&self, a: &str, b: &str) -> Vec<String> {
        let left = self.neighbor_ids(a);
        let right = self.neighbor_ids(b);
        let mut common: Vec<String> = left.intersection(&right).cloned().collect();
        common.sort();
        common
    }

    /// Unweighted degree of a user (0 for unknown users)
    pub fn degree(&self, id: &str) -> usize {
        self.index_of(id)
            .map(|idx| self.graph.edges(idx).count())
            .unwrap_or(0)
    }

    /// Number of users
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of undirected connections
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the snapshot has no users
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Sum of connection weights, each connection counted once
    pub fn total_weight(&self) -> f64 {
        self.graph.edge_weights().map(|c| c.weight).sum()
    }

    /// Dense adjacency view indexed like the snapshot
    pub fn adjacency(&self) -> Adjacency {
        let n = self.graph.node_count();
        let mut neighbors = vec![Vec::new(); n];
        let mut weighted_degree = vec![0.0; n];
        let mut total_weight = 0.0;

        for edge in self.graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            let w = edge.weight().weight;
            neighbors[a].push((b, w));
            neighbors[b].push((a, w));
            weighted_degree[a] += w;
            weighted_degree[b] += w;
            total_weight += w;
        }

        for list in &mut neighbors {
            list.sort_by_key(|(j, _)| *j);
        }

        Adjacency {
            neighbors,
            weighted_degree,
            total_weight,
        }
    }

    /// Summary counters
    pub fn summary(&self) -> SnapshotSummary {
        let n = self.node_count();
        let m = self.edge_count();
        let density = if n > 1 {
            (2 * m) as f64 / (n * (n - 1)) as f64
        } else {
            0.0
        };
        SnapshotSummary {
            users: n,
            connections: m,
            total_weight: self.total_weight(),
            density,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: &str, b: &str, strength: f64, trust: f64) -> WeightedEdge {
        WeightedEdge::new(a, b, strength, trust)
    }

    #[test]
    fn test_add_user_is_idempotent() {
        let mut graph = SocialGraph::new();
        let first = graph.add_user("alice");
        let second = graph.add_user("alice");

        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_add_connection_requires_users() {
        let mut graph = SocialGraph::new();
        graph.add_user("alice");

        let result = graph.add_connection("alice", "bob", Connection::symmetric(0.5, 0.5));
        assert!(matches!(result, Err(GraphError::UserNotFound(_))));

        let result = graph.add_connection("alice", "alice", Connection::symmetric(0.5, 0.5));
        assert!(matches!(result, Err(GraphError::InvalidEdge(_))));
    }

    #[test]
    fn test_from_edges_merges_directional_records() {
        let graph = SocialGraph::from_edges(vec![
            edge("a", "b", 0.8, 0.6),
            edge("b", "a", 0.4, 0.2),
            edge("b", "c", 0.5, 0.5),
        ]);

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);

        let ab = graph.connection("a", "b").unwrap();
        assert!((ab.strength - 0.6).abs() < 1e-9);
        assert!((ab.trust - 0.4).abs() < 1e-9);
        assert!((ab.mutuality - 0.5).abs() < 1e-9);

        let bc = graph.connection("c", "b").unwrap();
        assert_eq!(bc.mutuality, 0.0);
    }

    #[test]
    fn test_common_neighbors_and_degree() {
        let graph = SocialGraph::from_edges(vec![
            edge("a", "b", 0.5, 0.5),
            edge("a", "c", 0.5, 0.5),
            edge("d", "b", 0.5, 0.5),
            edge("d", "c", 0.5, 0.5),
        ]);

        assert_eq!(graph.common_neighbors("a", "d"), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(graph.degree("a"), 2);
        assert_eq!(graph.degree("missing"), 0);
        assert!(graph.neighbors("missing").is_empty());
    }

    #[test]
    fn test_adjacency_matches_snapshot() {
        let graph = SocialGraph::from_edges(vec![
            edge("a", "b", 1.0, 0.5),
            edge("b", "c", 0.5, 0.5),
        ]);
        let adj = graph.adjacency();

        assert_eq!(adj.len(), 3);
        assert!((adj.total_weight - 0.75).abs() < 1e-9);
        let b = graph.index_of("b").unwrap().index();
        assert_eq!(adj.degree(b), 2);
        assert!((adj.weighted_degree[b] - 0.75).abs() < 1e-9);
    }
}
