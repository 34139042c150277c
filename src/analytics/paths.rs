//! Path search and sampled structural estimators

use std::collections::{HashSet, VecDeque};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::PathConfig;
use crate::graph::{Adjacency, SocialGraph};

/// One hop of a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathHop {
    pub from: String,
    pub to: String,
    pub strength: f64,
    pub trust: f64,
}

/// An ordered route through the network with derived quality metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkPath {
    /// Users from source to target, inclusive
    pub nodes: Vec<String>,
    pub hops: Vec<PathHop>,
    pub total_strength: f64,
    pub average_trust: f64,
    /// Strength of the weakest hop
    pub weakest_link: f64,
    /// Composite used to rank alternatives
    pub quality: f64,
}

impl NetworkPath {
    /// Build a path over consecutive snapshot users; `None` if a hop is missing
    pub fn from_nodes(graph: &SocialGraph, nodes: Vec<String>) -> Option<Self> {
        if nodes.is_empty() {
            return None;
        }
        let mut hops = Vec::with_capacity(nodes.len().saturating_sub(1));
        for pair in nodes.windows(2) {
            let connection = graph.connection(&pair[0], &pair[1])?;
            hops.push(PathHop {
                from: pair[0].clone(),
                to: pair[1].clone(),
                strength: connection.strength,
                trust: connection.trust,
            });
        }

        if hops.is_empty() {
            return Some(Self {
                nodes,
                hops,
                total_strength: 0.0,
                average_trust: 1.0,
                weakest_link: 1.0,
                quality: 1.0,
            });
        }

        let count = hops.len() as f64;
        let total_strength: f64 = hops.iter().map(|h| h.strength).sum();
        let average_trust = hops.iter().map(|h| h.trust).sum::<f64>() / count;
        let weakest_link = hops.iter().map(|h| h.strength).fold(f64::INFINITY, f64::min);
        let quality = path_quality(total_strength / count, average_trust, weakest_link, hops.len());

        Some(Self {
            nodes,
            hops,
            total_strength,
            average_trust,
            weakest_link,
            quality,
        })
    }

    /// Number of hops
    pub fn length(&self) -> usize {
        self.hops.len()
    }

    /// Mean hop strength
    pub fn average_strength(&self) -> f64 {
        if self.hops.is_empty() {
            0.0
        } else {
            self.total_strength / self.hops.len() as f64
        }
    }
}

/// `0.3·avg strength + 0.4·avg trust + 0.2·weakest link + 0.1·(1 / hops)`
pub fn path_quality(average_strength: f64, average_trust: f64, weakest_link: f64, hops: usize) -> f64 {
    let inverse_length = if hops == 0 { 1.0 } else { 1.0 / hops as f64 };
    0.3 * average_strength + 0.4 * average_trust + 0.2 * weakest_link + 0.1 * inverse_length
}

/// Structural summary of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub users: usize,
    pub connections: usize,
    pub density: f64,
    pub average_degree: f64,
    pub estimated_diameter: usize,
    pub clustering_coefficient: f64,
    pub components: usize,
}

/// Shortest and alternative path search over a snapshot
pub struct PathFinder<'g> {
    graph: &'g SocialGraph,
    adjacency: Adjacency,
    config: PathConfig,
}

impl<'g> PathFinder<'g> {
    /// Create a path finder with default configuration
    pub fn new(graph: &'g SocialGraph) -> Self {
        Self::with_config(graph, PathConfig::default())
    }

    /// Create a path finder with explicit configuration
    pub fn with_config(graph: &'g SocialGraph, config: PathConfig) -> Self {
        Self {
            graph,
            adjacency: graph.adjacency(),
            config,
        }
    }

    /// Hop-count shortest path, stopping as soon as the target is reached
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<NetworkPath> {
        let source = self.graph.index_of(from)?.index();
        let target = self.graph.index_of(to)?.index();
        if source == target {
            return NetworkPath::from_nodes(self.graph, vec![from.to_string()]);
        }

        let n = self.adjacency.len();
        let mut parent: Vec<Option<usize>> = vec![None; n];
        let mut seen = vec![false; n];
        let mut queue = VecDeque::new();
        seen[source] = true;
        queue.push_back(source);

        'search: while let Some(v) = queue.pop_front() {
            for &(w, _) in &self.adjacency.neighbors[v] {
                if seen[w] {
                    continue;
                }
                seen[w] = true;
                parent[w] = Some(v);
                if w == target {
                    break 'search;
                }
                queue.push_back(w);
            }
        }

        if !seen[target] {
            return None;
        }

        let mut route = vec![target];
        let mut current = target;
        while let Some(p) = parent[current] {
            route.push(p);
            current = p;
        }
        route.reverse();
        NetworkPath::from_nodes(self.graph, self.ids(&route))
    }

    /// Hop distance between two users
    pub fn distance(&self, from: &str, to: &str) -> Option<usize> {
        self.shortest_path(from, to).map(|path| path.length())
    }

    /// Simple paths up to the configured length, best quality first.
    ///
    /// Every partial path carries its own visited set, so different routes may
    /// share intermediaries.
    pub fn alternative_paths(&self, from: &str, to: &str) -> Vec<NetworkPath> {
        let (Some(source), Some(target)) = (self.graph.index_of(from), self.graph.index_of(to)) else {
            return Vec::new();
        };
        let (source, target) = (source.index(), target.index());
        if source == target || self.config.max_alternative_paths == 0 {
            return Vec::new();
        }

        let candidate_cap = self.config.max_alternative_paths * 4;
        let expansion_budget = 20_000usize;
        let mut expansions = 0usize;
        let mut found: Vec<Vec<usize>> = Vec::new();
        let mut queue: VecDeque<(Vec<usize>, HashSet<usize>)> = VecDeque::new();
        queue.push_back((vec![source], HashSet::from([source])));

        while let Some((route, visited)) = queue.pop_front() {
            if found.len() >= candidate_cap || expansions >= expansion_budget {
                break;
            }
            expansions += 1;
            let Some(&last) = route.last() else {
                continue;
            };
            let hops = route.len() - 1;

            for &(next, _) in &self.adjacency.neighbors[last] {
                if visited.contains(&next) {
                    continue;
                }
                if next == target {
                    let mut complete = route.clone();
                    complete.push(next);
                    found.push(complete);
                    continue;
                }
                if hops + 1 < self.config.max_path_length {
                    let mut extended = route.clone();
                    extended.push(next);
                    let mut extended_visited = visited.clone();
                    extended_visited.insert(next);
                    queue.push_back((extended, extended_visited));
                }
            }
        }

        let mut paths: Vec<NetworkPath> = found
            .into_iter()
            .filter_map(|route| NetworkPath::from_nodes(self.graph, self.ids(&route)))
            .collect();
        paths.sort_by(|a, b| {
            b.quality
                .partial_cmp(&a.quality)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.length().cmp(&b.length()))
        });
        paths.truncate(self.config.max_alternative_paths);
        paths
    }

    /// Users within `hops` of `user`, excluding the user
    pub fn within_hops(&self, user: &str, hops: usize) -> HashSet<String> {
        let Some(source) = self.graph.index_of(user) else {
            return HashSet::new();
        };
        bfs_distances(&self.adjacency, source.index())
            .into_iter()
            .enumerate()
            .filter(|(i, d)| *i != source.index() && matches!(d, Some(d) if *d <= hops))
            .filter_map(|(i, _)| self.graph.user_id(petgraph::graph::NodeIndex::new(i)))
            .map(str::to_string)
            .collect()
    }

    /// Hop distances from a user to every snapshot vertex, by index
    pub fn distances_from(&self, user: &str) -> Vec<Option<usize>> {
        match self.graph.index_of(user) {
            Some(source) => bfs_distances(&self.adjacency, source.index()),
            None => vec![None; self.adjacency.len()],
        }
    }

    /// Diameter estimated from BFS out of sampled sources (exact when the
    /// sample covers every vertex)
    pub fn estimate_diameter(&self) -> usize {
        self.sampled_vertices()
            .into_iter()
            .filter_map(|v| bfs_distances(&self.adjacency, v).into_iter().flatten().max())
            .max()
            .unwrap_or(0)
    }

    /// Average local clustering coefficient over sampled vertices
    pub fn clustering_coefficient(&self) -> f64 {
        let sample = self.sampled_vertices();
        if sample.is_empty() {
            return 0.0;
        }
        let total: f64 = sample.iter().map(|&v| local_clustering(&self.adjacency, v)).sum();
        total / sample.len() as f64
    }

    /// Number of connected components
    pub fn connected_components(&self) -> usize {
        let n = self.adjacency.len();
        let mut seen = vec![false; n];
        let mut components = 0;
        for start in 0..n {
            if seen[start] {
                continue;
            }
            components += 1;
            let mut stack = vec![start];
            seen[start] = true;
            while let Some(v) = stack.pop() {
                for &(w, _) in &self.adjacency.neighbors[v] {
                    if !seen[w] {
                        seen[w] = true;
                        stack.push(w);
                    }
                }
            }
        }
        components
    }

    /// Structural summary of the snapshot
    pub fn network_stats(&self) -> NetworkStats {
        let summary = self.graph.summary();
        let average_degree = if summary.users > 0 {
            (2 * summary.connections) as f64 / summary.users as f64
        } else {
            0.0
        };
        NetworkStats {
            users: summary.users,
            connections: summary.connections,
            density: summary.density,
            average_degree,
            estimated_diameter: self.estimate_diameter(),
            clustering_coefficient: self.clustering_coefficient(),
            components: self.connected_components(),
        }
    }

    fn sampled_vertices(&self) -> Vec<usize> {
        let n = self.adjacency.len();
        let mut vertices: Vec<usize> = (0..n).collect();
        if self.config.sample_size >= n {
            return vertices;
        }
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        vertices.shuffle(&mut rng);
        vertices.truncate(self.config.sample_size);
        vertices
    }

    fn ids(&self, route: &[usize]) -> Vec<String> {
        route
            .iter()
            .filter_map(|&i| self.graph.user_id(petgraph::graph::NodeIndex::new(i)))
            .map(str::to_string)
            .collect()
    }
}

/// Unweighted BFS distances from `source`
pub(crate) fn bfs_distances(adjacency: &Adjacency, source: usize) -> Vec<Option<usize>> {
    let mut distance = vec![None; adjacency.len()];
    let mut queue = VecDeque::new();
    distance[source] = Some(0);
    queue.push_back(source);
    while let Some(v) = queue.pop_front() {
        let next = distance[v].map(|d| d + 1);
        for &(w, _) in &adjacency.neighbors[v] {
            if distance[w].is_none() {
                distance[w] = next;
                queue.push_back(w);
            }
        }
    }
    distance
}

fn local_clustering(adjacency: &Adjacency, v: usize) -> f64 {
    let neighbors: Vec<usize> = adjacency.neighbors[v].iter().map(|(w, _)| *w).collect();
    let k = neighbors.len();
    if k < 2 {
        return 0.0;
    }
    let set: HashSet<usize> = neighbors.iter().copied().collect();
    let mut links = 0usize;
    for &u in &neighbors {
        links += adjacency.neighbors[u]
            .iter()
            .filter(|(w, _)| *w > u && set.contains(w))
            .count();
    }
    (2 * links) as f64 / (k * (k - 1)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WeightedEdge;

    fn diamond() -> SocialGraph {
        // a - b - d and a - c - d, plus a tail d - e
        SocialGraph::from_edges(vec![
            WeightedEdge::new("a", "b", 0.9, 0.9),
            WeightedEdge::new("b", "d", 0.9, 0.9),
            WeightedEdge::new("a", "c", 0.2, 0.3),
            WeightedEdge::new("c", "d", 0.2, 0.3),
            WeightedEdge::new("d", "e", 0.5, 0.5),
        ])
    }

    #[test]
    fn test_shortest_path() {
        let graph = diamond();
        let finder = PathFinder::new(&graph);

        let path = finder.shortest_path("a", "e").unwrap();
        assert_eq!(path.length(), 3);
        assert_eq!(path.nodes.first().unwrap(), "a");
        assert_eq!(path.nodes.last().unwrap(), "e");
        assert_eq!(finder.distance("a", "d"), Some(2));
        assert!(finder.shortest_path("a", "missing").is_none());
    }

    #[test]
    fn test_trivial_path() {
        let graph = diamond();
        let finder = PathFinder::new(&graph);
        let path = finder.shortest_path("a", "a").unwrap();
        assert_eq!(path.length(), 0);
        assert_eq!(path.quality, 1.0);
    }

    #[test]
    fn test_alternative_paths_ranked_by_quality() {
        let graph = diamond();
        let finder = PathFinder::new(&graph);

        let paths = finder.alternative_paths("a", "d");
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].nodes, vec!["a", "b", "d"]);
        assert!(paths[0].quality > paths[1].quality);
        assert!((paths[1].weakest_link - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_path_quality_formula() {
        let q = path_quality(0.5, 0.5, 0.5, 2);
        assert!((q - (0.15 + 0.2 + 0.1 + 0.05)).abs() < 1e-12);
    }

    #[test]
    fn test_alternative_paths_respect_length_cap() {
        let graph = diamond();
        let config = PathConfig {
            max_path_length: 2,
            ..PathConfig::default()
        };
        let finder = PathFinder::with_config(&graph, config);
        assert!(finder.alternative_paths("a", "e").is_empty());
    }

    #[test]
    fn test_within_hops() {
        let graph = diamond();
        let finder = PathFinder::new(&graph);
        let close = finder.within_hops("a", 1);
        assert_eq!(close.len(), 2);
        assert!(close.contains("b") && close.contains("c"));
        assert!(!close.contains("a"));
    }

    #[test]
    fn test_structure_estimates() {
        let triangle = SocialGraph::from_edges(vec![
            WeightedEdge::new("a", "b", 0.5, 0.5),
            WeightedEdge::new("b", "c", 0.5, 0.5),
            WeightedEdge::new("c", "a", 0.5, 0.5),
        ]);
        let finder = PathFinder::new(&triangle);
        assert_eq!(finder.estimate_diameter(), 1);
        assert!((finder.clustering_coefficient() - 1.0).abs() < 1e-12);
        assert_eq!(finder.connected_components(), 1);

        let graph = diamond();
        let stats = PathFinder::new(&graph).network_stats();
        assert_eq!(stats.users, 5);
        assert_eq!(stats.estimated_diameter, 3);
        assert_eq!(stats.components, 1);
    }
}
