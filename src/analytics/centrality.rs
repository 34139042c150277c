//! Centrality measures over a snapshot
//!
//! - degree: `deg / (n - 1)`
//! - betweenness: Brandes accumulation on hop-count shortest paths,
//!   normalized by `(n - 1)(n - 2) / 2`
//! - eigenvector: power iteration on `A + I` (same eigenvectors as `A`, but
//!   also converges on bipartite graphs) with L2 re-normalization
//! - PageRank: weighted power iteration, dangling mass spread uniformly
//! - closeness: Wasserman–Faust normalization for disconnected graphs
//!
//! The iterative measures double-buffer two fixed-size vectors indexed by the
//! snapshot's vertex indices.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::analytics::paths::bfs_distances;
use crate::config::{BetweennessMode, CentralityConfig};
use crate::engine::{MetricsCollector, Timer};
use crate::graph::{Adjacency, SocialGraph};
use crate::Result;

/// Structural role derived from the centrality scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkRole {
    /// No connections in the snapshot
    Isolated,
    /// Sits on a large share of shortest paths
    Broker,
    /// Well connected to other well-connected users
    Hub,
    /// Attracts more than its share of PageRank
    Influencer,
    /// Lies on some shortest paths
    Connector,
    /// Everyone else
    Peripheral,
}

impl NetworkRole {
    /// Label used in reasons and logs
    pub fn label(&self) -> &'static str {
        match self {
            NetworkRole::Isolated => "isolated",
            NetworkRole::Broker => "broker",
            NetworkRole::Hub => "hub",
            NetworkRole::Influencer => "influencer",
            NetworkRole::Connector => "connector",
            NetworkRole::Peripheral => "peripheral",
        }
    }
}

/// Centrality of one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralityScores {
    pub user_id: String,
    pub degree: f64,
    pub betweenness: f64,
    pub eigenvector: f64,
    pub page_rank: f64,
    pub closeness: f64,
    pub role: NetworkRole,
}

/// Output of a power iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    pub values: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Centrality for every user of a snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CentralityReport {
    /// Scores in snapshot index order
    pub scores: Vec<CentralityScores>,
    pub page_rank_iterations: usize,
    pub page_rank_converged: bool,
    pub eigenvector_iterations: usize,
    pub eigenvector_converged: bool,
    /// False when betweenness came from sampled pivots
    pub betweenness_exact: bool,
}

impl CentralityReport {
    /// Scores of a user
    pub fn get(&self, user_id: &str) -> Option<&CentralityScores> {
        self.scores.iter().find(|s| s.user_id == user_id)
    }

    /// Scores keyed by user id
    pub fn by_user(&self) -> HashMap<String, CentralityScores> {
        self.scores
            .iter()
            .map(|s| (s.user_id.clone(), s.clone()))
            .collect()
    }

    /// Keep only the given users
    pub fn retain_users(&mut self, users: &[String]) {
        self.scores.retain(|s| users.contains(&s.user_id));
    }

    /// Largest PageRank in the report
    pub fn max_page_rank(&self) -> f64 {
        self.scores.iter().map(|s| s.page_rank).fold(0.0, f64::max)
    }
}

/// Computes centrality measures
#[derive(Debug, Clone)]
pub struct CentralityEngine {
    config: CentralityConfig,
    metrics: MetricsCollector,
}

impl Default for CentralityEngine {
    fn default() -> Self {
        Self::new(CentralityConfig::default())
    }
}

impl CentralityEngine {
    /// Create a new engine
    pub fn new(config: CentralityConfig) -> Self {
        Self {
            config,
            metrics: MetricsCollector::new("centrality"),
        }
    }

    /// Normalized degree centrality
    pub fn degree(&self, adjacency: &Adjacency) -> Vec<f64> {
        let n = adjacency.len();
        if n < 2 {
            return vec![0.0; n];
        }
        (0..n)
            .map(|v| adjacency.degree(v) as f64 / (n - 1) as f64)
            .collect()
    }

    /// Betweenness according to the configured mode
    pub fn betweenness(&self, adjacency: &Adjacency) -> (Vec<f64>, bool) {
        match &self.config.betweenness {
            BetweennessMode::Exact => (self.betweenness_exact(adjacency), true),
            BetweennessMode::Sampled { samples, seed } => {
                if *samples >= adjacency.len() {
                    (self.betweenness_exact(adjacency), true)
                } else {
                    (self.betweenness_sampled(adjacency, *samples, *seed), false)
                }
            }
        }
    }

    /// Exact Brandes betweenness, O(V·E)
    pub fn betweenness_exact(&self, adjacency: &Adjacency) -> Vec<f64> {
        let timer = Timer::start();
        let n = adjacency.len();
        let mut centrality = vec![0.0; n];
        for source in 0..n {
            accumulate_dependencies(adjacency, source, &mut centrality);
        }
        normalize_betweenness(&mut centrality, 1.0);
        self.metrics.record_analytics("betweenness", timer.elapsed_secs());
        centrality
    }

    /// Brandes accumulation from `samples` random pivots, scaled by `n / samples`
    pub fn betweenness_sampled(&self, adjacency: &Adjacency, samples: usize, seed: Option<u64>) -> Vec<f64> {
        let timer = Timer::start();
        let n = adjacency.len();
        let samples = samples.clamp(1, n.max(1));
        let mut pivots: Vec<usize> = (0..n).collect();
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        pivots.shuffle(&mut rng);
        pivots.truncate(samples);

        let mut centrality = vec![0.0; n];
        for &source in &pivots {
            accumulate_dependencies(adjacency, source, &mut centrality);
        }
        normalize_betweenness(&mut centrality, n as f64 / samples as f64);
        self.metrics
            .record_analytics("betweenness_sampled", timer.elapsed_secs());
        centrality
    }

    /// Eigenvector centrality by power iteration on the unweighted operator
    pub fn eigenvector(&self, adjacency: &Adjacency) -> IterationResult {
        let timer = Timer::start();
        let n = adjacency.len();
        if n == 0 {
            return IterationResult {
                values: Vec::new(),
                iterations: 0,
                converged: true,
            };
        }

        let mut current = vec![1.0 / (n as f64).sqrt(); n];
        let mut next = vec![0.0; n];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;
            for v in 0..n {
                next[v] = current[v]
                    + adjacency.neighbors[v]
                        .iter()
                        .map(|(w, _)| current[*w])
                        .sum::<f64>();
            }
            let norm = next.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm > 0.0 {
                for x in next.iter_mut() {
                    *x /= norm;
                }
            }
            let delta = max_delta(&current, &next);
            std::mem::swap(&mut current, &mut next);
            if delta < self.config.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(iterations, "eigenvector centrality hit the iteration cap");
            self.metrics.record_non_convergence("eigenvector");
        }
        self.metrics.record_analytics("eigenvector", timer.elapsed_secs());
        IterationResult {
            values: current,
            iterations,
            converged,
        }
    }

    /// Weighted PageRank by power iteration
    pub fn page_rank(&self, adjacency: &Adjacency) -> IterationResult {
        let timer = Timer::start();
        let n = adjacency.len();
        if n == 0 {
            return IterationResult {
                values: Vec::new(),
                iterations: 0,
                converged: true,
            };
        }

        let d = self.config.damping;
        let uniform = 1.0 / n as f64;
        let mut current = vec![uniform; n];
        let mut next = vec![0.0; n];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let dangling: f64 = (0..n)
                .filter(|&v| adjacency.weighted_degree[v] <= 0.0)
                .map(|v| current[v])
                .sum();
            let base = (1.0 - d) * uniform + d * dangling * uniform;

            for x in next.iter_mut() {
                *x = base;
            }
            for v in 0..n {
                let out = adjacency.weighted_degree[v];
                if out <= 0.0 {
                    continue;
                }
                let share = d * current[v] / out;
                for &(w, weight) in &adjacency.neighbors[v] {
                    next[w] += share * weight;
                }
            }

            let delta = max_delta(&current, &next);
            std::mem::swap(&mut current, &mut next);
            if delta < self.config.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(iterations, "pagerank hit the iteration cap");
            self.metrics.record_non_convergence("pagerank");
        }
        self.metrics.record_analytics("pagerank", timer.elapsed_secs());
        IterationResult {
            values: current,
            iterations,
            converged,
        }
    }

    /// Closeness with Wasserman–Faust scaling
    pub fn closeness(&self, adjacency: &Adjacency) -> Vec<f64> {
        let n = adjacency.len();
        if n < 2 {
            return vec![0.0; n];
        }
        (0..n)
            .map(|v| {
                let distances = bfs_distances(adjacency, v);
                let (reachable, total) = distances
                    .iter()
                    .enumerate()
                    .filter(|(w, _)| *w != v)
                    .filter_map(|(_, d)| *d)
                    .fold((0usize, 0usize), |(r, t), d| (r + 1, t + d));
                if total == 0 {
                    0.0
                } else {
                    let r = reachable as f64;
                    (r / total as f64) * (r / (n - 1) as f64)
                }
            })
            .collect()
    }

    /// Every measure for every user of the snapshot
    #[instrument(skip(self, graph), fields(users = graph.node_count()))]
    pub fn compute(&self, graph: &SocialGraph) -> CentralityReport {
        let adjacency = graph.adjacency();
        let degree = self.degree(&adjacency);
        let (betweenness, exact) = self.betweenness(&adjacency);
        let eigenvector = self.eigenvector(&adjacency);
        let page_rank = self.page_rank(&adjacency);
        let closeness = self.closeness(&adjacency);

        assemble(
            graph,
            &adjacency,
            Measures {
                degree,
                betweenness,
                betweenness_exact: exact,
                eigenvector,
                page_rank,
                closeness,
            },
        )
    }

    /// Same as [`CentralityEngine::compute`], running the independent
    /// measures on blocking worker threads and joining before assembly
    pub async fn compute_concurrent(&self, graph: Arc<SocialGraph>) -> Result<CentralityReport> {
        let adjacency = Arc::new(graph.adjacency());

        let betweenness = {
            let (engine, adjacency) = (self.clone(), adjacency.clone());
            tokio::task::spawn_blocking(move || engine.betweenness(&adjacency))
        };
        let eigenvector = {
            let (engine, adjacency) = (self.clone(), adjacency.clone());
            tokio::task::spawn_blocking(move || engine.eigenvector(&adjacency))
        };
        let page_rank = {
            let (engine, adjacency) = (self.clone(), adjacency.clone());
            tokio::task::spawn_blocking(move || engine.page_rank(&adjacency))
        };
        let closeness = {
            let (engine, adjacency) = (self.clone(), adjacency.clone());
            tokio::task::spawn_blocking(move || engine.closeness(&adjacency))
        };

        let ((betweenness, exact), eigenvector, page_rank, closeness) =
            tokio::try_join!(betweenness, eigenvector, page_rank, closeness)?;
        let degree = self.degree(&adjacency);

        debug!(users = graph.node_count(), "joined concurrent centrality measures");
        Ok(assemble(
            &graph,
            &adjacency,
            Measures {
                degree,
                betweenness,
                betweenness_exact: exact,
                eigenvector,
                page_rank,
                closeness,
            },
        ))
    }
}

struct Measures {
    degree: Vec<f64>,
    betweenness: Vec<f64>,
    betweenness_exact: bool,
    eigenvector: IterationResult,
    page_rank: IterationResult,
    closeness: Vec<f64>,
}

fn assemble(graph: &SocialGraph, adjacency: &Adjacency, measures: Measures) -> CentralityReport {
    let n = adjacency.len();
    let max_eigen = measures.eigenvector.values.iter().copied().fold(0.0, f64::max);

    let scores = (0..n)
        .filter_map(|v| {
            let user_id = graph.user_id(NodeIndex::new(v))?.to_string();
            let relative_eigen = if max_eigen > 0.0 {
                measures.eigenvector.values[v] / max_eigen
            } else {
                0.0
            };
            let role = classify(
                adjacency.degree(v),
                n,
                measures.degree[v],
                measures.betweenness[v],
                relative_eigen,
                measures.page_rank.values[v],
            );
            Some(CentralityScores {
                user_id,
                degree: measures.degree[v],
                betweenness: measures.betweenness[v],
                eigenvector: measures.eigenvector.values[v],
                page_rank: measures.page_rank.values[v],
                closeness: measures.closeness[v],
                role,
            })
        })
        .collect();

    CentralityReport {
        scores,
        page_rank_iterations: measures.page_rank.iterations,
        page_rank_converged: measures.page_rank.converged,
        eigenvector_iterations: measures.eigenvector.iterations,
        eigenvector_converged: measures.eigenvector.converged,
        betweenness_exact: measures.betweenness_exact,
    }
}

fn classify(
    raw_degree: usize,
    n: usize,
    degree: f64,
    betweenness: f64,
    relative_eigen: f64,
    page_rank: f64,
) -> NetworkRole {
    if raw_degree == 0 {
        NetworkRole::Isolated
    } else if betweenness >= 0.25 {
        NetworkRole::Broker
    } else if degree >= 0.5 && relative_eigen >= 0.7 {
        NetworkRole::Hub
    } else if page_rank >= 1.5 / n as f64 {
        NetworkRole::Influencer
    } else if betweenness > 0.0 {
        NetworkRole::Connector
    } else {
        NetworkRole::Peripheral
    }
}

/// Single-source Brandes stage: BFS with path counting, then dependency
/// accumulation in reverse BFS order
fn accumulate_dependencies(adjacency: &Adjacency, source: usize, centrality: &mut [f64]) {
    let n = adjacency.len();
    let mut stack = Vec::with_capacity(n);
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut distance: Vec<i64> = vec![-1; n];
    let mut queue = VecDeque::new();

    sigma[source] = 1.0;
    distance[source] = 0;
    queue.push_back(source);

    while let Some(v) = queue.pop_front() {
        stack.push(v);
        for &(w, _) in &adjacency.neighbors[v] {
            if distance[w] < 0 {
                distance[w] = distance[v] + 1;
                queue.push_back(w);
            }
            if distance[w] == distance[v] + 1 {
                sigma[w] += sigma[v];
                predecessors[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    while let Some(w) = stack.pop() {
        for &v in &predecessors[w] {
            delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
        }
        if w != source {
            centrality[w] += delta[w];
        }
    }
}

/// Undirected pairs are counted from both ends, hence the halving
fn normalize_betweenness(centrality: &mut [f64], scale: f64) {
    let n = centrality.len();
    let pairs = if n > 2 {
        ((n - 1) * (n - 2)) as f64 / 2.0
    } else {
        0.0
    };
    for value in centrality.iter_mut() {
        *value = if pairs > 0.0 {
            (*value * scale / 2.0) / pairs
        } else {
            0.0
        };
    }
}

fn max_delta(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WeightedEdge;

    fn star(leaves: usize) -> SocialGraph {
        SocialGraph::from_edges(
            (0..leaves).map(|i| WeightedEdge::new("hub", format!("leaf{i}"), 0.8, 0.8)),
        )
    }

    fn path(n: usize) -> SocialGraph {
        SocialGraph::from_edges(
            (0..n - 1).map(|i| WeightedEdge::new(format!("p{i}"), format!("p{}", i + 1), 0.5, 0.5)),
        )
    }

    #[test]
    fn test_star_center_has_max_betweenness() {
        let graph = star(5);
        let report = CentralityEngine::default().compute(&graph);

        let hub = report.get("hub").unwrap();
        assert!((hub.betweenness - 1.0).abs() < 1e-9);
        assert_eq!(hub.role, NetworkRole::Broker);
        for score in &report.scores {
            assert!(score.betweenness <= hub.betweenness);
            assert!(score.betweenness >= 0.0);
        }
        assert!((hub.degree - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_path_betweenness() {
        // p0 - p1 - p2: p1 is on the only p0-p2 path
        let graph = path(3);
        let report = CentralityEngine::default().compute(&graph);

        assert!((report.get("p1").unwrap().betweenness - 1.0).abs() < 1e-9);
        assert_eq!(report.get("p0").unwrap().betweenness, 0.0);
    }

    #[test]
    fn test_page_rank_sums_to_one() {
        let mut graph = star(4);
        graph.add_user("loner");
        let report = CentralityEngine::default().compute(&graph);

        let total: f64 = report.scores.iter().map(|s| s.page_rank).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(report.page_rank_converged);
        assert!(report.page_rank_iterations <= 100);
        assert_eq!(report.get("loner").unwrap().role, NetworkRole::Isolated);
    }

    #[test]
    fn test_eigenvector_converges_on_bipartite_graph() {
        let graph = star(3);
        let engine = CentralityEngine::default();
        let result = engine.eigenvector(&graph.adjacency());

        assert!(result.converged);
        let norm: f64 = result.values.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
        let hub = graph.index_of("hub").unwrap().index();
        assert!(result.values.iter().all(|&x| x <= result.values[hub] + 1e-12));
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let engine = CentralityEngine::new(CentralityConfig {
            max_iterations: 1,
            tolerance: 1e-12,
            ..CentralityConfig::default()
        });
        let result = engine.page_rank(&path(5).adjacency());

        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
        let total: f64 = result.values.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_closeness_on_disconnected_graph() {
        let mut graph = path(3);
        graph.add_user("loner");
        let engine = CentralityEngine::default();
        let closeness = engine.closeness(&graph.adjacency());

        let middle = graph.index_of("p1").unwrap().index();
        let loner = graph.index_of("loner").unwrap().index();
        // p1 reaches 2 users at distance 1 out of n - 1 = 3
        assert!((closeness[middle] - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(closeness[loner], 0.0);
    }

    #[test]
    fn test_sampled_betweenness_with_full_sample_is_exact() {
        let graph = star(4);
        let adjacency = graph.adjacency();
        let engine = CentralityEngine::default();

        let exact = engine.betweenness_exact(&adjacency);
        let sampled = engine.betweenness_sampled(&adjacency, adjacency.len(), Some(3));
        for (a, b) in exact.iter().zip(&sampled) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_and_single_vertex() {
        let engine = CentralityEngine::default();
        let report = engine.compute(&SocialGraph::new());
        assert!(report.scores.is_empty());

        let mut single = SocialGraph::new();
        single.add_user("solo");
        let report = engine.compute(&single);
        let solo = report.get("solo").unwrap();
        assert_eq!(solo.role, NetworkRole::Isolated);
        assert!((solo.page_rank - 1.0).abs() < 1e-9);
        assert_eq!(solo.betweenness, 0.0);
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let graph = Arc::new(path(6));
        let engine = CentralityEngine::default();

        let sequential = engine.compute(&graph);
        let concurrent = engine.compute_concurrent(graph.clone()).await.unwrap();
        assert_eq!(sequential.scores, concurrent.scores);
    }
}
