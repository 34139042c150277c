//! Greedy modularity community detection
//!
//! Local-moving phase of Louvain over the weighted snapshot (`strength ×
//! trust`). Every vertex starts alone; on each pass the vertices are visited
//! in a shuffled order and moved to the neighboring community with the best
//! modularity gain
//!
//! ```text
//! ΔQ = k_i,in / m − Σ_tot · k_i / (2m²)
//! ```
//!
//! where `k_i,in` is the weight between the vertex and the community. A
//! vertex only belongs to a community while its gain exceeds
//! `min_modularity_gain`; otherwise it is moved back out on its own.

use std::collections::{BTreeMap, HashMap};

use petgraph::graph::NodeIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::CommunityConfig;
use crate::engine::{MetricsCollector, Timer};
use crate::graph::{Adjacency, SocialGraph};

/// A community surviving the minimum-size filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: usize,
    /// Sorted member ids
    pub members: Vec<String>,
    /// Internal connections over possible member pairs
    pub density: f64,
    /// `internal-edge-fraction − degree-fraction²`
    pub modularity: f64,
    /// Top members by internal degree
    pub central_members: Vec<String>,
    /// Members with at least one connection leaving the community
    pub bridge_members: Vec<String>,
}

impl Community {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(user_id)).is_ok()
    }
}

/// A user whose neighbors span two or more blocks of the final partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeUser {
    pub user_id: String,
    /// Kept communities among the user's neighbors (and the user's own)
    pub communities: Vec<usize>,
    /// Distinct blocks spanned by the neighbors, isolated users counting as
    /// their own block
    pub blocks_spanned: usize,
    /// Weight leaving the user's own block over the user's total weight
    pub strength: f64,
}

/// Partition of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityReport {
    pub communities: Vec<Community>,
    /// Sum of the kept communities' contributions
    pub overall_modularity: f64,
    /// Users that ended up in no kept community, sorted. A lone vertex is
    /// never a community, whatever the minimum size
    pub isolated_users: Vec<String>,
    pub bridges: Vec<BridgeUser>,
    /// Local-moving passes performed
    pub iterations: usize,
    /// False when the pass cap was hit while vertices were still moving
    pub converged: bool,
}

impl CommunityReport {
    /// Community containing a user
    pub fn community_of(&self, user_id: &str) -> Option<&Community> {
        self.communities.iter().find(|c| c.contains(user_id))
    }

    /// Whether a user was flagged as a bridge
    pub fn is_bridge(&self, user_id: &str) -> bool {
        self.bridges.iter().any(|b| b.user_id == user_id)
    }
}

/// Modularity contribution of one vertex set: `L_c / m − (d_c / 2m)²`
pub fn community_contribution(adjacency: &Adjacency, labels: &[usize], label: usize) -> f64 {
    let m = adjacency.total_weight;
    if m <= 0.0 {
        return 0.0;
    }
    let mut internal = 0.0;
    let mut degree = 0.0;
    for v in (0..adjacency.len()).filter(|&v| labels[v] == label) {
        degree += adjacency.weighted_degree[v];
        internal += adjacency.neighbors[v]
            .iter()
            .filter(|(w, _)| labels[*w] == label)
            .map(|(_, weight)| weight)
            .sum::<f64>();
    }
    // every internal edge was seen from both ends
    internal /= 2.0;
    internal / m - (degree / (2.0 * m)).powi(2)
}

/// Modularity of a full labelling
pub fn modularity(adjacency: &Adjacency, labels: &[usize]) -> f64 {
    let mut distinct: Vec<usize> = labels.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    distinct
        .into_iter()
        .map(|label| community_contribution(adjacency, labels, label))
        .sum()
}

/// Detects communities, bridges and isolated users
#[derive(Debug, Clone)]
pub struct CommunityDetector {
    config: CommunityConfig,
    metrics: MetricsCollector,
}

impl Default for CommunityDetector {
    fn default() -> Self {
        Self::new(CommunityConfig::default())
    }
}

impl CommunityDetector {
    /// Create a new detector
    pub fn new(config: CommunityConfig) -> Self {
        Self {
            config,
            metrics: MetricsCollector::new("community"),
        }
    }

    /// Partition with the configured seed (entropy when unset)
    pub fn detect(&self, graph: &SocialGraph, min_size: usize) -> CommunityReport {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.detect_with_rng(graph, min_size, &mut rng)
    }

    /// Partition using the given random source for the visitation order
    #[instrument(skip(self, graph, rng), fields(users = graph.node_count()))]
    pub fn detect_with_rng<R: Rng + ?Sized>(
        &self,
        graph: &SocialGraph,
        min_size: usize,
        rng: &mut R,
    ) -> CommunityReport {
        if graph.is_empty() {
            return CommunityReport {
                converged: true,
                ..CommunityReport::default()
            };
        }

        let timer = Timer::start();
        let adjacency = graph.adjacency();
        let (labels, iterations, converged) = self.local_moving(&adjacency, rng);
        let report = self.summarize(graph, &adjacency, &labels, min_size.max(1), iterations, converged);

        self.metrics.record_analytics("community", timer.elapsed_secs());
        if !converged {
            self.metrics.record_non_convergence("community");
        }
        debug!(
            communities = report.communities.len(),
            isolated = report.isolated_users.len(),
            modularity = report.overall_modularity,
            "community detection finished"
        );
        report
    }

    fn local_moving<R: Rng + ?Sized>(&self, adjacency: &Adjacency, rng: &mut R) -> (Vec<usize>, usize, bool) {
        let n = adjacency.len();
        let mut labels: Vec<usize> = (0..n).collect();
        let m = adjacency.total_weight;
        if m <= 0.0 {
            return (labels, 0, true);
        }

        let degree = &adjacency.weighted_degree;
        let mut sigma_tot = degree.clone();
        let mut sizes = vec![1usize; n];
        let mut order: Vec<usize> = (0..n).collect();
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;
            order.shuffle(rng);
            let mut moved = false;

            for &node in &order {
                let current = labels[node];
                let k_i = degree[node];
                sigma_tot[current] -= k_i;
                sizes[current] -= 1;

                // BTreeMap keeps ties resolved by label, independent of hashing
                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(neighbor, weight) in &adjacency.neighbors[node] {
                    *links.entry(labels[neighbor]).or_insert(0.0) += weight;
                }

                let mut best: Option<usize> = None;
                let mut best_gain = self.config.min_modularity_gain;
                for (&label, &k_in) in &links {
                    let gain = k_in / m - sigma_tot[label] * k_i / (2.0 * m * m);
                    if gain > best_gain {
                        best_gain = gain;
                        best = Some(label);
                    }
                }

                let target = match best {
                    Some(label) => label,
                    None if sizes[current] == 0 => current,
                    None => free_label(&sizes, node),
                };

                labels[node] = target;
                sigma_tot[target] += k_i;
                sizes[target] += 1;
                if target != current {
                    moved = true;
                }
            }

            if !moved {
                converged = true;
                break;
            }
        }

        (labels, iterations, converged)
    }

    fn summarize(
        &self,
        graph: &SocialGraph,
        adjacency: &Adjacency,
        labels: &[usize],
        min_size: usize,
        iterations: usize,
        converged: bool,
    ) -> CommunityReport {
        let n = adjacency.len();
        let id_of = |v: usize| graph.user_id(NodeIndex::new(v)).unwrap_or_default().to_string();

        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for (v, &label) in labels.iter().enumerate() {
            groups.entry(label).or_default().push(v);
        }

        let mut kept: Vec<(usize, Vec<usize>)> = groups
            .into_iter()
            .filter(|(_, members)| members.len() >= min_size.max(2))
            .collect();
        // largest first, then by smallest member id, so ids are reproducible
        kept.sort_by(|(_, a), (_, b)| {
            b.len().cmp(&a.len()).then_with(|| {
                let first = |m: &Vec<usize>| m.iter().map(|&v| id_of(v)).min();
                first(a).cmp(&first(b))
            })
        });

        // Final block of every vertex: kept community id, or None when isolated
        let mut block: Vec<Option<usize>> = vec![None; n];
        for (id, (_, members)) in kept.iter().enumerate() {
            for &v in members {
                block[v] = Some(id);
            }
        }

        let communities: Vec<Community> = kept
            .iter()
            .enumerate()
            .map(|(id, (label, members))| self.describe(adjacency, labels, *label, id, members, &block, &id_of))
            .collect();
        let overall_modularity = communities.iter().map(|c| c.modularity).sum();

        let mut isolated_users: Vec<String> = (0..n).filter(|&v| block[v].is_none()).map(id_of).collect();
        isolated_users.sort();

        let mut bridges: Vec<BridgeUser> = (0..n)
            .filter_map(|v| bridge_of(adjacency, &block, v).map(|mut b| {
                b.user_id = id_of(v);
                b
            }))
            .collect();
        bridges.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        CommunityReport {
            communities,
            overall_modularity,
            isolated_users,
            bridges,
            iterations,
            converged,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn describe(
        &self,
        adjacency: &Adjacency,
        labels: &[usize],
        label: usize,
        id: usize,
        members: &[usize],
        block: &[Option<usize>],
        id_of: &dyn Fn(usize) -> String,
    ) -> Community {
        let size = members.len();
        let mut internal_edges = 0usize;
        let mut internal_degree: Vec<(String, usize)> = Vec::with_capacity(size);
        let mut bridge_members = Vec::new();

        for &v in members {
            let inside = adjacency.neighbors[v]
                .iter()
                .filter(|(w, _)| block[*w] == Some(id))
                .count();
            internal_edges += inside;
            internal_degree.push((id_of(v), inside));
            if inside < adjacency.degree(v) {
                bridge_members.push(id_of(v));
            }
        }
        internal_edges /= 2;

        let pairs = size * size.saturating_sub(1) / 2;
        let density = if pairs > 0 {
            internal_edges as f64 / pairs as f64
        } else {
            0.0
        };

        internal_degree.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let central_members = internal_degree
            .into_iter()
            .take(self.config.top_k)
            .map(|(user, _)| user)
            .collect();

        let mut members: Vec<String> = members.iter().map(|&v| id_of(v)).collect();
        members.sort();
        bridge_members.sort();

        Community {
            id,
            members,
            density,
            modularity: community_contribution(adjacency, labels, label),
            central_members,
            bridge_members,
        }
    }
}

/// Any label currently holding no vertex; there are `n` labels for `n`
/// vertices and the moving vertex has been taken out, so one always exists
fn free_label(sizes: &[usize], preferred: usize) -> usize {
    if sizes[preferred] == 0 {
        return preferred;
    }
    sizes.iter().position(|&s| s == 0).unwrap_or(preferred)
}

fn bridge_of(adjacency: &Adjacency, block: &[Option<usize>], v: usize) -> Option<BridgeUser> {
    // isolated users are their own singleton block, keyed past the community ids
    let key = |w: usize| block[w].unwrap_or(usize::MAX / 2 + w);
    let own = key(v);

    let mut spanned: Vec<usize> = adjacency.neighbors[v].iter().map(|(w, _)| key(*w)).collect();
    spanned.sort_unstable();
    spanned.dedup();
    if spanned.len() < 2 {
        return None;
    }

    let total = adjacency.weighted_degree[v];
    let cross: f64 = adjacency.neighbors[v]
        .iter()
        .filter(|(w, _)| key(*w) != own)
        .map(|(_, weight)| weight)
        .sum();

    let mut communities: Vec<usize> = adjacency.neighbors[v]
        .iter()
        .filter_map(|(w, _)| block[*w])
        .chain(block[v])
        .collect();
    communities.sort_unstable();
    communities.dedup();

    Some(BridgeUser {
        user_id: String::new(),
        communities,
        blocks_spanned: spanned.len(),
        strength: if total > 0.0 { cross / total } else { 0.0 },
    })
}
