//! Builder for per-call graph snapshots

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::graph::{SocialGraph, WeightedEdge};
use crate::providers::{NeighborProvider, ProviderError, ProviderResult};

/// Builds [`SocialGraph`] snapshots from a neighbor provider.
///
/// Lookups that fail or exceed the lookup timeout are logged and treated as
/// "no neighbors", so the affected users end up isolated in the snapshot
/// instead of failing the whole build. Malformed records are dropped.
pub struct SnapshotBuilder {
    provider: Arc<dyn NeighborProvider>,
    max_depth: usize,
    max_nodes: usize,
    lookup_timeout: Duration,
}

impl SnapshotBuilder {
    /// Create a new snapshot builder
    pub fn new(provider: Arc<dyn NeighborProvider>) -> Self {
        Self {
            provider,
            max_depth: 2,
            max_nodes: 1_000,
            lookup_timeout: Duration::from_secs(10),
        }
    }

    /// Budget of each provider call
    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Maximum hop depth for [`SnapshotBuilder::expand_from`]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Maximum number of users in an expanded snapshot
    pub fn max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes.max(1);
        self
    }

    /// Snapshot over exactly the given users and the connections among them
    pub async fn induced(&self, users: &[String]) -> SocialGraph {
        let members: HashSet<String> = users.iter().cloned().collect();
        let records = self.fetch(users).await;

        let edges = records
            .into_values()
            .flatten()
            .filter(|edge| members.contains(&edge.target_id) && members.contains(&edge.source_id));

        let mut graph = SocialGraph::from_edges(edges);
        for user in users {
            graph.add_user(user.clone());
        }
        debug!(
            users = graph.node_count(),
            connections = graph.edge_count(),
            "built induced snapshot"
        );
        graph
    }

    /// Snapshot over every user the provider knows
    pub async fn full(&self) -> SocialGraph {
        let listing = tokio::time::timeout(self.lookup_timeout, self.provider.all_users())
            .await
            .unwrap_or_else(|_| Err(self.timed_out()));
        match listing {
            Ok(users) => self.induced(&users).await,
            Err(e) => {
                warn!("user listing failed, using empty snapshot: {}", e);
                SocialGraph::new()
            }
        }
    }

    /// Breadth-first ego network around the seeds, bounded by depth and size
    pub async fn expand_from(&self, seeds: &[String]) -> SocialGraph {
        let mut visited: HashSet<String> = HashSet::new();
        let mut order: Vec<String> = Vec::new();
        let mut frontier: Vec<String> = Vec::new();
        let mut edges: Vec<WeightedEdge> = Vec::new();

        for seed in seeds {
            if visited.len() >= self.max_nodes {
                break;
            }
            if visited.insert(seed.clone()) {
                order.push(seed.clone());
                frontier.push(seed.clone());
            }
        }

        let mut depth = 0;
        while !frontier.is_empty() {
            let records = self.fetch(&frontier).await;
            let mut next = Vec::new();

            for user in &frontier {
                let Some(list) = records.get(user) else {
                    continue;
                };
                for edge in list {
                    if depth < self.max_depth
                        && !visited.contains(&edge.target_id)
                        && visited.len() < self.max_nodes
                    {
                        visited.insert(edge.target_id.clone());
                        order.push(edge.target_id.clone());
                        next.push(edge.target_id.clone());
                    }
                    edges.push(edge.clone());
                }
            }

            if depth >= self.max_depth {
                break;
            }
            depth += 1;
            frontier = next;
        }

        let edges = edges
            .into_iter()
            .filter(|edge| visited.contains(&edge.source_id) && visited.contains(&edge.target_id));
        let mut graph = SocialGraph::from_edges(edges);
        for user in order {
            graph.add_user(user);
        }
        debug!(
            seeds = seeds.len(),
            users = graph.node_count(),
            connections = graph.edge_count(),
            depth = self.max_depth,
            "built ego snapshot"
        );
        graph
    }

    async fn fetch(&self, users: &[String]) -> HashMap<String, Vec<WeightedEdge>> {
        match self.try_fetch(users).await {
            Ok(records) => records,
            Err(e) => {
                warn!(count = users.len(), "neighbor lookup failed, treating users as isolated: {}", e);
                HashMap::new()
            }
        }
    }

    /// Neighbor records of the given users within the lookup timeout,
    /// with malformed records removed
    pub async fn try_fetch(&self, users: &[String]) -> ProviderResult<HashMap<String, Vec<WeightedEdge>>> {
        let mut records = tokio::time::timeout(self.lookup_timeout, self.provider.neighbors_batch(users))
            .await
            .map_err(|_| self.timed_out())??;

        for (owner, list) in records.iter_mut() {
            list.retain(|edge| match check_record(owner, edge) {
                Ok(()) => true,
                Err(e) => {
                    warn!(user = %owner, "dropping record: {}", e);
                    false
                }
            });
        }
        Ok(records)
    }

    fn timed_out(&self) -> ProviderError {
        ProviderError::Timeout(self.lookup_timeout.as_millis() as u64)
    }
}

/// A record must belong to the user it was returned for and point elsewhere
fn check_record(owner: &str, edge: &WeightedEdge) -> ProviderResult<()> {
    if edge.source_id != owner {
        return Err(ProviderError::Malformed(format!(
            "record {} -> {} returned for {owner}",
            edge.source_id, edge.target_id
        )));
    }
    if edge.target_id.is_empty() || edge.target_id == owner {
        return Err(ProviderError::Malformed(format!(
            "record of {owner} has invalid target '{}'",
            edge.target_id
        )));
    }
    Ok(())
}
