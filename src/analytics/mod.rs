//! Graph analytics over per-call snapshots
//!
//! The algorithms themselves ([`CentralityEngine`], [`CommunityDetector`],
//! [`PathFinder`], [`SerendipityScorer`]) are pure functions of an immutable
//! [`SocialGraph`]. [`NetworkAnalyzer`] is the service face: it builds the
//! snapshot from the providers, runs the algorithms and hands back owned
//! results. Nothing is cached between calls.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, instrument, warn};

use crate::agents::UserProfile;
use crate::config::BrokerConfig;
use crate::graph::{SnapshotBuilder, SocialGraph};
use crate::providers::{InMemoryNetwork, NeighborProvider, ProfileProvider, TransitiveTrust, TrustEstimator};
use crate::Result;

pub mod centrality;
pub mod community;
pub mod paths;
pub mod serendipity;

pub use centrality::{CentralityEngine, CentralityReport, CentralityScores, IterationResult, NetworkRole};
pub use community::{modularity, BridgeUser, Community, CommunityDetector, CommunityReport};
pub use paths::{path_quality, NetworkPath, NetworkStats, PathFinder, PathHop};
pub use serendipity::{SerendipityCandidate, SerendipityContext, SerendipityScorer};

/// Runs the analytics over snapshots built from the providers
pub struct NetworkAnalyzer {
    neighbors: Arc<dyn NeighborProvider>,
    profiles: Arc<dyn ProfileProvider>,
    trust: Arc<dyn TrustEstimator>,
    config: BrokerConfig,
    centrality: CentralityEngine,
    communities: CommunityDetector,
}

impl NetworkAnalyzer {
    /// Create a new analyzer
    pub fn new(
        neighbors: Arc<dyn NeighborProvider>,
        profiles: Arc<dyn ProfileProvider>,
        trust: Arc<dyn TrustEstimator>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            centrality: CentralityEngine::new(config.centrality.clone()),
            communities: CommunityDetector::new(config.community.clone()),
            neighbors,
            profiles,
            trust,
            config,
        }
    }

    /// Analyzer over an in-memory network with transitive trust
    pub fn in_memory(network: Arc<InMemoryNetwork>, config: BrokerConfig) -> Self {
        let trust = Arc::new(TransitiveTrust::new(network.clone()));
        Self::new(network.clone(), network, trust, config)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn neighbor_provider(&self) -> Arc<dyn NeighborProvider> {
        self.neighbors.clone()
    }

    pub fn profile_provider(&self) -> Arc<dyn ProfileProvider> {
        self.profiles.clone()
    }

    pub fn trust_estimator(&self) -> Arc<dyn TrustEstimator> {
        self.trust.clone()
    }

    pub fn centrality_engine(&self) -> &CentralityEngine {
        &self.centrality
    }

    pub fn community_detector(&self) -> &CommunityDetector {
        &self.communities
    }

    /// Snapshot builder over the neighbor provider
    pub fn snapshot_builder(&self) -> SnapshotBuilder {
        SnapshotBuilder::new(self.neighbors.clone()).lookup_timeout(self.config.providers.lookup_timeout)
    }

    /// Per-user centrality. An empty slice means every known user; users
    /// unknown to the provider are reported as isolated.
    #[instrument(skip(self, users), fields(requested = users.len()))]
    pub async fn compute_centrality(&self, users: &[String]) -> Result<CentralityReport> {
        let mut graph = self.snapshot_builder().full().await;
        for user in users {
            graph.add_user(user.clone());
        }

        let mut report = self.centrality.compute_concurrent(Arc::new(graph)).await?;
        if !users.is_empty() {
            report.retain_users(users);
        }
        if !report.page_rank_converged || !report.eigenvector_converged {
            warn!(
                page_rank_iterations = report.page_rank_iterations,
                eigenvector_iterations = report.eigenvector_iterations,
                "centrality returned without converging"
            );
        }
        Ok(report)
    }

    /// Partition of the whole network
    #[instrument(skip(self))]
    pub async fn detect_communities(&self, min_size: usize) -> Result<CommunityReport> {
        let graph = self.snapshot_builder().full().await;
        let detector = self.communities.clone();
        let report = tokio::task::spawn_blocking(move || detector.detect(&graph, min_size)).await?;
        info!(
            communities = report.communities.len(),
            modularity = report.overall_modularity,
            "detected communities"
        );
        Ok(report)
    }

    /// Weak-tie candidates for a user, best first
    #[instrument(skip(self))]
    pub async fn find_serendipitous_matches(&self, user_id: &str, limit: usize) -> Result<Vec<SerendipityCandidate>> {
        let settings = &self.config.serendipity;
        let graph = self
            .snapshot_builder()
            .max_depth(settings.candidate_hops)
            .expand_from(&[user_id.to_string()])
            .await;

        let extra = match self.neighbors.sample_users(settings.random_sample, settings.seed).await {
            Ok(users) => users,
            Err(e) => {
                warn!("user sampling failed, skipping random candidates: {}", e);
                Vec::new()
            }
        };

        let mut wanted = graph.user_ids();
        wanted.extend(extra.iter().cloned());
        wanted.push(user_id.to_string());
        let profiles = self.fetch_profiles(&wanted).await;

        let detector = self.communities.clone();
        let min_size = self.config.community.min_size;
        let graph = Arc::new(graph);
        let communities = {
            let graph = graph.clone();
            tokio::task::spawn_blocking(move || detector.detect(&graph, min_size)).await?
        };

        let scorer = SerendipityScorer::new(settings.clone(), self.trust.clone());
        let context = SerendipityContext {
            graph: &graph,
            communities: &communities,
            profiles: &profiles,
        };
        Ok(scorer.find(&context, user_id, &extra, limit).await)
    }

    /// Structural statistics of the whole network
    pub async fn network_stats(&self) -> NetworkStats {
        let graph = self.snapshot_builder().full().await;
        PathFinder::with_config(&graph, self.config.paths.clone()).network_stats()
    }

    /// Shortest path and ranked alternatives between two users
    pub async fn paths_between(&self, from: &str, to: &str) -> (Option<NetworkPath>, Vec<NetworkPath>) {
        let graph = self
            .snapshot_builder()
            .max_depth(self.config.paths.max_path_length.div_ceil(2))
            .expand_from(&[from.to_string(), to.to_string()])
            .await;
        let finder = PathFinder::with_config(&graph, self.config.paths.clone());
        (finder.shortest_path(from, to), finder.alternative_paths(from, to))
    }

    /// Ego network around the given users, bounded by the synthesizer settings
    pub async fn ego_snapshot(&self, users: &[String]) -> SocialGraph {
        self.snapshot_builder()
            .max_depth(self.config.synthesizer.ego_depth)
            .max_nodes(self.config.synthesizer.max_snapshot_nodes)
            .expand_from(users)
            .await
    }

    /// Profiles of the given users; missing or failed lookups are skipped
    pub async fn fetch_profiles(&self, users: &[String]) -> HashMap<String, UserProfile> {
        let lookups = join_all(users.iter().map(|user| async move {
            (user.clone(), self.profiles.profile(user).await)
        }))
        .await;

        let mut profiles = HashMap::with_capacity(lookups.len());
        for (user, lookup) in lookups {
            match lookup {
                Ok(Some(profile)) => {
                    profiles.insert(user, profile);
                }
                Ok(None) => {}
                Err(e) => warn!(user = %user, "profile lookup failed: {}", e),
            }
        }
        profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> Arc<InMemoryNetwork> {
        let network = Arc::new(InMemoryNetwork::new());
        network.connect("hub", "a", 0.8, 0.8);
        network.connect("hub", "b", 0.8, 0.8);
        network.connect("hub", "c", 0.8, 0.8);
        network.add_user("loner");
        network
    }

    #[tokio::test]
    async fn test_compute_centrality_for_requested_users() {
        let analyzer = NetworkAnalyzer::in_memory(network(), BrokerConfig::default());
        let report = analyzer
            .compute_centrality(&["hub".to_string(), "ghost".to_string()])
            .await
            .unwrap();

        assert_eq!(report.scores.len(), 2);
        assert_eq!(report.get("hub").unwrap().role, NetworkRole::Broker);
        assert_eq!(report.get("ghost").unwrap().role, NetworkRole::Isolated);
    }

    #[tokio::test]
    async fn test_network_stats() {
        let analyzer = NetworkAnalyzer::in_memory(network(), BrokerConfig::default());
        let stats = analyzer.network_stats().await;
        assert_eq!(stats.users, 5);
        assert_eq!(stats.connections, 3);
        assert_eq!(stats.components, 2);
    }
}
