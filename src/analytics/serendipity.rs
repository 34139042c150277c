//! Weak-tie and novelty detection
//!
//! Candidates are users outside the focal user's close network (within
//! `close_network_hops`). Each is scored on three axes:
//!
//! | axis | weight |
//! |---|---|
//! | unexpectedness | 0.40 |
//! | potential value | 0.35 |
//! | bridge value | 0.25 |
//!
//! Candidates below `min_score` are dropped.
//!
//! Candidates never share a direct neighbor with the focal user once the
//! close network spans two hops or more, so bridge value counts the
//! candidate's contacts inside the focal user's close network instead.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agents::profile::{complementarity, has_synergy, UserProfile};
use crate::analytics::community::CommunityReport;
use crate::analytics::paths::PathFinder;
use crate::config::SerendipityConfig;
use crate::graph::SocialGraph;
use crate::providers::TrustEstimator;

const W_CLUSTER: f64 = 0.25;
const W_INDUSTRY: f64 = 0.25;
const W_EXPERTISE: f64 = 0.2;
const W_LOCATION: f64 = 0.1;
const W_SYNERGY: f64 = 0.2;

/// A scored serendipitous candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerendipityCandidate {
    pub user_id: String,
    pub score: f64,
    pub unexpectedness: f64,
    pub potential_value: f64,
    pub bridge_value: f64,
    /// Contacts of the candidate inside the focal user's close network
    pub common_connections: usize,
    /// Hop distance in the snapshot, `None` when unreachable
    pub distance: Option<usize>,
    /// One line per indicator that fired
    pub reasons: Vec<String>,
}

/// Everything the scorer reads for one focal user
pub struct SerendipityContext<'a> {
    pub graph: &'a SocialGraph,
    pub communities: &'a CommunityReport,
    pub profiles: &'a HashMap<String, UserProfile>,
}

impl SerendipityContext<'_> {
    fn profile(&self, user_id: &str) -> UserProfile {
        self.profiles
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UserProfile::builder(user_id).build())
    }

    /// Block of a user: its community id, or the user itself when isolated
    fn block(&self, user_id: &str) -> String {
        match self.communities.community_of(user_id) {
            Some(c) => format!("community:{}", c.id),
            None => format!("user:{user_id}"),
        }
    }
}

/// Bridge value by number of common connections: peaks at one or two shared
/// contacts, low when there are none or many
pub fn bridge_value(common_connections: usize) -> f64 {
    match common_connections {
        0 => 0.2,
        1 => 1.0,
        2 => 0.9,
        3..=5 => 0.5,
        _ => 0.2,
    }
}

/// Weighted composite of the three axes
pub fn composite_score(unexpectedness: f64, potential_value: f64, bridge_value: f64) -> f64 {
    0.4 * unexpectedness + 0.35 * potential_value + 0.25 * bridge_value
}

/// Scores weak ties for a focal user
pub struct SerendipityScorer {
    config: SerendipityConfig,
    trust: Arc<dyn TrustEstimator>,
}

impl SerendipityScorer {
    /// Create a new scorer
    pub fn new(config: SerendipityConfig, trust: Arc<dyn TrustEstimator>) -> Self {
        Self { config, trust }
    }

    pub fn config(&self) -> &SerendipityConfig {
        &self.config
    }

    /// Weighted indicator sum with the reasons that fired
    pub fn unexpectedness(
        &self,
        focal: &UserProfile,
        candidate: &UserProfile,
        different_cluster: bool,
    ) -> (f64, Vec<String>) {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        if different_cluster {
            score += W_CLUSTER;
            reasons.push("belongs to a different community".to_string());
        }
        if focal.same_industry(candidate) == Some(false) {
            score += W_INDUSTRY;
            reasons.push(format!(
                "works in {}",
                candidate.industry.as_deref().unwrap_or_default()
            ));
        }
        let novel = focal.novel_expertise(candidate);
        if !novel.is_empty() {
            score += W_EXPERTISE;
            reasons.push(format!("brings new expertise: {}", novel.join(", ")));
        }
        if focal.same_location(candidate) == Some(false) {
            score += W_LOCATION;
            reasons.push(format!(
                "based in {}",
                candidate.location.as_deref().unwrap_or_default()
            ));
        }
        if has_synergy(focal, candidate) {
            score += W_SYNERGY;
            reasons.push("offerings meet unmet needs".to_string());
        }

        (score, reasons)
    }

    /// `0.4·complementarity + 0.3·novel-expertise share + 0.3·indirect trust`
    pub fn potential_value(&self, focal: &UserProfile, candidate: &UserProfile, indirect_trust: f64) -> f64 {
        let novelty = if candidate.expertise.is_empty() {
            0.0
        } else {
            focal.novel_expertise(candidate).len() as f64 / candidate.expertise.len() as f64
        };
        (0.4 * complementarity(focal, candidate) + 0.3 * novelty + 0.3 * indirect_trust.clamp(0.0, 1.0))
            .clamp(0.0, 1.0)
    }

    /// Score one candidate against the focal user's close network; trust
    /// failures count as zero indirect trust
    pub async fn score_candidate(
        &self,
        context: &SerendipityContext<'_>,
        focal_id: &str,
        close: &HashSet<String>,
        candidate_id: &str,
        distance: Option<usize>,
    ) -> SerendipityCandidate {
        let focal = context.profile(focal_id);
        let candidate = context.profile(candidate_id);

        let indirect_trust = match self.trust.estimate(focal_id, candidate_id).await {
            Ok(estimate) => estimate.indirect_trust,
            Err(e) => {
                warn!(focal_id, candidate_id, "trust estimate failed: {}", e);
                0.0
            }
        };

        let different_cluster = context.block(focal_id) != context.block(candidate_id);
        let (unexpectedness, mut reasons) = self.unexpectedness(&focal, &candidate, different_cluster);
        let potential_value = self.potential_value(&focal, &candidate, indirect_trust);
        let common_connections = context
            .graph
            .neighbor_ids(candidate_id)
            .iter()
            .filter(|id| id.as_str() != focal_id && close.contains(*id))
            .count();
        let bridge = bridge_value(common_connections);
        if (1..=2).contains(&common_connections) {
            reasons.push(format!("weak tie through {common_connections} shared contact(s)"));
        }

        SerendipityCandidate {
            user_id: candidate_id.to_string(),
            score: composite_score(unexpectedness, potential_value, bridge),
            unexpectedness,
            potential_value,
            bridge_value: bridge,
            common_connections,
            distance,
            reasons,
        }
    }

    /// Rank everyone outside the close network, plus any `extra` users
    pub async fn find(
        &self,
        context: &SerendipityContext<'_>,
        focal_id: &str,
        extra: &[String],
        limit: usize,
    ) -> Vec<SerendipityCandidate> {
        let finder = PathFinder::new(context.graph);
        let close: HashSet<String> = finder.within_hops(focal_id, self.config.close_network_hops);

        let distances = finder.distances_from(focal_id);
        let distance_of = |id: &str| {
            context
                .graph
                .index_of(id)
                .and_then(|idx| distances.get(idx.index()).copied().flatten())
        };

        let mut pool: Vec<String> = context
            .graph
            .user_ids()
            .into_iter()
            .chain(extra.iter().cloned())
            .filter(|id| id != focal_id && !close.contains(id))
            .collect();
        pool.sort();
        pool.dedup();

        let scored = join_all(
            pool.iter()
                .map(|id| self.score_candidate(context, focal_id, &close, id, distance_of(id))),
        )
        .await;

        let mut candidates: Vec<SerendipityCandidate> = scored
            .into_iter()
            .filter(|c| c.score >= self.config.min_score)
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        candidates.truncate(limit);

        debug!(
            focal_id,
            close = close.len(),
            pool = pool.len(),
            kept = candidates.len(),
            "serendipity search finished"
        );
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::community::CommunityDetector;
    use crate::config::CommunityConfig;
    use crate::graph::WeightedEdge;
    use crate::providers::{InMemoryNetwork, TransitiveTrust};

    #[test]
    fn test_bridge_value_peaks_at_few_common_connections() {
        assert!(bridge_value(1) > bridge_value(0));
        assert!(bridge_value(2) > bridge_value(4));
        assert!(bridge_value(1) > bridge_value(10));
        assert_eq!(bridge_value(1), 1.0);
    }

    #[test]
    fn test_unexpectedness_indicators() {
        let scorer = SerendipityScorer::new(
            SerendipityConfig::default(),
            Arc::new(TransitiveTrust::new(Arc::new(InMemoryNetwork::new()))),
        );
        let focal = UserProfile::builder("f")
            .industry("fintech")
            .location("Berlin")
            .expertise("payments")
            .need_high("design")
            .build();
        let candidate = UserProfile::builder("c")
            .industry("art")
            .location("Lisbon")
            .expertise("illustration")
            .offering("product design")
            .build();

        let (score, reasons) = scorer.unexpectedness(&focal, &candidate, true);
        assert!((score - 1.0).abs() < 1e-12);
        assert_eq!(reasons.len(), 5);

        let (score, _) = scorer.unexpectedness(&focal, &focal, false);
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn test_close_network_is_excluded() {
        // f - a - b - c - d
        let graph = SocialGraph::from_edges(vec![
            WeightedEdge::new("f", "a", 0.5, 0.5),
            WeightedEdge::new("a", "b", 0.5, 0.5),
            WeightedEdge::new("b", "c", 0.5, 0.5),
            WeightedEdge::new("c", "d", 0.5, 0.5),
        ]);
        let network = Arc::new(InMemoryNetwork::new());
        let communities = CommunityDetector::new(CommunityConfig {
            seed: Some(3),
            ..CommunityConfig::default()
        })
        .detect(&graph, 2);

        let mut profiles = HashMap::new();
        profiles.insert(
            "f".to_string(),
            UserProfile::builder("f").industry("fintech").need_high("design").build(),
        );
        for id in ["a", "b", "c", "d"] {
            profiles.insert(
                id.to_string(),
                UserProfile::builder(id)
                    .industry("art")
                    .expertise("illustration")
                    .offering("design")
                    .build(),
            );
        }

        let scorer = SerendipityScorer::new(
            SerendipityConfig {
                min_score: 0.0,
                ..SerendipityConfig::default()
            },
            Arc::new(TransitiveTrust::new(network)),
        );
        let context = SerendipityContext {
            graph: &graph,
            communities: &communities,
            profiles: &profiles,
        };
        let found = scorer.find(&context, "f", &["zed".to_string()], 10).await;

        let ids: Vec<&str> = found.iter().map(|c| c.user_id.as_str()).collect();
        assert!(!ids.contains(&"a"));
        assert!(!ids.contains(&"b"));
        assert!(ids.contains(&"c"));
        assert!(ids.contains(&"zed"));
        let c = found.iter().find(|c| c.user_id == "c").unwrap();
        assert_eq!(c.distance, Some(3));
        // c touches the close network through b only
        assert_eq!(c.common_connections, 1);
        assert_eq!(c.bridge_value, 1.0);
        assert!(c.reasons.iter().any(|r| r.starts_with("weak tie through 1")));

        let d = found.iter().find(|c| c.user_id == "d").unwrap();
        assert_eq!(d.common_connections, 0);
        assert_eq!(d.bridge_value, bridge_value(0));
        assert!(found.iter().all(|c| (0.0..=1.0).contains(&c.score)));
    }
}
