//! Fusion of all signals into one explainable match score

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::agents::profile::UserProfile;
use crate::analytics::serendipity::{bridge_value, composite_score};
use crate::analytics::{CentralityReport, CommunityReport, NetworkAnalyzer, PathFinder, SerendipityScorer};
use crate::engine::MetricsCollector;
use crate::graph::SocialGraph;
use crate::matching::features::{
    community_score, distance_score, FeatureGroup, FeatureGroupStatus, MatchCategory, MatchFeatures,
    ProfileAlignment, FEATURE_NAMES,
};
use crate::providers::{ProviderError, ProviderResult, TrustEstimate};

/// One ranked contribution to the score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReason {
    pub group: FeatureGroup,
    /// Points contributed to the 0–100 score
    pub contribution: f64,
    pub explanation: String,
}

/// Explainable score of an ordered pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub user_id: String,
    pub target_id: String,
    /// In `[0, 100]`
    pub score: f64,
    /// In `[0, 1]`
    pub confidence: f64,
    pub category: MatchCategory,
    /// Largest contribution first
    pub reasons: Vec<MatchReason>,
    pub warnings: Vec<String>,
    pub features: MatchFeatures,
    /// `features` flattened in [`FEATURE_NAMES`] order
    pub feature_vector: Vec<f64>,
    pub group_status: Vec<(FeatureGroup, FeatureGroupStatus)>,
}

impl MatchScore {
    /// Feature vector keyed by name
    pub fn named_features(&self) -> HashMap<&'static str, f64> {
        FEATURE_NAMES.iter().copied().zip(self.feature_vector.iter().copied()).collect()
    }

    pub fn degraded_groups(&self) -> Vec<FeatureGroup> {
        self.group_status
            .iter()
            .filter(|(_, status)| status.is_degraded())
            .map(|(group, _)| *group)
            .collect()
    }
}

/// Raw material gathered concurrently before the groups are evaluated
struct Signals {
    graph: Arc<SocialGraph>,
    profiles: ProviderResult<(Option<UserProfile>, Option<UserProfile>)>,
    trust: ProviderResult<TrustEstimate>,
    communities: Result<CommunityReport, String>,
    centrality: Result<CentralityReport, String>,
}

/// Combines network, trust, serendipity, community, profile, strategic and
/// completeness signals into a [`MatchScore`].
///
/// Every upstream failure is caught per group and replaced by that group's
/// defaults (all zeros), so callers always get a complete result.
pub struct MatchQualitySynthesizer {
    analyzer: Arc<NetworkAnalyzer>,
    metrics: MetricsCollector,
}

impl MatchQualitySynthesizer {
    /// Create a new synthesizer
    pub fn new(analyzer: Arc<NetworkAnalyzer>) -> Self {
        Self {
            analyzer,
            metrics: MetricsCollector::new("synthesizer"),
        }
    }

    pub fn analyzer(&self) -> &Arc<NetworkAnalyzer> {
        &self.analyzer
    }

    /// Score `target_id` as a match for `user_id`
    #[instrument(skip(self))]
    pub async fn score_match(&self, user_id: &str, target_id: &str) -> MatchScore {
        let signals = self.gather(user_id, target_id).await;
        let score = self.synthesize(user_id, target_id, &signals);

        self.metrics.record_match_score(score.category.label(), score.score);
        for group in score.degraded_groups() {
            self.metrics.record_degraded_feature(group.label());
        }
        debug!(
            score = score.score,
            confidence = score.confidence,
            category = score.category.label(),
            "scored match"
        );
        score
    }

    /// Score several targets for one user, best first
    pub async fn score_matches(&self, user_id: &str, targets: &[String]) -> Vec<MatchScore> {
        let mut scores = join_all(targets.iter().map(|t| self.score_match(user_id, t))).await;
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scores
    }

    async fn gather(&self, user_id: &str, target_id: &str) -> Signals {
        let graph = Arc::new(
            self.analyzer
                .ego_snapshot(&[user_id.to_string(), target_id.to_string()])
                .await,
        );

        let profiles = async {
            let provider = self.analyzer.profile_provider();
            let (user, target) = tokio::join!(provider.profile(user_id), provider.profile(target_id));
            Ok::<_, ProviderError>((user?, target?))
        };
        let estimator = self.analyzer.trust_estimator();
        let trust = estimator.estimate(user_id, target_id);
        let communities = {
            let graph = graph.clone();
            let detector = self.analyzer.community_detector().clone();
            let min_size = self.analyzer.config().community.min_size;
            async move {
                tokio::task::spawn_blocking(move || detector.detect(&graph, min_size))
                    .await
                    .map_err(|e| e.to_string())
            }
        };
        let centrality = async {
            self.analyzer
                .centrality_engine()
                .compute_concurrent(graph.clone())
                .await
                .map_err(|e| e.to_string())
        };

        let (profiles, trust, communities, centrality) = tokio::join!(profiles, trust, communities, centrality);
        Signals {
            graph,
            profiles,
            trust,
            communities,
            centrality,
        }
    }

    fn synthesize(&self, user_id: &str, target_id: &str, signals: &Signals) -> MatchScore {
        let mut features = MatchFeatures::default();
        let mut statuses = Vec::with_capacity(FeatureGroup::ALL.len());

        for group in FeatureGroup::ALL {
            if group == FeatureGroup::Meta {
                continue;
            }
            let outcome = match group {
                FeatureGroup::Network => self.network(&mut features, signals, user_id, target_id),
                FeatureGroup::Trust => trust_group(&mut features, signals),
                FeatureGroup::Serendipity => self.serendipity(&mut features, signals, user_id, target_id),
                FeatureGroup::Community => community_group(&mut features, signals, user_id, target_id),
                FeatureGroup::Profile => profile_group(&mut features, signals),
                FeatureGroup::Strategic => strategic_group(&mut features, signals, user_id, target_id),
                FeatureGroup::Meta => Ok(()),
            };
            statuses.push((group, settle(group, outcome)));
        }

        // meta depends on how the other groups fared
        let meta = profile_completeness(signals);
        let healthy = statuses.iter().filter(|(_, s)| !s.is_degraded()).count();
        match meta {
            Ok(completeness) => {
                features.profile_completeness = completeness;
                features.data_completeness =
                    0.5 * (healthy + 1) as f64 / FeatureGroup::ALL.len() as f64 + 0.5 * completeness;
                statuses.push((FeatureGroup::Meta, FeatureGroupStatus::Computed));
            }
            Err(reason) => {
                features.data_completeness = 0.5 * healthy as f64 / FeatureGroup::ALL.len() as f64;
                statuses.push((FeatureGroup::Meta, settle(FeatureGroup::Meta, Err(reason))));
            }
        }

        let mut reasons: Vec<MatchReason> = FeatureGroup::ALL
            .iter()
            .map(|&group| MatchReason {
                group,
                contribution: 100.0 * group.weight() * features.group_score(group),
                explanation: explain(group, &features),
            })
            .filter(|r| r.contribution > 0.0)
            .collect();
        reasons.sort_by(|a, b| {
            b.contribution
                .partial_cmp(&a.contribution)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let score = FeatureGroup::ALL
            .iter()
            .map(|&g| 100.0 * g.weight() * features.group_score(g))
            .sum::<f64>()
            .clamp(0.0, 100.0);
        let confidence = (0.6 * features.data_completeness + 0.4 * features.trust_confidence).clamp(0.0, 1.0);

        let far = features.network_distance.map_or(true, |d| d >= 5);
        let mut category = MatchCategory::from_score(score);
        if far && category > MatchCategory::Good {
            category = MatchCategory::Good;
        }

        let mut warnings = Vec::new();
        match features.network_distance {
            Some(d) if d >= 5 => warnings.push(format!("network distance is {d} hops")),
            None => warnings.push("no network path within the analyzed neighborhood".to_string()),
            _ => {}
        }
        if features.trust_confidence < 0.4 {
            warnings.push(format!("low trust confidence ({:.2})", features.trust_confidence));
        }
        if features.data_completeness < 0.5 {
            warnings.push(format!("incomplete data ({:.2})", features.data_completeness));
        }
        for (group, status) in &statuses {
            if let FeatureGroupStatus::Degraded(reason) = status {
                warnings.push(format!("{} signals unavailable: {}", group.label(), reason));
            }
        }

        MatchScore {
            user_id: user_id.to_string(),
            target_id: target_id.to_string(),
            score,
            confidence,
            category,
            reasons,
            warnings,
            feature_vector: features.to_vector(),
            features,
            group_status: statuses,
        }
    }

    fn network(&self, features: &mut MatchFeatures, signals: &Signals, user_id: &str, target_id: &str) -> Result<(), String> {
        let finder = PathFinder::with_config(&signals.graph, self.analyzer.config().paths.clone());
        features.network_distance = finder.distance(user_id, target_id);
        features.distance_score = distance_score(features.network_distance);
        features.path_quality = finder
            .alternative_paths(user_id, target_id)
            .first()
            .map(|p| p.quality)
            .unwrap_or(0.0);
        features.common_connections = signals.graph.common_neighbors(user_id, target_id).len();
        Ok(())
    }

    fn serendipity(&self, features: &mut MatchFeatures, signals: &Signals, user_id: &str, target_id: &str) -> Result<(), String> {
        let (user, target) = match &signals.profiles {
            Ok((Some(user), Some(target))) => (user, target),
            Ok(_) => return Err("profile missing".to_string()),
            Err(e) => return Err(e.to_string()),
        };
        let communities = signals.communities.as_ref().map_err(Clone::clone)?;
        let different_cluster = match (communities.community_of(user_id), communities.community_of(target_id)) {
            (Some(a), Some(b)) => a.id != b.id,
            _ => true,
        };

        let scorer = SerendipityScorer::new(
            self.analyzer.config().serendipity.clone(),
            self.analyzer.trust_estimator(),
        );
        let indirect = signals.trust.as_ref().map(|t| t.indirect_trust).unwrap_or(0.0);
        let (unexpectedness, _) = scorer.unexpectedness(user, target, different_cluster);
        let potential = scorer.potential_value(user, target, indirect);
        let bridge = bridge_value(signals.graph.common_neighbors(user_id, target_id).len());
        features.serendipity_score = composite_score(unexpectedness, potential, bridge);
        Ok(())
    }
}

fn settle(group: FeatureGroup, outcome: Result<(), String>) -> FeatureGroupStatus {
    match outcome {
        Ok(()) => FeatureGroupStatus::Computed,
        Err(reason) => {
            warn!(group = group.label(), "feature group degraded: {}", reason);
            FeatureGroupStatus::Degraded(reason)
        }
    }
}

fn trust_group(features: &mut MatchFeatures, signals: &Signals) -> Result<(), String> {
    let estimate = signals.trust.as_ref().map_err(|e| e.to_string())?;
    features.direct_trust = estimate.direct_trust.map(|t| t.clamp(0.0, 1.0));
    features.indirect_trust = estimate.indirect_trust.clamp(0.0, 1.0);
    features.trust_confidence = estimate.confidence.clamp(0.0, 1.0);
    Ok(())
}

fn community_group(features: &mut MatchFeatures, signals: &Signals, user_id: &str, target_id: &str) -> Result<(), String> {
    let report = signals.communities.as_ref().map_err(Clone::clone)?;
    let same = match (report.community_of(user_id), report.community_of(target_id)) {
        (Some(a), Some(b)) => a.id == b.id,
        _ => false,
    };
    features.same_community = same;
    features.bridge_involved = report.is_bridge(user_id) || report.is_bridge(target_id);
    features.community_score = community_score(Some(same), features.bridge_involved);
    Ok(())
}

fn profile_group(features: &mut MatchFeatures, signals: &Signals) -> Result<(), String> {
    match &signals.profiles {
        Ok((Some(user), Some(target))) => {
            let alignment = ProfileAlignment::compute(user, target);
            features.industry_match = alignment.industry;
            features.expertise_overlap = alignment.expertise;
            features.needs_alignment = alignment.needs;
            features.geography_match = alignment.geography;
            features.profile_alignment = alignment.score();
            Ok(())
        }
        Ok(_) => Err("profile missing".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn strategic_group(features: &mut MatchFeatures, signals: &Signals, user_id: &str, target_id: &str) -> Result<(), String> {
    let report = signals.centrality.as_ref().map_err(Clone::clone)?;
    let max_rank = report.max_page_rank();
    let normalized = |id: &str| match report.get(id) {
        Some(s) if max_rank > 0.0 => s.page_rank / max_rank,
        _ => 0.0,
    };

    let user_rank = normalized(user_id);
    let target_rank = normalized(target_id);
    features.target_page_rank = target_rank;
    features.target_betweenness = report.get(target_id).map(|s| s.betweenness).unwrap_or(0.0);
    features.centrality_similarity = 1.0 - (user_rank - target_rank).abs();
    features.strategic_value =
        (0.5 * target_rank + 0.3 * features.target_betweenness + 0.2 * features.centrality_similarity).clamp(0.0, 1.0);
    Ok(())
}

fn profile_completeness(signals: &Signals) -> Result<f64, String> {
    let (user, target) = signals.profiles.as_ref().map_err(|e| e.to_string())?;
    let of = |p: &Option<UserProfile>| p.as_ref().map(UserProfile::completeness).unwrap_or(0.0);
    Ok((of(user) + of(target)) / 2.0)
}

fn explain(group: FeatureGroup, features: &MatchFeatures) -> String {
    match group {
        FeatureGroup::Network => match features.network_distance {
            Some(d) => format!(
                "{d} hop(s) apart, best path quality {:.2}, {} common connection(s)",
                features.path_quality, features.common_connections
            ),
            None => "not connected in the analyzed neighborhood".to_string(),
        },
        FeatureGroup::Trust => format!(
            "trust {:.2} at confidence {:.2}",
            features.direct_trust.unwrap_or(features.indirect_trust),
            features.trust_confidence
        ),
        FeatureGroup::Serendipity => format!("serendipity {:.2}", features.serendipity_score),
        FeatureGroup::Community if features.same_community => "members of the same community".to_string(),
        FeatureGroup::Community if features.bridge_involved => "connected through a community bridge".to_string(),
        FeatureGroup::Community => "in different communities".to_string(),
        FeatureGroup::Profile => format!(
            "needs alignment {:.2}, expertise overlap {:.2}, industry {:.2}",
            features.needs_alignment, features.expertise_overlap, features.industry_match
        ),
        FeatureGroup::Strategic => format!(
            "target influence {:.2}, brokerage {:.2}",
            features.target_page_rank, features.target_betweenness
        ),
        FeatureGroup::Meta => format!("data completeness {:.2}", features.data_completeness),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::providers::InMemoryNetwork;

    fn synthesizer(network: InMemoryNetwork) -> MatchQualitySynthesizer {
        let analyzer = NetworkAnalyzer::in_memory(Arc::new(network), BrokerConfig::default());
        MatchQualitySynthesizer::new(Arc::new(analyzer))
    }

    #[tokio::test]
    async fn test_friend_of_friend_with_complementary_profiles() {
        let network = InMemoryNetwork::new();
        network.connect("alice", "bob", 0.9, 0.9);
        network.connect("bob", "carol", 0.9, 0.9);
        network.set_profile(
            UserProfile::builder("alice")
                .industry("fintech")
                .expertise("payments")
                .need_critical("funding")
                .offering("engineering talent")
                .build(),
        );
        network.set_profile(
            UserProfile::builder("carol")
                .industry("fintech")
                .expertise("payments")
                .need_high("engineering talent")
                .offering("seed funding")
                .build(),
        );

        let score = synthesizer(network).score_match("alice", "carol").await;
        assert_eq!(score.features.network_distance, Some(2));
        assert_eq!(score.features.common_connections, 1);
        assert_eq!(score.features.needs_alignment, 1.0);
        assert!(score.score > 40.0);
        assert!(score.degraded_groups().is_empty());
        assert_eq!(score.feature_vector.len(), FEATURE_NAMES.len());
        assert!(score.reasons.windows(2).all(|w| w[0].contribution >= w[1].contribution));
    }

    #[tokio::test]
    async fn test_missing_profiles_degrade() {
        let network = InMemoryNetwork::new();
        network.connect("x", "y", 0.5, 0.5);

        let score = synthesizer(network).score_match("x", "y").await;
        let degraded = score.degraded_groups();
        assert!(degraded.contains(&FeatureGroup::Profile));
        assert!(degraded.contains(&FeatureGroup::Serendipity));
        assert!((0.0..=100.0).contains(&score.score));
        assert!((0.0..=1.0).contains(&score.confidence));
        assert!(score.warnings.iter().any(|w| w.starts_with("profile signals unavailable")));
    }
}
