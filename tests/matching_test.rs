//! Integration tests for match quality synthesis

use std::sync::Arc;

use async_trait::async_trait;
use netbroker::agents::UserProfile;
use netbroker::analytics::NetworkAnalyzer;
use netbroker::config::BrokerConfig;
use netbroker::matching::{FeatureGroup, MatchCategory, MatchQualitySynthesizer, FEATURE_NAMES};
use netbroker::providers::{InMemoryNetwork, ProviderError, ProviderResult, TrustEstimate, TrustEstimator};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

struct UnavailableTrust;

#[async_trait]
impl TrustEstimator for UnavailableTrust {
    async fn estimate(&self, _from: &str, _to: &str) -> ProviderResult<TrustEstimate> {
        Err(ProviderError::Unavailable("trust service down".to_string()))
    }
}

fn chain(len: usize) -> InMemoryNetwork {
    let network = InMemoryNetwork::new();
    for i in 0..len {
        network.connect(&format!("u{i}"), &format!("u{}", i + 1), 0.9, 0.9);
    }
    network
}

fn synthesizer(network: InMemoryNetwork) -> MatchQualitySynthesizer {
    let analyzer = NetworkAnalyzer::in_memory(Arc::new(network), BrokerConfig::default());
    MatchQualitySynthesizer::new(Arc::new(analyzer))
}

#[tokio::test]
async fn test_distant_candidate_is_warned_and_capped() {
    let network = chain(6);
    network.set_profile(
        UserProfile::builder("u0")
            .industry("energy")
            .location("Oslo")
            .expertise("grid software")
            .need_critical("hardware partner")
            .offering("grid software")
            .build(),
    );
    network.set_profile(
        UserProfile::builder("u6")
            .industry("energy")
            .location("Oslo")
            .expertise("grid software")
            .need_critical("grid software")
            .offering("hardware partner")
            .build(),
    );

    let score = synthesizer(network).score_match("u0", "u6").await;

    assert_eq!(score.features.network_distance, Some(6));
    assert_eq!(score.features.common_connections, 0);
    assert!(score.warnings.iter().any(|w| w == "network distance is 6 hops"));
    assert_ne!(score.category, MatchCategory::Excellent);
}

#[tokio::test]
async fn test_unknown_users_still_get_a_complete_score() {
    let score = synthesizer(InMemoryNetwork::new()).score_match("nobody", "ghost").await;

    assert_eq!(score.features.network_distance, None);
    assert_eq!(score.feature_vector.len(), FEATURE_NAMES.len());
    assert_eq!(score.group_status.len(), FeatureGroup::ALL.len());
    assert_eq!(score.category, MatchCategory::from_score(score.score).min(MatchCategory::Good));
    assert!(score.warnings.iter().any(|w| w.starts_with("no network path")));
}

#[tokio::test]
async fn test_failed_trust_lookup_degrades_only_trust() {
    let network = Arc::new(chain(2));
    network.set_profile(UserProfile::builder("u0").need_critical("design").offering("code").build());
    network.set_profile(UserProfile::builder("u2").need_critical("code").offering("design").build());

    let analyzer = NetworkAnalyzer::new(
        network.clone(),
        network,
        Arc::new(UnavailableTrust),
        BrokerConfig::default(),
    );
    let score = MatchQualitySynthesizer::new(Arc::new(analyzer))
        .score_match("u0", "u2")
        .await;

    assert_eq!(score.degraded_groups(), vec![FeatureGroup::Trust]);
    assert_eq!(score.features.direct_trust, None);
    assert_eq!(score.features.indirect_trust, 0.0);
    assert!(score.warnings.iter().any(|w| w.starts_with("trust signals unavailable")));
    assert_eq!(score.features.needs_alignment, 1.0);
}

#[tokio::test]
async fn test_score_matches_ranks_best_first() {
    let synthesizer = synthesizer(chain(3));
    let targets = vec!["u3".to_string(), "u1".to_string(), "u2".to_string()];
    let scores = synthesizer.score_matches("u0", &targets).await;

    assert_eq!(scores.len(), 3);
    assert!(scores.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(scores.iter().all(|s| s.user_id == "u0"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_scores_stay_in_bounds(
        edges in prop::collection::vec((0usize..8, 0usize..8, 0.05f64..1.0, 0.05f64..1.0), 0..20),
        a in 0usize..8,
        b in 0usize..8,
    ) {
        let network = InMemoryNetwork::new();
        for (x, y, s, t) in edges {
            if x != y {
                network.connect(&format!("n{x}"), &format!("n{y}"), s, t);
            }
        }
        network.set_profile(UserProfile::builder(format!("n{a}")).need_high("advice").offering("capital").build());

        let synthesizer = synthesizer(network);
        let score = tokio_test::block_on(synthesizer.score_match(&format!("n{a}"), &format!("n{b}")));

        prop_assert!((0.0..=100.0).contains(&score.score));
        prop_assert!((0.0..=1.0).contains(&score.confidence));
        prop_assert_eq!(score.feature_vector.len(), FEATURE_NAMES.len());
        prop_assert!(score.reasons.iter().all(|r| r.contribution > 0.0));
    }
}
