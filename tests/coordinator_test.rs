//! Integration tests for multi-agent coordination

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netbroker::agents::{DomainMatcher, MatchPotential, MultiAgentCoordinator, Negotiator, UserProfile};
use netbroker::config::BrokerConfig;
use pretty_assertions::assert_eq;

/// Reports a domain tag no matcher is registered under
struct Misconfigured;

#[async_trait]
impl DomainMatcher for Misconfigured {
    fn domain(&self) -> &str {
        "misconfigured"
    }

    async fn calculate_match_score(&self, a: &UserProfile, b: &UserProfile) -> f64 {
        self.identify_match_potential(a, b).await.score
    }

    async fn identify_match_potential(&self, _a: &UserProfile, b: &UserProfile) -> MatchPotential {
        MatchPotential {
            domain: "retired_domain".to_string(),
            score: if b.user_id == "ghosted" { 1.0 } else { 0.0 },
            ..MatchPotential::default()
        }
    }
}

fn config() -> BrokerConfig {
    let mut config = BrokerConfig::default();
    config.coordinator.pacing_delay = Duration::from_millis(1);
    config.coordinator.max_concurrency = 2;
    config
}

fn founder() -> UserProfile {
    UserProfile::builder("founder")
        .industry("fintech")
        .location("Berlin")
        .need_critical("funding")
        .offering("engineering talent")
        .goal("launch in Europe")
        .build()
}

fn investor() -> UserProfile {
    UserProfile::builder("investor")
        .industry("fintech")
        .location("Berlin")
        .need_high("engineering talent")
        .offering("seed funding")
        .goal("launch in Europe")
        .build()
}

fn poet() -> UserProfile {
    UserProfile::builder("poet").location("Lima").offering("sonnets").build()
}

#[tokio::test]
async fn test_candidates_keep_best_domain_per_pair() {
    let coordinator = MultiAgentCoordinator::with_default_matchers(config());
    coordinator.register_user("founder", founder()).unwrap();
    coordinator.register_user("investor", investor()).unwrap();
    coordinator.register_user("poet", poet()).unwrap();

    let candidates = coordinator.find_candidates("founder").await.unwrap();
    let targets: Vec<&str> = candidates.iter().map(|c| c.target_id.as_str()).collect();
    assert_eq!(targets, vec!["investor", "poet"]);

    let best = &candidates[0];
    assert_eq!(best.domain, "investor_startup");
    assert!(best.recommended);
    assert!((best.overall_score - (0.6 * best.domain_score + 0.4 * best.general_score)).abs() < 1e-12);
    assert!(!candidates[1].recommended);

    for candidate in &candidates {
        for matcher in coordinator.registry().matchers() {
            let score = matcher.calculate_match_score(&founder(), &profile_of(&candidate.target_id)).await;
            assert!(score <= candidate.domain_score + 1e-12);
        }
    }
}

fn profile_of(id: &str) -> UserProfile {
    match id {
        "investor" => investor(),
        _ => poet(),
    }
}

#[tokio::test]
async fn test_failed_negotiation_does_not_stop_the_run() {
    let coordinator = MultiAgentCoordinator::with_default_matchers(config());
    coordinator.register_matcher(Arc::new(Misconfigured));
    coordinator.register_user("founder", founder()).unwrap();
    coordinator.register_user("investor", investor()).unwrap();
    coordinator
        .register_user(
            "ghosted",
            UserProfile::builder("ghosted")
                .industry("fintech")
                .location("Berlin")
                .goal("launch in Europe")
                .need_high("engineering talent")
                .offering("funding")
                .build(),
        )
        .unwrap();

    let report = coordinator.run_full_matching_process("founder", 5).await.unwrap();

    let targets: Vec<&str> = report.candidates.iter().map(|c| c.target_id.as_str()).collect();
    assert_eq!(targets, vec!["ghosted", "investor"]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, "ghosted");
    assert!(report.errors[0].1.contains("retired_domain"));
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.agreements.len(), 1);
    assert_eq!(report.agreements[0].participants.1, "investor");
}

#[tokio::test]
async fn test_concurrent_negotiations_are_all_recorded() {
    let coordinator = MultiAgentCoordinator::with_default_matchers(config());
    for i in 0..4 {
        coordinator
            .register_user(
                &format!("startup{i}"),
                UserProfile::builder(format!("startup{i}"))
                    .need_critical("funding")
                    .offering("equity")
                    .build(),
            )
            .unwrap();
    }
    coordinator.register_user("fund", UserProfile::builder("fund").need_high("equity").offering("funding").build()).unwrap();

    let mut candidates = Vec::new();
    for i in 0..4 {
        let found = coordinator.find_candidates(&format!("startup{i}")).await.unwrap();
        candidates.push(found.into_iter().find(|c| c.target_id == "fund").unwrap());
    }

    let results = coordinator.negotiate_concurrently(&candidates).await;
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.as_ref().map(|o| o.success).unwrap_or(false)));

    let stats = coordinator.statistics();
    assert_eq!(stats.agents, 5);
    assert_eq!(stats.matchers, 4);
    assert_eq!(stats.conversations, 4);
    assert_eq!(stats.agreements, 4);
    assert_eq!(stats.success_rate, 1.0);
    assert_eq!(stats.average_rounds, 0.0);
    assert!(stats.average_mutual_benefit > 0.0);

    let fund = coordinator.agent("fund").unwrap();
    assert_eq!(fund.user_id(), "fund");
    assert_eq!(coordinator.conversations_of("fund").len(), 4);
}

#[tokio::test]
async fn test_statistics_start_empty() {
    let coordinator = MultiAgentCoordinator::with_default_matchers(config());
    let stats = coordinator.statistics();
    assert_eq!(stats.conversations, 0);
    assert_eq!(stats.success_rate, 0.0);
    assert!(coordinator.match_history("anyone").is_empty());
}
