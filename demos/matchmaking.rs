//! Matchmaking walkthrough
//!
//! Builds a small professional network in memory, runs the analytics over it,
//! scores a few pairs and lets the agents negotiate.
//!
//! ```text
//! RUST_LOG=netbroker=debug cargo run --example matchmaking
//! ```

use std::sync::Arc;

use anyhow::Context;
use netbroker::agents::{MultiAgentCoordinator, Priority, UserProfile};
use netbroker::analytics::NetworkAnalyzer;
use netbroker::config::BrokerConfig;
use netbroker::engine::export_metrics;
use netbroker::matching::MatchQualitySynthesizer;
use netbroker::providers::InMemoryNetwork;
use tracing_subscriber::EnvFilter;

fn profiles() -> Vec<UserProfile> {
    vec![
        UserProfile::builder("ada")
            .industry("fintech")
            .location("London")
            .expertise("payments")
            .need_critical("seed funding")
            .need_high("compliance advice")
            .offering("engineering talent")
            .goal("launch a payments API")
            .build(),
        UserProfile::builder("grace")
            .industry("fintech")
            .location("London")
            .expertise("venture capital")
            .need_high("engineering talent")
            .offering("seed funding")
            .goal("launch a payments API")
            .build(),
        UserProfile::builder("linus")
            .industry("logistics")
            .location("Helsinki")
            .expertise("compliance")
            .need("payments", Priority::Medium)
            .offering("compliance advice")
            .build(),
        UserProfile::builder("barbara")
            .industry("healthcare")
            .location("Boston")
            .expertise("data science")
            .need("design", Priority::Low)
            .offering("analytics")
            .build(),
        UserProfile::builder("ken")
            .industry("fintech")
            .location("London")
            .expertise("payments")
            .offering("mentoring")
            .build(),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netbroker=info")))
        .init();

    let network = Arc::new(InMemoryNetwork::new());
    for profile in profiles() {
        network.set_profile(profile);
    }
    network.connect("ada", "ken", 0.9, 0.9);
    network.connect("ken", "grace", 0.7, 0.8);
    network.connect("ada", "barbara", 0.4, 0.5);
    network.connect("barbara", "linus", 0.6, 0.6);

    let config = BrokerConfig::default();
    let analyzer = Arc::new(NetworkAnalyzer::in_memory(network.clone(), config.clone()));

    println!("Network");
    println!("-------");
    let stats = analyzer.network_stats().await;
    println!(
        "{} users, {} connections, density {:.2}, {} component(s)\n",
        stats.users, stats.connections, stats.density, stats.components
    );

    let centrality = analyzer.compute_centrality(&[]).await?;
    for scores in &centrality.scores {
        println!(
            "{:<8} pagerank {:.3}  betweenness {:.3}  role {}",
            scores.user_id,
            scores.page_rank,
            scores.betweenness,
            scores.role.label()
        );
    }

    let communities = analyzer.detect_communities(2).await?;
    println!("\nmodularity {:.3}", communities.overall_modularity);
    for community in &communities.communities {
        println!("community {}: {}", community.id, community.members.join(", "));
    }
    for bridge in &communities.bridges {
        println!("bridge {} (strength {:.2})", bridge.user_id, bridge.strength);
    }

    println!("\nSerendipity for ada");
    println!("-------------------");
    for candidate in analyzer.find_serendipitous_matches("ada", 3).await? {
        println!("{:<8} {:.2}  {}", candidate.user_id, candidate.score, candidate.reasons.join("; "));
    }

    println!("\nMatch scores");
    println!("------------");
    let synthesizer = MatchQualitySynthesizer::new(analyzer.clone());
    for target in ["grace", "linus"] {
        let score = synthesizer.score_match("ada", target).await;
        println!(
            "ada -> {target}: {:.1} ({}, confidence {:.2})",
            score.score,
            score.category.label(),
            score.confidence
        );
        for reason in score.reasons.iter().take(3) {
            println!("    {:>5.1}  {}", reason.contribution, reason.explanation);
        }
        for warning in &score.warnings {
            println!("    warning: {warning}");
        }
    }

    println!("\nNegotiation");
    println!("-----------");
    let coordinator = MultiAgentCoordinator::with_default_matchers(config);
    for profile in profiles() {
        let user_id = profile.user_id.clone();
        coordinator
            .register_user(&user_id, profile)
            .with_context(|| format!("registering {user_id}"))?;
    }

    let report = coordinator.run_full_matching_process("ada", 3).await?;
    for candidate in &report.candidates {
        println!(
            "{:<8} {:<16} overall {:.2}{}",
            candidate.target_id,
            candidate.domain,
            candidate.overall_score,
            if candidate.recommended { "  (recommended)" } else { "" }
        );
    }
    for outcome in &report.results {
        match &outcome.agreement {
            Some(agreement) => println!(
                "agreement with {} after {} round(s): benefit {:.2}, balance {:.2}",
                agreement.participants.1,
                agreement.rounds,
                agreement.mutual_benefit.overall_score,
                agreement.mutual_benefit.balance_score
            ),
            None => println!(
                "no agreement: {}",
                outcome.failure_reason.as_deref().unwrap_or("unknown")
            ),
        }
    }

    let stats = coordinator.statistics();
    println!(
        "\n{} conversation(s), success rate {:.0}%",
        stats.conversations,
        stats.success_rate * 100.0
    );

    let metrics = export_metrics().map_err(|e| anyhow::anyhow!(e))?;
    println!("\n{} metric lines exported", metrics.lines().count());
    Ok(())
}
