use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use netbroker::agents::{MultiAgentCoordinator, UserProfile};
use netbroker::analytics::{CentralityEngine, CommunityDetector, PathFinder};
use netbroker::config::{BetweennessMode, BrokerConfig, CentralityConfig, CommunityConfig};
use netbroker::graph::{SocialGraph, WeightedEdge};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::runtime::Runtime;

/// Clustered random graph: dense blocks of 20 users with sparse links between them
fn create_clustered_graph(users: usize) -> SocialGraph {
    let mut rng = StdRng::seed_from_u64(7);
    let mut edges = Vec::new();

    for a in 0..users {
        for b in (a + 1)..users {
            let same_block = a / 20 == b / 20;
            let p = if same_block { 0.3 } else { 0.005 };
            if rng.gen_bool(p) {
                let strength = rng.gen_range(0.1..1.0);
                let trust = rng.gen_range(0.1..1.0);
                edges.push(WeightedEdge::new(format!("u{a}"), format!("u{b}"), strength, trust));
            }
        }
    }

    SocialGraph::from_edges(edges)
}

fn benchmark_centrality(c: &mut Criterion) {
    let mut group = c.benchmark_group("centrality");
    let engine = CentralityEngine::default();

    for users in [100, 400] {
        let graph = create_clustered_graph(users);
        let adjacency = graph.adjacency();

        group.bench_with_input(BenchmarkId::new("betweenness_exact", users), &adjacency, |b, adj| {
            b.iter(|| engine.betweenness_exact(black_box(adj)))
        });
        group.bench_with_input(BenchmarkId::new("page_rank", users), &adjacency, |b, adj| {
            b.iter(|| engine.page_rank(black_box(adj)))
        });
        group.bench_with_input(BenchmarkId::new("eigenvector", users), &adjacency, |b, adj| {
            b.iter(|| engine.eigenvector(black_box(adj)))
        });
    }

    let sampled = CentralityEngine::new(CentralityConfig {
        betweenness: BetweennessMode::Sampled {
            samples: 32,
            seed: Some(1),
        },
        ..CentralityConfig::default()
    });
    let graph = create_clustered_graph(400);
    group.bench_function("full_report_sampled_400", |b| b.iter(|| sampled.compute(black_box(&graph))));
    group.finish();
}

fn benchmark_communities(c: &mut Criterion) {
    let detector = CommunityDetector::new(CommunityConfig {
        seed: Some(11),
        ..CommunityConfig::default()
    });
    let graph = create_clustered_graph(400);

    c.bench_function("louvain_local_moving_400", |b| b.iter(|| detector.detect(black_box(&graph), 3)));
}

fn benchmark_paths(c: &mut Criterion) {
    let graph = create_clustered_graph(400);
    let finder = PathFinder::new(&graph);

    c.bench_function("shortest_path_400", |b| b.iter(|| finder.shortest_path(black_box("u0"), black_box("u399"))));
    c.bench_function("alternative_paths_400", |b| {
        b.iter(|| finder.alternative_paths(black_box("u0"), black_box("u45")))
    });
}

fn benchmark_negotiation(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut config = BrokerConfig::default();
    config.coordinator.pacing_delay = Duration::ZERO;

    c.bench_function("full_matching_process_20_agents", |b| {
        b.iter(|| {
            rt.block_on(async {
                let coordinator = MultiAgentCoordinator::with_default_matchers(config.clone());
                for i in 0..20 {
                    let id = format!("user{i}");
                    let (need, offer) = if i % 2 == 0 { ("funding", "talent") } else { ("talent", "funding") };
                    coordinator
                        .register_user(&id, UserProfile::builder(id.as_str()).need_critical(need).offering(offer).build())
                        .unwrap();
                }
                black_box(coordinator.run_full_matching_process("user0", 5).await.unwrap())
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_centrality,
    benchmark_communities,
    benchmark_paths,
    benchmark_negotiation
);
criterion_main!(benches);
