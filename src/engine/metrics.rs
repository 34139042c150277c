//! Metrics collection for analytics and negotiation
//!
//! Provides Prometheus-compatible metrics for monitoring algorithm runtimes,
//! convergence, score distributions and negotiation outcomes.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    /// Counter for analytics runs
    static ref ANALYTICS_RUNS: IntCounterVec = register_int_counter_vec!(
        "netbroker_analytics_runs_total",
        "Total number of analytics computations",
        &["component", "algorithm"]
    ).unwrap();

    /// Histogram for analytics duration
    static ref ANALYTICS_DURATION: HistogramVec = register_histogram_vec!(
        "netbroker_analytics_duration_seconds",
        "Analytics computation duration in seconds",
        &["component", "algorithm"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    /// Counter for iterative algorithms that hit their iteration cap
    static ref NON_CONVERGENCE: IntCounterVec = register_int_counter_vec!(
        "netbroker_non_convergence_total",
        "Iterative computations that stopped at the iteration cap",
        &["component", "algorithm"]
    ).unwrap();

    /// Histogram for match scores
    static ref MATCH_SCORES: HistogramVec = register_histogram_vec!(
        "netbroker_match_score",
        "Distribution of synthesized match scores",
        &["category"],
        vec![10.0, 20.0, 30.0, 40.0, 50.0, 65.0, 80.0, 90.0, 100.0]
    ).unwrap();

    /// Counter for feature groups replaced by defaults
    static ref DEGRADED_FEATURES: IntCounterVec = register_int_counter_vec!(
        "netbroker_degraded_feature_groups_total",
        "Feature groups that fell back to their default value",
        &["component", "group"]
    ).unwrap();

    /// Counter for negotiation outcomes
    static ref NEGOTIATIONS: IntCounterVec = register_int_counter_vec!(
        "netbroker_negotiations_total",
        "Total number of negotiations",
        &["domain", "status"]
    ).unwrap();

    /// Histogram for negotiation rounds
    static ref NEGOTIATION_ROUNDS: HistogramVec = register_histogram_vec!(
        "netbroker_negotiation_rounds",
        "Counter-offer rounds used per negotiation",
        &["domain"],
        vec![0.0, 1.0, 2.0, 3.0, 5.0, 8.0, 10.0, 20.0]
    ).unwrap();

    /// Histogram for mutual benefit of agreements
    static ref MUTUAL_BENEFIT: HistogramVec = register_histogram_vec!(
        "netbroker_agreement_mutual_benefit",
        "Overall mutual benefit of finalized agreements",
        &["domain"],
        vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]
    ).unwrap();

    /// Gauge for active negotiations
    static ref ACTIVE_NEGOTIATIONS: IntGauge = register_int_gauge!(
        "netbroker_active_negotiations",
        "Number of negotiations currently running"
    ).unwrap();
}

/// Metrics collector scoped to one component
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    component: String,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Record an analytics computation
    pub fn record_analytics(&self, algorithm: &str, duration: f64) {
        ANALYTICS_RUNS
            .with_label_values(&[&self.component, algorithm])
            .inc();
        ANALYTICS_DURATION
            .with_label_values(&[&self.component, algorithm])
            .observe(duration);
    }

    /// Record an iterative computation that stopped at its cap
    pub fn record_non_convergence(&self, algorithm: &str) {
        NON_CONVERGENCE
            .with_label_values(&[&self.component, algorithm])
            .inc();
    }

    /// Record a synthesized match score
    pub fn record_match_score(&self, category: &str, score: f64) {
        MATCH_SCORES.with_label_values(&[category]).observe(score);
    }

    /// Record a feature group replaced by its default
    pub fn record_degraded_feature(&self, group: &str) {
        DEGRADED_FEATURES
            .with_label_values(&[&self.component, group])
            .inc();
    }

    /// Record negotiation start
    pub fn record_negotiation_start(&self) {
        ACTIVE_NEGOTIATIONS.inc();
    }

    /// Record negotiation end
    pub fn record_negotiation_end(&self, domain: &str, status: &str, rounds: usize) {
        ACTIVE_NEGOTIATIONS.dec();
        NEGOTIATIONS.with_label_values(&[domain, status]).inc();
        NEGOTIATION_ROUNDS
            .with_label_values(&[domain])
            .observe(rounds as f64);
    }

    /// Record the mutual benefit of a finalized agreement
    pub fn record_agreement(&self, domain: &str, overall_benefit: f64) {
        MUTUAL_BENEFIT
            .with_label_values(&[domain])
            .observe(overall_benefit);
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    #[inline]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in seconds
    #[inline]
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e).into())
}
