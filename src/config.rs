//! Configuration for analytics, scoring and negotiation

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub centrality: CentralityConfig,
    pub community: CommunityConfig,
    pub paths: PathConfig,
    pub serendipity: SerendipityConfig,
    pub synthesizer: SynthesizerConfig,
    pub negotiation: NegotiationConfig,
    pub coordinator: CoordinatorConfig,
    pub providers: ProviderConfig,
}

/// How betweenness is computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BetweennessMode {
    /// Brandes accumulation from every vertex
    Exact,

    /// Brandes accumulation from sampled pivots, scaled by `n / samples`
    Sampled { samples: usize, seed: Option<u64> },
}

/// Centrality configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralityConfig {
    /// PageRank damping factor
    pub damping: f64,

    /// Convergence tolerance on the max coordinate delta
    pub tolerance: f64,

    /// Iteration cap for power iteration
    pub max_iterations: usize,

    /// Betweenness strategy
    pub betweenness: BetweennessMode,
}

impl Default for CentralityConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: 1e-4,
            max_iterations: 100,
            betweenness: BetweennessMode::Exact,
        }
    }
}

/// Community detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    /// Communities smaller than this are dissolved into isolated users
    pub min_size: usize,

    /// Minimum modularity gain for a move to be accepted
    pub min_modularity_gain: f64,

    /// Cap on full passes over the vertices
    pub max_iterations: usize,

    /// Central members reported per community
    pub top_k: usize,

    /// Seed for the visitation-order shuffle
    pub seed: Option<u64>,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            min_size: 3,
            min_modularity_gain: 1e-4,
            max_iterations: 100,
            top_k: 3,
            seed: None,
        }
    }
}

/// Path search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub max_alternative_paths: usize,
    pub max_path_length: usize,
    /// Sources sampled by the diameter and clustering estimators
    pub sample_size: usize,
    pub seed: Option<u64>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            max_alternative_paths: 5,
            max_path_length: 6,
            sample_size: 32,
            seed: None,
        }
    }
}

/// Serendipity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerendipityConfig {
    /// Hops that define the close network
    pub close_network_hops: usize,

    /// Hops explored when gathering candidates
    pub candidate_hops: usize,

    /// Candidates scoring below this are discarded
    pub min_score: f64,

    /// Extra users sampled outside the explored neighborhood
    pub random_sample: usize,

    pub seed: Option<u64>,
}

impl Default for SerendipityConfig {
    fn default() -> Self {
        Self {
            close_network_hops: 2,
            candidate_hops: 4,
            min_score: 0.4,
            random_sample: 50,
            seed: None,
        }
    }
}

/// Match scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizerConfig {
    /// Hop depth of the ego network built around the pair
    pub ego_depth: usize,

    /// Node cap of that ego network
    pub max_snapshot_nodes: usize,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            ego_depth: 3,
            max_snapshot_nodes: 500,
        }
    }
}

/// External provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Budget of a single neighbor lookup while building a snapshot
    pub lookup_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(10),
        }
    }
}

/// Negotiation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Maximum counter-offer rounds
    pub max_rounds: usize,

    /// Wall-clock budget of a conversation
    pub timeout: Duration,

    /// Utility at or above which a proposal is accepted
    pub acceptance_threshold: f64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            timeout: Duration::from_secs(30 * 60),
            acceptance_threshold: 0.7,
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Overall score at which a candidate is recommended
    pub recommendation_threshold: f64,

    /// Delay between sequential negotiations
    pub pacing_delay: Duration,

    /// Parallel negotiations allowed by `negotiate_concurrently`
    pub max_concurrency: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            recommendation_threshold: 0.7,
            pacing_delay: Duration::from_millis(100),
            max_concurrency: num_cpus::get(),
        }
    }
}

impl BrokerConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        Self::from_json_str(&raw)
    }

    /// Reject values the algorithms cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let damping = self.centrality.damping;
        if !(0.0..1.0).contains(&damping) {
            return Err(ConfigError::InvalidValue {
                field: "centrality.damping",
                reason: format!("{damping} is outside [0, 1)"),
            });
        }
        if self.centrality.tolerance <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "centrality.tolerance",
                reason: "must be positive".to_string(),
            });
        }
        if let BetweennessMode::Sampled { samples: 0, .. } = self.centrality.betweenness {
            return Err(ConfigError::InvalidValue {
                field: "centrality.betweenness.samples",
                reason: "must be positive".to_string(),
            });
        }
        if self.community.min_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "community.min_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.serendipity.close_network_hops == 0
            || self.serendipity.candidate_hops <= self.serendipity.close_network_hops
        {
            return Err(ConfigError::InvalidValue {
                field: "serendipity.candidate_hops",
                reason: "must exceed close_network_hops, which must be positive".to_string(),
            });
        }
        let threshold = self.negotiation.acceptance_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                field: "negotiation.acceptance_threshold",
                reason: format!("{threshold} is outside [0, 1]"),
            });
        }
        if self.providers.lookup_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "providers.lookup_timeout",
                reason: "must be positive".to_string(),
            });
        }
        if self.coordinator.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "coordinator.max_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BrokerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.negotiation.max_rounds, 10);
        assert_eq!(config.negotiation.timeout, Duration::from_secs(1800));
        assert_eq!(config.centrality.damping, 0.85);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = BrokerConfig::from_json_str(
            r#"{
                "community": { "min_size": 2, "seed": 42 },
                "centrality": { "betweenness": { "mode": "sampled", "samples": 16, "seed": 1 } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.community.min_size, 2);
        assert_eq!(config.community.seed, Some(42));
        assert_eq!(config.community.max_iterations, 100);
        assert_eq!(
            config.centrality.betweenness,
            BetweennessMode::Sampled { samples: 16, seed: Some(1) }
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let result = BrokerConfig::from_json_str(r#"{ "centrality": { "damping": 1.5 } }"#);
        assert!(result.is_err());

        let mut config = BrokerConfig::default();
        config.serendipity.candidate_hops = 1;
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.providers.lookup_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
