//! # netbroker
//!
//! Graph analytics, explainable match scoring and agent-to-agent negotiation
//! for brokering professional connections.
//!
//! ## Overview
//!
//! netbroker turns raw connection data into centrality, community, path and
//! serendipity signals, fuses those signals into a single explainable match
//! score, and then lets autonomous agents representing two users negotiate a
//! concrete agreement.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netbroker::agents::{MultiAgentCoordinator, UserProfile};
//! use netbroker::config::BrokerConfig;
//!
//! # async fn example() -> netbroker::Result<()> {
//! let coordinator = MultiAgentCoordinator::with_default_matchers(BrokerConfig::default());
//!
//! coordinator.register_user(
//!     "alice",
//!     UserProfile::builder("alice").need_critical("funding").offering("talent").build(),
//! )?;
//! coordinator.register_user(
//!     "bob",
//!     UserProfile::builder("bob").need_high("talent").offering("funding").build(),
//! )?;
//!
//! let report = coordinator.run_full_matching_process("alice", 3).await?;
//! println!("{} agreements", report.agreements.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`graph`]: Immutable weighted snapshots of the social graph
//! - [`providers`]: Contracts for neighbor, profile and trust lookups
//! - [`analytics`]: Paths, centrality, communities and serendipity
//! - [`matching`]: Feature fusion into one explainable match score
//! - [`agents`]: Representative agents, domain matchers and negotiation
//! - [`config`]: Tunables for every component
//! - [`engine`]: Metrics and timing

#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for netbroker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Main error type for netbroker operations
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Graph snapshot error
    #[error("Graph error: {0}")]
    Graph(#[from] graph::GraphError),

    /// Upstream provider error
    #[error("Provider error: {0}")]
    Provider(#[from] providers::ProviderError),

    /// Agent, domain or negotiation error
    #[error("Agent error: {0}")]
    Agent(#[from] agents::AgentError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Join error from async tasks
    #[error("Async join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Weighted graph snapshots
pub mod graph;

/// External collaborator contracts and in-memory implementations
pub mod providers;

/// Graph analytics primitives
pub mod analytics;

/// Match quality synthesis
pub mod matching;

/// Representative agents and negotiation
pub mod agents;

/// Configuration
pub mod config;

/// Metrics and timing
pub mod engine;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: BrokerError = agents::AgentError::InvalidDomain("lending".to_string()).into();
        assert!(err.to_string().contains("lending"));
    }

    #[test]
    fn test_snapshot_initialization() {
        let graph = graph::SocialGraph::new();

        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.total_weight(), 0.0);
    }
}
