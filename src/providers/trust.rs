//! Transitive trust estimation over a neighbor provider

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::providers::{NeighborProvider, ProviderResult, TrustEstimate, TrustEstimator};

/// Estimates trust from connection records.
///
/// Direct trust is the trust level of `from`'s record of `to`. Indirect trust
/// is the best product of trust levels over a two-hop path
/// `from -> middle -> to`. Confidence grows with the number of supporting
/// paths.
pub struct TransitiveTrust {
    provider: Arc<dyn NeighborProvider>,
}

impl TransitiveTrust {
    /// Create a new estimator
    pub fn new(provider: Arc<dyn NeighborProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TrustEstimator for TransitiveTrust {
    async fn estimate(&self, from: &str, to: &str) -> ProviderResult<TrustEstimate> {
        if from == to {
            return Ok(TrustEstimate {
                direct_trust: Some(1.0),
                indirect_trust: 1.0,
                confidence: 1.0,
            });
        }

        let first_hop = self.provider.neighbors(from).await?;
        let direct_trust = first_hop
            .iter()
            .find(|edge| edge.target_id == to)
            .map(|edge| edge.trust_level);

        let middles: Vec<String> = first_hop
            .iter()
            .filter(|edge| edge.target_id != to)
            .map(|edge| edge.target_id.clone())
            .collect();
        let first_trust: HashMap<&str, f64> = first_hop
            .iter()
            .map(|edge| (edge.target_id.as_str(), edge.trust_level))
            .collect();

        let second_hop = self.provider.neighbors_batch(&middles).await?;
        let mut indirect_trust: f64 = 0.0;
        let mut paths = 0usize;
        for (middle, records) in &second_hop {
            if let Some(edge) = records.iter().find(|edge| edge.target_id == to) {
                let via = first_trust.get(middle.as_str()).copied().unwrap_or(0.0) * edge.trust_level;
                indirect_trust = indirect_trust.max(via);
                paths += 1;
            }
        }

        let direct_weight = if direct_trust.is_some() { 0.5 } else { 0.0 };
        let confidence = (direct_weight + 0.2 * paths as f64).min(1.0);

        debug!(from, to, paths, confidence, "estimated trust");
        Ok(TrustEstimate {
            direct_trust,
            indirect_trust,
            confidence,
        })
    }
}
