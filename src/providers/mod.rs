//! External collaborator contracts
//!
//! The core never owns profile or edge storage. It consumes three contracts:
//! [`NeighborProvider`] for adjacency, [`ProfileProvider`] for profile
//! attributes and [`TrustEstimator`] for transitive trust. In-memory
//! implementations are provided for embedding and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::UserProfile;
use crate::graph::WeightedEdge;

pub mod memory;
pub mod trust;

pub use memory::InMemoryNetwork;
pub use trust::TransitiveTrust;

/// Result type for provider lookups
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors raised by external collaborators
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider timed out after {0} ms")]
    Timeout(u64),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

/// Supplies the adjacency of users.
///
/// A user with no stored connections yields an empty list, not an error.
#[async_trait]
pub trait NeighborProvider: Send + Sync {
    /// Directional records owned by `user_id`
    async fn neighbors(&self, user_id: &str) -> ProviderResult<Vec<WeightedEdge>>;

    /// Every known user id
    async fn all_users(&self) -> ProviderResult<Vec<String>>;

    /// Records for a batch of users
    async fn neighbors_batch(&self, user_ids: &[String]) -> ProviderResult<HashMap<String, Vec<WeightedEdge>>> {
        let mut records = HashMap::with_capacity(user_ids.len());
        for user_id in user_ids {
            records.insert(user_id.clone(), self.neighbors(user_id).await?);
        }
        Ok(records)
    }

    /// A random subset of users, reproducible when `seed` is given
    async fn sample_users(&self, limit: usize, seed: Option<u64>) -> ProviderResult<Vec<String>> {
        let mut users = self.all_users().await?;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        users.shuffle(&mut rng);
        users.truncate(limit);
        Ok(users)
    }
}

/// Supplies profile attributes
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Profile of a user, `None` when unknown
    async fn profile(&self, user_id: &str) -> ProviderResult<Option<UserProfile>>;
}

/// Trust between two users as estimated by an external collaborator
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrustEstimate {
    /// Trust on the direct connection, absent when the users are not connected
    pub direct_trust: Option<f64>,

    /// Best transitive trust through intermediaries
    pub indirect_trust: f64,

    /// Confidence in the estimate, in `[0, 1]`
    pub confidence: f64,
}

/// Estimates trust between two users
#[async_trait]
pub trait TrustEstimator: Send + Sync {
    /// Trust `from` can place in `to`
    async fn estimate(&self, from: &str, to: &str) -> ProviderResult<TrustEstimate>;
}
