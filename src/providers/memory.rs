//! In-memory network store

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::agents::UserProfile;
use crate::graph::WeightedEdge;
use crate::providers::{NeighborProvider, ProfileProvider, ProviderResult};

/// Concurrent in-memory store of directional connection records and profiles
#[derive(Debug, Default)]
pub struct InMemoryNetwork {
    edges: DashMap<String, HashMap<String, WeightedEdge>>,
    profiles: DashMap<String, UserProfile>,
}

impl InMemoryNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user without connections
    pub fn add_user(&self, user_id: impl Into<String>) {
        self.edges.entry(user_id.into()).or_default();
    }

    /// Store a symmetric connection (both directional records)
    pub fn connect(&self, a: &str, b: &str, strength: f64, trust: f64) {
        self.connect_directed(a, b, strength, trust);
        self.connect_directed(b, a, strength, trust);
    }

    /// Store one directional record
    pub fn connect_directed(&self, from: &str, to: &str, strength: f64, trust: f64) {
        self.add_user(to);
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string(), WeightedEdge::new(from, to, strength, trust));
    }

    /// Store or replace a profile, registering the user
    pub fn set_profile(&self, profile: UserProfile) {
        self.add_user(profile.user_id.clone());
        self.profiles.insert(profile.user_id.clone(), profile);
    }

    /// Number of registered users
    pub fn user_count(&self) -> usize {
        self.edges.len()
    }
}

#[async_trait]
impl NeighborProvider for InMemoryNetwork {
    async fn neighbors(&self, user_id: &str) -> ProviderResult<Vec<WeightedEdge>> {
        let mut records: Vec<WeightedEdge> = self
            .edges
            .get(user_id)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        Ok(records)
    }

    async fn all_users(&self) -> ProviderResult<Vec<String>> {
        let mut users: Vec<String> = self.edges.iter().map(|entry| entry.key().clone()).collect();
        users.sort();
        Ok(users)
    }
}

#[async_trait]
impl ProfileProvider for InMemoryNetwork {
    async fn profile(&self, user_id: &str) -> ProviderResult<Option<UserProfile>> {
        Ok(self.profiles.get(user_id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_is_symmetric() {
        let network = InMemoryNetwork::new();
        network.connect("a", "b", 0.7, 0.6);

        let a = network.neighbors("a").await.unwrap();
        let b = network.neighbors("b").await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b[0].target_id, "a");
        assert_eq!(network.user_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_neighbors() {
        let network = InMemoryNetwork::new();
        assert!(network.neighbors("ghost").await.unwrap().is_empty());
        assert!(network.profile("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profiles_register_users() {
        let network = InMemoryNetwork::new();
        network.set_profile(UserProfile::builder("carol").industry("fintech").build());

        assert_eq!(network.all_users().await.unwrap(), vec!["carol".to_string()]);
        let profile = network.profile("carol").await.unwrap().unwrap();
        assert_eq!(profile.industry.as_deref(), Some("fintech"));
    }
}
