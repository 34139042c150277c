//! Match feature record and the pure scoring functions over it

use serde::{Deserialize, Serialize};

use crate::agents::profile::UserProfile;

/// Feature groups fused by the synthesizer, with their top-level weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureGroup {
    Network,
    Trust,
    Serendipity,
    Community,
    Profile,
    Strategic,
    Meta,
}

impl FeatureGroup {
    pub const ALL: [FeatureGroup; 7] = [
        FeatureGroup::Network,
        FeatureGroup::Trust,
        FeatureGroup::Serendipity,
        FeatureGroup::Community,
        FeatureGroup::Profile,
        FeatureGroup::Strategic,
        FeatureGroup::Meta,
    ];

    /// Top-level weight, the seven weights sum to 1
    pub fn weight(&self) -> f64 {
        match self {
            FeatureGroup::Network => 0.10,
            FeatureGroup::Trust => 0.20,
            FeatureGroup::Serendipity => 0.15,
            FeatureGroup::Community => 0.10,
            FeatureGroup::Profile => 0.25,
            FeatureGroup::Strategic => 0.15,
            FeatureGroup::Meta => 0.05,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeatureGroup::Network => "network",
            FeatureGroup::Trust => "trust",
            FeatureGroup::Serendipity => "serendipity",
            FeatureGroup::Community => "community",
            FeatureGroup::Profile => "profile",
            FeatureGroup::Strategic => "strategic",
            FeatureGroup::Meta => "meta",
        }
    }
}

/// Whether a group was computed or replaced by its default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum FeatureGroupStatus {
    Computed,
    Degraded(String),
}

impl FeatureGroupStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, FeatureGroupStatus::Degraded(_))
    }
}

/// Names of the entries of [`MatchFeatures::to_vector`], in order
pub const FEATURE_NAMES: [&str; 24] = [
    "network_distance",
    "reachable",
    "distance_score",
    "path_quality",
    "common_connections",
    "direct_trust",
    "has_direct_trust",
    "indirect_trust",
    "trust_confidence",
    "serendipity_score",
    "same_community",
    "bridge_involved",
    "community_score",
    "industry_match",
    "expertise_overlap",
    "needs_alignment",
    "geography_match",
    "profile_alignment",
    "target_page_rank",
    "target_betweenness",
    "centrality_similarity",
    "strategic_value",
    "profile_completeness",
    "data_completeness",
];

/// Fixed-schema feature record of an ordered pair.
///
/// Every field has a worst-case default used when its group degrades.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchFeatures {
    // network
    pub network_distance: Option<usize>,
    pub distance_score: f64,
    pub path_quality: f64,
    pub common_connections: usize,
    // trust
    pub direct_trust: Option<f64>,
    pub indirect_trust: f64,
    pub trust_confidence: f64,
    // serendipity
    pub serendipity_score: f64,
    // community
    pub same_community: bool,
    pub bridge_involved: bool,
    pub community_score: f64,
    // profile
    pub industry_match: f64,
    pub expertise_overlap: f64,
    pub needs_alignment: f64,
    pub geography_match: f64,
    pub profile_alignment: f64,
    // strategic
    pub target_page_rank: f64,
    pub target_betweenness: f64,
    pub centrality_similarity: f64,
    pub strategic_value: f64,
    // meta
    pub profile_completeness: f64,
    pub data_completeness: f64,
}

impl MatchFeatures {
    /// Trust value scaled by confidence
    pub fn trust_score(&self) -> f64 {
        let value = self.direct_trust.unwrap_or(self.indirect_trust);
        (value * (0.5 + 0.5 * self.trust_confidence)).clamp(0.0, 1.0)
    }

    /// Score in `[0, 1]` of one group
    pub fn group_score(&self, group: FeatureGroup) -> f64 {
        let value = match group {
            FeatureGroup::Network => 0.7 * self.distance_score + 0.3 * self.path_quality,
            FeatureGroup::Trust => self.trust_score(),
            FeatureGroup::Serendipity => self.serendipity_score,
            FeatureGroup::Community => self.community_score,
            FeatureGroup::Profile => self.profile_alignment,
            FeatureGroup::Strategic => self.strategic_value,
            FeatureGroup::Meta => self.data_completeness,
        };
        value.clamp(0.0, 1.0)
    }

    /// Numeric vector in [`FEATURE_NAMES`] order. Booleans are 0/1; an
    /// unknown distance is 0 with `reachable` 0.
    pub fn to_vector(&self) -> Vec<f64> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        vec![
            self.network_distance.map(|d| d as f64).unwrap_or(0.0),
            flag(self.network_distance.is_some()),
            self.distance_score,
            self.path_quality,
            self.common_connections as f64,
            self.direct_trust.unwrap_or(0.0),
            flag(self.direct_trust.is_some()),
            self.indirect_trust,
            self.trust_confidence,
            self.serendipity_score,
            flag(self.same_community),
            flag(self.bridge_involved),
            self.community_score,
            self.industry_match,
            self.expertise_overlap,
            self.needs_alignment,
            self.geography_match,
            self.profile_alignment,
            self.target_page_rank,
            self.target_betweenness,
            self.centrality_similarity,
            self.strategic_value,
            self.profile_completeness,
            self.data_completeness,
        ]
    }
}

/// Score of a hop distance. Two hops (friend of a friend) is the sweet
/// spot; direct contacts are already known.
pub fn distance_score(distance: Option<usize>) -> f64 {
    match distance {
        Some(0) => 0.0,
        Some(1) => 0.7,
        Some(2) => 1.0,
        Some(3) => 0.8,
        Some(4) => 0.5,
        Some(5) => 0.3,
        _ => 0.1,
    }
}

/// Profile alignment components of `user` looking at `target`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileAlignment {
    pub industry: f64,
    pub expertise: f64,
    pub needs: f64,
    pub geography: f64,
}

impl ProfileAlignment {
    pub fn compute(user: &UserProfile, target: &UserProfile) -> Self {
        let industry = match user.same_industry(target) {
            Some(true) => 1.0,
            Some(false) => 0.3,
            None => 0.0,
        };
        let geography = match user.same_location(target) {
            Some(true) => 1.0,
            Some(false) => 0.5,
            None => 0.0,
        };
        Self {
            industry,
            expertise: user.expertise_overlap(target),
            needs: crate::agents::profile::complementarity(user, target),
            geography,
        }
    }

    /// `0.2·industry + 0.3·expertise + 0.4·needs + 0.1·geography`
    pub fn score(&self) -> f64 {
        0.2 * self.industry + 0.3 * self.expertise + 0.4 * self.needs + 0.1 * self.geography
    }
}

/// Community score: shared community beats a bridge on either side
pub fn community_score(same_community: Option<bool>, bridge_involved: bool) -> f64 {
    match same_community {
        None => 0.0,
        Some(true) => 0.8,
        Some(false) if bridge_involved => 0.6,
        Some(false) => 0.3,
    }
}

/// Category bucket of a 0–100 score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCategory {
    Poor,
    Weak,
    Moderate,
    Good,
    Excellent,
}

impl MatchCategory {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            MatchCategory::Excellent
        } else if score >= 65.0 {
            MatchCategory::Good
        } else if score >= 50.0 {
            MatchCategory::Moderate
        } else if score >= 30.0 {
            MatchCategory::Weak
        } else {
            MatchCategory::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MatchCategory::Excellent => "excellent",
            MatchCategory::Good => "good",
            MatchCategory::Moderate => "moderate",
            MatchCategory::Weak => "weak",
            MatchCategory::Poor => "poor",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_weights_sum_to_one() {
        let total: f64 = FeatureGroup::ALL.iter().map(|g| g.weight()).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_vector_matches_names() {
        let features = MatchFeatures {
            network_distance: Some(2),
            direct_trust: Some(0.4),
            ..MatchFeatures::default()
        };
        let vector = features.to_vector();
        assert_eq!(vector.len(), FEATURE_NAMES.len());
        assert_eq!(vector[0], 2.0);
        assert_eq!(vector[1], 1.0);
        assert_eq!(vector[6], 1.0);
    }

    #[test]
    fn test_categories() {
        assert_eq!(MatchCategory::from_score(80.0), MatchCategory::Excellent);
        assert_eq!(MatchCategory::from_score(79.9), MatchCategory::Good);
        assert_eq!(MatchCategory::from_score(50.0), MatchCategory::Moderate);
        assert_eq!(MatchCategory::from_score(30.0), MatchCategory::Weak);
        assert_eq!(MatchCategory::from_score(0.0), MatchCategory::Poor);
    }

    #[test]
    fn test_distance_and_community_scores() {
        assert_eq!(distance_score(Some(2)), 1.0);
        assert_eq!(distance_score(Some(6)), 0.1);
        assert_eq!(distance_score(None), 0.1);
        assert_eq!(community_score(None, true), 0.0);
        assert_eq!(community_score(Some(false), true), 0.6);
    }

    #[test]
    fn test_trust_score_scales_with_confidence() {
        let mut features = MatchFeatures {
            indirect_trust: 0.8,
            trust_confidence: 0.0,
            ..MatchFeatures::default()
        };
        assert!((features.trust_score() - 0.4).abs() < 1e-12);
        features.trust_confidence = 1.0;
        assert!((features.trust_score() - 0.8).abs() < 1e-12);
    }
}
