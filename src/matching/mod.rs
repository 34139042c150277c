//! Match quality scoring
//!
//! [`MatchQualitySynthesizer`] turns the analytics of an ego network around a
//! pair into a 0–100 score with reasons, warnings and a fixed-order feature
//! vector ([`FEATURE_NAMES`]).

pub mod features;
pub mod synthesizer;

pub use features::{
    community_score, distance_score, FeatureGroup, FeatureGroupStatus, MatchCategory, MatchFeatures,
    ProfileAlignment, FEATURE_NAMES,
};
pub use synthesizer::{MatchQualitySynthesizer, MatchReason, MatchScore};
