//! Connection records for the social graph

use serde::{Deserialize, Serialize};

/// A directional relationship record as supplied by a neighbor provider.
///
/// `strength` and `trust_level` are clamped into `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedEdge {
    /// User the record belongs to
    pub source_id: String,

    /// Connected user
    pub target_id: String,

    /// Relationship strength in `[0, 1]`
    pub strength: f64,

    /// Trust the source places in the target, in `[0, 1]`
    pub trust_level: f64,
}

impl WeightedEdge {
    /// Create a new record, clamping strength and trust into `[0, 1]`
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        strength: f64,
        trust_level: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            strength: clamp_unit(strength),
            trust_level: clamp_unit(trust_level),
        }
    }

    /// The same record seen from the other side
    pub fn reversed(&self) -> Self {
        Self {
            source_id: self.target_id.clone(),
            target_id: self.source_id.clone(),
            strength: self.strength,
            trust_level: self.trust_level,
        }
    }
}

/// Mutuality of a pair: ratio of the weaker to the stronger directional strength.
///
/// Returns 0 when either side is zero.
pub fn mutuality(forward: f64, reverse: f64) -> f64 {
    let max = forward.max(reverse);
    if max <= 0.0 {
        return 0.0;
    }
    forward.min(reverse) / max
}

/// Undirected connection stored in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Mean strength of the directional records
    pub strength: f64,

    /// Mean trust of the directional records
    pub trust: f64,

    /// min/max ratio of the directional strengths, 0 when only one side was seen
    pub mutuality: f64,

    /// Weight used by weighted algorithms (`strength * trust`)
    pub weight: f64,
}

impl Connection {
    /// Connection built from a single record applied in both directions
    pub fn symmetric(strength: f64, trust: f64) -> Self {
        let strength = clamp_unit(strength);
        let trust = clamp_unit(trust);
        Self {
            strength,
            trust,
            mutuality: 1.0,
            weight: strength * trust,
        }
    }

    /// Merge the two directional records of a pair
    pub fn merge(forward: &WeightedEdge, reverse: Option<&WeightedEdge>) -> Self {
        match reverse {
            Some(reverse) => {
                let strength = (forward.strength + reverse.strength) / 2.0;
                let trust = (forward.trust_level + reverse.trust_level) / 2.0;
                Self {
                    strength,
                    trust,
                    mutuality: mutuality(forward.strength, reverse.strength),
                    weight: strength * trust,
                }
            }
            None => Self {
                strength: forward.strength,
                trust: forward.trust_level,
                mutuality: 0.0,
                weight: forward.strength * forward.trust_level,
            },
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_clamps_values() {
        let edge = WeightedEdge::new("a", "b", 1.7, -0.2);
        assert_eq!(edge.strength, 1.0);
        assert_eq!(edge.trust_level, 0.0);

        let edge = WeightedEdge::new("a", "b", f64::NAN, 0.5);
        assert_eq!(edge.strength, 0.0);
    }

    #[test]
    fn test_mutuality() {
        assert_eq!(mutuality(0.8, 0.4), 0.5);
        assert_eq!(mutuality(0.4, 0.8), 0.5);
        assert_eq!(mutuality(0.0, 0.0), 0.0);
        assert_eq!(mutuality(0.6, 0.6), 1.0);
    }

    #[test]
    fn test_merge_single_direction() {
        let forward = WeightedEdge::new("a", "b", 0.5, 0.4);
        let connection = Connection::merge(&forward, None);

        assert_eq!(connection.mutuality, 0.0);
        assert!((connection.weight - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_reversed() {
        let edge = WeightedEdge::new("a", "b", 0.5, 0.4).reversed();
        assert_eq!(edge.source_id, "b");
        assert_eq!(edge.target_id, "a");
    }
}
